use dashmap::DashMap;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("push channel unavailable")]
    ChannelUnavailable,
}

/// Best-effort real-time delivery primitive. Implementations must never
/// block the durable-write path; at-least-once delivery to currently
/// subscribed clients is the most a caller may assume.
pub trait PushChannel: Send + Sync {
    fn publish(&self, channel: &str, event: &str, payload: &Value) -> Result<(), PushError>;
}

/// In-process hub backed by one broadcast channel per channel name. The WS
/// endpoint subscribes here; publishing with zero subscribers is a
/// successful no-op.
pub struct RealtimeHub {
    channels: DashMap<String, broadcast::Sender<String>>,
    buffer_size: usize,
}

impl RealtimeHub {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            channels: DashMap::new(),
            buffer_size,
        }
    }

    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.buffer_size).0)
            .subscribe()
    }
}

impl PushChannel for RealtimeHub {
    fn publish(&self, channel: &str, event: &str, payload: &Value) -> Result<(), PushError> {
        let frame = json!({
            "channel": channel,
            "event": event,
            "payload": payload,
        })
        .to_string();

        if let Some(sender) = self.channels.get(channel) {
            // A send error only means nobody is subscribed right now.
            let _ = sender.send(frame);
        }
        Ok(())
    }
}
