use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::stream::select_all;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

use crate::auth::Caller;
use crate::models::message::user_channel;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct WsParams {
    /// Comma-separated channel names; defaults to the caller's own
    /// notification channel.
    pub channels: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    caller: Caller,
    Query(params): Query<WsParams>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let channels: Vec<String> = match params.channels {
        Some(raw) => raw
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect(),
        None => vec![user_channel(caller.user_id)],
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, channels))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, channels: Vec<String>) {
    let (mut sender, mut receiver) = socket.split();

    let streams: Vec<BroadcastStream<String>> = channels
        .iter()
        .map(|channel| BroadcastStream::new(state.realtime.subscribe(channel)))
        .collect();
    let mut merged = select_all(streams);

    info!(channels = ?channels, "websocket client connected");

    let send_task = tokio::spawn(async move {
        while let Some(frame) = merged.next().await {
            // Lagged receivers drop frames; the durable notification feed
            // is the source of truth for anything missed.
            let Ok(frame) = frame else { continue };
            if sender.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!("websocket client disconnected");
}
