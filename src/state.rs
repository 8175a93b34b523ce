use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::Config;
use crate::fanout::push::{PushChannel, RealtimeHub};
use crate::models::assignment::Assignment;
use crate::models::load::Load;
use crate::models::message::{Conversation, Group};
use crate::models::notification::Notification;
use crate::models::position::PositionLog;
use crate::observability::metrics::Metrics;

pub struct AppState {
    pub config: Config,
    pub loads: DashMap<Uuid, Load>,
    pub assignments: DashMap<Uuid, Assignment>,
    /// Dispatch users watching a load for status events.
    pub watchers: DashMap<Uuid, HashSet<Uuid>>,
    pub positions: DashMap<Uuid, PositionLog>,
    pub notifications: DashMap<Uuid, Notification>,
    pub conversations: DashMap<String, Conversation>,
    pub groups: DashMap<Uuid, Group>,
    pub realtime: Arc<RealtimeHub>,
    pub push: Arc<dyn PushChannel>,
    pub metrics: Metrics,
    // Per-load serialization point for stage and assignment mutations.
    // Unrelated loads never contend.
    load_locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let realtime = Arc::new(RealtimeHub::new(config.event_buffer_size));
        Self::build(config, realtime.clone(), realtime)
    }

    /// Test seam: swap the push path while keeping the durable path intact.
    pub fn with_push(config: Config, push: Arc<dyn PushChannel>) -> Self {
        let realtime = Arc::new(RealtimeHub::new(config.event_buffer_size));
        Self::build(config, realtime, push)
    }

    fn build(config: Config, realtime: Arc<RealtimeHub>, push: Arc<dyn PushChannel>) -> Self {
        Self {
            config,
            loads: DashMap::new(),
            assignments: DashMap::new(),
            watchers: DashMap::new(),
            positions: DashMap::new(),
            notifications: DashMap::new(),
            conversations: DashMap::new(),
            groups: DashMap::new(),
            realtime,
            push,
            metrics: Metrics::new(),
            load_locks: DashMap::new(),
        }
    }

    pub fn load_lock(&self, load_id: Uuid) -> Arc<Mutex<()>> {
        self.load_locks
            .entry(load_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
