use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub stage_transitions_total: IntCounterVec,
    pub offers_total: IntCounterVec,
    pub push_deliveries_total: IntCounterVec,
    pub notifications_created_total: IntCounter,
    pub positions_recorded_total: IntCounter,
    pub messages_sent_total: IntCounter,
    pub active_loads: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let stage_transitions_total = IntCounterVec::new(
            Opts::new("stage_transitions_total", "Load stage transitions by target stage"),
            &["stage"],
        )
        .expect("valid stage_transitions_total metric");

        let offers_total = IntCounterVec::new(
            Opts::new("offers_total", "Assignment offers by outcome"),
            &["outcome"],
        )
        .expect("valid offers_total metric");

        let push_deliveries_total = IntCounterVec::new(
            Opts::new("push_deliveries_total", "Real-time push attempts by outcome"),
            &["outcome"],
        )
        .expect("valid push_deliveries_total metric");

        let notifications_created_total = IntCounter::new(
            "notifications_created_total",
            "Durable notification records created",
        )
        .expect("valid notifications_created_total metric");

        let positions_recorded_total = IntCounter::new(
            "positions_recorded_total",
            "Position samples accepted into history",
        )
        .expect("valid positions_recorded_total metric");

        let messages_sent_total =
            IntCounter::new("messages_sent_total", "Chat messages sent")
                .expect("valid messages_sent_total metric");

        let active_loads = IntGauge::new("active_loads", "Loads in a non-terminal stage")
            .expect("valid active_loads metric");

        registry
            .register(Box::new(stage_transitions_total.clone()))
            .expect("register stage_transitions_total");
        registry
            .register(Box::new(offers_total.clone()))
            .expect("register offers_total");
        registry
            .register(Box::new(push_deliveries_total.clone()))
            .expect("register push_deliveries_total");
        registry
            .register(Box::new(notifications_created_total.clone()))
            .expect("register notifications_created_total");
        registry
            .register(Box::new(positions_recorded_total.clone()))
            .expect("register positions_recorded_total");
        registry
            .register(Box::new(messages_sent_total.clone()))
            .expect("register messages_sent_total");
        registry
            .register(Box::new(active_loads.clone()))
            .expect("register active_loads");

        Self {
            registry,
            stage_transitions_total,
            offers_total,
            push_deliveries_total,
            notifications_created_total,
            positions_recorded_total,
            messages_sent_total,
            active_loads,
        }
    }

    pub fn encode(&self) -> Result<String, String> {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();

        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|err| format!("failed to encode metrics: {err}"))?;

        String::from_utf8(buffer).map_err(|err| format!("metrics are not valid utf8: {err}"))
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
