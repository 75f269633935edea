use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub relay_events_total: IntCounterVec,
    pub relay_event_latency_seconds: HistogramVec,
    pub published_messages_total: IntCounterVec,
    pub dropped_messages_total: IntCounter,
    pub active_connections: IntGauge,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let relay_events_total = IntCounterVec::new(
            Opts::new("relay_events_total", "Relay events handled by kind and outcome"),
            &["kind", "outcome"],
        )
        .expect("valid relay_events_total metric");

        let relay_event_latency_seconds = HistogramVec::new(
            HistogramOpts::new(
                "relay_event_latency_seconds",
                "Time spent validating, applying and publishing one relay event",
            ),
            &["kind"],
        )
        .expect("valid relay_event_latency_seconds metric");

        let published_messages_total = IntCounterVec::new(
            Opts::new(
                "published_messages_total",
                "Messages queued to subscribers, by topic kind",
            ),
            &["topic"],
        )
        .expect("valid published_messages_total metric");

        let dropped_messages_total = IntCounter::new(
            "dropped_messages_total",
            "Messages dropped because a subscriber queue was full",
        )
        .expect("valid dropped_messages_total metric");

        let active_connections =
            IntGauge::new("active_connections", "Currently connected channel clients")
                .expect("valid active_connections metric");

        registry
            .register(Box::new(relay_events_total.clone()))
            .expect("register relay_events_total");
        registry
            .register(Box::new(relay_event_latency_seconds.clone()))
            .expect("register relay_event_latency_seconds");
        registry
            .register(Box::new(published_messages_total.clone()))
            .expect("register published_messages_total");
        registry
            .register(Box::new(dropped_messages_total.clone()))
            .expect("register dropped_messages_total");
        registry
            .register(Box::new(active_connections.clone()))
            .expect("register active_connections");

        Self {
            registry,
            relay_events_total,
            relay_event_latency_seconds,
            published_messages_total,
            dropped_messages_total,
            active_connections,
        }
    }

    pub fn record_event(&self, kind: &str, outcome: &str, elapsed_secs: f64) {
        self.relay_events_total
            .with_label_values(&[kind, outcome])
            .inc();
        self.relay_event_latency_seconds
            .with_label_values(&[kind])
            .observe(elapsed_secs);
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
