use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub upstream_requests_total: IntCounterVec,
    pub transitions_total: IntCounterVec,
    pub tracking_updates_total: IntCounterVec,
    pub list_refreshes_total: IntCounterVec,
    pub tracked_deliveries: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let upstream_requests_total = IntCounterVec::new(
            Opts::new(
                "upstream_requests_total",
                "Platform API requests by resource and outcome",
            ),
            &["resource", "outcome"],
        )
        .expect("valid upstream_requests_total metric");

        let transitions_total = IntCounterVec::new(
            Opts::new(
                "transitions_total",
                "Delivery lifecycle transitions by action and outcome",
            ),
            &["action", "outcome"],
        )
        .expect("valid transitions_total metric");

        let tracking_updates_total = IntCounterVec::new(
            Opts::new(
                "tracking_updates_total",
                "Real-time tracking events by outcome",
            ),
            &["outcome"],
        )
        .expect("valid tracking_updates_total metric");

        let list_refreshes_total = IntCounterVec::new(
            Opts::new(
                "list_refreshes_total",
                "List store refreshes by resource and outcome",
            ),
            &["resource", "outcome"],
        )
        .expect("valid list_refreshes_total metric");

        let tracked_deliveries = IntGauge::new(
            "tracked_deliveries",
            "Deliveries with at least one live subscriber",
        )
        .expect("valid tracked_deliveries metric");

        registry
            .register(Box::new(upstream_requests_total.clone()))
            .expect("register upstream_requests_total");
        registry
            .register(Box::new(transitions_total.clone()))
            .expect("register transitions_total");
        registry
            .register(Box::new(tracking_updates_total.clone()))
            .expect("register tracking_updates_total");
        registry
            .register(Box::new(list_refreshes_total.clone()))
            .expect("register list_refreshes_total");
        registry
            .register(Box::new(tracked_deliveries.clone()))
            .expect("register tracked_deliveries");

        Self {
            registry,
            upstream_requests_total,
            transitions_total,
            tracking_updates_total,
            list_refreshes_total,
            tracked_deliveries,
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
