use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub api_requests_total: IntCounterVec,
    pub api_request_duration_seconds: HistogramVec,
    pub session_expiries_total: IntCounter,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let api_requests_total = IntCounterVec::new(
            Opts::new("api_requests_total", "Backend calls by operation and outcome"),
            &["operation", "outcome"],
        )
        .expect("valid api_requests_total metric");

        let api_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "api_request_duration_seconds",
                "Latency of backend calls in seconds",
            ),
            &["operation"],
        )
        .expect("valid api_request_duration_seconds metric");

        let session_expiries_total = IntCounter::new(
            "session_expiries_total",
            "Responses that ended the session (401/419)",
        )
        .expect("valid session_expiries_total metric");

        registry
            .register(Box::new(api_requests_total.clone()))
            .expect("register api_requests_total");
        registry
            .register(Box::new(api_request_duration_seconds.clone()))
            .expect("register api_request_duration_seconds");
        registry
            .register(Box::new(session_expiries_total.clone()))
            .expect("register session_expiries_total");

        Self {
            registry,
            api_requests_total,
            api_request_duration_seconds,
            session_expiries_total,
        }
    }

    pub fn record_call(&self, operation: &str, outcome: &str, elapsed_secs: f64) {
        self.api_requests_total
            .with_label_values(&[operation, outcome])
            .inc();
        self.api_request_duration_seconds
            .with_label_values(&[operation])
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

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::Metrics;

    #[test]
    fn recorded_calls_show_up_in_text_output() {
        let metrics = Metrics::new();
        metrics.record_call("fetch_driver_routes", "success", 0.02);
        metrics.session_expiries_total.inc();

        let body = metrics.encode().unwrap();
        assert!(body.contains("api_requests_total"));
        assert!(body.contains("fetch_driver_routes"));
        assert!(body.contains("session_expiries_total 1"));
    }
}
