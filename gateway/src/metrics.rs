//! Prometheus exposition contract (§4.10): the core only needs to call
//! these two hooks at the right lifecycle points (provider selection,
//! response emission). The actual exporter/registry is an external
//! collaborator per §1; this is a minimal in-process counter set good
//! enough to back `GET /metrics` when no external exporter is wired in.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub struct Metrics {
    requests_total: Mutex<HashMap<(String, u16), u64>>,
    selections_total: Mutex<HashMap<(String, String, String), u64>>,
    request_duration_ms_sum: Mutex<HashMap<String, f64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_request(&self, endpoint: &str, status: u16, duration: Duration) {
        *self
            .requests_total
            .lock()
            .unwrap()
            .entry((endpoint.to_string(), status))
            .or_insert(0) += 1;
        *self
            .request_duration_ms_sum
            .lock()
            .unwrap()
            .entry(endpoint.to_string())
            .or_insert(0.0) += duration.as_secs_f64() * 1000.0;
    }

    pub fn record_selection(&self, strategy: &str, model: &str, provider: &str) {
        *self
            .selections_total
            .lock()
            .unwrap()
            .entry((strategy.to_string(), model.to_string(), provider.to_string()))
            .or_insert(0) += 1;
    }

    /// Renders the accumulated counters as Prometheus text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str("# HELP gateway_requests_total Total requests by endpoint and status\n");
        out.push_str("# TYPE gateway_requests_total counter\n");
        for ((endpoint, status), count) in self.requests_total.lock().unwrap().iter() {
            out.push_str(&format!(
                "gateway_requests_total{{endpoint=\"{endpoint}\",status=\"{status}\"}} {count}\n"
            ));
        }

        out.push_str("# HELP gateway_selections_total Provider selections by strategy/model/provider\n");
        out.push_str("# TYPE gateway_selections_total counter\n");
        for ((strategy, model, provider), count) in self.selections_total.lock().unwrap().iter() {
            out.push_str(&format!(
                "gateway_selections_total{{strategy=\"{strategy}\",model=\"{model}\",provider=\"{provider}\"}} {count}\n"
            ));
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_recorded_counters() {
        let metrics = Metrics::new();
        metrics.record_request("/v1/chat/completions", 200, Duration::from_millis(12));
        metrics.record_selection("balanced", "m", "A");
        let rendered = metrics.render();
        assert!(rendered.contains("gateway_requests_total"));
        assert!(rendered.contains("gateway_selections_total"));
    }
}
