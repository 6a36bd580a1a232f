//! Batches spans by service name and periodically ships them to an OTEL
//! collector over HTTP. Only compiled with the `trace-collection` feature so
//! that consumers who don't want an extra `tokio`/`reqwest` dependency don't
//! pay for it.

use super::resource_span_builder::ResourceSpanBuilder;
use super::shapes::Span;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const MAX_BATCH_SIZE: usize = 512;

pub struct TraceCollector {
    endpoint: String,
    client: reqwest::Client,
    batches: Arc<Mutex<HashMap<String, VecDeque<Span>>>>,
}

impl TraceCollector {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
            batches: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn record(&self, service_name: &str, span: Span) {
        let mut batches = self.batches.lock().await;
        let queue = batches.entry(service_name.to_string()).or_default();
        queue.push_back(span);
        while queue.len() > MAX_BATCH_SIZE {
            queue.pop_front();
        }
    }

    async fn flush_once(&self) {
        let drained: Vec<(String, Vec<Span>)> = {
            let mut batches = self.batches.lock().await;
            batches
                .iter_mut()
                .filter(|(_, q)| !q.is_empty())
                .map(|(name, q)| (name.clone(), q.drain(..).collect()))
                .collect()
        };

        for (service_name, spans) in drained {
            if spans.is_empty() {
                continue;
            }
            let resource_span = ResourceSpanBuilder::new(service_name.clone())
                .with_spans(spans)
                .build();
            let body = serde_json::json!({ "resourceSpans": [resource_span] });

            if let Err(err) = self
                .client
                .post(&self.endpoint)
                .json(&body)
                .send()
                .await
                .and_then(|r| r.error_for_status())
            {
                log::warn!("failed to flush {service_name} spans to {}: {err}", self.endpoint);
            }
        }
    }

    /// Spawns a background task that flushes every `interval` until the
    /// process exits. Mirrors a fire-and-forget sidecar exporter, not a
    /// supervised task — errors are logged, never propagated.
    pub fn start_background_flusher(self: Arc<Self>, interval: Duration) {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.flush_once().await;
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traces::span_builder::SpanBuilder;

    #[tokio::test]
    async fn record_and_drain_batches_by_service() {
        let collector = TraceCollector::new("http://localhost:4318/v1/traces");
        collector
            .record("gateway", SpanBuilder::new("chat").with_trace_id("t1").build())
            .await;
        collector
            .record("gateway", SpanBuilder::new("embed").with_trace_id("t1").build())
            .await;

        let batches = collector.batches.lock().await;
        assert_eq!(batches.get("gateway").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn batch_is_capped_at_max_size() {
        let collector = TraceCollector::new("http://localhost:4318/v1/traces");
        for i in 0..(MAX_BATCH_SIZE + 10) {
            collector
                .record("gateway", SpanBuilder::new(format!("op{i}")).with_trace_id("t1").build())
                .await;
        }
        let batches = collector.batches.lock().await;
        assert_eq!(batches.get("gateway").unwrap().len(), MAX_BATCH_SIZE);
    }
}
