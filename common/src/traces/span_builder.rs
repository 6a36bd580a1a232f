use super::shapes::{Attribute, AttributeValue, Span};
use std::collections::HashMap;
use std::time::SystemTime;

/// https://opentelemetry.io/docs/specs/otel/trace/api/#spankind
#[derive(Debug, Clone, Copy)]
pub enum SpanKind {
    Internal = 0,
    Client = 3,
}

/// Fluent builder for OTEL-shaped spans.
pub struct SpanBuilder {
    name: String,
    trace_id: Option<String>,
    parent_span_id: Option<String>,
    start_time: SystemTime,
    end_time: Option<SystemTime>,
    kind: SpanKind,
    attributes: HashMap<String, String>,
    span_id: Option<String>,
}

impl SpanBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            trace_id: None,
            parent_span_id: None,
            start_time: SystemTime::now(),
            end_time: None,
            kind: SpanKind::Internal,
            attributes: HashMap::new(),
            span_id: None,
        }
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn with_span_id(mut self, span_id: impl Into<String>) -> Self {
        self.span_id = Some(span_id.into());
        self
    }

    pub fn with_parent_span_id(mut self, parent_span_id: impl Into<String>) -> Self {
        self.parent_span_id = Some(parent_span_id.into());
        self
    }

    pub fn with_kind(mut self, kind: SpanKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_start_time(mut self, start_time: SystemTime) -> Self {
        self.start_time = start_time;
        self
    }

    pub fn with_end_time(mut self, end_time: SystemTime) -> Self {
        self.end_time = Some(end_time);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> Span {
        let end_time = self.end_time.unwrap_or_else(SystemTime::now);
        let start_nanos = system_time_to_nanos(self.start_time);
        let end_nanos = system_time_to_nanos(end_time);
        let trace_id = self.trace_id.unwrap_or_else(generate_random_trace_id);

        let attributes: Vec<Attribute> = self
            .attributes
            .into_iter()
            .map(|(key, value)| Attribute {
                key,
                value: AttributeValue {
                    string_value: Some(value),
                },
            })
            .collect();

        Span {
            trace_id,
            span_id: self.span_id.unwrap_or_else(generate_random_span_id),
            parent_span_id: self.parent_span_id,
            name: self.name,
            start_time_unix_nano: format!("{start_nanos}"),
            end_time_unix_nano: format!("{end_nanos}"),
            kind: self.kind as u32,
            attributes,
            events: None,
        }
    }
}

fn system_time_to_nanos(time: SystemTime) -> u128 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos()
}

pub fn generate_random_span_id() -> String {
    use rand::RngCore;
    let mut rng = rand::thread_rng();
    let mut bytes = [0u8; 8];
    rng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn generate_random_trace_id() -> String {
    use rand::RngCore;
    let mut rng = rand::thread_rng();
    let mut bytes = [0u8; 16];
    rng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_span_with_explicit_ids() {
        let span = SpanBuilder::new("test_operation")
            .with_trace_id("abc123")
            .with_parent_span_id("parent123")
            .with_attribute("key", "value")
            .build();

        assert_eq!(span.name, "test_operation");
        assert_eq!(span.trace_id, "abc123");
        assert_eq!(span.parent_span_id, Some("parent123".to_string()));
        assert_eq!(span.attributes.len(), 1);
    }

    #[test]
    fn root_span_has_no_parent() {
        let span = SpanBuilder::new("root_span").with_trace_id("xyz789").build();
        assert_eq!(span.parent_span_id, None);
    }
}
