use super::constants::{resource, scope};
use super::shapes::{Attribute, AttributeValue, Resource, ResourceSpan, Scope, ScopeSpan, Span};

/// Fluent builder assembling the `Resource`/`Scope`/`ScopeSpan`/`ResourceSpan`
/// hierarchy the OTLP/HTTP JSON exporter expects.
pub struct ResourceSpanBuilder {
    service_name: String,
    service_version: String,
    scope_name: String,
    scope_version: String,
    spans: Vec<Span>,
}

impl ResourceSpanBuilder {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            scope_name: scope::DEFAULT_NAME.to_string(),
            scope_version: scope::DEFAULT_VERSION.to_string(),
            spans: Vec::new(),
        }
    }

    pub fn with_service_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = version.into();
        self
    }

    pub fn with_scope(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.scope_name = name.into();
        self.scope_version = version.into();
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.spans.push(span);
        self
    }

    pub fn with_spans(mut self, spans: impl IntoIterator<Item = Span>) -> Self {
        self.spans.extend(spans);
        self
    }

    pub fn build(self) -> ResourceSpan {
        ResourceSpan {
            resource: Resource {
                attributes: vec![
                    Attribute {
                        key: resource::SERVICE_NAME.to_string(),
                        value: AttributeValue {
                            string_value: Some(self.service_name),
                        },
                    },
                    Attribute {
                        key: resource::SERVICE_VERSION.to_string(),
                        value: AttributeValue {
                            string_value: Some(self.service_version),
                        },
                    },
                ],
            },
            scope_spans: vec![ScopeSpan {
                scope: Scope {
                    name: self.scope_name,
                    version: self.scope_version,
                    attributes: Vec::new(),
                },
                spans: self.spans,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traces::span_builder::SpanBuilder;

    #[test]
    fn builds_single_scope_span_hierarchy() {
        let span = SpanBuilder::new("op").with_trace_id("t1").build();
        let rs = ResourceSpanBuilder::new("llm-router")
            .with_span(span)
            .build();

        assert_eq!(rs.scope_spans.len(), 1);
        assert_eq!(rs.scope_spans[0].spans.len(), 1);
        assert!(rs
            .resource
            .attributes
            .iter()
            .any(|a| a.key == resource::SERVICE_NAME));
    }
}
