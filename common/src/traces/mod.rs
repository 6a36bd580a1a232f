//! OpenTelemetry-shaped span construction and (optionally) collection. The
//! shapes and builders here have no HTTP-server dependency; only
//! [`collector`] reaches out over the network, and it's feature-gated.

pub mod constants;
pub mod resource_span_builder;
pub mod shapes;
pub mod span_builder;

#[cfg(feature = "trace-collection")]
pub mod collector;

pub use resource_span_builder::ResourceSpanBuilder;
pub use shapes::{parse_traceparent, Attribute, AttributeValue, Event, ResourceSpan, Span, Traceparent};
pub use span_builder::{SpanBuilder, SpanKind};

#[cfg(feature = "trace-collection")]
pub use collector::TraceCollector;
