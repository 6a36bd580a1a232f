//! Ambient stack and shared domain types for the gateway: error taxonomy,
//! the ordered-JSON request/response envelope, the model/provider catalog,
//! `api_type` routing tables, duration parsing, and OTEL span shapes.

pub mod api_types;
pub mod catalog;
pub mod duration;
pub mod envelope;
pub mod errors;
pub mod traces;

pub use api_types::{ApiType, HttpMethod, Operation};
pub use catalog::{Catalog, ModelEntry, ProviderSpec};
pub use duration::{parse_duration, parse_duration_secs};
pub use envelope::Envelope;
pub use errors::GatewayError;
