//! Correlation, tracing, and per-call logging for both protocol surfaces.

pub mod correlation;
pub mod layer;
pub mod logger;
pub mod outcome;

pub use correlation::{REQUEST_ID_HEADER, TRACEPARENT_HEADER};
pub use layer::{ObservabilityLayer, ObservabilityService, Protocol};
pub use logger::{LogFormat, Telemetry};
pub use outcome::OutcomeClass;
