//! HTTP middleware stack for the gateway and diagnostic routes.
//!
//! Layers are listed outermost first: the first layer sees the request
//! first on the way in and the response last on the way out.

use axum::http::StatusCode;
use tower::layer::util::{Identity, Stack};
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;

use super::config::NetworkConfig;
use crate::observability::ObservabilityLayer;

/// The composed layer type produced by [`build_http_layers`].
pub type HttpLayers = Stack<TimeoutLayer, Stack<ObservabilityLayer, Identity>>;

/// Builds the HTTP middleware stack.
///
/// 1. `Observability` -- correlation id, span, one log line per call
/// 2. `Timeout` -- answers 504 when a request exceeds `request_timeout`
///
/// The timeout sits inside the observability layer so that timed-out
/// requests are still logged with their final status.
#[must_use]
pub fn build_http_layers(config: &NetworkConfig, observability: ObservabilityLayer) -> HttpLayers {
    ServiceBuilder::new()
        .layer(observability)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::GATEWAY_TIMEOUT,
            config.request_timeout,
        ))
        .into_inner()
}
