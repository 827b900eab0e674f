//! Diagnostic HTTP handlers and their shared state.

pub mod health;

pub use health::{healthz_handler, readyz_handler};

use std::sync::Arc;
use std::time::Instant;

use super::ShutdownController;
use crate::readiness::ReadyResources;

/// Shared state passed to diagnostic handlers via `State` extraction.
///
/// Holds `Arc` references so cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    /// Lifecycle state and in-flight tracking.
    pub shutdown: Arc<ShutdownController>,
    /// Probes backing `/readyz`.
    pub ready: Arc<ReadyResources>,
    /// Runtime start time, used for uptime calculation.
    pub start_time: Instant,
}
