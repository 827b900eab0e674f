//! `LastMile` service runtime: domain services served over gRPC (`tonic`) and
//! a REST gateway (`axum`), with pluggable storage backends, readiness
//! probes, and correlated per-call logging.

pub mod app;
pub mod config;
pub mod network;
pub mod observability;
pub mod proto;
pub mod readiness;
pub mod service;
pub mod storage;

pub use app::App;
pub use config::{BackendKind, ConfigError, ServerArgs, ServiceKind};
pub use network::{BoundAddrs, NetworkConfig, RuntimeError, ServiceRuntime};
pub use observability::Telemetry;
