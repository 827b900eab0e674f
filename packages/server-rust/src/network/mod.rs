//! Service runtime: listeners, gateway plumbing, middleware, and shutdown control.

pub mod config;
pub mod gateway;
pub mod handlers;
pub mod middleware;
pub mod runtime;
pub mod shutdown;

pub use config::NetworkConfig;
pub use gateway::{forward, respond, GatewayError, GatewayResult, ListQuery};
pub use handlers::AppState;
pub use middleware::build_http_layers;
pub use runtime::{BoundAddrs, RuntimeError, ServiceRuntime};
pub use shutdown::{InFlightGuard, LifecycleState, ShutdownController};
