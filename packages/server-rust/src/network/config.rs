//! Network configuration for the service runtime.

use std::time::Duration;

/// Listen addresses and lifecycle timeouts for both protocol surfaces.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// gRPC bind address. Port 0 means OS-assigned.
    pub grpc_listen: String,
    /// Address the gateway dials. Derived from the bound gRPC address when unset.
    pub grpc_endpoint: Option<String>,
    /// HTTP bind address for the gateway and diagnostics.
    pub http_addr: String,
    /// How long in-flight HTTP requests may run after shutdown begins.
    pub shutdown_grace: Duration,
    /// Upper bound for each backend release at shutdown.
    pub release_timeout: Duration,
    /// Maximum time for one HTTP request.
    pub request_timeout: Duration,
    /// Connect timeout of the gateway's channel to the gRPC server.
    pub gateway_connect_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            grpc_listen: "0.0.0.0:9090".to_string(),
            grpc_endpoint: None,
            http_addr: "0.0.0.0:8080".to_string(),
            shutdown_grace: Duration::from_secs(5),
            release_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(30),
            gateway_connect_timeout: Duration::from_secs(5),
        }
    }
}

impl NetworkConfig {
    /// Loopback listeners on OS-assigned ports with short timeouts.
    #[must_use]
    pub fn ephemeral() -> Self {
        Self {
            grpc_listen: "127.0.0.1:0".to_string(),
            http_addr: "127.0.0.1:0".to_string(),
            shutdown_grace: Duration::from_secs(1),
            release_timeout: Duration::from_secs(1),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_config_defaults() {
        let config = NetworkConfig::default();
        assert_eq!(config.grpc_listen, "0.0.0.0:9090");
        assert_eq!(config.http_addr, "0.0.0.0:8080");
        assert!(config.grpc_endpoint.is_none());
        assert_eq!(config.shutdown_grace, Duration::from_secs(5));
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn ephemeral_binds_loopback_port_zero() {
        let config = NetworkConfig::ephemeral();
        assert_eq!(config.grpc_listen, "127.0.0.1:0");
        assert_eq!(config.http_addr, "127.0.0.1:0");
    }
}
