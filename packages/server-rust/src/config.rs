//! Process configuration from command-line flags with environment fallbacks.

use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::network::NetworkConfig;
use crate::observability::LogFormat;

/// Domain service hosted by this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ServiceKind {
    User,
    Station,
}

impl ServiceKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Station => "station",
        }
    }
}

/// Storage backend selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum BackendKind {
    #[default]
    Memory,
    Mongo,
    Redis,
}

impl BackendKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Mongo => "mongo",
            Self::Redis => "redis",
        }
    }
}

/// Command-line arguments of `lastmile-server`.
#[derive(Debug, Clone, Parser)]
#[command(name = "lastmile-server", version)]
#[command(about = "Serves one LastMile domain service over gRPC and a REST gateway")]
pub struct ServerArgs {
    #[arg(long, env = "SERVICE_NAME", value_enum)]
    pub service: ServiceKind,

    #[arg(long, env = "GRPC_LISTEN_ADDR", default_value = "0.0.0.0:9090")]
    pub grpc_listen: String,

    /// Address the gateway dials; derived from the bound gRPC listener when unset.
    #[arg(long, env = "GRPC_ENDPOINT")]
    pub grpc_endpoint: Option<String>,

    #[arg(long, env = "HTTP_ADDR", default_value = "0.0.0.0:8080")]
    pub http_addr: String,

    #[arg(long, env = "SHUTDOWN_GRACE", default_value = "5s", value_parser = parse_duration)]
    pub shutdown_grace: Duration,

    #[arg(long, env = "RELEASE_TIMEOUT", default_value = "5s", value_parser = parse_duration)]
    pub release_timeout: Duration,

    #[arg(long, env = "PROBE_TIMEOUT", default_value = "2s", value_parser = parse_duration)]
    pub probe_timeout: Duration,

    #[arg(long, env = "HTTP_REQUEST_TIMEOUT", default_value = "30s", value_parser = parse_duration)]
    pub request_timeout: Duration,

    #[arg(long, env = "STORE_BACKEND", value_enum, default_value = "memory")]
    pub store_backend: BackendKind,

    #[arg(long, env = "MONGO_URI", hide_env_values = true)]
    pub mongo_uri: Option<String>,

    #[arg(long, env = "MONGO_TIMEOUT", default_value = "10s", value_parser = parse_duration)]
    pub mongo_timeout: Duration,

    #[arg(long, env = "MONGO_DATABASE", default_value = "lastmile")]
    pub mongo_database: String,

    #[arg(long, env = "REDIS_ADDR")]
    pub redis_addr: Option<String>,

    #[arg(long, env = "REDIS_PASSWORD", hide_env_values = true)]
    pub redis_password: Option<String>,

    #[arg(long, env = "REDIS_DB", default_value_t = 0)]
    pub redis_db: i64,

    #[arg(long, env = "REDIS_TIMEOUT", default_value = "5s", value_parser = parse_duration)]
    pub redis_timeout: Duration,

    #[arg(long, env = "REDIS_KEY_PREFIX", default_value = "lastmile")]
    pub redis_key_prefix: String,

    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "json")]
    pub log_format: LogFormat,

    /// Accepted and reported; no exporter is wired.
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    pub otel_endpoint: Option<String>,
}

/// Every problem found in a [`ServerArgs`], reported together.
#[derive(Debug, thiserror::Error)]
#[error("invalid configuration: {}", .problems.join("; "))]
pub struct ConfigError {
    pub problems: Vec<String>,
}

impl ServerArgs {
    /// Checks the arguments before anything is bound or connected.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] listing every problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        for (flag, value) in [
            ("grpc-listen", &self.grpc_listen),
            ("http-addr", &self.http_addr),
            ("mongo-database", &self.mongo_database),
            ("redis-key-prefix", &self.redis_key_prefix),
        ] {
            if value.trim().is_empty() {
                problems.push(format!("--{flag} must not be empty"));
            }
        }

        for (flag, value) in [
            ("shutdown-grace", self.shutdown_grace),
            ("release-timeout", self.release_timeout),
            ("probe-timeout", self.probe_timeout),
            ("request-timeout", self.request_timeout),
            ("mongo-timeout", self.mongo_timeout),
            ("redis-timeout", self.redis_timeout),
        ] {
            if value.is_zero() {
                problems.push(format!("--{flag} must be greater than zero"));
            }
        }

        match self.store_backend {
            BackendKind::Mongo if is_blank(self.mongo_uri.as_deref()) => {
                problems.push("--mongo-uri is required for the mongo backend".to_string());
            }
            BackendKind::Redis if is_blank(self.redis_addr.as_deref()) => {
                problems.push("--redis-addr is required for the redis backend".to_string());
            }
            _ => {}
        }

        if self.redis_db < 0 {
            problems.push("--redis-db must not be negative".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError { problems })
        }
    }

    /// One-line summary for the startup log. Credentials are never included.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "service={} grpc_listen={} http_addr={} backend={} mongo_uri_set={} redis_addr_set={} \
             log_format={:?} otel_endpoint={}",
            self.service.as_str(),
            self.grpc_listen,
            self.http_addr,
            self.store_backend.as_str(),
            !is_blank(self.mongo_uri.as_deref()),
            !is_blank(self.redis_addr.as_deref()),
            self.log_format,
            self.otel_endpoint.as_deref().unwrap_or("none"),
        )
    }

    /// Runtime settings derived from these arguments.
    #[must_use]
    pub fn network_config(&self) -> NetworkConfig {
        NetworkConfig {
            grpc_listen: self.grpc_listen.clone(),
            grpc_endpoint: self.grpc_endpoint.clone(),
            http_addr: self.http_addr.clone(),
            shutdown_grace: self.shutdown_grace,
            release_timeout: self.release_timeout,
            request_timeout: self.request_timeout,
            ..NetworkConfig::default()
        }
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

/// Parses `250ms`, `5s`, `2m` or `1h`.
///
/// # Errors
///
/// Returns a message naming the bad input when the number or unit is invalid.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let value: u64 = digits
        .parse()
        .map_err(|_| format!("invalid duration {raw:?}"))?;
    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value.saturating_mul(60))),
        "h" => Ok(Duration::from_secs(value.saturating_mul(3600))),
        _ => Err(format!(
            "invalid duration {raw:?}: expected a ms, s, m or h suffix"
        )),
    }
}
