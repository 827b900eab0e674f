//! Logger construction and the explicit [`Telemetry`] handle.
//!
//! The subscriber is built into a [`Dispatch`] rather than installed behind
//! the caller's back. The binary installs it once as the global default; the
//! runtime and the observability layer receive the handle and run each call
//! under it.

use std::sync::Arc;

use anyhow::Context;
use tracing::Dispatch;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    /// One JSON object per line, event fields flattened to the top level.
    #[default]
    Json,
    /// Compact human-readable lines.
    Pretty,
}

/// Logging/tracing handle threaded through the runtime.
#[derive(Clone)]
pub struct Telemetry {
    service: Arc<str>,
    dispatch: Dispatch,
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

impl Telemetry {
    /// Builds a stdout logger. `RUST_LOG`, when set, overrides `level`.
    ///
    /// # Errors
    ///
    /// Returns an error if neither `RUST_LOG` nor `level` is a valid filter.
    pub fn from_env(service: &str, level: &str, format: LogFormat) -> anyhow::Result<Self> {
        let filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(level)
                .with_context(|| format!("invalid log level {level:?}"))?,
        };
        Ok(Self::build(service, filter, format, std::io::stdout))
    }

    /// Builds a logger writing to `writer` with an explicit filter directive.
    ///
    /// # Errors
    ///
    /// Returns an error if `directive` is not a valid filter.
    pub fn with_writer<W>(
        service: &str,
        directive: &str,
        format: LogFormat,
        writer: W,
    ) -> anyhow::Result<Self>
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let filter = EnvFilter::try_new(directive)
            .with_context(|| format!("invalid log filter {directive:?}"))?;
        Ok(Self::build(service, filter, format, writer))
    }

    /// A handle that discards everything.
    #[must_use]
    pub fn disabled(service: &str) -> Self {
        Self {
            service: Arc::from(service),
            dispatch: Dispatch::none(),
        }
    }

    fn build<W>(service: &str, filter: EnvFilter, format: LogFormat, writer: W) -> Self
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let output: Box<dyn Layer<Registry> + Send + Sync> = match format {
            LogFormat::Json => tracing_subscriber::fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false)
                .with_target(false)
                .with_writer(writer)
                .boxed(),
            LogFormat::Pretty => tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(writer)
                .boxed(),
        };

        let subscriber = tracing_subscriber::registry().with(output).with(filter);
        Self {
            service: Arc::from(service),
            dispatch: Dispatch::new(subscriber),
        }
    }

    /// Installs this handle as the process-wide default. Call once.
    ///
    /// # Errors
    ///
    /// Returns an error if a global default is already set.
    pub fn install_global(&self) -> anyhow::Result<()> {
        tracing::dispatcher::set_global_default(self.dispatch.clone())
            .context("global logger already installed")
    }

    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    #[must_use]
    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }
}
