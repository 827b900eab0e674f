//! Readiness probing and shutdown release of backend clients.
//!
//! Each active backend client contributes one [`ReadyResource`]: a bounded
//! liveness ping used by `/readyz`, and a release hook run once at shutdown.
//! Absent backends contribute nothing, so a memory-only deployment is
//! trivially ready.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use mongodb::bson::doc;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use serde::Serialize;
use tracing::{info, warn};

/// A backend client that can be probed and released.
#[async_trait]
pub trait ReadyResource: Send + Sync {
    /// Name reported in readiness output and logs.
    fn name(&self) -> &'static str;

    /// One liveness round trip.
    async fn ping(&self) -> anyhow::Result<()>;

    /// Disconnects the client. Called at most once.
    async fn release(&self) -> anyhow::Result<()>;
}

/// Outcome of one probe.
///
/// `error` is for logs only and never serialized: driver errors can name
/// hosts and ports.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeResult {
    pub name: &'static str,
    pub ok: bool,
    #[serde(skip)]
    pub error: Option<String>,
}

/// Aggregated probe outcomes.
#[derive(Debug, Clone, Serialize)]
pub struct ReadinessReport {
    pub ready: bool,
    pub probes: Vec<ProbeResult>,
}

/// A resource whose release failed or timed out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseFailure {
    pub name: &'static str,
    pub error: String,
}

/// The set of resources registered at startup.
pub struct ReadyResources {
    resources: Vec<Arc<dyn ReadyResource>>,
    probe_timeout: Duration,
    released: AtomicBool,
}

impl ReadyResources {
    #[must_use]
    pub fn new(resources: Vec<Arc<dyn ReadyResource>>, probe_timeout: Duration) -> Self {
        for resource in &resources {
            info!(resource = resource.name(), "readiness probe enabled");
        }
        Self {
            resources,
            probe_timeout,
            released: AtomicBool::new(false),
        }
    }

    /// No resources: always ready, nothing to release.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Vec::new(), Duration::from_secs(1))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Runs every probe concurrently, each bounded by the probe timeout.
    ///
    /// The report is ready only if every probe succeeded.
    pub async fn check(&self) -> ReadinessReport {
        let timeout = self.probe_timeout;
        let probes = self.resources.iter().map(|resource| async move {
            let error = match tokio::time::timeout(timeout, resource.ping()).await {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(format!("{err:#}")),
                Err(_) => Some(format!("ping timed out after {timeout:?}")),
            };
            if let Some(error) = &error {
                warn!(resource = resource.name(), error = %error, "readiness probe failed");
            }
            ProbeResult {
                name: resource.name(),
                ok: error.is_none(),
                error,
            }
        });
        let probes = join_all(probes).await;
        ReadinessReport {
            ready: probes.iter().all(|probe| probe.ok),
            probes,
        }
    }

    /// Releases every resource in reverse registration order.
    ///
    /// Each release is bounded by `timeout`; failures are logged and
    /// returned, never propagated, and never stop the remaining releases.
    /// Only the first call does any work.
    pub async fn release_all(&self, timeout: Duration) -> Vec<ReleaseFailure> {
        if self.released.swap(true, Ordering::AcqRel) {
            return Vec::new();
        }

        let mut failures = Vec::new();
        for resource in self.resources.iter().rev() {
            let name = resource.name();
            let error = match tokio::time::timeout(timeout, resource.release()).await {
                Ok(Ok(())) => {
                    info!(resource = name, "released");
                    continue;
                }
                Ok(Err(err)) => format!("{err:#}"),
                Err(_) => format!("release timed out after {timeout:?}"),
            };
            warn!(resource = name, error = %error, "release failed");
            failures.push(ReleaseFailure { name, error });
        }
        failures
    }
}

// ---------------------------------------------------------------------------
// MongoResource
// ---------------------------------------------------------------------------

/// Document-store client probe.
pub struct MongoResource {
    client: mongodb::Client,
}

impl MongoResource {
    #[must_use]
    pub fn new(client: mongodb::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ReadyResource for MongoResource {
    fn name(&self) -> &'static str {
        "mongo"
    }

    async fn ping(&self) -> anyhow::Result<()> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await?;
        Ok(())
    }

    async fn release(&self) -> anyhow::Result<()> {
        self.client.clone().shutdown().await;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RedisResource
// ---------------------------------------------------------------------------

/// Cache connection probe. Release drops this resource's handle; the
/// connection closes once every store's clone is dropped too.
pub struct RedisResource {
    conn: Mutex<Option<ConnectionManager>>,
}

impl RedisResource {
    #[must_use]
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn: Mutex::new(Some(conn)),
        }
    }
}

#[async_trait]
impl ReadyResource for RedisResource {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn ping(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().clone();
        let Some(mut conn) = conn else {
            anyhow::bail!("redis connection released");
        };
        let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
        anyhow::ensure!(pong == "PONG", "unexpected ping reply {pong:?}");
        Ok(())
    }

    async fn release(&self) -> anyhow::Result<()> {
        drop(self.conn.lock().take());
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    /// Scriptable resource for aggregator and runtime tests.
    pub(crate) struct FakeResource {
        pub name: &'static str,
        pub healthy: AtomicBool,
        pub ping_delay: Duration,
        pub fail_release: bool,
        pub releases: AtomicUsize,
        pub release_log: Option<Arc<Mutex<Vec<&'static str>>>>,
    }

    impl FakeResource {
        pub(crate) fn healthy(name: &'static str) -> Self {
            Self {
                name,
                healthy: AtomicBool::new(true),
                ping_delay: Duration::ZERO,
                fail_release: false,
                releases: AtomicUsize::new(0),
                release_log: None,
            }
        }
    }

    #[async_trait]
    impl ReadyResource for FakeResource {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn ping(&self) -> anyhow::Result<()> {
            tokio::time::sleep(self.ping_delay).await;
            anyhow::ensure!(self.healthy.load(Ordering::SeqCst), "{} is down", self.name);
            Ok(())
        }

        async fn release(&self) -> anyhow::Result<()> {
            self.releases.fetch_add(1, Ordering::SeqCst);
            if let Some(log) = &self.release_log {
                log.lock().push(self.name);
            }
            anyhow::ensure!(!self.fail_release, "{} refused to close", self.name);
            Ok(())
        }
    }

    #[tokio::test]
    async fn no_resources_is_ready() {
        let resources = ReadyResources::empty();
        let report = resources.check().await;
        assert!(report.ready);
        assert!(report.probes.is_empty());
        assert!(resources.release_all(Duration::from_secs(1)).await.is_empty());
    }

    #[tokio::test]
    async fn one_failing_probe_marks_not_ready() {
        let down = FakeResource::healthy("redis");
        down.healthy.store(false, Ordering::SeqCst);
        let resources = ReadyResources::new(
            vec![Arc::new(FakeResource::healthy("mongo")), Arc::new(down)],
            Duration::from_secs(1),
        );

        let report = resources.check().await;
        assert!(!report.ready);
        assert!(report.probes[0].ok);
        assert!(!report.probes[1].ok);
        assert_eq!(report.probes[1].error.as_deref(), Some("redis is down"));
    }

    #[tokio::test]
    async fn slow_probe_times_out() {
        let mut slow = FakeResource::healthy("mongo");
        slow.ping_delay = Duration::from_secs(10);
        let resources = ReadyResources::new(vec![Arc::new(slow)], Duration::from_millis(20));

        let report = resources.check().await;
        assert!(!report.ready);
        assert!(report.probes[0]
            .error
            .as_deref()
            .unwrap()
            .starts_with("ping timed out"));
    }

    #[tokio::test]
    async fn release_runs_in_reverse_and_survives_failures() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut first = FakeResource::healthy("mongo");
        first.release_log = Some(Arc::clone(&log));
        let mut second = FakeResource::healthy("redis");
        second.fail_release = true;
        second.release_log = Some(Arc::clone(&log));

        let first = Arc::new(first);
        let resources = ReadyResources::new(
            vec![
                Arc::clone(&first) as Arc<dyn ReadyResource>,
                Arc::new(second),
            ],
            Duration::from_secs(1),
        );

        let failures = resources.release_all(Duration::from_secs(1)).await;
        assert_eq!(
            failures,
            vec![ReleaseFailure {
                name: "redis",
                error: "redis refused to close".to_string(),
            }]
        );
        assert_eq!(*log.lock(), vec!["redis", "mongo"]);

        // Second call is a no-op.
        assert!(resources.release_all(Duration::from_secs(1)).await.is_empty());
        assert_eq!(first.releases.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn report_never_serializes_probe_errors() {
        let report = ReadinessReport {
            ready: false,
            probes: vec![ProbeResult {
                name: "mongo",
                ok: false,
                error: Some("connection refused: 10.0.0.7:27017".to_string()),
            }],
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "ready": false,
                "probes": [{"name": "mongo", "ok": false}],
            })
        );
    }
}
