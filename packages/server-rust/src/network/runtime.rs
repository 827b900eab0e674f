//! Dual-protocol service runtime with deferred startup.
//!
//! `new()` allocates shared state, `start()` binds both listeners, and
//! `serve()` runs the gRPC server and the HTTP gateway until shutdown:
//!
//! 1. gRPC: observability layer, health, reflection, then domain services
//! 2. HTTP: `/healthz`, `/readyz`, and the gateway routes, dialing the
//!    just-started gRPC listener over a lazy channel
//! 3. on the shutdown signal, or either listener exiting: stop accepting
//!    HTTP and give in-flight requests the grace period, then stop gRPC and
//!    wait for its calls, then release backend resources

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinError;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::service::RoutesBuilder;
use tonic::transport::{Channel, Endpoint, Server};
use tonic_health::ServingStatus;
use tracing::instrument::WithSubscriber;
use tracing::{error, info, warn};

use super::config::NetworkConfig;
use super::handlers::{healthz_handler, readyz_handler, AppState};
use super::middleware::build_http_layers;
use super::shutdown::ShutdownController;
use crate::observability::{ObservabilityLayer, Protocol, Telemetry};
use crate::proto::FILE_DESCRIPTOR_SET;
use crate::readiness::ReadyResources;

/// Failure to bring up or keep running the runtime.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("bind {surface} listener on {addr}: {source}")]
    Bind {
        surface: &'static str,
        addr: String,
        source: std::io::Error,
    },
    #[error("serve() called before start()")]
    NotStarted,
    #[error("build reflection service: {0}")]
    Reflection(#[from] tonic_reflection::server::Error),
    #[error("invalid gateway endpoint {endpoint}: {source}")]
    Gateway {
        endpoint: String,
        source: tonic::transport::Error,
    },
    #[error("{surface} server stopped: {reason:#}")]
    Serve {
        surface: &'static str,
        reason: anyhow::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Addresses the listeners actually bound, which differ from the
/// configured ones when port 0 is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundAddrs {
    pub grpc: SocketAddr,
    pub http: SocketAddr,
}

/// Owns both listeners and drives the `Created -> Listening -> Draining ->
/// Stopped` lifecycle.
pub struct ServiceRuntime {
    config: NetworkConfig,
    telemetry: Telemetry,
    ready: Arc<ReadyResources>,
    shutdown: Arc<ShutdownController>,
    listeners: Option<(TcpListener, TcpListener)>,
}

impl ServiceRuntime {
    /// Creates a runtime without binding any port.
    #[must_use]
    pub fn new(config: NetworkConfig, telemetry: Telemetry, ready: Arc<ReadyResources>) -> Self {
        Self {
            config,
            telemetry,
            ready,
            shutdown: Arc::new(ShutdownController::new()),
            listeners: None,
        }
    }

    /// Returns a shared reference to the lifecycle controller.
    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Binds the gRPC and HTTP listeners.
    ///
    /// On failure every registered resource is released before returning.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Bind`] if either address cannot be bound.
    pub async fn start(&mut self) -> Result<BoundAddrs, RuntimeError> {
        match self.bind_listeners().await {
            Ok((grpc, http, addrs)) => {
                self.listeners = Some((grpc, http));
                Ok(addrs)
            }
            Err(err) => {
                self.release_resources().await;
                Err(err)
            }
        }
    }

    async fn bind_listeners(&self) -> Result<(TcpListener, TcpListener, BoundAddrs), RuntimeError> {
        let grpc = bind("grpc", &self.config.grpc_listen).await?;
        let http = bind("http", &self.config.http_addr).await?;
        let addrs = BoundAddrs {
            grpc: grpc.local_addr()?,
            http: http.local_addr()?,
        };
        info!(
            service = self.telemetry.service(),
            grpc = %addrs.grpc,
            http = %addrs.http,
            "listeners bound"
        );
        Ok((grpc, http, addrs))
    }

    /// Serves both protocols until `shutdown` resolves or a listener fails,
    /// then drains in order and releases resources.
    ///
    /// `register_grpc` attaches domain services to the gRPC router;
    /// `register_gateway` builds the REST routes over a channel to that
    /// router.
    ///
    /// # Errors
    ///
    /// Returns an error if startup fails (resources are released first) or
    /// if either listener exited on its own. Release failures at shutdown
    /// are logged, not returned.
    pub async fn serve<G, H, F>(
        self,
        register_grpc: G,
        register_gateway: H,
        shutdown: F,
    ) -> Result<(), RuntimeError>
    where
        G: FnOnce(&mut RoutesBuilder),
        H: FnOnce(Channel) -> Router,
        F: Future<Output = ()>,
    {
        let dispatch = self.telemetry.dispatch().clone();
        self.run(register_grpc, register_gateway, shutdown)
            .with_subscriber(dispatch)
            .await
    }

    async fn run<G, H, F>(
        mut self,
        register_grpc: G,
        register_gateway: H,
        shutdown: F,
    ) -> Result<(), RuntimeError>
    where
        G: FnOnce(&mut RoutesBuilder),
        H: FnOnce(Channel) -> Router,
        F: Future<Output = ()>,
    {
        let Some((grpc_listener, http_listener)) = self.listeners.take() else {
            return Err(RuntimeError::NotStarted);
        };

        let prepared = prepare_listeners(grpc_listener, http_listener);
        let reflection = tonic_reflection::server::Builder::configure()
            .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
            .build_v1()
            .map_err(RuntimeError::from);
        let (grpc_addr, http_addr, grpc_listener, std_http, reflection) = match (prepared, reflection) {
            (Ok((grpc_addr, http_addr, grpc_listener, std_http)), Ok(reflection)) => {
                (grpc_addr, http_addr, grpc_listener, std_http, reflection)
            }
            (Err(err), _) | (_, Err(err)) => {
                self.release_resources().await;
                return Err(err);
            }
        };

        // --- gRPC ------------------------------------------------------------
        let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
        health_reporter
            .set_service_status("", ServingStatus::Serving)
            .await;

        let mut routes = RoutesBuilder::default();
        routes.add_service(health_service).add_service(reflection);
        register_grpc(&mut routes);

        let (grpc_stop, grpc_stop_rx) = oneshot::channel::<()>();
        let grpc_server = Server::builder()
            .layer(ObservabilityLayer::new(
                Protocol::Grpc,
                self.telemetry.clone(),
                Arc::clone(&self.shutdown),
            ))
            .add_routes(routes.routes())
            .serve_with_incoming_shutdown(TcpListenerStream::new(grpc_listener), async {
                let _ = grpc_stop_rx.await;
            });
        let mut grpc_task = tokio::spawn(grpc_server.with_current_subscriber());

        // --- Gateway ---------------------------------------------------------
        let endpoint = gateway_endpoint(self.config.grpc_endpoint.as_deref(), grpc_addr);
        let channel = match Endpoint::from_shared(endpoint.clone()) {
            Ok(ep) => ep
                .connect_timeout(self.config.gateway_connect_timeout)
                .connect_lazy(),
            Err(source) => {
                let _ = grpc_stop.send(());
                let _ = grpc_task.await;
                self.release_resources().await;
                return Err(RuntimeError::Gateway { endpoint, source });
            }
        };

        // --- HTTP ------------------------------------------------------------
        let state = AppState {
            shutdown: Arc::clone(&self.shutdown),
            ready: Arc::clone(&self.ready),
            start_time: Instant::now(),
        };
        let http_observability = ObservabilityLayer::new(
            Protocol::Http,
            self.telemetry.clone(),
            Arc::clone(&self.shutdown),
        );
        let app = Router::new()
            .route("/healthz", get(healthz_handler))
            .route("/readyz", get(readyz_handler))
            .with_state(state)
            .merge(register_gateway(channel))
            .layer(build_http_layers(&self.config, http_observability));

        let http_handle = axum_server::Handle::new();
        let http_server = axum_server::from_tcp(std_http)
            .handle(http_handle.clone())
            .serve(app.into_make_service());
        let mut http_task = tokio::spawn(http_server.with_current_subscriber());

        self.shutdown.set_listening();
        info!(grpc = %grpc_addr, http = %http_addr, gateway = %endpoint, "listening");

        // --- Wait for a trigger ----------------------------------------------
        tokio::pin!(shutdown);
        let (fatal, grpc_exited, http_exited) = tokio::select! {
            () = &mut shutdown => {
                info!("shutdown signal received");
                (None, false, false)
            }
            joined = &mut grpc_task => (Some(exit_error("grpc", joined)), true, false),
            joined = &mut http_task => (Some(exit_error("http", joined)), false, true),
        };
        if let Some(err) = &fatal {
            error!(error = %err, "listener failed, shutting down");
        }

        // --- Drain -----------------------------------------------------------
        self.shutdown.begin_draining();
        health_reporter
            .set_service_status("", ServingStatus::NotServing)
            .await;

        let grace = self.config.shutdown_grace;
        http_handle.graceful_shutdown(Some(grace));
        if !http_exited {
            match tokio::time::timeout(grace + Duration::from_secs(1), &mut http_task).await {
                Ok(Ok(Ok(()))) => info!("http drained"),
                Ok(joined) => warn!(error = %exit_error("http", joined), "http drain failed"),
                Err(_) => {
                    warn!(?grace, "http drain exceeded grace period, aborting");
                    http_task.abort();
                }
            }
        }

        let _ = grpc_stop.send(());
        if !grpc_exited {
            match grpc_task.await {
                Ok(Ok(())) => info!("grpc drained"),
                joined => warn!(error = %exit_error("grpc", joined), "grpc drain failed"),
            }
        }
        if !self.shutdown.wait_for_drain(Duration::from_millis(250)).await {
            warn!(
                in_flight = self.shutdown.in_flight_count(),
                "calls still in flight after listeners closed"
            );
        }

        // --- Release ---------------------------------------------------------
        self.release_resources().await;
        self.shutdown.set_stopped();
        info!(in_flight = self.shutdown.in_flight_count(), "stopped");

        fatal.map_or(Ok(()), Err)
    }

    async fn release_resources(&self) {
        let failures = self.ready.release_all(self.config.release_timeout).await;
        if !failures.is_empty() {
            warn!(failed = failures.len(), "some resources failed to release");
        }
    }
}

async fn bind(surface: &'static str, addr: &str) -> Result<TcpListener, RuntimeError> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| RuntimeError::Bind {
            surface,
            addr: addr.to_string(),
            source,
        })
}

type Prepared = (SocketAddr, SocketAddr, TcpListener, std::net::TcpListener);

fn prepare_listeners(grpc: TcpListener, http: TcpListener) -> Result<Prepared, RuntimeError> {
    let grpc_addr = grpc.local_addr()?;
    let http_addr = http.local_addr()?;
    Ok((grpc_addr, http_addr, grpc, http.into_std()?))
}

/// URI the gateway dials: the configured endpoint, or the bound gRPC
/// address with an unspecified IP replaced by loopback.
fn gateway_endpoint(configured: Option<&str>, bound: SocketAddr) -> String {
    match configured.map(str::trim).filter(|ep| !ep.is_empty()) {
        Some(ep) if ep.contains("://") => ep.to_string(),
        Some(ep) => format!("http://{ep}"),
        None => {
            let ip = match bound.ip() {
                IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
                IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
                ip => ip,
            };
            format!("http://{}", SocketAddr::new(ip, bound.port()))
        }
    }
}

fn exit_error<E>(surface: &'static str, joined: Result<Result<(), E>, JoinError>) -> RuntimeError
where
    E: Into<anyhow::Error>,
{
    let reason = match joined {
        Ok(Ok(())) => anyhow::anyhow!("exited unexpectedly"),
        Ok(Err(err)) => err.into(),
        Err(join) => join.into(),
    };
    RuntimeError::Serve { surface, reason }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use tonic_health::pb::health_check_response::ServingStatus as WireStatus;
    use tonic_health::pb::health_client::HealthClient;
    use tonic_health::pb::HealthCheckRequest;

    use super::*;
    use crate::readiness::tests::FakeResource;
    use crate::readiness::ReadyResource;

    fn runtime_with(resources: Vec<Arc<dyn ReadyResource>>) -> ServiceRuntime {
        ServiceRuntime::new(
            NetworkConfig::ephemeral(),
            Telemetry::disabled("test"),
            Arc::new(ReadyResources::new(resources, Duration::from_millis(200))),
        )
    }

    #[test]
    fn endpoint_derivation() {
        let bound: SocketAddr = "0.0.0.0:9090".parse().unwrap();
        assert_eq!(gateway_endpoint(None, bound), "http://127.0.0.1:9090");
        assert_eq!(gateway_endpoint(Some("  "), bound), "http://127.0.0.1:9090");
        assert_eq!(gateway_endpoint(Some("user:9090"), bound), "http://user:9090");
        assert_eq!(
            gateway_endpoint(Some("http://user:9090"), bound),
            "http://user:9090"
        );

        let v6: SocketAddr = "[::]:7000".parse().unwrap();
        assert_eq!(gateway_endpoint(None, v6), "http://[::1]:7000");
    }

    #[tokio::test]
    async fn start_binds_to_os_assigned_ports() {
        let mut runtime = runtime_with(Vec::new());
        let addrs = runtime.start().await.unwrap();
        assert!(addrs.grpc.port() > 0);
        assert!(addrs.http.port() > 0);
        assert_ne!(addrs.grpc, addrs.http);
    }

    #[tokio::test]
    async fn serve_without_start_fails() {
        let runtime = runtime_with(Vec::new());
        let result = runtime
            .serve(|_| {}, |_| Router::new(), std::future::ready(()))
            .await;
        assert!(matches!(result, Err(RuntimeError::NotStarted)));
    }

    #[tokio::test]
    async fn bind_failure_releases_resources() {
        let occupied = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let resource = Arc::new(FakeResource::healthy("mongo"));
        let mut runtime = ServiceRuntime::new(
            NetworkConfig {
                http_addr: occupied.local_addr().unwrap().to_string(),
                ..NetworkConfig::ephemeral()
            },
            Telemetry::disabled("test"),
            Arc::new(ReadyResources::new(
                vec![Arc::clone(&resource) as Arc<dyn ReadyResource>],
                Duration::from_secs(1),
            )),
        );

        let err = runtime.start().await.unwrap_err();
        assert!(matches!(err, RuntimeError::Bind { surface: "http", .. }));
        assert_eq!(resource.releases.load(Ordering::SeqCst), 1);
        assert_eq!(
            runtime.shutdown_controller().state(),
            crate::network::LifecycleState::Created
        );
    }

    #[tokio::test]
    async fn lifecycle_serves_probes_and_releases_on_shutdown() {
        let resource = Arc::new(FakeResource::healthy("redis"));
        let mut runtime = runtime_with(vec![Arc::clone(&resource) as Arc<dyn ReadyResource>]);
        let addrs = runtime.start().await.unwrap();
        let controller = runtime.shutdown_controller();

        let (stop, stopped) = oneshot::channel::<()>();
        let serving = tokio::spawn(runtime.serve(|_| {}, |_| Router::new(), async {
            let _ = stopped.await;
        }));

        let http = reqwest::Client::new();
        let base = format!("http://{}", addrs.http);
        let mut healthz = None;
        for _ in 0..50 {
            if let Ok(response) = http.get(format!("{base}/healthz")).send().await {
                if response.status() == reqwest::StatusCode::OK {
                    healthz = Some(response);
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let healthz = healthz.expect("healthz never became available");
        assert!(healthz.headers().contains_key("x-request-id"));
        let body: serde_json::Value = healthz.json().await.unwrap();
        assert_eq!(body["state"], "listening");

        let readyz = http.get(format!("{base}/readyz")).send().await.unwrap();
        assert_eq!(readyz.status(), reqwest::StatusCode::OK);

        resource.healthy.store(false, Ordering::SeqCst);
        let readyz = http.get(format!("{base}/readyz")).send().await.unwrap();
        assert_eq!(readyz.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

        let mut health = HealthClient::new(
            Endpoint::new(format!("http://{}", addrs.grpc))
                .unwrap()
                .connect()
                .await
                .unwrap(),
        );
        let reply = health
            .check(HealthCheckRequest {
                service: String::new(),
            })
            .await
            .unwrap();
        assert_eq!(reply.into_inner().status(), WireStatus::Serving);

        stop.send(()).unwrap();
        serving.await.unwrap().unwrap();

        assert_eq!(controller.state(), crate::network::LifecycleState::Stopped);
        assert_eq!(resource.releases.load(Ordering::SeqCst), 1);
        assert!(reqwest::Client::new()
            .get(format!("{base}/healthz"))
            .send()
            .await
            .is_err());
    }

    #[tokio::test]
    async fn in_flight_http_request_finishes_during_drain() {
        let mut runtime = runtime_with(Vec::new());
        let addrs = runtime.start().await.unwrap();

        let (stop, stopped) = oneshot::channel::<()>();
        let gateway = |_channel: Channel| {
            Router::new().route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    "done"
                }),
            )
        };
        let serving = tokio::spawn(runtime.serve(|_| {}, gateway, async {
            let _ = stopped.await;
        }));

        let base = format!("http://{}", addrs.http);
        let client = reqwest::Client::new();
        for _ in 0..50 {
            if client.get(format!("{base}/healthz")).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let slow = tokio::spawn(async move { client.get(format!("{base}/slow")).send().await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.send(()).unwrap();

        let response = slow.await.unwrap().unwrap();
        assert_eq!(response.text().await.unwrap(), "done");
        serving.await.unwrap().unwrap();
    }
}
