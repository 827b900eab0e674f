//! Process wiring: backend selection, stores, domain handlers, runtime.

use std::future::Future;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tonic::service::RoutesBuilder;
use tonic::transport::Channel;
use tracing::info;
use tracing::instrument::WithSubscriber;

use lastmile_core::{DriverProfile, RiderProfile, Station};

use crate::config::{BackendKind, ServerArgs, ServiceKind};
use crate::network::{BoundAddrs, RuntimeError, ServiceRuntime, ShutdownController};
use crate::observability::Telemetry;
use crate::readiness::ReadyResources;
use crate::service::domain::{station, user};
use crate::service::{StationServer, UserServer};
use crate::storage::clients::{connect_mongo, connect_redis};
use crate::storage::{Backend, MemoryBackend, MongoBackend, RedisBackend};

type GrpcRegistrar = Box<dyn FnOnce(&mut RoutesBuilder) + Send>;

/// One domain service assembled over a backend, ready to bind.
pub struct App {
    runtime: ServiceRuntime,
    register_grpc: GrpcRegistrar,
    register_gateway: fn(Channel) -> Router,
}

impl App {
    /// Builds the stores for `args.service` on `backend` and the runtime
    /// that will host them. Nothing is bound yet.
    #[must_use]
    pub fn new<B: Backend>(args: &ServerArgs, backend: &B, telemetry: Telemetry) -> Self {
        let ready = Arc::new(ReadyResources::new(
            backend.ready_resources(),
            args.probe_timeout,
        ));
        let (register_grpc, register_gateway): (GrpcRegistrar, fn(Channel) -> Router) =
            match args.service {
                ServiceKind::User => {
                    let handler = UserServer::new(
                        backend.store::<RiderProfile>(),
                        backend.store::<DriverProfile>(),
                    );
                    (
                        Box::new(move |routes: &mut RoutesBuilder| {
                            routes.add_service(handler.into_service());
                        }),
                        user::gateway_routes,
                    )
                }
                ServiceKind::Station => {
                    let handler = StationServer::new(backend.store::<Station>());
                    (
                        Box::new(move |routes: &mut RoutesBuilder| {
                            routes.add_service(handler.into_service());
                        }),
                        station::gateway_routes,
                    )
                }
            };

        tracing::dispatcher::with_default(telemetry.dispatch(), || {
            info!(
                service = args.service.as_str(),
                backend = backend.name(),
                resources = ready.len(),
                "service assembled"
            );
        });

        Self {
            runtime: ServiceRuntime::new(args.network_config(), telemetry, ready),
            register_grpc,
            register_gateway,
        }
    }

    /// Binds both listeners.
    ///
    /// # Errors
    ///
    /// See [`ServiceRuntime::start`].
    pub async fn start(&mut self) -> Result<BoundAddrs, RuntimeError> {
        self.runtime.start().await
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        self.runtime.shutdown_controller()
    }

    /// Serves until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// See [`ServiceRuntime::serve`].
    pub async fn serve<F>(self, shutdown: F) -> Result<(), RuntimeError>
    where
        F: Future<Output = ()>,
    {
        self.runtime
            .serve(self.register_grpc, self.register_gateway, shutdown)
            .await
    }
}

/// Connects the configured backend, then starts and serves the service
/// until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the backend cannot be reached, a listener cannot be
/// bound, or the runtime stops on a fatal error.
pub async fn run<F>(args: &ServerArgs, telemetry: Telemetry, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    let dispatch = telemetry.dispatch().clone();
    let app = connect(args, telemetry).with_subscriber(dispatch).await?;
    launch(app, shutdown).await
}

async fn connect(args: &ServerArgs, telemetry: Telemetry) -> anyhow::Result<App> {
    match args.store_backend {
        BackendKind::Memory => Ok(App::new(args, &MemoryBackend, telemetry)),
        BackendKind::Mongo => {
            let uri = args.mongo_uri.as_deref().context("mongo uri not set")?;
            let client = connect_mongo(uri, args.mongo_timeout).await?;
            info!(database = %args.mongo_database, "connected to mongo");
            let backend = MongoBackend::new(client, &args.mongo_database);
            Ok(App::new(args, &backend, telemetry))
        }
        BackendKind::Redis => {
            let addr = args.redis_addr.as_deref().context("redis address not set")?;
            let conn = connect_redis(
                addr,
                args.redis_password.as_deref(),
                args.redis_db,
                args.redis_timeout,
            )
            .await?;
            info!(addr, db = args.redis_db, "connected to redis");
            let backend = RedisBackend::new(conn, &args.redis_key_prefix);
            Ok(App::new(args, &backend, telemetry))
        }
    }
}

async fn launch<F>(mut app: App, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    app.start().await?;
    app.serve(shutdown).await?;
    Ok(())
}
