//! Per-call observability middleware shared by the gRPC and HTTP stacks.
//!
//! For every inbound call the layer:
//! 1. resolves the correlation id (caller header or a new UUID) and writes
//!    it back into the request's `x-request-id` header
//! 2. resolves the trace id (`traceparent` or a new random id, in which
//!    case a `traceparent` header is written so downstream hops inherit it)
//! 3. inserts a [`RequestContext`] into the request extensions, carrying the
//!    `grpc-timeout` deadline when present
//! 4. runs the inner service inside a `call` span under the explicit
//!    [`Telemetry`] dispatch, holding an in-flight guard
//! 5. echoes `x-request-id` on the response and emits exactly one
//!    `call completed` event with severity chosen from the outcome

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::extract::MatchedPath;
use http::{HeaderValue, Request, Response};
use tower::{Layer, Service};
use tracing::instrument::WithSubscriber;
use tracing::{field, Instrument};

use lastmile_core::RequestContext;

use super::correlation::{
    extract_correlation_id, grpc_timeout, new_correlation_id, new_trace_id,
    trace_id_from_traceparent, traceparent_for, REQUEST_ID_HEADER, TRACEPARENT_HEADER,
};
use super::logger::Telemetry;
use super::outcome::{grpc_code, OutcomeClass};
use crate::network::ShutdownController;

/// Which protocol stack a layer instance wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Grpc,
    Http,
}

impl Protocol {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Grpc => "grpc",
            Self::Http => "http",
        }
    }
}

// ---------------------------------------------------------------------------
// ObservabilityLayer
// ---------------------------------------------------------------------------

/// Tower layer installing [`ObservabilityService`] around a protocol stack.
#[derive(Debug, Clone)]
pub struct ObservabilityLayer {
    protocol: Protocol,
    telemetry: Telemetry,
    shutdown: Arc<ShutdownController>,
}

impl ObservabilityLayer {
    #[must_use]
    pub fn new(protocol: Protocol, telemetry: Telemetry, shutdown: Arc<ShutdownController>) -> Self {
        Self {
            protocol,
            telemetry,
            shutdown,
        }
    }
}

impl<S> Layer<S> for ObservabilityLayer {
    type Service = ObservabilityService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ObservabilityService {
            inner,
            protocol: self.protocol,
            telemetry: self.telemetry.clone(),
            shutdown: Arc::clone(&self.shutdown),
        }
    }
}

// ---------------------------------------------------------------------------
// ObservabilityService
// ---------------------------------------------------------------------------

/// Service wrapper applying correlation, tracing, and call logging.
#[derive(Debug, Clone)]
pub struct ObservabilityService<S> {
    inner: S,
    protocol: Protocol,
    telemetry: Telemetry,
    shutdown: Arc<ShutdownController>,
}

impl<S> ObservabilityService<S> {
    fn method_name<B>(&self, req: &Request<B>) -> String {
        match self.protocol {
            Protocol::Grpc => req.uri().path().to_string(),
            Protocol::Http => {
                let path = req
                    .extensions()
                    .get::<MatchedPath>()
                    .map_or_else(|| req.uri().path(), MatchedPath::as_str);
                format!("{} {}", req.method(), path)
            }
        }
    }
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for ObservabilityService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Send,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let started = Instant::now();
        let in_flight = self.shutdown.in_flight_guard();
        let protocol = self.protocol;
        let service = self.telemetry.service().to_string();

        let correlation_id =
            extract_correlation_id(req.headers()).unwrap_or_else(new_correlation_id);
        let inbound_trace = trace_id_from_traceparent(req.headers());
        let propagate_trace = inbound_trace.is_none();
        let trace_id = inbound_trace.unwrap_or_else(new_trace_id);
        let method = self.method_name(&req);

        let mut ctx = RequestContext::new(correlation_id.clone(), trace_id.clone())
            .with_method(method.clone());
        if protocol == Protocol::Grpc {
            if let Some(timeout) = grpc_timeout(req.headers()) {
                ctx = ctx.with_timeout(timeout);
            }
        }

        let header = HeaderValue::from_str(&correlation_id).ok();
        if let Some(value) = &header {
            req.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
        }
        if propagate_trace {
            if let Ok(value) = HeaderValue::from_str(&traceparent_for(&trace_id)) {
                req.headers_mut().insert(TRACEPARENT_HEADER, value);
            }
        }
        req.extensions_mut().insert(ctx);

        let dispatch = self.telemetry.dispatch().clone();
        let span = tracing::dispatcher::with_default(&dispatch, || {
            tracing::info_span!(
                "call",
                otel.name = %method,
                protocol = protocol.as_str(),
                method = %method,
                correlation_id = %correlation_id,
                trace_id = %trace_id,
                code = field::Empty,
            )
        });

        let fut = self.inner.call(req);

        Box::pin(
            async move {
                let result = fut.await;
                let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

                let (code, class) = match &result {
                    Ok(response) => match protocol {
                        Protocol::Grpc => {
                            let code = grpc_code(response.headers());
                            (format!("{code:?}"), OutcomeClass::from_grpc(code))
                        }
                        Protocol::Http => (
                            response.status().as_u16().to_string(),
                            OutcomeClass::from_http(response.status()),
                        ),
                    },
                    Err(_) => ("transport_error".to_string(), OutcomeClass::ServerFault),
                };
                tracing::Span::current().record("code", code.as_str());

                macro_rules! completed {
                    ($event:ident) => {
                        tracing::$event!(
                            correlation_id = %correlation_id,
                            trace_id = %trace_id,
                            protocol = protocol.as_str(),
                            method = %method,
                            code = %code,
                            duration_ms,
                            service = %service,
                            "call completed"
                        )
                    };
                }
                match class {
                    OutcomeClass::ServerFault => completed!(error),
                    OutcomeClass::ClientFault => completed!(warn),
                    OutcomeClass::Success => completed!(info),
                }

                drop(in_flight);
                result.map(|mut response| {
                    if let Some(value) = header {
                        response.headers_mut().insert(REQUEST_ID_HEADER, value);
                    }
                    response
                })
            }
            .instrument(span)
            .with_subscriber(dispatch),
        )
    }
}
