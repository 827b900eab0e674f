//! REST-to-gRPC translation plumbing shared by every service's gateway routes.
//!
//! The gateway is a pure protocol translator: each route decodes JSON or
//! query input, forwards one call over the runtime's own gRPC channel, and
//! renders either the JSON response or a `{"code", "message"}` error body
//! whose HTTP status is derived mechanically from the gRPC code.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tonic::metadata::MetadataValue;
use tonic::{Code, Status};
use tracing::error;

use crate::observability::{REQUEST_ID_HEADER, TRACEPARENT_HEADER};

/// HTTP status for a gRPC code, per the grpc-gateway mapping.
#[must_use]
pub fn http_status(code: Code) -> StatusCode {
    match code {
        Code::Ok => StatusCode::OK,
        Code::InvalidArgument | Code::FailedPrecondition | Code::OutOfRange => {
            StatusCode::BAD_REQUEST
        }
        Code::Unauthenticated => StatusCode::UNAUTHORIZED,
        Code::PermissionDenied => StatusCode::FORBIDDEN,
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::AlreadyExists | Code::Aborted => StatusCode::CONFLICT,
        Code::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
        // 499 Client Closed Request has no named constant.
        Code::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
        Code::Unimplemented => StatusCode::NOT_IMPLEMENTED,
        Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// JSON error body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: i32,
    pub message: String,
}

/// A gRPC status rendered as an HTTP error response.
#[derive(Debug)]
pub struct GatewayError(pub Status);

impl GatewayError {
    pub fn invalid(message: impl Into<String>) -> Self {
        Self(Status::invalid_argument(message))
    }
}

impl From<Status> for GatewayError {
    fn from(status: Status) -> Self {
        Self(status)
    }
}

impl From<JsonRejection> for GatewayError {
    fn from(rejection: JsonRejection) -> Self {
        Self::invalid(rejection.body_text())
    }
}

impl From<QueryRejection> for GatewayError {
    fn from(rejection: QueryRejection) -> Self {
        Self::invalid(rejection.body_text())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let code = self.0.code();
        let body = ErrorBody {
            code: code as i32,
            message: self.0.message().to_string(),
        };
        (http_status(code), Json(body)).into_response()
    }
}

/// Result type of gateway route handlers.
pub type GatewayResult<T> = Result<Json<T>, GatewayError>;

/// Query parameters of list routes. Accepts proto and JSON field names.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default, alias = "pageSize")]
    pub page_size: Option<i32>,
    #[serde(default, alias = "pageToken")]
    pub page_token: Option<String>,
}

/// Wraps `message` for the gRPC hop, carrying over the call's correlation id
/// and trace context so both log lines of the call share them.
#[must_use]
pub fn forward<T>(headers: &HeaderMap, message: T) -> tonic::Request<T> {
    let mut request = tonic::Request::new(message);
    for name in [REQUEST_ID_HEADER, TRACEPARENT_HEADER] {
        let value = headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| MetadataValue::try_from(value).ok());
        if let Some(value) = value {
            request.metadata_mut().insert(name, value);
        }
    }
    request
}

/// Unwraps a gRPC response into the JSON gateway response.
///
/// # Errors
///
/// Passes a domain status through as a [`GatewayError`]. A failure of the
/// gRPC hop itself is logged and surfaces as `Internal`.
pub fn respond<T>(result: Result<tonic::Response<T>, Status>) -> GatewayResult<T> {
    result
        .map(|response| Json(response.into_inner()))
        .map_err(|status| GatewayError(upstream_status(status)))
}

/// Keeps statuses produced by the service handlers. Anything else came from
/// the client side of the hop and is collapsed into `Internal`.
fn upstream_status(status: Status) -> Status {
    let domain = matches!(
        status.code(),
        Code::InvalidArgument | Code::NotFound | Code::AlreadyExists | Code::Internal
    );
    if domain && !is_transport_fault(&status) {
        return status;
    }
    error!(
        transport_fault = true,
        code = ?status.code(),
        detail = %status,
        "gateway call failed"
    );
    Status::internal("internal error")
}

fn is_transport_fault(status: &Status) -> bool {
    std::error::Error::source(status)
        .is_some_and(|source| source.downcast_ref::<tonic::transport::Error>().is_some())
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn status_table() {
        assert_eq!(http_status(Code::InvalidArgument), StatusCode::BAD_REQUEST);
        assert_eq!(http_status(Code::OutOfRange), StatusCode::BAD_REQUEST);
        assert_eq!(http_status(Code::Unauthenticated), StatusCode::UNAUTHORIZED);
        assert_eq!(http_status(Code::PermissionDenied), StatusCode::FORBIDDEN);
        assert_eq!(http_status(Code::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(http_status(Code::AlreadyExists), StatusCode::CONFLICT);
        assert_eq!(http_status(Code::Aborted), StatusCode::CONFLICT);
        assert_eq!(http_status(Code::ResourceExhausted), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(http_status(Code::Cancelled).as_u16(), 499);
        assert_eq!(http_status(Code::Unimplemented), StatusCode::NOT_IMPLEMENTED);
        assert_eq!(http_status(Code::Unavailable), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(http_status(Code::DeadlineExceeded), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(http_status(Code::Internal), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(http_status(Code::DataLoss), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn error_body_carries_numeric_code() {
        let response = GatewayError(Status::already_exists("rider already exists")).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.code, 6);
        assert_eq!(body.message, "rider already exists");
    }

    #[test]
    fn respond_keeps_domain_statuses() {
        let err = respond::<()>(Err(Status::not_found("rider not found"))).unwrap_err();
        assert_eq!(err.0.code(), Code::NotFound);
        assert_eq!(err.0.message(), "rider not found");

        let err = respond::<()>(Err(Status::internal("storage error"))).unwrap_err();
        assert_eq!(err.0.code(), Code::Internal);
        assert_eq!(err.0.message(), "storage error");
    }

    #[test]
    fn respond_collapses_hop_failures_to_internal() {
        for status in [
            Status::unavailable("tcp connect error"),
            Status::unknown("connection reset"),
            Status::cancelled("h2 protocol error"),
            Status::deadline_exceeded("timeout expired"),
        ] {
            let err = respond::<()>(Err(status)).unwrap_err();
            assert_eq!(err.0.code(), Code::Internal);
            assert_eq!(err.0.message(), "internal error");
        }
    }

    #[test]
    fn forward_copies_correlation_and_trace_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", HeaderValue::from_static("req-7"));
        headers.insert(
            "traceparent",
            HeaderValue::from_static("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"),
        );
        headers.insert("authorization", HeaderValue::from_static("secret"));

        let request = forward(&headers, ());
        assert_eq!(
            request.metadata().get("x-request-id").unwrap().to_str().unwrap(),
            "req-7"
        );
        assert!(request.metadata().get("traceparent").is_some());
        assert!(request.metadata().get("authorization").is_none());
    }
}
