//! Outcome codes and their log severity.

use http::{HeaderMap, StatusCode};
use tonic::Code;

/// Who is at fault for a call's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeClass {
    Success,
    /// Bad input, missing or conflicting resource, or access refused. Logged at warn.
    ClientFault,
    /// Server-side failure. Logged at error.
    ServerFault,
}

impl OutcomeClass {
    #[must_use]
    pub fn from_grpc(code: Code) -> Self {
        match code {
            Code::Internal
            | Code::Unknown
            | Code::DataLoss
            | Code::Unavailable
            | Code::Unimplemented
            | Code::DeadlineExceeded => Self::ServerFault,
            Code::InvalidArgument
            | Code::NotFound
            | Code::AlreadyExists
            | Code::Unauthenticated
            | Code::PermissionDenied
            | Code::FailedPrecondition
            | Code::OutOfRange
            | Code::Aborted
            | Code::ResourceExhausted
            | Code::Cancelled => Self::ClientFault,
            _ => Self::Success,
        }
    }

    #[must_use]
    pub fn from_http(status: StatusCode) -> Self {
        if status.is_server_error() {
            Self::ServerFault
        } else if status.is_client_error() {
            Self::ClientFault
        } else {
            Self::Success
        }
    }
}

/// gRPC outcome of a response: the `grpc-status` header when present
/// (trailers-only error responses), otherwise `Ok`.
#[must_use]
pub fn grpc_code(headers: &HeaderMap) -> Code {
    headers
        .get("grpc-status")
        .map_or(Code::Ok, |value| Code::from_bytes(value.as_bytes()))
}
