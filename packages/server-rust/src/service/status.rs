//! Translation of store failures into gRPC statuses.

use lastmile_core::{RequestContext, StoreError};
use tonic::Status;
use tracing::error;

/// Maps a [`StoreError`] onto the gRPC code of the same meaning.
///
/// Internal failures are logged in full and surfaced with a generic message;
/// backend details never reach the caller.
#[must_use]
pub fn store_status(err: StoreError) -> Status {
    match err {
        StoreError::InvalidArgument(message) => Status::invalid_argument(message),
        StoreError::NotFound { entity, .. } => Status::not_found(format!("{entity} not found")),
        StoreError::AlreadyExists { entity, .. } => {
            Status::already_exists(format!("{entity} already exists"))
        }
        StoreError::Internal(err) => {
            error!(error = format!("{err:#}"), "storage failure");
            Status::internal("storage error")
        }
    }
}

/// Returns the context the observability layer attached to this call, or an
/// empty one when the handler is driven directly.
#[must_use]
pub fn call_context<T>(request: &tonic::Request<T>) -> RequestContext {
    request
        .extensions()
        .get::<RequestContext>()
        .cloned()
        .unwrap_or_default()
}
