//! gRPC domain handlers and their REST gateway routes.
//!
//! 1. **Domain services** (`domain`): `UserService` and `StationService`
//!    handlers generic over their stores, plus gateway routes per service
//! 2. **Status translation** (`status`): `StoreError` -> `tonic::Status`
//! 3. **Ids** (`ids`): generated record ids for blank keys

pub mod domain;
pub mod ids;
pub mod status;

pub use domain::{StationServer, UserServer};
pub use ids::new_id;
pub use status::{call_context, store_status};
