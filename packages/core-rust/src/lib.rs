//! `LastMile` Core: domain records, the storage contract, and its error taxonomy.

pub mod context;
pub mod error;
pub mod model;
pub mod page;
pub mod traits;

pub use context::RequestContext;
pub use error::{ErrorCode, StoreError};
pub use model::{validate_key, validate_required, DriverProfile, LatLng, Record, RiderProfile, Station};
pub use page::{next_offset, Page, PageRequest, PageToken};
pub use traits::{RecordStore, UpsertStore};
