//! Domain records persisted by the storage backends.
//!
//! Records are flat, owned values: every store hands out clones, so a caller
//! mutating a returned record can never reach store-internal state.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// A persistable domain record identified by a string key.
///
/// Implemented by each entity type. The associated constants drive the
/// persisted layout: `ENTITY` names the cache key segment and `COLLECTION`
/// names the document collection and the cache enumeration index.
pub trait Record:
    Clone + std::fmt::Debug + Send + Sync + Unpin + Serialize + DeserializeOwned + 'static
{
    /// Singular entity name, e.g. `"rider"`.
    const ENTITY: &'static str;
    /// Plural collection name, e.g. `"riders"`.
    const COLLECTION: &'static str;

    /// The record's primary key.
    fn id(&self) -> &str;

    /// `(field name, value)` pairs that must be non-blank for creation.
    fn required_fields(&self) -> Vec<(&'static str, &str)>;

    /// Validates the key and every required field.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidArgument`] naming the first blank field.
    fn validate(&self) -> Result<(), StoreError> {
        validate_required(self)
    }
}

/// Checks the key and every [`Record::required_fields`] entry.
///
/// # Errors
///
/// Returns [`StoreError::InvalidArgument`] for an empty key or naming the
/// first blank field.
pub fn validate_required<R: Record>(record: &R) -> Result<(), StoreError> {
    validate_key::<R>(record.id())?;
    for (field, value) in record.required_fields() {
        if value.trim().is_empty() {
            return Err(StoreError::invalid(format!("{field} is required")));
        }
    }
    Ok(())
}

/// Rejects an empty entity key.
///
/// # Errors
///
/// Returns [`StoreError::InvalidArgument`] when `id` is empty.
pub fn validate_key<R: Record>(id: &str) -> Result<(), StoreError> {
    if id.is_empty() {
        return Err(StoreError::invalid(format!("{} id is required", R::ENTITY)));
    }
    Ok(())
}

/// Rider account profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiderProfile {
    pub rider_id: String,
    pub name: String,
    pub phone: String,
}

impl Record for RiderProfile {
    const ENTITY: &'static str = "rider";
    const COLLECTION: &'static str = "riders";

    fn id(&self) -> &str {
        &self.rider_id
    }

    fn required_fields(&self) -> Vec<(&'static str, &str)> {
        vec![("name", &self.name), ("phone", &self.phone)]
    }
}

/// Driver account profile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverProfile {
    pub driver_id: String,
    pub name: String,
    pub phone: String,
    pub vehicle_id: String,
}

impl Record for DriverProfile {
    const ENTITY: &'static str = "driver";
    const COLLECTION: &'static str = "drivers";

    fn id(&self) -> &str {
        &self.driver_id
    }

    fn required_fields(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("name", &self.name),
            ("phone", &self.phone),
            ("vehicle_id", &self.vehicle_id),
        ]
    }
}

/// WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub latitude: f64,
    pub longitude: f64,
}

impl LatLng {
    /// Checks that both coordinates are finite and within range.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidArgument`] for NaN or infinite values,
    /// latitude outside `[-90, 90]`, or longitude outside `[-180, 180]`.
    pub fn validate(&self) -> Result<(), StoreError> {
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return Err(StoreError::invalid("location has invalid coordinates"));
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(StoreError::invalid("latitude out of range"));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(StoreError::invalid("longitude out of range"));
        }
        Ok(())
    }
}

/// Pickup/drop-off station with its adjacent service areas.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Station {
    pub station_id: String,
    pub name: String,
    pub location: Option<LatLng>,
    #[serde(default)]
    pub nearby_area_ids: Vec<String>,
}

impl Record for Station {
    const ENTITY: &'static str = "station";
    const COLLECTION: &'static str = "stations";

    fn id(&self) -> &str {
        &self.station_id
    }

    fn required_fields(&self) -> Vec<(&'static str, &str)> {
        vec![("name", &self.name)]
    }

    fn validate(&self) -> Result<(), StoreError> {
        validate_required(self)?;
        match &self.location {
            Some(location) => location.validate(),
            None => Err(StoreError::invalid("location is required")),
        }
    }
}
