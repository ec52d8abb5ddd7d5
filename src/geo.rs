//! Geospatial filter
//!
//! Two pure predicates over building coordinates:
//!
//! - **Radius**: great-circle distance by the spherical law of cosines,
//!   `d = R · acos(sin φ0 · sin φ + cos φ0 · cos φ · cos(λ − λ0))`, with the
//!   cosine term clamped to `[-1, 1]` before `acos`. Membership is `d <= r`.
//! - **Rectangle**: a box of `width` x `height` *degrees* centred on a point,
//!   inclusive on every edge. Degrees are compared directly; this is not a
//!   geodesic box.
//!
//! Both predicates are registered on every SQLite connection
//! (`geo_within_radius`, `geo_in_box`, see [`crate::db`]), so SQL filters
//! evaluate exactly these functions.

use serde::{Deserialize, Serialize};

use crate::error::DirectoryError;

/// Mean Earth radius in kilometres
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS84 point in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Reject non-finite or out-of-range coordinates
    pub fn validate(&self) -> Result<(), DirectoryError> {
        if !self.latitude.is_finite() || !(-90.0..=90.0).contains(&self.latitude) {
            return Err(DirectoryError::Validation(format!(
                "latitude must be within [-90, 90], got {}",
                self.latitude
            )));
        }
        if !self.longitude.is_finite() || !(-180.0..=180.0).contains(&self.longitude) {
            return Err(DirectoryError::Validation(format!(
                "longitude must be within [-180, 180], got {}",
                self.longitude
            )));
        }
        Ok(())
    }
}

/// Great-circle distance between two points in kilometres
pub fn distance_km(center: Coordinate, point: Coordinate) -> f64 {
    // sin² + cos² is not always exactly 1.0; identical points must be 0 so
    // the radius predicate holds for any positive radius
    if center == point {
        return 0.0;
    }

    let lat0 = center.latitude.to_radians();
    let lat = point.latitude.to_radians();
    let delta_lon = point.longitude.to_radians() - center.longitude.to_radians();

    let cosine = lat0.sin() * lat.sin() + lat0.cos() * lat.cos() * delta_lon.cos();

    // Rounding can push the term just past ±1, where acos is NaN
    EARTH_RADIUS_KM * cosine.clamp(-1.0, 1.0).acos()
}

/// Circle search parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusQuery {
    pub center: Coordinate,
    pub radius_km: f64,
}

impl RadiusQuery {
    pub fn new(center: Coordinate, radius_km: f64) -> Result<Self, DirectoryError> {
        center.validate()?;
        if !radius_km.is_finite() || radius_km <= 0.0 {
            return Err(DirectoryError::Validation(format!(
                "radius_km must be greater than 0, got {}",
                radius_km
            )));
        }
        Ok(Self { center, radius_km })
    }

    /// Radius membership, `distance <= radius`
    pub fn contains(&self, point: Coordinate) -> bool {
        distance_km(self.center, point) <= self.radius_km
    }
}

/// Axis-aligned box in degrees
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_latitude: f64,
    pub max_latitude: f64,
    pub min_longitude: f64,
    pub max_longitude: f64,
}

impl BoundingBox {
    /// Box of `width` (longitude degrees) by `height` (latitude degrees) around `center`
    pub fn around(center: Coordinate, width: f64, height: f64) -> Result<Self, DirectoryError> {
        center.validate()?;
        if !width.is_finite() || width <= 0.0 {
            return Err(DirectoryError::Validation(format!(
                "width must be greater than 0, got {}",
                width
            )));
        }
        if !height.is_finite() || height <= 0.0 {
            return Err(DirectoryError::Validation(format!(
                "height must be greater than 0, got {}",
                height
            )));
        }

        Ok(Self {
            min_latitude: center.latitude - height / 2.0,
            max_latitude: center.latitude + height / 2.0,
            min_longitude: center.longitude - width / 2.0,
            max_longitude: center.longitude + width / 2.0,
        })
    }

    /// Inclusive on every edge
    pub fn contains(&self, point: Coordinate) -> bool {
        (self.min_latitude..=self.max_latitude).contains(&point.latitude)
            && (self.min_longitude..=self.max_longitude).contains(&point.longitude)
    }
}
