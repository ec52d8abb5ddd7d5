//! Building service - validation and geo search over buildings

use std::sync::Arc;

use tracing::info;

use crate::db::{buildings, BuildingRow, CreateBuildingInput, DirectoryDb};
use crate::error::DirectoryError;
use crate::geo::{BoundingBox, Coordinate, RadiusQuery};

use super::pagination::Page;

/// Longest accepted address, in characters
pub const MAX_ADDRESS_LEN: usize = 255;

/// Building service for business logic
pub struct BuildingService {
    db: Arc<DirectoryDb>,
}

impl BuildingService {
    /// Create a new building service
    pub fn new(db: Arc<DirectoryDb>) -> Self {
        Self { db }
    }

    /// Get building by ID
    pub fn get(&self, id: i64) -> Result<Option<BuildingRow>, DirectoryError> {
        self.db.with_snapshot(|conn| buildings::get_building(conn, id))
    }

    /// List buildings with pagination
    pub fn list(&self, page: Page) -> Result<Vec<BuildingRow>, DirectoryError> {
        self.db
            .with_snapshot(|conn| buildings::list_buildings(conn, page.limit, page.offset))
    }

    /// Buildings within `query.radius_km` of the center
    pub fn in_radius(&self, query: &RadiusQuery, page: Page) -> Result<Vec<BuildingRow>, DirectoryError> {
        self.db.with_snapshot(|conn| {
            buildings::buildings_in_radius(conn, query, page.limit, page.offset)
        })
    }

    /// Buildings inside the box, edges included
    pub fn in_rectangle(&self, bbox: &BoundingBox, page: Page) -> Result<Vec<BuildingRow>, DirectoryError> {
        self.db.with_snapshot(|conn| {
            buildings::buildings_in_rectangle(conn, bbox, page.limit, page.offset)
        })
    }

    /// Create a building
    pub fn create(&self, input: CreateBuildingInput) -> Result<BuildingRow, DirectoryError> {
        let len = input.address.chars().count();
        if input.address.trim().is_empty() || len > MAX_ADDRESS_LEN {
            return Err(DirectoryError::Validation(format!(
                "address must be 1 to {} characters",
                MAX_ADDRESS_LEN
            )));
        }
        Coordinate::new(input.latitude, input.longitude).validate()?;

        let result = self.db.with_write(|tx| buildings::insert_building(tx, &input))?;
        info!(building_id = result.id, "Created building");
        Ok(result)
    }

    /// Delete a building nobody occupies
    pub fn delete(&self, id: i64) -> Result<bool, DirectoryError> {
        let deleted = self.db.with_write(|tx| buildings::delete_building(tx, id))?;
        if deleted {
            info!(building_id = id, "Deleted building");
        }
        Ok(deleted)
    }
}
