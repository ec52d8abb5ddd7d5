//! Directory service - organization search and writes
//!
//! Resolves names to ids, checks that referenced entities exist, and runs
//! each search inside one snapshot so the existence check and the page come
//! from the same state.

use std::sync::Arc;

use rusqlite::Connection;
use tracing::info;

use crate::db::{
    activities, buildings, organizations, CreateOrganizationInput, DirectoryDb, OrganizationView,
    PhoneRow,
};
use crate::error::DirectoryError;
use crate::geo::{BoundingBox, RadiusQuery};

use super::pagination::Page;

/// Longest accepted organization name, in characters
pub const MAX_ORGANIZATION_NAME_LEN: usize = 255;

/// Longest accepted phone number, in characters
pub const MAX_PHONE_LEN: usize = 50;

/// How an activity is addressed in a search
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityRef {
    Id(i64),
    Name(String),
}

impl ActivityRef {
    fn resolve(&self, conn: &Connection) -> Result<i64, DirectoryError> {
        match self {
            ActivityRef::Id(id) => activities::get_activity(conn, *id)?
                .map(|row| row.id)
                .ok_or_else(|| DirectoryError::NotFound("Activity not found".into())),
            ActivityRef::Name(name) => activities::find_activity_by_name(conn, name)?
                .map(|row| row.id)
                .ok_or_else(|| DirectoryError::NotFound(format!("Activity '{}' not found", name))),
        }
    }
}

/// Directory service for organization reads and writes
pub struct DirectoryService {
    db: Arc<DirectoryDb>,
}

impl DirectoryService {
    /// Create a new directory service
    pub fn new(db: Arc<DirectoryDb>) -> Self {
        Self { db }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// Get organization by ID
    pub fn get(&self, id: i64) -> Result<Option<OrganizationView>, DirectoryError> {
        self.db.with_snapshot(|conn| organizations::get_organization(conn, id))
    }

    /// Case-insensitive exact name lookup
    pub fn by_name(&self, name: &str) -> Result<OrganizationView, DirectoryError> {
        self.db
            .with_snapshot(|conn| organizations::find_organization_by_name(conn, name))?
            .ok_or_else(|| DirectoryError::NotFound(format!("Organization '{}' not found", name)))
    }

    /// List organizations with pagination
    pub fn list(&self, page: Page) -> Result<Vec<OrganizationView>, DirectoryError> {
        self.db.with_snapshot(|conn| {
            organizations::list_organizations(conn, page.limit, page.offset)
        })
    }

    /// Organizations in a building; `NotFound` if the building does not exist
    pub fn by_building(&self, building_id: i64, page: Page) -> Result<Vec<OrganizationView>, DirectoryError> {
        self.db.with_snapshot(|conn| {
            if buildings::get_building(conn, building_id)?.is_none() {
                return Err(DirectoryError::NotFound("Building not found".into()));
            }
            organizations::organizations_by_building(conn, building_id, page.limit, page.offset)
        })
    }

    /// Organizations tagged with exactly this activity
    pub fn by_activity(&self, activity: &ActivityRef, page: Page) -> Result<Vec<OrganizationView>, DirectoryError> {
        self.db.with_snapshot(|conn| {
            let activity_id = activity.resolve(conn)?;
            organizations::organizations_by_activity(conn, activity_id, page.limit, page.offset)
        })
    }

    /// Organizations tagged anywhere in the activity's subtree
    pub fn by_activity_branch(
        &self,
        activity: &ActivityRef,
        page: Page,
    ) -> Result<Vec<OrganizationView>, DirectoryError> {
        self.db.with_snapshot(|conn| {
            let activity_id = activity.resolve(conn)?;
            organizations::organizations_by_activity_branch(conn, activity_id, page.limit, page.offset)
        })
    }

    /// Organizations whose building lies within the radius
    pub fn in_radius(&self, query: &RadiusQuery, page: Page) -> Result<Vec<OrganizationView>, DirectoryError> {
        self.db.with_snapshot(|conn| {
            organizations::organizations_in_radius(conn, query, page.limit, page.offset)
        })
    }

    /// Organizations whose building lies inside the box
    pub fn in_rectangle(&self, bbox: &BoundingBox, page: Page) -> Result<Vec<OrganizationView>, DirectoryError> {
        self.db.with_snapshot(|conn| {
            organizations::organizations_in_rectangle(conn, bbox, page.limit, page.offset)
        })
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Create an organization with phones and tags in one transaction
    pub fn create(&self, input: CreateOrganizationInput) -> Result<OrganizationView, DirectoryError> {
        let len = input.name.chars().count();
        if input.name.trim().is_empty() || len > MAX_ORGANIZATION_NAME_LEN {
            return Err(DirectoryError::Validation(format!(
                "organization name must be 1 to {} characters",
                MAX_ORGANIZATION_NAME_LEN
            )));
        }
        for number in &input.phones {
            validate_phone(number)?;
        }

        let result = self
            .db
            .with_write(|tx| organizations::insert_organization(tx, &input))?;

        info!(
            organization_id = result.id,
            building_id = result.building.id,
            "Created organization"
        );
        Ok(result)
    }

    /// Delete an organization with its phones and tags
    pub fn delete(&self, id: i64) -> Result<bool, DirectoryError> {
        let deleted = self
            .db
            .with_write(|tx| organizations::delete_organization(tx, id))?;
        if deleted {
            info!(organization_id = id, "Deleted organization");
        }
        Ok(deleted)
    }

    /// Add a phone number
    pub fn add_phone(&self, organization_id: i64, number: &str) -> Result<PhoneRow, DirectoryError> {
        validate_phone(number)?;
        let phone = self
            .db
            .with_write(|tx| organizations::insert_phone(tx, organization_id, number))?;
        info!(organization_id, phone_id = phone.id, "Added phone");
        Ok(phone)
    }

    /// Tag with an activity; tagging twice is a no-op
    pub fn tag(&self, organization_id: i64, activity_id: i64) -> Result<OrganizationView, DirectoryError> {
        self.db.with_write(|tx| {
            organizations::tag_activity(tx, organization_id, activity_id)?;
            load_view(tx, organization_id)
        })
    }

    /// Remove an activity tag; `NotFound` if it was not there
    pub fn untag(&self, organization_id: i64, activity_id: i64) -> Result<OrganizationView, DirectoryError> {
        self.db.with_write(|tx| {
            if !organizations::untag_activity(tx, organization_id, activity_id)? {
                return Err(DirectoryError::NotFound(format!(
                    "Organization is not tagged with activity {}",
                    activity_id
                )));
            }
            load_view(tx, organization_id)
        })
    }
}

fn load_view(conn: &Connection, organization_id: i64) -> Result<OrganizationView, DirectoryError> {
    organizations::get_organization(conn, organization_id)?
        .ok_or_else(|| DirectoryError::NotFound("Organization not found".into()))
}

fn validate_phone(number: &str) -> Result<(), DirectoryError> {
    let len = number.chars().count();
    if number.trim().is_empty() || len > MAX_PHONE_LEN {
        return Err(DirectoryError::Validation(format!(
            "phone number must be 1 to {} characters",
            MAX_PHONE_LEN
        )));
    }
    Ok(())
}
