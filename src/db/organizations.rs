//! Organization read model and writes
//!
//! Every search selects organization rows with one statement, then composes
//! each row with its building, phones and activity tags. Geo searches filter
//! buildings in a sub-select so the distance function runs once per
//! building; branch search expands the activity subtree with a recursive CTE
//! in the same statement.

use rusqlite::{params, Connection, OptionalExtension, Params, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::activities::{self, ActivityRow};
use super::buildings::{self, BuildingRow, RADIUS_FILTER, RECTANGLE_FILTER};
use crate::error::DirectoryError;
use crate::geo::{BoundingBox, RadiusQuery};
use crate::hierarchy::query::BRANCH_CTE;
use crate::hierarchy::WALK_BOUND;

const ORGANIZATION_COLUMNS: &str = "o.id AS id, o.name AS name, o.building_id AS building_id";

/// Organization row from database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrganizationRow {
    pub id: i64,
    pub name: String,
    pub building_id: i64,
}

impl OrganizationRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            building_id: row.get("building_id")?,
        })
    }
}

/// Phone number owned by an organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneRow {
    pub id: i64,
    pub number: String,
}

impl PhoneRow {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            number: row.get("number")?,
        })
    }
}

/// Organization with building, phones and activity tags
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrganizationView {
    pub id: i64,
    pub name: String,
    pub building: BuildingRow,
    pub phones: Vec<PhoneRow>,
    pub activities: Vec<ActivityRow>,
}

/// Input for creating an organization
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrganizationInput {
    pub name: String,
    pub building_id: i64,
    #[serde(default)]
    pub phones: Vec<String>,
    #[serde(default)]
    pub activity_ids: Vec<i64>,
}

// ============================================================================
// Composition
// ============================================================================

fn phones_for_organization(
    conn: &Connection,
    organization_id: i64,
) -> Result<Vec<PhoneRow>, DirectoryError> {
    let mut stmt = conn.prepare(
        "SELECT id, number FROM organization_phones WHERE organization_id = ?1 ORDER BY id",
    )?;

    let rows = stmt
        .query_map(params![organization_id], PhoneRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn compose(conn: &Connection, row: OrganizationRow) -> Result<OrganizationView, DirectoryError> {
    let building = buildings::get_building(conn, row.building_id)?.ok_or_else(|| {
        DirectoryError::Internal(format!(
            "organization {} references missing building {}",
            row.id, row.building_id
        ))
    })?;

    Ok(OrganizationView {
        phones: phones_for_organization(conn, row.id)?,
        activities: activities::activities_for_organization(conn, row.id)?,
        id: row.id,
        name: row.name,
        building,
    })
}

fn load<P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<OrganizationView>, DirectoryError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, OrganizationRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter().map(|row| compose(conn, row)).collect()
}

// ============================================================================
// Reads
// ============================================================================

/// Get organization by ID
pub fn get_organization(
    conn: &Connection,
    id: i64,
) -> Result<Option<OrganizationView>, DirectoryError> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM organizations o WHERE o.id = ?1", ORGANIZATION_COLUMNS),
            params![id],
            OrganizationRow::from_row,
        )
        .optional()?;

    row.map(|row| compose(conn, row)).transpose()
}

/// Case-insensitive exact name lookup
pub fn find_organization_by_name(
    conn: &Connection,
    name: &str,
) -> Result<Option<OrganizationView>, DirectoryError> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {} FROM organizations o
                 WHERE casefold(o.name) = casefold(?1)
                 ORDER BY o.id LIMIT 1",
                ORGANIZATION_COLUMNS
            ),
            params![name],
            OrganizationRow::from_row,
        )
        .optional()?;

    row.map(|row| compose(conn, row)).transpose()
}

/// List organizations ordered by id
pub fn list_organizations(
    conn: &Connection,
    limit: u32,
    offset: u32,
) -> Result<Vec<OrganizationView>, DirectoryError> {
    load(
        conn,
        &format!(
            "SELECT {} FROM organizations o ORDER BY o.id LIMIT ?1 OFFSET ?2",
            ORGANIZATION_COLUMNS
        ),
        params![limit as i64, offset as i64],
    )
}

/// Organizations housed in a building
pub fn organizations_by_building(
    conn: &Connection,
    building_id: i64,
    limit: u32,
    offset: u32,
) -> Result<Vec<OrganizationView>, DirectoryError> {
    load(
        conn,
        &format!(
            "SELECT {} FROM organizations o
             WHERE o.building_id = ?1
             ORDER BY o.id LIMIT ?2 OFFSET ?3",
            ORGANIZATION_COLUMNS
        ),
        params![building_id, limit as i64, offset as i64],
    )
}

/// Organizations tagged with exactly this activity
pub fn organizations_by_activity(
    conn: &Connection,
    activity_id: i64,
    limit: u32,
    offset: u32,
) -> Result<Vec<OrganizationView>, DirectoryError> {
    load(
        conn,
        &format!(
            "SELECT {} FROM organizations o
             JOIN organization_activities oa ON oa.organization_id = o.id
             WHERE oa.activity_id = ?1
             ORDER BY o.id LIMIT ?2 OFFSET ?3",
            ORGANIZATION_COLUMNS
        ),
        params![activity_id, limit as i64, offset as i64],
    )
}

/// Organizations tagged with the activity or any of its descendants
///
/// `EXISTS` keeps each organization once however many branch nodes it is
/// tagged with.
pub fn organizations_by_activity_branch(
    conn: &Connection,
    activity_id: i64,
    limit: u32,
    offset: u32,
) -> Result<Vec<OrganizationView>, DirectoryError> {
    let views = load(
        conn,
        &format!(
            "{}
             SELECT {} FROM organizations o
             WHERE EXISTS (
                 SELECT 1 FROM organization_activities oa
                 JOIN branch ON branch.id = oa.activity_id
                 WHERE oa.organization_id = o.id
             )
             ORDER BY o.id LIMIT ?3 OFFSET ?4",
            BRANCH_CTE, ORGANIZATION_COLUMNS
        ),
        params![activity_id, WALK_BOUND as i64, limit as i64, offset as i64],
    )?;

    debug!(activity_id, count = views.len(), "Branch organization search");

    Ok(views)
}

/// Organizations whose building lies within the radius
pub fn organizations_in_radius(
    conn: &Connection,
    query: &RadiusQuery,
    limit: u32,
    offset: u32,
) -> Result<Vec<OrganizationView>, DirectoryError> {
    load(
        conn,
        &format!(
            "SELECT {} FROM organizations o
             WHERE o.building_id IN (SELECT id FROM buildings WHERE {})
             ORDER BY o.id LIMIT ?4 OFFSET ?5",
            ORGANIZATION_COLUMNS, RADIUS_FILTER
        ),
        params![
            query.center.latitude,
            query.center.longitude,
            query.radius_km,
            limit as i64,
            offset as i64
        ],
    )
}

/// Organizations whose building lies inside the box
pub fn organizations_in_rectangle(
    conn: &Connection,
    bbox: &BoundingBox,
    limit: u32,
    offset: u32,
) -> Result<Vec<OrganizationView>, DirectoryError> {
    load(
        conn,
        &format!(
            "SELECT {} FROM organizations o
             WHERE o.building_id IN (SELECT id FROM buildings WHERE {})
             ORDER BY o.id LIMIT ?5 OFFSET ?6",
            ORGANIZATION_COLUMNS, RECTANGLE_FILTER
        ),
        params![
            bbox.min_latitude,
            bbox.max_latitude,
            bbox.min_longitude,
            bbox.max_longitude,
            limit as i64,
            offset as i64
        ],
    )
}

// ============================================================================
// Writes
// ============================================================================

fn require_activity(conn: &Connection, activity_id: i64) -> Result<(), DirectoryError> {
    if activities::parent_of(conn, activity_id)?.is_none() {
        return Err(DirectoryError::NotFound(format!(
            "Activity {} not found",
            activity_id
        )));
    }
    Ok(())
}

fn require_organization(conn: &Connection, organization_id: i64) -> Result<(), DirectoryError> {
    let exists: Option<i64> = conn
        .query_row(
            "SELECT id FROM organizations WHERE id = ?1",
            params![organization_id],
            |row| row.get(0),
        )
        .optional()?;

    match exists {
        Some(_) => Ok(()),
        None => Err(DirectoryError::NotFound("Organization not found".into())),
    }
}

/// Insert an organization with its phones and activity tags
///
/// Meant to run inside one write transaction: any failing phone or tag
/// undoes the organization too.
pub fn insert_organization(
    conn: &Connection,
    input: &CreateOrganizationInput,
) -> Result<OrganizationView, DirectoryError> {
    if buildings::get_building(conn, input.building_id)?.is_none() {
        return Err(DirectoryError::NotFound(format!(
            "Building {} not found",
            input.building_id
        )));
    }

    conn.execute(
        "INSERT INTO organizations (name, building_id) VALUES (?1, ?2)",
        params![input.name, input.building_id],
    )?;
    let id = conn.last_insert_rowid();

    for number in &input.phones {
        conn.execute(
            "INSERT INTO organization_phones (number, organization_id) VALUES (?1, ?2)",
            params![number, id],
        )?;
    }

    for activity_id in &input.activity_ids {
        require_activity(conn, *activity_id)?;
        conn.execute(
            "INSERT OR IGNORE INTO organization_activities (organization_id, activity_id)
             VALUES (?1, ?2)",
            params![id, activity_id],
        )?;
    }

    debug!(
        organization_id = id,
        phones = input.phones.len(),
        activities = input.activity_ids.len(),
        "Inserted organization"
    );

    get_organization(conn, id)?
        .ok_or_else(|| DirectoryError::Internal(format!("organization {} vanished after insert", id)))
}

/// Delete an organization; phones and tags cascade
pub fn delete_organization(conn: &Connection, id: i64) -> Result<bool, DirectoryError> {
    let changes = conn.execute("DELETE FROM organizations WHERE id = ?1", params![id])?;
    Ok(changes > 0)
}

/// Add a phone number to an organization
pub fn insert_phone(
    conn: &Connection,
    organization_id: i64,
    number: &str,
) -> Result<PhoneRow, DirectoryError> {
    require_organization(conn, organization_id)?;

    conn.execute(
        "INSERT INTO organization_phones (number, organization_id) VALUES (?1, ?2)",
        params![number, organization_id],
    )?;

    Ok(PhoneRow {
        id: conn.last_insert_rowid(),
        number: number.to_string(),
    })
}

/// Tag an organization with an activity (idempotent)
pub fn tag_activity(
    conn: &Connection,
    organization_id: i64,
    activity_id: i64,
) -> Result<(), DirectoryError> {
    require_organization(conn, organization_id)?;
    require_activity(conn, activity_id)?;

    conn.execute(
        "INSERT OR IGNORE INTO organization_activities (organization_id, activity_id)
         VALUES (?1, ?2)",
        params![organization_id, activity_id],
    )?;

    Ok(())
}

/// Remove an activity tag; `false` if the organization did not carry it
pub fn untag_activity(
    conn: &Connection,
    organization_id: i64,
    activity_id: i64,
) -> Result<bool, DirectoryError> {
    require_organization(conn, organization_id)?;

    let changes = conn.execute(
        "DELETE FROM organization_activities WHERE organization_id = ?1 AND activity_id = ?2",
        params![organization_id, activity_id],
    )?;

    Ok(changes > 0)
}
