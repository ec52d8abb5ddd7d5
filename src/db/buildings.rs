//! Building CRUD and geo filters

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DirectoryError;
use crate::geo::{BoundingBox, Coordinate, RadiusQuery};

/// Buildings within `?3` km of (`?1`, `?2`), see [`RadiusQuery::contains`]
pub(crate) const RADIUS_FILTER: &str = "geo_within_radius(?1, ?2, ?3, latitude, longitude)";

/// Buildings with `?1 <= latitude <= ?2` and `?3 <= longitude <= ?4`, see
/// [`BoundingBox::contains`]
pub(crate) const RECTANGLE_FILTER: &str = "geo_in_box(?1, ?2, ?3, ?4, latitude, longitude)";

/// Building row from database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingRow {
    pub id: i64,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl BuildingRow {
    pub(crate) fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            address: row.get("address")?,
            latitude: row.get("latitude")?,
            longitude: row.get("longitude")?,
        })
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// Input for creating a building
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBuildingInput {
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Get building by ID
pub fn get_building(conn: &Connection, id: i64) -> Result<Option<BuildingRow>, DirectoryError> {
    let row = conn
        .query_row(
            "SELECT id, address, latitude, longitude FROM buildings WHERE id = ?1",
            params![id],
            BuildingRow::from_row,
        )
        .optional()?;

    Ok(row)
}

/// List buildings ordered by id
pub fn list_buildings(
    conn: &Connection,
    limit: u32,
    offset: u32,
) -> Result<Vec<BuildingRow>, DirectoryError> {
    let mut stmt = conn.prepare(
        "SELECT id, address, latitude, longitude FROM buildings
         ORDER BY id LIMIT ?1 OFFSET ?2",
    )?;

    let rows = stmt
        .query_map(params![limit as i64, offset as i64], BuildingRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Buildings within a great-circle radius
pub fn buildings_in_radius(
    conn: &Connection,
    query: &RadiusQuery,
    limit: u32,
    offset: u32,
) -> Result<Vec<BuildingRow>, DirectoryError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, address, latitude, longitude FROM buildings
         WHERE {}
         ORDER BY id LIMIT ?4 OFFSET ?5",
        RADIUS_FILTER
    ))?;

    let rows = stmt
        .query_map(
            params![
                query.center.latitude,
                query.center.longitude,
                query.radius_km,
                limit as i64,
                offset as i64
            ],
            BuildingRow::from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    debug!(radius_km = query.radius_km, count = rows.len(), "Radius building search");

    Ok(rows)
}

/// Buildings inside a degree box, edges included
pub fn buildings_in_rectangle(
    conn: &Connection,
    bbox: &BoundingBox,
    limit: u32,
    offset: u32,
) -> Result<Vec<BuildingRow>, DirectoryError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id, address, latitude, longitude FROM buildings
         WHERE {}
         ORDER BY id LIMIT ?5 OFFSET ?6",
        RECTANGLE_FILTER
    ))?;

    let rows = stmt
        .query_map(
            params![
                bbox.min_latitude,
                bbox.max_latitude,
                bbox.min_longitude,
                bbox.max_longitude,
                limit as i64,
                offset as i64
            ],
            BuildingRow::from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Insert a building
pub fn insert_building(
    conn: &Connection,
    input: &CreateBuildingInput,
) -> Result<BuildingRow, DirectoryError> {
    conn.execute(
        "INSERT INTO buildings (address, latitude, longitude) VALUES (?1, ?2, ?3)",
        params![input.address, input.latitude, input.longitude],
    )?;
    let id = conn.last_insert_rowid();

    debug!(building_id = id, "Inserted building");

    Ok(BuildingRow {
        id,
        address: input.address.clone(),
        latitude: input.latitude,
        longitude: input.longitude,
    })
}

/// Delete a building that no organization references
pub fn delete_building(conn: &Connection, id: i64) -> Result<bool, DirectoryError> {
    let tenants: i64 = conn.query_row(
        "SELECT COUNT(*) FROM organizations WHERE building_id = ?1",
        params![id],
        |row| row.get(0),
    )?;

    if tenants > 0 {
        return Err(DirectoryError::Conflict(format!(
            "Building {} still houses {} organizations",
            id, tenants
        )));
    }

    let changes = conn.execute("DELETE FROM buildings WHERE id = ?1", params![id])?;
    Ok(changes > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DirectoryDb;

    fn insert(db: &DirectoryDb, address: &str, latitude: f64, longitude: f64) -> BuildingRow {
        db.with_write(|tx| {
            insert_building(
                tx,
                &CreateBuildingInput {
                    address: address.into(),
                    latitude,
                    longitude,
                },
            )
        })
        .unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let db = DirectoryDb::open_in_memory().unwrap();
        let b = insert(&db, "Lenina 1", 55.75, 37.61);

        let fetched = db.with_snapshot(|conn| get_building(conn, b.id)).unwrap().unwrap();
        assert_eq!(fetched, b);
        assert_eq!(fetched.coordinate(), Coordinate::new(55.75, 37.61));
    }

    #[test]
    fn test_radius_filter() {
        let db = DirectoryDb::open_in_memory().unwrap();
        let origin = insert(&db, "Origin", 0.0, 0.0);
        insert(&db, "East", 0.0, 0.1);

        let query = RadiusQuery::new(Coordinate::new(0.0, 0.0), 5.0).unwrap();
        let found = db
            .with_snapshot(|conn| buildings_in_radius(conn, &query, 10, 0))
            .unwrap();
        assert_eq!(found, vec![origin]);

        let wide = RadiusQuery::new(Coordinate::new(0.0, 0.0), 12.0).unwrap();
        let found = db
            .with_snapshot(|conn| buildings_in_radius(conn, &wide, 10, 0))
            .unwrap();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_rectangle_filter_includes_edges() {
        let db = DirectoryDb::open_in_memory().unwrap();
        let edge = insert(&db, "Edge", 1.0, 1.0);
        insert(&db, "Outside", 1.0, 1.5);

        let bbox = BoundingBox::around(Coordinate::new(0.0, 0.0), 2.0, 2.0).unwrap();
        let found = db
            .with_snapshot(|conn| buildings_in_rectangle(conn, &bbox, 10, 0))
            .unwrap();
        assert_eq!(found, vec![edge]);
    }

    #[test]
    fn test_sql_filters_agree_with_predicates() {
        let db = DirectoryDb::open_in_memory().unwrap();
        let mut all = Vec::new();
        for lat in [-1.000_001, -1.0, -0.5, 0.0, 0.999_999, 1.0, 1.000_001] {
            for lon in [-2.000_001, -2.0, 0.0, 2.0, 2.000_001] {
                all.push(insert(&db, &format!("{} {}", lat, lon), lat, lon));
            }
        }

        let bbox = BoundingBox::around(Coordinate::new(0.0, 0.0), 4.0, 2.0).unwrap();
        let in_box = db
            .with_snapshot(|conn| buildings_in_rectangle(conn, &bbox, 100, 0))
            .unwrap();
        let expected: Vec<_> = all.iter().filter(|b| bbox.contains(b.coordinate())).cloned().collect();
        assert_eq!(in_box, expected);
        assert_eq!(in_box.len(), 5 * 3);

        let query = RadiusQuery::new(Coordinate::new(0.0, 0.0), 111.2).unwrap();
        let in_radius = db
            .with_snapshot(|conn| buildings_in_radius(conn, &query, 100, 0))
            .unwrap();
        let expected: Vec<_> = all.iter().filter(|b| query.contains(b.coordinate())).cloned().collect();
        assert_eq!(in_radius, expected);
    }

    #[test]
    fn test_delete_refuses_occupied_building() {
        let db = DirectoryDb::open_in_memory().unwrap();
        let b = insert(&db, "Occupied", 0.0, 0.0);
        db.with_write(|tx| {
            tx.execute(
                "INSERT INTO organizations (name, building_id) VALUES ('Acme', ?1)",
                params![b.id],
            )?;
            Ok(())
        })
        .unwrap();

        let err = db.with_write(|tx| delete_building(tx, b.id)).unwrap_err();
        assert!(matches!(err, DirectoryError::Conflict(_)));

        let empty = insert(&db, "Empty", 1.0, 1.0);
        assert!(db.with_write(|tx| delete_building(tx, empty.id)).unwrap());
        assert!(!db.with_write(|tx| delete_building(tx, empty.id)).unwrap());
    }
}
