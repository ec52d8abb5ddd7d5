//! Activity (taxonomy node) CRUD operations
//!
//! Every write that sets `parent_id` runs the hierarchy integrity check
//! inside the caller's transaction before touching the row, which is why the
//! write functions take a [`Transaction`] rather than a bare connection.

use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::error::DirectoryError;
use crate::hierarchy::integrity;

/// Activity row from database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRow {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
}

impl ActivityRow {
    pub(crate) fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            parent_id: row.get("parent_id")?,
        })
    }
}

/// Input for creating an activity
#[derive(Debug, Clone, Deserialize)]
pub struct CreateActivityInput {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
}

/// Input for updating an activity
///
/// `parent_id` distinguishes "absent" (keep the current parent) from an
/// explicit `null` (detach to a root).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateActivityInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "explicit_null")]
    pub parent_id: Option<Option<i64>>,
}

fn explicit_null<'de, D>(deserializer: D) -> Result<Option<Option<i64>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<i64>::deserialize(deserializer).map(Some)
}

/// Get activity by ID
pub fn get_activity(conn: &Connection, id: i64) -> Result<Option<ActivityRow>, DirectoryError> {
    let row = conn
        .query_row(
            "SELECT id, name, parent_id FROM activities WHERE id = ?1",
            params![id],
            ActivityRow::from_row,
        )
        .optional()?;

    Ok(row)
}

/// Case-insensitive exact name lookup
pub fn find_activity_by_name(
    conn: &Connection,
    name: &str,
) -> Result<Option<ActivityRow>, DirectoryError> {
    let row = conn
        .query_row(
            "SELECT id, name, parent_id FROM activities
             WHERE casefold(name) = casefold(?1)
             ORDER BY id LIMIT 1",
            params![name],
            ActivityRow::from_row,
        )
        .optional()?;

    Ok(row)
}

/// Parent of an activity: `None` if the activity does not exist,
/// `Some(None)` for a root
pub fn parent_of(conn: &Connection, id: i64) -> Result<Option<Option<i64>>, DirectoryError> {
    let parent = conn
        .query_row(
            "SELECT parent_id FROM activities WHERE id = ?1",
            params![id],
            |row| row.get::<_, Option<i64>>(0),
        )
        .optional()?;

    Ok(parent)
}

/// List activities ordered by id
pub fn list_activities(
    conn: &Connection,
    limit: u32,
    offset: u32,
) -> Result<Vec<ActivityRow>, DirectoryError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, parent_id FROM activities ORDER BY id LIMIT ?1 OFFSET ?2",
    )?;

    let rows = stmt
        .query_map(params![limit as i64, offset as i64], ActivityRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Every activity, for building an in-memory forest
pub fn all_activities(conn: &Connection) -> Result<Vec<ActivityRow>, DirectoryError> {
    let mut stmt = conn.prepare("SELECT id, name, parent_id FROM activities ORDER BY id")?;

    let rows = stmt
        .query_map([], ActivityRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Activities tagged on an organization
pub fn activities_for_organization(
    conn: &Connection,
    organization_id: i64,
) -> Result<Vec<ActivityRow>, DirectoryError> {
    let mut stmt = conn.prepare(
        "SELECT a.id, a.name, a.parent_id
         FROM activities a
         JOIN organization_activities oa ON oa.activity_id = a.id
         WHERE oa.organization_id = ?1
         ORDER BY a.id",
    )?;

    let rows = stmt
        .query_map(params![organization_id], ActivityRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Insert an activity after the hierarchy check passes
pub fn insert_activity(
    tx: &Transaction<'_>,
    input: &CreateActivityInput,
) -> Result<ActivityRow, DirectoryError> {
    integrity::check_parent_assignment(tx, None, input.parent_id)?;

    tx.execute(
        "INSERT INTO activities (name, parent_id) VALUES (?1, ?2)",
        params![input.name, input.parent_id],
    )?;
    let id = tx.last_insert_rowid();

    debug!(activity_id = id, parent_id = ?input.parent_id, "Inserted activity");

    Ok(ActivityRow {
        id,
        name: input.name.clone(),
        parent_id: input.parent_id,
    })
}

/// Rename and/or re-parent an activity after the hierarchy check passes
pub fn update_activity(
    tx: &Transaction<'_>,
    id: i64,
    input: &UpdateActivityInput,
) -> Result<ActivityRow, DirectoryError> {
    let current = get_activity(tx, id)?
        .ok_or_else(|| DirectoryError::NotFound("Activity not found".into()))?;

    let name = input.name.clone().unwrap_or(current.name);
    let parent_id = match input.parent_id {
        Some(parent_id) => parent_id,
        None => current.parent_id,
    };

    integrity::check_parent_assignment(tx, Some(id), parent_id)?;

    tx.execute(
        "UPDATE activities SET name = ?1, parent_id = ?2 WHERE id = ?3",
        params![name, parent_id, id],
    )?;

    debug!(activity_id = id, parent_id = ?parent_id, "Updated activity");

    Ok(ActivityRow { id, name, parent_id })
}

/// Delete an activity; children become roots, tags on organizations go away
pub fn delete_activity(conn: &Connection, id: i64) -> Result<bool, DirectoryError> {
    let changes = conn.execute("DELETE FROM activities WHERE id = ?1", params![id])?;
    Ok(changes > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DirectoryDb;

    fn create(db: &DirectoryDb, name: &str, parent_id: Option<i64>) -> Result<ActivityRow, DirectoryError> {
        db.with_write(|tx| {
            insert_activity(
                tx,
                &CreateActivityInput {
                    name: name.into(),
                    parent_id,
                },
            )
        })
    }

    #[test]
    fn test_insert_and_get() {
        let db = DirectoryDb::open_in_memory().unwrap();
        let food = create(&db, "Food", None).unwrap();
        let meat = create(&db, "Meat", Some(food.id)).unwrap();

        let fetched = db.with_snapshot(|conn| get_activity(conn, meat.id)).unwrap().unwrap();
        assert_eq!(fetched, meat);
        assert_eq!(fetched.parent_id, Some(food.id));
    }

    #[test]
    fn test_name_lookup_is_case_insensitive() {
        let db = DirectoryDb::open_in_memory().unwrap();
        let food = create(&db, "Еда", None).unwrap();

        let found = db
            .with_snapshot(|conn| find_activity_by_name(conn, "ЕДА"))
            .unwrap()
            .unwrap();
        assert_eq!(found.id, food.id);

        let missing = db.with_snapshot(|conn| find_activity_by_name(conn, "Ед")).unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_name_is_unique_case_sensitive() {
        let db = DirectoryDb::open_in_memory().unwrap();
        create(&db, "Food", None).unwrap();

        assert!(matches!(create(&db, "Food", None), Err(DirectoryError::Conflict(_))));
        assert!(create(&db, "food", None).is_ok());
    }

    #[test]
    fn test_update_keeps_parent_when_absent() {
        let db = DirectoryDb::open_in_memory().unwrap();
        let food = create(&db, "Food", None).unwrap();
        let meat = create(&db, "Meat", Some(food.id)).unwrap();

        let renamed = db
            .with_write(|tx| {
                update_activity(
                    tx,
                    meat.id,
                    &UpdateActivityInput {
                        name: Some("Meat products".into()),
                        parent_id: None,
                    },
                )
            })
            .unwrap();
        assert_eq!(renamed.parent_id, Some(food.id));
        assert_eq!(renamed.name, "Meat products");

        let detached = db
            .with_write(|tx| {
                update_activity(
                    tx,
                    meat.id,
                    &UpdateActivityInput {
                        name: None,
                        parent_id: Some(None),
                    },
                )
            })
            .unwrap();
        assert_eq!(detached.parent_id, None);
    }

    #[test]
    fn test_update_input_distinguishes_null_from_absent() {
        let absent: UpdateActivityInput = serde_json::from_str(r#"{"name": "x"}"#).unwrap();
        assert_eq!(absent.parent_id, None);

        let null: UpdateActivityInput = serde_json::from_str(r#"{"parent_id": null}"#).unwrap();
        assert_eq!(null.parent_id, Some(None));

        let set: UpdateActivityInput = serde_json::from_str(r#"{"parent_id": 7}"#).unwrap();
        assert_eq!(set.parent_id, Some(Some(7)));
    }

    #[test]
    fn test_delete_detaches_children() {
        let db = DirectoryDb::open_in_memory().unwrap();
        let food = create(&db, "Food", None).unwrap();
        let meat = create(&db, "Meat", Some(food.id)).unwrap();

        assert!(db.with_write(|tx| delete_activity(tx, food.id)).unwrap());
        assert!(!db.with_write(|tx| delete_activity(tx, food.id)).unwrap());

        let meat = db.with_snapshot(|conn| get_activity(conn, meat.id)).unwrap().unwrap();
        assert_eq!(meat.parent_id, None);
    }

    #[test]
    fn test_list_is_ordered_and_paged() {
        let db = DirectoryDb::open_in_memory().unwrap();
        for i in 0..5 {
            create(&db, &format!("Activity {}", i), None).unwrap();
        }

        let page = db.with_snapshot(|conn| list_activities(conn, 2, 1)).unwrap();
        let names: Vec<_> = page.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["Activity 1", "Activity 2"]);
    }
}
