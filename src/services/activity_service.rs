//! Activity service - business logic for the activity taxonomy
//!
//! Wraps the activity repository with name validation and logging. The
//! hierarchy gate itself lives in the repository write functions.

use std::sync::Arc;

use tracing::{info, warn};

use crate::db::{activities, ActivityRow, CreateActivityInput, DirectoryDb, UpdateActivityInput};
use crate::error::DirectoryError;
use crate::hierarchy::{self, ActivityTree};

use super::pagination::Page;

/// Longest accepted activity name, in characters
pub const MAX_ACTIVITY_NAME_LEN: usize = 50;

/// Activity service for business logic
pub struct ActivityService {
    db: Arc<DirectoryDb>,
}

impl ActivityService {
    /// Create a new activity service
    pub fn new(db: Arc<DirectoryDb>) -> Self {
        Self { db }
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// List activities with pagination
    pub fn list(&self, page: Page) -> Result<Vec<ActivityRow>, DirectoryError> {
        self.db
            .with_snapshot(|conn| activities::list_activities(conn, page.limit, page.offset))
    }

    /// Activity with parent and descendants
    pub fn tree(&self, id: i64) -> Result<ActivityTree, DirectoryError> {
        self.db.with_snapshot(|conn| hierarchy::fetch_tree(conn, id))
    }

    /// Ancestors of an activity, nearest first
    pub fn ancestors(&self, id: i64) -> Result<Vec<i64>, DirectoryError> {
        self.db.with_snapshot(|conn| hierarchy::ancestor_chain(conn, id))
    }

    /// `{id} ∪ descendants(id)`
    pub fn branch(&self, id: i64) -> Result<Vec<i64>, DirectoryError> {
        self.db.with_snapshot(|conn| {
            if activities::get_activity(conn, id)?.is_none() {
                return Err(DirectoryError::NotFound("Activity not found".into()));
            }
            hierarchy::branch_ids(conn, id)
        })
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Create an activity under an optional parent
    pub fn create(&self, input: CreateActivityInput) -> Result<ActivityRow, DirectoryError> {
        validate_name(&input.name)?;

        let result = self
            .db
            .with_write(|tx| activities::insert_activity(tx, &input))
            .inspect_err(|e| log_rejection(None, input.parent_id, e))?;

        info!(activity_id = result.id, parent_id = ?result.parent_id, "Created activity");
        Ok(result)
    }

    /// Rename and/or re-parent an activity
    pub fn update(&self, id: i64, input: UpdateActivityInput) -> Result<ActivityRow, DirectoryError> {
        if let Some(name) = &input.name {
            validate_name(name)?;
        }

        let result = self
            .db
            .with_write(|tx| activities::update_activity(tx, id, &input))
            .inspect_err(|e| log_rejection(Some(id), input.parent_id.flatten(), e))?;

        info!(activity_id = id, parent_id = ?result.parent_id, "Updated activity");
        Ok(result)
    }

    /// Delete an activity; children become roots
    pub fn delete(&self, id: i64) -> Result<bool, DirectoryError> {
        let deleted = self.db.with_write(|tx| activities::delete_activity(tx, id))?;
        if deleted {
            info!(activity_id = id, "Deleted activity");
        }
        Ok(deleted)
    }
}

fn validate_name(name: &str) -> Result<(), DirectoryError> {
    let len = name.chars().count();
    if name.trim().is_empty() || len > MAX_ACTIVITY_NAME_LEN {
        return Err(DirectoryError::Validation(format!(
            "activity name must be 1 to {} characters",
            MAX_ACTIVITY_NAME_LEN
        )));
    }
    Ok(())
}

fn log_rejection(id: Option<i64>, parent_id: Option<i64>, error: &DirectoryError) {
    if error.is_hierarchy_violation() {
        warn!(activity_id = ?id, parent_id = ?parent_id, error = %error, "Rejected activity write");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> ActivityService {
        ActivityService::new(Arc::new(DirectoryDb::open_in_memory().unwrap()))
    }

    fn input(name: &str, parent_id: Option<i64>) -> CreateActivityInput {
        CreateActivityInput {
            name: name.into(),
            parent_id,
        }
    }

    #[test]
    fn test_name_validation() {
        let svc = service();
        assert!(matches!(svc.create(input("", None)), Err(DirectoryError::Validation(_))));
        assert!(matches!(svc.create(input("   ", None)), Err(DirectoryError::Validation(_))));
        assert!(svc.create(input(&"я".repeat(50), None)).is_ok());
        assert!(matches!(
            svc.create(input(&"x".repeat(51), None)),
            Err(DirectoryError::Validation(_))
        ));
    }

    #[test]
    fn test_branch_and_ancestors() {
        let svc = service();
        let food = svc.create(input("Food", None)).unwrap();
        let meat = svc.create(input("Meat", Some(food.id))).unwrap();

        assert_eq!(svc.branch(food.id).unwrap(), vec![food.id, meat.id]);
        assert_eq!(svc.ancestors(meat.id).unwrap(), vec![food.id]);
        assert!(matches!(svc.branch(999), Err(DirectoryError::NotFound(_))));
    }

    #[test]
    fn test_update_rejects_cycle_without_changes() {
        let svc = service();
        let food = svc.create(input("Food", None)).unwrap();
        let meat = svc.create(input("Meat", Some(food.id))).unwrap();

        let err = svc
            .update(
                food.id,
                UpdateActivityInput {
                    name: Some("Renamed".into()),
                    parent_id: Some(Some(meat.id)),
                },
            )
            .unwrap_err();
        assert!(matches!(err, DirectoryError::CycleDetected { .. }));

        let tree = svc.tree(food.id).unwrap();
        assert_eq!(tree.node.name, "Food");
        assert!(tree.parent.is_none());
    }
}
