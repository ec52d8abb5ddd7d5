//! Write gate for parent assignments
//!
//! Runs inside the caller's write transaction, so the state it inspects is
//! the state the write commits against. Checks run in a fixed order: self
//! reference, missing parent, cycle, then depth. Re-parenting a node under
//! one of its own descendants is therefore always reported as a cycle.

use rusqlite::Connection;
use tracing::debug;

use super::query::{ancestor_chain, descendants};
use super::MAX_LEVELS;
use crate::db::activities;
use crate::error::DirectoryError;

/// Validate setting `parent_id` on `node_id` (`None` for a node being created)
///
/// The resulting level count includes the node's own subtree, so moving an
/// inner node can never push one of its descendants past [`MAX_LEVELS`].
pub fn check_parent_assignment(
    conn: &Connection,
    node_id: Option<i64>,
    parent_id: Option<i64>,
) -> Result<(), DirectoryError> {
    let Some(parent_id) = parent_id else {
        return Ok(());
    };

    if node_id == Some(parent_id) {
        return Err(DirectoryError::SelfParent(parent_id));
    }

    if activities::parent_of(conn, parent_id)?.is_none() {
        return Err(DirectoryError::NotFound(format!(
            "Parent activity {} not found",
            parent_id
        )));
    }

    let below = match node_id {
        Some(id) => {
            let below = descendants(conn, id)?;
            if below.iter().any(|(descendant, _)| *descendant == parent_id) {
                return Err(DirectoryError::CycleDetected { id, parent_id });
            }
            below.iter().map(|(_, depth)| *depth).max().unwrap_or(0)
        }
        None => 0,
    };

    // Parent level, plus the node itself, plus everything hanging below it
    let parent_level = ancestor_chain(conn, parent_id)?.len() + 1;
    let levels = parent_level + 1 + below;

    debug!(
        node_id = ?node_id,
        parent_id,
        levels,
        "Checked parent assignment"
    );

    if levels > MAX_LEVELS {
        return Err(DirectoryError::DepthExceeded {
            levels,
            max: MAX_LEVELS,
        });
    }

    Ok(())
}
