//! Hierarchy queries over the activity table
//!
//! Closures are computed with bounded recursive CTEs (`depth < ?bound`) so a
//! corrupted parent graph terminates instead of looping.

use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::debug;

use super::tree::{ActivityForest, ActivityTreeNode};
use super::{TREE_FETCH_DEPTH, WALK_BOUND};
use crate::db::activities::{self, ActivityRow};
use crate::error::DirectoryError;

/// Recursive CTE `branch(id, depth)` holding `{?1} ∪ descendants(?1)`,
/// bounded by `?2` levels
pub(crate) const BRANCH_CTE: &str = "
    WITH RECURSIVE branch(id, depth) AS (
        SELECT id, 0 FROM activities WHERE id = ?1
        UNION ALL
        SELECT a.id, branch.depth + 1
        FROM activities a
        JOIN branch ON a.parent_id = branch.id
        WHERE branch.depth < ?2
    )";

/// Ancestors of `id`, nearest first (the node itself excluded)
///
/// Walks parent references one row at a time and stops with
/// [`DirectoryError::CorruptHierarchy`] after [`WALK_BOUND`] links.
pub fn ancestor_chain(conn: &Connection, id: i64) -> Result<Vec<i64>, DirectoryError> {
    let mut current = activities::parent_of(conn, id)?
        .ok_or_else(|| DirectoryError::NotFound("Activity not found".into()))?;
    let mut chain = Vec::new();

    while let Some(parent_id) = current {
        if chain.len() >= WALK_BOUND {
            return Err(DirectoryError::CorruptHierarchy(format!(
                "ancestor chain of activity {} exceeds {} links",
                id, WALK_BOUND
            )));
        }
        chain.push(parent_id);

        current = activities::parent_of(conn, parent_id)?.ok_or_else(|| {
            DirectoryError::CorruptHierarchy(format!(
                "activity {} references missing parent {}",
                id, parent_id
            ))
        })?;
    }

    Ok(chain)
}

/// Transitive closure over children: `(id, depth below the root)` pairs,
/// shallowest first
pub fn descendants(conn: &Connection, id: i64) -> Result<Vec<(i64, usize)>, DirectoryError> {
    let mut stmt = conn.prepare(
        "WITH RECURSIVE down(id, depth) AS (
             SELECT id, 1 FROM activities WHERE parent_id = ?1
             UNION ALL
             SELECT a.id, down.depth + 1
             FROM activities a
             JOIN down ON a.parent_id = down.id
             WHERE down.depth < ?2
         )
         SELECT id, depth FROM down ORDER BY depth, id",
    )?;

    let rows = stmt
        .query_map(params![id, WALK_BOUND as i64], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)? as usize))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    if rows.iter().any(|(_, depth)| *depth >= WALK_BOUND) {
        return Err(DirectoryError::CorruptHierarchy(format!(
            "descendants of activity {} reach {} levels",
            id, WALK_BOUND
        )));
    }

    Ok(rows)
}

/// Levels below `id` (0 for a leaf)
pub fn subtree_height(conn: &Connection, id: i64) -> Result<usize, DirectoryError> {
    Ok(descendants(conn, id)?
        .iter()
        .map(|(_, depth)| *depth)
        .max()
        .unwrap_or(0))
}

/// Closed branch set `{id} ∪ descendants(id)`, root first
pub fn branch_ids(conn: &Connection, id: i64) -> Result<Vec<i64>, DirectoryError> {
    let mut ids = vec![id];
    ids.extend(descendants(conn, id)?.into_iter().map(|(child, _)| child));
    Ok(ids)
}

/// Activity with its parent and descendants
#[derive(Debug, Clone, Serialize)]
pub struct ActivityTree {
    #[serde(flatten)]
    pub node: ActivityTreeNode,
    pub parent: Option<ActivityRow>,
}

/// Bounded tree fetch: the node, its direct parent, and every descendant
/// down to [`TREE_FETCH_DEPTH`] levels below it
pub fn fetch_tree(conn: &Connection, id: i64) -> Result<ActivityTree, DirectoryError> {
    let root = activities::get_activity(conn, id)?
        .ok_or_else(|| DirectoryError::NotFound("Activity not found".into()))?;

    let parent = match root.parent_id {
        Some(parent_id) => activities::get_activity(conn, parent_id)?,
        None => None,
    };

    let mut stmt = conn.prepare(&format!(
        "{}
         SELECT a.id, a.name, a.parent_id
         FROM branch
         JOIN activities a ON a.id = branch.id
         ORDER BY a.id",
        BRANCH_CTE
    ))?;

    let rows = stmt
        .query_map(params![id, TREE_FETCH_DEPTH as i64], ActivityRow::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    debug!(activity_id = id, nodes = rows.len(), "Fetched activity tree");

    let forest = ActivityForest::from_rows(rows);
    let node = forest
        .subtree(id, TREE_FETCH_DEPTH)
        .ok_or_else(|| DirectoryError::Internal(format!("activity {} missing from its own branch", id)))?;

    Ok(ActivityTree { node, parent })
}
