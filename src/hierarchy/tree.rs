//! Arena of activity nodes keyed by id
//!
//! Parent and child links are ids, never references, so re-parenting is an
//! index update and the structure cannot own itself.

use std::collections::BTreeMap;

use serde::Serialize;

use super::WALK_BOUND;
use crate::db::ActivityRow;
use crate::error::DirectoryError;

/// Nested activity for API responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityTreeNode {
    pub id: i64,
    pub name: String,
    pub parent_id: Option<i64>,
    pub children: Vec<ActivityTreeNode>,
}

impl ActivityTreeNode {
    /// Number of nodes in this subtree, including itself
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(ActivityTreeNode::size).sum::<usize>()
    }

    /// Levels below this node (0 for a leaf)
    pub fn height(&self) -> usize {
        self.children
            .iter()
            .map(|c| c.height() + 1)
            .max()
            .unwrap_or(0)
    }
}

/// Activity forest held in memory
#[derive(Debug, Default, Clone)]
pub struct ActivityForest {
    nodes: BTreeMap<i64, ActivityRow>,
    children: BTreeMap<i64, Vec<i64>>,
}

impl ActivityForest {
    /// Build the arena from flat rows
    ///
    /// Rows whose parent is not part of the set are treated as roots of
    /// the arena.
    pub fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = ActivityRow>,
    {
        let mut forest = Self::default();
        for row in rows {
            forest.nodes.insert(row.id, row);
        }

        for row in forest.nodes.values() {
            if let Some(parent_id) = row.parent_id {
                forest.children.entry(parent_id).or_default().push(row.id);
            }
        }
        // BTreeMap iteration already yields ascending ids per parent

        forest
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: i64) -> Option<&ActivityRow> {
        self.nodes.get(&id)
    }

    /// Direct children, ascending by id
    pub fn children_of(&self, id: i64) -> &[i64] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nodes without a parent inside the arena
    pub fn roots(&self) -> Vec<i64> {
        self.nodes
            .values()
            .filter(|row| match row.parent_id {
                None => true,
                Some(parent_id) => !self.nodes.contains_key(&parent_id),
            })
            .map(|row| row.id)
            .collect()
    }

    /// Ancestors of `id`, nearest first
    pub fn ancestors(&self, id: i64) -> Result<Vec<i64>, DirectoryError> {
        let mut chain = Vec::new();
        let mut current = self.nodes.get(&id).and_then(|row| row.parent_id);

        while let Some(parent_id) = current {
            if chain.len() >= WALK_BOUND {
                return Err(DirectoryError::CorruptHierarchy(format!(
                    "ancestor chain of activity {} exceeds {} links",
                    id, WALK_BOUND
                )));
            }
            chain.push(parent_id);
            current = self.nodes.get(&parent_id).and_then(|row| row.parent_id);
        }

        Ok(chain)
    }

    /// Number of ancestors of `id`
    pub fn depth(&self, id: i64) -> Result<usize, DirectoryError> {
        Ok(self.ancestors(id)?.len())
    }

    /// Greatest depth of any node (0 for an empty or flat forest)
    pub fn max_depth(&self) -> Result<usize, DirectoryError> {
        let mut max = 0;
        for id in self.nodes.keys() {
            max = max.max(self.depth(*id)?);
        }
        Ok(max)
    }

    /// All nodes below `id`, breadth-first
    pub fn descendants(&self, id: i64) -> Vec<i64> {
        let mut out = Vec::new();
        let mut frontier = vec![id];
        let mut level = 0;

        while !frontier.is_empty() && level < WALK_BOUND {
            let mut next = Vec::new();
            for node in frontier {
                next.extend_from_slice(self.children_of(node));
            }
            out.extend_from_slice(&next);
            frontier = next;
            level += 1;
        }

        out
    }

    /// Nested view of `id` and up to `max_depth` levels below it
    pub fn subtree(&self, id: i64, max_depth: usize) -> Option<ActivityTreeNode> {
        let row = self.nodes.get(&id)?;

        let children = if max_depth == 0 {
            Vec::new()
        } else {
            self.children_of(id)
                .iter()
                .filter_map(|child| self.subtree(*child, max_depth - 1))
                .collect()
        };

        Some(ActivityTreeNode {
            id: row.id,
            name: row.name.clone(),
            parent_id: row.parent_id,
            children,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: i64, parent_id: Option<i64>) -> ActivityRow {
        ActivityRow {
            id,
            name: format!("Activity {}", id),
            parent_id,
        }
    }

    fn sample() -> ActivityForest {
        // 1 ── 2 ── 4
        //  └── 3
        // 5
        ActivityForest::from_rows(vec![
            row(4, Some(2)),
            row(1, None),
            row(3, Some(1)),
            row(2, Some(1)),
            row(5, None),
        ])
    }

    #[test]
    fn test_children_are_sorted() {
        let forest = sample();
        assert_eq!(forest.children_of(1), &[2, 3]);
        assert_eq!(forest.children_of(4), &[] as &[i64]);
        assert_eq!(forest.roots(), vec![1, 5]);
    }

    #[test]
    fn test_depths() {
        let forest = sample();
        assert_eq!(forest.depth(1).unwrap(), 0);
        assert_eq!(forest.depth(4).unwrap(), 2);
        assert_eq!(forest.ancestors(4).unwrap(), vec![2, 1]);
        assert_eq!(forest.max_depth().unwrap(), 2);
    }

    #[test]
    fn test_subtree_respects_depth_limit() {
        let forest = sample();
        let full = forest.subtree(1, 3).unwrap();
        assert_eq!(full.size(), 4);
        assert_eq!(full.height(), 2);

        let shallow = forest.subtree(1, 1).unwrap();
        assert_eq!(shallow.size(), 3);
        assert!(shallow.children.iter().all(|c| c.children.is_empty()));

        assert!(forest.subtree(99, 3).is_none());
    }

    #[test]
    fn test_descendants_breadth_first() {
        let forest = sample();
        assert_eq!(forest.descendants(1), vec![2, 3, 4]);
        assert!(forest.descendants(5).is_empty());
    }

    #[test]
    fn test_cycle_is_reported_not_looped() {
        let forest = ActivityForest::from_rows(vec![row(1, Some(2)), row(2, Some(1))]);
        assert!(matches!(
            forest.ancestors(1),
            Err(DirectoryError::CorruptHierarchy(_))
        ));
        assert!(forest.roots().is_empty());
    }

    #[test]
    fn test_partial_rows_make_local_roots() {
        let forest = ActivityForest::from_rows(vec![row(2, Some(1)), row(4, Some(2))]);
        assert_eq!(forest.roots(), vec![2]);
        assert_eq!(forest.subtree(2, 3).unwrap().size(), 2);
    }
}
