//! Activity hierarchy
//!
//! The taxonomy is a forest of at most [`MAX_LEVELS`] levels: roots, their
//! children and grandchildren.
//!
//! - [`integrity`] - gate run inside every write that sets a parent
//! - [`query`] - ancestor chains, descendant closures, bounded tree fetch
//! - [`tree`] - arena of nodes keyed by id for assembling nested views

pub mod integrity;
pub mod query;
pub mod tree;

/// Maximum number of levels in the taxonomy (root = level 1)
pub const MAX_LEVELS: usize = 3;

/// Extra steps a walk may take past [`MAX_LEVELS`] before the data is
/// declared corrupt
pub const WALK_SAFETY_MARGIN: usize = 4;

/// Hard bound on any parent or child walk
pub const WALK_BOUND: usize = MAX_LEVELS + WALK_SAFETY_MARGIN;

/// Levels below a node returned by the tree fetch
pub const TREE_FETCH_DEPTH: usize = 3;

pub use integrity::check_parent_assignment;
pub use query::{ancestor_chain, branch_ids, descendants, fetch_tree, subtree_height, ActivityTree};
pub use tree::{ActivityForest, ActivityTreeNode};
