//! Org Directory - organizations, buildings and an activity taxonomy
//!
//! A small directory service over SQLite that answers hierarchical and
//! geographic searches.
//!
//! ## Architecture
//!
//! - **Hierarchy integrity**: every write that sets an activity's parent is
//!   checked (self reference, cycle, depth) inside the same `BEGIN IMMEDIATE`
//!   transaction that performs it
//! - **Hierarchy queries**: ancestor chains, bounded descendant closures and
//!   tree assembly over an arena keyed by id
//! - **Geo filter**: great-circle radius and inclusive degree rectangles, also
//!   registered as SQL functions
//! - **Directory read model**: organizations with building, phones and
//!   activity tags, searched by building, activity, branch, name or area
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/org-directory/
//! ├── directory.db       # SQLite database (WAL mode)
//! └── config.toml        # Optional configuration
//! ```

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod geo;
pub mod hierarchy;
pub mod http;
pub mod params;
pub mod seed;
pub mod services;

pub use auth::ApiKeyValidator;
pub use config::Config;
pub use db::DirectoryDb;
pub use error::DirectoryError;
pub use http::HttpServer;
pub use seed::{seed, SeedPlan, SeedReport};
pub use services::Services;
