//! Service layer for org-directory
//!
//! Services sit between HTTP handlers and repositories. Each one wraps
//! database operations with:
//! - Input validation
//! - Name-to-id resolution
//! - Transaction boundaries (snapshot reads, immediate writes)
//!
//! ## Architecture
//!
//! ```text
//! HTTP Handlers (thin)
//!     ↓
//! Service Layer (validation, transactions)
//!     ↓
//! Repository Layer (db/*.rs) + Hierarchy engine
//!     ↓
//! SQLite Database
//! ```

pub mod response;
pub mod pagination;
pub mod activity_service;
pub mod building_service;
pub mod directory_service;

// Re-exports
pub use response::*;
pub use pagination::Page;
pub use activity_service::ActivityService;
pub use building_service::BuildingService;
pub use directory_service::{ActivityRef, DirectoryService};

use crate::db::DirectoryDb;
use std::sync::Arc;

/// Service container for dependency injection
///
/// Holds all services over one shared connection pool.
/// Pass this to HttpServer for handler access.
pub struct Services {
    pub db: Arc<DirectoryDb>,
    pub activities: Arc<ActivityService>,
    pub buildings: Arc<BuildingService>,
    pub directory: Arc<DirectoryService>,
}

impl Services {
    /// Create all services with shared database
    pub fn new(db: Arc<DirectoryDb>) -> Self {
        Self {
            activities: Arc::new(ActivityService::new(db.clone())),
            buildings: Arc::new(BuildingService::new(db.clone())),
            directory: Arc::new(DirectoryService::new(db.clone())),
            db,
        }
    }
}
