//! SQLite store for the directory
//!
//! An r2d2 pool of rusqlite connections, shared by every service through
//! `Arc<DirectoryDb>`. File databases run in WAL mode, so snapshot reads on
//! one pooled connection proceed while another connection holds the write
//! lock.
//!
//! ## Tables
//!
//! - `activities` - Activity taxonomy (self-referencing `parent_id`)
//! - `buildings` - Addresses with WGS84 coordinates
//! - `organizations` - Organizations, each in exactly one building
//! - `organization_phones` - Phone numbers owned by an organization
//! - `organization_activities` - Organization to activity tags
//!
//! ## Transactions
//!
//! - [`DirectoryDb::with_snapshot`] wraps reads in a deferred transaction so a
//!   request sees one consistent state.
//! - [`DirectoryDb::with_write`] opens `BEGIN IMMEDIATE`, runs the closure and
//!   commits only on `Ok`. Hierarchy checks run inside that transaction, and
//!   `IMMEDIATE` serializes them across connections and processes.
//! - A handle made by [`DirectoryDb::scoped`] carries a cancellation token;
//!   once it fires, new work is refused and a pending write rolls back
//!   instead of committing.

pub mod schema;
pub mod activities;
pub mod buildings;
pub mod organizations;

use std::path::Path;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::functions::FunctionFlags;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::DirectoryError;
use crate::geo;

/// Connection pool type
pub type DbPool = Pool<SqliteConnectionManager>;

/// Pooled connection type
pub type PooledConn = PooledConnection<SqliteConnectionManager>;

/// Pool size used by [`DirectoryDb::open`]
pub const DEFAULT_POOL_SIZE: u32 = 8;

/// SQLite database for the directory
#[derive(Clone)]
pub struct DirectoryDb {
    pool: DbPool,
    cancel: Option<CancellationToken>,
}

impl DirectoryDb {
    /// Open or create the database file
    pub fn open(db_path: &Path, busy_timeout: Duration) -> Result<Self, DirectoryError> {
        Self::open_with_pool_size(db_path, busy_timeout, DEFAULT_POOL_SIZE)
    }

    /// Open or create the database file with `pool_size` connections
    pub fn open_with_pool_size(
        db_path: &Path,
        busy_timeout: Duration,
        pool_size: u32,
    ) -> Result<Self, DirectoryError> {
        info!(pool_size, "Opening SQLite database at {:?}", db_path);

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let manager = SqliteConnectionManager::file(db_path).with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
            prepare_connection(conn)
        });

        Self::from_manager(manager, pool_size)
    }

    /// Open an in-memory database (for testing)
    ///
    /// Every in-memory connection is its own database, so the pool holds one.
    pub fn open_in_memory() -> Result<Self, DirectoryError> {
        debug!("Opening in-memory SQLite database");
        let manager = SqliteConnectionManager::memory().with_init(|conn| prepare_connection(conn));
        Self::from_manager(manager, 1)
    }

    fn from_manager(manager: SqliteConnectionManager, pool_size: u32) -> Result<Self, DirectoryError> {
        let pool = Pool::builder()
            .max_size(pool_size.max(1))
            .build(manager)
            .map_err(|e| DirectoryError::Internal(format!("Failed to create pool: {}", e)))?;

        let db = Self { pool, cancel: None };
        schema::init_schema(&*db.conn()?)?;
        Ok(db)
    }

    /// Handle on the same pool whose work stops once `cancel` fires
    pub fn scoped(&self, cancel: CancellationToken) -> Self {
        Self {
            pool: self.pool.clone(),
            cancel: Some(cancel),
        }
    }

    /// Get a connection from the pool
    fn conn(&self) -> Result<PooledConn, DirectoryError> {
        self.pool
            .get()
            .map_err(|e| DirectoryError::Internal(format!("Failed to get connection: {}", e)))
    }

    fn ensure_active(&self) -> Result<(), DirectoryError> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(DirectoryError::Cancelled),
            _ => Ok(()),
        }
    }

    /// Run read-only work against one consistent snapshot
    pub fn with_snapshot<F, T>(&self, f: F) -> Result<T, DirectoryError>
    where
        F: FnOnce(&Connection) -> Result<T, DirectoryError>,
    {
        self.ensure_active()?;
        let mut conn = self.conn()?;

        let tx = conn.transaction()?;
        let result = f(&tx)?;
        // Nothing was written; finishing the transaction just releases the snapshot
        tx.finish()?;
        Ok(result)
    }

    /// Run a write inside `BEGIN IMMEDIATE`; any `Err` rolls the whole write back
    pub fn with_write<F, T>(&self, f: F) -> Result<T, DirectoryError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, DirectoryError>,
    {
        self.ensure_active()?;
        let mut conn = self.conn()?;

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = f(&tx)?;
        // Dropping `tx` without commit rolls back
        self.ensure_active()?;
        tx.commit()?;
        Ok(result)
    }

    /// Get database statistics
    pub fn stats(&self) -> Result<DbStats, DirectoryError> {
        self.with_snapshot(|conn| {
            let count = |table: &str| -> Result<u64, DirectoryError> {
                let n: i64 =
                    conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                        row.get(0)
                    })?;
                Ok(n as u64)
            };

            Ok(DbStats {
                activity_count: count("activities")?,
                building_count: count("buildings")?,
                organization_count: count("organizations")?,
                phone_count: count("organization_phones")?,
            })
        })
    }
}

/// Per-connection setup run by the pool
fn prepare_connection(conn: &mut Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    register_functions(conn)
}

/// Register the scalar functions used by queries
///
/// - `geo_within_radius(lat0, lon0, radius_km, lat, lon)` - [`geo::RadiusQuery::contains`]
/// - `geo_in_box(min_lat, max_lat, min_lon, max_lon, lat, lon)` - [`geo::BoundingBox::contains`]
/// - `casefold(text)` - Unicode lowercase, for case-insensitive name lookups
fn register_functions(conn: &Connection) -> Result<(), rusqlite::Error> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

    conn.create_scalar_function("geo_within_radius", 5, flags, |ctx| {
        let query = geo::RadiusQuery {
            center: geo::Coordinate::new(ctx.get::<f64>(0)?, ctx.get::<f64>(1)?),
            radius_km: ctx.get::<f64>(2)?,
        };
        let point = geo::Coordinate::new(ctx.get::<f64>(3)?, ctx.get::<f64>(4)?);
        Ok(query.contains(point))
    })?;

    conn.create_scalar_function("geo_in_box", 6, flags, |ctx| {
        let bbox = geo::BoundingBox {
            min_latitude: ctx.get::<f64>(0)?,
            max_latitude: ctx.get::<f64>(1)?,
            min_longitude: ctx.get::<f64>(2)?,
            max_longitude: ctx.get::<f64>(3)?,
        };
        let point = geo::Coordinate::new(ctx.get::<f64>(4)?, ctx.get::<f64>(5)?);
        Ok(bbox.contains(point))
    })?;

    conn.create_scalar_function("casefold", 1, flags, |ctx| {
        let text: Option<String> = ctx.get(0)?;
        Ok(text.map(|t| t.to_lowercase()))
    })?;

    Ok(())
}

/// Database statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub activity_count: u64,
    pub building_count: u64,
    pub organization_count: u64,
    pub phone_count: u64,
}

// Re-exports
pub use activities::{ActivityRow, CreateActivityInput, UpdateActivityInput};
pub use buildings::{BuildingRow, CreateBuildingInput};
pub use organizations::{CreateOrganizationInput, OrganizationView, PhoneRow};
