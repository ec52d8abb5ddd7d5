//! Org Directory Daemon
//!
//! Serves the directory HTTP API, or fills a database with fixtures.
//!
//! ## Usage
//!
//! ```bash
//! # Start the API (the key is required)
//! org-directory --api-key secret
//!
//! # Custom config, port and database
//! org-directory --config /etc/org-directory.toml --http-port 8080 \
//!     --database-path /data/directory.db serve
//!
//! # Seed an empty database
//! org-directory seed --organizations 500 --rng-seed 7
//! ```
//!
//! ## HTTP API
//!
//! - `GET /health` - Health check (no key)
//! - `/api/activities`, `/api/buildings`, `/api/organizations` - see `http`

use clap::{Parser, Subcommand};
use org_directory::{seed, ApiKeyValidator, Config, DirectoryDb, HttpServer, SeedPlan, Services};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "org-directory")]
#[command(about = "Organization directory with activity taxonomy and geo search")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, env = "DATABASE_PATH")]
    database_path: Option<PathBuf>,

    /// Address the HTTP API binds to
    #[arg(long)]
    bind_address: Option<String>,

    /// HTTP API port
    #[arg(long, env = "HTTP_PORT")]
    http_port: Option<u16>,

    /// Pre-shared key expected in the X-API-Key header
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default)
    Serve,

    /// Populate an empty database with fixtures
    Seed {
        #[arg(long, default_value_t = 15)]
        buildings: usize,

        /// Root activities
        #[arg(long, default_value_t = 4)]
        roots: usize,

        /// Children per root
        #[arg(long, default_value_t = 3)]
        children: usize,

        /// Grandchildren per child
        #[arg(long, default_value_t = 2)]
        grandchildren: usize,

        #[arg(long, default_value_t = 200)]
        organizations: usize,

        /// Upper bound of phones per organization
        #[arg(long, default_value_t = 2)]
        max_phones: usize,

        #[arg(long, default_value_t = 0)]
        rng_seed: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("org_directory=info".parse()?),
        )
        .init();

    let args = Args::parse();

    // Load config
    let mut config = if let Some(config_path) = &args.config {
        Config::load(config_path)?
    } else {
        Config::default()
    };

    // Apply CLI overrides
    if let Some(path) = args.database_path {
        config.database_path = path;
    }
    if let Some(address) = args.bind_address {
        config.bind_address = address;
    }
    if let Some(port) = args.http_port {
        config.http_port = port;
    }
    if let Some(key) = args.api_key {
        config.api_key = Some(key);
    }

    let db = Arc::new(DirectoryDb::open_with_pool_size(
        &config.database_path,
        Duration::from_millis(config.busy_timeout_ms),
        config.pool_size,
    )?);

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config, db).await,
        Command::Seed {
            buildings,
            roots,
            children,
            grandchildren,
            organizations,
            max_phones,
            rng_seed,
        } => {
            let plan = SeedPlan {
                buildings,
                roots,
                children,
                grandchildren,
                organizations,
                max_phones,
                rng_seed,
            };
            let report = tokio::task::spawn_blocking(move || seed(&db, &plan)).await??;
            info!(
                activities = report.activities,
                buildings = report.buildings,
                organizations = report.organizations,
                phones = report.phones,
                "Seeding complete"
            );
            Ok(())
        }
    }
}

async fn serve(
    config: Config,
    db: Arc<DirectoryDb>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    config.validate()?;

    info!(
        database = %config.database_path.display(),
        http_port = config.http_port,
        "Starting org-directory"
    );

    let validator = ApiKeyValidator::new(config.api_key.clone().unwrap_or_default());
    let services = Arc::new(Services::new(db));

    let http_addr: SocketAddr = config.listen_addr().parse()?;
    let server = Arc::new(
        HttpServer::new(services, validator, http_addr).with_max_body_bytes(config.max_body_bytes),
    );

    info!("HTTP API available at http://{}", http_addr);

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server failed");
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    Ok(())
}
