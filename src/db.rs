use crate::config::AppConfig;
use crate::errors::ServiceError;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use std::time::Duration;
use tracing::{debug, error, info};

/// Type alias for a database connection pool
pub type DbPool = DatabaseConnection;

/// Configuration for database connection
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub acquire_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            acquire_timeout: Duration::from_secs(8),
        }
    }
}

/// Establishes a connection pool using explicit settings.
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    info!(
        max_connections = config.max_connections,
        "connecting to database"
    );

    let mut options = ConnectOptions::new(config.url.clone());
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .idle_timeout(config.idle_timeout)
        .acquire_timeout(config.acquire_timeout)
        .sqlx_logging(false);

    let pool = Database::connect(options).await.map_err(|e| {
        error!(error = %e, "failed to connect to database");
        ServiceError::Database(e)
    })?;

    Ok(pool)
}

/// Establishes a connection pool from the application configuration.
pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    let db_config = DbConfig {
        url: cfg.database_url.clone(),
        max_connections: cfg.db_max_connections,
        min_connections: cfg.db_min_connections,
        ..Default::default()
    };
    establish_connection_with_config(&db_config).await
}

/// Runs the embedded migrations to the latest version.
pub async fn run_migrations(pool: &DbPool) -> Result<(), ServiceError> {
    info!("running database migrations");
    let start = std::time::Instant::now();

    let result = crate::migrator::Migrator::up(pool, None)
        .await
        .map_err(ServiceError::Database);

    match &result {
        Ok(_) => info!(elapsed = ?start.elapsed(), "database migrations completed"),
        Err(e) => error!(elapsed = ?start.elapsed(), error = %e, "database migrations failed"),
    }

    result
}

/// Checks that the database connection is alive.
pub async fn check_connection(pool: &DbPool) -> Result<(), ServiceError> {
    debug!("checking database connection");
    pool.ping().await.map_err(ServiceError::Database)
}
