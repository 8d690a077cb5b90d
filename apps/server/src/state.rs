//! Shared application state

use crate::{config::Config, services::ConversionService, Result};
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct AppStateOptions {
    pub run_migrations: bool,
}

impl Default for AppStateOptions {
    fn default() -> Self {
        Self {
            run_migrations: true,
        }
    }
}

/// Shared application state passed to all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db_pool: PgPool,
    pub conversion: Arc<ConversionService>,
}

impl AppState {
    /// Initialize the application state
    pub async fn new(config: Config) -> Result<Self> {
        Self::new_with_options(config, AppStateOptions::default()).await
    }

    pub async fn new_with_options(config: Config, options: AppStateOptions) -> Result<Self> {
        tracing::info!("Initializing application state...");

        let config = Arc::new(config);
        let db_pool = create_db_pool(config.as_ref()).await?;

        if options.run_migrations {
            tracing::info!("Running database migrations...");
            sqlx::migrate!("./migrations")
                .run(&db_pool)
                .await
                .map_err(|e| crate::Error::Internal(format!("Migration failed: {e}")))?;
        }

        let conversion = Arc::new(ConversionService::new(
            db_pool.clone(),
            config.conversion.clone(),
        ));

        tracing::info!("Application state initialized successfully");

        Ok(Self {
            config,
            db_pool,
            conversion,
        })
    }

    /// Build a state around an existing pool. Used by tests and tooling
    /// that manage connections themselves; runs no migrations.
    pub fn with_pool(config: Config, db_pool: PgPool) -> Self {
        let config = Arc::new(config);
        let conversion = Arc::new(ConversionService::new(
            db_pool.clone(),
            config.conversion.clone(),
        ));

        Self {
            config,
            db_pool,
            conversion,
        }
    }
}

async fn create_db_pool(config: &Config) -> Result<PgPool> {
    tracing::info!("Creating database connection pool...");

    let statement_timeout = config.database.statement_timeout_seconds;
    let lock_timeout = config.database.lock_timeout_seconds;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .min_connections(config.database.pool_min_size)
        .max_connections(config.database.pool_max_size)
        .acquire_timeout(std::time::Duration::from_secs(
            config.database.pool_timeout_seconds,
        ))
        .after_connect(move |conn, _meta| {
            Box::pin(async move {
                // Session-wide bounds; the conversion engine narrows both
                // per transaction with SET LOCAL.
                sqlx::query(&format!("SET statement_timeout = '{}s'", statement_timeout))
                    .execute(&mut *conn)
                    .await?;

                sqlx::query(&format!("SET lock_timeout = '{}s'", lock_timeout))
                    .execute(&mut *conn)
                    .await?;

                Ok(())
            })
        })
        .connect(&config.database.url)
        .await?;

    tracing::info!(
        "Database pool created (min: {}, max: {})",
        config.database.pool_min_size,
        config.database.pool_max_size
    );

    Ok(pool)
}
