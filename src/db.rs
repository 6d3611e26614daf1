use crate::config::{AppConfig, RetryPolicy};
use crate::errors::ServiceError;
use crate::metrics;
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr, SqlErr,
};
use sea_orm_migration::MigratorTrait;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

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

impl From<&AppConfig> for DbConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            url: cfg.database_url.clone(),
            max_connections: cfg.db_max_connections,
            min_connections: cfg.db_min_connections,
            connect_timeout: Duration::from_secs(cfg.db_connect_timeout_secs),
            idle_timeout: Duration::from_secs(cfg.db_idle_timeout_secs),
            acquire_timeout: Duration::from_secs(cfg.db_acquire_timeout_secs),
        }
    }
}

/// Establishes a connection pool with default pool settings.
pub async fn establish_connection(database_url: &str) -> Result<DbPool, ServiceError> {
    let config = DbConfig {
        url: database_url.to_string(),
        ..Default::default()
    };

    establish_connection_with_config(&config).await
}

/// Establishes a connection pool to the database with custom configuration
pub async fn establish_connection_with_config(config: &DbConfig) -> Result<DbPool, ServiceError> {
    debug!("Configuring database connection with: {:?}", config);

    let mut opt = ConnectOptions::new(config.url.clone());
    opt.max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(config.connect_timeout)
        .acquire_timeout(config.acquire_timeout)
        .idle_timeout(config.idle_timeout)
        .sqlx_logging(false);

    info!(
        "Connecting to database with max_connections={}",
        config.max_connections
    );

    let db_pool = Database::connect(opt).await.map_err(|e| {
        error!("Database connection establishment failed: {}", e);
        ServiceError::db_error(e)
    })?;

    info!("Database connection pool established successfully");
    Ok(db_pool)
}

/// Establish DB pool using AppConfig tuning
pub async fn establish_connection_from_app_config(cfg: &AppConfig) -> Result<DbPool, ServiceError> {
    let db_cfg: DbConfig = cfg.into();
    establish_connection_with_config(&db_cfg).await
}

/// Runs the embedded schema migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<(), ServiceError> {
    info!("Running database migrations");
    let start = Instant::now();

    let result = crate::migrator::Migrator::up(pool, None)
        .await
        .map_err(ServiceError::db_error);

    let elapsed = start.elapsed();
    match &result {
        Ok(_) => info!(
            "Database migrations completed successfully in {:?}",
            elapsed
        ),
        Err(e) => error!("Database migrations failed after {:?}: {}", elapsed, e),
    }

    result
}

/// Checks if the database connection is active
pub async fn check_connection(pool: &DbPool) -> Result<(), ServiceError> {
    debug!("Checking database connection");
    pool.ping().await.map_err(|e| {
        error!("Database connection check failed: {}", e);
        ServiceError::db_error(e)
    })
}

/// Whether the backend understands `SELECT ... FOR UPDATE`.
/// SQLite serializes writers on its own and rejects the clause.
pub fn supports_row_locks<C: ConnectionTrait>(conn: &C) -> bool {
    matches!(
        conn.get_database_backend(),
        DbBackend::Postgres | DbBackend::MySql
    )
}

pub fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// Transaction lost a lock race: SQLite's `SQLITE_BUSY`/`SQLITE_LOCKED`, or a
/// Postgres serialization failure or deadlock.
pub fn is_lock_contention(err: &DbErr) -> bool {
    let message = err.to_string();
    [
        "database is locked",
        "database table is locked",
        "could not serialize access",
        "deadlock detected",
    ]
    .iter()
    .any(|needle| message.contains(needle))
}

/// Runs `op` and re-runs it from scratch when it fails with a retryable
/// error (see [`ServiceError::is_retryable`]), up to `policy.max_retries` times.
///
/// `op` must open and commit its own transaction on every call so that a retry
/// observes fresh rows.
pub async fn with_retry<T, F, Fut>(
    policy: RetryPolicy,
    operation: &str,
    mut op: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match op().await {
            Err(err) if err.is_retryable() => {
                metrics::CONCURRENT_MODIFICATIONS.inc();
                if attempt >= policy.max_retries {
                    warn!(
                        operation = %operation,
                        error = %err,
                        attempts = attempt + 1,
                        "Giving up after repeated concurrent modifications"
                    );
                    return Err(err);
                }
                attempt += 1;
                debug!(
                    operation = %operation,
                    error = %err,
                    attempt,
                    "Concurrent modification detected, retrying"
                );
                let delay = policy.delay_for(attempt);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    #[tokio::test]
    async fn retries_until_the_operation_succeeds() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::ZERO);

        let result = with_retry(policy, "test", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(ServiceError::ConcurrentModification(Uuid::nil()))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_after_max_retries() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(2, Duration::ZERO);

        let result: Result<(), _> = with_retry(policy, "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ServiceError::ConcurrentModification(Uuid::nil()))
        })
        .await;

        assert!(matches!(result, Err(ServiceError::ConcurrentModification(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn lock_contention_is_retried() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(3, Duration::ZERO);

        let result = with_retry(policy, "test", || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(ServiceError::db_error(DbErr::Custom(
                    "database is locked".into(),
                )))
            } else {
                Ok(())
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn recognises_lock_contention_messages() {
        assert!(is_lock_contention(&DbErr::Custom(
            "error returned from database: (code: 517) database is locked".into()
        )));
        assert!(is_lock_contention(&DbErr::Custom(
            "could not serialize access due to concurrent update".into()
        )));
        assert!(!is_lock_contention(&DbErr::Custom("syntax error".into())));
        assert!(!is_lock_contention(&DbErr::RecordNotFound("x".into())));
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = with_retry(RetryPolicy::default(), "test", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(ServiceError::NotFound("gone".into()))
        })
        .await;

        assert!(matches!(result, Err(ServiceError::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
