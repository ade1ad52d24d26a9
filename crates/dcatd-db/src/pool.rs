//! Database connection pool management.

use std::time::{Duration, Instant};

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use dcatd_core::{logging, Error, Result};

/// Default maximum number of connections in the pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 6;

/// Default connection timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 60;

/// Default idle timeout in seconds.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default number of startup connection attempts.
pub const DEFAULT_CONNECT_MAX_TRIES: u32 = 5;

/// Default pause between startup connection attempts in seconds.
pub const DEFAULT_CONNECT_RETRY_INTERVAL_SECS: u64 = 2;

/// Pool configuration options.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Minimum number of connections to maintain.
    pub min_connections: u32,
    /// Connection timeout duration.
    pub connect_timeout: Duration,
    /// Idle connection timeout duration.
    pub idle_timeout: Duration,
    /// Maximum connection lifetime.
    pub max_lifetime: Option<Duration>,
    /// Attempts to establish the pool before giving up.
    pub connect_max_tries: u32,
    /// Pause between failed attempts.
    pub connect_retry_interval: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: 0,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            max_lifetime: Some(Duration::from_secs(1800)), // 30 minutes
            connect_max_tries: DEFAULT_CONNECT_MAX_TRIES,
            connect_retry_interval: Duration::from_secs(DEFAULT_CONNECT_RETRY_INTERVAL_SECS),
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of connections.
    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    /// Set the minimum number of connections.
    pub fn min_connections(mut self, n: u32) -> Self {
        self.min_connections = n;
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the idle connection timeout.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the maximum connection lifetime.
    pub fn max_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    /// Set the startup retry policy. `tries` is clamped to at least 1.
    pub fn connect_retry(mut self, tries: u32, interval: Duration) -> Self {
        self.connect_max_tries = tries.max(1);
        self.connect_retry_interval = interval;
        self
    }
}

/// Create a new PostgreSQL connection pool with default configuration.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    create_pool_with_config(database_url, PoolConfig::default()).await
}

/// Create a new PostgreSQL connection pool, retrying at a fixed interval.
///
/// Only startup is retried. Once every attempt has failed the last error
/// is returned and the caller is expected to exit.
pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let start = Instant::now();

    info!(
        subsystem = logging::SUBSYSTEM_DATABASE,
        component = "pool",
        op = "create",
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        connect_timeout_secs = config.connect_timeout.as_secs(),
        idle_timeout_secs = config.idle_timeout.as_secs(),
        connect_max_tries = config.connect_max_tries,
        "Creating database connection pool"
    );

    let tries = config.connect_max_tries.max(1);
    let mut attempt = 1;
    let pool = loop {
        let mut options = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(config.idle_timeout);

        if let Some(max_lifetime) = config.max_lifetime {
            options = options.max_lifetime(max_lifetime);
        }

        match options.connect(database_url).await {
            Ok(pool) => break pool,
            Err(e) if attempt < tries => {
                warn!(
                    subsystem = logging::SUBSYSTEM_DATABASE,
                    component = "pool",
                    op = "connect",
                    attempt,
                    error = %e,
                    retry_in_secs = config.connect_retry_interval.as_secs(),
                    "Database connection failed, retrying"
                );
                tokio::time::sleep(config.connect_retry_interval).await;
                attempt += 1;
            }
            Err(e) => return Err(Error::Database(e)),
        }
    };

    info!(
        subsystem = logging::SUBSYSTEM_DATABASE,
        component = "pool",
        op = "established",
        attempt,
        pool_size = pool.size(),
        pool_idle = pool.num_idle(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Database connection pool established"
    );
    Ok(pool)
}

/// Log current pool health metrics.
///
/// Emits structured debug-level log with pool size, idle count,
/// and warns if idle connections drop below 1 (potential exhaustion).
pub fn log_pool_metrics(pool: &PgPool) {
    let size = pool.size();
    let idle = pool.num_idle();

    debug!(
        subsystem = logging::SUBSYSTEM_DATABASE,
        component = "pool",
        op = "metrics",
        pool_size = size,
        pool_idle = idle,
        "Pool health check"
    );

    if idle == 0 && size > 0 {
        warn!(
            subsystem = logging::SUBSYSTEM_DATABASE,
            component = "pool",
            pool_size = size,
            "Connection pool has no idle connections, potential exhaustion"
        );
    }
}
