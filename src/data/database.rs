//! SQLite database operations
//!
//! All database access goes through this module.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use std::time::Duration;

use super::models::*;
use super::store::UserStore;
use crate::auth::{IdentityClaim, Provider};
use crate::error::AppError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_CONNECTIONS: u32 = 5;

fn connect_options(url: &str) -> Result<SqliteConnectOptions, AppError> {
    let options = SqliteConnectOptions::from_str(url)
        .map_err(|e| AppError::Config(format!("invalid database.url: {e}")))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);
    Ok(options)
}

fn pool_options(url: &str) -> SqlitePoolOptions {
    // Every connection to an in-memory database is its own database.
    let max_connections = if url.contains(":memory:") {
        1
    } else {
        MAX_CONNECTIONS
    };

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
}

/// Database connection pool wrapper.
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    // =========================================================================
    // Connection
    // =========================================================================

    /// Connect to SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Arguments
    /// * `url` - SQLite connection string
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(url: &str) -> Result<Self, AppError> {
        let options = connect_options(url)?;
        let pool = pool_options(url).connect_with(options).await?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| {
                tracing::error!("Migration failed: {}", e);
                AppError::Internal(anyhow::anyhow!("Migration failed: {}", e))
            })?;

        tracing::info!("Database connected and migrated successfully");

        Ok(Self { pool })
    }

    /// Connect at startup without letting a store outage stop the server
    ///
    /// If the store cannot be reached the error is logged and a lazily
    /// connecting pool is returned instead; every later store access then
    /// fails with a database error.
    ///
    /// # Errors
    /// Only a malformed connection string is fatal.
    pub async fn connect_or_lazy(url: &str) -> Result<Self, AppError> {
        match Self::connect(url).await {
            Ok(db) => Ok(db),
            Err(error) => {
                tracing::error!(%error, "User store unavailable; serving without it");
                let options = connect_options(url)?;
                let pool = pool_options(url).connect_lazy_with(options);
                Ok(Self { pool })
            }
        }
    }

    /// Borrow the underlying pool
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Count all users
    pub async fn count_users(&self) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Store a new session
    ///
    /// # Arguments
    /// * `session` - Session row; `id_hash` must already be hashed
    pub async fn create_session(&self, session: &SessionRecord) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id_hash, user_id, created_at, expires_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&session.id_hash)
        .bind(&session.user_id)
        .bind(session.created_at)
        .bind(session.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Get the user id behind a session, ignoring expired sessions
    pub async fn get_session_user_id(
        &self,
        id_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<String>, AppError> {
        let session =
            sqlx::query_as::<_, SessionRecord>("SELECT * FROM sessions WHERE id_hash = ?")
                .bind(id_hash)
                .fetch_optional(&self.pool)
                .await?;

        Ok(session
            .filter(|session| session.expires_at > now)
            .map(|session| session.user_id))
    }

    /// Delete a session
    ///
    /// # Returns
    /// Whether a session was removed
    pub async fn delete_session(&self, id_hash: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id_hash = ?")
            .bind(id_hash)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete every session that expired at or before `now`
    ///
    /// # Returns
    /// Number of sessions removed
    pub async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl UserStore for Database {
    async fn find_by_external_id(
        &self,
        provider: Provider,
        external_id: &str,
    ) -> Result<Option<User>, AppError> {
        let query = format!("SELECT * FROM users WHERE {} = ?", provider.id_column());
        let user = sqlx::query_as::<_, User>(&query)
            .bind(external_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }

    async fn create_if_absent(&self, claim: &IdentityClaim) -> Result<Option<User>, AppError> {
        let user = User::from_claim(claim);

        // The unique provider id indexes turn a concurrent duplicate into a no-op.
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO users (
                id, google_id, twitter_id, github_id, username, created_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.google_id)
        .bind(&user.twitter_id)
        .bind(&user.github_id)
        .bind(&user.username)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }

    async fn get_user(&self, id: &str) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(user)
    }
}
