//! SQLite database operations
//!
//! All database access goes through this module. Every write runs in an
//! explicit transaction: it either commits as a whole or is rolled back
//! when the transaction guard is dropped on an early `?` return.

use sqlx::{Pool, Sqlite, SqlitePool};
use std::path::Path;

use super::models::*;
use crate::error::AppError;

const BRIDGE_COLUMNS: &str = r#"
    id, twitter_handle, mastodon_user, enabled,
    post_to_twitter, post_private_to_twitter, post_unlisted_to_twitter,
    post_boosts_to_twitter, split_twitter_messages, post_sensitive_behavior,
    post_to_mastodon, post_rts_to_mastodon, post_quotes_to_mastodon,
    toot_visibility, conditional_posting,
    twitter_oauth_token, twitter_oauth_secret, mastodon_access_code,
    mastodon_account_id, twitter_last_id, mastodon_last_id,
    mastodon_host_id, metadata_id, updated
"#;

/// Database connection pool wrapper.
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Connect to the SQLite database
    ///
    /// Creates the database file if it doesn't exist.
    /// Runs pending migrations automatically.
    ///
    /// # Arguments
    /// * `path` - Path to SQLite database file
    ///
    /// # Errors
    /// Returns error if connection or migration fails
    pub async fn connect(path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AppError::Database(sqlx::Error::Io(e)))?;
        }

        let connection_string = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePool::connect(&connection_string).await?;

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

    // =========================================================================
    // Mastodon hosts
    // =========================================================================

    /// Get a registered host by exact hostname
    pub async fn get_host_by_hostname(
        &self,
        hostname: &str,
    ) -> Result<Option<MastodonHost>, AppError> {
        let host = sqlx::query_as::<_, MastodonHost>(
            "SELECT id, hostname, client_id, client_secret, created_at FROM mastodonhost WHERE hostname = ?",
        )
        .bind(hostname)
        .fetch_optional(&self.pool)
        .await?;

        Ok(host)
    }

    /// Insert a host unless one with the same hostname exists
    ///
    /// Returns the row that is stored after the call: the new one, or the
    /// one a concurrent registration inserted first.
    pub async fn insert_host_if_absent(
        &self,
        hostname: &str,
        credentials: &AppCredentials,
    ) -> Result<(MastodonHost, bool), AppError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO mastodonhost (hostname, client_id, client_secret, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(hostname) DO NOTHING
            "#,
        )
        .bind(hostname)
        .bind(&credentials.client_id)
        .bind(&credentials.client_secret)
        .bind(chrono::Utc::now())
        .execute(&mut *tx)
        .await?;

        let host = sqlx::query_as::<_, MastodonHost>(
            "SELECT id, hostname, client_id, client_secret, created_at FROM mastodonhost WHERE hostname = ?",
        )
        .bind(hostname)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok((host, result.rows_affected() == 1))
    }

    /// Count registered hosts
    pub async fn count_hosts(&self) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM mastodonhost")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    // =========================================================================
    // Bridges
    // =========================================================================

    /// Find a bridge by its (twitter_handle, mastodon_user) key
    pub async fn find_bridge_by_key(&self, key: &BridgeKey) -> Result<Option<Bridge>, AppError> {
        let query = format!(
            "SELECT {BRIDGE_COLUMNS} FROM bridge WHERE twitter_handle = ? AND mastodon_user = ?"
        );
        let bridge = sqlx::query_as::<_, Bridge>(&query)
            .bind(&key.twitter_handle)
            .bind(&key.mastodon_user)
            .fetch_optional(&self.pool)
            .await?;

        Ok(bridge)
    }

    /// Insert a new bridge with its initial cursors
    ///
    /// If a row with the same key appeared since the caller looked, the
    /// row is updated with `new.changes` instead and its cursors are kept.
    ///
    /// # Returns
    /// The stored bridge and whether a row was inserted
    pub async fn insert_bridge(&self, new: &NewBridge) -> Result<(Bridge, bool), AppError> {
        let mut tx = self.pool.begin().await?;

        let existed: bool = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM bridge WHERE twitter_handle = ? AND mastodon_user = ?",
        )
        .bind(&new.key.twitter_handle)
        .bind(&new.key.mastodon_user)
        .fetch_one(&mut *tx)
        .await?
            > 0;

        let changes = &new.changes;
        let settings = &changes.settings;
        sqlx::query(
            r#"
            INSERT INTO bridge (
                twitter_handle, mastodon_user, enabled,
                post_to_twitter, post_private_to_twitter, post_unlisted_to_twitter,
                post_boosts_to_twitter, split_twitter_messages, post_sensitive_behavior,
                post_to_mastodon, post_rts_to_mastodon, post_quotes_to_mastodon,
                toot_visibility, conditional_posting,
                twitter_oauth_token, twitter_oauth_secret, mastodon_access_code,
                mastodon_account_id, twitter_last_id, mastodon_last_id,
                mastodon_host_id, updated
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(twitter_handle, mastodon_user) DO UPDATE SET
                enabled = excluded.enabled,
                post_to_twitter = excluded.post_to_twitter,
                post_private_to_twitter = excluded.post_private_to_twitter,
                post_unlisted_to_twitter = excluded.post_unlisted_to_twitter,
                post_boosts_to_twitter = excluded.post_boosts_to_twitter,
                split_twitter_messages = excluded.split_twitter_messages,
                post_sensitive_behavior = excluded.post_sensitive_behavior,
                post_to_mastodon = excluded.post_to_mastodon,
                post_rts_to_mastodon = excluded.post_rts_to_mastodon,
                post_quotes_to_mastodon = excluded.post_quotes_to_mastodon,
                toot_visibility = excluded.toot_visibility,
                conditional_posting = excluded.conditional_posting,
                twitter_oauth_token = excluded.twitter_oauth_token,
                twitter_oauth_secret = excluded.twitter_oauth_secret,
                mastodon_access_code = excluded.mastodon_access_code,
                mastodon_host_id = excluded.mastodon_host_id,
                updated = excluded.updated
            "#,
        )
        .bind(&new.key.twitter_handle)
        .bind(&new.key.mastodon_user)
        .bind(changes.enabled)
        .bind(settings.post_to_twitter)
        .bind(settings.post_private_to_twitter)
        .bind(settings.post_unlisted_to_twitter)
        .bind(settings.post_boosts_to_twitter)
        .bind(settings.split_twitter_messages)
        .bind(settings.post_sensitive_behavior)
        .bind(settings.post_to_mastodon)
        .bind(settings.post_rts_to_mastodon)
        .bind(settings.post_quotes_to_mastodon)
        .bind(settings.toot_visibility)
        .bind(settings.conditional_posting)
        .bind(&changes.twitter_oauth_token)
        .bind(&changes.twitter_oauth_secret)
        .bind(&changes.mastodon_access_code)
        .bind(&new.mastodon_account_id)
        .bind(new.cursors.twitter_last_id)
        .bind(new.cursors.mastodon_last_id)
        .bind(changes.mastodon_host_id)
        .bind(changes.updated)
        .execute(&mut *tx)
        .await?;

        let query = format!(
            "SELECT {BRIDGE_COLUMNS} FROM bridge WHERE twitter_handle = ? AND mastodon_user = ?"
        );
        let bridge = sqlx::query_as::<_, Bridge>(&query)
            .bind(&new.key.twitter_handle)
            .bind(&new.key.mastodon_user)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok((bridge, !existed))
    }

    /// Update the settings, credentials and host of an existing bridge
    ///
    /// Cursor columns are never part of this statement.
    ///
    /// # Returns
    /// The updated bridge, or `None` if no row matches the key
    pub async fn update_bridge(
        &self,
        key: &BridgeKey,
        changes: &BridgeChanges,
    ) -> Result<Option<Bridge>, AppError> {
        let mut tx = self.pool.begin().await?;

        let settings = &changes.settings;
        let result = sqlx::query(
            r#"
            UPDATE bridge SET
                enabled = ?,
                post_to_twitter = ?,
                post_private_to_twitter = ?,
                post_unlisted_to_twitter = ?,
                post_boosts_to_twitter = ?,
                split_twitter_messages = ?,
                post_sensitive_behavior = ?,
                post_to_mastodon = ?,
                post_rts_to_mastodon = ?,
                post_quotes_to_mastodon = ?,
                toot_visibility = ?,
                conditional_posting = ?,
                twitter_oauth_token = ?,
                twitter_oauth_secret = ?,
                mastodon_access_code = ?,
                mastodon_host_id = ?,
                updated = ?
            WHERE twitter_handle = ? AND mastodon_user = ?
            "#,
        )
        .bind(changes.enabled)
        .bind(settings.post_to_twitter)
        .bind(settings.post_private_to_twitter)
        .bind(settings.post_unlisted_to_twitter)
        .bind(settings.post_boosts_to_twitter)
        .bind(settings.split_twitter_messages)
        .bind(settings.post_sensitive_behavior)
        .bind(settings.post_to_mastodon)
        .bind(settings.post_rts_to_mastodon)
        .bind(settings.post_quotes_to_mastodon)
        .bind(settings.toot_visibility)
        .bind(settings.conditional_posting)
        .bind(&changes.twitter_oauth_token)
        .bind(&changes.twitter_oauth_secret)
        .bind(&changes.mastodon_access_code)
        .bind(changes.mastodon_host_id)
        .bind(changes.updated)
        .bind(&key.twitter_handle)
        .bind(&key.mastodon_user)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        let query = format!(
            "SELECT {BRIDGE_COLUMNS} FROM bridge WHERE twitter_handle = ? AND mastodon_user = ?"
        );
        let bridge = sqlx::query_as::<_, Bridge>(&query)
            .bind(&key.twitter_handle)
            .bind(&key.mastodon_user)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Some(bridge))
    }

    /// Delete a bridge by key
    ///
    /// # Returns
    /// `true` if a row was removed, `false` if none matched
    pub async fn delete_bridge(&self, key: &BridgeKey) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let result =
            sqlx::query("DELETE FROM bridge WHERE twitter_handle = ? AND mastodon_user = ?")
                .bind(&key.twitter_handle)
                .bind(&key.mastodon_user)
                .execute(&mut *tx)
                .await?;

        tx.commit().await?;

        Ok(result.rows_affected() > 0)
    }

    /// Count stored bridges
    pub async fn count_bridges(&self) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM bridge")
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Get the relay metadata row referenced by a bridge
    pub async fn get_bridge_metadata(&self, id: i64) -> Result<Option<BridgeMetadata>, AppError> {
        let metadata = sqlx::query_as::<_, BridgeMetadata>(
            "SELECT id, created, last_tweet, last_toot, is_bot, worker_id FROM bridgemetadata WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(metadata)
    }

    /// Simulate the relay worker advancing cursors (tests only)
    #[cfg(test)]
    pub(crate) async fn set_cursors_for_test(
        &self,
        key: &BridgeKey,
        twitter_last_id: i64,
        mastodon_last_id: i64,
    ) -> Result<(), AppError> {
        sqlx::query(
            "UPDATE bridge SET twitter_last_id = ?, mastodon_last_id = ? WHERE twitter_handle = ? AND mastodon_user = ?",
        )
        .bind(twitter_last_id)
        .bind(mastodon_last_id)
        .bind(&key.twitter_handle)
        .bind(&key.mastodon_user)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Simulate the relay worker attaching metadata (tests only)
    #[cfg(test)]
    pub(crate) async fn attach_metadata_for_test(
        &self,
        key: &BridgeKey,
        worker_id: i64,
    ) -> Result<i64, AppError> {
        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO bridgemetadata (created, worker_id) VALUES (?, ?) RETURNING id",
        )
        .bind(chrono::Utc::now())
        .bind(worker_id)
        .fetch_one(&self.pool)
        .await?;

        sqlx::query(
            "UPDATE bridge SET metadata_id = ? WHERE twitter_handle = ? AND mastodon_user = ?",
        )
        .bind(id)
        .bind(&key.twitter_handle)
        .bind(&key.mastodon_user)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }
}
