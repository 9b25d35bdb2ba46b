//! Bridge store
//!
//! Saves and removes the bridge linking one Twitter account to one
//! Mastodon account. Cursors are seeded from the newest post on each
//! side when the bridge is first created and left alone afterwards.

use std::sync::Arc;

use chrono::Utc;

use super::HostRegistry;
use crate::auth::LinkedIdentities;
use crate::data::{
    Bridge, BridgeChanges, BridgeKey, BridgeSettings, Database, InitialCursors, NewBridge,
};
use crate::error::AppError;
use crate::metrics::{BRIDGE_DELETES_TOTAL, BRIDGE_SAVES_TOTAL, CURSOR_FALLBACKS_TOTAL};
use crate::platform::{MastodonApi, TwitterApi};

/// Result of a save
#[derive(Debug, Clone)]
pub struct SaveOutcome {
    pub bridge: Bridge,
    /// `true` if the save inserted the row
    pub created: bool,
}

/// Bridge service
pub struct BridgeService {
    db: Arc<Database>,
    hosts: Arc<HostRegistry>,
    twitter: Arc<dyn TwitterApi>,
    mastodon: Arc<dyn MastodonApi>,
}

impl BridgeService {
    pub fn new(
        db: Arc<Database>,
        hosts: Arc<HostRegistry>,
        twitter: Arc<dyn TwitterApi>,
        mastodon: Arc<dyn MastodonApi>,
    ) -> Self {
        Self {
            db,
            hosts,
            twitter,
            mastodon,
        }
    }

    /// Look up the bridge of a linked session
    pub async fn find(&self, key: &BridgeKey) -> Result<Option<Bridge>, AppError> {
        self.db.find_bridge_by_key(key).await
    }

    /// Create or update the bridge for both identities
    ///
    /// # Errors
    /// Fails if the Mastodon host cannot be registered or the database
    /// write fails. Failing to read the newest posts does not fail the save.
    pub async fn save(
        &self,
        identities: LinkedIdentities<'_>,
        enabled: bool,
        settings: BridgeSettings,
    ) -> Result<SaveOutcome, AppError> {
        let host = self
            .hosts
            .resolve_or_register(&identities.mastodon.host)
            .await?;
        let key = identities.bridge_key();

        let changes = BridgeChanges {
            enabled,
            settings,
            twitter_oauth_token: identities.twitter.oauth_token.clone(),
            twitter_oauth_secret: identities.twitter.oauth_token_secret.clone(),
            mastodon_access_code: identities.mastodon.access_code.clone(),
            mastodon_host_id: host.id,
            updated: Utc::now(),
        };

        if self.db.find_bridge_by_key(&key).await?.is_some() {
            if let Some(bridge) = self.db.update_bridge(&key, &changes).await? {
                BRIDGE_SAVES_TOTAL.with_label_values(&["updated"]).inc();
                tracing::info!(
                    twitter = %key.twitter_handle,
                    mastodon = %key.mastodon_user,
                    enabled,
                    "Bridge settings updated"
                );
                return Ok(SaveOutcome {
                    bridge,
                    created: false,
                });
            }
            // Deleted between the lookup and the update: fall through and insert
        }

        let (mastodon_account_id, cursors) = self.initial_cursors(identities).await;
        let new = NewBridge {
            key,
            changes,
            mastodon_account_id,
            cursors,
        };

        let (bridge, created) = self.db.insert_bridge(&new).await?;
        let kind = if created { "created" } else { "updated" };
        BRIDGE_SAVES_TOTAL.with_label_values(&[kind]).inc();
        tracing::info!(
            twitter = %bridge.twitter_handle,
            mastodon = %bridge.mastodon_user,
            host = %identities.mastodon.host,
            twitter_last_id = bridge.twitter_last_id,
            mastodon_last_id = bridge.mastodon_last_id,
            created,
            "Bridge saved"
        );

        Ok(SaveOutcome { bridge, created })
    }

    /// Remove the bridge for `key`; a missing bridge is not an error
    pub async fn delete(&self, key: &BridgeKey) -> Result<bool, AppError> {
        let removed = self.db.delete_bridge(key).await?;
        if removed {
            BRIDGE_DELETES_TOTAL.inc();
            tracing::info!(
                twitter = %key.twitter_handle,
                mastodon = %key.mastodon_user,
                "Bridge deleted"
            );
        } else {
            tracing::debug!(
                twitter = %key.twitter_handle,
                mastodon = %key.mastodon_user,
                "No bridge to delete"
            );
        }
        Ok(removed)
    }

    /// Newest post ids on both sides, `0` for anything that cannot be read
    async fn initial_cursors(
        &self,
        identities: LinkedIdentities<'_>,
    ) -> (Option<String>, InitialCursors) {
        let twitter = identities.twitter;
        let twitter_last_id = match self
            .twitter
            .latest_tweet_id(&twitter.oauth_token, &twitter.oauth_token_secret)
            .await
        {
            Ok(id) => id.unwrap_or(0),
            Err(error) => {
                cursor_fallback("twitter", &error);
                0
            }
        };

        let mastodon = identities.mastodon;
        let account = match self
            .mastodon
            .verify_credentials(&mastodon.host, &mastodon.access_code)
            .await
        {
            Ok(account) => Some(account),
            Err(error) => {
                cursor_fallback("mastodon", &error);
                None
            }
        };

        let mastodon_last_id = match &account {
            Some(account) => match self
                .mastodon
                .latest_status_id(&mastodon.host, &mastodon.access_code, &account.id)
                .await
            {
                Ok(id) => id.unwrap_or(0),
                Err(error) => {
                    cursor_fallback("mastodon", &error);
                    0
                }
            },
            None => 0,
        };

        (
            account.map(|account| account.id),
            InitialCursors {
                twitter_last_id,
                mastodon_last_id,
            },
        )
    }
}

fn cursor_fallback(platform: &str, error: &AppError) {
    CURSOR_FALLBACKS_TOTAL.with_label_values(&[platform]).inc();
    tracing::warn!(platform, %error, "Could not read latest post; starting cursor at 0");
}
