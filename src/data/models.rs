//! Data models
//!
//! Rust structs representing database rows and the plain records
//! handed to the repository. Row ids are SQLite integer keys and
//! timestamps are chrono values stored as text.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// Mastodon Host
// =============================================================================

/// A Mastodon server the bridge is registered with as an OAuth app
///
/// One row per hostname; every user on that server shares it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MastodonHost {
    pub id: i64,
    pub hostname: String,
    pub client_id: String,
    pub client_secret: String,
    pub created_at: DateTime<Utc>,
}

/// Client credentials returned by a Mastodon app registration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppCredentials {
    pub client_id: String,
    pub client_secret: String,
}

// =============================================================================
// Settings
// =============================================================================

/// What to do with toots marked sensitive when posting to Twitter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum SensitiveBehavior {
    /// Post sensitive toots like any other
    #[default]
    Always,
    /// Skip sensitive toots entirely
    Never,
    /// Only skip when the sensitive flag covers attachments
    Attachments,
}

impl SensitiveBehavior {
    pub const ALL: [SensitiveBehavior; 3] = [Self::Always, Self::Never, Self::Attachments];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Never => "never",
            Self::Attachments => "attachments",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.as_str() == value)
    }
}

/// Visibility of toots created from tweets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum TootVisibility {
    #[default]
    Public,
    Unlisted,
    Private,
}

impl TootVisibility {
    pub const ALL: [TootVisibility; 3] = [Self::Public, Self::Unlisted, Self::Private];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Unlisted => "unlisted",
            Self::Private => "private",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.as_str() == value)
    }
}

/// Cross-posting toggles, embedded in the bridge row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct BridgeSettings {
    pub post_to_twitter: bool,
    pub post_private_to_twitter: bool,
    pub post_unlisted_to_twitter: bool,
    pub post_boosts_to_twitter: bool,
    pub split_twitter_messages: bool,
    pub post_sensitive_behavior: SensitiveBehavior,
    pub post_to_mastodon: bool,
    pub post_rts_to_mastodon: bool,
    pub post_quotes_to_mastodon: bool,
    pub toot_visibility: TootVisibility,
    /// Only relay posts tagged for cross-posting
    pub conditional_posting: bool,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            post_to_twitter: true,
            post_private_to_twitter: false,
            post_unlisted_to_twitter: false,
            post_boosts_to_twitter: true,
            split_twitter_messages: true,
            post_sensitive_behavior: SensitiveBehavior::default(),
            post_to_mastodon: true,
            post_rts_to_mastodon: true,
            post_quotes_to_mastodon: true,
            toot_visibility: TootVisibility::default(),
            conditional_posting: false,
        }
    }
}

// =============================================================================
// Bridge
// =============================================================================

/// Natural key of a bridge
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BridgeKey {
    pub twitter_handle: String,
    pub mastodon_user: String,
}

/// A persisted link between one Twitter and one Mastodon account
///
/// `twitter_last_id` and `mastodon_last_id` are the relay worker's cursors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Bridge {
    pub id: i64,
    pub twitter_handle: String,
    pub mastodon_user: String,
    pub enabled: bool,
    #[sqlx(flatten)]
    pub settings: BridgeSettings,
    pub twitter_oauth_token: String,
    pub twitter_oauth_secret: String,
    pub mastodon_access_code: String,
    pub mastodon_account_id: Option<String>,
    pub twitter_last_id: i64,
    pub mastodon_last_id: i64,
    pub mastodon_host_id: i64,
    pub metadata_id: Option<i64>,
    pub updated: DateTime<Utc>,
}

impl Bridge {
    pub fn key(&self) -> BridgeKey {
        BridgeKey {
            twitter_handle: self.twitter_handle.clone(),
            mastodon_user: self.mastodon_user.clone(),
        }
    }
}

/// Mutable part of a bridge, written on every settings save
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeChanges {
    pub enabled: bool,
    pub settings: BridgeSettings,
    pub twitter_oauth_token: String,
    pub twitter_oauth_secret: String,
    pub mastodon_access_code: String,
    pub mastodon_host_id: i64,
    pub updated: DateTime<Utc>,
}

/// Cursor values set once, when a bridge is first created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InitialCursors {
    pub twitter_last_id: i64,
    pub mastodon_last_id: i64,
}

/// Everything needed to insert a new bridge row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBridge {
    pub key: BridgeKey,
    pub changes: BridgeChanges,
    pub mastodon_account_id: Option<String>,
    pub cursors: InitialCursors,
}

// =============================================================================
// Relay metadata
// =============================================================================

/// Relay worker bookkeeping for a bridge (read-only here)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct BridgeMetadata {
    pub id: i64,
    pub created: Option<DateTime<Utc>>,
    pub last_tweet: Option<DateTime<Utc>>,
    pub last_toot: Option<DateTime<Utc>>,
    pub is_bot: bool,
    pub worker_id: Option<i64>,
}
