//! Identity session and account linking
//!
//! Handles:
//! - Twitter and Mastodon sign-in flows
//! - Signed cookie sessions
//! - Session extraction for handlers

mod middleware;
mod oauth;
pub mod session;

pub use middleware::{CurrentSession, store_session};
pub use oauth::{
    INVALID_MASTODON_ID, MASTODON_DENIED, MASTODON_FAILED, TWITTER_DENIED, TWITTER_FAILED,
    auth_router,
};
pub use session::{
    LinkState, LinkedIdentities, MastodonIdentity, PendingTwitter, SESSION_COOKIE, Session,
    TwitterIdentity, create_session_token, verify_session_token,
};
