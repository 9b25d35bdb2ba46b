//! Account linking
//!
//! Drives the two independent sign-in flows:
//! - Twitter, OAuth 1.0a three-legged flow
//! - Mastodon, OAuth 2.0 authorization code flow against the user's server
//!
//! Each flow moves one identity of the session from unlinked, through a
//! pending handshake, to linked. A denial, a callback without a grant or
//! a failed token exchange drops the handshake and leaves the identity
//! unlinked.

use axum::{
    Form, Router,
    extract::{Query, State},
    response::Redirect,
    routing::{get, post},
};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use url::Url;

use super::middleware::{CurrentSession, store_session};
use super::session::{MastodonIdentity, PendingTwitter, Session, TwitterIdentity};
use crate::AppState;
use crate::error::AppError;
use crate::metrics::observe_oauth_callback;
use crate::service::parse_mastodon_id;

pub const TWITTER_DENIED: &str = "You denied the request to sign in.";
pub const MASTODON_DENIED: &str = "You denied the request to sign in to Mastodon.";
pub const INVALID_MASTODON_ID: &str = "Invalid Mastodon ID";
pub const TWITTER_FAILED: &str = "Could not complete sign in with Twitter.";
pub const MASTODON_FAILED: &str = "Could not complete sign in with Mastodon.";

/// Create account linking router
///
/// Routes:
/// - GET /twitter_login - Start Twitter sign-in
/// - GET /twitter_oauthorized - Twitter callback
/// - POST /mastodon_login - Start Mastodon sign-in
/// - GET /mastodon_oauthorized - Mastodon callback
/// - GET /logout - Forget both identities
pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/twitter_login", get(twitter_login))
        .route("/twitter_oauthorized", get(twitter_oauthorized))
        .route("/mastodon_login", post(mastodon_login))
        .route("/mastodon_oauthorized", get(mastodon_oauthorized))
        .route("/logout", get(logout))
}

type LinkResponse = Result<(CookieJar, Redirect), AppError>;

fn finish(state: &AppState, jar: CookieJar, session: &Session, to: &str) -> LinkResponse {
    Ok((store_session(state, jar, session)?, Redirect::to(to)))
}

/// Report a denied handshake on the index page
fn denied(
    state: &AppState,
    jar: CookieJar,
    mut session: Session,
    platform: &str,
    message: &str,
) -> LinkResponse {
    let error = AppError::AuthorizationDenied(message.to_string());
    observe_oauth_callback(platform, "denied");
    tracing::info!(platform, %error, "Authorization denied or incomplete");
    session.flash(error.to_string());
    finish(state, jar, &session, "/")
}

/// Report a handshake whose token exchange failed after a valid grant
fn failed(
    state: &AppState,
    jar: CookieJar,
    mut session: Session,
    platform: &str,
    error: AppError,
    message: &str,
) -> LinkResponse {
    observe_oauth_callback(platform, "failed");
    tracing::warn!(platform, %error, "Token exchange failed");
    session.flash(message);
    finish(state, jar, &session, "/")
}

// =============================================================================
// Twitter
// =============================================================================

#[derive(Debug, Deserialize)]
struct TwitterLoginQuery {
    next: Option<String>,
}

/// GET /twitter_login
///
/// # Steps
/// 1. Obtain a request token bound to the callback URL
/// 2. Keep it in the session as the pending handshake
/// 3. Redirect to Twitter's authorize page
async fn twitter_login(
    State(state): State<AppState>,
    CurrentSession(mut session): CurrentSession,
    jar: CookieJar,
    Query(query): Query<TwitterLoginQuery>,
) -> LinkResponse {
    let callback = state.config.server.external_url("/twitter_oauthorized");
    let request_token = state.twitter.request_token(&callback).await?;
    let authorize_url = state.twitter.authorize_url(&request_token);

    session.pending_twitter = Some(PendingTwitter {
        request_token,
        next: query.next.filter(|next| is_local_path(next)),
    });

    tracing::debug!("Redirecting to Twitter for authorization");
    finish(&state, jar, &session, &authorize_url)
}

#[derive(Debug, Deserialize)]
struct TwitterCallbackQuery {
    oauth_token: Option<String>,
    oauth_verifier: Option<String>,
    denied: Option<String>,
}

/// GET /twitter_oauthorized
async fn twitter_oauthorized(
    State(state): State<AppState>,
    CurrentSession(mut session): CurrentSession,
    jar: CookieJar,
    Query(query): Query<TwitterCallbackQuery>,
) -> LinkResponse {
    let pending = session.pending_twitter.take();

    let grant = match (&pending, query.denied, query.oauth_token, query.oauth_verifier) {
        (Some(pending), None, Some(token), Some(verifier))
            if token == pending.request_token.token && !verifier.is_empty() =>
        {
            Some(verifier)
        }
        _ => None,
    };
    let (Some(pending), Some(verifier)) = (pending, grant) else {
        return denied(&state, jar, session, "twitter", TWITTER_DENIED);
    };

    let access = match state
        .twitter
        .access_token(&pending.request_token, &verifier)
        .await
    {
        Ok(access) => access,
        Err(error) => return failed(&state, jar, session, "twitter", error, TWITTER_FAILED),
    };

    observe_oauth_callback("twitter", "linked");
    tracing::info!(screen_name = %access.screen_name, "Twitter account linked");

    session.twitter = Some(TwitterIdentity {
        screen_name: access.screen_name,
        oauth_token: access.oauth_token,
        oauth_token_secret: access.oauth_token_secret,
    });

    let next = pending.next.unwrap_or_else(|| "/".to_string());
    finish(&state, jar, &session, &next)
}

// =============================================================================
// Mastodon
// =============================================================================

#[derive(Debug, Deserialize)]
struct MastodonLoginForm {
    #[serde(default)]
    mastodon_id: String,
    #[serde(default)]
    csrf_token: String,
}

/// POST /mastodon_login
///
/// # Steps
/// 1. Parse `[@]username@host`
/// 2. Resolve the host, registering the bridge there on first use
/// 3. Remember the host and redirect to its authorize page
async fn mastodon_login(
    State(state): State<AppState>,
    CurrentSession(mut session): CurrentSession,
    jar: CookieJar,
    Form(form): Form<MastodonLoginForm>,
) -> LinkResponse {
    if !session.csrf_matches(&form.csrf_token) {
        return Err(AppError::Forbidden);
    }

    let id = match parse_mastodon_id(&form.mastodon_id) {
        Ok(id) => id,
        Err(AppError::Validation(_)) => {
            tracing::debug!("Rejected malformed Mastodon id");
            session.flash(INVALID_MASTODON_ID);
            return finish(&state, jar, &session, "/");
        }
        Err(error) => return Err(error),
    };

    let host = state.hosts.resolve_or_register(&id.host).await?;
    let authorize_url = state
        .mastodon
        .authorize_url(&host, state.hosts.redirect_uri());

    session.pending_mastodon_host = Some(host.hostname);

    tracing::debug!(host = %id.host, "Redirecting to Mastodon for authorization");
    finish(&state, jar, &session, &authorize_url)
}

#[derive(Debug, Deserialize)]
struct MastodonCallbackQuery {
    code: Option<String>,
    error: Option<String>,
}

/// GET /mastodon_oauthorized
async fn mastodon_oauthorized(
    State(state): State<AppState>,
    CurrentSession(mut session): CurrentSession,
    jar: CookieJar,
    Query(query): Query<MastodonCallbackQuery>,
) -> LinkResponse {
    let pending_host = session.pending_mastodon_host.take();

    let (Some(hostname), None, Some(code)) = (
        pending_host,
        query.error,
        query.code.filter(|code| !code.is_empty()),
    ) else {
        return denied(&state, jar, session, "mastodon", MASTODON_DENIED);
    };

    let identity = match link_mastodon(&state, &hostname, &code).await {
        Ok(identity) => identity,
        Err(error) => return failed(&state, jar, session, "mastodon", error, MASTODON_FAILED),
    };

    observe_oauth_callback("mastodon", "linked");
    tracing::info!(
        host = %identity.host,
        username = %identity.username,
        "Mastodon account linked"
    );

    session.mastodon = Some(identity);
    finish(&state, jar, &session, "/")
}

async fn link_mastodon(
    state: &AppState,
    hostname: &str,
    code: &str,
) -> Result<MastodonIdentity, AppError> {
    let host = state.hosts.resolve_or_register(hostname).await?;
    let access_code = state
        .mastodon
        .exchange_code(&host, code, state.hosts.redirect_uri())
        .await?;
    let account = state
        .mastodon
        .verify_credentials(&host.hostname, &access_code)
        .await?;

    Ok(MastodonIdentity {
        host: host.hostname,
        username: account.username,
        access_code,
    })
}

// =============================================================================
// Logout
// =============================================================================

/// GET /logout
///
/// Forgets both identities and redirects home.
async fn logout(
    State(state): State<AppState>,
    CurrentSession(mut session): CurrentSession,
    jar: CookieJar,
) -> LinkResponse {
    session.logout();
    finish(&state, jar, &session, "/")
}

/// Only same-origin absolute paths are followed after sign-in
///
/// Browsers drop tabs and newlines while parsing a `Location`, so any
/// control character is refused before the join is checked.
fn is_local_path(path: &str) -> bool {
    if !path.starts_with('/')
        || path.starts_with("//")
        || !path.chars().all(|c| c.is_ascii_graphic() && c != '\\')
    {
        return false;
    }

    let Ok(base) = Url::parse("http://localhost/") else {
        return false;
    };
    matches!(base.join(path), Ok(joined) if joined.origin() == base.origin())
}
