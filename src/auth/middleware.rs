//! Session extraction
//!
//! Every page works with a session; a browser without a valid cookie
//! simply gets a fresh, empty one.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use axum_extra::extract::{
    CookieJar,
    cookie::{Cookie, SameSite},
};

use super::session::{SESSION_COOKIE, Session, create_session_token, verify_session_token};
use crate::AppState;
use crate::error::AppError;

/// Extractor for the browser's identity session
///
/// # Usage
/// ```ignore
/// async fn handler(
///     CurrentSession(session): CurrentSession,
/// ) -> impl IntoResponse {
///     format!("{:?}", session.twitter_state())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentSession(pub Session);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentSession
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let jar = CookieJar::from_headers(&parts.headers);

        let session = jar
            .get(SESSION_COOKIE)
            .and_then(|cookie| {
                match verify_session_token(cookie.value(), &state.config.auth.session_secret) {
                    Ok(session) => Some(session),
                    Err(error) => {
                        tracing::debug!(%error, "Discarding unusable session cookie");
                        None
                    }
                }
            })
            .unwrap_or_else(|| Session::new(state.config.auth.session_max_age));

        Ok(CurrentSession(session))
    }
}

/// Sign `session` and put it in the jar
pub fn store_session(
    state: &AppState,
    jar: CookieJar,
    session: &Session,
) -> Result<CookieJar, AppError> {
    let token = create_session_token(session, &state.config.auth.session_secret)?;

    let cookie = Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(state.config.should_use_secure_cookies())
        .same_site(SameSite::Lax)
        .build();

    Ok(jar.add(cookie))
}
