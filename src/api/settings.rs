//! Bridge settings endpoints
//!
//! - POST /options - Save the bridge for the linked identities
//! - POST /delete - Remove it and sign out

use axum::{Form, extract::State, response::Redirect};
use axum_extra::extract::CookieJar;
use serde::Deserialize;

use crate::AppState;
use crate::auth::{CurrentSession, store_session};
use crate::data::{BridgeSettings, SensitiveBehavior, TootVisibility};
use crate::error::AppError;

pub const SETTINGS_SAVED: &str = "Settings Saved.";

/// Submitted settings form
///
/// Checkboxes are present only when ticked.
#[derive(Debug, Default, Deserialize)]
pub struct SettingsForm {
    #[serde(default)]
    pub csrf_token: String,
    pub enabled: Option<String>,
    pub post_to_twitter: Option<String>,
    pub post_private_to_twitter: Option<String>,
    pub post_unlisted_to_twitter: Option<String>,
    pub post_boosts_to_twitter: Option<String>,
    pub split_twitter_messages: Option<String>,
    pub post_sensitive_behavior: Option<String>,
    pub post_to_mastodon: Option<String>,
    pub post_rts_to_mastodon: Option<String>,
    pub post_quotes_to_mastodon: Option<String>,
    pub toot_visibility: Option<String>,
    pub conditional_posting: Option<String>,
}

impl SettingsForm {
    pub fn enabled(&self) -> bool {
        checked(&self.enabled)
    }

    /// Validate the choice fields and collect the toggles
    pub fn settings(&self) -> Result<BridgeSettings, AppError> {
        let post_sensitive_behavior = match self.post_sensitive_behavior.as_deref() {
            None | Some("") => SensitiveBehavior::default(),
            Some(value) => SensitiveBehavior::parse(value).ok_or_else(|| {
                AppError::Validation(format!("Unknown sensitive media behavior {value:?}"))
            })?,
        };
        let toot_visibility = match self.toot_visibility.as_deref() {
            None | Some("") => TootVisibility::default(),
            Some(value) => TootVisibility::parse(value)
                .ok_or_else(|| AppError::Validation(format!("Unknown toot visibility {value:?}")))?,
        };

        Ok(BridgeSettings {
            post_to_twitter: checked(&self.post_to_twitter),
            post_private_to_twitter: checked(&self.post_private_to_twitter),
            post_unlisted_to_twitter: checked(&self.post_unlisted_to_twitter),
            post_boosts_to_twitter: checked(&self.post_boosts_to_twitter),
            split_twitter_messages: checked(&self.split_twitter_messages),
            post_sensitive_behavior,
            post_to_mastodon: checked(&self.post_to_mastodon),
            post_rts_to_mastodon: checked(&self.post_rts_to_mastodon),
            post_quotes_to_mastodon: checked(&self.post_quotes_to_mastodon),
            toot_visibility,
            conditional_posting: checked(&self.conditional_posting),
        })
    }
}

/// HTML checkboxes submit "y"/"on"/"true"; an explicit false is also accepted
fn checked(value: &Option<String>) -> bool {
    match value.as_deref() {
        None => false,
        Some(value) => !matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "" | "0" | "false" | "off" | "n" | "no"
        ),
    }
}

/// POST /options
pub async fn save_options(
    State(state): State<AppState>,
    CurrentSession(mut session): CurrentSession,
    jar: CookieJar,
    Form(form): Form<SettingsForm>,
) -> Result<(CookieJar, Redirect), AppError> {
    if !session.csrf_matches(&form.csrf_token) {
        return Err(AppError::Forbidden);
    }

    let result = match session.linked() {
        None => Err(AppError::Unauthorized),
        Some(identities) => match form.settings() {
            Ok(settings) => state
                .bridges
                .save(identities, form.enabled(), settings)
                .await
                .map(|_| ()),
            Err(error) => Err(error),
        },
    };

    match result {
        Ok(()) => session.flash(SETTINGS_SAVED),
        Err(error) if error.is_user_recoverable() => {
            tracing::debug!(%error, "Settings not saved");
            session.flash(error.to_string());
        }
        Err(error) => return Err(error),
    }

    Ok((store_session(&state, jar, &session)?, Redirect::to("/")))
}

#[derive(Debug, Deserialize)]
pub struct DeleteForm {
    #[serde(default)]
    csrf_token: String,
}

/// POST /delete
///
/// Deletes the bridge if there is one, then signs out.
pub async fn delete_bridge(
    State(state): State<AppState>,
    CurrentSession(session): CurrentSession,
    Form(form): Form<DeleteForm>,
) -> Result<Redirect, AppError> {
    if !session.csrf_matches(&form.csrf_token) {
        return Err(AppError::Forbidden);
    }

    if let Some(identities) = session.linked() {
        state.bridges.delete(&identities.bridge_key()).await?;
    }

    Ok(Redirect::to("/logout"))
}
