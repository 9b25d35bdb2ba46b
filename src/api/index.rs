//! Index page
//!
//! Shows where each sign-in stands, pending notices and, once both
//! accounts are linked, the bridge settings form.

use axum::{extract::State, response::Html};
use axum_extra::extract::CookieJar;

use crate::AppState;
use crate::auth::{CurrentSession, LinkState, Session, store_session};
use crate::data::{Bridge, BridgeMetadata, BridgeSettings, SensitiveBehavior, TootVisibility};
use crate::error::AppError;

/// GET /
pub async fn index(
    State(state): State<AppState>,
    CurrentSession(mut session): CurrentSession,
    jar: CookieJar,
) -> Result<(CookieJar, Html<String>), AppError> {
    let flashes = session.take_flashes();

    let mut bridge = None;
    let mut metadata = None;
    if let Some(identities) = session.linked() {
        bridge = state.bridges.find(&identities.bridge_key()).await?;
        if let Some(metadata_id) = bridge.as_ref().and_then(|b| b.metadata_id) {
            metadata = state.db.get_bridge_metadata(metadata_id).await?;
        }
    }

    let page = render_index(&session, &flashes, bridge.as_ref(), metadata.as_ref());
    Ok((store_session(&state, jar, &session)?, Html(page)))
}

fn escape(value: &str) -> String {
    html_escape::encode_text(value).into_owned()
}

fn escape_attr(value: &str) -> String {
    html_escape::encode_double_quoted_attribute(value).into_owned()
}

fn render_hidden_csrf(session: &Session) -> String {
    format!(
        "<input type=\"hidden\" name=\"csrf_token\" value=\"{}\" />",
        escape_attr(&session.csrf_token)
    )
}

fn render_checkbox(name: &str, label: &str, checked: bool) -> String {
    format!(
        "<label><input type=\"checkbox\" name=\"{name}\" value=\"y\"{} /> {label}</label><br />",
        if checked { " checked" } else { "" }
    )
}

fn render_select<'a>(
    name: &str,
    label: &str,
    options: impl Iterator<Item = &'a str>,
    selected: &str,
) -> String {
    let options = options
        .map(|value| {
            format!(
                "<option value=\"{value}\"{}>{value}</option>",
                if value == selected { " selected" } else { "" }
            )
        })
        .collect::<String>();
    format!("<label>{label} <select name=\"{name}\">{options}</select></label><br />")
}

fn render_twitter(session: &Session) -> String {
    match (session.twitter_state(), &session.twitter) {
        (LinkState::Linked, Some(twitter)) => format!(
            "<p>Twitter: <strong>@{}</strong></p>",
            escape(&twitter.screen_name)
        ),
        (LinkState::PendingAuthorization, _) => {
            "<p>Twitter: waiting for authorization. <a href=\"/twitter_login\">Try again</a></p>"
                .to_string()
        }
        _ => "<p><a href=\"/twitter_login\">Sign in with Twitter</a></p>".to_string(),
    }
}

fn render_mastodon(session: &Session) -> String {
    match (session.mastodon_state(), &session.mastodon) {
        (LinkState::Linked, Some(mastodon)) => format!(
            "<p>Mastodon: <strong>@{}@{}</strong></p>",
            escape(&mastodon.username),
            escape(&mastodon.host)
        ),
        (state, _) => {
            let waiting = match (state, &session.pending_mastodon_host) {
                (LinkState::PendingAuthorization, Some(host)) => format!(
                    "<p>Mastodon: waiting for authorization on {}.</p>",
                    escape(host)
                ),
                _ => String::new(),
            };
            format!(
                r#"{waiting}<form method="post" action="/mastodon_login">
    {}
    <label>Mastodon ID <input type="text" name="mastodon_id" placeholder="@user@example.social" /></label>
    <button type="submit">Sign in with Mastodon</button>
  </form>"#,
                render_hidden_csrf(session)
            )
        }
    }
}

fn render_relay_status(metadata: Option<&BridgeMetadata>) -> String {
    let Some(metadata) = metadata else {
        return String::new();
    };
    let when = |value: Option<chrono::DateTime<chrono::Utc>>| {
        value
            .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
            .unwrap_or_else(|| "never".to_string())
    };
    format!(
        "<p class=\"relay\">Last tweet relayed: {}. Last toot relayed: {}.</p>",
        when(metadata.last_tweet),
        when(metadata.last_toot)
    )
}

fn render_settings(session: &Session, bridge: Option<&Bridge>) -> String {
    let default_settings = BridgeSettings::default();
    let (enabled, settings) = match bridge {
        Some(bridge) => (bridge.enabled, &bridge.settings),
        None => (true, &default_settings),
    };

    let fields = [
        render_checkbox("enabled", "Bridge enabled", enabled),
        "<h3>Mastodon to Twitter</h3>".to_string(),
        render_checkbox("post_to_twitter", "Post toots to Twitter", settings.post_to_twitter),
        render_checkbox(
            "post_private_to_twitter",
            "Include private toots",
            settings.post_private_to_twitter,
        ),
        render_checkbox(
            "post_unlisted_to_twitter",
            "Include unlisted toots",
            settings.post_unlisted_to_twitter,
        ),
        render_checkbox(
            "post_boosts_to_twitter",
            "Include boosts",
            settings.post_boosts_to_twitter,
        ),
        render_checkbox(
            "split_twitter_messages",
            "Split long toots into threads",
            settings.split_twitter_messages,
        ),
        render_select(
            "post_sensitive_behavior",
            "Sensitive media",
            SensitiveBehavior::ALL.iter().map(|b| b.as_str()),
            settings.post_sensitive_behavior.as_str(),
        ),
        render_checkbox(
            "conditional_posting",
            "Only relay posts tagged for cross-posting",
            settings.conditional_posting,
        ),
        "<h3>Twitter to Mastodon</h3>".to_string(),
        render_checkbox("post_to_mastodon", "Post tweets to Mastodon", settings.post_to_mastodon),
        render_checkbox("post_rts_to_mastodon", "Include retweets", settings.post_rts_to_mastodon),
        render_checkbox(
            "post_quotes_to_mastodon",
            "Include quote tweets",
            settings.post_quotes_to_mastodon,
        ),
        render_select(
            "toot_visibility",
            "Toot visibility",
            TootVisibility::ALL.iter().map(|v| v.as_str()),
            settings.toot_visibility.as_str(),
        ),
    ]
    .join("\n    ");

    format!(
        r#"<form method="post" action="/options">
    {}
    {fields}
    <button type="submit">Save</button>
  </form>
  <form method="post" action="/delete">
    {}
    <button type="submit">Delete bridge and sign out</button>
  </form>"#,
        render_hidden_csrf(session),
        render_hidden_csrf(session),
    )
}

fn render_index(
    session: &Session,
    flashes: &[String],
    bridge: Option<&Bridge>,
    metadata: Option<&BridgeMetadata>,
) -> String {
    let flashes = flashes
        .iter()
        .map(|message| format!("<li>{}</li>", escape(message)))
        .collect::<String>();
    let flashes = if flashes.is_empty() {
        String::new()
    } else {
        format!("<ul class=\"flashes\">{flashes}</ul>")
    };

    let body = if session.linked().is_some() {
        format!(
            "{}\n  <p><a href=\"/logout\">Sign out</a></p>",
            render_settings(session, bridge)
        )
    } else {
        String::new()
    };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="utf-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1" />
  <title>Moa</title>
</head>
<body>
  <h1>Moa</h1>
  {flashes}
  {}
  {}
  {}
  {body}
</body>
</html>"#,
        render_twitter(session),
        render_mastodon(session),
        render_relay_status(metadata),
    )
}
