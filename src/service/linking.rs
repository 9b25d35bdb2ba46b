//! Mastodon id parsing

use crate::error::AppError;

/// A Mastodon account as typed by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MastodonId {
    pub username: String,
    pub host: String,
}

/// Parse `[@]username@host`
///
/// One leading `@` is optional. After it exactly one `@` must separate
/// two non-empty parts, and the host may not contain whitespace or `/`.
/// Case is preserved.
pub fn parse_mastodon_id(input: &str) -> Result<MastodonId, AppError> {
    let invalid = || AppError::Validation("Invalid Mastodon ID".to_string());

    let trimmed = input.trim();
    let id = trimmed.strip_prefix('@').unwrap_or(trimmed);

    let mut parts = id.split('@');
    let (Some(username), Some(host), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid());
    };

    if username.is_empty() || username.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    if host.is_empty() || host.chars().any(|c| c.is_whitespace() || c == '/') {
        return Err(invalid());
    }

    Ok(MastodonId {
        username: username.to_string(),
        host: host.to_string(),
    })
}
