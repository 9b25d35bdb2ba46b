//! Identity session
//!
//! Uses encrypted, HMAC-signed tokens stored in a cookie.
//! No server-side session storage needed.
//!
//! A session holds at most one Twitter and one Mastodon identity, the
//! state of any OAuth handshake in flight, pending flash notices and
//! the CSRF token embedded in forms.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::data::BridgeKey;
use crate::error::AppError;
use crate::platform::RequestToken;

type HmacSha256 = Hmac<Sha256>;

/// Name of the session cookie
pub const SESSION_COOKIE: &str = "moa_session";

/// Signed-in Twitter account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TwitterIdentity {
    pub screen_name: String,
    pub oauth_token: String,
    pub oauth_token_secret: String,
}

/// Signed-in Mastodon account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MastodonIdentity {
    pub host: String,
    pub username: String,
    pub access_code: String,
}

/// Twitter handshake in flight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTwitter {
    pub request_token: RequestToken,
    /// Local path to return to after sign-in
    pub next: Option<String>,
}

/// Where one platform's sign-in stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Unlinked,
    PendingAuthorization,
    Linked,
}

/// Both identities, borrowed from a session that has them
#[derive(Debug, Clone, Copy)]
pub struct LinkedIdentities<'a> {
    pub twitter: &'a TwitterIdentity,
    pub mastodon: &'a MastodonIdentity,
}

impl LinkedIdentities<'_> {
    pub fn bridge_key(&self) -> BridgeKey {
        BridgeKey {
            twitter_handle: self.twitter.screen_name.clone(),
            mastodon_user: self.mastodon.username.clone(),
        }
    }
}

/// Per-browser session data
///
/// Stored in a signed cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub twitter: Option<TwitterIdentity>,
    #[serde(default)]
    pub mastodon: Option<MastodonIdentity>,
    #[serde(default)]
    pub pending_twitter: Option<PendingTwitter>,
    #[serde(default)]
    pub pending_mastodon_host: Option<String>,
    #[serde(default)]
    pub flashes: Vec<String>,
    pub csrf_token: String,
    /// When session was created
    pub created_at: DateTime<Utc>,
    /// When session expires
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Start an empty session valid for `max_age_seconds`
    pub fn new(max_age_seconds: i64) -> Self {
        let now = Utc::now();
        Self {
            twitter: None,
            mastodon: None,
            pending_twitter: None,
            pending_mastodon_host: None,
            flashes: Vec::new(),
            csrf_token: generate_csrf_token(),
            created_at: now,
            expires_at: now + Duration::seconds(max_age_seconds),
        }
    }

    /// Check if session is expired
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }

    pub fn twitter_state(&self) -> LinkState {
        link_state(self.twitter.is_some(), self.pending_twitter.is_some())
    }

    pub fn mastodon_state(&self) -> LinkState {
        link_state(self.mastodon.is_some(), self.pending_mastodon_host.is_some())
    }

    /// Both identities, if both handshakes have completed
    pub fn linked(&self) -> Option<LinkedIdentities<'_>> {
        match (&self.twitter, &self.mastodon) {
            (Some(twitter), Some(mastodon)) => Some(LinkedIdentities { twitter, mastodon }),
            _ => None,
        }
    }

    pub fn flash(&mut self, message: impl Into<String>) {
        self.flashes.push(message.into());
    }

    pub fn take_flashes(&mut self) -> Vec<String> {
        std::mem::take(&mut self.flashes)
    }

    /// Constant-time comparison against the form's token
    pub fn csrf_matches(&self, candidate: &str) -> bool {
        let expected = self.csrf_token.as_bytes();
        let candidate = candidate.as_bytes();
        if expected.len() != candidate.len() || expected.is_empty() {
            return false;
        }
        expected
            .iter()
            .zip(candidate)
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }

    /// Forget both identities and any handshake in flight
    pub fn logout(&mut self) {
        self.twitter = None;
        self.mastodon = None;
        self.pending_twitter = None;
        self.pending_mastodon_host = None;
    }
}

fn link_state(linked: bool, pending: bool) -> LinkState {
    match (linked, pending) {
        (true, _) => LinkState::Linked,
        (false, true) => LinkState::PendingAuthorization,
        (false, false) => LinkState::Unlinked,
    }
}

fn generate_csrf_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

const AES_GCM_NONCE_BYTES: usize = 12;
const SESSION_KEY_CONTEXT: &[u8] = b"moa-session-encryption";

/// AES-256 key for session payloads, derived from the signing secret
fn session_cipher(secret: &str) -> Result<Aes256Gcm, AppError> {
    let key = Sha256::new()
        .chain_update(SESSION_KEY_CONTEXT)
        .chain_update(secret.as_bytes())
        .finalize();
    Aes256Gcm::new_from_slice(&key)
        .map_err(|_| AppError::Encryption("invalid session key length".to_string()))
}

/// Create a signed session token
///
/// Token format: base64(nonce || aes_gcm(payload)).base64(hmac_sha256(..))
///
/// The payload carries platform access tokens, so it is encrypted
/// before signing.
///
/// # Arguments
/// * `session` - Session data to encode
/// * `secret` - HMAC secret key, also the source of the encryption key
///
/// # Returns
/// Signed token string
pub fn create_session_token(session: &Session, secret: &str) -> Result<String, AppError> {
    let payload = serde_json::to_vec(session).map_err(|e| AppError::Internal(e.into()))?;

    let mut nonce = [0_u8; AES_GCM_NONCE_BYTES];
    rand::thread_rng().fill_bytes(&mut nonce);
    let ciphertext = session_cipher(secret)?
        .encrypt(Nonce::from_slice(&nonce), payload.as_slice())
        .map_err(|_| AppError::Encryption("session encryption failed".to_string()))?;

    let mut sealed = Vec::with_capacity(AES_GCM_NONCE_BYTES + ciphertext.len());
    sealed.extend_from_slice(&nonce);
    sealed.extend_from_slice(&ciphertext);
    let payload_b64 = general_purpose::URL_SAFE_NO_PAD.encode(sealed);

    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Encryption(e.to_string()))?;
    mac.update(payload_b64.as_bytes());
    let signature = mac.finalize().into_bytes();
    let signature_b64 = general_purpose::URL_SAFE_NO_PAD.encode(signature);

    Ok(format!("{}.{}", payload_b64, signature_b64))
}

/// Verify and decode a session token
///
/// # Errors
/// Returns error if signature is invalid, the token is malformed
/// or the session has expired
pub fn verify_session_token(token: &str, secret: &str) -> Result<Session, AppError> {
    let Some((payload_b64, signature_b64)) = token.split_once('.') else {
        return Err(AppError::Unauthorized);
    };

    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Encryption(e.to_string()))?;
    mac.update(payload_b64.as_bytes());

    let expected_signature = general_purpose::URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AppError::Unauthorized)?;

    mac.verify_slice(&expected_signature)
        .map_err(|_| AppError::InvalidSignature)?;

    let sealed = general_purpose::URL_SAFE_NO_PAD
        .decode(payload_b64)
        .map_err(|_| AppError::Unauthorized)?;
    if sealed.len() <= AES_GCM_NONCE_BYTES {
        return Err(AppError::Unauthorized);
    }

    let (nonce, ciphertext) = sealed.split_at(AES_GCM_NONCE_BYTES);
    let payload = session_cipher(secret)?
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| AppError::Unauthorized)?;

    let session: Session = serde_json::from_slice(&payload).map_err(|_| AppError::Unauthorized)?;

    if session.is_expired() {
        return Err(AppError::Unauthorized);
    }

    Ok(session)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-32-bytes-long!!!";

    fn linked_session() -> Session {
        let mut session = Session::new(3600);
        session.twitter = Some(TwitterIdentity {
            screen_name: "alice".to_string(),
            oauth_token: "tok".to_string(),
            oauth_token_secret: "sec".to_string(),
        });
        session.mastodon = Some(MastodonIdentity {
            host: "example.social".to_string(),
            username: "alice".to_string(),
            access_code: "code".to_string(),
        });
        session
    }

    #[test]
    fn test_token_round_trip_keeps_identities() {
        let session = linked_session();
        let token = create_session_token(&session, SECRET).unwrap();
        let decoded = verify_session_token(&token, SECRET).unwrap();

        assert_eq!(decoded.twitter, session.twitter);
        assert_eq!(decoded.mastodon, session.mastodon);
        assert_eq!(decoded.csrf_token, session.csrf_token);
    }

    #[test]
    fn test_tampered_token_is_rejected() {
        let token = create_session_token(&linked_session(), SECRET).unwrap();
        let (_, signature) = token.split_once('.').unwrap();
        let forged_payload = {
            let mut other = Session::new(3600);
            other.twitter = Some(TwitterIdentity {
                screen_name: "mallory".to_string(),
                oauth_token: "t".to_string(),
                oauth_token_secret: "s".to_string(),
            });
            general_purpose::URL_SAFE_NO_PAD.encode(serde_json::to_vec(&other).unwrap())
        };

        let result = verify_session_token(&format!("{forged_payload}.{signature}"), SECRET);
        assert!(matches!(result, Err(AppError::InvalidSignature)));

        let result = verify_session_token(&token, "another-secret-key-32-bytes-long");
        assert!(matches!(result, Err(AppError::InvalidSignature)));
    }

    #[test]
    fn test_token_does_not_expose_access_tokens() {
        let token = create_session_token(&linked_session(), SECRET).unwrap();
        let (payload, _) = token.split_once('.').unwrap();
        let bytes = general_purpose::URL_SAFE_NO_PAD.decode(payload).unwrap();
        let visible = String::from_utf8_lossy(&bytes);

        assert!(!visible.contains("oauth_token_secret"));
        assert!(!visible.contains("access_code"));
        assert!(!visible.contains("alice"));

        // Fresh nonce per token
        let again = create_session_token(&linked_session(), SECRET).unwrap();
        assert_ne!(token.split_once('.').unwrap().0, again.split_once('.').unwrap().0);
    }

    #[test]
    fn test_expired_session_is_rejected() {
        let mut session = Session::new(3600);
        session.expires_at = Utc::now() - Duration::seconds(1);
        let token = create_session_token(&session, SECRET).unwrap();

        assert!(matches!(
            verify_session_token(&token, SECRET),
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(
            verify_session_token("not-a-token", SECRET),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn test_link_states() {
        let mut session = Session::new(3600);
        assert_eq!(session.twitter_state(), LinkState::Unlinked);
        assert_eq!(session.mastodon_state(), LinkState::Unlinked);
        assert!(session.linked().is_none());

        session.pending_mastodon_host = Some("example.social".to_string());
        assert_eq!(session.mastodon_state(), LinkState::PendingAuthorization);

        let session = linked_session();
        assert_eq!(session.twitter_state(), LinkState::Linked);
        assert_eq!(session.mastodon_state(), LinkState::Linked);
        let key = session.linked().unwrap().bridge_key();
        assert_eq!(key.twitter_handle, "alice");
        assert_eq!(key.mastodon_user, "alice");
    }

    #[test]
    fn test_logout_keeps_csrf_and_flashes() {
        let mut session = linked_session();
        session.flash("Bye");
        let csrf = session.csrf_token.clone();

        session.logout();

        assert!(session.twitter.is_none());
        assert!(session.mastodon.is_none());
        assert_eq!(session.csrf_token, csrf);
        assert_eq!(session.take_flashes(), vec!["Bye".to_string()]);
        assert!(session.flashes.is_empty());
    }

    #[test]
    fn test_csrf_matches() {
        let session = Session::new(3600);
        let token = session.csrf_token.clone();

        assert!(session.csrf_matches(&token));
        assert!(!session.csrf_matches(""));
        assert!(!session.csrf_matches("wrong"));
        assert!(!session.csrf_matches(&format!("{token}x")));
    }
}
