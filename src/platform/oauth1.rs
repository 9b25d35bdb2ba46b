//! OAuth 1.0a request signing (HMAC-SHA1).
//!
//! Twitter authenticates the sign-in handshake and user-context API
//! calls with an `Authorization: OAuth ...` header whose signature
//! covers the method, the base URL and every request parameter.

use std::collections::BTreeMap;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha1::Sha1;

use crate::error::AppError;

/// Consumer (application) credentials
#[derive(Debug, Clone)]
pub struct Consumer {
    pub key: String,
    pub secret: String,
}

/// Token credentials: a request token during sign-in, an access token after
#[derive(Debug, Clone, Copy)]
pub struct Token<'a> {
    pub key: &'a str,
    pub secret: &'a str,
}

/// Build the `Authorization` header for a request.
///
/// `params` holds the form body parameters plus protocol parameters such
/// as `oauth_callback` or `oauth_verifier`; query parameters are read from
/// `url` itself. Protocol parameters are echoed in the header.
pub fn authorization_header(
    consumer: &Consumer,
    token: Option<Token<'_>>,
    method: &str,
    url: &str,
    params: &[(&str, &str)],
) -> Result<String, AppError> {
    let timestamp = chrono::Utc::now().timestamp().to_string();
    build_header(consumer, token, method, url, params, &generate_nonce(), &timestamp)
}

fn build_header(
    consumer: &Consumer,
    token: Option<Token<'_>>,
    method: &str,
    url: &str,
    params: &[(&str, &str)],
    nonce: &str,
    timestamp: &str,
) -> Result<String, AppError> {
    let mut oauth_params: BTreeMap<String, String> = BTreeMap::new();
    oauth_params.insert("oauth_consumer_key".to_string(), consumer.key.clone());
    oauth_params.insert("oauth_nonce".to_string(), nonce.to_string());
    oauth_params.insert(
        "oauth_signature_method".to_string(),
        "HMAC-SHA1".to_string(),
    );
    oauth_params.insert("oauth_timestamp".to_string(), timestamp.to_string());
    oauth_params.insert("oauth_version".to_string(), "1.0".to_string());
    if let Some(token) = token {
        oauth_params.insert("oauth_token".to_string(), token.key.to_string());
    }
    for (k, v) in params.iter().filter(|(k, _)| k.starts_with("oauth_")) {
        oauth_params.insert((*k).to_string(), (*v).to_string());
    }

    let parsed = url::Url::parse(url)
        .map_err(|e| AppError::Encryption(format!("cannot sign invalid URL {url}: {e}")))?;
    // Default ports are omitted from the signed URL
    let authority = match parsed.port() {
        Some(port) => format!("{}:{port}", parsed.host_str().unwrap_or_default()),
        None => parsed.host_str().unwrap_or_default().to_string(),
    };
    let base_url = format!("{}://{}{}", parsed.scheme(), authority, parsed.path());

    let mut signed: Vec<(String, String)> = oauth_params
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    signed.extend(
        params
            .iter()
            .filter(|(k, _)| !k.starts_with("oauth_"))
            .map(|(k, v)| ((*k).to_string(), (*v).to_string())),
    );
    signed.extend(
        parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned())),
    );

    let signature = sign(
        method,
        &base_url,
        &signed,
        &consumer.secret,
        token.map(|t| t.secret).unwrap_or_default(),
    )?;
    oauth_params.insert("oauth_signature".to_string(), signature);

    let header = oauth_params
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", percent_encode(k), percent_encode(v)))
        .collect::<Vec<_>>()
        .join(", ");

    Ok(format!("OAuth {header}"))
}

/// Signature base string: `METHOD&enc(base_url)&enc(sorted params)`
fn signature_base_string(method: &str, base_url: &str, params: &[(String, String)]) -> String {
    let mut encoded: Vec<(String, String)> = params
        .iter()
        .map(|(k, v)| (percent_encode(k), percent_encode(v)))
        .collect();
    encoded.sort();

    let param_string = encoded
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.to_uppercase(),
        percent_encode(base_url),
        percent_encode(&param_string)
    )
}

fn sign(
    method: &str,
    base_url: &str,
    params: &[(String, String)],
    consumer_secret: &str,
    token_secret: &str,
) -> Result<String, AppError> {
    let base = signature_base_string(method, base_url, params);
    let signing_key = format!(
        "{}&{}",
        percent_encode(consumer_secret),
        percent_encode(token_secret)
    );

    let mut mac = Hmac::<Sha1>::new_from_slice(signing_key.as_bytes())
        .map_err(|e| AppError::Encryption(e.to_string()))?;
    mac.update(base.as_bytes());

    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// RFC 3986 encoding: everything but ALPHA / DIGIT / "-" / "." / "_" / "~"
fn percent_encode(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

fn generate_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
