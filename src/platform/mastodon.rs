//! Mastodon client
//!
//! Every Mastodon server is its own OAuth provider, so each call names
//! the host it talks to. The bridge registers itself once per host
//! (`POST /api/v1/apps`), then runs the authorization code flow and
//! reads the signed-in account and its newest status.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::MastodonConfig;
use crate::data::{AppCredentials, MastodonHost};
use crate::error::AppError;

/// The authenticated Mastodon account
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MastodonAccount {
    pub id: String,
    pub username: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MastodonApi: Send + Sync {
    /// Register the bridge as an OAuth application on `hostname`
    async fn register_app(
        &self,
        hostname: &str,
        redirect_uri: &str,
    ) -> Result<AppCredentials, AppError>;

    /// Authorization endpoint of `host` with the bridge's client id
    fn authorize_url(&self, host: &MastodonHost, redirect_uri: &str) -> String;

    /// Exchange an authorization code for an access token
    async fn exchange_code(
        &self,
        host: &MastodonHost,
        code: &str,
        redirect_uri: &str,
    ) -> Result<String, AppError>;

    /// Account that owns `access_token`
    async fn verify_credentials(
        &self,
        hostname: &str,
        access_token: &str,
    ) -> Result<MastodonAccount, AppError>;

    /// Id of the account's newest status, `None` if it has not posted
    async fn latest_status_id(
        &self,
        hostname: &str,
        access_token: &str,
        account_id: &str,
    ) -> Result<Option<i64>, AppError>;
}

/// reqwest-backed implementation speaking HTTPS to each host
pub struct MastodonClient {
    http: reqwest::Client,
    app_name: String,
    website: Option<String>,
    scopes: String,
}

#[derive(Debug, Deserialize)]
struct AppRegistration {
    client_id: String,
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct StatusId {
    id: String,
}

impl MastodonClient {
    pub fn new(http: reqwest::Client, config: &MastodonConfig) -> Self {
        Self {
            http,
            app_name: config.app_name.clone(),
            website: config.website.clone(),
            scopes: config
                .scopes
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    fn api_url(hostname: &str, path: &str) -> String {
        format!("https://{hostname}{path}")
    }
}

#[async_trait]
impl MastodonApi for MastodonClient {
    async fn register_app(
        &self,
        hostname: &str,
        redirect_uri: &str,
    ) -> Result<AppCredentials, AppError> {
        let registration_error = |reason: String| AppError::HostRegistration {
            hostname: hostname.to_string(),
            reason,
        };

        let mut form = vec![
            ("client_name", self.app_name.as_str()),
            ("redirect_uris", redirect_uri),
            ("scopes", self.scopes.as_str()),
        ];
        if let Some(website) = &self.website {
            form.push(("website", website.as_str()));
        }

        let response = self
            .http
            .post(Self::api_url(hostname, "/api/v1/apps"))
            .form(&form)
            .send()
            .await
            .map_err(|e| registration_error(e.to_string()))?;

        if !response.status().is_success() {
            return Err(registration_error(format!(
                "app registration returned {}",
                response.status()
            )));
        }

        let app: AppRegistration = response
            .json()
            .await
            .map_err(|e| registration_error(e.to_string()))?;

        Ok(AppCredentials {
            client_id: app.client_id,
            client_secret: app.client_secret,
        })
    }

    fn authorize_url(&self, host: &MastodonHost, redirect_uri: &str) -> String {
        let base = Self::api_url(&host.hostname, "/oauth/authorize");
        let params = [
            ("client_id", host.client_id.as_str()),
            ("response_type", "code"),
            ("redirect_uri", redirect_uri),
            ("scope", self.scopes.as_str()),
        ];

        match url::Url::parse_with_params(&base, &params) {
            Ok(url) => url.to_string(),
            // Hostnames are validated before they get here
            Err(_) => base,
        }
    }

    async fn exchange_code(
        &self,
        host: &MastodonHost,
        code: &str,
        redirect_uri: &str,
    ) -> Result<String, AppError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", host.client_id.as_str()),
            ("client_secret", host.client_secret.as_str()),
            ("redirect_uri", redirect_uri),
            ("scope", self.scopes.as_str()),
        ];

        let response = self
            .http
            .post(Self::api_url(&host.hostname, "/oauth/token"))
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "{} refused the authorization code: {}",
                host.hostname,
                response.status()
            )));
        }

        let token: TokenResponse = response.json().await?;
        Ok(token.access_token)
    }

    async fn verify_credentials(
        &self,
        hostname: &str,
        access_token: &str,
    ) -> Result<MastodonAccount, AppError> {
        let response = self
            .http
            .get(Self::api_url(hostname, "/api/v1/accounts/verify_credentials"))
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Upstream(format!(
                "{hostname} rejected the access token: {}",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }

    async fn latest_status_id(
        &self,
        hostname: &str,
        access_token: &str,
        account_id: &str,
    ) -> Result<Option<i64>, AppError> {
        let path = format!(
            "/api/v1/accounts/{}/statuses?limit=1",
            urlencoding::encode(account_id)
        );
        let response = self
            .http
            .get(Self::api_url(hostname, &path))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::StatusFetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::StatusFetch(format!(
                "{hostname} statuses returned {}",
                response.status()
            )));
        }

        let statuses: Vec<StatusId> = response
            .json()
            .await
            .map_err(|e| AppError::StatusFetch(e.to_string()))?;

        statuses
            .first()
            .map(|status| parse_status_id(&status.id))
            .transpose()
    }
}

/// Mastodon serializes ids as decimal strings
fn parse_status_id(id: &str) -> Result<i64, AppError> {
    id.parse::<i64>()
        .map_err(|_| AppError::StatusFetch(format!("non-numeric status id {id:?}")))
}
