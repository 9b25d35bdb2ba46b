//! Twitter client
//!
//! Three-legged OAuth 1.0a sign-in and the single timeline read the
//! bridge needs: the id of the user's newest tweet.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::oauth1::{self, Consumer, Token};
use crate::config::TwitterConfig;
use crate::error::AppError;

/// Temporary credentials issued at the start of sign-in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestToken {
    pub token: String,
    pub secret: String,
}

/// Access token pair plus the account it belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwitterAccess {
    pub screen_name: String,
    pub oauth_token: String,
    pub oauth_token_secret: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TwitterApi: Send + Sync {
    /// Step 1: obtain a request token bound to `callback_url`
    async fn request_token(&self, callback_url: &str) -> Result<RequestToken, AppError>;

    /// Step 2: where to send the browser
    fn authorize_url(&self, request_token: &RequestToken) -> String;

    /// Step 3: trade the verified request token for an access token
    async fn access_token(
        &self,
        request_token: &RequestToken,
        verifier: &str,
    ) -> Result<TwitterAccess, AppError>;

    /// Id of the newest tweet on the user's timeline, `None` if it is empty
    async fn latest_tweet_id(
        &self,
        oauth_token: &str,
        oauth_token_secret: &str,
    ) -> Result<Option<i64>, AppError>;
}

/// reqwest-backed implementation against api.twitter.com
pub struct TwitterClient {
    http: reqwest::Client,
    consumer: Consumer,
    api_base_url: String,
}

#[derive(Debug, Deserialize)]
struct Tweet {
    id: i64,
}

impl TwitterClient {
    pub fn new(http: reqwest::Client, config: &TwitterConfig) -> Self {
        Self {
            http,
            consumer: Consumer {
                key: config.consumer_key.clone(),
                secret: config.consumer_secret.clone(),
            },
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url, path)
    }

    async fn post_form(
        &self,
        url: &str,
        token: Option<Token<'_>>,
        params: &[(&str, &str)],
    ) -> Result<String, AppError> {
        let auth_header = oauth1::authorization_header(&self.consumer, token, "POST", url, params)?;
        let body: Vec<(&str, &str)> = params
            .iter()
            .filter(|(k, _)| !k.starts_with("oauth_"))
            .copied()
            .collect();

        let response = self
            .http
            .post(url)
            .header(reqwest::header::AUTHORIZATION, auth_header)
            .form(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(AppError::Upstream(format!(
                "Twitter returned {status} for {url}: {text}"
            )));
        }

        Ok(text)
    }
}

#[async_trait]
impl TwitterApi for TwitterClient {
    async fn request_token(&self, callback_url: &str) -> Result<RequestToken, AppError> {
        let url = self.endpoint("/oauth/request_token");
        let body = self
            .post_form(&url, None, &[("oauth_callback", callback_url)])
            .await?;

        parse_request_token(&body)
    }

    fn authorize_url(&self, request_token: &RequestToken) -> String {
        format!(
            "{}?oauth_token={}",
            self.endpoint("/oauth/authorize"),
            urlencoding::encode(&request_token.token)
        )
    }

    async fn access_token(
        &self,
        request_token: &RequestToken,
        verifier: &str,
    ) -> Result<TwitterAccess, AppError> {
        let url = self.endpoint("/oauth/access_token");
        let token = Token {
            key: &request_token.token,
            secret: &request_token.secret,
        };
        let body = self
            .post_form(&url, Some(token), &[("oauth_verifier", verifier)])
            .await?;

        parse_access_token(&body)
    }

    async fn latest_tweet_id(
        &self,
        oauth_token: &str,
        oauth_token_secret: &str,
    ) -> Result<Option<i64>, AppError> {
        let url = self.endpoint(
            "/1.1/statuses/user_timeline.json?count=1&tweet_mode=extended&include_rts=true",
        );
        let token = Token {
            key: oauth_token,
            secret: oauth_token_secret,
        };
        let auth_header = oauth1::authorization_header(&self.consumer, Some(token), "GET", &url, &[])?;

        let response = self
            .http
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, auth_header)
            .send()
            .await
            .map_err(|e| AppError::StatusFetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::StatusFetch(format!(
                "Twitter timeline returned {}",
                response.status()
            )));
        }

        let tweets: Vec<Tweet> = response
            .json()
            .await
            .map_err(|e| AppError::StatusFetch(e.to_string()))?;

        Ok(tweets.first().map(|tweet| tweet.id))
    }
}

fn form_field(params: &[(String, String)], name: &str) -> Option<String> {
    params
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.clone())
        .filter(|v| !v.is_empty())
}

fn parse_form(body: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(body.trim().as_bytes())
        .into_owned()
        .collect()
}

fn parse_request_token(body: &str) -> Result<RequestToken, AppError> {
    let params = parse_form(body);
    let missing = |field: &str| AppError::Upstream(format!("request token response lacks {field}"));

    if form_field(&params, "oauth_callback_confirmed").as_deref() != Some("true") {
        return Err(AppError::Upstream(
            "Twitter did not confirm the OAuth callback".to_string(),
        ));
    }

    Ok(RequestToken {
        token: form_field(&params, "oauth_token").ok_or_else(|| missing("oauth_token"))?,
        secret: form_field(&params, "oauth_token_secret")
            .ok_or_else(|| missing("oauth_token_secret"))?,
    })
}

fn parse_access_token(body: &str) -> Result<TwitterAccess, AppError> {
    let params = parse_form(body);
    let missing = |field: &str| AppError::Upstream(format!("access token response lacks {field}"));

    Ok(TwitterAccess {
        screen_name: form_field(&params, "screen_name").ok_or_else(|| missing("screen_name"))?,
        oauth_token: form_field(&params, "oauth_token").ok_or_else(|| missing("oauth_token"))?,
        oauth_token_secret: form_field(&params, "oauth_token_secret")
            .ok_or_else(|| missing("oauth_token_secret"))?,
    })
}
