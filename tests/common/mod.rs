//! Common test utilities for E2E tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use moa_bridge::auth::{SESSION_COOKIE, Session, verify_session_token};
use moa_bridge::data::{AppCredentials, Database, MastodonHost};
use moa_bridge::error::AppError;
use moa_bridge::platform::{MastodonAccount, MastodonApi, RequestToken, TwitterAccess, TwitterApi};
use moa_bridge::{AppState, config};
use tempfile::TempDir;
use tokio::net::TcpListener;

pub const REQUEST_TOKEN: &str = "req-token";
pub const GOOD_VERIFIER: &str = "good-verifier";
pub const LATEST_TWEET_ID: i64 = 1_500;
pub const LATEST_STATUS_ID: i64 = 42;

/// In-process stand-in for Twitter
pub struct FakeTwitter {
    pub screen_name: Mutex<String>,
}

#[async_trait]
impl TwitterApi for FakeTwitter {
    async fn request_token(&self, callback_url: &str) -> Result<RequestToken, AppError> {
        assert!(callback_url.ends_with("/twitter_oauthorized"));
        Ok(RequestToken {
            token: REQUEST_TOKEN.to_string(),
            secret: "req-secret".to_string(),
        })
    }

    fn authorize_url(&self, request_token: &RequestToken) -> String {
        format!(
            "https://twitter.test/oauth/authorize?oauth_token={}",
            request_token.token
        )
    }

    async fn access_token(
        &self,
        request_token: &RequestToken,
        verifier: &str,
    ) -> Result<TwitterAccess, AppError> {
        if request_token.token != REQUEST_TOKEN || verifier != GOOD_VERIFIER {
            return Err(AppError::Upstream("bad verifier".to_string()));
        }
        Ok(TwitterAccess {
            screen_name: self.screen_name.lock().unwrap().clone(),
            oauth_token: "tw-access".to_string(),
            oauth_token_secret: "tw-access-secret".to_string(),
        })
    }

    async fn latest_tweet_id(&self, _: &str, _: &str) -> Result<Option<i64>, AppError> {
        Ok(Some(LATEST_TWEET_ID))
    }
}

/// In-process stand-in for every Mastodon server
pub struct FakeMastodon {
    pub registrations: AtomicUsize,
    pub fail_status_fetch: AtomicBool,
    pub fail_token_exchange: AtomicBool,
    pub username: Mutex<String>,
}

#[async_trait]
impl MastodonApi for FakeMastodon {
    async fn register_app(
        &self,
        hostname: &str,
        redirect_uri: &str,
    ) -> Result<AppCredentials, AppError> {
        assert!(redirect_uri.ends_with("/mastodon_oauthorized"));
        if hostname.ends_with(".down") {
            return Err(AppError::HostRegistration {
                hostname: hostname.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        let n = self.registrations.fetch_add(1, Ordering::SeqCst);
        Ok(AppCredentials {
            client_id: format!("client-{n}"),
            client_secret: format!("secret-{n}"),
        })
    }

    fn authorize_url(&self, host: &MastodonHost, _redirect_uri: &str) -> String {
        format!(
            "https://{}/oauth/authorize?client_id={}",
            host.hostname, host.client_id
        )
    }

    async fn exchange_code(
        &self,
        _host: &MastodonHost,
        code: &str,
        _redirect_uri: &str,
    ) -> Result<String, AppError> {
        if self.fail_token_exchange.load(Ordering::SeqCst) {
            return Err(AppError::Upstream("invalid_grant".to_string()));
        }
        Ok(format!("md-access-{code}"))
    }

    async fn verify_credentials(&self, _: &str, _: &str) -> Result<MastodonAccount, AppError> {
        Ok(MastodonAccount {
            id: "109".to_string(),
            username: self.username.lock().unwrap().clone(),
        })
    }

    async fn latest_status_id(&self, _: &str, _: &str, _: &str) -> Result<Option<i64>, AppError> {
        if self.fail_status_fetch.load(Ordering::SeqCst) {
            return Err(AppError::StatusFetch("statuses unavailable".to_string()));
        }
        Ok(Some(LATEST_STATUS_ID))
    }
}

/// Test server instance
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub twitter: Arc<FakeTwitter>,
    pub mastodon: Arc<FakeMastodon>,
    pub _temp_dir: TempDir,
}

impl TestServer {
    /// Create a new test server instance
    pub async fn new() -> Self {
        // Create temporary directory for test database
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");

        // Create test configuration
        let config = config::AppConfig {
            server: config::ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0, // Let OS assign port
                domain: "localhost".to_string(),
                protocol: "http".to_string(),
            },
            database: config::DatabaseConfig {
                path: db_path.clone(),
            },
            auth: config::AuthConfig {
                session_secret: "test-secret-key-32-bytes-long!!!".to_string(),
                session_max_age: 604800,
            },
            twitter: config::TwitterConfig {
                consumer_key: "test-consumer-key".to_string(),
                consumer_secret: "test-consumer-secret".to_string(),
                api_base_url: "https://twitter.test".to_string(),
            },
            mastodon: config::MastodonConfig {
                app_name: "Moa".to_string(),
                website: None,
                scopes: "read write".to_string(),
            },
            logging: config::LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        };

        let twitter = Arc::new(FakeTwitter {
            screen_name: Mutex::new("alice".to_string()),
        });
        let mastodon = Arc::new(FakeMastodon {
            registrations: AtomicUsize::new(0),
            fail_status_fetch: AtomicBool::new(false),
            fail_token_exchange: AtomicBool::new(false),
            username: Mutex::new("alice".to_string()),
        });

        // Initialize app state
        let db = Database::connect(&db_path).await.unwrap();
        let state = AppState::from_parts(config, db, twitter.clone(), mastodon.clone());

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = moa_bridge::build_router(state.clone());

        // Spawn server in background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr: addr_str,
            state,
            twitter,
            mastodon,
            _temp_dir: temp_dir,
        }
    }

    /// Get base URL for requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }

    /// A fresh browser with no session
    pub fn browser(&self) -> Browser {
        Browser {
            base: self.addr.clone(),
            secret: self.state.config.auth.session_secret.clone(),
            client: no_redirect_client(),
            cookie: Mutex::new(None),
        }
    }
}

pub fn no_redirect_client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .timeout(std::time::Duration::from_secs(10))
        .build()
        .expect("failed to build no-redirect client")
}

/// Non-redirecting client that keeps the session cookie between requests
pub struct Browser {
    base: String,
    secret: String,
    client: reqwest::Client,
    cookie: Mutex<Option<String>>,
}

impl Browser {
    pub async fn get(&self, path: &str) -> reqwest::Response {
        let request = self.client.get(format!("{}{}", self.base, path));
        self.send(request).await
    }

    pub async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> reqwest::Response {
        let request = self.client.post(format!("{}{}", self.base, path)).form(form);
        self.send(request).await
    }

    async fn send(&self, mut request: reqwest::RequestBuilder) -> reqwest::Response {
        let cookie = self.cookie.lock().unwrap().clone();
        if let Some(token) = cookie {
            request = request.header("cookie", format!("{SESSION_COOKIE}={token}"));
        }

        let response = request.send().await.expect("request succeeds");
        for value in response.headers().get_all("set-cookie") {
            let value = value.to_str().unwrap();
            let pair = value.split(';').next().unwrap();
            if let Some(token) = pair.strip_prefix(&format!("{SESSION_COOKIE}=")) {
                *self.cookie.lock().unwrap() = Some(token.to_string());
            }
        }
        response
    }

    /// Decoded session as the server last stored it
    pub fn session(&self) -> Session {
        let token = self.cookie.lock().unwrap().clone().expect("session cookie");
        verify_session_token(&token, &self.secret).expect("valid session cookie")
    }

    pub fn csrf_token(&self) -> String {
        self.session().csrf_token
    }

    /// Complete the Twitter handshake
    pub async fn sign_in_twitter(&self) {
        let response = self.get("/twitter_login").await;
        assert_eq!(response.status(), 303);

        let response = self
            .get(&format!(
                "/twitter_oauthorized?oauth_token={REQUEST_TOKEN}&oauth_verifier={GOOD_VERIFIER}"
            ))
            .await;
        assert_eq!(response.status(), 303);
        assert_eq!(location(&response), "/");
    }

    /// Complete the Mastodon handshake for `mastodon_id`
    pub async fn sign_in_mastodon(&self, mastodon_id: &str) {
        // Load the page first so the session carries a CSRF token
        self.get("/").await;
        let csrf = self.csrf_token();

        let response = self
            .post_form(
                "/mastodon_login",
                &[("mastodon_id", mastodon_id), ("csrf_token", &csrf)],
            )
            .await;
        assert_eq!(response.status(), 303);
        assert!(location(&response).contains("/oauth/authorize"));

        let response = self.get("/mastodon_oauthorized?code=abc").await;
        assert_eq!(response.status(), 303);
        assert_eq!(location(&response), "/");
    }

    /// Save settings with the given extra form fields
    pub async fn save_options(&self, fields: &[(&str, &str)]) -> reqwest::Response {
        let csrf = self.csrf_token();
        let mut form = vec![("csrf_token", csrf.as_str())];
        form.extend_from_slice(fields);
        self.post_form("/options", &form).await
    }
}

pub fn location(response: &reqwest::Response) -> String {
    response
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .expect("location header")
        .to_string()
}
