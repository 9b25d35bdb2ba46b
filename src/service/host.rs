//! Mastodon host registry
//!
//! The bridge holds one OAuth application per Mastodon server. Hosts are
//! registered on first use and reused from the database afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::data::{Database, MastodonHost};
use crate::error::AppError;
use crate::metrics::HOST_REGISTRATIONS_TOTAL;
use crate::platform::MastodonApi;

/// Resolves hostnames to registered OAuth applications
pub struct HostRegistry {
    db: Arc<Database>,
    mastodon: Arc<dyn MastodonApi>,
    redirect_uri: String,
    /// One lock per hostname currently being resolved
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl HostRegistry {
    /// `redirect_uri` is the Mastodon callback announced at registration
    pub fn new(db: Arc<Database>, mastodon: Arc<dyn MastodonApi>, redirect_uri: String) -> Self {
        Self {
            db,
            mastodon,
            redirect_uri,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Look up `hostname`, registering the bridge there if it is new
    ///
    /// Concurrent calls for one hostname are serialized so the remote app
    /// is created once. Across processes the unique hostname column keeps
    /// the first stored registration.
    ///
    /// # Errors
    /// `HostRegistration` if the server refuses or cannot be reached; no
    /// row is written in that case.
    pub async fn resolve_or_register(&self, hostname: &str) -> Result<MastodonHost, AppError> {
        if let Some(host) = self.db.get_host_by_hostname(hostname).await? {
            tracing::debug!(%hostname, "Using registered Mastodon host");
            return Ok(host);
        }

        let lock = self.host_lock(hostname).await;
        let result = {
            let _guard = lock.lock().await;
            self.register_locked(hostname).await
        };
        drop(lock);
        self.release_lock(hostname).await;

        result
    }

    async fn register_locked(&self, hostname: &str) -> Result<MastodonHost, AppError> {
        // Another task may have finished while we waited
        if let Some(host) = self.db.get_host_by_hostname(hostname).await? {
            return Ok(host);
        }

        let credentials = match self
            .mastodon
            .register_app(hostname, &self.redirect_uri)
            .await
        {
            Ok(credentials) => credentials,
            Err(error) => {
                HOST_REGISTRATIONS_TOTAL.with_label_values(&["failed"]).inc();
                tracing::warn!(%hostname, %error, "Mastodon app registration failed");
                return Err(error);
            }
        };

        let (host, inserted) = self
            .db
            .insert_host_if_absent(hostname, &credentials)
            .await?;

        if inserted {
            HOST_REGISTRATIONS_TOTAL
                .with_label_values(&["registered"])
                .inc();
            tracing::info!(%hostname, host_id = host.id, "Registered new Mastodon host");
        } else {
            HOST_REGISTRATIONS_TOTAL.with_label_values(&["raced"]).inc();
            tracing::info!(%hostname, host_id = host.id, "Mastodon host was registered concurrently");
        }

        Ok(host)
    }

    async fn host_lock(&self, hostname: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(hostname.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drop the map entry once no other task holds it
    async fn release_lock(&self, hostname: &str) {
        let mut locks = self.locks.lock().await;
        if let Some(lock) = locks.get(hostname) {
            if Arc::strong_count(lock) == 1 {
                locks.remove(hostname);
            }
        }
    }
}
