//! Platform API clients
//!
//! Outbound HTTP to Twitter and to individual Mastodon servers:
//! - OAuth 1.0a request signing (Twitter)
//! - Twitter three-legged sign-in and timeline reads
//! - Mastodon app registration, OAuth 2 code exchange and account reads
//!
//! Both clients sit behind traits so handlers and services can be
//! exercised against in-process fakes.

pub mod mastodon;
pub mod oauth1;
pub mod twitter;

pub use mastodon::{MastodonAccount, MastodonApi, MastodonClient};
pub use twitter::{RequestToken, TwitterAccess, TwitterApi, TwitterClient};

#[cfg(test)]
pub use mastodon::MockMastodonApi;
#[cfg(test)]
pub use twitter::MockTwitterApi;
