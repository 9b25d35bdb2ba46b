//! Service layer
//!
//! Contains business logic separated from HTTP handlers.
//! Services orchestrate the database and the platform clients.

mod bridge;
mod host;
mod linking;

pub use bridge::{BridgeService, SaveOutcome};
pub use host::HostRegistry;
pub use linking::{MastodonId, parse_mastodon_id};
