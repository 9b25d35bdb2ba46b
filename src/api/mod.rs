//! API layer
//!
//! HTTP handlers for:
//! - The index page
//! - Bridge settings
//! - Metrics (Prometheus)

mod index;
pub mod metrics;
mod settings;

use axum::{
    Router,
    routing::{get, post},
};

use crate::AppState;

pub use metrics::metrics_router;
pub use settings::{SETTINGS_SAVED, SettingsForm};

/// Create the page router
///
/// Routes:
/// - GET / - Link state and settings
/// - POST /options - Save settings
/// - POST /delete - Delete the bridge and sign out
pub fn pages_router() -> Router<AppState> {
    Router::new()
        .route("/", get(index::index))
        .route("/options", post(settings::save_options))
        .route("/delete", post(settings::delete_bridge))
}
