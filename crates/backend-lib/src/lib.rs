// ============================
// crates/backend-lib/src/lib.rs
// ============================
//! Core functionality for the roomsync WebSocket server.

pub mod config;
pub mod coordinator;
pub mod directory;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod permissions;
pub mod registry;
pub mod room;
pub mod room_actor;
pub mod validation;
pub mod ws_router;

use std::sync::Arc;

use crate::config::Settings;
use crate::coordinator::RoomCoordinator;
use crate::middleware::RateLimiter;

/// Application state shared across all handlers
pub struct AppState {
    /// Room coordinator
    pub coordinator: Arc<RoomCoordinator>,
    /// Settings the server was started with
    pub settings: Arc<Settings>,
    /// Rate limiter for the REST surface
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Create a new application state
    pub fn new(settings: Settings) -> Self {
        let rate_limiter = Arc::new(RateLimiter::from_settings(&settings.rate_limit));
        Self {
            coordinator: Arc::new(RoomCoordinator::new()),
            settings: Arc::new(settings),
            rate_limiter,
        }
    }
}
