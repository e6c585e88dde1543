// ============================
// crates/backend-lib/src/lib.rs
// ============================
//! Core backend-lib functionality for the Wordrush coordination
//! server.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod presence;
pub mod rate_limit;
pub mod room;
pub mod store;
pub mod words;
pub mod ws_router;

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::Settings;
use crate::coordinator::RoomCoordinator;
use crate::rate_limit::SlidingWindowLimiter;
use crate::store::SharedStore;
use crate::words::Lexicon;
use wordrush_common::{RoomCode, ServerToClient};

/// Per-connection sender registered for fan-out.
pub type ClientSender = mpsc::Sender<ServerToClient>;

/// Application state shared across all handlers
pub struct AppState {
    /// Settings manager
    pub settings: Settings,
    /// Shared store backend
    pub store: Arc<dyn SharedStore>,
    /// Room coordination engine
    pub coordinator: Arc<RoomCoordinator>,
    /// Admission control
    pub limiter: SlidingWindowLimiter,
    /// Room-scoped fan-out registry: room code -> (connection id, sender)
    pub room_clients: DashMap<RoomCode, Vec<(String, ClientSender)>>,
    /// Lobby fan-out registry: connection id -> sender
    pub lobby_clients: DashMap<String, ClientSender>,
}

impl AppState {
    /// Create a new application state
    pub fn new(
        store: Arc<dyn SharedStore>,
        words: Arc<dyn Lexicon>,
        settings: Settings,
    ) -> Self {
        let coordinator = Arc::new(RoomCoordinator::new(
            Arc::clone(&store),
            words,
            settings.clone(),
        ));
        let limiter = SlidingWindowLimiter::new(Arc::clone(&store), &settings.rate_limit);
        Self {
            settings,
            store,
            coordinator,
            limiter,
            room_clients: DashMap::new(),
            lobby_clients: DashMap::new(),
        }
    }
}
