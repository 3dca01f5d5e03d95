use std::sync::RwLock;

use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::ClientError;
use crate::notify::Notifier;
use crate::observability::metrics::Metrics;
use crate::session::{AuthToken, FileTokenStore, MemoryTokenStore, TokenStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Screen {
    Login,
    Dashboard,
    OrderHistory,
    DriverRoutes,
}

/// Session context shared by the API facade and every screen controller.
pub struct AppState {
    store: Box<dyn TokenStore>,
    token: RwLock<Option<AuthToken>>,
    navigation_tx: watch::Sender<Screen>,
    pub notifier: Notifier,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(store: Box<dyn TokenStore>, notification_buffer: usize) -> Self {
        let token = store.load();
        let initial = if token.is_some() {
            Screen::Dashboard
        } else {
            Screen::Login
        };
        let (navigation_tx, _unused_rx) = watch::channel(initial);

        Self {
            store,
            token: RwLock::new(token),
            navigation_tx,
            notifier: Notifier::new(notification_buffer),
            metrics: Metrics::new(),
        }
    }

    pub fn in_memory(notification_buffer: usize) -> Self {
        Self::new(Box::new(MemoryTokenStore::new()), notification_buffer)
    }

    pub fn from_config(config: &Config) -> Self {
        let store: Box<dyn TokenStore> = match &config.token_path {
            Some(path) => Box::new(FileTokenStore::new(path)),
            None => Box::new(MemoryTokenStore::new()),
        };
        Self::new(store, config.notification_buffer)
    }

    pub fn token(&self) -> Option<AuthToken> {
        self.token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn store_token(&self, token: &str) {
        self.store.save(token);
        *self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(token.to_string());
    }

    pub fn clear_token(&self) {
        self.store.clear();
        *self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }

    pub fn navigate(&self, screen: Screen) {
        info!(?screen, "navigate");
        self.navigation_tx.send_replace(screen);
    }

    pub fn current_screen(&self) -> Screen {
        *self.navigation_tx.borrow()
    }

    pub fn watch_navigation(&self) -> watch::Receiver<Screen> {
        self.navigation_tx.subscribe()
    }

    /// Token gate run by every protected screen on mount.
    pub fn require_token(&self) -> Result<AuthToken, ClientError> {
        match self.token() {
            Some(token) => Ok(token),
            None => {
                self.notifier
                    .error("Token not found. Redirecting to login.");
                self.navigate(Screen::Login);
                Err(ClientError::MissingToken)
            }
        }
    }

    /// Reaction to a 401/419 from any backend call.
    pub fn expire_session(&self) {
        warn!("session expired; clearing stored token");
        self.metrics.session_expiries_total.inc();
        self.clear_token();
        self.notifier
            .warning("Session expired. Please log in again.");
        self.navigate(Screen::Login);
    }
}
