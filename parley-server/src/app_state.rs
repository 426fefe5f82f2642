use std::sync::Arc;

use shared::config::server::Config;

use crate::{auth::session::SessionManager, services::image_host::ImageHost};

/// Application state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Resolved server configuration.
    pub config: Arc<Config>,
    /// Database connection pool; absent in some test setups.
    pub pool: Option<sqlx::PgPool>,
    /// Session subsystem; absent in some test setups.
    pub sessions: Option<Arc<dyn SessionManager>>,
    /// Image host collaborator for avatar and message uploads.
    pub images: Option<Arc<dyn ImageHost>>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            config: Arc::new(Config::with_defaults()),
            pool: None,
            sessions: None,
            images: None,
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("pool", &self.pool.is_some())
            .field("sessions", &self.sessions.is_some())
            .field("images", &self.images.is_some())
            .finish()
    }
}
