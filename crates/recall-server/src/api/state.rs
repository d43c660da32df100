use std::sync::Arc;

use recall::SearchEngine;

use super::auth::{AuthConfig, LoginRateLimiter};
use crate::chat::ChatService;

/// Process-wide shared state threaded through every handler.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SearchEngine>,
    pub chat: Arc<ChatService>,
    pub auth: Arc<AuthConfig>,
    pub login_limiter: Arc<LoginRateLimiter>,
}

impl AppState {
    pub fn new(engine: Arc<SearchEngine>, chat: Arc<ChatService>, auth: AuthConfig) -> Self {
        Self {
            engine,
            chat,
            auth: Arc::new(auth),
            login_limiter: Arc::new(LoginRateLimiter::new()),
        }
    }
}
