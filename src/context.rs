use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    /// Cancelled on Ctrl-C / SIGTERM; stops the poll loop and any running walk.
    pub shutdown: CancellationToken,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(config),
            shutdown: CancellationToken::new(),
        }
    }
}
