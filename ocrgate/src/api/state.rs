use std::sync::Arc;
use std::time::Duration;

use crate::auth::AuthGate;
use crate::config::Config;
use crate::ocr::{ModelCache, ModelFactory};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: AuthGate,
    /// Shared by every request; models stay loaded until shutdown.
    pub models: Arc<ModelCache>,
}

impl AppState {
    pub fn new(config: Config, auth: AuthGate, factory: Arc<dyn ModelFactory>) -> Self {
        let load_timeout = Duration::from_secs(config.ocr.load_timeout_secs);
        Self {
            config: Arc::new(config),
            auth,
            models: Arc::new(ModelCache::new(factory, load_timeout)),
        }
    }
}
