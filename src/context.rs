use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::{ProgressTracker, Registry};

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<AppConfig>,
    pub registry: Arc<dyn Registry>,
    pub progress: ProgressTracker,
}

impl AppContext {
    pub fn new(config: AppConfig, registry: Arc<dyn Registry>) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            progress: ProgressTracker::new(),
        }
    }
}
