pub mod config;
pub mod error;
pub mod registry;
pub mod service;
pub mod session;

pub use config::{IdentityMode, ServiceConfig, WriteMode};
pub use error::{ConfigError, PqError};
pub use registry::{SessionHandle, SessionTable};
pub use service::QueueService;
pub use session::{ClientId, QueueInfo, Session};
pub use prioq_dsa::MAX_CAPACITY;

use std::path::PathBuf;
use std::sync::Arc;

/// Fluent construction of a [`QueueService`].
pub struct ServiceBuilder {
    pub config: ServiceConfig,
}

impl ServiceBuilder {
    pub fn new() -> Self {
        Self {
            config: ServiceConfig::default(),
        }
    }

    /// Overrides the default service configuration.
    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<PathBuf>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    pub fn with_write_mode(mut self, mode: WriteMode) -> Self {
        self.config.write_mode = mode;
        self
    }

    pub fn with_identity(mut self, identity: IdentityMode) -> Self {
        self.config.identity = identity;
        self
    }

    pub fn start(self) -> Arc<QueueService> {
        QueueService::start(self.config)
    }
}

impl Default for ServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
