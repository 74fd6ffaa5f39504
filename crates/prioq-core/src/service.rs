use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::registry::SessionTable;

/// Owns every piece of service state: the configuration and the SessionTable.
///
/// Sessions live between `start` and `stop`; `stop` detaches whatever is
/// still attached.
pub struct QueueService {
    config: ServiceConfig,
    sessions: SessionTable,
    stopped: AtomicBool,
}

impl QueueService {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            sessions: SessionTable::new(),
            stopped: AtomicBool::new(false),
        }
    }

    /// Creates a running service ready to be shared between workers.
    pub fn start(config: ServiceConfig) -> Arc<Self> {
        tracing::info!(
            "QueueService: started (endpoint={}, write_mode={:?})",
            config.endpoint.display(),
            config.write_mode
        );
        Arc::new(Self::new(config))
    }

    /// Detaches every live session. Returns how many were released.
    pub fn stop(&self) -> usize {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return 0;
        }
        let released = self.sessions.clear();
        tracing::info!("QueueService: stopped, released {} session(s)", released);
        released
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    /// Logs every attached client at debug level.
    pub fn log_sessions(&self) {
        tracing::debug!("QueueService: {} open session(s)", self.sessions.len());
        self.sessions.foreach_debug(|client| {
            tracing::debug!("QueueService: session {}", client);
        });
    }
}

impl Drop for QueueService {
    fn drop(&mut self) {
        self.stop();
    }
}
