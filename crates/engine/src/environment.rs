//! Per-request script environment handed to consumers.

use crate::traits::{EngineHandle, EngineResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

/// Consumer-facing wrapper around the process-wide engine for one request.
///
/// The engine itself is shared; the execution counter is request-local.
pub struct ScriptEnvironment {
    request_id: Uuid,
    engine: EngineHandle,
    executed: AtomicUsize,
}

impl ScriptEnvironment {
    pub fn new(request_id: Uuid, engine: EngineHandle) -> Self {
        tracing::debug!(%request_id, engine = engine.name(), "script environment created");
        Self {
            request_id,
            engine,
            executed: AtomicUsize::new(0),
        }
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    pub fn scripts_executed(&self) -> usize {
        self.executed.load(Ordering::Relaxed)
    }

    pub fn execute(&self, script: &str) -> EngineResult<String> {
        self.executed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            request_id = %self.request_id,
            engine = self.engine.name(),
            bytes = script.len(),
            "executing script"
        );
        self.engine.execute_script(script)
    }
}

impl Drop for ScriptEnvironment {
    fn drop(&mut self) {
        tracing::debug!(
            request_id = %self.request_id,
            scripts = self.scripts_executed(),
            "script environment released"
        );
    }
}
