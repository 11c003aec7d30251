use std::sync::Arc;

/// Result type for operations performed against a constructed engine.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine disposed: {0}")]
    Disposed(String),

    #[error("dependency missing: {0}")]
    DependencyMissing(String),

    #[error("script failed (exit code {code:?}): {stderr}")]
    ScriptFailed { code: Option<i32>, stderr: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

// ---------------------------------------------------------------------------
// Engine capability set
// ---------------------------------------------------------------------------

/// A concrete JavaScript execution backend.
///
/// Implementations are shared across every request in the process, so all
/// methods take `&self` and must tolerate concurrent callers.
pub trait JsEngine: Send + Sync {
    /// Registration name of the backend, used in logs and diagnostics.
    fn name(&self) -> &str;

    /// Evaluate a script and return whatever it wrote to stdout.
    fn execute_script(&self, script: &str) -> EngineResult<String>;

    /// Release the backend's resources. Calling this more than once is a no-op.
    fn dispose(&self);
}

/// Opaque handle to the engine the factory selected.
pub type EngineHandle = Arc<dyn JsEngine>;

impl std::fmt::Debug for dyn JsEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsEngine")
            .field("name", &self.name())
            .finish_non_exhaustive()
    }
}
