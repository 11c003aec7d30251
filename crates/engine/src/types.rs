use crate::factory::ResolveError;
use crate::probes::{BackendKind, ExecutionMode, HostFacts, RuntimeVersion, Support};
use crate::scope::ScopeError;
use crate::traits::EngineError;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Doctor report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct DoctorReport {
    pub host: HostFacts,
    /// Candidates in selection order.
    pub candidates: Vec<CandidateReport>,
    /// First supported candidate, i.e. what `resolve` would pick.
    pub selected: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateReport {
    pub name: String,
    pub backend: BackendKind,
    pub mode: ExecutionMode,
    pub priority: i32,
    pub program: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<RuntimeVersion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_version: Option<RuntimeVersion>,
    #[serde(flatten)]
    pub support: Support,
}

// ---------------------------------------------------------------------------
// Resolution / execution results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveReport {
    pub engine: String,
    /// Registered candidate names in registration order.
    pub registrations: Vec<String>,
    pub timing_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecReport {
    pub request_id: String,
    pub engine: String,
    pub output: String,
    pub timing_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidInput,
    DuplicateName,
    NoSupportedEngine,
    EngineConstruction,
    EngineDisposed,
    Unregistered,
    ScriptFailed,
    DependencyMissing,
    IoError,
    InternalError,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| format!("{:?}", self));
        f.write_str(&s)
    }
}

impl From<&ResolveError> for ErrorCode {
    fn from(err: &ResolveError) -> Self {
        match err {
            ResolveError::NoSupportedEngine { .. } => ErrorCode::NoSupportedEngine,
            ResolveError::Construction { .. } => ErrorCode::EngineConstruction,
            ResolveError::Disposed => ErrorCode::EngineDisposed,
        }
    }
}

impl From<&ScopeError> for ErrorCode {
    fn from(err: &ScopeError) -> Self {
        match err {
            ScopeError::Engine(e) => e.into(),
            ScopeError::Registry(_) => ErrorCode::DuplicateName,
            ScopeError::Unregistered { .. } => ErrorCode::Unregistered,
            ScopeError::AlreadyRegistered { .. }
            | ScopeError::LifecycleMismatch { .. }
            | ScopeError::Construction { .. } => ErrorCode::InternalError,
        }
    }
}

impl From<&EngineError> for ErrorCode {
    fn from(err: &EngineError) -> Self {
        match err {
            EngineError::Disposed(_) => ErrorCode::EngineDisposed,
            EngineError::DependencyMissing(_) => ErrorCode::DependencyMissing,
            EngineError::ScriptFailed { .. } => ErrorCode::ScriptFailed,
            EngineError::Io(_) => ErrorCode::IoError,
            EngineError::Other(_) => ErrorCode::InternalError,
        }
    }
}

impl ErrorInfo {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<&ScopeError> for ErrorInfo {
    fn from(err: &ScopeError) -> Self {
        Self::new(err.into(), err.to_string())
    }
}

impl From<&EngineError> for ErrorInfo {
    fn from(err: &EngineError) -> Self {
        Self::new(err.into(), err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Serve / daemon protocol
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonRequest {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}
