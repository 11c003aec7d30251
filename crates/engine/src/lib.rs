//! jsengine – JavaScript engine selection and lifecycle scoping.
//!
//! This crate decides which JavaScript backend a host runs scripts on and how
//! long each instance lives. It does NOT execute JavaScript itself; backends
//! are opaque [`JsEngine`] handles built from a priority-ordered
//! registration table.

pub mod config;
pub mod context;
pub mod doctor;
pub mod environment;
pub mod factory;
pub mod platform;
pub mod probes;
pub mod registry;
pub mod scope;
pub mod traits;
pub mod types;

// Re-exports for convenience
pub use config::EngineConfig;
pub use environment::ScriptEnvironment;
pub use factory::{EngineFactory, ResolveError};
pub use registry::{EngineRegistration, RegistrationTable, RegistryError};
pub use scope::{Container, Lifecycle, RequestContext, ScopeError};
pub use traits::{EngineError, EngineHandle, JsEngine};
