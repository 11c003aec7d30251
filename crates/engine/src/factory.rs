//! Engine factory – picks the best supported candidate once and caches it.

use crate::registry::{EngineRegistration, RegistrationTable};
use crate::traits::EngineHandle;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("no registered engine is supported in this environment ({tried} candidates tried)")]
    NoSupportedEngine { tried: usize },

    #[error("engine `{name}` failed to construct: {message}")]
    Construction { name: String, message: String },

    #[error("engine factory has been disposed")]
    Disposed,
}

enum Slot {
    Unresolved,
    Resolved { name: String, handle: EngineHandle },
    /// A selected candidate failed to construct. Deterministic, so it sticks.
    Failed(ResolveError),
    Disposed,
}

/// Owns the frozen registration table and the single active engine.
///
/// The slot lock is held for the whole of selection, so concurrent first
/// callers wait for the winner instead of racing to construct their own.
pub struct EngineFactory {
    table: RegistrationTable,
    slot: Mutex<Slot>,
}

impl EngineFactory {
    pub fn new(table: RegistrationTable) -> Self {
        Self {
            table,
            slot: Mutex::new(Slot::Unresolved),
        }
    }

    pub fn registrations(&self) -> &[EngineRegistration] {
        self.table.list()
    }

    /// Return the active engine, selecting and constructing it on first use.
    pub fn resolve(&self) -> Result<EngineHandle, ResolveError> {
        let mut slot = self.slot.lock();
        match &*slot {
            Slot::Resolved { handle, .. } => return Ok(Arc::clone(handle)),
            Slot::Failed(err) => return Err(err.clone()),
            Slot::Disposed => return Err(ResolveError::Disposed),
            Slot::Unresolved => {}
        }

        match self.select() {
            Ok((name, handle)) => {
                *slot = Slot::Resolved {
                    name,
                    handle: Arc::clone(&handle),
                };
                Ok(handle)
            }
            Err(err @ ResolveError::Construction { .. }) => {
                *slot = Slot::Failed(err.clone());
                Err(err)
            }
            // Left unresolved: the environment may change before the next call.
            Err(err) => Err(err),
        }
    }

    fn select(&self) -> Result<(String, EngineHandle), ResolveError> {
        for candidate in self.table.selection_order() {
            if !candidate.is_supported() {
                tracing::debug!(
                    engine = candidate.name(),
                    priority = candidate.priority(),
                    "engine not supported, skipping"
                );
                continue;
            }

            tracing::info!(
                engine = candidate.name(),
                priority = candidate.priority(),
                "selected engine"
            );
            return match candidate.construct() {
                Ok(handle) => Ok((candidate.name().to_string(), handle)),
                Err(e) => {
                    tracing::error!(engine = candidate.name(), error = %e, "engine construction failed");
                    Err(ResolveError::Construction {
                        name: candidate.name().to_string(),
                        message: e.to_string(),
                    })
                }
            };
        }

        tracing::warn!(
            candidates = self.table.len(),
            "no supported JavaScript engine found"
        );
        Err(ResolveError::NoSupportedEngine {
            tried: self.table.len(),
        })
    }

    /// Name of the resolved engine, if resolution has succeeded.
    pub fn active_engine(&self) -> Option<String> {
        match &*self.slot.lock() {
            Slot::Resolved { name, .. } => Some(name.clone()),
            _ => None,
        }
    }

    /// Release the active engine. No-op unless an engine was resolved;
    /// subsequent calls do nothing.
    pub fn dispose(&self) {
        let mut slot = self.slot.lock();
        if !matches!(&*slot, Slot::Resolved { .. }) {
            return;
        }
        if let Slot::Resolved { name, handle } = std::mem::replace(&mut *slot, Slot::Disposed) {
            handle.dispose();
            tracing::info!(engine = %name, "engine factory disposed");
        }
    }
}

impl Drop for EngineFactory {
    fn drop(&mut self) {
        self.dispose();
    }
}
