//! Engine registration table.
//!
//! Candidates are registered by name with a priority, a capability check and
//! a constructor. The table is filled once at startup and then moved into the
//! [`EngineFactory`](crate::factory::EngineFactory), which freezes it.

use crate::traits::{EngineHandle, EngineResult};
use std::fmt;

/// Answers "can this backend run here right now?". Must not fail.
pub type CapabilityCheck = Box<dyn Fn() -> bool + Send + Sync>;

/// Builds the engine once its registration has been selected.
pub type EngineConstructor = Box<dyn Fn() -> EngineResult<EngineHandle> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("engine `{0}` is already registered")]
    DuplicateName(String),
}

pub struct EngineRegistration {
    name: String,
    priority: i32,
    check: CapabilityCheck,
    factory: EngineConstructor,
}

impl EngineRegistration {
    pub fn new<C, F>(name: impl Into<String>, priority: i32, check: C, factory: F) -> Self
    where
        C: Fn() -> bool + Send + Sync + 'static,
        F: Fn() -> EngineResult<EngineHandle> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            priority,
            check: Box::new(check),
            factory: Box::new(factory),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Lower values are preferred.
    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn is_supported(&self) -> bool {
        (self.check)()
    }

    pub fn construct(&self) -> EngineResult<EngineHandle> {
        (self.factory)()
    }
}

impl fmt::Debug for EngineRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineRegistration")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Table
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct RegistrationTable {
    entries: Vec<EngineRegistration>,
}

impl RegistrationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, registration: EngineRegistration) -> Result<(), RegistryError> {
        if self.contains(registration.name()) {
            return Err(RegistryError::DuplicateName(registration.name));
        }
        tracing::debug!(
            engine = %registration.name,
            priority = registration.priority,
            "registered engine candidate"
        );
        self.entries.push(registration);
        Ok(())
    }

    pub fn register_with<C, F>(
        &mut self,
        name: impl Into<String>,
        priority: i32,
        check: C,
        factory: F,
    ) -> Result<(), RegistryError>
    where
        C: Fn() -> bool + Send + Sync + 'static,
        F: Fn() -> EngineResult<EngineHandle> + Send + Sync + 'static,
    {
        self.register(EngineRegistration::new(name, priority, check, factory))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Entries in registration order.
    pub fn list(&self) -> &[EngineRegistration] {
        &self.entries
    }

    /// Entries in the order they are considered for selection: ascending
    /// priority, ties kept in registration order.
    pub fn selection_order(&self) -> Vec<&EngineRegistration> {
        let mut ordered: Vec<&EngineRegistration> = self.entries.iter().collect();
        ordered.sort_by_key(|e| e.priority);
        ordered
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
