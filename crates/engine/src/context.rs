//! Composition root – registers the supported engines and wires the container.

use crate::config::{EngineConfig, EngineEntry};
use crate::environment::ScriptEnvironment;
use crate::factory::EngineFactory;
use crate::platform::ProcessEngine;
use crate::probes::{self, BackendSpec, HostFacts};
use crate::registry::{RegistrationTable, RegistryError};
use crate::scope::{Container, ScopeError};
use crate::traits::EngineHandle;
use std::sync::Arc;

impl From<&EngineEntry> for BackendSpec {
    fn from(entry: &EngineEntry) -> Self {
        let mut spec = BackendSpec::new(entry.backend).with_mode(entry.mode);
        if let Some(program) = &entry.program {
            spec = spec.with_program(program.clone());
        }
        if let Some(version) = entry.min_version {
            spec = spec.with_min_version(version);
        }
        spec
    }
}

/// Effective (name, priority, spec) triples for every enabled engine.
pub fn backend_specs(config: &EngineConfig) -> Vec<(String, i32, BackendSpec)> {
    config
        .effective_engines()
        .iter()
        .map(|e| (e.name.clone(), e.priority, BackendSpec::from(e)))
        .collect()
}

/// Register every enabled process backend from `config`. Each capability
/// check probes the current host; each constructor launches the runtime.
pub fn register_supported_engines(
    table: &mut RegistrationTable,
    config: &EngineConfig,
) -> Result<(), RegistryError> {
    let host = HostFacts::current(config.hosting_mode);
    for (name, priority, spec) in backend_specs(config) {
        let probe_spec = spec.clone();
        let probe_host = host.clone();
        let engine_name = name.clone();
        table.register_with(
            name,
            priority,
            move || probes::supports(&probe_spec, &probe_host),
            move || {
                let engine = ProcessEngine::launch(engine_name.clone(), spec.clone())?;
                Ok(Arc::new(engine) as EngineHandle)
            },
        )?;
    }
    Ok(())
}

/// Table builder used by [`build_container`].
pub fn default_table(config: &EngineConfig) -> Result<RegistrationTable, RegistryError> {
    let mut table = RegistrationTable::new();
    register_supported_engines(&mut table, config)?;
    Ok(table)
}

/// Wire the container:
///
/// - `EngineConfig`: singleton instance
/// - `EngineFactory`: singleton, table built from config on first demand
/// - `ScriptEnvironment`: per request, wrapping the factory's engine
pub fn compose<F>(config: EngineConfig, build_table: F) -> Result<Container, ScopeError>
where
    F: Fn(&EngineConfig) -> Result<RegistrationTable, RegistryError> + Send + Sync + 'static,
{
    let mut container = Container::new();
    container.register_instance(Arc::new(config))?;
    container.register_singleton(move |c| {
        let config = c.singleton::<EngineConfig>()?;
        let table = build_table(config.as_ref())?;
        tracing::info!(candidates = table.len(), "engine registration table frozen");
        Ok(EngineFactory::new(table))
    })?;
    container.register_per_request(|c, ctx| {
        let engine = c.singleton::<EngineFactory>()?.resolve()?;
        Ok(ScriptEnvironment::new(ctx.id(), engine))
    })?;
    Ok(container)
}

pub fn build_container(config: EngineConfig) -> Result<Container, ScopeError> {
    compose(config, default_table)
}
