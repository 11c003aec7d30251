//! Doctor – explain which engine would be selected on this host, and why.

use crate::config::EngineConfig;
use crate::context::backend_specs;
use crate::probes::{self, HostFacts, Installed};
use crate::types::*;

/// Probe every enabled candidate without constructing any engine.
pub fn run_doctor(config: &EngineConfig) -> DoctorReport {
    let host = HostFacts::current(config.hosting_mode);

    let mut specs = backend_specs(config);
    // Stable: equal priorities keep configured order, as in selection.
    specs.sort_by_key(|(_, priority, _)| *priority);

    let candidates: Vec<CandidateReport> = specs
        .into_iter()
        .map(|(name, priority, spec)| {
            let installed = if probes::platform_support(&spec, &host).is_supported() {
                probes::find_program(&spec.program).map(|path| Installed {
                    version: probes::query_version(&path),
                    path,
                })
            } else {
                None
            };
            let support = probes::evaluate(&spec, &host, installed.as_ref());
            CandidateReport {
                name,
                backend: spec.kind,
                mode: spec.mode,
                priority,
                program: spec.program.clone(),
                path: installed.as_ref().map(|i| i.path.display().to_string()),
                version: installed.as_ref().and_then(|i| i.version),
                min_version: spec.min_version,
                support,
            }
        })
        .collect();

    let selected = candidates
        .iter()
        .find(|c| c.support.is_supported())
        .map(|c| c.name.clone());

    DoctorReport {
        host,
        candidates,
        selected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::{BackendKind, HostingMode, Support};

    #[test]
    fn test_doctor_orders_by_priority() {
        let mut config = EngineConfig::default();
        config.priority_overrides.insert("quickjs".into(), 0);
        for engine in &mut config.engines {
            engine.program = Some(format!("absent-{}-runtime-9e21", engine.name));
        }

        let report = run_doctor(&config);
        let names: Vec<&str> = report.candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["quickjs", "node", "bun", "deno", "node-jitless"]);
        assert_eq!(report.selected, None);
        assert!(report.candidates.iter().all(|c| c.path.is_none()));
    }

    #[test]
    fn test_doctor_reports_hosting_mode_rejections() {
        let mut config = EngineConfig::default();
        config.hosting_mode = HostingMode::Jitless;

        let report = run_doctor(&config);
        let deno = report
            .candidates
            .iter()
            .find(|c| c.backend == BackendKind::Deno)
            .unwrap();
        assert!(matches!(&deno.support, Support::Unsupported { .. }));
        assert_eq!(report.host.hosting_mode, HostingMode::Jitless);
    }
}
