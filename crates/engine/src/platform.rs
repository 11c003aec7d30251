//! Process-backed engine implementations.
//!
//! - [`ProcessEngine`]: drives an external JavaScript runtime (`node`,
//!   `deno`, `bun`, `qjs`) through its eval entry point.

use crate::probes::{find_program, BackendKind, BackendSpec, ExecutionMode};
use crate::traits::*;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

pub struct ProcessEngine {
    name: String,
    spec: BackendSpec,
    program: PathBuf,
    disposed: AtomicBool,
}

impl ProcessEngine {
    /// Resolve the runtime binary and build an engine around it.
    ///
    /// The capability probe has normally located the program already; this
    /// re-checks so a binary removed since probing surfaces as a construction
    /// error rather than a failing first script.
    pub fn launch(name: impl Into<String>, spec: BackendSpec) -> EngineResult<Self> {
        let name = name.into();
        let program = find_program(&spec.program).ok_or_else(|| {
            EngineError::DependencyMissing(format!("{} not found on PATH", spec.program))
        })?;
        tracing::info!(
            engine = %name,
            backend = %spec.kind,
            program = %program.display(),
            "launched process engine"
        );
        Ok(Self {
            name,
            spec,
            program,
            disposed: AtomicBool::new(false),
        })
    }

    /// Arguments placed before the script source.
    fn eval_args(&self) -> Vec<&'static str> {
        match (self.spec.kind, self.spec.mode) {
            (BackendKind::Node, ExecutionMode::Jitless) => vec!["--jitless", "-e"],
            (BackendKind::Node, ExecutionMode::Jit) => vec!["-e"],
            (BackendKind::Deno, _) => vec!["eval"],
            (BackendKind::Bun, _) => vec!["-e"],
            (BackendKind::QuickJs, _) => vec!["-e"],
        }
    }
}

impl JsEngine for ProcessEngine {
    fn name(&self) -> &str {
        &self.name
    }

    fn execute_script(&self, script: &str) -> EngineResult<String> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(EngineError::Disposed(self.name.clone()));
        }

        let output = std::process::Command::new(&self.program)
            .args(self.eval_args())
            .arg(script)
            .stdin(std::process::Stdio::null())
            .output()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EngineError::DependencyMissing(format!("{} disappeared", self.program.display()))
                } else {
                    EngineError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(EngineError::ScriptFailed {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }

    fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            tracing::info!(engine = %self.name, "disposed process engine");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(kind: BackendKind, mode: ExecutionMode) -> ProcessEngine {
        ProcessEngine {
            name: "test".into(),
            spec: BackendSpec::new(kind).with_mode(mode),
            program: PathBuf::from("/bin/false"),
            disposed: AtomicBool::new(false),
        }
    }

    #[test]
    fn test_launch_missing_program() {
        let spec = BackendSpec::new(BackendKind::Node).with_program("no-such-runtime-41c2e0");
        let err = ProcessEngine::launch("node", spec).err().expect("should fail");
        assert!(matches!(err, EngineError::DependencyMissing(_)));
    }

    #[test]
    fn test_eval_args_per_backend() {
        assert_eq!(
            engine(BackendKind::Node, ExecutionMode::Jitless).eval_args(),
            vec!["--jitless", "-e"]
        );
        assert_eq!(
            engine(BackendKind::Node, ExecutionMode::Jit).eval_args(),
            vec!["-e"]
        );
        assert_eq!(
            engine(BackendKind::Deno, ExecutionMode::Jit).eval_args(),
            vec!["eval"]
        );
    }

    #[test]
    fn test_disposed_engine_rejects_scripts() {
        let e = engine(BackendKind::QuickJs, ExecutionMode::Jit);
        e.dispose();
        e.dispose();
        let err = e.execute_script("1 + 1").unwrap_err();
        assert!(matches!(err, EngineError::Disposed(name) if name == "test"));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_zero_exit_is_script_failure() {
        let e = engine(BackendKind::QuickJs, ExecutionMode::Jit);
        let err = e.execute_script("ignored").unwrap_err();
        assert!(matches!(err, EngineError::ScriptFailed { code: Some(1), .. }));
    }
}
