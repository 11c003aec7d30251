use crate::probes::{BackendKind, ExecutionMode, HostingMode, RuntimeVersion};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Default file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "jsengine.yaml";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    pub hosting_mode: HostingMode,
    pub engines: Vec<EngineEntry>,
    /// Priority replacements keyed by engine name, applied after `engines`.
    pub priority_overrides: HashMap<String, i32>,
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hosting_mode: HostingMode::default(),
            engines: default_engines(),
            priority_overrides: HashMap::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Enabled entries with overrides applied, in configured order.
    pub fn effective_engines(&self) -> Vec<EngineEntry> {
        self.engines
            .iter()
            .filter(|e| e.enabled)
            .map(|e| {
                let mut entry = e.clone();
                if let Some(&priority) = self.priority_overrides.get(&e.name) {
                    entry.priority = priority;
                }
                entry
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EngineEntry {
    pub name: String,
    pub backend: BackendKind,
    #[serde(default)]
    pub mode: ExecutionMode,
    pub priority: i32,
    #[serde(default = "true_default")]
    pub enabled: bool,
    /// Executable name or path; defaults to the backend's usual binary.
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub min_version: Option<RuntimeVersion>,
}

impl EngineEntry {
    fn builtin(name: &str, backend: BackendKind, mode: ExecutionMode, priority: i32) -> Self {
        Self {
            name: name.to_string(),
            backend,
            mode,
            priority,
            enabled: true,
            program: None,
            min_version: None,
        }
    }
}

fn default_engines() -> Vec<EngineEntry> {
    let mut node = EngineEntry::builtin("node", BackendKind::Node, ExecutionMode::Jit, 10);
    node.min_version = Some(RuntimeVersion::new(18, 0, 0));
    vec![
        node,
        EngineEntry::builtin("bun", BackendKind::Bun, ExecutionMode::Jit, 10),
        EngineEntry::builtin("deno", BackendKind::Deno, ExecutionMode::Jit, 20),
        EngineEntry::builtin("node-jitless", BackendKind::Node, ExecutionMode::Jitless, 30),
        EngineEntry::builtin("quickjs", BackendKind::QuickJs, ExecutionMode::Jitless, 40),
    ]
}

fn true_default() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    pub show_time: bool,
    pub show_target: bool,
    pub show_file: bool,
    pub show_line: bool,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            show_time: true,
            show_target: false,
            show_file: false,
            show_line: false,
            json: false,
        }
    }
}

/// Load configuration from, in increasing precedence: built-in defaults,
/// `./jsengine.yaml` (optional), `path` (required when given), and
/// `JSENGINE__*` environment variables.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig, ConfigError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false));
    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }
    // Map nested env vars like JSENGINE__LOGGING__LEVEL=debug
    builder = builder.add_source(Environment::with_prefix("JSENGINE").separator("__"));

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    struct EnvGuard(&'static str);
    impl EnvGuard {
        fn new(key: &'static str, val: &str) -> Self {
            env::set_var(key, val);
            Self(key)
        }
    }
    impl Drop for EnvGuard {
        fn drop(&mut self) {
            env::remove_var(self.0);
        }
    }

    fn write_temp_config(contents: &str) -> std::path::PathBuf {
        let path = env::temp_dir().join(format!("jsengine_test_{}.yaml", uuid::Uuid::new_v4()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    #[serial]
    fn test_defaults_without_sources() {
        let config = load_config(None).unwrap();
        assert_eq!(config.hosting_mode, HostingMode::Standard);
        assert_eq!(config.logging.level, "info");
        let names: Vec<&str> = config.engines.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["node", "bun", "deno", "node-jitless", "quickjs"]);
        assert_eq!(
            config.engines[0].min_version,
            Some(RuntimeVersion::new(18, 0, 0))
        );
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        let path = write_temp_config(
            r#"
hosting_mode: jitless
engines:
  - name: qjs
    backend: quickjs
    priority: 5
  - name: node-legacy
    backend: node
    mode: jitless
    priority: 15
    min_version: "16.20"
    program: /opt/node16/bin/node
  - name: deno
    backend: deno
    priority: 20
    enabled: false
priority_overrides:
  qjs: 50
logging:
  level: debug
  json: true
"#,
        );
        let config = load_config(Some(&path)).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(config.hosting_mode, HostingMode::Jitless);
        assert_eq!(config.engines.len(), 3);
        assert_eq!(config.engines[1].mode, ExecutionMode::Jitless);
        assert_eq!(
            config.engines[1].min_version,
            Some(RuntimeVersion::new(16, 20, 0))
        );
        assert_eq!(
            config.engines[1].program.as_deref(),
            Some("/opt/node16/bin/node")
        );
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
        // Unspecified logging fields keep their defaults.
        assert!(config.logging.show_time);

        let effective = config.effective_engines();
        assert_eq!(effective.len(), 2);
        assert_eq!(effective[0].name, "qjs");
        assert_eq!(effective[0].priority, 50);
        assert_eq!(effective[1].priority, 15);
    }

    #[test]
    #[serial]
    fn test_missing_explicit_file_is_an_error() {
        let path = env::temp_dir().join("jsengine_does_not_exist_5d1e.yaml");
        assert!(load_config(Some(&path)).is_err());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        let _mode = EnvGuard::new("JSENGINE__HOSTING_MODE", "jitless");
        let _level = EnvGuard::new("JSENGINE__LOGGING__LEVEL", "trace");
        let config = load_config(None).unwrap();
        assert_eq!(config.hosting_mode, HostingMode::Jitless);
        assert_eq!(config.logging.level, "trace");
    }

    #[test]
    #[serial]
    fn test_invalid_min_version_rejected() {
        let path = write_temp_config(
            r#"
engines:
  - name: node
    backend: node
    priority: 10
    min_version: "latest"
"#,
        );
        let result = load_config(Some(&path));
        let _ = std::fs::remove_file(&path);
        assert!(result.is_err());
    }
}
