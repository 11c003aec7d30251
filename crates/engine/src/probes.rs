//! Capability probes – decide whether a backend can run on this host.
//!
//! Probing never fails: any missing program, unreadable version string or
//! unsupported platform simply yields `false` / [`Support::Unsupported`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Backend description
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Node,
    Deno,
    Bun,
    #[serde(rename = "quickjs")]
    QuickJs,
}

impl BackendKind {
    /// Executable looked up on `PATH` when no explicit program is configured.
    pub fn default_program(self) -> &'static str {
        match self {
            BackendKind::Node => "node",
            BackendKind::Deno => "deno",
            BackendKind::Bun => "bun",
            BackendKind::QuickJs => "qjs",
        }
    }

    fn supports_os(self, os: &str) -> bool {
        match self {
            BackendKind::Bun => matches!(os, "linux" | "macos"),
            _ => true,
        }
    }

    fn supports_arch(self, arch: &str) -> bool {
        match self {
            BackendKind::Node => matches!(arch, "x86_64" | "aarch64" | "arm"),
            BackendKind::Deno | BackendKind::Bun => matches!(arch, "x86_64" | "aarch64"),
            BackendKind::QuickJs => true,
        }
    }

    /// Whether the runtime can execute without a JIT at all.
    fn can_run_jitless(self) -> bool {
        matches!(self, BackendKind::Node | BackendKind::QuickJs)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BackendKind::Node => "node",
            BackendKind::Deno => "deno",
            BackendKind::Bun => "bun",
            BackendKind::QuickJs => "quickjs",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Jit,
    Jitless,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostingMode {
    /// JIT compilation is permitted.
    #[default]
    Standard,
    /// The host forbids writable+executable memory; only interpreters run.
    Jitless,
}

/// Everything needed to probe for and launch one process backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendSpec {
    pub kind: BackendKind,
    pub program: String,
    pub mode: ExecutionMode,
    pub min_version: Option<RuntimeVersion>,
}

impl BackendSpec {
    pub fn new(kind: BackendKind) -> Self {
        Self {
            kind,
            program: kind.default_program().to_string(),
            mode: ExecutionMode::Jit,
            min_version: None,
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_min_version(mut self, version: RuntimeVersion) -> Self {
        self.min_version = Some(version);
        self
    }

    /// QuickJS is a pure interpreter regardless of the configured mode.
    fn requires_jit(&self) -> bool {
        self.kind != BackendKind::QuickJs && self.mode == ExecutionMode::Jit
    }
}

// ---------------------------------------------------------------------------
// Runtime versions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RuntimeVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl RuntimeVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Pull the first `N[.N[.N]]` run out of free-form `--version` output,
    /// e.g. `v20.11.1`, `deno 1.46.3 (stable, release, ...)` or `1.1.8`.
    pub fn extract(text: &str) -> Option<Self> {
        let start = text.find(|c: char| c.is_ascii_digit())?;
        let rest = &text[start..];
        let end = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let mut parts = rest[..end]
            .split('.')
            .filter(|p| !p.is_empty())
            .map(|p| p.parse::<u32>());
        let major = parts.next()?.ok()?;
        let minor = parts.next().transpose().ok()?.unwrap_or(0);
        let patch = parts.next().transpose().ok()?.unwrap_or(0);
        Some(Self::new(major, minor, patch))
    }
}

impl fmt::Display for RuntimeVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid runtime version: {0:?}")]
pub struct InvalidVersion(String);

impl FromStr for RuntimeVersion {
    type Err = InvalidVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('v');
        if trimmed.is_empty() || !trimmed.chars().all(|c| c.is_ascii_digit() || c == '.') {
            return Err(InvalidVersion(s.to_string()));
        }
        Self::extract(trimmed).ok_or_else(|| InvalidVersion(s.to_string()))
    }
}

impl TryFrom<String> for RuntimeVersion {
    type Error = InvalidVersion;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RuntimeVersion> for String {
    fn from(v: RuntimeVersion) -> Self {
        v.to_string()
    }
}

// ---------------------------------------------------------------------------
// Host facts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostFacts {
    pub os: String,
    pub arch: String,
    pub hosting_mode: HostingMode,
}

impl HostFacts {
    pub fn current(hosting_mode: HostingMode) -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            hosting_mode,
        }
    }
}

/// A runtime found on this machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Installed {
    pub path: PathBuf,
    pub version: Option<RuntimeVersion>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Support {
    Supported,
    Unsupported { reason: String },
}

impl Support {
    pub fn is_supported(&self) -> bool {
        matches!(self, Support::Supported)
    }

    fn unsupported(reason: impl Into<String>) -> Self {
        Support::Unsupported {
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Probing
// ---------------------------------------------------------------------------

/// Platform-level checks only: OS, architecture and hosting mode.
pub fn platform_support(spec: &BackendSpec, host: &HostFacts) -> Support {
    if !spec.kind.supports_os(&host.os) {
        return Support::unsupported(format!("{} does not run on {}", spec.kind, host.os));
    }
    if !spec.kind.supports_arch(&host.arch) {
        return Support::unsupported(format!("{} does not run on {}", spec.kind, host.arch));
    }
    if host.hosting_mode == HostingMode::Jitless {
        if spec.requires_jit() {
            return Support::unsupported("hosting mode forbids JIT compilation");
        }
        if !spec.kind.can_run_jitless() {
            return Support::unsupported(format!("{} has no jitless mode", spec.kind));
        }
    }
    Support::Supported
}

/// Pure support decision given what is known about the host and the runtime.
///
/// `installed` is `None` when the program could not be located.
pub fn evaluate(spec: &BackendSpec, host: &HostFacts, installed: Option<&Installed>) -> Support {
    let platform = platform_support(spec, host);
    if !platform.is_supported() {
        return platform;
    }
    let Some(installed) = installed else {
        return Support::unsupported(format!("`{}` not found on PATH", spec.program));
    };
    if let Some(min) = spec.min_version {
        match installed.version {
            Some(v) if v >= min => {}
            Some(v) => {
                return Support::unsupported(format!("version {} is older than {}", v, min));
            }
            None => return Support::unsupported("could not determine runtime version"),
        }
    }
    Support::Supported
}

/// Locate the backend's program and, when a minimum version matters, ask it
/// for its version. This is the only I/O a probe performs.
pub fn locate(spec: &BackendSpec) -> Option<Installed> {
    let path = find_program(&spec.program)?;
    let version = if spec.min_version.is_some() {
        query_version(&path)
    } else {
        None
    };
    Some(Installed { path, version })
}

/// Full probe. Platform checks run first so nothing is spawned on hosts
/// that could never run the backend.
pub fn supports(spec: &BackendSpec, host: &HostFacts) -> bool {
    if let Support::Unsupported { reason } = platform_support(spec, host) {
        tracing::trace!(program = %spec.program, %reason, "probe rejected");
        return false;
    }
    let installed = locate(spec);
    evaluate(spec, host, installed.as_ref()).is_supported()
}

/// Search `PATH` for an executable, or accept an explicit path as-is.
pub fn find_program(program: &str) -> Option<PathBuf> {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 {
        return is_executable(candidate).then(|| candidate.to_path_buf());
    }
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths).find_map(|dir| {
        let full = dir.join(program);
        if is_executable(&full) {
            return Some(full);
        }
        if cfg!(windows) {
            let exe = dir.join(format!("{}.exe", program));
            if is_executable(&exe) {
                return Some(exe);
            }
        }
        None
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

pub fn query_version(path: &Path) -> Option<RuntimeVersion> {
    std::process::Command::new(path)
        .arg("--version")
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| RuntimeVersion::extract(&String::from_utf8_lossy(&o.stdout)))
}
