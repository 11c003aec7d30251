//! `jsctl` – command-line host for the jsengine selection core.
//!
//! Each `exec` invocation is one logical request; `serve` turns every line
//! received on a Unix socket into its own request.

mod logging;
mod serve;

use anyhow::Context;
use clap::{Parser, Subcommand};
use jsengine::types::*;
use jsengine::{Container, EngineConfig, EngineFactory, RequestContext, ScriptEnvironment};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

// ===========================================================================
// CLI definition
// ===========================================================================

#[derive(Parser)]
#[command(
    name = "jsctl",
    version,
    about = "Select and drive the best available JavaScript engine"
)]
struct Cli {
    /// Configuration file (YAML). `./jsengine.yaml` is read when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe every configured engine and show which one would be selected.
    Doctor {
        /// Output as JSON instead of human-readable text.
        #[arg(long)]
        json: bool,
    },

    /// Resolve the process-wide engine and report the winner.
    Resolve {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Run a script in a fresh request context.
    Exec {
        /// Script source. Mutually exclusive with --file.
        script: Option<String>,
        /// Read the script from this file.
        #[arg(long, conflicts_with = "script")]
        file: Option<PathBuf>,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Start daemon mode over a Unix socket.
    Serve {
        /// Path for the Unix domain socket.
        #[arg(long)]
        socket: PathBuf,
    },
}

// ===========================================================================
// Main
// ===========================================================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {:#}", e);
            std::process::exit(2);
        }
    };
    logging::init_logging(&config.logging);

    let container = match jsengine::context::build_container(config.clone())
        .context("failed to wire engine container")
    {
        Ok(c) => Arc::new(c),
        Err(e) => {
            eprintln!("error: {:#}", e);
            std::process::exit(2);
        }
    };

    let exit_code = match cli.command {
        Commands::Doctor { json } => cmd_doctor(&config, json),
        Commands::Resolve { json } => cmd_resolve(&container, json),
        Commands::Exec { script, file, json } => cmd_exec(&container, script, file, json),
        Commands::Serve { socket } => {
            serve::run_daemon(socket, Arc::clone(&container)).await;
            0
        }
    };

    shutdown(&container);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

/// Dispose the engine if one was resolved. Never builds the factory.
fn shutdown(container: &Container) {
    if let Some(factory) = container.built_singleton::<EngineFactory>() {
        factory.dispose();
    }
}

fn load(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    jsengine::config::load_config(path).with_context(|| match path {
        Some(p) => format!("failed to load config from {}", p.display()),
        None => "failed to load config".to_string(),
    })
}

// ===========================================================================
// Request handlers shared with the daemon
// ===========================================================================

pub(crate) fn resolve_engine(container: &Container) -> Result<ResolveReport, ErrorInfo> {
    let start = Instant::now();
    let factory = container
        .singleton::<EngineFactory>()
        .map_err(|e| ErrorInfo::from(&e))?;
    let engine = factory
        .resolve()
        .map_err(|e| ErrorInfo::new((&e).into(), e.to_string()))?;
    Ok(ResolveReport {
        engine: engine.name().to_string(),
        registrations: factory
            .registrations()
            .iter()
            .map(|r| r.name().to_string())
            .collect(),
        timing_ms: start.elapsed().as_millis() as u64,
    })
}

/// Run `script` inside its own request context, which ends on return.
pub(crate) fn exec_in_request(container: &Container, script: &str) -> Result<ExecReport, ErrorInfo> {
    let start = Instant::now();
    let ctx = RequestContext::new();
    let env = container
        .resolve::<ScriptEnvironment>(&ctx)
        .map_err(|e| ErrorInfo::from(&e))?;
    let output = env.execute(script).map_err(|e| ErrorInfo::from(&e))?;
    Ok(ExecReport {
        request_id: ctx.id().to_string(),
        engine: env.engine_name().to_string(),
        output,
        timing_ms: start.elapsed().as_millis() as u64,
    })
}

// ===========================================================================
// Subcommand implementations
// ===========================================================================

fn cmd_doctor(config: &EngineConfig, json: bool) -> i32 {
    let report = jsengine::doctor::run_doctor(config);
    if json {
        print_json(&report);
        return 0;
    }
    println!(
        "host: os={} arch={} hosting_mode={:?}",
        report.host.os, report.host.arch, report.host.hosting_mode
    );
    for c in &report.candidates {
        let status = match &c.support {
            jsengine::probes::Support::Supported => "supported".to_string(),
            jsengine::probes::Support::Unsupported { reason } => format!("unsupported ({})", reason),
        };
        let version = c.version.map(|v| v.to_string()).unwrap_or_else(|| "-".into());
        println!(
            "  [{:>3}] {:<14} {:<8} {:<8} version={:<10} {}",
            c.priority,
            c.name,
            c.backend.to_string(),
            format!("{:?}", c.mode).to_lowercase(),
            version,
            status
        );
    }
    match &report.selected {
        Some(name) => println!("selected: {}", name),
        None => println!("selected: <none>"),
    }
    0
}

fn cmd_resolve(container: &Container, json: bool) -> i32 {
    match resolve_engine(container) {
        Ok(report) if json => print_json(&report),
        Ok(report) => {
            println!("[PASS] resolve {}", report.engine);
            println!("  candidates: {}", report.registrations.join(", "));
            println!("  timing: {}ms", report.timing_ms);
        }
        Err(info) => return fail(&info, json),
    }
    0
}

fn cmd_exec(container: &Container, script: Option<String>, file: Option<PathBuf>, json: bool) -> i32 {
    let source = match (script, file) {
        (Some(s), _) => s,
        (None, Some(path)) => match std::fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) => {
                let info = ErrorInfo::new(
                    ErrorCode::IoError,
                    format!("cannot read script file {}: {}", path.display(), e),
                );
                return fail(&info, json);
            }
        },
        (None, None) => {
            let info = ErrorInfo::new(ErrorCode::InvalidInput, "no script given (pass SCRIPT or --file)");
            return fail(&info, json);
        }
    };

    match exec_in_request(container, &source) {
        Ok(report) if json => print_json(&report),
        Ok(report) => {
            if !report.output.is_empty() {
                println!("{}", report.output);
            }
            eprintln!(
                "[PASS] exec via {} ({}ms, request {})",
                report.engine, report.timing_ms, report.request_id
            );
        }
        Err(info) => return fail(&info, json),
    }
    0
}

// ===========================================================================
// Output helpers
// ===========================================================================

fn print_json<T: serde::Serialize>(value: &T) {
    let j = serde_json::to_string_pretty(value).unwrap_or_default();
    println!("{}", j);
}

/// Report `info` and return the error exit code.
fn fail(info: &ErrorInfo, json: bool) -> i32 {
    if json {
        print_json(&serde_json::json!({ "error": info }));
    } else {
        eprintln!("[ERROR] {} – {}", info.code, info.message);
    }
    2
}
