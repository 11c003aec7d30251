//! Daemon mode – newline-delimited JSON over a Unix socket.
//!
//! Every request line is its own logical request: it gets a fresh
//! `RequestContext`, which ends once the response has been produced.

use jsengine::types::*;
use jsengine::{Container, EngineConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

pub async fn run_daemon(socket_path: PathBuf, container: Arc<Container>) {
    // Remove stale socket if it exists
    let _ = std::fs::remove_file(&socket_path);

    let listener = match UnixListener::bind(&socket_path) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("error: cannot bind socket {}: {}", socket_path.display(), e);
            std::process::exit(2);
        }
    };

    tracing::info!(socket = %socket_path.display(), "jsctl daemon listening");

    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                tokio::spawn(handle_connection(stream, Arc::clone(&container)));
            }
            Err(e) => {
                tracing::warn!(error = %e, "accept error");
            }
        }
    }
}

async fn handle_connection(stream: UnixStream, container: Arc<Container>) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let container = Arc::clone(&container);
        // Probing and script execution block on child processes.
        let response = tokio::task::spawn_blocking(move || handle_request(&line, &container))
            .await
            .unwrap_or_else(|e| DaemonResponse {
                id: "unknown".into(),
                result: None,
                error: Some(ErrorInfo::new(
                    ErrorCode::InternalError,
                    format!("request handler panicked: {}", e),
                )),
            });

        let mut resp_json = serde_json::to_string(&response).unwrap_or_else(|_| "{}".into());
        resp_json.push('\n');
        if writer.write_all(resp_json.as_bytes()).await.is_err() {
            break;
        }
    }
}

fn handle_request(line: &str, container: &Container) -> DaemonResponse {
    let req: DaemonRequest = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            return DaemonResponse {
                id: "unknown".into(),
                result: None,
                error: Some(ErrorInfo::new(
                    ErrorCode::InvalidInput,
                    format!("invalid JSON request: {}", e),
                )),
            };
        }
    };

    let outcome: Result<serde_json::Value, ErrorInfo> = match req.method.as_str() {
        "exec" => match req.params.get("script").and_then(|v| v.as_str()) {
            Some(script) => crate::exec_in_request(container, script).and_then(to_value),
            None => Err(ErrorInfo::new(
                ErrorCode::InvalidInput,
                "missing 'script' string param",
            )),
        },
        "resolve" => crate::resolve_engine(container).and_then(to_value),
        "doctor" => container
            .singleton::<EngineConfig>()
            .map_err(|e| ErrorInfo::from(&e))
            .and_then(|config| to_value(jsengine::doctor::run_doctor(&config))),
        other => Err(ErrorInfo::new(
            ErrorCode::InvalidInput,
            format!("unknown method: {}", other),
        )),
    };

    match outcome {
        Ok(result) => DaemonResponse {
            id: req.id,
            result: Some(result),
            error: None,
        },
        Err(error) => DaemonResponse {
            id: req.id,
            result: None,
            error: Some(error),
        },
    }
}

fn to_value<T: serde::Serialize>(value: T) -> Result<serde_json::Value, ErrorInfo> {
    serde_json::to_value(value).map_err(|e| ErrorInfo::new(ErrorCode::InternalError, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::test_container;

    #[test]
    fn test_exec_request() {
        let container = test_container();
        let resp = handle_request(
            r#"{"id":"1","method":"exec","params":{"script":"ok"}}"#,
            &container,
        );
        assert_eq!(resp.id, "1");
        assert!(resp.error.is_none());
        assert_eq!(resp.result.unwrap()["output"], "OK");
    }

    #[test]
    fn test_each_request_gets_its_own_context() {
        let container = test_container();
        let line = r#"{"id":"x","method":"exec","params":{"script":"a"}}"#;
        let first = handle_request(line, &container).result.unwrap();
        let second = handle_request(line, &container).result.unwrap();
        assert_ne!(first["request_id"], second["request_id"]);
    }

    #[test]
    fn test_invalid_and_unknown_requests() {
        let container = test_container();

        let bad = handle_request("not json", &container);
        assert_eq!(bad.id, "unknown");
        assert_eq!(bad.error.unwrap().code, ErrorCode::InvalidInput);

        let unknown = handle_request(r#"{"id":"2","method":"explode"}"#, &container);
        assert_eq!(unknown.id, "2");
        assert_eq!(unknown.error.unwrap().code, ErrorCode::InvalidInput);

        let missing = handle_request(r#"{"id":"3","method":"exec","params":{}}"#, &container);
        assert_eq!(missing.error.unwrap().code, ErrorCode::InvalidInput);
    }

    #[test]
    fn test_resolve_request() {
        let container = test_container();
        let resp = handle_request(r#"{"id":"r","method":"resolve"}"#, &container);
        assert_eq!(resp.result.unwrap()["engine"], "upper");
    }
}
