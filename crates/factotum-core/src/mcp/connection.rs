//! Tool-server connections
//!
//! One task per server owns the child process and both pipes outright, so
//! nothing locks the streams. Tool dispatch within a run is serial, and the
//! wire protocol follows suit: each exchange writes one frame, then reads
//! frames until the answer with the matching id shows up, skipping server
//! notifications and stray stdout chatter along the way. A reply that never
//! arrives would desynchronize every later exchange, so a timeout or a dead
//! stream drops the whole connection instead of guessing.

use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::ServerConfig;
use super::protocol::{
    ClientInfo, InitializeParams, InitializeResult, RpcRequest, RpcResponse, ServerToolDef,
    ToolCallResult, ToolsListResult,
};

const PROTOCOL_VERSION: &str = "2024-11-05";
const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(30);
/// Queued exchanges per server; dispatch is serial so this stays tiny.
const QUEUE_DEPTH: usize = 8;

/// One queued exchange. `reply` is None for fire-and-forget notifications.
struct Exchange {
    method: String,
    params: Option<Value>,
    reply: Option<oneshot::Sender<Result<Value>>>,
}

/// What one incoming frame means for the exchange in flight.
#[derive(Debug, PartialEq)]
enum FrameKind {
    /// The answer to the in-flight request: its result, or the error the
    /// server reported.
    Reply(Result<Value, String>),
    /// Server-initiated notification; logged and skipped.
    Notification(String),
    /// A response carrying some other id. Exchanges are serial, so this is
    /// a protocol violation worth logging but not dying over.
    Foreign(i64),
    /// Not a JSON-RPC frame (debug chatter on stdout).
    Noise,
}

fn classify_frame(line: &str, want_id: i64) -> FrameKind {
    let Ok(frame) = serde_json::from_str::<RpcResponse>(line.trim()) else {
        return FrameKind::Noise;
    };
    match frame.id {
        Some(id) if id == want_id => match frame.error {
            Some(e) => FrameKind::Reply(Err(format!("server error {}: {}", e.code, e.message))),
            None => FrameKind::Reply(Ok(frame.result.unwrap_or(Value::Null))),
        },
        Some(id) => FrameKind::Foreign(id),
        None => FrameKind::Notification(frame.method.unwrap_or_else(|| "?".to_string())),
    }
}

/// A live connection to one tool server.
///
/// The tool list is fetched once during the handshake and is static for
/// the life of the connection.
pub struct ServerConnection {
    name: String,
    tools: Vec<ServerToolDef>,
    requests: mpsc::Sender<Exchange>,
    cancel: CancellationToken,
    alive: Arc<AtomicBool>,
}

impl ServerConnection {
    /// Spawn the server, run the handshake, and cache its tool list.
    pub async fn open(name: &str, config: &ServerConfig, working_dir: &Path) -> Result<Self> {
        let (child, stdin, stdout) = spawn_server(config, working_dir)?;

        let (requests, queue) = mpsc::channel(QUEUE_DEPTH);
        let cancel = CancellationToken::new();
        let alive = Arc::new(AtomicBool::new(true));
        tokio::spawn(serve(
            name.to_string(),
            child,
            stdin,
            BufReader::new(stdout).lines(),
            queue,
            cancel.clone(),
            alive.clone(),
        ));

        let mut connection = Self {
            name: name.to_string(),
            tools: Vec::new(),
            requests,
            cancel,
            alive,
        };

        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: json!({}),
            client_info: ClientInfo {
                name: "factotum".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };
        let init: InitializeResult = connection
            .call("initialize", Some(serde_json::to_value(params)?))
            .await?;
        info!(
            "tool server {name} initialized (protocol {})",
            init.protocol_version
        );

        connection.notify("notifications/initialized").await?;

        let listing: ToolsListResult = connection.call("tools/list", None).await?;
        info!("tool server {name} exposes {} tools", listing.tools.len());
        connection.tools = listing.tools;

        Ok(connection)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tools(&self) -> &[ServerToolDef] {
        &self.tools
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub async fn call_tool(&self, tool: &str, arguments: Value) -> Result<ToolCallResult> {
        let arguments = if arguments.is_null() {
            json!({})
        } else {
            arguments
        };
        self.call(
            "tools/call",
            Some(json!({ "name": tool, "arguments": arguments })),
        )
        .await
    }

    /// Stop the connection task, which kills the server process.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    async fn call<R: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<R> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(Exchange {
                method: method.to_string(),
                params,
                reply: Some(tx),
            })
            .await
            .map_err(|_| anyhow!("tool server {} is not accepting requests", self.name))?;
        let value = rx
            .await
            .map_err(|_| anyhow!("tool server {} dropped the exchange", self.name))??;
        Ok(serde_json::from_value(value)?)
    }

    async fn notify(&self, method: &str) -> Result<()> {
        self.requests
            .send(Exchange {
                method: method.to_string(),
                params: None,
                reply: None,
            })
            .await
            .map_err(|_| anyhow!("tool server {} is not accepting requests", self.name))
    }
}

/// The connection task: sole owner of the child and its pipes. Exits on
/// cancellation, on a closed queue, or when the stream becomes unusable;
/// the child is killed on the way out.
async fn serve(
    name: String,
    mut child: Child,
    mut stdin: ChildStdin,
    mut lines: Lines<BufReader<ChildStdout>>,
    mut queue: mpsc::Receiver<Exchange>,
    cancel: CancellationToken,
    alive: Arc<AtomicBool>,
) {
    let mut next_id: i64 = 1;

    loop {
        let exchange = tokio::select! {
            _ = cancel.cancelled() => break,
            next = queue.recv() => match next {
                Some(exchange) => exchange,
                None => break,
            },
        };

        let id = next_id;
        if exchange.reply.is_some() {
            next_id += 1;
        }

        let frame = match build_frame(id, &exchange) {
            Ok(frame) => frame,
            Err(e) => {
                if let Some(reply) = exchange.reply {
                    let _ = reply.send(Err(e));
                }
                continue;
            }
        };

        if let Err(e) = write_frame(&mut stdin, &frame).await {
            warn!("tool server {name}: write failed: {e}");
            if let Some(reply) = exchange.reply {
                let _ = reply.send(Err(anyhow!("tool server {name} is unreachable: {e}")));
            }
            break;
        }

        let Some(reply) = exchange.reply else {
            continue;
        };

        let answer = tokio::select! {
            _ = cancel.cancelled() => None,
            outcome = tokio::time::timeout(EXCHANGE_TIMEOUT, await_reply(&mut lines, id, &name)) => {
                Some(outcome)
            }
        };
        let Some(answer) = answer else { break };

        match answer {
            Ok(Ok(verdict)) => {
                let _ = reply.send(verdict.map_err(|msg| anyhow!(msg)));
            }
            Ok(Err(e)) => {
                let _ = reply.send(Err(e));
                break;
            }
            Err(_) => {
                let _ = reply.send(Err(anyhow!(
                    "tool server {name} did not answer within {}s",
                    EXCHANGE_TIMEOUT.as_secs()
                )));
                break;
            }
        }
    }

    alive.store(false, Ordering::SeqCst);
    let _ = child.kill().await;
    debug!("tool server {name} connection closed");
}

/// Read frames until the reply for `id` arrives. The outer error means the
/// stream itself is unusable; the inner result is the server's verdict.
async fn await_reply(
    lines: &mut Lines<BufReader<ChildStdout>>,
    id: i64,
    name: &str,
) -> Result<Result<Value, String>> {
    loop {
        let Some(line) = lines.next_line().await? else {
            bail!("tool server {name} closed its stdout");
        };
        match classify_frame(&line, id) {
            FrameKind::Reply(verdict) => return Ok(verdict),
            FrameKind::Notification(method) => {
                debug!("tool server {name} notification: {method}");
            }
            FrameKind::Foreign(other) => {
                warn!("tool server {name} answered unexpected id {other}");
            }
            FrameKind::Noise => {}
        }
    }
}

fn build_frame(id: i64, exchange: &Exchange) -> Result<String> {
    if exchange.reply.is_some() {
        let request = RpcRequest::new(id, exchange.method.clone(), exchange.params.clone());
        return Ok(serde_json::to_string(&request)?);
    }
    // Notifications carry no id and omit params entirely when absent.
    let mut frame = json!({ "jsonrpc": "2.0", "method": exchange.method.clone() });
    if let Some(params) = &exchange.params {
        frame["params"] = params.clone();
    }
    Ok(frame.to_string())
}

async fn write_frame(stdin: &mut ChildStdin, frame: &str) -> std::io::Result<()> {
    stdin.write_all(frame.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await
}

fn spawn_server(
    config: &ServerConfig,
    working_dir: &Path,
) -> Result<(Child, ChildStdin, ChildStdout)> {
    info!("Spawning tool server: {} {:?}", config.command, config.args);

    let mut child = Command::new(&config.command)
        .args(&config.args)
        .envs(&config.env)
        .current_dir(working_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => anyhow!(
                "command not found: {}. Is it installed and in PATH?",
                config.command
            ),
            _ => anyhow!("failed to spawn {}: {e}", config.command),
        })?;

    let stdin = child.stdin.take().ok_or_else(|| anyhow!("no stdin pipe"))?;
    let stdout = child.stdout.take().ok_or_else(|| anyhow!("no stdout pipe"))?;
    Ok((child, stdin, stdout))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_result_frame_is_the_reply() {
        let kind = classify_frame(r#"{"jsonrpc":"2.0","id":3,"result":{"tools":[]}}"#, 3);
        assert_eq!(kind, FrameKind::Reply(Ok(json!({"tools": []}))));
    }

    #[test]
    fn error_frames_carry_code_and_message() {
        let kind = classify_frame(
            r#"{"jsonrpc":"2.0","id":5,"error":{"code":-32601,"message":"no such method"}}"#,
            5,
        );
        assert_eq!(
            kind,
            FrameKind::Reply(Err("server error -32601: no such method".to_string()))
        );
    }

    #[test]
    fn notifications_and_foreign_ids_are_skipped() {
        assert_eq!(
            classify_frame(r#"{"jsonrpc":"2.0","method":"notifications/progress"}"#, 1),
            FrameKind::Notification("notifications/progress".to_string())
        );
        assert_eq!(
            classify_frame(r#"{"jsonrpc":"2.0","id":9,"result":null}"#, 1),
            FrameKind::Foreign(9)
        );
    }

    #[test]
    fn stdout_chatter_is_noise() {
        assert_eq!(classify_frame("starting server on stdio...", 1), FrameKind::Noise);
        assert_eq!(classify_frame("", 1), FrameKind::Noise);
        assert_eq!(classify_frame("[2024-01-01] listening", 1), FrameKind::Noise);
    }

    #[test]
    fn result_missing_becomes_null_reply() {
        let kind = classify_frame(r#"{"jsonrpc":"2.0","id":2}"#, 2);
        assert_eq!(kind, FrameKind::Reply(Ok(Value::Null)));
    }

    #[test]
    fn request_frames_are_numbered_and_notifications_are_not() {
        let (tx, _rx) = oneshot::channel();
        let request = Exchange {
            method: "tools/list".to_string(),
            params: None,
            reply: Some(tx),
        };
        let frame = build_frame(7, &request).unwrap();
        let parsed: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(parsed["id"], 7);
        assert_eq!(parsed["method"], "tools/list");

        let notification = Exchange {
            method: "notifications/initialized".to_string(),
            params: None,
            reply: None,
        };
        let frame = build_frame(8, &notification).unwrap();
        let parsed: Value = serde_json::from_str(&frame).unwrap();
        assert!(parsed.get("id").is_none());
        assert!(parsed.get("params").is_none());
        assert_eq!(parsed["jsonrpc"], "2.0");
    }
}
