// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Stdio client for one MCP tool server
//!
//! The server runs as a child process. Requests are newline-delimited
//! JSON-RPC written to its stdin; responses are read from its stdout. Only one
//! request is in flight at a time.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use super::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcMessage,
    JsonRpcRequest, RemoteTool, ToolsListResult,
};
use crate::config::McpServerConfig;
use crate::error::{ParleyError, Result};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

struct Pipes {
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// Connection to a running tool server
pub struct McpClient {
    name: String,
    next_id: AtomicU64,
    pipes: Mutex<Pipes>,
    timeout: Duration,
    // Held so the process is killed when the client goes away.
    _child: Child,
}

impl McpClient {
    /// Spawn the server and perform the `initialize` handshake
    pub async fn connect(name: &str, config: &McpServerConfig) -> Result<Self> {
        if !config.is_stdio() {
            return Err(ParleyError::Mcp(format!(
                "server '{}' uses unsupported transport '{}'",
                name, config.transport
            )));
        }
        if config.command.trim().is_empty() {
            return Err(ParleyError::Mcp(format!("server '{}' has no command", name)));
        }

        let mut child = Command::new(&config.command)
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ParleyError::Mcp(format!("failed to spawn server '{}': {}", name, e))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ParleyError::Mcp(format!("server '{}' has no stdin", name)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ParleyError::Mcp(format!("server '{}' has no stdout", name)))?;

        let client = Self {
            name: name.to_string(),
            next_id: AtomicU64::new(1),
            pipes: Mutex::new(Pipes {
                stdin,
                stdout: BufReader::new(stdout),
            }),
            timeout: DEFAULT_TIMEOUT,
            _child: child,
        };
        client.initialize().await?;
        Ok(client)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    async fn initialize(&self) -> Result<()> {
        let result: InitializeResult = self
            .request(
                "initialize",
                Some(serde_json::to_value(InitializeParams::for_this_client())?),
            )
            .await?;
        self.notify("notifications/initialized").await?;

        tracing::info!(
            target: "parley.mcp",
            server = %self.name,
            remote = %result.server_info.name,
            protocol = %result.protocol_version,
            "tool server initialized"
        );
        Ok(())
    }

    /// Every tool the server offers, following pagination cursors
    pub async fn list_tools(&self) -> Result<Vec<RemoteTool>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.as_ref().map(|c| serde_json::json!({ "cursor": c }));
            let page: ToolsListResult = self.request("tools/list", params).await?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(tools)
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<CallToolResult> {
        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };
        self.request("tools/call", Some(serde_json::to_value(params)?))
            .await
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Option<Value>) -> Result<T> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::call(id, method, params);

        let mut pipes = self.pipes.lock().await;
        write_line(&mut pipes.stdin, &request).await?;

        let message = tokio::time::timeout(self.timeout, read_response(&mut pipes.stdout, id))
            .await
            .map_err(|_| {
                ParleyError::Mcp(format!(
                    "server '{}' did not answer '{}' within {:?}",
                    self.name, method, self.timeout
                ))
            })??;

        if let Some(error) = message.error {
            return Err(ParleyError::Mcp(format!(
                "server '{}' rejected '{}': {} ({})",
                self.name, method, error.message, error.code
            )));
        }
        let result = message.result.unwrap_or(Value::Null);
        Ok(serde_json::from_value(result)?)
    }

    async fn notify(&self, method: &str) -> Result<()> {
        let mut pipes = self.pipes.lock().await;
        write_line(&mut pipes.stdin, &JsonRpcRequest::notification(method)).await
    }
}

async fn write_line(stdin: &mut ChildStdin, request: &JsonRpcRequest) -> Result<()> {
    let mut line = serde_json::to_string(request)?;
    line.push('\n');
    stdin.write_all(line.as_bytes()).await?;
    stdin.flush().await?;
    Ok(())
}

/// Read lines until the response to `id` arrives, skipping notifications,
/// server-initiated requests and non-JSON noise.
async fn read_response(stdout: &mut BufReader<ChildStdout>, id: u64) -> Result<JsonRpcMessage> {
    let mut line = String::new();
    loop {
        line.clear();
        if stdout.read_line(&mut line).await? == 0 {
            return Err(ParleyError::Mcp("server closed its output".to_string()));
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<JsonRpcMessage>(trimmed) {
            Ok(message) if message.answers(id) => return Ok(message),
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(target: "parley.mcp", "ignoring non-JSON-RPC line: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient").field("name", &self.name).finish()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    /// A tiny MCP server written in POSIX shell
    fn shell_server(script: &str) -> McpServerConfig {
        McpServerConfig::stdio("sh", vec!["-c".to_string(), script.to_string()])
    }

    const ECHO_SERVER: &str = r#"
read init
echo '{"jsonrpc":"2.0","method":"notifications/message","params":{}}'
echo '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","serverInfo":{"name":"sh","version":"0"},"capabilities":{}}}'
read initialized
read list
echo '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"ping","description":"Ping","inputSchema":{"type":"object"}}]}}'
read call
echo '{"jsonrpc":"2.0","id":3,"result":{"content":[{"type":"text","text":"pong"}]}}'
"#;

    #[tokio::test]
    async fn test_handshake_list_and_call() {
        let client = McpClient::connect("echo", &shell_server(ECHO_SERVER))
            .await
            .unwrap();

        let tools = client.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "ping");

        let result = client
            .call_tool("ping", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(result.text(), "pong");
        assert_eq!(result.is_error, None);
    }

    #[tokio::test]
    async fn test_server_that_exits_is_an_error() {
        let err = McpClient::connect("dead", &shell_server("exit 0"))
            .await
            .unwrap_err();
        assert!(matches!(err, ParleyError::Mcp(_) | ParleyError::Io(_)));
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let config = McpServerConfig::stdio("/nonexistent/parley-mcp-server", vec![]);
        let err = McpClient::connect("missing", &config).await.unwrap_err();
        assert!(err.to_string().contains("failed to spawn"));
    }

    #[tokio::test]
    async fn test_unsupported_transport() {
        let mut config = McpServerConfig::stdio("server", vec![]);
        config.transport = "sse".to_string();
        let err = McpClient::connect("remote", &config).await.unwrap_err();
        assert!(err.to_string().contains("unsupported transport"));
    }
}
