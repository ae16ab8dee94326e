//! A tool server spoken to over newline-delimited JSON-RPC.

use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value, json};
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::McpError;
use crate::config::ServerConfig;
use crate::protocol::{
    CallToolParams, CallToolResult, InitializeParams, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, ListToolsResult, ToolDefinition,
};

/// How long to wait for any single response.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type Reader = BufReader<Box<dyn AsyncRead + Send + Unpin>>;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;

/// A connection to one tool server.
///
/// Requests are serialized: a request holds `in_flight` from writing the
/// request until its response arrives, and anything else read meanwhile is
/// discarded.
pub struct McpServer {
    name: String,
    next_id: AtomicU64,
    in_flight: Mutex<()>,
    writer: Mutex<Writer>,
    reader: Mutex<Reader>,
    child: Mutex<Option<Child>>,
    request_timeout: Duration,
}

impl McpServer {
    /// Starts the server process. The handshake is not performed yet.
    pub fn spawn(name: &str, config: &ServerConfig) -> Result<Self, McpError> {
        let program = config.command.as_deref().unwrap_or_default();
        let mut child = Command::new(program)
            .args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            // Server diagnostics would garble the chat transcript.
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| McpError::Spawn {
                server: name.to_owned(),
                reason: format!("cannot run `{program}`: {err}"),
            })?;

        let missing_pipe = || McpError::Spawn {
            server: name.to_owned(),
            reason: "stdio pipes unavailable".to_owned(),
        };
        let stdin = child.stdin.take().ok_or_else(missing_pipe)?;
        let stdout = child.stdout.take().ok_or_else(missing_pipe)?;
        debug!("started server {name} (pid {:?})", child.id());

        let mut server = Self::from_io(name, stdout, stdin);
        server.child = Mutex::new(Some(child));
        Ok(server)
    }

    /// Wraps an already-open connection.
    pub(crate) fn from_io(
        name: &str,
        reader: impl AsyncRead + Send + Unpin + 'static,
        writer: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            name: name.to_owned(),
            next_id: AtomicU64::new(1),
            in_flight: Mutex::new(()),
            writer: Mutex::new(Box::new(writer)),
            reader: Mutex::new(BufReader::new(Box::new(reader))),
            child: Mutex::new(None),
            request_timeout: REQUEST_TIMEOUT,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_request_timeout(mut self, duration: Duration) -> Self {
        self.request_timeout = duration;
        self
    }

    /// Returns the server id from the config file.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Performs the `initialize` handshake.
    pub async fn initialize(&self) -> Result<(), McpError> {
        let params = serde_json::to_value(InitializeParams::default())?;
        let result = self.request("initialize", Some(params)).await?;
        debug!(
            "server {} speaks {} ({})",
            self.name, result["protocolVersion"], result["serverInfo"]["name"],
        );
        self.notify("notifications/initialized", None).await
    }

    /// Lists every tool, following pagination cursors.
    pub async fn list_tools(&self) -> Result<Vec<ToolDefinition>, McpError> {
        let mut tools = vec![];
        let mut cursor: Option<String> = None;
        loop {
            let params = cursor.take().map(|cursor| json!({ "cursor": cursor }));
            let result = self.request("tools/list", params).await?;
            let page: ListToolsResult =
                serde_json::from_value(result).map_err(|err| {
                    McpError::Protocol(format!("invalid tools/list result: {err}"))
                })?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(tools)
    }

    /// Calls a tool and reduces its result to a JSON value.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<Value, McpError> {
        let params = serde_json::to_value(CallToolParams { name, arguments })?;
        let result = self.request("tools/call", Some(params)).await?;
        let result: CallToolResult =
            serde_json::from_value(result).map_err(|err| {
                McpError::Protocol(format!("invalid tools/call result: {err}"))
            })?;
        result.into_value()
    }

    /// Kills the server process and waits for it to exit.
    pub async fn shutdown(&self) {
        let Some(mut child) = self.child.lock().await.take() else {
            return;
        };
        if let Err(err) = child.kill().await {
            warn!("failed to stop server {}: {err}", self.name);
            return;
        }
        debug!("server {} stopped", self.name);
    }

    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, McpError> {
        let _in_flight = self.in_flight.lock().await;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        trace!("-> {} #{id} {method}", self.name);
        self.write_line(&JsonRpcRequest::new(id, method, params))
            .await?;

        let resp = timeout(self.request_timeout, self.read_response(id))
            .await
            .map_err(|_| McpError::Timeout {
                server: self.name.clone(),
                method: method.to_owned(),
            })??;
        resp.into_result()
    }

    async fn notify(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), McpError> {
        trace!("-> {} {method}", self.name);
        self.write_line(&JsonRpcNotification::new(method, params))
            .await
    }

    async fn write_line(&self, message: &impl Serialize) -> Result<(), McpError> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn read_response(&self, id: u64) -> Result<JsonRpcResponse, McpError> {
        let mut reader = self.reader.lock().await;
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                return Err(McpError::Closed(self.name.clone()));
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(resp) if resp.answers(id) => return Ok(resp),
                Ok(resp) => {
                    trace!("{} skipped message {:?}", self.name, resp.method);
                }
                Err(_) => trace!("{} skipped line: {trimmed}", self.name),
            }
        }
    }
}
