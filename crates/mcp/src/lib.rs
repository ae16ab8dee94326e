//! A tool client for MCP (Model Context Protocol) servers running as child
//! processes and speaking JSON-RPC over stdio.

#[macro_use]
extern crate tracing;

mod config;
mod protocol;
mod server;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use toolchat_core::tool::{self, ToolArguments, ToolClient, ToolResult};
use toolchat_model::ModelTool;

pub use config::{McpConfig, ServerConfig};
pub use protocol::PROTOCOL_VERSION;
pub use server::REQUEST_TIMEOUT;
use server::McpServer;

/// Errors from [`McpClient`].
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to start server `{server}`: {reason}")]
    Spawn { server: String, reason: String },

    #[error("server `{server}` did not answer {method} in time")]
    Timeout { server: String, method: String },

    #[error("server `{0}` closed its output")]
    Closed(String),

    #[error("JSON-RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    /// The tool ran and reported a failure.
    #[error("{0}")]
    ToolFailed(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("all sessions are closed")]
    SessionsClosed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<McpError> for tool::Error {
    fn from(err: McpError) -> Self {
        let base = match &err {
            McpError::ToolNotFound(_) => tool::Error::not_found(),
            McpError::ToolFailed(_) | McpError::Rpc { .. } => {
                tool::Error::execution_error()
            }
            _ => tool::Error::unavailable(),
        };
        base.with_reason(err.to_string())
    }
}

/// Running servers and an index of their tools.
struct Sessions {
    servers: Vec<Arc<McpServer>>,
    tools: Vec<ModelTool>,
    routes: HashMap<String, Arc<McpServer>>,
}

impl Sessions {
    /// Initializes every server and collects its tools. On failure the
    /// servers are shut down.
    async fn start(servers: Vec<McpServer>) -> Result<Self, McpError> {
        let mut sessions = Self {
            servers: servers.into_iter().map(Arc::new).collect(),
            tools: vec![],
            routes: HashMap::new(),
        };
        if let Err(err) = sessions.index().await {
            sessions.shutdown().await;
            return Err(err);
        }
        Ok(sessions)
    }

    async fn index(&mut self) -> Result<(), McpError> {
        for server in &self.servers {
            server.initialize().await?;
            let tools = server.list_tools().await?;
            debug!("server {} offers {} tools", server.name(), tools.len());
            for tool in tools {
                if self.routes.contains_key(&tool.name) {
                    warn!(
                        "tool {} of server {} is shadowed by another server",
                        tool.name,
                        server.name()
                    );
                    continue;
                }
                self.routes.insert(tool.name.clone(), server.clone());
                self.tools.push(tool.into());
            }
        }
        Ok(())
    }

    async fn shutdown(&self) {
        for server in &self.servers {
            server.shutdown().await;
        }
    }
}

enum State {
    Configured(McpConfig),
    Connected(Sessions),
    Closed,
}

/// A [`ToolClient`] backed by the servers of an [`McpConfig`].
///
/// Servers are started by [`connect`](McpClient::connect), or on first use.
/// [`close_all_sessions`](ToolClient::close_all_sessions) stops them; it is
/// safe to call more than once, and every later call fails.
pub struct McpClient {
    state: Mutex<State>,
}

impl McpClient {
    /// Creates a client for `config`. No server is started yet.
    pub fn new(config: McpConfig) -> Self {
        Self {
            state: Mutex::new(State::Configured(config)),
        }
    }

    /// Creates a client from a config file.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self, McpError> {
        Ok(Self::new(McpConfig::from_file(path)?))
    }

    /// Starts every enabled server, performs the handshake and lists their
    /// tools. Does nothing if already connected.
    pub async fn connect(&self) -> Result<(), McpError> {
        let mut state = self.state.lock().await;
        let config = match &*state {
            State::Configured(config) => config,
            State::Connected(_) => return Ok(()),
            State::Closed => return Err(McpError::SessionsClosed),
        };

        let mut servers = vec![];
        for (name, server_config) in config.enabled_servers() {
            match McpServer::spawn(name, server_config) {
                Ok(server) => servers.push(server),
                Err(err) => {
                    for server in &servers {
                        server.shutdown().await;
                    }
                    return Err(err);
                }
            }
        }
        let sessions = Sessions::start(servers).await?;
        info!(
            "connected to {} servers, {} tools",
            sessions.servers.len(),
            sessions.tools.len()
        );
        *state = State::Connected(sessions);
        Ok(())
    }

    #[cfg(test)]
    async fn from_servers(servers: Vec<McpServer>) -> Result<Self, McpError> {
        let sessions = Sessions::start(servers).await?;
        Ok(Self {
            state: Mutex::new(State::Connected(sessions)),
        })
    }

    async fn route(&self, name: &str) -> Result<Arc<McpServer>, McpError> {
        self.connect().await?;
        match &*self.state.lock().await {
            State::Connected(sessions) => sessions
                .routes
                .get(name)
                .cloned()
                .ok_or_else(|| McpError::ToolNotFound(name.to_owned())),
            _ => Err(McpError::SessionsClosed),
        }
    }
}

#[async_trait]
impl ToolClient for McpClient {
    async fn list_tools(&self) -> Result<Vec<ModelTool>, tool::Error> {
        self.connect().await?;
        match &*self.state.lock().await {
            State::Connected(sessions) => Ok(sessions.tools.clone()),
            _ => Err(McpError::SessionsClosed.into()),
        }
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: ToolArguments,
    ) -> ToolResult {
        let server = self.route(name).await?;
        debug!("calling {name} on server {}", server.name());
        let value: Value = server.call_tool(name, arguments).await?;
        Ok(value)
    }

    async fn close_all_sessions(&self) -> Result<(), tool::Error> {
        let mut state = self.state.lock().await;
        if let State::Connected(sessions) =
            std::mem::replace(&mut *state, State::Closed)
        {
            sessions.shutdown().await;
            info!("closed {} server sessions", sessions.servers.len());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::server::tests::fake_server;

    fn search_server() -> McpServer {
        fake_server("duckduckgo", |method, params| match method {
            "initialize" => Some(json!({ "protocolVersion": PROTOCOL_VERSION })),
            "tools/list" => Some(json!({
                "tools": [{
                    "name": "duckduckgo_search",
                    "description": "Search the web",
                    "inputSchema": { "type": "object" }
                }]
            })),
            "tools/call" => Some(json!({
                "content": [{
                    "type": "text",
                    "text": json!({ "query": params["arguments"]["query"] }).to_string()
                }]
            })),
            _ => None,
        })
    }

    fn weather_server() -> McpServer {
        fake_server("weather", |method, _| match method {
            "initialize" => Some(json!({})),
            "tools/list" => Some(json!({
                "tools": [{ "name": "get_weather" }, { "name": "duckduckgo_search" }]
            })),
            "tools/call" => Some(json!({
                "content": [{ "type": "text", "text": "upstream down" }],
                "isError": true
            })),
            _ => None,
        })
    }

    #[tokio::test]
    async fn test_routes_calls() {
        let client = McpClient::from_servers(vec![search_server(), weather_server()])
            .await
            .unwrap();

        let tools = client.list_tools().await.unwrap();
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["duckduckgo_search", "get_weather"]);
        assert_eq!(tools[0].description, "Search the web");

        let mut args = ToolArguments::new();
        args.insert("query".to_owned(), json!("weather in Paris"));
        let value = client.call_tool("duckduckgo_search", args).await.unwrap();
        assert_eq!(value, json!({ "query": "weather in Paris" }));

        let err = client
            .call_tool("get_weather", ToolArguments::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), tool::ErrorKind::ExecutionError);
        assert_eq!(err.reason(), "upstream down");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let client = McpClient::from_servers(vec![search_server()]).await.unwrap();
        let err = client
            .call_tool("airbnb_search", ToolArguments::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), tool::ErrorKind::NotFound);
        assert_eq!(err.reason(), "tool not found: airbnb_search");
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let client = McpClient::from_servers(vec![search_server()]).await.unwrap();
        client.close_all_sessions().await.unwrap();
        client.close_all_sessions().await.unwrap();

        let err = client.list_tools().await.unwrap_err();
        assert_eq!(err.kind(), tool::ErrorKind::Unavailable);
        assert_eq!(err.reason(), "all sessions are closed");
    }

    #[tokio::test]
    async fn test_connect_without_servers() {
        let client = McpClient::new(McpConfig::default());
        client.connect().await.unwrap();
        assert!(client.list_tools().await.unwrap().is_empty());
        client.close_all_sessions().await.unwrap();
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let config: McpConfig = r#"{
            "mcpServers": {
                "missing": { "command": "/nonexistent/toolchat-mcp-server" }
            }
        }"#
        .parse()
        .unwrap();
        let client = McpClient::new(config);
        let err = client.connect().await.unwrap_err();
        assert!(matches!(err, McpError::Spawn { ref server, .. } if server == "missing"));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_retried() {
        let config: McpConfig = r#"{
            "mcpServers": {
                "missing": { "command": "/nonexistent/toolchat-mcp-server" }
            }
        }"#
        .parse()
        .unwrap();
        let client = McpClient::new(config);
        for _ in 0..2 {
            let err = client.list_tools().await.unwrap_err();
            assert_eq!(err.kind(), tool::ErrorKind::Unavailable);
            assert!(err.reason().contains("failed to start server `missing`"));
        }
        assert!(matches!(*client.state.lock().await, State::Configured(_)));
    }

    #[tokio::test]
    async fn test_handshake_failure() {
        let broken = fake_server("broken", |_, _| {
            Some(json!({ "error": { "code": -32600, "message": "bad version" } }))
        });
        let err = McpClient::from_servers(vec![broken]).await.err().unwrap();
        assert!(matches!(err, McpError::Rpc { code: -32600, .. }));
    }
}
