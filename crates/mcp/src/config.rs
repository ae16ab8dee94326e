//! The `mcp_server.json` file.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::McpError;

/// The set of tool servers to start.
///
/// ```json
/// {
///   "mcpServers": {
///     "duckduckgo": { "command": "npx", "args": ["-y", "duckduckgo-mcp-server"] }
///   }
/// }
/// ```
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpConfig {
    /// Servers by id. Ordered, so servers start in a stable order.
    #[serde(default)]
    pub mcp_servers: BTreeMap<String, ServerConfig>,
}

/// One stdio tool server.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ServerConfig {
    /// The program to run.
    #[serde(default)]
    pub command: Option<String>,
    /// Program arguments.
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment variables for the server process.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Disabled servers are not started.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl McpConfig {
    /// Reads and validates a config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, McpError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| {
            McpError::Config(format!("cannot read {}: {err}", path.display()))
        })?;
        text.parse()
    }

    /// Returns the servers to start, by id.
    pub fn enabled_servers(
        &self,
    ) -> impl Iterator<Item = (&str, &ServerConfig)> + '_ {
        self.mcp_servers
            .iter()
            .filter(|(_, server)| server.enabled)
            .map(|(id, server)| (id.as_str(), server))
    }

    fn validate(&self) -> Result<(), McpError> {
        for (id, server) in self.enabled_servers() {
            let has_command = server
                .command
                .as_deref()
                .is_some_and(|command| !command.trim().is_empty());
            if !has_command {
                return Err(McpError::Config(format!(
                    "server `{id}` has no command"
                )));
            }
        }
        Ok(())
    }
}

impl FromStr for McpConfig {
    type Err = McpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: Self = serde_json::from_str(s).map_err(|err| {
            McpError::Config(format!("invalid server config: {err}"))
        })?;
        config.validate()?;
        Ok(config)
    }
}
