//! Startup configuration.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use toolchat_openai_model::{DEFAULT_MODEL, OpenAIConfig, OpenAIConfigBuilder};

/// The variable holding the OpenRouter API key.
pub const API_KEY_VAR: &str = "OPENROUTER_API_KEY";
/// The variable naming the model.
pub const MODEL_VAR: &str = "OPENROUTER_MODEL";
/// The tool server file, relative to the working directory.
pub const MCP_CONFIG_FILE: &str = "mcp_server.json";

const TEMPERATURE: f32 = 0.7;
const HEADERS: [(&str, &str); 2] = [
    ("HTTP-Referer", "http://localhost"),
    ("X-Title", "MCP OpenRouter Agent"),
];

/// Errors that prevent the chat from starting.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No API key in the environment or `.env`.
    #[error("OPENROUTER_API_KEY not found")]
    MissingApiKey,
    /// `.env` exists but can't be read.
    #[error("cannot read {}: {source}", .path.display())]
    DotEnv {
        /// The file.
        path: PathBuf,
        /// The cause.
        source: dotenvy::Error,
    },
}

/// Everything the chat needs to start, resolved once.
#[derive(Clone, PartialEq)]
pub struct AppConfig {
    api_key: String,
    model: String,
    mcp_config_path: PathBuf,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("mcp_config_path", &self.mcp_config_path)
            .finish()
    }
}

impl AppConfig {
    /// Reads the process environment, falling back to a `.env` file in the
    /// working directory for variables the environment doesn't set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&load_vars()?)
    }

    /// Builds the configuration from a snapshot of variables.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let api_key = vars
            .get(API_KEY_VAR)
            .map(|key| key.trim())
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;
        let model = vars
            .get(MODEL_VAR)
            .map(|model| model.trim())
            .filter(|model| !model.is_empty())
            .unwrap_or(DEFAULT_MODEL);
        Ok(Self {
            api_key: api_key.to_owned(),
            model: model.to_owned(),
            mcp_config_path: PathBuf::from(MCP_CONFIG_FILE),
        })
    }

    /// Returns the model identifier.
    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Returns the path of the tool server file.
    #[inline]
    pub fn mcp_config_path(&self) -> &Path {
        &self.mcp_config_path
    }

    /// Returns the provider settings for OpenRouter.
    pub fn openai_config(&self) -> OpenAIConfig {
        HEADERS.iter().fold(
            OpenAIConfigBuilder::with_api_key(&self.api_key)
                .with_model(&self.model)
                .with_temperature(TEMPERATURE),
            |builder, (name, value)| builder.with_header(*name, *value),
        )
        .build()
    }
}

/// Snapshots the process environment on top of the `.env` file in the
/// working directory. The process environment itself is left untouched.
pub fn load_vars() -> Result<HashMap<String, String>, ConfigError> {
    let mut vars = read_dotenv(Path::new(".env"))?;
    vars.extend(std::env::vars());
    Ok(vars)
}

/// Reads a dotenv file. A missing file is empty; malformed lines are
/// skipped.
fn read_dotenv(path: &Path) -> Result<HashMap<String, String>, ConfigError> {
    let dotenv_error = |source: dotenvy::Error| ConfigError::DotEnv {
        path: path.to_owned(),
        source,
    };
    let entries = match dotenvy::from_path_iter(path) {
        Ok(entries) => entries,
        Err(err) if err.not_found() => return Ok(HashMap::new()),
        Err(err) => return Err(dotenv_error(err)),
    };

    let mut vars = HashMap::new();
    for entry in entries {
        match entry {
            Ok((key, value)) => {
                vars.insert(key, value);
            }
            Err(err @ dotenvy::Error::LineParse(..)) => {
                warn!("{}: {err}, line ignored", path.display());
            }
            Err(err) => return Err(dotenv_error(err)),
        }
    }
    Ok(vars)
}
