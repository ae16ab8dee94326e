//! Startup: configuration, clients and the chat, in that order.

use std::collections::HashMap;
use std::fmt::Display;
use std::io;
use std::sync::Arc;

use owo_colors::{OwoColorize, Stream};
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};
use toolchat_mcp::McpClient;
use toolchat_openai_model::OpenAIProvider;

use crate::{AppConfig, ChatLoop, SessionBuilder, TurnObserver};

/// Printed once before the first prompt.
pub const BANNER: &str = "=====  Interactive MCP Chat (OpenRouter + MCP) =====";

/// Starts the chat from a snapshot of environment variables.
///
/// A configuration problem is reported as a single `Error: ` line and the
/// chat never starts. Tool servers are started by the first turn that needs
/// them, so a broken server fails that turn instead of the whole program.
pub async fn start<R, W>(
    vars: &HashMap<String, String>,
    input: R,
    mut output: W,
    observer: impl TurnObserver + 'static,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let config = match AppConfig::from_vars(vars) {
        Ok(config) => config,
        Err(err) => return report_error(&mut output, err).await,
    };
    debug!("using {config:?}");

    let tool_client = match McpClient::from_config_file(config.mcp_config_path())
    {
        Ok(client) => client,
        Err(err) => return report_error(&mut output, err).await,
    };

    let provider = OpenAIProvider::new(config.openai_config());
    let session =
        SessionBuilder::with_model_provider(provider, Arc::new(tool_client))
            .build();

    let banner =
        BANNER.if_supports_color(Stream::Stdout, |text| text.bright_cyan());
    output.write_all(format!("\n{banner}\n\n").as_bytes()).await?;
    ChatLoop::new(input, output)
        .with_observer(observer)
        .run(session)
        .await
}

/// Writes `Error: <err>` as a line of its own.
pub async fn report_error<W: AsyncWrite + Unpin>(
    output: &mut W,
    err: impl Display,
) -> io::Result<()> {
    output.write_all(format!("Error: {err}\n").as_bytes()).await?;
    output.flush().await
}
