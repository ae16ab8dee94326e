//! An interactive chat with an OpenRouter model that can use tools served
//! by MCP servers.
//!
//! The crate includes a CLI for using in the terminal. The whole startup
//! sequence is [`start`]; the pieces it is built from ([`AppConfig`],
//! [`Session`], [`ChatLoop`]) can also be used as a library.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod app;
pub mod chat;
pub mod config;
mod session;

pub use app::{BANNER, report_error, start};
pub use chat::{ChatLoop, TurnError, TurnObserver, run_turn};
pub use config::{AppConfig, ConfigError};
pub use session::{DEFAULT_SYSTEM_PROMPT, Session, SessionBuilder};

/// Re-exports of [`toolchat_core`] crate.
pub mod core {
    pub use toolchat_core::*;
}
