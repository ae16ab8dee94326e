//! The agent: a model client and a tool client composed into a single
//! "answer this" operation.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod agent;
pub mod conversation;
mod model_client;
pub mod tool;

pub use agent::{Agent, AgentBuilder, AgentError, AgentResponse};
pub use model_client::{ModelClient, ModelClientResponse};
