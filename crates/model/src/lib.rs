//! Shared vocabulary between the agent and chat-completion providers.
//!
//! A provider turns a [`ModelRequest`] (role-tagged messages plus the tools
//! the model may call) into a stream of [`ModelResponseEvent`]s. Nothing in
//! this crate talks to the network; the types only pin down what a provider
//! must accept and emit, so the agent can stay provider-agnostic.

#![deny(missing_docs)]

mod error;
mod opaque;
mod provider;
mod request;
mod response;

pub use error::*;
pub use opaque::*;
pub use provider::*;
pub use request::*;
pub use response::*;
