//! Swarm error types

use thiserror::Error;

use crate::channel::ChannelError;
use crate::completion::TransportError;

/// Errors that abort a run
#[derive(Debug, Error)]
pub enum SwarmError {
    /// The model asked for a tool with arguments that are not a JSON object
    #[error("Invalid arguments for tool '{tool}': {source}")]
    ArgumentParse {
        tool: String,
        #[source]
        source: serde_json::Error,
    },

    /// A capability returned a value with no string form
    #[error("{message}")]
    ResultCoercion { tool: String, message: String },

    /// A capability failed while running
    #[error("Tool '{tool}' failed: {source}")]
    Function {
        tool: String,
        #[source]
        source: anyhow::Error,
    },

    /// Completion endpoint error
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// A completion could not be read as a chat message
    #[error("Invalid completion message: {0}")]
    InvalidMessage(#[source] serde_json::Error),

    /// A streamed fragment does not fit the message being accumulated
    #[error("Invalid stream fragment: {0}")]
    InvalidDelta(String),

    /// Channel error
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T, E = SwarmError> = std::result::Result<T, E>;
