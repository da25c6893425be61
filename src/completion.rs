//! Completion gateway - builds requests for the chat-completion endpoint
//!
//! The endpoint itself sits behind [`CompletionClient`] so the turn loop can
//! be driven by the HTTP client in [`crate::openai`] or by a test double.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::agent::Agent;
use crate::function::{function_to_json, AgentFunction, CONTEXT_VARIABLES_PARAM};
use crate::merge::Delta;
use crate::types::{ContextVariables, Message};

/// Stream of partial message fragments
pub type DeltaStream = BoxStream<'static, Result<Delta, TransportError>>;

/// Errors talking to the completion endpoint. Never retried.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Request could not be sent or its body could not be read
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Endpoint answered with a non-success status
    #[error("Endpoint returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// Endpoint answered with something that is not a completion
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// A streamed response broke off or carried garbage
    #[error("Stream error: {0}")]
    Stream(String),
}

/// Outbound chat-completion request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    /// System prompt followed by the history
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
    pub stream: bool,
}

/// A chat-completion endpoint
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Request one complete assistant message
    async fn complete(&self, request: CompletionRequest) -> Result<Message, TransportError>;

    /// Request the assistant message as a stream of fragments
    async fn complete_stream(&self, request: CompletionRequest) -> Result<DeltaStream, TransportError>;
}

/// Tool schema for a capability with the context variables parameter removed
pub fn tool_schema(function: &AgentFunction) -> Value {
    let mut schema = function_to_json(function);
    if let Some(parameters) = schema
        .get_mut("function")
        .and_then(|f| f.get_mut("parameters"))
    {
        if let Some(properties) = parameters.get_mut("properties").and_then(Value::as_object_mut) {
            properties.remove(CONTEXT_VARIABLES_PARAM);
        }
        if let Some(required) = parameters.get_mut("required").and_then(Value::as_array_mut) {
            required.retain(|name| name != CONTEXT_VARIABLES_PARAM);
        }
    }
    schema
}

/// Assemble the request for `agent` over `history`
pub fn build_request(
    agent: &Agent,
    history: &[Message],
    context_variables: &ContextVariables,
    model_override: Option<&str>,
    stream: bool,
) -> CompletionRequest {
    let instructions = agent.instructions.render(context_variables);

    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(Message::system(instructions));
    messages.extend(history.iter().cloned());

    let tools: Vec<Value> = agent.functions.iter().map(tool_schema).collect();
    let has_tools = !tools.is_empty();

    CompletionRequest {
        model: model_override.unwrap_or(&agent.model).to_string(),
        messages,
        tools: has_tools.then_some(tools),
        tool_choice: agent.tool_choice.clone(),
        parallel_tool_calls: has_tools.then_some(agent.parallel_tool_calls),
        stream,
    }
}
