//! Tool dispatch - runs the calls the model requested in one turn

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::agent::Agent;
use crate::error::{Result, SwarmError};
use crate::function::{AgentFunction, FunctionArgs, FunctionOutput, FunctionResult, CONTEXT_VARIABLES_PARAM};
use crate::types::{ContextVariables, Message, ToolCall};

/// Aggregate of one batch of tool calls
#[derive(Debug, Default)]
pub struct PartialResponse {
    /// Tool result messages, in request order
    pub messages: Vec<Message>,
    /// Handoff target, the last one requested wins
    pub agent: Option<Arc<Agent>>,
    /// Merged context variable delta
    pub context_variables: ContextVariables,
}

/// Normalize whatever a capability returned into a [`FunctionResult`]
pub fn handle_function_result(tool: &str, output: FunctionOutput, debug: bool) -> Result<FunctionResult> {
    match output {
        FunctionOutput::Result(result) => Ok(result),
        FunctionOutput::Agent(agent) => Ok(FunctionResult {
            value: json!({ "assistant": agent.name }).to_string(),
            agent: Some(agent),
            context_variables: ContextVariables::new(),
        }),
        FunctionOutput::Value(Value::String(text)) => Ok(FunctionResult::new(text)),
        FunctionOutput::Value(other) => Ok(FunctionResult::new(other.to_string())),
        FunctionOutput::Display(value) => {
            let mut text = String::new();
            match write!(text, "{value}") {
                Ok(()) => Ok(FunctionResult::new(text)),
                Err(err) => {
                    let message = format!(
                        "Failed to cast response to string: {text}. \
                        Make sure agent functions return a string or Result object. Error: {err}"
                    );
                    if debug {
                        warn!(tool, "{message}");
                    }
                    Err(SwarmError::ResultCoercion {
                        tool: tool.to_string(),
                        message,
                    })
                }
            }
        }
    }
}

enum Planned<'a> {
    Missing,
    Invoke(&'a AgentFunction, FunctionArgs),
}

fn parse_arguments(call: &ToolCall) -> Result<FunctionArgs> {
    let raw = call.function.arguments.trim();
    if raw.is_empty() {
        return Ok(FunctionArgs::new());
    }
    serde_json::from_str(raw).map_err(|source| SwarmError::ArgumentParse {
        tool: call.function.name.clone(),
        source,
    })
}

/// Execute a batch of tool calls against the given capabilities.
///
/// Arguments are parsed up front in request order and nothing runs if any of
/// them is malformed. The capabilities then run concurrently and their
/// results are folded back in request order.
pub async fn handle_tool_calls(
    tool_calls: &[ToolCall],
    functions: &[AgentFunction],
    context_variables: &ContextVariables,
    debug: bool,
) -> Result<PartialResponse> {
    let function_map: HashMap<&str, &AgentFunction> =
        functions.iter().map(|f| (f.name(), f)).collect();

    let mut planned = Vec::with_capacity(tool_calls.len());
    for call in tool_calls {
        let name = call.function.name.as_str();
        let Some(&function) = function_map.get(name) else {
            if debug {
                debug!(tool = name, "Tool not found in function map");
            }
            planned.push(Planned::Missing);
            continue;
        };

        let mut args = parse_arguments(call)?;
        if debug {
            debug!(tool = name, arguments = %call.function.arguments, "Processing tool call");
        }
        if function.wants_context_variables() {
            args.insert(
                CONTEXT_VARIABLES_PARAM.to_string(),
                Value::Object(context_variables.clone()),
            );
        }
        planned.push(Planned::Invoke(function, args));
    }

    let invocations = planned.into_iter().map(|plan| -> BoxFuture<'static, _> {
        match plan {
            Planned::Missing => future::ready(None).boxed(),
            Planned::Invoke(function, args) => function.invoke(args).map(Some).boxed(),
        }
    });
    let outputs = future::join_all(invocations).await;

    let mut partial = PartialResponse::default();
    for (call, output) in tool_calls.iter().zip(outputs) {
        let name = call.function.name.as_str();
        let Some(output) = output else {
            partial.messages.push(Message::tool(
                call.id.clone(),
                name,
                format!("Error: Tool {name} not found."),
            ));
            continue;
        };

        let output = output.map_err(|source| SwarmError::Function {
            tool: name.to_string(),
            source,
        })?;
        let result = handle_function_result(name, output, debug)?;

        partial
            .messages
            .push(Message::tool(call.id.clone(), name, result.value));
        partial.context_variables.extend(result.context_variables);
        if let Some(agent) = result.agent {
            partial.agent = Some(agent);
        }
    }

    Ok(partial)
}
