//! Agent definition - a named bundle of instructions and capabilities

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::function::AgentFunction;
use crate::types::ContextVariables;

pub const DEFAULT_AGENT_NAME: &str = "Agent";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_INSTRUCTIONS: &str = "You are a helpful agent.";

type InstructionsFn = dyn Fn(&ContextVariables) -> String + Send + Sync;

/// System prompt of an agent
#[derive(Clone)]
pub enum Instructions {
    /// Used as-is
    Text(String),
    /// Computed from the context variables on every turn
    Dynamic(Arc<InstructionsFn>),
}

impl Instructions {
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&ContextVariables) -> String + Send + Sync + 'static,
    {
        Self::Dynamic(Arc::new(f))
    }

    /// Produce the system prompt for the current context
    pub fn render(&self, context_variables: &ContextVariables) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Dynamic(f) => f(context_variables),
        }
    }
}

impl Default for Instructions {
    fn default() -> Self {
        Self::Text(DEFAULT_INSTRUCTIONS.to_string())
    }
}

impl From<&str> for Instructions {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Instructions {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl fmt::Debug for Instructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// Agent configuration.
///
/// Agents are built once and shared behind an `Arc`; a run never mutates
/// them. Handing off only changes which agent is active.
#[derive(Clone)]
pub struct Agent {
    pub name: String,
    pub model: String,
    pub instructions: Instructions,
    /// Capabilities exposed to the model as tools, in declaration order
    pub functions: Vec<AgentFunction>,
    /// Raw `tool_choice` directive forwarded to the endpoint
    pub tool_choice: Option<Value>,
    pub parallel_tool_calls: bool,
}

impl Agent {
    /// Create an agent with default model and instructions
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<Instructions>) -> Self {
        self.instructions = instructions.into();
        self
    }

    /// Instructions computed from context variables
    pub fn with_dynamic_instructions<F>(mut self, f: F) -> Self
    where
        F: Fn(&ContextVariables) -> String + Send + Sync + 'static,
    {
        self.instructions = Instructions::dynamic(f);
        self
    }

    pub fn with_function(mut self, function: AgentFunction) -> Self {
        self.functions.push(function);
        self
    }

    pub fn with_functions(mut self, functions: impl IntoIterator<Item = AgentFunction>) -> Self {
        self.functions.extend(functions);
        self
    }

    pub fn with_tool_choice(mut self, tool_choice: Value) -> Self {
        self.tool_choice = Some(tool_choice);
        self
    }

    pub fn with_parallel_tool_calls(mut self, enabled: bool) -> Self {
        self.parallel_tool_calls = enabled;
        self
    }

    /// Finish building and share
    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl Default for Agent {
    fn default() -> Self {
        Self {
            name: DEFAULT_AGENT_NAME.to_string(),
            model: DEFAULT_MODEL.to_string(),
            instructions: Instructions::default(),
            functions: Vec::new(),
            tool_choice: None,
            parallel_tool_calls: true,
        }
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("model", &self.model)
            .field("instructions", &self.instructions)
            .field(
                "functions",
                &self.functions.iter().map(AgentFunction::name).collect::<Vec<_>>(),
            )
            .field("tool_choice", &self.tool_choice)
            .field("parallel_tool_calls", &self.parallel_tool_calls)
            .finish()
    }
}
