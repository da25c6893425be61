//! Capabilities - callables exposed to the model as tools
//!
//! A capability carries an explicit descriptor (name, description, typed
//! parameters with optional defaults) next to its handler. The descriptor is
//! what [`function_to_json`] turns into the endpoint's tool schema.
//!
//! ```ignore
//! use swarm::{AgentFunction, ParamType};
//!
//! let weather = AgentFunction::new("get_weather", |args| {
//!     let location = args.get("location").and_then(|v| v.as_str()).unwrap_or("here");
//!     Ok(format!("It's sunny in {location}."))
//! })
//! .with_description("Get the current weather")
//! .param("location", ParamType::String);
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{json, Map, Value};

use crate::agent::Agent;
use crate::types::ContextVariables;

/// Reserved parameter name; filled by the dispatcher, never by the model.
pub const CONTEXT_VARIABLES_PARAM: &str = "context_variables";

/// Arguments handed to a capability
pub type FunctionArgs = Map<String, Value>;

type Handler = dyn Fn(FunctionArgs) -> BoxFuture<'static, anyhow::Result<FunctionOutput>> + Send + Sync;

/// JSON schema type of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
    Null,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
            Self::Null => "null",
        }
    }

    /// Map a Rust type name onto a schema type. Unknown names fall back to `string`.
    pub fn from_type_name(type_name: &str) -> Self {
        let name = type_name.trim().trim_start_matches('&').trim();
        let base = name.split('<').next().unwrap_or(name).trim();
        let base = base.rsplit("::").next().unwrap_or(base);

        match base {
            "str" | "String" | "char" | "Cow" => Self::String,
            "bool" => Self::Boolean,
            "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64"
            | "u128" | "usize" => Self::Integer,
            "f32" | "f64" => Self::Number,
            "HashMap" | "BTreeMap" | "Map" | "IndexMap" => Self::Object,
            "Vec" | "VecDeque" | "HashSet" | "BTreeSet" => Self::Array,
            "()" => Self::Null,
            _ => Self::String,
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A declared parameter of a capability
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub param_type: ParamType,
    /// Parameters with a default are optional for the model
    pub default: Option<Value>,
}

impl Parameter {
    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// Normalized outcome of a capability call
#[derive(Clone, Default)]
pub struct FunctionResult {
    /// Payload returned to the model
    pub value: String,
    /// Agent to hand the conversation to
    pub agent: Option<Arc<Agent>>,
    /// Delta merged into the run's context variables
    pub context_variables: ContextVariables,
}

impl FunctionResult {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn with_agent(mut self, agent: Arc<Agent>) -> Self {
        self.agent = Some(agent);
        self
    }

    pub fn with_context_variable(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context_variables.insert(key.into(), value.into());
        self
    }

    pub fn with_context_variables(mut self, variables: ContextVariables) -> Self {
        self.context_variables.extend(variables);
        self
    }
}

impl fmt::Debug for FunctionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionResult")
            .field("value", &self.value)
            .field("agent", &self.agent.as_ref().map(|a| a.name.as_str()))
            .field("context_variables", &self.context_variables)
            .finish()
    }
}

/// What a capability may return
#[derive(Clone)]
pub enum FunctionOutput {
    /// Plain value, coerced to a string for the model
    Value(Value),
    /// Anything with a display form; formatting it may fail
    Display(Arc<dyn fmt::Display + Send + Sync>),
    /// Fully formed result
    Result(FunctionResult),
    /// Hand the conversation to another agent
    Agent(Arc<Agent>),
}

impl FunctionOutput {
    pub fn display(value: impl fmt::Display + Send + Sync + 'static) -> Self {
        Self::Display(Arc::new(value))
    }
}

impl fmt::Debug for FunctionOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Display(_) => f.write_str("Display(..)"),
            Self::Result(result) => f.debug_tuple("Result").field(result).finish(),
            Self::Agent(agent) => f.debug_tuple("Agent").field(&agent.name).finish(),
        }
    }
}

impl From<Value> for FunctionOutput {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<String> for FunctionOutput {
    fn from(value: String) -> Self {
        Self::Value(Value::String(value))
    }
}

impl From<&str> for FunctionOutput {
    fn from(value: &str) -> Self {
        Self::Value(Value::String(value.to_string()))
    }
}

impl From<bool> for FunctionOutput {
    fn from(value: bool) -> Self {
        Self::Value(Value::Bool(value))
    }
}

impl From<i64> for FunctionOutput {
    fn from(value: i64) -> Self {
        Self::Value(value.into())
    }
}

impl From<f64> for FunctionOutput {
    fn from(value: f64) -> Self {
        Self::Value(value.into())
    }
}

impl From<FunctionResult> for FunctionOutput {
    fn from(result: FunctionResult) -> Self {
        Self::Result(result)
    }
}

impl From<Arc<Agent>> for FunctionOutput {
    fn from(agent: Arc<Agent>) -> Self {
        Self::Agent(agent)
    }
}

impl From<Agent> for FunctionOutput {
    fn from(agent: Agent) -> Self {
        Self::Agent(Arc::new(agent))
    }
}

/// A capability: descriptor plus handler
#[derive(Clone)]
pub struct AgentFunction {
    name: String,
    description: Option<String>,
    parameters: Vec<Parameter>,
    handler: Arc<Handler>,
}

impl AgentFunction {
    /// Wrap a synchronous function
    pub fn new<F, R>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(FunctionArgs) -> anyhow::Result<R> + Send + Sync + 'static,
        R: Into<FunctionOutput>,
    {
        let handler = move |args: FunctionArgs| -> BoxFuture<'static, anyhow::Result<FunctionOutput>> {
            let output = f(args).map(Into::into);
            Box::pin(futures::future::ready(output))
        };
        Self::with_handler(name, Arc::new(handler))
    }

    /// Wrap an async function
    pub fn from_async<F, Fut, R>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(FunctionArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
        R: Into<FunctionOutput>,
    {
        let handler = move |args: FunctionArgs| -> BoxFuture<'static, anyhow::Result<FunctionOutput>> {
            let fut = f(args);
            Box::pin(async move { fut.await.map(Into::into) })
        };
        Self::with_handler(name, Arc::new(handler))
    }

    fn with_handler(name: impl Into<String>, handler: Arc<Handler>) -> Self {
        Self {
            name: name.into(),
            description: None,
            parameters: Vec::new(),
            handler,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declare a required parameter
    pub fn param(self, name: impl Into<String>, param_type: ParamType) -> Self {
        self.push_param(Parameter {
            name: name.into(),
            param_type,
            default: None,
        })
    }

    /// Declare a parameter with a default value
    pub fn optional_param(
        self,
        name: impl Into<String>,
        param_type: ParamType,
        default: impl Into<Value>,
    ) -> Self {
        self.push_param(Parameter {
            name: name.into(),
            param_type,
            default: Some(default.into()),
        })
    }

    /// Declare a required parameter by its Rust type name
    pub fn typed_param(self, name: impl Into<String>, type_name: &str) -> Self {
        self.param(name, ParamType::from_type_name(type_name))
    }

    /// Ask the dispatcher for the live context variables
    pub fn with_context_variables(self) -> Self {
        self.param(CONTEXT_VARIABLES_PARAM, ParamType::Object)
    }

    // Redeclaring a name replaces the earlier declaration in place.
    fn push_param(mut self, parameter: Parameter) -> Self {
        match self.parameters.iter_mut().find(|p| p.name == parameter.name) {
            Some(existing) => *existing = parameter,
            None => self.parameters.push(parameter),
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or_default()
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn wants_context_variables(&self) -> bool {
        self.parameters.iter().any(|p| p.name == CONTEXT_VARIABLES_PARAM)
    }

    /// Run the handler
    pub fn invoke(&self, args: FunctionArgs) -> BoxFuture<'static, anyhow::Result<FunctionOutput>> {
        (self.handler)(args)
    }
}

impl fmt::Debug for AgentFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentFunction")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// Build the tool schema the completion endpoint expects for a capability
pub fn function_to_json(function: &AgentFunction) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for parameter in function.parameters() {
        properties.insert(
            parameter.name.clone(),
            json!({ "type": parameter.param_type.as_str() }),
        );
        if parameter.is_required() {
            required.push(Value::String(parameter.name.clone()));
        }
    }

    json!({
        "type": "function",
        "function": {
            "name": function.name(),
            "description": function.description(),
            "parameters": {
                "type": "object",
                "properties": properties,
                "required": required,
            },
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AgentFunction {
        AgentFunction::new("sample", |_| Ok("ok"))
            .with_description("This is a sample function.")
            .param("arg1", ParamType::String)
            .param("arg2", ParamType::Integer)
            .optional_param("arg3", ParamType::Number, 3.14)
    }

    #[test]
    fn test_required_excludes_defaults() {
        let schema = function_to_json(&sample());
        assert_eq!(schema["function"]["parameters"]["required"], json!(["arg1", "arg2"]));
    }

    #[test]
    fn test_schema_shape() {
        let schema = function_to_json(&sample());
        assert_eq!(
            schema,
            json!({
                "type": "function",
                "function": {
                    "name": "sample",
                    "description": "This is a sample function.",
                    "parameters": {
                        "type": "object",
                        "properties": {
                            "arg1": {"type": "string"},
                            "arg2": {"type": "integer"},
                            "arg3": {"type": "number"},
                        },
                        "required": ["arg1", "arg2"],
                    },
                },
            })
        );
    }

    #[test]
    fn test_schema_is_stable() {
        let function = sample();
        assert_eq!(function_to_json(&function), function_to_json(&function));
    }

    #[test]
    fn test_missing_description_is_empty() {
        let function = AgentFunction::new("bare", |_| Ok("ok"));
        let schema = function_to_json(&function);
        assert_eq!(schema["function"]["description"], "");
        assert_eq!(schema["function"]["parameters"]["properties"], json!({}));
        assert_eq!(schema["function"]["parameters"]["required"], json!([]));
    }

    #[test]
    fn test_type_names() {
        assert_eq!(ParamType::from_type_name("&str"), ParamType::String);
        assert_eq!(ParamType::from_type_name("String"), ParamType::String);
        assert_eq!(ParamType::from_type_name("bool"), ParamType::Boolean);
        assert_eq!(ParamType::from_type_name("u32"), ParamType::Integer);
        assert_eq!(ParamType::from_type_name("f64"), ParamType::Number);
        assert_eq!(
            ParamType::from_type_name("std::collections::HashMap<String, Value>"),
            ParamType::Object
        );
        assert_eq!(ParamType::from_type_name("Vec<String>"), ParamType::Array);
        assert_eq!(ParamType::from_type_name("()"), ParamType::Null);
        assert_eq!(ParamType::from_type_name("Uuid"), ParamType::String);
    }

    #[test]
    fn test_redeclared_param_replaces() {
        let function = AgentFunction::new("f", |_| Ok("ok"))
            .param("a", ParamType::String)
            .optional_param("a", ParamType::Integer, 1);

        assert_eq!(function.parameters().len(), 1);
        let schema = function_to_json(&function);
        assert_eq!(schema["function"]["parameters"]["properties"]["a"]["type"], "integer");
        assert_eq!(schema["function"]["parameters"]["required"], json!([]));
    }

    #[test]
    fn test_context_variables_flag() {
        let plain = AgentFunction::new("plain", |_| Ok("ok"));
        assert!(!plain.wants_context_variables());

        let aware = plain.clone().with_context_variables();
        assert!(aware.wants_context_variables());
    }

    #[test]
    fn test_sync_handler_outputs() {
        let handoff = AgentFunction::new("handoff", |_| Ok(crate::agent::Agent::new("Next")));
        match tokio_test::block_on(handoff.invoke(FunctionArgs::new())).unwrap() {
            FunctionOutput::Agent(agent) => assert_eq!(agent.name, "Next"),
            other => panic!("unexpected output: {other:?}"),
        }

        let failing = AgentFunction::new("failing", |_| -> anyhow::Result<String> {
            anyhow::bail!("no luck")
        });
        let err = tokio_test::block_on(failing.invoke(FunctionArgs::new())).unwrap_err();
        assert_eq!(err.to_string(), "no luck");
    }

    #[tokio::test]
    async fn test_async_handler() {
        let function = AgentFunction::from_async("double", |args| async move {
            let n = args.get("n").and_then(Value::as_i64).unwrap_or_default();
            Ok::<_, anyhow::Error>(n * 2)
        });

        let mut args = FunctionArgs::new();
        args.insert("n".into(), json!(21));
        match function.invoke(args).await.unwrap() {
            FunctionOutput::Value(value) => assert_eq!(value, json!(42)),
            other => panic!("unexpected output: {other:?}"),
        }
    }
}
