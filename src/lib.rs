//! # Swarm
//!
//! Lightweight multi-agent orchestration over a chat-completion endpoint.
//!
//! Agents are plain configuration: a name, a model, instructions and a set
//! of callable capabilities. A capability may hand the conversation to
//! another agent by returning it; the orchestrator then keeps going with the
//! new agent until a completion asks for no more tools.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                              SWARM                                   │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐               │
//! │  │   Session    │  │ Delta Merger │  │  Dispatcher  │               │
//! │  └──────────────┘  └──────────────┘  └──────────────┘               │
//! └──────────┬───────────────────────────────────────┬──────────────────┘
//!            │                                       │
//!            ▼                                       ▼
//!   ┌──────────────────┐                    ┌─────────────────┐
//!   │ CompletionClient │                    │ Agent functions │
//!   │ (OpenAI / mock)  │                    │   + handoffs    │
//!   └──────────────────┘                    └─────────────────┘
//! ```
//!
//! ## Key Concepts
//!
//! - **Agent**: Instructions, model and capabilities; immutable during a run
//! - **AgentFunction**: A named capability the model can call
//! - **Context variables**: Shared key/value state threaded through a run
//! - **Handoff**: A capability returning an agent makes it the active agent
//! - **Response**: Messages appended by a run, the final agent and context

pub mod agent;
pub mod channel;
pub mod completion;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod function;
pub mod logging;
pub mod merge;
pub mod openai;
pub mod orchestrator;
pub mod session;
pub mod types;

#[cfg(any(test, feature = "test-util"))]
pub mod test_support;

pub use agent::{Agent, Instructions};
pub use channel::{RunStream, StreamEvent};
pub use completion::{CompletionClient, CompletionRequest};
pub use config::{ClientConfig, RunOptions};
pub use error::{Result, SwarmError};
pub use function::{function_to_json, AgentFunction, FunctionOutput, FunctionResult, ParamType, Parameter};
pub use merge::merge_chunk;
pub use openai::OpenAiClient;
pub use orchestrator::{RunOutput, Swarm};
pub use types::{ContextVariables, Message, Response, Role, ToolCall};
