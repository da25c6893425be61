//! Turn loop - drives the completion endpoint until the conversation settles
//!
//! Each turn asks the active agent's model for a completion, appends it to
//! the history, and, when the model requested tools, dispatches them and folds
//! their results (messages, context variables, handoff) back into the run.
//! The run ends when a completion requests no tools, tool execution is
//! disabled, or the turn ceiling is reached.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::agent::Agent;
use crate::channel::{EventSender, RunStream, StreamEvent};
use crate::completion::{build_request, CompletionClient, CompletionRequest};
use crate::config::RunOptions;
use crate::dispatch::handle_tool_calls;
use crate::error::{Result, SwarmError};
use crate::merge::{into_message, merge_chunk, seed_message};
use crate::openai::OpenAiClient;
use crate::session::Session;
use crate::types::{Message, Response};

/// Result of [`Swarm::run_with`]
pub enum RunOutput {
    Response(Response),
    Stream(RunStream),
}

/// The orchestrator.
///
/// Holds only the completion client; every run owns its own history and
/// context variables, so one `Swarm` can serve concurrent runs.
#[derive(Clone)]
pub struct Swarm {
    client: Arc<dyn CompletionClient>,
}

impl Swarm {
    pub fn new(client: impl CompletionClient + 'static) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    pub fn with_client(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    /// Orchestrator backed by [`OpenAiClient`] configured from the environment
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(OpenAiClient::from_env()?))
    }

    /// Run to completion and return the final response
    #[instrument(skip_all, fields(agent = %agent.name, messages = messages.len()))]
    pub async fn run(
        &self,
        agent: Arc<Agent>,
        messages: Vec<Message>,
        options: RunOptions,
    ) -> Result<Response> {
        let mut session = Session::new(agent, messages, &options);
        info!(run_id = %session.id, "Run started");

        while session.has_turns_left() {
            let request = self.prepare(&session, &options, false);
            let message = self.client.complete(request).await?;

            if !self.conclude_turn(&mut session, message, &options).await? {
                break;
            }
        }

        info!(run_id = %session.id, turns = session.turns_taken(), "Run finished");
        Ok(session.into_response())
    }

    /// Run in the background and stream its events
    pub fn run_stream(&self, agent: Arc<Agent>, messages: Vec<Message>, options: RunOptions) -> RunStream {
        let (tx, stream) = RunStream::channel();
        let swarm = self.clone();

        tokio::spawn(async move {
            match swarm.drive_stream(agent, messages, options, &tx).await {
                Ok(()) => {}
                Err(SwarmError::Channel(_)) => debug!("Stream consumer went away, run stopped"),
                Err(err) => tx.fail(err),
            }
        });

        stream
    }

    /// Run honoring `options.stream`
    pub async fn run_with(
        &self,
        agent: Arc<Agent>,
        messages: Vec<Message>,
        options: RunOptions,
    ) -> Result<RunOutput> {
        if options.stream {
            Ok(RunOutput::Stream(self.run_stream(agent, messages, options)))
        } else {
            self.run(agent, messages, options).await.map(RunOutput::Response)
        }
    }

    #[instrument(skip_all, fields(agent = %agent.name, messages = messages.len()))]
    async fn drive_stream(
        &self,
        agent: Arc<Agent>,
        messages: Vec<Message>,
        options: RunOptions,
        tx: &EventSender,
    ) -> Result<()> {
        let mut session = Session::new(agent, messages, &options);
        info!(run_id = %session.id, "Streamed run started");

        while session.has_turns_left() {
            let request = self.prepare(&session, &options, true);
            let mut deltas = self.client.complete_stream(request).await?;
            let sender = session.active_agent().name.clone();

            tx.send(StreamEvent::Start)?;
            let mut accumulator = seed_message(&sender);
            while let Some(delta) = deltas.next().await {
                let mut delta = delta?;
                if delta.get("role").and_then(Value::as_str) == Some("assistant") {
                    delta.insert("sender".into(), Value::String(sender.clone()));
                }
                tx.send(StreamEvent::Delta(delta.clone()))?;

                delta.remove("sender");
                accumulator = merge_chunk(accumulator, delta)?;
            }
            tx.send(StreamEvent::End)?;

            let message = into_message(accumulator)?;
            if !self.conclude_turn(&mut session, message, &options).await? {
                break;
            }
        }

        info!(run_id = %session.id, turns = session.turns_taken(), "Streamed run finished");
        tx.send(StreamEvent::Response(session.into_response()))?;
        Ok(())
    }

    fn prepare(&self, session: &Session, options: &RunOptions, stream: bool) -> CompletionRequest {
        let request = build_request(
            session.active_agent(),
            session.history(),
            session.context_variables(),
            options.model_override.as_deref(),
            stream,
        );
        if options.debug {
            debug!(
                run_id = %session.id,
                agent = session.active_agent().name.as_str(),
                messages = ?request.messages,
                "Getting chat completion"
            );
        }
        request
    }

    /// Record a completion and run the tools it asks for.
    /// Returns whether the loop should continue.
    async fn conclude_turn(
        &self,
        session: &mut Session,
        message: Message,
        options: &RunOptions,
    ) -> Result<bool> {
        if options.debug {
            debug!(run_id = %session.id, ?message, "Received completion");
        }
        let tool_calls = session.record_completion(message);

        let tool_calls = match tool_calls {
            Some(calls) if options.execute_tools => calls,
            _ => {
                session.finish_turn();
                if options.debug {
                    debug!(run_id = %session.id, "Ending turn");
                }
                return Ok(false);
            }
        };

        let agent = Arc::clone(session.active_agent());
        let partial = handle_tool_calls(
            &tool_calls,
            &agent.functions,
            session.context_variables(),
            options.debug,
        )
        .await?;

        session.apply(partial);
        session.finish_turn();
        Ok(true)
    }
}
