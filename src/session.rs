//! Run-scoped state: active agent, history and context variables

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::agent::Agent;
use crate::config::RunOptions;
use crate::dispatch::PartialResponse;
use crate::types::{ContextVariables, Message, Response, ToolCall};

/// State owned by a single run
pub struct Session {
    /// Run identifier, used for tracing only
    pub id: Uuid,
    active_agent: Arc<Agent>,
    history: Vec<Message>,
    /// History length when the run started
    init_len: usize,
    context_variables: ContextVariables,
    turns_taken: usize,
    max_turns: Option<usize>,
}

impl Session {
    /// Start a run over a copy of the caller's history and context
    pub fn new(agent: Arc<Agent>, messages: Vec<Message>, options: &RunOptions) -> Self {
        let init_len = messages.len();
        Self {
            id: Uuid::new_v4(),
            active_agent: agent,
            history: messages,
            init_len,
            context_variables: options.context_variables.clone(),
            turns_taken: 0,
            max_turns: options.max_turns,
        }
    }

    pub fn active_agent(&self) -> &Arc<Agent> {
        &self.active_agent
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn context_variables(&self) -> &ContextVariables {
        &self.context_variables
    }

    pub fn turns_taken(&self) -> usize {
        self.turns_taken
    }

    /// Whether another turn fits under the ceiling
    pub fn has_turns_left(&self) -> bool {
        self.max_turns.map_or(true, |max| self.turns_taken < max)
    }

    /// Append the active agent's completion and return the tool calls it requests
    pub fn record_completion(&mut self, mut message: Message) -> Option<Vec<ToolCall>> {
        message.sender = Some(self.active_agent.name.clone());
        if message.tool_calls.as_ref().is_some_and(Vec::is_empty) {
            message.tool_calls = None;
        }
        let tool_calls = message.tool_calls.clone();
        self.history.push(message);
        tool_calls
    }

    /// Fold a dispatched batch into the run
    pub fn apply(&mut self, partial: PartialResponse) {
        self.history.extend(partial.messages);
        self.context_variables.extend(partial.context_variables);

        if let Some(agent) = partial.agent {
            info!(
                run_id = %self.id,
                from = self.active_agent.name.as_str(),
                to = agent.name.as_str(),
                "Handing off"
            );
            self.active_agent = agent;
        }
    }

    pub fn finish_turn(&mut self) {
        self.turns_taken += 1;
    }

    /// Close the run, keeping only what it appended
    pub fn into_response(mut self) -> Response {
        Response {
            messages: self.history.split_off(self.init_len),
            agent: self.active_agent,
            context_variables: self.context_variables,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use serde_json::json;

    fn create_test_session(max_turns: Option<usize>) -> Session {
        let mut options = RunOptions::new().with_context_variable("name", "James");
        options.max_turns = max_turns;
        Session::new(
            Agent::new("Front Desk").into_shared(),
            vec![Message::user("Hello")],
            &options,
        )
    }

    #[test]
    fn test_session_creation() {
        let session = create_test_session(None);
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.turns_taken(), 0);
        assert_eq!(session.context_variables()["name"], "James");
        assert!(session.has_turns_left());
    }

    #[test]
    fn test_turn_ceiling() {
        let mut session = create_test_session(Some(1));
        assert!(session.has_turns_left());
        session.finish_turn();
        assert!(!session.has_turns_left());

        let session = create_test_session(Some(0));
        assert!(!session.has_turns_left());
    }

    #[test]
    fn test_record_completion_tags_sender() {
        let mut session = create_test_session(None);
        let mut message = Message::assistant("Hi!");
        message.sender = Some("Impostor".into());
        message.tool_calls = Some(Vec::new());

        assert!(session.record_completion(message).is_none());
        let last = session.history().last().unwrap();
        assert_eq!(last.sender.as_deref(), Some("Front Desk"));
        assert!(last.tool_calls.is_none());
    }

    #[test]
    fn test_apply_switches_agent_and_merges_context() {
        let mut session = create_test_session(None);
        let next = Agent::new("Billing").into_shared();

        let mut partial = PartialResponse::default();
        partial.messages.push(Message::tool("c1", "transfer", r#"{"assistant":"Billing"}"#));
        partial.context_variables.insert("name".into(), json!("Jim"));
        partial.context_variables.insert("ticket".into(), json!(7));
        partial.agent = Some(next.clone());
        session.apply(partial);

        assert!(Arc::ptr_eq(session.active_agent(), &next));
        assert_eq!(session.context_variables()["name"], "Jim");
        assert_eq!(session.context_variables()["ticket"], 7);
        assert_eq!(session.history().last().unwrap().role, Role::Tool);
    }

    #[test]
    fn test_response_excludes_prior_history() {
        let mut session = create_test_session(None);
        session.record_completion(Message::assistant("Hi!"));

        let response = session.into_response();
        assert_eq!(response.messages.len(), 1);
        assert_eq!(response.messages[0].content.as_deref(), Some("Hi!"));
        assert_eq!(response.agent.name, "Front Desk");
    }
}
