//! Test doubles for the completion endpoint

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::completion::{CompletionClient, CompletionRequest, DeltaStream, TransportError};
use crate::merge::Delta;
use crate::types::{Message, ToolCall};

pub const DEFAULT_RESPONSE_CONTENT: &str = "sample response content";

enum Scripted {
    Reply(Message),
    Fail(TransportError),
    /// Stream the first `after` fragments of the message, then fail
    BreakOff { message: Message, after: usize },
}

/// Scripted completion client.
///
/// Answers with queued replies or failures in order, then with the default
/// message. Streams split the same messages into fragments of `chunk_size`
/// characters.
pub struct MockCompletionClient {
    script: Mutex<VecDeque<Scripted>>,
    default: Message,
    requests: Mutex<Vec<CompletionRequest>>,
    chunk_size: usize,
}

impl MockCompletionClient {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            default: assistant_message(DEFAULT_RESPONSE_CONTENT),
            requests: Mutex::new(Vec::new()),
            chunk_size: 4,
        }
    }

    pub fn with_default(mut self, message: Message) -> Self {
        self.default = message;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_responses(self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.script.lock().extend(messages.into_iter().map(Scripted::Reply));
        self
    }

    /// Queue a request that fails with status `status`
    pub fn with_failure(self, status: u16, body: &str) -> Self {
        self.script.lock().push_back(Scripted::Fail(TransportError::Status {
            status,
            body: body.to_string(),
        }));
        self
    }

    /// Queue a reply whose stream breaks after `after` fragments.
    /// A blocking request for it fails outright.
    pub fn with_broken_stream(self, message: Message, after: usize) -> Self {
        self.script
            .lock()
            .push_back(Scripted::BreakOff { message, after });
        self
    }

    /// Every request received so far
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    fn next_script(&self, request: CompletionRequest) -> Scripted {
        self.requests.lock().push(request);
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Scripted::Reply(self.default.clone()))
    }
}

impl Default for MockCompletionClient {
    fn default() -> Self {
        Self::new()
    }
}

fn broken_stream() -> TransportError {
    TransportError::Stream("connection reset mid-stream".into())
}

#[async_trait]
impl CompletionClient for MockCompletionClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Message, TransportError> {
        match self.next_script(request) {
            Scripted::Reply(message) => Ok(message),
            Scripted::Fail(err) => Err(err),
            Scripted::BreakOff { .. } => Err(broken_stream()),
        }
    }

    async fn complete_stream(&self, request: CompletionRequest) -> Result<DeltaStream, TransportError> {
        match self.next_script(request) {
            Scripted::Reply(message) => {
                let deltas = message_deltas(&message, self.chunk_size);
                Ok(stream::iter(deltas.into_iter().map(Ok)).boxed())
            }
            Scripted::Fail(err) => Err(err),
            Scripted::BreakOff { message, after } => {
                let deltas = message_deltas(&message, self.chunk_size);
                let items = deltas
                    .into_iter()
                    .take(after)
                    .map(Ok)
                    .chain(std::iter::once(Err(broken_stream())));
                Ok(stream::iter(items).boxed())
            }
        }
    }
}

/// Plain assistant reply
pub fn assistant_message(content: &str) -> Message {
    Message::assistant(content)
}

/// Assistant reply requesting the given `(name, arguments)` tool calls
pub fn tool_call_message(calls: &[(&str, Value)]) -> Message {
    let mut message = Message::assistant("");
    message.tool_calls = Some(
        calls
            .iter()
            .map(|(name, args)| {
                ToolCall::new(format!("call_{}", Uuid::new_v4().simple()), *name, args.to_string())
            })
            .collect(),
    );
    message
}

fn pieces(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

fn as_delta(value: Value) -> Delta {
    match value {
        Value::Object(map) => map,
        _ => Delta::new(),
    }
}

/// Split a message into the fragments a streaming endpoint would send
pub fn message_deltas(message: &Message, chunk_size: usize) -> Vec<Delta> {
    let mut deltas = vec![as_delta(json!({ "role": "assistant" }))];

    if let Some(content) = message.content.as_deref() {
        deltas.extend(
            pieces(content, chunk_size)
                .into_iter()
                .map(|piece| as_delta(json!({ "content": piece }))),
        );
    }

    for (index, call) in message.tool_calls.iter().flatten().enumerate() {
        deltas.push(as_delta(json!({
            "tool_calls": [{
                "index": index,
                "id": call.id,
                "type": call.kind,
                "function": { "name": call.function.name, "arguments": "" },
            }]
        })));
        deltas.extend(pieces(&call.function.arguments, chunk_size).into_iter().map(|piece| {
            as_delta(json!({
                "tool_calls": [{ "index": index, "function": { "arguments": piece } }]
            }))
        }));
    }

    deltas
}
