//! OpenAI-compatible chat-completion client

use std::collections::VecDeque;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use reqwest::{Client, RequestBuilder, Response as HttpResponse};
use serde_json::Value;
use tracing::{debug, info};

use crate::completion::{CompletionClient, CompletionRequest, DeltaStream, TransportError};
use crate::config::ClientConfig;
use crate::error::{Result, SwarmError};
use crate::merge::Delta;
use crate::types::Message;

const COMPLETIONS_PATH: &str = "chat/completions";
const DONE_MARKER: &str = "[DONE]";

/// Client for `/chat/completions` on OpenAI or any compatible server
#[derive(Clone)]
pub struct OpenAiClient {
    http: Client,
    config: ClientConfig,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| SwarmError::Config("OPENAI_API_KEY is not set".into()))?;

        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| SwarmError::Config(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            config,
            api_key,
        })
    }

    /// Build from `OPENAI_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env())
    }

    fn endpoint(&self) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        format!("{base}/{COMPLETIONS_PATH}")
    }

    fn post(&self, request: &CompletionRequest) -> RequestBuilder {
        let mut builder = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(request);
        if let Some(org) = &self.config.organization {
            builder = builder.header("OpenAI-Organization", org);
        }
        builder
    }

    async fn send(&self, request: &CompletionRequest) -> Result<HttpResponse, TransportError> {
        info!(
            model = request.model.as_str(),
            messages = request.messages.len(),
            tools = request.tools.as_ref().map_or(0, Vec::len),
            stream = request.stream,
            "Sending chat completion request"
        );

        let response = self.post(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, mut request: CompletionRequest) -> Result<Message, TransportError> {
        request.stream = false;
        let body: Value = self.send(&request).await?.json().await?;
        debug!("Received chat completion");
        parse_completion(body)
    }

    async fn complete_stream(&self, mut request: CompletionRequest) -> Result<DeltaStream, TransportError> {
        request.stream = true;
        let response = self.send(&request).await?;
        Ok(decode_event_stream(response.bytes_stream()))
    }
}

/// Pull `choices[0].message` out of a completion body
pub(crate) fn parse_completion(body: Value) -> Result<Message, TransportError> {
    let message = body
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .cloned()
        .ok_or_else(|| TransportError::InvalidResponse("missing choices[0].message".into()))?;

    serde_json::from_value(message).map_err(|e| TransportError::InvalidResponse(e.to_string()))
}

/// Pull `choices[0].delta` out of one streamed chunk. Chunks without a
/// choice (usage reports) yield nothing.
pub(crate) fn parse_chunk(data: &str) -> Result<Option<Delta>, TransportError> {
    let chunk: Value = serde_json::from_str(data)
        .map_err(|e| TransportError::Stream(format!("Failed to parse chunk: {e}")))?;

    if let Some(error) = chunk.get("error") {
        return Err(TransportError::Stream(error.to_string()));
    }

    Ok(chunk
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(Value::as_object)
        .cloned())
}

/// Incremental Server-Sent Events decoder; yields the `data` payload of each event
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    pending: Vec<u8>,
    data: Vec<String>,
}

impl SseDecoder {
    pub(crate) fn feed(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);

        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\r', '\n']);

            if line.is_empty() {
                events.extend(self.take_event());
            } else if let Some(data) = line.strip_prefix("data:") {
                self.data.push(data.trim_start().to_string());
            }
            // comments, event:, id: and retry: are not used
        }
        events
    }

    /// Flush whatever is left once the body ends
    pub(crate) fn finish(&mut self) -> Option<String> {
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&rest);
            if let Some(data) = line.trim_end().strip_prefix("data:") {
                self.data.push(data.trim_start().to_string());
            }
        }
        self.take_event()
    }

    fn take_event(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        let event = self.data.join("\n");
        self.data.clear();
        Some(event)
    }
}

struct EventStreamState {
    body: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    decoder: SseDecoder,
    queue: VecDeque<String>,
    finished: bool,
}

fn decode_event_stream<S>(body: S) -> DeltaStream
where
    S: Stream<Item = reqwest::Result<Bytes>> + Send + 'static,
{
    let state = EventStreamState {
        body: Box::pin(body),
        decoder: SseDecoder::default(),
        queue: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.queue.pop_front() {
                if event == DONE_MARKER {
                    return None;
                }
                match parse_chunk(&event) {
                    Ok(Some(delta)) => return Some((Ok(delta), state)),
                    Ok(None) => continue,
                    Err(err) => {
                        state.queue.clear();
                        state.finished = true;
                        return Some((Err(err), state));
                    }
                }
            }

            if state.finished {
                return None;
            }

            match state.body.next().await {
                Some(Ok(bytes)) => {
                    let events = state.decoder.feed(&bytes);
                    state.queue.extend(events);
                }
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(TransportError::Network(err)), state));
                }
                None => {
                    state.finished = true;
                    let rest = state.decoder.finish();
                    state.queue.extend(rest);
                }
            }
        }
    })
    .boxed()
}
