//! Event channel for streamed runs

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::{Result, SwarmError};
use crate::merge::Delta;
use crate::types::Response;

/// What a streamed run emits
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A completion is about to stream
    Start,
    /// One fragment of the completion, as received
    Delta(Delta),
    /// The completion finished streaming
    End,
    /// The run is over
    Response(Response),
}

impl StreamEvent {
    /// Wire form: `{"delim":"start"}`, the raw fragment, `{"delim":"end"}`
    /// or `{"response":{...}}`
    pub fn to_json(&self) -> Value {
        match self {
            Self::Start => json!({ "delim": "start" }),
            Self::Delta(delta) => Value::Object(delta.clone()),
            Self::End => json!({ "delim": "end" }),
            Self::Response(response) => json!({
                "response": {
                    "messages": response.messages,
                    "agent": response.agent.name,
                    "context_variables": response.context_variables,
                }
            }),
        }
    }
}

/// Channel errors
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel is closed")]
    Closed,
}

/// Producer side, owned by the running loop
#[derive(Clone)]
pub(crate) struct EventSender {
    tx: mpsc::UnboundedSender<Result<StreamEvent>>,
}

impl EventSender {
    pub(crate) fn send(&self, event: StreamEvent) -> Result<(), ChannelError> {
        self.tx.send(Ok(event)).map_err(|_| ChannelError::Closed)
    }

    /// Deliver the error that ended the run
    pub(crate) fn fail(&self, error: SwarmError) {
        let _ = self.tx.send(Err(error));
    }
}

/// Consumer side of a streamed run.
///
/// Yields events until the final [`StreamEvent::Response`], or a single
/// error if the run fails. Dropping it stops the run at its next event.
pub struct RunStream {
    inner: UnboundedReceiverStream<Result<StreamEvent>>,
}

impl RunStream {
    pub(crate) fn channel() -> (EventSender, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            EventSender { tx },
            Self {
                inner: UnboundedReceiverStream::new(rx),
            },
        )
    }

    /// Drain the stream and return the final response
    pub async fn into_response(mut self) -> Result<Response> {
        while let Some(event) = self.next().await {
            if let StreamEvent::Response(response) = event? {
                return Ok(response);
            }
        }
        Err(ChannelError::Closed.into())
    }
}

impl Stream for RunStream {
    type Item = Result<StreamEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use crate::types::{ContextVariables, Message};

    fn response() -> Response {
        Response {
            messages: vec![Message::assistant("done")],
            agent: Agent::new("Closer").into_shared(),
            context_variables: ContextVariables::new(),
        }
    }

    #[test]
    fn test_event_wire_form() {
        assert_eq!(StreamEvent::Start.to_json(), json!({"delim": "start"}));
        assert_eq!(StreamEvent::End.to_json(), json!({"delim": "end"}));

        let wire = StreamEvent::Response(response()).to_json();
        assert_eq!(wire["response"]["agent"], "Closer");
        assert_eq!(wire["response"]["messages"][0]["content"], "done");
    }

    #[tokio::test]
    async fn test_into_response() {
        let (tx, stream) = RunStream::channel();
        tx.send(StreamEvent::Start).unwrap();
        tx.send(StreamEvent::End).unwrap();
        tx.send(StreamEvent::Response(response())).unwrap();

        let response = stream.into_response().await.unwrap();
        assert_eq!(response.agent.name, "Closer");
    }

    #[tokio::test]
    async fn test_error_is_delivered() {
        let (tx, stream) = RunStream::channel();
        tx.send(StreamEvent::Start).unwrap();
        tx.fail(SwarmError::Config("boom".into()));
        drop(tx);

        let err = stream.into_response().await.unwrap_err();
        assert!(matches!(err, SwarmError::Config(_)));
    }

    #[tokio::test]
    async fn test_closed_without_response() {
        let (tx, stream) = RunStream::channel();
        drop(tx);
        let err = stream.into_response().await.unwrap_err();
        assert!(matches!(err, SwarmError::Channel(ChannelError::Closed)));
    }

    #[test]
    fn test_send_after_drop() {
        let (tx, stream) = RunStream::channel();
        drop(stream);
        assert!(matches!(tx.send(StreamEvent::Start), Err(ChannelError::Closed)));
    }
}
