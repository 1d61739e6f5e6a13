//! Streaming session reducer
//!
//! Folds the event stream of one model request into an accumulator,
//! forwarding every text fragment as it arrives.

use futures::StreamExt;
use llm::{ChatEvent, ChatModel, ChatRequest};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::Error;
use crate::ids::SessionId;

/// One fragment of assistant text, delivered in arrival order
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PartialUpdate {
    pub session: SessionId,
    pub fragment: String,
}

/// How a session ended
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed { text: String },
    /// Nothing has been persisted; `partial` is whatever arrived before the failure
    Failed { error: Error, partial: String },
}

/// Accumulator for one in-flight request
#[derive(Debug)]
pub struct StreamingSession {
    id: SessionId,
    accumulated: String,
    fragments: usize,
}

impl StreamingSession {
    pub fn new() -> Self {
        Self {
            id: SessionId::new(),
            accumulated: String::new(),
            fragments: 0,
        }
    }

    /// Append a fragment and produce the update to forward
    pub fn push(&mut self, fragment: &str) -> PartialUpdate {
        self.accumulated.push_str(fragment);
        self.fragments += 1;
        PartialUpdate {
            session: self.id.clone(),
            fragment: fragment.to_string(),
        }
    }

    /// Event stream exhausted. An empty response is a failure since it
    /// cannot be persisted.
    pub fn finish(self) -> SessionOutcome {
        if self.accumulated.is_empty() {
            return SessionOutcome::Failed {
                error: Error::Endpoint("model returned an empty response".into()),
                partial: self.accumulated,
            };
        }
        SessionOutcome::Completed {
            text: self.accumulated,
        }
    }

    pub fn fail(self, error: Error) -> SessionOutcome {
        SessionOutcome::Failed {
            error,
            partial: self.accumulated,
        }
    }

    /// Issue `request` and fold its stream, handing each update to `on_update`.
    pub async fn run<M, F>(mut self, model: &M, request: &ChatRequest, mut on_update: F) -> SessionOutcome
    where
        M: ChatModel + Sync + ?Sized,
        F: FnMut(PartialUpdate),
    {
        debug!(session = %self.id, model = model.name(), "Starting session");

        let mut stream = match model.stream_chat(request).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(session = %self.id, "Request rejected: {:#}", e);
                return self.fail(Error::endpoint(e));
            }
        };

        while let Some(item) = stream.next().await {
            match item {
                Ok(ChatEvent::TextDelta { text }) => on_update(self.push(&text)),
                Ok(_) => {}
                Err(e) => {
                    warn!(session = %self.id, fragments = self.fragments, "Stream failed: {:#}", e);
                    return self.fail(Error::endpoint(e));
                }
            }
        }

        llm::traffic_log::log_stream_end(model.name(), self.fragments, self.accumulated.chars().count());
        self.finish()
    }
}

impl Default for StreamingSession {
    fn default() -> Self {
        Self::new()
    }
}
