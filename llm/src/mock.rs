//! Scripted `ChatModel` for tests and offline runs.
//!
//! Each `stream_chat` call consumes the next queued reply. Requests are
//! recorded so callers can assert on what was submitted.

use crate::{ChatEvent, ChatModel, ChatRequest, ChatStream};
use async_trait::async_trait;
use futures::stream;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Clone, Debug)]
pub enum ScriptedReply {
    /// Stream these fragments, framed by start/stop events, then end normally
    Fragments(Vec<String>),
    /// Stream these fragments, then yield a transport error
    FailAfter(Vec<String>, String),
    /// Reject the request before any event is produced
    Reject(String),
}

impl ScriptedReply {
    pub fn fragments<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ScriptedReply::Fragments(fragments.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<ScriptedReply>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedModel {
    pub fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, reply: ScriptedReply) {
        self.replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(reply);
    }

    /// Requests received so far, oldest first
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

fn framed(fragments: Vec<String>) -> Vec<anyhow::Result<ChatEvent>> {
    let mut events = vec![
        Ok(ChatEvent::MessageStart {
            model: "scripted".to_string(),
        }),
        Ok(ChatEvent::Ping),
    ];
    events.extend(fragments.into_iter().map(|text| Ok(ChatEvent::TextDelta { text })));
    events
}

#[async_trait]
impl ChatModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream_chat(&self, request: &ChatRequest) -> anyhow::Result<ChatStream> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let reply = self
            .replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("No scripted reply left"))?;

        let events = match reply {
            ScriptedReply::Fragments(fragments) => {
                let mut events = framed(fragments);
                events.push(Ok(ChatEvent::MessageDelta {
                    stop_reason: Some("end_turn".to_string()),
                }));
                events.push(Ok(ChatEvent::MessageStop));
                events
            }
            ScriptedReply::FailAfter(fragments, error) => {
                let mut events = framed(fragments);
                events.push(Err(anyhow::anyhow!(error)));
                events
            }
            ScriptedReply::Reject(error) => return Err(anyhow::anyhow!(error)),
        };

        Ok(Box::pin(stream::iter(events)))
    }
}
