use crate::client::Client;
use crate::traffic_log;

use super::api::{Delta, MessagesRequest, StreamEvent};
use crate::{ChatEvent, ChatModel, ChatRequest, ChatStream};
use async_trait::async_trait;
use futures::StreamExt;
use tracing::warn;

pub struct ClaudeChatModel {
    client: Client,
    base_url: String,
    model_name: String,
}

impl ClaudeChatModel {
    pub fn new(client: Client, base_url: String, model_name: String) -> Self {
        ClaudeChatModel {
            client,
            base_url,
            model_name,
        }
    }
}

/// Map one Claude stream event onto the provider-neutral event.
/// An `error` event terminates the response, so it becomes an `Err`.
pub(crate) fn to_chat_event(event: StreamEvent) -> anyhow::Result<ChatEvent> {
    Ok(match event {
        StreamEvent::MessageStart { message } => ChatEvent::MessageStart {
            model: message.model,
        },
        StreamEvent::ContentBlockDelta { delta, .. } => match delta {
            Delta::TextDelta { text } => ChatEvent::TextDelta { text },
            Delta::InputJsonDelta { .. } | Delta::ThinkingDelta { .. } | Delta::Unknown => {
                ChatEvent::Other
            }
        },
        StreamEvent::MessageDelta { delta, .. } => ChatEvent::MessageDelta {
            stop_reason: delta.stop_reason,
        },
        StreamEvent::MessageStop => ChatEvent::MessageStop,
        StreamEvent::Ping => ChatEvent::Ping,
        StreamEvent::Error { error } => {
            warn!(
                "Received error event: {} - {}",
                error.error_type, error.message
            );
            return Err(anyhow::anyhow!(
                "Claude stream error ({}): {}",
                error.error_type,
                error.message
            ));
        }
        StreamEvent::ContentBlockStart { .. }
        | StreamEvent::ContentBlockStop { .. }
        | StreamEvent::Unknown => ChatEvent::Other,
    })
}

#[async_trait]
impl ChatModel for ClaudeChatModel {
    fn name(&self) -> &str {
        &self.model_name
    }

    async fn stream_chat(&self, request: &ChatRequest) -> anyhow::Result<ChatStream> {
        let url = format!("{}/messages", self.base_url);

        let api_request = MessagesRequest::from_chat_request(&self.model_name, request, true);
        traffic_log::log_stream_start(&self.model_name, &api_request);

        let streamed_response = match self
            .client
            .post_stream(url, &api_request, |line: &str| line.strip_prefix("data: "))
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                traffic_log::log_error(&self.model_name, &e.to_string());
                return Err(e);
            }
        };

        let model_name = self.model_name.clone();
        let chunk_stream = streamed_response.map(move |item: anyhow::Result<StreamEvent>| {
            let mapped = item.and_then(to_chat_event);
            if let Err(e) = &mapped {
                traffic_log::log_error(&model_name, &e.to_string());
            }
            mapped
        });

        Ok(Box::pin(chunk_stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> StreamEvent {
        serde_json::from_str(line).unwrap()
    }

    #[test]
    fn test_text_delta_becomes_fragment() {
        let event = parse(
            r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"lo, "}}"#,
        );
        assert_eq!(to_chat_event(event).unwrap(), ChatEvent::text("lo, "));
    }

    #[test]
    fn test_lifecycle_events_carry_no_text() {
        for line in [
            r#"{"type":"ping"}"#,
            r#"{"type":"message_stop"}"#,
            r#"{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#,
            r#"{"type":"content_block_stop","index":0}"#,
            r#"{"type":"message_delta","delta":{"stop_reason":"end_turn","stop_sequence":null},"usage":{"output_tokens":3}}"#,
        ] {
            let event = to_chat_event(parse(line)).unwrap();
            assert!(event.as_text().is_none(), "{line} should not carry text");
        }
    }

    #[test]
    fn test_stop_reason_is_kept() {
        let event = parse(
            r#"{"type":"message_delta","delta":{"stop_reason":"max_tokens","stop_sequence":null},"usage":null}"#,
        );
        assert_eq!(
            to_chat_event(event).unwrap(),
            ChatEvent::MessageDelta {
                stop_reason: Some("max_tokens".to_string())
            }
        );
    }

    #[test]
    fn test_error_event_is_an_error() {
        let event = parse(
            r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
        );
        let err = to_chat_event(event).unwrap_err();
        assert!(err.to_string().contains("Overloaded"));
    }
}
