use async_trait::async_trait;
use futures::stream::Stream;
use std::pin::Pin;
use std::sync::Arc;

pub mod api;
mod client;
pub mod mock;
pub mod providers;
pub mod traffic_log;
pub use api::*;
pub use client::{BoxedStream, Client};
pub use providers::{ClaudeChatModel, ClaudeProvider};

/// Incremental response: one item per provider event, `Err` on transport failure.
pub type ChatStream = Pin<Box<dyn Stream<Item = anyhow::Result<ChatEvent>> + Send>>;

#[async_trait]
pub trait ChatModel {
    fn name(&self) -> &str;

    /// Issue the request and return the event stream.
    /// Fails before yielding anything if the endpoint rejects the request.
    async fn stream_chat(&self, request: &ChatRequest) -> anyhow::Result<ChatStream>;
}

#[async_trait]
impl ChatModel for Arc<dyn ChatModel + Send + Sync> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn stream_chat(&self, request: &ChatRequest) -> anyhow::Result<ChatStream> {
        (**self).stream_chat(request).await
    }
}
