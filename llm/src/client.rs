use anyhow::Context;
use bytes::Bytes;
use futures::stream::{self, Stream};
use futures::StreamExt;
use reqwest::header::HeaderMap;
use serde::{Serialize, de::DeserializeOwned};
use std::{fmt::Debug, pin::Pin};
use tracing::{Level, event, instrument, warn};

#[derive(Clone)]
pub struct Client {
    client: reqwest::Client,
}

pub type BoxedStream<T> = Pin<Box<dyn Stream<Item = T> + Send>>;

impl Client {
    pub fn new() -> Self {
        Client {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_headers(headers: HeaderMap) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Client { client })
    }

    /// POST `request` as JSON and decode the response body as a line-oriented
    /// event stream. `process` selects the payload of each line (e.g. strips an
    /// SSE `data: ` prefix) and returns `None` for lines to skip.
    #[instrument(level = "trace", skip(self, request, process))]
    pub async fn post_stream<U, S, F, T>(
        &self,
        url: U,
        request: &S,
        process: F,
    ) -> anyhow::Result<BoxedStream<anyhow::Result<T>>>
    where
        U: reqwest::IntoUrl + Debug,
        S: Serialize + Sized,
        T: DeserializeOwned + Send + 'static,
        F: Fn(&str) -> Option<&str> + 'static + Send,
    {
        let response = self.client.post(url).json(request).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(anyhow::anyhow!(
                "Request failed with status {}: {}",
                status,
                error_body
            ));
        }
        event!(Level::TRACE, status = %response.status(), "stream opened");

        Ok(decode_lines(response.bytes_stream(), process))
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

/// Reassemble newline-delimited payloads from arbitrarily split byte chunks.
///
/// A read error is forwarded as an `Err` item; lines that fail to parse are
/// logged and skipped.
pub(crate) fn decode_lines<B, E, F, T>(bytes: B, process: F) -> BoxedStream<anyhow::Result<T>>
where
    B: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<&str> + 'static + Send,
    T: DeserializeOwned + Send + 'static,
{
    let decoded = bytes.scan(Vec::<u8>::new(), move |buffer, chunk| {
        let items: Vec<anyhow::Result<T>> = match chunk {
            Err(e) => vec![Err(anyhow::Error::new(e).context("Error reading response stream"))],
            Ok(chunk) => {
                buffer.extend_from_slice(&chunk);

                let mut items = Vec::new();
                let mut start = 0;
                while let Some(offset) = buffer[start..].iter().position(|b| *b == b'\n') {
                    let end = start + offset;
                    let line = String::from_utf8_lossy(&buffer[start..end]);
                    start = end + 1;

                    let Some(payload) = process(line.trim_end_matches('\r')) else {
                        continue;
                    };
                    if payload.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<T>(payload) {
                        Ok(item) => items.push(Ok(item)),
                        Err(e) => warn!("Failed to parse stream line: {}: {}", payload, e),
                    }
                }

                // Keep the incomplete tail for the next chunk
                buffer.drain(..start);
                items
            }
        };
        futures::future::ready(Some(items))
    });

    Box::pin(decoded.flat_map(stream::iter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct TestEvent {
        id: u32,
        text: String,
    }

    fn data_prefix(line: &str) -> Option<&str> {
        line.strip_prefix("data: ")
    }

    async fn collect(chunks: Vec<Result<Bytes, std::io::Error>>) -> Vec<anyhow::Result<TestEvent>> {
        decode_lines(stream::iter(chunks), data_prefix).collect().await
    }

    #[tokio::test]
    async fn test_complete_lines_in_one_chunk() {
        let data = "data: {\"id\":1,\"text\":\"hello\"}\ndata: {\"id\":2,\"text\":\"world\"}\n";
        let results = collect(vec![Ok(Bytes::from(data))]).await;

        assert_eq!(results.len(), 2);
        assert_eq!(
            results[0].as_ref().unwrap(),
            &TestEvent { id: 1, text: "hello".to_string() }
        );
        assert_eq!(results[1].as_ref().unwrap().text, "world");
    }

    #[tokio::test]
    async fn test_line_split_across_chunks() {
        let results = collect(vec![
            Ok(Bytes::from_static(b"data: {\"id\":1,\"te")),
            Ok(Bytes::from_static(b"xt\":\"hello\"}\ndata: {\"id\":2")),
            Ok(Bytes::from_static(b",\"text\":\"world\"}\n")),
        ])
        .await;

        let ids: Vec<u32> = results.into_iter().map(|r| r.unwrap().id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_multibyte_char_split_across_chunks() {
        let line = "data: {\"id\":7,\"text\":\"héllo\"}\n".as_bytes();
        let split = line.iter().position(|b| *b == 0xc3).unwrap() + 1;
        let results = collect(vec![
            Ok(Bytes::copy_from_slice(&line[..split])),
            Ok(Bytes::copy_from_slice(&line[split..])),
        ])
        .await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap().text, "héllo");
    }

    #[tokio::test]
    async fn test_skips_event_lines_and_garbage() {
        let data = "event: message\r\ndata: not json\n\ndata: {\"id\":3,\"text\":\"ok\"}\r\n";
        let results = collect(vec![Ok(Bytes::from(data))]).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].as_ref().unwrap().id, 3);
    }

    #[tokio::test]
    async fn test_read_error_is_forwarded() {
        let results = collect(vec![
            Ok(Bytes::from_static(b"data: {\"id\":1,\"text\":\"a\"}\n")),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
        ])
        .await;

        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }
}
