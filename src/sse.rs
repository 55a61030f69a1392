//! Server-Sent Events (SSE) stream processing.
//!
//! The chat endpoint answers in streaming mode with one JSON document per
//! `data:` line:
//! ```text
//! event: ping
//!
//! data: {"event": "message", "answer": "Hel", ...}
//!
//! data: {"event": "message_end", ...}
//! ```
//!
//! Bytes are decoded incrementally as they arrive, so the first event is
//! available long before generation finishes.

use bytes::{Bytes, BytesMut};
use futures::stream::{self, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::client::ClientError;
use crate::model::StreamEvent;

/// Incremental line splitter that yields the payload of each `data:` line.
///
/// Lines are only decoded as UTF-8 once complete, so a multi-byte character
/// split across two chunks is reassembled correctly. Lines that are not
/// valid UTF-8 are logged and dropped.
#[derive(Debug, Default)]
pub struct SseLineDecoder {
    buffer: BytesMut,
    /// Bytes of `buffer` already known to contain no newline
    scanned: usize,
}

impl SseLineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk received from the wire.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Next complete data payload, or `None` until more bytes are fed.
    pub fn next_data(&mut self) -> Option<String> {
        while let Some(pos) = self.buffer[self.scanned..].iter().position(|b| *b == b'\n') {
            let line = self.buffer.split_to(self.scanned + pos + 1);
            self.scanned = 0;
            if let Some(data) = data_payload(&line) {
                return Some(data);
            }
        }
        self.scanned = self.buffer.len();
        None
    }

    /// Flush a final line that was not terminated by a newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = self.buffer.split();
        self.scanned = 0;
        data_payload(&line)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = match std::str::from_utf8(line) {
        Ok(line) => line,
        Err(e) => {
            warn!(error = %e, "skipping stream line that is not valid UTF-8");
            return None;
        }
    };
    parse_sse_line(line.trim())
        .filter(|data| !data.is_empty())
        .map(str::to_string)
}

/// Parse an SSE line to extract the data portion.
///
/// Comments (`:`) and the `event:`, `id:` and `retry:` fields yield `None`.
///
/// # Example
/// ```
/// use dify::sse::parse_sse_line;
///
/// assert_eq!(parse_sse_line("data: {\"key\": \"value\"}"), Some("{\"key\": \"value\"}"));
/// assert_eq!(parse_sse_line("data:{}"), Some("{}"));
/// assert_eq!(parse_sse_line("event: ping"), None);
/// ```
pub fn parse_sse_line(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(|s| s.trim())
}

/// Turn a byte stream into a stream of raw `data:` payloads.
///
/// A read error is yielded once and ends the stream.
pub fn sse_data<S, E>(bytes: S) -> impl Stream<Item = Result<String, ClientError>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send,
    E: Into<ClientError> + Send,
{
    stream::unfold(
        (Box::pin(bytes), SseLineDecoder::new(), false),
        |(mut bytes, mut decoder, mut ended)| async move {
            loop {
                if let Some(data) = decoder.next_data() {
                    return Some((Ok(data), (bytes, decoder, ended)));
                }

                if ended {
                    return decoder.finish().map(|data| (Ok(data), (bytes, decoder, ended)));
                }

                match bytes.next().await {
                    Some(Ok(chunk)) => decoder.feed(&chunk),
                    Some(Err(e)) => {
                        return Some((Err(e.into()), (bytes, SseLineDecoder::new(), true)));
                    }
                    None => ended = true,
                }
            }
        },
    )
}

/// Extension trait for `reqwest::Response` to enable SSE streaming.
///
/// # Example
/// ```ignore
/// use dify::sse::SSEResponseExt;
///
/// let mut stream = response.sse();
/// while let Some(result) = stream.next().await {
///     let line = result?;
///     println!("SSE data: {}", line);
/// }
/// ```
pub trait SSEResponseExt {
    /// Convert the response into a stream of raw SSE data payloads.
    fn sse(self) -> impl Stream<Item = Result<String, ClientError>> + Send;
}

impl SSEResponseExt for reqwest::Response {
    fn sse(self) -> impl Stream<Item = Result<String, ClientError>> + Send {
        sse_data(self.bytes_stream())
    }
}

/// Decode one payload. Malformed payloads are logged and yield `None`.
pub fn decode_event(data: &str) -> Option<StreamEvent> {
    match serde_json::from_str::<StreamEvent>(data) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(data = %data, error = %e, "skipping malformed stream event");
            None
        }
    }
}

/// Outcome of a fully consumed event stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    /// Events handed to the handler
    pub delivered: usize,
    /// Payloads that could not be decoded
    pub skipped: usize,
}

/// Feed every decodable event to `handler`, one at a time and in order.
///
/// The handler runs to completion before the next read. Cancellation is
/// checked before each read; on cancellation the stream, and with it the
/// connection, is dropped and [`ClientError::Cancelled`] is returned.
pub async fn dispatch_events<S, F>(
    data: S,
    cancel: &CancellationToken,
    mut handler: F,
) -> Result<StreamSummary, ClientError>
where
    S: Stream<Item = Result<String, ClientError>>,
    F: FnMut(StreamEvent),
{
    let mut data = std::pin::pin!(data);
    let mut summary = StreamSummary::default();

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(delivered = summary.delivered, "event stream cancelled");
                return Err(ClientError::Cancelled);
            }
            next = data.next() => next,
        };

        match next {
            Some(Ok(payload)) => match decode_event(&payload) {
                Some(event) => {
                    handler(event);
                    summary.delivered += 1;
                }
                None => summary.skipped += 1,
            },
            Some(Err(e)) => return Err(e),
            None => break,
        }
    }

    debug!(
        delivered = summary.delivered,
        skipped = summary.skipped,
        "event stream finished"
    );
    Ok(summary)
}
