//! Streaming chat events as a lazy `Stream`.

use futures::stream::{self, Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::client::ClientError;
use crate::sse::decode_event;

pub use crate::model::{EventKind, StreamEvent};
pub use crate::sse::{parse_sse_line, StreamSummary};

/// Decode raw `data:` payloads into events.
///
/// Malformed payloads are logged and skipped; errors pass through and, as
/// produced by [`sse_data`](crate::sse::sse_data), end the stream.
pub fn event_stream<S>(data: S) -> impl Stream<Item = Result<StreamEvent, ClientError>> + Send
where
    S: Stream<Item = Result<String, ClientError>> + Send,
{
    data.filter_map(|item| {
        futures::future::ready(match item {
            Ok(payload) => decode_event(&payload).map(Ok),
            Err(e) => Some(Err(e)),
        })
    })
}

/// End `events` once `cancel` fires.
///
/// Cancellation is checked before every read and yields a single
/// [`ClientError::Cancelled`]; the inner stream, and the connection it reads
/// from, is dropped at that point.
pub fn until_cancelled<S, T>(events: S, cancel: CancellationToken) -> impl Stream<Item = Result<T, ClientError>> + Send
where
    S: Stream<Item = Result<T, ClientError>> + Send,
    T: Send,
{
    stream::unfold(Some((Box::pin(events), cancel)), |state| async move {
        let Some((mut events, cancel)) = state else {
            return None;
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Some((Err(ClientError::Cancelled), None)),
            item = events.next() => item.map(|item| (item, Some((events, cancel)))),
        }
    })
}
