//! Upstream event-stream decoding
//!
//! The upstream answers with newline-delimited `data: <json>` records ending
//! in `data: [DONE]`. Network chunks are split into lines on byte boundaries,
//! so multi-byte characters spanning two chunks are reassembled before
//! decoding.

use crate::error::{AppError, AppResult};
use crate::metrics::Metrics;
use crate::middleware::RequestId;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

const DATA_PREFIX: &str = "data: ";
const DONE_MARKER: &str = "[DONE]";
const SUCCESS_ACTION: &str = "success";

/// Splits a byte stream into lines
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a network chunk and drain every completed line
    ///
    /// Lines are returned without the `\n` terminator or a trailing `\r`.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            lines.push(decode_line(&self.buffer[start..end]));
            start = end + 1;
        }
        self.buffer.drain(..start);
        lines
    }

    /// Take whatever is left once the body has ended
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(decode_line(&rest))
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Decoded shape of one upstream JSON record
#[derive(Debug, Deserialize)]
struct UpstreamRecord {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    message: Option<serde_json::Value>,
}

/// Classification of a single upstream line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    /// Not a `data: ` line
    Ignored,
    /// The `[DONE]` terminator
    Done,
    /// A decodable record that carries no text (`action != "success"`, or no
    /// string message)
    Skipped,
    /// A `data: ` line whose payload is not valid JSON
    Malformed(String),
    /// A text fragment to forward
    Fragment(String),
}

/// Classify one line of the upstream body
pub fn parse_record(line: &str) -> Record {
    let Some(payload) = line.strip_prefix(DATA_PREFIX).map(str::trim) else {
        return Record::Ignored;
    };
    if payload == DONE_MARKER {
        return Record::Done;
    }

    let record: UpstreamRecord = match serde_json::from_str(payload) {
        Ok(record) => record,
        Err(e) => return Record::Malformed(e.to_string()),
    };
    if record.action.as_deref() != Some(SUCCESS_ACTION) {
        return Record::Skipped;
    }

    match record.message {
        Some(serde_json::Value::String(text)) if !text.is_empty() => Record::Fragment(text),
        _ => Record::Skipped,
    }
}

/// Events forwarded to the response translators
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    Fragment(String),
    Done,
}

/// Decode an upstream body into fragments
///
/// Each body read is bounded by `read_timeout`; expiry or a read failure ends
/// the stream with `AppError::Transport`. Malformed records are logged,
/// counted and skipped. Nothing is read after `[DONE]`. A body that ends
/// without `[DONE]` simply ends the stream.
pub fn upstream_events<S, E>(
    body: S,
    read_timeout: Duration,
    metrics: Arc<Metrics>,
    request_id: RequestId,
) -> impl Stream<Item = AppResult<UpstreamEvent>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    async_stream::try_stream! {
        let mut body = Box::pin(body);
        let mut lines = LineBuffer::new();
        let mut finished = false;

        'read: while !finished {
            let next = tokio::time::timeout(read_timeout, body.next())
                .await
                .map_err(|_| {
                    AppError::Transport(format!(
                        "no data from upstream within {} seconds",
                        read_timeout.as_secs()
                    ))
                })?;

            let pending: Vec<String> = match next {
                Some(Ok(chunk)) => lines.push(&chunk),
                Some(Err(e)) => Err(AppError::Transport(format!(
                    "failed to read upstream body: {}",
                    e
                )))?,
                None => {
                    finished = true;
                    lines.finish().into_iter().collect()
                }
            };

            for line in pending {
                match parse_record(&line) {
                    Record::Fragment(text) => yield UpstreamEvent::Fragment(text),
                    Record::Done => {
                        yield UpstreamEvent::Done;
                        break 'read;
                    }
                    Record::Malformed(reason) => {
                        let error = AppError::StreamDecode(reason);
                        metrics.stream_decode_error();
                        tracing::warn!(
                            request_id = %request_id,
                            error = %error,
                            kind = error.kind(),
                            record = %line,
                            "Skipping undecodable upstream record"
                        );
                    }
                    Record::Ignored | Record::Skipped => {}
                }
            }
        }
    }
}
