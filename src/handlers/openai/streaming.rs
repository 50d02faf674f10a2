//! Streaming chat completions
//!
//! Handles POST /v1/chat/completions requests with `stream: true`.
//!
//! Once an upstream attempt answers 2xx the response is committed: a spawned
//! bridge task decodes the upstream body and pushes one SSE record per text
//! fragment through a bounded channel. Failures after that point are not
//! retried; the bridge sends a single OpenAI error event and closes.

use crate::error::{AppError, AppResult};
use crate::handlers::AppState;
use crate::metrics::Mode;
use crate::middleware::RequestId;
use crate::models::ModelAlias;
use crate::shared::query::{open_upstream, retry_with_policy};
use crate::upstream::{UpstreamEvent, upstream_events};
use axum::response::{
    IntoResponse, Response,
    sse::{Event, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use super::extractor::OpenAiError;
use super::types::{ChatCompletionChunk, CompletionMeta};

/// SSE records buffered between the bridge task and the client
const STREAM_BUFFER: usize = 32;

/// How a bridged stream ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeSummary {
    /// Content chunks forwarded
    pub fragments: usize,
    /// Whether the upstream sent `[DONE]` (and a stop chunk was emitted)
    pub finished: bool,
}

/// Serve a streaming completion
///
/// Upstream attempts are retried until one is committed; only then does the
/// SSE response start.
///
/// # SSE Format
///
/// ```text
/// data: {"id":"chatcmpl-...","object":"chat.completion.chunk",...,"choices":[{"index":0,"delta":{"content":"Hi"},"finish_reason":null}]}
///
/// data: {"id":"chatcmpl-...","object":"chat.completion.chunk",...,"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}
///
/// ```
pub async fn respond(
    state: AppState,
    request_id: RequestId,
    prompt: String,
    alias: ModelAlias,
) -> Result<Response, AppError> {
    let model = alias.upstream_id();
    let started = Instant::now();

    let state_ref = &state;
    let prompt_ref = prompt.as_str();
    let upstream = retry_with_policy(
        state.retry_policy(),
        request_id,
        state.metrics(),
        move |_| open_upstream(state_ref, prompt_ref, model, request_id),
    )
    .await?;

    state
        .metrics()
        .record_duration(Mode::Stream, started.elapsed().as_secs_f64() * 1000.0);

    let meta = CompletionMeta::new(model);
    tracing::info!(
        request_id = %request_id,
        completion_id = %meta.id,
        model = %model,
        "Starting streaming response"
    );

    let events = upstream_events(
        upstream.bytes_stream(),
        state.upstream().timeout(),
        state.metrics_handle(),
        request_id,
    );
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    tokio::spawn(run_bridge(events, meta, tx, request_id));

    Ok(Sse::new(sse_records(rx))
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
        .into_response())
}

/// Turn the bridge channel into SSE events
fn sse_records(rx: mpsc::Receiver<String>) -> impl Stream<Item = Result<Event, Infallible>> {
    futures::stream::unfold(rx, |mut rx| async move {
        rx.recv()
            .await
            .map(|data| (Ok(Event::default().data(data)), rx))
    })
}

/// Bridge task body: forward events, then report how the stream ended
async fn run_bridge<S>(
    events: S,
    meta: CompletionMeta,
    tx: mpsc::Sender<String>,
    request_id: RequestId,
) where
    S: Stream<Item = AppResult<UpstreamEvent>>,
{
    match bridge(events, &meta, &tx).await {
        Ok(summary) => {
            tracing::info!(
                request_id = %request_id,
                completion_id = %meta.id,
                fragments = summary.fragments,
                finished = summary.finished,
                "Streaming response complete"
            );
        }
        Err(AppError::Write(reason)) => {
            tracing::debug!(
                request_id = %request_id,
                completion_id = %meta.id,
                reason = %reason,
                "Client disconnected, stopping stream"
            );
        }
        Err(e) => {
            tracing::error!(
                request_id = %request_id,
                completion_id = %meta.id,
                error = %e,
                "Upstream stream failed after response was committed"
            );
            match serde_json::to_string(&OpenAiError::server_error(e.to_string())) {
                Ok(payload) => {
                    // Receiver may already be gone; nothing left to report to
                    let _ = tx.send(payload).await;
                }
                Err(se) => {
                    tracing::error!(request_id = %request_id, error = %se, "Failed to encode error event");
                }
            }
        }
    }
}

/// Translate upstream events into outbound chunk records
///
/// Each fragment is sent as soon as it is decoded. `[DONE]` produces one stop
/// chunk and ends the bridge; a body that ends without it produces nothing
/// further.
///
/// # Errors
///
/// - upstream read failures from `events` are passed through
/// - `AppError::Write` if the receiving side has been dropped
pub async fn bridge<S>(
    events: S,
    meta: &CompletionMeta,
    tx: &mpsc::Sender<String>,
) -> AppResult<BridgeSummary>
where
    S: Stream<Item = AppResult<UpstreamEvent>>,
{
    let mut events = std::pin::pin!(events);
    let mut summary = BridgeSummary {
        fragments: 0,
        finished: false,
    };

    while let Some(event) = events.next().await {
        match event? {
            UpstreamEvent::Fragment(text) => {
                send_chunk(tx, &meta.content_chunk(&text)).await?;
                summary.fragments += 1;
            }
            UpstreamEvent::Done => {
                send_chunk(tx, &meta.finish_chunk()).await?;
                summary.finished = true;
                break;
            }
        }
    }

    Ok(summary)
}

async fn send_chunk(tx: &mpsc::Sender<String>, chunk: &ChatCompletionChunk) -> AppResult<()> {
    let data = serde_json::to_string(chunk)
        .map_err(|e| AppError::Internal(format!("Failed to encode chunk: {}", e)))?;
    tx.send(data)
        .await
        .map_err(|_| AppError::Write("client closed the stream".to_string()))
}
