//! OpenAI-compatible chat completions handler
//!
//! Handles POST /v1/chat/completions requests. Streaming requests are handed
//! to [`super::streaming`]; everything else is answered with one aggregated
//! `chat.completion` object.

use crate::error::{AppError, AppResult};
use crate::handlers::AppState;
use crate::metrics::Mode;
use crate::middleware::RequestId;
use crate::shared::query::{open_upstream, retry_with_policy};
use crate::upstream::{UpstreamEvent, upstream_events};
use axum::{
    Extension, Json,
    extract::State,
    response::{IntoResponse, Response},
};
use futures::{Stream, StreamExt};
use std::time::Instant;

use super::extractor::OpenAiJson;
use super::streaming;
use super::types::{ChatCompletionRequest, CompletionMeta};

/// POST /v1/chat/completions handler
///
/// # Errors
///
/// - 400 for malformed bodies (via [`OpenAiJson`])
/// - 500 with the last upstream error once every attempt has failed
pub async fn handler(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    OpenAiJson(request): OpenAiJson<ChatCompletionRequest>,
) -> Result<Response, AppError> {
    let alias = request.model_alias();
    let prompt = request.to_upstream_prompt();

    tracing::debug!(
        request_id = %request_id,
        requested_model = %request.model(),
        model = %alias,
        messages_count = request.messages().len(),
        prompt_length = prompt.len(),
        stream = request.stream(),
        "Received chat completions request"
    );

    if request.stream() {
        state.metrics().record_request(Mode::Stream);
        return streaming::respond(state, request_id, prompt, alias).await;
    }

    state.metrics().record_request(Mode::Aggregate);
    let model = alias.upstream_id();
    let started = Instant::now();

    let state_ref = &state;
    let prompt_ref = prompt.as_str();
    let content = retry_with_policy(
        state.retry_policy(),
        request_id,
        state.metrics(),
        move |_| aggregate_attempt(state_ref, prompt_ref, model, request_id),
    )
    .await?;

    state
        .metrics()
        .record_duration(Mode::Aggregate, started.elapsed().as_secs_f64() * 1000.0);

    let meta = CompletionMeta::new(model);
    tracing::info!(
        request_id = %request_id,
        completion_id = %meta.id,
        model = %model,
        response_length = content.len(),
        "Chat completion complete"
    );

    Ok(Json(meta.completion(content)).into_response())
}

/// One aggregate attempt: open the upstream and read its whole body
///
/// A body read failure fails the attempt, so the orchestrator retries it.
async fn aggregate_attempt(
    state: &AppState,
    prompt: &str,
    model: &str,
    request_id: RequestId,
) -> AppResult<String> {
    let response = open_upstream(state, prompt, model, request_id).await?;
    aggregate(upstream_events(
        response.bytes_stream(),
        state.upstream().timeout(),
        state.metrics_handle(),
        request_id,
    ))
    .await
}

/// Concatenate every fragment up to `[DONE]` or the end of the body
pub async fn aggregate<S>(events: S) -> AppResult<String>
where
    S: Stream<Item = AppResult<UpstreamEvent>>,
{
    let mut events = std::pin::pin!(events);
    let mut content = String::new();

    while let Some(event) = events.next().await {
        match event? {
            UpstreamEvent::Fragment(text) => content.push_str(&text),
            UpstreamEvent::Done => break,
        }
    }

    Ok(content)
}
