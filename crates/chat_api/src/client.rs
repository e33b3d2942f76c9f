use std::future::Future;
use std::sync::{atomic::AtomicBool, atomic::Ordering, Arc};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::config::ChatApiConfig;
use crate::error::ChatApiError;
use crate::events::{map_payload, ChatStreamEvent};
use crate::headers::build_headers;
use crate::payload::{CompletionPayload, ModelInfo, PayloadMessage};
use crate::reasoning::ReasoningDemarcator;
use crate::sse::SseStreamParser;
use crate::url::{completions_url, models_url};

/// Optional cancellation signal shared across request and stream loops.
pub type CancellationSignal = Arc<AtomicBool>;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// OpenAI-compatible streaming completion client.
#[derive(Debug)]
pub struct ChatApiClient {
    http: Client,
    config: ChatApiConfig,
}

impl ChatApiClient {
    pub fn new(config: ChatApiConfig) -> Result<Self, ChatApiError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(ChatApiError::from)?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &ChatApiConfig {
        &self.config
    }

    pub fn completions_endpoint(&self) -> String {
        completions_url(&self.config.base_url)
    }

    pub fn models_endpoint(&self) -> String {
        models_url(&self.config.base_url)
    }

    pub fn build_headers(&self, user_agent: Option<&str>) -> Result<HeaderMap, ChatApiError> {
        let headers = build_headers(&self.config, user_agent)?;
        let mut out = HeaderMap::new();
        for (key, value) in headers {
            out.insert(
                HeaderName::from_bytes(key.as_bytes())
                    .map_err(|_| ChatApiError::InvalidHeader(format!("invalid header key: {key}")))?,
                HeaderValue::from_str(&value).map_err(|_| {
                    ChatApiError::InvalidHeader(format!("invalid header value for {key}"))
                })?,
            );
        }
        Ok(out)
    }

    pub fn build_completion_request(
        &self,
        history: &[PayloadMessage],
    ) -> Result<reqwest::RequestBuilder, ChatApiError> {
        let headers = self.build_headers(self.config.user_agent.as_deref())?;
        let payload = CompletionPayload::from_history(&self.config, history);
        Ok(self
            .http
            .post(self.completions_endpoint())
            .headers(headers)
            .json(&payload))
    }

    /// Fetches the models advertised by the provider.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, ChatApiError> {
        let headers = self.build_headers(self.config.user_agent.as_deref())?;
        let endpoint = self.models_endpoint();
        debug!(endpoint = %endpoint, "fetching provider model list");

        let response = self
            .http
            .get(endpoint)
            .headers(headers)
            .send()
            .await
            .map_err(ChatApiError::from)?;
        let status = response.status();
        let body = response.text().await.map_err(ChatApiError::from)?;

        if !status.is_success() {
            return Err(ChatApiError::Status(status, body));
        }

        let parsed: crate::payload::ModelListResponse =
            serde_json::from_str(&body).map_err(|_| ChatApiError::MalformedResponse(body.clone()))?;
        parsed.data.ok_or(ChatApiError::Provider { payload: body })
    }

    /// Streams one completion, forwarding every decoded event to `on_event`.
    ///
    /// Provider-reported errors and the cancellation signal abort the stream;
    /// connection closure without a terminator is a normal end.
    pub async fn stream_with_handler<F>(
        &self,
        history: &[PayloadMessage],
        cancellation: Option<&CancellationSignal>,
        mut on_event: F,
    ) -> Result<(), ChatApiError>
    where
        F: FnMut(ChatStreamEvent),
    {
        let endpoint = self.completions_endpoint();
        debug!(endpoint = %endpoint, model = %self.config.model, "opening completion stream");

        let response = await_or_cancel(self.build_completion_request(history)?.send(), cancellation)
            .await?
            .map_err(ChatApiError::from)?;

        let status = response.status();
        if !status.is_success() {
            let body = await_or_cancel(response.text(), cancellation)
                .await?
                .unwrap_or_else(|_| {
                    status
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_string()
                });
            return Err(ChatApiError::Status(status, body));
        }

        let mut bytes = response.bytes_stream();
        let mut parser = SseStreamParser::default();

        loop {
            let Some(chunk) = await_or_cancel(bytes.next(), cancellation).await? else {
                break;
            };
            if is_cancelled(cancellation) {
                return Err(ChatApiError::Cancelled);
            }
            let chunk = chunk.map_err(ChatApiError::from)?;

            for payload in parser.feed(&chunk) {
                match map_payload(&payload)? {
                    ChatStreamEvent::ProviderError { payload } => {
                        return Err(ChatApiError::Provider { payload });
                    }
                    ChatStreamEvent::Done => {
                        debug!("completion stream terminated by sentinel");
                        on_event(ChatStreamEvent::Done);
                        return Ok(());
                    }
                    event => on_event(event),
                }
            }
        }

        if is_cancelled(cancellation) {
            return Err(ChatApiError::Cancelled);
        }

        // A success-status body that never framed a single event is how
        // some gateways deliver a plain JSON error document.
        let remainder = parser.take_remainder();
        let remainder = remainder.trim();
        if !remainder.is_empty() {
            if let Ok(value) = serde_json::from_str::<Value>(remainder) {
                if value.get("error").is_some() {
                    return Err(ChatApiError::Provider {
                        payload: remainder.to_string(),
                    });
                }
            }
        }

        debug!("completion stream closed by peer");
        Ok(())
    }

    /// Runs one completion to the end, demarcating the reasoning sub-stream
    /// inline and invoking `on_progress` with the accumulated text after
    /// every visible delta.
    ///
    /// Returns the final accumulated text. On cancellation the partial text
    /// survives through the progress callbacks already delivered.
    pub async fn complete<F>(
        &self,
        history: &[PayloadMessage],
        cancellation: Option<&CancellationSignal>,
        mut on_progress: F,
    ) -> Result<String, ChatApiError>
    where
        F: FnMut(&str),
    {
        let mut accumulated = String::new();
        let mut demarcator = ReasoningDemarcator::default();

        self.stream_with_handler(history, cancellation, |event| {
            if let ChatStreamEvent::Delta { content, reasoning } = event {
                let visible = demarcator.apply(content.as_deref(), reasoning.as_deref());
                if !visible.is_empty() {
                    accumulated.push_str(&visible);
                    on_progress(&accumulated);
                }
            }
        })
        .await?;

        Ok(accumulated)
    }
}

fn is_cancelled(cancel: Option<&CancellationSignal>) -> bool {
    cancel.is_some_and(|token| token.load(Ordering::Acquire))
}

/// Awaits `future` while polling the cancellation signal.
///
/// On cancellation the pending future is dropped, which aborts the
/// underlying connection rather than abandoning it.
async fn await_or_cancel<F>(
    future: F,
    cancellation: Option<&CancellationSignal>,
) -> Result<F::Output, ChatApiError>
where
    F: Future,
{
    if cancellation.is_none() {
        return Ok(future.await);
    }

    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancellation) {
            return Err(ChatApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancellation) {
                return Err(ChatApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}
