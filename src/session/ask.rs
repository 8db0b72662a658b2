//! One question/answer exchange against the assistant backend.
//!
//! [`AskSession`] opens the streaming request, drives the
//! decoder → router pipeline, updates the conversation context on
//! completion, and exposes cancellation. A new `ask` supersedes any
//! exchange still in flight: its audio is stopped before the new request
//! opens, and a generation counter makes every callback from the superseded
//! exchange a silent no-op.
//!
//! Lifecycle of an exchange:
//!
//! ```text
//! Idle → Requesting → Streaming → {Completed | Errored | Cancelled}
//! ```
//!
//! Only `Completed` commits the question/answer pair to history. The ask
//! stream itself has no client-enforced timeout; it runs until completion,
//! error, natural close, or cancellation.

use crate::audio::playback::AudioPlaybackQueue;
use crate::backend::{BackendLocator, Resolution};
use crate::config::SessionConfig;
use crate::error::{AssistError, Result};
use crate::protocol::StreamDecoder;
use crate::session::context::ConversationContext;
use crate::session::router::{EventRouter, RouteOutcome};
use futures_util::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Per-ask options.
#[derive(Debug, Clone, Copy)]
pub struct AskOptions {
    /// Request synthesized speech alongside the text.
    pub stream_audio: bool,
}

impl Default for AskOptions {
    fn default() -> Self {
        Self { stream_audio: true }
    }
}

/// Caller-supplied sinks for one exchange.
///
/// `on_text` fires for each fragment in stream order; `on_done` fires once
/// with the full answer after history is committed; `on_error` fires at
/// most once per exchange.
#[derive(Clone)]
pub struct AskCallbacks {
    /// Incremental transcript rendering.
    pub on_text: Arc<dyn Fn(&str) + Send + Sync>,
    /// Completion, with the full accumulated answer.
    pub on_done: Arc<dyn Fn(&str) + Send + Sync>,
    /// Surfaced failure (transport, backend-reported, incomplete stream).
    pub on_error: Arc<dyn Fn(&AssistError) + Send + Sync>,
}

impl AskCallbacks {
    /// Callbacks that ignore everything. Useful as a base to override.
    pub fn noop() -> Self {
        Self {
            on_text: Arc::new(|_| {}),
            on_done: Arc::new(|_| {}),
            on_error: Arc::new(|_| {}),
        }
    }
}

/// Handle to a running exchange.
pub struct AskHandle {
    generation: u64,
    cancel: CancellationToken,
}

impl AskHandle {
    /// Cancel this exchange: abort the network read, stop its audio, and
    /// silence its remaining callbacks. History is left untouched.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Generation number of this exchange.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether this exchange has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Orchestrates ask exchanges for one conversation.
pub struct AskSession {
    client: reqwest::Client,
    locator: Arc<BackendLocator>,
    context: Arc<Mutex<ConversationContext>>,
    audio: Arc<AudioPlaybackQueue>,
    generation: Arc<AtomicU64>,
    active: Mutex<Option<CancellationToken>>,
    config: SessionConfig,
}

impl AskSession {
    /// Create a session over an established conversation context.
    pub fn new(
        locator: Arc<BackendLocator>,
        context: Arc<Mutex<ConversationContext>>,
        audio: Arc<AudioPlaybackQueue>,
        config: SessionConfig,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            locator,
            context,
            audio,
            generation: Arc::new(AtomicU64::new(0)),
            active: Mutex::new(None),
            config,
        }
    }

    /// Returns the conversation context handle.
    pub fn context(&self) -> Arc<Mutex<ConversationContext>> {
        Arc::clone(&self.context)
    }

    /// Ask a question; the answer streams through `callbacks`.
    ///
    /// Supersedes any exchange still in flight: the previous exchange's
    /// audio stops and its callbacks go silent before the new request
    /// opens.
    ///
    /// # Errors
    ///
    /// Returns [`AssistError::Session`] for a blank question and
    /// [`AssistError::Backend`] when no backend is reachable (the caller
    /// degrades rather than retries). Failures after the request opens are
    /// delivered through `callbacks.on_error`.
    pub async fn ask(
        &self,
        question: &str,
        options: AskOptions,
        callbacks: AskCallbacks,
    ) -> Result<AskHandle> {
        if question.trim().is_empty() {
            return Err(AssistError::Session("question must not be empty".into()));
        }

        // Supersede: bump the generation first so the old exchange's
        // callbacks are already stale, then cancel it and silence its audio.
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(previous) = self
            .active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            previous.cancel();
        }
        self.audio.stop();

        let endpoint = match self.locator.resolve().await {
            Resolution::Available(endpoint) => endpoint,
            Resolution::Unavailable => {
                return Err(AssistError::Backend(
                    "no assistant backend is reachable".into(),
                ));
            }
        };

        let stream_audio = options.stream_audio && self.config.voice;
        let path = if stream_audio {
            "/api/ask"
        } else {
            "/api/ask-text-only"
        };
        let url = format!("{}{}", endpoint.base_url, path);
        let body = self.request_body(question);

        let cancel = CancellationToken::new();
        *self.active.lock().unwrap_or_else(|e| e.into_inner()) = Some(cancel.clone());

        let request_id = uuid::Uuid::new_v4();
        info!(%request_id, generation, voice = stream_audio, "ask: requesting");

        tokio::spawn(run_exchange(ExchangeState {
            client: self.client.clone(),
            url,
            body,
            question: question.to_owned(),
            generation,
            current: Arc::clone(&self.generation),
            cancel: cancel.clone(),
            callbacks,
            audio: Arc::clone(&self.audio),
            context: Arc::clone(&self.context),
            locator: Arc::clone(&self.locator),
        }));

        Ok(AskHandle { generation, cancel })
    }

    /// Build the request body: `{question, context, history}`.
    fn request_body(&self, question: &str) -> serde_json::Value {
        let ctx = self.context.lock().unwrap_or_else(|e| e.into_inner());
        serde_json::json!({
            "question": question,
            "context": ctx.system_prompt(),
            "history": ctx.history(),
        })
    }
}

/// Everything one exchange task owns.
struct ExchangeState {
    client: reqwest::Client,
    url: String,
    body: serde_json::Value,
    question: String,
    generation: u64,
    current: Arc<AtomicU64>,
    cancel: CancellationToken,
    callbacks: AskCallbacks,
    audio: Arc<AudioPlaybackQueue>,
    context: Arc<Mutex<ConversationContext>>,
    locator: Arc<BackendLocator>,
}

impl ExchangeState {
    /// Whether this exchange is still the latest one. Stale exchanges must
    /// not emit callbacks or touch shared state.
    fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }
}

/// Drive one exchange to a terminal state.
async fn run_exchange(state: ExchangeState) {
    let response = tokio::select! {
        _ = state.cancel.cancelled() => {
            debug!(generation = state.generation, "ask: cancelled before response");
            return;
        }
        response = state.client.post(&state.url).json(&state.body).send() => response,
    };

    let response = match response {
        Ok(response) => response,
        Err(e) => {
            // The cached endpoint failed outright; force re-discovery.
            state.locator.invalidate().await;
            if state.is_current() {
                (state.callbacks.on_error)(&AssistError::Transport(format!(
                    "connection error: {e}"
                )));
            }
            return;
        }
    };

    if !response.status().is_success() {
        let status = response.status();
        state.locator.invalidate().await;
        warn!(generation = state.generation, %status, "ask: backend rejected request");
        if state.is_current() {
            (state.callbacks.on_error)(&AssistError::Transport(format!(
                "backend returned HTTP {status}"
            )));
        }
        return;
    }

    debug!(generation = state.generation, "ask: streaming");

    // Sinks compare their captured generation against the current one so a
    // superseded exchange goes silent mid-stream.
    let on_text = Arc::clone(&state.callbacks.on_text);
    let current_for_text = Arc::clone(&state.current);
    let generation = state.generation;
    let audio = Arc::clone(&state.audio);
    let current_for_audio = Arc::clone(&state.current);
    let mut router = EventRouter::new(
        Box::new(move |fragment| {
            if current_for_text.load(Ordering::SeqCst) == generation {
                on_text(fragment);
            }
        }),
        Box::new(move |seq, payload| {
            if current_for_audio.load(Ordering::SeqCst) == generation {
                audio.enqueue(seq, payload);
            }
        }),
    );

    let mut decoder = StreamDecoder::new();
    let mut byte_stream = response.bytes_stream();
    let mut cancelled = false;

    'read: loop {
        let chunk = tokio::select! {
            _ = state.cancel.cancelled() => {
                cancelled = true;
                break 'read;
            }
            chunk = byte_stream.next() => chunk,
        };

        match chunk {
            Some(Ok(bytes)) => {
                for event in decoder.push(&bytes) {
                    router.route(event);
                    if router.is_terminal() {
                        // Terminal record seen: ignore the rest of the
                        // stream and drop the connection.
                        break 'read;
                    }
                }
            }
            Some(Err(e)) => {
                warn!(generation = state.generation, %e, "ask: stream read failed");
                if state.is_current() {
                    (state.callbacks.on_error)(&AssistError::Transport(format!(
                        "stream read error: {e}"
                    )));
                }
                return;
            }
            None => break 'read,
        }
    }

    if cancelled {
        // Stop the audio only while still current: when superseded, the new
        // ask has already flushed the queue and may be filling it again.
        if state.is_current() {
            state.audio.stop();
        }
        info!(generation = state.generation, "ask: cancelled");
        return;
    }

    if !router.is_terminal() && decoder.finish() {
        warn!(generation = state.generation, "ask: response ended mid-record");
    }

    match router.outcome() {
        RouteOutcome::Done { full_text } => {
            if !state.is_current() {
                return;
            }
            {
                let mut ctx = state.context.lock().unwrap_or_else(|e| e.into_inner());
                ctx.commit_exchange(&state.question, full_text);
            }
            info!(
                generation = state.generation,
                chars = full_text.len(),
                "ask: completed"
            );
            (state.callbacks.on_done)(full_text);
        }
        RouteOutcome::Errored { message } => {
            if !state.is_current() {
                return;
            }
            // Anything already queued for this answer must not keep playing.
            state.audio.stop();
            warn!(generation = state.generation, %message, "ask: backend reported error");
            (state.callbacks.on_error)(&AssistError::Backend(message.clone()));
        }
        RouteOutcome::InFlight => {
            // Stream closed without a completion marker: the partial text
            // was already rendered, but it never enters history.
            if !state.is_current() {
                return;
            }
            warn!(
                generation = state.generation,
                "ask: stream closed without completion marker"
            );
            (state.callbacks.on_error)(&AssistError::Incomplete(
                "answer stream closed early; partial text was not recorded".into(),
            ));
        }
    }
}
