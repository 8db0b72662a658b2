//! Routes decoded stream records to their sinks.
//!
//! Text fragments are forwarded immediately, in arrival order, and also
//! accumulated for the history commit. Audio segments are forwarded under a
//! monotonically increasing sequence number assigned by arrival order in the
//! stream (the backend does not order audio independently of text). An
//! `error` record short-circuits the exchange: every later record is
//! ignored.

use crate::protocol::StreamEvent;

/// Where an exchange stands after the records routed so far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Still streaming; no terminal record yet.
    InFlight,
    /// The backend signalled completion.
    Done {
        /// The full accumulated answer text.
        full_text: String,
    },
    /// The backend reported an error mid-stream.
    Errored {
        /// The backend's message.
        message: String,
    },
}

/// Dispatches each decoded record exactly once.
pub struct EventRouter {
    on_text: Box<dyn FnMut(&str) + Send>,
    on_audio: Box<dyn FnMut(u64, Vec<u8>) + Send>,
    accumulated: String,
    next_seq: u64,
    outcome: RouteOutcome,
}

impl EventRouter {
    /// Create a router with the two immediate sinks.
    ///
    /// `on_text` receives fragments in exact stream order; `on_audio`
    /// receives `(sequence_number, payload)` pairs numbered from 0.
    pub fn new(
        on_text: Box<dyn FnMut(&str) + Send>,
        on_audio: Box<dyn FnMut(u64, Vec<u8>) + Send>,
    ) -> Self {
        Self {
            on_text,
            on_audio,
            accumulated: String::new(),
            next_seq: 0,
            outcome: RouteOutcome::InFlight,
        }
    }

    /// Dispatch one record. Records after a terminal one are ignored.
    pub fn route(&mut self, event: StreamEvent) {
        if self.is_terminal() {
            return;
        }

        match event {
            StreamEvent::Text { content } => {
                self.accumulated.push_str(&content);
                (self.on_text)(&content);
            }
            StreamEvent::Audio { payload } => {
                let seq = self.next_seq;
                self.next_seq += 1;
                (self.on_audio)(seq, payload);
            }
            StreamEvent::ErrorReport { message } => {
                self.outcome = RouteOutcome::Errored { message };
            }
            StreamEvent::Done => {
                self.outcome = RouteOutcome::Done {
                    full_text: self.accumulated.clone(),
                };
            }
        }
    }

    /// Current outcome of the exchange.
    pub fn outcome(&self) -> &RouteOutcome {
        &self.outcome
    }

    /// Whether a terminal record has been routed.
    pub fn is_terminal(&self) -> bool {
        !matches!(self.outcome, RouteOutcome::InFlight)
    }

    /// Text accumulated so far, terminal or not.
    pub fn partial_text(&self) -> &str {
        &self.accumulated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn collecting_router() -> (EventRouter, Arc<Mutex<Vec<String>>>, Arc<Mutex<Vec<u64>>>) {
        let texts = Arc::new(Mutex::new(Vec::new()));
        let seqs = Arc::new(Mutex::new(Vec::new()));
        let texts_sink = Arc::clone(&texts);
        let seqs_sink = Arc::clone(&seqs);
        let router = EventRouter::new(
            Box::new(move |fragment| {
                texts_sink
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(fragment.to_owned());
            }),
            Box::new(move |seq, _payload| {
                seqs_sink
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(seq);
            }),
        );
        (router, texts, seqs)
    }

    fn text(s: &str) -> StreamEvent {
        StreamEvent::Text {
            content: s.to_owned(),
        }
    }

    #[test]
    fn text_forwarded_in_order_and_accumulated() {
        let (mut router, texts, _) = collecting_router();
        router.route(text("Hi"));
        router.route(text(" there"));

        let seen = texts.lock().unwrap_or_else(|e| e.into_inner()).clone();
        assert_eq!(seen, vec!["Hi".to_owned(), " there".to_owned()]);
        assert_eq!(router.partial_text(), "Hi there");
        assert_eq!(*router.outcome(), RouteOutcome::InFlight);
    }

    #[test]
    fn audio_numbered_by_arrival_order() {
        let (mut router, _, seqs) = collecting_router();
        router.route(StreamEvent::Audio { payload: vec![1] });
        router.route(text("between"));
        router.route(StreamEvent::Audio { payload: vec![2] });
        router.route(StreamEvent::Audio { payload: vec![3] });

        let seen = seqs.lock().unwrap_or_else(|e| e.into_inner()).clone();
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[test]
    fn done_captures_full_text() {
        let (mut router, _, _) = collecting_router();
        router.route(text("Hi"));
        router.route(text(" there"));
        router.route(StreamEvent::Done);

        assert!(router.is_terminal());
        assert_eq!(
            *router.outcome(),
            RouteOutcome::Done {
                full_text: "Hi there".to_owned()
            }
        );
    }

    #[test]
    fn error_short_circuits_later_records() {
        let (mut router, texts, seqs) = collecting_router();
        router.route(text("partial"));
        router.route(StreamEvent::ErrorReport {
            message: "backend exploded".to_owned(),
        });
        // Everything after the error must be ignored, including done.
        router.route(text("late"));
        router.route(StreamEvent::Audio { payload: vec![9] });
        router.route(StreamEvent::Done);

        assert_eq!(
            *router.outcome(),
            RouteOutcome::Errored {
                message: "backend exploded".to_owned()
            }
        );
        let seen_texts = texts.lock().unwrap_or_else(|e| e.into_inner()).clone();
        assert_eq!(seen_texts, vec!["partial".to_owned()]);
        assert!(seqs.lock().unwrap_or_else(|e| e.into_inner()).is_empty());
    }

    #[test]
    fn records_after_done_are_ignored() {
        let (mut router, texts, _) = collecting_router();
        router.route(StreamEvent::Done);
        router.route(text("straggler"));

        assert!(texts.lock().unwrap_or_else(|e| e.into_inner()).is_empty());
        assert_eq!(
            *router.outcome(),
            RouteOutcome::Done {
                full_text: String::new()
            }
        );
    }
}
