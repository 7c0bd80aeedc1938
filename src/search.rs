use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

use crate::api::client::NewsBackend;
use crate::api::models::{SearchResult, UserId};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchPhase {
    Idle,
    Searching,
    Answered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Query was empty after trimming. Nothing was sent.
    EmptyQuery,
    /// Another request is still in flight.
    InFlight,
    /// No runtime to run the request on. Nothing was sent.
    NoRuntime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Started(u64),
    Rejected(RejectReason),
}

struct Completion {
    ticket: u64,
    outcome: Result<SearchResult>,
}

/// Question box plus the last answer.
///
/// Requests run as their own tasks; their outcomes come back over a channel
/// and are applied by `next_completion` or `poll_completions`. Only the
/// outcome for the current ticket is ever applied.
pub struct SearchController {
    backend: Arc<dyn NewsBackend>,
    user_id: UserId,
    query: String,
    phase: SearchPhase,
    result: Option<SearchResult>,
    in_flight: Option<u64>,
    next_ticket: u64,
    completions_tx: UnboundedSender<Completion>,
    completions_rx: UnboundedReceiver<Completion>,
}

impl SearchController {
    pub fn new(backend: Arc<dyn NewsBackend>, user_id: UserId) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            backend,
            user_id,
            query: String::new(),
            phase: SearchPhase::Idle,
            result: None,
            in_flight: None,
            next_ticket: 0,
            completions_tx,
            completions_rx,
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    pub fn phase(&self) -> SearchPhase {
        self.phase
    }

    /// Last successful answer. Survives failed searches.
    pub fn result(&self) -> Option<&SearchResult> {
        self.result.as_ref()
    }

    pub fn is_searching(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Sets the query and submits it.
    pub fn submit(&mut self, query: impl Into<String>) -> Submission {
        self.set_query(query);
        self.submit_current()
    }

    pub fn submit_current(&mut self) -> Submission {
        let query = self.query.trim();
        if query.is_empty() {
            debug!("ignoring empty search");
            return Submission::Rejected(RejectReason::EmptyQuery);
        }
        if self.in_flight.is_some() {
            debug!(query, "search already in flight");
            return Submission::Rejected(RejectReason::InFlight);
        }
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(query, "cannot submit search, no runtime: {}", e);
                return Submission::Rejected(RejectReason::NoRuntime);
            }
        };

        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.in_flight = Some(ticket);
        self.phase = SearchPhase::Searching;

        let query = query.to_string();
        let backend = Arc::clone(&self.backend);
        let completions = self.completions_tx.clone();
        info!(user_id = %self.user_id, ticket, %query, "submitting search");
        runtime.spawn(async move {
            let outcome = backend.search(&query).await;
            // The controller may be gone; nothing to deliver to then.
            let _ = completions.send(Completion { ticket, outcome });
        });

        Submission::Started(ticket)
    }

    /// Waits for the in-flight request and applies its outcome. Returns
    /// `false` immediately when nothing is in flight.
    pub async fn next_completion(&mut self) -> bool {
        while self.in_flight.is_some() {
            match self.completions_rx.recv().await {
                Some(completion) => {
                    if self.apply(completion) {
                        return true;
                    }
                }
                None => return false,
            }
        }
        false
    }

    /// Applies whatever has already arrived, without waiting. Returns the
    /// number of outcomes applied.
    pub fn poll_completions(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(completion) = self.completions_rx.try_recv() {
            if self.apply(completion) {
                applied += 1;
            }
        }
        applied
    }

    /// Submits and waits. Returns the answer when this query produced one.
    pub async fn search(&mut self, query: impl Into<String>) -> Option<&SearchResult> {
        match self.submit(query) {
            Submission::Started(_) => {
                if self.next_completion().await && self.phase == SearchPhase::Answered {
                    self.result.as_ref()
                } else {
                    None
                }
            }
            Submission::Rejected(_) => None,
        }
    }

    /// Forgets the query, the answer and any in-flight request. A late
    /// outcome for the abandoned request is discarded.
    pub fn reset(&mut self) {
        self.query.clear();
        self.result = None;
        self.in_flight = None;
        self.phase = SearchPhase::Idle;
    }

    fn apply(&mut self, completion: Completion) -> bool {
        if self.in_flight != Some(completion.ticket) {
            debug!(ticket = completion.ticket, "discarding stale search outcome");
            return false;
        }
        self.in_flight = None;

        match completion.outcome {
            Ok(result) => {
                info!(
                    ticket = completion.ticket,
                    sources = result.related_articles.len(),
                    "search answered"
                );
                self.result = Some(result);
                self.phase = SearchPhase::Answered;
            }
            Err(e) => {
                error!(ticket = completion.ticket, "Error searching: {}", e);
                self.phase = SearchPhase::Idle;
            }
        }
        true
    }
}
