use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::api::client::NewsBackend;
use crate::api::models::{
    Article, ArticleId, InteractionAction, InteractionEvent, SearchResult, UserId,
};
use crate::error::{AppError, Result};

pub fn article(id: i64, short_summary: &str) -> Article {
    Article {
        id: ArticleId::from(id),
        short_summary: short_summary.to_string(),
        long_summary: format!("More about {}", short_summary),
        title: format!("Title {}", id),
        source: "Wire".to_string(),
        url: format!("https://news.example/{}", id),
        published_at: None,
    }
}

/// Lets spawned emitter tasks run to completion on the test runtime.
pub async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

/// In-memory backend that records what it is asked to do.
#[derive(Default)]
pub struct FakeBackend {
    feed: Mutex<Vec<Article>>,
    fail_feed: AtomicBool,
    feed_calls: AtomicUsize,
    interactions: Mutex<Vec<InteractionEvent>>,
    interaction_attempts: AtomicUsize,
    fail_interactions: AtomicBool,
    hold_interactions: AtomicBool,
    interaction_gate: Notify,
    answer: Mutex<Option<SearchResult>>,
    fail_search: AtomicBool,
    hold_search: AtomicBool,
    search_gate: Notify,
    queries: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_feed(articles: Vec<Article>) -> Self {
        let backend = Self::new();
        backend.set_feed(articles);
        backend
    }

    pub fn set_feed(&self, articles: Vec<Article>) {
        *self.feed.lock().unwrap_or_else(PoisonError::into_inner) = articles;
    }

    pub fn fail_feed(&self, fail: bool) {
        self.fail_feed.store(fail, Ordering::SeqCst);
    }

    pub fn feed_calls(&self) -> usize {
        self.feed_calls.load(Ordering::SeqCst)
    }

    pub fn fail_interactions(&self, fail: bool) {
        self.fail_interactions.store(fail, Ordering::SeqCst);
    }

    /// Interaction sends block until `release_interaction` is called once
    /// per send.
    pub fn hold_interactions(&self) {
        self.hold_interactions.store(true, Ordering::SeqCst);
    }

    pub fn release_interaction(&self) {
        self.interaction_gate.notify_one();
    }

    pub fn interaction_attempts(&self) -> usize {
        self.interaction_attempts.load(Ordering::SeqCst)
    }

    pub fn interactions(&self) -> Vec<(ArticleId, InteractionAction)> {
        self.interactions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|e| (e.article_id().clone(), e.action()))
            .collect()
    }

    pub fn interaction_users(&self) -> Vec<UserId> {
        self.interactions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|e| e.user_id().clone())
            .collect()
    }

    pub fn count(&self, id: i64, action: InteractionAction) -> usize {
        let id = ArticleId::from(id);
        self.interactions()
            .into_iter()
            .filter(|(article_id, a)| *article_id == id && *a == action)
            .count()
    }

    pub fn set_answer(&self, answer: &str, related: Vec<Article>) {
        *self.answer.lock().unwrap_or_else(PoisonError::into_inner) = Some(SearchResult {
            answer: answer.to_string(),
            related_articles: related,
        });
    }

    pub fn fail_search(&self, fail: bool) {
        self.fail_search.store(fail, Ordering::SeqCst);
    }

    /// Searches block until `release_search` is called once per request.
    pub fn hold_searches(&self) {
        self.hold_search.store(true, Ordering::SeqCst);
    }

    pub fn release_search(&self) {
        self.search_gate.notify_one();
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl NewsBackend for FakeBackend {
    async fn fetch_feed(&self, _user: &UserId) -> Result<Vec<Article>> {
        self.feed_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_feed.load(Ordering::SeqCst) {
            return Err(AppError::FetchError("feed unavailable".to_string()));
        }
        Ok(self.feed.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    async fn record_interaction(&self, event: &InteractionEvent) -> Result<()> {
        self.interaction_attempts.fetch_add(1, Ordering::SeqCst);
        if self.hold_interactions.load(Ordering::SeqCst) {
            self.interaction_gate.notified().await;
        }
        if self.fail_interactions.load(Ordering::SeqCst) {
            return Err(AppError::FetchError("interaction endpoint down".to_string()));
        }
        self.interactions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }

    async fn search(&self, query: &str) -> Result<SearchResult> {
        self.queries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(query.to_string());
        if self.hold_search.load(Ordering::SeqCst) {
            self.search_gate.notified().await;
        }
        if self.fail_search.load(Ordering::SeqCst) {
            return Err(AppError::FetchError("search unavailable".to_string()));
        }
        self.answer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| AppError::ParseError("no answer configured".to_string()))
    }
}
