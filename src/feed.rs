use std::sync::Arc;

use tracing::{error, info, warn};

use crate::api::client::NewsBackend;
use crate::api::models::{Article, ArticleId, UserId};
use crate::card::{Card, CardInput, Transition};
use crate::emitter::InteractionEmitter;
use crate::viewport::{CardHandle, CardSurface, ViewportObserver, VisibilityProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedStatus {
    /// Mounted, load not finished yet.
    Loading,
    /// Load finished (or failed) with nothing to show.
    Empty,
    Ready,
}

/// Owns one user's feed for the lifetime of a mount.
pub struct FeedController {
    user_id: UserId,
    backend: Arc<dyn NewsBackend>,
    emitter: InteractionEmitter,
    surface: Arc<dyn CardSurface>,
    observer: ViewportObserver,
    cards: Vec<Card>,
    status: FeedStatus,
    load_started: bool,
    next_handle: u64,
}

impl FeedController {
    pub fn new(
        backend: Arc<dyn NewsBackend>,
        user_id: UserId,
        surface: Arc<dyn CardSurface>,
        visibility: Arc<dyn VisibilityProvider>,
    ) -> Self {
        let emitter = InteractionEmitter::new(Arc::clone(&backend), user_id.clone());
        Self {
            user_id,
            backend,
            emitter,
            surface,
            observer: ViewportObserver::new(visibility),
            cards: Vec::new(),
            status: FeedStatus::Loading,
            load_started: false,
            next_handle: 0,
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn emitter(&self) -> &InteractionEmitter {
        &self.emitter
    }

    pub fn status(&self) -> FeedStatus {
        self.status
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn card(&self, id: &ArticleId) -> Option<&Card> {
        self.cards.iter().find(|card| card.id() == id)
    }

    /// Loads the feed once for this mount. Failures are logged and leave an
    /// empty feed; nothing is retried.
    pub async fn load(&mut self) -> &[Card] {
        if self.load_started {
            warn!(user_id = %self.user_id, "feed already loaded for this mount");
            return &self.cards;
        }
        self.load_started = true;
        self.status = FeedStatus::Loading;

        match self.backend.fetch_feed(&self.user_id).await {
            Ok(articles) => {
                info!(user_id = %self.user_id, count = articles.len(), "feed loaded");
                self.replace(articles);
            }
            Err(e) => {
                error!(user_id = %self.user_id, "Error fetching feed: {}", e);
                self.replace(Vec::new());
            }
        }
        &self.cards
    }

    /// Tears down every card. The next `load` starts a new mount.
    pub fn unmount(&mut self) {
        self.teardown();
        self.cards.clear();
        self.status = FeedStatus::Loading;
        self.load_started = false;
    }

    /// A fresh mount: all cards are rebuilt with new view state.
    pub async fn reload(&mut self) -> &[Card] {
        self.unmount();
        self.load().await
    }

    pub fn tap(&self, id: &ArticleId) -> Transition {
        self.handle_input(id, CardInput::Body)
    }

    pub fn close(&self, id: &ArticleId) -> Transition {
        self.handle_input(id, CardInput::Close)
    }

    pub fn handle_input(&self, id: &ArticleId, input: CardInput) -> Transition {
        match self.card(id) {
            Some(card) => card.handle_input(input),
            None => {
                warn!(article_id = %id, ?input, "input for unknown card");
                Transition::Unchanged
            }
        }
    }

    fn replace(&mut self, articles: Vec<Article>) {
        self.teardown();

        let cards: Vec<Card> = articles
            .into_iter()
            .map(|article| {
                let handle = CardHandle(self.next_handle);
                self.next_handle += 1;
                Card::new(Arc::new(article), handle, self.emitter.clone())
            })
            .collect();
        self.status = if cards.is_empty() {
            FeedStatus::Empty
        } else {
            FeedStatus::Ready
        };
        self.cards = cards;

        for card in &self.cards {
            self.surface.attach(card.handle());
            let seen = card.clone();
            self.observer.bind(card.handle(), move || {
                seen.mark_viewed();
            });
        }
    }

    /// Unbinds every card before detaching any: a detach reflows the
    /// surface, which must not reach a card that is still observed.
    fn teardown(&self) {
        self.observer.unbind_all();
        for card in &self.cards {
            self.surface.detach(card.handle());
        }
    }
}

impl Drop for FeedController {
    fn drop(&mut self) {
        self.teardown();
    }
}
