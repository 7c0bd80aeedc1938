use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::NaiveDateTime;
use tracing::info;

use crate::api::models::{Article, ArticleId, InteractionAction};
use crate::emitter::InteractionEmitter;
use crate::viewport::CardHandle;

/// Transient per-card state. Lives exactly as long as the mounted card.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CardViewState {
    pub expanded: bool,
    /// Monotonic: once set it is never cleared.
    pub has_been_viewed: bool,
}

/// Input regions of a card. The close control is its own region and never
/// reaches the body handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardInput {
    Body,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Expanded,
    Collapsed,
    Unchanged,
}

/// What the renderer should draw for a card.
#[derive(Debug, Clone, PartialEq)]
pub enum CardView<'a> {
    Collapsed {
        short_summary: &'a str,
        source: &'a str,
    },
    Expanded {
        title: &'a str,
        long_summary: &'a str,
        url: &'a str,
        source: &'a str,
        published_at: Option<NaiveDateTime>,
    },
}

/// One mounted article card: `Collapsed` ⇄ `Expanded`.
///
/// Every entry into `Expanded` emits a `click`; closing emits nothing.
/// Clones share state, so the viewport callback and the input handler act
/// on the same card.
#[derive(Clone)]
pub struct Card {
    article: Arc<Article>,
    handle: CardHandle,
    state: Arc<Mutex<CardViewState>>,
    emitter: InteractionEmitter,
}

impl Card {
    pub fn new(article: Arc<Article>, handle: CardHandle, emitter: InteractionEmitter) -> Self {
        Self {
            article,
            handle,
            state: Arc::new(Mutex::new(CardViewState::default())),
            emitter,
        }
    }

    pub fn article(&self) -> &Article {
        &self.article
    }

    pub fn id(&self) -> &ArticleId {
        &self.article.id
    }

    pub fn handle(&self) -> CardHandle {
        self.handle
    }

    pub fn state(&self) -> CardViewState {
        *self.lock()
    }

    pub fn is_expanded(&self) -> bool {
        self.lock().expanded
    }

    pub fn has_been_viewed(&self) -> bool {
        self.lock().has_been_viewed
    }

    pub fn handle_input(&self, input: CardInput) -> Transition {
        match input {
            CardInput::Body => self.tap(),
            CardInput::Close => self.close(),
        }
    }

    /// Primary tap on the card body.
    pub fn tap(&self) -> Transition {
        {
            let mut state = self.lock();
            if state.expanded {
                return Transition::Unchanged;
            }
            state.expanded = true;
        }
        self.emitter.record(self.id(), InteractionAction::Click);
        Transition::Expanded
    }

    /// The dedicated close control.
    pub fn close(&self) -> Transition {
        let mut state = self.lock();
        if !state.expanded {
            return Transition::Unchanged;
        }
        state.expanded = false;
        Transition::Collapsed
    }

    /// Marks the card as seen and records the `view`. Returns `false` if it
    /// had already been seen.
    pub fn mark_viewed(&self) -> bool {
        {
            let mut state = self.lock();
            if state.has_been_viewed {
                return false;
            }
            state.has_been_viewed = true;
        }
        info!(article_id = %self.id(), "viewed article");
        self.emitter.record(self.id(), InteractionAction::View);
        true
    }

    pub fn view(&self) -> CardView<'_> {
        let article = self.article.as_ref();
        if self.is_expanded() {
            CardView::Expanded {
                title: &article.title,
                long_summary: &article.long_summary,
                url: &article.url,
                source: &article.source,
                published_at: article.published_at,
            }
        } else {
            CardView::Collapsed {
                short_summary: &article.short_summary,
                source: &article.source,
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, CardViewState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
