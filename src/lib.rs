pub mod api;
pub mod card;
pub mod config;
pub mod emitter;
pub mod error;
pub mod feed;
pub mod logging;
pub mod search;
pub mod viewport;

#[cfg(test)]
mod testing;

pub use api::client::{HttpBackend, NewsBackend};
pub use api::models::{
    Article, ArticleId, InteractionAction, InteractionEvent, SearchResult, UserId,
};
pub use card::{Card, CardInput, CardView, CardViewState, Transition};
pub use emitter::InteractionEmitter;
pub use error::{AppError, Result};
pub use feed::{FeedController, FeedStatus};
pub use search::{RejectReason, SearchController, SearchPhase, Submission};
pub use viewport::{
    CardHandle, CardSurface, NoVisibility, ReelViewport, ViewportObserver, VisibilityProvider,
    VIEW_THRESHOLD,
};
