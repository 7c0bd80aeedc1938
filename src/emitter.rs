use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::api::client::NewsBackend;
use crate::api::models::{ArticleId, InteractionAction, InteractionEvent, UserId};

/// Sends still running. Dropping the set lets them finish instead of
/// aborting them.
#[derive(Default)]
struct InFlight(JoinSet<()>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.detach_all();
    }
}

/// Best-effort interaction sender.
///
/// Each `record` is an independent task: nothing is queued, retried or
/// serialized, and a failure is only logged. Clones share the backend and
/// the set of sends still in flight, so any card can use its own clone.
#[derive(Clone)]
pub struct InteractionEmitter {
    backend: Arc<dyn NewsBackend>,
    user_id: UserId,
    in_flight: Arc<Mutex<InFlight>>,
}

impl InteractionEmitter {
    pub fn new(backend: Arc<dyn NewsBackend>, user_id: UserId) -> Self {
        Self {
            backend,
            user_id,
            in_flight: Arc::new(Mutex::new(InFlight::default())),
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Dispatches the event without waiting for it. Returns `false` when no
    /// runtime is available to run the send.
    pub fn record(&self, article_id: &ArticleId, action: InteractionAction) -> bool {
        let event = InteractionEvent::new(self.user_id.clone(), article_id.clone(), action);

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(
                    article_id = %event.article_id(),
                    %action,
                    "dropping interaction, no runtime: {}",
                    e
                );
                return false;
            }
        };

        let backend = Arc::clone(&self.backend);
        let mut in_flight = self.lock_in_flight();
        // Reap finished sends so the set only holds live ones.
        while in_flight.0.try_join_next().is_some() {}
        in_flight.0.spawn_on(
            async move {
                match backend.record_interaction(&event).await {
                    Ok(()) => debug!(
                        user_id = %event.user_id(),
                        article_id = %event.article_id(),
                        action = %event.action(),
                        at = %event.occurred_at(),
                        "recorded interaction"
                    ),
                    Err(e) => warn!(
                        user_id = %event.user_id(),
                        article_id = %event.article_id(),
                        action = %event.action(),
                        "error recording interaction: {}",
                        e
                    ),
                }
            },
            &runtime,
        );
        true
    }

    pub fn pending(&self) -> usize {
        self.lock_in_flight().0.len()
    }

    /// Waits up to `limit` for sends already dispatched. Nothing is resent.
    /// Returns `false` if some were still running at the deadline; those are
    /// left to finish on their own.
    pub async fn flush(&self, limit: Duration) -> bool {
        let deadline = Instant::now() + limit;
        loop {
            let mut sends = InFlight(std::mem::take(&mut self.lock_in_flight().0));
            if sends.0.is_empty() {
                return true;
            }
            let drained = tokio::time::timeout_at(deadline, async {
                while sends.0.join_next().await.is_some() {}
            })
            .await;
            if drained.is_err() {
                warn!(remaining = sends.0.len(), "interaction sends still pending");
                return false;
            }
        }
    }

    fn lock_in_flight(&self) -> MutexGuard<'_, InFlight> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{settle, FakeBackend};

    #[tokio::test]
    async fn records_event_for_configured_user() {
        let backend = Arc::new(FakeBackend::new());
        let emitter = InteractionEmitter::new(backend.clone(), UserId::new("9").unwrap());

        assert!(emitter.record(&ArticleId::from(4), InteractionAction::Click));
        assert!(emitter.flush(Duration::from_secs(1)).await);

        assert_eq!(backend.interactions(), vec![(ArticleId::from(4), InteractionAction::Click)]);
        assert_eq!(backend.interaction_users(), vec![UserId::new("9").unwrap()]);
    }

    #[tokio::test]
    async fn failures_are_swallowed() {
        let backend = Arc::new(FakeBackend::new());
        backend.fail_interactions(true);
        let emitter = InteractionEmitter::new(backend.clone(), UserId::new("1").unwrap());

        emitter.record(&ArticleId::from(1), InteractionAction::View);
        assert!(emitter.flush(Duration::from_secs(1)).await);
        assert_eq!(backend.interaction_attempts(), 1);
        assert!(backend.interactions().is_empty());
    }

    #[tokio::test]
    async fn flush_waits_for_sends_from_every_clone() {
        let backend = Arc::new(FakeBackend::new());
        let emitter = InteractionEmitter::new(backend.clone(), UserId::new("1").unwrap());
        let card_emitter = emitter.clone();

        card_emitter.record(&ArticleId::from(1), InteractionAction::View);
        card_emitter.record(&ArticleId::from(1), InteractionAction::Click);
        emitter.record(&ArticleId::from(2), InteractionAction::View);

        assert!(emitter.flush(Duration::from_secs(1)).await);
        assert_eq!(backend.interactions().len(), 3);
        assert_eq!(emitter.pending(), 0);
    }

    #[tokio::test]
    async fn flush_gives_up_at_the_deadline_without_cancelling() {
        let backend = Arc::new(FakeBackend::new());
        backend.hold_interactions();
        let emitter = InteractionEmitter::new(backend.clone(), UserId::new("1").unwrap());

        emitter.record(&ArticleId::from(1), InteractionAction::View);
        assert!(!emitter.flush(Duration::from_millis(20)).await);
        assert!(backend.interactions().is_empty());

        backend.release_interaction();
        settle().await;
        assert_eq!(backend.interactions(), vec![(ArticleId::from(1), InteractionAction::View)]);
        assert_eq!(backend.interaction_attempts(), 1);
    }

    #[tokio::test]
    async fn dropping_the_emitter_lets_sends_finish() {
        let backend = Arc::new(FakeBackend::new());
        backend.hold_interactions();
        let emitter = InteractionEmitter::new(backend.clone(), UserId::new("1").unwrap());

        emitter.record(&ArticleId::from(5), InteractionAction::Click);
        settle().await;
        drop(emitter);

        backend.release_interaction();
        settle().await;
        assert_eq!(backend.interactions(), vec![(ArticleId::from(5), InteractionAction::Click)]);
    }

    #[tokio::test]
    async fn flush_with_nothing_in_flight_returns_at_once() {
        let backend = Arc::new(FakeBackend::new());
        let emitter = InteractionEmitter::new(backend, UserId::new("1").unwrap());
        assert!(emitter.flush(Duration::ZERO).await);
    }

    #[test]
    fn without_runtime_the_event_is_dropped() {
        let backend = Arc::new(FakeBackend::new());
        let emitter = InteractionEmitter::new(backend.clone(), UserId::new("1").unwrap());

        assert!(!emitter.record(&ArticleId::from(1), InteractionAction::View));
        assert_eq!(emitter.pending(), 0);
        assert_eq!(backend.interaction_attempts(), 0);
    }
}
