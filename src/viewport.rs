use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, warn};

use crate::error::{AppError, Result};

/// Fraction of a card that must be on screen before it counts as viewed.
pub const VIEW_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CardHandle(pub u64);

impl fmt::Display for CardHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "card#{}", self.0)
    }
}

/// Receives the current intersection ratio of an observed card.
pub type VisibilityCallback = Arc<dyn Fn(f64) + Send + Sync>;

/// Something that can tell when a card crosses a visibility threshold.
///
/// `observe` invokes the callback each time the card's ratio crosses
/// `threshold` in either direction, including immediately if it is already
/// past it. After `unobserve` the callback must not be invoked again.
pub trait VisibilityProvider: Send + Sync {
    fn observe(
        &self,
        handle: CardHandle,
        threshold: f64,
        callback: VisibilityCallback,
    ) -> Result<()>;

    fn unobserve(&self, handle: CardHandle);
}

/// The display tree cards are mounted into.
pub trait CardSurface: Send + Sync {
    fn attach(&self, handle: CardHandle);

    /// Removes the card and drops any observation of it.
    fn detach(&self, handle: CardHandle);
}

/// Provider for hosts without visibility detection. Views are never reported.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoVisibility;

impl VisibilityProvider for NoVisibility {
    fn observe(
        &self,
        handle: CardHandle,
        _threshold: f64,
        _callback: VisibilityCallback,
    ) -> Result<()> {
        Err(AppError::VisibilityUnavailable(format!("cannot observe {}", handle)))
    }

    fn unobserve(&self, _handle: CardHandle) {}
}

type FirstVisible = Box<dyn FnOnce() + Send>;

struct Binding {
    active: AtomicBool,
    on_first_visible: Mutex<Option<FirstVisible>>,
}

impl Binding {
    fn take(&self) -> Option<FirstVisible> {
        self.on_first_visible
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Reports the first time each bound card becomes visible, and only that.
pub struct ViewportObserver {
    provider: Arc<dyn VisibilityProvider>,
    bindings: Mutex<HashMap<CardHandle, Arc<Binding>>>,
}

impl ViewportObserver {
    pub fn new(provider: Arc<dyn VisibilityProvider>) -> Self {
        Self {
            provider,
            bindings: Mutex::new(HashMap::new()),
        }
    }

    /// Watches `handle` and runs `on_first_visible` at most once, the first
    /// time at least [`VIEW_THRESHOLD`] of it is visible.
    ///
    /// Returns `false` when the provider cannot observe the card; the card
    /// then simply never reports a view.
    pub fn bind<F>(&self, handle: CardHandle, on_first_visible: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.unbind(handle);

        let binding = Arc::new(Binding {
            active: AtomicBool::new(true),
            on_first_visible: Mutex::new(Some(Box::new(on_first_visible))),
        });
        self.lock_bindings().insert(handle, Arc::clone(&binding));

        let watched = Arc::clone(&binding);
        let callback: VisibilityCallback = Arc::new(move |ratio| {
            if ratio < VIEW_THRESHOLD || !watched.active.load(Ordering::SeqCst) {
                return;
            }
            if let Some(first_visible) = watched.take() {
                first_visible();
            }
        });

        match self.provider.observe(handle, VIEW_THRESHOLD, callback) {
            Ok(()) => true,
            Err(e) => {
                warn!(%handle, "view tracking disabled: {}", e);
                if let Some(binding) = self.lock_bindings().remove(&handle) {
                    binding.active.store(false, Ordering::SeqCst);
                }
                false
            }
        }
    }

    /// Stops watching `handle`. Pending callbacks are cancelled.
    pub fn unbind(&self, handle: CardHandle) {
        let removed = self.lock_bindings().remove(&handle);
        if let Some(binding) = removed {
            binding.active.store(false, Ordering::SeqCst);
            drop(binding.take());
            self.provider.unobserve(handle);
            debug!(%handle, "unbound");
        }
    }

    pub fn unbind_all(&self) {
        let handles: Vec<CardHandle> = self.lock_bindings().keys().copied().collect();
        for handle in handles {
            self.unbind(handle);
        }
    }

    pub fn is_bound(&self, handle: CardHandle) -> bool {
        self.lock_bindings().contains_key(&handle)
    }

    fn lock_bindings(&self) -> std::sync::MutexGuard<'_, HashMap<CardHandle, Arc<Binding>>> {
        self.bindings.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ViewportObserver {
    fn drop(&mut self) {
        self.unbind_all();
    }
}

struct Watcher {
    threshold: f64,
    callback: VisibilityCallback,
    past_threshold: bool,
}

struct ReelState {
    rows: u64,
    card_rows: u64,
    offset: u64,
    cards: Vec<CardHandle>,
    watchers: HashMap<CardHandle, Watcher>,
}

impl ReelState {
    fn max_offset(&self) -> u64 {
        (self.cards.len() as u64 * self.card_rows).saturating_sub(self.rows)
    }

    fn ratio(&self, handle: CardHandle) -> Option<f64> {
        let index = self.cards.iter().position(|h| *h == handle)? as u64;
        let top = index * self.card_rows;
        let bottom = top + self.card_rows;
        let visible_top = top.max(self.offset);
        let visible_bottom = bottom.min(self.offset + self.rows);
        let overlap = visible_bottom.saturating_sub(visible_top);
        Some(overlap as f64 / self.card_rows as f64)
    }

    /// Updates every watcher and returns the callbacks whose side of the
    /// threshold changed. They are invoked after the lock is released.
    fn crossings(&mut self) -> Vec<(VisibilityCallback, f64)> {
        let ratios: Vec<(CardHandle, f64)> = self
            .watchers
            .keys()
            .map(|h| (*h, self.ratio(*h).unwrap_or(0.0)))
            .collect();

        let mut fired = Vec::new();
        for (handle, ratio) in ratios {
            if let Some(watcher) = self.watchers.get_mut(&handle) {
                let past = ratio > 0.0 && ratio >= watcher.threshold;
                if past != watcher.past_threshold {
                    watcher.past_threshold = past;
                    fired.push((Arc::clone(&watcher.callback), ratio));
                }
            }
        }
        fired
    }
}

/// A vertical reel of equal-height cards seen through a fixed-height window.
///
/// Geometry is in abstract rows; a terminal host would use text rows.
pub struct ReelViewport {
    state: Mutex<ReelState>,
}

impl ReelViewport {
    pub fn new(rows: u32, card_rows: u32) -> Self {
        Self {
            state: Mutex::new(ReelState {
                rows: u64::from(rows.max(1)),
                card_rows: u64::from(card_rows.max(1)),
                offset: 0,
                cards: Vec::new(),
                watchers: HashMap::new(),
            }),
        }
    }

    pub fn scroll_to(&self, offset: u64) {
        self.update(|state| state.offset = offset.min(state.max_offset()));
    }

    pub fn scroll_by(&self, delta: i64) {
        self.update(|state| {
            let target = if delta < 0 {
                state.offset.saturating_sub(delta.unsigned_abs())
            } else {
                state.offset.saturating_add(delta as u64)
            };
            state.offset = target.min(state.max_offset());
        });
    }

    /// Aligns the top of the `index`th card with the top of the window.
    pub fn snap_to(&self, index: usize) {
        self.update(|state| {
            state.offset = (index as u64 * state.card_rows).min(state.max_offset());
        });
    }

    pub fn offset(&self) -> u64 {
        self.lock().offset
    }

    pub fn len(&self) -> usize {
        self.lock().cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().cards.is_empty()
    }

    /// Visible fraction of `handle`, or `None` if it is not attached.
    pub fn ratio(&self, handle: CardHandle) -> Option<f64> {
        self.lock().ratio(handle)
    }

    fn update(&self, change: impl FnOnce(&mut ReelState)) {
        let fired = {
            let mut state = self.lock();
            change(&mut state);
            state.crossings()
        };
        for (callback, ratio) in fired {
            callback(ratio);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ReelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CardSurface for ReelViewport {
    fn attach(&self, handle: CardHandle) {
        self.update(|state| {
            if !state.cards.contains(&handle) {
                state.cards.push(handle);
            }
        });
    }

    fn detach(&self, handle: CardHandle) {
        self.update(|state| {
            state.cards.retain(|h| *h != handle);
            state.watchers.remove(&handle);
            state.offset = state.offset.min(state.max_offset());
        });
    }
}

impl VisibilityProvider for ReelViewport {
    fn observe(
        &self,
        handle: CardHandle,
        threshold: f64,
        callback: VisibilityCallback,
    ) -> Result<()> {
        let fired = {
            let mut state = self.lock();
            if !state.cards.contains(&handle) {
                return Err(AppError::Detached(handle.0));
            }
            state.watchers.insert(
                handle,
                Watcher {
                    threshold,
                    callback,
                    past_threshold: false,
                },
            );
            state.crossings()
        };
        for (callback, ratio) in fired {
            callback(ratio);
        }
        Ok(())
    }

    fn unobserve(&self, handle: CardHandle) {
        self.lock().watchers.remove(&handle);
    }
}
