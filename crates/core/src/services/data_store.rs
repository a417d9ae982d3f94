use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::logger::warn_if_slow;
use crate::models::instrument::InstrumentSet;
use crate::models::status::FetchStatus;
use crate::providers::traits::MarketDataProvider;

/// Fetches slower than this are reported on the `performance` target.
const SLOW_FETCH: Duration = Duration::from_secs(5);

/// Published state of the instrument table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketState {
    pub status: FetchStatus<InstrumentSet>,

    /// When the current instrument set was received.
    pub refreshed_at: Option<DateTime<Utc>>,

    // Bumped by `stop()`; a fetch started under an older generation is
    // never applied.
    generation: u64,
    stopped: bool,
    // Generation of the refresh currently holding the slot.
    in_flight: Option<u64>,
}

impl MarketState {
    /// The current instrument set, or an empty one before the first success.
    pub fn instruments(&self) -> InstrumentSet {
        self.status.ready().cloned().unwrap_or_default()
    }

    /// True once any refresh has succeeded.
    pub fn has_baseline(&self) -> bool {
        self.status.is_ready()
    }
}

/// Result of a single refresh cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// A new instrument set (of this many entries) replaced the old one.
    Applied(usize),
    /// The fetch failed; the previous set stays on display.
    Retained(String),
    /// The fetch failed and there is nothing to fall back to.
    Failed(String),
    /// Another refresh was still in flight.
    Skipped,
    /// The store was stopped while the fetch was in flight.
    Discarded,
}

/// Owner of the full instrument set and its background refresh loop.
///
/// Cheap to clone; clones share the same state. Readers either take a
/// `snapshot()` or `subscribe()` to be woken on every change.
#[derive(Clone)]
pub struct DataStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    provider: Arc<dyn MarketDataProvider>,
    currency: String,
    refresh_interval: Duration,
    state: watch::Sender<MarketState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Releases the in-flight slot when a refresh ends, including when the
/// refresh future is dropped by `stop()`. A slot already taken over by a
/// newer generation is left alone.
struct InFlightGuard<'a> {
    state: &'a watch::Sender<MarketState>,
    generation: u64,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let generation = self.generation;
        self.state.send_if_modified(|s| {
            if s.in_flight == Some(generation) {
                s.in_flight = None;
            }
            false
        });
    }
}

impl DataStore {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        currency: impl Into<String>,
        refresh_interval: Duration,
    ) -> Self {
        let (state, _) = watch::channel(MarketState::default());
        Self {
            inner: Arc::new(StoreInner {
                provider,
                currency: currency.into(),
                refresh_interval,
                state,
                task: Mutex::new(None),
            }),
        }
    }

    pub fn currency(&self) -> &str {
        &self.inner.currency
    }

    pub fn refresh_interval(&self) -> Duration {
        self.inner.refresh_interval
    }

    /// Clone of the current state.
    pub fn snapshot(&self) -> MarketState {
        self.inner.state.borrow().clone()
    }

    /// The current instrument set (empty before the first success).
    pub fn instruments(&self) -> InstrumentSet {
        self.inner.state.borrow().instruments()
    }

    /// Receiver that observes every state replacement.
    pub fn subscribe(&self) -> watch::Receiver<MarketState> {
        self.inner.state.subscribe()
    }

    /// True while the very first fetch is outstanding. Background refreshes
    /// never make this true again.
    pub fn is_initial_loading(&self) -> bool {
        self.inner.state.borrow().status.is_loading()
    }

    pub fn is_running(&self) -> bool {
        let task = self.inner.task.lock().unwrap_or_else(|e| e.into_inner());
        task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Start the refresh loop: one fetch now, then one per interval.
    ///
    /// Must be called from within a Tokio runtime. A no-op while the loop
    /// is already running.
    pub fn start(&self) {
        let mut task = self.inner.task.lock().unwrap_or_else(|e| e.into_inner());
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        self.inner.state.send_if_modified(|s| {
            s.stopped = false;
            false
        });

        let weak = Arc::downgrade(&self.inner);
        let every = self.inner.refresh_interval;
        info!(
            currency = %self.inner.currency,
            every_ms = every.as_millis() as u64,
            "market refresh loop started"
        );
        *task = Some(tokio::spawn(run_refresh_loop(weak, every)));
    }

    /// Stop the refresh loop. The pending timer is cancelled and any result
    /// still in flight is discarded.
    pub fn stop(&self) {
        self.inner.state.send_if_modified(|s| {
            s.generation += 1;
            s.stopped = true;
            false
        });

        let handle = self
            .inner
            .task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
            info!(currency = %self.inner.currency, "market refresh loop stopped");
        }
    }

    /// Run one refresh cycle now.
    ///
    /// - Sets `Loading` only when nothing has ever been fetched.
    /// - On success, swaps in the new set and sets `Ready`.
    /// - On failure, keeps an existing set untouched and only logs;
    ///   without one, sets `Failed`.
    pub async fn refresh(&self) -> RefreshOutcome {
        let inner = &self.inner;

        let mut generation = 0;
        let mut stopped = false;
        let mut busy = false;
        inner.state.send_if_modified(|s| {
            generation = s.generation;
            stopped = s.stopped;
            if s.stopped {
                return false;
            }
            // Only a refresh of the current generation blocks this one; a
            // stale one left over from before `stop()` does not.
            if s.in_flight == Some(s.generation) {
                busy = true;
                return false;
            }
            s.in_flight = Some(s.generation);
            if s.status.is_idle() {
                s.status = FetchStatus::Loading;
                true
            } else {
                false
            }
        });
        if stopped {
            return RefreshOutcome::Discarded;
        }
        if busy {
            debug!(currency = %inner.currency, "refresh already in flight, skipping");
            return RefreshOutcome::Skipped;
        }
        let _guard = InFlightGuard {
            state: &inner.state,
            generation,
        };

        let result = warn_if_slow(
            "fetch_markets",
            SLOW_FETCH,
            inner.provider.fetch_markets(&inner.currency),
        )
        .await;

        let mut outcome = RefreshOutcome::Discarded;
        inner.state.send_if_modified(|s| {
            if s.stopped || s.generation != generation {
                return false;
            }
            match result {
                Ok(list) => {
                    outcome = RefreshOutcome::Applied(list.len());
                    s.status = FetchStatus::Ready(InstrumentSet::new(list));
                    s.refreshed_at = Some(Utc::now());
                    true
                }
                Err(e) if s.status.is_ready() => {
                    outcome = RefreshOutcome::Retained(e.to_string());
                    false
                }
                Err(e) => {
                    outcome = RefreshOutcome::Failed(e.to_string());
                    s.status = FetchStatus::Failed(e.to_string());
                    true
                }
            }
        });

        match &outcome {
            RefreshOutcome::Applied(count) => {
                debug!(currency = %inner.currency, count = *count, "instrument set refreshed");
            }
            RefreshOutcome::Retained(reason) => {
                warn!(
                    provider = inner.provider.name(),
                    error = %reason,
                    "background refresh failed, keeping previous instruments"
                );
            }
            RefreshOutcome::Failed(reason) => {
                warn!(
                    provider = inner.provider.name(),
                    error = %reason,
                    "initial instrument fetch failed"
                );
            }
            RefreshOutcome::Discarded => {
                debug!(currency = %inner.currency, "store stopped, discarding refresh result");
            }
            RefreshOutcome::Skipped => {}
        }

        outcome
    }
}

impl std::fmt::Debug for DataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("DataStore")
            .field("provider", &self.inner.provider.name())
            .field("currency", &self.inner.currency)
            .field("instruments", &state.instruments().len())
            .field("refreshed_at", &state.refreshed_at)
            .finish()
    }
}

/// Refresh loop body. Holds only a weak reference so a dropped store ends
/// the loop on its next tick.
async fn run_refresh_loop(store: Weak<StoreInner>, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let Some(inner) = store.upgrade() else {
            break;
        };
        DataStore { inner }.refresh().await;
    }
}
