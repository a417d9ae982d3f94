// ═══════════════════════════════════════════════════════════════════
// Service Tests — DataStore, SeriesCache, SelectionController
// ═══════════════════════════════════════════════════════════════════

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

use market_board_core::errors::CoreError;
use market_board_core::models::instrument::{Instrument, InstrumentSet};
use market_board_core::models::series::{Period, RawSample, Selection};
use market_board_core::models::settings::NumberLocale;
use market_board_core::models::sort::{SortDirection, SortKey};
use market_board_core::models::status::FetchStatus;
use market_board_core::providers::traits::MarketDataProvider;
use market_board_core::services::data_store::{DataStore, RefreshOutcome};
use market_board_core::services::selection::{DetailState, SelectionController};
use market_board_core::services::series_cache::{SelectOutcome, SeriesCache};

// ═══════════════════════════════════════════════════════════════════
// Scripted Provider
// ═══════════════════════════════════════════════════════════════════

type Reply<T> = Result<T, CoreError>;

/// One scripted answer to `fetch_markets`.
enum Step {
    Now(Reply<Vec<Instrument>>),
    /// Resolves only when the test sends on the paired channel.
    Gate(oneshot::Receiver<Reply<Vec<Instrument>>>),
}

/// Mock provider whose answers are queued (markets) or gated per key
/// (series) by the test. Unscripted calls succeed with fixture data.
#[derive(Default)]
struct ScriptedProvider {
    market_steps: Mutex<VecDeque<Step>>,
    series_gates: Mutex<HashMap<(String, u32), oneshot::Receiver<Reply<Vec<RawSample>>>>>,
    market_calls: AtomicUsize,
    series_calls: Mutex<Vec<(String, u32)>>,
}

impl ScriptedProvider {
    fn push_now(&self, reply: Reply<Vec<Instrument>>) {
        self.market_steps.lock().unwrap().push_back(Step::Now(reply));
    }

    fn push_gate(&self) -> oneshot::Sender<Reply<Vec<Instrument>>> {
        let (tx, rx) = oneshot::channel();
        self.market_steps.lock().unwrap().push_back(Step::Gate(rx));
        tx
    }

    fn gate_series(&self, id: &str, days: u32) -> oneshot::Sender<Reply<Vec<RawSample>>> {
        let (tx, rx) = oneshot::channel();
        self.series_gates
            .lock()
            .unwrap()
            .insert((id.to_string(), days), rx);
        tx
    }

    fn market_calls(&self) -> usize {
        self.market_calls.load(Ordering::SeqCst)
    }

    fn series_calls(&self) -> Vec<(String, u32)> {
        self.series_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MarketDataProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "Scripted"
    }

    async fn fetch_markets(&self, _currency: &str) -> Result<Vec<Instrument>, CoreError> {
        self.market_calls.fetch_add(1, Ordering::SeqCst);
        let step = self.market_steps.lock().unwrap().pop_front();
        match step {
            Some(Step::Now(reply)) => reply,
            Some(Step::Gate(rx)) => rx
                .await
                .unwrap_or_else(|_| Err(CoreError::Network("gate dropped".into()))),
            None => Ok(xyz()),
        }
    }

    async fn fetch_series(
        &self,
        instrument_id: &str,
        _currency: &str,
        days: u32,
    ) -> Result<Vec<RawSample>, CoreError> {
        self.series_calls
            .lock()
            .unwrap()
            .push((instrument_id.to_string(), days));
        let gate = self
            .series_gates
            .lock()
            .unwrap()
            .remove(&(instrument_id.to_string(), days));
        match gate {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(CoreError::Network("gate dropped".into()))),
            None => Ok(samples(days as usize, 10.0)),
        }
    }
}

/// X: cap 100 price 50, Y: cap 80 price 30, Z: cap 120 price 10.
fn xyz() -> Vec<Instrument> {
    vec![
        Instrument::new("x", "xxx", "Xcoin").with_snapshot(50.0, 1.0, 5.0, 100.0),
        Instrument::new("y", "yyy", "Ycoin").with_snapshot(30.0, -2.0, 7.0, 80.0),
        Instrument::new("z", "zzz", "Zcoin").with_snapshot(10.0, 0.5, 3.0, 120.0),
    ]
}

fn samples(count: usize, base: f64) -> Vec<RawSample> {
    (0..count)
        .map(|i| RawSample::new(1_709_596_800_000 + (i as i64) * 86_400_000, base + i as f64))
        .collect()
}

fn network_error() -> CoreError {
    CoreError::Network("connection reset".into())
}

fn store_with(provider: &Arc<ScriptedProvider>) -> DataStore {
    DataStore::new(provider.clone(), "brl", Duration::from_secs(30))
}

fn cache_with(provider: &Arc<ScriptedProvider>) -> SeriesCache {
    SeriesCache::new(provider.clone(), "brl", NumberLocale::PtBr)
}

// ═══════════════════════════════════════════════════════════════════
// DataStore — refresh cycle
// ═══════════════════════════════════════════════════════════════════

mod data_store_refresh {
    use super::*;

    #[tokio::test]
    async fn starts_idle_and_empty() {
        let provider = Arc::new(ScriptedProvider::default());
        let store = store_with(&provider);
        let state = store.snapshot();
        assert!(state.status.is_idle());
        assert!(state.instruments().is_empty());
        assert!(state.refreshed_at.is_none());
    }

    #[tokio::test]
    async fn first_refresh_applies_set() {
        let provider = Arc::new(ScriptedProvider::default());
        let store = store_with(&provider);

        assert_eq!(store.refresh().await, RefreshOutcome::Applied(3));

        let state = store.snapshot();
        assert!(state.status.is_ready());
        assert!(state.has_baseline());
        assert!(state.refreshed_at.is_some());
        let set = state.instruments();
        let ids: Vec<&str> = set.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y", "z"]);
    }

    #[tokio::test]
    async fn first_fetch_shows_loading() {
        let provider = Arc::new(ScriptedProvider::default());
        let gate = provider.push_gate();
        let store = store_with(&provider);

        let s = store.clone();
        let pending = tokio::spawn(async move { s.refresh().await });
        tokio::task::yield_now().await;

        assert!(store.is_initial_loading());
        gate.send(Ok(xyz())).unwrap();
        assert_eq!(pending.await.unwrap(), RefreshOutcome::Applied(3));
        assert!(!store.is_initial_loading());
    }

    #[tokio::test]
    async fn background_refresh_never_shows_loading() {
        let provider = Arc::new(ScriptedProvider::default());
        let store = store_with(&provider);
        store.refresh().await;

        let gate = provider.push_gate();
        let s = store.clone();
        let pending = tokio::spawn(async move { s.refresh().await });
        tokio::task::yield_now().await;

        assert!(store.snapshot().status.is_ready());
        assert!(!store.is_initial_loading());
        gate.send(Ok(vec![Instrument::new("w", "www", "Wcoin")])).unwrap();
        assert_eq!(pending.await.unwrap(), RefreshOutcome::Applied(1));
        assert_eq!(store.instruments().len(), 1);
    }

    #[tokio::test]
    async fn failure_after_baseline_keeps_set_and_status() {
        let provider = Arc::new(ScriptedProvider::default());
        let store = store_with(&provider);
        store.refresh().await;
        let before = store.snapshot();

        provider.push_now(Err(network_error()));
        let outcome = store.refresh().await;

        assert_eq!(
            outcome,
            RefreshOutcome::Retained("Network error: connection reset".into())
        );
        let after = store.snapshot();
        assert!(after.status.is_ready());
        assert_eq!(after.instruments(), before.instruments());
        assert_eq!(after.refreshed_at, before.refreshed_at);
    }

    #[tokio::test]
    async fn first_failure_is_surfaced() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.push_now(Err(CoreError::MalformedResponse("expected array".into())));
        let store = store_with(&provider);

        let outcome = store.refresh().await;

        assert!(matches!(outcome, RefreshOutcome::Failed(_)));
        assert_eq!(
            store.snapshot().status.failure(),
            Some("Malformed response: expected array")
        );
        assert!(store.instruments().is_empty());
    }

    #[tokio::test]
    async fn recovers_after_first_failure_without_loading_flash() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.push_now(Err(network_error()));
        let store = store_with(&provider);
        store.refresh().await;

        let gate = provider.push_gate();
        let s = store.clone();
        let pending = tokio::spawn(async move { s.refresh().await });
        tokio::task::yield_now().await;
        // Retries after a failed first fetch keep the failure visible.
        assert!(store.snapshot().status.is_failed());

        gate.send(Ok(xyz())).unwrap();
        assert_eq!(pending.await.unwrap(), RefreshOutcome::Applied(3));
        assert!(store.snapshot().status.is_ready());
    }

    #[tokio::test]
    async fn overlapping_refresh_is_skipped() {
        let provider = Arc::new(ScriptedProvider::default());
        let gate = provider.push_gate();
        let store = store_with(&provider);

        let s = store.clone();
        let first = tokio::spawn(async move { s.refresh().await });
        tokio::task::yield_now().await;

        assert_eq!(store.refresh().await, RefreshOutcome::Skipped);
        assert_eq!(provider.market_calls(), 1);

        gate.send(Ok(xyz())).unwrap();
        assert_eq!(first.await.unwrap(), RefreshOutcome::Applied(3));

        // The in-flight slot is free again.
        assert_eq!(store.refresh().await, RefreshOutcome::Applied(3));
        assert_eq!(provider.market_calls(), 2);
    }

    #[tokio::test]
    async fn subscribers_see_replacement() {
        let provider = Arc::new(ScriptedProvider::default());
        let store = store_with(&provider);
        let mut rx = store.subscribe();

        store.refresh().await;

        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().instruments().len(), 3);
    }

    #[tokio::test]
    async fn swallowed_failure_does_not_notify() {
        let provider = Arc::new(ScriptedProvider::default());
        let store = store_with(&provider);
        store.refresh().await;
        let mut rx = store.subscribe();
        rx.borrow_and_update();

        provider.push_now(Err(network_error()));
        store.refresh().await;

        assert!(!rx.has_changed().unwrap());
    }
}

// ═══════════════════════════════════════════════════════════════════
// DataStore — loop lifecycle
// ═══════════════════════════════════════════════════════════════════

mod data_store_loop {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fetches_immediately_then_every_interval() {
        let provider = Arc::new(ScriptedProvider::default());
        let store = store_with(&provider);
        store.start();
        assert!(store.is_running());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(provider.market_calls(), 1);
        assert_eq!(store.instruments().len(), 3);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(provider.market_calls(), 2);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(provider.market_calls(), 4);

        store.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn start_twice_runs_one_loop() {
        let provider = Arc::new(ScriptedProvider::default());
        let store = store_with(&provider);
        store.start();
        store.start();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(provider.market_calls(), 1);
        store.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_timer() {
        let provider = Arc::new(ScriptedProvider::default());
        let store = store_with(&provider);
        store.start();
        tokio::time::sleep(Duration::from_secs(1)).await;

        store.stop();
        assert!(!store.is_running());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(provider.market_calls(), 1);
    }

    #[tokio::test]
    async fn result_after_stop_is_discarded() {
        let provider = Arc::new(ScriptedProvider::default());
        let gate = provider.push_gate();
        let store = store_with(&provider);

        let s = store.clone();
        let pending = tokio::spawn(async move { s.refresh().await });
        tokio::task::yield_now().await;

        store.stop();
        gate.send(Ok(xyz())).unwrap();

        assert_eq!(pending.await.unwrap(), RefreshOutcome::Discarded);
        assert!(store.instruments().is_empty());
        assert!(!store.snapshot().status.is_ready());
    }

    #[tokio::test]
    async fn refresh_after_stop_is_discarded() {
        let provider = Arc::new(ScriptedProvider::default());
        let store = store_with(&provider);
        store.stop();

        assert_eq!(store.refresh().await, RefreshOutcome::Discarded);
        assert_eq!(provider.market_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_resumes_refreshing() {
        let provider = Arc::new(ScriptedProvider::default());
        let store = store_with(&provider);
        store.start();
        tokio::time::sleep(Duration::from_secs(1)).await;
        store.stop();

        store.start();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(provider.market_calls(), 2);
        assert!(store.snapshot().status.is_ready());
        store.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn restart_fetches_immediately_despite_stale_refresh() {
        let provider = Arc::new(ScriptedProvider::default());
        let gate = provider.push_gate();
        let store = store_with(&provider);

        let s = store.clone();
        let stale = tokio::spawn(async move { s.refresh().await });
        tokio::task::yield_now().await;
        assert!(store.is_initial_loading());

        store.stop();
        store.start();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(provider.market_calls(), 2);
        assert_eq!(store.instruments().len(), 3);
        assert!(store.snapshot().status.is_ready());

        gate.send(Ok(vec![Instrument::new("w", "www", "Wcoin")])).unwrap();
        assert_eq!(stale.await.unwrap(), RefreshOutcome::Discarded);
        assert_eq!(store.instruments().len(), 3);

        // The stale refresh finishing does not free the current slot early,
        // and the current one finishing frees it for the next call.
        assert_eq!(store.refresh().await, RefreshOutcome::Applied(3));
        store.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn background_failure_keeps_table() {
        let provider = Arc::new(ScriptedProvider::default());
        let store = store_with(&provider);
        store.start();
        tokio::time::sleep(Duration::from_secs(1)).await;

        provider.push_now(Err(network_error()));
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(provider.market_calls(), 2);
        assert_eq!(store.instruments().len(), 3);
        assert!(store.snapshot().status.is_ready());
        store.stop();
    }
}

// ═══════════════════════════════════════════════════════════════════
// SeriesCache
// ═══════════════════════════════════════════════════════════════════

mod series_cache {
    use super::*;

    #[tokio::test]
    async fn select_sets_loading_immediately() {
        let provider = Arc::new(ScriptedProvider::default());
        let _gate = provider.gate_series("x", 7);
        let cache = cache_with(&provider);

        let _handle = cache.select("x", Period::Week);

        let state = cache.state();
        assert!(state.status.is_loading());
        assert_eq!(state.selection, Some(Selection::new("x", Period::Week)));
    }

    #[tokio::test]
    async fn success_replaces_series() {
        let provider = Arc::new(ScriptedProvider::default());
        let cache = cache_with(&provider);

        let outcome = cache.select("x", Period::Week).await.unwrap();

        assert_eq!(outcome, SelectOutcome::Applied(7));
        let state = cache.state();
        let series = state.series().unwrap();
        assert_eq!(series.selection(), &Selection::new("x", Period::Week));
        assert_eq!(series.points()[0].date, "05/03/2024");
        assert_eq!(series.points()[6].price, 16.0);
    }

    #[tokio::test]
    async fn failure_clears_previous_series() {
        let provider = Arc::new(ScriptedProvider::default());
        let cache = cache_with(&provider);
        cache.select("x", Period::Week).await.unwrap();

        let gate = provider.gate_series("y", 30);
        let handle = cache.select("y", Period::Month);
        gate.send(Err(network_error())).unwrap();

        assert!(matches!(handle.await.unwrap(), SelectOutcome::Failed(_)));
        let state = cache.state();
        assert_eq!(state.status.failure(), Some("Network error: connection reset"));
        assert!(state.series().is_none());
    }

    #[tokio::test]
    async fn superseded_result_is_discarded_when_it_arrives_first() {
        let provider = Arc::new(ScriptedProvider::default());
        let gate_a = provider.gate_series("a", 7);
        let gate_b = provider.gate_series("b", 30);
        let cache = cache_with(&provider);

        let handle_a = cache.select("a", Period::Week);
        let handle_b = cache.select("b", Period::Month);

        gate_a.send(Ok(samples(3, 1.0))).unwrap();
        assert_eq!(handle_a.await.unwrap(), SelectOutcome::Superseded);
        assert!(cache.state().status.is_loading());

        gate_b.send(Ok(samples(5, 2.0))).unwrap();
        assert_eq!(handle_b.await.unwrap(), SelectOutcome::Applied(5));

        let state = cache.state();
        let series = state.series().unwrap();
        assert_eq!(series.selection(), &Selection::new("b", Period::Month));
        assert_eq!(series.len(), 5);
    }

    #[tokio::test]
    async fn superseded_result_is_discarded_when_it_arrives_last() {
        let provider = Arc::new(ScriptedProvider::default());
        let gate_a = provider.gate_series("a", 7);
        let gate_b = provider.gate_series("b", 30);
        let cache = cache_with(&provider);

        let handle_a = cache.select("a", Period::Week);
        let handle_b = cache.select("b", Period::Month);

        gate_b.send(Ok(samples(5, 2.0))).unwrap();
        assert_eq!(handle_b.await.unwrap(), SelectOutcome::Applied(5));
        gate_a.send(Ok(samples(3, 1.0))).unwrap();
        assert_eq!(handle_a.await.unwrap(), SelectOutcome::Superseded);

        let state = cache.state();
        assert_eq!(
            state.series().unwrap().selection(),
            &Selection::new("b", Period::Month)
        );
    }

    #[tokio::test]
    async fn superseded_failure_is_discarded_too() {
        let provider = Arc::new(ScriptedProvider::default());
        let gate_a = provider.gate_series("a", 7);
        let cache = cache_with(&provider);

        let handle_a = cache.select("a", Period::Week);
        let applied = cache.select("b", Period::Day).await.unwrap();
        assert_eq!(applied, SelectOutcome::Applied(1));

        gate_a.send(Err(network_error())).unwrap();
        assert_eq!(handle_a.await.unwrap(), SelectOutcome::Superseded);
        assert!(cache.state().status.is_ready());
    }

    #[tokio::test]
    async fn reselecting_same_pair_refetches() {
        let provider = Arc::new(ScriptedProvider::default());
        let cache = cache_with(&provider);
        cache.select("x", Period::Week).await.unwrap();
        cache.select("x", Period::Week).await.unwrap();
        assert_eq!(provider.series_calls().len(), 2);
    }
}

// ═══════════════════════════════════════════════════════════════════
// SelectionController
// ═══════════════════════════════════════════════════════════════════

mod selection_controller {
    use super::*;

    fn controller(provider: &Arc<ScriptedProvider>) -> SelectionController {
        SelectionController::new(cache_with(provider))
    }

    #[tokio::test]
    async fn open_detail_fetches_default_period_once() {
        let provider = Arc::new(ScriptedProvider::default());
        let mut ctl = controller(&provider);

        ctl.open_detail("x").await.unwrap();

        assert_eq!(
            ctl.detail(),
            &DetailState::Selecting(Selection::new("x", Period::Week))
        );
        assert_eq!(provider.series_calls(), vec![("x".to_string(), 7)]);
    }

    #[tokio::test]
    async fn change_period_fetches_only_new_period() {
        let provider = Arc::new(ScriptedProvider::default());
        let mut ctl = controller(&provider);

        ctl.open_detail("x").await.unwrap();
        ctl.change_period(Period::Month).unwrap().await.unwrap();

        assert_eq!(ctl.active_period(), Some(Period::Month));
        assert_eq!(
            provider.series_calls(),
            vec![("x".to_string(), 7), ("x".to_string(), 30)]
        );
        let state = ctl.series().state();
        assert_eq!(
            state.series().unwrap().selection(),
            &Selection::new("x", Period::Month)
        );
    }

    #[tokio::test]
    async fn change_period_without_detail_is_noop() {
        let provider = Arc::new(ScriptedProvider::default());
        let mut ctl = controller(&provider);

        assert!(ctl.change_period(Period::Quarter).is_none());
        assert_eq!(ctl.detail(), &DetailState::NoSelection);
        assert!(provider.series_calls().is_empty());
    }

    #[tokio::test]
    async fn close_detail_keeps_last_series() {
        let provider = Arc::new(ScriptedProvider::default());
        let mut ctl = controller(&provider);
        ctl.open_detail("x").await.unwrap();

        ctl.close_detail();

        assert_eq!(ctl.detail(), &DetailState::NoSelection);
        assert!(ctl.selection().is_none());
        assert!(ctl.series().state().status.is_ready());
    }

    #[tokio::test]
    async fn reopen_resets_to_default_period() {
        let provider = Arc::new(ScriptedProvider::default());
        let mut ctl = controller(&provider);
        ctl.open_detail("x").await.unwrap();
        ctl.change_period(Period::Day).unwrap().await.unwrap();
        ctl.close_detail();

        ctl.open_detail("y").await.unwrap();

        assert_eq!(ctl.active_period(), Some(Period::Week));
        assert_eq!(provider.series_calls().last(), Some(&("y".to_string(), 7)));
    }

    #[tokio::test]
    async fn sort_key_toggles() {
        let provider = Arc::new(ScriptedProvider::default());
        let mut ctl = controller(&provider);

        let spec = ctl.set_sort_key(SortKey::Price);
        assert_eq!(spec.direction, SortDirection::Ascending);
        let spec = ctl.set_sort_key(SortKey::Price);
        assert_eq!(spec.direction, SortDirection::Descending);
        let spec = ctl.set_sort_key(SortKey::Price);
        assert_eq!(spec.direction, SortDirection::Ascending);
        let spec = ctl.set_sort_key(SortKey::Name);
        assert_eq!(spec.key, SortKey::Name);
        assert_eq!(spec.direction, SortDirection::Ascending);
    }

    #[tokio::test]
    async fn visible_applies_search_and_sort() {
        let provider = Arc::new(ScriptedProvider::default());
        let mut ctl = controller(&provider);
        let list = xyz();

        ctl.set_search_text("coin");
        ctl.set_sort_key(SortKey::Price);
        let rows: Vec<&str> = ctl.visible(&list).iter().map(|i| i.id.as_str()).collect();
        assert_eq!(rows, vec!["z", "y", "x"]);

        ctl.set_search_text("YY");
        let rows: Vec<&str> = ctl.visible(&list).iter().map(|i| i.id.as_str()).collect();
        assert_eq!(rows, vec!["y"]);
        assert_eq!(ctl.search_text(), "YY");
    }

    #[tokio::test]
    async fn selected_instrument_lookup() {
        let provider = Arc::new(ScriptedProvider::default());
        let mut ctl = controller(&provider);
        let set = InstrumentSet::new(xyz());

        assert!(ctl.selected_instrument(&set).is_none());
        ctl.open_detail("y").await.unwrap();
        assert_eq!(ctl.selected_instrument(&set).map(|i| i.name.as_str()), Some("Ycoin"));
    }

    #[tokio::test]
    async fn status_is_independent_of_store() {
        let provider = Arc::new(ScriptedProvider::default());
        provider.push_now(Err(network_error()));
        let store = store_with(&provider);
        let mut ctl = controller(&provider);

        store.refresh().await;
        ctl.open_detail("x").await.unwrap();

        assert!(store.snapshot().status.is_failed());
        assert!(matches!(ctl.series().state().status, FetchStatus::Ready(_)));
    }
}
