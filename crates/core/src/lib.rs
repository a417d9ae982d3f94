pub mod errors;
pub mod logger;
pub mod models;
pub mod providers;
pub mod services;

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use errors::CoreError;
use models::{
    instrument::{Instrument, InstrumentSet},
    series::Period,
    settings::Settings,
    sort::{SortKey, SortSpec},
};
use providers::{coingecko::CoinGeckoProvider, traits::MarketDataProvider};
use services::{
    data_store::{DataStore, MarketState, RefreshOutcome},
    format,
    selection::{DetailState, SelectionController},
    series_cache::{SelectOutcome, SeriesCache, SeriesState},
};

/// Main entry point for the Market Board core library.
///
/// Bundles the instrument store, the series cache and the UI-local selection
/// state behind the intents a presentation layer issues. Rendering reads
/// `visible_rows()`, `market()` and `series()`.
#[must_use]
pub struct MarketBoard {
    settings: Settings,
    store: DataStore,
    selection: SelectionController,
}

impl std::fmt::Debug for MarketBoard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketBoard")
            .field("currency", &self.settings.display_currency)
            .field("store", &self.store)
            .field("detail", self.selection.detail())
            .field("search", &self.selection.search_text())
            .field("sort", &self.selection.sort())
            .finish()
    }
}

impl MarketBoard {
    /// Create a board backed by the public CoinGecko API.
    pub fn new(settings: Settings) -> Self {
        let provider = Arc::new(CoinGeckoProvider::from_settings(&settings));
        Self::with_provider(settings, provider)
    }

    /// Create a board from `MARKET_BOARD_*` environment variables.
    pub fn from_env() -> Result<Self, CoreError> {
        Ok(Self::new(Settings::from_env()?))
    }

    /// Create a board backed by any market data provider.
    pub fn with_provider(settings: Settings, provider: Arc<dyn MarketDataProvider>) -> Self {
        let store = DataStore::new(
            Arc::clone(&provider),
            settings.display_currency.clone(),
            settings.refresh_interval,
        );
        let series = SeriesCache::new(
            provider,
            settings.display_currency.clone(),
            settings.number_locale,
        );
        Self {
            settings,
            store,
            selection: SelectionController::new(series),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Begin background refreshing (first fetch immediately).
    ///
    /// Spawns a task, so it must be called from within a Tokio runtime.
    pub fn start(&self) {
        self.store.start();
    }

    /// Stop background refreshing. Call when the consuming view is torn down.
    pub fn stop(&self) {
        self.store.stop();
    }

    /// Run one refresh cycle on demand.
    pub async fn refresh(&self) -> RefreshOutcome {
        self.store.refresh().await
    }

    // ── Instrument table ────────────────────────────────────────────

    pub fn market(&self) -> MarketState {
        self.store.snapshot()
    }

    pub fn subscribe_market(&self) -> watch::Receiver<MarketState> {
        self.store.subscribe()
    }

    pub fn instruments(&self) -> InstrumentSet {
        self.store.instruments()
    }

    /// True only while the first-ever fetch is pending and nothing can be shown.
    pub fn is_initial_loading(&self) -> bool {
        self.store.is_initial_loading()
    }

    /// Filtered and sorted rows for the table.
    #[must_use]
    pub fn visible_rows(&self) -> Vec<Instrument> {
        let set = self.store.instruments();
        self.selection
            .visible(set.as_slice())
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn set_search_text(&mut self, text: impl Into<String>) {
        self.selection.set_search_text(text);
    }

    pub fn search_text(&self) -> &str {
        self.selection.search_text()
    }

    pub fn set_sort_key(&mut self, key: SortKey) -> SortSpec {
        self.selection.set_sort_key(key)
    }

    pub fn sort(&self) -> SortSpec {
        self.selection.sort()
    }

    // ── Detail view ─────────────────────────────────────────────────

    /// Open the detail view on the default period and fetch its series.
    ///
    /// Spawns the fetch, so it must be called from within a Tokio runtime.
    pub fn open_detail(&mut self, instrument_id: impl Into<String>) -> JoinHandle<SelectOutcome> {
        self.selection.open_detail(instrument_id)
    }

    /// Like `open_detail`, this spawns a fetch and needs a Tokio runtime.
    pub fn change_period(&mut self, period: Period) -> Option<JoinHandle<SelectOutcome>> {
        self.selection.change_period(period)
    }

    pub fn close_detail(&mut self) {
        self.selection.close_detail();
    }

    pub fn detail(&self) -> &DetailState {
        self.selection.detail()
    }

    /// Snapshot of the instrument open in the detail view, if any.
    #[must_use]
    pub fn selected_instrument(&self) -> Option<Instrument> {
        let set = self.store.instruments();
        self.selection.selected_instrument(&set).cloned()
    }

    pub fn series(&self) -> SeriesState {
        self.selection.series().state()
    }

    pub fn subscribe_series(&self) -> watch::Receiver<SeriesState> {
        self.selection.series().subscribe()
    }

    // ── Formatting ──────────────────────────────────────────────────

    /// Format an amount in the display currency, e.g. `"R$ 1.234,50"`.
    #[must_use]
    pub fn format_money(&self, value: f64) -> String {
        format::format_money(
            value,
            self.settings.number_locale,
            &self.settings.display_currency,
        )
    }
}

impl Drop for MarketBoard {
    fn drop(&mut self) {
        self.store.stop();
    }
}
