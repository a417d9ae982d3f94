use tokio::task::JoinHandle;
use tracing::debug;

use crate::models::instrument::{Instrument, InstrumentSet};
use crate::models::series::{Period, Selection};
use crate::models::sort::{SortKey, SortSpec};
use crate::services::projection::project;
use crate::services::series_cache::{SelectOutcome, SeriesCache};

/// Whether a detail view is open, and for what.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DetailState {
    #[default]
    NoSelection,
    Selecting(Selection),
}

/// UI-local interaction state: search text, sort spec and the open detail.
///
/// Every transition that changes the detail selection issues exactly one
/// `SeriesCache::select`.
#[derive(Debug)]
pub struct SelectionController {
    series: SeriesCache,
    detail: DetailState,
    search: String,
    sort: SortSpec,
}

impl SelectionController {
    pub fn new(series: SeriesCache) -> Self {
        Self {
            series,
            detail: DetailState::NoSelection,
            search: String::new(),
            sort: SortSpec::default(),
        }
    }

    // ── Detail view ─────────────────────────────────────────────────

    /// Open the detail view for `instrument_id` on the default period.
    pub fn open_detail(&mut self, instrument_id: impl Into<String>) -> JoinHandle<SelectOutcome> {
        let selection = Selection::new(instrument_id, Period::default());
        debug!(selection = %selection, "open detail");
        let handle = self
            .series
            .select(selection.instrument_id.clone(), selection.period);
        self.detail = DetailState::Selecting(selection);
        handle
    }

    /// Switch the open detail view to `period`. Does nothing (and returns
    /// `None`) when no detail view is open.
    pub fn change_period(&mut self, period: Period) -> Option<JoinHandle<SelectOutcome>> {
        let DetailState::Selecting(selection) = &mut self.detail else {
            return None;
        };
        selection.period = period;
        debug!(selection = %selection, "change period");
        Some(self.series.select(selection.instrument_id.clone(), period))
    }

    /// Close the detail view. The last series stays in the cache so reopening
    /// the same instrument does not flash an empty chart.
    pub fn close_detail(&mut self) {
        self.detail = DetailState::NoSelection;
    }

    pub fn detail(&self) -> &DetailState {
        &self.detail
    }

    pub fn selection(&self) -> Option<&Selection> {
        match &self.detail {
            DetailState::Selecting(selection) => Some(selection),
            DetailState::NoSelection => None,
        }
    }

    pub fn active_period(&self) -> Option<Period> {
        self.selection().map(|s| s.period)
    }

    /// The instrument currently open in the detail view, looked up in `set`.
    pub fn selected_instrument<'a>(&self, set: &'a InstrumentSet) -> Option<&'a Instrument> {
        self.selection().and_then(|s| set.get(&s.instrument_id))
    }

    pub fn series(&self) -> &SeriesCache {
        &self.series
    }

    // ── Table intents ───────────────────────────────────────────────

    pub fn set_search_text(&mut self, text: impl Into<String>) {
        self.search = text.into();
    }

    pub fn search_text(&self) -> &str {
        &self.search
    }

    /// Apply a column-header click and return the resulting spec.
    pub fn set_sort_key(&mut self, key: SortKey) -> SortSpec {
        self.sort = self.sort.toggled(key);
        self.sort
    }

    pub fn sort(&self) -> SortSpec {
        self.sort
    }

    /// Rows to display for `instruments` under the current search and sort.
    pub fn visible<'a>(&self, instruments: &'a [Instrument]) -> Vec<&'a Instrument> {
        project(instruments, &self.search, self.sort)
    }
}
