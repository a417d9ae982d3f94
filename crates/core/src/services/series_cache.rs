use chrono::DateTime;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::logger::warn_if_slow;
use crate::models::series::{Period, RawSample, Selection, SeriesPoint, SeriesSet};
use crate::models::settings::NumberLocale;
use crate::models::status::FetchStatus;
use crate::providers::traits::MarketDataProvider;
use crate::services::format::format_date_label;

const SLOW_FETCH: Duration = Duration::from_secs(5);

/// Published state of the detail chart.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SeriesState {
    /// The most recent selection, whether or not its fetch has finished.
    pub selection: Option<Selection>,
    pub status: FetchStatus<SeriesSet>,

    // Tag of the latest `select`; completions carrying any other tag are
    // stale and dropped.
    seq: u64,
}

impl SeriesState {
    /// The loaded series, if the latest selection has resolved successfully.
    pub fn series(&self) -> Option<&SeriesSet> {
        self.status.ready()
    }
}

/// Result of one `select` fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectOutcome {
    /// The series (of this many points) is now on display.
    Applied(usize),
    Failed(String),
    /// A newer selection was made before this fetch returned.
    Superseded,
}

/// Single-slot holder of the price series for the open detail view.
///
/// Each `select` replaces whatever was there. Only the result for the most
/// recent selection is ever applied, regardless of completion order.
#[derive(Clone)]
pub struct SeriesCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    provider: Arc<dyn MarketDataProvider>,
    currency: String,
    locale: NumberLocale,
    state: watch::Sender<SeriesState>,
}

impl SeriesCache {
    pub fn new(
        provider: Arc<dyn MarketDataProvider>,
        currency: impl Into<String>,
        locale: NumberLocale,
    ) -> Self {
        let (state, _) = watch::channel(SeriesState::default());
        Self {
            inner: Arc::new(CacheInner {
                provider,
                currency: currency.into(),
                locale,
                state,
            }),
        }
    }

    pub fn state(&self) -> SeriesState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SeriesState> {
        self.inner.state.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.state.borrow().status.is_loading()
    }

    /// Fetch the series for `(instrument_id, period)`.
    ///
    /// The state switches to `Loading` before this returns, dropping any
    /// previously shown series. The fetch runs as a spawned task, so this
    /// must be called from within a Tokio runtime.
    pub fn select(
        &self,
        instrument_id: impl Into<String>,
        period: Period,
    ) -> JoinHandle<SelectOutcome> {
        let selection = Selection::new(instrument_id, period);

        let mut seq = 0;
        self.inner.state.send_modify(|s| {
            s.seq += 1;
            seq = s.seq;
            s.selection = Some(selection.clone());
            s.status = FetchStatus::Loading;
        });
        debug!(selection = %selection, seq, "series fetch issued");

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.fetch(seq, selection).await })
    }
}

impl CacheInner {
    async fn fetch(&self, seq: u64, selection: Selection) -> SelectOutcome {
        let result = warn_if_slow(
            "fetch_series",
            SLOW_FETCH,
            self.provider.fetch_series(
                &selection.instrument_id,
                &self.currency,
                selection.period.days(),
            ),
        )
        .await;

        let mut outcome = SelectOutcome::Superseded;
        self.state.send_if_modified(|s| {
            if s.seq != seq {
                return false;
            }
            match result {
                Ok(samples) => {
                    let points = to_series_points(&samples, self.locale);
                    outcome = SelectOutcome::Applied(points.len());
                    s.status = FetchStatus::Ready(SeriesSet::new(selection.clone(), points));
                }
                Err(e) => {
                    outcome = SelectOutcome::Failed(e.to_string());
                    s.status = FetchStatus::Failed(e.to_string());
                }
            }
            true
        });

        match &outcome {
            SelectOutcome::Applied(count) => {
                debug!(selection = %selection, count = *count, "series applied");
            }
            SelectOutcome::Failed(reason) => {
                warn!(selection = %selection, error = %reason, "series fetch failed");
            }
            SelectOutcome::Superseded => {
                debug!(selection = %selection, seq, "discarding superseded series");
            }
        }

        outcome
    }
}

impl std::fmt::Debug for SeriesCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("SeriesCache")
            .field("provider", &self.inner.provider.name())
            .field("selection", &state.selection)
            .field("points", &state.series().map(SeriesSet::len))
            .finish()
    }
}

/// Map raw samples 1:1 into chart points with a date label.
///
/// Samples with an out-of-range timestamp are skipped; nothing is
/// resampled or interpolated.
pub fn to_series_points(samples: &[RawSample], locale: NumberLocale) -> Vec<SeriesPoint> {
    samples
        .iter()
        .filter_map(|s| {
            let timestamp = DateTime::from_timestamp_millis(s.timestamp_ms)?;
            Some(SeriesPoint {
                timestamp,
                date: format_date_label(s.timestamp_ms, locale),
                price: s.price,
            })
        })
        .collect()
}
