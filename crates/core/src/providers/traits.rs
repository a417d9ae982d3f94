use async_trait::async_trait;

use crate::errors::CoreError;
use crate::models::instrument::Instrument;
use crate::models::series::RawSample;

/// Trait abstraction for the upstream market data API.
///
/// `DataStore` and `SeriesCache` only see this trait, so a different
/// upstream (or a test double) plugs in without touching either.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Human-readable name of this provider (for logs/errors).
    fn name(&self) -> &str;

    /// Fetch the first page of instruments quoted in `currency`,
    /// ordered by market capitalization, largest first.
    async fn fetch_markets(&self, currency: &str) -> Result<Vec<Instrument>, CoreError>;

    /// Fetch the raw price samples of one instrument over the last `days`
    /// days, ascending by timestamp.
    async fn fetch_series(
        &self,
        instrument_id: &str,
        currency: &str,
        days: u32,
    ) -> Result<Vec<RawSample>, CoreError>;
}
