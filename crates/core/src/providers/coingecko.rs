use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use super::traits::MarketDataProvider;
use crate::errors::CoreError;
use crate::models::instrument::Instrument;
use crate::models::series::RawSample;
use crate::models::settings::Settings;

const PROVIDER_NAME: &str = "CoinGecko";

/// CoinGecko API provider for the market table and price series.
///
/// - **Free**: No API key required for the public tier.
/// - **Endpoints**: `/coins/markets`, `/coins/{id}/market_chart`
///
/// Only the first page of `/coins/markets` is ever requested.
pub struct CoinGeckoProvider {
    client: Client,
    base_url: String,
    per_page: u32,
}

impl CoinGeckoProvider {
    pub fn new() -> Self {
        Self::from_settings(&Settings::default())
    }

    pub fn from_settings(settings: &Settings) -> Self {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: settings.api_base_url.trim_end_matches('/').to_string(),
            per_page: settings.per_page,
        }
    }

    /// Point the provider at a different host (e.g., a local mock server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn markets_url(&self, currency: &str) -> String {
        format!(
            "{}/coins/markets?vs_currency={}&order=market_cap_desc&per_page={}&page=1&sparkline=false",
            self.base_url,
            currency.to_lowercase(),
            self.per_page
        )
    }

    pub fn series_url(&self, instrument_id: &str, currency: &str, days: u32) -> String {
        format!(
            "{}/coins/{}/market_chart?vs_currency={}&days={}",
            self.base_url,
            instrument_id,
            currency.to_lowercase(),
            days
        )
    }

    /// GET `url` and return the body, mapping non-2xx statuses to `Api`.
    async fn get_body(&self, url: &str) -> Result<Vec<u8>, CoreError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CoreError::Api {
                provider: PROVIDER_NAME.into(),
                message: format!("HTTP {status}"),
            });
        }
        Ok(resp.bytes().await?.to_vec())
    }
}

impl Default for CoinGeckoProvider {
    fn default() -> Self {
        Self::new()
    }
}

// ── CoinGecko API response types ────────────────────────────────────

#[derive(Deserialize)]
struct MarketEntry {
    id: String,
    symbol: String,
    name: String,
    #[serde(default)]
    image: Option<String>,
    // Numeric fields are nullable upstream for thinly traded coins.
    #[serde(default)]
    current_price: Option<f64>,
    #[serde(default)]
    price_change_percentage_24h: Option<f64>,
    #[serde(default)]
    total_volume: Option<f64>,
    #[serde(default)]
    market_cap: Option<f64>,
}

impl From<MarketEntry> for Instrument {
    fn from(e: MarketEntry) -> Self {
        Instrument {
            id: e.id,
            symbol: e.symbol,
            name: e.name,
            image: e.image.unwrap_or_default(),
            current_price: e.current_price.unwrap_or_default(),
            price_change_percentage_24h: e.price_change_percentage_24h.unwrap_or_default(),
            total_volume: e.total_volume.unwrap_or_default(),
            market_cap: e.market_cap.unwrap_or_default(),
        }
    }
}

#[derive(Deserialize)]
struct MarketChartResponse {
    /// `[timestamp_ms, price]` pairs
    prices: Vec<(f64, f64)>,
}

/// Decode a `/coins/markets` body, keeping upstream order.
pub fn parse_markets(body: &[u8]) -> Result<Vec<Instrument>, CoreError> {
    let entries: Vec<MarketEntry> = serde_json::from_slice(body)?;
    Ok(entries.into_iter().map(Instrument::from).collect())
}

/// Decode a `/coins/{id}/market_chart` body into raw samples, 1:1.
pub fn parse_market_chart(body: &[u8]) -> Result<Vec<RawSample>, CoreError> {
    let resp: MarketChartResponse = serde_json::from_slice(body)?;
    Ok(resp
        .prices
        .into_iter()
        .map(|(ts, price)| RawSample::new(ts as i64, price))
        .collect())
}

#[async_trait]
impl MarketDataProvider for CoinGeckoProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn fetch_markets(&self, currency: &str) -> Result<Vec<Instrument>, CoreError> {
        let body = self.get_body(&self.markets_url(currency)).await?;
        parse_markets(&body)
    }

    async fn fetch_series(
        &self,
        instrument_id: &str,
        currency: &str,
        days: u32,
    ) -> Result<Vec<RawSample>, CoreError> {
        let body = self
            .get_body(&self.series_url(instrument_id, currency, days))
            .await?;
        parse_market_chart(&body)
    }
}
