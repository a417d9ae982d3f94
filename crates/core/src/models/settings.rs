use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::CoreError;

pub const DEFAULT_API_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Number formatting convention used by the formatter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NumberLocale {
    /// `1.234,56`, dates as `dd/mm/yyyy`
    #[default]
    PtBr,
    /// `1,234.56`, dates as `m/d/yyyy`
    EnUs,
}

impl std::str::FromStr for NumberLocale {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "pt-br" => Ok(NumberLocale::PtBr),
            "en-us" => Ok(NumberLocale::EnUs),
            other => Err(CoreError::Config(format!("unknown locale '{other}'"))),
        }
    }
}

/// Startup configuration. Fixed for the lifetime of a `MarketBoard`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Currency every price is quoted in (e.g., "brl", "usd").
    pub display_currency: String,

    /// Base URL of the market data API, without a trailing slash.
    pub api_base_url: String,

    /// Delay between background refreshes of the instrument set.
    pub refresh_interval: Duration,

    /// Per-request HTTP timeout.
    pub request_timeout: Duration,

    /// Number of instruments requested per refresh (first page only).
    pub per_page: u32,

    pub number_locale: NumberLocale,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            display_currency: "brl".to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            refresh_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            per_page: 100,
            number_locale: NumberLocale::PtBr,
        }
    }
}

impl Settings {
    /// Build settings from `MARKET_BOARD_*` environment variables.
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup. Missing keys keep their
    /// defaults; present but unparsable values are rejected.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(currency) = lookup("MARKET_BOARD_CURRENCY") {
            let currency = currency.trim().to_lowercase();
            if currency.is_empty() {
                return Err(CoreError::Config("MARKET_BOARD_CURRENCY is empty".into()));
            }
            settings.display_currency = currency;
        }

        if let Some(url) = lookup("MARKET_BOARD_API_URL") {
            settings.api_base_url = url.trim().trim_end_matches('/').to_string();
        }

        if let Some(secs) = lookup("MARKET_BOARD_REFRESH_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|e| {
                CoreError::Config(format!("MARKET_BOARD_REFRESH_SECS '{secs}': {e}"))
            })?;
            if secs == 0 {
                return Err(CoreError::Config(
                    "MARKET_BOARD_REFRESH_SECS must be positive".into(),
                ));
            }
            settings.refresh_interval = Duration::from_secs(secs);
        }

        if let Some(locale) = lookup("MARKET_BOARD_LOCALE") {
            settings.number_locale = locale.parse()?;
        }

        Ok(settings)
    }
}
