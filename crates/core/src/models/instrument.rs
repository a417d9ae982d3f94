use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Direction of the 24h price move, as shown next to the change column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Up,
    Down,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Trend::Up => write!(f, "Up"),
            Trend::Down => write!(f, "Down"),
        }
    }
}

/// One market asset and its latest snapshot.
///
/// `id` is the stable key across refreshes. Every numeric field is replaced
/// wholesale when a new `InstrumentSet` arrives; nothing is merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    /// Upstream identifier (e.g., "bitcoin")
    pub id: String,

    /// Short ticker code (e.g., "btc")
    pub symbol: String,

    /// Display name (e.g., "Bitcoin")
    pub name: String,

    /// Icon URL
    #[serde(default)]
    pub image: String,

    /// Latest price in the display currency
    pub current_price: f64,

    /// Percentage move over the last 24 hours
    pub price_change_percentage_24h: f64,

    /// Traded volume over the last 24 hours, in the display currency
    pub total_volume: f64,

    /// Market capitalization in the display currency
    pub market_cap: f64,
}

impl Instrument {
    pub fn new(
        id: impl Into<String>,
        symbol: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            symbol: symbol.into(),
            name: name.into(),
            image: String::new(),
            current_price: 0.0,
            price_change_percentage_24h: 0.0,
            total_volume: 0.0,
            market_cap: 0.0,
        }
    }

    /// Builder-style setter for the numeric snapshot.
    pub fn with_snapshot(
        mut self,
        current_price: f64,
        change_24h: f64,
        total_volume: f64,
        market_cap: f64,
    ) -> Self {
        self.current_price = current_price;
        self.price_change_percentage_24h = change_24h;
        self.total_volume = total_volume;
        self.market_cap = market_cap;
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// `Up` only for a strictly positive move; a flat day reads as `Down`.
    pub fn trend(&self) -> Trend {
        if self.price_change_percentage_24h > 0.0 {
            Trend::Up
        } else {
            Trend::Down
        }
    }

    /// Unsigned 24h change, paired with `trend()` for display.
    pub fn abs_change(&self) -> f64 {
        self.price_change_percentage_24h.abs()
    }
}

/// Ordered, immutable sequence of instruments in upstream rank order.
///
/// Cloning is cheap (shared slice). A refresh builds a new set and swaps it
/// in; an existing set is never edited.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentSet {
    items: Arc<[Instrument]>,
}

impl InstrumentSet {
    pub fn new(items: Vec<Instrument>) -> Self {
        Self { items: items.into() }
    }

    pub fn as_slice(&self) -> &[Instrument] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instrument> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Look up an instrument by its stable id.
    pub fn get(&self, id: &str) -> Option<&Instrument> {
        self.items.iter().find(|i| i.id == id)
    }
}

impl Default for InstrumentSet {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl From<Vec<Instrument>> for InstrumentSet {
    fn from(items: Vec<Instrument>) -> Self {
        Self::new(items)
    }
}

impl<'a> IntoIterator for &'a InstrumentSet {
    type Item = &'a Instrument;
    type IntoIter = std::slice::Iter<'a, Instrument>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
