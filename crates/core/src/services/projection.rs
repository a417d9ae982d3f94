use std::cmp::Ordering;

use crate::models::instrument::Instrument;
use crate::models::sort::{SortDirection, SortKey, SortSpec};

/// Filter and order instruments for display.
///
/// 1. Keep instruments whose name or symbol contains `search`
///    (case-insensitive, surrounding whitespace ignored; empty keeps all).
/// 2. Stable-sort by `sort`. Equal elements keep their input order in both
///    directions.
///
/// The input is never modified; call it on every intent change.
pub fn project<'a>(
    instruments: &'a [Instrument],
    search: &str,
    sort: SortSpec,
) -> Vec<&'a Instrument> {
    let needle = search.trim().to_lowercase();

    let mut rows: Vec<&Instrument> = instruments
        .iter()
        .filter(|i| matches_search(i, &needle))
        .collect();

    // `sort_by` is stable; reversing the comparator (not the output) keeps
    // ties in input order for descending too.
    rows.sort_by(|a, b| {
        let ord = compare_by(a, b, sort.key);
        match sort.direction {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        }
    });

    rows
}

/// `needle` must already be lowercased.
fn matches_search(instrument: &Instrument, needle: &str) -> bool {
    needle.is_empty()
        || instrument.name.to_lowercase().contains(needle)
        || instrument.symbol.to_lowercase().contains(needle)
}

/// Ascending comparison of two instruments on a single key.
pub fn compare_by(a: &Instrument, b: &Instrument, key: SortKey) -> Ordering {
    match key {
        SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        SortKey::Price => by_value(a.current_price, b.current_price),
        SortKey::Change24h => {
            by_value(a.price_change_percentage_24h, b.price_change_percentage_24h)
        }
        SortKey::Volume => by_value(a.total_volume, b.total_volume),
        SortKey::MarketCap => by_value(a.market_cap, b.market_cap),
    }
}

/// Total order on values where `-0.0` and `0.0` are equal.
fn by_value(a: f64, b: f64) -> Ordering {
    (a + 0.0).total_cmp(&(b + 0.0))
}
