//! Display formatting for prices, percentages and chart date labels.
//!
//! Pure functions, no state. Locale rules are limited to the two conventions
//! in `NumberLocale`.

use chrono::DateTime;

use crate::models::settings::NumberLocale;

impl NumberLocale {
    fn separators(self) -> (char, char) {
        match self {
            NumberLocale::PtBr => ('.', ','),
            NumberLocale::EnUs => (',', '.'),
        }
    }
}

/// Group the digits of an unsigned integer string in threes.
fn group_thousands(digits: &str, sep: char) -> String {
    let len = digits.len();
    let mut out = String::with_capacity(len + len / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (len - i) % 3 == 0 {
            out.push(sep);
        }
        out.push(c);
    }
    out
}

/// Format with exactly two decimals and thousands grouping.
///
/// `format_price(1234.5, NumberLocale::PtBr)` → `"1.234,50"`.
pub fn format_price(value: f64, locale: NumberLocale) -> String {
    format_decimal(value, 2, locale)
}

/// Format with a fixed number of decimals and thousands grouping.
pub fn format_decimal(value: f64, decimals: usize, locale: NumberLocale) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let (thousands, decimal) = locale.separators();
    let fixed = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (fixed.as_str(), None),
    };

    let mut out = String::new();
    // A value that rounds to zero is printed unsigned.
    if value < 0.0 && fixed.chars().any(|c| c.is_ascii_digit() && c != '0') {
        out.push('-');
    }
    out.push_str(&group_thousands(int_part, thousands));
    if let Some(frac) = frac_part {
        out.push(decimal);
        out.push_str(frac);
    }
    out
}

/// Signed percentage with two decimals, e.g. `"-2.35%"`.
pub fn format_percent(value: f64) -> String {
    format!("{value:.2}%")
}

/// Currency prefix shown before a formatted amount.
pub fn currency_symbol(currency: &str) -> String {
    match currency.to_lowercase().as_str() {
        "brl" => "R$".to_string(),
        "usd" => "$".to_string(),
        "eur" => "€".to_string(),
        "gbp" => "£".to_string(),
        other => other.to_uppercase(),
    }
}

/// `format_price` prefixed with the currency symbol, e.g. `"R$ 1.234,50"`.
pub fn format_money(value: f64, locale: NumberLocale, currency: &str) -> String {
    format!("{} {}", currency_symbol(currency), format_price(value, locale))
}

/// Day-level label for a millisecond timestamp, in UTC.
///
/// Out-of-range timestamps yield an empty label.
pub fn format_date_label(timestamp_ms: i64, locale: NumberLocale) -> String {
    let Some(dt) = DateTime::from_timestamp_millis(timestamp_ms) else {
        return String::new();
    };
    match locale {
        NumberLocale::PtBr => dt.format("%d/%m/%Y").to_string(),
        NumberLocale::EnUs => dt.format("%-m/%-d/%Y").to_string(),
    }
}
