//! Numeric token extraction and canonical formatting

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref NUMBER: Regex =
        Regex::new(r"\d{1,3}(?:,\d{3})+(?:\.\d+)?%?|\d+(?:\.\d+)?%?").unwrap();
}

/// A number as it appears in narrative text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberToken {
    /// Text as written, including any sign and percent sign
    pub token: String,
    pub value: f64,
    pub percent: bool,
    /// Written without a decimal part
    pub integral: bool,
}

/// Integers and decimals, with optional thousands separators and trailing `%`.
///
/// Digits glued to a word (`Q3`, `sales_2024`) are not numbers. A leading `-`
/// is a sign only when it does not follow a word or digit (`2023-2024` is two
/// positive years).
pub fn extract_numbers(text: &str) -> Vec<NumberToken> {
    let mut tokens = Vec::new();
    for m in NUMBER.find_iter(text) {
        let before = &text[..m.start()];
        let mut preceding = before.chars().rev();
        let prev = preceding.next();
        if prev.map_or(false, |c| c.is_alphanumeric() || c == '_') {
            continue;
        }
        // decimal tail of something like "1.2.3"
        if prev == Some('.') && preceding.clone().next().map_or(false, |c| c.is_ascii_digit()) {
            continue;
        }

        let negative = prev == Some('-')
            && !preceding.next().map_or(false, |c| c.is_alphanumeric() || c == '_');
        let raw = m.as_str();
        let percent = raw.ends_with('%');
        let digits: String = raw.trim_end_matches('%').chars().filter(|c| *c != ',').collect();
        let Ok(magnitude) = digits.parse::<f64>() else {
            continue;
        };

        tokens.push(NumberToken {
            token: if negative { format!("-{}", raw) } else { raw.to_string() },
            value: if negative { -magnitude } else { magnitude },
            percent,
            integral: !digits.contains('.'),
        });
    }
    tokens
}

/// Canonical numeric string: no exponent, no trailing zeros, no `-0`.
pub fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let shortest = value.to_string();
    let decimals = shortest.split('.').nth(1).map_or(0, str::len);
    let text = if decimals > 10 {
        let fixed = format!("{:.10}", value);
        fixed.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        shortest
    };
    if text == "-0" || text.is_empty() {
        "0".to_string()
    } else {
        text
    }
}
