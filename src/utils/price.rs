use regex::Regex;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::models::Price;

static NUMBER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d[\d.,]*").expect("number pattern is valid"));

// Longest symbols first so "US$" wins over "$" and "Rs." over "Rs".
const CURRENCY_SYMBOLS: &[(&str, &str)] = &[
    ("USD$", "USD"),
    ("US$", "USD"),
    ("AU$", "AUD"),
    ("CA$", "CAD"),
    ("A$", "AUD"),
    ("C$", "CAD"),
    ("Rs.", "INR"),
    ("Rs", "INR"),
    ("₹", "INR"),
    ("£", "GBP"),
    ("€", "EUR"),
    ("¥", "JPY"),
];

const ISO_CODES: &[&str] = &["INR", "USD", "GBP", "EUR", "JPY", "AUD", "CAD"];

const DOLLAR_CURRENCIES: &[&str] = &["USD", "AUD", "CAD", "NZD", "SGD", "HKD"];

/// Parse a displayed price such as `"₹1,234.50"` into an amount and currency.
///
/// Zero and unparseable amounts yield `None`: a page that shows no price, or a
/// price of zero, is treated as a parse failure rather than a real price.
pub fn parse_price(text: &str, fallback_currency: &str) -> Option<Price> {
    let token = NUMBER_REGEX.find(text)?.as_str();
    let amount = normalize_number(token)?;
    if amount <= Decimal::ZERO {
        return None;
    }
    let currency = detect_currency(text).unwrap_or_else(|| fallback_currency.to_uppercase());
    let currency = if currency == "$" {
        dollar_currency(fallback_currency)
    } else {
        currency
    };
    Some(Price::new(amount, currency))
}

/// Strip thousands separators and resolve the decimal mark.
///
/// Handles `1,234.50`, Indian grouping `1,23,456`, European `1.234,56`, a
/// lone decimal comma `12,50`, and a trailing mark as in `499.`.
pub fn normalize_number(token: &str) -> Option<Decimal> {
    let token = token.trim_end_matches(['.', ',']);
    if token.is_empty() {
        return None;
    }

    let last_dot = token.rfind('.');
    let last_comma = token.rfind(',');
    let dots = token.matches('.').count();
    let commas = token.matches(',').count();

    let cleaned = match (last_dot, last_comma) {
        // 1.234,56
        (Some(dot), Some(comma)) if comma > dot => token.replace('.', "").replace(',', "."),
        // 1,234.56
        (Some(_), Some(_)) => token.replace(',', ""),
        // 12,50
        (None, Some(comma)) if commas == 1 && token.len() - comma - 1 == 2 => {
            token.replace(',', ".")
        }
        (None, Some(_)) => token.replace(',', ""),
        // 1.234.567
        (Some(_), None) if dots > 1 => token.replace('.', ""),
        _ => token.to_string(),
    };

    Decimal::from_str(&cleaned).ok()
}

/// Currency named explicitly in the text, either as a symbol or ISO code.
///
/// A bare `$` is returned as `"$"` for the caller to resolve.
pub fn detect_currency(text: &str) -> Option<String> {
    for (symbol, code) in CURRENCY_SYMBOLS {
        if text.contains(symbol) {
            return Some(code.to_string());
        }
    }
    let upper = text.to_uppercase();
    for code in ISO_CODES {
        if upper.contains(code) {
            return Some(code.to_string());
        }
    }
    if text.contains('$') {
        return Some("$".to_string());
    }
    None
}

/// Infer a currency from the host's top-level domain.
pub fn currency_for_host(host: &str) -> Option<&'static str> {
    let host = host.to_lowercase();
    let table: &[(&str, &str)] = &[
        (".com.au", "AUD"),
        (".co.uk", "GBP"),
        (".co.jp", "JPY"),
        (".in", "INR"),
        (".de", "EUR"),
        (".fr", "EUR"),
        (".es", "EUR"),
        (".it", "EUR"),
        (".nl", "EUR"),
        (".ca", "CAD"),
        (".au", "AUD"),
        (".uk", "GBP"),
        (".jp", "JPY"),
        (".com", "USD"),
    ];
    table
        .iter()
        .find(|(suffix, _)| host.ends_with(suffix))
        .map(|(_, code)| *code)
}

/// Parse a star rating like `"4.3 out of 5 stars"`; values outside 0–5 are dropped.
pub fn parse_rating(text: &str) -> Option<f64> {
    let token = NUMBER_REGEX.find(text)?.as_str();
    let value: f64 = token.trim_end_matches(['.', ',']).replace(',', ".").parse().ok()?;
    (0.0..=5.0).contains(&value).then_some(value)
}

/// Parse a review count like `"1,234 ratings"` or `"(12,345)"`.
pub fn parse_count(text: &str) -> Option<u32> {
    let token = NUMBER_REGEX.find(text)?.as_str();
    let digits: String = token
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ',')
        .filter(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Render an amount with two decimals and thousands separators.
pub fn format_amount(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    let text = format!("{:.2}", rounded.abs());
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("{}{}.{}", sign, grouped, frac_part)
}

fn dollar_currency(fallback: &str) -> String {
    let fallback = fallback.to_uppercase();
    if DOLLAR_CURRENCIES.contains(&fallback.as_str()) {
        fallback
    } else {
        "USD".to_string()
    }
}
