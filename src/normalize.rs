//! Canonical forms for raw cell values.
//!
//! Every function here is total: unusable input maps to an empty key, `None`,
//! or `false`, never to an error. Missing money is `None`, not zero, so the
//! callers can drop the row instead of matching it against a zero total.

use std::{str::FromStr, sync::LazyLock};

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use rust_decimal::Decimal;

use crate::data::Value;

const TRUTHY_TOKENS: &[&str] = &["TRUE", "1", "YES", "Y", "T"];
const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥'];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y"];
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%Y-%m-%d %H:%M",
];

static WHOLE_NUMBER_WITH_ZERO_FRACTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\.0+$").expect("valid order id pattern"));

/// Uppercases and keeps only alphanumeric characters.
pub fn customer_key(value: &Value) -> String {
    if value.is_blank() {
        return String::new();
    }
    value
        .as_display()
        .chars()
        .flat_map(char::to_uppercase)
        .filter(|c| c.is_alphanumeric())
        .collect()
}

pub fn parse_money(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(d) => Some(*d),
        Value::Text(raw) => parse_money_text(raw),
        Value::Blank | Value::Date(_) => None,
    }
}

fn parse_money_text(raw: &str) -> Option<Decimal> {
    let cleaned = raw
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace() && !CURRENCY_SYMBOLS.contains(c))
        .collect::<String>();
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .ok()
}

pub fn parse_truthy(value: &Value) -> bool {
    if value.is_blank() {
        return false;
    }
    let token = value.as_display().trim().to_uppercase();
    TRUTHY_TOKENS.contains(&token.as_str())
}

/// Trimmed order identifier; blank means the line carries no order id.
/// A spreadsheet-style `10.0` names the same order as `10`; leading zeros are kept.
pub fn normalize_order_id(value: &Value) -> Option<String> {
    let display = value.as_display();
    let token = display.trim();
    if token.is_empty() {
        return None;
    }
    let canonical = WHOLE_NUMBER_WITH_ZERO_FRACTION
        .captures(token)
        .and_then(|caps| caps.get(1))
        .map_or(token, |whole| whole.as_str());
    Some(canonical.to_string())
}

/// Parses a date cell into [`Value::Date`]; anything else is returned unchanged.
pub fn normalize_date(value: &Value) -> Value {
    let Value::Text(raw) = value else {
        return value.clone();
    };
    let trimmed = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
                .map(|dt| dt.date())
        })
        .map_or_else(|| value.clone(), Value::Date)
}

pub fn normalize_revision(value: &Value) -> Option<String> {
    let token = value.as_display().trim().to_uppercase();
    (!token.is_empty()).then_some(token)
}

/// Lowercased header text with whitespace runs collapsed.
pub fn normalize_header(header: &str) -> String {
    header
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
