//! Presentation formatting of injectable values.

use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset};

use crate::value::{InjectableValue, ValueType, format_number};

pub const DEFAULT_DATE_PATTERN: &str = "YYYY-MM-DD";

static DATE_TOKEN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"YYYY|YY|MM|DD|HH|mm|ss").unwrap());

/// Translates a `YYYY-MM-DD HH:mm` style pattern into a chrono format string.
fn chrono_pattern(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut last = 0;
    for token in DATE_TOKEN.find_iter(pattern) {
        out.push_str(&pattern[last..token.start()].replace('%', "%%"));
        out.push_str(match token.as_str() {
            "YYYY" => "%Y",
            "YY" => "%y",
            "MM" => "%m",
            "DD" => "%d",
            "HH" => "%H",
            "mm" => "%M",
            _ => "%S",
        });
        last = token.end();
    }
    out.push_str(&pattern[last..].replace('%', "%%"));
    out
}

pub fn format_timestamp(timestamp: &DateTime<FixedOffset>, pattern: Option<&str>) -> String {
    let pattern = pattern
        .filter(|p| !p.trim().is_empty())
        .unwrap_or(DEFAULT_DATE_PATTERN);
    timestamp.format(&chrono_pattern(pattern)).to_string()
}

pub fn format_currency(amount: f64, symbol: Option<&str>) -> String {
    let prefix = symbol.unwrap_or_default();
    format!("{prefix}{amount:.2}")
}

pub fn yes_no(value: bool, locale: &str) -> &'static str {
    let language = locale.split(['-', '_']).next().unwrap_or_default();
    match (language.to_ascii_lowercase().as_str(), value) {
        ("es", true) => "Sí",
        ("fr", true) => "Oui",
        ("fr", false) => "Non",
        ("pt", true) => "Sim",
        ("pt", false) => "Não",
        ("de", true) => "Ja",
        ("de", false) => "Nein",
        (_, true) => "Yes",
        (_, false) => "No",
    }
}

/// Plain text for a scalar value. `declared` is the type the injectable (or table
/// column) was declared with, which is how currencies are told apart from numbers.
/// Tables and lists have no scalar form and yield an empty string.
pub fn format_value(
    value: &InjectableValue,
    declared: Option<ValueType>,
    format: Option<&str>,
    locale: &str,
) -> String {
    match value {
        InjectableValue::Number(n) if declared == Some(ValueType::Currency) => {
            format_currency(*n, format)
        }
        InjectableValue::Number(n) => format_number(*n),
        InjectableValue::Boolean(b) => yes_no(*b, locale).to_owned(),
        InjectableValue::Timestamp(t) => format_timestamp(t, format),
        InjectableValue::String(s) | InjectableValue::Image(s) => s.clone(),
        InjectableValue::Table(_) | InjectableValue::List(_) => String::new(),
    }
}
