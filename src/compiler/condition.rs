//! Rule trees deciding whether a `conditional` node renders.

use std::cmp::Ordering;

use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Deserialize;
use tracing::warn;

use super::ResolvedValues;
use crate::{
    document::Node,
    value::{InjectableValue, format_number},
};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Condition {
    Rule(Rule),
    Group(Group),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Logic {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Group {
    #[serde(default, alias = "operator")]
    pub logic: Logic,
    #[serde(default)]
    pub rules: Vec<Condition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    StartsWith,
    EndsWith,
    Contains,
    #[serde(alias = "is_empty")]
    Empty,
    #[serde(alias = "is_not_empty")]
    NotEmpty,
    IsTrue,
    IsFalse,
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
}

/// Compares an injectable's value against a literal or another injectable.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    #[serde(alias = "injectableId")]
    pub injectable: String,
    pub operator: Operator,
    /// Literal operand.
    #[serde(default)]
    pub value: serde_json::Value,
    /// Code of another injectable used as the operand instead of `value`.
    #[serde(default)]
    pub compare_to: Option<String>,
}

impl Condition {
    pub fn evaluate(&self, values: &ResolvedValues) -> bool {
        match self {
            Self::Rule(rule) => rule.evaluate(values),
            Self::Group(group) => group.evaluate(values),
        }
    }
}

impl Group {
    pub fn evaluate(&self, values: &ResolvedValues) -> bool {
        match self.logic {
            Logic::And => self.rules.iter().all(|rule| rule.evaluate(values)),
            Logic::Or => {
                self.rules.is_empty() || self.rules.iter().any(|rule| rule.evaluate(values))
            }
        }
    }
}

fn literal(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.as_f64().map(format_number).unwrap_or_default(),
        other => other.to_string(),
    }
}

fn parse_instant(s: &str) -> Option<DateTime<FixedOffset>> {
    let s = s.trim();
    DateTime::parse_from_rfc3339(s).ok().or_else(|| {
        let midnight = NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()?.and_hms_opt(0, 0, 0)?;
        Some(midnight.and_utc().fixed_offset())
    })
}

fn truthy_text(s: &str) -> bool {
    matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes" | "1")
}

fn truthy(value: Option<&InjectableValue>) -> bool {
    match value {
        Some(InjectableValue::Boolean(b)) => *b,
        Some(InjectableValue::String(s)) => truthy_text(s),
        Some(InjectableValue::Number(n)) => *n != 0.0,
        _ => false,
    }
}

/// Numeric ordering if both sides are numbers, else temporal ordering.
fn compare(left: Option<&InjectableValue>, right: &str) -> Option<Ordering> {
    let left = left?;
    let number = match left {
        InjectableValue::Number(n) => Some(*n),
        InjectableValue::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    if let Some(left) = number
        && let Ok(right) = right.trim().parse::<f64>()
    {
        return left.partial_cmp(&right);
    }
    let instant = match left {
        InjectableValue::Timestamp(t) => Some(*t),
        InjectableValue::String(s) => parse_instant(s),
        _ => None,
    }?;
    Some(instant.cmp(&parse_instant(right)?))
}

impl Rule {
    pub fn evaluate(&self, values: &ResolvedValues) -> bool {
        let left = values.get(&self.injectable);
        let text = || left.map(InjectableValue::to_plain_string).unwrap_or_default();
        let right = match &self.compare_to {
            Some(code) => values
                .get(code)
                .map(InjectableValue::to_plain_string)
                .unwrap_or_default(),
            None => literal(&self.value),
        };
        match self.operator {
            Operator::Equals => equals(left, &text(), &right),
            Operator::NotEquals => !equals(left, &text(), &right),
            Operator::StartsWith => text().starts_with(&right),
            Operator::EndsWith => text().ends_with(&right),
            Operator::Contains => text().contains(&right),
            Operator::Empty => left.is_none_or(InjectableValue::is_empty),
            Operator::NotEmpty => left.is_some_and(|v| !v.is_empty()),
            Operator::IsTrue => truthy(left),
            Operator::IsFalse => !truthy(left),
            Operator::GreaterThan => compare(left, &right) == Some(Ordering::Greater),
            Operator::LessThan => compare(left, &right) == Some(Ordering::Less),
            Operator::GreaterOrEqual => {
                matches!(compare(left, &right), Some(Ordering::Greater | Ordering::Equal))
            }
            Operator::LessOrEqual => {
                matches!(compare(left, &right), Some(Ordering::Less | Ordering::Equal))
            }
        }
    }
}

fn equals(left: Option<&InjectableValue>, text: &str, right: &str) -> bool {
    match left {
        Some(InjectableValue::Number(_)) => compare(left, right) == Some(Ordering::Equal),
        Some(InjectableValue::Boolean(b)) => truthy_text(right) == *b,
        _ => text == right,
    }
}

/// Evaluates the `condition` attribute of a node. Missing and malformed conditions
/// are true.
pub fn node_is_visible(node: &Node, values: &ResolvedValues) -> bool {
    let Some(raw) = node.attr("condition") else {
        return true;
    };
    match serde_json::from_value::<Condition>(raw.clone()) {
        Ok(condition) => condition.evaluate(values),
        Err(error) => match serde_json::from_value::<Vec<Condition>>(raw.clone()) {
            Ok(rules) => Group {
                logic: Logic::And,
                rules,
            }
            .evaluate(values),
            Err(_) => {
                warn!(%error, "malformed condition, rendering content");
                true
            }
        },
    }
}
