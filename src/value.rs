//! Typed values produced by injectables.
//!
//! Every resolved injectable is one of the variants of [`InjectableValue`]. Extraction
//! never panics: the `as_*` accessors return `None` on a type mismatch so callers can
//! branch on it.

use std::collections::HashSet;

use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ConfigurationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    String,
    Number,
    Currency,
    Boolean,
    Timestamp,
    Image,
    Table,
    List,
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Currency => "currency",
            Self::Boolean => "boolean",
            Self::Timestamp => "timestamp",
            Self::Image => "image",
            Self::Table => "table",
            Self::List => "list",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum InjectableValue {
    String(String),
    Number(f64),
    Boolean(bool),
    Timestamp(DateTime<FixedOffset>),
    /// URL, data URI or local path.
    Image(String),
    Table(TableValue),
    List(ListValue),
}

impl InjectableValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::String(_) => ValueType::String,
            Self::Number(_) => ValueType::Number,
            Self::Boolean(_) => ValueType::Boolean,
            Self::Timestamp(_) => ValueType::Timestamp,
            Self::Image(_) => ValueType::Image,
            Self::Table(_) => ValueType::Table,
            Self::List(_) => ValueType::List,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<&DateTime<FixedOffset>> {
        match self {
            Self::Timestamp(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_image(&self) -> Option<&str> {
        match self {
            Self::Image(src) => Some(src),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&TableValue> {
        match self {
            Self::Table(table) => Some(table),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&ListValue> {
        match self {
            Self::List(list) => Some(list),
            _ => None,
        }
    }

    /// Locale-agnostic plain text, used by condition evaluation.
    pub fn to_plain_string(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            Self::Number(n) => format_number(*n),
            Self::Boolean(b) => b.to_string(),
            Self::Timestamp(t) => t.to_rfc3339(),
            Self::Image(src) => src.clone(),
            Self::Table(table) => format!("table({} rows)", table.rows.len()),
            Self::List(list) => format!("list({} items)", list.items.len()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::String(s) | Self::Image(s) => s.trim().is_empty(),
            Self::Table(table) => table.rows.is_empty(),
            Self::List(list) => list.items.is_empty(),
            Self::Number(_) | Self::Boolean(_) | Self::Timestamp(_) => false,
        }
    }
}

impl From<&str> for InjectableValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for InjectableValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<f64> for InjectableValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for InjectableValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<DateTime<FixedOffset>> for InjectableValue {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<TableValue> for InjectableValue {
    fn from(value: TableValue) -> Self {
        Self::Table(value)
    }
}

impl From<ListValue> for InjectableValue {
    fn from(value: ListValue) -> Self {
        Self::List(value)
    }
}

/// Integers print without a fractional part, everything else uses the default
/// decimal rendering.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatConfig {
    #[serde(default)]
    pub default: Option<String>,
    #[serde(default)]
    pub options: Vec<String>,
}

impl FormatConfig {
    pub fn validate(&self, code: &str) -> Result<(), ConfigurationError> {
        match &self.default {
            Some(default) if !self.options.is_empty() && !self.options.contains(default) => {
                Err(ConfigurationError::MalformedFormat {
                    code: code.to_owned(),
                    reason: format!("default {default:?} is not one of the options"),
                })
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableStyles {
    #[serde(default)]
    pub font_family: Option<String>,
    #[serde(default)]
    pub font_size: Option<f64>,
    #[serde(default)]
    pub font_weight: Option<String>,
    #[serde(default)]
    pub text_color: Option<String>,
    #[serde(default)]
    pub text_align: Option<String>,
    #[serde(default)]
    pub background: Option<String>,
}

impl TableStyles {
    /// Field-wise merge; values present in `overrides` win.
    pub fn merged(&self, overrides: &Self) -> Self {
        Self {
            font_family: overrides.font_family.clone().or_else(|| self.font_family.clone()),
            font_size: overrides.font_size.or(self.font_size),
            font_weight: overrides.font_weight.clone().or_else(|| self.font_weight.clone()),
            text_color: overrides.text_color.clone().or_else(|| self.text_color.clone()),
            text_align: overrides.text_align.clone().or_else(|| self.text_align.clone()),
            background: overrides.background.clone().or_else(|| self.background.clone()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableColumn {
    pub key: String,
    #[serde(default)]
    pub labels: IndexMap<String, String>,
    pub value_type: ValueType,
    #[serde(default)]
    pub width: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
}

impl TableColumn {
    /// Label for `locale`, falling back to `en`, the first label, then the key.
    pub fn label(&self, locale: &str) -> &str {
        self.labels
            .get(locale)
            .or_else(|| self.labels.get("en"))
            .or_else(|| self.labels.values().next())
            .map(String::as_str)
            .unwrap_or(&self.key)
    }
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableCell {
    #[serde(default)]
    pub value: Option<InjectableValue>,
    #[serde(default = "one")]
    pub colspan: u32,
    #[serde(default = "one")]
    pub rowspan: u32,
}

impl TableCell {
    pub fn new(value: impl Into<InjectableValue>) -> Self {
        Self {
            value: Some(value.into()),
            colspan: 1,
            rowspan: 1,
        }
    }

    pub fn empty() -> Self {
        Self {
            value: None,
            colspan: 1,
            rowspan: 1,
        }
    }

    pub fn span(mut self, colspan: u32, rowspan: u32) -> Self {
        self.colspan = colspan.max(1);
        self.rowspan = rowspan.max(1);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableValue {
    pub columns: Vec<TableColumn>,
    #[serde(default)]
    pub rows: Vec<Vec<TableCell>>,
    #[serde(default)]
    pub header_styles: Option<TableStyles>,
    #[serde(default)]
    pub body_styles: Option<TableStyles>,
}

impl TableValue {
    /// Checks key uniqueness and that every column position of every row is covered
    /// exactly once, counting spans carried down from previous rows.
    pub fn validate(&self) -> Result<(), String> {
        let mut keys = HashSet::new();
        for column in &self.columns {
            if !keys.insert(column.key.as_str()) {
                return Err(format!("duplicate column key {:?}", column.key));
            }
        }
        let width = self.columns.len();
        // Remaining rows each position stays occupied by a rowspan from above.
        let mut carried = vec![0u32; width];
        for (index, row) in self.rows.iter().enumerate() {
            let mut position = 0usize;
            let mut cells = row.iter();
            let mut next_carried = carried.iter().map(|c| c.saturating_sub(1)).collect::<Vec<_>>();
            while position < width {
                if carried[position] > 0 {
                    position += 1;
                    continue;
                }
                let Some(cell) = cells.next() else {
                    return Err(format!("row {index} leaves column {position} uncovered"));
                };
                let span = cell.colspan.max(1) as usize;
                if position + span > width {
                    return Err(format!("row {index} spans past the last column"));
                }
                for slot in position..position + span {
                    if carried[slot] > 0 {
                        return Err(format!("row {index} overlaps a rowspan at column {slot}"));
                    }
                    next_carried[slot] = cell.rowspan.max(1) - 1;
                }
                position += span;
            }
            if cells.next().is_some() {
                return Err(format!("row {index} has more cells than columns"));
            }
            carried = next_carried;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListSymbol {
    #[default]
    Bullet,
    Numbered,
    Dash,
    Roman,
    Lettered,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListStyles {
    #[serde(default)]
    pub font_family: Option<String>,
    #[serde(default)]
    pub font_size: Option<f64>,
    #[serde(default)]
    pub font_weight: Option<String>,
    #[serde(default)]
    pub text_color: Option<String>,
}

impl ListStyles {
    pub fn merged(&self, overrides: &Self) -> Self {
        Self {
            font_family: overrides.font_family.clone().or_else(|| self.font_family.clone()),
            font_size: overrides.font_size.or(self.font_size),
            font_weight: overrides.font_weight.clone().or_else(|| self.font_weight.clone()),
            text_color: overrides.text_color.clone().or_else(|| self.text_color.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListItem {
    pub value: InjectableValue,
    #[serde(default)]
    pub children: Vec<ListItem>,
}

impl ListItem {
    pub fn new(value: impl Into<InjectableValue>) -> Self {
        Self {
            value: value.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<ListItem>) -> Self {
        self.children = children;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListValue {
    #[serde(default)]
    pub symbol: ListSymbol,
    #[serde(default)]
    pub header_label: IndexMap<String, String>,
    #[serde(default)]
    pub items: Vec<ListItem>,
    #[serde(default)]
    pub header_styles: Option<ListStyles>,
    #[serde(default)]
    pub item_styles: Option<ListStyles>,
}

impl ListValue {
    pub fn header(&self, locale: &str) -> Option<&str> {
        self.header_label
            .get(locale)
            .or_else(|| self.header_label.get("en"))
            .or_else(|| self.header_label.values().next())
            .map(String::as_str)
            .filter(|label| !label.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(key: &str) -> TableColumn {
        TableColumn {
            key: key.into(),
            labels: IndexMap::new(),
            value_type: ValueType::String,
            width: None,
            format: None,
        }
    }

    #[test]
    fn extraction_reports_mismatch() {
        let value = InjectableValue::from("Acme");
        assert_eq!(value.as_str(), Some("Acme"));
        assert_eq!(value.as_number(), None);
        assert_eq!(InjectableValue::Number(2.5).as_number(), Some(2.5));
        assert!(InjectableValue::Boolean(true).as_table().is_none());
    }

    #[test]
    fn serde_uses_tagged_representation() {
        let value: InjectableValue =
            serde_json::from_str(r#"{"type": "number", "value": 12.5}"#).unwrap();
        assert_eq!(value, InjectableValue::Number(12.5));
        let encoded = serde_json::to_value(InjectableValue::from("x")).unwrap();
        assert_eq!(encoded, serde_json::json!({"type": "string", "value": "x"}));
    }

    #[test]
    fn number_formatting() {
        assert_eq!(format_number(42.0), "42");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(2.75), "2.75");
    }

    #[test]
    fn column_label_priority() {
        let mut col = column("amount");
        assert_eq!(col.label("es"), "amount");
        col.labels.insert("fr".into(), "Montant".into());
        assert_eq!(col.label("es"), "Montant");
        col.labels.insert("en".into(), "Amount".into());
        assert_eq!(col.label("es"), "Amount");
        col.labels.insert("es".into(), "Importe".into());
        assert_eq!(col.label("es"), "Importe");
    }

    #[test]
    fn table_coverage_accepts_spans() {
        let table = TableValue {
            columns: vec![column("a"), column("b"), column("c")],
            rows: vec![
                vec![TableCell::new("x").span(2, 1), TableCell::new("y").span(1, 2)],
                vec![TableCell::new("p"), TableCell::new("q")],
            ],
            ..Default::default()
        };
        assert_eq!(table.validate(), Ok(()));
    }

    #[test]
    fn table_coverage_rejects_gaps_and_overflow() {
        let mut table = TableValue {
            columns: vec![column("a"), column("b")],
            rows: vec![vec![TableCell::new("x")]],
            ..Default::default()
        };
        assert!(table.validate().is_err());
        table.rows = vec![vec![TableCell::new("x"), TableCell::new("y"), TableCell::empty()]];
        assert!(table.validate().is_err());
        table.columns.push(column("a"));
        assert!(table.validate().unwrap_err().contains("duplicate"));
    }

    #[test]
    fn format_config_default_must_be_an_option() {
        let config = FormatConfig {
            default: Some("DD/MM/YYYY".into()),
            options: vec!["YYYY-MM-DD".into()],
        };
        assert!(config.validate("due").is_err());
        let config = FormatConfig {
            default: Some("$".into()),
            options: vec![],
        };
        assert!(config.validate("total").is_ok());
    }

    #[test]
    fn style_merge_prefers_overrides() {
        let base = TableStyles {
            font_family: Some("Inter".into()),
            font_size: Some(12.0),
            ..Default::default()
        };
        let overrides = TableStyles {
            font_size: Some(14.0),
            background: Some("#eee".into()),
            ..Default::default()
        };
        let merged = base.merged(&overrides);
        assert_eq!(merged.font_family.as_deref(), Some("Inter"));
        assert_eq!(merged.font_size, Some(14.0));
        assert_eq!(merged.background.as_deref(), Some("#eee"));
    }
}
