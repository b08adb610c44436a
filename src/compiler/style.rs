use std::sync::LazyLock;

use itertools::Itertools;

use super::{escape::string_literal, pt};
use crate::value::{ListStyles, TableStyles};

const NAMED_COLORS: &[&str] = &[
    "black", "gray", "silver", "white", "navy", "blue", "aqua", "teal", "eastern", "purple",
    "fuchsia", "maroon", "red", "orange", "yellow", "olive", "green", "lime",
];

static RGB_FUNCTION: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"^rgba?\(\s*(\d{1,3})\s*,\s*(\d{1,3})\s*,\s*(\d{1,3})\s*(?:,\s*([\d.]+)\s*)?\)$",
    )
    .unwrap()
});

/// Converts a CSS colour into a Typst colour expression.
pub fn color(value: &str) -> Option<String> {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix('#') {
        return (matches!(hex.len(), 3 | 4 | 6 | 8) && hex.chars().all(|c| c.is_ascii_hexdigit()))
            .then(|| format!("rgb(\"#{hex}\")"));
    }
    if let Some(captures) = RGB_FUNCTION.captures(value) {
        let channel = |i: usize| captures[i].parse::<u16>().ok().filter(|c| *c <= 255);
        let (r, g, b) = (channel(1)?, channel(2)?, channel(3)?);
        return Some(match captures.get(4).and_then(|a| a.as_str().parse::<f64>().ok()) {
            Some(alpha) => format!(
                "rgb({r}, {g}, {b}, {}%)",
                (alpha.clamp(0.0, 1.0) * 100.0).round()
            ),
            None => format!("rgb({r}, {g}, {b})"),
        });
    }
    let lower = value.to_ascii_lowercase();
    NAMED_COLORS.contains(&lower.as_str()).then_some(lower)
}

fn fallback_chain(family: &str) -> Option<&'static [&'static str]> {
    let chain: &'static [&'static str] = match family {
        "arial" | "helvetica" | "helvetica neue" => {
            &["Arial", "Helvetica", "Liberation Sans", "DejaVu Sans"]
        }
        "times new roman" | "times" => {
            &["Times New Roman", "Times", "Liberation Serif", "DejaVu Serif"]
        }
        "courier new" | "courier" => {
            &["Courier New", "Courier", "Liberation Mono", "DejaVu Sans Mono"]
        }
        "georgia" => &["Georgia", "Liberation Serif", "DejaVu Serif"],
        "verdana" | "tahoma" => &["Verdana", "Tahoma", "DejaVu Sans"],
        "inter" => &["Inter", "Liberation Sans", "DejaVu Sans"],
        "roboto" => &["Roboto", "Liberation Sans", "DejaVu Sans"],
        "open sans" => &["Open Sans", "Liberation Sans", "DejaVu Sans"],
        "sans-serif" | "system-ui" => &["Liberation Sans", "DejaVu Sans"],
        "serif" => &["Liberation Serif", "DejaVu Serif"],
        "monospace" => &["Liberation Mono", "DejaVu Sans Mono"],
        _ => return None,
    };
    Some(chain)
}

/// The `font:` argument for the first family of a CSS font-family list.
pub fn font_family(family_list: &str) -> Option<String> {
    let first = family_list
        .split(',')
        .next()?
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim();
    if first.is_empty() {
        return None;
    }
    Some(match fallback_chain(&first.to_ascii_lowercase()) {
        Some(chain) => format!("({})", chain.iter().map(|f| string_literal(f)).join(", ")),
        None => string_literal(first),
    })
}

fn font_weight(value: &str) -> Option<String> {
    let value = value.trim().to_ascii_lowercase();
    match value.as_str() {
        "bold" | "bolder" => Some("\"bold\"".to_owned()),
        "normal" => Some("\"regular\"".to_owned()),
        "lighter" => Some("\"light\"".to_owned()),
        other => other
            .parse::<u16>()
            .ok()
            .filter(|w| (100..=900).contains(w))
            .map(|w| w.to_string()),
    }
}

/// Arguments of a `text(..)` call built from whichever attributes are present.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TextStyle {
    pub font: Option<String>,
    pub size_px: Option<f64>,
    pub weight: Option<String>,
    pub color: Option<String>,
}

impl TextStyle {
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(font) = self.font.as_deref().and_then(font_family) {
            args.push(format!("font: {font}"));
        }
        if let Some(size) = self.size_px.filter(|s| *s > 0.0) {
            args.push(format!("size: {}", pt(size)));
        }
        if let Some(weight) = self.weight.as_deref().and_then(font_weight) {
            args.push(format!("weight: {weight}"));
        }
        if let Some(fill) = self.color.as_deref().and_then(color) {
            args.push(format!("fill: {fill}"));
        }
        args
    }

    /// Wraps `body` (markup) in a text call, or returns it unchanged if no argument applies.
    pub fn wrap(&self, body: &str) -> String {
        let args = self.args();
        if args.is_empty() {
            body.to_owned()
        } else {
            format!("#text({})[{body}]", args.join(", "))
        }
    }
}

impl From<&TableStyles> for TextStyle {
    fn from(value: &TableStyles) -> Self {
        Self {
            font: value.font_family.clone(),
            size_px: value.font_size,
            weight: value.font_weight.clone(),
            color: value.text_color.clone(),
        }
    }
}

impl From<&ListStyles> for TextStyle {
    fn from(value: &ListStyles) -> Self {
        Self {
            font: value.font_family.clone(),
            size_px: value.font_size,
            weight: value.font_weight.clone(),
            color: value.text_color.clone(),
        }
    }
}

pub fn alignment(value: &str) -> Option<&'static str> {
    match value.trim().to_ascii_lowercase().as_str() {
        "left" | "start" => Some("left"),
        "center" => Some("center"),
        "right" | "end" => Some("right"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colors() {
        assert_eq!(color("#FF8800").as_deref(), Some("rgb(\"#FF8800\")"));
        assert_eq!(color("rgb(1, 2, 3)").as_deref(), Some("rgb(1, 2, 3)"));
        assert_eq!(color("rgba(1,2,3,0.5)").as_deref(), Some("rgb(1, 2, 3, 50%)"));
        assert_eq!(color("Red").as_deref(), Some("red"));
        assert_eq!(color("#zzz"), None);
        assert_eq!(color("papayawhip"), None);
    }

    #[test]
    fn fonts_use_fallback_chains() {
        assert_eq!(
            font_family("'Courier New', monospace").as_deref(),
            Some(r#"("Courier New", "Courier", "Liberation Mono", "DejaVu Sans Mono")"#)
        );
        assert_eq!(font_family("Comic Neue, cursive").as_deref(), Some(r#""Comic Neue""#));
        assert_eq!(font_family(" , serif"), None);
    }

    #[test]
    fn text_style_only_emits_present_arguments() {
        let style = TextStyle {
            size_px: Some(16.0),
            color: Some("#333".into()),
            ..Default::default()
        };
        assert_eq!(style.wrap("x"), "#text(size: 12pt, fill: rgb(\"#333\"))[x]");
        assert_eq!(TextStyle::default().wrap("x"), "x");
        let bold = TextStyle {
            weight: Some("700".into()),
            ..Default::default()
        };
        assert_eq!(bold.args(), vec!["weight: 700".to_owned()]);
    }
}
