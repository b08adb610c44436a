use tracing::debug;

use super::{
    Converter,
    escape::{escape, string_literal, unescape},
    format::format_value,
    style::{self, TextStyle},
};
use crate::{
    document::{Mark, Node, parse_px},
    value::{InjectableValue, ValueType},
};

/// Position of a mark in the wrapping order, innermost first.
fn rank(mark: &Mark) -> Option<u8> {
    Some(match mark {
        Mark::Code => 0,
        Mark::Bold => 1,
        Mark::Italic => 2,
        Mark::Strike => 3,
        Mark::Underline => 4,
        Mark::Highlight { .. } => 5,
        Mark::Link { .. } => 6,
        Mark::TextStyle { .. } => 7,
        Mark::Unknown => return None,
    })
}

/// Ends an embedded call so the following text can't extend it.
fn terminate(mut markup: String) -> String {
    if markup.starts_with('#') && (markup.ends_with(']') || markup.ends_with(')')) {
        markup.push(';');
    }
    markup
}

impl Converter<'_> {
    pub(super) fn text(&mut self, node: &Node) -> String {
        match node.text.as_deref() {
            Some(text) if !text.is_empty() => self.marked(escape(text), &node.marks),
            _ => String::new(),
        }
    }

    /// Wraps already escaped text in its marks.
    pub(super) fn marked(&self, escaped: String, marks: &[Mark]) -> String {
        let mut ordered = marks
            .iter()
            .filter_map(|mark| Some((rank(mark)?, mark)))
            .collect::<Vec<_>>();
        if ordered.is_empty() {
            return escaped;
        }
        ordered.sort_by_key(|(rank, _)| *rank);
        ordered.dedup_by_key(|(rank, _)| *rank);

        let mut out = escaped;
        for (_, mark) in ordered {
            out = match mark {
                Mark::Code => format!("#raw({})", string_literal(&unescape(&out))),
                Mark::Bold => format!("#strong[{out}]"),
                Mark::Italic => format!("#emph[{out}]"),
                Mark::Strike => format!("#strike[{out}]"),
                Mark::Underline => format!("#underline[{out}]"),
                Mark::Highlight { attrs } => {
                    let fill = attrs
                        .color
                        .as_deref()
                        .and_then(style::color)
                        .unwrap_or_else(|| self.config.highlight_color.clone());
                    format!("#highlight(fill: {fill})[{out}]")
                }
                Mark::Link { attrs } => match attrs.href.as_deref().map(str::trim) {
                    Some(href) if !href.is_empty() => {
                        format!("#link({})[{out}]", string_literal(href))
                    }
                    _ => out,
                },
                Mark::TextStyle { attrs } => TextStyle {
                    font: attrs.font_family.clone(),
                    size_px: attrs.font_size.as_deref().and_then(parse_px),
                    weight: None,
                    color: attrs.color.clone(),
                }
                .wrap(&out),
                Mark::Unknown => out,
            };
        }
        terminate(out)
    }

    /// Scalar injector. The value comes from the resolved map, then the node's own
    /// default, then the injectable's declared default.
    pub(super) fn injector(&mut self, node: &Node) -> String {
        let (values, defaults) = (self.values, self.defaults);
        let code = node.attr_str("id").unwrap_or_default();
        let info = defaults.get(code);
        let node_default = node
            .attr_str("defaultValue")
            .filter(|s| !s.is_empty())
            .map(InjectableValue::from);
        let value = values
            .get(code)
            .filter(|v| !v.is_empty())
            .or(node_default.as_ref())
            .or_else(|| info.and_then(|info| info.default.as_ref()));

        let declared = node
            .attr("valueType")
            .and_then(|t| serde_json::from_value::<ValueType>(t.clone()).ok())
            .or(info.map(|info| info.value_type));
        let format = node.attr_str("format").or_else(|| {
            info.and_then(|info| info.format.as_ref())
                .and_then(|format| format.default.as_deref())
        });
        let prefix = node.attr_str("prefix").unwrap_or_default();
        let suffix = node.attr_str("suffix").unwrap_or_default();

        let body = match value {
            Some(InjectableValue::Image(src)) => return self.inline_image(src, node),
            Some(InjectableValue::Table(table)) => return self.table_value(table, node),
            Some(InjectableValue::List(list)) => return self.list_value(list, node),
            Some(value) => format_value(value, declared, format, self.locale),
            None => String::new(),
        };
        if body.is_empty() {
            debug!(code, "injector has no value");
            if node.attr_bool("showLabelIfEmpty").unwrap_or(false)
                && !(prefix.is_empty() && suffix.is_empty())
            {
                return self.marked(escape(&format!("{prefix}{suffix}")), &node.marks);
            }
            return String::new();
        }
        self.marked(escape(&format!("{prefix}{body}{suffix}")), &node.marks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compiler::{
            Builder, Defaults, InjectableInfo, ResolvedValues,
            tests::{body, doc},
        },
        config::CompilerConfig,
        document::{HighlightAttrs, LinkAttrs, NodeType, TextStyleAttrs},
        value::FormatConfig,
    };

    fn paragraph(children: Vec<Node>) -> Node {
        Node::new(NodeType::Paragraph).with_children(children)
    }

    fn injector(code: &str) -> Node {
        Node::new(NodeType::Injector).with_attr("id", code)
    }

    #[test]
    fn marks_apply_in_fixed_order() {
        let text = Node::text("a_b").with_marks(vec![
            Mark::Italic,
            Mark::Link {
                attrs: LinkAttrs {
                    href: Some("https://x.dev".into()),
                },
            },
            Mark::Bold,
        ]);
        assert_eq!(
            body(vec![paragraph(vec![text])], &ResolvedValues::new()),
            "#link(\"https://x.dev\")[#emph[#strong[a\\_b]]];\n\n"
        );
    }

    #[test]
    fn code_marks_are_raw() {
        let text = Node::text("x = *y*").with_marks(vec![Mark::Code, Mark::Bold]);
        assert_eq!(
            body(vec![paragraph(vec![text])], &ResolvedValues::new()),
            "#strong[#raw(\"x = *y*\")];\n\n"
        );
    }

    #[test]
    fn highlight_and_style_marks() {
        let highlighted = Node::text("hi").with_marks(vec![Mark::Highlight {
            attrs: HighlightAttrs::default(),
        }]);
        let styled = Node::text("big").with_marks(vec![Mark::TextStyle {
            attrs: TextStyleAttrs {
                color: Some("#ff0000".into()),
                font_size: Some("24px".into()),
                font_family: None,
            },
        }]);
        let empty_link = Node::text("plain").with_marks(vec![Mark::Link {
            attrs: LinkAttrs { href: Some(" ".into()) },
        }]);
        assert_eq!(
            body(
                vec![paragraph(vec![highlighted, styled, empty_link])],
                &ResolvedValues::new()
            ),
            "#highlight(fill: yellow)[hi];#text(size: 18pt, fill: rgb(\"#ff0000\"))[big];plain\n\n"
        );
    }

    #[test]
    fn scalar_injector_renders_escaped_value() {
        let values: ResolvedValues =
            [("client_name".to_owned(), InjectableValue::from("Acme Corp"))]
                .into_iter()
                .collect();
        let out = body(
            vec![paragraph(vec![
                Node::text("Client: "),
                injector("client_name"),
            ])],
            &values,
        );
        assert_eq!(out, "Client: Acme Corp\n\n");
    }

    #[test]
    fn injector_fallbacks_and_labels() {
        let config = CompilerConfig::default();
        let defaults: Defaults = [(
            "total".to_owned(),
            InjectableInfo {
                value_type: ValueType::Currency,
                format: Some(FormatConfig {
                    default: Some("$".into()),
                    options: vec!["$".into(), "EUR".into()],
                }),
                default: Some(InjectableValue::Number(0.0)),
            },
        )]
        .into_iter()
        .collect();
        let builder = Builder::new(&config, &defaults);
        let document = doc(vec![paragraph(vec![
            injector("total").with_attr("prefix", "Total: "),
            Node::new(NodeType::HardBreak),
            injector("missing")
                .with_attr("prefix", "Ref #")
                .with_attr("showLabelIfEmpty", true),
            Node::new(NodeType::HardBreak),
            injector("missing").with_attr("defaultValue", "n/a"),
            injector("silent"),
        ])]);
        let markup = builder.build(&document, &ResolvedValues::new()).markup;
        assert!(markup.ends_with("Total: \\$0.00#linebreak();Ref \\##linebreak();n\\/a\n\n"));

        let values = [("total".to_owned(), InjectableValue::Number(1234.5))]
            .into_iter()
            .collect();
        let markup = builder.build(&document, &values).markup;
        assert!(markup.contains("Total: \\$1234.50"));
    }
}
