use itertools::Itertools;

use super::{
    Converter, condition,
    escape::escape,
    format::format_value,
    style::TextStyle,
};
use crate::{
    document::{Node, NodeType},
    value::{InjectableValue, ListItem, ListStyles, ListSymbol, ListValue},
};

const INDENT: &str = "  ";

/// Wraps block markup according to a `textAlign` attribute.
pub(super) fn aligned(align: Option<&str>, body: String) -> String {
    match align.map(str::trim) {
        Some("center") => format!("#align(center)[{body}]"),
        Some("right") => format!("#align(right)[{body}]"),
        Some("justify") => format!("#par(justify: true)[{body}]"),
        _ => body,
    }
}

/// Concatenated literal text below `node`, ignoring marks.
fn plain_text(node: &Node) -> String {
    match &node.text {
        Some(text) => text.clone(),
        None => node.content.iter().map(plain_text).collect(),
    }
}

/// A backtick fence longer than any run inside the code.
fn fence(code: &str) -> String {
    let longest = code
        .split(|c| c != '`')
        .map(str::len)
        .max()
        .unwrap_or_default();
    "`".repeat(longest.max(2) + 1)
}

/// Indents every line after the first so it stays inside a list item.
fn continue_lines(text: &str, indent: &str) -> String {
    text.lines()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 || line.is_empty() {
                line.to_owned()
            } else {
                format!("{indent}{line}")
            }
        })
        .join("\n")
}

pub(super) fn style_overrides(node: &Node, prefix: &str) -> ListStyles {
    let attr = |name: &str| node.attr_str(&format!("{prefix}{name}")).map(str::to_owned);
    ListStyles {
        font_family: attr("FontFamily"),
        font_size: node.attr_f64(&format!("{prefix}FontSize")),
        font_weight: attr("FontWeight"),
        text_color: attr("TextColor"),
    }
}

impl Converter<'_> {
    pub(super) fn paragraph(&mut self, node: &Node) -> String {
        if node.has_no_content() {
            return "#v(1em)\n\n".to_owned();
        }
        let body = self.children(&node.content);
        format!("{}\n\n", aligned(node.attr_str("textAlign"), body))
    }

    pub(super) fn heading(&mut self, node: &Node) -> String {
        let level = node.attr_f64("level").unwrap_or(1.0).clamp(1.0, 6.0) as usize;
        let body = self.children(&node.content);
        let heading = format!("{} {}", "=".repeat(level), body.trim());
        format!("{}\n\n", aligned(node.attr_str("textAlign"), heading))
    }

    pub(super) fn blockquote(&mut self, node: &Node) -> String {
        let body = self.children(&node.content);
        format!("#quote(block: true)[\n{}\n]\n\n", body.trim_end())
    }

    pub(super) fn code_block(&mut self, node: &Node) -> String {
        let code = plain_text(node);
        let fence = fence(&code);
        let language = node
            .attr_str("language")
            .filter(|l| {
                !l.is_empty() && l.chars().all(|c| c.is_ascii_alphanumeric() || "+-".contains(c))
            })
            .unwrap_or_default();
        format!("{fence}{language}\n{code}\n{fence}\n\n")
    }

    /// List items, with `Conditional` wrappers around items expanded in place.
    fn items<'n>(&self, nodes: &'n [Node], out: &mut Vec<&'n Node>) {
        for node in nodes {
            match node.node_type {
                NodeType::Conditional => {
                    if condition::node_is_visible(node, self.values) {
                        self.items(&node.content, out);
                    }
                }
                _ => out.push(node),
            }
        }
    }

    pub(super) fn list(&mut self, node: &Node, depth: usize) -> String {
        let ordered = node.node_type == NodeType::OrderedList;
        let task = node.node_type == NodeType::TaskList;
        let start = ordered
            .then(|| node.attr_f64("start"))
            .flatten()
            .map(|start| start.max(0.0) as u64)
            .unwrap_or(1);
        let mut items = Vec::new();
        self.items(&node.content, &mut items);

        let mut out = String::new();
        for (index, item) in items.into_iter().enumerate() {
            let marker = match (ordered, index) {
                (true, 0) if start != 1 => format!("{start}."),
                (true, _) => "+".to_owned(),
                (false, _) => "-".to_owned(),
            };
            let checked = (task || item.node_type == NodeType::TaskItem)
                .then(|| item.attr_bool("checked").unwrap_or(false));
            out.push_str(&self.list_item(item, &marker, depth, checked));
        }
        out
    }

    /// One item line followed by its nested lists. Typst forbids a sub-list on the
    /// same line as the item text, so nested lists are emitted after it.
    pub(super) fn list_item(
        &mut self,
        node: &Node,
        marker: &str,
        depth: usize,
        checked: Option<bool>,
    ) -> String {
        let indent = INDENT.repeat(depth);
        let mut parts = Vec::new();
        let mut nested = Vec::new();
        for child in &node.content {
            match child.node_type {
                NodeType::BulletList | NodeType::OrderedList | NodeType::TaskList => {
                    nested.push(child)
                }
                NodeType::Paragraph if !child.has_no_content() => {
                    parts.push(self.children(&child.content))
                }
                NodeType::Paragraph => {}
                NodeType::Text | NodeType::Injector | NodeType::HardBreak => {
                    parts.push(self.node(child))
                }
                _ => parts.push(self.node(child).trim().to_owned()),
            }
        }
        let glyph = match checked {
            Some(true) => "☑ ",
            Some(false) => "☐ ",
            None => "",
        };
        let text = parts.iter().filter(|p| !p.is_empty()).join("#linebreak();");
        let mut out = format!(
            "{indent}{marker} {glyph}{}\n",
            continue_lines(&text, &format!("{indent}{INDENT}"))
        );
        for list in nested {
            out.push_str(&self.list(list, depth + 1));
        }
        out
    }

    pub(super) fn list_injector(&mut self, node: &Node) -> String {
        let code = node.attr_str("id").unwrap_or_default();
        match self.lookup(code).and_then(InjectableValue::as_list) {
            Some(list) => {
                let mut out = self.list_value(list, node);
                out.push_str("\n\n");
                out
            }
            None => {
                tracing::debug!(code, "list injector has no list value");
                String::new()
            }
        }
    }

    /// A list value as a scoped block; `node` attributes override the value's styles.
    pub(super) fn list_value(&mut self, list: &ListValue, node: &Node) -> String {
        let header_styles = list
            .header_styles
            .clone()
            .unwrap_or_default()
            .merged(&style_overrides(node, "header"));
        let item_styles = list
            .item_styles
            .clone()
            .unwrap_or_default()
            .merged(&style_overrides(node, "item"));

        let mut lines = vec!["#[".to_owned()];
        match list.symbol {
            ListSymbol::Bullet => {}
            ListSymbol::Dash => lines.push("#set list(marker: [--])".to_owned()),
            ListSymbol::Numbered => lines.push("#set enum(numbering: \"1.\")".to_owned()),
            ListSymbol::Roman => lines.push("#set enum(numbering: \"i.\")".to_owned()),
            ListSymbol::Lettered => lines.push("#set enum(numbering: \"a.\")".to_owned()),
        }
        if let Some(header) = list.header(self.locale) {
            let header = format!("#strong[{}]", escape(header));
            lines.push(TextStyle::from(&header_styles).wrap(&header));
            lines.push(String::new());
        }
        let args = TextStyle::from(&item_styles).args();
        if !args.is_empty() {
            lines.push(format!("#set text({})", args.join(", ")));
        }
        let marker = match list.symbol {
            ListSymbol::Bullet | ListSymbol::Dash => "-",
            _ => "+",
        };
        let mut items = String::new();
        for item in &list.items {
            self.list_value_item(item, marker, 0, &mut items);
        }
        lines.push(items.trim_end().to_owned());
        lines.push("]".to_owned());
        lines.join("\n")
    }

    fn list_value_item(&mut self, item: &ListItem, marker: &str, depth: usize, out: &mut String) {
        let text = match &item.value {
            InjectableValue::Image(src) => self.inline_image(src, &Node::new(NodeType::Image)),
            value => escape(&format_value(value, None, None, self.locale)),
        };
        out.push_str(&format!("{}{marker} {text}\n", INDENT.repeat(depth)));
        for child in &item.children {
            self.list_value_item(child, marker, depth + 1, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{
        ResolvedValues,
        tests::{body, paragraph},
    };

    fn item(text: &str) -> Node {
        Node::new(NodeType::ListItem).with_children(vec![paragraph(text)])
    }

    #[test]
    fn empty_paragraph_keeps_spacing() {
        let out = body(
            vec![Node::new(NodeType::Paragraph), paragraph("x")],
            &ResolvedValues::new(),
        );
        assert_eq!(out, "#v(1em)\n\nx\n\n");
    }

    #[test]
    fn alignment_and_headings() {
        let out = body(
            vec![
                paragraph("centered").with_attr("textAlign", "center"),
                paragraph("wide").with_attr("textAlign", "justify"),
                Node::new(NodeType::Heading)
                    .with_attr("level", 9)
                    .with_children(vec![Node::text("Deep")]),
                Node::new(NodeType::Heading)
                    .with_attr("level", 0)
                    .with_children(vec![Node::text("Top")]),
            ],
            &ResolvedValues::new(),
        );
        assert_eq!(
            out,
            "#align(center)[centered]\n\n#par(justify: true)[wide]\n\n====== Deep\n\n= Top\n\n"
        );
    }

    #[test]
    fn code_blocks_use_a_safe_fence() {
        let out = body(
            vec![
                Node::new(NodeType::CodeBlock)
                    .with_attr("language", "rust")
                    .with_children(vec![Node::text("let s = \"```\";")]),
            ],
            &ResolvedValues::new(),
        );
        assert_eq!(out, "````rust\nlet s = \"```\";\n````\n\n");
    }

    #[test]
    fn nested_lists_follow_item_text() {
        let list = Node::new(NodeType::BulletList).with_children(vec![
            Node::new(NodeType::ListItem).with_children(vec![
                paragraph("parent"),
                Node::new(NodeType::OrderedList)
                    .with_attr("start", 3)
                    .with_children(vec![item("three"), item("four")]),
            ]),
            item("sibling"),
        ]);
        let out = body(vec![list], &ResolvedValues::new());
        assert_eq!(out, "- parent\n  3. three\n  + four\n- sibling\n\n");
    }

    #[test]
    fn task_items_show_state() {
        let list = Node::new(NodeType::TaskList).with_children(vec![
            Node::new(NodeType::TaskItem)
                .with_attr("checked", true)
                .with_children(vec![paragraph("done")]),
            Node::new(NodeType::TaskItem).with_children(vec![paragraph("todo")]),
        ]);
        let out = body(vec![list], &ResolvedValues::new());
        assert_eq!(out, "- ☑ done\n- ☐ todo\n\n");
    }

    #[test]
    fn list_injector_scopes_its_styles() {
        let list = ListValue {
            symbol: ListSymbol::Roman,
            header_label: [("en".to_owned(), "Terms".to_owned())].into_iter().collect(),
            items: vec![
                ListItem::new("first").with_children(vec![ListItem::new(2.0)]),
                ListItem::new(true),
            ],
            header_styles: None,
            item_styles: Some(ListStyles {
                text_color: Some("red".into()),
                ..Default::default()
            }),
        };
        let values: ResolvedValues = [("terms".to_owned(), InjectableValue::List(list))]
            .into_iter()
            .collect();
        let out = body(
            vec![
                Node::new(NodeType::ListInjector)
                    .with_attr("id", "terms")
                    .with_attr("itemTextColor", "blue"),
            ],
            &values,
        );
        assert_eq!(
            out,
            "#[\n#set enum(numbering: \"i.\")\n#strong[Terms]\n\n#set text(fill: blue)\n+ first\n  + 2\n+ Yes\n]\n\n"
        );
    }
}
