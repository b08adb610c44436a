use itertools::Itertools;
use tracing::warn;

use super::{
    Converter,
    escape::escape,
    format::format_value,
    pt,
    style::{self, TextStyle},
};
use crate::{
    document::{Node, NodeType, parse_px},
    value::{InjectableValue, TableStyles, TableValue},
};

#[derive(Debug, Clone, PartialEq)]
enum Width {
    Px(f64),
    /// A Typst length or fraction such as `2fr` or `25%`.
    Raw(String),
}

fn parse_width(raw: &str) -> Option<Width> {
    let raw = raw.trim();
    if let Some(px) = parse_px(raw) {
        return (px > 0.0).then_some(Width::Px(px));
    }
    let numeric = raw.trim_end_matches(|c: char| c.is_ascii_alphabetic() || c == '%');
    let unit = &raw[numeric.len()..];
    (numeric.parse::<f64>().is_ok() && matches!(unit, "fr" | "%" | "pt" | "em" | "cm" | "mm"))
        .then(|| Width::Raw(raw.to_owned()))
}

/// The `columns:` argument. Missing pixel widths share what is left of the content
/// width; without a content width every column gets an equal fraction.
fn column_widths(widths: &[Option<Width>], content_width: Option<f64>) -> String {
    let equal = || format!("({})", vec!["1fr"; widths.len().max(1)].join(", "));
    if widths.iter().all(Option::is_none) {
        return equal();
    }
    let missing = widths.iter().filter(|w| w.is_none()).count();
    let has_raw = widths.iter().any(|w| matches!(w, Some(Width::Raw(_))));
    let fill = if missing == 0 {
        None
    } else if has_raw {
        Some("1fr".to_owned())
    } else {
        let known: f64 = widths
            .iter()
            .filter_map(|w| match w {
                Some(Width::Px(px)) => Some(*px),
                _ => None,
            })
            .sum();
        match content_width.map(|total| total - known) {
            Some(remaining) if remaining > 0.0 => Some(pt(remaining / missing as f64)),
            _ => return equal(),
        }
    };
    let columns = widths
        .iter()
        .map(|width| match width {
            Some(Width::Px(px)) => pt(*px),
            Some(Width::Raw(raw)) => raw.clone(),
            None => fill.clone().unwrap_or_default(),
        })
        .join(", ");
    format!("({columns})")
}

fn style_overrides(node: &Node, prefix: &str) -> TableStyles {
    let attr = |name: &str| node.attr_str(&format!("{prefix}{name}")).map(str::to_owned);
    TableStyles {
        font_family: attr("FontFamily"),
        font_size: node.attr_f64(&format!("{prefix}FontSize")),
        font_weight: attr("FontWeight"),
        text_color: attr("TextColor"),
        text_align: attr("TextAlign"),
        background: attr("Background"),
    }
}

fn cell(body: &str, colspan: u32, rowspan: u32, fill: Option<String>) -> String {
    let mut args = Vec::new();
    if colspan > 1 {
        args.push(format!("colspan: {colspan}"));
    }
    if rowspan > 1 {
        args.push(format!("rowspan: {rowspan}"));
    }
    if let Some(fill) = fill {
        args.push(format!("fill: {fill}"));
    }
    if args.is_empty() {
        format!("[{body}]")
    } else {
        format!("table.cell({})[{body}]", args.join(", "))
    }
}

/// One branch of a row-keyed closure.
fn text_branch(style: &TableStyles) -> String {
    let args = TextStyle::from(style).args();
    if args.is_empty() {
        "{ it }".to_owned()
    } else {
        format!("{{ set text({}); it }}", args.join(", "))
    }
}

fn by_row(header_rows: usize, header: Option<String>, body: Option<String>, or: &str) -> String {
    let header = header.unwrap_or_else(|| or.to_owned());
    let body = body.unwrap_or_else(|| or.to_owned());
    if header_rows == 0 {
        body
    } else {
        format!("(_, y) => if y < {header_rows} {{ {header} }} else {{ {body} }}")
    }
}

fn first_row_widths(node: &Node, columns: usize) -> Vec<Option<Width>> {
    let mut widths = Vec::with_capacity(columns);
    if let Some(row) = node.content.first() {
        for cell in &row.content {
            let span = cell.attr_f64("colspan").unwrap_or(1.0).max(1.0) as usize;
            let declared = cell.attr("colwidth").and_then(|w| w.as_array());
            for i in 0..span {
                let px = declared
                    .and_then(|w| w.get(i))
                    .and_then(serde_json::Value::as_f64)
                    .filter(|px| *px > 0.0);
                widths.push(px.map(Width::Px));
            }
        }
    }
    widths.resize(columns, None);
    widths
}

struct Layout {
    columns: String,
    header_rows: usize,
    header: TableStyles,
    body: TableStyles,
    /// Header rows first, already rendered as cells.
    rows: Vec<Vec<String>>,
}

impl Layout {
    fn render(self) -> String {
        let (header, body) = if self.header_rows == 0 {
            (TableStyles::default(), self.body.clone())
        } else {
            (self.header.clone(), self.body.clone())
        };
        let mut args = vec![format!("columns: {}", self.columns)];
        let fills = (
            header.background.as_deref().and_then(style::color),
            body.background.as_deref().and_then(style::color),
        );
        if fills.0.is_some() || fills.1.is_some() {
            args.push(format!("fill: {}", by_row(self.header_rows, fills.0, fills.1, "none")));
        }
        let aligns = (
            header.text_align.as_deref().and_then(style::alignment).map(str::to_owned),
            body.text_align.as_deref().and_then(style::alignment).map(str::to_owned),
        );
        if aligns.0.is_some() || aligns.1.is_some() {
            args.push(format!("align: {}", by_row(self.header_rows, aligns.0, aligns.1, "auto")));
        }

        let mut rows = self.rows.into_iter();
        let mut lines = args.into_iter().map(|arg| format!("  {arg},")).collect::<Vec<_>>();
        let header_cells = rows.by_ref().take(self.header_rows).flatten().join(", ");
        if !header_cells.is_empty() {
            lines.push(format!("  table.header({header_cells}),"));
        }
        lines.extend(
            rows.filter(|row| !row.is_empty())
                .map(|row| format!("  {},", row.join(", "))),
        );
        let table = format!("#table(\n{}\n)", lines.join("\n"));

        let (header_text, body_text) = (
            TextStyle::from(&header).args(),
            TextStyle::from(&body).args(),
        );
        if header_text.is_empty() && body_text.is_empty() {
            return table;
        }
        let show = if self.header_rows == 0 {
            format!("#show table.cell: set text({})", body_text.join(", "))
        } else {
            format!(
                "#show table.cell: it => if it.y < {} {} else {}",
                self.header_rows,
                text_branch(&header),
                text_branch(&body)
            )
        };
        format!("#[\n{show}\n{table}\n]")
    }
}

impl Converter<'_> {
    fn cell_body(&mut self, cell: &Node) -> String {
        self.children(&cell.content).trim().to_owned()
    }

    pub(super) fn table(&mut self, node: &Node) -> String {
        let rows = node
            .content
            .iter()
            .filter(|row| row.node_type == NodeType::TableRow)
            .collect::<Vec<_>>();
        let columns = rows
            .iter()
            .map(|row| {
                row.content
                    .iter()
                    .map(|cell| cell.attr_f64("colspan").unwrap_or(1.0).max(1.0) as usize)
                    .sum::<usize>()
            })
            .max()
            .unwrap_or_default();
        if columns == 0 {
            return String::new();
        }
        let header_rows = rows
            .iter()
            .take_while(|row| {
                !row.content.is_empty()
                    && row.content.iter().all(|c| c.node_type == NodeType::TableHeader)
            })
            .count();

        let mut rendered = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut cells = Vec::with_capacity(row.content.len());
            for cell_node in &row.content {
                let body = self.cell_body(cell_node);
                cells.push(cell(
                    &body,
                    cell_node.attr_f64("colspan").unwrap_or(1.0).max(1.0) as u32,
                    cell_node.attr_f64("rowspan").unwrap_or(1.0).max(1.0) as u32,
                    cell_node.attr_str("background").and_then(style::color),
                ));
            }
            rendered.push(cells);
        }

        let layout = Layout {
            columns: column_widths(
                &first_row_widths(node, columns),
                self.config.content_width,
            ),
            header_rows,
            header: style_overrides(node, "header"),
            body: style_overrides(node, "body"),
            rows: rendered,
        };
        format!("{}\n\n", layout.render())
    }

    pub(super) fn table_injector(&mut self, node: &Node) -> String {
        let code = node.attr_str("id").unwrap_or_default();
        match self.lookup(code).and_then(InjectableValue::as_table) {
            Some(table) => format!("{}\n\n", self.table_value(table, node)),
            None => {
                tracing::debug!(code, "table injector has no table value");
                String::new()
            }
        }
    }

    /// A table value with localized column labels; `node` attributes override the
    /// value's own styles.
    pub(super) fn table_value(&mut self, table: &TableValue, node: &Node) -> String {
        if let Err(reason) = table.validate() {
            warn!(%reason, "rendering inconsistent table value");
        }
        let width = table.columns.len();
        if width == 0 {
            return String::new();
        }
        let header = table
            .columns
            .iter()
            .map(|column| format!("[{}]", escape(column.label(self.locale))))
            .collect::<Vec<_>>();

        let mut rows = vec![header];
        let mut carried = vec![0u32; width];
        for row in &table.rows {
            let mut next_carried = carried.iter().map(|c| c.saturating_sub(1)).collect::<Vec<_>>();
            let mut position = 0;
            let mut cells = Vec::with_capacity(row.len());
            for table_cell in row {
                while position < width && carried[position] > 0 {
                    position += 1;
                }
                let column = table.columns.get(position.min(width - 1));
                let body = match &table_cell.value {
                    Some(InjectableValue::Image(src)) => {
                        self.inline_image(src, &Node::new(NodeType::Image))
                    }
                    Some(value) => escape(&format_value(
                        value,
                        column.map(|c| c.value_type),
                        column.and_then(|c| c.format.as_deref()),
                        self.locale,
                    )),
                    None => String::new(),
                };
                let span = table_cell.colspan.max(1) as usize;
                for slot in next_carried.iter_mut().skip(position).take(span) {
                    *slot = table_cell.rowspan.max(1) - 1;
                }
                position += span;
                cells.push(cell(&body, table_cell.colspan, table_cell.rowspan, None));
            }
            carried = next_carried;
            rows.push(cells);
        }

        let widths = table
            .columns
            .iter()
            .map(|column| column.width.as_deref().and_then(parse_width))
            .collect::<Vec<_>>();
        Layout {
            columns: column_widths(&widths, self.config.content_width),
            header_rows: 1,
            header: table
                .header_styles
                .clone()
                .unwrap_or_default()
                .merged(&style_overrides(node, "header")),
            body: table
                .body_styles
                .clone()
                .unwrap_or_default()
                .merged(&style_overrides(node, "body")),
            rows,
        }
        .render()
    }
}
