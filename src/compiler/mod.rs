//! Compiles a [`Document`] and its resolved injectable values into Typst markup.
//!
//! A [`Builder`] is cheap to create and holds only configuration. Every call to
//! [`Builder::build`] runs a fresh [`Converter`] pass whose counters (pages, image
//! sources) start from zero, so the same input always produces the same markup.

use std::collections::HashMap;

use derive_debug::Dbg;
use indexmap::{IndexMap, IndexSet};

use crate::{
    config::CompilerConfig,
    document::{Document, Node, NodeType},
    value::{FormatConfig, InjectableValue, ValueType, format_number},
};

mod block;
pub mod condition;
pub mod escape;
mod format;
mod image;
mod inline;
mod page;
pub mod style;
mod table;

pub use format::format_value;

/// Typographic points per CSS pixel at 96 DPI.
pub const PT_PER_PX: f64 = 0.75;

/// Formats a pixel length as a Typst length in points.
pub fn pt(px: f64) -> String {
    format!("{}pt", format_number((px * PT_PER_PX * 100.0).round() / 100.0))
}

/// Resolved injectable values keyed by code.
pub type ResolvedValues = IndexMap<String, InjectableValue>;

/// Static facts about an injectable the compiler needs besides its value.
#[derive(Debug, Clone, PartialEq)]
pub struct InjectableInfo {
    pub value_type: ValueType,
    pub format: Option<FormatConfig>,
    pub default: Option<InjectableValue>,
}

pub type Defaults = IndexMap<String, InjectableInfo>;

/// Image sources met during a pass, in order of first use.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ImageSources(IndexSet<String>);

impl ImageSources {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Dbg, Clone, PartialEq)]
pub struct Compiled {
    #[dbg(skip)]
    pub markup: String,
    pub page_count: usize,
    pub images: ImageSources,
}

pub struct Builder<'a> {
    config: &'a CompilerConfig,
    defaults: &'a Defaults,
    staged: Option<&'a HashMap<String, String>>,
}

impl<'a> Builder<'a> {
    pub fn new(config: &'a CompilerConfig, defaults: &'a Defaults) -> Self {
        Self {
            config,
            defaults,
            staged: None,
        }
    }

    /// Emits images found in `staged` (source to cache file name) as `"/<name>"`,
    /// relative to the compile root. Other sources are emitted unchanged.
    pub fn with_images(mut self, staged: &'a HashMap<String, String>) -> Self {
        self.staged = Some(staged);
        self
    }

    pub fn build(&self, document: &Document, values: &ResolvedValues) -> Compiled {
        let mut converter = Converter {
            config: self.config,
            defaults: self.defaults,
            values,
            locale: document.meta.language.as_str(),
            page_count: 1,
            images: ImageSources::default(),
            staged: self.staged,
        };
        let mut markup = page::setup(&document.page_config, &document.meta.language);
        markup.push('\n');
        markup.push_str(&converter.node(&document.content));
        Compiled {
            markup,
            page_count: converter.page_count,
            images: converter.images,
        }
    }
}

/// State of one compilation pass. Never shared between passes.
pub(crate) struct Converter<'a> {
    config: &'a CompilerConfig,
    defaults: &'a Defaults,
    values: &'a ResolvedValues,
    locale: &'a str,
    page_count: usize,
    images: ImageSources,
    staged: Option<&'a HashMap<String, String>>,
}

impl<'a> Converter<'a> {
    pub(crate) fn node(&mut self, node: &Node) -> String {
        match node.node_type {
            NodeType::Doc => self.children(&node.content),
            NodeType::Paragraph => self.paragraph(node),
            NodeType::Heading => self.heading(node),
            NodeType::Blockquote => self.blockquote(node),
            NodeType::CodeBlock => self.code_block(node),
            NodeType::HorizontalRule => "#line(length: 100%)\n\n".to_owned(),
            NodeType::PageBreak => {
                self.page_count += 1;
                "#pagebreak()\n".to_owned()
            }
            NodeType::BulletList | NodeType::OrderedList | NodeType::TaskList => {
                let mut out = self.list(node, 0);
                out.push('\n');
                out
            }
            // Items outside of a list are rendered as a one-item bullet list.
            NodeType::ListItem | NodeType::TaskItem => {
                let mut out = self.list_item(node, "-", 0, None);
                out.push('\n');
                out
            }
            NodeType::Image => self.image_block(node),
            NodeType::Text => self.text(node),
            NodeType::HardBreak => "#linebreak();".to_owned(),
            NodeType::Injector => self.injector(node),
            NodeType::ListInjector => self.list_injector(node),
            NodeType::TableInjector => self.table_injector(node),
            NodeType::Table => self.table(node),
            // Rows and cells only make sense inside a table; degrade to their content.
            NodeType::TableRow | NodeType::TableCell | NodeType::TableHeader => {
                self.children(&node.content)
            }
            NodeType::Conditional => self.conditional(node),
            NodeType::Unknown => self.children(&node.content),
        }
    }

    /// Converts siblings in order. An inline-mode image directly followed by
    /// paragraphs is laid out together with them as a text-wrap block.
    pub(crate) fn children(&mut self, nodes: &[Node]) -> String {
        let mut out = String::new();
        let mut index = 0;
        while index < nodes.len() {
            let node = &nodes[index];
            if image::is_wrapping(node) {
                let following = nodes[index + 1..]
                    .iter()
                    .take_while(|next| next.node_type == NodeType::Paragraph)
                    .count();
                if following > 0 {
                    out.push_str(&self.image_wrap(node, &nodes[index + 1..=index + following]));
                    index += 1 + following;
                    continue;
                }
            }
            out.push_str(&self.node(node));
            index += 1;
        }
        out
    }

    fn conditional(&mut self, node: &Node) -> String {
        if condition::node_is_visible(node, self.values) {
            self.children(&node.content)
        } else {
            String::new()
        }
    }

    /// Resolved value of `code`, else the injectable's declared default.
    fn lookup(&self, code: &str) -> Option<&'a InjectableValue> {
        let (values, defaults) = (self.values, self.defaults);
        values
            .get(code)
            .or_else(|| defaults.get(code).and_then(|info| info.default.as_ref()))
    }
}
