//! Editor document tree consumed by the compiler.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::ConfigurationError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Meta {
    pub title: String,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "en".to_owned()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Margins {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

impl Default for Margins {
    fn default() -> Self {
        // one inch at 96 DPI
        Self {
            top: 96.0,
            bottom: 96.0,
            left: 96.0,
            right: 96.0,
        }
    }
}

/// Page geometry in CSS pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageConfig {
    #[serde(default)]
    pub format_id: Option<String>,
    #[serde(default = "default_width")]
    pub width: f64,
    #[serde(default = "default_height")]
    pub height: f64,
    #[serde(default)]
    pub margins: Margins,
    #[serde(default)]
    pub show_page_numbers: bool,
}

fn default_width() -> f64 {
    794.0
}

fn default_height() -> f64 {
    1123.0
}

impl Default for PageConfig {
    fn default() -> Self {
        Self {
            format_id: Some("A4".to_owned()),
            width: default_width(),
            height: default_height(),
            margins: Margins::default(),
            show_page_numbers: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub meta: Meta,
    #[serde(default)]
    pub page_config: PageConfig,
    #[serde(default)]
    pub variable_ids: Vec<String>,
    pub content: Node,
}

impl Document {
    pub fn from_json(src: &str) -> Result<Self, ConfigurationError> {
        let document: Self = serde_json::from_str(src)
            .map_err(|e| ConfigurationError::InvalidDocument(e.to_string()))?;
        document.validate()?;
        Ok(document)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        validate_node(&self.content, &mut Vec::new())
    }
}

fn validate_node(node: &Node, path: &mut Vec<usize>) -> Result<(), ConfigurationError> {
    if node.node_type == NodeType::Text {
        if !node.content.is_empty() {
            return Err(ConfigurationError::InvalidDocument(format!(
                "text node at {path:?} carries children"
            )));
        }
        if node.text.is_none() {
            return Err(ConfigurationError::InvalidDocument(format!(
                "text node at {path:?} has no text"
            )));
        }
    }
    for (index, child) in node.content.iter().enumerate() {
        path.push(index);
        validate_node(child, path)?;
        path.pop();
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeType {
    Doc,
    Paragraph,
    Heading,
    Blockquote,
    CodeBlock,
    HorizontalRule,
    BulletList,
    OrderedList,
    TaskList,
    ListItem,
    TaskItem,
    PageBreak,
    Image,
    Text,
    Injector,
    ListInjector,
    TableInjector,
    Table,
    TableRow,
    TableCell,
    TableHeader,
    HardBreak,
    Conditional,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub attrs: IndexMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<Node>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub marks: Vec<Mark>,
}

impl Node {
    pub fn new(node_type: NodeType) -> Self {
        Self {
            node_type,
            attrs: IndexMap::new(),
            text: None,
            content: Vec::new(),
            marks: Vec::new(),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::new(NodeType::Text)
        }
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.content = children;
        self
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.attrs.insert(key.to_owned(), value.into());
        self
    }

    pub fn with_marks(mut self, marks: Vec<Mark>) -> Self {
        self.marks = marks;
        self
    }

    pub fn attr(&self, key: &str) -> Option<&serde_json::Value> {
        self.attrs.get(key).filter(|v| !v.is_null())
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attr(key).and_then(serde_json::Value::as_str)
    }

    /// Numbers, numeric strings and `"12px"` style strings are all accepted.
    pub fn attr_f64(&self, key: &str) -> Option<f64> {
        match self.attr(key)? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => parse_px(s),
            _ => None,
        }
    }

    pub fn attr_bool(&self, key: &str) -> Option<bool> {
        match self.attr(key)? {
            serde_json::Value::Bool(b) => Some(*b),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// True when the node has no children other than empty text runs.
    pub fn has_no_content(&self) -> bool {
        self.content.iter().all(|child| {
            child.node_type == NodeType::Text && child.text.as_deref().is_none_or(str::is_empty)
        })
    }
}

pub(crate) fn parse_px(s: &str) -> Option<f64> {
    let s = s.trim();
    let s = s.strip_suffix("px").unwrap_or(s).trim();
    s.parse().ok()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HighlightAttrs {
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkAttrs {
    #[serde(default)]
    pub href: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStyleAttrs {
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub font_size: Option<String>,
    #[serde(default)]
    pub font_family: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Mark {
    Bold,
    Italic,
    Strike,
    Underline,
    Code,
    Highlight {
        #[serde(default)]
        attrs: HighlightAttrs,
    },
    Link {
        #[serde(default)]
        attrs: LinkAttrs,
    },
    TextStyle {
        #[serde(default)]
        attrs: TextStyleAttrs,
    },
    #[serde(other)]
    Unknown,
}
