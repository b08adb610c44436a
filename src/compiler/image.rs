use super::{Converter, escape::string_literal, pt};
use crate::{
    document::{Node, NodeType},
    value::InjectableValue,
};

/// An inline-display image wraps the paragraphs that follow it.
pub(super) fn is_wrapping(node: &Node) -> bool {
    node.node_type == NodeType::Image && node.attr_str("display") == Some("inline")
}

impl Converter<'_> {
    /// Final path of the image: an injectable binding first, then `src`.
    fn image_path(&mut self, node: &Node) -> Option<String> {
        let bound = node
            .attr_str("injectableId")
            .and_then(|code| self.lookup(code))
            .and_then(|value| match value {
                InjectableValue::Image(src) | InjectableValue::String(src) => Some(src.as_str()),
                _ => None,
            })
            .filter(|src| !src.trim().is_empty());
        let src = bound.or_else(|| node.attr_str("src").filter(|s| !s.trim().is_empty()))?;
        Some(self.source(src))
    }

    /// Records `src` and returns the path to emit for it: its cache file once
    /// staged, else the source itself.
    fn source(&mut self, src: &str) -> String {
        self.images.0.insert(src.to_owned());
        match self.staged.and_then(|staged| staged.get(src)) {
            Some(name) => format!("/{name}"),
            None => src.to_owned(),
        }
    }

    /// `image(..)` call without the leading `#`, or `None` if there's nothing to show.
    fn image_call(&mut self, node: &Node) -> Option<String> {
        let path = self.image_path(node)?;
        Some(self.sized_image(&path, node))
    }

    fn sized_image(&self, path: &str, node: &Node) -> String {
        let width = node.attr_f64("width").filter(|w| *w > 0.0);
        let height = node.attr_f64("height").filter(|h| *h > 0.0);
        let path = string_literal(path);
        if node.attr_str("shape") == Some("circle") {
            let side = match (width, height) {
                (Some(w), Some(h)) => Some(w.min(h)),
                (w, h) => w.or(h),
            };
            return match side {
                Some(side) => format!(
                    "box(width: {0}, height: {0}, radius: 50%, clip: true, image({path}, width: 100%, height: 100%, fit: \"cover\"))",
                    pt(side)
                ),
                None => format!("box(radius: 50%, clip: true, image({path}))"),
            };
        }
        let mut args = vec![path];
        if let Some(width) = width {
            args.push(format!("width: {}", pt(width)));
        }
        if let Some(height) = height {
            args.push(format!("height: {}", pt(height)));
        }
        format!("image({})", args.join(", "))
    }

    pub(super) fn image_block(&mut self, node: &Node) -> String {
        let Some(call) = self.image_call(node) else {
            return String::new();
        };
        match node.attr_str("align").or_else(|| node.attr_str("textAlign")) {
            Some("center") => format!("#align(center, {call})\n\n"),
            Some("right") => format!("#align(right, {call})\n\n"),
            _ => format!("#{call}\n\n"),
        }
    }

    /// An image value placed inside running text.
    pub(super) fn inline_image(&mut self, src: &str, node: &Node) -> String {
        if src.trim().is_empty() {
            return String::new();
        }
        let path = self.source(src);
        format!("#box({});", self.sized_image(&path, node))
    }

    /// The image beside the paragraphs following it.
    pub(super) fn image_wrap(&mut self, image: &Node, paragraphs: &[Node]) -> String {
        let text = self.children(paragraphs);
        let Some(call) = self.image_call(image) else {
            return text;
        };
        let right = image.attr_str("align") == Some("right");
        let (columns, cells) = if right {
            ("(1fr, auto)", format!("[\n{}\n], {call}", text.trim_end()))
        } else {
            ("(auto, 1fr)", format!("{call}, [\n{}\n]", text.trim_end()))
        };
        format!("#grid(columns: {columns}, gutter: 12pt, {cells})\n\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{
        ResolvedValues,
        tests::{body, compile, paragraph},
    };

    fn image(src: &str) -> Node {
        Node::new(NodeType::Image).with_attr("src", src)
    }

    #[test]
    fn local_images_pass_through_with_size() {
        let out = body(
            vec![image("assets/logo.png").with_attr("width", 200).with_attr("align", "center")],
            &ResolvedValues::new(),
        );
        assert_eq!(out, "#align(center, image(\"assets/logo.png\", width: 150pt))\n\n");
    }

    #[test]
    fn circles_clip_to_the_smaller_side() {
        let out = body(
            vec![
                image("a.png")
                    .with_attr("shape", "circle")
                    .with_attr("width", 120)
                    .with_attr("height", "80px"),
            ],
            &ResolvedValues::new(),
        );
        assert!(out.starts_with("#box(width: 60pt, height: 60pt, radius: 50%, clip: true,"));
    }

    #[test]
    fn binding_wins_over_src() {
        let values: ResolvedValues = [(
            "logo".to_owned(),
            InjectableValue::Image("https://cdn.example.com/l.png".into()),
        )]
        .into_iter()
        .collect();
        let compiled = compile(
            vec![image("fallback.png").with_attr("injectableId", "logo")],
            &values,
        );
        assert_eq!(
            compiled.images.iter().collect::<Vec<_>>(),
            vec!["https://cdn.example.com/l.png"]
        );
        assert!(!compiled.markup.contains("fallback.png"));
    }

    #[test]
    fn inline_images_wrap_following_paragraphs() {
        let out = body(
            vec![
                image("p.png").with_attr("display", "inline").with_attr("width", 40),
                paragraph("one"),
                paragraph("two"),
                Node::new(NodeType::HorizontalRule),
            ],
            &ResolvedValues::new(),
        );
        assert_eq!(
            out,
            "#grid(columns: (auto, 1fr), gutter: 12pt, image(\"p.png\", width: 30pt), [\none\n\ntwo\n])\n\n#line(length: 100%)\n\n"
        );
    }

    #[test]
    fn images_without_source_vanish() {
        assert_eq!(
            body(vec![Node::new(NodeType::Image)], &ResolvedValues::new()),
            ""
        );
    }
}
