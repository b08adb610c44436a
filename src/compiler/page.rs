use super::{escape::string_literal, pt};
use crate::document::PageConfig;

fn paper(format_id: &str) -> Option<&'static str> {
    match format_id.trim().to_ascii_uppercase().as_str() {
        "A3" => Some("a3"),
        "A4" => Some("a4"),
        "A5" => Some("a5"),
        "LETTER" => Some("us-letter"),
        "LEGAL" => Some("us-legal"),
        "TABLOID" => Some("us-tabloid"),
        _ => None,
    }
}

/// `#set page(..)` and `#set text(lang: ..)` for the document.
pub(super) fn setup(config: &PageConfig, language: &str) -> String {
    let mut args = Vec::new();
    match config.format_id.as_deref().and_then(paper) {
        Some(paper) => args.push(format!("paper: \"{paper}\"")),
        None => {
            args.push(format!("width: {}", pt(config.width)));
            args.push(format!("height: {}", pt(config.height)));
        }
    }
    let margins = &config.margins;
    args.push(format!(
        "margin: (top: {}, bottom: {}, left: {}, right: {})",
        pt(margins.top),
        pt(margins.bottom),
        pt(margins.left),
        pt(margins.right)
    ));
    if config.show_page_numbers {
        args.push("numbering: \"1\"".to_owned());
    }
    let mut out = format!("#set page({})\n", args.join(", "));
    let lang = language
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    if lang.len() == 2 || lang.len() == 3 {
        out.push_str(&format!("#set text(lang: {})\n", string_literal(&lang)));
    }
    out
}
