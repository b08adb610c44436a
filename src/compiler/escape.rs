//! Typst markup escaping.

/// Characters with markup meaning anywhere in a line.
const SPECIAL: &[char] = &['\\', '#', '*', '_', '@', '$', '<', '>', '[', ']', '`', '~', '/'];

/// Characters with markup meaning only at the start of a line.
const LINE_START: &[char] = &['=', '-', '+'];

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    let mut line_start = true;
    // Inside digits that open a line, where `1.` would start a numbered item.
    let mut leading_digits = false;
    for c in text.chars() {
        if SPECIAL.contains(&c)
            || (line_start && LINE_START.contains(&c))
            || (leading_digits && c == '.')
        {
            out.push('\\');
        }
        out.push(c);
        leading_digits = c.is_ascii_digit() && (line_start || leading_digits);
        line_start = c == '\n' || (line_start && c.is_whitespace());
    }
    out
}

/// Inverse of [`escape`]. Backslashes not followed by an escapable character are kept.
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\'
            && let Some(&next) = chars.peek()
            && (SPECIAL.contains(&next) || LINE_START.contains(&next) || next == '.')
        {
            out.push(next);
            chars.next();
            continue;
        }
        out.push(c);
    }
    out
}

/// A Typst string literal.
pub fn string_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup_characters() {
        assert_eq!(escape("a*b_c"), "a\\*b\\_c");
        assert_eq!(escape("#let x = $5"), "\\#let x = \\$5");
        assert_eq!(escape("<tag> [x] @ref"), "\\<tag\\> \\[x\\] \\@ref");
        assert_eq!(escape("https://x"), "https:\\/\\/x");
        assert_eq!(escape("- item"), "\\- item");
        assert_eq!(escape("a - b"), "a - b");
        assert_eq!(escape("C:\\dir"), "C:\\\\dir");
    }

    #[test]
    fn escapes_numbered_list_markers() {
        assert_eq!(escape("1. Introduction"), "1\\. Introduction");
        assert_eq!(escape("2024. A year"), "2024\\. A year");
        assert_eq!(escape("  12. indented"), "  12\\. indented");
        assert_eq!(escape("a\n3. next line"), "a\n3\\. next line");
        assert_eq!(escape("Version 1.5"), "Version 1.5");
        assert_eq!(escape("3.14 is pi"), "3\\.14 is pi");
        assert_eq!(escape("v1. x"), "v1. x");
    }

    #[test]
    fn unescape_inverts_escape() {
        for sample in [
            "",
            "plain text",
            "a\\b",
            "\\#",
            "trailing\\",
            "= heading\n- list\n+ enum",
            "*_@$<>[]`~/",
            "back\\\\slashes\\-",
            "ünïcödé ✓ #1",
            "1. first\n 22. second\n3.14",
            "\\. literal",
        ] {
            assert_eq!(unescape(&escape(sample)), sample, "sample {sample:?}");
        }
    }

    #[test]
    fn string_literals_escape_quotes() {
        assert_eq!(string_literal(r#"say "hi"\n"#), r#""say \"hi\"\\n""#);
        assert_eq!(string_literal("a\nb"), r#""a\nb""#);
    }
}
