// Diff engine: four independently invocable views over two captures
// (line, paragraph, code/markup, image) plus the rendered body-text diff
// document. All views share the opcode model from `matcher`.

pub mod code;
pub mod html;
pub mod image;
pub mod line;
pub mod matcher;
pub mod paragraph;

/// Minimal HTML entity escaping for rendered diff output.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Char-boundary-safe prefix truncation.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            escape_html(r#"<a href="x">&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate_chars("€€€€", 2), "€€");
        assert_eq!(truncate_chars("ab", 10), "ab");
    }
}
