// Markup-level diff over pretty-printed body HTML.
use crate::diff::escape_html;
use crate::diff::matcher::{SequenceMatcher, Tag};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::OnceLock;

const VOID_ELEMENTS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Indented, one-node-per-line rendering of the document body. Missing
/// body yields an empty string.
pub fn prettify_body(content: &str) -> String {
    let document = Html::parse_document(content);
    let selector = match Selector::parse("body") {
        Ok(s) => s,
        Err(_) => return String::new(),
    };
    match document.select(&selector).next() {
        Some(body) => {
            let mut lines = Vec::new();
            write_element(body, 0, &mut lines);
            lines.join("\n")
        }
        None => String::new(),
    }
}

fn write_element(el: ElementRef<'_>, depth: usize, lines: &mut Vec<String>) {
    let indent = " ".repeat(depth);
    let name = el.value().name();

    let mut open = format!("{indent}<{name}");
    for (key, value) in el.value().attrs() {
        open.push_str(&format!(" {key}=\"{value}\""));
    }
    open.push('>');
    lines.push(open);

    if VOID_ELEMENTS.contains(&name) {
        return;
    }

    for child in el.children() {
        match child.value() {
            scraper::Node::Text(text) => {
                for line in text.lines() {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        lines.push(format!("{} {}", indent, trimmed));
                    }
                }
            }
            scraper::Node::Comment(comment) => {
                lines.push(format!("{} <!--{}-->", indent, &**comment));
            }
            scraper::Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    write_element(child_el, depth + 1, lines);
                }
            }
            _ => {}
        }
    }

    lines.push(format!("{indent}</{name}>"));
}

/// Cosmetic tag coloring over already-escaped diff lines.
fn highlight_markup(line: &str) -> String {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    static COMMENT_RE: OnceLock<Regex> = OnceLock::new();
    let tag_re = TAG_RE.get_or_init(|| Regex::new(r"(&lt;)(/?\w+)(.*?)(&gt;)").unwrap());
    let comment_re = COMMENT_RE.get_or_init(|| Regex::new(r"(?s)(&lt;!--.*?--&gt;)").unwrap());

    let escaped = escape_html(line);
    let highlighted = tag_re.replace_all(&escaped, |caps: &regex::Captures| {
        format!(
            "<span style=\"color: #9cdcfe\">{}</span><span style=\"color: #4ec9b0\">{}</span><span style=\"color: #d4d4d4\">{}</span><span style=\"color: #9cdcfe\">{}</span>",
            &caps[1], &caps[2], &caps[3], &caps[4]
        )
    });
    comment_re
        .replace_all(&highlighted, "<span style=\"color: #6a9955\">$1</span>")
        .into_owned()
}

fn unchanged_line(line_num: usize, line: &str) -> String {
    format!(
        "<div style='display: flex;'><span style='min-width: 50px; padding: 0 12px; text-align: right; color: #6e7681; background: #252526; user-select: none;'>{}</span><span style='flex: 1; padding: 0 12px; white-space: pre-wrap; word-break: break-all;'>{}</span></div>",
        line_num,
        highlight_markup(line)
    )
}

fn removed_line(line: &str) -> String {
    format!(
        "<div style='display: flex; background: rgba(248, 81, 73, 0.15);'><span style='min-width: 50px; padding: 0 12px; text-align: right; color: #6e7681; background: #252526;'>-</span><span style='flex: 1; padding: 0 12px; white-space: pre-wrap; word-break: break-all; color: #ffa198;'>{}</span></div>",
        highlight_markup(line)
    )
}

fn added_line(line: &str) -> String {
    format!(
        "<div style='display: flex; background: rgba(46, 160, 67, 0.15);'><span style='min-width: 50px; padding: 0 12px; text-align: right; color: #6e7681; background: #252526;'>+</span><span style='flex: 1; padding: 0 12px; white-space: pre-wrap; word-break: break-all; color: #7ee787;'>{}</span></div>",
        highlight_markup(line)
    )
}

/// Line-aligned diff of the pretty-printed bodies: line numbers on
/// unchanged lines, +/- markers on changed ones.
pub fn generate_code_diff(old_content: &str, new_content: &str) -> String {
    let old_pretty = prettify_body(old_content);
    let new_pretty = prettify_body(new_content);

    let old_lines: Vec<&str> = old_pretty.lines().collect();
    let new_lines: Vec<&str> = new_pretty.lines().collect();

    let matcher = SequenceMatcher::new(&old_lines, &new_lines);

    let mut parts = vec![
        "<div style='background: #1e1e1e; color: #d4d4d4; font-family: Consolas, Monaco, monospace; font-size: 14px; line-height: 1.5; padding: 16px; margin: 0;'>".to_string(),
    ];

    let mut line_num = 1;
    for op in matcher.opcodes() {
        match op.tag {
            Tag::Equal => {
                for line in &old_lines[op.old_start..op.old_end] {
                    parts.push(unchanged_line(line_num, line));
                    line_num += 1;
                }
            }
            Tag::Replace => {
                for line in &old_lines[op.old_start..op.old_end] {
                    parts.push(removed_line(line));
                }
                for line in &new_lines[op.new_start..op.new_end] {
                    parts.push(added_line(line));
                }
            }
            Tag::Delete => {
                for line in &old_lines[op.old_start..op.old_end] {
                    parts.push(removed_line(line));
                }
            }
            Tag::Insert => {
                for line in &new_lines[op.new_start..op.new_end] {
                    parts.push(added_line(line));
                }
            }
        }
    }

    parts.push("</div>".to_string());
    parts.concat()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prettify_indents_nested_markup() {
        let pretty = prettify_body("<html><body><div><p>hi</p></div></body></html>");
        let lines: Vec<&str> = pretty.lines().collect();
        assert_eq!(lines[0], "<body>");
        assert_eq!(lines[1], " <div>");
        assert_eq!(lines[2], "  <p>");
        assert_eq!(lines[3], "   hi");
        assert_eq!(lines[4], "  </p>");
        assert_eq!(lines[5], " </div>");
        assert_eq!(lines.last().unwrap(), &"</body>");
    }

    #[test]
    fn prettify_wraps_bare_content() {
        // The parser synthesizes a body around bare fragments.
        let pretty = prettify_body("<p>loose</p>");
        assert!(pretty.starts_with("<body>"));
        assert!(pretty.ends_with("</body>"));
        assert!(pretty.contains("loose"));
    }

    #[test]
    fn diff_marks_changed_markup() {
        let old = "<html><body><p>Price: $10</p></body></html>";
        let new = "<html><body><p>Price: $15</p></body></html>";
        let diff = generate_code_diff(old, new);
        assert!(diff.contains("Price: $10"));
        assert!(diff.contains("Price: $15"));
        assert!(diff.contains(">-</span>"));
        assert!(diff.contains(">+</span>"));
    }

    #[test]
    fn unchanged_lines_are_numbered() {
        let html = "<html><body><p>same</p></body></html>";
        let diff = generate_code_diff(html, html);
        assert!(diff.contains(">1</span>"));
        assert!(!diff.contains(">-</span>"));
    }

    #[test]
    fn highlights_tags() {
        let diff = generate_code_diff(
            "<html><body><p>x</p></body></html>",
            "<html><body><p>x</p></body></html>",
        );
        assert!(diff.contains("color: #4ec9b0"));
    }
}
