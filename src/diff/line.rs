// Unified line diff between consecutive captures.
use crate::diff::matcher::{SequenceMatcher, Tag};

const CONTEXT: usize = 3;
const FROM_LABEL: &str = "previous";
const TO_LABEL: &str = "current";

/// Unified diff with 3 lines of context, labelled previous/current.
/// None when there is no prior content or nothing changed (absent, not
/// empty).
pub fn compute_diff(old_content: Option<&str>, new_content: &str) -> Option<String> {
    let old_content = old_content?;

    let old_lines: Vec<&str> = old_content.lines().collect();
    let new_lines: Vec<&str> = new_content.lines().collect();

    let matcher = SequenceMatcher::new(&old_lines, &new_lines);
    let groups = matcher.grouped_opcodes(CONTEXT);
    if groups.is_empty() {
        return None;
    }

    let mut out = Vec::new();
    out.push(format!("--- {FROM_LABEL}"));
    out.push(format!("+++ {TO_LABEL}"));

    for group in groups {
        let first = group.first()?;
        let last = group.last()?;
        out.push(format!(
            "@@ -{} +{} @@",
            format_range(first.old_start, last.old_end),
            format_range(first.new_start, last.new_end),
        ));
        for op in &group {
            match op.tag {
                Tag::Equal => {
                    for line in &old_lines[op.old_start..op.old_end] {
                        out.push(format!(" {line}"));
                    }
                }
                Tag::Replace => {
                    for line in &old_lines[op.old_start..op.old_end] {
                        out.push(format!("-{line}"));
                    }
                    for line in &new_lines[op.new_start..op.new_end] {
                        out.push(format!("+{line}"));
                    }
                }
                Tag::Delete => {
                    for line in &old_lines[op.old_start..op.old_end] {
                        out.push(format!("-{line}"));
                    }
                }
                Tag::Insert => {
                    for line in &new_lines[op.new_start..op.new_end] {
                        out.push(format!("+{line}"));
                    }
                }
            }
        }
    }

    Some(out.join("\n"))
}

/// Unified-diff range: 1-based start plus length, length elided when 1.
fn format_range(start: usize, end: usize) -> String {
    let length = end - start;
    if length == 1 {
        format!("{}", start + 1)
    } else if length == 0 {
        format!("{start},0")
    } else {
        format!("{},{}", start + 1, length)
    }
}
