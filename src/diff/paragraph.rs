// Paragraph-level semantic diff rendered as a standalone document.
use crate::diff::image::diff_inventories;
use crate::diff::matcher::{SequenceMatcher, Tag};
use crate::diff::{escape_html, truncate_chars};
use scraper::{Html, Selector};

/// Equal runs are truncated to this many representative entries.
const EQUAL_PREVIEW: usize = 3;
/// Display cap per paragraph unit.
const UNIT_CHARS: usize = 200;

const STYLE: &str = "\
* { box-sizing: border-box; margin: 0; padding: 0; }
body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
       line-height: 1.7; padding: 20px; max-width: 900px; margin: 0 auto; background: #fafafa; color: #333; }
.diff-para { padding: 12px 16px; margin: 8px 0; border-radius: 8px; background: #fff;
             border: 1px solid #e5e7eb; }
.diff-added { background: #dcfce7; border-color: #86efac; }
.diff-removed { background: #fee2e2; border-color: #fca5a5; text-decoration: line-through; opacity: 0.7; }
.diff-img { max-width: 200px; max-height: 150px; border-radius: 8px; margin: 8px 4px; border: 2px solid #e5e7eb; }
.diff-img-added { border-color: #22c55e; }
.diff-img-removed { border-color: #ef4444; opacity: 0.6; }
.img-row { display: flex; flex-wrap: wrap; gap: 8px; margin-top: 8px; }
h1, h2, h3 { margin: 16px 0 8px; }";

/// Aligns the paragraph units of both captures and renders the result.
/// Requires both bodies to exist (None otherwise); with zero differences
/// the rendered shell is still returned.
pub fn generate_paragraph_diff(
    old_content: &str,
    new_content: &str,
    url: Option<&str>,
) -> Option<String> {
    let old_doc = Html::parse_document(old_content);
    let new_doc = Html::parse_document(new_content);

    let body_selector = Selector::parse("body").ok()?;
    old_doc.select(&body_selector).next()?;
    new_doc.select(&body_selector).next()?;

    let old_segments = crate::normalizer::segment(old_content, url);
    let new_segments = crate::normalizer::segment(new_content, url);

    let mut parts = vec![
        "<!DOCTYPE html>".to_string(),
        "<html><head>".to_string(),
        "<meta charset='utf-8'>".to_string(),
        "<meta name='viewport' content='width=device-width, initial-scale=1'>".to_string(),
        format!("<style>{STYLE}</style>"),
        "</head><body>".to_string(),
    ];

    // Image additions/removals lead the textual diff.
    if url.is_some() {
        let image_diff = diff_inventories(&old_segments.images, &new_segments.images);
        if !image_diff.added.is_empty() || !image_diff.removed.is_empty() {
            parts.push(
                "<div class='diff-para'><strong>Images Changed</strong><div class='img-row'>"
                    .to_string(),
            );
            for img in &image_diff.removed {
                parts.push(format!(
                    "<img class='diff-img diff-img-removed' src='{}' alt='{}' title='Removed'>",
                    img.src, img.alt
                ));
            }
            for img in &image_diff.added {
                parts.push(format!(
                    "<img class='diff-img diff-img-added' src='{}' alt='{}' title='Added'>",
                    img.src, img.alt
                ));
            }
            parts.push("</div></div>".to_string());
        }
    }

    let matcher = SequenceMatcher::new(&old_segments.paragraphs, &new_segments.paragraphs);
    for op in matcher.opcodes() {
        let old_run = &old_segments.paragraphs[op.old_start..op.old_end];
        let new_run = &new_segments.paragraphs[op.new_start..op.new_end];
        match op.tag {
            Tag::Equal => {
                for text in old_run.iter().take(EQUAL_PREVIEW) {
                    parts.push(format!(
                        "<div class='diff-para'>{}</div>",
                        escape_html(truncate_chars(text, UNIT_CHARS))
                    ));
                }
            }
            Tag::Replace => {
                push_removed(&mut parts, old_run);
                push_added(&mut parts, new_run);
            }
            Tag::Delete => push_removed(&mut parts, old_run),
            Tag::Insert => push_added(&mut parts, new_run),
        }
    }

    parts.push("</body></html>".to_string());
    Some(parts.concat())
}

fn push_removed(parts: &mut Vec<String>, run: &[String]) {
    for text in run {
        parts.push(format!(
            "<div class='diff-para diff-removed'>{}</div>",
            escape_html(truncate_chars(text, UNIT_CHARS))
        ));
    }
}

fn push_added(parts: &mut Vec<String>, run: &[String]) {
    for text in run {
        parts.push(format!(
            "<div class='diff-para diff-added'>{}</div>",
            escape_html(truncate_chars(text, UNIT_CHARS))
        ));
    }
}
