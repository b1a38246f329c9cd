// Rendered body-text diff document, with stylesheet context pulled from
// the live page so the output roughly matches the site's look.
use crate::diff::escape_html;
use crate::diff::matcher::{SequenceMatcher, Tag};
use reqwest::Client;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::debug;
use url::Url;

const BASE_STYLE: &str = "\
* { box-sizing: border-box; }
body {
    font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
    line-height: 1.6;
    padding: 20px;
    max-width: 1200px;
    margin: 0 auto;
    background: #fff;
    color: #333;
}
.diff-added {
    background: #90EE90;
    color: #006400;
    padding: 2px 4px;
    border-radius: 2px;
}
.diff-removed {
    background: #FFB6C1;
    color: #8B0000;
    padding: 2px 4px;
    border-radius: 2px;
    text-decoration: line-through;
}
.diff-line, .diff-unchanged {
    padding: 4px 8px;
    margin: 2px 0;
    border-radius: 3px;
}
h1, h2, h3, h4, h5, h6 { margin-top: 1em; margin-bottom: 0.5em; }
p { margin: 0.5em 0; }
a { color: #0066cc; }
img { max-width: 100%; height: auto; }";

/// Full rendered diff of the body text of two captures. None when either
/// side is absent or the visible text did not change.
pub async fn compute_html_diff(
    client: &Client,
    old_content: Option<&str>,
    new_content: &str,
    url: Option<&str>,
) -> Option<String> {
    let old_content = old_content?;
    if new_content.is_empty() {
        return None;
    }

    let old_segments = crate::normalizer::segment(old_content, url);
    let new_segments = crate::normalizer::segment(new_content, url);

    if old_segments.body_text == new_segments.body_text {
        return None;
    }

    let css = match url {
        Some(url) => download_css(client, url).await,
        None => String::new(),
    };

    Some(render_text_diff(
        &old_segments.body_text,
        &new_segments.body_text,
        &css,
    ))
}

fn render_text_diff(old_text: &str, new_text: &str, css: &str) -> String {
    let old_lines: Vec<&str> = old_text.lines().filter(|l| !l.trim().is_empty()).collect();
    let new_lines: Vec<&str> = new_text.lines().filter(|l| !l.trim().is_empty()).collect();

    let matcher = SequenceMatcher::new(&old_lines, &new_lines);

    let mut parts = vec![
        "<!DOCTYPE html>".to_string(),
        "<html><head>".to_string(),
        "<meta charset='utf-8'>".to_string(),
        "<meta name='viewport' content='width=device-width, initial-scale=1'>".to_string(),
        format!("<style>{BASE_STYLE}\n{css}</style>"),
        "</head><body>".to_string(),
    ];

    for op in matcher.opcodes() {
        match op.tag {
            Tag::Equal => {
                for line in &old_lines[op.old_start..op.old_end] {
                    parts.push(format!("<div class='diff-line'>{}</div>", escape_html(line)));
                }
            }
            Tag::Replace => {
                for line in &old_lines[op.old_start..op.old_end] {
                    parts.push(format!(
                        "<div class='diff-removed'>{}</div>",
                        escape_html(line)
                    ));
                }
                for line in &new_lines[op.new_start..op.new_end] {
                    parts.push(format!("<div class='diff-added'>{}</div>", escape_html(line)));
                }
            }
            Tag::Delete => {
                for line in &old_lines[op.old_start..op.old_end] {
                    parts.push(format!(
                        "<div class='diff-removed'>{}</div>",
                        escape_html(line)
                    ));
                }
            }
            Tag::Insert => {
                for line in &new_lines[op.new_start..op.new_end] {
                    parts.push(format!("<div class='diff-added'>{}</div>", escape_html(line)));
                }
            }
        }
    }

    parts.push("</body></html>".to_string());
    parts.concat()
}

/// Fetches the page's stylesheets for presentation context. Best effort:
/// any failure degrades to no extra CSS.
pub async fn download_css(client: &Client, url: &str) -> String {
    let page = match client
        .get(url)
        .timeout(Duration::from_secs(10))
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => match resp.text().await {
            Ok(text) => text,
            Err(_) => return String::new(),
        },
        Ok(resp) => {
            debug!("css fetch for {url} returned {}", resp.status());
            return String::new();
        }
        Err(e) => {
            debug!("css fetch for {url} failed: {e}");
            return String::new();
        }
    };

    let hrefs = stylesheet_hrefs(&page, url);

    let mut all_css = Vec::new();
    for href in hrefs {
        if let Ok(resp) = client
            .get(&href)
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            if resp.status().is_success() {
                if let Ok(body) = resp.text().await {
                    all_css.push(body);
                }
            }
        }
    }
    all_css.join("\n")
}

// Sync helper: the parsed document must not live across an await point.
fn stylesheet_hrefs(page: &str, base_url: &str) -> Vec<String> {
    let document = Html::parse_document(page);
    let selector = match Selector::parse(r#"link[rel="stylesheet"]"#) {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };
    let base = Url::parse(base_url).ok();

    document
        .select(&selector)
        .filter_map(|link| link.value().attr("href"))
        .filter_map(|href| match &base {
            Some(base) => base.join(href).map(|u| u.to_string()).ok(),
            None => Some(href.to_string()),
        })
        .collect()
}
