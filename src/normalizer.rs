// Splits fetched HTML into the comparable units the diff engine works on.
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Block-ish elements whose text makes up the paragraph units.
const PARAGRAPH_SELECTOR: &str = "p, div, h1, h2, h3, h4, h5, h6, li, span";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub src: String,
    pub alt: String,
}

/// Normalized view of one capture. Parsing is lenient: malformed markup
/// degrades to whatever text is extractable, a fully unparseable input
/// yields empty segments.
#[derive(Debug, Clone, Default)]
pub struct PageSegments {
    /// Whole-document text, whitespace-collapsed. Fingerprint input and
    /// the fallback for documents without a body element.
    pub full_text: String,
    /// Body text, one line per text node, used for equality checks and
    /// line diffs. Falls back to `full_text` when there is no body.
    pub body_text: String,
    pub paragraphs: Vec<String>,
    pub images: Vec<ImageRef>,
}

pub fn segment(raw_html: &str, base_url: Option<&str>) -> PageSegments {
    let document = Html::parse_document(raw_html);

    let full_text = collapse_whitespace(
        &document
            .root_element()
            .text()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
    );

    let body = find_body(&document);
    let body_text = match body {
        Some(body) => text_lines(body),
        None => full_text.clone(),
    };

    let paragraphs = match body {
        Some(body) => {
            let selector = Selector::parse(PARAGRAPH_SELECTOR).unwrap();
            body.select(&selector)
                .filter_map(|el| {
                    let text = element_text(el);
                    if text.is_empty() { None } else { Some(text) }
                })
                .collect()
        }
        None => Vec::new(),
    };

    PageSegments {
        full_text,
        body_text,
        paragraphs,
        images: extract_images(&document, base_url),
    }
}

fn find_body(document: &Html) -> Option<ElementRef<'_>> {
    let selector = Selector::parse("body").ok()?;
    document.select(&selector).next()
}

/// Every image element carrying a `src` or `data-src`, in document order,
/// URLs resolved against the page address. Duplicates are preserved here;
/// diffing treats the inventory as a set by URL.
pub fn extract_images(document: &Html, base_url: Option<&str>) -> Vec<ImageRef> {
    let selector = match Selector::parse("img") {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };
    let base = base_url.and_then(|u| Url::parse(u).ok());

    document
        .select(&selector)
        .filter_map(|img| {
            let src = img
                .value()
                .attr("src")
                .or_else(|| img.value().attr("data-src"))?;
            let resolved = match &base {
                Some(base) => base
                    .join(src)
                    .map(|u| u.to_string())
                    .unwrap_or_else(|_| src.to_string()),
                None => src.to_string(),
            };
            Some(ImageRef {
                src: resolved,
                alt: img.value().attr("alt").unwrap_or("").to_string(),
            })
        })
        .collect()
}

/// One trimmed line per non-empty text node, analogous to extracting body
/// text with a newline separator.
fn text_lines(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(collapse_whitespace)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn element_text(element: ElementRef<'_>) -> String {
    collapse_whitespace(
        &element
            .text()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" "),
    )
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
