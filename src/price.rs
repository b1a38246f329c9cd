// Currency-token scanning over raw page content.
use crate::model::PriceInfo;
use regex::Regex;
use std::sync::OnceLock;

/// Only the leading prefix of the page is scanned; prices below the fold
/// rarely matter and the bound keeps the scan cheap on large captures.
const SCAN_LIMIT: usize = 10_000;

const CURRENCY_SYMBOLS: [&str; 4] = ["$", "€", "£", "₹"];
const CURRENCY_CODES: [&str; 6] = ["USD", "EUR", "GBP", "INR", "CAD", "AUD"];

/// Pattern order matters: matches are collected per pattern and the last
/// one found wins. This mirrors the "price block lists the current price
/// last" heuristic and is exactly that, a heuristic.
fn patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"\$\s?[\d,]+\.?\d*",
            r"USD\s?[\d,]+\.?\d*",
            r"€\s?[\d,]+\.?\d*",
            r"£\s?[\d,]+\.?\d*",
            r"₹\s?[\d,]+\.?\d*",
            r"[\d,]+\.?\d*\s?(?:USD|EUR|GBP|INR|CAD|AUD)",
            r#"data-price="(\d+)""#,
        ]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
    })
}

/// Scans raw content for currency-like tokens and returns the best guess
/// for the current price, or None when nothing matches. Never errors.
pub fn extract_price(content: &str) -> Option<PriceInfo> {
    let prefix: String = content.chars().take(SCAN_LIMIT).collect();

    let mut found: Vec<String> = Vec::new();
    for pattern in patterns() {
        for caps in pattern.captures_iter(&prefix) {
            // Patterns with a capture group yield the group, bare
            // patterns yield the whole match.
            let token = caps
                .get(1)
                .or_else(|| caps.get(0))
                .map(|m| m.as_str().to_string());
            if let Some(token) = token {
                found.push(token);
            }
        }
    }

    let token = found.pop()?;

    if !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()) {
        // Bare digit runs (e.g. from data-price) are treated as dollars.
        let amount = token.parse::<f64>().ok();
        return Some(PriceInfo {
            amount,
            currency: Some("$".to_string()),
            raw: None,
            text: format!("${token}"),
        });
    }

    match parse_token(&token) {
        Some((amount, currency)) => Some(PriceInfo {
            amount: Some(amount),
            currency: Some(currency),
            raw: None,
            text: token,
        }),
        None => Some(PriceInfo {
            amount: None,
            currency: None,
            raw: Some(token.clone()),
            text: token,
        }),
    }
}

/// Splits a matched token into numeric amount and currency marker.
fn parse_token(token: &str) -> Option<(f64, String)> {
    let trimmed = token.trim();

    let (number_part, currency) = if let Some(symbol) = CURRENCY_SYMBOLS
        .iter()
        .find(|s| trimmed.starts_with(**s))
    {
        (trimmed[symbol.len()..].trim(), symbol.to_string())
    } else if let Some(code) = CURRENCY_CODES.iter().find(|c| trimmed.starts_with(**c)) {
        (trimmed[code.len()..].trim(), code.to_string())
    } else if let Some(code) = CURRENCY_CODES.iter().find(|c| trimmed.ends_with(**c)) {
        (trimmed[..trimmed.len() - code.len()].trim(), code.to_string())
    } else {
        return None;
    };

    let amount = number_part.replace(',', "").parse::<f64>().ok()?;
    Some((amount, currency))
}
