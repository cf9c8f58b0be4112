//! Pulls a taxpayer id (ИНН, 10 or 12 digits) out of a free-text counterparty
//! name. Banks frequently glue the id onto the name field.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::norm_spaces;

static LABELED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bИНН\b[:\s]*(\d{12}|\d{10})").unwrap());
static LEADING_WITH_SEPARATOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(\d{12}|\d{10})\s*(?:[,;:\-–—]|\s)+\s*(.+)$").unwrap());
static LEADING_GLUED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"^\s*(\d{12}|\d{10})([\p{L}"«].+)$"#).unwrap());
static BARE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{12}|\d{10})\b").unwrap());
static LABEL_LEFTOVER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bИНН\b[:\s]*").unwrap());

const EDGE_PUNCTUATION: &[char] = &[' ', ',', ';', ':', '-', '–', '—'];

/// Split `raw` into `(clean_name, tax_id)`. The tax id is empty when none was found.
pub fn split_tax_id(raw: &str) -> (String, String) {
    let mut s = raw.trim().to_string();
    if s.is_empty() {
        return (String::new(), String::new());
    }

    let mut tax_id = String::new();

    if let Some(caps) = LABELED.captures(&s) {
        tax_id = caps[1].to_string();
        s = LABELED.replace_all(&s, " ").trim().to_string();
    }

    if tax_id.is_empty() {
        if let Some(caps) = LEADING_WITH_SEPARATOR.captures(&s) {
            tax_id = caps[1].to_string();
            s = caps[2].trim().to_string();
        }
    }

    if tax_id.is_empty() {
        if let Some(caps) = LEADING_GLUED.captures(&s) {
            tax_id = caps[1].to_string();
            s = caps[2].trim().to_string();
        }
    }

    if tax_id.is_empty() && s.chars().any(char::is_alphabetic) {
        if let Some(caps) = BARE.captures(&s) {
            tax_id = caps[1].to_string();
            if let Ok(token) = Regex::new(&format!(r"\b{}\b", regex::escape(&tax_id))) {
                s = token.replace_all(&s, " ").trim().to_string();
            }
        }
    }

    let s = LABEL_LEFTOVER.replace_all(&s, " ");
    let s = norm_spaces(&s);
    let s = s.trim_matches(EDGE_PUNCTUATION).to_string();

    (s, tax_id)
}

/// Split repeatedly until no further id comes out. The first id found is kept,
/// and the returned name is a fixed point: `clean_name(name)` yields it unchanged.
pub fn clean_name(raw: &str) -> (String, String) {
    let (mut name, tax_id) = split_tax_id(raw);
    if tax_id.is_empty() {
        return (name, tax_id);
    }
    loop {
        let (next, extra) = split_tax_id(&name);
        if next.is_empty() {
            break;
        }
        name = next;
        if extra.is_empty() {
            break;
        }
    }
    (name, tax_id)
}
