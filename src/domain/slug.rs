//! Hashtag ("slug") normalization for projects.

/// Lowercases, replaces runs of separators and URL-hostile characters with a
/// single `_`, and drops leading/trailing separators (so `#tag` is `tag`).
/// Idempotent.
pub fn normalize_project_slug(slug: &str) -> String {
    let lowered = slug.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut pending_sep = false;
    for c in lowered.chars() {
        if is_separator(c) {
            pending_sep = true;
            continue;
        }
        if pending_sep && !out.is_empty() {
            out.push('_');
        }
        pending_sep = false;
        out.push(c);
    }
    out
}

fn is_separator(c: char) -> bool {
    c.is_whitespace()
        || c.is_control()
        || matches!(
            c,
            '_' | '#' | '%' | '&' | '?' | '/' | '\\' | '"' | '\'' | '<' | '>' | ',' | ';' | ':'
        )
}

/// A slug is usable if it still contains a letter or number once normalized.
pub fn is_valid_project_slug(slug: &str) -> bool {
    normalize_project_slug(slug)
        .chars()
        .any(char::is_alphanumeric)
}

/// Normalizes every slug and drops duplicates, keeping first-seen order.
pub fn normalize_slugs<'a>(slugs: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for slug in slugs {
        let normal = normalize_project_slug(slug);
        if !out.contains(&normal) {
            out.push(normal);
        }
    }
    out
}
