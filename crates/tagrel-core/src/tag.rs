//! Tag normalization and compound tags.
//!
//! A compound tag is a space-joined conjunction of atomic tags ("object has
//! all of these"). Compound tags never take part in plain synonym/antonym
//! candidate generation.

/// Lower-case, trim, and collapse inner whitespace runs to a single space.
///
/// Returns `None` for tags that are empty after trimming.
pub fn normalize_tag(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    for part in raw.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.extend(part.chars().flat_map(char::to_lowercase));
    }
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

pub fn is_compound(tag: &str) -> bool {
    tag.contains(' ')
}

/// Atomic parts of a (possibly compound) tag.
pub fn compound_parts(tag: &str) -> impl Iterator<Item = &str> {
    tag.split_whitespace()
}

/// `"<context> <tag>"`: `tag` restricted to objects that also carry `context`.
pub fn compound_tag(context: &str, tag: &str) -> String {
    format!("{context} {tag}")
}
