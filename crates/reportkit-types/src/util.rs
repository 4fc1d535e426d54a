use regex::Regex;
use std::sync::LazyLock;

static LEADING_JUNK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[\d_]+").unwrap());

/// Turn an attribute path into a column identifier.
///
/// `user.username` becomes `user_username`; leading digits and underscores are
/// stripped so the result is usable as an identifier. May return an empty
/// string, which callers must reject.
pub fn normalize_name(attr: &str) -> String {
    let replaced = attr.replace('.', "_");
    LEADING_JUNK.replace(&replaced, "").into_owned()
}

/// `date_joined` -> `Date Joined`
pub fn humanize(name: &str) -> String {
    name.split(|c: char| c == '_' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Upper-case the first character, leave the rest alone.
pub fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Last segment of a dotted or `__` separated path.
pub fn last_segment(path: &str) -> &str {
    let tail = path.rsplit("__").next().unwrap_or(path);
    tail.rsplit('.').next().unwrap_or(tail)
}
