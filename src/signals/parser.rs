use regex::Regex;
use std::sync::LazyLock;

static INTEGER_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"-?\d+").unwrap());

// Bullets: "- item", "* item", "• item", "1. item", "2) item"
static LIST_ITEM_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*(?:[-*•]|\d{1,3}[.)])\s+(.+?)\s*$").unwrap());

/// Pull the contents of the last `<name>...</name>` section out of `raw`.
///
/// The last occurrence wins so that a model which restates the format before
/// answering still yields its actual answer. Returns an empty string when the
/// section is absent or empty.
pub fn extract_section(raw: &str, name: &str) -> String {
    let pattern = format!(r"(?s)<{0}>(.*?)</{0}>", regex::escape(name));
    let Ok(re) = Regex::new(&pattern) else {
        return String::new();
    };
    re.captures_iter(raw)
        .filter_map(|cap| cap.get(1))
        .last()
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

/// First signed integer appearing in `text`, if any. Out-of-range values
/// saturate at the `i64` bounds.
pub fn extract_first_integer(text: &str) -> Option<i64> {
    let digits = INTEGER_REGEX.find(text)?.as_str();
    match digits.parse::<i64>() {
        Ok(n) => Some(n),
        Err(_) if digits.starts_with('-') => Some(i64::MIN),
        Err(_) => Some(i64::MAX),
    }
}

/// Parse bulleted or numbered lines into items, keeping first-seen order and
/// dropping exact duplicates.
pub fn extract_list_items(text: &str) -> Vec<String> {
    let mut items: Vec<String> = Vec::new();
    for cap in LIST_ITEM_REGEX.captures_iter(text) {
        if let Some(m) = cap.get(1) {
            let item = m.as_str().trim();
            if !item.is_empty() && !items.iter().any(|existing| existing == item) {
                items.push(item.to_string());
            }
        }
    }
    items
}

/// True for replies that explicitly report nothing (`NONE`, `none.`, `N/A`).
pub fn is_none_marker(text: &str) -> bool {
    let normalized = text.trim().trim_end_matches('.').to_lowercase();
    matches!(normalized.as_str(), "" | "none" | "n/a" | "no gaps")
}
