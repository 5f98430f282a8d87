//! String helpers for titles, excerpts and link targets.

use regex::Regex;
use std::cmp::Ordering;
use std::sync::LazyLock;

/// Titles that look like a calendar date (`YYYY-M-D`) mark daily notes.
static DAILY_TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{1,2}-\d{1,2}$").unwrap());

/// Absolute URLs (any scheme) plus the common scheme-less `www.` form.
static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?i)([a-z][a-z0-9+.\-]*://|mailto:|www\.)\S+$").unwrap()
});

/// Case-insensitive equality used for every title comparison.
pub fn ci_string_equal(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

/// Case-insensitive ordering with a case-sensitive tie-break, so sorting is
/// stable for titles that differ only by case.
pub fn ci_string_compare(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

pub fn is_url(text: &str) -> bool {
    URL_RE.is_match(text.trim())
}

pub fn is_daily_title(title: &str) -> bool {
    DAILY_TITLE_RE.is_match(title.trim())
}

/// Build an excerpt of `text` around the first case-sensitive occurrence of
/// `target`, with the target wrapped in `==` markers.
///
/// The window holds at most `max_len` characters besides the markers. Context
/// is split evenly before and after the target; when one side runs out of
/// text the other side receives the remainder. Text that already fits is
/// returned whole with only the marker applied.
///
/// ```
/// use mdsilo_core::utils::shorten_string;
///
/// let text = "Lorem Ipsum is simply dummy text of the printing and typesetting industry.";
/// assert_eq!(
///     shorten_string(text, "dummy", 42),
///     "m Ipsum is simply ==dummy== text of the print"
/// );
/// ```
pub fn shorten_string(text: &str, target: &str, max_len: usize) -> String {
    if target.is_empty() {
        return text.chars().take(max_len).collect();
    }

    let marked = format!("=={}==", target);
    if text.chars().count() <= max_len {
        return text.replacen(target, &marked, 1);
    }

    let Some(byte_idx) = text.find(target) else {
        return text.chars().take(max_len).collect();
    };

    let chars: Vec<char> = text.chars().collect();
    let idx = text[..byte_idx].chars().count();
    let target_len = target.chars().count();
    let half = max_len.saturating_sub(target_len) / 2;

    let avail_before = idx;
    let avail_after = chars.len() - idx - target_len;
    let mut before = half.min(avail_before);
    let mut after = half.min(avail_after);
    if before < half {
        after = (after + half - before).min(avail_after);
    }
    if after < half {
        before = (before + half - after).min(avail_before);
    }

    let prefix: String = chars[idx - before..idx].iter().collect();
    let suffix: String = chars[idx + target_len..idx + target_len + after]
        .iter()
        .collect();
    format!("{}{}{}", prefix, marked, suffix)
}
