//! Note link parsing and rewriting
//!
//! Two link forms reference another note by title:
//!
//! - Wiki links: `[[Title]]`, `[[Title#Heading]]`, `[[Title|Alias]]`
//! - Markdown links whose href is a title with whitespace encoded as `_`:
//!   `[label](Some_Title)`
//!
//! Images (`![alt](src)`) and links whose href is a URL are never treated as
//! note references. Lines inside fenced code blocks are skipped by both the
//! extractor and the rewriter so the two always agree on what a reference is.
//!
//! Title matching is case-insensitive and always compares the whole link
//! target, never a substring: renaming `Old` leaves `[[Older]]` untouched.

use crate::utils::text::{ci_string_equal, is_url};
use regex::{Captures, Regex};
use std::sync::LazyLock;

/// `[[target#anchor|alias]]`
static WIKI_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\[([^\[\]|#\n]+)(#[^\[\]|\n]*)?(\|[^\[\]\n]*)?\]\]").unwrap()
});

/// `[label](href)`, with an optional leading `!` captured so images can be skipped
static MARKDOWN_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(!?)\[([^\]\n]*)\]\(([^)\s]+)\)").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Wiki,
    Markdown,
}

/// A reference to another note found in a note's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRef {
    /// Referenced title, decoded and trimmed
    pub title: String,
    pub kind: LinkKind,
    /// Zero-based line index within the content
    pub line: usize,
    /// Character column of the link start within the line
    pub column: usize,
    /// Full text of the line holding the link
    pub line_text: String,
}

/// Href form of a title: trimmed, whitespace runs replaced by `_`.
pub fn title_to_href(title: &str) -> String {
    title
        .trim()
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

/// Title form of an href: `_` replaced by spaces, trimmed.
pub fn href_to_title(href: &str) -> String {
    href.replace('_', " ").trim().to_string()
}

fn is_fence(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

/// Extract every note reference in `content`, in document order.
pub fn extract_links(content: &str) -> Vec<LinkRef> {
    let mut links = Vec::new();
    let mut in_fence = false;

    for (line_idx, line) in content.lines().enumerate() {
        if is_fence(line) {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }

        let mut found: Vec<(usize, String, LinkKind)> = Vec::new();

        for cap in WIKI_LINK_RE.captures_iter(line) {
            if let (Some(whole), Some(target)) = (cap.get(0), cap.get(1)) {
                let title = target.as_str().trim();
                if !title.is_empty() {
                    found.push((whole.start(), title.to_string(), LinkKind::Wiki));
                }
            }
        }

        for cap in MARKDOWN_LINK_RE.captures_iter(line) {
            let (Some(whole), Some(href)) = (cap.get(0), cap.get(3)) else {
                continue;
            };
            if &cap[1] == "!" || is_url(href.as_str()) {
                continue;
            }
            let title = href_to_title(href.as_str());
            if !title.is_empty() {
                found.push((whole.start(), title, LinkKind::Markdown));
            }
        }

        found.sort_by_key(|(start, _, _)| *start);
        for (start, title, kind) in found {
            links.push(LinkRef {
                title,
                kind,
                line: line_idx,
                column: line[..start].chars().count(),
                line_text: line.to_string(),
            });
        }
    }

    links
}

/// Rewrite every reference to `old_title` so it points at `new_title`.
///
/// Wiki links keep their anchor and alias; markdown links get the new href,
/// and a label equal to the old title is replaced as well. Returns `None`
/// when nothing references `old_title`, so callers can skip persisting.
///
/// Applying the same rewrite twice yields the same content as applying it
/// once.
pub fn rewrite_links(content: &str, old_title: &str, new_title: &str) -> Option<String> {
    let old_title = old_title.trim();
    let new_title = new_title.trim();
    if old_title.is_empty() || new_title.is_empty() {
        return None;
    }

    let new_href = title_to_href(new_title);
    let mut output = String::with_capacity(content.len());
    let mut in_fence = false;
    let mut changed = false;

    for line in content.split_inclusive('\n') {
        if is_fence(line) {
            in_fence = !in_fence;
            output.push_str(line);
            continue;
        }
        if in_fence {
            output.push_str(line);
            continue;
        }

        let rewritten = WIKI_LINK_RE.replace_all(line, |cap: &Captures| {
            if ci_string_equal(cap[1].trim(), old_title) {
                format!(
                    "[[{}{}{}]]",
                    new_title,
                    cap.get(2).map_or("", |m| m.as_str()),
                    cap.get(3).map_or("", |m| m.as_str())
                )
            } else {
                cap[0].to_string()
            }
        });

        let rewritten = MARKDOWN_LINK_RE.replace_all(&rewritten, |cap: &Captures| {
            let href = &cap[3];
            if &cap[1] == "!" || is_url(href) || !ci_string_equal(&href_to_title(href), old_title)
            {
                return cap[0].to_string();
            }
            let label = if ci_string_equal(cap[2].trim(), old_title) {
                new_title
            } else {
                &cap[2]
            };
            format!("[{}]({})", label, new_href)
        });

        if rewritten != line {
            changed = true;
        }
        output.push_str(&rewritten);
    }

    changed.then_some(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_wiki_links() {
        let links = extract_links("See [[Foo]] and [[Bar#Intro]] or [[Baz|the baz]].");
        let titles: Vec<_> = links.iter().map(|l| l.title.as_str()).collect();
        assert_eq!(titles, vec!["Foo", "Bar", "Baz"]);
        assert!(links.iter().all(|l| l.kind == LinkKind::Wiki));
        assert_eq!(links[0].column, 4);
    }

    #[test]
    fn test_extract_markdown_links() {
        let links = extract_links(
            "A [note](Project_Plan) and ![img](pic.png) and [site](https://mdsilo.com)",
        );
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].title, "Project Plan");
        assert_eq!(links[0].kind, LinkKind::Markdown);
    }

    #[test]
    fn test_extract_tracks_lines_and_skips_code_fences() {
        let content = "intro\n```\n[[Hidden]]\n```\nthen [[Shown]]\n";
        let links = extract_links(content);
        assert_eq!(links.len(), 1);
        assert_eq!(links[0].title, "Shown");
        assert_eq!(links[0].line, 4);
        assert_eq!(links[0].line_text, "then [[Shown]]");
    }

    #[test]
    fn test_rewrite_exact_token_only() {
        let content = "[[Old]] [[Older]] [[old|alias]] [[Old#Part]]";
        let rewritten = rewrite_links(content, "Old", "New").unwrap();
        assert_eq!(rewritten, "[[New]] [[Older]] [[New|alias]] [[New#Part]]");
    }

    #[test]
    fn test_rewrite_markdown_links() {
        let content = "[Old Title](Old_Title) and [see here](old_title) and [x](Old_Titles)";
        let rewritten = rewrite_links(content, "Old Title", "New Title").unwrap();
        assert_eq!(
            rewritten,
            "[New Title](New_Title) and [see here](New_Title) and [x](Old_Titles)"
        );
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let content = "line one [[Old]]\n```\n[[Old]]\n```\n[Old](Old)\n";
        let once = rewrite_links(content, "Old", "New").unwrap();
        let twice = rewrite_links(&once, "Old", "New").unwrap_or_else(|| once.clone());
        assert_eq!(once, twice);
        assert_eq!(once, "line one [[New]]\n```\n[[Old]]\n```\n[New](New)\n");
    }

    #[test]
    fn test_rewrite_case_only_change_is_stable() {
        let once = rewrite_links("[[draft]]", "Draft", "DRAFT").unwrap();
        assert_eq!(once, "[[DRAFT]]");
        let twice = rewrite_links(&once, "Draft", "DRAFT").unwrap_or_else(|| once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_rewrite_without_reference_returns_none() {
        assert!(rewrite_links("nothing here [[Other]]", "Old", "New").is_none());
        assert!(rewrite_links("[[Old]]", "Old", "   ").is_none());
    }

    #[test]
    fn test_href_round_trip() {
        assert_eq!(title_to_href(" My  Note "), "My__Note");
        assert_eq!(href_to_title("My_Note"), "My Note");
    }
}
