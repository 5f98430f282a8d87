//! Path helpers shared by the file system collaborator and the services.
//!
//! Note identities are file paths, so every path that becomes an `id` goes
//! through these helpers first. All paths are kept in forward-slash form.

/// Convert backslashes to forward slashes.
///
/// A bare drive root such as `C:/` loses its trailing separator (`C:`), so
/// that joining segments onto it never produces a double slash.
///
/// ```
/// use mdsilo_core::fs::path::normalize_slash;
///
/// assert_eq!(normalize_slash("C:\\Files\\mdsilo\\app.msi"), "C:/Files/mdsilo/app.msi");
/// assert_eq!(normalize_slash("C:/"), "C:");
/// ```
pub fn normalize_slash(path: &str) -> String {
    let normalized = path.replace('\\', "/");
    if is_drive_root(&normalized) {
        return normalized[..2].to_string();
    }
    normalized
}

fn is_drive_root(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() == 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'/'
}

/// Strip every leading and trailing `/` or `\` character.
pub fn trim_slash_all(path: &str) -> String {
    path.trim_matches(|c| c == '/' || c == '\\').to_string()
}

/// Join `segments` onto `base`.
///
/// The base keeps its leading separator (so absolute paths stay absolute) but
/// loses any trailing one; every segment is trimmed of separators on both
/// sides and empty segments are skipped.
///
/// ```
/// use mdsilo_core::fs::path::join_path;
///
/// assert_eq!(join_path("/", &["md", "/silo/"]), "/md/silo");
/// assert_eq!(join_path("notes", &["daily", "2024-01-01.md"]), "notes/daily/2024-01-01.md");
/// ```
pub fn join_path(base: &str, segments: &[&str]) -> String {
    let base = normalize_slash(base);
    let mut joined = base.trim_end_matches('/').to_string();
    let absolute = base.starts_with('/');

    for segment in segments {
        let segment = trim_slash_all(&normalize_slash(segment));
        if segment.is_empty() {
            continue;
        }
        if !joined.is_empty() || absolute {
            joined.push('/');
        }
        joined.push_str(&segment);
    }

    if joined.is_empty() && absolute {
        return "/".to_string();
    }
    joined
}

/// Parent directory of `path`.
///
/// Returns `/` for entries directly under the file system root and an empty
/// string for a bare file name.
pub fn dir_path(path: &str) -> String {
    let path = normalize_slash(path);
    let path = path.trim_end_matches('/');
    match path.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
        None => String::new(),
    }
}

/// Final component of `path`.
pub fn file_name(path: &str) -> String {
    let path = normalize_slash(path);
    let path = path.trim_end_matches('/');
    match path.rfind('/') {
        Some(idx) => path[idx + 1..].to_string(),
        None => path.to_string(),
    }
}

/// Normalized directory path without a trailing separator (except for `/`).
pub fn normalize_dir(path: &str) -> String {
    let normalized = normalize_slash(path);
    if normalized.len() > 1 {
        normalized.trim_end_matches('/').to_string()
    } else {
        normalized
    }
}

/// Case-insensitive path comparison, used to detect renames that only change
/// letter case (same file on case-insensitive volumes).
pub fn same_path_ci(a: &str, b: &str) -> bool {
    normalize_slash(a).to_lowercase() == normalize_slash(b).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_slash() {
        assert_eq!(normalize_slash("C:/"), "C:");
        assert_eq!(
            normalize_slash("C:\\Files\\mdsilo\\app.msi"),
            "C:/Files/mdsilo/app.msi"
        );
        assert_eq!(normalize_slash("/home/me/notes"), "/home/me/notes");
        assert_eq!(normalize_slash("C:/notes/"), "C:/notes/");
    }

    #[test]
    fn test_trim_slash_all() {
        assert_eq!(trim_slash_all("/\\md/silo\\"), "md/silo");
        assert_eq!(trim_slash_all("///"), "");
        assert_eq!(trim_slash_all("md"), "md");
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/", &["md", "/silo/"]), "/md/silo");
        assert_eq!(join_path("/notes/", &["a.md"]), "/notes/a.md");
        assert_eq!(join_path("C:\\", &["notes", "a.md"]), "C:/notes/a.md");
        assert_eq!(join_path("/notes", &["", "/", "a.md"]), "/notes/a.md");
        assert_eq!(join_path("/", &[]), "/");
        assert_eq!(join_path("", &["a", "b"]), "a/b");
    }

    #[test]
    fn test_dir_path_and_file_name() {
        assert_eq!(dir_path("/notes/daily/a.md"), "/notes/daily");
        assert_eq!(dir_path("/a.md"), "/");
        assert_eq!(dir_path("a.md"), "");
        assert_eq!(dir_path("C:\\notes\\a.md"), "C:/notes");
        assert_eq!(file_name("/notes/daily/a.md"), "a.md");
        assert_eq!(file_name("a.md"), "a.md");
    }

    #[test]
    fn test_same_path_ci() {
        assert!(same_path_ci("/notes/Draft.md", "/notes/draft.md"));
        assert!(same_path_ci("C:\\n\\A.md", "c:/n/a.md"));
        assert!(!same_path_ci("/notes/a.md", "/notes/b.md"));
    }
}
