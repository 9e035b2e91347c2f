//! Remote path utilities
//!
//! POSIX-like absolute paths with "/" as root. Empty segments are elided
//! and trailing slashes stripped, except for the root itself.

/// Join path segments into one absolute path.
///
/// Each segment may itself contain slashes; empty pieces vanish. Joining
/// nothing but empty segments yields the empty string.
pub fn join(segments: &[&str]) -> String {
    let parts: Vec<&str> = segments
        .iter()
        .flat_map(|seg| seg.split('/'))
        .filter(|p| !p.is_empty())
        .collect();
    if parts.is_empty() {
        return String::new();
    }
    format!("/{}", parts.join("/"))
}

/// Split a path into (directory, file name).
///
/// A trailing slash means the path names a directory, so the file part is
/// empty. `split("/") == ("/", "")`.
pub fn split(path: &str) -> (String, String) {
    if path == "/" {
        return ("/".to_string(), String::new());
    }
    match path.rfind('/') {
        Some(idx) => {
            let dir = &path[..idx];
            let file = &path[idx + 1..];
            let dir = if dir.is_empty() { "/" } else { dir };
            (dir.to_string(), file.to_string())
        }
        None => (String::new(), path.to_string()),
    }
}

/// Directory part of a path
pub fn dir(path: &str) -> String {
    split(path).0
}

/// File-name part of a path
pub fn base(path: &str) -> String {
    split(path).1
}

/// Path segments below the root, in order
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|p| !p.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_elides_and_normalizes() {
        assert_eq!(
            join(&["path1", "path2", "/path3", "path4/"]),
            "/path1/path2/path3/path4"
        );
        assert_eq!(join(&["/", "x", "", "/y/"]), "/x/y");
        assert_eq!(join(&["", ""]), "");
        assert_eq!(join(&["a//b", "c"]), "/a/b/c");
    }

    #[test]
    fn test_split() {
        assert_eq!(split("/"), ("/".to_string(), "".to_string()));
        assert_eq!(split("/dir/"), ("/dir".to_string(), "".to_string()));
        assert_eq!(split("/a/b"), ("/a".to_string(), "b".to_string()));
        assert_eq!(split("/f"), ("/".to_string(), "f".to_string()));
        assert_eq!(split("file"), ("".to_string(), "file".to_string()));
    }

    #[test]
    fn test_dir_and_base() {
        assert_eq!(dir("file"), "");
        assert_eq!(dir("/a/b/c"), "/a/b");
        assert_eq!(base("/a/b/c"), "c");
        assert_eq!(base("/dir/"), "");
    }

    #[test]
    fn test_segments() {
        assert_eq!(segments("/a/b/c"), vec!["a", "b", "c"]);
        assert!(segments("/").is_empty());
    }
}
