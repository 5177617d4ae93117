// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Slash-delimited path helpers used for namespace routing
//!
//! Paths arrive from the dispatch library as absolute strings. Empty
//! segments (doubled or trailing separators) are ignored everywhere, so
//! `/alice/` and `/alice` classify the same way.

pub const SEPARATOR: char = '/';

/// Non-empty segments of `path`, in order.
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(SEPARATOR).filter(|s| !s.is_empty())
}

/// True iff `path` is exactly the separator.
pub fn is_root(path: &str) -> bool {
    path.len() == 1 && path.starts_with(SEPARATOR)
}

/// True iff exactly one non-empty segment remains after splitting.
pub fn is_first_level(path: &str) -> bool {
    let mut iter = segments(path);
    iter.next().is_some() && iter.next().is_none()
}

pub fn is_root_or_first_level(path: &str) -> bool {
    is_root(path) || is_first_level(path)
}

/// Leading segment of `path`; in multi-user mode this is the identifier.
pub fn first_segment(path: &str) -> Option<&str> {
    segments(path).next()
}

/// Remainder of `path` after its leading segment, re-rooted at `/`.
///
/// Stripping a single-segment path yields `/`.
pub fn strip_first_segment(path: &str) -> String {
    let rest: Vec<&str> = segments(path).skip(1).collect();
    format!("{}{}", SEPARATOR, rest.join("/"))
}

/// Join an absolute base with further segments, collapsing empty segments.
pub fn join(base: &str, rest: &str) -> String {
    let joined: Vec<&str> = segments(base).chain(segments(rest)).collect();
    format!("{}{}", SEPARATOR, joined.join("/"))
}

/// Final segment of `path`, or `None` for the root.
pub fn file_name(path: &str) -> Option<&str> {
    segments(path).last()
}

/// Parent of `path`; the parent of a first-level path is `/`.
pub fn parent(path: &str) -> String {
    let all: Vec<&str> = segments(path).collect();
    match all.split_last() {
        Some((_, init)) => format!("{}{}", SEPARATOR, init.join("/")),
        None => SEPARATOR.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_level_classification() {
        let cases = [
            ("/foo/bar/baz.txt", false),
            ("/foo/bar.txt", false),
            ("/foo", true),
            ("/foo/", true),
            ("/", false),
            ("", false),
            ("//foo//", true),
        ];
        for (path, expected) in cases {
            assert_eq!(is_first_level(path), expected, "path {path:?}");
        }
    }

    #[test]
    fn root_is_exactly_the_separator() {
        assert!(is_root("/"));
        assert!(!is_root("//"));
        assert!(!is_root(""));
        assert!(!is_root("/a"));
    }

    #[test]
    fn first_segment_is_identifier() {
        assert_eq!(first_segment("/alice/docs/a.txt"), Some("alice"));
        assert_eq!(first_segment("alice"), Some("alice"));
        assert_eq!(first_segment("/"), None);
    }

    #[test]
    fn strip_first_segment_rebases_remainder() {
        assert_eq!(strip_first_segment("/alice/docs/a.txt"), "/docs/a.txt");
        assert_eq!(strip_first_segment("/alice"), "/");
        assert_eq!(strip_first_segment("/alice/"), "/");
        assert_eq!(strip_first_segment("/alice//docs/"), "/docs");
    }

    #[test]
    fn strip_reconstructs_remainder_for_any_identifier() {
        let remainders = ["/", "/a", "/a/b", "/deep/er/still/file.bin"];
        for id in ["alice", "bob", "x"] {
            for rest in remainders {
                let full = join(&format!("/{id}"), rest);
                assert_eq!(first_segment(&full), Some(id));
                assert_eq!(strip_first_segment(&full), rest);
            }
        }
    }

    #[test]
    fn join_parent_and_file_name() {
        assert_eq!(join("/alice/files", "/docs/a.txt"), "/alice/files/docs/a.txt");
        assert_eq!(join("/alice/files", "/"), "/alice/files");
        assert_eq!(parent("/docs/a.txt"), "/docs");
        assert_eq!(parent("/a.txt"), "/");
        assert_eq!(parent("/"), "/");
        assert_eq!(file_name("/docs/a.txt"), Some("a.txt"));
        assert_eq!(file_name("/"), None);
    }
}
