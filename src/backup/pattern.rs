//! Include/exclude filtering of paths relative to a backup item's source.
//!
//! A [`Pattern`] matches a relative path in two ways: as a glob over the whole
//! path (`*` and `?` never cross a separator), or as a directory prefix, so
//! `docs` also matches everything below `docs/`. The prefix is compared per
//! path segment: `docs` does not match `docs2/a`.

use derive_more::Display;
use globset::{Glob, GlobBuilder, GlobMatcher};
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use std::fmt::Formatter;
use std::path::Path;
use std::result;

#[derive(Clone, Debug, Display)]
#[display("{glob}")]
pub struct Pattern {
    glob: Glob,
    matcher: GlobMatcher,
}

impl Pattern {
    pub fn new(pattern: &str) -> result::Result<Self, globset::Error> {
        GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map(Self::from)
    }

    pub fn as_str(&self) -> &str {
        self.glob.glob()
    }

    pub fn matches<P: AsRef<Path>>(&self, relative_path: P) -> bool {
        let relative_path = relative_path.as_ref();
        self.matcher.is_match(relative_path) || self.is_parent_of(relative_path)
    }

    /// Literal prefix only: `Doc*` names no directory, so it never includes `Documents/a`.
    fn is_parent_of(&self, relative_path: &Path) -> bool {
        !self.as_str().is_empty()
            && relative_path
                .strip_prefix(self.as_str())
                .is_ok_and(|rest| !rest.as_os_str().is_empty())
    }
}

impl From<Glob> for Pattern {
    fn from(glob: Glob) -> Self {
        let matcher = glob.compile_matcher();
        Self { glob, matcher }
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.glob == other.glob
    }
}

impl Eq for Pattern {}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

struct PatternVisitor;

impl Visitor<'_> for PatternVisitor {
    type Value = Pattern;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a non-empty glob pattern")
    }

    fn visit_str<E>(self, v: &str) -> result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        if v.is_empty() {
            return Err(serde::de::Error::invalid_value(
                serde::de::Unexpected::Str(v),
                &self,
            ));
        }
        Pattern::new(v).map_err(serde::de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> result::Result<Self, D::Error> {
        deserializer.deserialize_str(PatternVisitor)
    }
}

/// Decides whether `relative_path` takes part in a copy.
///
/// With a non-empty `include`, the path must match one of its patterns.
/// A match in `exclude` always wins, even over a direct include match.
pub fn should_include<P: AsRef<Path>>(
    relative_path: P,
    include: &[Pattern],
    exclude: &[Pattern],
) -> bool {
    let relative_path = relative_path.as_ref();
    if !include.is_empty() && !include.iter().any(|p| p.matches(relative_path)) {
        return false;
    }
    !exclude.iter().any(|p| p.matches(relative_path))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(globs: &[&str]) -> Vec<Pattern> {
        globs.iter().map(|g| Pattern::new(g).unwrap()).collect()
    }

    #[test]
    fn test_pattern_deserialization() {
        let pattern: Pattern = serde_json::from_str("\"*.txt\"").unwrap();
        assert_eq!(pattern.to_string(), "*.txt");
        assert_eq!(pattern.as_str(), "*.txt");
        assert_eq!(serde_json::to_string(&pattern).unwrap(), "\"*.txt\"");
    }

    #[test]
    fn test_pattern_invalid() {
        let result = serde_json::from_str::<Pattern>("\"[invalid\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_pattern_rejected_in_config() {
        assert!(serde_json::from_str::<Pattern>("\"\"").is_err());
    }

    #[test]
    fn test_empty_pattern_matches_nothing() {
        let empty = patterns(&[""]);
        for path in ["a", "a/b.txt", "Documents/deep/c"] {
            assert!(!should_include(path, &empty, &[]), "{path}");
            assert!(should_include(path, &[], &empty), "{path}");
        }
    }

    #[test]
    fn test_wildcard_include_does_not_reach_descendants() {
        let include = patterns(&["Doc*"]);
        assert!(should_include("Documents", &include, &[]));
        assert!(!should_include("Documents/a.txt", &include, &[]));

        let include = patterns(&["Doc*", "Doc*/*"]);
        assert!(should_include("Documents/a.txt", &include, &[]));
        assert!(!should_include("Documents/sub/b.txt", &include, &[]));
    }

    #[test]
    fn test_empty_lists_include_everything() {
        for path in ["a", "a/b/c.txt", ".hidden", "with space/x", "Documents2"] {
            assert!(should_include(path, &[], &[]), "{path}");
        }
    }

    #[test]
    fn test_glob_matches_whole_path() {
        let include = patterns(&["*.pdf"]);
        assert!(should_include("a.pdf", &include, &[]));
        assert!(!should_include("dir/a.pdf", &include, &[]));
        assert!(!should_include("a.pdf.bak", &include, &[]));

        let include = patterns(&["file?.txt"]);
        assert!(should_include("file1.txt", &include, &[]));
        assert!(!should_include("file10.txt", &include, &[]));
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        let include = patterns(&["Documents"]);
        assert!(should_include("Documents", &include, &[]));
        assert!(!should_include("documents", &include, &[]));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        for glob in ["*.log", "notes", "a/b"] {
            let both = patterns(&[glob]);
            let path = match glob {
                "*.log" => "x.log",
                other => other,
            };
            assert!(should_include(path, &both, &[]));
            assert!(!should_include(path, &both, &both), "{glob}");
        }
    }

    #[test]
    fn test_descendants_of_included_directory() {
        let include = patterns(&["Documents"]);
        assert!(should_include("Documents", &include, &[]));
        assert!(should_include("Documents/a.txt", &include, &[]));
        assert!(should_include("Documents/deep/er/b.bin", &include, &[]));
        assert!(!should_include("Pictures/a.png", &include, &[]));
    }

    #[test]
    fn test_descendants_of_excluded_directory() {
        let include = patterns(&["Documents"]);
        let exclude = patterns(&["Documents/cache"]);
        assert!(should_include("Documents/a.txt", &include, &exclude));
        assert!(!should_include("Documents/cache", &include, &exclude));
        assert!(!should_include("Documents/cache/x/y.tmp", &include, &exclude));
    }

    #[test]
    fn test_prefix_respects_segment_boundary() {
        let include = patterns(&["Documents"]);
        assert!(!should_include("Documents2", &include, &[]));
        assert!(!should_include("Documents2/a.txt", &include, &[]));
        assert!(!should_include("DocumentsX/Documents/a.txt", &include, &[]));

        let exclude = patterns(&["tmp"]);
        assert!(should_include("tmpfiles/a", &[], &exclude));
        assert!(!should_include("tmp/a", &[], &exclude));
    }

    #[test]
    fn test_wildcard_directory_exclude() {
        let include = patterns(&["*.pdf"]);
        let exclude = patterns(&["temp*"]);
        assert!(should_include("a.pdf", &include, &exclude));
        assert!(!should_include("tempdir", &include, &exclude));
        assert!(!should_include("temp.pdf", &include, &exclude));
        assert!(!should_include("b.txt", &include, &exclude));
    }
}
