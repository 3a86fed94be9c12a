//! Delimiter-separated path values.
//!
//! A [`Path`] is an immutable sequence of non-empty segments parsed from a
//! string. The delimiter is configurable per filesystem; `"/"` is the
//! default.

use std::fmt;

/// Delimiter used when none is given.
pub const DEFAULT_PATH_DELIMITER: &str = "/";

/// Parsed path: ordered segments, a terminal filename, and a root flag.
///
/// Segments never contain the delimiter and are never empty. The filename
/// is the last segment, or `""` when the source string ends with the
/// delimiter or has no segments at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    segments: Vec<String>,
    filename: String,
    delimiter: String,
    is_root: bool,
}

impl Path {
    /// Parse `text` with the default delimiter.
    pub fn new(text: &str) -> Self {
        Self::with_delimiter(text, DEFAULT_PATH_DELIMITER)
    }

    /// Parse `text`, splitting on `delimiter` and dropping empty segments.
    pub fn with_delimiter(text: &str, delimiter: &str) -> Self {
        let segments: Vec<String> = text
            .split(delimiter)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let filename = if text.ends_with(delimiter) || segments.is_empty() {
            String::new()
        } else {
            segments[segments.len() - 1].clone()
        };

        Path {
            is_root: text.starts_with(delimiter),
            segments,
            filename,
            delimiter: delimiter.to_string(),
        }
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// True when the path has no segments.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// True when the source string began with the delimiter.
    pub fn is_root(&self) -> bool {
        self.is_root
    }

    /// The `i`-th segment.
    ///
    /// # Panics
    ///
    /// Panics when `i` is outside `[0, len)`. An out-of-range segment index
    /// is an internal invariant violation, not a reportable condition.
    pub fn segment(&self, i: usize) -> &str {
        match self.segments.get(i) {
            Some(segment) => segment,
            None => panic!(
                "segment index {} out of range for path of {} segments",
                i,
                self.segments.len()
            ),
        }
    }

    /// Terminal filename, `""` when the path names a directory.
    pub fn file_name(&self) -> &str {
        &self.filename
    }

    /// The delimiter this path was parsed with.
    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Forward-only iterator over the segments. A fresh iterator is needed
    /// to re-traverse.
    pub fn segments(&self) -> Segments<'_> {
        Segments {
            inner: self.segments.iter(),
        }
    }

    /// Join `other` onto `self`, producing a new path.
    ///
    /// When `other` is rooted, or `self` is exactly the delimiter, the two
    /// canonical strings are joined directly; otherwise a delimiter goes
    /// between them. Used to resolve a relative path against a working
    /// directory.
    pub fn concat(&self, other: &Path) -> Path {
        let text = if other.is_root || (self.is_root && self.segments.is_empty()) {
            format!("{}{}", self, other)
        } else {
            format!("{}{}{}", self, self.delimiter, other)
        };
        Path::with_delimiter(&text, &self.delimiter)
    }
}

impl fmt::Display for Path {
    /// Canonical form: leading delimiter iff rooted, no trailing delimiter.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root {
            if self.segments.is_empty() {
                return f.write_str(&self.delimiter);
            }
            f.write_str(&self.delimiter)?;
        }
        f.write_str(&self.segments.join(&self.delimiter))
    }
}

/// Iterator over a path's segments.
pub struct Segments<'a> {
    inner: std::slice::Iter<'a, String>,
}

impl<'a> Iterator for Segments<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        self.inner.next().map(String::as_str)
    }
}

// ============================================================================
// Tests
// ============================================================================
