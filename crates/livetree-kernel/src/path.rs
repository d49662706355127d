//! Tree paths used to correlate nodes across trees
//!
//! A [`TreePath`] is derived purely from position: the ids of every node
//! from the root down to the node itself. Two trees built from similar
//! configuration therefore assign the same path to "the same" node, which is
//! what the reconciler keys on.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Separator used when rendering a path
pub const SEPARATOR: char = '/';

/// Structural path of a node within a tree
///
/// # Examples
/// - `["root"]` → `root`
/// - `["root", "deploy", "smoke"]` → `root/deploy/smoke`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TreePath(Vec<String>);

impl TreePath {
    /// Path of a tree root
    #[inline]
    #[must_use]
    pub fn root(id: impl Into<String>) -> Self {
        Self(vec![id.into()])
    }

    /// Path of the child `id` below this one
    #[must_use]
    pub fn child(&self, id: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(id.into());
        Self(segments)
    }

    /// Whether `other` is this path or lies below it
    #[inline]
    #[must_use]
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        other.0.starts_with(&self.0)
    }

    /// Whether `other` lies strictly below this path
    #[inline]
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        self.0.len() < other.0.len() && self.is_prefix_of(other)
    }
}

impl Display for TreePath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, seg) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "{SEPARATOR}")?;
            }
            f.write_str(seg)?;
        }
        Ok(())
    }
}

impl FromStr for TreePath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(PathError::Empty);
        }

        let segments: Vec<String> = s
            .split(SEPARATOR)
            .map(|seg| {
                if seg.is_empty() {
                    Err(PathError::EmptySegment)
                } else {
                    validate_segment(seg).map(|()| seg.to_string())
                }
            })
            .collect::<Result<_, _>>()?;

        Ok(Self(segments))
    }
}

/// Check that a node id can be used as a path segment.
///
/// # Errors
/// Returns error on empty ids or ids containing the separator
pub fn validate_segment(segment: &str) -> Result<(), PathError> {
    if segment.is_empty() {
        Err(PathError::EmptySegment)
    } else if segment.contains(SEPARATOR) {
        Err(PathError::InvalidSegment(segment.to_string()))
    } else {
        Ok(())
    }
}

/// Errors related to tree paths
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PathError {
    /// No segments at all
    #[error("path is empty")]
    Empty,

    /// Empty segment in path
    #[error("path contains empty segment")]
    EmptySegment,

    /// Segment contains the separator
    #[error("invalid segment: {0} (must not contain '/')")]
    InvalidSegment(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_extends_root() {
        let path = TreePath::root("root").child("a").child("x");
        assert_eq!(path.to_string(), "root/a/x");
        assert_eq!("root/a/x".parse::<TreePath>(), Ok(path));
    }

    #[test]
    fn ancestry() {
        let a: TreePath = "root/a".parse().unwrap();
        let b: TreePath = "root/a/x".parse().unwrap();
        let sibling: TreePath = "root/ab".parse().unwrap();
        assert!(a.is_ancestor_of(&b));
        assert!(!b.is_ancestor_of(&a));
        assert!(!a.is_ancestor_of(&a));
        assert!(a.is_prefix_of(&a));
        assert!(!a.is_prefix_of(&sibling));
    }

    #[test]
    fn parse_errors() {
        assert_eq!("".parse::<TreePath>(), Err(PathError::Empty));
        assert_eq!("root//x".parse::<TreePath>(), Err(PathError::EmptySegment));
        assert!(validate_segment("a/b").is_err());
    }
}
