//! Slash-separated tree paths.

use std::fmt;

use crate::error::StoreError;

/// A validated path into the store tree.
///
/// Paths are non-empty sequences of non-empty segments, written
/// `rooms/default/players/k42`. Leading and trailing slashes are
/// rejected rather than normalized so that path typos surface early.
///
/// # Example
///
/// ```
/// use wirestore::StorePath;
///
/// let players = StorePath::parse("rooms/default/players").unwrap();
/// let one = players.join("k42");
/// assert_eq!(one.to_string(), "rooms/default/players/k42");
/// assert_eq!(one.parent().unwrap(), players);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    /// Parses a `/`-separated path string.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidPath`] when the string is empty or
    /// contains an empty segment (leading, trailing, or doubled slash).
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        if raw.is_empty() {
            return Err(StoreError::InvalidPath(raw.to_string()));
        }
        let segments: Vec<String> = raw.split('/').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(StoreError::InvalidPath(raw.to_string()));
        }
        Ok(Self { segments })
    }

    /// Appends one child segment.
    ///
    /// The segment must be non-empty and must not contain `/`; child keys
    /// handed out by the store always satisfy this.
    #[must_use]
    pub fn join(&self, child: &str) -> Self {
        debug_assert!(!child.is_empty() && !child.contains('/'));
        let mut segments = self.segments.clone();
        segments.push(child.to_string());
        Self { segments }
    }

    /// The path's segments, in order.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The final segment.
    #[must_use]
    pub fn last(&self) -> &str {
        // Invariant: segments is non-empty after parse/join.
        self.segments.last().map_or("", String::as_str)
    }

    /// The path with the final segment removed, or `None` at the root.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() <= 1 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Whether `self` is `prefix` itself or a descendant of it.
    #[must_use]
    pub fn starts_with(&self, prefix: &Self) -> bool {
        self.segments.len() >= prefix.segments.len()
            && self.segments[..prefix.segments.len()] == prefix.segments[..]
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("/"))
    }
}
