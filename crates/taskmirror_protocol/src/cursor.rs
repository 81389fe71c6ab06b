//! Sync cursors and resource scoping.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Cursor value meaning "send everything".
pub const WILDCARD_CURSOR: &str = "*";

/// Cursor value the server returns to force a full resync.
pub const RESET_CURSOR: &str = "RESET";

/// Number of trailing characters shown when a cursor is logged.
const SUFFIX_LEN: usize = 8;

/// An opaque progress token issued by the sync server.
///
/// A cursor marks how much history the client has already consumed.
/// Clients start at the wildcard and replace the cursor with the one
/// returned by every successful request.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncCursor(String);

impl SyncCursor {
    /// Creates a cursor from a server-issued token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the wildcard cursor.
    pub fn wildcard() -> Self {
        Self(WILDCARD_CURSOR.to_string())
    }

    /// Returns the raw token.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true if this is the wildcard cursor.
    pub fn is_wildcard(&self) -> bool {
        self.0 == WILDCARD_CURSOR
    }

    /// Returns true if the server asked for a forced resync.
    pub fn is_reset(&self) -> bool {
        self.0 == RESET_CURSOR
    }

    /// Returns the trailing characters of the token, safe for logging.
    pub fn suffix(&self) -> &str {
        match self.0.char_indices().rev().nth(SUFFIX_LEN - 1) {
            Some((start, _)) => &self.0[start..],
            None => &self.0,
        }
    }
}

impl Default for SyncCursor {
    fn default() -> Self {
        Self::wildcard()
    }
}

impl fmt::Display for SyncCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for SyncCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SyncCursor(..{})", self.suffix())
    }
}

/// A resource type that can be requested from the sync endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// Tasks (called items on the wire).
    Items,
    /// Projects.
    Projects,
    /// Labels.
    Labels,
}

impl ResourceKind {
    /// Every resource kind the engine mirrors.
    pub const ALL: [ResourceKind; 3] = [
        ResourceKind::Items,
        ResourceKind::Projects,
        ResourceKind::Labels,
    ];

    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Items => "items",
            ResourceKind::Projects => "projects",
            ResourceKind::Labels => "labels",
        }
    }

    /// Parses a wire name.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "items" => Some(ResourceKind::Items),
            "projects" => Some(ResourceKind::Projects),
            "labels" => Some(ResourceKind::Labels),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_is_default() {
        let cursor = SyncCursor::default();
        assert!(cursor.is_wildcard());
        assert!(!cursor.is_reset());
        assert_eq!(cursor.as_str(), "*");
    }

    #[test]
    fn reset_detection() {
        assert!(SyncCursor::new("RESET").is_reset());
        assert!(!SyncCursor::new("reset").is_reset());
    }

    #[test]
    fn suffix_keeps_last_eight_chars() {
        let cursor = SyncCursor::new("abcdefghijklmnop");
        assert_eq!(cursor.suffix(), "ijklmnop");

        let short = SyncCursor::new("abc");
        assert_eq!(short.suffix(), "abc");

        let exact = SyncCursor::new("12345678");
        assert_eq!(exact.suffix(), "12345678");
    }

    #[test]
    fn debug_does_not_leak_full_token() {
        let cursor = SyncCursor::new("secret-prefix-0123456789");
        let debug = format!("{:?}", cursor);
        assert!(!debug.contains("secret-prefix"));
        assert!(debug.contains("23456789"));
    }

    #[test]
    fn cursor_serializes_as_plain_string() {
        let json = serde_json::to_string(&SyncCursor::new("tok")).unwrap();
        assert_eq!(json, "\"tok\"");
    }

    #[test]
    fn resource_kind_wire_names() {
        for kind in ResourceKind::ALL {
            assert_eq!(ResourceKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ResourceKind::parse("notes"), None);
        assert_eq!(
            serde_json::to_string(&ResourceKind::Items).unwrap(),
            "\"items\""
        );
    }
}
