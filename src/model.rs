//! Branch and checkpoint records as the session observes them

use std::fmt;
use serde::{Deserialize, Serialize};

/// Content-addressable identifier the engine assigns to a checkpoint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointHash(String);

impl CheckpointHash {
    /// Wrap an engine-issued hash
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    /// Borrow the raw hash
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading characters of the hash, for display and file naming
    pub fn short(&self) -> &str {
        let end = self.0.char_indices().nth(8).map(|(i, _)| i).unwrap_or(self.0.len());
        &self.0[..end]
    }
}

impl fmt::Display for CheckpointHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CheckpointHash {
    fn from(hash: &str) -> Self {
        Self::new(hash)
    }
}

/// A branch in the project database. Names are unique per database.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BranchRef {
    /// Branch name
    pub name: String,
}

impl BranchRef {
    /// Create a branch reference
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// A checkpoint on the current branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireCheckpoint")]
pub struct CheckpointRef {
    /// Engine-assigned content hash
    pub hash: CheckpointHash,
    /// Free-form message captured at creation time
    pub message: String,
}

impl CheckpointRef {
    /// Create a checkpoint reference
    pub fn new(hash: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            hash: CheckpointHash::new(hash),
            message: message.into(),
        }
    }
}

/// The engine emits checkpoints as `[hash, message]` pairs; records are accepted too.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireCheckpoint {
    Pair(String, String),
    Record { hash: String, message: String },
}

impl From<WireCheckpoint> for CheckpointRef {
    fn from(wire: WireCheckpoint) -> Self {
        match wire {
            WireCheckpoint::Pair(hash, message) | WireCheckpoint::Record { hash, message } => {
                CheckpointRef::new(hash, message)
            }
        }
    }
}

/// A list entry with its "current" marker, for rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row<'a, T> {
    /// The entry
    pub item: &'a T,
    /// Whether this is the session's current branch/checkpoint
    pub is_current: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_from_pair() {
        let parsed: CheckpointRef = serde_json::from_str(r#"["h0", "init"]"#).unwrap();
        assert_eq!(parsed, CheckpointRef::new("h0", "init"));
    }

    #[test]
    fn test_checkpoint_from_record() {
        let parsed: CheckpointRef =
            serde_json::from_str(r#"{"hash": "h1", "message": "wip"}"#).unwrap();
        assert_eq!(parsed.hash.as_str(), "h1");
        assert_eq!(parsed.message, "wip");
    }

    #[test]
    fn test_checkpoint_rejects_wrong_shape() {
        assert!(serde_json::from_str::<CheckpointRef>(r#"["only-hash"]"#).is_err());
        assert!(serde_json::from_str::<CheckpointRef>(r#"{"hash": "h"}"#).is_err());
        assert!(serde_json::from_str::<CheckpointRef>("42").is_err());
    }

    #[test]
    fn test_checkpoint_serializes_as_record() {
        let json = serde_json::to_value(CheckpointRef::new("h0", "init")).unwrap();
        assert_eq!(json, serde_json::json!({"hash": "h0", "message": "init"}));
    }

    #[test]
    fn test_branch_is_plain_string_on_the_wire() {
        let branches: Vec<BranchRef> = serde_json::from_str(r#"["main", "feature"]"#).unwrap();
        assert_eq!(branches, vec![BranchRef::new("main"), BranchRef::new("feature")]);
        assert_eq!(serde_json::to_string(&branches[0]).unwrap(), r#""main""#);
    }

    #[test]
    fn test_hash_short() {
        assert_eq!(CheckpointHash::new("0123456789abcdef").short(), "01234567");
        assert_eq!(CheckpointHash::new("abc").short(), "abc");
        assert_eq!(CheckpointHash::new("").short(), "");
    }
}
