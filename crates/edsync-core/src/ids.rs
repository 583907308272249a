//! Type-safe identifiers for sessions and documents.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a connected editing session.
///
/// Assigned by the daemon from a per-process connection counter; a session
/// keeps its id from connect to disconnect and ids are never reused within
/// one daemon run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}

impl From<u64> for SessionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Unique identifier for a document.
///
/// Opaque increasing integer. A document destroyed on its last detach and
/// re-created later under the same name gets a fresh id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(u64);

impl DocumentId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.0)
    }
}

/// Key under which a document is registered.
///
/// Derived from the basename of the session's file path, so sessions editing
/// `/a/notes.txt` and `/b/notes.txt` share one document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentName(String);

impl DocumentName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Derives the document name from a session's file path.
    pub fn from_path(path: &str) -> Self {
        let name = path.rsplit('/').next().unwrap_or(path);
        Self(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DocumentName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_name_from_path() {
        assert_eq!(DocumentName::from_path("/home/user/notes.txt").as_str(), "notes.txt");
        assert_eq!(DocumentName::from_path("notes.txt").as_str(), "notes.txt");
        assert_eq!(DocumentName::from_path("/a/b/c").as_str(), "c");
    }

    #[test]
    fn test_document_name_shared_across_directories() {
        let a = DocumentName::from_path("/a/notes.txt");
        let b = DocumentName::from_path("/b/notes.txt");
        assert_eq!(a, b);
    }

    #[test]
    fn test_id_display() {
        assert_eq!(SessionId::new(3).to_string(), "s3");
        assert_eq!(DocumentId::new(7).to_string(), "d7");
    }
}
