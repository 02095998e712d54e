use std::fmt;

use serde::{Deserialize, Serialize};

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Number of characters shown by [`TaskId::short`].
const SHORT_ID_LEN: usize = 8;

/// Server-assigned, opaque task identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading characters of the id, for compact list views.
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(SHORT_ID_LEN) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_truncates_long_ids() {
        let id = TaskId::new("0f8c3a1e-77aa-4c5e-9d2b-2f9d6a1b3c4d");
        assert_eq!(id.short(), "0f8c3a1e");
    }

    #[test]
    fn short_keeps_short_ids() {
        assert_eq!(TaskId::new("abc123").short(), "abc123");
    }

    #[test]
    fn serializes_as_plain_string() {
        let json = serde_json::to_string(&TaskId::new("abc123")).unwrap();
        assert_eq!(json, "\"abc123\"");
    }
}
