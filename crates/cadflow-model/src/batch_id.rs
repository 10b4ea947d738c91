use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of one end-to-end processing batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(String);

impl BatchId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase DNS-1123 fragment of the id: alphanumerics kept, everything else folded into `-`.
    ///
    /// Used to derive cluster object names; never empty.
    pub fn dns_fragment(&self) -> String {
        let mut out = String::with_capacity(self.0.len());
        let mut last_dash = true;
        for c in self.0.chars() {
            if c.is_ascii_alphanumeric() {
                out.push(c.to_ascii_lowercase());
                last_dash = false;
            } else if !last_dash {
                out.push('-');
                last_dash = true;
            }
        }
        let trimmed = out.trim_matches('-');
        if trimmed.is_empty() {
            "batch".to_string()
        } else {
            trimmed.to_string()
        }
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BatchId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for BatchId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for BatchId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dns_fragment_folds_invalid_characters() {
        assert_eq!(BatchId::from("Batch_42").dns_fragment(), "batch-42");
        assert_eq!(BatchId::from("--a..b--").dns_fragment(), "a-b");
        assert_eq!(BatchId::from("___").dns_fragment(), "batch");
    }

    #[test]
    fn serializes_transparently() {
        let id = BatchId::from("b-7");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""b-7""#);
        assert_eq!(id.to_string(), "b-7");
    }
}
