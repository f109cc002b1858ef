//! Append-only transient error list.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Per-item failures collected across stages.
///
/// Stages never drop or rewrite entries inherited from upstream; they
/// only append. The Transient stage turns a non-empty list into a
/// pipeline failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TransientErrors(Vec<String>);

impl TransientErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure of `op`, e.g. `push("deactivate-host", err)`.
    pub fn push(&mut self, op: &str, err: impl fmt::Display) {
        self.0.push(format!("{op}: {err}"));
    }

    /// Append already-formatted messages (from an upstream stage).
    pub fn extend_from(&mut self, upstream: &TransientErrors) {
        self.0.extend(upstream.0.iter().cloned());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Newline-joined message for the driver, or `None` if nothing failed.
    pub fn aggregate(&self) -> Option<String> {
        if self.0.is_empty() {
            return None;
        }
        Some(format!(
            "the following errors were found:\n{}",
            self.0.join("\n")
        ))
    }
}

impl From<Vec<String>> for TransientErrors {
    fn from(errors: Vec<String>) -> Self {
        Self(errors)
    }
}

impl<'de> Deserialize<'de> for TransientErrors {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let errors = Option::<Vec<String>>::deserialize(deserializer)?;
        Ok(Self(errors.unwrap_or_default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_tags_operation() {
        let mut errs = TransientErrors::new();
        errs.push("remove-host", "connection refused");
        assert_eq!(errs.as_slice(), ["remove-host: connection refused"]);
    }

    #[test]
    fn extend_preserves_upstream_order() {
        let upstream = TransientErrors::from(vec!["a".to_string(), "b".to_string()]);
        let mut errs = TransientErrors::new();
        errs.extend_from(&upstream);
        errs.push("terminate", "boom");

        let all: Vec<&str> = errs.iter().collect();
        assert_eq!(all, ["a", "b", "terminate: boom"]);
    }

    #[test]
    fn aggregate_is_none_when_empty() {
        assert!(TransientErrors::new().aggregate().is_none());
    }

    #[test]
    fn aggregate_joins_with_newlines() {
        let errs = TransientErrors::from(vec!["x".to_string(), "y".to_string()]);
        assert_eq!(
            errs.aggregate().unwrap(),
            "the following errors were found:\nx\ny"
        );
    }

    #[test]
    fn null_deserializes_as_empty() {
        let errs: TransientErrors = serde_json::from_str("null").unwrap();
        assert!(errs.is_empty());
    }
}
