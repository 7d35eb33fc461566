// ⚠️ Error Kinds - one enum per pipeline stage
// Normalization and catalog errors abort their stage, validation blocks
// emission, resolver errors reject a single decision and leave state untouched.

use crate::catalog::ObjectKind;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// NORMALIZER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    /// Bad or ambiguous tabular input, always tied to a row index
    #[error("malformed input in '{origin}' at row {row}: {reason}")]
    Malformed {
        origin: String,
        row: usize,
        reason: String,
    },
}

impl NormalizeError {
    pub fn malformed(origin: &str, row: usize, reason: impl Into<String>) -> Self {
        NormalizeError::Malformed {
            origin: origin.to_string(),
            row,
            reason: reason.into(),
        }
    }

    pub fn row(&self) -> usize {
        match self {
            NormalizeError::Malformed { row, .. } => *row,
        }
    }
}

// ============================================================================
// CATALOG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    /// Same kind + name defined twice with different payloads
    #[error("conflicting definitions for {kind} '{name}' (source {first_source} vs source {second_source})")]
    Conflict {
        kind: ObjectKind,
        name: String,
        first_source: usize,
        second_source: usize,
    },

    #[error("config source {source_index} line {line}: {reason}")]
    Syntax {
        source_index: usize,
        line: usize,
        reason: String,
    },
}

// ============================================================================
// MERGE RESOLVER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("unknown group {0}")]
    UnknownGroup(usize),

    #[error("group {group} is {state}, expected {expected}")]
    InvalidTransition {
        group: usize,
        state: String,
        expected: String,
    },

    #[error("record '{record}' is not a live member of group {group}")]
    RecordNotInGroup { group: usize, record: String },

    #[error("action '{action}' cannot be applied to group {group}: {reason}")]
    NotApplicable {
        group: usize,
        action: String,
        reason: String,
    },

    #[error("nothing to undo")]
    NothingToUndo,
}

// ============================================================================
// CODE GENERATOR
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ViolationKind {
    /// Referenced name has no catalog entry of an acceptable kind
    UnknownReference { kind: String },
    /// Interface is on the exclusion list
    ExcludedInterface,
    /// Port range does not parse or is out of bounds
    MalformedPortRange { object: String },
    /// Address literal (subnet, range, ip) does not parse
    MalformedAddress { object: String },
    /// Every positive policy id is already taken
    PolicyIdExhausted,
}

/// One offending reference, tied to the policy it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Policy identifier (policyid or record id); None for objects emitted
    /// without a referencing policy
    pub policy: Option<String>,
    pub reference: String,
    pub kind: ViolationKind,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let policy = self.policy.as_deref().unwrap_or("<catalog>");
        match &self.kind {
            ViolationKind::UnknownReference { kind } => {
                write!(f, "policy {}: unknown {} '{}'", policy, kind, self.reference)
            }
            ViolationKind::ExcludedInterface => {
                write!(f, "policy {}: excluded interface '{}'", policy, self.reference)
            }
            ViolationKind::MalformedPortRange { object } => write!(
                f,
                "policy {}: malformed port range '{}' in service '{}'",
                policy, self.reference, object
            ),
            ViolationKind::MalformedAddress { object } => write!(
                f,
                "policy {}: malformed address '{}' in object '{}'",
                policy, self.reference, object
            ),
            ViolationKind::PolicyIdExhausted => {
                write!(f, "policy {}: no free policy id for '{}'", policy, self.reference)
            }
        }
    }
}

/// All violations found before emission; nothing is emitted when returned
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub struct ValidationError {
    pub violations: Vec<Violation>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} validation violation(s)", self.violations.len())?;
        for v in &self.violations {
            write!(f, "\n  - {}", v)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_lists_every_violation() {
        let err = ValidationError {
            violations: vec![
                Violation {
                    policy: Some("12".to_string()),
                    reference: "SMB-EXT".to_string(),
                    kind: ViolationKind::UnknownReference {
                        kind: "service".to_string(),
                    },
                },
                Violation {
                    policy: Some("14".to_string()),
                    reference: "mgmt".to_string(),
                    kind: ViolationKind::ExcludedInterface,
                },
            ],
        };

        let text = err.to_string();
        assert!(text.starts_with("2 validation violation(s)"));
        assert!(text.contains("policy 12: unknown service 'SMB-EXT'"));
        assert!(text.contains("policy 14: excluded interface 'mgmt'"));
    }

    #[test]
    fn test_malformed_reports_row() {
        let err = NormalizeError::malformed("FW-A", 7, "expected 10 columns, found 9");
        assert_eq!(err.row(), 7);
        assert!(err.to_string().contains("row 7"));
    }
}
