// ⚙️ Engine Configuration - every knob the core honors
// Loaded from JSON (all fields optional) or built in code via Default.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// ============================================================================
// MODES
// ============================================================================

/// Token order of a merged multi-value field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TokenOrder {
    #[default]
    FirstSeen,
    Alphabetical,
}

/// What `undo` does to the audit log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum UndoPolicy {
    /// Append a compensating "revert" entry (history stays append-only)
    #[default]
    Compensate,
    /// Remove the reverted entry from the log view
    Remove,
}

/// Tie-break between equal-length catalog matches at one position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TieBreak {
    /// Lowest (name, kind) wins
    #[default]
    LexicalFirst,
    /// Kind order of the lookup wins
    KindPriority,
}

// ============================================================================
// ENGINE CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Interfaces a policy may never reference
    pub interface_exclusions: Vec<String>,

    /// Distinct values above which a multi-value field becomes a group object
    pub group_threshold: usize,

    pub token_order: TokenOrder,

    /// Emit the whole catalog, not only objects referenced by policies
    pub emit_all_objects: bool,

    /// Emit `append member` instead of the full member list
    pub incremental_groups: bool,

    pub undo_policy: UndoPolicy,

    pub tie_break: TieBreak,

    /// Dominant token for address fields
    pub wildcard_address: String,

    /// Dominant token for service fields
    pub wildcard_service: String,

    /// Hard ceiling on emitted policy names
    pub policy_name_max: usize,

    /// Column whose presence marks the header row
    pub reserved_column: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            interface_exclusions: vec!["ha".to_string(), "mgmt".to_string()],
            group_threshold: 8,
            token_order: TokenOrder::FirstSeen,
            emit_all_objects: false,
            incremental_groups: false,
            undo_policy: UndoPolicy::Compensate,
            tie_break: TieBreak::LexicalFirst,
            wildcard_address: "all".to_string(),
            wildcard_service: "ALL".to_string(),
            policy_name_max: 35,
            reserved_column: "policyid".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file; missing keys keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: EngineConfig =
            serde_json::from_str(content).context("Failed to parse engine config JSON")?;
        Ok(config)
    }

    pub fn is_excluded_interface(&self, name: &str) -> bool {
        self.interface_exclusions.iter().any(|x| x == name)
    }
}
