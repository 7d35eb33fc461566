// 📄 Policy Record - one firewall rule with round-trip fidelity
// Known columns get typed accessors, everything else rides along untouched
// in the original column order.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

// ============================================================================
// RECORD IDENTITY
// ============================================================================

/// Stable record identifier: `<origin>#<row>`
///
/// Row is the index of the data row inside its export (0 = first row after
/// the header), so two imports of the same file produce the same ids.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(origin: &str, row: usize) -> Self {
        RecordId(format!("{}#{}", origin, row))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId(s.to_string())
    }
}

// ============================================================================
// KNOWN FIELDS
// ============================================================================

/// Columns the engine understands; all others are opaque pass-through
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KnownField {
    PolicyId,
    Name,
    SrcIntf,
    DstIntf,
    SrcAddr,
    DstAddr,
    Service,
    Schedule,
    Action,
    Nat,
    Status,
    LogTraffic,
    Comments,
    PoolName,
}

impl KnownField {
    pub fn column(&self) -> &'static str {
        match self {
            KnownField::PolicyId => "policyid",
            KnownField::Name => "name",
            KnownField::SrcIntf => "srcintf",
            KnownField::DstIntf => "dstintf",
            KnownField::SrcAddr => "srcaddr",
            KnownField::DstAddr => "dstaddr",
            KnownField::Service => "service",
            KnownField::Schedule => "schedule",
            KnownField::Action => "action",
            KnownField::Nat => "nat",
            KnownField::Status => "status",
            KnownField::LogTraffic => "logtraffic",
            KnownField::Comments => "comments",
            KnownField::PoolName => "poolname",
        }
    }

    /// Two-valued enable/disable columns
    pub fn is_boolean_like(&self) -> bool {
        matches!(self, KnownField::Nat | KnownField::Status)
    }

    pub fn from_column(column: &str) -> Option<KnownField> {
        KnownField::ALL.iter().copied().find(|f| f.column() == column)
    }

    pub const ALL: [KnownField; 14] = [
        KnownField::PolicyId,
        KnownField::Name,
        KnownField::SrcIntf,
        KnownField::DstIntf,
        KnownField::SrcAddr,
        KnownField::DstAddr,
        KnownField::Service,
        KnownField::Schedule,
        KnownField::Action,
        KnownField::Nat,
        KnownField::Status,
        KnownField::LogTraffic,
        KnownField::Comments,
        KnownField::PoolName,
    ];
}

// ============================================================================
// POLICY RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRecord {
    /// Stable identity, never changes after normalization
    pub id: RecordId,

    /// Device tag derived from the source filename (immutable)
    pub origin: String,

    /// Position in the combined input, used for first-seen ordering
    pub seq: usize,

    /// Column → value pairs in source column order
    fields: Vec<(String, String)>,
}

impl PolicyRecord {
    pub fn new(origin: &str, row: usize, seq: usize, fields: Vec<(String, String)>) -> Self {
        PolicyRecord {
            id: RecordId::new(origin, row),
            origin: origin.to_string(),
            seq,
            fields,
        }
    }

    /// Raw stored value of any column
    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }

    /// Stored value of a known column, empty when absent
    pub fn field(&self, field: KnownField) -> &str {
        self.get(field.column()).unwrap_or("")
    }

    /// Value used for comparisons: boolean-like fields are lower-cased
    pub fn comparison_value(&self, field: KnownField) -> String {
        let value = self.field(field);
        if field.is_boolean_like() {
            value.to_lowercase()
        } else {
            value.to_string()
        }
    }

    /// Parsed enable/disable flag
    pub fn flag(&self, field: KnownField) -> Option<bool> {
        match self.comparison_value(field).as_str() {
            "enable" | "1" | "true" | "yes" => Some(true),
            "disable" | "0" | "false" | "no" => Some(false),
            _ => None,
        }
    }

    /// Overwrite a column, appending it when the record does not carry it yet
    pub fn set(&mut self, column: &str, value: impl Into<String>) {
        let value = value.into();
        match self.fields.iter_mut().find(|(c, _)| c == column) {
            Some((_, v)) => *v = value,
            None => self.fields.push((column.to_string(), value)),
        }
    }

    pub fn set_field(&mut self, field: KnownField, value: impl Into<String>) {
        self.set(field.column(), value);
    }

    /// Display name used for uniqueness checks
    pub fn name(&self) -> &str {
        self.field(KnownField::Name)
    }

    /// Identifier shown in reports: policyid when present, else record id
    pub fn policy_label(&self) -> String {
        let policy_id = self.field(KnownField::PolicyId);
        if policy_id.is_empty() {
            self.id.to_string()
        } else {
            format!("{}@{}", policy_id, self.origin)
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(c, _)| c.as_str())
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Columns the engine does not model, in source order
    pub fn unknown_fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .filter(|(c, _)| KnownField::from_column(c).is_none())
            .map(|(c, v)| (c.as_str(), v.as_str()))
    }
}

// ============================================================================
// ORIGIN TAG
// ============================================================================

fn origin_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<device>.+?)-\d{8}-\d{6}$").expect("origin tag pattern is valid")
    })
}

/// Derive the origin tag from an export filename
///
/// Strips the extension; `<device>-<8 digit date>-<6 digit time>` yields
/// `<device>`, anything else yields the full remainder.
///
/// # Examples:
/// ```
/// use policy_merge::derive_origin_tag;
/// assert_eq!(derive_origin_tag("FW-A-20250101-120000.csv"), "FW-A");
/// assert_eq!(derive_origin_tag("/exports/branch_fw.csv"), "branch_fw");
/// ```
pub fn derive_origin_tag(filename: &str) -> String {
    let stem = Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(filename);

    match origin_pattern().captures(stem) {
        Some(caps) => caps["device"].to_string(),
        None => stem.to_string(),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_record() -> PolicyRecord {
        PolicyRecord::new(
            "FW-A",
            3,
            3,
            vec![
                ("policyid".to_string(), "12".to_string()),
                ("name".to_string(), "HQ-to-DC".to_string()),
                ("nat".to_string(), "Enable".to_string()),
                ("vendor_tag".to_string(), "legacy".to_string()),
                ("srcaddr".to_string(), "HQ-NET".to_string()),
            ],
        )
    }

    #[test]
    fn test_origin_tag_with_timestamp() {
        assert_eq!(derive_origin_tag("RG-FOO-DEV-20250101-000000.csv"), "RG-FOO-DEV");
        assert_eq!(derive_origin_tag("FW-B-20241231-235959.CSV"), "FW-B");
    }

    #[test]
    fn test_origin_tag_without_timestamp() {
        assert_eq!(derive_origin_tag("edge.csv"), "edge");
        assert_eq!(derive_origin_tag("FW-A-2025-01-01.csv"), "FW-A-2025-01-01");
        assert_eq!(derive_origin_tag("FW-A-20250101-12000.csv"), "FW-A-20250101-12000");
    }

    #[test]
    fn test_boolean_like_comparison_preserves_stored_casing() {
        let record = create_test_record();
        assert_eq!(record.comparison_value(KnownField::Nat), "enable");
        assert_eq!(record.field(KnownField::Nat), "Enable");
        assert_eq!(record.flag(KnownField::Nat), Some(true));
        assert_eq!(record.flag(KnownField::Status), None);
    }

    #[test]
    fn test_set_preserves_column_order() {
        let mut record = create_test_record();
        record.set_field(KnownField::Name, "HQ-to-DC-1");
        record.set("extra", "x");

        let columns: Vec<&str> = record.columns().collect();
        assert_eq!(columns, vec!["policyid", "name", "nat", "vendor_tag", "srcaddr", "extra"]);
        assert_eq!(record.name(), "HQ-to-DC-1");
    }

    #[test]
    fn test_unknown_fields_pass_through() {
        let record = create_test_record();
        let unknown: Vec<(&str, &str)> = record.unknown_fields().collect();
        assert_eq!(unknown, vec![("vendor_tag", "legacy")]);
        assert_eq!(record.id.as_str(), "FW-A#3");
        assert_eq!(record.policy_label(), "12@FW-A");
    }
}
