// 💾 Session Snapshot - records, columns and audit log as one JSON document
// Lets an operator stop halfway through review and pick up later.

use crate::csv_io::union_columns;
use crate::record::PolicyRecord;
use crate::resolver::{AuditEntry, MergeResolver};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Crate version that wrote the snapshot
    pub version: String,

    /// Union of record columns, first-seen order
    pub columns: Vec<String>,

    pub records: Vec<PolicyRecord>,

    #[serde(default)]
    pub audit: Vec<AuditEntry>,
}

impl Session {
    pub fn new(records: Vec<PolicyRecord>, audit: Vec<AuditEntry>) -> Self {
        Session {
            version: crate::VERSION.to_string(),
            columns: union_columns(&records),
            records,
            audit,
        }
    }

    /// Snapshot the live records and audit log of a resolver
    pub fn capture(resolver: &MergeResolver<'_>) -> Self {
        Session::new(
            resolver.records().cloned().collect(),
            resolver.audit_log().to_vec(),
        )
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).context("Failed to serialize session")?;
        fs::write(path, json).with_context(|| format!("Failed to write session file: {:?}", path))?;

        tracing::info!(path = ?path, records = self.records.len(), audit = self.audit.len(), "session saved");
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read session file: {:?}", path))?;

        let session: Session = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse session file: {:?}", path))?;
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::config::EngineConfig;
    use crate::resolver::Action;

    fn create_test_records() -> Vec<PolicyRecord> {
        ["HTTP", "HTTPS"]
            .iter()
            .enumerate()
            .map(|(i, service)| {
                PolicyRecord::new(
                    if i == 0 { "FW-A" } else { "FW-B" },
                    0,
                    i,
                    vec![
                        ("policyid".to_string(), "1".to_string()),
                        ("name".to_string(), "Web".to_string()),
                        ("service".to_string(), service.to_string()),
                        ("vendor_tag".to_string(), "x".to_string()),
                    ],
                )
            })
            .collect()
    }

    #[test]
    fn test_save_and_load() {
        let catalog = Catalog::empty();
        let mut resolver = MergeResolver::new(create_test_records(), &catalog, &EngineConfig::default());
        resolver
            .apply_decision(0, Action::MergeFields { name: None })
            .unwrap();

        let session = Session::capture(&resolver);
        assert_eq!(session.columns, vec!["policyid", "name", "service", "vendor_tag"]);

        let path = std::env::temp_dir().join(format!("policy-merge-session-{}.json", uuid::Uuid::new_v4()));
        session.save(&path).unwrap();
        let loaded = Session::load(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(loaded, session);
        assert_eq!(loaded.records[0].get("service"), Some("HTTP HTTPS"));
        assert_eq!(loaded.audit.len(), 1);
    }

    #[test]
    fn test_load_missing_file_is_error() {
        assert!(Session::load("/nonexistent/session.json").is_err());
    }
}
