// Policy Merge - Core Library
// Consolidates firewall-policy exports from several devices into one
// deduplicated, conflict-free policy set plus a device configuration script.

pub mod record;
pub mod config;
pub mod error;
pub mod normalizer;   // Record Normalizer
pub mod csv_io;       // CSV export reading / consolidated writing
pub mod catalog;      // Object Catalog + config-text parser
pub mod identity;     // Identity & Similarity Engine
pub mod resolver;     // Merge Resolver + audit log
pub mod generator;    // Code Generator
pub mod session;      // JSON session snapshots
pub mod audit_store;  // SQLite audit export

// Re-export commonly used types
pub use record::{derive_origin_tag, KnownField, PolicyRecord, RecordId};
pub use config::{EngineConfig, TieBreak, TokenOrder, UndoPolicy};
pub use error::{
    CatalogError, NormalizeError, ResolveError, ValidationError, Violation, ViolationKind,
};
pub use normalizer::{normalize_value, NormalizedExport, PolicyExport, RecordNormalizer};
pub use csv_io::{read_export, read_export_from, union_columns, write_records, write_records_to};
pub use catalog::{
    parse_config_source, Catalog, CatalogBuilder, CatalogEntry, FieldToken, ObjectKind,
    ObjectPayload,
};
pub use identity::{
    DedupeReport, DuplicateGroup, IdentityAmbiguity, IdentityEngine, IdentityField,
    IdentitySignature, SimilarityGroup, SimilarityReport,
};
pub use resolver::{
    Action, AuditAction, AuditEntry, GroupKind, GroupState, MergeGroup, MergeResolver,
    RenameSuffix, Resolution,
};
pub use generator::{generate, CodeGenerator, GeneratedScript, Rename, ScriptBlock};
pub use session::Session;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// BATCH SUMMARY
// ============================================================================

/// Counts reported before any decision is made
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Records per origin tag
    pub per_origin: BTreeMap<String, usize>,
    pub total_records: usize,
    pub duplicate_groups: usize,
    /// Records that keep-one on every duplicate group would remove
    pub removable_duplicates: usize,
    pub similarity_groups: usize,
    pub ambiguities: usize,
}

impl PipelineSummary {
    pub fn compute(records: &[PolicyRecord], catalog: &Catalog, config: &EngineConfig) -> Self {
        let engine = IdentityEngine::new(catalog, config);
        let dedupe = engine.dedupe(records);
        let similar = engine.find_similar(records);

        let mut per_origin = BTreeMap::new();
        for record in records {
            *per_origin.entry(record.origin.clone()).or_insert(0) += 1;
        }

        PipelineSummary {
            per_origin,
            total_records: records.len(),
            duplicate_groups: dedupe.duplicate_groups.len(),
            removable_duplicates: dedupe.removed_count(),
            similarity_groups: similar.groups.len(),
            ambiguities: similar.ambiguities.len(),
        }
    }

    pub fn report(&self) -> String {
        let mut lines = vec![format!(
            "Loaded {} origin(s), total records: {}",
            self.per_origin.len(),
            self.total_records
        )];
        for (origin, count) in &self.per_origin {
            lines.push(format!("- {}: {} records", origin, count));
        }
        lines.push(format!(
            "Duplicate groups: {} ({} removable records)",
            self.duplicate_groups, self.removable_duplicates
        ));
        lines.push(format!("Similarity groups: {}", self.similarity_groups));
        if self.ambiguities > 0 {
            lines.push(format!("Ambiguous memberships resolved: {}", self.ambiguities));
        }
        lines.join("\n")
    }
}
