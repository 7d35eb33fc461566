// 🧹 Record Normalizer - raw tabular rows → PolicyRecord
// Finds the header row, drops the preamble above it, and canonicalizes every
// cell. Any inconsistency is fatal and carries the offending row index.

use crate::config::EngineConfig;
use crate::error::NormalizeError;
use crate::record::PolicyRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ============================================================================
// INPUT
// ============================================================================

/// One device export as handed over by the file layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyExport {
    /// Origin tag (see `derive_origin_tag`)
    pub origin: String,

    /// Declared header row; None = locate it by the reserved column
    pub header_row: Option<usize>,

    /// All rows including any preamble
    pub rows: Vec<Vec<String>>,
}

impl PolicyExport {
    pub fn new(origin: impl Into<String>, rows: Vec<Vec<String>>) -> Self {
        PolicyExport {
            origin: origin.into(),
            header_row: None,
            rows,
        }
    }

    /// Builder: declare the header row index
    pub fn with_header_row(mut self, header_row: usize) -> Self {
        self.header_row = Some(header_row);
        self
    }

    /// Build from undecoded cells, failing on the first row that is not UTF-8
    pub fn from_raw_rows(
        origin: impl Into<String>,
        raw_rows: Vec<Vec<Vec<u8>>>,
    ) -> Result<Self, NormalizeError> {
        let origin = origin.into();
        let mut rows = Vec::with_capacity(raw_rows.len());

        for (idx, raw) in raw_rows.into_iter().enumerate() {
            let mut row = Vec::with_capacity(raw.len());
            for cell in raw {
                let text = String::from_utf8(cell).map_err(|e| {
                    NormalizeError::malformed(&origin, idx, format!("undecodable text: {}", e))
                })?;
                row.push(text);
            }
            rows.push(row);
        }

        Ok(PolicyExport::new(origin, rows))
    }
}

/// Output of normalizing one export
#[derive(Debug, Clone)]
pub struct NormalizedExport {
    pub origin: String,
    pub header_row: usize,
    pub columns: Vec<String>,
    pub records: Vec<PolicyRecord>,
}

// ============================================================================
// NORMALIZATION RULES
// ============================================================================

/// Trim and collapse internal whitespace runs to one space
pub fn normalize_value(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ============================================================================
// NORMALIZER
// ============================================================================

pub struct RecordNormalizer {
    /// Column name that identifies the header row
    reserved_column: String,
}

impl RecordNormalizer {
    pub fn new(config: &EngineConfig) -> Self {
        RecordNormalizer {
            reserved_column: config.reserved_column.clone(),
        }
    }

    /// Exact match; known columns are looked up by their lower-case names
    fn is_header(&self, row: &[String]) -> bool {
        row.iter().any(|cell| cell.trim() == self.reserved_column)
    }

    /// First row carrying the reserved column
    pub fn find_header_row(&self, rows: &[Vec<String>]) -> Option<usize> {
        rows.iter().position(|row| self.is_header(row))
    }

    /// Normalize one export; `seq_start` continues first-seen numbering
    /// across several exports
    pub fn normalize(
        &self,
        export: &PolicyExport,
        seq_start: usize,
    ) -> Result<NormalizedExport, NormalizeError> {
        let origin = export.origin.as_str();

        let header_row = match export.header_row {
            Some(idx) => {
                let row = export.rows.get(idx).ok_or_else(|| {
                    NormalizeError::malformed(
                        origin,
                        idx,
                        format!("declared header row is past the end ({} rows)", export.rows.len()),
                    )
                })?;
                if !self.is_header(row) {
                    return Err(NormalizeError::malformed(
                        origin,
                        idx,
                        format!("declared header row lacks '{}' column", self.reserved_column),
                    ));
                }
                idx
            }
            None => self.find_header_row(&export.rows).ok_or_else(|| {
                NormalizeError::malformed(
                    origin,
                    0,
                    format!("no header row containing '{}'", self.reserved_column),
                )
            })?,
        };

        let columns: Vec<String> = export.rows[header_row]
            .iter()
            .map(|c| normalize_value(c))
            .collect();

        let mut seen = HashSet::new();
        for column in &columns {
            if column.is_empty() {
                return Err(NormalizeError::malformed(origin, header_row, "empty column name"));
            }
            if !seen.insert(column.as_str()) {
                return Err(NormalizeError::malformed(
                    origin,
                    header_row,
                    format!("duplicate column '{}'", column),
                ));
            }
        }

        let mut records = Vec::new();
        for (idx, row) in export.rows.iter().enumerate().skip(header_row + 1) {
            if row.len() != columns.len() {
                return Err(NormalizeError::malformed(
                    origin,
                    idx,
                    format!("expected {} columns, found {}", columns.len(), row.len()),
                ));
            }

            let fields = columns
                .iter()
                .zip(row.iter())
                .map(|(c, v)| (c.clone(), normalize_value(v)))
                .collect();

            let data_row = idx - header_row - 1;
            records.push(PolicyRecord::new(
                origin,
                data_row,
                seq_start + records.len(),
                fields,
            ));
        }

        tracing::debug!(
            origin,
            header_row,
            records = records.len(),
            "normalized export"
        );

        Ok(NormalizedExport {
            origin: origin.to_string(),
            header_row,
            columns,
            records,
        })
    }

    /// Normalize every export in order; first failure aborts the stage
    pub fn normalize_all(
        &self,
        exports: &[PolicyExport],
    ) -> Result<Vec<NormalizedExport>, NormalizeError> {
        let mut out = Vec::with_capacity(exports.len());
        let mut seq = 0;
        for export in exports {
            let normalized = self.normalize(export, seq)?;
            seq += normalized.records.len();
            out.push(normalized);
        }

        tracing::info!(exports = out.len(), records = seq, "normalization complete");
        Ok(out)
    }
}

impl Default for RecordNormalizer {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================
