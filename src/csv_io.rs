// 📂 CSV I/O - policy exports in, consolidated record set out
// File handling stays here; the core only ever sees in-memory rows.

use crate::normalizer::PolicyExport;
use crate::record::{derive_origin_tag, PolicyRecord};
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Read one export; the origin tag comes from the filename
pub fn read_export<P: AsRef<Path>>(path: P) -> Result<PolicyExport> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("Failed to open CSV file: {:?}", path))?;

    let origin = derive_origin_tag(&path.to_string_lossy());
    read_export_from(&origin, file).with_context(|| format!("Failed to read export: {:?}", path))
}

/// Read raw rows from any reader; preamble rows may have any width
pub fn read_export_from<R: Read>(origin: &str, reader: R) -> Result<PolicyExport> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);

    let mut rows: Vec<Vec<Vec<u8>>> = Vec::new();
    for result in rdr.byte_records() {
        let record = result.with_context(|| format!("CSV syntax error after row {}", rows.len()))?;
        let mut row: Vec<Vec<u8>> = record.iter().map(|cell| cell.to_vec()).collect();

        if rows.is_empty() {
            if let Some(first) = row.first_mut() {
                if first.starts_with(UTF8_BOM) {
                    first.drain(..UTF8_BOM.len());
                }
            }
        }
        rows.push(row);
    }

    let export = PolicyExport::from_raw_rows(origin, rows)?;
    tracing::debug!(origin, rows = export.rows.len(), "export read");
    Ok(export)
}

/// Union of all record columns, first-seen order
pub fn union_columns<'r>(records: impl IntoIterator<Item = &'r PolicyRecord>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut columns = Vec::new();
    for record in records {
        for column in record.columns() {
            if seen.insert(column.to_string()) {
                columns.push(column.to_string());
            }
        }
    }
    columns
}

/// Write records under the union of their columns; absent cells are empty
pub fn write_records_to<W: Write>(writer: W, records: &[PolicyRecord]) -> Result<()> {
    let columns = union_columns(records);
    let mut wtr = csv::Writer::from_writer(writer);

    wtr.write_record(&columns).context("Failed to write CSV header")?;
    for record in records {
        let row: Vec<&str> = columns
            .iter()
            .map(|c| record.get(c).unwrap_or(""))
            .collect();
        wtr.write_record(&row)
            .with_context(|| format!("Failed to write record {}", record.id))?;
    }
    wtr.flush().context("Failed to flush CSV output")?;
    Ok(())
}

pub fn write_records<P: AsRef<Path>>(path: P, records: &[PolicyRecord]) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).with_context(|| format!("Failed to create CSV file: {:?}", path))?;
    write_records_to(file, records)?;

    tracing::info!(path = ?path, records = records.len(), "records written");
    Ok(())
}
