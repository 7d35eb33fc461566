// 🗄️ Audit Store - SQLite export of the decision log
// Write-only from the engine's point of view; queries serve external
// filtering and search. The core never reads decisions back from here.

use crate::record::RecordId;
use crate::resolver::{AuditAction, AuditEntry};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;

pub fn open<P: AsRef<Path>>(path: P) -> Result<Connection> {
    let path = path.as_ref();
    let conn = Connection::open(path).with_context(|| format!("Failed to open audit database: {:?}", path))?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entry_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            actor TEXT NOT NULL,
            action TEXT NOT NULL,
            group_id INTEGER,
            records TEXT NOT NULL,
            origins TEXT NOT NULL,
            results TEXT NOT NULL,
            note TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // One row per (entry, origin) so origin filters stay indexed
    conn.execute(
        "CREATE TABLE IF NOT EXISTS audit_origins (
            entry_id TEXT NOT NULL,
            origin TEXT NOT NULL,
            PRIMARY KEY (entry_id, origin)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_audit_action ON audit_log(action)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_audit_origin ON audit_origins(origin)",
        [],
    )?;

    Ok(())
}

/// Insert entries not yet stored; returns how many were new
pub fn insert_audit_entries(conn: &mut Connection, entries: &[AuditEntry]) -> Result<usize> {
    let tx = conn.transaction()?;
    let mut inserted = 0;

    for entry in entries {
        let changed = tx.execute(
            "INSERT OR IGNORE INTO audit_log (
                entry_id, timestamp, actor, action, group_id, records, origins, results, note
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                entry.entry_id,
                entry.timestamp.to_rfc3339(),
                entry.actor,
                entry.action.as_str(),
                entry.group.map(|g| g as i64),
                serde_json::to_string(&entry.records)?,
                serde_json::to_string(&entry.origins)?,
                serde_json::to_string(&entry.results)?,
                entry.note,
            ],
        )?;

        if changed == 0 {
            continue;
        }
        inserted += 1;

        for origin in &entry.origins {
            tx.execute(
                "INSERT OR IGNORE INTO audit_origins (entry_id, origin) VALUES (?1, ?2)",
                params![entry.entry_id, origin],
            )?;
        }
    }

    tx.commit().context("Failed to commit audit entries")?;

    tracing::info!(inserted, skipped = entries.len() - inserted, "audit entries exported");
    Ok(inserted)
}

const SELECT_COLUMNS: &str =
    "l.entry_id, l.timestamp, l.actor, l.action, l.group_id, l.records, l.origins, l.results, l.note";

fn decode_err(e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<AuditEntry> {
    let timestamp: String = row.get(1)?;
    let action: String = row.get(3)?;
    let group: Option<i64> = row.get(4)?;
    let records: String = row.get(5)?;
    let origins: String = row.get(6)?;
    let results: String = row.get(7)?;

    Ok(AuditEntry {
        entry_id: row.get(0)?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp)
            .map_err(decode_err)?
            .with_timezone(&Utc),
        actor: row.get(2)?,
        action: AuditAction::from_str_name(&action).ok_or_else(|| {
            rusqlite::Error::InvalidColumnType(3, format!("unknown action '{}'", action), rusqlite::types::Type::Text)
        })?,
        group: group.map(|g| g as usize),
        records: serde_json::from_str::<Vec<RecordId>>(&records).map_err(decode_err)?,
        origins: serde_json::from_str(&origins).map_err(decode_err)?,
        results: serde_json::from_str::<Vec<RecordId>>(&results).map_err(decode_err)?,
        note: row.get(8)?,
    })
}

/// Every stored entry in insertion order
pub fn get_audit_entries(conn: &Connection) -> Result<Vec<AuditEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM audit_log l ORDER BY l.id",
        SELECT_COLUMNS
    ))?;

    let entries = stmt
        .query_map([], row_to_entry)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

/// Entries touching records from one origin tag
pub fn get_audit_entries_by_origin(conn: &Connection, origin: &str) -> Result<Vec<AuditEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM audit_log l
         JOIN audit_origins o ON o.entry_id = l.entry_id
         WHERE o.origin = ?1
         ORDER BY l.id",
        SELECT_COLUMNS
    ))?;

    let entries = stmt
        .query_map(params![origin], row_to_entry)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

pub fn get_audit_entries_by_action(conn: &Connection, action: AuditAction) -> Result<Vec<AuditEntry>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM audit_log l WHERE l.action = ?1 ORDER BY l.id",
        SELECT_COLUMNS
    ))?;

    let entries = stmt
        .query_map(params![action.as_str()], row_to_entry)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(entries)
}

pub fn count_entries(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM audit_log", [], |row| row.get(0))?;
    Ok(count)
}
