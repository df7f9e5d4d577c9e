//! SQLite-backed audit ledger
//!
//! Each operation opens its own connection, so a ledger value can be
//! cloned into threads or processes freely. Writers serialize on SQLite
//! `IMMEDIATE` transactions; the node upsert is a single
//! `INSERT ... ON CONFLICT DO UPDATE` statement so concurrent attempts for
//! the same node never lose an increment.

use crate::record::{DeploymentRecord, FilesApplied, NodeRecord};
use crate::stats::{DailyStats, DeploymentStats, NodeStats, success_rate};
use crate::{Error, Result};
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, TransactionBehavior, params};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

const SCHEMA_VERSION: i64 = 1;
const BUSY_TIMEOUT_MS: u64 = 10_000;

const DEPLOYMENT_COLUMNS: &str = "id, node_id, started_at, finished_at, action, rules_applied, \
     decoders_applied, outcome, error_detail, backup_skipped, backup_path, generation";

/// Destination for finalized deployment records.
pub trait DeploymentSink {
    fn record_deployment(&self, record: &DeploymentRecord) -> Result<Uuid>;
}

/// Handle to the ledger database file.
#[derive(Debug, Clone)]
pub struct AuditLedger {
    path: PathBuf,
}

impl AuditLedger {
    /// Open the ledger at `path`, creating the file and schema if needed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| Error::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let ledger = Self { path };
        let conn = ledger.connect()?;
        initialize_schema(&conn)?;
        tracing::debug!(path = %ledger.path.display(), "Opened audit ledger");
        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> Result<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&self.path, flags)?;
        conn.busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(conn)
    }

    /// Register a node without counting a deployment.
    ///
    /// Existing nodes keep their counters; a given description replaces
    /// the stored one.
    pub fn register_node(&self, node_id: &str, description: Option<&str>) -> Result<()> {
        let conn = self.connect()?;
        let now = format_ts(crate::record::now());
        conn.execute(
            "INSERT INTO nodes (node_id, description, first_seen, last_seen, deployment_count, active) \
             VALUES (?1, ?2, ?3, ?3, 0, 1) \
             ON CONFLICT(node_id) DO UPDATE SET \
               description = coalesce(excluded.description, nodes.description), \
               last_seen = max(nodes.last_seen, excluded.last_seen)",
            params![node_id, description, now],
        )?;
        tracing::info!(node = %node_id, "Registered node");
        Ok(())
    }

    /// Set a node's operator-controlled `active` flag. Returns false when
    /// the node is unknown.
    pub fn set_node_active(&self, node_id: &str, active: bool) -> Result<bool> {
        let conn = self.connect()?;
        let changed = conn.execute(
            "UPDATE nodes SET active = ?2 WHERE node_id = ?1",
            params![node_id, active],
        )?;
        if changed > 0 {
            tracing::info!(node = %node_id, active, "Updated node status");
        }
        Ok(changed > 0)
    }

    /// All nodes, most recently seen first.
    pub fn list_nodes(&self) -> Result<Vec<NodeRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT node_id, description, first_seen, last_seen, deployment_count, \
                    last_success_at, active \
             FROM nodes ORDER BY last_seen DESC, node_id ASC",
        )?;
        let nodes = stmt
            .query_map([], node_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(nodes)
    }

    pub fn node(&self, node_id: &str) -> Result<Option<NodeRecord>> {
        let conn = self.connect()?;
        let node = conn
            .query_row(
                "SELECT node_id, description, first_seen, last_seen, deployment_count, \
                        last_success_at, active \
                 FROM nodes WHERE node_id = ?1",
                params![node_id],
                node_from_row,
            )
            .optional()?;
        Ok(node)
    }

    /// Most recent deployment attempts across all nodes, newest first.
    pub fn recent_deployments(&self, limit: usize) -> Result<Vec<DeploymentRecord>> {
        let conn = self.connect()?;
        let sql = format!(
            "SELECT {} FROM deployments ORDER BY started_at DESC, id ASC LIMIT ?1",
            DEPLOYMENT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let records = stmt
            .query_map(params![limit], deployment_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Statistics over the trailing `window_days`.
    pub fn query_stats(&self, window_days: u32) -> Result<DeploymentStats> {
        self.query_stats_at(window_days, Utc::now())
    }

    /// Statistics over the `window_days` before `now`.
    pub fn query_stats_at(&self, window_days: u32, now: DateTime<Utc>) -> Result<DeploymentStats> {
        let since = now - ChronoDuration::days(i64::from(window_days));
        let since_text = format_ts(since);
        let conn = self.connect()?;

        let (total, successful, rolled_back) = conn.query_row(
            "SELECT COUNT(*), \
                    COALESCE(SUM(outcome = 'SUCCESS'), 0), \
                    COALESCE(SUM(outcome = 'ROLLED_BACK'), 0) \
             FROM deployments WHERE started_at >= ?1",
            params![since_text],
            |row| Ok((count(row, 0)?, count(row, 1)?, count(row, 2)?)),
        )?;

        let mut stmt = conn.prepare(
            "SELECT node_id, COUNT(*), COALESCE(SUM(outcome = 'SUCCESS'), 0), MAX(started_at) \
             FROM deployments WHERE started_at >= ?1 \
             GROUP BY node_id ORDER BY node_id",
        )?;
        let by_node = stmt
            .query_map(params![since_text], |row| {
                let total = count(row, 1)?;
                let successful = count(row, 2)?;
                Ok(NodeStats {
                    node_id: row.get(0)?,
                    total,
                    successful,
                    failed: total - successful,
                    last_deployment: timestamp(row, 3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut stmt = conn.prepare(
            "SELECT substr(started_at, 1, 10) AS day, COUNT(*), \
                    COALESCE(SUM(outcome = 'SUCCESS'), 0) \
             FROM deployments WHERE started_at >= ?1 \
             GROUP BY day ORDER BY day",
        )?;
        let daily = stmt
            .query_map(params![since_text], |row| {
                let raw: String = row.get(0)?;
                let day = NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                    .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;
                let total = count(row, 1)?;
                let successful = count(row, 2)?;
                Ok(DailyStats {
                    day,
                    total,
                    successful,
                    failed: total - successful,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(DeploymentStats {
            window_days,
            since,
            total,
            successful,
            failed: total - successful,
            rolled_back,
            success_rate: success_rate(successful, total),
            by_node,
            daily,
        })
    }
}

impl DeploymentSink for AuditLedger {
    /// Append `record` and upsert its node in one transaction.
    fn record_deployment(&self, record: &DeploymentRecord) -> Result<Uuid> {
        let Some(finished_at) = record.finished_at else {
            return Err(Error::Unfinished { id: record.id });
        };

        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let started = format_ts(record.started_at);
        let finished = format_ts(finished_at);
        tx.execute(
            &format!(
                "INSERT INTO deployments ({}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                DEPLOYMENT_COLUMNS
            ),
            params![
                record.id.to_string(),
                record.node_id,
                started,
                finished,
                record.action.as_str(),
                record.files_applied.rules,
                record.files_applied.decoders,
                record.outcome.as_str(),
                record.error_detail,
                record.backup_skipped,
                record.backup_path,
                record.generation,
            ],
        )?;

        tx.execute(
            "INSERT INTO nodes (node_id, first_seen, last_seen, deployment_count, last_success_at, active) \
             VALUES (?1, ?2, ?3, 1, CASE WHEN ?4 THEN ?3 END, 1) \
             ON CONFLICT(node_id) DO UPDATE SET \
               first_seen = min(nodes.first_seen, excluded.first_seen), \
               last_seen = max(nodes.last_seen, excluded.last_seen), \
               deployment_count = nodes.deployment_count + 1, \
               last_success_at = CASE WHEN ?4 \
                 THEN max(coalesce(nodes.last_success_at, ''), excluded.last_seen) \
                 ELSE nodes.last_success_at END",
            params![record.node_id, started, finished, record.outcome.is_success()],
        )?;

        tx.commit()?;
        tracing::debug!(
            id = %record.id,
            node = %record.node_id,
            outcome = %record.outcome,
            "Recorded deployment"
        );
        Ok(record.id)
    }
}

fn initialize_schema(conn: &Connection) -> Result<()> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if version > SCHEMA_VERSION {
        return Err(Error::SchemaVersionMismatch {
            expected: SCHEMA_VERSION,
            found: version,
        });
    }

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS deployments (
           id TEXT PRIMARY KEY NOT NULL,
           node_id TEXT NOT NULL,
           started_at TEXT NOT NULL,
           finished_at TEXT NOT NULL,
           action TEXT NOT NULL CHECK (action IN ('deploy', 'noop')),
           rules_applied INTEGER NOT NULL DEFAULT 0,
           decoders_applied INTEGER NOT NULL DEFAULT 0,
           outcome TEXT NOT NULL CHECK (outcome IN ('SUCCESS', 'FAILED', 'ROLLED_BACK')),
           error_detail TEXT,
           backup_skipped INTEGER NOT NULL DEFAULT 0,
           backup_path TEXT,
           generation TEXT
         );
         CREATE INDEX IF NOT EXISTS deployments_started_at ON deployments (started_at);
         CREATE INDEX IF NOT EXISTS deployments_node ON deployments (node_id, started_at);
         CREATE TRIGGER IF NOT EXISTS deployments_no_update
           BEFORE UPDATE ON deployments
           BEGIN SELECT RAISE(ABORT, 'deployments are append-only'); END;
         CREATE TRIGGER IF NOT EXISTS deployments_no_delete
           BEFORE DELETE ON deployments
           BEGIN SELECT RAISE(ABORT, 'deployments are append-only'); END;
         CREATE TABLE IF NOT EXISTS nodes (
           node_id TEXT PRIMARY KEY NOT NULL,
           description TEXT,
           first_seen TEXT NOT NULL,
           last_seen TEXT NOT NULL,
           deployment_count INTEGER NOT NULL DEFAULT 0,
           last_success_at TEXT,
           active INTEGER NOT NULL DEFAULT 1
         );
         CREATE INDEX IF NOT EXISTS nodes_last_seen ON nodes (last_seen);",
    )?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

/// Fixed-width UTC text so lexical order matches time order.
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn optional_timestamp(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn count(row: &Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let value: i64 = row.get(idx)?;
    Ok(u64::try_from(value).unwrap_or_default())
}

fn parsed<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn node_from_row(row: &Row<'_>) -> rusqlite::Result<NodeRecord> {
    Ok(NodeRecord {
        node_id: row.get(0)?,
        description: row.get(1)?,
        first_seen: timestamp(row, 2)?,
        last_seen: timestamp(row, 3)?,
        deployment_count: count(row, 4)?,
        last_success_at: optional_timestamp(row, 5)?,
        active: row.get(6)?,
    })
}

fn deployment_from_row(row: &Row<'_>) -> rusqlite::Result<DeploymentRecord> {
    Ok(DeploymentRecord {
        id: parsed(row, 0)?,
        node_id: row.get(1)?,
        started_at: timestamp(row, 2)?,
        finished_at: Some(timestamp(row, 3)?),
        action: parsed(row, 4)?,
        files_applied: FilesApplied {
            rules: row.get(5)?,
            decoders: row.get(6)?,
        },
        outcome: parsed(row, 7)?,
        error_detail: row.get(8)?,
        backup_skipped: row.get(9)?,
        backup_path: row.get(10)?,
        generation: row.get(11)?,
    })
}
