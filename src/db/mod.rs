use crate::analysis::{AnalysisRun, RunStatus};
use crate::config::Config;
use crate::fingerprint::LineFingerprintSequence;
use crate::model::{Finding, FindingChange, FindingStatus, UnitId, UnitKind};
use crate::tracking::{FingerprintSession, FingerprintStore, OpenFindingsLoader};
use crate::util::{split_stored_lines, unix_now};
use anyhow::{Context, Result, anyhow};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info};

mod migrations;

pub use migrations::SCHEMA_VERSION;

#[derive(Debug)]
struct ConnectionCustomizer {
    busy_timeout: Duration,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for ConnectionCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        conn.busy_timeout(self.busy_timeout)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;

        Ok(())
    }

    fn on_release(&self, _conn: Connection) {}
}

/// A reference branch and the analysis its components belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchRecord {
    pub name: String,
    pub last_analysis_id: Option<i64>,
    pub updated: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentRecord {
    pub id: UnitId,
    pub key: String,
    pub branch: String,
    pub kind: UnitKind,
}

/// Input row for a finding raised on a reference component.
#[derive(Debug, Clone)]
pub struct FindingInput {
    pub key: String,
    pub component_id: UnitId,
    pub rule_key: String,
    pub line: Option<i64>,
    pub message: String,
    pub status: FindingStatus,
    pub line_hash: Option<String>,
}

pub struct Db {
    db_path: PathBuf,
    write_conn: Arc<Mutex<Connection>>,
    read_pool: Pool<SqliteConnectionManager>,
}

impl Db {
    pub fn new(db_path: &Path) -> Result<Self> {
        Self::with_config(db_path, Config::get())
    }

    pub fn with_config(db_path: &Path, config: &Config) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create db directory {}", parent.display()))?;
        }

        info!(
            pool_size = config.pool_size,
            min_idle = config.pool_min_idle,
            "initializing connection pool"
        );
        let busy_timeout = Duration::from_secs(config.busy_timeout_secs);

        // Migrations run on the write connection before any reader exists.
        let write_conn = Connection::open(db_path)
            .with_context(|| format!("open sqlite db at {}", db_path.display()))?;
        write_conn.busy_timeout(busy_timeout)?;
        write_conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;
        migrations::migrate(&write_conn).with_context(|| "migrate schema")?;

        let write_conn = Arc::new(Mutex::new(write_conn));

        let manager = SqliteConnectionManager::file(db_path);
        let read_pool = Pool::builder()
            .max_size(config.pool_size)
            .min_idle(Some(config.pool_min_idle))
            .connection_timeout(busy_timeout)
            .connection_customizer(Box::new(ConnectionCustomizer { busy_timeout }))
            .build(manager)
            .with_context(|| "create connection pool")?;

        debug!(path = %db_path.display(), "database connection pool initialized");

        Ok(Self {
            db_path: db_path.to_path_buf(),
            write_conn,
            read_pool,
        })
    }

    /// Get the database file path
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Check out a pooled read connection; it returns to the pool when dropped.
    pub fn read_conn(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.read_pool
            .get()
            .with_context(|| "get read connection from pool")
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.write_conn
            .lock()
            .map_err(|_| anyhow!("write connection mutex poisoned"))
    }

    pub fn upsert_branch(&self, name: &str, last_analysis_id: Option<i64>) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO branches (name, last_analysis_id, updated) VALUES (?, ?, ?)
             ON CONFLICT(name) DO UPDATE SET
                last_analysis_id = excluded.last_analysis_id,
                updated = excluded.updated",
            params![name, last_analysis_id, unix_now()],
        )?;
        Ok(())
    }

    pub fn get_branch(&self, name: &str) -> Result<Option<BranchRecord>> {
        let branch = self
            .read_conn()?
            .query_row(
                "SELECT name, last_analysis_id, updated FROM branches WHERE name = ?",
                params![name],
                |row| {
                    Ok(BranchRecord {
                        name: row.get(0)?,
                        last_analysis_id: row.get(1)?,
                        updated: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(branch)
    }

    pub fn insert_component(
        &self,
        id: &str,
        key: &str,
        branch: &str,
        kind: UnitKind,
    ) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO components (id, key, branch, kind) VALUES (?, ?, ?, ?)",
                params![id, key, branch, kind.qualifier()],
            )
            .with_context(|| format!("insert component {key} on branch {branch}"))?;
        Ok(())
    }

    pub fn list_components(&self, branch: &str) -> Result<Vec<ComponentRecord>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, key, branch, kind
             FROM components
             WHERE branch = ?
             ORDER BY key",
        )?;
        let rows = stmt.query_map(params![branch], component_from_row)?;
        let mut components = Vec::new();
        for row in rows {
            components.push(row?);
        }
        Ok(components)
    }

    /// Key to component id for every component of `branch`.
    pub fn component_ids_by_key(&self, branch: &str) -> Result<HashMap<String, UnitId>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare("SELECT key, id FROM components WHERE branch = ?")?;
        let rows = stmt.query_map(params![branch], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut ids = HashMap::new();
        for row in rows {
            let (key, id) = row?;
            ids.insert(key, id);
        }
        Ok(ids)
    }

    pub fn upsert_file_source(
        &self,
        component_id: &str,
        fingerprints: &LineFingerprintSequence,
    ) -> Result<()> {
        let line_hashes = if fingerprints.is_empty() {
            None
        } else {
            Some(fingerprints.to_stored())
        };
        self.conn()?.execute(
            "INSERT INTO file_sources (component_id, line_hashes, line_count, updated)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(component_id) DO UPDATE SET
                line_hashes = excluded.line_hashes,
                line_count = excluded.line_count,
                updated = excluded.updated",
            params![
                component_id,
                line_hashes,
                fingerprints.len() as i64,
                unix_now()
            ],
        )?;
        Ok(())
    }

    pub fn insert_finding(&self, finding: &FindingInput) -> Result<()> {
        self.conn()?
            .execute(
                "INSERT INTO issues
                 (key, component_id, rule_key, line, message, status, line_hash, created)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    finding.key,
                    finding.component_id,
                    finding.rule_key,
                    finding.line,
                    finding.message,
                    finding.status.as_str(),
                    finding.line_hash.as_deref(),
                    unix_now(),
                ],
            )
            .with_context(|| format!("insert finding {}", finding.key))?;
        Ok(())
    }

    pub fn insert_finding_change(&self, change: &FindingChange) -> Result<()> {
        let data = serde_json::to_string(&change.data)?;
        self.conn()?
            .execute(
                "INSERT INTO issue_changes (key, issue_key, change_type, data, user, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    change.key,
                    change.finding_key,
                    change.change_type,
                    data,
                    change.user.as_deref(),
                    change.created_at,
                ],
            )
            .with_context(|| format!("insert change {} of {}", change.key, change.finding_key))?;
        Ok(())
    }

    /// Open findings on a component, each with its change history, on one connection.
    pub fn load_open_findings_with_changes(&self, component_id: &str) -> Result<Vec<Finding>> {
        let conn = self.read_conn()?;
        let mut findings = select_open_findings(&conn, component_id)?;
        if findings.is_empty() {
            return Ok(findings);
        }

        let mut changes = select_changes_for_component(&conn, component_id)?;
        for finding in &mut findings {
            if let Some(history) = changes.remove(&finding.key) {
                finding.changes = history;
            }
        }
        Ok(findings)
    }

    pub fn insert_analysis_report(&self, project_key: &str) -> Result<AnalysisRun> {
        let created = unix_now();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO analysis_reports (project_key, status, created_at, updated_at)
             VALUES (?, ?, ?, ?)",
            params![project_key, RunStatus::Pending.as_str(), created, created],
        )?;
        let id = conn.last_insert_rowid();
        Ok(AnalysisRun::new(id, project_key, created))
    }

    pub fn get_analysis_report(&self, id: i64) -> Result<Option<AnalysisRun>> {
        let run = self
            .read_conn()?
            .query_row(
                "SELECT id, project_key, status, snapshot_id, created_at, updated_at, started_at, finished_at
                 FROM analysis_reports
                 WHERE id = ?",
                params![id],
                analysis_run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    /// Persist the lifecycle fields of `run`. A row already in a final state is never rewritten.
    pub fn update_analysis_report(&self, run: &AnalysisRun) -> Result<bool> {
        let updated = self.conn()?.execute(
            "UPDATE analysis_reports
             SET status = ?, snapshot_id = ?, updated_at = ?, started_at = ?, finished_at = ?
             WHERE id = ? AND status NOT IN (?, ?)",
            params![
                run.status.as_str(),
                run.snapshot_id,
                run.updated_at,
                run.started_at,
                run.finished_at,
                run.id,
                RunStatus::Success.as_str(),
                RunStatus::Failed.as_str(),
            ],
        )?;
        Ok(updated > 0)
    }

    pub fn pending_analysis_reports(&self) -> Result<Vec<AnalysisRun>> {
        let conn = self.read_conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, project_key, status, snapshot_id, created_at, updated_at, started_at, finished_at
             FROM analysis_reports
             WHERE status = ?
             ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map(
            params![RunStatus::Pending.as_str()],
            analysis_run_from_row,
        )?;
        let mut runs = Vec::new();
        for row in rows {
            runs.push(row?);
        }
        Ok(runs)
    }

    pub fn get_meta_i64(&self, key: &str) -> Result<Option<i64>> {
        let value: Option<String> = self
            .read_conn()?
            .query_row(
                "SELECT value FROM meta WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.and_then(|v| v.parse::<i64>().ok()))
    }
}

/// Pooled connection scoped to a single fingerprint load.
struct PooledSession {
    conn: PooledConnection<SqliteConnectionManager>,
}

impl FingerprintSession for PooledSession {
    fn load_line_fingerprints(&self, unit_id: &str) -> Result<Option<Vec<String>>> {
        select_line_hashes(&self.conn, unit_id)
    }
}

impl FingerprintStore for Db {
    fn open_session(&self) -> Result<Box<dyn FingerprintSession + '_>> {
        Ok(Box::new(PooledSession {
            conn: self.read_conn()?,
        }))
    }
}

impl OpenFindingsLoader for Db {
    fn load_open_findings_with_changes(&self, unit_id: &str) -> Result<Vec<Finding>> {
        Db::load_open_findings_with_changes(self, unit_id)
    }
}

/// Stored line hashes of a component, `None` when nothing usable is stored.
pub fn select_line_hashes(conn: &Connection, component_id: &str) -> Result<Option<Vec<String>>> {
    let row: Option<(Option<String>, i64)> = conn
        .query_row(
            "SELECT line_hashes, line_count FROM file_sources WHERE component_id = ?",
            params![component_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .with_context(|| format!("select line hashes of {component_id}"))?;
    Ok(row.and_then(|(raw, line_count)| split_stored_lines(raw, line_count)))
}

fn select_open_findings(conn: &Connection, component_id: &str) -> Result<Vec<Finding>> {
    let mut stmt = conn.prepare(
        "SELECT key, rule_key, component_id, line, message, status, line_hash
         FROM issues
         WHERE component_id = ? AND status NOT IN (?, ?)
         ORDER BY created, key",
    )?;
    let rows = stmt.query_map(
        params![
            component_id,
            FindingStatus::Resolved.as_str(),
            FindingStatus::Closed.as_str()
        ],
        |row| {
            Ok((
                row.get::<_, String>(5)?,
                Finding {
                    key: row.get(0)?,
                    rule_key: row.get(1)?,
                    component_id: row.get(2)?,
                    line: row.get(3)?,
                    message: row.get(4)?,
                    status: FindingStatus::Open,
                    line_hash: row.get(6)?,
                    changes: Vec::new(),
                },
            ))
        },
    )?;
    let mut findings = Vec::new();
    for row in rows {
        let (status, mut finding) = row?;
        finding.status = status
            .parse::<FindingStatus>()
            .with_context(|| format!("finding {}", finding.key))?;
        findings.push(finding);
    }
    Ok(findings)
}

fn select_changes_for_component(
    conn: &Connection,
    component_id: &str,
) -> Result<HashMap<String, Vec<FindingChange>>> {
    let mut stmt = conn.prepare(
        "SELECT c.key, c.issue_key, c.change_type, c.data, c.user, c.created_at
         FROM issue_changes c
         JOIN issues i ON i.key = c.issue_key
         WHERE i.component_id = ?
         ORDER BY c.created_at, c.id",
    )?;
    let rows = stmt.query_map(params![component_id], |row| {
        Ok((
            row.get::<_, String>(3)?,
            FindingChange {
                key: row.get(0)?,
                finding_key: row.get(1)?,
                change_type: row.get(2)?,
                data: serde_json::Value::Null,
                user: row.get(4)?,
                created_at: row.get(5)?,
            },
        ))
    })?;
    let mut changes: HashMap<String, Vec<FindingChange>> = HashMap::new();
    for row in rows {
        let (data, mut change) = row?;
        change.data = serde_json::from_str::<serde_json::Value>(&data)
            .with_context(|| format!("decode change {}", change.key))?;
        changes
            .entry(change.finding_key.clone())
            .or_default()
            .push(change);
    }
    Ok(changes)
}

fn component_from_row(row: &Row<'_>) -> rusqlite::Result<ComponentRecord> {
    let kind: String = row.get(3)?;
    let kind = kind.parse::<UnitKind>().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(err))
    })?;
    Ok(ComponentRecord {
        id: row.get(0)?,
        key: row.get(1)?,
        branch: row.get(2)?,
        kind,
    })
}

fn analysis_run_from_row(row: &Row<'_>) -> rusqlite::Result<AnalysisRun> {
    let status: String = row.get(2)?;
    let status = status.parse::<RunStatus>().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(err))
    })?;
    Ok(AnalysisRun {
        id: row.get(0)?,
        project_key: row.get(1)?,
        status,
        snapshot_id: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        started_at: row.get(6)?,
        finished_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_db() -> (Db, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Db::with_config(&db_path, &Config::default()).unwrap();
        (db, temp_dir)
    }

    fn seed_file(db: &Db, id: &str, key: &str) {
        db.upsert_branch("main", Some(1)).unwrap();
        db.insert_component(id, key, "main", UnitKind::File).unwrap();
    }

    fn finding(key: &str, component_id: &str, status: FindingStatus) -> FindingInput {
        FindingInput {
            key: key.to_string(),
            component_id: component_id.to_string(),
            rule_key: "rust:S1481".to_string(),
            line: Some(2),
            message: "Remove this unused variable".to_string(),
            status,
            line_hash: Some("h2".to_string()),
        }
    }

    #[test]
    fn test_line_hashes_round_trip() {
        let (db, _temp) = create_test_db();
        seed_file(&db, "U1", "src/lib.rs");
        let sequence = LineFingerprintSequence::new(vec![
            "h1".to_string(),
            String::new(),
            "h3".to_string(),
        ]);
        db.upsert_file_source("U1", &sequence).unwrap();

        let conn = db.read_conn().unwrap();
        let hashes = select_line_hashes(&conn, "U1").unwrap().unwrap();
        assert_eq!(hashes, vec!["h1", "", "h3"]);
    }

    #[test]
    fn test_missing_and_empty_sources_have_no_hashes() {
        let (db, _temp) = create_test_db();
        seed_file(&db, "U1", "src/lib.rs");
        db.upsert_file_source("U1", &LineFingerprintSequence::empty())
            .unwrap();

        let conn = db.read_conn().unwrap();
        assert_eq!(select_line_hashes(&conn, "U1").unwrap(), None);
        assert_eq!(select_line_hashes(&conn, "nope").unwrap(), None);
    }

    #[test]
    fn test_single_blank_line_source_keeps_its_line() {
        let (db, _temp) = create_test_db();
        seed_file(&db, "U1", "src/blank.rs");
        let sequence = LineFingerprintSequence::from_source("   \n");
        assert_eq!(sequence.len(), 1);
        db.upsert_file_source("U1", &sequence).unwrap();

        let conn = db.read_conn().unwrap();
        let hashes = select_line_hashes(&conn, "U1").unwrap().unwrap();
        assert_eq!(hashes, vec![String::new()]);
        drop(conn);

        let db = Arc::new(db);
        let factory = crate::tracking::DiffInputFactory::from_db(db.clone(), Some("main")).unwrap();
        let input = factory.create_input(&crate::model::Unit::new(
            "PR-U1",
            "src/blank.rs",
            UnitKind::File,
        ));
        let fingerprints = input.fingerprints().unwrap();
        assert_eq!(fingerprints.len(), 1);
        assert_eq!(fingerprints.hash_for_line(1), Some(""));
    }

    #[test]
    fn test_db_path_is_the_opened_file() {
        let (db, temp) = create_test_db();
        assert_eq!(db.db_path(), temp.path().join("test.db"));
    }

    #[test]
    fn test_open_findings_exclude_resolved_and_closed() {
        let (db, _temp) = create_test_db();
        seed_file(&db, "U1", "src/lib.rs");
        db.insert_finding(&finding("I1", "U1", FindingStatus::Open))
            .unwrap();
        db.insert_finding(&finding("I2", "U1", FindingStatus::Confirmed))
            .unwrap();
        db.insert_finding(&finding("I3", "U1", FindingStatus::Resolved))
            .unwrap();
        db.insert_finding(&finding("I4", "U1", FindingStatus::Closed))
            .unwrap();

        let findings = db.load_open_findings_with_changes("U1").unwrap();
        let keys: Vec<&str> = findings.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["I1", "I2"]);
        assert_eq!(findings[1].status, FindingStatus::Confirmed);
    }

    #[test]
    fn test_findings_carry_ordered_history() {
        let (db, _temp) = create_test_db();
        seed_file(&db, "U1", "src/lib.rs");
        db.insert_finding(&finding("I1", "U1", FindingStatus::Reopened))
            .unwrap();
        for (key, at) in [("C2", 200), ("C1", 100)] {
            db.insert_finding_change(&FindingChange {
                key: key.to_string(),
                finding_key: "I1".to_string(),
                change_type: "diff".to_string(),
                data: json!({ "status": { "old": "OPEN", "new": "REOPENED" } }),
                user: Some("alice".to_string()),
                created_at: at,
            })
            .unwrap();
        }

        let findings = db.load_open_findings_with_changes("U1").unwrap();
        assert_eq!(findings.len(), 1);
        let history: Vec<&str> = findings[0].changes.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(history, vec!["C1", "C2"]);
        assert_eq!(findings[0].changes[0].data["status"]["new"], "REOPENED");
    }

    #[test]
    fn test_component_ids_by_key_is_branch_scoped() {
        let (db, _temp) = create_test_db();
        db.upsert_branch("main", Some(1)).unwrap();
        db.upsert_branch("feature", Some(2)).unwrap();
        db.insert_component("U1", "src/lib.rs", "main", UnitKind::File)
            .unwrap();
        db.insert_component("U9", "src/lib.rs", "feature", UnitKind::File)
            .unwrap();

        let ids = db.component_ids_by_key("main").unwrap();
        assert_eq!(ids.get("src/lib.rs").map(String::as_str), Some("U1"));
        assert_eq!(ids.len(), 1);
        assert_eq!(db.list_components("feature").unwrap()[0].id, "U9");
    }

    #[test]
    fn test_analysis_report_lifecycle_persists() {
        let (db, _temp) = create_test_db();
        let mut run = db.insert_analysis_report("org.example:app").unwrap();
        assert_eq!(db.pending_analysis_reports().unwrap().len(), 1);

        run.start().unwrap();
        assert!(db.update_analysis_report(&run).unwrap());
        run.mark_failed().unwrap();
        assert!(db.update_analysis_report(&run).unwrap());

        let stored = db.get_analysis_report(run.id).unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Failed);
        assert!(stored.is_in_final_state());
        assert!(db.pending_analysis_reports().unwrap().is_empty());
    }

    #[test]
    fn test_final_report_row_is_never_rewritten() {
        let (db, _temp) = create_test_db();
        let mut run = db.insert_analysis_report("org.example:app").unwrap();
        run.mark_succeeded().unwrap();
        assert!(db.update_analysis_report(&run).unwrap());

        let mut forged = run.clone();
        forged.status = RunStatus::Failed;
        assert!(!db.update_analysis_report(&forged).unwrap());

        let stored = db.get_analysis_report(run.id).unwrap().unwrap();
        assert_eq!(stored.status, RunStatus::Success);
    }

    #[test]
    fn test_schema_version_recorded() {
        let (db, _temp) = create_test_db();
        assert_eq!(db.get_meta_i64("schema_version").unwrap(), Some(SCHEMA_VERSION));
    }
}
