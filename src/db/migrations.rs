use anyhow::{Result, bail};
use rusqlite::{Connection, OptionalExtension, params};

pub const SCHEMA_VERSION: i64 = 1;

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        BEGIN;
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS analysis_reports (
            id INTEGER PRIMARY KEY,
            project_key TEXT NOT NULL,
            status TEXT NOT NULL,
            snapshot_id INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            started_at INTEGER,
            finished_at INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_analysis_reports_status ON analysis_reports(status);

        CREATE TABLE IF NOT EXISTS branches (
            name TEXT PRIMARY KEY,
            last_analysis_id INTEGER,
            updated INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS components (
            id TEXT PRIMARY KEY,
            key TEXT NOT NULL,
            branch TEXT NOT NULL,
            kind TEXT NOT NULL,
            UNIQUE(branch, key),
            FOREIGN KEY(branch) REFERENCES branches(name) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_components_branch ON components(branch);

        CREATE TABLE IF NOT EXISTS file_sources (
            component_id TEXT PRIMARY KEY,
            line_hashes TEXT,
            line_count INTEGER NOT NULL,
            updated INTEGER NOT NULL,
            FOREIGN KEY(component_id) REFERENCES components(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS issues (
            key TEXT PRIMARY KEY,
            component_id TEXT NOT NULL,
            rule_key TEXT NOT NULL,
            line INTEGER,
            message TEXT NOT NULL,
            status TEXT NOT NULL,
            line_hash TEXT,
            created INTEGER NOT NULL,
            FOREIGN KEY(component_id) REFERENCES components(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_issues_component ON issues(component_id);
        CREATE INDEX IF NOT EXISTS idx_issues_status ON issues(status);

        CREATE TABLE IF NOT EXISTS issue_changes (
            id INTEGER PRIMARY KEY,
            key TEXT NOT NULL UNIQUE,
            issue_key TEXT NOT NULL,
            change_type TEXT NOT NULL,
            data TEXT NOT NULL,
            user TEXT,
            created_at INTEGER NOT NULL,
            FOREIGN KEY(issue_key) REFERENCES issues(key) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_issue_changes_issue ON issue_changes(issue_key);
        COMMIT;
        ",
    )?;

    let existing: Option<i64> = conn
        .query_row(
            "SELECT value FROM meta WHERE key = 'schema_version'",
            [],
            |row| {
                row.get::<_, String>(0)
                    .map(|v| v.parse::<i64>().unwrap_or(0))
            },
        )
        .optional()?;

    if let Some(existing) = existing {
        if existing > SCHEMA_VERSION {
            bail!(
                "database schema version {existing} is newer than supported version {SCHEMA_VERSION}"
            );
        }
    }

    conn.execute(
        "INSERT INTO meta (key, value) VALUES ('schema_version', ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}
