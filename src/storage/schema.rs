//! Database schema definitions and migrations
//!
//! This module contains all SQL schema definitions for the Directory-Sweep database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- Directory records, one row per natural identity
CREATE TABLE IF NOT EXISTS records (
    identity TEXT PRIMARY KEY,
    name TEXT,
    profession TEXT,
    organization TEXT,
    address TEXT,
    phone TEXT,
    email TEXT,
    situation_data TEXT,
    dossier_data TEXT,
    diplomas_data TEXT,
    personal_data TEXT,
    search_prefix TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_prefix ON records(search_prefix);
CREATE INDEX IF NOT EXISTS idx_records_created ON records(created_at);

-- Every prefix a run has seen and where it stands
CREATE TABLE IF NOT EXISTS frontier (
    run_id INTEGER NOT NULL REFERENCES runs(id),
    prefix TEXT NOT NULL,
    state TEXT NOT NULL,
    seq INTEGER NOT NULL,
    PRIMARY KEY (run_id, prefix)
);

CREATE INDEX IF NOT EXISTS idx_frontier_state ON frontier(run_id, state);

-- One row per drained prefix
CREATE TABLE IF NOT EXISTS prefix_results (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    prefix TEXT NOT NULL,
    records_found INTEGER NOT NULL,
    records_stored INTEGER NOT NULL,
    pages INTEGER NOT NULL,
    error TEXT,
    children INTEGER NOT NULL DEFAULT 0,
    elapsed_ms INTEGER NOT NULL,
    worker_id INTEGER NOT NULL,
    finished_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_prefix_results_run ON prefix_results(run_id);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
