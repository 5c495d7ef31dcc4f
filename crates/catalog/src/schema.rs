use std::path::Path;

use rusqlite::Connection;

use crate::error::CatalogError;

pub const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection) -> Result<(), CatalogError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;
    ",
    )?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}

/// Executes an extra DDL bootstrap resource against the catalog, for
/// deployments that layer site-specific objects over the base schema.
pub fn run_ddl_file(conn: &Connection, path: &Path) -> Result<(), CatalogError> {
    let sql = std::fs::read_to_string(path)
        .map_err(|e| CatalogError::Bootstrap(format!("unreadable ddl resource {}: {e}", path.display())))?;
    conn.execute_batch(&sql)?;
    Ok(())
}

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);
INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, unixepoch());

CREATE TABLE IF NOT EXISTS TSD_METRIC (
    UID TEXT PRIMARY KEY CHECK (length(UID) = 6),
    NAME TEXT NOT NULL,
    CREATED INTEGER NOT NULL,
    DESCRIPTION TEXT,
    DISPLAY_NAME TEXT,
    NOTES TEXT,
    CUSTOM BLOB,
    VERSION INTEGER NOT NULL DEFAULT 1
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_metric_name ON TSD_METRIC (NAME);

CREATE TABLE IF NOT EXISTS TSD_TAGK (
    UID TEXT PRIMARY KEY CHECK (length(UID) = 6),
    NAME TEXT NOT NULL,
    CREATED INTEGER NOT NULL,
    DESCRIPTION TEXT,
    DISPLAY_NAME TEXT,
    NOTES TEXT,
    CUSTOM BLOB,
    VERSION INTEGER NOT NULL DEFAULT 1
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_tagk_name ON TSD_TAGK (NAME);

CREATE TABLE IF NOT EXISTS TSD_TAGV (
    UID TEXT PRIMARY KEY CHECK (length(UID) = 6),
    NAME TEXT NOT NULL,
    CREATED INTEGER NOT NULL,
    DESCRIPTION TEXT,
    DISPLAY_NAME TEXT,
    NOTES TEXT,
    CUSTOM BLOB,
    VERSION INTEGER NOT NULL DEFAULT 1
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_tagv_name ON TSD_TAGV (NAME);

CREATE TABLE IF NOT EXISTS TSD_TAGPAIR (
    UID TEXT PRIMARY KEY CHECK (length(UID) = 12),
    TAGK TEXT NOT NULL CHECK (length(TAGK) = 6),
    TAGV TEXT NOT NULL CHECK (length(TAGV) = 6),
    NAME TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tagpair_k ON TSD_TAGPAIR (TAGK);
CREATE INDEX IF NOT EXISTS idx_tagpair_v ON TSD_TAGPAIR (TAGV);

CREATE TABLE IF NOT EXISTS TSD_TSMETA (
    TSUID TEXT PRIMARY KEY,
    METRIC_UID TEXT NOT NULL CHECK (length(METRIC_UID) = 6),
    CREATED INTEGER NOT NULL,
    VERSION INTEGER NOT NULL DEFAULT 1
);
CREATE INDEX IF NOT EXISTS idx_tsmeta_metric ON TSD_TSMETA (METRIC_UID);

CREATE TABLE IF NOT EXISTS TSD_TSMETA_TAGPAIR (
    TSUID TEXT NOT NULL,
    TAGPAIR_UID TEXT NOT NULL CHECK (length(TAGPAIR_UID) = 12),
    PAIR_ORDER INTEGER NOT NULL,
    PRIMARY KEY (TSUID, PAIR_ORDER)
);
CREATE INDEX IF NOT EXISTS idx_tsmeta_tagpair ON TSD_TSMETA_TAGPAIR (TAGPAIR_UID);

CREATE TABLE IF NOT EXISTS TSD_ANNOTATION (
    ANNID INTEGER PRIMARY KEY AUTOINCREMENT,
    TSUID TEXT,
    START_TIME INTEGER NOT NULL,
    END_TIME INTEGER,
    DESCRIPTION TEXT,
    NOTES TEXT,
    CUSTOM BLOB,
    VERSION INTEGER NOT NULL DEFAULT 1
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_annotation_key
    ON TSD_ANNOTATION (START_TIME, IFNULL(TSUID, ''));

CREATE TABLE IF NOT EXISTS SYNC_QUEUE (
    QID INTEGER PRIMARY KEY AUTOINCREMENT,
    EVENT_TYPE TEXT NOT NULL,
    EVENT_PK TEXT NOT NULL,
    OP_TYPE TEXT NOT NULL CHECK (OP_TYPE IN ('I', 'U', 'D')),
    EVENT_TIME INTEGER NOT NULL,
    LAST_SYNC_ATTEMPT INTEGER,
    LAST_SYNC_ERROR TEXT
);
CREATE INDEX IF NOT EXISTS idx_syncq_pending
    ON SYNC_QUEUE (OP_TYPE, EVENT_TIME, QID) WHERE LAST_SYNC_ATTEMPT IS NULL;
";
