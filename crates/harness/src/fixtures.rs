use tsmeta_catalog::{BatchStats, BatchWriter, CatalogDb, CatalogError};
use tsmeta_core::{CoreError, IndexEvent, TimeSeries, Uid, UidEntity, UidKind};

/// Fixed creation time used by the entity builders so test images are
/// reproducible.
pub const CREATED_MS: i64 = 1_700_000_000_000;

pub struct TestCatalog {
    pub db: CatalogDb,
}

impl TestCatalog {
    pub fn new() -> Result<Self, CatalogError> {
        Ok(Self {
            db: CatalogDb::open_in_memory()?,
        })
    }

    /// Runs one writer batch against the catalog.
    pub fn process(&mut self, events: &[IndexEvent]) -> Result<BatchStats, CatalogError> {
        BatchWriter::new(&mut self.db).process(events)
    }
}

pub fn metric(hex: &str, name: &str) -> UidEntity {
    UidEntity::new(UidKind::Metric, Uid::from_hex(hex).unwrap(), name, CREATED_MS)
}

pub fn tag_key(hex: &str, name: &str) -> UidEntity {
    UidEntity::new(UidKind::TagKey, Uid::from_hex(hex).unwrap(), name, CREATED_MS)
}

pub fn tag_value(hex: &str, name: &str) -> UidEntity {
    UidEntity::new(UidKind::TagValue, Uid::from_hex(hex).unwrap(), name, CREATED_MS)
}

pub fn series(
    metric: &UidEntity,
    tags: &[(&UidEntity, &UidEntity)],
) -> Result<TimeSeries, CoreError> {
    TimeSeries::new(
        metric.clone(),
        tags.iter().map(|(k, v)| ((*k).clone(), (*v).clone())).collect(),
        CREATED_MS,
    )
}

/// One raw SYNC_QUEUE row, attempted or not.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub qid: i64,
    pub event_type: String,
    pub event_pk: String,
    pub op_type: String,
    pub last_attempt_ms: Option<i64>,
    pub last_error: Option<String>,
}

pub fn queue_entries(db: &CatalogDb) -> Result<Vec<QueueEntry>, CatalogError> {
    let mut stmt = db.conn().prepare(
        "SELECT QID, EVENT_TYPE, EVENT_PK, OP_TYPE, LAST_SYNC_ATTEMPT, LAST_SYNC_ERROR
         FROM SYNC_QUEUE ORDER BY QID",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(QueueEntry {
                qid: row.get(0)?,
                event_type: row.get(1)?,
                event_pk: row.get(2)?,
                op_type: row.get(3)?,
                last_attempt_ms: row.get(4)?,
                last_error: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn row_count(db: &CatalogDb, table: &str) -> Result<i64, CatalogError> {
    let count =
        db.conn().query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
    Ok(count)
}

/// Drops accumulated queue entries so a test can observe only the
/// mutations it makes afterwards.
pub fn clear_queue(db: &CatalogDb) -> Result<(), CatalogError> {
    db.conn().execute("DELETE FROM SYNC_QUEUE", [])?;
    Ok(())
}

pub fn uid_version(db: &CatalogDb, kind: UidKind, hex: &str) -> Result<i64, CatalogError> {
    let sql = format!("SELECT VERSION FROM {} WHERE UID = ?1", kind.table());
    let version = db.conn().query_row(&sql, rusqlite::params![hex], |row| row.get(0))?;
    Ok(version)
}
