use std::path::Path;

use rusqlite::Connection;

use tsmeta_core::clock::now_ms;
use tsmeta_core::custom::encode_custom;
use tsmeta_core::{
    Annotation, AnnotationKey, ChangeOp, ChangeRecord, EntityRef, TimeSeries, Tsuid, Uid,
    UidEntity, UidKind, WriteOrigin,
};

use crate::changelog;
use crate::codec;
use crate::error::CatalogError;

/// Handle to the relational catalog. Constructed once and threaded into the
/// components that need it; every mutating method takes the write origin so
/// the change hooks can apply the suppression and versioning rules.
pub struct CatalogDb {
    pub(crate) conn: Connection,
}

impl CatalogDb {
    pub fn open(path: &str) -> Result<Self, CatalogError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, CatalogError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Applies a caller-supplied DDL bootstrap resource.
    pub fn run_ddl_file(&self, path: &Path) -> Result<(), CatalogError> {
        crate::schema::run_ddl_file(&self.conn, path)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn uid_entity(&self, kind: UidKind, uid: Uid) -> Result<Option<UidEntity>, CatalogError> {
        codec::load_uid_entity(&self.conn, kind, uid)
    }

    pub fn time_series(&self, tsuid: &Tsuid) -> Result<Option<TimeSeries>, CatalogError> {
        codec::load_time_series(&self.conn, tsuid)
    }

    pub fn annotation(&self, key: &AnnotationKey) -> Result<Option<Annotation>, CatalogError> {
        codec::load_annotation(&self.conn, key)
    }

    // ========================================================================
    // Out-of-band write surface
    // ========================================================================

    /// Updates the descriptive fields of a UID entity. Returns false without
    /// touching anything when the new image is field-for-field identical to
    /// the stored one -- no-op updates must not reach the change log.
    pub fn update_uid_entity(
        &mut self,
        origin: WriteOrigin,
        entity: &UidEntity,
    ) -> Result<bool, CatalogError> {
        let old = codec::load_uid_entity(&self.conn, entity.kind, entity.uid)?.ok_or_else(|| {
            CatalogError::NotFound(format!("{} {}", entity.kind.table(), entity.uid))
        })?;
        if old == *entity {
            return Ok(false);
        }

        let event_time = now_ms()?;
        let tx = self.conn.transaction()?;
        let version_sql = version_clause(origin);
        let sql = format!(
            "UPDATE {} SET NAME = ?1, CREATED = ?2, DESCRIPTION = ?3, DISPLAY_NAME = ?4,
             NOTES = ?5, CUSTOM = ?6{version_sql} WHERE UID = ?7",
            entity.kind.table()
        );
        tx.execute(
            &sql,
            rusqlite::params![
                entity.name,
                entity.created_ms,
                entity.description,
                entity.display_name,
                entity.notes,
                encode_custom(&entity.custom)?,
                entity.uid.to_string(),
            ],
        )?;
        changelog::record_change(
            &tx,
            origin,
            ChangeOp::Update,
            &EntityRef::Uid { kind: entity.kind, uid: entity.uid },
            event_time,
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// Removes a UID entity row. The hook captures the bare key before the
    /// row disappears; the key is all a downstream tombstone needs.
    pub fn delete_uid_entity(
        &mut self,
        origin: WriteOrigin,
        kind: UidKind,
        uid: Uid,
    ) -> Result<bool, CatalogError> {
        let event_time = now_ms()?;
        let tx = self.conn.transaction()?;
        let sql = format!("DELETE FROM {} WHERE UID = ?1", kind.table());
        let deleted = tx.execute(&sql, rusqlite::params![uid.to_string()])?;
        if deleted == 0 {
            return Ok(false);
        }
        changelog::record_change(
            &tx,
            origin,
            ChangeOp::Delete,
            &EntityRef::Uid { kind, uid },
            event_time,
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// Removes a series row and its tag-pair join rows.
    pub fn delete_time_series(
        &mut self,
        origin: WriteOrigin,
        tsuid: &Tsuid,
    ) -> Result<bool, CatalogError> {
        let event_time = now_ms()?;
        let tx = self.conn.transaction()?;
        let tsuid_text = tsuid.to_string();
        let deleted =
            tx.execute("DELETE FROM TSD_TSMETA WHERE TSUID = ?1", rusqlite::params![tsuid_text])?;
        if deleted == 0 {
            return Ok(false);
        }
        tx.execute(
            "DELETE FROM TSD_TSMETA_TAGPAIR WHERE TSUID = ?1",
            rusqlite::params![tsuid_text],
        )?;
        changelog::record_change(
            &tx,
            origin,
            ChangeOp::Delete,
            &EntityRef::Series { tsuid: tsuid.clone() },
            event_time,
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// Updates an annotation identified by its natural key. Same no-op rule
    /// as `update_uid_entity`.
    pub fn update_annotation(
        &mut self,
        origin: WriteOrigin,
        annotation: &Annotation,
    ) -> Result<bool, CatalogError> {
        let key = annotation.key();
        let old = codec::load_annotation(&self.conn, &key)?
            .ok_or_else(|| CatalogError::NotFound(format!("TSD_ANNOTATION {key}")))?;
        if old == *annotation {
            return Ok(false);
        }

        let event_time = now_ms()?;
        let tx = self.conn.transaction()?;
        let version_sql = version_clause(origin);
        let sql = format!(
            "UPDATE TSD_ANNOTATION SET END_TIME = ?1, DESCRIPTION = ?2, NOTES = ?3,
             CUSTOM = ?4{version_sql} WHERE START_TIME = ?5 AND IFNULL(TSUID, '') = ?6"
        );
        tx.execute(
            &sql,
            rusqlite::params![
                annotation.end_ms,
                annotation.description,
                annotation.notes,
                encode_custom(&annotation.custom)?,
                key.start_ms,
                key.tsuid.as_ref().map(|t| t.to_string()).unwrap_or_default(),
            ],
        )?;
        changelog::record_change(
            &tx,
            origin,
            ChangeOp::Update,
            &EntityRef::Annotation { key },
            event_time,
        )?;
        tx.commit()?;
        Ok(true)
    }

    pub fn delete_annotation(
        &mut self,
        origin: WriteOrigin,
        key: &AnnotationKey,
    ) -> Result<bool, CatalogError> {
        let event_time = now_ms()?;
        let tx = self.conn.transaction()?;
        let deleted = tx.execute(
            "DELETE FROM TSD_ANNOTATION WHERE START_TIME = ?1 AND IFNULL(TSUID, '') = ?2",
            rusqlite::params![
                key.start_ms,
                key.tsuid.as_ref().map(|t| t.to_string()).unwrap_or_default(),
            ],
        )?;
        if deleted == 0 {
            return Ok(false);
        }
        changelog::record_change(
            &tx,
            origin,
            ChangeOp::Delete,
            &EntityRef::Annotation { key: key.clone() },
            event_time,
        )?;
        tx.commit()?;
        Ok(true)
    }

    // ========================================================================
    // Sync queue
    // ========================================================================

    pub fn poll_sync_queue(&self) -> Result<Vec<ChangeRecord>, CatalogError> {
        changelog::poll_unattempted(&self.conn, now_ms()?)
    }

    pub fn delete_sync_entry(&self, qid: i64) -> Result<(), CatalogError> {
        changelog::delete_entry(&self.conn, qid)
    }

    pub fn mark_sync_attempt(&self, qid: i64, error: &str) -> Result<(), CatalogError> {
        changelog::mark_attempt(&self.conn, qid, now_ms()?, error)
    }

    pub fn sync_queue_len(&self) -> Result<u64, CatalogError> {
        let count: i64 =
            self.conn.query_row("SELECT COUNT(*) FROM SYNC_QUEUE", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

/// Version stamping on updates: external edits bump the row version;
/// forward ingest already carries an authoritative version computed
/// upstream, and reconciler confirmations leave rows as they found them.
fn version_clause(origin: WriteOrigin) -> &'static str {
    match origin {
        WriteOrigin::External => ", VERSION = VERSION + 1",
        WriteOrigin::ForwardIngest | WriteOrigin::Reconciler => "",
    }
}

pub(crate) fn uid_exists(conn: &Connection, kind: UidKind, uid: Uid) -> Result<bool, CatalogError> {
    let sql = format!("SELECT COUNT(*) FROM {} WHERE UID = ?1", kind.table());
    let count: i64 = conn.query_row(&sql, rusqlite::params![uid.to_string()], |row| row.get(0))?;
    Ok(count > 0)
}

pub(crate) fn pair_exists(conn: &Connection, pair: tsmeta_core::PairUid) -> Result<bool, CatalogError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM TSD_TAGPAIR WHERE UID = ?1",
        rusqlite::params![pair.to_string()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub(crate) fn tsuid_exists(conn: &Connection, tsuid: &Tsuid) -> Result<bool, CatalogError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM TSD_TSMETA WHERE TSUID = ?1",
        rusqlite::params![tsuid.to_string()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub(crate) fn annotation_exists(
    conn: &Connection,
    key: &AnnotationKey,
) -> Result<bool, CatalogError> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM TSD_ANNOTATION WHERE START_TIME = ?1 AND IFNULL(TSUID, '') = ?2",
        rusqlite::params![
            key.start_ms,
            key.tsuid.as_ref().map(|t| t.to_string()).unwrap_or_default(),
        ],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
