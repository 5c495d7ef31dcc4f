//! Change-Capture Log plumbing. `record_change` is the write hook: it runs
//! inside the same transaction as the row mutation it describes, so a row
//! change and its log entry commit or roll back together.

use rusqlite::Connection;
use tracing::{debug, error};

use tsmeta_core::{ChangeOp, ChangeRecord, EntityRef, WriteOrigin};

use crate::error::CatalogError;

/// Appends one queue entry for a catalog mutation. Reconciler-origin writes
/// append nothing -- the reconciler's own confirmations must not generate
/// new work for itself.
pub fn record_change(
    conn: &Connection,
    origin: WriteOrigin,
    op: ChangeOp,
    entity: &EntityRef,
    event_time_ms: i64,
) -> Result<(), CatalogError> {
    if origin == WriteOrigin::Reconciler {
        return Ok(());
    }
    conn.execute(
        "INSERT INTO SYNC_QUEUE (EVENT_TYPE, EVENT_PK, OP_TYPE, EVENT_TIME) VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![entity.table(), entity.key(), op.as_str(), event_time_ms],
    )?;
    debug!(table = entity.table(), key = %entity.key(), op = op.as_str(), "queued change");
    Ok(())
}

/// All unattempted queue entries, deletes first, oldest first within an op
/// type. Each row's entity reference is decoded here, once; rows that fail
/// to decode are a programming-contract violation -- they are stamped with
/// the failure so the unattempted poll never returns them again.
pub fn poll_unattempted(
    conn: &Connection,
    now_ms: i64,
) -> Result<Vec<ChangeRecord>, CatalogError> {
    let mut stmt = conn.prepare(
        "SELECT QID, EVENT_TYPE, EVENT_PK, OP_TYPE, EVENT_TIME FROM SYNC_QUEUE
         WHERE LAST_SYNC_ATTEMPT IS NULL ORDER BY OP_TYPE, EVENT_TIME, QID",
    )?;
    let raw: Vec<(i64, String, String, String, i64)> = stmt
        .query_map([], |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut records = Vec::with_capacity(raw.len());
    for (qid, event_type, event_pk, op_type, event_time_ms) in raw {
        let decoded = ChangeOp::parse(&op_type)
            .and_then(|op| EntityRef::decode(&event_type, &event_pk).map(|entity| (op, entity)));
        match decoded {
            Ok((op, entity)) => records.push(ChangeRecord {
                qid,
                entity,
                op,
                event_time_ms,
                last_attempt_ms: None,
                last_error: None,
            }),
            Err(e) => {
                error!(qid, %event_type, %event_pk, %e, "undecodable sync queue entry");
                mark_attempt(conn, qid, now_ms, &e.to_string())?;
            }
        }
    }
    Ok(records)
}

pub fn delete_entry(conn: &Connection, qid: i64) -> Result<(), CatalogError> {
    let deleted = conn.execute("DELETE FROM SYNC_QUEUE WHERE QID = ?1", rusqlite::params![qid])?;
    if deleted == 0 {
        debug!(qid, "no rows deleted for sync queue entry");
    }
    Ok(())
}

/// Stamps a failed attempt. Stamped entries fall out of the unattempted
/// poll; the error column is the only place the failure is visible.
pub fn mark_attempt(
    conn: &Connection,
    qid: i64,
    attempt_ms: i64,
    error: &str,
) -> Result<(), CatalogError> {
    conn.execute(
        "UPDATE SYNC_QUEUE SET LAST_SYNC_ATTEMPT = ?1, LAST_SYNC_ERROR = ?2 WHERE QID = ?3",
        rusqlite::params![attempt_ms, error, qid],
    )?;
    Ok(())
}
