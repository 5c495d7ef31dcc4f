//! Row/entity translation. All three UID tables share one row shape, so the
//! caller supplies the type tag; series reconstruction stitches the TSMETA
//! row, its ordered join rows, and the referenced UID rows back together.

use rusqlite::Connection;

use tsmeta_core::custom::decode_custom;
use tsmeta_core::{Annotation, AnnotationKey, TimeSeries, Tsuid, Uid, UidEntity, UidKind};

use crate::error::CatalogError;

/// Reads a UID-entity row positioned by the caller. Column order is
/// `UID, NAME, CREATED, DESCRIPTION, DISPLAY_NAME, NOTES, CUSTOM`.
pub fn read_uid_entity(row: &rusqlite::Row, kind: UidKind) -> Result<UidEntity, CatalogError> {
    let uid_hex: String = row.get(0)?;
    let name: String = row.get(1)?;
    let created_ms: i64 = row.get(2)?;
    let description: Option<String> = row.get(3)?;
    let display_name: Option<String> = row.get(4)?;
    let notes: Option<String> = row.get(5)?;
    let custom_blob: Option<Vec<u8>> = row.get(6)?;

    Ok(UidEntity {
        kind,
        uid: Uid::from_hex(&uid_hex)?,
        name,
        created_ms,
        display_name,
        description,
        notes,
        custom: decode_custom(custom_blob.as_deref())?,
    })
}

/// Reads an annotation row. Column order is
/// `TSUID, START_TIME, END_TIME, DESCRIPTION, NOTES, CUSTOM`.
pub fn read_annotation(row: &rusqlite::Row) -> Result<Annotation, CatalogError> {
    let tsuid_hex: Option<String> = row.get(0)?;
    let start_ms: i64 = row.get(1)?;
    let end_ms: Option<i64> = row.get(2)?;
    let description: Option<String> = row.get(3)?;
    let notes: Option<String> = row.get(4)?;
    let custom_blob: Option<Vec<u8>> = row.get(5)?;

    let tsuid = match tsuid_hex {
        Some(hex) => Some(Tsuid::from_hex(&hex)?),
        None => None,
    };
    Ok(Annotation {
        tsuid,
        start_ms,
        end_ms,
        description,
        notes,
        custom: decode_custom(custom_blob.as_deref())?,
    })
}

fn load_uid_row(
    conn: &Connection,
    kind: UidKind,
    uid: Uid,
) -> Result<Option<UidEntity>, CatalogError> {
    let sql = format!(
        "SELECT UID, NAME, CREATED, DESCRIPTION, DISPLAY_NAME, NOTES, CUSTOM FROM {} WHERE UID = ?1",
        kind.table()
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(rusqlite::params![uid.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(read_uid_entity(row, kind)?)),
        None => Ok(None),
    }
}

pub fn load_uid_entity(
    conn: &Connection,
    kind: UidKind,
    uid: Uid,
) -> Result<Option<UidEntity>, CatalogError> {
    load_uid_row(conn, kind, uid)
}

pub fn load_annotation(
    conn: &Connection,
    key: &AnnotationKey,
) -> Result<Option<Annotation>, CatalogError> {
    let tsuid_text = key.tsuid.as_ref().map(|t| t.to_string()).unwrap_or_default();
    let mut stmt = conn.prepare(
        "SELECT TSUID, START_TIME, END_TIME, DESCRIPTION, NOTES, CUSTOM FROM TSD_ANNOTATION
         WHERE START_TIME = ?1 AND IFNULL(TSUID, '') = ?2",
    )?;
    let mut rows = stmt.query(rusqlite::params![key.start_ms, tsuid_text])?;
    match rows.next()? {
        Some(row) => Ok(Some(read_annotation(row)?)),
        None => Ok(None),
    }
}

/// Rebuilds a full series from its TSMETA row: ordered tag-pair UIDs come
/// from the join table, and each pair decomposes into the key/value UIDs
/// whose entity rows are then loaded. A dangling reference is a corrupt
/// catalog, reported as `NotFound`.
pub fn load_time_series(
    conn: &Connection,
    tsuid: &Tsuid,
) -> Result<Option<TimeSeries>, CatalogError> {
    let tsuid_text = tsuid.to_string();
    let meta: Option<(String, i64)> = {
        let mut stmt =
            conn.prepare("SELECT METRIC_UID, CREATED FROM TSD_TSMETA WHERE TSUID = ?1")?;
        let mut rows = stmt.query(rusqlite::params![tsuid_text])?;
        match rows.next()? {
            Some(row) => Some((row.get(0)?, row.get(1)?)),
            None => None,
        }
    };
    let Some((metric_hex, created_ms)) = meta else {
        return Ok(None);
    };

    let metric_uid = Uid::from_hex(&metric_hex)?;
    let metric = load_uid_row(conn, UidKind::Metric, metric_uid)?.ok_or_else(|| {
        CatalogError::NotFound(format!("metric row {metric_hex} referenced by {tsuid_text}"))
    })?;

    let pair_hexes: Vec<String> = {
        let mut stmt = conn.prepare(
            "SELECT TAGPAIR_UID FROM TSD_TSMETA_TAGPAIR WHERE TSUID = ?1 ORDER BY PAIR_ORDER",
        )?;
        let rows = stmt.query_map(rusqlite::params![tsuid_text], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>()?
    };

    let mut tags = Vec::with_capacity(pair_hexes.len());
    for pair_hex in &pair_hexes {
        let pair = tsmeta_core::PairUid::from_hex(pair_hex)?;
        let key = load_uid_row(conn, UidKind::TagKey, pair.tagk())?.ok_or_else(|| {
            CatalogError::NotFound(format!("tag key row {} referenced by {tsuid_text}", pair.tagk()))
        })?;
        let value = load_uid_row(conn, UidKind::TagValue, pair.tagv())?.ok_or_else(|| {
            CatalogError::NotFound(format!("tag value row {} referenced by {tsuid_text}", pair.tagv()))
        })?;
        tags.push((key, value));
    }

    let series = TimeSeries::new(metric, tags, created_ms)?;
    if series.tsuid != *tsuid {
        return Err(CatalogError::Codec(format!(
            "stored join rows for {tsuid_text} recompose to {}",
            series.tsuid
        )));
    }
    Ok(Some(series))
}
