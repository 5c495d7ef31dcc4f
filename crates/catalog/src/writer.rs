//! Batch Catalog Writer: applies one ordered batch of index events in a
//! single transaction. Events are staged with in-batch dedup and existence
//! checks during the scan, then every non-empty pending batch executes with
//! one cached statement. Any failed row statement rolls back the whole
//! batch; failed batches are dropped, never requeued -- the primary store
//! stays authoritative and the metadata will be re-observed.

use std::collections::HashSet;
use std::time::Instant;

use rusqlite::Transaction;
use tracing::{debug, error, info};

use tsmeta_core::clock::now_ms;
use tsmeta_core::custom::encode_custom;
use tsmeta_core::{
    Annotation, AnnotationKey, ChangeOp, EntityRef, IndexEvent, PairUid, TagPair, TimeSeries,
    Tsuid, Uid, UidEntity, UidKind, WriteOrigin,
};

use crate::changelog;
use crate::db::{self, CatalogDb};
use crate::error::CatalogError;

#[derive(Debug, Default, Clone, Copy)]
pub struct BatchStats {
    pub uid_rows: usize,
    pub pair_rows: usize,
    pub series_rows: usize,
    pub annotation_rows: usize,
}

impl BatchStats {
    pub fn ops(&self) -> usize {
        self.uid_rows + self.pair_rows + self.series_rows + self.annotation_rows
    }
}

pub struct BatchWriter<'db> {
    db: &'db mut CatalogDb,
}

impl<'db> BatchWriter<'db> {
    pub fn new(db: &'db mut CatalogDb) -> Self {
        Self { db }
    }

    /// Applies one batch atomically. One commit per successful batch; on
    /// any error the transaction rolls back and the batch is dropped.
    pub fn process(&mut self, events: &[IndexEvent]) -> Result<BatchStats, CatalogError> {
        let started = Instant::now();
        let event_time = now_ms()?;
        let tx = self.db.conn.transaction()?;
        match stage_and_execute(&tx, events, event_time) {
            Ok(stats) => {
                tx.commit()?;
                info!(
                    ops = stats.ops(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "executed index batch"
                );
                Ok(stats)
            }
            Err(e) => {
                drop(tx);
                error!(%e, events = events.len(), "batch write failed, dropping batch");
                Err(e)
            }
        }
    }
}

#[derive(Default)]
struct Pending {
    metrics: Vec<UidEntity>,
    tag_keys: Vec<UidEntity>,
    tag_values: Vec<UidEntity>,
    pairs: Vec<TagPair>,
    series: Vec<TimeSeries>,
    annotations: Vec<Annotation>,
}

#[derive(Default)]
struct Seen {
    uids: HashSet<(UidKind, Uid)>,
    pairs: HashSet<PairUid>,
    tsuids: HashSet<Tsuid>,
    annotations: HashSet<AnnotationKey>,
}

fn stage_and_execute(
    tx: &Transaction,
    events: &[IndexEvent],
    event_time: i64,
) -> Result<BatchStats, CatalogError> {
    let mut pending = Pending::default();
    let mut seen = Seen::default();

    for event in events {
        match event {
            IndexEvent::IndexMetric(entity)
            | IndexEvent::IndexTagKey(entity)
            | IndexEvent::IndexTagValue(entity) => {
                stage_uid(tx, &mut pending, &mut seen, entity)?;
            }
            IndexEvent::IndexTimeSeries(series) => {
                stage_series(tx, &mut pending, &mut seen, series)?;
            }
            IndexEvent::IndexAnnotation(annotation) => {
                stage_annotation(tx, &mut pending, &mut seen, annotation)?;
            }
        }
    }

    let mut stats = BatchStats::default();
    stats.uid_rows += execute_uid_batch(tx, UidKind::Metric, &pending.metrics, event_time)?;
    stats.uid_rows += execute_uid_batch(tx, UidKind::TagKey, &pending.tag_keys, event_time)?;
    stats.uid_rows += execute_uid_batch(tx, UidKind::TagValue, &pending.tag_values, event_time)?;
    stats.pair_rows = execute_pair_batch(tx, &pending.pairs)?;
    stats.series_rows = execute_series_batch(tx, &pending.series, event_time)?;
    stats.annotation_rows = execute_annotation_batch(tx, &pending.annotations, event_time)?;
    Ok(stats)
}

/// Stages a UID index event: no-op when the uid is already stored or was
/// already staged earlier in this batch (double delivery).
fn stage_uid(
    tx: &Transaction,
    pending: &mut Pending,
    seen: &mut Seen,
    entity: &UidEntity,
) -> Result<(), CatalogError> {
    if seen.uids.contains(&(entity.kind, entity.uid))
        || db::uid_exists(tx, entity.kind, entity.uid)?
    {
        return Ok(());
    }
    match entity.kind {
        UidKind::Metric => pending.metrics.push(entity.clone()),
        UidKind::TagKey => pending.tag_keys.push(entity.clone()),
        UidKind::TagValue => pending.tag_values.push(entity.clone()),
    }
    seen.uids.insert((entity.kind, entity.uid));
    debug!(kind = ?entity.kind, uid = %entity.uid, name = %entity.name, "staged uid index");
    Ok(())
}

/// Stages a series index event: materializes any tag pairs observed for the
/// first time, then the series row itself with its ordered join rows.
fn stage_series(
    tx: &Transaction,
    pending: &mut Pending,
    seen: &mut Seen,
    series: &TimeSeries,
) -> Result<(), CatalogError> {
    if seen.tsuids.contains(&series.tsuid) || db::tsuid_exists(tx, &series.tsuid)? {
        return Ok(());
    }
    for (key, value) in &series.tags {
        let pair = TagPair::from_entities(key, value)?;
        if seen.pairs.contains(&pair.uid) || db::pair_exists(tx, pair.uid)? {
            continue;
        }
        seen.pairs.insert(pair.uid);
        pending.pairs.push(pair);
    }
    seen.tsuids.insert(series.tsuid.clone());
    pending.series.push(series.clone());
    debug!(tsuid = %series.tsuid, "staged series index");
    Ok(())
}

fn stage_annotation(
    tx: &Transaction,
    pending: &mut Pending,
    seen: &mut Seen,
    annotation: &Annotation,
) -> Result<(), CatalogError> {
    let key = annotation.key();
    if seen.annotations.contains(&key) || db::annotation_exists(tx, &key)? {
        return Ok(());
    }
    seen.annotations.insert(key);
    pending.annotations.push(annotation.clone());
    Ok(())
}

/// One row must mean one insert; anything else fails the whole batch.
fn check_row_result(affected: usize, what: &str) -> Result<(), CatalogError> {
    if affected != 1 {
        return Err(CatalogError::ConstraintViolation(format!(
            "{what} insert affected {affected} rows"
        )));
    }
    Ok(())
}

fn execute_uid_batch(
    tx: &Transaction,
    kind: UidKind,
    rows: &[UidEntity],
    event_time: i64,
) -> Result<usize, CatalogError> {
    if rows.is_empty() {
        return Ok(0);
    }
    let sql = format!(
        "INSERT INTO {} (UID, NAME, CREATED, DESCRIPTION, DISPLAY_NAME, NOTES, CUSTOM)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        kind.table()
    );
    let mut stmt = tx.prepare(&sql)?;
    for entity in rows {
        let affected = stmt.execute(rusqlite::params![
            entity.uid.to_string(),
            entity.name,
            entity.created_ms,
            entity.description,
            entity.display_name,
            entity.notes,
            encode_custom(&entity.custom)?,
        ])?;
        check_row_result(affected, kind.table())?;
        changelog::record_change(
            tx,
            WriteOrigin::ForwardIngest,
            ChangeOp::Insert,
            &EntityRef::Uid { kind, uid: entity.uid },
            event_time,
        )?;
    }
    Ok(rows.len())
}

fn execute_pair_batch(tx: &Transaction, rows: &[TagPair]) -> Result<usize, CatalogError> {
    if rows.is_empty() {
        return Ok(0);
    }
    let mut stmt =
        tx.prepare("INSERT INTO TSD_TAGPAIR (UID, TAGK, TAGV, NAME) VALUES (?1, ?2, ?3, ?4)")?;
    for pair in rows {
        let affected = stmt.execute(rusqlite::params![
            pair.uid.to_string(),
            pair.tagk.to_string(),
            pair.tagv.to_string(),
            pair.name,
        ])?;
        check_row_result(affected, "TSD_TAGPAIR")?;
    }
    Ok(rows.len())
}

fn execute_series_batch(
    tx: &Transaction,
    rows: &[TimeSeries],
    event_time: i64,
) -> Result<usize, CatalogError> {
    if rows.is_empty() {
        return Ok(0);
    }
    let mut meta_stmt =
        tx.prepare("INSERT INTO TSD_TSMETA (TSUID, METRIC_UID, CREATED) VALUES (?1, ?2, ?3)")?;
    let mut join_stmt = tx.prepare(
        "INSERT INTO TSD_TSMETA_TAGPAIR (TSUID, TAGPAIR_UID, PAIR_ORDER) VALUES (?1, ?2, ?3)",
    )?;
    for series in rows {
        let tsuid_text = series.tsuid.to_string();
        let affected = meta_stmt.execute(rusqlite::params![
            tsuid_text,
            series.metric.uid.to_string(),
            series.created_ms,
        ])?;
        check_row_result(affected, "TSD_TSMETA")?;
        for (order, pair) in series.tsuid.pair_uids().iter().enumerate() {
            let affected = join_stmt.execute(rusqlite::params![
                tsuid_text,
                pair.to_string(),
                order as i64,
            ])?;
            check_row_result(affected, "TSD_TSMETA_TAGPAIR")?;
        }
        changelog::record_change(
            tx,
            WriteOrigin::ForwardIngest,
            ChangeOp::Insert,
            &EntityRef::Series { tsuid: series.tsuid.clone() },
            event_time,
        )?;
    }
    Ok(rows.len())
}

fn execute_annotation_batch(
    tx: &Transaction,
    rows: &[Annotation],
    event_time: i64,
) -> Result<usize, CatalogError> {
    if rows.is_empty() {
        return Ok(0);
    }
    let mut stmt = tx.prepare(
        "INSERT INTO TSD_ANNOTATION (TSUID, START_TIME, END_TIME, DESCRIPTION, NOTES, CUSTOM)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?;
    for annotation in rows {
        let affected = stmt.execute(rusqlite::params![
            annotation.tsuid.as_ref().map(|t| t.to_string()),
            annotation.start_ms,
            annotation.end_ms,
            annotation.description,
            annotation.notes,
            encode_custom(&annotation.custom)?,
        ])?;
        check_row_result(affected, "TSD_ANNOTATION")?;
        changelog::record_change(
            tx,
            WriteOrigin::ForwardIngest,
            ChangeOp::Insert,
            &EntityRef::Annotation { key: annotation.key() },
            event_time,
        )?;
    }
    Ok(rows.len())
}
