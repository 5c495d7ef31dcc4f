use tsmeta_core::{Annotation, AnnotationKey, IndexEvent, Tsuid, UidKind, WriteOrigin};
use tsmeta_harness::fixtures::*;
use tsmeta_harness::TestCatalog;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn seeded_catalog() -> Result<TestCatalog, Box<dyn std::error::Error>> {
    let mut cat = TestCatalog::new()?;
    let m = metric("000001", "sys.cpu");
    let k = tag_key("000002", "host");
    let v = tag_value("000003", "web01");
    let s = series(&m, &[(&k, &v)])?;
    cat.process(&[
        IndexEvent::IndexMetric(m),
        IndexEvent::IndexTagKey(k),
        IndexEvent::IndexTagValue(v),
        IndexEvent::IndexTimeSeries(s),
    ])?;
    clear_queue(&cat.db)?;
    Ok(cat)
}

#[test]
fn external_update_commits_exactly_one_record() -> TestResult {
    let mut cat = seeded_catalog()?;
    assert_eq!(uid_version(&cat.db, UidKind::Metric, "000001")?, 1);

    let mut changed = metric("000001", "sys.cpu");
    changed.description = Some("cpu utilization".into());
    assert!(cat.db.update_uid_entity(WriteOrigin::External, &changed)?);

    let entries = queue_entries(&cat.db)?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].event_type, "TSD_METRIC");
    assert_eq!(entries[0].event_pk, "000001");
    assert_eq!(entries[0].op_type, "U");
    assert_eq!(uid_version(&cat.db, UidKind::Metric, "000001")?, 2);
    Ok(())
}

#[test]
fn noop_update_commits_zero_records() -> TestResult {
    let mut cat = TestCatalog::new()?;
    let tsuid = Tsuid::from_hex("000001000002000003")?;
    let mut annotation = Annotation::new(Some(tsuid), CREATED_MS);
    annotation.description = Some("deploy finished".into());
    cat.process(&[IndexEvent::IndexAnnotation(annotation.clone())])?;
    clear_queue(&cat.db)?;

    // Two back-to-back updates with an image identical to the stored row.
    assert!(!cat.db.update_annotation(WriteOrigin::External, &annotation)?);
    assert!(!cat.db.update_annotation(WriteOrigin::External, &annotation)?);

    assert_eq!(queue_entries(&cat.db)?.len(), 0);
    Ok(())
}

#[test]
fn reconciler_origin_appends_nothing() -> TestResult {
    let mut cat = seeded_catalog()?;

    let mut changed = metric("000001", "sys.cpu");
    changed.notes = Some("confirmed against the primary store".into());
    assert!(cat.db.update_uid_entity(WriteOrigin::Reconciler, &changed)?);

    // The row changed, but the reconciler's own write generated no new
    // work for itself -- and left the version alone.
    let loaded = cat.db.uid_entity(UidKind::Metric, changed.uid)?.expect("metric row");
    assert_eq!(loaded.notes.as_deref(), Some("confirmed against the primary store"));
    assert_eq!(queue_entries(&cat.db)?.len(), 0);
    assert_eq!(uid_version(&cat.db, UidKind::Metric, "000001")?, 1);
    Ok(())
}

#[test]
fn series_delete_records_bare_tsuid() -> TestResult {
    let mut cat = seeded_catalog()?;
    let tsuid = Tsuid::from_hex("000001000002000003")?;

    assert!(cat.db.delete_time_series(WriteOrigin::External, &tsuid)?);
    assert_eq!(row_count(&cat.db, "TSD_TSMETA")?, 0);
    assert_eq!(row_count(&cat.db, "TSD_TSMETA_TAGPAIR")?, 0);

    let entries = queue_entries(&cat.db)?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].event_type, "TSD_TSMETA");
    assert_eq!(entries[0].op_type, "D");
    assert_eq!(entries[0].event_pk, "000001000002000003");
    Ok(())
}

#[test]
fn annotation_delete_records_composite_key() -> TestResult {
    let mut cat = TestCatalog::new()?;
    let annotation = Annotation::new(None, 1500);
    cat.process(&[IndexEvent::IndexAnnotation(annotation)])?;
    clear_queue(&cat.db)?;

    let key = AnnotationKey { start_ms: 1500, tsuid: None };
    assert!(cat.db.delete_annotation(WriteOrigin::External, &key)?);

    let entries = queue_entries(&cat.db)?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].event_type, "TSD_ANNOTATION");
    assert_eq!(entries[0].op_type, "D");
    assert_eq!(entries[0].event_pk, "1500:");
    Ok(())
}

#[test]
fn uid_delete_records_bare_uid() -> TestResult {
    let mut cat = seeded_catalog()?;
    let uid = tsmeta_core::Uid::from_hex("000003")?;

    assert!(cat.db.delete_uid_entity(WriteOrigin::External, UidKind::TagValue, uid)?);
    // Deleting a row that is already gone reports false and records nothing.
    assert!(!cat.db.delete_uid_entity(WriteOrigin::External, UidKind::TagValue, uid)?);

    let entries = queue_entries(&cat.db)?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].event_type, "TSD_TAGV");
    assert_eq!(entries[0].op_type, "D");
    assert_eq!(entries[0].event_pk, "000003");
    Ok(())
}
