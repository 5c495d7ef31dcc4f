use tsmeta_core::{Annotation, IndexEvent, Tsuid};
use tsmeta_harness::fixtures::*;
use tsmeta_harness::TestCatalog;

type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Metric `sys.cpu` tagged `host=web01`, as one ordered event batch.
fn cpu_batch() -> Result<Vec<IndexEvent>, Box<dyn std::error::Error>> {
    let m = metric("000001", "sys.cpu");
    let k = tag_key("000002", "host");
    let v = tag_value("000003", "web01");
    let s = series(&m, &[(&k, &v)])?;
    Ok(vec![
        IndexEvent::IndexMetric(m),
        IndexEvent::IndexTagKey(k),
        IndexEvent::IndexTagValue(v),
        IndexEvent::IndexTimeSeries(s),
    ])
}

#[test]
fn index_batch_materializes_every_table() -> TestResult {
    let mut cat = TestCatalog::new()?;
    let stats = cat.process(&cpu_batch()?)?;

    assert_eq!(stats.uid_rows, 3);
    assert_eq!(stats.pair_rows, 1);
    assert_eq!(stats.series_rows, 1);

    assert_eq!(row_count(&cat.db, "TSD_METRIC")?, 1);
    assert_eq!(row_count(&cat.db, "TSD_TAGK")?, 1);
    assert_eq!(row_count(&cat.db, "TSD_TAGV")?, 1);
    assert_eq!(row_count(&cat.db, "TSD_TAGPAIR")?, 1);
    assert_eq!(row_count(&cat.db, "TSD_TSMETA")?, 1);
    assert_eq!(row_count(&cat.db, "TSD_TSMETA_TAGPAIR")?, 1);

    // The series row is reconstructible through the codec.
    let tsuid = Tsuid::from_hex("000001000002000003")?;
    let loaded = cat.db.time_series(&tsuid)?.expect("series row");
    assert_eq!(loaded.metric.name, "sys.cpu");
    assert_eq!(loaded.tags.len(), 1);
    assert_eq!(loaded.tags[0].0.name, "host");
    assert_eq!(loaded.tags[0].1.name, "web01");

    // Every materialized entity left exactly one insert change record.
    let entries = queue_entries(&cat.db)?;
    assert_eq!(entries.len(), 4);
    assert!(entries.iter().all(|e| e.op_type == "I"));
    Ok(())
}

#[test]
fn reprocessing_identical_batch_is_idempotent() -> TestResult {
    let mut cat = TestCatalog::new()?;
    let events = cpu_batch()?;
    cat.process(&events)?;
    let stats = cat.process(&events)?;

    assert_eq!(stats.ops(), 0);
    assert_eq!(row_count(&cat.db, "TSD_METRIC")?, 1);
    assert_eq!(row_count(&cat.db, "TSD_TAGK")?, 1);
    assert_eq!(row_count(&cat.db, "TSD_TAGV")?, 1);
    assert_eq!(row_count(&cat.db, "TSD_TAGPAIR")?, 1);
    assert_eq!(row_count(&cat.db, "TSD_TSMETA")?, 1);
    // No new change records either.
    assert_eq!(queue_entries(&cat.db)?.len(), 4);
    Ok(())
}

#[test]
fn double_delivery_within_one_batch_stages_once() -> TestResult {
    let mut cat = TestCatalog::new()?;
    let m = metric("000001", "sys.cpu");
    let m2 = metric("000009", "sys.mem");
    let k = tag_key("000002", "host");
    let v = tag_value("000003", "web01");
    // The metric event arrives twice, and two series share one tag pair.
    let s1 = series(&m, &[(&k, &v)])?;
    let s2 = series(&m2, &[(&k, &v)])?;
    let events = vec![
        IndexEvent::IndexMetric(m.clone()),
        IndexEvent::IndexMetric(m),
        IndexEvent::IndexMetric(m2),
        IndexEvent::IndexTagKey(k),
        IndexEvent::IndexTagValue(v),
        IndexEvent::IndexTimeSeries(s1),
        IndexEvent::IndexTimeSeries(s2),
    ];
    cat.process(&events)?;

    assert_eq!(row_count(&cat.db, "TSD_METRIC")?, 2);
    assert_eq!(row_count(&cat.db, "TSD_TAGPAIR")?, 1);
    assert_eq!(row_count(&cat.db, "TSD_TSMETA")?, 2);
    Ok(())
}

#[test]
fn annotation_index_is_idempotent() -> TestResult {
    let mut cat = TestCatalog::new()?;
    let tsuid = Tsuid::from_hex("000001000002000003")?;
    let mut annotation = Annotation::new(Some(tsuid), CREATED_MS);
    annotation.description = Some("deploy finished".into());

    let events = vec![
        IndexEvent::IndexAnnotation(annotation.clone()),
        IndexEvent::IndexAnnotation(annotation),
    ];
    cat.process(&events)?;
    assert_eq!(row_count(&cat.db, "TSD_ANNOTATION")?, 1);

    cat.process(&events)?;
    assert_eq!(row_count(&cat.db, "TSD_ANNOTATION")?, 1);
    Ok(())
}

#[test]
fn failed_row_statement_rolls_back_the_batch() -> TestResult {
    let mut cat = TestCatalog::new()?;
    // Two different UIDs claiming the same metric name trip the unique name
    // index on the second pending insert.
    let events = vec![
        IndexEvent::IndexMetric(metric("000001", "sys.cpu")),
        IndexEvent::IndexMetric(metric("000002", "sys.cpu")),
        IndexEvent::IndexTagKey(tag_key("000003", "host")),
    ];
    assert!(cat.process(&events).is_err());

    // All-or-nothing: nothing from the batch survives, including the
    // change records written alongside the staged rows.
    assert_eq!(row_count(&cat.db, "TSD_METRIC")?, 0);
    assert_eq!(row_count(&cat.db, "TSD_TAGK")?, 0);
    assert_eq!(queue_entries(&cat.db)?.len(), 0);
    Ok(())
}
