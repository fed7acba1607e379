use pretty_assertions::assert_eq;
use reconcile_core::query::MatchQuery;
use reconcile_engine::{EngineError, OperationConfig, Processor, RunSummary};
use reconcile_harness::{field_text, record, records, FaultyBackend, LogCapture, TestRegistry, TestStore};
use reconcile_storage::StorageError;
use serde_json::json;

// ============================================================================
// Error policy
// ============================================================================

#[test]
fn failed_records_are_counted_when_not_fatal() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = TestStore::documents()?;
    store.seed(records(json!([{"sku": "X1", "qty": 1}])))?;

    let summary = store.run(
        json!({"name": "items", "op": "update:sku", "fail_on_error": false}),
        json!([{"sku": "", "qty": 5}, {"sku": "X1", "qty": 2}, {"sku": "X9", "qty": 3}]),
    )?;
    assert_eq!(
        summary,
        RunSummary { processed: 3, updated: 1, not_found: 1, failed: 1, ..Default::default() }
    );
    assert_eq!(field_text(&store.find("sku", "X1")?[0], "qty").as_deref(), Some("2"));
    Ok(())
}

#[test]
fn failed_record_aborts_the_run_by_default() -> Result<(), Box<dyn std::error::Error>> {
    let mut store = TestStore::documents()?;
    let result = store.run(
        json!({"name": "items", "op": "upsert:sku"}),
        json!([{"sku": "A"}, {"sku": ""}, {"sku": "C"}]),
    );
    assert!(matches!(result, Err(EngineError::EmptyQuery(_))));
    assert_eq!(store.count()?, 1);
    Ok(())
}

#[test]
fn failed_save_is_still_logged() -> Result<(), Box<dyn std::error::Error>> {
    let mut faulty = FaultyBackend::new()?;
    faulty.fail_persist = true;
    let config = OperationConfig::from_map(&record(json!({"name": "faulty", "op": "create"})))?;

    let logs = LogCapture::new();
    let result = logs.capture(|| Processor::new(config, &mut faulty)?.process(record(json!({"sku": "A"}))));

    assert!(matches!(result, Err(EngineError::Storage(StorageError::Io(_)))));
    assert!(logs.contains("SAVED with data"));
    assert_eq!(faulty.inner().count()?, 0);
    Ok(())
}

#[test]
fn failed_delete_is_still_logged() -> Result<(), Box<dyn std::error::Error>> {
    let mut faulty = FaultyBackend::new()?;
    let create = OperationConfig::from_map(&record(json!({"name": "faulty", "op": "create"})))?;
    Processor::new(create, &mut faulty)?.process(record(json!({"sku": "A"})))?;

    faulty.fail_delete = true;
    let delete = OperationConfig::from_map(&record(json!({"name": "faulty", "op": "delete:sku"})))?;
    let logs = LogCapture::new();
    let result = logs.capture(|| Processor::new(delete, &mut faulty)?.process(record(json!({"sku": "A"}))));

    assert!(matches!(result, Err(EngineError::Storage(StorageError::Io(_)))));
    assert!(logs.contains("DELETED with data"));
    assert_eq!(faulty.inner().count()?, 1);
    Ok(())
}

// ============================================================================
// Registry-driven runs
// ============================================================================

#[test]
fn runs_share_the_registered_collection() -> Result<(), Box<dyn std::error::Error>> {
    let mut harness = TestRegistry::new()?;
    harness.run(
        json!({"name": "items", "op": "create"}),
        json!([{"sku": "A", "qty": 1}, {"sku": "B", "qty": 1}]),
    )?;
    let summary = harness.run(json!({"name": "items", "op": "update:sku"}), json!([{"sku": "B", "qty": 7}]))?;
    assert_eq!(summary.updated, 1);
    assert_eq!(harness.registry.len(), 1);

    let backend = harness.registry.get("default", "items").ok_or("items is not registered")?;
    let rows = backend.get_collection(&MatchQuery::new())?;
    assert_eq!(rows.total, 2);
    let b = rows
        .iter()
        .map(|handle| handle.to_record())
        .find(|row| field_text(row, "sku").as_deref() == Some("B"))
        .ok_or("B is missing")?;
    assert_eq!(b.get("qty"), Some(&json!(7)));
    Ok(())
}

#[test]
fn csv_runs_write_the_file() -> Result<(), Box<dyn std::error::Error>> {
    let mut harness = TestRegistry::new()?;
    harness.run(
        json!({"name": "people.csv", "op": "create", "backend": "csv"}),
        json!([{"email": "ann@x", "city": "Oslo"}]),
    )?;
    harness.run(
        json!({"name": "people.csv", "op": "update:email", "backend": "csv"}),
        json!([{"email": "ann@x", "city": "Bergen"}]),
    )?;
    assert_eq!(harness.registry.len(), 1);

    let written = std::fs::read_to_string(harness.settings.csv_root.join("default").join("people.csv"))?;
    assert!(written.contains("Bergen"));
    assert!(!written.contains("Oslo"));
    Ok(())
}

#[test]
fn namespace_is_sanitized_for_registration() -> Result<(), Box<dyn std::error::Error>> {
    let mut harness = TestRegistry::new()?;
    harness.run(json!({"name": "items", "ns": "prf-test2", "op": "create"}), json!([{"sku": "A"}]))?;
    assert_eq!(harness.registry.namespaces(), vec!["prftest2".to_string()]);
    assert!(harness.registry.contains("prftest2", "items"));
    Ok(())
}

#[test]
fn job_log_is_merged_into_every_log_entry() -> Result<(), Box<dyn std::error::Error>> {
    let mut harness = TestRegistry::new()?;
    harness.run_with_job_log(
        json!({"name": "items", "op": "create"}),
        json!([{"sku": "A", "log": {"job": "manual", "line": 3}}]),
        record(json!({"job": "nightly"})),
    )?;

    let backend = harness.registry.get("default", "items").ok_or("items is not registered")?;
    let rows = backend.get_collection(&MatchQuery::new())?;
    let row = rows.iter().next().ok_or("nothing stored")?.to_record();
    assert_eq!(row.get("logs"), Some(&json!([{"job": "nightly", "line": 3}])));
    Ok(())
}

#[test]
fn unknown_options_fail_before_anything_runs() -> Result<(), Box<dyn std::error::Error>> {
    let mut harness = TestRegistry::new()?;
    let result = harness.run(
        json!({"name": "items", "op": "create", "colour": "red", "fail_on_error": false}),
        json!([{"sku": "A"}]),
    );
    match result {
        Err(EngineError::InvalidOperation(keys)) => assert_eq!(keys, vec!["colour".to_string()]),
        other => panic!("expected InvalidOperation, got {other:?}"),
    }
    assert!(harness.registry.is_empty());
    Ok(())
}
