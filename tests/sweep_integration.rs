//! End-to-end sweeps against simulated instruments built from a config file.

use qtmlab::config::LabConfig;
use qtmlab::data::DataTail;
use qtmlab::error::LabError;
use qtmlab::instrument::InstrumentRegistry;
use qtmlab::measurement::{MeasurementList, MeasurementSession, SweepSpec};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn config(data_dir: &Path) -> LabConfig {
    LabConfig::from_toml_str(&format!(
        r#"
        [measurement]
        move_step = "1ms"
        settle_wait = "1ms"
        settle_timeout = "2s"

        [storage]
        data_dir = "{}"

        [[instruments]]
        id = "source"
        type = "simulated"
        [instruments.options]
        resistance = 100.0
        lag_reads = 2

        [[instruments]]
        id = "gate"
        type = "simulated"
        [instruments.options]
        outputs = ["vg"]
        "#,
        data_dir.display()
    ))
    .unwrap()
}

#[tokio::test]
async fn sweep_writes_metadata_header_and_rows() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let registry = InstrumentRegistry::from_config(&config).await.unwrap();
    let source = registry.get("source").unwrap();
    let gate = registry.get("gate").unwrap();

    let list = MeasurementList::new()
        .with("I", source.clone(), "current")
        .unwrap()
        .with("Vg", gate, "vg")
        .unwrap();
    let spec = SweepSpec::new(source.clone(), "dcv", 0.0, 0.2, 10.0, 5);

    let session = MeasurementSession::from_config(&config);
    let path = session
        .sweep(&spec, &list, Path::new("iv.dat"))
        .await
        .unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    assert!(content.starts_with("# {"));
    assert!(content.contains("\"primitive\": \"sweep\""));

    let data = DataTail::read_all(&path).unwrap();
    assert_eq!(data.header, vec!["sweepdev", "I", "Vg"]);
    assert_eq!(data.column(0), vec![0.0, 0.05, 0.1, 0.15, 0.2]);
    assert_eq!(data.column(1), vec![0.0, 0.0005, 0.001, 0.0015, 0.002]);
    assert_eq!(data.column(2), vec![0.0; 5]);
    assert_eq!(source.read("dcv").await.unwrap(), 0.2);
}

#[tokio::test]
async fn second_sweep_gets_new_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let registry = InstrumentRegistry::from_config(&config).await.unwrap();
    let gate = registry.get("gate").unwrap();
    let list = MeasurementList::new();
    let spec = SweepSpec::new(gate, "vg", 0.0, 0.01, 1.0, 2).with_label("Vg");
    let session = MeasurementSession::from_config(&config);

    let first = session.sweep(&spec, &list, Path::new("gate.dat")).await.unwrap();
    let second = session.sweep(&spec, &list, Path::new("gate.dat")).await.unwrap();
    let third = session.sweep(&spec, &list, Path::new("gate.dat")).await.unwrap();

    assert_eq!(first, dir.path().join("gate.dat"));
    assert_eq!(second, dir.path().join("gate_1.dat"));
    assert_eq!(third, dir.path().join("gate_1_1.dat"));
}

#[tokio::test]
async fn sweeping_a_read_only_variable_fails_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let registry = InstrumentRegistry::from_config(&config).await.unwrap();
    let source = registry.get("source").unwrap();
    let spec = SweepSpec::new(source, "current", 0.0, 1.0, 1.0, 3);

    let result = MeasurementSession::from_config(&config)
        .sweep(&spec, &MeasurementList::new(), Path::new("bad.dat"))
        .await;
    assert!(matches!(result, Err(LabError::NotWritable { .. })));
    assert!(!dir.path().join("bad.dat").exists());
}

#[tokio::test]
async fn stop_request_aborts_a_running_sweep() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let registry = Arc::new(InstrumentRegistry::from_config(&config).await.unwrap());
    let source = registry.get("source").unwrap();
    let list = MeasurementList::new()
        .with("I", source.clone(), "current")
        .unwrap();
    // 1 V/s over 0.1 V steps keeps every point busy for ~100 ms
    let spec = SweepSpec::new(source, "dcv", 0.0, 10.0, 1.0, 101);

    let session = MeasurementSession::from_config(&config);
    let control = session.control().clone();
    let sweep = tokio::spawn(async move {
        session.sweep(&spec, &list, Path::new("long.dat")).await
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    control.stop("test");
    let result = sweep.await.unwrap();
    assert!(matches!(result, Err(LabError::Aborted)));

    // rows written before the stop are kept
    let data = DataTail::read_all(dir.path().join("long.dat")).unwrap();
    assert!(data.len() < 101);
}

#[tokio::test]
async fn live_reader_follows_a_running_sweep() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let registry = InstrumentRegistry::from_config(&config).await.unwrap();
    let source = registry.get("source").unwrap();
    let list = MeasurementList::new()
        .with("I", source.clone(), "current")
        .unwrap();
    let spec = SweepSpec::new(source, "dcv", 0.0, 0.5, 5.0, 26);

    let session = MeasurementSession::from_config(&config);
    let sweep = tokio::spawn(async move {
        session.sweep(&spec, &list, Path::new("live.dat")).await
    });

    let path = dir.path().join("live.dat");
    let mut tail = DataTail::new(&path);
    let mut rows = Vec::new();
    while !sweep.is_finished() {
        if path.exists() {
            rows.extend(tail.poll().unwrap().rows);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    sweep.await.unwrap().unwrap();
    rows.extend(tail.poll().unwrap().rows);

    assert_eq!(rows.len(), 26);
    assert!(rows.iter().all(|row| row.len() == 2));
    assert_eq!(rows.last().unwrap()[0], 0.5);
}
