//! Tests for snapshot export and the viewer index.

use lsp_exchange::export::{write_index, RoundObserver, Snapshot, SnapshotRecorder, StateExporter};
use lsp_exchange::problem::{Company, Node, PickupDelivery, Problem};
use lsp_exchange::solution::{AllocationState, Route};
use std::fs;
use tempfile::tempdir;

fn create_test_problem() -> Problem {
    let nodes = vec![
        Node::new(0, 0.0, 0.0, 0.0),
        Node::new(1, 30.0, 0.0, 0.0),
        Node::new(2, 5.0, 5.0, 1.0).with_time_window(0.0, 100.0, 2.0),
        Node::new(3, 10.0, 5.0, -1.0),
    ];
    let pairs = vec![PickupDelivery::new(2, 3, 0)];
    let companies = vec![Company::new(0, 1, 10.0), Company::new(1, 2, 10.0)];

    Problem::new("ExportTest".to_string(), nodes, pairs, companies).unwrap()
}

fn create_state() -> AllocationState {
    AllocationState::new(vec![
        Route::new(vec![0, 2, 3, 0]),
        Route::depot_only(1),
        Route::depot_only(1),
    ])
}

#[test]
fn test_snapshot_contents() {
    let problem = create_test_problem();
    let snapshot = Snapshot::new(&problem, &create_state(), 3, "case");

    assert_eq!(snapshot.customers.len(), 4);
    assert_eq!(snapshot.customers[2].ready, Some(0.0));
    assert_eq!(snapshot.customers[2].service, 2.0);
    assert_eq!(snapshot.customers[3].due, None);
    assert_eq!(snapshot.routes[0], vec![0, 2, 3, 0]);
    assert_eq!(snapshot.pd_pairs.get(&2), Some(&3));
    assert_eq!(snapshot.depot_id_list, vec![0, 1]);
    assert_eq!(snapshot.vehicle_num_list, vec![1, 2]);
    assert_eq!(snapshot.step_index, 3);
    assert_eq!(snapshot.instance_name, "case");
}

#[test]
fn test_export_and_read_back() {
    let dir = tempdir().unwrap();
    let problem = create_test_problem();
    let state = create_state();
    let exporter = StateExporter::new(dir.path(), "case");

    let path = exporter.export(&problem, &state, 0).unwrap();

    assert_eq!(path, dir.path().join("case").join("step_0.json"));
    assert_eq!(exporter.read(0).unwrap(), Snapshot::new(&problem, &state, 0, "case"));

    let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    for key in [
        "customers",
        "routes",
        "PD_pairs",
        "depot_id_list",
        "vehicle_num_list",
        "step_index",
        "instance_name",
    ] {
        assert!(raw.get(key).is_some(), "missing key {}", key);
    }
}

#[test]
fn test_rewriting_a_step_is_idempotent() {
    let dir = tempdir().unwrap();
    let problem = create_test_problem();
    let state = create_state();
    let exporter = StateExporter::new(dir.path(), "case");

    let path = exporter.export(&problem, &state, 1).unwrap();
    let first = fs::read_to_string(&path).unwrap();
    exporter.export(&problem, &state, 1).unwrap();
    let second = fs::read_to_string(&path).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_step_zero_clears_previous_run() {
    let dir = tempdir().unwrap();
    let problem = create_test_problem();
    let state = create_state();
    let exporter = StateExporter::new(dir.path(), "case");

    for step in 0..3 {
        exporter.export(&problem, &state, step).unwrap();
    }
    exporter.export(&problem, &state, 0).unwrap();

    assert!(exporter.step_path(0).exists());
    assert!(!exporter.step_path(1).exists());
    assert!(!exporter.step_path(2).exists());
}

#[test]
fn test_index_lists_cases_and_numeric_steps() {
    let dir = tempdir().unwrap();
    let problem = create_test_problem();
    let state = create_state();

    let second = StateExporter::new(dir.path(), "b_case");
    for step in 0..12 {
        second.export(&problem, &state, step).unwrap();
    }
    let first = StateExporter::new(dir.path(), "a_case");
    first.export(&problem, &state, 0).unwrap();
    fs::write(first.instance_dir().join("notes.txt"), "ignored").unwrap();

    let index = write_index(dir.path()).unwrap();

    assert_eq!(index.cases.len(), 2);
    assert_eq!(index.cases[0].name, "a_case");
    assert_eq!(index.cases[0].steps, vec!["step_0.json"]);
    assert_eq!(index.cases[1].name, "b_case");
    assert_eq!(index.cases[1].steps.len(), 12);
    assert_eq!(index.cases[1].steps[2], "step_2.json");
    assert_eq!(index.cases[1].steps[10], "step_10.json");

    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(dir.path().join("index.json")).unwrap()).unwrap();
    assert_eq!(written["cases"][1]["name"], "b_case");
}

#[test]
fn test_recorder_numbers_steps() {
    let dir = tempdir().unwrap();
    let problem = create_test_problem();
    let state = create_state();
    let mut recorder = SnapshotRecorder::new(StateExporter::new(dir.path(), "case"));

    recorder.observe(&problem, &state);
    recorder.observe(&problem, &state);
    recorder.observe(&problem, &state);

    assert_eq!(recorder.steps(), 3);
    assert_eq!(recorder.exporter().read(2).unwrap().step_index, 2);
}
