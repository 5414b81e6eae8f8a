//! JSON snapshots of the fleet state for the route viewer.
//!
//! Layout: `<root>/<instance>/step_<n>.json` per step and `<root>/index.json`
//! listing every instance directory with its steps.

use crate::error::Result;
use crate::problem::Problem;
use crate::solution::AllocationState;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// A node as the viewer expects it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotNode {
    pub id: usize,
    pub x: f64,
    pub y: f64,
    pub demand: f64,
    pub ready: Option<f64>,
    pub due: Option<f64>,
    pub service: f64,
}

/// Full state of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub customers: Vec<SnapshotNode>,
    pub routes: Vec<Vec<usize>>,
    /// Pickup id -> delivery id
    #[serde(rename = "PD_pairs")]
    pub pd_pairs: BTreeMap<usize, usize>,
    pub depot_id_list: Vec<usize>,
    pub vehicle_num_list: Vec<usize>,
    pub step_index: usize,
    pub instance_name: String,
}

impl Snapshot {
    pub fn new(problem: &Problem, state: &AllocationState, step: usize, instance_name: &str) -> Self {
        let customers = problem
            .nodes
            .iter()
            .map(|n| SnapshotNode {
                id: n.id,
                x: n.x,
                y: n.y,
                demand: n.demand,
                ready: n.time_window.map(|tw| tw.ready),
                due: n.time_window.map(|tw| tw.due),
                service: n.service,
            })
            .collect();

        let pd_pairs = problem
            .pairs
            .iter()
            .filter(|p| problem.is_valid_pair(p))
            .map(|p| (p.pickup, p.delivery))
            .collect();

        Snapshot {
            customers,
            routes: state.routes.iter().map(|r| r.nodes.clone()).collect(),
            pd_pairs,
            depot_id_list: problem.depot_ids(),
            vehicle_num_list: problem.vehicle_counts(),
            step_index: step,
            instance_name: instance_name.to_string(),
        }
    }
}

/// Writes the snapshots of one instance.
#[derive(Debug, Clone)]
pub struct StateExporter {
    root: PathBuf,
    instance_name: String,
}

impl StateExporter {
    pub fn new<P: Into<PathBuf>>(root: P, instance_name: &str) -> Self {
        StateExporter {
            root: root.into(),
            instance_name: instance_name.to_string(),
        }
    }

    pub fn instance_dir(&self) -> PathBuf {
        self.root.join(&self.instance_name)
    }

    pub fn step_path(&self, step: usize) -> PathBuf {
        self.instance_dir().join(format!("step_{step}.json"))
    }

    /// Write the snapshot of a step, replacing any previous file for it.
    ///
    /// Step 0 starts a new sequence and removes the instance's older snapshots.
    pub fn export(&self, problem: &Problem, state: &AllocationState, step: usize) -> Result<PathBuf> {
        let dir = self.instance_dir();
        if step == 0 && dir.exists() {
            debug!("Clearing previous snapshots in {}", dir.display());
            fs::remove_dir_all(&dir)?;
        }
        fs::create_dir_all(&dir)?;

        let snapshot = Snapshot::new(problem, state, step, &self.instance_name);
        let path = self.step_path(step);
        fs::write(&path, serde_json::to_string_pretty(&snapshot)?)?;

        debug!("Snapshot written to {}", path.display());
        Ok(path)
    }

    /// Load a previously written step.
    pub fn read(&self, step: usize) -> Result<Snapshot> {
        let content = fs::read_to_string(self.step_path(step))?;
        Ok(serde_json::from_str(&content)?)
    }
}

/// One instance entry of `index.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexCase {
    pub name: String,
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub cases: Vec<IndexCase>,
}

/// Scan `root` for instance directories and write `root/index.json`.
///
/// Cases are sorted by name, steps by their numeric index.
pub fn write_index<P: AsRef<Path>>(root: P) -> Result<Index> {
    let root = root.as_ref();
    let mut cases = Vec::new();

    let mut dirs: Vec<PathBuf> = fs::read_dir(root)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();

    for dir in dirs {
        let mut steps: Vec<(usize, String)> = fs::read_dir(&dir)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter_map(|name| {
                let index = name.strip_prefix("step_")?.strip_suffix(".json")?.parse().ok()?;
                Some((index, name))
            })
            .collect();
        steps.sort();

        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        cases.push(IndexCase {
            name,
            steps: steps.into_iter().map(|(_, file)| file).collect(),
        });
    }

    let index = Index { cases };
    fs::write(root.join("index.json"), serde_json::to_string_pretty(&index)?)?;
    info!("Index of {} instance(s) written to {}", index.cases.len(), root.display());

    Ok(index)
}

/// Receives the fleet state after every negotiation round.
pub trait RoundObserver {
    fn observe(&mut self, problem: &Problem, state: &AllocationState);
}

/// Ignores every round.
impl RoundObserver for () {
    fn observe(&mut self, _problem: &Problem, _state: &AllocationState) {}
}

/// Exports each observed state as the next step.
pub struct SnapshotRecorder {
    exporter: StateExporter,
    next_step: usize,
}

impl SnapshotRecorder {
    pub fn new(exporter: StateExporter) -> Self {
        SnapshotRecorder {
            exporter,
            next_step: 0,
        }
    }

    /// Number of steps recorded so far.
    pub fn steps(&self) -> usize {
        self.next_step
    }

    pub fn exporter(&self) -> &StateExporter {
        &self.exporter
    }
}

impl RoundObserver for SnapshotRecorder {
    fn observe(&mut self, problem: &Problem, state: &AllocationState) {
        match self.exporter.export(problem, state, self.next_step) {
            Ok(_) => self.next_step += 1,
            Err(e) => warn!("Snapshot of step {} not written: {}", self.next_step, e),
        }
    }
}
