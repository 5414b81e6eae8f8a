//! Problem definition: nodes, pickup-delivery tasks, companies and their fleets.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::ops::Range;
use std::path::Path;

/// Service time window of a node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub ready: f64,
    pub due: f64,
}

/// A depot or a pickup/delivery location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: usize,
    pub x: f64,
    pub y: f64,
    /// Load change when the node is served (positive at pickups, negative at deliveries, 0 at depots).
    pub demand: f64,
    pub time_window: Option<TimeWindow>,
    pub service: f64,
}

impl Node {
    /// Create a new node without time window and service time.
    pub fn new(id: usize, x: f64, y: f64, demand: f64) -> Self {
        Node {
            id,
            x,
            y,
            demand,
            time_window: None,
            service: 0.0,
        }
    }

    /// Attach a time window and a service duration.
    pub fn with_time_window(mut self, ready: f64, due: f64, service: f64) -> Self {
        self.time_window = Some(TimeWindow { ready, due });
        self.service = service;
        self
    }

    /// Calculate the Euclidean distance between two nodes.
    pub fn distance(&self, other: &Node) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// A transport task: the pickup must be visited before the delivery, by the same vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PickupDelivery {
    pub pickup: usize,
    pub delivery: usize,
    /// Company whose own order book contained this task before any allocation.
    pub origin: usize,
}

impl PickupDelivery {
    pub fn new(pickup: usize, delivery: usize, origin: usize) -> Self {
        PickupDelivery {
            pickup,
            delivery,
            origin,
        }
    }

    pub fn contains(&self, node: usize) -> bool {
        self.pickup == node || self.delivery == node
    }
}

/// A logistics service provider: one depot and a fleet of identical vehicles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub depot: usize,
    pub vehicles: usize,
    pub capacity: f64,
}

impl Company {
    pub fn new(depot: usize, vehicles: usize, capacity: f64) -> Self {
        Company {
            depot,
            vehicles,
            capacity,
        }
    }
}

/// Maps global vehicle slots to the companies owning them.
///
/// Company `c` owns the contiguous range `vehicles_of(c)` of the global route array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetIndex {
    starts: Vec<usize>,
    company_of: Vec<usize>,
}

impl FleetIndex {
    /// Build the lookup from the per-company vehicle counts.
    pub fn new(vehicle_counts: &[usize]) -> Self {
        let mut starts = Vec::with_capacity(vehicle_counts.len() + 1);
        let mut company_of = Vec::new();
        let mut offset = 0;

        for (company, &count) in vehicle_counts.iter().enumerate() {
            starts.push(offset);
            company_of.extend(std::iter::repeat(company).take(count));
            offset += count;
        }
        starts.push(offset);

        FleetIndex { starts, company_of }
    }

    /// Company owning the given vehicle slot.
    pub fn company_of(&self, vehicle: usize) -> usize {
        self.company_of[vehicle]
    }

    /// Vehicle slots of a company.
    pub fn vehicles_of(&self, company: usize) -> Range<usize> {
        self.starts[company]..self.starts[company + 1]
    }

    pub fn vehicle_count(&self) -> usize {
        self.company_of.len()
    }

    pub fn company_count(&self) -> usize {
        self.starts.len() - 1
    }
}

/// A multi-company pickup-and-delivery instance.
#[derive(Debug, Clone)]
pub struct Problem {
    pub name: String,
    pub nodes: Vec<Node>,
    pub pairs: Vec<PickupDelivery>,
    pub companies: Vec<Company>,
    /// Node id -> position in `nodes`, `usize::MAX` for unused ids.
    position: Vec<usize>,
    distance_matrix: Vec<Vec<f64>>,
    pair_by_node: HashMap<usize, usize>,
}

impl Problem {
    /// Create a new problem, validating node ids and company depots.
    ///
    /// Pairs are stored as given; pairs referencing unknown nodes are reported
    /// and skipped later by the allocator.
    pub fn new(
        name: String,
        nodes: Vec<Node>,
        pairs: Vec<PickupDelivery>,
        companies: Vec<Company>,
    ) -> Result<Self> {
        let max_id = nodes.iter().map(|n| n.id).max().unwrap_or(0);
        let mut position = vec![usize::MAX; max_id + 1];

        for (pos, node) in nodes.iter().enumerate() {
            if position[node.id] != usize::MAX {
                return Err(Error::DuplicateNode(node.id));
            }
            position[node.id] = pos;
        }

        for (index, company) in companies.iter().enumerate() {
            if company.depot >= position.len() || position[company.depot] == usize::MAX {
                return Err(Error::InvalidCompany {
                    index,
                    reason: format!("depot {} is not a known node", company.depot),
                });
            }
            if company.vehicles == 0 {
                return Err(Error::InvalidCompany {
                    index,
                    reason: "a company needs at least one vehicle".to_string(),
                });
            }
        }

        let distance_matrix = Self::compute_distance_matrix(&nodes);

        let mut problem = Problem {
            name,
            nodes,
            pairs,
            companies,
            position,
            distance_matrix,
            pair_by_node: HashMap::new(),
        };

        for (index, pair) in problem.pairs.iter().enumerate() {
            if problem.contains(pair.pickup) && problem.contains(pair.delivery) {
                problem.pair_by_node.insert(pair.pickup, index);
                problem.pair_by_node.insert(pair.delivery, index);
            }
        }

        Ok(problem)
    }

    /// Generate the full distance matrix for all nodes.
    fn compute_distance_matrix(nodes: &[Node]) -> Vec<Vec<f64>> {
        let n = nodes.len();
        let mut matrix = vec![vec![0.0; n]; n];

        for i in 0..n {
            for j in 0..n {
                if i != j {
                    matrix[i][j] = nodes[i].distance(&nodes[j]);
                }
            }
        }

        matrix
    }

    /// Check whether a node id exists.
    pub fn contains(&self, id: usize) -> bool {
        id < self.position.len() && self.position[id] != usize::MAX
    }

    /// Look up a node by id.
    pub fn node(&self, id: usize) -> Option<&Node> {
        if self.contains(id) {
            Some(&self.nodes[self.position[id]])
        } else {
            None
        }
    }

    /// Distance between two node ids. Panics if either id is unknown.
    pub fn distance(&self, from: usize, to: usize) -> f64 {
        self.distance_matrix[self.position[from]][self.position[to]]
    }

    /// Coordinates of a node. Panics if the id is unknown.
    pub fn coordinates(&self, id: usize) -> (f64, f64) {
        let node = &self.nodes[self.position[id]];
        (node.x, node.y)
    }

    /// Midpoint between the pickup and the delivery of a pair.
    pub fn midpoint(&self, pair: &PickupDelivery) -> (f64, f64) {
        let (px, py) = self.coordinates(pair.pickup);
        let (dx, dy) = self.coordinates(pair.delivery);
        ((px + dx) / 2.0, (py + dy) / 2.0)
    }

    /// Index of the (valid) pair a node belongs to.
    pub fn pair_of(&self, node: usize) -> Option<usize> {
        self.pair_by_node.get(&node).copied()
    }

    /// Whether both endpoints of a pair reference existing nodes.
    pub fn is_valid_pair(&self, pair: &PickupDelivery) -> bool {
        self.contains(pair.pickup) && self.contains(pair.delivery)
    }

    pub fn is_depot(&self, id: usize) -> bool {
        self.companies.iter().any(|c| c.depot == id)
    }

    pub fn depot_ids(&self) -> Vec<usize> {
        self.companies.iter().map(|c| c.depot).collect()
    }

    pub fn vehicle_counts(&self) -> Vec<usize> {
        self.companies.iter().map(|c| c.vehicles).collect()
    }

    /// Build the vehicle -> company lookup for this problem.
    pub fn fleet(&self) -> FleetIndex {
        FleetIndex::new(&self.vehicle_counts())
    }

    /// Merge several Li & Lim PDPTW instance files into one multi-company problem.
    ///
    /// Every file becomes one company. Coordinates of file `k` are shifted by
    /// `files[k].1`, node ids continue after the largest id of the previous file.
    pub fn from_lilim_files<P: AsRef<Path>>(name: String, files: &[(P, (f64, f64))]) -> Result<Self> {
        let mut nodes = Vec::new();
        let mut pairs = Vec::new();
        let mut companies = Vec::new();
        let mut id_offset = 0;

        for (company, (path, offset)) in files.iter().enumerate() {
            let path = path.as_ref();
            let content = fs::read_to_string(path)?;
            let parsed = parse_lilim(path, &content, *offset, id_offset, company)?;

            id_offset = parsed.nodes.iter().map(|n| n.id).max().map_or(id_offset, |m| m + 1);
            companies.push(Company::new(parsed.depot, parsed.vehicles, parsed.capacity));
            nodes.extend(parsed.nodes);
            pairs.extend(parsed.pairs);
        }

        Problem::new(name, nodes, pairs, companies)
    }
}

struct LiLimInstance {
    nodes: Vec<Node>,
    pairs: Vec<PickupDelivery>,
    depot: usize,
    vehicles: usize,
    capacity: f64,
}

fn parse_lilim(
    path: &Path,
    content: &str,
    offset: (f64, f64),
    id_offset: usize,
    company: usize,
) -> Result<LiLimInstance> {
    let parse_error = |line: usize, message: String| Error::Parse {
        path: path.to_path_buf(),
        line,
        message,
    };

    let mut lines = content
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty());

    // Header: vehicle count, capacity, speed
    let (header_no, header) = lines
        .next()
        .ok_or_else(|| parse_error(1, "empty instance file".to_string()))?;
    let header: Vec<&str> = header.split_whitespace().collect();
    if header.len() < 2 {
        return Err(parse_error(header_no + 1, "expected `vehicles capacity [speed]`".to_string()));
    }
    let vehicles = header[0]
        .parse::<usize>()
        .map_err(|e| parse_error(header_no + 1, format!("vehicle count: {e}")))?;
    let capacity = header[1]
        .parse::<f64>()
        .map_err(|e| parse_error(header_no + 1, format!("capacity: {e}")))?;

    let mut nodes = Vec::new();
    let mut pairs = Vec::new();
    let mut depot = None;

    for (line_no, line) in lines {
        let fields: Vec<f64> = line
            .split_whitespace()
            .map(|f| f.parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|e| parse_error(line_no + 1, e.to_string()))?;

        if fields.len() < 9 {
            return Err(parse_error(line_no + 1, format!("expected 9 fields, found {}", fields.len())));
        }

        let id = fields[0] as usize + id_offset;
        let node = Node::new(id, fields[1] + offset.0, fields[2] + offset.1, fields[3])
            .with_time_window(fields[4], fields[5], fields[6]);
        let pickup_sibling = fields[7] as usize;
        let delivery_sibling = fields[8] as usize;

        if depot.is_none() {
            depot = Some(id);
        } else if pickup_sibling == 0 && delivery_sibling != 0 {
            pairs.push(PickupDelivery::new(id, delivery_sibling + id_offset, company));
        }

        nodes.push(node);
    }

    let depot = depot.ok_or_else(|| parse_error(1, "instance has no depot line".to_string()))?;

    Ok(LiLimInstance {
        nodes,
        pairs,
        depot,
        vehicles,
        capacity,
    })
}
