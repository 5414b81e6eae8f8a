//! Reporting helpers: rounding, percentages, text reports and console plots.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use crate::problem::{FleetIndex, Problem};
use crate::solution::AllocationState;

/// Format a duration as hours, minutes, and seconds.
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}h {:02}m {:02}s", hours, minutes, seconds)
}

/// Round to a number of decimal places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Relative cost reduction from `before` to `after`, in percent.
///
/// Zero when `before` is not positive.
pub fn improvement_pct(before: f64, after: f64) -> f64 {
    if before <= 0.0 {
        0.0
    } else {
        (before - after) / before * 100.0
    }
}

/// Save the per-company routes and costs of a state to a file.
pub fn save_report<P: AsRef<Path>>(
    state: &AllocationState,
    problem: &Problem,
    baseline: &[f64],
    path: P,
) -> std::io::Result<()> {
    let fleet = problem.fleet();
    let mut file = File::create(path)?;

    writeln!(file, "Route exchange result for instance: {}", problem.name)?;
    writeln!(file, "Total Distance: {:.2}", state.total_cost(problem))?;
    writeln!(file, "Unserved Pairs: {}", state.unserved_pairs(problem).len())?;
    writeln!(file)?;

    for (company, info) in problem.companies.iter().enumerate() {
        let cost = state.company_cost(problem, &fleet, company);
        write!(file, "Company #{} (depot {}): {:.2}", company + 1, info.depot, cost)?;
        match baseline.get(company) {
            Some(&before) => writeln!(file, " ({:+.2}% vs baseline)", improvement_pct(before, cost))?,
            None => writeln!(file)?,
        }

        for vehicle in fleet.vehicles_of(company) {
            let route = &state.routes[vehicle];
            write!(file, "  Vehicle #{}: ", vehicle + 1)?;

            if route.is_empty() {
                writeln!(file, "Empty")?;
                continue;
            }

            let path: Vec<String> = route.nodes.iter().map(|n| n.to_string()).collect();
            writeln!(file, "{}", path.join(" -> "))?;
            writeln!(file, "    Distance: {:.2}", route.cost(problem))?;
            writeln!(
                file,
                "    Peak Load: {:.2} / {:.2}",
                route.peak_load(problem),
                info.capacity
            )?;
        }
        writeln!(file)?;
    }

    Ok(())
}

/// Summary of a negotiation run.
pub struct RunStatistics {
    pub runtime: Duration,
    pub baseline_cost: f64,
    pub allocated_cost: f64,
    pub final_cost: f64,
    pub negotiation_rounds: u32,
    pub migrations: usize,
    pub unserved_pairs: usize,
}

impl RunStatistics {
    /// Format the statistics as a string.
    pub fn format(&self) -> String {
        format!(
            "Run Statistics:
- Runtime: {}
- Baseline Cost: {:.2}
- Cost After Allocation: {:.2}
- Final Cost: {:.2} ({:+.2}% vs baseline)
- Negotiation Rounds: {}
- Migrations: {}
- Unserved Pairs: {}",
            format_duration(self.runtime),
            self.baseline_cost,
            self.allocated_cost,
            self.final_cost,
            improvement_pct(self.baseline_cost, self.final_cost),
            self.negotiation_rounds,
            self.migrations,
            self.unserved_pairs
        )
    }
}

/// Print the served nodes to the console, one symbol per company.
pub fn print_solution_visualization(state: &AllocationState, problem: &Problem, fleet: &FleetIndex) {
    println!("Route Visualization for {}", problem.name);
    println!("Total Distance: {:.2}", state.total_cost(problem));
    println!("Number of Vehicles: {}", state.routes.len());
    println!();

    if problem.nodes.is_empty() {
        return;
    }

    // Find max and min coordinates for scaling
    let mut min_x = f64::MAX;
    let mut min_y = f64::MAX;
    let mut max_x = f64::MIN;
    let mut max_y = f64::MIN;

    for node in &problem.nodes {
        min_x = min_x.min(node.x);
        min_y = min_y.min(node.y);
        max_x = max_x.max(node.x);
        max_y = max_y.max(node.y);
    }

    let width = 80;
    let height = 25;
    let span_x = (max_x - min_x).max(1e-9);
    let span_y = (max_y - min_y).max(1e-9);
    let cell = |id: usize| {
        let (x, y) = problem.coordinates(id);
        let col = ((x - min_x) / span_x * (width as f64 - 1.0)) as usize;
        let row = ((y - min_y) / span_y * (height as f64 - 1.0)) as usize;
        (height - 1 - row, col)
    };

    let mut grid = vec![vec![' '; width]; height];
    let company_symbols = ['*', '+', 'x', '#', '@', '&', '%', '=', '^', '$'];

    for (vehicle, route) in state.routes.iter().enumerate() {
        let symbol = company_symbols[fleet.company_of(vehicle) % company_symbols.len()];
        for &node in route.customers() {
            let (row, col) = cell(node);
            grid[row][col] = symbol;
        }
    }

    for &depot in &problem.depot_ids() {
        let (row, col) = cell(depot);
        grid[row][col] = 'D';
    }

    for row in &grid {
        let line: String = row.iter().collect();
        println!("{}", line);
    }
    println!();

    println!("Legend:");
    println!("D - Depot");
    for company in 0..fleet.company_count().min(company_symbols.len()) {
        println!("{} - Company #{}", company_symbols[company], company + 1);
    }
    println!();
}
