//! Command line driver: merge Li & Lim instances into one multi-company problem
//! and run the negotiation on it.

use clap::Parser;
use log::info;
use lsp_exchange::config::Config;
use lsp_exchange::problem::Problem;
use lsp_exchange::utils::{format_duration, print_solution_visualization, save_report, RunStatistics};
use lsp_exchange::Negotiator;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Route exchange negotiation between logistics service providers")]
struct Args {
    /// Li & Lim instance file, one per company
    #[arg(short, long = "instance", required = true)]
    instances: Vec<PathBuf>,

    /// Coordinate offset `x,y` of the matching instance (default 0,0)
    #[arg(long = "offset", value_parser = parse_offset)]
    offsets: Vec<(f64, f64)>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run fleet-wide exchanges between companies
    #[arg(long)]
    cross_company: bool,

    /// Migrate contested tasks between companies
    #[arg(long)]
    reallocation: bool,

    /// Directory for the viewer snapshots
    #[arg(long)]
    export_dir: Option<PathBuf>,

    /// Text report of the final routes
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print an ASCII plot of the final routes
    #[arg(long)]
    plot: bool,
}

fn parse_offset(value: &str) -> Result<(f64, f64), String> {
    let (x, y) = value
        .split_once(',')
        .ok_or_else(|| format!("expected `x,y`, got `{value}`"))?;
    let x = x.trim().parse::<f64>().map_err(|e| e.to_string())?;
    let y = y.trim().parse::<f64>().map_err(|e| e.to_string())?;
    Ok((x, y))
}

fn instance_name(instances: &[PathBuf]) -> String {
    instances
        .iter()
        .filter_map(|p| p.file_stem())
        .map(|s| s.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("_")
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.offsets.len() > args.instances.len() {
        return Err(format!(
            "{} offsets given for {} instances",
            args.offsets.len(),
            args.instances.len()
        )
        .into());
    }

    let name = instance_name(&args.instances);
    let files: Vec<(PathBuf, (f64, f64))> = args
        .instances
        .iter()
        .enumerate()
        .map(|(i, path)| (path.clone(), args.offsets.get(i).copied().unwrap_or((0.0, 0.0))))
        .collect();

    info!("Loading {} instance files as {}", files.len(), name);
    let problem = Problem::from_lilim_files(name.clone(), &files)?;
    info!(
        "Loaded {} nodes, {} pairs, {} companies",
        problem.nodes.len(),
        problem.pairs.len(),
        problem.companies.len()
    );

    let mut config = match &args.config {
        Some(path) => Config::from_json_file(path)?,
        None => Config::new(),
    };
    if args.cross_company {
        config = config.with_cross_company_exchange(true);
    }
    if args.reallocation {
        config = config.with_reallocation(true);
    }
    if let Some(dir) = &args.export_dir {
        config = config.with_export(dir.clone(), &name);
    }

    let negotiator = Negotiator::new(problem, config);
    let report = negotiator.run()?;

    let statistics = RunStatistics {
        runtime: report.run_time,
        baseline_cost: report.baseline_cost(),
        allocated_cost: report.allocated_cost(),
        final_cost: report.final_cost(),
        negotiation_rounds: report.negotiation_rounds,
        migrations: report.reallocation.as_ref().map_or(0, |r| r.migrations.len()),
        unserved_pairs: report.unserved.len(),
    };
    println!("{}", statistics.format());
    println!("Completed in {}", format_duration(report.run_time));

    if let Some(path) = &args.output {
        info!("Saving report to: {}", path.display());
        save_report(&report.state, &negotiator.problem, &report.baseline_costs, path)?;
    }

    if args.plot {
        print_solution_visualization(&report.state, &negotiator.problem, &negotiator.problem.fleet());
    }

    Ok(())
}
