use std::error::Error;

use clap::Parser;
use env_logger::Builder;
use ipnetwork::IpNetwork;
use log::{debug, info, LevelFilter};
use serde::Serialize;

use ovn_speaker::cluster::SnapshotCluster;
use ovn_speaker::collector::collect_expected;
use ovn_speaker::config;
use ovn_speaker::rib::{route_diff, Family, PrefixSet, RouteMap};
use ovn_speaker::utils::format_list;

#[derive(Parser, Debug)]
#[clap(name = "ovn-speaker", rename_all = "kebab-case")]
/// BGP route announcement planner
pub struct Args {
    #[clap(subcommand)]
    pub cmd: Command,
    /// Show debug logs (additive for trace logs)
    #[clap(short, parse(from_occurrences), global = true)]
    pub verbose: u8,
}

#[derive(Parser, Debug)]
#[clap(rename_all = "kebab-case")]
pub enum Command {
    /// Show the routes a speaker would announce for a cluster snapshot
    Plan(PlanOptions),
}

#[derive(Parser, Debug)]
#[clap(rename_all = "kebab-case")]
pub struct PlanOptions {
    /// Path to speaker config.toml
    pub config_path: String,
    /// Path to a JSON cluster snapshot
    pub snapshot_path: String,
    /// Prefix currently announced (repeatable)
    #[clap(long)]
    pub announced: Vec<IpNetwork>,
    /// Print the plan as JSON
    #[clap(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct FamilyPlan {
    family: Family,
    expected: Vec<IpNetwork>,
    to_add: Vec<IpNetwork>,
    to_delete: Vec<IpNetwork>,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let (speaker_level, other_level) = match args.verbose {
        0 => (LevelFilter::Info, LevelFilter::Warn),
        1 => (LevelFilter::Debug, LevelFilter::Warn),
        2 => (LevelFilter::Trace, LevelFilter::Warn),
        _ => (LevelFilter::Trace, LevelFilter::Trace),
    };
    Builder::new()
        .filter(Some("ovn_speaker"), speaker_level)
        .filter(None, other_level)
        .init();
    debug!("Logging at levels {}/{}", speaker_level, other_level);

    match args.cmd {
        Command::Plan(opts) => plan(opts),
    }
}

fn plan(opts: PlanOptions) -> Result<(), Box<dyn Error>> {
    let config = config::from_file(&opts.config_path)?;
    let cluster = SnapshotCluster::from_file(&opts.snapshot_path)?;
    info!(
        "Planning for router-id {} from {}",
        config.router_id, opts.snapshot_path
    );

    let expected = collect_expected(&cluster, &config)?;
    let announced: RouteMap = opts.announced.into_iter().collect();
    let empty = PrefixSet::new();
    let plans: Vec<FamilyPlan> = Family::ALL
        .iter()
        .cloned()
        .map(|family| {
            let diff = route_diff(
                expected.get(family).unwrap_or(&empty),
                announced.get(family).unwrap_or(&empty),
            );
            FamilyPlan {
                family,
                expected: expected.prefixes(family),
                to_add: diff.to_add,
                to_delete: diff.to_delete,
            }
        })
        .collect();

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&plans)?);
        return Ok(());
    }
    for plan in &plans {
        println!("{}", plan.family);
        println!("  expected:  {}", format_list(&plan.expected));
        println!("  to add:    {}", format_list(&plan.to_add));
        println!("  to delete: {}", format_list(&plan.to_delete));
    }
    Ok(())
}
