//! trackgraph CLI - Import GPX tracks into a conflated graph
//!
//! Usage:
//!   trackgraph-cli import <folder> [--db <path>] [--radius-degrees <r> | --radius-meters <m>]
//!   trackgraph-cli summary --db <path>
//!
//! Tracks are imported in filename order. The first track into an empty
//! graph seeds it; every later track is conflated against it.

use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use trackgraph::{
    source::GpxDirSource, ConflationConfig, ConflationError, GraphStore, MatchPolicy, NodeIndex,
    ProximityRadius, SqliteGraphStore, TrackImporter,
};

#[derive(Parser)]
#[command(name = "trackgraph-cli")]
#[command(about = "Conflate GPX tracks into a spatial graph", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose debug output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Import every GPX file of a folder
    Import {
        /// Folder containing GPX files
        folder: PathBuf,

        /// SQLite database to import into (in-memory if omitted)
        #[arg(long)]
        db: Option<PathBuf>,

        /// JSON file with a conflation config
        #[arg(long)]
        config: Option<PathBuf>,

        /// Proximity radius in degrees (planar)
        #[arg(long, conflicts_with = "radius_meters")]
        radius_degrees: Option<f64>,

        /// Proximity radius in meters (haversine)
        #[arg(long)]
        radius_meters: Option<f64>,

        /// How to treat several candidates within the radius
        #[arg(long, value_enum)]
        policy: Option<PolicyArg>,

        /// Distance margin below which two candidates tie (unique-nearest only)
        #[arg(long)]
        tie_tolerance: Option<f64>,
    },

    /// Show node and edge totals of a database
    Summary {
        /// SQLite database to inspect
        #[arg(long)]
        db: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    UniqueWithinRadius,
    UniqueNearest,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format(|buf, record| writeln!(buf, "[{:5}] {}", record.level(), record.args()))
        .init();

    let result = match cli.command {
        Commands::Import {
            folder,
            db,
            config,
            radius_degrees,
            radius_meters,
            policy,
            tie_tolerance,
        } => build_config(config, radius_degrees, radius_meters, policy, tie_tolerance)
            .and_then(|config| run_import(&folder, db.as_deref(), config)),
        Commands::Summary { db } => run_summary(&db),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Merge the config file (if any) with command-line overrides.
fn build_config(
    path: Option<PathBuf>,
    radius_degrees: Option<f64>,
    radius_meters: Option<f64>,
    policy: Option<PolicyArg>,
    tie_tolerance: Option<f64>,
) -> Result<ConflationConfig, ConflationError> {
    let mut config = match path {
        Some(path) => ConflationConfig::from_json_file(&path)?,
        None => ConflationConfig::default(),
    };

    if let Some(r) = radius_degrees {
        config.radius = ProximityRadius::Degrees(r);
    }
    if let Some(m) = radius_meters {
        config.radius = ProximityRadius::Meters(m);
    }
    if let Some(policy) = policy {
        config.policy = match policy {
            PolicyArg::UniqueWithinRadius => MatchPolicy::UniqueWithinRadius,
            PolicyArg::UniqueNearest => MatchPolicy::UniqueNearest { tie_tolerance: 0.0 },
        };
    }
    if let Some(tolerance) = tie_tolerance {
        match &mut config.policy {
            MatchPolicy::UniqueNearest { tie_tolerance } => *tie_tolerance = tolerance,
            MatchPolicy::UniqueWithinRadius => {
                return Err(ConflationError::Config(
                    "--tie-tolerance requires the unique-nearest policy".to_string(),
                ))
            }
        }
    }

    config.validate()?;
    Ok(config)
}

/// Run the import of a GPX folder
fn run_import(
    folder: &Path,
    db: Option<&Path>,
    config: ConflationConfig,
) -> Result<(), ConflationError> {
    println!("\n{}", "=".repeat(60));
    println!("Importing GPX files from: {}", folder.display());
    println!("{}", "=".repeat(60));
    println!(
        "  radius: {}{}, policy: {:?}",
        config.radius.value(),
        config.radius.unit(),
        config.policy
    );

    let store = match db {
        Some(path) => SqliteGraphStore::open(&path.to_string_lossy())?,
        None => SqliteGraphStore::in_memory()?,
    };
    let mut index = NodeIndex::new();
    index.rebuild(&store)?;
    println!(
        "  Existing graph: {} nodes, {} edges",
        store.node_count()?,
        store.edge_count()?
    );

    let mut source = GpxDirSource::open(folder)?;
    println!("  Tracks to import: {}", source.remaining());

    let mut importer = TrackImporter::new(store, index, config);
    let reports = importer.import_source(&mut source);

    println!("\n{}", "-".repeat(60));
    println!("RESULTS");
    println!("{}", "-".repeat(60));

    let mut failed = 0;
    for report in &reports {
        match &report.result {
            Ok(summary) => println!(
                "  [OK]  {} ({}) - {} points, {} new, {} merged, {} edges, {} nodes touched",
                report.track_id,
                report.mode.map(|m| m.to_string()).unwrap_or_default(),
                summary.points,
                summary.nodes_created,
                summary.nodes_merged,
                summary.edges_created,
                summary.nodes_touched()
            ),
            Err(e) => {
                failed += 1;
                println!("  [ERR] {} - {}", report.track_id, e);
            }
        }
    }

    let store = importer.store();
    println!(
        "\nImported {} of {} tracks",
        reports.len() - failed,
        reports.len()
    );
    println!(
        "Graph: {} nodes, {} edges",
        store.node_count()?,
        store.edge_count()?
    );
    Ok(())
}

/// Print totals of an existing database
fn run_summary(db: &Path) -> Result<(), ConflationError> {
    let store = SqliteGraphStore::open(&db.to_string_lossy())?;
    println!("Database: {}", store.path());
    println!("  Nodes: {}", store.node_count()?);
    println!("  Edges: {}", store.edge_count()?);
    match store.mean_speed()? {
        Some(speed) => println!("  Mean speed: {:.2} m/s", speed),
        None => println!("  Mean speed: n/a"),
    }
    Ok(())
}
