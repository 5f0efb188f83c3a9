//! Production file generator for nexus simulation campaigns.
//!
//! Renders the init/config macros and the job script of every file of a
//! campaign from the templates in the production directory.
//
//  Example:  `prodgen --data-root /data/NEXT transparency real border`

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use prodgen::campaign::{Campaign, CATALOG};
use prodgen::generator::{run, FailurePolicy, GenerateOptions};

#[derive(Parser, Debug)]
#[command(name = "prodgen", version, about = "Generate nexus production macros and job scripts")]
struct Cli {
    /// Directory holding the `*.template` files
    #[arg(long, env = "PRODGEN_PROD_DIR", default_value = "prod", global = true)]
    prod_dir: PathBuf,

    /// Root under which campaign trees are created
    #[arg(long, env = "PRODGEN_DATA_ROOT", default_value = "data", global = true)]
    data_root: PathBuf,

    /// Override the campaign's total event count
    #[arg(long, global = true)]
    nevents: Option<u64>,

    /// Override the campaign's number of files
    #[arg(long, global = true)]
    nfiles: Option<u64>,

    /// Write files on all cores
    #[arg(long, global = true)]
    parallel: bool,

    /// Record failing files and continue instead of aborting
    #[arg(long, global = true)]
    keep_going: bool,

    /// Also write a CSV manifest of every generated file
    #[arg(long, global = true)]
    manifest: Option<PathBuf>,

    /// Do not draw a progress bar
    #[arg(long, global = true)]
    no_progress: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the known campaigns
    List,
    /// Geantino tracking through the mesh
    Geantino,
    /// EL mesh performance
    MeshPerformance {
        /// none | real | sagg
        meshtype: String,
    },
    /// Track orientation with respect to the EL plane
    Orientation {
        /// parallel | perpendicular
        orientation: String,
    },
    /// Photon tracking
    Photo {
        /// center | mid | border
        region: String,
    },
    /// Mesh transparency
    Transparency {
        /// none | real
        meshtype: String,
        /// center | mid | border
        region: String,
    },
    /// Mesh transparency with a sagging mesh
    TransparencySagg {
        /// Sagging distance in mm
        sagging: String,
        /// center | mid | border
        region: String,
    },
}

impl Command {
    fn campaign(&self) -> prodgen::Result<Option<Campaign>> {
        let c = match self {
            Command::List => return Ok(None),
            Command::Geantino => Campaign::geantino(),
            Command::MeshPerformance { meshtype } => Campaign::mesh_performance(meshtype)?,
            Command::Orientation { orientation } => Campaign::orientation(orientation)?,
            Command::Photo { region } => Campaign::photo(region)?,
            Command::Transparency { meshtype, region } => Campaign::transparency(meshtype, region)?,
            Command::TransparencySagg { sagging, region } => Campaign::transparency_sagg(sagging, region)?,
        };
        Ok(Some(c))
    }
}

fn print_catalog() {
    println!("{:<18} {:<34} {:>10} {:>6}  path", "campaign", "arguments", "nevents", "nfiles");
    for c in CATALOG {
        println!("{:<18} {:<34} {:>10} {:>6}  {}", c.name, c.args, c.nevents, c.nfiles, c.path);
    }
}

fn execute(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let Some(campaign) = cli.command.campaign()? else {
        print_catalog();
        return Ok(());
    };
    let campaign = campaign.with_events(cli.nevents, cli.nfiles);

    let options = GenerateOptions {
        parallel: cli.parallel,
        policy:   if cli.keep_going { FailurePolicy::KeepGoing } else { FailurePolicy::FailFast },
        progress: !cli.no_progress,
        manifest: cli.manifest.clone(),
    };

    let report = run(&campaign, &cli.prod_dir, &cli.data_root, &options)?;

    info!(
        campaign = %report.campaign,
        files_written = report.files_written,
        events_per_file = report.events_per_file,
        events_covered = report.events_covered(),
        dropped_events = report.dropped_events,
        "done"
    );
    for f in &report.failures {
        let artifact = f.artifact.map(|a| a.to_string()).unwrap_or_default();
        error!(index = f.index, %artifact, "{}", f.message);
    }
    if !report.is_success() {
        return Err(format!("{} of {} files failed", report.failures.len(), report.iterations).into());
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match execute(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
