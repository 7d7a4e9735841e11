use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::{Path, PathBuf};
use vpc_topology::output::{print_plan, print_report, print_subnets};
use vpc_topology::{load_config, logging, open_provider, topology, Executor};

#[derive(Parser, Debug)]
#[command(name = "vpc-topology")]
#[command(about = "Plan and apply a VPC web application topology")]
#[command(version)]
struct Args {
    /// Stack file (default: stack.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// State file of the dry-run engine (default: topology_state.json)
    #[arg(short, long)]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the subnet partition and zone assignment
    Subnets,
    /// Print the ordered plan
    Plan,
    /// Apply the plan against the dry-run engine
    Apply {
        /// Create independent resources concurrently
        #[arg(long)]
        parallel: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Do as little as possible in main.rs as it can't contain any tests
    dotenv::dotenv().ok();
    logging::init(Path::new(logging::LOG_CONFIG_FILE))?;
    let args = Args::parse();
    log::info!("#Start main() {:?}", args.command);

    let config = load_config(args.config.as_deref())?;
    let provider = open_provider(&config, args.state.as_deref())?;
    let plan = topology::plan(&config, &provider).await?;

    match args.command {
        Command::Subnets => print_subnets(&plan)?,
        Command::Plan => print_plan(&plan)?,
        Command::Apply { parallel } => {
            let report = Executor::new(&provider).parallel(parallel).apply(plan).await;
            match report {
                Ok(report) => print_report(&report),
                Err(e) => {
                    log::error!("Apply aborted: {e}");
                    return Err(e.into());
                }
            }
        }
    }

    log::info!("#End main()");
    Ok(())
}
