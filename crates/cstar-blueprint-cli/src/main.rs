mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use cstar_blueprint::LoaderConfig;

#[derive(Parser, Debug)]
#[command(name = "cstar-blueprint", version, about = "Validate and inspect C-Star blueprints")]
struct Args {
    /// Loader configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load and validate blueprint files
    Validate {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Summarize a blueprint
    Show { file: PathBuf },
    /// Print a blueprint in the current layout
    Normalize { file: PathBuf },
    /// List dataset references
    Datasets {
        file: PathBuf,
        /// Only this component
        #[arg(long)]
        component: Option<String>,
        /// Run window start, e.g. "2012-01-03 12:00:00"
        #[arg(long, requires = "end")]
        start: Option<String>,
        /// Run window end
        #[arg(long, requires = "start")]
        end: Option<String>,
    },
    /// List blueprints in a directory
    List { dir: Option<PathBuf> },
    /// Check downloaded files against their references
    Verify {
        file: PathBuf,
        #[arg(required = true)]
        data_files: Vec<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = LoaderConfig::load(args.config.as_deref())?;

    let status = match args.command {
        Command::Validate { files } => commands::validate(&files, &config),
        Command::Show { file } => commands::show(&file, &config)?,
        Command::Normalize { file } => commands::normalize(&file, &config)?,
        Command::Datasets {
            file,
            component,
            start,
            end,
        } => commands::datasets(&file, component.as_deref(), start.zip(end), &config)?,
        Command::List { dir } => commands::list(dir, &config)?,
        Command::Verify { file, data_files } => commands::verify(&file, &data_files, &config)?,
    };

    if status != 0 {
        std::process::exit(status);
    }
    Ok(())
}
