//! glue - generate TypeScript packages from layered interface schemas

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod cmds;

#[derive(Parser)]
#[command(name = "glue")]
#[command(about = "Interface schema compiler - validation, dependency analysis and TypeScript generation")]
#[command(version)]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate schema documents and generate every package
    Build {
        /// Schema documents, merged in the order given
        #[arg(short = 'f', long = "files", value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Output root for generated packages
        #[arg(
            short = 'o',
            long = "output",
            value_name = "DIR",
            default_value = "generated"
        )]
        output_dir: PathBuf,

        /// Generator options file (defaults to ./glue.yaml when present)
        #[arg(short = 'c', long = "config", value_name = "FILE")]
        config: Option<PathBuf>,

        /// Scope of generated package names, e.g. "@acme"
        #[arg(long = "package-scope", env = "GLUE_PACKAGE_SCOPE")]
        package_scope: Option<String>,

        /// Lock file serializing concurrent builds
        #[arg(long = "lock-path", value_name = "FILE", env = "GLUE_LOCK_PATH")]
        lock_path: Option<PathBuf>,
    },

    /// Load and validate schema documents without generating anything
    Check {
        /// Schema documents, merged in the order given
        #[arg(short = 'f', long = "files", value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Print the resolved schema as JSON
        #[arg(long = "print-schema")]
        print_schema: bool,
    },

    /// Print the order in which namespaces are emitted
    Graph {
        /// Schema documents, merged in the order given
        #[arg(short = 'f', long = "files", value_name = "FILE", required = true)]
        files: Vec<PathBuf>,
    },
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Build {
            files,
            output_dir,
            config,
            package_scope,
            lock_path,
        } => {
            let options = cmds::build::resolve_options(config, package_scope, lock_path)?;
            cmds::build::run(&files, &output_dir, &options)?;
        }

        Commands::Check {
            files,
            print_schema,
        } => {
            cmds::check::run(&files, print_schema)?;
        }

        Commands::Graph { files } => {
            cmds::graph::run(&files)?;
        }
    }

    Ok(())
}
