//! Synteny server worker main executable

pub mod common;
pub mod err;
pub mod load;
pub mod lookup;
pub mod search;
pub mod server;
pub mod store;
pub mod synteny;

use clap::{Args, Parser, Subcommand};
use console::{Emoji, Term};

/// CLI parser based on clap.
#[derive(Debug, Parser)]
#[command(
    author,
    version = common::VERSION,
    about = "Genome context viewer heavy lifting",
    long_about = "This tool performs the heavy lifting for genome context viewer deployments"
)]
struct Cli {
    /// Commonly used arguments
    #[command(flatten)]
    common: common::Args,

    /// The sub command to run
    #[command(subcommand)]
    command: Commands,
}

/// Enum supporting the parsing of top-level commands.
#[allow(clippy::large_enum_variant)]
#[derive(Debug, Subcommand)]
enum Commands {
    /// Loader-related commands.
    Load(Load),
    /// Server related commands.
    Server(Server),
}

/// Parsing of "load *" sub commands.
#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true)]
struct Load {
    /// The sub command to run
    #[command(subcommand)]
    command: LoadCommands,
}

/// Enum supporting the parsing of "load *" sub commands.
#[allow(clippy::large_enum_variant)]
#[derive(Debug, Subcommand)]
enum LoadCommands {
    Chado(load::chado::Args),
    Gff(load::gff::Args),
}

/// Parsing of "server *" sub commands.
#[derive(Debug, Args)]
#[command(args_conflicts_with_subcommands = true)]
struct Server {
    /// The sub command to run
    #[command(subcommand)]
    command: ServerCommands,
}

/// Enum supporting the parsing of "server *" sub commands.
#[derive(Debug, Subcommand)]
enum ServerCommands {
    Run(server::Args),
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Build a tracing subscriber according to the configuration in `cli.common`.
    let collector = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(match cli.common.verbose.log_level() {
            Some(level) => match level {
                log::Level::Error => tracing::Level::ERROR,
                log::Level::Warn => tracing::Level::WARN,
                log::Level::Info => tracing::Level::INFO,
                log::Level::Debug => tracing::Level::DEBUG,
                log::Level::Trace => tracing::Level::TRACE,
            },
            None => tracing::Level::INFO,
        })
        .compact()
        .finish();

    // Install collector and go into sub commands.
    let term = Term::stderr();
    tracing::subscriber::with_default(collector, || {
        match &cli.command {
            Commands::Load(load) => match &load.command {
                LoadCommands::Chado(args) => {
                    load::chado::run(&cli.common, args)?;
                }
                LoadCommands::Gff(args) => {
                    load::gff::run(&cli.common, args)?;
                }
            },
            Commands::Server(server) => match &server.command {
                ServerCommands::Run(args) => {
                    server::run(&cli.common, args)?;
                }
            },
        }

        Ok::<(), anyhow::Error>(())
    })?;
    term.write_line(&format!("All done. Have a nice day!{}", Emoji(" 😃", "")))?;

    Ok(())
}
