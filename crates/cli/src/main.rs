//! STSV operator CLI.
//!
//! Thin wrapper over the `stsv-core` datastore plus a `server` command
//! that runs the HTTP backend. Structured logs go to standard error;
//! command output goes to standard out.

mod commands;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use stsv_core::Datastore;

#[derive(Parser)]
#[command(name = "stsv", about = "Versioned Terraform HTTP state backend", version)]
struct Cli {
    /// Data directory holding the state tree
    #[arg(short = 'd', long = "data-dir", env = "STSV_DATADIR")]
    data_dir: PathBuf,

    /// Log at DEBUG level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log at WARN level only
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List all state files
    Ls,
    /// Print live file contents
    Cat {
        /// Re-encode the content as normalized JSON
        #[arg(short = 'j', long)]
        json: bool,
        names: Vec<String>,
    },
    /// Store files as new versions
    Put {
        /// Prefix prepended to each stored name
        #[arg(short, long, default_value = "")]
        prefix: String,
        /// Lock id to present to locked files
        #[arg(long, default_value = "")]
        lock: String,
        /// Do not validate the content as JSON
        #[arg(long)]
        no_json: bool,
        files: Vec<PathBuf>,
    },
    /// List version history of files
    History { names: Vec<String> },
    /// Print historical versions of one file
    Hcat {
        /// File name the versions belong to
        #[arg(short, long)]
        file: String,
        vids: Vec<String>,
    },
    /// Point a file back at an old version
    Rollback {
        /// File name to roll back
        #[arg(short, long)]
        file: String,
        /// Version id to roll back to
        #[arg(short = 't', long = "to")]
        to: String,
    },
    /// Remove old versions
    Prune {
        /// Number of newest versions to keep
        #[arg(short, long, default_value_t = 5)]
        keep: usize,
        /// Log removals without performing them
        #[arg(short = 'n', long = "dry-run")]
        dry_run: bool,
        /// Walk the whole tree and prune every file
        #[arg(short, long)]
        all: bool,
        names: Vec<String>,
    },
    /// Edit live contents in $EDITOR
    Edit {
        /// Do not validate the edited content as JSON
        #[arg(long)]
        no_json: bool,
        name: String,
    },
    /// Run the HTTP backend server
    Server {
        /// Listen address
        #[arg(short, long, default_value = "0.0.0.0:3000", env = "STSV_LISTEN")]
        listen: SocketAddr,
        /// Basic auth credentials as user:password
        #[arg(short = 'u', long = "user", env = "STSV_AUTH")]
        auth: Option<String>,
    },
}

fn init_logging(verbose: bool, quiet: bool) {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);
    let datastore = Datastore::new(&cli.data_dir);

    match cli.command {
        Command::Ls => commands::ls(&datastore, &mut std::io::stdout()),
        Command::Cat { json, names } => {
            commands::cat(&datastore, json, &names, &mut std::io::stdout())
        }
        Command::Put {
            prefix,
            lock,
            no_json,
            files,
        } => commands::put(&datastore, &prefix, &lock, no_json, &files),
        Command::History { names } => {
            commands::history(&datastore, &names, &mut std::io::stdout())
        }
        Command::Hcat { file, vids } => {
            commands::hcat(&datastore, &file, &vids, &mut std::io::stdout())
        }
        Command::Rollback { file, to } => commands::rollback(&datastore, &file, &to),
        Command::Prune {
            keep,
            dry_run,
            all,
            names,
        } => commands::prune(&datastore, keep, dry_run, all, &names),
        Command::Edit { no_json, name } => commands::edit(&datastore, &name, no_json),
        Command::Server { listen, auth } => commands::server(datastore, listen, auth.as_deref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_flags_and_subcommand() {
        let cli = Cli::parse_from(["stsv", "-d", "/data", "prune", "-k", "3", "-n", "/s"]);
        assert_eq!(cli.data_dir, PathBuf::from("/data"));
        match cli.command {
            Command::Prune {
                keep,
                dry_run,
                all,
                names,
            } => {
                assert_eq!(keep, 3);
                assert!(dry_run);
                assert!(!all);
                assert_eq!(names, vec!["/s".to_string()]);
            }
            _ => panic!("expected prune"),
        }
    }
}
