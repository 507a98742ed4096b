//! liveview: offline tooling for the live-view mirroring core.
//!
//! ## Subcommands
//!
//! - `translate`: rewrite a JSON frame sequence the way an observer sees it
//! - `paths`: print the endpoints an options file resolves to
//! - `replay`: drive a scripted host session and print observer renders

mod error;
mod logging;
mod paths;
mod replay;
mod translate;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "liveview")]
#[command(about = "Live-view session mirroring tools")]
#[command(version)]
struct Cli {
    /// Append logs to this file instead of stderr
    #[arg(long, global = true, value_name = "FILE")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Translate a JSON frame array for an observer
    Translate {
        /// JSON file holding the frame array
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Source session the frames belong to
        #[arg(long, default_value = "source")]
        session_id: String,

        /// Id of the view unit being translated
        #[arg(long, default_value_t = 0)]
        unit_id: u32,

        /// Declared type name of the view unit being translated
        #[arg(long)]
        unit_type: Option<String>,

        /// Produce the diagnostic listing instead of the live mirror
        #[arg(long)]
        diagnostic: bool,

        /// Print an indented text listing instead of JSON
        #[arg(long)]
        text: bool,
    },

    /// Print derived endpoint paths
    Paths {
        /// Options file (defaults to ~/.liveview/liveview.toml)
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },

    /// Replay a scripted host session
    Replay {
        /// JSON replay script
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Options file used when the script carries none
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    let logging_guard = logging::init(cli.log_file.as_deref());

    let (name, result) = match cli.command {
        Commands::Translate {
            file,
            session_id,
            unit_id,
            unit_type,
            diagnostic,
            text,
        } => (
            "translate",
            translate::run(translate::TranslateArgs {
                file,
                session_id,
                unit_id,
                unit_type,
                diagnostic,
                text,
            }),
        ),
        Commands::Paths { config } => ("paths", paths::run(config)),
        Commands::Replay { file, config } => ("replay", replay::run(&file, config)),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, command = name, "liveview command failed");
        // exit skips destructors; flush buffered log lines first.
        drop(logging_guard);
        std::process::exit(1);
    }
}
