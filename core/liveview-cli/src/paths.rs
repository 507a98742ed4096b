//! `liveview paths`: prints the endpoints an options file resolves to.

use std::io::{self, Write};
use std::path::PathBuf;

use liveview_core::{load_options, DerivedPaths, LiveViewError, ObserverResolution};
use serde::Serialize;
use tracing::debug;

use crate::error::Result;

#[derive(Debug, Serialize)]
struct PathsReport {
    #[serde(flatten)]
    paths: DerivedPaths,
    use_screen_overlay: bool,
    observer_resolution: ObserverResolution,
}

pub fn run(config: Option<PathBuf>) -> Result<()> {
    debug!(config = ?config, "Loading options");
    let options = load_options(config).map_err(LiveViewError::from)?;
    let report = PathsReport {
        paths: options.paths(),
        use_screen_overlay: options.use_screen_overlay,
        observer_resolution: options.observer_resolution,
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, &report).map_err(|source| LiveViewError::Json {
        context: "writing paths".to_string(),
        source,
    })?;
    writeln!(out)?;
    Ok(())
}
