use std::path::PathBuf;

use liveview_core::LiveViewError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    LiveView(#[from] LiveViewError),

    #[error("Invalid JSON in {path}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Replay step {step} ({op}) failed: {source}")]
    Replay {
        step: usize,
        op: &'static str,
        #[source]
        source: LiveViewError,
    },
}

pub type Result<T> = std::result::Result<T, CliError>;

/// Reads and deserializes a JSON input file.
pub fn read_json<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> Result<T> {
    let raw = fs_err::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|source| CliError::Input {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes one value as a JSON line.
pub fn write_json_line<W: std::io::Write, T: serde::Serialize>(out: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer(&mut *out, value)
        .map_err(|source| LiveViewError::Json {
            context: "writing output".to_string(),
            source,
        })?;
    writeln!(out)?;
    Ok(())
}
