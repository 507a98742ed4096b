//! Live view configuration.
//!
//! Everything hangs off one path prefix; the mirror entry, client script and
//! realtime channel paths are derived from it. Options load from TOML at an
//! explicit path or `~/.liveview/liveview.toml`; a missing file means defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::OptionsError;

const DEFAULT_CONFIG_RELATIVE_PATH: &str = ".liveview/liveview.toml";

pub const DEFAULT_PATH_PREFIX: &str = "/_liveview";
pub const MIRROR_SUBPATH: &str = "/mirror";
pub const SCRIPT_SUBPATH: &str = "/liveview.web.js";
pub const CHANNEL_SUBPATH: &str = "/hub";

/// What happens when a staged observer's source cannot be resolved at open time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObserverResolution {
    /// Fail the open call; the host should tear the connection down.
    #[default]
    Reject,
    /// Log and track the session as a regular one.
    Degrade,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveViewOptions {
    pub path_prefix: String,
    /// Cover mirrored content with a transparent layer that swallows input.
    pub use_screen_overlay: bool,
    pub observer_resolution: ObserverResolution,
    pub host_reserved_paths: Vec<String>,
}

impl Default for LiveViewOptions {
    fn default() -> Self {
        Self {
            path_prefix: DEFAULT_PATH_PREFIX.to_string(),
            use_screen_overlay: true,
            observer_resolution: ObserverResolution::default(),
            host_reserved_paths: vec![
                "/_framework".to_string(),
                "/_blazor".to_string(),
                "/_content".to_string(),
            ],
        }
    }
}

/// Paths derived from a validated prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivedPaths {
    pub prefix: String,
    pub mirror: String,
    pub script: String,
    pub channel: String,
}

impl LiveViewOptions {
    pub fn mirror_path(&self) -> String {
        format!("{}{}", self.path_prefix, MIRROR_SUBPATH)
    }

    pub fn script_path(&self) -> String {
        format!("{}{}", self.path_prefix, SCRIPT_SUBPATH)
    }

    pub fn channel_path(&self) -> String {
        format!("{}{}", self.path_prefix, CHANNEL_SUBPATH)
    }

    pub fn paths(&self) -> DerivedPaths {
        DerivedPaths {
            prefix: self.path_prefix.clone(),
            mirror: self.mirror_path(),
            script: self.script_path(),
            channel: self.channel_path(),
        }
    }

    pub fn validate(&self) -> Result<(), OptionsError> {
        let prefix = &self.path_prefix;
        if prefix.trim().is_empty() {
            return Err(OptionsError::EmptyPrefix);
        }
        if !prefix.starts_with('/') {
            return Err(OptionsError::PrefixMissingLeadingSlash(prefix.clone()));
        }
        if prefix.ends_with('/') {
            return Err(OptionsError::PrefixTrailingSlash(prefix.clone()));
        }

        let derived = [
            prefix.clone(),
            self.mirror_path(),
            self.script_path(),
            self.channel_path(),
        ];
        for path in &derived {
            for reserved in &self.host_reserved_paths {
                if collides(path, reserved) {
                    return Err(OptionsError::ReservedPathCollision {
                        path: path.clone(),
                        reserved: reserved.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn collides(path: &str, reserved: &str) -> bool {
    let path = path.to_ascii_lowercase();
    let reserved = reserved.trim_end_matches('/').to_ascii_lowercase();
    if reserved.is_empty() {
        return false;
    }
    path == reserved || path.starts_with(&format!("{}/", reserved))
}

pub fn default_config_path() -> Result<PathBuf, OptionsError> {
    let home = dirs::home_dir().ok_or(OptionsError::HomeDirNotFound)?;
    Ok(home.join(DEFAULT_CONFIG_RELATIVE_PATH))
}

/// Loads and validates options; a missing file yields the defaults.
pub fn load_options(path: Option<PathBuf>) -> Result<LiveViewOptions, OptionsError> {
    let config_path = match path {
        Some(path) => path,
        None => default_config_path()?,
    };

    if !config_path.exists() {
        tracing::debug!(path = %config_path.display(), "No live view config; using defaults");
        let options = LiveViewOptions::default();
        options.validate()?;
        return Ok(options);
    }

    let options = parse_options_file(&config_path)?;
    options.validate()?;
    Ok(options)
}

fn parse_options_file(path: &Path) -> Result<LiveViewOptions, OptionsError> {
    let content =
        fs_err::read_to_string(path).map_err(|source| OptionsError::ConfigReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
    toml::from_str::<LiveViewOptions>(&content).map_err(|err| OptionsError::ConfigMalformed {
        path: path.to_path_buf(),
        details: err.to_string(),
    })
}
