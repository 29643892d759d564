//! Engine configuration files.
//!
//! Files are RON and may leave out any field:
//!
//! ```ron
//! (
//!     scheduler: (lookahead_ms: 80.0),
//!     smoothing: (time_constant_ms: 20.0),
//! )
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use bc_engine::EngineConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] ron::error::SpannedError),
}

/// Parse and clamp a RON configuration.
pub fn parse_config(text: &str) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig = ron::from_str(text)?;
    Ok(config.sanitized())
}

pub fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&text)
}
