use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use common::{Error, Result, StrategyParameters};

/// Strategy parameter file (TOML).
///
/// Example `config/strategies.toml`:
/// ```toml
/// [rsi]
/// period = 14
/// oversold = 40.0
/// overbought = 70.0
///
/// [moving_average]
/// fast_period = 50
/// slow_period = 200
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StrategyFileConfig {
    #[serde(default)]
    pub rsi: StrategyParameters,
    #[serde(default)]
    pub moving_average: StrategyParameters,
}

impl StrategyFileConfig {
    /// Load from a TOML file. A missing file means "use built-in defaults";
    /// an unreadable or malformed one is a configuration error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "Strategy config not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read strategy config at '{}': {e}", path.display()))
        })?;
        let cfg = Self::parse(&content).map_err(|e| {
            Error::Config(format!("Failed to parse strategy config at '{}': {e}", path.display()))
        })?;
        info!(path = %path.display(), "Strategy config loaded");
        Ok(cfg)
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}
