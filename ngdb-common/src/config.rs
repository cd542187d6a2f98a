//! Configuration file loading and path resolution

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::PathBuf;

/// Config file resolution priority order:
/// 1. Explicit path argument (highest priority)
/// 2. Environment variable (`<ENV_PREFIX>_CONFIG`)
/// 3. `./<module>.toml` in the working directory
pub fn resolve_config_path(
    cli_arg: Option<&str>,
    env_var_name: &str,
    module_name: &str,
) -> Option<PathBuf> {
    // Priority 1: Explicit argument
    if let Some(path) = cli_arg {
        return Some(PathBuf::from(path));
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        return Some(PathBuf::from(path));
    }

    // Priority 3: Working-directory default
    let default = PathBuf::from(format!("{module_name}.toml"));
    if default.exists() {
        return Some(default);
    }

    None
}

/// Load and deserialize a TOML config file into `T`.
///
/// Parse failures are surfaced as `Error::Config` so callers can fail fast
/// at startup rather than run with a silently-defaulted configuration.
pub fn load_toml<T: DeserializeOwned>(path: &std::path::Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Cannot read config file {}: {}", path.display(), e))
    })?;

    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Invalid TOML in {}: {}", path.display(), e)))
}

/// Resolve the database path for a service.
///
/// Priority: environment variable, then `./<module>.db`.
pub fn resolve_database_path(env_var_name: &str, module_name: &str) -> PathBuf {
    if let Ok(path) = std::env::var(env_var_name) {
        return PathBuf::from(path);
    }

    PathBuf::from(format!("{module_name}.db"))
}
