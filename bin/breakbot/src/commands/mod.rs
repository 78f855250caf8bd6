pub mod doctor;
pub mod gateway;
pub mod parse;

use breakbot_core::{Config, Paths};
use std::path::Path;

/// Loads the config file (or defaults) and applies `.env`/environment
/// overrides.
pub fn load_config(path: Option<&Path>, paths: &Paths) -> anyhow::Result<Config> {
    let mut config = match path {
        Some(p) => Config::load(p)?,
        None => Config::load_or_default(paths)?,
    };
    config.apply_env();
    Ok(config)
}
