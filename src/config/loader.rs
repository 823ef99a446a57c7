// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Environment variable naming the config file when `--config` is absent.
pub const CONFIG_ENV: &str = "FETCHQ_CONFIG";

const DEFAULT_CONFIG_FILE: &str = "Fetchq.toml";

/// Read and deserialize a config file. No semantic checks happen here.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    Ok(toml::from_str(&contents)?)
}

/// Read, deserialize and validate a config file into a runnable plan.
///
/// Missing keys take their `Default` values; validation then checks
/// priorities, URLs, TTLs and the concurrency ceiling before turning every
/// `[[request]]` into a spec plus options.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    ConfigFile::try_from(load_from_path(path)?)
}

/// [`load_and_validate`] for TOML already in memory.
pub fn parse_and_validate(contents: &str) -> Result<ConfigFile> {
    let raw: RawConfigFile = toml::from_str(contents)?;
    ConfigFile::try_from(raw)
}

/// Pick the config path: explicit flag, then `FETCHQ_CONFIG`, then
/// `Fetchq.toml` in the working directory. Blank values count as unset.
pub fn resolve_config_path(flag: Option<&str>, env: Option<&str>) -> PathBuf {
    [flag, env]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from)
}
