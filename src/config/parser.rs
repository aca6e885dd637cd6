use crate::config::types::CrawlerOptions;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Loads and parses an options file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML options file
///
/// # Returns
///
/// * `Ok(CrawlerOptions)` - Successfully loaded and validated options
/// * `Err(ConfigError)` - Failed to load, parse, or validate the options
pub fn load_config(path: &Path) -> Result<CrawlerOptions, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parses and validates options from TOML text
pub fn parse_config(content: &str) -> Result<CrawlerOptions, ConfigError> {
    let options: CrawlerOptions = toml::from_str(content)?;
    validate(&options)?;
    Ok(options)
}

/// Computes a SHA-256 hash of the options file content
///
/// Logged at startup so two runs can be told apart by their configuration.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads options and returns both the options and the file hash
pub fn load_config_with_hash(path: &Path) -> Result<(CrawlerOptions, String), ConfigError> {
    let options = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((options, hash))
}
