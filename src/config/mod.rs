//! Configuration module for Sumi-Crawl
//!
//! This module handles loading, parsing, and validating TOML option files.
//! Options can also be built in code, starting from `CrawlerOptions::default()`.
//!
//! # Example
//!
//! ```no_run
//! use sumi_crawl::config::load_config;
//! use std::path::Path;
//!
//! let options = load_config(Path::new("crawl.toml")).unwrap();
//! println!("Crawl delay: {:?}", options.crawl_delay());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    CrawlerOptions, LogCategory, LogFlags, DEFAULT_ROBOT_USER_AGENT, DEFAULT_USER_AGENT,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
