//! Configuration module for range-harvester
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every tunable of the fetch pipeline lives here; omitted keys fall back to
//! the documented defaults.
//!
//! # Example
//!
//! ```no_run
//! use range_harvester::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Harvesting ids {:?}", config.harvest.id_range());
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    ApiConfig, BackoffConfig, Config, HarvestConfig, IdentityConfig, OutputConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
