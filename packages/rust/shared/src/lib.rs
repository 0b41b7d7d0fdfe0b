//! Shared types, error model, and configuration for the spider-pool generator.
//!
//! This crate is the foundation depended on by all other workspace crates.
//! It provides:
//! - [`SpiderPoolError`]: the unified error type
//! - Domain types ([`DomainAlias`], [`ContentSource`], [`SpiderPoolPage`], [`PageSpec`])
//! - Configuration ([`AppConfig`], [`GenerationConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, GenerationConfig, SynthesisConfig, ThemeMap, config_dir,
    config_file_path, expand_home, init_config, load_config, load_config_from,
};
pub use error::{Result, SpiderPoolError};
pub use types::{
    ContentSource, ContentSourceDef, DomainAlias, DomainPageStats, DomainType, PageSpec,
    PageStatus, SpiderPoolPage, Website, dedup_terms,
};
