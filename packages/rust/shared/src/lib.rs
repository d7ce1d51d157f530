//! Shared types, error model, and configuration for ramlpreparer.
//!
//! This crate is the foundation depended on by all other ramlpreparer crates.
//! It provides:
//! - [`PreparerError`] — the unified error type
//! - Domain types ([`Envelope`], [`AssetOffset`], [`Outline`], [`TocNode`])
//! - Configuration ([`EnvelopeConfig`], [`PreparerConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AssetsSection, BatchSection, DECONST_JSON, EnvelopeConfig, EnvelopeSection, GitSection,
    PreparerConfig, RendererConfig, check_edit_link_pair, config_dir, config_file_path,
    init_config, load_config, load_config_from, validate,
};
pub use error::{PreparerError, Result};
pub use types::{
    AssetOffset, Envelope, GITHUB_EDIT_URL_KEY, Metadata, Outline, TocNode, UNSEARCHABLE_KEY,
};
