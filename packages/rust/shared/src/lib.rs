//! Shared types, error model, and configuration for feedsync.
//!
//! This crate is the foundation depended on by all other feedsync crates.
//! It provides:
//! - [`FeedSyncError`] — the unified error type
//! - Catalog entities ([`Site`], [`Feed`], [`Product`], [`Category`], [`CategoryAssociation`])
//! - Identifier newtypes and tags ([`ProductId`], [`Provenance`], [`NetworkKind`])
//! - Configuration ([`AppConfig`], config loading)

pub mod catalog;
pub mod config;
pub mod error;
pub mod text;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use catalog::{Category, CategoryAssociation, Feed, Product, ProductDraft, Site};
pub use config::{
    AppConfig, DEFAULT_WORKERS, DatabaseConfig, DispatcherConfig, FetchConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from,
};
pub use error::{FeedSyncError, Result};
pub use types::{
    AssociationId, CategoryId, FeedId, FieldMapping, NetworkKind, ProductId, Provenance, RunId,
    SiteId,
};
