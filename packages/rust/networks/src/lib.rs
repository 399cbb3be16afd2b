//! Affiliate network adapters and feed retrieval.
//!
//! This crate provides:
//! - [`adapters`] — one payload parser per affiliate network
//! - [`AdapterRegistry`] — selects the parser for a feed's network
//! - [`FeedFetcher`] — downloads raw feed payloads over HTTP

pub mod adapters;
pub mod fetch;

pub use adapters::{
    AdapterRegistry, AdrecordAdapter, AdtractionAdapter, MappedAdapter, NetworkAdapter,
    TradedoublerAdapter, pending_category_labels,
};
pub use fetch::FeedFetcher;
