//! Network adapter trait and the built-in per-network payload parsers.
//!
//! Every affiliate network publishes its catalog in its own shape. An adapter
//! turns the raw payload bytes into [`ProductDraft`]s; it never touches the
//! network or the store.

mod adrecord;
mod adtraction;
mod mapped;
mod tradedoubler;

use std::collections::HashSet;

use feedsync_shared::{FeedSyncError, FieldMapping, NetworkKind, ProductDraft, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};

pub use adrecord::AdrecordAdapter;
pub use adtraction::AdtractionAdapter;
pub use mapped::MappedAdapter;
pub use tradedoubler::TradedoublerAdapter;

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Parser for one affiliate network's payload format.
///
/// Parsing is a pure function of the input bytes. A malformed payload (wrong
/// top-level shape, undecodable encoding) fails with a parse error; a bad
/// individual field falls back to its typed default instead.
pub trait NetworkAdapter: Send + Sync {
    /// The network this adapter handles.
    fn network(&self) -> NetworkKind;

    /// Parse a raw payload into product drafts, in payload order.
    ///
    /// Drafts with an empty identifier are dropped.
    fn parse_products(&self, raw: &[u8], mapping: &FieldMapping) -> Result<Vec<ProductDraft>>;

    /// Human-readable adapter name for tracing.
    fn name(&self) -> &str {
        self.network().as_str()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Holds one adapter per supported network.
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn NetworkAdapter>>,
}

impl AdapterRegistry {
    /// Create a registry with all built-in adapters.
    pub fn new() -> Self {
        Self {
            adapters: vec![
                Box::new(AdrecordAdapter),
                Box::new(AdtractionAdapter),
                Box::new(TradedoublerAdapter),
                Box::new(MappedAdapter),
            ],
        }
    }

    /// The adapter for `network`.
    pub fn adapter_for(&self, network: NetworkKind) -> Result<&dyn NetworkAdapter> {
        self.adapters
            .iter()
            .find(|a| a.network() == network)
            .map(|a| a.as_ref())
            .ok_or_else(|| FeedSyncError::config(format!("no adapter registered for '{network}'")))
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Pending category labels
// ---------------------------------------------------------------------------

/// Every category label the drafts declare: trimmed, non-empty, unique,
/// first-seen order.
pub fn pending_category_labels(drafts: &[ProductDraft]) -> Vec<String> {
    let mut seen = HashSet::new();
    drafts
        .iter()
        .flat_map(|d| d.categories.iter())
        .map(|c| c.trim())
        .filter(|c| !c.is_empty() && seen.insert(c.to_string()))
        .map(str::to_string)
        .collect()
}

// ---------------------------------------------------------------------------
// Field helpers shared by the adapters
// ---------------------------------------------------------------------------

/// Payloads must be UTF-8.
pub(crate) fn decode_utf8(raw: &[u8]) -> Result<&str> {
    std::str::from_utf8(raw)
        .map_err(|e| FeedSyncError::parse(format!("payload is not valid UTF-8: {e}")))
}

/// Strip `&quot;` entities some networks leave in product names.
pub(crate) fn clean_name(name: &str) -> String {
    name.replace("&quot;", "").trim().to_string()
}

/// Parse a number, coercing anything unparsable to zero.
pub(crate) fn lenient_f64(s: &str) -> f64 {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Parse a stock flag from the spellings networks use.
pub(crate) fn lenient_bool(s: &str) -> bool {
    matches!(
        s.trim().to_ascii_lowercase().as_str(),
        "1" | "t" | "true" | "yes" | "y" | "in stock" | "instock"
    )
}

/// Split a delimited label string into trimmed, non-empty labels.
pub(crate) fn split_labels(s: &str, delimiter: &str) -> Vec<String> {
    if delimiter.is_empty() {
        let label = s.trim();
        return if label.is_empty() {
            vec![]
        } else {
            vec![label.to_string()]
        };
    }
    s.split(delimiter)
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Drop drafts without an identifier, logging how many were skipped.
pub(crate) fn keep_identified(drafts: Vec<ProductDraft>, network: NetworkKind) -> Vec<ProductDraft> {
    let total = drafts.len();
    let kept: Vec<ProductDraft> = drafts
        .into_iter()
        .filter(|d| !d.identifier.trim().is_empty())
        .collect();
    if kept.len() < total {
        tracing::warn!(
            network = %network,
            skipped = total - kept.len(),
            "skipped products without an identifier"
        );
    }
    kept
}

/// Serde helper: a number given either as a JSON number or as a string.
/// Anything else (null, garbage text) becomes zero.
pub(crate) fn de_lenient_f64<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().map(value_to_f64).unwrap_or(0.0))
}

/// Serde helper: text that may arrive as a number, a bool or null.
pub(crate) fn de_lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().map(value_to_string).unwrap_or_default())
}

/// Serde helper: a stock flag given as a bool, a number or one of the
/// spellings [`lenient_bool`] accepts.
pub(crate) fn de_lenient_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().is_some_and(value_to_bool))
}

/// Serde helper for nested objects and lists: a value of the wrong shape
/// becomes `T::default()` instead of failing the whole payload.
pub(crate) fn de_lenient<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default())
}

/// Lenient number extraction from an arbitrary JSON value.
pub(crate) fn value_to_f64(value: &serde_json::Value) -> f64 {
    match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => lenient_f64(s),
        _ => 0.0,
    }
}

/// Lenient text extraction: strings as-is, numbers and bools rendered.
pub(crate) fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// Lenient stock flag from an arbitrary JSON value.
pub(crate) fn value_to_bool(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|v| v > 0.0),
        serde_json::Value::String(s) => lenient_bool(s),
        _ => false,
    }
}
