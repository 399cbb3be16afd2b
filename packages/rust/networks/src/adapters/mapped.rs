//! Generic JSON adapter driven by the feed's [`FieldMapping`].

use feedsync_shared::{FeedSyncError, FieldMapping, NetworkKind, ProductDraft, Result};
use serde_json::Value;

use super::{
    NetworkAdapter, clean_name, decode_utf8, keep_identified, split_labels, value_to_bool,
    value_to_f64, value_to_string,
};

/// Adapter for feeds whose layout is described entirely by a field mapping.
pub struct MappedAdapter;

impl NetworkAdapter for MappedAdapter {
    fn network(&self) -> NetworkKind {
        NetworkKind::Mapped
    }

    fn parse_products(&self, raw: &[u8], mapping: &FieldMapping) -> Result<Vec<ProductDraft>> {
        let text = decode_utf8(raw)?;
        let root: Value = serde_json::from_str(text)
            .map_err(|e| FeedSyncError::parse(format!("mapped payload: {e}")))?;

        let items = root
            .get(&mapping.products)
            .and_then(Value::as_array)
            .ok_or_else(|| {
                FeedSyncError::parse(format!(
                    "mapped payload: expected an array under '{}'",
                    mapping.products
                ))
            })?;

        let drafts = items
            .iter()
            .map(|item| {
                let text = |key: &str| item.get(key).map(value_to_string).unwrap_or_default();
                let number = |key: &str| item.get(key).map(value_to_f64).unwrap_or(0.0);
                let price = number(&mapping.price);
                let regular_price = match item.get(&mapping.regular_price) {
                    Some(v) if !v.is_null() => value_to_f64(v),
                    _ => price,
                };

                ProductDraft {
                    identifier: text(&mapping.identifier).trim().to_string(),
                    name: clean_name(&text(&mapping.name)),
                    description: text(&mapping.description),
                    price,
                    regular_price,
                    currency: text(&mapping.currency),
                    shipping_price: number(&mapping.shipping_price),
                    in_stock: item.get(&mapping.in_stock).is_some_and(value_to_bool),
                    product_url: text(&mapping.product_url),
                    graphic_url: text(&mapping.graphic_url),
                    categories: categories(item.get(&mapping.categories), mapping),
                }
            })
            .collect();

        Ok(keep_identified(drafts, self.network()))
    }
}

/// Categories are either an array of labels or one delimited string.
fn categories(value: Option<&Value>, mapping: &FieldMapping) -> Vec<String> {
    match value {
        Some(Value::Array(labels)) => labels
            .iter()
            .map(value_to_string)
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect(),
        Some(Value::String(s)) => split_labels(s, &mapping.category_delimiter),
        _ => vec![],
    }
}
