//! Adrecord adapter.
//!
//! JSON payload with a top-level `Products` array. Prices arrive as strings
//! and the category is a single comma-delimited string.

use feedsync_shared::{FeedSyncError, FieldMapping, NetworkKind, ProductDraft, Result};
use serde::Deserialize;

use super::{
    NetworkAdapter, clean_name, de_lenient_bool, de_lenient_f64, de_lenient_string, decode_utf8,
    keep_identified, split_labels,
};

const CATEGORY_DELIMITER: &str = ",";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AdrecordPayload {
    products: Vec<AdrecordProduct>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct AdrecordProduct {
    #[serde(deserialize_with = "de_lenient_string")]
    name: String,
    #[serde(rename = "SKU", deserialize_with = "de_lenient_string")]
    sku: String,
    #[serde(deserialize_with = "de_lenient_string")]
    description: String,
    #[serde(deserialize_with = "de_lenient_f64")]
    price: f64,
    #[serde(deserialize_with = "de_lenient_f64")]
    regular_price: f64,
    #[serde(deserialize_with = "de_lenient_f64")]
    shipping_price: f64,
    #[serde(deserialize_with = "de_lenient_string")]
    currency: String,
    #[serde(rename = "ProductURL", deserialize_with = "de_lenient_string")]
    product_url: String,
    #[serde(rename = "GraphicURL", deserialize_with = "de_lenient_string")]
    graphic_url: String,
    #[serde(deserialize_with = "de_lenient_bool")]
    in_stock: bool,
    #[serde(deserialize_with = "de_lenient_string")]
    category: String,
}

/// Adapter for Adrecord product feeds.
pub struct AdrecordAdapter;

impl NetworkAdapter for AdrecordAdapter {
    fn network(&self) -> NetworkKind {
        NetworkKind::Adrecord
    }

    fn parse_products(&self, raw: &[u8], _mapping: &FieldMapping) -> Result<Vec<ProductDraft>> {
        let text = decode_utf8(raw)?;
        let payload: AdrecordPayload = serde_json::from_str(text)
            .map_err(|e| FeedSyncError::parse(format!("adrecord payload: {e}")))?;

        let drafts = payload
            .products
            .into_iter()
            .map(|p| ProductDraft {
                identifier: p.sku.trim().to_string(),
                name: clean_name(&p.name),
                description: p.description,
                price: p.price,
                regular_price: p.regular_price,
                currency: p.currency,
                shipping_price: p.shipping_price,
                in_stock: p.in_stock,
                product_url: p.product_url,
                graphic_url: p.graphic_url,
                categories: split_labels(&p.category, CATEGORY_DELIMITER),
            })
            .collect();

        Ok(keep_identified(drafts, self.network()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Vec<u8> {
        std::fs::read("../../../fixtures/feeds/adrecord.json").expect("missing fixture")
    }

    #[test]
    fn parses_fixture() {
        let drafts = AdrecordAdapter
            .parse_products(&fixture(), &FieldMapping::default())
            .unwrap();
        assert_eq!(drafts.len(), 2, "product without SKU is dropped");

        let shoe = &drafts[0];
        assert_eq!(shoe.identifier, "AR-100");
        assert_eq!(shoe.name, "Trail Runner Pro");
        assert_eq!(shoe.price, 899.0);
        assert_eq!(shoe.regular_price, 1099.0);
        assert_eq!(shoe.shipping_price, 49.0);
        assert!(shoe.in_stock);
        assert_eq!(shoe.categories, vec!["Shoes", "Running"]);
    }

    #[test]
    fn unparsable_fields_become_defaults() {
        let drafts = AdrecordAdapter
            .parse_products(&fixture(), &FieldMapping::default())
            .unwrap();
        let socks = &drafts[1];
        assert_eq!(socks.price, 0.0);
        assert_eq!(socks.shipping_price, 0.0);
        assert_eq!(socks.regular_price, 129.0);
        assert!(!socks.in_stock);
        assert!(socks.description.is_empty());
    }

    #[test]
    fn mistyped_record_does_not_fail_the_feed() {
        let raw = br#"{"Products": [
            {"SKU": "AR-1", "Name": "Cap", "Description": "Wool cap", "InStock": true},
            {"SKU": 2002, "Name": null, "Description": "Scarf", "InStock": 1,
             "Price": 99, "Category": null, "Currency": false}
        ]}"#;
        let drafts = AdrecordAdapter
            .parse_products(raw, &FieldMapping::default())
            .unwrap();
        assert_eq!(drafts.len(), 2);

        assert!(drafts[0].in_stock);
        let scarf = &drafts[1];
        assert_eq!(scarf.identifier, "2002");
        assert!(scarf.name.is_empty());
        assert_eq!(scarf.price, 99.0);
        assert!(scarf.in_stock);
        assert!(scarf.categories.is_empty());
        assert_eq!(scarf.currency, "false");
    }

    #[test]
    fn missing_products_array_is_parse_error() {
        let err = AdrecordAdapter
            .parse_products(br#"{"Total": 0}"#, &FieldMapping::default())
            .unwrap_err();
        assert_eq!(err.kind(), "parse");
    }

    #[test]
    fn non_json_is_parse_error() {
        let err = AdrecordAdapter
            .parse_products(b"<html>maintenance</html>", &FieldMapping::default())
            .unwrap_err();
        assert_eq!(err.kind(), "parse");
    }
}
