//! Adtraction adapter.
//!
//! XML payload: a root element holding `<product>` children. The category is
//! a breadcrumb (`Outdoor > Cooking`); shoppers are sent to the tracking URL.

use feedsync_shared::{FeedSyncError, FieldMapping, NetworkKind, ProductDraft, Result};
use serde::Deserialize;

use super::{
    NetworkAdapter, clean_name, decode_utf8, keep_identified, lenient_bool, lenient_f64,
    split_labels,
};

const BREADCRUMB_SEPARATOR: &str = ">";

#[derive(Debug, Deserialize)]
struct AdtractionPayload {
    #[serde(rename = "product", default)]
    products: Vec<AdtractionProduct>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
struct AdtractionProduct {
    #[serde(rename = "SKU")]
    sku: String,
    name: String,
    description: String,
    category: String,
    price: String,
    original_price: String,
    shipping: String,
    currency: String,
    in_stock: String,
    image_url: String,
    tracking_url: String,
}

/// Adapter for Adtraction XML product feeds.
pub struct AdtractionAdapter;

impl NetworkAdapter for AdtractionAdapter {
    fn network(&self) -> NetworkKind {
        NetworkKind::Adtraction
    }

    fn parse_products(&self, raw: &[u8], _mapping: &FieldMapping) -> Result<Vec<ProductDraft>> {
        let text = decode_utf8(raw)?;
        let payload: AdtractionPayload = quick_xml::de::from_str(text)
            .map_err(|e| FeedSyncError::parse(format!("adtraction payload: {e}")))?;

        let drafts = payload
            .products
            .into_iter()
            .map(|p| {
                let price = lenient_f64(&p.price);
                let regular_price = if p.original_price.trim().is_empty() {
                    price
                } else {
                    lenient_f64(&p.original_price)
                };
                ProductDraft {
                    identifier: p.sku.trim().to_string(),
                    name: clean_name(&p.name),
                    description: p.description,
                    price,
                    regular_price,
                    currency: p.currency,
                    shipping_price: lenient_f64(&p.shipping),
                    in_stock: lenient_bool(&p.in_stock),
                    product_url: p.tracking_url,
                    graphic_url: p.image_url,
                    categories: split_labels(&p.category, BREADCRUMB_SEPARATOR),
                }
            })
            .collect();

        Ok(keep_identified(drafts, self.network()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> Vec<u8> {
        std::fs::read("../../../fixtures/feeds/adtraction.xml").expect("missing fixture")
    }

    #[test]
    fn parses_fixture() {
        let drafts = AdtractionAdapter
            .parse_products(&fixture(), &FieldMapping::default())
            .unwrap();
        assert_eq!(drafts.len(), 2);

        let stove = &drafts[0];
        assert_eq!(stove.identifier, "AT-1");
        assert_eq!(stove.price, 349.5);
        assert_eq!(stove.regular_price, 399.0);
        assert_eq!(stove.shipping_price, 29.0);
        assert!(stove.in_stock);
        assert_eq!(stove.product_url, "https://track.example.com/?url=stove");
        assert_eq!(stove.categories, vec!["Outdoor", "Cooking"]);
    }

    #[test]
    fn bad_price_falls_back_to_zero() {
        let drafts = AdtractionAdapter
            .parse_products(&fixture(), &FieldMapping::default())
            .unwrap();
        let tent = &drafts[1];
        assert_eq!(tent.identifier, "AT-2");
        assert_eq!(tent.price, 0.0);
        assert_eq!(tent.regular_price, 0.0);
        assert_eq!(tent.shipping_price, 0.0);
        assert!(!tent.in_stock);
        assert_eq!(tent.categories, vec!["Outdoor"]);
    }

    #[test]
    fn empty_and_missing_elements_become_defaults() {
        let raw = br#"<products>
            <product><SKU>AT-9</SKU><Name/><Price></Price><InStock>yes</InStock></product>
        </products>"#;
        let drafts = AdtractionAdapter
            .parse_products(raw, &FieldMapping::default())
            .unwrap();
        assert_eq!(drafts.len(), 1);
        let d = &drafts[0];
        assert_eq!(d.identifier, "AT-9");
        assert!(d.name.is_empty());
        assert_eq!(d.price, 0.0);
        assert!(d.in_stock);
        assert!(d.categories.is_empty());
        assert!(d.product_url.is_empty());
    }

    #[test]
    fn truncated_xml_is_parse_error() {
        let err = AdtractionAdapter
            .parse_products(b"<products><product><SKU>1</SKU>", &FieldMapping::default())
            .unwrap_err();
        assert_eq!(err.kind(), "parse");
    }
}
