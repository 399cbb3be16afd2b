//! Tradedoubler adapter.
//!
//! JSON payload with a `products` array. Price, currency, stock and URL live
//! on the first offer's first price-history entry; a product without offers
//! gets defaults for those fields.

use feedsync_shared::{FeedSyncError, FieldMapping, NetworkKind, ProductDraft, Result};
use serde::Deserialize;

use super::{
    NetworkAdapter, clean_name, de_lenient, de_lenient_f64, de_lenient_string, decode_utf8,
    keep_identified,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TradedoublerPayload {
    products: Vec<TradedoublerProduct>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct TradedoublerProduct {
    #[serde(deserialize_with = "de_lenient_string")]
    name: String,
    #[serde(deserialize_with = "de_lenient")]
    product_image: ProductImage,
    #[serde(deserialize_with = "de_lenient_string")]
    description: String,
    #[serde(deserialize_with = "de_lenient")]
    identifiers: Identifiers,
    #[serde(deserialize_with = "de_lenient")]
    offers: Vec<Offer>,
    #[serde(deserialize_with = "de_lenient")]
    categories: Vec<CategoryRef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ProductImage {
    #[serde(deserialize_with = "de_lenient_string")]
    url: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Identifiers {
    #[serde(deserialize_with = "de_lenient_string")]
    sku: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Offer {
    #[serde(deserialize_with = "de_lenient_string")]
    product_url: String,
    #[serde(deserialize_with = "de_lenient")]
    price_history: Vec<PriceEntry>,
    #[serde(deserialize_with = "de_lenient_f64")]
    in_stock: f64,
    #[serde(deserialize_with = "de_lenient_f64")]
    shipping_cost: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PriceEntry {
    #[serde(deserialize_with = "de_lenient")]
    price: Price,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Price {
    #[serde(deserialize_with = "de_lenient_f64")]
    value: f64,
    #[serde(deserialize_with = "de_lenient_string")]
    currency: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CategoryRef {
    #[serde(deserialize_with = "de_lenient_string")]
    name: String,
}

/// Adapter for Tradedoubler product feeds.
pub struct TradedoublerAdapter;

impl NetworkAdapter for TradedoublerAdapter {
    fn network(&self) -> NetworkKind {
        NetworkKind::Tradedoubler
    }

    fn parse_products(&self, raw: &[u8], _mapping: &FieldMapping) -> Result<Vec<ProductDraft>> {
        let text = decode_utf8(raw)?;
        let payload: TradedoublerPayload = serde_json::from_str(text)
            .map_err(|e| FeedSyncError::parse(format!("tradedoubler payload: {e}")))?;

        let drafts = payload
            .products
            .into_iter()
            .map(|p| {
                let offer = p.offers.into_iter().next().unwrap_or_default();
                let price = offer
                    .price_history
                    .into_iter()
                    .next()
                    .map(|h| h.price)
                    .unwrap_or_default();
                ProductDraft {
                    identifier: p.identifiers.sku.trim().to_string(),
                    name: clean_name(&p.name),
                    description: p.description,
                    price: price.value,
                    // No separate list price in this format.
                    regular_price: price.value,
                    currency: price.currency,
                    shipping_price: offer.shipping_cost,
                    in_stock: offer.in_stock > 0.0,
                    product_url: offer.product_url,
                    graphic_url: p.product_image.url,
                    categories: p
                        .categories
                        .into_iter()
                        .map(|c| c.name.trim().to_string())
                        .filter(|c| !c.is_empty())
                        .collect(),
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
        std::fs::read("../../../fixtures/feeds/tradedoubler.json").expect("missing fixture")
    }

    #[test]
    fn parses_first_offer() {
        let drafts = TradedoublerAdapter
            .parse_products(&fixture(), &FieldMapping::default())
            .unwrap();
        assert_eq!(drafts.len(), 2);

        let espresso = &drafts[0];
        assert_eq!(espresso.identifier, "TD-1");
        assert_eq!(espresso.price, 4995.0);
        assert_eq!(espresso.regular_price, 4995.0);
        assert_eq!(espresso.currency, "SEK");
        assert!(espresso.in_stock);
        assert_eq!(espresso.product_url, "https://kitchen.example.com/espresso");
        assert_eq!(espresso.graphic_url, "https://kitchen.example.com/espresso.jpg");
        assert_eq!(espresso.categories, vec!["Kitchen", "Coffee"]);
    }

    #[test]
    fn product_without_offers_gets_defaults() {
        let drafts = TradedoublerAdapter
            .parse_products(&fixture(), &FieldMapping::default())
            .unwrap();
        let frother = &drafts[1];
        assert_eq!(frother.identifier, "TD-2");
        assert_eq!(frother.price, 0.0);
        assert!(frother.currency.is_empty());
        assert!(!frother.in_stock);
        assert!(frother.categories.is_empty());
    }

    #[test]
    fn mistyped_fields_become_defaults() {
        let raw = br#"{"products": [
            {"name": null, "identifiers": {"sku": 77}, "productImage": "none",
             "offers": [{"productUrl": "https://x.example.com/77", "inStock": "1",
                         "priceHistory": [{"price": {"value": "12.5", "currency": null}}]}],
             "categories": "Kitchen"},
            {"name": "Kettle", "identifiers": null, "offers": null}
        ]}"#;
        let drafts = TradedoublerAdapter
            .parse_products(raw, &FieldMapping::default())
            .unwrap();
        assert_eq!(drafts.len(), 1, "product without identifiers is dropped");

        let d = &drafts[0];
        assert_eq!(d.identifier, "77");
        assert!(d.name.is_empty());
        assert!(d.graphic_url.is_empty());
        assert_eq!(d.price, 12.5);
        assert!(d.currency.is_empty());
        assert!(d.in_stock);
        assert!(d.categories.is_empty());
    }

    #[test]
    fn products_must_be_an_array() {
        let err = TradedoublerAdapter
            .parse_products(br#"{"products": {"name": "x"}}"#, &FieldMapping::default())
            .unwrap_err();
        assert_eq!(err.kind(), "parse");
    }
}
