//! Canonical catalog entities: sites, feeds, products, categories and their links.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::text::{derive_keywords, generate_slug};
use crate::types::{
    AssociationId, CategoryId, FeedId, FieldMapping, NetworkKind, ProductId, Provenance, SiteId,
};

// ---------------------------------------------------------------------------
// Site & Feed
// ---------------------------------------------------------------------------

/// Tenant boundary. Owns feeds and a category catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub id: SiteId,
    pub name: String,
    /// Lookup key used by run triggers.
    pub subdomain: String,
}

/// A configured external product source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    pub id: FeedId,
    pub site_id: SiteId,
    pub name: String,
    pub url: String,
    pub network: NetworkKind,
    /// Payload field names (consulted by the `mapped` variant).
    #[serde(default)]
    pub mapping: FieldMapping,
    /// When false, a product whose description is empty is soft-deleted.
    pub allow_empty_description: bool,
    /// When true, feed-declared categories are attached on update passes.
    pub sync_categories: bool,
}

// ---------------------------------------------------------------------------
// ProductDraft
// ---------------------------------------------------------------------------

/// A parsed, not-yet-persisted product record from a feed payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductDraft {
    /// Feed-native identifier (SKU); unique within a feed.
    pub identifier: String,
    pub name: String,
    pub description: String,
    pub price: f64,
    pub regular_price: f64,
    pub currency: String,
    pub shipping_price: f64,
    pub in_stock: bool,
    pub product_url: String,
    pub graphic_url: String,
    /// Category labels declared by the payload, in payload order.
    #[serde(default)]
    pub categories: Vec<String>,
}

// ---------------------------------------------------------------------------
// Product
// ---------------------------------------------------------------------------

/// Canonical product keyed by `(feed_id, identifier)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// `None` until the product has been inserted.
    pub id: Option<ProductId>,
    pub site_id: SiteId,
    pub feed_id: FeedId,
    pub identifier: String,
    /// Feed-supplied name.
    pub name: String,
    /// Curated name; takes precedence over `name` when non-empty.
    pub name_by_user: Option<String>,
    pub slug: String,
    /// Feed-supplied description.
    pub description: String,
    /// Curated description; takes precedence over `description` when non-empty.
    pub description_by_user: Option<String>,
    pub price: f64,
    pub regular_price: f64,
    pub currency: String,
    pub shipping_price: f64,
    pub in_stock: bool,
    pub product_url: String,
    pub graphic_url: String,
    /// Derived keyword set, comma-separated.
    pub keywords: String,
    /// Mirrors "has at least one category association".
    pub has_categories: bool,
    /// Soft-delete marker; `None` means active.
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Product {
    /// Build a new (not yet stored) product from a draft.
    pub fn from_draft(draft: &ProductDraft, feed: &Feed) -> Self {
        let mut product = Self {
            id: None,
            site_id: feed.site_id,
            feed_id: feed.id,
            identifier: draft.identifier.clone(),
            name: draft.name.clone(),
            name_by_user: None,
            slug: generate_slug(&draft.name),
            description: draft.description.clone(),
            description_by_user: None,
            price: draft.price,
            regular_price: draft.regular_price,
            currency: draft.currency.clone(),
            shipping_price: draft.shipping_price,
            in_stock: draft.in_stock,
            product_url: draft.product_url.clone(),
            graphic_url: draft.graphic_url.clone(),
            keywords: String::new(),
            has_categories: false,
            deleted_at: None,
        };
        product.keywords = product.derived_keywords();
        product
    }

    /// The stored record with the draft's feed-owned fields applied.
    ///
    /// Identity, slug, curated overrides and soft-delete state are kept;
    /// keywords are re-derived from the resulting display text.
    pub fn with_draft(&self, draft: &ProductDraft) -> Self {
        let mut merged = Self {
            identifier: draft.identifier.clone(),
            name: draft.name.clone(),
            description: draft.description.clone(),
            price: draft.price,
            regular_price: draft.regular_price,
            currency: draft.currency.clone(),
            shipping_price: draft.shipping_price,
            in_stock: draft.in_stock,
            product_url: draft.product_url.clone(),
            graphic_url: draft.graphic_url.clone(),
            ..self.clone()
        };
        merged.keywords = merged.derived_keywords();
        merged
    }

    /// Name shown to shoppers: the curated override when present.
    pub fn display_name(&self) -> &str {
        match self.name_by_user.as_deref() {
            Some(n) if !n.is_empty() => n,
            _ => &self.name,
        }
    }

    /// Description shown to shoppers: the curated override when present.
    pub fn display_description(&self) -> &str {
        match self.description_by_user.as_deref() {
            Some(d) if !d.is_empty() => d,
            _ => &self.description,
        }
    }

    /// Keyword set computed from the current display text.
    pub fn derived_keywords(&self) -> String {
        derive_keywords(self.display_name(), self.display_description())
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Compare every field a feed can change, plus the derived keywords.
    pub fn same_observable_fields(&self, other: &Self) -> bool {
        self.name == other.name
            && self.identifier == other.identifier
            && self.description == other.description
            && self.price == other.price
            && self.regular_price == other.regular_price
            && self.currency == other.currency
            && self.shipping_price == other.shipping_price
            && self.in_stock == other.in_stock
            && self.product_url == other.product_url
            && self.graphic_url == other.graphic_url
            && self.keywords == other.keywords
    }
}

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// Site-scoped category, keyed by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// `None` until the category has been inserted.
    pub id: Option<CategoryId>,
    pub site_id: SiteId,
    pub name: String,
    pub slug: String,
    /// Comma-separated keyword list matched against product keywords.
    pub keywords: String,
    /// User-authored description.
    pub description: String,
    /// How the category came to exist. Never changes after creation.
    pub provenance: Provenance,
}

impl Category {
    /// A new category for a label first seen in a feed payload.
    pub fn from_feed_label(site_id: SiteId, label: &str) -> Self {
        Self {
            id: None,
            site_id,
            name: label.to_string(),
            slug: generate_slug(label),
            keywords: String::new(),
            description: String::new(),
            provenance: Provenance::Feed,
        }
    }

    /// Feed-created with nothing curated on it: removable once no feed declares it.
    pub fn is_uncurated_feed_category(&self) -> bool {
        self.provenance == Provenance::Feed
            && self.keywords.trim().is_empty()
            && self.description.trim().is_empty()
    }
}

// ---------------------------------------------------------------------------
// CategoryAssociation
// ---------------------------------------------------------------------------

/// Link between a category and a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryAssociation {
    /// `None` until the association has been inserted.
    pub id: Option<AssociationId>,
    pub category_id: CategoryId,
    /// Joined category name, for logs.
    pub category_name: String,
    pub product_id: ProductId,
    /// Why this link exists; independent of the category's own provenance.
    pub provenance: Provenance,
    /// Vetoes automatic detachment regardless of provenance.
    pub forced: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed() -> Feed {
        Feed {
            id: FeedId(7),
            site_id: SiteId(1),
            name: "Shoe shop".into(),
            url: "https://feeds.example.com/shoes.json".into(),
            network: NetworkKind::Adrecord,
            mapping: FieldMapping::default(),
            allow_empty_description: false,
            sync_categories: true,
        }
    }

    fn draft() -> ProductDraft {
        ProductDraft {
            identifier: "SKU-1".into(),
            name: "Red Shoes".into(),
            description: "Running shoes".into(),
            price: 499.0,
            regular_price: 599.0,
            currency: "SEK".into(),
            shipping_price: 49.0,
            in_stock: true,
            product_url: "https://shop.example.com/p/1".into(),
            graphic_url: "https://shop.example.com/i/1.jpg".into(),
            categories: vec!["Shoes".into()],
        }
    }

    #[test]
    fn from_draft_derives_slug_and_keywords() {
        let p = Product::from_draft(&draft(), &feed());
        assert_eq!(p.slug, "red-shoes");
        assert_eq!(p.keywords, "red,shoes,running");
        assert_eq!(p.feed_id, FeedId(7));
        assert!(p.id.is_none());
        assert!(p.is_active());
    }

    #[test]
    fn curated_overrides_take_precedence() {
        let mut p = Product::from_draft(&draft(), &feed());
        p.name_by_user = Some("Crimson Sneakers".into());
        p.description_by_user = Some(String::new());
        assert_eq!(p.display_name(), "Crimson Sneakers");
        assert_eq!(p.display_description(), "Running shoes");
        assert_eq!(p.derived_keywords(), "crimson,sneakers,running,shoes");
    }

    #[test]
    fn with_draft_keeps_identity_and_overrides() {
        let mut stored = Product::from_draft(&draft(), &feed());
        stored.id = Some(ProductId(3));
        stored.slug = "legacy-slug".into();
        stored.name_by_user = Some("Crimson Sneakers".into());

        let mut changed = draft();
        changed.price = 450.0;
        let merged = stored.with_draft(&changed);

        assert_eq!(merged.id, Some(ProductId(3)));
        assert_eq!(merged.slug, "legacy-slug");
        assert_eq!(merged.price, 450.0);
        assert_eq!(merged.keywords, "crimson,sneakers,running,shoes");
        assert!(!merged.same_observable_fields(&stored));
    }

    #[test]
    fn uncurated_feed_category() {
        let c = Category::from_feed_label(SiteId(1), "Outdoor Gear");
        assert_eq!(c.slug, "outdoor-gear");
        assert!(c.is_uncurated_feed_category());

        let curated = Category {
            keywords: "tent".into(),
            ..c
        };
        assert!(!curated.is_uncurated_feed_category());
    }
}
