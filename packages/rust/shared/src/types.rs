//! Identifier newtypes and tag enums shared by every feedsync crate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FeedSyncError;

// ---------------------------------------------------------------------------
// Row identifiers
// ---------------------------------------------------------------------------

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

row_id!(
    /// Primary key of a row in `sites`.
    SiteId
);
row_id!(
    /// Primary key of a row in `feeds`.
    FeedId
);
row_id!(
    /// Primary key of a row in `products`.
    ProductId
);
row_id!(
    /// Primary key of a row in `categories`.
    CategoryId
);
row_id!(
    /// Primary key of a row in `category_product`.
    AssociationId
);

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 identifying one orchestrated run (time-sortable), used in log spans.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Provenance
// ---------------------------------------------------------------------------

/// Why a category or a category association exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Created by a human.
    User,
    /// Declared in a feed payload.
    Feed,
    /// Derived from keyword matching against product text.
    Keyword,
}

impl Provenance {
    /// Column value stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Feed => "feed",
            Self::Keyword => "keyword",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provenance {
    type Err = FeedSyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "feed" => Ok(Self::Feed),
            "keyword" => Ok(Self::Keyword),
            other => Err(FeedSyncError::validation(format!(
                "unknown provenance '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// NetworkKind
// ---------------------------------------------------------------------------

/// The affiliate network a feed is published by; selects the parser adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    Adrecord,
    Adtraction,
    Tradedoubler,
    /// Generic JSON feed driven entirely by the feed's [`FieldMapping`].
    Mapped,
}

impl NetworkKind {
    /// Column value stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Adrecord => "adrecord",
            Self::Adtraction => "adtraction",
            Self::Tradedoubler => "tradedoubler",
            Self::Mapped => "mapped",
        }
    }
}

impl fmt::Display for NetworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NetworkKind {
    type Err = FeedSyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "adrecord" => Ok(Self::Adrecord),
            "adtraction" => Ok(Self::Adtraction),
            "tradedoubler" => Ok(Self::Tradedoubler),
            "mapped" => Ok(Self::Mapped),
            other => Err(FeedSyncError::config(format!(
                "unknown network variant '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// FieldMapping
// ---------------------------------------------------------------------------

/// Payload field names for the `mapped` network variant.
///
/// Stored as JSON on the feed row. Every field has a default so a partial
/// mapping is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMapping {
    /// Top-level key holding the product array.
    pub products: String,
    pub identifier: String,
    pub name: String,
    pub description: String,
    pub price: String,
    pub regular_price: String,
    pub currency: String,
    pub shipping_price: String,
    pub in_stock: String,
    pub product_url: String,
    pub graphic_url: String,
    /// Key holding categories: either an array of strings or one delimited string.
    pub categories: String,
    /// Delimiter used when `categories` is a single string.
    pub category_delimiter: String,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            products: "products".into(),
            identifier: "sku".into(),
            name: "name".into(),
            description: "description".into(),
            price: "price".into(),
            regular_price: "regular_price".into(),
            currency: "currency".into(),
            shipping_price: "shipping_price".into(),
            in_stock: "in_stock".into(),
            product_url: "url".into(),
            graphic_url: "image_url".into(),
            categories: "categories".into(),
            category_delimiter: ",".into(),
        }
    }
}
