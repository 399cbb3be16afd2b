//! Turso Embedded / libSQL storage layer.
//!
//! The [`Storage`] struct wraps a libSQL database holding sites, feeds,
//! products, the category catalog and category/product links. It implements
//! [`CatalogStore`], the contract the reconciliation engine depends on.
//!
//! A single connection is shared by every caller; SQLite serializes the
//! writes, the dispatcher bounds how many are in flight.

mod contract;
mod migrations;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feedsync_shared::{
    AssociationId, Category, CategoryAssociation, CategoryId, Feed, FeedId, FeedSyncError,
    FieldMapping, NetworkKind, Product, ProductId, Result, Site, SiteId,
};
use libsql::{Connection, Database, Rows, params};

pub use contract::CatalogStore;

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

/// A feed row to be created (see [`Storage::insert_feed`]).
#[derive(Debug, Clone)]
pub struct NewFeed {
    pub site_id: SiteId,
    pub name: String,
    pub url: String,
    pub network: NetworkKind,
    pub mapping: Option<FieldMapping>,
    pub allow_empty_description: bool,
    pub sync_categories: bool,
}

fn db_err(e: libsql::Error) -> FeedSyncError {
    FeedSyncError::Store(e.to_string())
}

const PRODUCT_COLUMNS: &str = "id, site_id, feed_id, identifier, name, name_by_user, slug, \
     description, description_by_user, price, regular_price, currency, shipping_price, \
     in_stock, url, graphic_url, keywords, has_categories, deleted_at";

impl Storage {
    /// Open or create a database at `path` and apply pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FeedSyncError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(db_err)?;

        let conn = db.connect().map_err(db_err)?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    FeedSyncError::Store(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    // -----------------------------------------------------------------------
    // Administration (sites & feeds)
    // -----------------------------------------------------------------------

    /// Create a site. Returns its id.
    pub async fn insert_site(&self, name: &str, subdomain: &str) -> Result<SiteId> {
        let rows = self
            .conn
            .query(
                "INSERT INTO sites (name, subdomain) VALUES (?1, ?2) RETURNING id",
                params![name, subdomain],
            )
            .await
            .map_err(db_err)?;
        returning_id(rows).await.map(SiteId)
    }

    /// Create a feed. Returns its id.
    pub async fn insert_feed(&self, feed: &NewFeed) -> Result<FeedId> {
        let mapping_json = feed
            .mapping
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| FeedSyncError::validation(format!("invalid field mapping: {e}")))?;

        let rows = self
            .conn
            .query(
                "INSERT INTO feeds (site_id, name, url, network, field_mapping_json,
                                    allow_empty_description, sync_categories)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) RETURNING id",
                params![
                    feed.site_id.0,
                    feed.name.as_str(),
                    feed.url.as_str(),
                    feed.network.as_str(),
                    mapping_json,
                    i64::from(feed.allow_empty_description),
                    i64::from(feed.sync_categories),
                ],
            )
            .await
            .map_err(db_err)?;
        returning_id(rows).await.map(FeedId)
    }
}

#[async_trait]
impl CatalogStore for Storage {
    async fn find_site(&self, subdomain: &str) -> Result<Option<Site>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, name, subdomain FROM sites WHERE subdomain = ?1",
                params![subdomain],
            )
            .await
            .map_err(db_err)?;

        match rows.next().await.map_err(db_err)? {
            Some(row) => Ok(Some(Site {
                id: SiteId(row.get::<i64>(0).map_err(db_err)?),
                name: row.get::<String>(1).map_err(db_err)?,
                subdomain: row.get::<String>(2).map_err(db_err)?,
            })),
            None => Ok(None),
        }
    }

    async fn list_feeds(&self, site: SiteId) -> Result<Vec<Feed>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, site_id, name, url, network, field_mapping_json,
                        allow_empty_description, sync_categories
                 FROM feeds WHERE site_id = ?1 ORDER BY id",
                params![site.0],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_feed(&row)?);
        }
        Ok(results)
    }

    async fn list_categories(&self, site: SiteId) -> Result<Vec<Category>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, site_id, name, slug, keywords, description, provenance
                 FROM categories WHERE site_id = ?1 ORDER BY id",
                params![site.0],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_category(&row)?);
        }
        Ok(results)
    }

    // Category deletes take their links along via the `categories_delete_links` trigger.
    async fn delete_unnamed_categories(&self, site: SiteId) -> Result<u64> {
        self.conn
            .execute(
                "DELETE FROM categories WHERE site_id = ?1 AND TRIM(name) = ''",
                params![site.0],
            )
            .await
            .map_err(db_err)
    }

    async fn list_products_by_feed(&self, feed: FeedId) -> Result<Vec<Product>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE feed_id = ?1 ORDER BY id"),
                params![feed.0],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(row_to_product(&row)?);
        }
        Ok(results)
    }

    async fn list_category_associations(
        &self,
        product: ProductId,
    ) -> Result<Vec<CategoryAssociation>> {
        let mut rows = self
            .conn
            .query(
                "SELECT cp.id, cp.category_id, c.name, cp.product_id, cp.provenance, cp.forced
                 FROM category_product cp
                 INNER JOIN categories c ON c.id = cp.category_id
                 WHERE cp.product_id = ?1
                 ORDER BY cp.id",
                params![product.0],
            )
            .await
            .map_err(db_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(db_err)? {
            results.push(CategoryAssociation {
                id: Some(AssociationId(row.get::<i64>(0).map_err(db_err)?)),
                category_id: CategoryId(row.get::<i64>(1).map_err(db_err)?),
                category_name: row.get::<String>(2).map_err(db_err)?,
                product_id: ProductId(row.get::<i64>(3).map_err(db_err)?),
                provenance: row.get::<String>(4).map_err(db_err)?.parse()?,
                forced: row.get::<i64>(5).map_err(db_err)? != 0,
            });
        }
        Ok(results)
    }

    async fn count_category_associations(&self, product: ProductId) -> Result<u64> {
        let rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM category_product WHERE product_id = ?1",
                params![product.0],
            )
            .await
            .map_err(db_err)?;
        count(rows).await
    }

    async fn count_protected_associations(&self, category: CategoryId) -> Result<u64> {
        let rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM category_product
                 WHERE category_id = ?1 AND (provenance = 'user' OR forced = 1)",
                params![category.0],
            )
            .await
            .map_err(db_err)?;
        count(rows).await
    }

    async fn insert_product(&self, product: &Product) -> Result<ProductId> {
        let now = Utc::now().to_rfc3339();
        let rows = self
            .conn
            .query(
                "INSERT INTO products (site_id, feed_id, identifier, name, slug, description,
                                       price, regular_price, currency, shipping_price, in_stock,
                                       url, graphic_url, keywords, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                 RETURNING id",
                params![
                    product.site_id.0,
                    product.feed_id.0,
                    product.identifier.as_str(),
                    product.name.as_str(),
                    product.slug.as_str(),
                    product.description.as_str(),
                    product.price,
                    product.regular_price,
                    product.currency.as_str(),
                    product.shipping_price,
                    i64::from(product.in_stock),
                    product.product_url.as_str(),
                    product.graphic_url.as_str(),
                    product.keywords.as_str(),
                    now.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;
        returning_id(rows).await.map(ProductId)
    }

    async fn update_product(&self, product: &Product) -> Result<()> {
        let id = product
            .id
            .ok_or_else(|| FeedSyncError::validation("cannot update a product without an id"))?;
        let now = Utc::now().to_rfc3339();
        let deleted_at = product.deleted_at.map(|t| t.to_rfc3339());
        self.conn
            .execute(
                "UPDATE products SET name = ?1, identifier = ?2, description = ?3,
                   price = ?4, regular_price = ?5, currency = ?6, shipping_price = ?7,
                   in_stock = ?8, url = ?9, graphic_url = ?10, keywords = ?11,
                   updated_at = ?12, deleted_at = ?13
                 WHERE id = ?14",
                params![
                    product.name.as_str(),
                    product.identifier.as_str(),
                    product.description.as_str(),
                    product.price,
                    product.regular_price,
                    product.currency.as_str(),
                    product.shipping_price,
                    i64::from(product.in_stock),
                    product.product_url.as_str(),
                    product.graphic_url.as_str(),
                    product.keywords.as_str(),
                    now.as_str(),
                    deleted_at,
                    id.0,
                ],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn soft_delete_product(&self, product: ProductId) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE products SET deleted_at = ?1, updated_at = ?1
                 WHERE id = ?2 AND deleted_at IS NULL",
                params![now.as_str(), product.0],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn sync_has_categories(&self, product: ProductId) -> Result<()> {
        self.conn
            .execute(
                "UPDATE products \
                 SET has_categories = EXISTS(SELECT 1 FROM category_product WHERE product_id = ?1) \
                 WHERE id = ?1 \
                 AND has_categories != EXISTS(SELECT 1 FROM category_product WHERE product_id = ?1)",
                params![product.0],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn insert_category(&self, category: &Category) -> Result<CategoryId> {
        let now = Utc::now().to_rfc3339();
        let rows = self
            .conn
            .query(
                "INSERT INTO categories (site_id, name, slug, keywords, description, provenance, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) RETURNING id",
                params![
                    category.site_id.0,
                    category.name.as_str(),
                    category.slug.as_str(),
                    category.keywords.as_str(),
                    category.description.as_str(),
                    category.provenance.as_str(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;
        returning_id(rows).await.map(CategoryId)
    }

    async fn delete_category(&self, category: CategoryId) -> Result<()> {
        self.conn
            .execute("DELETE FROM categories WHERE id = ?1", params![category.0])
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn insert_category_association(
        &self,
        association: &CategoryAssociation,
    ) -> Result<AssociationId> {
        let now = Utc::now().to_rfc3339();
        let rows = self
            .conn
            .query(
                "INSERT INTO category_product (category_id, product_id, provenance, forced, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5) RETURNING id",
                params![
                    association.category_id.0,
                    association.product_id.0,
                    association.provenance.as_str(),
                    i64::from(association.forced),
                    now.as_str(),
                ],
            )
            .await
            .map_err(db_err)?;
        returning_id(rows).await.map(AssociationId)
    }

    async fn delete_category_association(&self, association: AssociationId) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM category_product WHERE id = ?1",
                params![association.0],
            )
            .await
            .map_err(db_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row helpers
// ---------------------------------------------------------------------------

/// Read the id produced by an `INSERT ... RETURNING id`.
async fn returning_id(mut rows: Rows) -> Result<i64> {
    match rows.next().await.map_err(db_err)? {
        Some(row) => row.get::<i64>(0).map_err(db_err),
        None => Err(FeedSyncError::Store("insert returned no id".into())),
    }
}

/// Read a single `COUNT(*)` value.
async fn count(mut rows: Rows) -> Result<u64> {
    match rows.next().await.map_err(db_err)? {
        Some(row) => Ok(row.get::<i64>(0).map_err(db_err)?.max(0) as u64),
        None => Ok(0),
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| FeedSyncError::Store(format!("invalid date '{s}': {e}")))
}

/// Convert a database row to a [`Feed`].
fn row_to_feed(row: &libsql::Row) -> Result<Feed> {
    let network: NetworkKind = row.get::<String>(4).map_err(db_err)?.parse()?;
    let mapping = match row.get::<String>(5).ok() {
        Some(json) if !json.trim().is_empty() => serde_json::from_str(&json).map_err(|e| {
            FeedSyncError::config(format!("invalid field mapping on feed: {e}"))
        })?,
        _ => FieldMapping::default(),
    };

    Ok(Feed {
        id: FeedId(row.get::<i64>(0).map_err(db_err)?),
        site_id: SiteId(row.get::<i64>(1).map_err(db_err)?),
        name: row.get::<String>(2).map_err(db_err)?,
        url: row.get::<String>(3).map_err(db_err)?,
        network,
        mapping,
        allow_empty_description: row.get::<i64>(6).map_err(db_err)? != 0,
        sync_categories: row.get::<i64>(7).map_err(db_err)? != 0,
    })
}

/// Convert a database row to a [`Category`].
fn row_to_category(row: &libsql::Row) -> Result<Category> {
    Ok(Category {
        id: Some(CategoryId(row.get::<i64>(0).map_err(db_err)?)),
        site_id: SiteId(row.get::<i64>(1).map_err(db_err)?),
        name: row.get::<String>(2).map_err(db_err)?,
        slug: row.get::<String>(3).unwrap_or_default(),
        keywords: row.get::<String>(4).unwrap_or_default(),
        description: row.get::<String>(5).unwrap_or_default(),
        provenance: row.get::<String>(6).map_err(db_err)?.parse()?,
    })
}

/// Convert a database row (selected with [`PRODUCT_COLUMNS`]) to a [`Product`].
fn row_to_product(row: &libsql::Row) -> Result<Product> {
    let deleted_at = match row.get::<String>(18).ok() {
        Some(s) => Some(parse_timestamp(&s)?),
        None => None,
    };

    Ok(Product {
        id: Some(ProductId(row.get::<i64>(0).map_err(db_err)?)),
        site_id: SiteId(row.get::<i64>(1).map_err(db_err)?),
        feed_id: FeedId(row.get::<i64>(2).map_err(db_err)?),
        identifier: row.get::<String>(3).map_err(db_err)?,
        name: row.get::<String>(4).map_err(db_err)?,
        name_by_user: row.get::<String>(5).ok(),
        slug: row.get::<String>(6).map_err(db_err)?,
        description: row.get::<String>(7).map_err(db_err)?,
        description_by_user: row.get::<String>(8).ok(),
        price: row.get::<f64>(9).unwrap_or(0.0),
        regular_price: row.get::<f64>(10).unwrap_or(0.0),
        currency: row.get::<String>(11).map_err(db_err)?,
        shipping_price: row.get::<f64>(12).unwrap_or(0.0),
        in_stock: row.get::<i64>(13).map_err(db_err)? != 0,
        product_url: row.get::<String>(14).map_err(db_err)?,
        graphic_url: row.get::<String>(15).map_err(db_err)?,
        keywords: row.get::<String>(16).map_err(db_err)?,
        has_categories: row.get::<i64>(17).map_err(db_err)? != 0,
        deleted_at,
    })
}
