//! The store contract consumed by the reconciliation engine.

use async_trait::async_trait;

use feedsync_shared::{
    AssociationId, Category, CategoryAssociation, CategoryId, Feed, FeedId, Product, ProductId,
    Result, Site, SiteId,
};

/// Everything the engine reads from and writes to the catalog store.
///
/// Implementations must be safe to call concurrently from every dispatcher
/// worker at once.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Look up a site by subdomain.
    async fn find_site(&self, subdomain: &str) -> Result<Option<Site>>;

    /// All feeds configured for a site. Fails with a config error when a
    /// feed names an unknown network variant.
    async fn list_feeds(&self, site: SiteId) -> Result<Vec<Feed>>;

    /// The site's category catalog.
    async fn list_categories(&self, site: SiteId) -> Result<Vec<Category>>;

    /// Remove categories whose name is empty or whitespace. Returns the count removed.
    async fn delete_unnamed_categories(&self, site: SiteId) -> Result<u64>;

    /// Every product of a feed, soft-deleted ones included.
    async fn list_products_by_feed(&self, feed: FeedId) -> Result<Vec<Product>>;

    /// A product's category links, oldest first.
    async fn list_category_associations(
        &self,
        product: ProductId,
    ) -> Result<Vec<CategoryAssociation>>;

    async fn count_category_associations(&self, product: ProductId) -> Result<u64>;

    /// Links to a category that automatic cleanup must not destroy
    /// (USER provenance or forced).
    async fn count_protected_associations(&self, category: CategoryId) -> Result<u64>;

    async fn insert_product(&self, product: &Product) -> Result<ProductId>;

    /// Write feed-owned fields, keywords and the soft-delete marker.
    async fn update_product(&self, product: &Product) -> Result<()>;

    async fn soft_delete_product(&self, product: ProductId) -> Result<()>;

    /// Recompute `has_categories` from the product's current links in one
    /// statement. Writes only when the flag changes.
    async fn sync_has_categories(&self, product: ProductId) -> Result<()>;

    async fn insert_category(&self, category: &Category) -> Result<CategoryId>;

    /// Delete a category and its links.
    async fn delete_category(&self, category: CategoryId) -> Result<()>;

    async fn insert_category_association(
        &self,
        association: &CategoryAssociation,
    ) -> Result<AssociationId>;

    async fn delete_category_association(&self, association: AssociationId) -> Result<()>;
}
