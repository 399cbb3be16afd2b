//! Store mutations: the unit of work handed to the dispatcher.
//!
//! Reconcilers emit [`MutationMessage`]s; a dispatcher worker executes each
//! exactly once with [`MutationMessage::apply`] and reports an [`Applied`]
//! or a [`MutationFailure`] back to whoever enqueued it.

use std::fmt;

use feedsync_shared::{
    Category, CategoryAssociation, FeedId, FeedSyncError, Product, Result, SiteId,
};
use feedsync_storage::CatalogStore;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Who a mutation is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "id")]
pub enum Origin {
    /// Produced while processing a feed.
    Feed(FeedId),
    /// Site-level maintenance (orphan category removal).
    Site(SiteId),
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Feed(id) => write!(f, "feed #{id}"),
            Self::Site(id) => write!(f, "site #{id}"),
        }
    }
}

/// The entity a mutation operates on, carrying the full record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum Entity {
    Product(Product),
    Category(Category),
    Association(CategoryAssociation),
}

/// The store action to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DbAction {
    Insert,
    Update,
    /// Soft delete for products; physical delete otherwise.
    Delete,
}

impl fmt::Display for DbAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

/// One pending store mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationMessage {
    pub origin: Origin,
    pub entity: Entity,
    pub action: DbAction,
}

/// A mutation that reached the store.
#[derive(Debug, Clone, Serialize)]
pub struct Applied {
    pub origin: Origin,
    pub action: DbAction,
    /// The entity as written; inserted entities carry their new id.
    pub entity: Entity,
    /// Human-readable summary, e.g. `Inserted product: 'Red Shoes'.`
    pub description: String,
}

/// A mutation the store rejected.
#[derive(Debug)]
pub struct MutationFailure {
    pub origin: Origin,
    pub action: DbAction,
    /// What the mutation targeted, for logs.
    pub target: String,
    pub error: FeedSyncError,
}

impl fmt::Display for MutationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} failed: {}", self.action, self.target, self.error)
    }
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

impl MutationMessage {
    pub fn new(origin: Origin, entity: Entity, action: DbAction) -> Self {
        Self {
            origin,
            entity,
            action,
        }
    }

    /// Short label naming the target entity, for logs and failures.
    pub fn target(&self) -> String {
        match &self.entity {
            Entity::Product(p) => format!("product '{}'", p.identifier),
            Entity::Category(c) => format!("category '{}'", c.name),
            Entity::Association(a) => format!(
                "association '{}' on product #{}",
                a.category_name, a.product_id
            ),
        }
    }

    /// Execute against the store.
    pub async fn apply(
        self,
        store: &dyn CatalogStore,
    ) -> std::result::Result<Applied, MutationFailure> {
        let origin = self.origin;
        let action = self.action;
        let target = self.target();

        match self.execute(store).await {
            Ok((entity, description)) => Ok(Applied {
                origin,
                action,
                entity,
                description,
            }),
            Err(error) => Err(MutationFailure {
                origin,
                action,
                target,
                error,
            }),
        }
    }

    async fn execute(self, store: &dyn CatalogStore) -> Result<(Entity, String)> {
        match (self.entity, self.action) {
            (Entity::Product(mut product), DbAction::Insert) => {
                let id = store.insert_product(&product).await?;
                product.id = Some(id);
                let description = format!("Inserted product: '{}'.", product.display_name());
                Ok((Entity::Product(product), description))
            }
            (Entity::Product(product), DbAction::Update) => {
                store.update_product(&product).await?;
                let description = format!("Updated product: '{}'.", product.display_name());
                Ok((Entity::Product(product), description))
            }
            (Entity::Product(product), DbAction::Delete) => {
                let id = product.id.ok_or_else(|| {
                    FeedSyncError::validation("cannot delete a product without an id")
                })?;
                store.soft_delete_product(id).await?;
                let description = format!("Deleted product: '{}'.", product.display_name());
                Ok((Entity::Product(product), description))
            }
            (Entity::Category(mut category), DbAction::Insert) => {
                let id = store.insert_category(&category).await?;
                category.id = Some(id);
                let description = format!("Inserted category: '{}'.", category.name);
                Ok((Entity::Category(category), description))
            }
            (Entity::Category(category), DbAction::Delete) => {
                let id = category.id.ok_or_else(|| {
                    FeedSyncError::validation("cannot delete a category without an id")
                })?;
                store.delete_category(id).await?;
                let description = format!("Deleted category: '{}'.", category.name);
                Ok((Entity::Category(category), description))
            }
            (Entity::Association(mut association), DbAction::Insert) => {
                let id = store.insert_category_association(&association).await?;
                association.id = Some(id);
                let description = format!(
                    "Attached category '{}' ({}) to product #{}.",
                    association.category_name, association.provenance, association.product_id
                );
                Ok((Entity::Association(association), description))
            }
            (Entity::Association(association), DbAction::Delete) => {
                let id = association.id.ok_or_else(|| {
                    FeedSyncError::validation("cannot delete an association without an id")
                })?;
                store.delete_category_association(id).await?;
                let description = format!(
                    "Detached category '{}' ({}) from product #{}.",
                    association.category_name, association.provenance, association.product_id
                );
                Ok((Entity::Association(association), description))
            }
            (entity, action) => Err(FeedSyncError::validation(format!(
                "unsupported mutation: {action} on {}",
                entity_kind(&entity)
            ))),
        }
    }
}

fn entity_kind(entity: &Entity) -> &'static str {
    match entity {
        Entity::Product(_) => "product",
        Entity::Category(_) => "category",
        Entity::Association(_) => "association",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{sample_feed, seeded_storage};
    use feedsync_shared::{ProductDraft, Provenance};

    fn draft() -> ProductDraft {
        ProductDraft {
            identifier: "SKU-1".into(),
            name: "Red Shoes".into(),
            description: "Running shoes".into(),
            price: 499.0,
            currency: "SEK".into(),
            in_stock: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn insert_then_soft_delete_product() {
        let (storage, feed) = seeded_storage(sample_feed()).await;
        let store: &dyn CatalogStore = &*storage;

        let insert = MutationMessage::new(
            Origin::Feed(feed.id),
            Entity::Product(Product::from_draft(&draft(), &feed)),
            DbAction::Insert,
        );
        let applied = insert.apply(store).await.expect("insert");
        assert_eq!(applied.description, "Inserted product: 'Red Shoes'.");
        let Entity::Product(inserted) = applied.entity else {
            panic!("expected a product");
        };
        assert!(inserted.id.is_some());

        let delete = MutationMessage::new(
            Origin::Feed(feed.id),
            Entity::Product(inserted),
            DbAction::Delete,
        );
        let applied = delete.apply(store).await.expect("delete");
        assert_eq!(applied.description, "Deleted product: 'Red Shoes'.");

        let stored = store.list_products_by_feed(feed.id).await.unwrap();
        assert!(!stored[0].is_active());
    }

    #[tokio::test]
    async fn unsupported_combination_is_validation_failure() {
        let (storage, feed) = seeded_storage(sample_feed()).await;
        let message = MutationMessage::new(
            Origin::Site(feed.site_id),
            Entity::Category(Category::from_feed_label(feed.site_id, "Shoes")),
            DbAction::Update,
        );
        let failure = message.apply(&*storage).await.unwrap_err();
        assert_eq!(failure.error.kind(), "validation");
        assert_eq!(failure.target, "category 'Shoes'");
    }

    #[tokio::test]
    async fn delete_without_id_fails() {
        let (storage, feed) = seeded_storage(sample_feed()).await;
        let message = MutationMessage::new(
            Origin::Feed(feed.id),
            Entity::Association(CategoryAssociation {
                id: None,
                category_id: 1.into(),
                category_name: "Shoes".into(),
                product_id: 1.into(),
                provenance: Provenance::Keyword,
                forced: false,
            }),
            DbAction::Delete,
        );
        let failure = message.apply(&*storage).await.unwrap_err();
        assert_eq!(failure.error.kind(), "validation");
    }
}
