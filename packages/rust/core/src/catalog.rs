//! Run-scoped view of a site's category catalog.

use std::collections::HashSet;

use feedsync_shared::{Category, SiteId};
use tokio::sync::{Mutex, RwLock};

/// The category catalog as one run sees it.
///
/// Loaded once when the run starts and shared by every feed task of that
/// run. Labels not yet in the catalog are claimed by exactly one feed so a
/// category is inserted once even when several feeds declare it.
pub struct RunCatalog {
    site_id: SiteId,
    categories: RwLock<Vec<Category>>,
    claimed: Mutex<HashSet<String>>,
}

impl RunCatalog {
    pub fn new(site_id: SiteId, categories: Vec<Category>) -> Self {
        let claimed = categories.iter().map(|c| c.name.clone()).collect();
        Self {
            site_id,
            categories: RwLock::new(categories),
            claimed: Mutex::new(claimed),
        }
    }

    pub fn site_id(&self) -> SiteId {
        self.site_id
    }

    /// Claim the labels neither in the catalog nor claimed by another feed.
    /// Returns the labels the caller is now responsible for inserting.
    pub async fn claim_new_labels(&self, labels: &[String]) -> Vec<String> {
        let mut claimed = self.claimed.lock().await;
        labels
            .iter()
            .filter(|label| claimed.insert((*label).clone()))
            .cloned()
            .collect()
    }

    /// Add a category inserted during this run.
    pub async fn absorb(&self, category: Category) {
        let mut categories = self.categories.write().await;
        if !categories.iter().any(|c| c.id == category.id) {
            categories.push(category);
        }
    }

    /// The current catalog, including categories absorbed so far.
    pub async fn snapshot(&self) -> Vec<Category> {
        self.categories.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use feedsync_shared::{CategoryId, Provenance};

    fn existing(name: &str) -> Category {
        Category {
            id: Some(CategoryId(1)),
            provenance: Provenance::User,
            ..Category::from_feed_label(SiteId(1), name)
        }
    }

    #[tokio::test]
    async fn labels_claimed_once() {
        let catalog = RunCatalog::new(SiteId(1), vec![existing("Shoes")]);

        let first = catalog
            .claim_new_labels(&["Shoes".into(), "Boots".into(), "Socks".into()])
            .await;
        assert_eq!(first, vec!["Boots", "Socks"]);

        let second = catalog
            .claim_new_labels(&["Boots".into(), "Sandals".into()])
            .await;
        assert_eq!(second, vec!["Sandals"]);
    }

    #[tokio::test]
    async fn absorbed_categories_visible_in_snapshot() {
        let catalog = RunCatalog::new(SiteId(1), vec![existing("Shoes")]);
        let mut boots = Category::from_feed_label(SiteId(1), "Boots");
        boots.id = Some(CategoryId(2));

        catalog.absorb(boots.clone()).await;
        catalog.absorb(boots).await;

        let names: Vec<String> = catalog.snapshot().await.into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Shoes", "Boots"]);
    }
}
