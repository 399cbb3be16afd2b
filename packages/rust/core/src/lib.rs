//! Reconciliation and orchestration engine for feedsync.
//!
//! This crate turns parsed feed payloads into store mutations and runs them:
//! - [`reconcile`] — product and category reconcilers (pure)
//! - [`dispatcher`] — bounded worker pool executing mutations
//! - [`session`] — site runs (`update`, `refresh`) and their admission

pub mod catalog;
pub mod dispatcher;
pub mod mutation;
pub mod progress;
pub mod reconcile;
pub mod report;
pub mod session;

pub use catalog::RunCatalog;
pub use dispatcher::{BatchOutcome, Dispatcher, MutationResult};
pub use mutation::{Applied, DbAction, Entity, MutationFailure, MutationMessage, Origin};
pub use progress::{RunProgress, SilentProgress};
pub use reconcile::{CategoryReconciler, reconcile_products};
pub use report::{FeedOutcome, FeedReport, RunKind, RunReport, Tally};
pub use session::{Ack, Orchestrator, Response};

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use feedsync_shared::{Feed, NetworkKind, SiteId};
    use feedsync_storage::{CatalogStore, NewFeed, Storage};
    use uuid::Uuid;

    /// A feed definition; its site is filled in by [`seeded_storage`].
    pub(crate) fn sample_feed() -> NewFeed {
        NewFeed {
            site_id: SiteId(0),
            name: "Shoe feed".into(),
            url: "https://feeds.example.com/shoes.json".into(),
            network: NetworkKind::Adrecord,
            mapping: None,
            allow_empty_description: false,
            sync_categories: true,
        }
    }

    /// Temp-file storage holding site `shoes` and one feed.
    pub(crate) async fn seeded_storage(feed: NewFeed) -> (Arc<Storage>, Feed) {
        let tmp = std::env::temp_dir().join(format!("fs_core_{}.db", Uuid::now_v7()));
        let storage = Storage::open(&tmp).await.expect("open test db");
        let site = storage.insert_site("Shoes", "shoes").await.unwrap();
        storage
            .insert_feed(&NewFeed {
                site_id: site,
                ..feed
            })
            .await
            .unwrap();
        let feed = storage.list_feeds(site).await.unwrap().remove(0);
        (Arc::new(storage), feed)
    }
}
