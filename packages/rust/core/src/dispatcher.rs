//! Bounded worker pool that executes store mutations.
//!
//! A fixed number of workers drain one shared bounded queue. Each worker
//! runs one mutation to completion before taking the next, so the pool size
//! is a hard ceiling on concurrent store writes for the whole process. Idle
//! workers park on the queue; they never poll.

use std::sync::Arc;
use std::time::Instant;

use async_channel as chan;
use feedsync_shared::{DispatcherConfig, FeedSyncError, ProductId};
use feedsync_storage::CatalogStore;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, trace, warn};

use crate::mutation::{Applied, DbAction, Entity, MutationFailure, MutationMessage};

/// Result of executing one mutation.
pub type MutationResult = std::result::Result<Applied, MutationFailure>;

/// A queued mutation plus the channel its result goes back on.
struct Envelope {
    message: MutationMessage,
    reply: mpsc::Sender<MutationResult>,
}

// ---------------------------------------------------------------------------
// BatchOutcome
// ---------------------------------------------------------------------------

/// Everything that came back for one submitted batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub applied: Vec<Applied>,
    pub failures: Vec<MutationFailure>,
}

impl BatchOutcome {
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty() && self.failures.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Handle to the worker pool. Cheap to clone; all clones share the pool.
///
/// Workers exit once every handle is dropped and the queue has drained.
#[derive(Clone)]
pub struct Dispatcher {
    queue: chan::Sender<Envelope>,
    workers: Arc<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Spawn `config.workers` workers on the current tokio runtime.
    pub fn spawn(store: Arc<dyn CatalogStore>, config: &DispatcherConfig) -> Self {
        let (queue, inbox) = chan::bounded::<Envelope>(config.queue_capacity.max(1));

        let workers = (0..config.workers.max(1))
            .map(|worker_id| {
                let inbox = inbox.clone();
                let store = Arc::clone(&store);
                tokio::spawn(
                    run_worker(inbox, store).instrument(info_span!("dispatcher_worker", worker_id)),
                )
            })
            .collect();

        info!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            "dispatcher started"
        );

        Self {
            queue,
            workers: Arc::new(workers),
        }
    }

    /// Number of workers in the pool.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Enqueue a batch and wait for every result.
    ///
    /// The reply channel is sized to the batch, so workers never wait on the
    /// submitter. Results arrive in completion order.
    pub async fn run_batch(&self, messages: Vec<MutationMessage>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        if messages.is_empty() {
            return outcome;
        }

        let start = Instant::now();
        let (reply, mut results) = mpsc::channel(messages.len());
        let mut expected = 0usize;

        for message in messages {
            let envelope = Envelope {
                message,
                reply: reply.clone(),
            };
            match self.queue.send(envelope).await {
                Ok(()) => expected += 1,
                Err(chan::SendError(envelope)) => {
                    let message = envelope.message;
                    outcome.failures.push(MutationFailure {
                        origin: message.origin,
                        action: message.action,
                        target: message.target(),
                        error: FeedSyncError::Store("dispatcher is shut down".into()),
                    });
                }
            }
        }
        drop(reply);

        while expected > 0 {
            match results.recv().await {
                Some(Ok(applied)) => outcome.applied.push(applied),
                Some(Err(failure)) => outcome.failures.push(failure),
                None => break,
            }
            expected -= 1;
        }

        debug!(
            applied = outcome.applied.len(),
            failed = outcome.failures.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "batch settled"
        );
        outcome
    }
}

async fn run_worker(inbox: chan::Receiver<Envelope>, store: Arc<dyn CatalogStore>) {
    trace!("worker waiting for mutations");
    while let Ok(Envelope { message, reply }) = inbox.recv().await {
        let origin = message.origin;
        let result = message.apply(store.as_ref()).await;

        match &result {
            Ok(applied) => {
                if let Some(product_id) = association_product(applied) {
                    sync_has_categories(store.as_ref(), product_id).await;
                }
            }
            Err(failure) => {
                error!(
                    %origin,
                    action = %failure.action,
                    target = %failure.target,
                    error = %failure.error,
                    "mutation failed"
                );
            }
        }

        if reply.send(result).await.is_err() {
            warn!(%origin, "mutation result dropped: submitter went away");
        }
    }
    trace!("mutation queue closed, worker exiting");
}

/// The product whose link set an applied mutation changed, if any.
fn association_product(applied: &Applied) -> Option<ProductId> {
    match (&applied.entity, applied.action) {
        (Entity::Association(a), DbAction::Insert | DbAction::Delete) => Some(a.product_id),
        _ => None,
    }
}

/// Mirror the product's current link count onto `has_categories`.
///
/// The store recomputes the flag in a single statement, so concurrent
/// workers touching the same product can't leave a stale value behind.
async fn sync_has_categories(store: &dyn CatalogStore, product_id: ProductId) {
    if let Err(e) = store.sync_has_categories(product_id).await {
        warn!(product_id = %product_id, error = %e, "failed to update has_categories");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::Origin;
    use std::time::Duration;

    use crate::test_support::{sample_feed, seeded_storage};
    use async_trait::async_trait;
    use feedsync_shared::{
        AssociationId, Category, CategoryAssociation, CategoryId, Feed, FeedId, Product,
        ProductDraft, Provenance, Result, Site, SiteId,
    };
    use feedsync_storage::Storage;

    fn draft(identifier: &str) -> ProductDraft {
        ProductDraft {
            identifier: identifier.into(),
            name: format!("Boot {identifier}"),
            description: "Leather boots".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn batch_results_all_come_back() {
        let (storage, feed) = seeded_storage(sample_feed()).await;
        let dispatcher = Dispatcher::spawn(
            storage.clone(),
            &DispatcherConfig {
                workers: 3,
                queue_capacity: 2,
            },
        );
        assert_eq!(dispatcher.worker_count(), 3);

        let messages: Vec<MutationMessage> = (0..20)
            .map(|i| {
                MutationMessage::new(
                    Origin::Feed(feed.id),
                    Entity::Product(Product::from_draft(&draft(&format!("B{i}")), &feed)),
                    DbAction::Insert,
                )
            })
            .collect();

        let outcome = dispatcher.run_batch(messages).await;
        assert_eq!(outcome.applied.len(), 20);
        assert!(outcome.failures.is_empty());
        assert_eq!(storage.list_products_by_feed(feed.id).await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn failures_are_reported_per_mutation() {
        let (storage, feed) = seeded_storage(sample_feed()).await;
        let dispatcher = Dispatcher::spawn(storage.clone(), &DispatcherConfig::default());

        let product = Product::from_draft(&draft("DUP"), &feed);
        let messages = vec![
            MutationMessage::new(
                Origin::Feed(feed.id),
                Entity::Product(product.clone()),
                DbAction::Insert,
            ),
            MutationMessage::new(Origin::Feed(feed.id), Entity::Product(product), DbAction::Insert),
        ];

        let outcome = dispatcher.run_batch(messages).await;
        assert_eq!(outcome.applied.len(), 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].error.kind(), "store");
        assert_eq!(outcome.failures[0].origin, Origin::Feed(feed.id));
    }

    #[tokio::test]
    async fn has_categories_follows_links() {
        let (storage, feed) = seeded_storage(sample_feed()).await;
        let dispatcher = Dispatcher::spawn(storage.clone(), &DispatcherConfig::default());

        let product_id = storage
            .insert_product(&Product::from_draft(&draft("B1"), &feed))
            .await
            .unwrap();
        let category_id = storage
            .insert_category(&Category::from_feed_label(feed.site_id, "Boots"))
            .await
            .unwrap();

        let attach = MutationMessage::new(
            Origin::Feed(feed.id),
            Entity::Association(CategoryAssociation {
                id: None,
                category_id,
                category_name: "Boots".into(),
                product_id,
                provenance: Provenance::Feed,
                forced: false,
            }),
            DbAction::Insert,
        );
        let outcome = dispatcher.run_batch(vec![attach]).await;
        assert!(storage.list_products_by_feed(feed.id).await.unwrap()[0].has_categories);

        let Entity::Association(link) = outcome.applied[0].entity.clone() else {
            panic!("expected an association");
        };
        let detach = MutationMessage::new(
            Origin::Feed(feed.id),
            Entity::Association(link),
            DbAction::Delete,
        );
        dispatcher.run_batch(vec![detach]).await;
        assert!(!storage.list_products_by_feed(feed.id).await.unwrap()[0].has_categories);
    }

    #[tokio::test]
    async fn empty_batch_is_noop() {
        let (storage, _feed) = seeded_storage(sample_feed()).await;
        let dispatcher = Dispatcher::spawn(storage, &DispatcherConfig::default());
        assert!(dispatcher.run_batch(vec![]).await.is_empty());
    }

    /// Delegates to [`Storage`], stalling link inserts and the flag sync so
    /// concurrent workers interleave.
    struct SlowStore {
        inner: Arc<Storage>,
    }

    #[async_trait]
    impl CatalogStore for SlowStore {
        async fn find_site(&self, subdomain: &str) -> Result<Option<Site>> {
            self.inner.find_site(subdomain).await
        }
        async fn list_feeds(&self, site: SiteId) -> Result<Vec<Feed>> {
            self.inner.list_feeds(site).await
        }
        async fn list_categories(&self, site: SiteId) -> Result<Vec<Category>> {
            self.inner.list_categories(site).await
        }
        async fn delete_unnamed_categories(&self, site: SiteId) -> Result<u64> {
            self.inner.delete_unnamed_categories(site).await
        }
        async fn list_products_by_feed(&self, feed: FeedId) -> Result<Vec<Product>> {
            self.inner.list_products_by_feed(feed).await
        }
        async fn list_category_associations(
            &self,
            product: ProductId,
        ) -> Result<Vec<CategoryAssociation>> {
            self.inner.list_category_associations(product).await
        }
        async fn count_category_associations(&self, product: ProductId) -> Result<u64> {
            self.inner.count_category_associations(product).await
        }
        async fn count_protected_associations(&self, category: CategoryId) -> Result<u64> {
            self.inner.count_protected_associations(category).await
        }
        async fn insert_product(&self, product: &Product) -> Result<ProductId> {
            self.inner.insert_product(product).await
        }
        async fn update_product(&self, product: &Product) -> Result<()> {
            self.inner.update_product(product).await
        }
        async fn soft_delete_product(&self, product: ProductId) -> Result<()> {
            self.inner.soft_delete_product(product).await
        }
        async fn sync_has_categories(&self, product: ProductId) -> Result<()> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            self.inner.sync_has_categories(product).await
        }
        async fn insert_category(&self, category: &Category) -> Result<CategoryId> {
            self.inner.insert_category(category).await
        }
        async fn delete_category(&self, category: CategoryId) -> Result<()> {
            self.inner.delete_category(category).await
        }
        async fn insert_category_association(
            &self,
            association: &CategoryAssociation,
        ) -> Result<AssociationId> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.inner.insert_category_association(association).await
        }
        async fn delete_category_association(&self, association: AssociationId) -> Result<()> {
            self.inner.delete_category_association(association).await
        }
    }

    #[tokio::test]
    async fn has_categories_consistent_when_attach_and_detach_interleave() {
        let (storage, feed) = seeded_storage(sample_feed()).await;
        let product_id = storage
            .insert_product(&Product::from_draft(&draft("B1"), &feed))
            .await
            .unwrap();
        let boots = storage
            .insert_category(&Category::from_feed_label(feed.site_id, "Boots"))
            .await
            .unwrap();
        let winter = storage
            .insert_category(&Category::from_feed_label(feed.site_id, "Winter"))
            .await
            .unwrap();

        let link = |category_id, name: &str| CategoryAssociation {
            id: None,
            category_id,
            category_name: name.into(),
            product_id,
            provenance: Provenance::Keyword,
            forced: false,
        };
        let mut old_link = link(boots, "Boots");
        old_link.id = Some(storage.insert_category_association(&old_link).await.unwrap());
        storage.sync_has_categories(product_id).await.unwrap();

        let slow: Arc<dyn CatalogStore> = Arc::new(SlowStore {
            inner: storage.clone(),
        });
        let dispatcher = Dispatcher::spawn(slow, &DispatcherConfig::default());
        let origin = Origin::Feed(feed.id);
        let outcome = dispatcher
            .run_batch(vec![
                MutationMessage::new(origin, Entity::Association(old_link), DbAction::Delete),
                MutationMessage::new(
                    origin,
                    Entity::Association(link(winter, "Winter")),
                    DbAction::Insert,
                ),
            ])
            .await;
        assert_eq!(outcome.applied.len(), 2);

        let links = storage.count_category_associations(product_id).await.unwrap();
        let product = &storage.list_products_by_feed(feed.id).await.unwrap()[0];
        assert_eq!(links, 1);
        assert_eq!(product.has_categories, links > 0);
    }
}
