//! Session orchestration: full-site update and refresh runs.
//!
//! A run is triggered per site and executes in the background. Only one run
//! proceeds at a time across the whole process: every run holds the single
//! admission permit from start to finish, and later triggers queue behind it.
//!
//! Update run:
//! 1. Remove unnamed categories, load the feeds and the category catalog
//! 2. Per feed, concurrently: fetch, parse, reconcile products, insert
//!    newly declared categories
//! 3. Once every feed settled: category pass over every product
//! 4. If every feed succeeded: remove orphaned feed categories
//!
//! Refresh run: recompute product keywords, then a category pass that only
//! touches keyword links.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use feedsync_networks::{AdapterRegistry, FeedFetcher, pending_category_labels};
use feedsync_shared::{AppConfig, Category, Feed, FeedSyncError, Result, RunId, Site};
use feedsync_storage::CatalogStore;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};

use crate::catalog::RunCatalog;
use crate::dispatcher::{BatchOutcome, Dispatcher};
use crate::mutation::{DbAction, Entity, MutationMessage, Origin};
use crate::progress::{RunProgress, SilentProgress};
use crate::reconcile::{CategoryReconciler, reconcile_products};
use crate::report::{FeedOutcome, FeedReport, RunKind, RunReport, Tally};

/// Category names a feed declared, per product identifier.
type Declarations = HashMap<String, Vec<String>>;

// ---------------------------------------------------------------------------
// Acknowledgement
// ---------------------------------------------------------------------------

/// Immediate answer to a trigger. The run itself continues in the background.
#[derive(Debug)]
pub enum Ack {
    /// The run was scheduled; await the handle for its report.
    Accepted {
        run_id: RunId,
        site: String,
        kind: RunKind,
        handle: JoinHandle<Result<RunReport>>,
    },
    /// The site exists but has no feeds; nothing to do.
    NoFeeds,
    /// The site could not be resolved or its feeds could not be loaded.
    Rejected(String),
}

/// Serializable acknowledgement body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    pub message: String,
}

impl Ack {
    pub fn response(&self) -> Response {
        match self {
            Self::Accepted { site, kind, .. } => Response {
                success: true,
                message: format!("Started {kind} of site '{site}'."),
            },
            Self::NoFeeds => Response {
                success: false,
                message: "No feeds found for site.".into(),
            },
            Self::Rejected(reason) => Response {
                success: false,
                message: reason.clone(),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Schedules and executes site runs.
///
/// Build one per process; clones share the store, the dispatcher and the
/// admission permit.
#[derive(Clone)]
pub struct Orchestrator {
    store: Arc<dyn CatalogStore>,
    dispatcher: Dispatcher,
    fetcher: FeedFetcher,
    registry: Arc<AdapterRegistry>,
    admission: Arc<Semaphore>,
    progress: Arc<dyn RunProgress>,
}

/// What one feed's product pass produced for the later phases.
struct FeedSync {
    tally: Tally,
    declarations: Declarations,
    labels: Vec<String>,
}

/// Feed reports plus everything the category pass needs.
struct FeedPhase {
    reports: Vec<FeedReport>,
    /// Per feed: its declarations when its product pass succeeded.
    passes: Vec<(Feed, Option<Declarations>)>,
    labels: HashSet<String>,
}

impl Orchestrator {
    pub fn new(store: Arc<dyn CatalogStore>, dispatcher: Dispatcher, fetcher: FeedFetcher) -> Self {
        Self {
            store,
            dispatcher,
            fetcher,
            registry: Arc::new(AdapterRegistry::new()),
            admission: Arc::new(Semaphore::new(1)),
            progress: Arc::new(SilentProgress),
        }
    }

    /// Spawn a dispatcher and build a fetcher from configuration.
    pub fn from_config(store: Arc<dyn CatalogStore>, config: &AppConfig) -> Result<Self> {
        let dispatcher = Dispatcher::spawn(Arc::clone(&store), &config.dispatcher);
        let fetcher = FeedFetcher::new(&config.fetch)?;
        Ok(Self::new(store, dispatcher, fetcher))
    }

    /// Report progress of every run to `progress`.
    pub fn with_progress(mut self, progress: Arc<dyn RunProgress>) -> Self {
        self.progress = progress;
        self
    }

    /// Schedule a run for the site with this subdomain.
    #[instrument(skip_all, fields(site = %subdomain, %kind))]
    pub async fn trigger(&self, subdomain: &str, kind: RunKind) -> Ack {
        let site = match self.store.find_site(subdomain).await {
            Ok(Some(site)) => site,
            Ok(None) => return Ack::Rejected(format!("Site '{subdomain}' not found.")),
            Err(e) => return Ack::Rejected(format!("Site lookup failed: {e}")),
        };

        match self.store.list_feeds(site.id).await {
            Ok(feeds) if feeds.is_empty() => {
                info!("site has no feeds, nothing to run");
                return Ack::NoFeeds;
            }
            Ok(_) => {}
            Err(e) => return Ack::Rejected(format!("Loading feeds failed: {e}")),
        }

        let run_id = RunId::new();
        let span = info_span!("run", %run_id, site = %site.subdomain, %kind);
        let subdomain = site.subdomain.clone();
        let this = self.clone();
        let task_run_id = run_id.clone();
        let handle = tokio::spawn(
            async move { this.run(site, kind, task_run_id).await }.instrument(span),
        );

        Ack::Accepted {
            run_id,
            site: subdomain,
            kind,
            handle,
        }
    }

    async fn run(self, site: Site, kind: RunKind, run_id: RunId) -> Result<RunReport> {
        self.progress.phase("Waiting for admission");
        let _permit = Arc::clone(&self.admission)
            .acquire_owned()
            .await
            .map_err(|_| FeedSyncError::config("run admission closed"))?;

        let start = Instant::now();
        info!("run started");

        let result = match kind {
            RunKind::Update => self.run_update(&site).await,
            RunKind::Refresh => self.run_refresh(&site).await,
        };

        match result {
            Ok((feeds, category_pass, orphans_removed)) => {
                let report = RunReport {
                    run_id,
                    site: site.subdomain,
                    kind,
                    feeds,
                    category_pass,
                    orphans_removed,
                    elapsed: start.elapsed(),
                };
                info!(
                    feeds = report.feeds.len(),
                    failed_feeds = report.failed_feeds(),
                    category_applied = report.category_pass.applied,
                    category_failed = report.category_pass.failed,
                    orphans_removed,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "run complete"
                );
                self.progress.done(&report);
                Ok(report)
            }
            Err(e) => {
                error!(kind = e.kind(), error = %e, "run aborted");
                Err(e)
            }
        }
    }

    // -----------------------------------------------------------------------
    // Update
    // -----------------------------------------------------------------------

    async fn run_update(&self, site: &Site) -> Result<(Vec<FeedReport>, Tally, usize)> {
        self.progress.phase("Removing unnamed categories");
        let removed = self.store.delete_unnamed_categories(site.id).await?;
        if removed > 0 {
            info!(removed, "removed unnamed categories");
        }

        self.progress.phase("Loading feeds and categories");
        let feeds = self.store.list_feeds(site.id).await?;
        let catalog = Arc::new(RunCatalog::new(
            site.id,
            self.store.list_categories(site.id).await?,
        ));

        self.progress.phase("Syncing feeds");
        let phase = self.sync_feeds(feeds, &catalog).await;
        let all_succeeded = phase.reports.iter().all(|r| r.outcome.is_done());

        self.progress.phase("Categorizing products");
        let categories = Arc::new(catalog.snapshot().await);
        let category_pass = self.category_pass(phase.passes, &categories).await;

        let orphans_removed = if all_succeeded {
            self.progress.phase("Removing orphaned categories");
            self.remove_orphans(site, &categories, &phase.labels).await?
        } else {
            warn!("skipping orphan category cleanup: not every feed succeeded");
            0
        };

        Ok((phase.reports, category_pass, orphans_removed))
    }

    /// Run every feed's product pass concurrently and wait for all of them.
    async fn sync_feeds(&self, feeds: Vec<Feed>, catalog: &Arc<RunCatalog>) -> FeedPhase {
        let handles: Vec<(Feed, JoinHandle<Result<FeedSync>>)> = feeds
            .into_iter()
            .map(|feed| {
                let this = self.clone();
                let catalog = Arc::clone(catalog);
                let task_feed = feed.clone();
                let handle = tokio::spawn(
                    async move { this.sync_feed(&task_feed, &catalog).await }.in_current_span(),
                );
                (feed, handle)
            })
            .collect();

        let mut phase = FeedPhase {
            reports: Vec::with_capacity(handles.len()),
            passes: Vec::with_capacity(handles.len()),
            labels: HashSet::new(),
        };

        for (feed, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(FeedSyncError::Store(format!("feed task failed: {e}"))),
            };

            let outcome = match result {
                Ok(sync) => {
                    phase.labels.extend(sync.labels);
                    phase.passes.push((feed.clone(), Some(sync.declarations)));
                    FeedOutcome::Done(sync.tally)
                }
                Err(e) => {
                    warn!(feed = %feed.name, kind = e.kind(), error = %e, "feed failed");
                    phase.passes.push((feed.clone(), None));
                    FeedOutcome::failed(&e)
                }
            };

            let report = FeedReport {
                feed_id: feed.id,
                feed_name: feed.name,
                outcome,
            };
            self.progress.feed_settled(&report);
            phase.reports.push(report);
        }

        phase
    }

    /// Fetch, parse and reconcile one feed's products.
    #[instrument(skip_all, fields(feed = %feed.name, network = %feed.network))]
    async fn sync_feed(&self, feed: &Feed, catalog: &RunCatalog) -> Result<FeedSync> {
        let start = Instant::now();

        let raw = self.fetcher.fetch(feed).await?;
        let adapter = self.registry.adapter_for(feed.network)?;
        let drafts = adapter.parse_products(&raw, &feed.mapping)?;
        let draft_count = drafts.len();

        let labels = pending_category_labels(&drafts);
        let declarations: Declarations = drafts
            .iter()
            .map(|d| (d.identifier.clone(), d.categories.clone()))
            .collect();
        let new_labels = catalog.claim_new_labels(&labels).await;

        let stored = self.store.list_products_by_feed(feed.id).await?;
        let origin = Origin::Feed(feed.id);
        let mut messages = reconcile_products(feed, drafts, &stored);
        messages.extend(new_labels.iter().map(|label| {
            MutationMessage::new(
                origin,
                Entity::Category(Category::from_feed_label(catalog.site_id(), label)),
                DbAction::Insert,
            )
        }));
        let planned = messages.len();

        let outcome = self.dispatcher.run_batch(messages).await;
        for applied in &outcome.applied {
            if let Entity::Category(category) = &applied.entity {
                catalog.absorb(category.clone()).await;
            }
        }
        log_outcome(&outcome);

        let mut tally = Tally::default();
        tally.add(&outcome);
        info!(
            drafts = draft_count,
            stored = stored.len(),
            planned,
            applied = tally.applied,
            failed = tally.failed,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "feed synced"
        );

        Ok(FeedSync {
            tally,
            declarations,
            labels,
        })
    }

    /// Delete feed-created categories nothing declares or protects any more.
    async fn remove_orphans(
        &self,
        site: &Site,
        categories: &[Category],
        declared: &HashSet<String>,
    ) -> Result<usize> {
        let mut messages = Vec::new();
        for category in categories {
            let Some(id) = category.id else { continue };
            if !category.is_uncurated_feed_category() || declared.contains(&category.name) {
                continue;
            }
            if self.store.count_protected_associations(id).await? > 0 {
                debug!(category = %category.name, "orphan kept: protected links");
                continue;
            }
            messages.push(MutationMessage::new(
                Origin::Site(site.id),
                Entity::Category(category.clone()),
                DbAction::Delete,
            ));
        }

        let outcome = self.dispatcher.run_batch(messages).await;
        log_outcome(&outcome);
        Ok(outcome.applied.len())
    }

    // -----------------------------------------------------------------------
    // Refresh
    // -----------------------------------------------------------------------

    async fn run_refresh(&self, site: &Site) -> Result<(Vec<FeedReport>, Tally, usize)> {
        self.progress.phase("Loading feeds and categories");
        let feeds = self.store.list_feeds(site.id).await?;
        let categories = Arc::new(self.store.list_categories(site.id).await?);

        self.progress.phase("Recomputing keywords");
        let handles: Vec<(Feed, JoinHandle<Result<Tally>>)> = feeds
            .into_iter()
            .map(|feed| {
                let this = self.clone();
                let task_feed = feed.clone();
                let handle = tokio::spawn(
                    async move { this.refresh_keywords(&task_feed).await }.in_current_span(),
                );
                (feed, handle)
            })
            .collect();

        let mut reports = Vec::with_capacity(handles.len());
        let mut passes = Vec::with_capacity(handles.len());
        for (feed, handle) in handles {
            let outcome = match handle.await {
                Ok(Ok(tally)) => FeedOutcome::Done(tally),
                Ok(Err(e)) => {
                    warn!(feed = %feed.name, kind = e.kind(), error = %e, "keyword refresh failed");
                    FeedOutcome::failed(&e)
                }
                Err(e) => FeedOutcome::failed(&FeedSyncError::Store(format!(
                    "feed task failed: {e}"
                ))),
            };
            let report = FeedReport {
                feed_id: feed.id,
                feed_name: feed.name.clone(),
                outcome,
            };
            self.progress.feed_settled(&report);
            reports.push(report);
            passes.push((feed, None));
        }

        self.progress.phase("Categorizing products");
        let category_pass = self.category_pass(passes, &categories).await;

        Ok((reports, category_pass, 0))
    }

    /// Re-derive each active product's keywords; update only those that changed.
    #[instrument(skip_all, fields(feed = %feed.name))]
    async fn refresh_keywords(&self, feed: &Feed) -> Result<Tally> {
        let products = self.store.list_products_by_feed(feed.id).await?;
        let messages: Vec<MutationMessage> = products
            .into_iter()
            .filter(|p| p.is_active())
            .filter_map(|mut product| {
                let keywords = product.derived_keywords();
                if keywords == product.keywords {
                    return None;
                }
                product.keywords = keywords;
                Some(MutationMessage::new(
                    Origin::Feed(feed.id),
                    Entity::Product(product),
                    DbAction::Update,
                ))
            })
            .collect();

        let outcome = self.dispatcher.run_batch(messages).await;
        log_outcome(&outcome);
        let mut tally = Tally::default();
        tally.add(&outcome);
        info!(updated = tally.applied, failed = tally.failed, "keywords refreshed");
        Ok(tally)
    }

    // -----------------------------------------------------------------------
    // Category pass
    // -----------------------------------------------------------------------

    /// Reconcile category links of every active product, one task per feed.
    ///
    /// A feed with declarations gets update-pass semantics; one without
    /// (refresh runs, feeds whose product pass failed) only has its keyword
    /// links maintained.
    async fn category_pass(
        &self,
        passes: Vec<(Feed, Option<Declarations>)>,
        categories: &Arc<Vec<Category>>,
    ) -> Tally {
        let handles: Vec<(String, JoinHandle<Result<Tally>>)> = passes
            .into_iter()
            .map(|(feed, declarations)| {
                let this = self.clone();
                let categories = Arc::clone(categories);
                let name = feed.name.clone();
                let handle = tokio::spawn(
                    async move { this.categorize_feed(&feed, declarations, &categories).await }
                        .in_current_span(),
                );
                (name, handle)
            })
            .collect();

        let mut total = Tally::default();
        for (feed_name, handle) in handles {
            match handle.await {
                Ok(Ok(tally)) => {
                    total.applied += tally.applied;
                    total.failed += tally.failed;
                }
                Ok(Err(e)) => {
                    warn!(feed = %feed_name, kind = e.kind(), error = %e, "category pass failed");
                }
                Err(e) => {
                    error!(feed = %feed_name, error = %e, "category task failed");
                }
            }
        }
        total
    }

    #[instrument(skip_all, fields(feed = %feed.name, update_pass = declarations.is_some()))]
    async fn categorize_feed(
        &self,
        feed: &Feed,
        declarations: Option<Declarations>,
        categories: &[Category],
    ) -> Result<Tally> {
        let is_update_pass = declarations.is_some();
        let declarations = declarations.unwrap_or_default();
        let reconciler = CategoryReconciler::new(categories, feed);

        let products = self.store.list_products_by_feed(feed.id).await?;
        let mut messages = Vec::new();
        for product in products.iter().filter(|p| p.is_active()) {
            let Some(product_id) = product.id else { continue };
            let stored = self.store.list_category_associations(product_id).await?;
            let declared = declarations
                .get(&product.identifier)
                .map(Vec::as_slice)
                .unwrap_or_default();
            messages.extend(reconciler.reconcile(product, &stored, declared, is_update_pass));
        }

        let outcome = self.dispatcher.run_batch(messages).await;
        log_outcome(&outcome);
        let mut tally = Tally::default();
        tally.add(&outcome);
        info!(
            products = products.len(),
            applied = tally.applied,
            failed = tally.failed,
            "categories reconciled"
        );
        Ok(tally)
    }
}

/// Per-mutation results: debug on success, warn on failure.
fn log_outcome(outcome: &BatchOutcome) {
    for applied in &outcome.applied {
        debug!(origin = %applied.origin, action = %applied.action, "{}", applied.description);
    }
    for failure in &outcome.failures {
        warn!(origin = %failure.origin, kind = failure.error.kind(), "{failure}");
    }
}
