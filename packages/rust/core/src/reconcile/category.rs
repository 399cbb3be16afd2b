//! Category reconciliation: decide which category links a product gains or loses.
//!
//! Three sources justify a link: the feed declaring the category (FEED),
//! the category's keywords matching the product's keywords (KEYWORD), and a
//! human creating it (USER). Automatic passes only ever remove links they
//! could have created themselves, and never a forced one.

use std::collections::{HashMap, HashSet};

use feedsync_shared::{
    Category, CategoryAssociation, CategoryId, Feed, Product, Provenance, text::keywords_overlap,
};

use crate::mutation::{DbAction, Entity, MutationMessage, Origin};

/// Reconciles one feed's products against the site's category catalog.
pub struct CategoryReconciler<'a> {
    catalog: &'a [Category],
    feed: &'a Feed,
}

impl<'a> CategoryReconciler<'a> {
    pub fn new(catalog: &'a [Category], feed: &'a Feed) -> Self {
        Self { catalog, feed }
    }

    /// Compute attach/detach mutations for one stored product.
    ///
    /// `declared` holds the category names the feed payload declared for the
    /// product. On an update pass with category sync enabled these are
    /// attached with FEED provenance and outdated FEED links are dropped;
    /// links the pass can't justify are detached unless USER-created. A
    /// refresh pass only detaches KEYWORD links. Duplicate links to a
    /// category are pruned down to the most protected one.
    pub fn reconcile(
        &self,
        product: &Product,
        stored: &[CategoryAssociation],
        declared: &[String],
        is_update_pass: bool,
    ) -> Vec<MutationMessage> {
        let Some(product_id) = product.id else {
            return vec![];
        };
        let origin = Origin::Feed(self.feed.id);

        let keyword_categories: Vec<&Category> = self
            .catalog
            .iter()
            .filter(|c| c.id.is_some() && keywords_overlap(&c.keywords, &product.keywords))
            .collect();

        let stored_ids: HashSet<CategoryId> = stored.iter().map(|a| a.category_id).collect();
        let mut justified: HashSet<CategoryId> = HashSet::new();
        let mut to_attach: Vec<(&Category, Provenance)> = Vec::new();

        if is_update_pass && self.feed.sync_categories {
            let feed_categories = self
                .catalog
                .iter()
                .filter(|c| c.id.is_some() && declared.iter().any(|name| *name == c.name));
            for category in feed_categories {
                let Some(id) = category.id else { continue };
                if !stored_ids.contains(&id) && !justified.contains(&id) {
                    to_attach.push((category, Provenance::Feed));
                }
                justified.insert(id);
            }
        }

        for category in keyword_categories {
            let Some(id) = category.id else { continue };
            if !stored_ids.contains(&id) && !justified.contains(&id) {
                to_attach.push((category, Provenance::Keyword));
            }
            justified.insert(id);
        }

        let mut messages: Vec<MutationMessage> = to_attach
            .into_iter()
            .filter_map(|(category, provenance)| {
                let category_id = category.id?;
                Some(MutationMessage::new(
                    origin,
                    Entity::Association(CategoryAssociation {
                        id: None,
                        category_id,
                        category_name: category.name.clone(),
                        product_id,
                        provenance,
                        forced: false,
                    }),
                    DbAction::Insert,
                ))
            })
            .collect();

        let detach: Vec<bool> = stored
            .iter()
            .map(|a| !justified.contains(&a.category_id) && self.may_detach(a, is_update_pass))
            .collect();

        // One link survives per category: forced first, then USER, then the
        // oldest. Stored links are ordered oldest first.
        let mut survivor: HashMap<CategoryId, usize> = HashMap::new();
        for (index, association) in stored.iter().enumerate() {
            if detach[index] {
                continue;
            }
            survivor
                .entry(association.category_id)
                .and_modify(|best| {
                    if survival_rank(association) < survival_rank(&stored[*best]) {
                        *best = index;
                    }
                })
                .or_insert(index);
        }

        for (index, association) in stored.iter().enumerate() {
            if detach[index] || survivor.get(&association.category_id) != Some(&index) {
                messages.push(MutationMessage::new(
                    origin,
                    Entity::Association(association.clone()),
                    DbAction::Delete,
                ));
            }
        }

        messages
    }

    /// Whether an automatic pass is allowed to remove this link.
    fn may_detach(&self, association: &CategoryAssociation, is_update_pass: bool) -> bool {
        if association.forced {
            return false;
        }
        if is_update_pass {
            association.provenance != Provenance::User
        } else {
            association.provenance == Provenance::Keyword
        }
    }
}

/// Lower ranks win when a category is linked more than once.
fn survival_rank(association: &CategoryAssociation) -> u8 {
    match (association.forced, association.provenance) {
        (true, _) => 0,
        (false, Provenance::User) => 1,
        (false, _) => 2,
    }
}
