//! Product reconciliation: diff a feed's parsed drafts against its stored products.

use std::collections::{BTreeMap, HashMap};

use feedsync_shared::{Feed, Product, ProductDraft};
use tracing::debug;

use crate::mutation::{DbAction, Entity, MutationMessage, Origin};

/// Compute the mutations that bring a feed's stored products in line with
/// its freshly parsed drafts.
///
/// Drafts are keyed by identifier; on duplicates the last one wins. At most
/// one message is emitted per identifier, and none when nothing changed:
///
/// - in feed only: insert (unless its description is empty and the feed
///   disallows that)
/// - in both: update when an observable field differs or the stored record
///   is soft-deleted; soft-delete instead when the incoming description is
///   empty and disallowed
/// - in store only and still active: soft-delete
pub fn reconcile_products(
    feed: &Feed,
    drafts: Vec<ProductDraft>,
    stored: &[Product],
) -> Vec<MutationMessage> {
    let origin = Origin::Feed(feed.id);

    let incoming: BTreeMap<String, ProductDraft> = drafts
        .into_iter()
        .map(|d| (d.identifier.clone(), d))
        .collect();
    let stored_by_identifier: HashMap<&str, &Product> =
        stored.iter().map(|p| (p.identifier.as_str(), p)).collect();

    let mut messages = Vec::new();

    for (identifier, draft) in &incoming {
        let empty_disallowed =
            !feed.allow_empty_description && draft.description.trim().is_empty();

        match stored_by_identifier.get(identifier.as_str()) {
            None if empty_disallowed => {
                debug!(identifier = %identifier, "skipping new product with empty description");
            }
            None => messages.push(MutationMessage::new(
                origin,
                Entity::Product(Product::from_draft(draft, feed)),
                DbAction::Insert,
            )),
            Some(current) if empty_disallowed => {
                if current.is_active() {
                    messages.push(MutationMessage::new(
                        origin,
                        Entity::Product((*current).clone()),
                        DbAction::Delete,
                    ));
                }
            }
            Some(current) => {
                let mut merged = current.with_draft(draft);
                if !current.is_active() || !merged.same_observable_fields(current) {
                    merged.deleted_at = None;
                    messages.push(MutationMessage::new(
                        origin,
                        Entity::Product(merged),
                        DbAction::Update,
                    ));
                }
            }
        }
    }

    for current in stored {
        if current.is_active() && !incoming.contains_key(&current.identifier) {
            messages.push(MutationMessage::new(
                origin,
                Entity::Product(current.clone()),
                DbAction::Delete,
            ));
        }
    }

    messages
}
