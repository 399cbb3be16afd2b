//! Reconcilers turn "what the feed says" plus "what the store holds" into
//! mutation messages. Both are pure: no I/O, no store access.

mod category;
mod product;

pub use category::CategoryReconciler;
pub use product::reconcile_products;
