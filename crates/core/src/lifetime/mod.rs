//! Lifetime tracking: entries, the sweep that decides which are alive, and the
//! entity/nesting bookkeeping around them.

mod entry;
mod entry_manager;
mod manager;

pub use entry::LifetimeEntry;
pub use entry_manager::HitObjectEntryManager;
pub use manager::{
    BoundaryKind, CrossingDirection, LifetimeEntryManager, LifetimeEvent, LifetimeState,
};
