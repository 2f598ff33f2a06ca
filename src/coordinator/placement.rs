//! Key assignment
//!
//! Each item goes to the ring member at `hash(key) % n`, peers ordered by
//! ascending id. This is flat modulo placement, not consistent hashing:
//! any join or leave re-maps most keys, and items already placed are
//! never moved.

use crate::common::{Error, PeerId, Result};
use crate::coordinator::dataset::Item;
use crate::coordinator::ring::Ring;
use std::collections::BTreeMap;

/// Group items by owning peer. Refuses an empty ring without doing any work.
pub fn assign(items: &[Item], ring: &Ring) -> Result<BTreeMap<PeerId, Vec<Item>>> {
    if ring.is_empty() {
        return Err(Error::EmptyRegistry);
    }

    let mut plan: BTreeMap<PeerId, Vec<Item>> = BTreeMap::new();
    for item in items {
        let owner = ring.owner_of(&item.key).ok_or(Error::EmptyRegistry)?;
        plan.entry(owner.id).or_default().push(item.clone());
    }
    Ok(plan)
}
