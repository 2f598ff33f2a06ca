//! Ring derivation
//!
//! The ring is never stored: it is the registry's records sorted by
//! ascending id, with the last peer wrapping around to the first. Every
//! membership change produces a fresh `Ring` from a registry snapshot.

use crate::common::{owner_index, PeerId};
use crate::coordinator::registry::PeerRecord;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ring {
    members: Vec<PeerRecord>,
}

impl Ring {
    pub fn from_peers(peers: impl IntoIterator<Item = PeerRecord>) -> Self {
        let mut members: Vec<PeerRecord> = peers.into_iter().collect();
        members.sort_by_key(|p| p.id);
        Self { members }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members in ring order
    pub fn members(&self) -> &[PeerRecord] {
        &self.members
    }

    /// Successor of `id`, if `id` is on the ring. A lone peer is its own successor.
    pub fn successor_of(&self, id: PeerId) -> Option<&PeerRecord> {
        let pos = self.members.iter().position(|p| p.id == id)?;
        Some(&self.members[(pos + 1) % self.members.len()])
    }

    /// `(peer, successor)` for every member, in ring order
    pub fn successors(&self) -> impl Iterator<Item = (&PeerRecord, &PeerRecord)> + '_ {
        let n = self.members.len();
        self.members
            .iter()
            .enumerate()
            .map(move |(i, peer)| (peer, &self.members[(i + 1) % n]))
    }

    /// Owner of `key` under flat modulo placement
    pub fn owner_of(&self, key: &str) -> Option<&PeerRecord> {
        owner_index(key, self.members.len()).map(|idx| &self.members[idx])
    }
}
