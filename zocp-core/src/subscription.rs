//! Subscription registry: the dual tables of spec §3/§4.4.
//!
//! Both `subscriptions` (remote emitters → local receivers) and
//! `subscribers` (local emitters → remote receivers) are instances of
//! the same shape, so a single `SubscriptionTable` type is reused for
//! both, keyed by peer id, adapted from the teacher's
//! `SubscriptionIndex` (a peer-keyed map-of-vec with prune-on-empty,
//! there used for prefix matching) to the peer/emitter/receiver
//! triples this protocol actually needs.

use hashbrown::HashMap;
use smallvec::SmallVec;

use crate::presence_id::PeerId;

/// Most emitters have a small, single-digit number of receivers;
/// inline storage avoids a heap allocation for the common case.
type Receivers = SmallVec<[Option<String>; 4]>;

/// `emit_peer/recv_peer -> emitter_name (None = wildcard) -> ordered
/// list of receiver names (None = "fire the callback only")`.
#[derive(Debug, Clone, Default)]
pub struct SubscriptionTable {
    table: HashMap<PeerId, HashMap<Option<String>, Receivers>>,
}

impl SubscriptionTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `(emitter, receiver)` under `peer`. Idempotent: a
    /// duplicate tuple is not appended twice (spec §8 property 7).
    /// Returns `true` if the tuple was newly inserted.
    pub fn insert(&mut self, peer: PeerId, emitter: Option<String>, receiver: Option<String>) -> bool {
        let receivers = self.table.entry(peer).or_default().entry(emitter).or_default();
        if receivers.contains(&receiver) {
            false
        } else {
            receivers.push(receiver);
            true
        }
    }

    /// Remove `(emitter, receiver)` from under `peer`, pruning empty
    /// inner and outer maps. Returns `true` if it was present.
    pub fn remove(&mut self, peer: &PeerId, emitter: &Option<String>, receiver: &Option<String>) -> bool {
        let Some(peer_map) = self.table.get_mut(peer) else {
            return false;
        };
        let Some(receivers) = peer_map.get_mut(emitter) else {
            return false;
        };
        let before = receivers.len();
        receivers.retain(|r| r != receiver);
        let removed = receivers.len() != before;

        if receivers.is_empty() {
            peer_map.remove(emitter);
        }
        if peer_map.is_empty() {
            self.table.remove(peer);
        }
        removed
    }

    /// Purge every entry belonging to `peer` (spec invariant 4, on
    /// EXIT).
    pub fn remove_peer(&mut self, peer: &PeerId) {
        self.table.remove(peer);
    }

    /// `true` if `peer` has a wildcard subscription (`None` emitter)
    /// or a subscription to `name` specifically.
    #[must_use]
    pub fn matches(&self, peer: &PeerId, name: &str) -> bool {
        let Some(peer_map) = self.table.get(peer) else {
            return false;
        };
        peer_map.contains_key(&None) || peer_map.contains_key(&Some(name.to_string()))
    }

    /// `true` if `peer` has a wildcard subscription, or a subscription
    /// to at least one name in `names`. Used for MOD fan-out, where a
    /// single frame can touch several top-level capability keys at
    /// once (spec §4.5).
    #[must_use]
    pub fn matches_any(&self, peer: &PeerId, names: &[String]) -> bool {
        let Some(peer_map) = self.table.get(peer) else {
            return false;
        };
        peer_map.contains_key(&None) || names.iter().any(|n| peer_map.contains_key(&Some(n.clone())))
    }

    /// Receivers registered for `(peer, emitter)`, used for inbound
    /// SIG propagation (spec §4.5). Does not consider the wildcard
    /// entry — callers that need "subscribed to everything" semantics
    /// combine this with `matches`.
    #[must_use]
    pub fn receivers_for(&self, peer: &PeerId, emitter: &str) -> &[Option<String>] {
        self.table
            .get(peer)
            .and_then(|m| m.get(&Some(emitter.to_string())))
            .map(SmallVec::as_slice)
            .unwrap_or(&[])
    }

    /// All peers with at least one subscription entry, used for
    /// MOD/SIG fan-out iteration (spec §4.5).
    pub fn peers(&self) -> impl Iterator<Item = &PeerId> {
        self.table.keys()
    }

    /// `true` if `peer` is present in the table at all.
    #[must_use]
    pub fn contains_peer(&self, peer: &PeerId) -> bool {
        self.table.contains_key(peer)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(n: u8) -> PeerId {
        PeerId::from_bytes([n; 16])
    }

    #[test]
    fn insert_is_idempotent() {
        let mut t = SubscriptionTable::new();
        assert!(t.insert(peer(1), Some("Emit".into()), Some("Recv".into())));
        assert!(!t.insert(peer(1), Some("Emit".into()), Some("Recv".into())));
        assert_eq!(t.receivers_for(&peer(1), "Emit"), &[Some("Recv".to_string())]);
    }

    #[test]
    fn remove_prunes_empty_maps() {
        let mut t = SubscriptionTable::new();
        t.insert(peer(1), Some("Emit".into()), Some("Recv".into()));
        assert!(t.remove(&peer(1), &Some("Emit".into()), &Some("Recv".into())));
        assert!(t.is_empty());
    }

    #[test]
    fn remove_peer_purges_everything() {
        let mut t = SubscriptionTable::new();
        t.insert(peer(1), Some("A".into()), None);
        t.insert(peer(1), Some("B".into()), Some("R".into()));
        t.remove_peer(&peer(1));
        assert!(t.is_empty());
    }

    #[test]
    fn wildcard_emitter_matches_any_name() {
        let mut t = SubscriptionTable::new();
        t.insert(peer(1), None, Some("R".into()));
        assert!(t.matches(&peer(1), "Anything"));
    }

    #[test]
    fn matches_is_false_for_unknown_peer() {
        let t = SubscriptionTable::new();
        assert!(!t.matches(&peer(9), "X"));
    }

    #[test]
    fn matches_any_checks_every_candidate_name() {
        let mut t = SubscriptionTable::new();
        t.insert(peer(1), Some("A".into()), None);
        assert!(t.matches_any(&peer(1), &["B".to_string(), "A".to_string()]));
        assert!(!t.matches_any(&peer(1), &["B".to_string(), "C".to_string()]));
    }

    #[test]
    fn multiple_receivers_preserve_insertion_order() {
        let mut t = SubscriptionTable::new();
        t.insert(peer(1), Some("E".into()), Some("R1".into()));
        t.insert(peer(1), Some("E".into()), Some("R2".into()));
        assert_eq!(
            t.receivers_for(&peer(1), "E"),
            &[Some("R1".to_string()), Some("R2".to_string())]
        );
    }
}
