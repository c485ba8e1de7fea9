//! The presence substrate contract (spec §6): ZOCP's engine never
//! touches the network directly, it drives whatever implements
//! `Presence`. `MockPresence` is a same-process simulated fabric for
//! tests and examples, grounded in the teacher's `RouterHub`
//! (`router.rs`): a peer table keyed by id, each entry holding a
//! `flume::Sender` used to hand the peer its own inbox.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use std::time::Duration;

use bytes::Bytes;
use flume::{Receiver, Sender};
use hashbrown::HashMap;

use zocp_core::error::{Result, ZocpError};
pub use zocp_core::frame::PresenceEvent;
pub use zocp_core::presence_id::PeerId;

/// The external collaborator contract a ZOCP node drives its protocol
/// engine on top of. One real implementation is a ZRE/Pyre client;
/// `MockPresence` is the in-process stand-in used by tests.
pub trait Presence {
    fn uuid(&self) -> PeerId;
    fn name(&self) -> &str;
    fn set_name(&mut self, name: &str);
    fn set_header(&mut self, key: &str, value: &str);
    fn peer_header_value(&self, peer: PeerId, key: &str) -> Option<String>;
    fn peers(&self) -> Vec<PeerId>;
    fn peer_address(&self, peer: PeerId) -> Option<String>;
    fn own_groups(&self) -> Vec<String>;
    fn peer_groups(&self, peer: PeerId) -> Vec<String>;
    fn join(&mut self, group: &str) -> Result<()>;
    fn leave(&mut self, group: &str) -> Result<()>;
    fn whisper(&mut self, peer: PeerId, body: Bytes) -> Result<()>;
    fn shout(&mut self, group: &str, body: Bytes) -> Result<()>;
    /// Block for at most `timeout` (or indefinitely when `None`) for
    /// the next event. `Ok(None)` means the wait elapsed with nothing
    /// to report (spec §7's `run_once(timeout)`).
    fn recv_timeout(&mut self, timeout: Option<Duration>) -> Result<Option<PresenceEvent>>;
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
}

struct PeerRecord {
    name: String,
    headers: HashMap<String, String>,
    groups: HashSet<String>,
    inbox: Sender<PresenceEvent>,
}

#[derive(Default)]
struct Registry {
    peers: HashMap<PeerId, PeerRecord>,
}

/// A shared simulated fabric. Create one per test/example and hand
/// out a `MockPresence` per simulated node.
#[derive(Clone, Default)]
pub struct MockNetwork(Rc<RefCell<Registry>>);

impl MockNetwork {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn create_peer(&self, name: impl Into<String>) -> MockPresence {
        let id = PeerId::new_v4();
        let (tx, rx) = flume::unbounded();
        let name = name.into();
        self.0.borrow_mut().peers.insert(
            id,
            PeerRecord {
                name: name.clone(),
                headers: HashMap::new(),
                groups: HashSet::new(),
                inbox: tx,
            },
        );
        MockPresence {
            id,
            name,
            network: Rc::clone(&self.0),
            rx,
        }
    }
}

/// A simulated presence client backed by a [`MockNetwork`]. Whisper
/// and shout deliver synchronously into the target's channel; there
/// is no real network, so nothing ever fails to deliver.
pub struct MockPresence {
    id: PeerId,
    name: String,
    network: Rc<RefCell<Registry>>,
    rx: Receiver<PresenceEvent>,
}

impl MockPresence {
    fn broadcast_to_others(&self, make_event: impl Fn(PeerId, &str) -> PresenceEvent) {
        let registry = self.network.borrow();
        for (peer, record) in &registry.peers {
            if *peer == self.id {
                continue;
            }
            let _ = record.inbox.send(make_event(self.id, &self.name));
        }
    }
}

impl Presence for MockPresence {
    fn uuid(&self) -> PeerId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
        if let Some(record) = self.network.borrow_mut().peers.get_mut(&self.id) {
            record.name = name.to_string();
        }
    }

    fn set_header(&mut self, key: &str, value: &str) {
        if let Some(record) = self.network.borrow_mut().peers.get_mut(&self.id) {
            record.headers.insert(key.to_string(), value.to_string());
        }
    }

    fn peer_header_value(&self, peer: PeerId, key: &str) -> Option<String> {
        self.network.borrow().peers.get(&peer)?.headers.get(key).cloned()
    }

    fn peers(&self) -> Vec<PeerId> {
        self.network
            .borrow()
            .peers
            .keys()
            .filter(|p| **p != self.id)
            .copied()
            .collect()
    }

    fn peer_address(&self, peer: PeerId) -> Option<String> {
        self.network
            .borrow()
            .peers
            .contains_key(&peer)
            .then(|| format!("mock://{}", peer.hex()))
    }

    fn own_groups(&self) -> Vec<String> {
        self.network
            .borrow()
            .peers
            .get(&self.id)
            .map(|r| r.groups.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn peer_groups(&self, peer: PeerId) -> Vec<String> {
        self.network
            .borrow()
            .peers
            .get(&peer)
            .map(|r| r.groups.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn join(&mut self, group: &str) -> Result<()> {
        let newly_joined = {
            let mut registry = self.network.borrow_mut();
            let record = registry
                .peers
                .get_mut(&self.id)
                .ok_or_else(|| ZocpError::Presence("peer not registered".into()))?;
            record.groups.insert(group.to_string())
        };
        if newly_joined {
            let group = group.to_string();
            self.broadcast_to_others(|peer, name| PresenceEvent::Join {
                peer,
                name: name.to_string(),
                group: group.clone(),
            });
        }
        Ok(())
    }

    fn leave(&mut self, group: &str) -> Result<()> {
        let was_member = {
            let mut registry = self.network.borrow_mut();
            let record = registry
                .peers
                .get_mut(&self.id)
                .ok_or_else(|| ZocpError::Presence("peer not registered".into()))?;
            record.groups.remove(group)
        };
        if was_member {
            let group = group.to_string();
            self.broadcast_to_others(|peer, name| PresenceEvent::Leave {
                peer,
                name: name.to_string(),
                group: group.clone(),
            });
        }
        Ok(())
    }

    fn whisper(&mut self, peer: PeerId, body: Bytes) -> Result<()> {
        let registry = self.network.borrow();
        let target = registry
            .peers
            .get(&peer)
            .ok_or_else(|| ZocpError::Presence(format!("unknown peer {peer}")))?;
        target
            .inbox
            .send(PresenceEvent::Whisper {
                peer: self.id,
                name: self.name.clone(),
                body,
            })
            .map_err(|e| ZocpError::Presence(e.to_string()))
    }

    fn shout(&mut self, group: &str, body: Bytes) -> Result<()> {
        let registry = self.network.borrow();
        for (peer, record) in &registry.peers {
            if *peer == self.id || !record.groups.contains(group) {
                continue;
            }
            let _ = record.inbox.send(PresenceEvent::Shout {
                peer: self.id,
                name: self.name.clone(),
                group: group.to_string(),
                body: body.clone(),
            });
        }
        Ok(())
    }

    fn recv_timeout(&mut self, timeout: Option<Duration>) -> Result<Option<PresenceEvent>> {
        let outcome = match timeout {
            None => self.rx.recv().map(Some),
            Some(d) => match self.rx.recv_timeout(d) {
                Ok(event) => Ok(Some(event)),
                Err(flume::RecvTimeoutError::Timeout) => Ok(None),
                Err(flume::RecvTimeoutError::Disconnected) => {
                    Err(flume::RecvError::Disconnected)
                }
            },
        };
        outcome.map_err(|e| ZocpError::Presence(e.to_string()))
    }

    fn start(&mut self) -> Result<()> {
        // Discover peers already on the fabric.
        let existing: Vec<(PeerId, String)> = {
            let registry = self.network.borrow();
            registry
                .peers
                .iter()
                .filter(|(p, _)| **p != self.id)
                .map(|(p, r)| (*p, r.name.clone()))
                .collect()
        };
        let own_inbox = self.network.borrow().peers.get(&self.id).map(|r| r.inbox.clone());
        if let Some(own_inbox) = own_inbox {
            for (peer, name) in existing {
                let _ = own_inbox.send(PresenceEvent::Enter { peer, name });
            }
        }
        self.broadcast_to_others(|peer, name| PresenceEvent::Enter {
            peer,
            name: name.to_string(),
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.broadcast_to_others(|peer, name| PresenceEvent::Exit {
            peer,
            name: name.to_string(),
        });
        self.network.borrow_mut().peers.remove(&self.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_delivers_enter_for_peers_on_both_sides() {
        let net = MockNetwork::new();
        let mut a = net.create_peer("a");
        a.start().unwrap();
        let mut b = net.create_peer("b");
        b.start().unwrap();

        let event = a.recv_timeout(Some(Duration::from_millis(10))).unwrap();
        assert!(matches!(event, Some(PresenceEvent::Enter { .. })));
    }

    #[test]
    fn whisper_is_delivered_to_the_named_peer_only() {
        let net = MockNetwork::new();
        let mut a = net.create_peer("a");
        let mut b = net.create_peer("b");
        a.start().unwrap();
        b.start().unwrap();
        let _ = a.recv_timeout(Some(Duration::from_millis(10)));
        let _ = b.recv_timeout(Some(Duration::from_millis(10)));

        a.whisper(b.uuid(), Bytes::from_static(b"hello")).unwrap();
        let event = b.recv_timeout(Some(Duration::from_millis(10))).unwrap();
        assert!(matches!(event, Some(PresenceEvent::Whisper { body, .. }) if body == b"hello"));
    }

    #[test]
    fn shout_only_reaches_group_members() {
        let net = MockNetwork::new();
        let mut a = net.create_peer("a");
        let mut b = net.create_peer("b");
        let mut c = net.create_peer("c");
        a.join("ZOCP").unwrap();
        b.join("ZOCP").unwrap();
        a.shout("ZOCP", Bytes::from_static(b"ping")).unwrap();
        assert!(b.recv_timeout(Some(Duration::from_millis(10))).unwrap().is_some());
        assert!(c.recv_timeout(Some(Duration::from_millis(10))).unwrap().is_none());
    }
}
