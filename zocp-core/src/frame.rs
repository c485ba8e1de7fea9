//! The typed presence frame contract (spec §6): what the presence
//! substrate (ZRE/Pyre or a mock) delivers to the event loop before
//! any ZOCP verb parsing happens.

use bytes::Bytes;

use crate::presence_id::PeerId;

/// One event off the presence client's receive handle, corresponding
/// to `[type, peer-id(16B), peer-name, ...]` in spec §6.
#[derive(Debug, Clone, PartialEq)]
pub enum PresenceEvent {
    /// A peer joined the fabric.
    Enter { peer: PeerId, name: String },
    /// A peer left the fabric.
    Exit { peer: PeerId, name: String },
    /// A peer joined a group.
    Join { peer: PeerId, name: String, group: String },
    /// A peer left a group.
    Leave { peer: PeerId, name: String, group: String },
    /// A peer shouted to a group; `body` is the raw frame payload,
    /// decoded as a ZOCP verb only after `on_peer_shout` fires.
    Shout {
        peer: PeerId,
        name: String,
        group: String,
        body: Bytes,
    },
    /// A peer whispered directly to this node.
    Whisper {
        peer: PeerId,
        name: String,
        body: Bytes,
    },
}
