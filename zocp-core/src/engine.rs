//! The protocol engine: ties the capability tree, the subscription
//! registry and the wire codec together into the actual ZOCP state
//! machine (spec §4.3-§4.5), generic over the event dispatcher so a
//! host can observe or override any callback.
//!
//! Grounded in the teacher's hub pattern (`router.rs`'s `RouterHub`,
//! `pubsub/hub.rs`'s `PubSubHub`): a single struct owning all routing
//! state, driven by an explicit command/event match rather than
//! virtual dispatch per message.

use bytes::Bytes;
use hashbrown::HashMap;
use serde_json::{json, Map, Value};

use crate::capability::{path_lift, AccessFlags, CapabilityTree, TypeHint};
use crate::codec::{SubPayload, Verb};
use crate::error::{Result, ZocpError};
use crate::events::Dispatch;
use crate::frame::PresenceEvent;
use crate::presence_id::PeerId;
use crate::subscription::SubscriptionTable;

/// Everything the engine needs to hand a peer a message. Kept as a
/// trait rather than a concrete sender so `zocp-core` stays free of
/// the presence transport (implemented by the facade crate, matching
/// how the teacher's `pubsub::hub` accepted a generic sender rather
/// than a concrete socket).
pub trait Outbound {
    fn whisper(&mut self, peer: PeerId, body: Bytes) -> Result<()>;
}

/// A verb the engine has no built-in handler for. Extension point for
/// protocol add-ons beyond the eight canonical verbs (spec §4.3,
/// `handle_<verb>`), modeled as an explicit registration map instead
/// of reflective method lookup (spec's Redesign Flags).
type ExtensionHandler = Box<dyn FnMut(Value) -> Result<()>>;

/// The ZOCP protocol engine for a single node.
pub struct Engine<D: Dispatch> {
    self_id: PeerId,
    tree: CapabilityTree,
    /// Remote emitters this node receives from.
    subscriptions: SubscriptionTable,
    /// Remote receivers subscribed to this node's emitters.
    subscribers: SubscriptionTable,
    /// Last-known capability snapshot per peer, refreshed on MOD.
    peers_capabilities: HashMap<PeerId, Value>,
    extensions: HashMap<String, ExtensionHandler>,
    pub dispatch: D,
}

impl<D: Dispatch> Engine<D> {
    #[must_use]
    pub fn new(self_id: PeerId, dispatch: D) -> Self {
        Self {
            self_id,
            tree: CapabilityTree::new(),
            subscriptions: SubscriptionTable::new(),
            subscribers: SubscriptionTable::new(),
            peers_capabilities: HashMap::new(),
            extensions: HashMap::new(),
            dispatch,
        }
    }

    #[must_use]
    pub fn self_id(&self) -> PeerId {
        self.self_id
    }

    #[must_use]
    pub fn tree(&self) -> &CapabilityTree {
        &self.tree
    }

    #[must_use]
    pub fn peer_capability(&self, peer: &PeerId) -> Option<&Value> {
        self.peers_capabilities.get(peer)
    }

    #[must_use]
    pub fn known_peers(&self) -> impl Iterator<Item = &PeerId> {
        self.peers_capabilities.keys()
    }

    /// Register a handler for a verb outside the eight built in ones.
    /// Re-registering a name replaces the previous handler.
    pub fn register_handler(&mut self, verb: impl Into<String>, handler: impl FnMut(Value) -> Result<()> + 'static) {
        self.extensions.insert(verb.into(), Box::new(handler));
    }

    // ---- capability tree surface -----------------------------------

    #[allow(clippy::too_many_arguments)]
    pub fn register(
        &mut self,
        name: &str,
        value: Value,
        type_hint: TypeHint,
        access: AccessFlags,
        min: Option<Value>,
        max: Option<Value>,
        step: Option<Value>,
        out: &mut impl Outbound,
    ) -> Result<()> {
        let record = self.tree.register(name, value, type_hint, access, min, max, step);
        self.notify(json!({ name: record }), None, None, out)
    }

    /// Move the registration cursor, creating the object record if
    /// missing. Matches `original_source/src/zocp.py`'s `set_object`,
    /// which only reassigns `_cur_obj`/`_cur_obj_keys` and never calls
    /// `_on_modified` itself — the object only becomes visible to
    /// subscribers once a `register_<type>` call under it notifies.
    pub fn set_object(&mut self, name: Option<&str>, obj_type: &str, _out: &mut impl Outbound) -> Result<()> {
        self.tree.set_object(name, obj_type);
        Ok(())
    }

    pub fn set_reserved(&mut self, key: &str, value: Value, out: &mut impl Outbound) -> Result<()> {
        let payload = self.tree.set_reserved(key, value);
        self.notify(payload, None, None, out)
    }

    /// `_location` (vec3f), per `original_source/src/zocp.py`'s
    /// `set_node_location`.
    pub fn set_location(&mut self, location: [f64; 3], out: &mut impl Outbound) -> Result<()> {
        self.set_reserved("_location", json!(location), out)
    }

    /// `_orientation` (vec3f), per `set_node_orientation`.
    pub fn set_orientation(&mut self, orientation: [f64; 3], out: &mut impl Outbound) -> Result<()> {
        self.set_reserved("_orientation", json!(orientation), out)
    }

    /// `_scale` (vec3f), per `set_node_scale`. `zocp.py` notifies with
    /// the key `"scale"` instead of `"_scale"` there; we do not carry
    /// that typo forward (see DESIGN.md).
    pub fn set_scale(&mut self, scale: [f64; 3], out: &mut impl Outbound) -> Result<()> {
        self.set_reserved("_scale", json!(scale), out)
    }

    /// `_matrix` (4x4 float array), per `set_node_matrix`.
    pub fn set_matrix(&mut self, matrix: [[f64; 4]; 4], out: &mut impl Outbound) -> Result<()> {
        self.set_reserved("_matrix", json!(matrix), out)
    }

    #[must_use]
    pub fn get_value(&self, name: &str) -> Option<&Value> {
        self.tree.get_value(name)
    }

    /// Deep-merge `data` into the local tree and run the change
    /// notification pipeline as if it came from `self` (no SIG
    /// demotion is skipped: local SETs go through the same pipeline a
    /// remote SET does).
    pub fn set(&mut self, data: Value, out: &mut impl Outbound) -> Result<()> {
        self.tree.merge_into_root(data.clone());
        self.notify(data, None, None, out)
    }

    // ---- signal emission --------------------------------------------

    /// Update `emitter`'s value locally and SIG every subscriber,
    /// bypassing the MOD path entirely (spec §4.5, "An explicit
    /// signal-emit call always produces a SIG").
    pub fn emit_signal(&mut self, emitter: &str, value: Value, out: &mut impl Outbound) -> Result<()> {
        self.tree.set_value(emitter, value.clone());
        let frame = Verb::Sig(emitter.to_string(), value).encode();
        for peer in self.subscribers.peers().copied().collect::<Vec<_>>() {
            if self.subscribers.matches(&peer, emitter) {
                out.whisper(peer, frame.clone())?;
            }
        }
        Ok(())
    }

    // ---- subscribe / unsubscribe -------------------------------------

    /// Register or forward a subscription of `receiver` (on
    /// `recv_peer`) to `emitter` (on `emit_peer`). Exhibits the three
    /// roles of spec §4.4 based on how `self.self_id` compares to
    /// `recv_peer`/`emit_peer`; a third party (neither) only forwards.
    /// `peer_name` is the display name to use in `on_peer_subscribed`
    /// when self is the emitter; it defaults to `recv_peer`'s hex form.
    pub fn signal_subscribe(
        &mut self,
        recv_peer: PeerId,
        receiver: Option<String>,
        emit_peer: PeerId,
        emitter: Option<String>,
        peer_name: Option<&str>,
        out: &mut impl Outbound,
    ) -> Result<()> {
        let payload = SubPayload {
            emit_peer: emit_peer.hex(),
            emitter: emitter.clone(),
            recv_peer: recv_peer.hex(),
            receiver: receiver.clone(),
        };

        if recv_peer == self.self_id {
            let inserted = self.subscriptions.insert(emit_peer, emitter.clone(), receiver.clone());
            if inserted {
                if let Some(receiver_name) = &receiver {
                    let known = self
                        .peers_capabilities
                        .get(&emit_peer)
                        .and_then(|c| c.get(receiver_name))
                        .is_some();
                    if !known {
                        out.whisper(emit_peer, Verb::Get(Some(vec![receiver_name.clone()])).encode())?;
                    }
                }
                out.whisper(emit_peer, Verb::Sub(payload).encode())?;
            }
            return Ok(());
        }

        if emit_peer == self.self_id {
            let inserted = self.subscribers.insert(recv_peer, emitter.clone(), receiver.clone());
            if inserted {
                if let Some(emitter_name) = &emitter {
                    if let Some(subs) = self.tree.subscribers_mut(emitter_name) {
                        let entry = json!([recv_peer.hex(), receiver]);
                        if !subs.contains(&entry) {
                            subs.push(entry);
                            let snapshot = subs.clone();
                            self.notify(json!({ emitter_name: { "subscribers": snapshot } }), None, None, out)?;
                        }
                    }
                }
                let name = peer_name.map(str::to_string).unwrap_or_else(|| recv_peer.hex());
                let event_data = json!([emit_peer.hex(), emitter, recv_peer.hex(), receiver]);
                self.dispatch.on_peer_subscribed(recv_peer, &name, &event_data)?;
                out.whisper(recv_peer, Verb::Sub(payload).encode())?;
            }
            return Ok(());
        }

        // Third party: forward only, no local bookkeeping.
        out.whisper(emit_peer, Verb::Sub(payload).encode())
    }

    /// Symmetric to [`Engine::signal_subscribe`].
    pub fn signal_unsubscribe(
        &mut self,
        recv_peer: PeerId,
        receiver: Option<String>,
        emit_peer: PeerId,
        emitter: Option<String>,
        peer_name: Option<&str>,
        out: &mut impl Outbound,
    ) -> Result<()> {
        let payload = SubPayload {
            emit_peer: emit_peer.hex(),
            emitter: emitter.clone(),
            recv_peer: recv_peer.hex(),
            receiver: receiver.clone(),
        };

        if recv_peer == self.self_id {
            let removed = self.subscriptions.remove(&emit_peer, &emitter, &receiver);
            if removed {
                out.whisper(emit_peer, Verb::Unsub(payload).encode())?;
            }
            return Ok(());
        }

        if emit_peer == self.self_id {
            let removed = self.subscribers.remove(&recv_peer, &emitter, &receiver);
            if removed {
                if let Some(emitter_name) = &emitter {
                    if let Some(subs) = self.tree.subscribers_mut(emitter_name) {
                        let entry = json!([recv_peer.hex(), receiver]);
                        subs.retain(|s| s != &entry);
                        let snapshot = subs.clone();
                        self.notify(json!({ emitter_name: { "subscribers": snapshot } }), None, None, out)?;
                    }
                }
                let name = peer_name.map(str::to_string).unwrap_or_else(|| recv_peer.hex());
                let event_data = json!([emit_peer.hex(), emitter, recv_peer.hex(), receiver]);
                self.dispatch.on_peer_unsubscribed(recv_peer, &name, &event_data)?;
                out.whisper(recv_peer, Verb::Unsub(payload).encode())?;
            }
            return Ok(());
        }

        out.whisper(emit_peer, Verb::Unsub(payload).encode())
    }

    // ---- presence events --------------------------------------------

    /// Handle one event off the presence substrate's receive handle.
    pub fn handle_presence_event(&mut self, event: PresenceEvent, out: &mut impl Outbound) -> Result<()> {
        match event {
            PresenceEvent::Enter { peer, name } => {
                self.peers_capabilities.entry(peer).or_insert_with(|| json!({}));
                out.whisper(peer, Verb::Get(None).encode())?;
                self.dispatch.on_peer_enter(peer, &name)
            }
            PresenceEvent::Exit { peer, name } => {
                self.subscriptions.remove_peer(&peer);
                self.subscribers.remove_peer(&peer);
                self.peers_capabilities.remove(&peer);
                self.dispatch.on_peer_exit(peer, &name)
            }
            PresenceEvent::Join { peer, name, group } => self.dispatch.on_peer_join(peer, &name, &group),
            PresenceEvent::Leave { peer, name, group } => self.dispatch.on_peer_leave(peer, &name, &group),
            PresenceEvent::Shout { peer, name, group, body } => {
                self.dispatch.on_peer_shout(peer, &name, &group, &body)?;
                self.decode_and_dispatch(peer, &name, &body, out)
            }
            PresenceEvent::Whisper { peer, name, body } => {
                self.dispatch.on_peer_whisper(peer, &name, &body)?;
                self.decode_and_dispatch(peer, &name, &body, out)
            }
        }
    }

    fn decode_and_dispatch(&mut self, peer: PeerId, name: &str, body: &[u8], out: &mut impl Outbound) -> Result<()> {
        let (key, payload) = match Verb::decode_key(body) {
            Ok(kp) => kp,
            Err(e) if e.is_recoverable() => {
                tracing::warn!(%peer, name, error = %e, "dropping malformed ZOCP frame");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        self.dispatch_verb(&key, payload, peer, name, out)
    }

    fn dispatch_verb(&mut self, key: &str, payload: Value, peer: PeerId, name: &str, out: &mut impl Outbound) -> Result<()> {
        match key {
            "GET" => self.handle_get(payload, peer, out),
            "SET" => self.handle_set(payload, peer, name, out),
            "CALL" | "REP" => Ok(()),
            "SUB" => self.handle_sub(payload, peer, name, out),
            "UNSUB" => self.handle_unsub(payload, peer, name, out),
            "MOD" => self.handle_mod(payload, peer, name),
            "SIG" => self.handle_sig(payload, peer, name, out),
            other => match self.extensions.get_mut(other) {
                Some(handler) => handler(payload),
                None => Err(ZocpError::UnknownVerb(other.to_string())),
            },
        }
    }

    fn handle_get(&mut self, data: Value, peer: PeerId, out: &mut impl Outbound) -> Result<()> {
        let reply = match data {
            Value::Null => self.tree.as_value(),
            Value::Array(names) => {
                let mut ret = Map::new();
                for n in names {
                    if let Some(name) = n.as_str() {
                        ret.insert(name.to_string(), self.tree.as_map().get(name).cloned().unwrap_or(Value::Null));
                    }
                }
                Value::Object(ret)
            }
            _ => self.tree.as_value(),
        };
        out.whisper(peer, Verb::Mod(reply).encode())
    }

    fn handle_set(&mut self, data: Value, peer: PeerId, name: &str, out: &mut impl Outbound) -> Result<()> {
        self.tree.merge_into_root(data.clone());
        self.notify(data, Some(peer), Some(name), out)
    }

    fn handle_sub(&mut self, payload: Value, sender: PeerId, sender_name: &str, out: &mut impl Outbound) -> Result<()> {
        let Some(sub) = crate::codec::decode_sub_payload(payload) else {
            tracing::warn!(%sender, "malformed SUB payload");
            return Ok(());
        };
        self.handle_sub_or_unsub(sub, sender, sender_name, out, true)
    }

    fn handle_unsub(&mut self, payload: Value, sender: PeerId, sender_name: &str, out: &mut impl Outbound) -> Result<()> {
        let Some(sub) = crate::codec::decode_sub_payload(payload) else {
            tracing::warn!(%sender, "malformed UNSUB payload");
            return Ok(());
        };
        self.handle_sub_or_unsub(sub, sender, sender_name, out, false)
    }

    fn handle_sub_or_unsub(
        &mut self,
        sub: SubPayload,
        sender: PeerId,
        sender_name: &str,
        out: &mut impl Outbound,
        subscribe: bool,
    ) -> Result<()> {
        let (Ok(emit_peer), Ok(recv_peer)) = (sub.emit_peer.parse::<PeerId>(), sub.recv_peer.parse::<PeerId>()) else {
            tracing::warn!(%sender, "SUB/UNSUB referenced a malformed peer id");
            return Ok(());
        };
        if emit_peer != self.self_id && recv_peer != self.self_id {
            tracing::warn!(%sender, %emit_peer, %recv_peer, "dropping SUB/UNSUB addressed to neither role");
            return Ok(());
        }
        if subscribe {
            self.signal_subscribe(recv_peer, sub.receiver, emit_peer, sub.emitter, Some(sender_name), out)
        } else {
            self.signal_unsubscribe(recv_peer, sub.receiver, emit_peer, sub.emitter, Some(sender_name), out)
        }
    }

    fn handle_mod(&mut self, data: Value, peer: PeerId, name: &str) -> Result<()> {
        let entry = self.peers_capabilities.entry(peer).or_insert_with(|| json!({}));
        crate::capability::merge(entry, data.clone());
        self.dispatch.on_peer_modified(peer, name, &data)
    }

    fn handle_sig(&mut self, payload: Value, peer: PeerId, peer_name: &str, out: &mut impl Outbound) -> Result<()> {
        let Some(arr) = payload.as_array() else { return Ok(()) };
        if arr.len() != 2 {
            return Ok(());
        }
        let Some(emitter) = arr[0].as_str() else { return Ok(()) };
        let emitter = emitter.to_string();
        let value = arr[1].clone();

        if let Some(cached) = self.peers_capabilities.get_mut(&peer) {
            if let Some(rec) = cached.get_mut(&emitter) {
                rec["value"] = value.clone();
            }
        }

        let receivers: Vec<Option<String>> = self.subscriptions.receivers_for(&peer, &emitter).to_vec();
        for receiver in &receivers {
            if let Some(receiver_name) = receiver {
                let differs = self.tree.get_value(receiver_name).map_or(true, |v| v != &value);
                if differs {
                    self.emit_signal(receiver_name, value.clone(), out)?;
                }
            }
        }

        if self.subscriptions.matches(&peer, &emitter) {
            let event_data = json!([emitter, value, receivers]);
            self.dispatch.on_peer_signaled(peer, peer_name, &event_data)?;
        }
        Ok(())
    }

    /// The change-notification pipeline (spec §4.5): lift `data` to
    /// root via the registration cursor, fire `on_modified`, demote a
    /// single `{name: {value}}` shape to a SIG fan-out, and MOD
    /// everything else — always skipping `originator` in the fan-out.
    fn notify(&mut self, data: Value, originator: Option<PeerId>, originator_name: Option<&str>, out: &mut impl Outbound) -> Result<()> {
        let lifted = path_lift(self.tree.cursor_path(), data);
        self.dispatch.on_modified(originator, originator_name, &lifted)?;

        if let Some((name, value)) = as_pure_value_mutation(&lifted) {
            let frame = Verb::Sig(name.clone(), value).encode();
            for peer in self.subscribers.peers().copied().collect::<Vec<_>>() {
                if Some(peer) == originator {
                    continue;
                }
                if self.subscribers.matches(&peer, &name) {
                    out.whisper(peer, frame.clone())?;
                }
            }
            return Ok(());
        }

        let Value::Object(map) = &lifted else {
            return Ok(());
        };
        if map.is_empty() {
            return Ok(());
        }
        let keys: Vec<String> = map.keys().cloned().collect();
        let frame = Verb::Mod(lifted.clone()).encode();
        for peer in self.subscribers.peers().copied().collect::<Vec<_>>() {
            if Some(peer) == originator {
                continue;
            }
            if self.subscribers.matches_any(&peer, &keys) {
                out.whisper(peer, frame.clone())?;
            }
        }
        Ok(())
    }
}

/// `{name: {value: v}}` is the one shape MOD demotes to SIG (spec
/// §4.5); anything richer (additional sibling keys, nested objects)
/// stays a MOD.
fn as_pure_value_mutation(data: &Value) -> Option<(String, Value)> {
    let map = data.as_object()?;
    if map.len() != 1 {
        return None;
    }
    let (name, inner) = map.iter().next()?;
    let inner_map = inner.as_object()?;
    if inner_map.len() != 1 {
        return None;
    }
    let value = inner_map.get("value")?;
    Some((name.clone(), value.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopDispatch;
    use std::str::FromStr;

    #[derive(Default)]
    struct RecordingOutbound {
        sent: Vec<(PeerId, Value)>,
    }

    impl Outbound for RecordingOutbound {
        fn whisper(&mut self, peer: PeerId, body: Bytes) -> Result<()> {
            self.sent.push((peer, serde_json::from_slice(&body).unwrap()));
            Ok(())
        }
    }

    fn engine(id: u8) -> Engine<NoopDispatch> {
        Engine::new(PeerId::from_bytes([id; 16]), NoopDispatch)
    }

    #[test]
    fn set_object_sends_no_notification_of_its_own() {
        let mut e = engine(1);
        let peer = PeerId::from_bytes([2; 16]);
        e.subscribers.insert(peer, None, None);
        let mut out = RecordingOutbound::default();
        e.set_object(Some("light1"), "Light", &mut out).unwrap();
        assert!(out.sent.is_empty(), "set_object must not notify by itself");
    }

    #[test]
    fn register_under_an_object_cursor_emits_a_correctly_shaped_mod() {
        let mut e = engine(1);
        let peer = PeerId::from_bytes([2; 16]);
        e.subscribers.insert(peer, None, None);
        let mut out = RecordingOutbound::default();
        e.set_object(Some("light1"), "Light", &mut out).unwrap();
        e.register(
            "brightness",
            json!(0.5),
            TypeHint::Float,
            AccessFlags::from_str("rw").unwrap(),
            None,
            None,
            None,
            &mut out,
        )
        .unwrap();
        assert_eq!(out.sent.len(), 1);
        assert_eq!(
            out.sent[0].1["MOD"]["objects"]["light1"]["brightness"]["value"],
            json!(0.5)
        );
        assert!(out.sent[0].1["MOD"]["objects"]["light1"].get("objects").is_none());
    }

    #[test]
    fn register_fires_a_mod_when_subscribed() {
        let mut e = engine(1);
        let peer = PeerId::from_bytes([2; 16]);
        e.subscribers.insert(peer, None, None);
        let mut out = RecordingOutbound::default();
        e.register(
            "brightness",
            json!(0.5),
            TypeHint::Float,
            AccessFlags::from_str("rw").unwrap(),
            None,
            None,
            None,
            &mut out,
        )
        .unwrap();
        assert_eq!(out.sent.len(), 1);
        assert_eq!(out.sent[0].0, peer);
        assert!(out.sent[0].1["MOD"]["brightness"]["value"] == json!(0.5));
    }

    #[test]
    fn emit_signal_updates_local_value_and_sigs_subscribers() {
        let mut e = engine(1);
        e.tree.register("x", json!(1), TypeHint::Int, AccessFlags::from_str("re").unwrap(), None, None, None);
        let peer = PeerId::from_bytes([2; 16]);
        e.subscribers.insert(peer, Some("x".into()), Some("y".into()));
        let mut out = RecordingOutbound::default();
        e.emit_signal("x", json!(7), &mut out).unwrap();
        assert_eq!(e.tree.get_value("x"), Some(&json!(7)));
        assert_eq!(out.sent, vec![(peer, json!({ "SIG": ["x", 7] }))]);
    }

    #[test]
    fn set_demotes_to_sig_when_shape_is_a_pure_value() {
        let mut e = engine(1);
        let peer = PeerId::from_bytes([2; 16]);
        e.subscribers.insert(peer, Some("x".into()), None);
        let mut out = RecordingOutbound::default();
        e.set(json!({ "x": { "value": 9 } }), &mut out).unwrap();
        assert_eq!(out.sent, vec![(peer, json!({ "SIG": ["x", 9] }))]);
    }

    #[test]
    fn set_stays_mod_when_shape_has_sibling_keys() {
        let mut e = engine(1);
        let peer = PeerId::from_bytes([2; 16]);
        e.subscribers.insert(peer, Some("x".into()), None);
        let mut out = RecordingOutbound::default();
        e.set(json!({ "x": { "value": 9, "access": "rw" } }), &mut out).unwrap();
        assert_eq!(out.sent.len(), 1);
        assert_eq!(out.sent[0].1["MOD"]["x"]["value"], json!(9));
    }

    #[test]
    fn notify_skips_the_originator() {
        let mut e = engine(1);
        let originator = PeerId::from_bytes([2; 16]);
        let other = PeerId::from_bytes([3; 16]);
        e.subscribers.insert(originator, None, None);
        e.subscribers.insert(other, None, None);
        let mut out = RecordingOutbound::default();
        e.handle_set(json!({ "x": { "value": 1, "extra": true } }), originator, "peer2", &mut out)
            .unwrap();
        assert_eq!(out.sent.len(), 1);
        assert_eq!(out.sent[0].0, other);
    }

    #[test]
    fn third_party_initiator_only_forwards_with_no_local_bookkeeping() {
        let mut third_party = engine(3); // C, neither emitter nor receiver
        let a = PeerId::from_bytes([1; 16]); // emitter
        let b = PeerId::from_bytes([2; 16]); // receiver
        let mut out = RecordingOutbound::default();
        third_party
            .signal_subscribe(b, Some("y".into()), a, Some("x".into()), None, &mut out)
            .unwrap();
        assert!(third_party.subscribers.is_empty());
        assert!(third_party.subscriptions.is_empty());
        assert_eq!(out.sent, vec![(a, json!({ "SUB": [a.hex(), "x", b.hex(), "y"] }))]);
    }

    #[test]
    fn emitter_forwards_third_party_sub_onward_to_receiver() {
        let mut a = engine(1); // emitter, self_id == a
        let b = PeerId::from_bytes([2; 16]); // receiver
        let c = PeerId::from_bytes([3; 16]); // third-party sender
        let mut out = RecordingOutbound::default();
        // C whispered A a SUB naming B as recv_peer: A must forward to B
        // and register subscribers bookkeeping, per role 2.
        let payload = json!([a.self_id().hex(), "x", b.hex(), "y"]);
        a.handle_sub(payload, c, "c", &mut out).unwrap();
        assert!(a.subscribers.contains_peer(&b));
        assert_eq!(out.sent, vec![(b, json!({ "SUB": [a.self_id().hex(), "x", b.hex(), "y"] }))]);
    }

    #[test]
    fn sub_handler_rejects_frames_addressed_to_neither_role() {
        let mut e = engine(1);
        let sender = PeerId::from_bytes([2; 16]);
        let a = PeerId::from_bytes([3; 16]);
        let b = PeerId::from_bytes([4; 16]);
        let mut out = RecordingOutbound::default();
        let payload = json!([a.hex(), "Emit", b.hex(), "Recv"]);
        e.handle_sub(payload, sender, "sender", &mut out).unwrap();
        assert!(out.sent.is_empty());
        assert!(!e.subscribers.contains_peer(&b));
    }

    #[test]
    fn set_location_writes_reserved_key_and_notifies() {
        let mut e = engine(1);
        let peer = PeerId::from_bytes([2; 16]);
        e.subscribers.insert(peer, None, None);
        let mut out = RecordingOutbound::default();
        e.set_location([1.0, 2.0, 3.0], &mut out).unwrap();
        assert_eq!(e.tree.as_map()["_location"], json!([1.0, 2.0, 3.0]));
        assert_eq!(out.sent[0].1["MOD"]["_location"], json!([1.0, 2.0, 3.0]));
    }

    #[test]
    fn set_scale_notifies_with_the_underscore_prefixed_key() {
        let mut e = engine(1);
        let peer = PeerId::from_bytes([2; 16]);
        e.subscribers.insert(peer, None, None);
        let mut out = RecordingOutbound::default();
        e.set_scale([1.0, 1.0, 1.0], &mut out).unwrap();
        assert_eq!(out.sent[0].1["MOD"]["_scale"], json!([1.0, 1.0, 1.0]));
        assert!(out.sent[0].1["MOD"].get("scale").is_none());
    }

    #[test]
    fn inbound_sig_cascades_to_local_subscribers_when_value_changed() {
        let mut e = engine(1);
        e.tree.register("y", json!(0), TypeHint::Int, AccessFlags::from_str("re").unwrap(), None, None, None);
        let emitter_peer = PeerId::from_bytes([2; 16]);
        e.subscriptions.insert(emitter_peer, Some("x".into()), Some("y".into()));
        let mut out = RecordingOutbound::default();
        let payload = json!(["x", 42]);
        e.handle_sig(payload, emitter_peer, "peer2", &mut out).unwrap();
        assert_eq!(e.tree.get_value("y"), Some(&json!(42)));
    }
}
