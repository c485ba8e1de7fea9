//! `ZocpNode`: wires a [`Presence`] implementation to the
//! `zocp-core` protocol engine and drives the cooperative event loop
//! (spec §7).
//!
//! `NodeConfig` is a consuming builder grounded in the teacher's
//! `SocketOptions` (`options.rs`): defaults baked into `Default`,
//! `with_*` methods taking and returning `Self` by value.

use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;

use zocp_core::capability::{AccessFlags, TypeHint};
use zocp_core::error::Result;
use zocp_core::events::{Dispatch, NoopDispatch};
use zocp_core::engine::{Engine, Outbound};
use zocp_core::presence_id::PeerId;

use crate::presence::Presence;

/// Every node joins this ZRE group by default (spec §6: "ZOCP joins
/// the group `ZOCP`").
pub const DEFAULT_GROUP: &str = "ZOCP";

/// Construction-time node settings.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    name: Option<String>,
    headers: Vec<(String, String)>,
    group: String,
    /// `None` blocks indefinitely in `run_once`; `Some(Duration::ZERO)`
    /// polls without blocking.
    poll_timeout: Option<Duration>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: None,
            headers: Vec::new(),
            group: DEFAULT_GROUP.to_string(),
            poll_timeout: Some(Duration::from_millis(250)),
        }
    }
}

impl NodeConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    #[must_use]
    pub fn with_poll_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.poll_timeout = timeout;
        self
    }
}

/// Adapts a borrowed `Presence` to the engine's `Outbound` sink. A
/// local wrapper type, not a blanket impl, since `Outbound` is foreign
/// to this crate and `P` is a bare type parameter.
struct AsOutbound<'a, P>(&'a mut P);

impl<P: Presence> Outbound for AsOutbound<'_, P> {
    fn whisper(&mut self, peer: PeerId, body: Bytes) -> Result<()> {
        self.0.whisper(peer, body)
    }
}

/// A ZOCP node: a presence client driving a protocol engine.
pub struct ZocpNode<P: Presence, D: Dispatch = NoopDispatch> {
    presence: P,
    engine: Engine<D>,
    group: String,
    poll_timeout: Option<Duration>,
}

impl<P: Presence> ZocpNode<P, NoopDispatch> {
    pub fn new(presence: P, config: NodeConfig) -> Result<Self> {
        Self::with_dispatch(presence, NoopDispatch, config)
    }
}

impl<P: Presence, D: Dispatch> ZocpNode<P, D> {
    pub fn with_dispatch(mut presence: P, dispatch: D, config: NodeConfig) -> Result<Self> {
        if let Some(name) = &config.name {
            presence.set_name(name);
        }
        for (key, value) in &config.headers {
            presence.set_header(key, value);
        }
        let self_id = presence.uuid();
        presence.start()?;
        presence.join(&config.group)?;

        Ok(Self {
            engine: Engine::new(self_id, dispatch),
            presence,
            group: config.group,
            poll_timeout: config.poll_timeout,
        })
    }

    #[must_use]
    pub fn uuid(&self) -> PeerId {
        self.engine.self_id()
    }

    #[must_use]
    pub fn engine(&self) -> &Engine<D> {
        &self.engine
    }

    #[must_use]
    pub fn presence(&self) -> &P {
        &self.presence
    }

    pub fn presence_mut(&mut self) -> &mut P {
        &mut self.presence
    }

    fn outbound(&mut self) -> AsOutbound<'_, P> {
        AsOutbound(&mut self.presence)
    }

    // ---- capability surface ------------------------------------------

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
    ) -> Result<()> {
        let mut out = self.outbound();
        self.engine.register(name, value, type_hint, access, min, max, step, &mut out)
    }

    pub fn set_object(&mut self, name: Option<&str>, obj_type: &str) -> Result<()> {
        let mut out = self.outbound();
        self.engine.set_object(name, obj_type, &mut out)
    }

    pub fn set_reserved(&mut self, key: &str, value: Value) -> Result<()> {
        let mut out = self.outbound();
        self.engine.set_reserved(key, value, &mut out)
    }

    pub fn set_location(&mut self, location: [f64; 3]) -> Result<()> {
        let mut out = self.outbound();
        self.engine.set_location(location, &mut out)
    }

    pub fn set_orientation(&mut self, orientation: [f64; 3]) -> Result<()> {
        let mut out = self.outbound();
        self.engine.set_orientation(orientation, &mut out)
    }

    pub fn set_scale(&mut self, scale: [f64; 3]) -> Result<()> {
        let mut out = self.outbound();
        self.engine.set_scale(scale, &mut out)
    }

    pub fn set_matrix(&mut self, matrix: [[f64; 4]; 4]) -> Result<()> {
        let mut out = self.outbound();
        self.engine.set_matrix(matrix, &mut out)
    }

    pub fn set(&mut self, data: Value) -> Result<()> {
        let mut out = self.outbound();
        self.engine.set(data, &mut out)
    }

    #[must_use]
    pub fn get_value(&self, name: &str) -> Option<&Value> {
        self.engine.get_value(name)
    }

    pub fn emit_signal(&mut self, emitter: &str, value: Value) -> Result<()> {
        let mut out = self.outbound();
        self.engine.emit_signal(emitter, value, &mut out)
    }

    pub fn signal_subscribe(
        &mut self,
        recv_peer: PeerId,
        receiver: Option<String>,
        emit_peer: PeerId,
        emitter: Option<String>,
    ) -> Result<()> {
        let mut out = self.outbound();
        self.engine.signal_subscribe(recv_peer, receiver, emit_peer, emitter, None, &mut out)
    }

    pub fn signal_unsubscribe(
        &mut self,
        recv_peer: PeerId,
        receiver: Option<String>,
        emit_peer: PeerId,
        emitter: Option<String>,
    ) -> Result<()> {
        let mut out = self.outbound();
        self.engine.signal_unsubscribe(recv_peer, receiver, emit_peer, emitter, None, &mut out)
    }

    /// Subscribe this node's `receiver` slot to `emitter` on `peer`.
    pub fn subscribe_to(&mut self, peer: PeerId, emitter: impl Into<String>, receiver: impl Into<String>) -> Result<()> {
        let self_id = self.uuid();
        self.signal_subscribe(self_id, Some(receiver.into()), peer, Some(emitter.into()))
    }

    // ---- event loop -----------------------------------------------------

    /// Poll the presence layer once, then drain every frame already
    /// queued behind it with a zero-timeout re-poll loop, and return
    /// (spec §4.7: "drain all ready frames"). Returns `true` if at
    /// least one event was processed, `false` on an initial timed-out
    /// poll with nothing pending.
    pub fn run_once(&mut self) -> Result<bool> {
        let timeout = self.poll_timeout;
        let Some(event) = self.presence.recv_timeout(timeout)? else {
            return Ok(false);
        };
        self.dispatch_one(event)?;

        while let Some(event) = self.presence.recv_timeout(Some(Duration::ZERO))? {
            self.dispatch_one(event)?;
        }
        Ok(true)
    }

    fn dispatch_one(&mut self, event: crate::presence::PresenceEvent) -> Result<()> {
        let mut out = self.outbound();
        self.engine.handle_presence_event(event, &mut out)
    }

    /// Run the cooperative event loop forever. The first handler error
    /// stops the loop (spec §4.6/§7: no exceptions, a bubbled
    /// `Result::Err` takes its place) and terminates the presence
    /// client before the error reaches the caller, mirroring
    /// `original_source/src/zocp.py`'s `run()`, which always calls
    /// `self.stop()` on its way out of the loop. `stop()`'s own error is
    /// discarded in favor of the original cause.
    pub fn run(&mut self) -> Result<()> {
        loop {
            if let Err(err) = self.run_once() {
                let _ = self.presence.stop();
                return Err(err);
            }
        }
    }

    pub fn shutdown(&mut self) -> Result<()> {
        self.presence.leave(&self.group)?;
        self.presence.stop()
    }
}

#[cfg(test)]
mod tests {
    use zocp_core::error::ZocpError;

    use crate::presence::MockNetwork;

    use super::*;

    /// Fails on the first `on_peer_enter`, to drive `run`'s error path.
    struct FailOnEnter;

    impl Dispatch for FailOnEnter {
        fn on_peer_enter(&mut self, _peer: PeerId, _name: &str) -> Result<()> {
            Err(ZocpError::Dispatch("boom".into()))
        }
    }

    fn config() -> NodeConfig {
        NodeConfig::new().with_poll_timeout(Some(Duration::from_millis(10)))
    }

    #[test]
    fn run_stops_the_presence_client_before_surfacing_the_handler_error() {
        let net = MockNetwork::new();
        let mut a = ZocpNode::with_dispatch(net.create_peer("a"), FailOnEnter, config()).unwrap();
        let a_id = a.uuid();
        let mut b = ZocpNode::new(net.create_peer("b"), config()).unwrap();

        // `b`'s own join/enter broadcast gives `a` an ENTER to dispatch,
        // which `FailOnEnter` turns into a terminating error.
        assert!(a.run().is_err());

        // `stop()` removes the peer from the shared registry, so a
        // fresh lookup from `b`'s side should no longer find it.
        assert!(b.presence().peer_address(a_id).is_none());
    }
}
