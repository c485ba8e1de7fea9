//! Event dispatcher: the fixed vocabulary of user-overridable
//! callbacks (spec §4.6), plus `NoopDispatch`, a default
//! logging-only implementation grounded in the teacher's
//! `NoOpPermits` (`backpressure.rs`) — a trait with one trivial
//! always-succeeds impl used until a caller needs something richer.

use serde_json::Value;

use crate::error::Result;
use crate::presence_id::PeerId;

/// User-overridable ZOCP event callbacks. Default bodies log at
/// `tracing::debug!`, matching `original_source/src/zocp.py`'s
/// `logger.debug` defaults.
///
/// Rust has no exceptions: "a handler exception propagates and
/// terminates the loop" (spec §4.6/§7) is modeled by these methods
/// returning `Result<()>` — `run`/`run_once` stop and surface the
/// first `Err` a handler returns.
pub trait Dispatch {
    fn on_peer_enter(&mut self, peer: PeerId, name: &str) -> Result<()> {
        tracing::debug!(%peer, name, "ZRE ENTER");
        Ok(())
    }

    fn on_peer_exit(&mut self, peer: PeerId, name: &str) -> Result<()> {
        tracing::debug!(%peer, name, "ZRE EXIT");
        Ok(())
    }

    fn on_peer_join(&mut self, peer: PeerId, name: &str, group: &str) -> Result<()> {
        tracing::debug!(%peer, name, group, "ZRE JOIN");
        Ok(())
    }

    fn on_peer_leave(&mut self, peer: PeerId, name: &str, group: &str) -> Result<()> {
        tracing::debug!(%peer, name, group, "ZRE LEAVE");
        Ok(())
    }

    fn on_peer_whisper(&mut self, peer: PeerId, name: &str, body: &[u8]) -> Result<()> {
        tracing::debug!(%peer, name, bytes = body.len(), "ZRE WHISPER");
        Ok(())
    }

    fn on_peer_shout(&mut self, peer: PeerId, name: &str, group: &str, body: &[u8]) -> Result<()> {
        tracing::debug!(%peer, name, group, bytes = body.len(), "ZRE SHOUT");
        Ok(())
    }

    /// A peer's capability tree was modified (inbound MOD, spec §4.3).
    fn on_peer_modified(&mut self, peer: PeerId, name: &str, data: &Value) -> Result<()> {
        tracing::debug!(%peer, name, %data, "ZOCP PEER MODIFIED");
        Ok(())
    }

    fn on_peer_replied(&mut self, peer: PeerId, name: &str, data: &Value) -> Result<()> {
        tracing::debug!(%peer, name, %data, "ZOCP PEER REPLIED");
        Ok(())
    }

    /// A peer subscribed to one of this node's emitters.
    /// `data = [emit_peer, emitter, recv_peer, receiver]`.
    fn on_peer_subscribed(&mut self, peer: PeerId, name: &str, data: &Value) -> Result<()> {
        tracing::debug!(%peer, name, %data, "ZOCP PEER SUBSCRIBED");
        Ok(())
    }

    fn on_peer_unsubscribed(&mut self, peer: PeerId, name: &str, data: &Value) -> Result<()> {
        tracing::debug!(%peer, name, %data, "ZOCP PEER UNSUBSCRIBED");
        Ok(())
    }

    /// A subscribed-to peer's emitter changed value.
    /// `data = [emitter, value, [receivers...]]` (spec §4.5).
    fn on_peer_signaled(&mut self, peer: PeerId, name: &str, data: &Value) -> Result<()> {
        tracing::debug!(%peer, name, %data, "ZOCP PEER SIGNALED");
        Ok(())
    }

    /// This node's own capability tree was modified, locally or by a
    /// remote SET. `peer`/`name` are `None` for self-modifications.
    fn on_modified(&mut self, peer: Option<PeerId>, name: Option<&str>, data: &Value) -> Result<()> {
        match peer {
            Some(peer) => {
                tracing::debug!(%peer, name = name.unwrap_or_default(), %data, "ZOCP modified by peer");
            }
            None => {
                tracing::debug!(%data, "ZOCP modified by self");
            }
        }
        Ok(())
    }
}

/// A `Dispatch` that only logs, for callers who want pure state
/// inspection (via the peer cache / capability tree) without
/// overriding any callback.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDispatch;

impl Dispatch for NoopDispatch {}
