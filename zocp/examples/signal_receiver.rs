//! A receiver observes incoming signals through a custom `Dispatch`
//! impl instead of polling `get_value`, useful when the host wants to
//! react immediately (e.g. forward to a render thread).

use std::str::FromStr;
use std::time::Duration;

use serde_json::{json, Value};

use zocp::node::{NodeConfig, ZocpNode};
use zocp::presence::MockNetwork;
use zocp::{Dispatch, PeerId};
use zocp_core::capability::{AccessFlags, TypeHint};
use zocp_core::error::Result;

#[derive(Default)]
struct PrintOnSignal;

impl Dispatch for PrintOnSignal {
    fn on_peer_signaled(&mut self, peer: PeerId, name: &str, data: &Value) -> Result<()> {
        println!("signal from {name} ({peer}): {data}");
        Ok(())
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let net = MockNetwork::new();
    let config = NodeConfig::new().with_poll_timeout(Some(Duration::from_millis(20)));

    let mut tracker = ZocpNode::new(net.create_peer("tracker"), config.clone().with_name("tracker")).unwrap();
    tracker
        .register(
            "position",
            json!([0.0, 0.0, 0.0]),
            TypeHint::Vec3f,
            AccessFlags::from_str("re").unwrap(),
            None,
            None,
            None,
        )
        .unwrap();

    let mut watcher = ZocpNode::with_dispatch(net.create_peer("watcher"), PrintOnSignal, config.with_name("watcher")).unwrap();

    for _ in 0..4 {
        let _ = tracker.run_once().unwrap();
        let _ = watcher.run_once().unwrap();
    }

    let tracker_id = tracker.uuid();
    watcher.signal_subscribe(watcher.uuid(), None, tracker_id, Some("position".into())).unwrap();
    for _ in 0..4 {
        let _ = tracker.run_once().unwrap();
        let _ = watcher.run_once().unwrap();
    }

    tracker.emit_signal("position", json!([1.0, 2.0, 3.0])).unwrap();
    let _ = watcher.run_once().unwrap();
}
