//! An emitter registers a signal-capable parameter and emits a few
//! values; a subscribed receiver sees each one as a SIG, not a MOD.

use std::str::FromStr;
use std::time::Duration;

use serde_json::json;

use zocp::node::{NodeConfig, ZocpNode};
use zocp::presence::MockNetwork;
use zocp_core::capability::{AccessFlags, TypeHint};

fn main() {
    tracing_subscriber::fmt::init();

    let net = MockNetwork::new();
    let config = NodeConfig::new().with_poll_timeout(Some(Duration::from_millis(20)));

    let mut emitter = ZocpNode::new(net.create_peer("metronome"), config.clone().with_name("metronome")).unwrap();
    emitter
        .register(
            "tick",
            json!(0),
            TypeHint::Int,
            AccessFlags::from_str("re").unwrap(),
            None,
            None,
            None,
        )
        .unwrap();

    let mut receiver = ZocpNode::new(net.create_peer("listener"), config.with_name("listener")).unwrap();
    receiver
        .register(
            "beat",
            json!(0),
            TypeHint::Int,
            AccessFlags::from_str("rs").unwrap(),
            None,
            None,
            None,
        )
        .unwrap();
    for _ in 0..4 {
        let _ = emitter.run_once().unwrap();
        let _ = receiver.run_once().unwrap();
    }

    let emitter_id = emitter.uuid();
    receiver.subscribe_to(emitter_id, "tick", "beat").unwrap();
    for _ in 0..4 {
        let _ = emitter.run_once().unwrap();
        let _ = receiver.run_once().unwrap();
    }

    for tick in 1..=3 {
        emitter.emit_signal("tick", json!(tick)).unwrap();
        let _ = receiver.run_once().unwrap();
        println!("receiver.beat = {:?}", receiver.get_value("beat"));
    }
}
