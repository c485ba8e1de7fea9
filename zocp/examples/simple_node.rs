//! Two nodes discover each other, one registers a capability, the
//! other fetches the whole tree over GET/MOD.

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

    let mut light = ZocpNode::new(net.create_peer("light-1"), config.clone().with_name("light-1")).unwrap();
    light
        .register(
            "brightness",
            json!(0.2),
            TypeHint::Float,
            AccessFlags::from_str("rwe").unwrap(),
            Some(json!(0.0)),
            Some(json!(1.0)),
            None,
        )
        .unwrap();

    let mut controller = ZocpNode::new(net.create_peer("controller"), config.with_name("controller")).unwrap();

    // Drain ENTER/GET/MOD traffic on both sides.
    for _ in 0..8 {
        let _ = light.run_once().unwrap();
        let _ = controller.run_once().unwrap();
    }

    for peer in controller.presence().peers() {
        if let Some(cap) = controller.engine().peer_capability(&peer) {
            println!("peer {peer} capability: {cap}");
        }
    }
}
