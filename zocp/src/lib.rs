//! ZOCP: a peer-to-peer capability/subscription/signal overlay for
//! live-media and creative-coding orchestration.
//!
//! ```no_run
//! use zocp::presence::MockNetwork;
//! use zocp::node::{NodeConfig, ZocpNode};
//! use zocp_core::capability::{AccessFlags, TypeHint};
//! use serde_json::json;
//! use std::str::FromStr;
//!
//! let net = MockNetwork::new();
//! let presence = net.create_peer("light-1");
//! let mut node = ZocpNode::new(presence, NodeConfig::new().with_name("light-1")).unwrap();
//! node.register(
//!     "brightness",
//!     json!(0.0),
//!     TypeHint::Float,
//!     AccessFlags::from_str("rwe").unwrap(),
//!     None,
//!     None,
//!     None,
//! ).unwrap();
//! node.run_once().unwrap();
//! ```

#![deny(unsafe_code)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::too_many_arguments)]

pub mod node;
pub mod presence;

pub use zocp_core;
pub use zocp_core::capability::{AccessFlags, TypeHint};
pub use zocp_core::error::{Result, ZocpError};
pub use zocp_core::events::{Dispatch, NoopDispatch};
pub use zocp_core::frame::PresenceEvent;
pub use zocp_core::presence_id::PeerId;

pub use node::{NodeConfig, ZocpNode};
pub use presence::{MockNetwork, MockPresence, Presence};
