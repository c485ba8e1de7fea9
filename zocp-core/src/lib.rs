//! ZOCP Core
//!
//! Runtime-agnostic building blocks for the ZOCP protocol engine:
//! - Capability tree + deep-merge (`capability`)
//! - Wire codec, the eight canonical verbs (`codec`)
//! - Subscription registry (`subscription`)
//! - Presence frame contract (`frame`)
//! - Event dispatcher (`events`)
//! - Protocol engine (`engine`)
//! - Error types (`error`)
//! - Peer identifiers (`presence_id`)

#![deny(unsafe_code)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::needless_pass_by_ref_mut)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::too_many_arguments)]

pub mod capability;
pub mod codec;
pub mod engine;
pub mod error;
pub mod events;
pub mod frame;
pub mod presence_id;
pub mod subscription;

/// A small prelude to make downstream crates ergonomic. Kept minimal
/// to avoid API lock-in.
pub mod prelude {
    pub use crate::capability::{AccessFlags, CapabilityTree, TypeHint};
    pub use crate::codec::{SubPayload, Verb};
    pub use crate::engine::{Engine, Outbound};
    pub use crate::error::{Result, ZocpError};
    pub use crate::events::{Dispatch, NoopDispatch};
    pub use crate::frame::PresenceEvent;
    pub use crate::presence_id::PeerId;
    pub use crate::subscription::SubscriptionTable;
}
