//! `PeerId`: the 32-character-hex peer identifier used throughout the
//! subscription registry, peer cache and wire codec (spec §6: "All
//! peer ids on the wire are 32-character hex (no dashes)").

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::error::{Result, ZocpError};

/// A peer's stable identifier, a newtype over `Uuid` so the
/// no-dash-hex wire form (`Uuid::simple`) is the default `Display`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(Uuid);

impl PeerId {
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    #[must_use]
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    #[must_use]
    pub const fn uuid(self) -> Uuid {
        self.0
    }

    /// The 32-character no-dash hex form used on the wire.
    #[must_use]
    pub fn hex(self) -> String {
        self.0.simple().to_string()
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hex())
    }
}

impl FromStr for PeerId {
    type Err = ZocpError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| ZocpError::decode(format!("invalid peer id '{s}': {e}")))
    }
}

impl From<Uuid> for PeerId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}
