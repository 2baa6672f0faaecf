// SPDX-License-Identifier: MIT OR Apache-2.0
//! Item handles, persistent UIDs and connection endpoints.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Compact handle to an item in the pool.
///
/// The upper 32 bits hold the slot index and the lower 32 bits a tag that
/// changes every time the slot is reused. A handle is only valid for the
/// lifetime of one pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(u64);

impl ItemId {
    /// The handle that refers to nothing
    pub const NONE: ItemId = ItemId(u64::MAX);

    /// Pack a slot index and a tag
    pub const fn new(index: u32, tag: u32) -> Self {
        Self((index as u64) << 32 | tag as u64)
    }

    /// Rebuild a handle from its raw value
    pub const fn from_value(value: u64) -> Self {
        Self(value)
    }

    /// Raw packed value
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Slot index in the pool
    pub const fn index(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Reuse tag
    pub const fn tag(self) -> u32 {
        self.0 as u32
    }

    /// Whether this is [`ItemId::NONE`]
    pub const fn is_none(self) -> bool {
        self.0 == u64::MAX
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::NONE
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            f.write_str("none")
        } else {
            write!(f, "{}#{:08x}", self.index(), self.tag())
        }
    }
}

/// Persistent identity of an item, stable across saves and undo
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Uid(pub Uuid);

impl Uid {
    /// Create a new random UID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// The all-zero UID
    pub const fn nil() -> Self {
        Self(Uuid::nil())
    }

    /// Whether this is the all-zero UID
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl Default for Uid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Uid {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Handle to a graph owned by a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GraphId(pub u32);

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "graph:{}", self.0)
    }
}

/// The feeding side of a link: which output port of which item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InputConnection {
    /// Source item
    pub source_item: ItemId,
    /// Output port on the source
    pub source_port: i32,
}

/// The fed side of a link: which input port of which item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OutputConnection {
    /// Destination item
    pub dest_item: ItemId,
    /// Input port on the destination
    pub dest_port: i32,
}

/// Pin direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinKind {
    /// Input pin
    In,
    /// Output pin
    Out,
}

/// A single pin on a node or router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodePin {
    /// Owning item
    pub node: ItemId,
    /// Pin index
    pub index: i32,
    /// Direction
    pub kind: PinKind,
}

impl NodePin {
    /// An input pin
    pub fn input(node: ItemId, index: i32) -> Self {
        Self { node, index, kind: PinKind::In }
    }

    /// An output pin
    pub fn output(node: ItemId, index: i32) -> Self {
        Self { node, index, kind: PinKind::Out }
    }
}

impl fmt::Display for NodePin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = match self.kind {
            PinKind::In => "in",
            PinKind::Out => "out",
        };
        write!(f, "{}:{}{}", self.node, dir, self.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_id_packing() {
        let id = ItemId::new(7, 0xdead_beef);
        assert_eq!(id.index(), 7);
        assert_eq!(id.tag(), 0xdead_beef);
        assert_eq!(ItemId::from_value(id.value()), id);
        assert!(!id.is_none());
        assert!(ItemId::NONE.is_none());
        assert_eq!(ItemId::default(), ItemId::NONE);
    }

    #[test]
    fn test_uid_parse() {
        let uid = Uid::new();
        let parsed: Uid = uid.to_string().parse().unwrap();
        assert_eq!(uid, parsed);
        assert!("not-a-uuid".parse::<Uid>().is_err());
        assert_eq!(serde_json::to_string(&uid).unwrap(), format!("\"{uid}\""));
    }
}
