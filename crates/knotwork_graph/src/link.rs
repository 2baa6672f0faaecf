// SPDX-License-Identifier: MIT OR Apache-2.0
//! Links between pins and the routers that bend them.

use crate::color::{Color, NODE_DEFAULT_COLOR};
use crate::error::SerializeError;
use crate::fields::{self, Fields};
use crate::geometry::Vec2;
use crate::id::{InputConnection, ItemId, OutputConnection};
use serde::{Deserialize, Serialize};

/// A directed connection from an output pin to an input pin
#[derive(Debug, Clone, PartialEq)]
pub struct Link {
    /// Feeding side
    pub input: InputConnection,
    /// Fed side
    pub output: OutputConnection,
    /// Cached routed path, recomputed whenever an endpoint moves
    pub path: Vec<Vec2>,
}

impl Link {
    /// Create a link with an empty path
    pub fn new(input: InputConnection, output: OutputConnection) -> Self {
        Self {
            input,
            output,
            path: Vec::new(),
        }
    }
}

/// One end of a link in the external representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEnd {
    /// Raw item handle value
    pub id: u64,
    /// Pin index
    pub port: i32,
}

/// A link in the external representation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    /// Source pin
    pub from: LinkEnd,
    /// Destination pin
    pub to: LinkEnd,
}

impl LinkRecord {
    /// Record for a live link
    pub fn from_link(link: &Link) -> Self {
        Self {
            from: LinkEnd {
                id: link.input.source_item.value(),
                port: link.input.source_port,
            },
            to: LinkEnd {
                id: link.output.dest_item.value(),
                port: link.output.dest_port,
            },
        }
    }

    /// Source handle as written
    pub fn source(&self) -> ItemId {
        ItemId::from_value(self.from.id)
    }

    /// Destination handle as written
    pub fn dest(&self) -> ItemId {
        ItemId::from_value(self.to.id)
    }
}

/// A pass-through point with one input and one output
#[derive(Debug, Clone, PartialEq)]
pub struct Router {
    /// Dot color
    pub color: Color,
    /// Color of links leaving the router, inherited from whatever feeds it
    pub link_color: Option<Color>,
}

impl Default for Router {
    fn default() -> Self {
        Self {
            color: NODE_DEFAULT_COLOR,
            link_color: None,
        }
    }
}

impl Router {
    pub(crate) fn write_fields(&self, map: &mut Fields) {
        fields::put(map, "color", self.color);
    }

    pub(crate) fn read_fields(&mut self, map: &Fields) -> Result<(), SerializeError> {
        if let Some(color) = fields::opt_color(map, "color")? {
            self.color = color;
        }
        Ok(())
    }
}
