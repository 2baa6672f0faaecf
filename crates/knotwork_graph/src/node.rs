// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node and typed-node item variants.

use crate::color::{Color, NODE_DEFAULT_COLOR};
use crate::error::SerializeError;
use crate::fields::{self, Fields};
use crate::geometry::Vec2;
use crate::id::{GraphId, Uid};
use crate::types::TypeSystem;
use serde::{Deserialize, Serialize};

/// Node is bypassed: evaluation passes its first input straight through
pub const NODE_FLAG_BYPASS: u64 = 1;

/// How many inputs a node accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputArity {
    /// Exactly this many input pins
    Fixed(u32),
    /// Any number of inputs, kept densely numbered from zero
    Unbounded,
}

/// A processing node in a graph
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Symbolic node type, resolved by the node factory
    pub type_name: String,
    /// Display name
    pub name: String,
    /// Fill color
    pub color: Color,
    /// Bit flags, see [`NODE_FLAG_BYPASS`]
    pub flags: u64,
    /// Input arity
    pub inputs: InputArity,
    /// Number of leading inputs that are always shown, even for unbounded nodes
    pub fixed_inputs: u32,
    /// Input ports that must be connected for the node to be valid
    pub required_inputs: Vec<i32>,
    /// Number of output pins
    pub outputs: u32,
    /// Items this node depends on besides its inputs
    pub extra_dependencies: Vec<Uid>,
    /// Whether the node owns a nested graph
    pub spawns_subgraph: bool,
    /// The nested graph, once created
    pub subgraph: Option<GraphId>,
}

impl Node {
    /// Create a node with one input and one output
    pub fn new(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            name: name.into(),
            color: NODE_DEFAULT_COLOR,
            flags: 0,
            inputs: InputArity::Fixed(1),
            fixed_inputs: 0,
            required_inputs: Vec::new(),
            outputs: 1,
            extra_dependencies: Vec::new(),
            spawns_subgraph: false,
            subgraph: None,
        }
    }

    /// Set the input arity
    pub fn with_inputs(mut self, inputs: InputArity) -> Self {
        self.inputs = inputs;
        self
    }

    /// Set the output count
    pub fn with_outputs(mut self, outputs: u32) -> Self {
        self.outputs = outputs;
        self
    }

    /// Maximum input count, negative when unbounded
    pub fn num_max_inputs(&self) -> i32 {
        match self.inputs {
            InputArity::Fixed(n) => n as i32,
            InputArity::Unbounded => -1,
        }
    }

    /// Whether the node accepts any number of inputs
    pub fn is_unbounded(&self) -> bool {
        self.inputs == InputArity::Unbounded
    }

    /// Number of inputs shown regardless of connections
    pub fn num_fixed_inputs(&self) -> i32 {
        self.fixed_inputs as i32
    }

    /// Number of output pins
    pub fn num_outputs(&self) -> i32 {
        self.outputs as i32
    }

    /// Whether `port` must be connected
    pub fn is_required_input(&self, port: i32) -> bool {
        self.required_inputs.contains(&port)
    }

    /// Whether `port` is a valid input index (any non-negative port for unbounded nodes)
    pub fn has_input(&self, port: i32) -> bool {
        match self.inputs {
            InputArity::Fixed(n) => port >= 0 && port < n as i32,
            InputArity::Unbounded => port >= 0,
        }
    }

    /// Whether `port` is a valid output index
    pub fn has_output(&self, port: i32) -> bool {
        port >= 0 && port < self.outputs as i32
    }

    /// Test a flag bit
    pub fn has_flag(&self, flag: u64) -> bool {
        self.flags & flag != 0
    }

    /// Set or clear a flag bit
    pub fn set_flag(&mut self, flag: u64, on: bool) {
        if on {
            self.flags |= flag;
        } else {
            self.flags &= !flag;
        }
    }

    /// Whether the color differs from the default fill
    pub fn has_set_color(&self) -> bool {
        self.color != NODE_DEFAULT_COLOR
    }

    /// Rename the node, returning the accepted name.
    ///
    /// Leading and trailing whitespace is stripped; an empty name is refused.
    pub fn rename(&mut self, desired: &str) -> Option<&str> {
        let trimmed = desired.trim();
        if trimmed.is_empty() {
            return None;
        }
        self.name = trimmed.to_owned();
        Some(&self.name)
    }

    /// Offset of input pin `index` from the node position.
    ///
    /// `connected` is the number of links feeding the node; it decides the
    /// pin spacing of unbounded nodes. A negative index on an unbounded node
    /// places the pin after the last connected one.
    pub fn input_pin_offset(&self, size: Vec2, index: i32, connected: usize) -> Vec2 {
        let (count, index) = match self.inputs {
            InputArity::Fixed(n) => (n as i32, index),
            InputArity::Unbounded if connected == 0 => (1, 0),
            InputArity::Unbounded => {
                let count = connected as i32;
                (count, if index < 0 { count } else { index })
            }
        };
        let mut idx = index as f32;
        if index >= count {
            idx = index as f32 - 0.5;
        }
        Vec2::new(
            (size.x * 0.9) * (idx + 1.0) / (count as f32 + 1.0) - size.x * 0.45,
            -size.y / 2.0 - 4.0,
        )
    }

    /// Offset of output pin `index` from the node position
    pub fn output_pin_offset(&self, size: Vec2, index: i32) -> Vec2 {
        Vec2::new(
            (size.x * 0.9) * (index as f32 + 1.0) / (self.outputs as f32 + 1.0) - size.x * 0.45,
            size.y / 2.0 + 4.0,
        )
    }

    /// Direction a link leaves towards an input pin
    pub fn input_pin_dir(&self, _index: i32) -> Vec2 {
        Vec2::new(0.0, -1.0)
    }

    /// Direction a link leaves an output pin
    pub fn output_pin_dir(&self, _index: i32) -> Vec2 {
        Vec2::new(0.0, 1.0)
    }

    pub(crate) fn write_fields(&self, map: &mut Fields) {
        fields::put(map, "type", &self.type_name);
        fields::put(map, "name", &self.name);
        fields::put(map, "color", self.color);
        if self.flags != 0 {
            fields::put(map, "flags", self.flags);
        }
        if !self.extra_dependencies.is_empty() {
            fields::put(map, "deps", &self.extra_dependencies);
        }
    }

    pub(crate) fn read_fields(&mut self, map: &Fields) -> Result<(), SerializeError> {
        let type_name: String = fields::req(map, "type")?;
        let name: String = fields::req(map, "name")?;
        let color = fields::opt_color(map, "color")?;
        let flags: Option<u64> = fields::opt(map, "flags")?;
        let deps: Option<Vec<String>> = fields::opt(map, "deps")?;
        let deps = deps
            .unwrap_or_default()
            .iter()
            .map(|s| fields::parse_uid(s))
            .collect::<Result<Vec<_>, _>>()?;

        self.type_name = type_name;
        self.name = name;
        if let Some(color) = color {
            self.color = color;
        }
        self.flags = flags.unwrap_or(0);
        self.extra_dependencies = deps;
        Ok(())
    }
}

/// A node whose pins carry type names checked against a [`TypeSystem`]
#[derive(Debug, Clone, PartialEq)]
pub struct TypedNode {
    /// Common node data
    pub node: Node,
    /// Input pin types; for unbounded nodes the last entry applies to every further port
    pub input_types: Vec<String>,
    /// Output pin types
    pub output_types: Vec<String>,
}

impl TypedNode {
    /// Wrap a node with pin types
    pub fn new(node: Node, input_types: Vec<String>, output_types: Vec<String>) -> Self {
        Self {
            node,
            input_types,
            output_types,
        }
    }

    /// Type of input `port`, empty when out of range
    pub fn input_type(&self, port: i32) -> &str {
        if !self.node.has_input(port) {
            return "";
        }
        let idx = port as usize;
        match self.input_types.get(idx) {
            Some(t) => t,
            None if self.node.is_unbounded() => self.input_types.last().map_or("", String::as_str),
            None => "",
        }
    }

    /// Type of output `port`, empty when out of range
    pub fn output_type(&self, port: i32) -> &str {
        if !self.node.has_output(port) {
            return "";
        }
        self.output_types
            .get(port as usize)
            .map_or("", String::as_str)
    }

    /// Whether input `port` accepts a value of type `source_type`
    pub fn accept_input(&self, port: i32, source_type: &str, types: &TypeSystem) -> bool {
        types.is_convertible(source_type, self.input_type(port))
    }

    /// First input port that accepts `source_type`, if any
    pub fn pin_for_incoming_link(&self, source_type: &str, types: &TypeSystem) -> Option<i32> {
        let count = match self.node.inputs {
            InputArity::Fixed(n) => n as i32,
            InputArity::Unbounded => self.input_types.len().max(1) as i32,
        };
        (0..count).find(|&port| types.is_convertible(source_type, self.input_type(port)))
    }

    /// Pin color hint for input `port`
    pub fn input_pin_color(&self, port: i32, types: &TypeSystem) -> Option<Color> {
        types.color_hint(self.input_type(port))
    }

    /// Pin color hint for output `port`
    pub fn output_pin_color(&self, port: i32, types: &TypeSystem) -> Option<Color> {
        types.color_hint(self.output_type(port))
    }
}
