// SPDX-License-Identifier: MIT OR Apache-2.0
//! Demo node types shared by unit tests.

use crate::document::Document;
use crate::factory::{DefaultItemFactory, NodeCategory, NodeRegistry, NodeTypeDef};
use crate::node::InputArity;
use std::sync::Arc;

/// Registry with a handful of plain, unbounded, typed and sub-graph node types
pub(crate) fn demo_registry() -> NodeRegistry {
    let mut registry = NodeRegistry::new();
    registry.register(
        NodeTypeDef::new("exec")
            .category(NodeCategory::Flow)
            .pins(InputArity::Fixed(4), 1),
    );
    registry.register(NodeTypeDef::new("null"));
    registry.register(NodeTypeDef::new("merge").pins(InputArity::Unbounded, 1));
    registry.register(NodeTypeDef::new("split").pins(InputArity::Fixed(1), 2));
    registry.register(
        NodeTypeDef::new("in")
            .category(NodeCategory::Input)
            .pins(InputArity::Fixed(0), 1),
    );
    registry.register(
        NodeTypeDef::new("out")
            .category(NodeCategory::Output)
            .pins(InputArity::Fixed(1), 0),
    );
    registry.register(
        NodeTypeDef::new("subgraph")
            .category(NodeCategory::Subgraph)
            .subgraph(),
    );
    registry.register(
        NodeTypeDef::new("sumint")
            .category(NodeCategory::Math)
            .typed(&["int", "int"], &["int"]),
    );
    registry.register(
        NodeTypeDef::new("sumfloat")
            .category(NodeCategory::Math)
            .typed(&["float", "float"], &["float"]),
    );
    registry
}

/// Empty document using [`demo_registry`]
pub(crate) fn demo_document() -> Document {
    Document::new(Arc::new(demo_registry()), Arc::new(DefaultItemFactory))
}
