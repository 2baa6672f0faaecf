// SPDX-License-Identifier: MIT OR Apache-2.0
//! Factories that construct nodes and other items by name.
//!
//! A document asks its [`NodeFactory`] for nodes (by type name) and its
//! [`ItemFactory`] for everything else (by factory name). Both are used when
//! the user creates something and when a document is read back from JSON.

use crate::boxes::{Arrow, CommentBox, GroupBox};
use crate::color::Color;
use crate::geometry::Aabb;
use crate::graph::Graph;
use crate::id::GraphId;
use crate::item::{GraphItem, ItemKind};
use crate::link::{Link, Router};
use crate::node::{InputArity, Node, TypedNode};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Node type category, used to organize type listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeCategory {
    /// Sources with no inputs
    Input,
    /// Sinks with no outputs
    Output,
    /// Arithmetic
    Math,
    /// Control flow
    Flow,
    /// Nodes owning a nested graph
    Subgraph,
    /// Utility nodes
    Utility,
    /// Anything else
    Custom,
}

/// One entry of a node type listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTypeEntry {
    /// Category
    pub category: NodeCategory,
    /// Type name passed to [`NodeFactory::create_node`]
    pub type_name: String,
    /// Human readable name
    pub display_name: String,
}

/// Creates root graphs and nodes for a document
pub trait NodeFactory: Send + Sync {
    /// Create the document's root graph
    fn create_root_graph(&self) -> Graph {
        Graph::new("root")
    }

    /// Create a detached node of `type_name` for graph `parent`
    fn create_node(&self, parent: GraphId, type_name: &str) -> Option<GraphItem>;

    /// List the node types this factory can create
    fn list_node_types(&self) -> Vec<NodeTypeEntry>;

    /// Release side resources of a node that was created but will not be used
    fn discard(&self, _parent: GraphId, _node: GraphItem) {}
}

/// Creates non-node items (links, routers, comments, ...) by factory name
pub trait ItemFactory: Send + Sync {
    /// Create a detached item for graph `parent`
    fn make(&self, parent: GraphId, name: &str) -> Option<GraphItem>;

    /// Names accepted by [`ItemFactory::make`]; `user_creatable_only` hides internal kinds
    fn list_names(&self, user_creatable_only: bool) -> Vec<String>;

    /// Factory name that would recreate `item`
    fn factory_name(&self, item: &GraphItem) -> Option<String> {
        (!item.factory.is_empty()).then(|| item.factory.clone())
    }

    /// Release side resources of an item that was created but will not be used
    fn discard(&self, _parent: GraphId, _item: GraphItem) {}
}

/// Builder for a registered node type
#[derive(Debug, Clone, PartialEq)]
pub struct NodeTypeDef {
    /// Unique type identifier
    pub id: String,
    /// Display name, also the default node name
    pub name: String,
    /// Category
    pub category: NodeCategory,
    /// Description
    pub description: String,
    /// Input arity
    pub inputs: InputArity,
    /// Inputs shown regardless of connections
    pub fixed_inputs: u32,
    /// Ports that must be connected
    pub required_inputs: Vec<i32>,
    /// Output count
    pub outputs: u32,
    /// Pin types; when set, nodes of this type are typed nodes
    pub pin_types: Option<(Vec<String>, Vec<String>)>,
    /// Whether nodes of this type own a nested graph
    pub spawns_subgraph: bool,
    /// Fill color override
    pub color: Option<Color>,
    /// Size override as (width, height)
    pub size: Option<(f32, f32)>,
}

impl NodeTypeDef {
    /// A one-input, one-output type in the utility category
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            category: NodeCategory::Utility,
            description: String::new(),
            inputs: InputArity::Fixed(1),
            fixed_inputs: 0,
            required_inputs: Vec::new(),
            outputs: 1,
            pin_types: None,
            spawns_subgraph: false,
            color: None,
            size: None,
        }
    }

    /// Set the category
    pub fn category(mut self, category: NodeCategory) -> Self {
        self.category = category;
        self
    }

    /// Set the description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the pin counts
    pub fn pins(mut self, inputs: InputArity, outputs: u32) -> Self {
        self.inputs = inputs;
        self.outputs = outputs;
        self
    }

    /// Give the type typed pins; the counts follow the type lists unless the inputs are unbounded
    pub fn typed(mut self, inputs: &[&str], outputs: &[&str]) -> Self {
        if self.inputs != InputArity::Unbounded {
            self.inputs = InputArity::Fixed(inputs.len() as u32);
        }
        self.outputs = outputs.len() as u32;
        self.pin_types = Some((
            inputs.iter().map(|s| (*s).to_owned()).collect(),
            outputs.iter().map(|s| (*s).to_owned()).collect(),
        ));
        self
    }

    /// Mark input ports as required
    pub fn required(mut self, ports: &[i32]) -> Self {
        self.required_inputs = ports.to_vec();
        self
    }

    /// Nodes of this type own a nested graph
    pub fn subgraph(mut self) -> Self {
        self.spawns_subgraph = true;
        self
    }

    /// Build a detached node item of this type
    pub fn instantiate(&self) -> GraphItem {
        let mut node = Node::new(self.id.clone(), self.name.clone()).with_inputs(self.inputs);
        node.outputs = self.outputs;
        node.fixed_inputs = self.fixed_inputs;
        node.required_inputs = self.required_inputs.clone();
        node.spawns_subgraph = self.spawns_subgraph;
        if let Some(color) = self.color {
            node.color = color;
        }
        let mut item = match &self.pin_types {
            Some((inputs, outputs)) => {
                GraphItem::typed_node(TypedNode::new(node, inputs.clone(), outputs.clone()))
            }
            None => GraphItem::node(node),
        };
        if let Some((w, h)) = self.size {
            item.aabb = Aabb::centered(w / 2.0, h / 2.0);
        }
        item
    }
}

/// Table-driven [`NodeFactory`]
#[derive(Debug, Clone, Default)]
pub struct NodeRegistry {
    types: IndexMap<String, NodeTypeDef>,
    fallback: Option<NodeTypeDef>,
}

impl NodeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node type, replacing any previous definition with the same id
    pub fn register(&mut self, def: NodeTypeDef) {
        self.types.insert(def.id.clone(), def);
    }

    /// Definition used for type names that are not registered
    pub fn set_fallback(&mut self, def: Option<NodeTypeDef>) {
        self.fallback = def;
    }

    /// Get a node type by id
    pub fn get(&self, id: &str) -> Option<&NodeTypeDef> {
        self.types.get(id)
    }

    /// All registered types
    pub fn types(&self) -> impl Iterator<Item = &NodeTypeDef> {
        self.types.values()
    }

    /// Registered types of one category
    pub fn types_in_category(&self, category: NodeCategory) -> impl Iterator<Item = &NodeTypeDef> {
        self.types.values().filter(move |t| t.category == category)
    }
}

impl NodeFactory for NodeRegistry {
    fn create_node(&self, _parent: GraphId, type_name: &str) -> Option<GraphItem> {
        if let Some(def) = self.types.get(type_name) {
            return Some(def.instantiate());
        }
        let fallback = self.fallback.as_ref()?;
        tracing::debug!("node type {type_name:?} is unknown, using fallback definition");
        let mut item = fallback.instantiate();
        if let Some(node) = item.as_node_mut() {
            node.type_name = type_name.to_owned();
            node.name = type_name.to_owned();
        }
        Some(item)
    }

    fn list_node_types(&self) -> Vec<NodeTypeEntry> {
        self.types
            .values()
            .map(|def| NodeTypeEntry {
                category: def.category,
                type_name: def.id.clone(),
                display_name: def.name.clone(),
            })
            .collect()
    }
}

/// Item factory for the built-in non-node items
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultItemFactory;

impl DefaultItemFactory {
    const NAMES: [(&'static str, bool); 5] = [
        ("router", true),
        ("comment", true),
        ("arrow", true),
        ("group", true),
        ("link", false),
    ];
}

impl ItemFactory for DefaultItemFactory {
    fn make(&self, _parent: GraphId, name: &str) -> Option<GraphItem> {
        let kind = match name {
            "link" => ItemKind::Link(Link::new(Default::default(), Default::default())),
            "router" => ItemKind::Router(Router::default()),
            "comment" => ItemKind::Comment(CommentBox::default()),
            "arrow" => ItemKind::Arrow(Arrow::default()),
            "group" => ItemKind::GroupBox(GroupBox::default()),
            _ => return None,
        };
        Some(GraphItem::new(kind))
    }

    fn list_names(&self, user_creatable_only: bool) -> Vec<String> {
        Self::NAMES
            .iter()
            .filter(|(_, user)| *user || !user_creatable_only)
            .map(|(name, _)| (*name).to_owned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_creates_typed_nodes() {
        let mut registry = NodeRegistry::new();
        registry.register(
            NodeTypeDef::new("sumint")
                .category(NodeCategory::Math)
                .typed(&["int", "int"], &["int"]),
        );
        let item = registry.create_node(GraphId(0), "sumint").unwrap();
        let typed = item.as_typed_node().unwrap();
        assert_eq!(typed.node.num_max_inputs(), 2);
        assert_eq!(typed.output_type(0), "int");
        assert!(registry.create_node(GraphId(0), "nope").is_none());
        assert_eq!(registry.types_in_category(NodeCategory::Math).count(), 1);
    }

    #[test]
    fn test_registry_fallback_keeps_type_name() {
        let mut registry = NodeRegistry::new();
        registry.set_fallback(Some(NodeTypeDef::new("generic").pins(InputArity::Unbounded, 1)));
        let item = registry.create_node(GraphId(0), "mystery").unwrap();
        let node = item.as_node().unwrap();
        assert_eq!(node.type_name, "mystery");
        assert!(node.is_unbounded());
        assert!(registry.list_node_types().is_empty());
    }

    #[test]
    fn test_default_item_factory() {
        let factory = DefaultItemFactory;
        let router = factory.make(GraphId(0), "router").unwrap();
        assert!(router.as_router().is_some());
        assert_eq!(factory.factory_name(&router).as_deref(), Some("router"));
        assert!(factory.make(GraphId(0), "teapot").is_none());
        assert!(!factory.list_names(true).contains(&"link".to_owned()));
        assert!(factory.list_names(false).contains(&"link".to_owned()));
    }
}
