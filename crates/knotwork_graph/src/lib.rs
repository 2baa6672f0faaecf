// SPDX-License-Identifier: MIT OR Apache-2.0
//! Editable node-graph documents.
//!
//! A [`Document`] owns a pool of items and a tree of graphs:
//! - Nodes with fixed or unbounded inputs, optionally with typed pins
//! - Links, routers, group boxes, comments and arrows
//! - Sub-graphs owned by nodes
//!
//! ## Architecture
//!
//! Items live in an [`ItemPool`] and are addressed by generation-checked
//! [`ItemId`] handles; each also carries a persistent [`Uid`]. Graphs hold
//! membership and a connection map, and are read through [`GraphRef`] and
//! edited through [`GraphMut`]. Every commit stores a compressed snapshot in
//! the document's [`History`], which drives undo and redo.

pub mod boxes;
pub mod color;
pub mod config;
pub mod document;
pub mod error;
pub mod factory;
pub mod geometry;
pub mod graph;
pub mod history;
pub mod id;
pub mod item;
pub mod link;
pub mod node;
pub mod pool;
pub mod routing;
pub mod serialize;
pub mod traverse;
pub mod types;

mod fields;

#[cfg(test)]
mod testing;

pub use boxes::{Arrow, CommentBox, GroupBox};
pub use color::Color;
pub use config::DocumentConfig;
pub use document::{Document, EditGroup, ModifiedNotifier};
pub use error::{DocumentError, GraphError, HistoryError, LinkError, LoopError, PoolError, SerializeError};
pub use factory::{DefaultItemFactory, ItemFactory, NodeCategory, NodeFactory, NodeRegistry, NodeTypeDef};
pub use geometry::{Aabb, Vec2};
pub use graph::{Graph, GraphMut, GraphRef};
pub use history::History;
pub use id::{GraphId, InputConnection, ItemId, NodePin, OutputConnection, PinKind, Uid};
pub use item::{Dyeable, GraphItem, ItemKind};
pub use link::{Link, LinkRecord, Router};
pub use node::{InputArity, Node, TypedNode};
pub use pool::ItemPool;
pub use serialize::{DocumentFile, GraphRecord, ItemRecord, PasteReport, ReadMode};
pub use traverse::{GraphTraverseResult, LoopCheck, TraverseDirection, TraversedNode};
pub use types::TypeSystem;
