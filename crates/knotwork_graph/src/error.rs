// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types for pool, graph, serialization, history and document operations.

use crate::id::{GraphId, ItemId, NodePin, Uid};
use std::path::PathBuf;

/// Identity errors raised by the item pool
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Another live item already owns this UID
    #[error("UID {uid} already belongs to item {existing}")]
    DuplicateUid {
        /// The conflicting UID
        uid: Uid,
        /// The live item holding it
        existing: ItemId,
    },

    /// The UID to re-key from is not registered
    #[error("UID {0} is not registered")]
    UnknownUid(Uid),
}

/// Errors raised when adding or removing graph members
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The graph, one of its ancestors or the document is read-only
    #[error("graph {0} is read-only")]
    ReadOnly(GraphId),

    /// The item already has a live handle
    #[error("item {0} is already part of a graph")]
    AlreadyAdded(ItemId),

    /// No such graph
    #[error("graph {0} does not exist")]
    GraphNotFound(GraphId),

    /// No such item, or the handle is stale
    #[error("item {0} does not exist")]
    ItemNotFound(ItemId),

    /// No factory knows how to create the requested item
    #[error("no factory can create {0:?}")]
    UnknownFactory(String),

    /// Identity error from the pool
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Reasons a link cannot be created
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// The graph is read-only
    #[error("graph {0} is read-only")]
    ReadOnly(GraphId),

    /// An endpoint is missing, stale or not a linkable item
    #[error("item {0} cannot be linked")]
    BadEndpoint(ItemId),

    /// The graph no longer exists
    #[error("graph {0} does not exist")]
    GraphNotFound(GraphId),

    /// An endpoint is not a member of the graph
    #[error("item {0} is not in graph {1}")]
    NotInGraph(ItemId, GraphId),

    /// The port index lies outside the item's declared pins
    #[error("port {port} is out of range on item {item}")]
    PortOutOfRange {
        /// Item the port belongs to
        item: ItemId,
        /// Requested port
        port: i32,
    },

    /// A negative destination port on a node with fixed arity
    #[error("cannot append an input on fixed-arity node {0}")]
    CannotAppend(ItemId),

    /// The destination (or something downstream of a router) rejected the source
    #[error("input rejected at {0}")]
    Rejected(NodePin),

    /// The link would close a dependency loop
    #[error("link would create a loop through {} items", .0.len())]
    WouldLoop(Vec<ItemId>),

    /// Identity error from the pool
    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Traversal found a dependency loop
#[derive(Debug, thiserror::Error)]
#[error("dependency loop through {} items", .path.len())]
pub struct LoopError {
    /// Items on the loop, in DFS stack order
    pub path: Vec<ItemId>,
}

/// Errors while reading or writing the JSON document representation
#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    /// Malformed JSON
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A required field is absent
    #[error("missing field {0:?}")]
    MissingField(&'static str),

    /// A field is present but has the wrong shape
    #[error("invalid field {field:?}: {reason}")]
    InvalidField {
        /// Field name
        field: &'static str,
        /// What was wrong with it
        reason: String,
    },

    /// A color string is not `#rrggbbaa`
    #[error("bad color {0:?}")]
    BadColor(String),

    /// A UID string is not a valid UUID
    #[error("bad uid {0:?}")]
    BadUid(String),

    /// The item factory is unknown
    #[error("unknown item factory {0:?}")]
    UnknownFactory(String),

    /// The node factory does not know the node type
    #[error("unknown node type {0:?}")]
    UnknownNodeType(String),

    /// A link refers to an id not present in the same record
    #[error("link refers to unknown item id {0}")]
    UnknownLinkEndpoint(u64),

    /// The input holds the same UID twice
    #[error("duplicate uid {0} in input")]
    DuplicateUid(Uid),

    /// The target graph is read-only
    #[error("graph {0} is read-only")]
    ReadOnly(GraphId),

    /// The target graph does not exist
    #[error("graph {0} does not exist")]
    GraphNotFound(GraphId),
}

/// Errors raised by the version history
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// No such version
    #[error("version {0} does not exist")]
    BadVersion(usize),

    /// The version's snapshot was pruned
    #[error("version {0} has been pruned")]
    Pruned(usize),

    /// Compression or decompression failed
    #[error("snapshot compression failed: {0}")]
    Compression(#[from] std::io::Error),

    /// Decompressed snapshot has the wrong size or cannot be parsed
    #[error("version {0} is corrupt")]
    Corrupt(usize),

    /// Undo requested at the oldest version
    #[error("already at oldest change")]
    AtOldest,

    /// Redo requested at the newest version
    #[error("already at newest change")]
    AtNewest,

    /// The snapshot could not be produced or applied
    #[error(transparent)]
    Serialize(#[from] SerializeError),
}

/// Errors raised by document-level operations
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// File system failure
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File being accessed
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The document has no save path yet
    #[error("document has never been saved")]
    NoSavePath,

    /// The document is read-only
    #[error("document is read-only")]
    ReadOnly,

    /// The document body could not be read or written
    #[error(transparent)]
    Serialize(#[from] SerializeError),

    /// History failure
    #[error(transparent)]
    History(#[from] HistoryError),

    /// Config file failure
    #[error("config error: {0}")]
    Config(String),
}
