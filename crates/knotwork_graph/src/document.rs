// SPDX-License-Identifier: MIT OR Apache-2.0
//! The document: item pool, graphs, type system and history.
//!
//! A [`Document`] is the single owner of everything in a node-graph file.
//! Graphs and items refer to each other only by handle. Edits made inside
//! an [`EditGroup`] are committed to the history as one version when the
//! outermost group closes.

use crate::config::DocumentConfig;
use crate::error::{DocumentError, HistoryError, SerializeError};
use crate::factory::{ItemFactory, NodeFactory};
use crate::graph::{Graph, GraphMut, GraphRef};
use crate::history::History;
use crate::id::{GraphId, ItemId, Uid};
use crate::item::GraphItem;
use crate::pool::ItemPool;
use crate::serialize::{DocumentFile, ReadMode};
use crate::types::TypeSystem;
use indexmap::IndexMap;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Callback told which graph changed
pub type ModifiedNotifier = Box<dyn FnMut(GraphId) + Send>;

/// An editable node-graph document
pub struct Document {
    pub(crate) pool: ItemPool,
    pub(crate) graphs: IndexMap<GraphId, Graph>,
    pub(crate) root: GraphId,
    next_graph_id: u32,
    pub(crate) types: TypeSystem,
    pub(crate) node_factory: Arc<dyn NodeFactory>,
    pub(crate) item_factory: Arc<dyn ItemFactory>,
    pub(crate) history: History,
    config: DocumentConfig,
    save_path: Option<PathBuf>,
    title: String,
    dirty: bool,
    ever_edited: bool,
    readonly: bool,
    notifier: Option<ModifiedNotifier>,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("title", &self.title)
            .field("save_path", &self.save_path)
            .field("items", &self.pool.count())
            .field("graphs", &self.graphs.len())
            .field("dirty", &self.dirty)
            .field("readonly", &self.readonly)
            .finish_non_exhaustive()
    }
}

impl Document {
    /// Create an empty document with default settings
    pub fn new(node_factory: Arc<dyn NodeFactory>, item_factory: Arc<dyn ItemFactory>) -> Self {
        Self::with_config(node_factory, item_factory, DocumentConfig::default())
    }

    /// Create an empty document.
    ///
    /// The empty state is committed as version 0 and the document starts
    /// clean.
    pub fn with_config(
        node_factory: Arc<dyn NodeFactory>,
        item_factory: Arc<dyn ItemFactory>,
        config: DocumentConfig,
    ) -> Self {
        let root = GraphId(0);
        let mut graphs = IndexMap::new();
        graphs.insert(root, node_factory.create_root_graph());
        let mut doc = Self {
            pool: ItemPool::new(),
            graphs,
            root,
            next_graph_id: 1,
            types: TypeSystem::with_builtin_types(),
            node_factory,
            item_factory,
            history: History::new(config.compression_level, config.history_limit),
            readonly: false,
            config,
            save_path: None,
            title: "untitled".to_owned(),
            dirty: false,
            ever_edited: false,
            notifier: None,
        };
        doc.reset_history("initialize");
        doc.readonly = doc.config.readonly;
        doc
    }

    /// Builder: replace the type system
    pub fn with_types(mut self, types: TypeSystem) -> Self {
        self.types = types;
        self
    }

    fn reset_history(&mut self, message: &str) {
        self.history.reset();
        if let Err(e) = self.commit(message) {
            tracing::error!("failed to commit initial version: {e}");
        }
        self.history.mark_saved();
        self.dirty = false;
        self.ever_edited = false;
    }

    /// Root graph handle
    pub fn root(&self) -> GraphId {
        self.root
    }

    /// Read view of the root graph
    pub fn root_graph(&self) -> GraphRef<'_> {
        GraphRef {
            doc: self,
            id: self.root,
            graph: &self.graphs[&self.root],
        }
    }

    /// Edit view of the root graph
    pub fn root_graph_mut(&mut self) -> GraphMut<'_> {
        let id = self.root;
        GraphMut { doc: self, id }
    }

    /// Read view of any graph
    pub fn graph(&self, id: GraphId) -> Option<GraphRef<'_>> {
        let graph = self.graphs.get(&id)?;
        Some(GraphRef {
            doc: self,
            id,
            graph,
        })
    }

    /// Edit view of any graph
    pub fn graph_mut(&mut self, id: GraphId) -> Option<GraphMut<'_>> {
        if self.graphs.contains_key(&id) {
            Some(GraphMut { doc: self, id })
        } else {
            None
        }
    }

    pub(crate) fn graph_edit(&mut self, id: GraphId) -> GraphMut<'_> {
        GraphMut { doc: self, id }
    }

    /// Handles of every graph, root first
    pub fn graph_ids(&self) -> impl Iterator<Item = GraphId> + '_ {
        self.graphs.keys().copied()
    }

    /// Look up an item in any graph
    pub fn item(&self, id: ItemId) -> Option<&GraphItem> {
        self.pool.get(id)
    }

    /// Mutable lookup, for edits the graph does not need to know about
    pub fn item_mut(&mut self, id: ItemId) -> Option<&mut GraphItem> {
        self.pool.get_mut(id)
    }

    /// Handle of the item with persistent identity `uid`
    pub fn find_item_by_uid(&self, uid: &Uid) -> Option<ItemId> {
        self.pool.find_by_uid(uid)
    }

    /// Number of live items, links included
    pub fn item_count(&self) -> usize {
        self.pool.count()
    }

    /// Type system used by typed nodes
    pub fn types(&self) -> &TypeSystem {
        &self.types
    }

    /// Mutable type system
    pub fn types_mut(&mut self) -> &mut TypeSystem {
        &mut self.types
    }

    /// Node factory
    pub fn node_factory(&self) -> &Arc<dyn NodeFactory> {
        &self.node_factory
    }

    /// Item factory
    pub fn item_factory(&self) -> &Arc<dyn ItemFactory> {
        &self.item_factory
    }

    /// Version history
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Settings
    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }

    /// Title, the file stem once saved or opened
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Set the title
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = title.into();
    }

    /// Where [`Document::save`] writes
    pub fn save_path(&self) -> Option<&Path> {
        self.save_path.as_deref()
    }

    /// Whether the current state differs from the saved one
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether anything was edited since the document was created or opened
    pub fn ever_edited(&self) -> bool {
        self.ever_edited
    }

    /// Whether the whole document is read-only
    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    /// Make the whole document read-only or writable
    pub fn set_readonly(&mut self, readonly: bool) {
        self.readonly = readonly;
    }

    /// Install the callback told about graph modifications
    pub fn set_modified_notifier(&mut self, notifier: Option<ModifiedNotifier>) {
        self.notifier = notifier;
    }

    pub(crate) fn is_graph_readonly(&self, id: GraphId) -> bool {
        if self.readonly {
            return true;
        }
        let mut current = Some(id);
        while let Some(gid) = current {
            let Some(graph) = self.graphs.get(&gid) else {
                return false;
            };
            if graph.readonly {
                return true;
            }
            current = graph.parent;
        }
        false
    }

    pub(crate) fn notify_graph_modified(&mut self, id: GraphId) {
        self.dirty = true;
        self.ever_edited = true;
        if let Some(notifier) = self.notifier.as_mut() {
            notifier(id);
        }
    }

    pub(crate) fn allocate_graph_id(&mut self) -> GraphId {
        let id = GraphId(self.next_graph_id);
        self.next_graph_id += 1;
        id
    }

    /// Create the nested graph of a sub-graph node unless it already has a live one
    pub(crate) fn attach_subgraph(
        &mut self,
        parent: GraphId,
        node: ItemId,
        reserved: Option<GraphId>,
    ) -> Option<GraphId> {
        let owner = self.pool.get(node)?.as_node()?;
        if !owner.spawns_subgraph {
            return None;
        }
        if let Some(existing) = owner.subgraph.filter(|g| self.graphs.contains_key(g)) {
            return Some(existing);
        }
        let mut graph = Graph::new(owner.name.clone());
        graph.parent = Some(parent);
        graph.owner = Some(node);
        let id = reserved.unwrap_or_else(|| self.allocate_graph_id());
        self.graphs.insert(id, graph);
        if let Some(owner) = self.pool.get_mut(node).and_then(GraphItem::as_node_mut) {
            owner.subgraph = Some(id);
        }
        Some(id)
    }

    /// Release an item and, for sub-graph nodes, everything nested in it
    pub(crate) fn dispose_item(&mut self, id: ItemId) -> Option<GraphItem> {
        let item = self.pool.release(id)?;
        if let Some(sub) = item.as_node().and_then(|node| node.subgraph) {
            self.dispose_graph(sub);
        }
        Some(item)
    }

    fn dispose_graph(&mut self, id: GraphId) {
        let Some(graph) = self.graphs.shift_remove(&id) else {
            return;
        };
        for item in graph.items {
            self.dispose_item(item);
        }
    }

    /// `id` plus every item nested in its sub-graphs
    pub(crate) fn subtree(&self, id: ItemId) -> Vec<ItemId> {
        let mut out = vec![id];
        let mut next = 0;
        while next < out.len() {
            let sub = self
                .pool
                .get(out[next])
                .and_then(GraphItem::as_node)
                .and_then(|node| node.subgraph)
                .and_then(|g| self.graphs.get(&g));
            if let Some(graph) = sub {
                out.extend(graph.items.iter().copied());
            }
            next += 1;
        }
        out
    }

    /// Live handles of the extra dependencies of `node`
    pub(crate) fn dependencies_of(&self, node: ItemId) -> Vec<ItemId> {
        let Some(deps) = self
            .pool
            .get(node)
            .and_then(GraphItem::as_node)
            .map(|n| &n.extra_dependencies)
        else {
            return Vec::new();
        };
        deps.iter()
            .filter_map(|uid| {
                let found = self.pool.find_by_uid(uid);
                if found.is_none() {
                    tracing::warn!("dependency {uid} of {node} does not exist");
                }
                found
            })
            .collect()
    }

    // History

    /// Open an edit group; edits are committed as one version when the outermost group closes
    pub fn edit_group(&mut self, message: impl Into<String>) -> EditGroup<'_> {
        self.begin_edit_group();
        EditGroup {
            doc: self,
            message: message.into(),
        }
    }

    /// Open an edit group without a guard; pair with [`Document::end_edit_group`]
    pub fn begin_edit_group(&mut self) {
        self.history.edit_group_level += 1;
    }

    /// Close an edit group, committing if it was the outermost one
    pub fn end_edit_group(&mut self, message: &str) -> Option<usize> {
        if self.history.edit_group_level == 0 {
            tracing::warn!("edit group closed more often than opened");
            return None;
        }
        self.history.edit_group_level -= 1;
        self.commit_if_appropriate(message)
    }

    /// Commit unless an edit group is open
    pub fn commit_if_appropriate(&mut self, message: &str) -> Option<usize> {
        if self.history.in_edit_group() {
            return None;
        }
        match self.commit(message) {
            Ok(version) => Some(version),
            Err(e) => {
                tracing::error!("failed to commit {message:?}: {e}");
                None
            }
        }
    }

    /// Snapshot the document as a new version
    pub fn commit(&mut self, message: &str) -> Result<usize, HistoryError> {
        let record = self.root_graph().serialize();
        let snapshot = serde_json::to_vec(&record).map_err(SerializeError::from)?;
        let version = self.history.commit(&snapshot, message)?;
        if self.config.prune_on_commit {
            self.history.prune();
        }
        self.dirty = true;
        self.ever_edited = true;
        Ok(version)
    }

    /// Replace the live state with `version`; on failure nothing changes
    pub fn checkout(&mut self, version: usize) -> Result<(), HistoryError> {
        let bytes = self.history.snapshot(version)?;
        let record = serde_json::from_slice(&bytes).map_err(|e| {
            tracing::error!("version {version} does not parse: {e}");
            HistoryError::Corrupt(version)
        })?;
        let mode = self.read_mode();
        self.history.edit_group_level += 1;
        let result = self.deserialize_graph(self.root, &record, mode);
        self.history.edit_group_level -= 1;
        result?;
        self.dirty = self.history.file_version() != Some(version);
        tracing::debug!("checked out version {version}");
        Ok(())
    }

    /// Step back one version; returns the version now checked out
    pub fn undo(&mut self) -> Result<usize, HistoryError> {
        let (position, version) = self.history.undo_target().inspect_err(|_| {
            tracing::info!("undo: already at oldest version");
        })?;
        self.checkout(version)?;
        self.history.set_cursor(position);
        Ok(version)
    }

    /// Step forward one version; returns the version now checked out
    pub fn redo(&mut self) -> Result<usize, HistoryError> {
        let (position, version) = self.history.redo_target().inspect_err(|_| {
            tracing::info!("redo: already at newest version");
        })?;
        self.checkout(version)?;
        self.history.set_cursor(position);
        Ok(version)
    }

    /// Drop snapshots that are no longer reachable by undo or redo
    pub fn prune_history(&mut self) {
        self.history.prune();
    }

    pub(crate) fn read_mode(&self) -> ReadMode {
        if self.config.deserialize_inplace {
            ReadMode::InPlace
        } else {
            ReadMode::Replace
        }
    }

    // Files

    /// Whole document as JSON text
    pub fn to_json(&self) -> Result<String, SerializeError> {
        let file = DocumentFile {
            root: self.root_graph().serialize(),
        };
        Ok(serde_json::to_string_pretty(&file)?)
    }

    /// Replace the root graph contents with a JSON document body; no history is recorded
    pub fn read_json(&mut self, json: &str) -> Result<(), SerializeError> {
        let file: DocumentFile = serde_json::from_str(json).map_err(|e| {
            tracing::error!("document does not parse: {e}");
            SerializeError::from(e)
        })?;
        let mode = self.read_mode();
        self.deserialize_graph(self.root, &file.root, mode)?;
        Ok(())
    }

    /// Open a document file
    pub fn open(
        path: &Path,
        node_factory: Arc<dyn NodeFactory>,
        item_factory: Arc<dyn ItemFactory>,
        config: DocumentConfig,
    ) -> Result<Self, DocumentError> {
        let text = std::fs::read_to_string(path).map_err(|source| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut doc = Self::with_config(node_factory, item_factory, config);
        let readonly = std::mem::replace(&mut doc.readonly, false);
        doc.read_json(&text)?;
        doc.save_path = Some(path.to_path_buf());
        doc.title = file_title(path);
        doc.reset_history(&format!("load {}", path.display()));
        doc.readonly = readonly;
        tracing::info!("opened {} ({} items)", path.display(), doc.item_count());
        Ok(doc)
    }

    /// Write to the save path
    pub fn save(&mut self) -> Result<(), DocumentError> {
        if self.readonly {
            tracing::warn!("document {} is read-only, not saved", self.title);
            return Err(DocumentError::ReadOnly);
        }
        let path = self.save_path.clone().ok_or(DocumentError::NoSavePath)?;
        self.save_to(&path)?;
        self.history.mark_saved();
        self.dirty = false;
        Ok(())
    }

    /// Write to `path` and make it the save path
    pub fn save_as(&mut self, path: &Path) -> Result<(), DocumentError> {
        self.save_to(path)?;
        self.save_path = Some(path.to_path_buf());
        self.title = file_title(path);
        self.history.mark_saved();
        self.dirty = false;
        self.readonly = false;
        Ok(())
    }

    /// Write a copy to `path` without changing the save path
    pub fn save_to(&self, path: &Path) -> Result<(), DocumentError> {
        let text = self.to_json()?;
        std::fs::write(path, text).map_err(|source| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!("saved {}", path.display());
        Ok(())
    }
}

fn file_title(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "untitled".to_owned())
}

/// Open edit group; derefs to the document and commits when dropped
pub struct EditGroup<'a> {
    doc: &'a mut Document,
    message: String,
}

impl EditGroup<'_> {
    /// Commit message used when the group closes
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Deref for EditGroup<'_> {
    type Target = Document;

    fn deref(&self) -> &Document {
        &*self.doc
    }
}

impl DerefMut for EditGroup<'_> {
    fn deref_mut(&mut self) -> &mut Document {
        &mut *self.doc
    }
}

impl Drop for EditGroup<'_> {
    fn drop(&mut self) {
        self.doc.end_edit_group(&self.message);
    }
}
