// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graphs: item membership, the connection map and the edits on both.
//!
//! A [`Graph`] is plain data owned by its [`Document`]. Reads go through a
//! [`GraphRef`] and edits through a [`GraphMut`]; both borrow the document so
//! they can reach the item pool, the type system and the other graphs.
//!
//! The connection map is keyed by the fed pin, so every input pin has at
//! most one link. Nodes with unbounded inputs keep their connected ports
//! packed as `0..n`; removing a link renumbers the ones above it.

use crate::color::Color;
use crate::document::Document;
use crate::error::{GraphError, LinkError, PoolError};
use crate::geometry::{Aabb, Vec2};
use crate::id::{GraphId, InputConnection, ItemId, NodePin, OutputConnection, PinKind};
use crate::item::{GraphItem, ItemKind};
use crate::link::Link;
use crate::routing;
use indexmap::{IndexMap, IndexSet};
use std::collections::{BTreeMap, HashSet};

/// Membership and connections of one graph
#[derive(Debug, Clone, Default)]
pub struct Graph {
    /// Display name
    pub name: String,
    pub(crate) parent: Option<GraphId>,
    pub(crate) owner: Option<ItemId>,
    pub(crate) items: IndexSet<ItemId>,
    pub(crate) links: IndexMap<OutputConnection, InputConnection>,
    pub(crate) link_ids: IndexMap<OutputConnection, ItemId>,
    pub(crate) readonly: bool,
}

impl Graph {
    /// Create an empty graph
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Enclosing graph, `None` for the root
    pub fn parent(&self) -> Option<GraphId> {
        self.parent
    }

    /// Node owning this graph, `None` for the root
    pub fn owner(&self) -> Option<ItemId> {
        self.owner
    }

    /// Number of members, links included
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the graph has no members
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of links
    pub fn link_count(&self) -> usize {
        self.links.len()
    }
}

/// Read access to a graph of a document
#[derive(Clone, Copy)]
pub struct GraphRef<'a> {
    pub(crate) doc: &'a Document,
    pub(crate) id: GraphId,
    pub(crate) graph: &'a Graph,
}

impl<'a> GraphRef<'a> {
    /// Graph handle
    pub fn id(&self) -> GraphId {
        self.id
    }

    /// Display name
    pub fn name(&self) -> &'a str {
        &self.graph.name
    }

    /// Enclosing graph
    pub fn parent(&self) -> Option<GraphId> {
        self.graph.parent
    }

    /// Node owning this graph
    pub fn owner(&self) -> Option<ItemId> {
        self.graph.owner
    }

    /// The owning document
    pub fn document(&self) -> &'a Document {
        self.doc
    }

    /// Whether this graph, an ancestor or the document is read-only
    pub fn is_readonly(&self) -> bool {
        self.doc.is_graph_readonly(self.id)
    }

    /// Member handles in insertion order
    pub fn items(&self) -> impl Iterator<Item = ItemId> + 'a {
        self.graph.items.iter().copied()
    }

    /// Number of members, links included
    pub fn len(&self) -> usize {
        self.graph.items.len()
    }

    /// Whether the graph has no members
    pub fn is_empty(&self) -> bool {
        self.graph.items.is_empty()
    }

    /// Whether `id` is a live member of this graph
    pub fn contains(&self, id: ItemId) -> bool {
        self.get(id).is_some()
    }

    /// Look up a member
    pub fn get(&self, id: ItemId) -> Option<&'a GraphItem> {
        if !self.graph.items.contains(&id) {
            return None;
        }
        self.doc.pool.get(id)
    }

    /// Handles of member nodes
    pub fn nodes(&self) -> impl Iterator<Item = ItemId> + 'a {
        let pool = &self.doc.pool;
        self.graph
            .items
            .iter()
            .copied()
            .filter(move |id| pool.get(*id).is_some_and(|item| item.as_node().is_some()))
    }

    /// All connections as (fed pin, feeding pin)
    pub fn links(&self) -> impl Iterator<Item = (OutputConnection, InputConnection)> + 'a {
        self.graph.links.iter().map(|(oc, ic)| (*oc, *ic))
    }

    /// Number of links
    pub fn link_count(&self) -> usize {
        self.graph.links.len()
    }

    /// Link item feeding input `port` of `dest`
    pub fn get_link(&self, dest: ItemId, port: i32) -> Option<ItemId> {
        self.graph
            .link_ids
            .get(&OutputConnection {
                dest_item: dest,
                dest_port: port,
            })
            .copied()
    }

    /// Pin feeding input `port` of `dest`, without resolving routers
    pub fn link_source(&self, dest: ItemId, port: i32) -> Option<InputConnection> {
        self.graph
            .links
            .get(&OutputConnection {
                dest_item: dest,
                dest_port: port,
            })
            .copied()
    }

    /// Every pin fed by output `port` of `source`
    pub fn link_destinations(&self, source: ItemId, port: i32) -> Vec<OutputConnection> {
        self.graph
            .links
            .iter()
            .filter(|(_, ic)| ic.source_item == source && ic.source_port == port)
            .map(|(oc, _)| *oc)
            .collect()
    }

    /// Link items entering or leaving `item`
    pub fn links_on_node(&self, item: ItemId) -> Vec<ItemId> {
        self.graph
            .links
            .iter()
            .filter(|(oc, ic)| oc.dest_item == item || ic.source_item == item)
            .filter_map(|(oc, _)| self.graph.link_ids.get(oc).copied())
            .collect()
    }

    /// Number of links entering `item`
    pub fn connected_input_count(&self, item: ItemId) -> usize {
        self.graph.links.keys().filter(|oc| oc.dest_item == item).count()
    }

    /// Highest connected input port of `item`, `-1` when nothing is connected
    pub fn last_connected_input_port(&self, item: ItemId) -> i32 {
        self.graph
            .links
            .keys()
            .filter(|oc| oc.dest_item == item)
            .map(|oc| oc.dest_port)
            .max()
            .unwrap_or(-1)
    }

    fn resolve_source(&self, mut conn: InputConnection) -> Option<InputConnection> {
        let mut visited = HashSet::new();
        loop {
            let item = self.doc.pool.get(conn.source_item)?;
            if item.as_router().is_none() {
                return item.as_node().map(|_| conn);
            }
            if !visited.insert(conn.source_item) {
                tracing::error!("routers feeding {} form a loop", conn.source_item);
                return None;
            }
            conn = self.link_source(conn.source_item, 0)?;
        }
    }

    /// Node output feeding `router`, following chains of routers
    pub fn router_source(&self, router: ItemId) -> Option<InputConnection> {
        self.resolve_source(InputConnection {
            source_item: router,
            source_port: 0,
        })
    }

    /// Node output feeding input `port` of `node`, looking through routers
    pub fn input_of(&self, node: ItemId, port: i32) -> Option<InputConnection> {
        self.resolve_source(self.link_source(node, port)?)
    }

    /// Items `node` depends on besides its inputs; unknown UIDs are skipped
    pub fn extra_dependencies(&self, node: ItemId) -> Vec<ItemId> {
        self.doc.dependencies_of(node)
    }

    /// Absolute position of a pin
    pub fn pin_position(&self, pin: NodePin) -> Option<Vec2> {
        let item = self.get(pin.node)?;
        if item.as_router().is_some() {
            return Some(item.pos);
        }
        let node = item.as_node()?;
        let size = Vec2::new(item.aabb.width(), item.aabb.height());
        let offset = match pin.kind {
            PinKind::In => {
                node.input_pin_offset(size, pin.index, self.connected_input_count(pin.node))
            }
            PinKind::Out => node.output_pin_offset(size, pin.index),
        };
        Some(item.pos + offset)
    }

    /// Direction a link takes at a pin
    pub fn pin_direction(&self, pin: NodePin) -> Option<Vec2> {
        let item = self.get(pin.node)?;
        if let Some(node) = item.as_node() {
            return Some(match pin.kind {
                PinKind::In => node.input_pin_dir(pin.index),
                PinKind::Out => node.output_pin_dir(pin.index),
            });
        }
        item.as_router().map(|_| match pin.kind {
            PinKind::In => Vec2::new(0.0, -1.0),
            PinKind::Out => Vec2::new(0.0, 1.0),
        })
    }

    /// Display color of a pin: the type's hint for typed pins, else the item color
    pub fn pin_color(&self, pin: NodePin) -> Option<Color> {
        let item = self.get(pin.node)?;
        if let Some(router) = item.as_router() {
            return Some(router.color);
        }
        let node = item.as_node()?;
        let hint = item.as_typed_node().and_then(|typed| match pin.kind {
            PinKind::In => typed.input_pin_color(pin.index, &self.doc.types),
            PinKind::Out => typed.output_pin_color(pin.index, &self.doc.types),
        });
        Some(hint.unwrap_or(node.color))
    }

    /// Whether output `source_port` of `source` may feed input `dest_port` of `dest`.
    ///
    /// Routers on the source side are resolved to the feeding node; a source
    /// that resolves to nothing is accepted. A router destination accepts
    /// only if every node it eventually feeds accepts. The error names the
    /// first pin that refused.
    pub fn check_link_is_allowed(
        &self,
        source: ItemId,
        source_port: i32,
        dest: ItemId,
        dest_port: i32,
    ) -> Result<(), NodePin> {
        let pool = &self.doc.pool;
        let types = &self.doc.types;
        let src_item = pool.get(source).ok_or(NodePin::output(source, source_port))?;
        let (src_item, src_port) = if src_item.as_router().is_some() {
            let Some(conn) = self.router_source(source) else {
                return Ok(());
            };
            match pool.get(conn.source_item) {
                Some(node) => (node, conn.source_port),
                None => return Ok(()),
            }
        } else {
            (src_item, source_port)
        };

        let dst_item = pool.get(dest).ok_or(NodePin::input(dest, dest_port))?;
        if dst_item.as_router().is_none() {
            return if dst_item.accept_input(dest_port, src_item, src_port, types) {
                Ok(())
            } else {
                Err(NodePin::input(dest, dest_port))
            };
        }

        let mut pending = vec![dest];
        let mut visited = HashSet::new();
        while let Some(router) = pending.pop() {
            if !visited.insert(router) {
                continue;
            }
            for oc in self.link_destinations(router, 0) {
                let Some(item) = pool.get(oc.dest_item) else {
                    continue;
                };
                if item.as_router().is_some() {
                    pending.push(oc.dest_item);
                } else if !item.accept_input(oc.dest_port, src_item, src_port, types) {
                    return Err(NodePin::input(oc.dest_item, oc.dest_port));
                }
            }
        }
        Ok(())
    }

    pub(crate) fn route_link(&self, input: InputConnection, output: OutputConnection) -> Option<Vec<Vec2>> {
        let src = self.get(input.source_item)?;
        let dst = self.get(output.dest_item)?;
        let src_pin = NodePin::output(input.source_item, input.source_port);
        let dst_pin = NodePin::input(output.dest_item, output.dest_port);
        Some(routing::route_link(
            self.pin_position(src_pin)?,
            self.pin_position(dst_pin)?,
            self.pin_direction(src_pin)?,
            self.pin_direction(dst_pin)?,
            src.bounds(),
            dst.bounds(),
        ))
    }
}

/// Write access to a graph of a document.
///
/// Holds the document exclusively, so the graph cannot be disposed while the
/// handle lives. Crate-internal handles are checked before items are added.
pub struct GraphMut<'a> {
    pub(crate) doc: &'a mut Document,
    pub(crate) id: GraphId,
}

impl<'a> GraphMut<'a> {
    /// Graph handle
    pub fn id(&self) -> GraphId {
        self.id
    }

    /// Read view of the same graph
    pub fn view(&self) -> GraphRef<'_> {
        GraphRef {
            doc: &*self.doc,
            id: self.id,
            graph: self.graph(),
        }
    }

    fn graph(&self) -> &Graph {
        &self.doc.graphs[&self.id]
    }

    fn graph_mut(&mut self) -> &mut Graph {
        &mut self.doc.graphs[&self.id]
    }

    fn ensure_alive(&self) -> Result<(), GraphError> {
        if self.doc.graphs.contains_key(&self.id) {
            Ok(())
        } else {
            tracing::error!("graph {} no longer exists", self.id);
            Err(GraphError::GraphNotFound(self.id))
        }
    }

    fn ensure_writable(&self) -> Result<(), GraphError> {
        self.ensure_alive()?;
        if self.doc.is_graph_readonly(self.id) {
            tracing::info!("graph {} is read-only, edit ignored", self.id);
            return Err(GraphError::ReadOnly(self.id));
        }
        Ok(())
    }

    pub(crate) fn is_unbounded(&self, id: ItemId) -> bool {
        self.doc
            .pool
            .get(id)
            .and_then(GraphItem::as_node)
            .is_some_and(|node| node.is_unbounded())
    }

    fn member(&self, id: ItemId) -> Result<(), GraphError> {
        if self.graph().items.contains(&id) && self.doc.pool.contains(id) {
            Ok(())
        } else {
            Err(GraphError::ItemNotFound(id))
        }
    }

    /// Mark the graph read-only or writable
    pub fn set_readonly(&mut self, readonly: bool) {
        if let Some(graph) = self.doc.graphs.get_mut(&self.id) {
            graph.readonly = readonly;
        }
    }

    /// Add a detached item and return its handle
    pub fn add(&mut self, mut item: GraphItem) -> Result<ItemId, GraphError> {
        self.ensure_writable()?;
        if !item.id.is_none() {
            tracing::error!("item {} was already added to a graph", item.id);
            return Err(GraphError::AlreadyAdded(item.id));
        }
        item.parent = Some(self.id);
        let id = self.insert_item(item)?;
        self.doc.notify_graph_modified(self.id);
        Ok(id)
    }

    pub(crate) fn insert_item(&mut self, mut item: GraphItem) -> Result<ItemId, GraphError> {
        self.ensure_alive()?;
        item.parent = Some(self.id);
        let spawns = item.as_node().is_some_and(|node| node.spawns_subgraph);
        let id = self.doc.pool.add(item)?;
        self.graph_mut().items.insert(id);
        if spawns {
            self.doc.attach_subgraph(self.id, id, None);
        }
        Ok(id)
    }

    /// Create a node of `type_name` through the document's node factory
    pub fn create_node(&mut self, type_name: &str) -> Result<ItemId, GraphError> {
        self.ensure_writable()?;
        let item = self
            .doc
            .node_factory
            .create_node(self.id, type_name)
            .ok_or_else(|| GraphError::UnknownFactory(type_name.to_owned()))?;
        self.add(item)
    }

    /// Create a non-node item through the document's item factory
    pub fn create_item(&mut self, factory: &str) -> Result<ItemId, GraphError> {
        self.ensure_writable()?;
        let item = self
            .doc
            .item_factory
            .make(self.id, factory)
            .ok_or_else(|| GraphError::UnknownFactory(factory.to_owned()))?;
        self.add(item)
    }

    /// Remove members, together with every link touching them.
    ///
    /// Unbounded nodes that lose an input are regulated afterwards. Handles
    /// that are not members are ignored.
    pub fn remove(&mut self, items: &[ItemId]) -> Result<(), GraphError> {
        self.ensure_writable()?;
        let doomed: HashSet<ItemId> = items
            .iter()
            .copied()
            .filter(|id| self.graph().items.contains(id))
            .collect();
        if doomed.is_empty() {
            return Ok(());
        }

        let graph = self.graph();
        let cut: Vec<OutputConnection> = graph
            .links
            .iter()
            .filter(|(oc, ic)| {
                doomed.contains(&oc.dest_item)
                    || doomed.contains(&ic.source_item)
                    || graph.link_ids.get(*oc).is_some_and(|link| doomed.contains(link))
            })
            .map(|(oc, _)| *oc)
            .collect();

        let mut touched = IndexSet::new();
        for oc in cut {
            if !doomed.contains(&oc.dest_item) {
                touched.insert(oc.dest_item);
            }
            self.drop_link(oc);
        }
        for id in &doomed {
            if self.graph_mut().items.shift_remove(id) {
                self.doc.dispose_item(*id);
            }
        }

        let groups: Vec<ItemId> = self
            .graph()
            .items
            .iter()
            .copied()
            .filter(|id| self.doc.pool.get(*id).is_some_and(|item| item.as_group_box().is_some()))
            .collect();
        for group_id in groups {
            if let Some(group) = self.doc.pool.get_mut(group_id).and_then(GraphItem::as_group_box_mut) {
                for id in &doomed {
                    group.erase_item(*id);
                }
            }
        }

        let touched: Vec<ItemId> = touched.into_iter().collect();
        for &node in &touched {
            if self.is_unbounded(node) {
                self.regulate_variable_input(node);
            }
        }
        self.update_link_paths(&touched);
        tracing::debug!("removed {} items from {}", doomed.len(), self.id);
        self.doc.notify_graph_modified(self.id);
        Ok(())
    }

    /// Remove every member
    pub fn clear(&mut self) -> Result<(), GraphError> {
        self.ensure_writable()?;
        self.clear_unchecked();
        self.doc.notify_graph_modified(self.id);
        Ok(())
    }

    pub(crate) fn clear_unchecked(&mut self) {
        let graph = self.graph_mut();
        graph.links.clear();
        graph.link_ids.clear();
        let items: Vec<ItemId> = graph.items.drain(..).collect();
        for id in items {
            self.doc.dispose_item(id);
        }
    }

    /// Move members by `delta`; returns whether anything moved
    pub fn move_items(&mut self, items: &[ItemId], delta: Vec2) -> Result<bool, GraphError> {
        self.ensure_writable()?;
        let mut moved = Vec::new();
        for &id in items {
            if !self.graph().items.contains(&id) {
                continue;
            }
            if let Some(item) = self.doc.pool.get_mut(id) {
                let target = item.pos + delta;
                if item.move_to(target) {
                    moved.push(id);
                }
            }
        }
        if moved.is_empty() {
            return Ok(false);
        }
        self.update_link_paths(&moved);
        self.doc.notify_graph_modified(self.id);
        Ok(true)
    }

    /// Reroute every link entering or leaving `items`
    pub fn update_link_paths(&mut self, items: &[ItemId]) {
        let links: IndexSet<ItemId> = {
            let view = self.view();
            items.iter().flat_map(|id| view.links_on_node(*id)).collect()
        };
        for link in links {
            self.update_link_path(link);
        }
    }

    pub(crate) fn update_all_link_paths(&mut self) {
        let links: Vec<ItemId> = self.graph().link_ids.values().copied().collect();
        for link in links {
            self.update_link_path(link);
        }
    }

    fn update_link_path(&mut self, link_id: ItemId) {
        let Some((input, output)) = self
            .doc
            .pool
            .get(link_id)
            .and_then(GraphItem::as_link)
            .map(|link| (link.input, link.output))
        else {
            return;
        };
        let path = self.view().route_link(input, output).unwrap_or_default();
        if let Some(item) = self.doc.pool.get_mut(link_id) {
            item.pos = Vec2::ZERO;
            item.aabb = routing::path_bounds(&path);
            if let Some(link) = item.as_link_mut() {
                link.path = path;
            }
        }
    }

    pub(crate) fn drop_link(&mut self, oc: OutputConnection) -> Option<InputConnection> {
        let id = self.id;
        let doc = &mut *self.doc;
        let graph = doc.graphs.get_mut(&id)?;
        let input = graph.links.shift_remove(&oc)?;
        if let Some(link_id) = graph.link_ids.shift_remove(&oc) {
            graph.items.shift_remove(&link_id);
            doc.pool.release(link_id);
        }
        Some(input)
    }

    pub(crate) fn insert_link(
        &mut self,
        input: InputConnection,
        output: OutputConnection,
    ) -> Result<ItemId, PoolError> {
        let mut item = GraphItem::new(ItemKind::Link(Link::new(input, output)));
        item.parent = Some(self.id);
        let link_id = self.doc.pool.add(item)?;
        let graph = self.graph_mut();
        graph.items.insert(link_id);
        graph.links.insert(output, input);
        graph.link_ids.insert(output, link_id);
        Ok(link_id)
    }

    /// Connect output `source_port` of `source` to input `dest_port` of `dest`.
    ///
    /// A negative `dest_port` appends to an unbounded node. An existing link
    /// on the destination pin is replaced. Returns the new link item.
    pub fn set_link(
        &mut self,
        source: ItemId,
        source_port: i32,
        dest: ItemId,
        dest_port: i32,
    ) -> Result<ItemId, LinkError> {
        tracing::trace!("set link {source}[{source_port}] -> {dest}[{dest_port}]");
        if !self.doc.graphs.contains_key(&self.id) {
            return Err(LinkError::GraphNotFound(self.id));
        }
        if self.doc.is_graph_readonly(self.id) {
            tracing::info!("graph {} is read-only, link ignored", self.id);
            return Err(LinkError::ReadOnly(self.id));
        }

        let view = self.view();
        let src_item = view.doc.pool.get(source).ok_or(LinkError::BadEndpoint(source))?;
        let dst_item = view.doc.pool.get(dest).ok_or(LinkError::BadEndpoint(dest))?;
        for id in [source, dest] {
            if !view.graph.items.contains(&id) {
                return Err(LinkError::NotInGraph(id, self.id));
            }
        }

        let source_ok = match (src_item.as_router(), src_item.as_node()) {
            (Some(_), _) => source_port == 0,
            (None, Some(node)) => node.has_output(source_port),
            (None, None) => return Err(LinkError::BadEndpoint(source)),
        };
        if !source_ok {
            return Err(LinkError::PortOutOfRange {
                item: source,
                port: source_port,
            });
        }

        let out_of_range = LinkError::PortOutOfRange {
            item: dest,
            port: dest_port,
        };
        let dest_port = match (dst_item.as_router(), dst_item.as_node()) {
            (Some(_), _) if dest_port == 0 => 0,
            (Some(_), _) => return Err(out_of_range),
            (None, Some(node)) if node.is_unbounded() => {
                let next = view.last_connected_input_port(dest) + 1;
                if dest_port < 0 {
                    next
                } else {
                    dest_port.min(next)
                }
            }
            (None, Some(_)) if dest_port < 0 => return Err(LinkError::CannotAppend(dest)),
            (None, Some(node)) if node.has_input(dest_port) => dest_port,
            (None, Some(_)) => return Err(out_of_range),
            (None, None) => return Err(LinkError::BadEndpoint(dest)),
        };

        view.check_link_is_allowed(source, source_port, dest, dest_port)
            .map_err(|pin| {
                tracing::info!("link {source}[{source_port}] -> {dest}[{dest_port}] rejected at {pin}");
                LinkError::Rejected(pin)
            })?;
        if let Some(path) = self.doc.upstream_path(source, dest) {
            tracing::info!("link {source} -> {dest} would close a loop");
            return Err(LinkError::WouldLoop(path));
        }

        let input = InputConnection {
            source_item: source,
            source_port,
        };
        let output = OutputConnection {
            dest_item: dest,
            dest_port,
        };
        if let Some(old) = self.drop_link(output) {
            tracing::trace!("replaced link from {}[{}]", old.source_item, old.source_port);
        }
        let link_id = self.insert_link(input, output)?;
        self.propagate_router_color(source, source_port, dest);
        self.update_link_paths(&[dest]);
        self.doc.notify_graph_modified(self.id);
        Ok(link_id)
    }

    fn propagate_router_color(&mut self, source: ItemId, source_port: i32, dest: ItemId) {
        let (color, link_color) = {
            let view = self.view();
            let Some(src) = view.get(source) else {
                return;
            };
            let link_color = match src.as_router() {
                Some(router) => router.link_color,
                None => view.pin_color(NodePin::output(source, source_port)),
            };
            (src.as_dyeable().map(|d| d.color()), link_color)
        };
        if let Some(router) = self.doc.pool.get_mut(dest).and_then(GraphItem::as_router_mut) {
            if let Some(color) = color {
                router.color = color;
            }
            router.link_color = link_color;
        }
    }

    /// Remove the link feeding input `port` of `dest`; returns whether one existed
    pub fn remove_link(&mut self, dest: ItemId, port: i32) -> Result<bool, GraphError> {
        tracing::trace!("remove link -> {dest}[{port}]");
        self.ensure_writable()?;
        let output = OutputConnection {
            dest_item: dest,
            dest_port: port,
        };
        if self.drop_link(output).is_none() {
            return Ok(false);
        }
        if self.is_unbounded(dest) {
            self.regulate_variable_input(dest);
        }
        self.update_link_paths(&[dest]);
        self.doc.notify_graph_modified(self.id);
        Ok(true)
    }

    /// Renumber the connected inputs of `node` to `0..n`, keeping their order
    pub(crate) fn regulate_variable_input(&mut self, node: ItemId) {
        let connected: BTreeMap<i32, OutputConnection> = self
            .graph()
            .links
            .keys()
            .filter(|oc| oc.dest_item == node)
            .map(|oc| (oc.dest_port, *oc))
            .collect();
        for (next, oc) in connected.into_values().enumerate() {
            let next = next as i32;
            if oc.dest_port == next {
                continue;
            }
            let Some(input) = self.drop_link(oc) else {
                continue;
            };
            let output = OutputConnection {
                dest_item: node,
                dest_port: next,
            };
            match self.insert_link(input, output) {
                Ok(_) => tracing::trace!("moved input {}[{}] to port {next}", node, oc.dest_port),
                Err(e) => tracing::error!("failed to relink input of {node}: {e}"),
            }
        }
    }

    /// Resize a group or comment to absolute `bounds`; groups rescan their contents
    pub fn set_item_bounds(&mut self, id: ItemId, bounds: Aabb) -> Result<bool, GraphError> {
        self.ensure_writable()?;
        self.member(id)?;
        let resized = self
            .doc
            .pool
            .get_mut(id)
            .is_some_and(|item| item.set_bounds(bounds));
        if !resized {
            return Ok(false);
        }
        self.rescan_group(id);
        self.doc.notify_graph_modified(self.id);
        Ok(true)
    }

    /// Refresh the contained set of group box `id` from the current bounds
    pub fn rescan_group(&mut self, id: ItemId) -> bool {
        let (bounds, candidates) = {
            let view = self.view();
            let Some(item) = view.get(id).filter(|item| item.as_group_box().is_some()) else {
                return false;
            };
            let candidates: Vec<(ItemId, Aabb)> = view
                .items()
                .filter_map(|other| view.get(other))
                .filter(|other| other.as_link().is_none())
                .map(|other| (other.id, other.bounds()))
                .collect();
            (item.bounds(), candidates)
        };
        match self.doc.pool.get_mut(id).and_then(GraphItem::as_group_box_mut) {
            Some(group) => {
                group.rescan(id, bounds, candidates.iter().map(|(other, aabb)| (*other, aabb)));
                true
            }
            None => false,
        }
    }

    /// Change the color of a colorable member
    pub fn set_color(&mut self, id: ItemId, color: Color) -> Result<bool, GraphError> {
        self.ensure_writable()?;
        self.member(id)?;
        let Some(dyeable) = self.doc.pool.get_mut(id).and_then(GraphItem::as_dyeable_mut) else {
            return Ok(false);
        };
        dyeable.set_color(color);
        self.doc.notify_graph_modified(self.id);
        Ok(true)
    }

    /// Rename a node; returns the name it ended up with, `None` if refused
    pub fn rename_node(&mut self, id: ItemId, name: &str) -> Result<Option<String>, GraphError> {
        self.ensure_writable()?;
        self.member(id)?;
        let renamed = self
            .doc
            .pool
            .get_mut(id)
            .and_then(GraphItem::as_node_mut)
            .and_then(|node| node.rename(name).map(str::to_owned));
        if renamed.is_some() {
            self.doc.notify_graph_modified(self.id);
        }
        Ok(renamed)
    }

    /// Give a node a centered `width` x `height` box.
    ///
    /// Unbounded nodes grow to fit `var_pin_width` per connected input plus
    /// `var_margin`, and their incoming links are rerouted.
    pub fn resize_node(
        &mut self,
        id: ItemId,
        width: f32,
        height: f32,
        var_pin_width: f32,
        var_margin: f32,
    ) -> Result<bool, GraphError> {
        self.ensure_writable()?;
        self.member(id)?;
        let unbounded = self.is_unbounded(id);
        let connected = self.view().connected_input_count(id);
        let Some(item) = self.doc.pool.get_mut(id).filter(|item| item.as_node().is_some()) else {
            return Ok(false);
        };
        let mut width = width;
        if unbounded && var_pin_width > 0.0 && var_margin > 0.0 {
            width = width.max(connected as f32 * var_pin_width + var_margin);
        }
        item.aabb = Aabb::centered(width / 2.0, height / 2.0);
        self.update_link_paths(&[id]);
        self.doc.notify_graph_modified(self.id);
        Ok(true)
    }

    /// Set the extra dependencies of a node; they are stored by UID
    pub fn set_extra_dependencies(&mut self, node: ItemId, deps: &[ItemId]) -> Result<bool, GraphError> {
        self.ensure_writable()?;
        self.member(node)?;
        let uids = deps
            .iter()
            .map(|dep| {
                self.doc
                    .pool
                    .get(*dep)
                    .map(GraphItem::uid)
                    .ok_or(GraphError::ItemNotFound(*dep))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let Some(target) = self.doc.pool.get_mut(node).and_then(GraphItem::as_node_mut) else {
            return Ok(false);
        };
        target.extra_dependencies = uids;
        self.doc.notify_graph_modified(self.id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::demo_document;

    #[test]
    fn test_add_and_remove_invalidates_handle() {
        let mut doc = demo_document();
        let mut graph = doc.root_graph_mut();
        let a = graph.create_node("null").unwrap();
        assert!(graph.view().contains(a));
        graph.remove(&[a]).unwrap();
        assert!(!graph.view().contains(a));
        let b = graph.create_node("null").unwrap();
        assert_ne!(a, b);
        assert!(doc.item(a).is_none());
        assert!(doc.item(b).is_some());
    }

    #[test]
    fn test_add_rejects_live_item() {
        let mut doc = demo_document();
        let mut graph = doc.root_graph_mut();
        let a = graph.create_node("null").unwrap();
        let clone = graph.view().get(a).unwrap().clone();
        assert!(matches!(graph.add(clone), Err(GraphError::AlreadyAdded(id)) if id == a));
    }

    #[test]
    fn test_set_link_replaces_existing() {
        let mut doc = demo_document();
        let mut graph = doc.root_graph_mut();
        let a = graph.create_node("in").unwrap();
        let b = graph.create_node("in").unwrap();
        let c = graph.create_node("exec").unwrap();
        let first = graph.set_link(a, 0, c, 1).unwrap();
        let second = graph.set_link(b, 0, c, 1).unwrap();
        let view = graph.view();
        assert_eq!(view.link_count(), 1);
        assert_eq!(view.link_source(c, 1).unwrap().source_item, b);
        assert!(!view.contains(first));
        assert_eq!(view.get_link(c, 1), Some(second));
    }

    #[test]
    fn test_set_link_port_checks() {
        let mut doc = demo_document();
        let mut graph = doc.root_graph_mut();
        let a = graph.create_node("in").unwrap();
        let c = graph.create_node("exec").unwrap();
        assert!(matches!(graph.set_link(a, 0, c, 4), Err(LinkError::PortOutOfRange { .. })));
        assert!(matches!(graph.set_link(a, 1, c, 0), Err(LinkError::PortOutOfRange { .. })));
        assert!(matches!(graph.set_link(a, 0, c, -1), Err(LinkError::CannotAppend(_))));
        assert_eq!(graph.view().link_count(), 0);
    }

    #[test]
    fn test_unbounded_append_and_regulation() {
        let mut doc = demo_document();
        let mut graph = doc.root_graph_mut();
        let sources: Vec<ItemId> = (0..3).map(|_| graph.create_node("in").unwrap()).collect();
        let merge = graph.create_node("merge").unwrap();
        for &src in &sources {
            graph.set_link(src, 0, merge, -1).unwrap();
        }
        assert_eq!(graph.view().last_connected_input_port(merge), 2);

        assert!(graph.remove_link(merge, 1).unwrap());
        let view = graph.view();
        assert_eq!(view.connected_input_count(merge), 2);
        assert_eq!(view.link_source(merge, 0).unwrap().source_item, sources[0]);
        assert_eq!(view.link_source(merge, 1).unwrap().source_item, sources[2]);
        assert!(view.link_source(merge, 2).is_none());
        assert_eq!(view.link_count(), view.items().filter(|id| view.get(*id).unwrap().as_link().is_some()).count());
    }

    #[test]
    fn test_remove_cascades_links_and_regulates() {
        let mut doc = demo_document();
        let mut graph = doc.root_graph_mut();
        let sources: Vec<ItemId> = (0..3).map(|_| graph.create_node("in").unwrap()).collect();
        let merge = graph.create_node("merge").unwrap();
        for &src in &sources {
            graph.set_link(src, 0, merge, -1).unwrap();
        }
        graph.remove(&[sources[0]]).unwrap();
        let view = graph.view();
        assert_eq!(view.link_count(), 2);
        assert_eq!(view.link_source(merge, 0).unwrap().source_item, sources[1]);
        assert_eq!(view.link_source(merge, 1).unwrap().source_item, sources[2]);
        assert_eq!(view.len(), 5);
    }

    #[test]
    fn test_loop_is_rejected() {
        let mut doc = demo_document();
        let mut graph = doc.root_graph_mut();
        let a = graph.create_node("null").unwrap();
        let b = graph.create_node("null").unwrap();
        graph.set_link(a, 0, b, 0).unwrap();
        match graph.set_link(b, 0, a, 0) {
            Err(LinkError::WouldLoop(path)) => {
                assert!(path.contains(&a) && path.contains(&b));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(graph.set_link(a, 0, a, 0), Err(LinkError::WouldLoop(_))));
        assert_eq!(graph.view().link_count(), 1);
    }

    #[test]
    fn test_typed_link_rejection() {
        let mut doc = demo_document();
        let mut graph = doc.root_graph_mut();
        let float = graph.create_node("sumfloat").unwrap();
        let int = graph.create_node("sumint").unwrap();
        let sink = graph.create_node("sumint").unwrap();
        match graph.set_link(float, 0, sink, 0) {
            Err(LinkError::Rejected(pin)) => assert_eq!(pin, NodePin::input(sink, 0)),
            other => panic!("unexpected {other:?}"),
        }
        graph.set_link(int, 0, sink, 0).unwrap();
        let accepting = graph.create_node("sumfloat").unwrap();
        graph.set_link(int, 0, accepting, 1).unwrap();
    }

    #[test]
    fn test_router_checks_downstream_nodes() {
        let mut doc = demo_document();
        let mut graph = doc.root_graph_mut();
        let float = graph.create_node("sumfloat").unwrap();
        let int = graph.create_node("sumint").unwrap();
        let sink = graph.create_node("sumint").unwrap();
        let router = graph.create_item("router").unwrap();
        graph.set_link(router, 0, sink, 0).unwrap();
        assert!(matches!(graph.set_link(float, 0, router, 0), Err(LinkError::Rejected(_))));
        graph.set_link(int, 0, router, 0).unwrap();

        let view = graph.view();
        assert_eq!(view.input_of(sink, 0).unwrap().source_item, int);
        assert_eq!(view.router_source(router).unwrap().source_item, int);
        let router_item = view.get(router).unwrap().as_router().unwrap();
        assert_eq!(router_item.color, view.get(int).unwrap().as_node().unwrap().color);
        assert!(router_item.link_color.is_some());
    }

    #[test]
    fn test_readonly_graph_rejects_edits() {
        let mut doc = demo_document();
        let mut graph = doc.root_graph_mut();
        let a = graph.create_node("in").unwrap();
        let b = graph.create_node("null").unwrap();
        graph.set_readonly(true);
        assert!(matches!(graph.create_node("null"), Err(GraphError::ReadOnly(_))));
        assert!(matches!(graph.set_link(a, 0, b, 0), Err(LinkError::ReadOnly(_))));
        assert!(graph.remove(&[a]).is_err());
        assert!(graph.view().contains(a));
    }

    #[test]
    fn test_move_items_reroutes_links() {
        let mut doc = demo_document();
        let mut graph = doc.root_graph_mut();
        let a = graph.create_node("in").unwrap();
        let b = graph.create_node("null").unwrap();
        graph.move_items(&[b], Vec2::new(0.0, 200.0)).unwrap();
        let link = graph.set_link(a, 0, b, 0).unwrap();
        let before = graph.view().get(link).unwrap().as_link().unwrap().path.clone();
        assert!(!before.is_empty());
        assert!(graph.move_items(&[a, link], Vec2::new(30.0, 0.0)).unwrap());
        let after = graph.view().get(link).unwrap().as_link().unwrap().path.clone();
        assert_ne!(before, after);
        assert!(!graph.move_items(&[link], Vec2::new(1.0, 1.0)).unwrap());
    }

    #[test]
    fn test_group_rescan_on_resize() {
        let mut doc = demo_document();
        let mut graph = doc.root_graph_mut();
        let inside = graph.create_node("null").unwrap();
        let outside = graph.create_node("null").unwrap();
        graph.move_items(&[outside], Vec2::new(1000.0, 0.0)).unwrap();
        let group = graph.create_item("group").unwrap();
        let bounds = Aabb::new(Vec2::new(-200.0, -200.0), Vec2::new(200.0, 200.0));
        assert!(graph.set_item_bounds(group, bounds).unwrap());
        let contains = graph.view().get(group).unwrap().as_group_box().unwrap().containing_items().clone();
        assert!(contains.contains(&inside));
        assert!(!contains.contains(&outside));

        graph.remove(&[inside]).unwrap();
        let group_box = graph.view().get(group).unwrap().as_group_box().unwrap();
        assert!(group_box.containing_items().is_empty());
    }

    #[test]
    fn test_subgraph_is_disposed_with_owner() {
        let mut doc = demo_document();
        let node = doc.root_graph_mut().create_node("subgraph").unwrap();
        let sub = doc.item(node).unwrap().as_node().unwrap().subgraph.unwrap();
        let inner = doc.graph_mut(sub).unwrap().create_node("null").unwrap();
        assert_eq!(doc.graph(sub).unwrap().owner(), Some(node));
        doc.root_graph_mut().remove(&[node]).unwrap();
        assert!(doc.graph(sub).is_none());
        assert!(doc.item(inner).is_none());
    }

    #[test]
    fn test_edits_of_disposed_graph_fail() {
        let mut doc = demo_document();
        let owner = doc.root_graph_mut().create_node("subgraph").unwrap();
        let sub = doc.item(owner).unwrap().as_node().unwrap().subgraph.unwrap();
        let inner = doc.graph_mut(sub).unwrap().create_node("null").unwrap();
        doc.root_graph_mut().remove(&[owner]).unwrap();
        assert!(doc.graph_mut(sub).is_none());

        let count = doc.item_count();
        let mut stale = doc.graph_edit(sub);
        assert!(matches!(stale.create_node("null"), Err(GraphError::GraphNotFound(_))));
        assert!(matches!(stale.remove_link(inner, 0), Err(GraphError::GraphNotFound(_))));
        assert!(matches!(stale.set_link(inner, 0, inner, 0), Err(LinkError::GraphNotFound(_))));
        let item = stale.doc.node_factory.create_node(sub, "null").unwrap();
        assert!(matches!(stale.insert_item(item), Err(GraphError::GraphNotFound(_))));
        assert_eq!(doc.item_count(), count);
    }

    #[test]
    fn test_resize_unbounded_node_fits_inputs() {
        let mut doc = demo_document();
        let mut graph = doc.root_graph_mut();
        let merge = graph.create_node("merge").unwrap();
        for _ in 0..10 {
            let src = graph.create_node("in").unwrap();
            graph.set_link(src, 0, merge, -1).unwrap();
        }
        graph.resize_node(merge, 20.0, 20.0, 15.0, 8.0).unwrap();
        assert_eq!(graph.view().get(merge).unwrap().local_bounds().width(), 158.0);
    }
}
