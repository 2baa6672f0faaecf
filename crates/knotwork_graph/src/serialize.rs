// SPDX-License-Identifier: MIT OR Apache-2.0
//! JSON representation of graphs, loading into live graphs, and copy/paste.
//!
//! A graph is written as its non-link items followed by its links. Items carry
//! the raw value of their handle as `id`; links refer to those values, so a
//! record is self-contained. Nodes owning a sub-graph embed it under `graph`.
//!
//! Loading is two-phase: the whole record is validated and every item is built
//! detached first, and only then is the live graph touched. A failed load
//! leaves the document as it was.

use crate::document::Document;
use crate::error::{DocumentError, SerializeError};
use crate::fields;
use crate::geometry::Vec2;
use crate::graph::GraphRef;
use crate::id::{GraphId, InputConnection, ItemId, OutputConnection, Uid};
use crate::item::GraphItem;
use crate::link::{LinkEnd, LinkRecord};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// One graph: items, then links between them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphRecord {
    /// Non-link items
    #[serde(default)]
    pub items: Vec<ItemRecord>,
    /// Links between items of this record
    #[serde(default)]
    pub links: Vec<LinkRecord>,
}

/// One item: record-local id, factory name and variant fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    /// Handle value at the time of writing; only meaningful inside the record
    pub id: u64,
    /// Factory name; empty or `"node"` selects the node factory
    #[serde(default)]
    pub f: String,
    /// Everything else
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

/// Top level of a document file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentFile {
    /// The root graph
    pub root: GraphRecord,
}

/// How a record is applied to a graph that already has content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Items whose UID is already in the graph are updated and keep their
    /// handle; other items are created with the UID from the record
    InPlace,
    /// Everything is recreated with fresh UIDs
    Replace,
}

/// Outcome of [`Document::paste`]
#[derive(Debug, Clone, Default)]
pub struct PasteReport {
    /// Items created
    pub items: Vec<ItemId>,
    /// Links created
    pub links: Vec<ItemId>,
    /// Record ids of items that could not be created, with the reason
    pub skipped_items: Vec<(u64, String)>,
    /// Links that could not be created, with the reason
    pub skipped_links: Vec<(LinkRecord, String)>,
}

impl PasteReport {
    /// Whether everything in the clipboard made it in
    pub fn is_complete(&self) -> bool {
        self.skipped_items.is_empty() && self.skipped_links.is_empty()
    }
}

impl<'a> GraphRef<'a> {
    /// Record of the whole graph
    pub fn serialize(&self) -> GraphRecord {
        self.serialize_subset(None)
    }

    /// Record of the members in `filter`, or all members.
    ///
    /// Links are kept only when both ends are written.
    pub fn serialize_subset(&self, filter: Option<&HashSet<ItemId>>) -> GraphRecord {
        let doc = self.doc;
        let wanted = |id: &ItemId| filter.map_or(true, |set| set.contains(id));
        let mut record = GraphRecord::default();

        for id in self.items().filter(|id| wanted(id)) {
            let Some(item) = doc.pool.get(id) else {
                continue;
            };
            if item.as_link().is_some() {
                continue;
            }
            let mut fields = item.write_fields();
            let nested = item
                .as_node()
                .and_then(|node| node.subgraph)
                .and_then(|g| doc.graph(g));
            if let Some(sub) = nested {
                match serde_json::to_value(sub.serialize()) {
                    Ok(value) => {
                        fields.insert("graph".to_owned(), value);
                    }
                    Err(e) => tracing::error!("failed to write sub-graph of {id}: {e}"),
                }
            }
            let f = doc
                .item_factory
                .factory_name(item)
                .unwrap_or_else(|| item.factory.clone());
            record.items.push(ItemRecord {
                id: id.value(),
                f,
                fields,
            });
        }

        for (oc, ic) in self.links() {
            if !wanted(&oc.dest_item) || !wanted(&ic.source_item) {
                continue;
            }
            record.links.push(LinkRecord {
                from: LinkEnd {
                    id: ic.source_item.value(),
                    port: ic.source_port,
                },
                to: LinkEnd {
                    id: oc.dest_item.value(),
                    port: oc.dest_port,
                },
            });
        }
        record
    }
}

#[derive(Debug)]
enum Target {
    Existing(ItemId),
    New,
}

#[derive(Debug)]
struct PlannedItem {
    record_id: u64,
    target: Target,
    item: GraphItem,
    remap_group: bool,
    nested: Option<PlannedGraph>,
}

#[derive(Debug, Default)]
struct PlannedGraph {
    items: Vec<PlannedItem>,
    links: Vec<LinkRecord>,
    doomed: Vec<ItemId>,
}

impl PlannedGraph {
    fn collect_doomed(&self, doc: &Document, out: &mut HashSet<ItemId>) {
        for &id in &self.doomed {
            out.extend(doc.subtree(id));
        }
        for planned in &self.items {
            if let Some(nested) = &planned.nested {
                nested.collect_doomed(doc, out);
            }
        }
    }

    fn collect_new_uids(&self, out: &mut Vec<Uid>) {
        for planned in &self.items {
            if matches!(planned.target, Target::New) {
                out.push(planned.item.uid);
            }
            if let Some(nested) = &planned.nested {
                nested.collect_new_uids(out);
            }
        }
    }
}

fn record_uid(record: &ItemRecord) -> Result<Option<Uid>, SerializeError> {
    match fields::opt::<String>(&record.fields, "uid")? {
        Some(s) if !s.is_empty() => fields::parse_uid(&s).map(Some),
        _ => Ok(None),
    }
}

fn nested_record(record: &ItemRecord) -> Result<GraphRecord, SerializeError> {
    match record.fields.get("graph") {
        Some(value) => GraphRecord::deserialize(value).map_err(|e| SerializeError::InvalidField {
            field: "graph",
            reason: e.to_string(),
        }),
        None => Ok(GraphRecord::default()),
    }
}

impl Document {
    /// Build a detached item from a record
    fn instantiate(&self, parent: GraphId, record: &ItemRecord) -> Result<GraphItem, SerializeError> {
        let is_node = record.f.is_empty() || record.f == "node";
        let mut item = if is_node {
            let type_name: String = fields::req(&record.fields, "type")?;
            self.node_factory
                .create_node(parent, &type_name)
                .ok_or(SerializeError::UnknownNodeType(type_name))?
        } else {
            let item = self
                .item_factory
                .make(parent, &record.f)
                .ok_or_else(|| SerializeError::UnknownFactory(record.f.clone()))?;
            if item.as_link().is_some() {
                self.item_factory.discard(parent, item);
                return Err(SerializeError::UnknownFactory(record.f.clone()));
            }
            item
        };
        if let Err(e) = item.read_fields(&record.fields) {
            if is_node {
                self.node_factory.discard(parent, item);
            } else {
                self.item_factory.discard(parent, item);
            }
            return Err(e);
        }
        Ok(item)
    }

    fn plan_graph(
        &self,
        target: Option<GraphId>,
        factory_parent: GraphId,
        record: &GraphRecord,
        mode: ReadMode,
    ) -> Result<PlannedGraph, SerializeError> {
        let live = target.and_then(|g| self.graphs.get(&g));
        let mut existing: HashMap<Uid, ItemId> = HashMap::new();
        if let (Some(graph), ReadMode::InPlace) = (live, mode) {
            for &id in &graph.items {
                if let Some(item) = self.pool.get(id).filter(|item| item.as_link().is_none()) {
                    existing.insert(item.uid, id);
                }
            }
        }

        let mut plan = PlannedGraph::default();
        let mut seen_ids = HashSet::new();
        let mut seen_uids = HashSet::new();
        let mut matched = HashSet::new();

        for entry in &record.items {
            if !seen_ids.insert(entry.id) {
                return Err(SerializeError::InvalidField {
                    field: "id",
                    reason: format!("id {} appears twice", entry.id),
                });
            }
            let uid = record_uid(entry)?;
            if let Some(uid) = uid {
                if !seen_uids.insert(uid) {
                    return Err(SerializeError::DuplicateUid(uid));
                }
            }

            let candidate = uid
                .and_then(|uid| existing.get(&uid).copied())
                .and_then(|id| self.pool.get(id).map(|item| (id, item)))
                .filter(|(_, item)| {
                    let factory_matches = (entry.f.is_empty() && item.as_node().is_some()) || entry.f == item.factory;
                    let type_matches = match item.as_node() {
                        Some(node) => entry.fields.get("type").and_then(Value::as_str) == Some(node.type_name.as_str()),
                        None => true,
                    };
                    factory_matches && type_matches
                });

            let (target, item) = match candidate {
                Some((id, live_item)) => {
                    let mut item = live_item.clone();
                    item.read_fields(&entry.fields)?;
                    matched.insert(id);
                    (Target::Existing(id), item)
                }
                None => {
                    let mut item = self.instantiate(factory_parent, entry)?;
                    if mode == ReadMode::InPlace {
                        if let Some(uid) = item.source_uid {
                            item.uid = uid;
                        }
                    }
                    (Target::New, item)
                }
            };

            let nested = match item.as_node() {
                Some(node) if node.spawns_subgraph => {
                    let sub_record = nested_record(entry)?;
                    let sub_target = match target {
                        Target::Existing(_) => node.subgraph.filter(|g| self.graphs.contains_key(g)),
                        Target::New => None,
                    };
                    let sub_parent = sub_target.unwrap_or(factory_parent);
                    Some(self.plan_graph(sub_target, sub_parent, &sub_record, mode)?)
                }
                _ => None,
            };

            plan.items.push(PlannedItem {
                record_id: entry.id,
                target,
                remap_group: item.as_group_box().is_some() && entry.fields.contains_key("contains"),
                item,
                nested,
            });
        }

        for link in &record.links {
            for end in [link.from, link.to] {
                let planned = plan
                    .items
                    .iter()
                    .find(|p| p.record_id == end.id)
                    .ok_or(SerializeError::UnknownLinkEndpoint(end.id))?;
                if planned.item.as_node().is_none() && planned.item.as_router().is_none() {
                    return Err(SerializeError::InvalidField {
                        field: "links",
                        reason: format!("item {} cannot be linked", end.id),
                    });
                }
            }
        }
        plan.links = record.links.clone();
        self.check_planned_links(&plan)?;

        if let Some(graph) = live {
            plan.doomed = graph
                .items
                .iter()
                .copied()
                .filter(|id| !matched.contains(id))
                .filter(|id| self.pool.get(*id).is_some_and(|item| item.as_link().is_none()))
                .collect();
        }
        Ok(plan)
    }

    /// Reject links that `set_link` would refuse: pins out of range, inputs
    /// that do not accept their source, and loops.
    ///
    /// Only the first link into a pin counts; later ones are dropped on apply.
    fn check_planned_links(&self, plan: &PlannedGraph) -> Result<(), SerializeError> {
        let invalid = |reason: String| SerializeError::InvalidField { field: "links", reason };
        let items: HashMap<u64, &GraphItem> = plan.items.iter().map(|p| (p.record_id, &p.item)).collect();

        let mut feeds: HashMap<(u64, i32), (u64, i32)> = HashMap::new();
        let mut effective = Vec::new();
        for link in &plan.links {
            let (Some(src), Some(dst)) = (items.get(&link.from.id), items.get(&link.to.id)) else {
                continue;
            };
            let source_ok = match src.as_node() {
                Some(node) => node.has_output(link.from.port),
                None => link.from.port == 0,
            };
            if !source_ok {
                return Err(invalid(format!("item {} has no output {}", link.from.id, link.from.port)));
            }
            let dest_ok = match dst.as_node() {
                Some(node) => node.has_input(link.to.port),
                None => link.to.port == 0,
            };
            if !dest_ok {
                return Err(invalid(format!("item {} has no input {}", link.to.id, link.to.port)));
            }
            let pin = (link.to.id, link.to.port);
            if !feeds.contains_key(&pin) {
                feeds.insert(pin, (link.from.id, link.from.port));
                effective.push(link);
            }
        }

        for link in &effective {
            let Some(dst) = items.get(&link.to.id) else {
                continue;
            };
            if dst.as_router().is_some() {
                continue;
            }
            let mut conn = (link.from.id, link.from.port);
            let mut hops = 0;
            let source = loop {
                match items.get(&conn.0) {
                    Some(item) if item.as_router().is_some() => match feeds.get(&(conn.0, 0)) {
                        Some(&next) if hops < items.len() => {
                            conn = next;
                            hops += 1;
                        }
                        _ => break None,
                    },
                    Some(item) => break Some(*item),
                    None => break None,
                }
            };
            if let Some(src) = source {
                if !dst.accept_input(link.to.port, src, conn.1, &self.types) {
                    return Err(invalid(format!(
                        "input {} of item {} does not accept output {} of item {}",
                        link.to.port, link.to.id, conn.1, conn.0
                    )));
                }
            }
        }

        let mut next: HashMap<u64, Vec<u64>> = HashMap::new();
        for link in &effective {
            next.entry(link.from.id).or_default().push(link.to.id);
        }
        // false while on the stack, true once finished
        let mut state: HashMap<u64, bool> = HashMap::new();
        for start in plan.items.iter().map(|p| p.record_id) {
            if state.contains_key(&start) {
                continue;
            }
            state.insert(start, false);
            let mut stack = vec![(start, 0usize)];
            while let Some((id, cursor)) = stack.last_mut() {
                let id = *id;
                let successor = next.get(&id).and_then(|list| list.get(*cursor)).copied();
                *cursor += 1;
                match successor {
                    None => {
                        state.insert(id, true);
                        stack.pop();
                    }
                    Some(succ) => match state.get(&succ) {
                        Some(false) => {
                            return Err(invalid(format!("links through items {succ} and {id} form a loop")));
                        }
                        Some(true) => {}
                        None => {
                            state.insert(succ, false);
                            stack.push((succ, 0));
                        }
                    },
                }
            }
        }
        Ok(())
    }

    fn check_uid_conflicts(&self, plan: &PlannedGraph) -> Result<(), SerializeError> {
        let mut released = HashSet::new();
        plan.collect_doomed(self, &mut released);
        let mut uids = Vec::new();
        plan.collect_new_uids(&mut uids);
        for uid in uids {
            if let Some(existing) = self.pool.find_by_uid(&uid) {
                if !released.contains(&existing) {
                    tracing::error!("uid {uid} is already held by item {existing}");
                    return Err(SerializeError::DuplicateUid(uid));
                }
            }
        }
        Ok(())
    }

    fn apply_graph(
        &mut self,
        gid: GraphId,
        plan: PlannedGraph,
        uid_map: &mut HashMap<Uid, Uid>,
        placed: &mut Vec<ItemId>,
    ) -> HashMap<u64, ItemId> {
        let old_links: Vec<OutputConnection> = self
            .graphs
            .get(&gid)
            .map(|g| g.links.keys().copied().collect())
            .unwrap_or_default();
        for oc in old_links {
            self.graph_edit(gid).drop_link(oc);
        }
        for id in plan.doomed {
            if let Some(graph) = self.graphs.get_mut(&gid) {
                graph.items.shift_remove(&id);
            }
            self.dispose_item(id);
        }

        let mut idmap = HashMap::new();
        let mut groups = Vec::new();
        for planned in plan.items {
            let id = match planned.target {
                Target::Existing(id) => {
                    if let Some(slot) = self.pool.get_mut(id) {
                        *slot = planned.item;
                    }
                    id
                }
                Target::New => match self.graph_edit(gid).insert_item(planned.item) {
                    Ok(id) => id,
                    Err(e) => {
                        tracing::error!("failed to insert item {}: {e}", planned.record_id);
                        continue;
                    }
                },
            };
            if let Some(item) = self.pool.get(id) {
                if let Some(source) = item.source_uid {
                    uid_map.insert(source, item.uid);
                }
            }
            idmap.insert(planned.record_id, id);
            placed.push(id);
            if planned.remap_group {
                groups.push(id);
            }
            if let Some(nested) = planned.nested {
                let sub = self
                    .pool
                    .get(id)
                    .and_then(GraphItem::as_node)
                    .and_then(|node| node.subgraph);
                if let Some(sub) = sub {
                    self.apply_graph(sub, nested, uid_map, placed);
                }
            }
        }

        let mut edit = self.graph_edit(gid);
        for link in &plan.links {
            let (Some(&source), Some(&dest)) = (idmap.get(&link.from.id), idmap.get(&link.to.id)) else {
                continue;
            };
            let output = OutputConnection {
                dest_item: dest,
                dest_port: link.to.port,
            };
            if edit.view().graph.links.contains_key(&output) {
                tracing::warn!("second link into {dest}[{}] ignored", link.to.port);
                continue;
            }
            let input = InputConnection {
                source_item: source,
                source_port: link.from.port,
            };
            if let Err(e) = edit.insert_link(input, output) {
                tracing::error!("failed to restore link into {dest}: {e}");
            }
        }
        let unbounded: Vec<ItemId> = idmap.values().copied().filter(|id| edit.is_unbounded(*id)).collect();
        for node in unbounded {
            edit.regulate_variable_input(node);
        }
        for id in groups {
            if let Some(group) = self.pool.get_mut(id).and_then(GraphItem::as_group_box_mut) {
                group.remap_items(&idmap);
            }
        }
        self.graph_edit(gid).update_all_link_paths();
        idmap
    }

    fn remap_dependencies(&mut self, items: &[ItemId], uid_map: &HashMap<Uid, Uid>) {
        for &id in items {
            if let Some(node) = self.pool.get_mut(id).and_then(GraphItem::as_node_mut) {
                for dep in &mut node.extra_dependencies {
                    if let Some(mapped) = uid_map.get(dep) {
                        *dep = *mapped;
                    }
                }
            }
        }
    }

    /// Make graph `gid` match `record`; returns record id to live handle.
    ///
    /// Nothing changes unless the whole record is valid.
    pub(crate) fn deserialize_graph(
        &mut self,
        gid: GraphId,
        record: &GraphRecord,
        mode: ReadMode,
    ) -> Result<HashMap<u64, ItemId>, SerializeError> {
        let mut uid_map = HashMap::new();
        let mut placed = Vec::new();
        let idmap = self.read_graph(gid, record, mode, &mut uid_map, &mut placed)?;
        if mode == ReadMode::Replace {
            self.remap_dependencies(&placed, &uid_map);
        }
        Ok(idmap)
    }

    /// Validate and apply `record` without remapping dependencies; new UIDs
    /// and placed items are added to `uid_map` and `placed`.
    fn read_graph(
        &mut self,
        gid: GraphId,
        record: &GraphRecord,
        mode: ReadMode,
        uid_map: &mut HashMap<Uid, Uid>,
        placed: &mut Vec<ItemId>,
    ) -> Result<HashMap<u64, ItemId>, SerializeError> {
        if !self.graphs.contains_key(&gid) {
            return Err(SerializeError::GraphNotFound(gid));
        }
        if self.is_graph_readonly(gid) {
            tracing::info!("graph {gid} is read-only, not reading");
            return Err(SerializeError::ReadOnly(gid));
        }
        let plan = self.plan_graph(Some(gid), gid, record, mode)?;
        if mode == ReadMode::InPlace {
            self.check_uid_conflicts(&plan)?;
        }

        let idmap = self.apply_graph(gid, plan, uid_map, placed);
        tracing::debug!(
            "read {} items and {} links into {gid}",
            record.items.len(),
            record.links.len()
        );
        self.notify_graph_modified(gid);
        Ok(idmap)
    }

    /// Clipboard text for `items` of graph `graph`
    pub fn copy(&self, graph: GraphId, items: &[ItemId]) -> Result<String, SerializeError> {
        let view = self.graph(graph).ok_or(SerializeError::GraphNotFound(graph))?;
        let filter: HashSet<ItemId> = items.iter().copied().collect();
        let record = view.serialize_subset(Some(&filter));
        Ok(serde_json::to_string(&record)?)
    }

    /// Paste clipboard text into `graph`, shifted by `offset`, as one undo step.
    ///
    /// Items get fresh UIDs. Items and links that cannot be created are
    /// skipped and listed in the report.
    pub fn paste(&mut self, graph: GraphId, json: &str, offset: Vec2) -> Result<PasteReport, DocumentError> {
        if !self.graphs.contains_key(&graph) {
            return Err(SerializeError::GraphNotFound(graph).into());
        }
        if self.is_graph_readonly(graph) {
            return Err(SerializeError::ReadOnly(graph).into());
        }
        let record: GraphRecord = serde_json::from_str(json).map_err(SerializeError::from)?;
        let mut group = self.edit_group("paste");
        let report = group.paste_record(graph, &record, offset);
        Ok(report)
    }

    fn paste_record(&mut self, gid: GraphId, record: &GraphRecord, offset: Vec2) -> PasteReport {
        let mut report = PasteReport::default();
        let mut idmap: HashMap<u64, ItemId> = HashMap::new();
        let mut uid_map: HashMap<Uid, Uid> = HashMap::new();
        let mut groups = Vec::new();
        let mut nested_items = Vec::new();

        for entry in &record.items {
            let mut item = match self.instantiate(gid, entry) {
                Ok(item) => item,
                Err(e) => {
                    tracing::warn!("paste: skipped item {}: {e}", entry.id);
                    report.skipped_items.push((entry.id, e.to_string()));
                    continue;
                }
            };
            item.pos = item.pos + offset;
            let source_uid = item.source_uid;
            let is_group = item.as_group_box().is_some();
            let id = match self.graph_edit(gid).insert_item(item) {
                Ok(id) => id,
                Err(e) => {
                    report.skipped_items.push((entry.id, e.to_string()));
                    continue;
                }
            };
            if let (Some(source), Some(item)) = (source_uid, self.pool.get(id)) {
                uid_map.insert(source, item.uid);
            }
            idmap.insert(entry.id, id);
            report.items.push(id);
            if is_group {
                groups.push(id);
            }

            let sub = self
                .pool
                .get(id)
                .and_then(GraphItem::as_node)
                .and_then(|node| node.subgraph);
            if let (Some(sub), true) = (sub, entry.fields.contains_key("graph")) {
                let nested = nested_record(entry)
                    .and_then(|r| self.read_graph(sub, &r, ReadMode::Replace, &mut uid_map, &mut nested_items));
                if let Err(e) = nested {
                    tracing::warn!("paste: sub-graph of item {} not restored: {e}", entry.id);
                }
            }
        }

        self.remap_dependencies(&report.items, &uid_map);
        self.remap_dependencies(&nested_items, &uid_map);
        for id in groups {
            if let Some(group) = self.pool.get_mut(id).and_then(GraphItem::as_group_box_mut) {
                group.remap_items(&idmap);
            }
        }

        let mut links = record.links.clone();
        links.sort_by_key(|link| (link.to.id, link.to.port));
        for link in links {
            let (Some(&source), Some(&dest)) = (idmap.get(&link.from.id), idmap.get(&link.to.id)) else {
                report.skipped_links.push((link, "endpoint was not pasted".to_owned()));
                continue;
            };
            match self.graph_edit(gid).set_link(source, link.from.port, dest, link.to.port) {
                Ok(id) => report.links.push(id),
                Err(e) => {
                    tracing::warn!("paste: skipped link into {dest}: {e}");
                    report.skipped_links.push((link, e.to_string()));
                }
            }
        }

        if !report.is_complete() {
            tracing::warn!(
                "paste: {} items and {} links skipped",
                report.skipped_items.len(),
                report.skipped_links.len()
            );
        }
        self.notify_graph_modified(gid);
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::demo_document;

    fn record_of(doc: &Document) -> GraphRecord {
        doc.root_graph().serialize()
    }

    #[test]
    fn test_serialize_writes_items_then_links() {
        let mut doc = demo_document();
        let mut graph = doc.root_graph_mut();
        let a = graph.create_node("in").unwrap();
        let b = graph.create_node("out").unwrap();
        let r = graph.create_item("router").unwrap();
        graph.set_link(a, 0, r, 0).unwrap();
        graph.set_link(r, 0, b, 0).unwrap();

        let record = record_of(&doc);
        assert_eq!(record.items.len(), 3);
        assert_eq!(record.links.len(), 2);
        assert_eq!(record.items[0].f, "node");
        assert_eq!(record.items[2].f, "router");
        assert_eq!(record.items[0].fields["type"], "in");
        let ids: HashSet<u64> = record.items.iter().map(|i| i.id).collect();
        assert!(record.links.iter().all(|l| ids.contains(&l.from.id) && ids.contains(&l.to.id)));
    }

    #[test]
    fn test_subgraph_is_nested() {
        let mut doc = demo_document();
        let owner = doc.root_graph_mut().create_node("subgraph").unwrap();
        let sub = doc.item(owner).unwrap().as_node().unwrap().subgraph.unwrap();
        doc.graph_mut(sub).unwrap().create_node("null").unwrap();

        let record = record_of(&doc);
        let nested = nested_record(&record.items[0]).unwrap();
        assert_eq!(nested.items.len(), 1);
        assert_eq!(nested.items[0].fields["type"], "null");
    }

    #[test]
    fn test_inplace_read_updates_and_keeps_handles() {
        let mut doc = demo_document();
        let mut graph = doc.root_graph_mut();
        let a = graph.create_node("null").unwrap();
        let b = graph.create_node("null").unwrap();
        let mut record = record_of(&doc);

        record.items[0].fields.insert("name".into(), Value::from("renamed"));
        record.items.remove(1);
        let gid = doc.root();
        doc.deserialize_graph(gid, &record, ReadMode::InPlace).unwrap();

        assert_eq!(doc.item(a).unwrap().as_node().unwrap().name, "renamed");
        assert!(doc.item(b).is_none());
        assert_eq!(doc.root_graph().len(), 1);
    }

    #[test]
    fn test_replace_read_remaps_dependencies() {
        let mut doc = demo_document();
        let mut graph = doc.root_graph_mut();
        let a = graph.create_node("in").unwrap();
        let b = graph.create_node("out").unwrap();
        graph.set_extra_dependencies(b, &[a]).unwrap();
        let record = record_of(&doc);

        let gid = doc.root();
        let idmap = doc.deserialize_graph(gid, &record, ReadMode::Replace).unwrap();
        assert!(doc.item(a).is_none());
        let new_a = idmap[&a.value()];
        let new_b = idmap[&b.value()];
        assert_eq!(doc.dependencies_of(new_b), vec![new_a]);
    }

    #[test]
    fn test_inplace_read_restores_links_and_regulates() {
        let mut doc = demo_document();
        let mut graph = doc.root_graph_mut();
        let a = graph.create_node("in").unwrap();
        let m = graph.create_node("merge").unwrap();
        graph.set_link(a, 0, m, -1).unwrap();
        let mut record = record_of(&doc);
        record.links[0].to.port = 5;

        let gid = doc.root();
        doc.deserialize_graph(gid, &record, ReadMode::InPlace).unwrap();
        let view = doc.root_graph();
        assert_eq!(view.link_count(), 1);
        assert_eq!(view.input_of(m, 0).map(|ic| ic.source_item), Some(a));
    }

    #[test]
    fn test_invalid_record_changes_nothing() {
        let mut doc = demo_document();
        let a = doc.root_graph_mut().create_node("null").unwrap();
        let gid = doc.root();

        let mut unknown_type = record_of(&doc);
        let mut extra = unknown_type.items[0].clone();
        extra.id += 1;
        extra.fields.remove("uid");
        extra.fields.insert("type".into(), Value::from("nonexistent"));
        unknown_type.items.push(extra);
        assert!(matches!(
            doc.deserialize_graph(gid, &unknown_type, ReadMode::InPlace),
            Err(SerializeError::UnknownNodeType(_))
        ));

        let mut bad_link = record_of(&doc);
        bad_link.links.push(LinkRecord {
            from: LinkEnd { id: 1, port: 0 },
            to: LinkEnd { id: a.value(), port: 0 },
        });
        assert!(matches!(
            doc.deserialize_graph(gid, &bad_link, ReadMode::InPlace),
            Err(SerializeError::UnknownLinkEndpoint(1))
        ));

        let mut twice = record_of(&doc);
        let mut copy = twice.items[0].clone();
        copy.id += 1;
        twice.items.push(copy);
        assert!(matches!(
            doc.deserialize_graph(gid, &twice, ReadMode::InPlace),
            Err(SerializeError::DuplicateUid(_))
        ));

        assert!(doc.item(a).is_some());
        assert_eq!(doc.root_graph().len(), 1);
    }

    #[test]
    fn test_copy_paste() {
        let mut doc = demo_document();
        let mut graph = doc.root_graph_mut();
        let a = graph.create_node("in").unwrap();
        let b = graph.create_node("null").unwrap();
        let c = graph.create_node("out").unwrap();
        graph.set_link(a, 0, b, 0).unwrap();
        graph.set_link(b, 0, c, 0).unwrap();

        let gid = doc.root();
        let clip = doc.copy(gid, &[a, b]).unwrap();
        let versions = doc.history().version_count();
        let report = doc.paste(gid, &clip, Vec2::new(10.0, 20.0)).unwrap();

        assert!(report.is_complete());
        assert_eq!(report.items.len(), 2);
        assert_eq!(report.links.len(), 1);
        assert_eq!(doc.history().version_count(), versions + 1);
        assert_eq!(doc.history().version_message(versions), Some("paste"));

        let pasted_a = doc.item(report.items[0]).unwrap();
        let original_a = doc.item(a).unwrap();
        assert_ne!(pasted_a.uid(), original_a.uid());
        assert_eq!(pasted_a.pos(), original_a.pos() + Vec2::new(10.0, 20.0));
        let view = doc.root_graph();
        assert_eq!(view.len(), 5 + 3);
        assert_eq!(
            view.input_of(report.items[1], 0).map(|ic| ic.source_item),
            Some(report.items[0])
        );
    }

    #[test]
    fn test_paste_skips_what_it_cannot_create() {
        let mut doc = demo_document();
        let mut graph = doc.root_graph_mut();
        let a = graph.create_node("in").unwrap();
        let b = graph.create_node("out").unwrap();
        graph.set_link(a, 0, b, 0).unwrap();
        let gid = doc.root();

        let mut record = doc.root_graph().serialize();
        record.items[0].fields.insert("type".into(), Value::from("nonexistent"));
        let clip = serde_json::to_string(&record).unwrap();
        let report = doc.paste(gid, &clip, Vec2::ZERO).unwrap();
        assert_eq!(report.items.len(), 1);
        assert_eq!(report.skipped_items.len(), 1);
        assert_eq!(report.skipped_links.len(), 1);
        assert!(!report.is_complete());
    }

    #[test]
    fn test_paste_remaps_group_members() {
        let mut doc = demo_document();
        let mut graph = doc.root_graph_mut();
        let group = graph.create_item("group").unwrap();
        let inside = graph.create_node("null").unwrap();
        graph
            .set_item_bounds(group, crate::geometry::Aabb::new(Vec2::new(-200.0, -200.0), Vec2::new(200.0, 200.0)))
            .unwrap();
        assert!(doc.item(group).unwrap().as_group_box().unwrap().containing_items().contains(&inside));

        let gid = doc.root();
        let clip = doc.copy(gid, &[group, inside]).unwrap();
        let report = doc.paste(gid, &clip, Vec2::new(500.0, 0.0)).unwrap();
        let pasted_group = doc.item(report.items[0]).unwrap().as_group_box().unwrap();
        let members: Vec<ItemId> = pasted_group.containing_items().iter().copied().collect();
        assert_eq!(members, vec![report.items[1]]);
    }

    #[test]
    fn test_paste_into_readonly_graph_fails() {
        let mut doc = demo_document();
        let gid = doc.root();
        doc.root_graph_mut().set_readonly(true);
        let result = doc.paste(gid, r#"{"items":[],"links":[]}"#, Vec2::ZERO);
        assert!(matches!(
            result,
            Err(DocumentError::Serialize(SerializeError::ReadOnly(_)))
        ));
        assert!(matches!(
            doc.paste(gid, "not json", Vec2::ZERO),
            Err(DocumentError::Serialize(_))
        ));
    }

    fn end(id: ItemId, port: i32) -> LinkEnd {
        LinkEnd { id: id.value(), port }
    }

    fn rejected_link(result: Result<HashMap<u64, ItemId>, SerializeError>) -> bool {
        matches!(result, Err(SerializeError::InvalidField { field: "links", .. }))
    }

    #[test]
    fn test_read_rejects_links_to_missing_pins() {
        let mut doc = demo_document();
        let mut graph = doc.root_graph_mut();
        let a = graph.create_node("in").unwrap();
        let b = graph.create_node("null").unwrap();
        graph.set_link(a, 0, b, 0).unwrap();
        let gid = doc.root();

        let mut bad_input = record_of(&doc);
        bad_input.links[0].to.port = 7;
        let mut bad_output = record_of(&doc);
        bad_output.links[0].from.port = 3;
        let mut into_input_node = record_of(&doc);
        into_input_node.links[0].to = end(a, 0);

        for record in [bad_input, bad_output, into_input_node] {
            assert!(rejected_link(doc.deserialize_graph(gid, &record, ReadMode::InPlace)));
        }
        let view = doc.root_graph();
        assert_eq!(view.link_count(), 1);
        assert_eq!(view.link_source(b, 0).map(|ic| ic.source_item), Some(a));
    }

    #[test]
    fn test_read_rejects_type_mismatch() {
        let mut doc = demo_document();
        let mut graph = doc.root_graph_mut();
        let float = graph.create_node("sumfloat").unwrap();
        let int = graph.create_node("sumint").unwrap();
        let sink = graph.create_node("sumint").unwrap();
        let router = graph.create_item("router").unwrap();
        let gid = doc.root();

        let mut direct = record_of(&doc);
        direct.links.push(LinkRecord {
            from: end(float, 0),
            to: end(sink, 0),
        });
        assert!(rejected_link(doc.deserialize_graph(gid, &direct, ReadMode::InPlace)));

        let mut routed = record_of(&doc);
        routed.links.push(LinkRecord {
            from: end(float, 0),
            to: end(router, 0),
        });
        routed.links.push(LinkRecord {
            from: end(router, 0),
            to: end(sink, 1),
        });
        assert!(rejected_link(doc.deserialize_graph(gid, &routed, ReadMode::InPlace)));
        assert_eq!(doc.root_graph().link_count(), 0);

        let mut widening = record_of(&doc);
        widening.links.push(LinkRecord {
            from: end(int, 0),
            to: end(float, 0),
        });
        doc.deserialize_graph(gid, &widening, ReadMode::InPlace).unwrap();
        assert_eq!(doc.root_graph().link_count(), 1);
    }

    #[test]
    fn test_read_rejects_loops() {
        let mut doc = demo_document();
        let mut graph = doc.root_graph_mut();
        let a = graph.create_node("null").unwrap();
        let b = graph.create_node("null").unwrap();
        let r = graph.create_item("router").unwrap();
        graph.set_link(a, 0, b, 0).unwrap();
        let gid = doc.root();

        let mut back = record_of(&doc);
        back.links.push(LinkRecord {
            from: end(b, 0),
            to: end(a, 0),
        });
        let mut through_router = record_of(&doc);
        through_router.links.push(LinkRecord {
            from: end(b, 0),
            to: end(r, 0),
        });
        through_router.links.push(LinkRecord {
            from: end(r, 0),
            to: end(a, 0),
        });
        let mut own_input = record_of(&doc);
        own_input.links.push(LinkRecord {
            from: end(a, 0),
            to: end(a, 0),
        });

        for record in [back, through_router, own_input] {
            assert!(rejected_link(doc.deserialize_graph(gid, &record, ReadMode::InPlace)));
        }
        assert_eq!(doc.root_graph().link_count(), 1);
    }

    /// Record with handles replaced by UIDs, so records of different documents compare
    fn canonical(record: &GraphRecord) -> Value {
        let uid_of: HashMap<u64, Value> = record
            .items
            .iter()
            .map(|item| (item.id, item.fields["uid"].clone()))
            .collect();
        let items: Vec<Value> = record
            .items
            .iter()
            .map(|item| {
                let mut fields = item.fields.clone();
                fields.insert("f".into(), Value::from(item.f.clone()));
                if let Some(Value::Array(ids)) = fields.get_mut("contains") {
                    for id in ids.iter_mut() {
                        *id = uid_of[&id.as_u64().unwrap()].clone();
                    }
                }
                if let Some(nested) = fields.get("graph") {
                    let nested = GraphRecord::deserialize(nested).unwrap();
                    fields.insert("graph".into(), canonical(&nested));
                }
                Value::Object(fields)
            })
            .collect();
        let mut links: Vec<String> = record
            .links
            .iter()
            .map(|l| format!("{}:{} -> {}:{}", uid_of[&l.from.id], l.from.port, uid_of[&l.to.id], l.to.port))
            .collect();
        links.sort();
        serde_json::json!({ "items": items, "links": links })
    }

    #[test]
    fn test_round_trip_preserves_structure() {
        let mut doc = demo_document();
        let mut graph = doc.root_graph_mut();
        let a = graph.create_node("in").unwrap();
        let b = graph.create_node("in").unwrap();
        let merge = graph.create_node("merge").unwrap();
        let r1 = graph.create_item("router").unwrap();
        let r2 = graph.create_item("router").unwrap();
        let owner = graph.create_node("subgraph").unwrap();
        let group = graph.create_item("group").unwrap();
        graph.move_items(&[merge], Vec2::new(0.0, 600.0)).unwrap();
        graph.move_items(&[owner], Vec2::new(600.0, 0.0)).unwrap();
        graph.set_link(a, 0, r1, 0).unwrap();
        graph.set_link(r1, 0, r2, 0).unwrap();
        graph.set_link(r2, 0, merge, -1).unwrap();
        graph.set_link(b, 0, merge, -1).unwrap();
        graph.set_link(merge, 0, owner, 0).unwrap();
        graph.set_extra_dependencies(merge, &[owner]).unwrap();
        graph
            .set_item_bounds(group, crate::geometry::Aabb::new(Vec2::new(-200.0, -200.0), Vec2::new(200.0, 200.0)))
            .unwrap();
        let sub = doc.item(owner).unwrap().as_node().unwrap().subgraph.unwrap();
        let mut inner = doc.graph_mut(sub).unwrap();
        let x = inner.create_node("in").unwrap();
        let y = inner.create_node("out").unwrap();
        inner.set_link(x, 0, y, 0).unwrap();
        inner.set_extra_dependencies(y, &[a]).unwrap();

        let first = record_of(&doc);
        assert!(!first.items[6].fields["contains"].as_array().unwrap().is_empty());
        let mut copy = demo_document();
        let gid = copy.root();
        let idmap = copy.deserialize_graph(gid, &first, ReadMode::InPlace).unwrap();
        let second = record_of(&copy);

        assert_eq!(canonical(&second), canonical(&first));
        assert_eq!(second.links.len(), first.links.len());
        for link in &first.links {
            let source = idmap[&link.from.id];
            let dest = idmap[&link.to.id];
            assert_eq!(
                copy.root_graph().link_source(dest, link.to.port),
                Some(InputConnection {
                    source_item: source,
                    source_port: link.from.port,
                })
            );
        }
        let new_merge = idmap[&merge.value()];
        assert_eq!(copy.dependencies_of(new_merge), vec![idmap[&owner.value()]]);
    }

    #[test]
    fn test_paste_remaps_dependencies_across_subgraphs() {
        let mut doc = demo_document();
        let a = doc.root_graph_mut().create_node("in").unwrap();
        let owner = doc.root_graph_mut().create_node("subgraph").unwrap();
        let c = doc.root_graph_mut().create_node("out").unwrap();
        let sub = doc.item(owner).unwrap().as_node().unwrap().subgraph.unwrap();
        let inner = doc.graph_mut(sub).unwrap().create_node("null").unwrap();
        doc.graph_mut(sub).unwrap().set_extra_dependencies(inner, &[a]).unwrap();
        doc.root_graph_mut().set_extra_dependencies(c, &[inner]).unwrap();

        let gid = doc.root();
        let clip = doc.copy(gid, &[a, owner, c]).unwrap();
        let report = doc.paste(gid, &clip, Vec2::ZERO).unwrap();
        assert!(report.is_complete());
        let (new_a, new_owner, new_c) = (report.items[0], report.items[1], report.items[2]);
        let new_sub = doc.item(new_owner).unwrap().as_node().unwrap().subgraph.unwrap();
        let new_inner = doc.graph(new_sub).unwrap().nodes().next().unwrap();

        assert_eq!(doc.dependencies_of(new_inner), vec![new_a]);
        assert_eq!(doc.dependencies_of(new_c), vec![new_inner]);
        assert_eq!(doc.dependencies_of(inner), vec![a]);
    }
}
