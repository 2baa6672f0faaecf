// SPDX-License-Identifier: MIT OR Apache-2.0
//! Loop detection and breadth-first ordering of graph nodes.
//!
//! Edges come from links and from the extra dependencies of nodes. Routers
//! forward edges but never show up in a traversal result.

use crate::document::Document;
use crate::error::LoopError;
use crate::graph::GraphRef;
use crate::id::{ItemId, OutputConnection};
use crate::item::GraphItem;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::ops::Range;

/// Direction of a traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraverseDirection {
    /// From sources toward destinations
    TopDown,
    /// From destinations toward sources
    BottomUp,
}

/// Outcome of [`GraphRef::check_loop_bottom_up`]
#[derive(Debug, Clone, Default)]
pub struct LoopCheck {
    /// Whether a loop was found upstream of the target
    pub has_loop: bool,
    /// Depth-first stack at the moment the loop closed, target first
    pub path: Vec<ItemId>,
    /// Every item reached
    pub visited: HashSet<ItemId>,
}

#[derive(Debug, Clone)]
struct NodeClosure {
    inputs: Range<usize>,
    outputs: Range<usize>,
}

/// Nodes in traversal order with their neighbors.
///
/// Neighbors are stored as slices of two shared arrays; an input slot is
/// `None` when the port is unconnected or fed from outside the result.
#[derive(Debug, Clone, Default)]
pub struct GraphTraverseResult {
    nodes: Vec<ItemId>,
    closures: Vec<NodeClosure>,
    inputs: Vec<Option<usize>>,
    outputs: Vec<usize>,
    index: HashMap<ItemId, usize>,
}

impl GraphTraverseResult {
    /// Number of nodes
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no node was reached
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node handles in order
    pub fn nodes(&self) -> &[ItemId] {
        &self.nodes
    }

    /// Node at position `index`
    pub fn get(&self, index: usize) -> Option<TraversedNode<'_>> {
        (index < self.nodes.len()).then_some(TraversedNode {
            result: self,
            index,
        })
    }

    /// Position of `id` in the order
    pub fn position(&self, id: ItemId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    /// Node `id`, if it was reached
    pub fn find(&self, id: ItemId) -> Option<TraversedNode<'_>> {
        self.get(self.position(id)?)
    }

    /// Iterate over nodes in order
    pub fn iter(&self) -> impl Iterator<Item = TraversedNode<'_>> {
        (0..self.nodes.len()).map(move |index| TraversedNode {
            result: self,
            index,
        })
    }
}

fn wrap(n: isize, count: usize) -> Option<usize> {
    let n = if n < 0 { n + count as isize } else { n };
    (0..count as isize).contains(&n).then_some(n as usize)
}

/// One node of a [`GraphTraverseResult`]
#[derive(Debug, Clone, Copy)]
pub struct TraversedNode<'a> {
    result: &'a GraphTraverseResult,
    index: usize,
}

impl<'a> TraversedNode<'a> {
    fn closure(&self) -> &'a NodeClosure {
        &self.result.closures[self.index]
    }

    /// Position in the order
    pub fn index(&self) -> usize {
        self.index
    }

    /// Node handle
    pub fn id(&self) -> ItemId {
        self.result.nodes[self.index]
    }

    /// Number of input slots, up to the highest connected port
    pub fn input_count(&self) -> usize {
        self.closure().inputs.len()
    }

    /// Number of downstream neighbors
    pub fn output_count(&self) -> usize {
        self.closure().outputs.len()
    }

    /// Position of the node feeding input `n`; negative `n` counts from the end
    pub fn input_index(&self, n: isize) -> Option<usize> {
        let slot = wrap(n, self.input_count())?;
        self.result.inputs[self.closure().inputs.start + slot]
    }

    /// Handle of the node feeding input `n`
    pub fn input(&self, n: isize) -> Option<ItemId> {
        self.input_index(n).map(|i| self.result.nodes[i])
    }

    /// Position of downstream neighbor `n`; negative `n` counts from the end
    pub fn output_index(&self, n: isize) -> Option<usize> {
        let slot = wrap(n, self.output_count())?;
        Some(self.result.outputs[self.closure().outputs.start + slot])
    }

    /// Handle of downstream neighbor `n`
    pub fn output(&self, n: isize) -> Option<ItemId> {
        self.output_index(n).map(|i| self.result.nodes[i])
    }

    /// Input slots in port order
    pub fn inputs(&self) -> &'a [Option<usize>] {
        &self.result.inputs[self.closure().inputs.clone()]
    }

    /// Downstream neighbors
    pub fn outputs(&self) -> &'a [usize] {
        &self.result.outputs[self.closure().outputs.clone()]
    }
}

impl Document {
    /// Direct upstream neighbors of `id`: link sources and extra dependencies
    pub(crate) fn upstream_of(&self, id: ItemId) -> Vec<ItemId> {
        let Some(item) = self.pool.get(id) else {
            return Vec::new();
        };
        let graph = item.parent.and_then(|g| self.graphs.get(&g));
        let source = |port: i32| {
            graph.and_then(|g| {
                g.links.get(&OutputConnection {
                    dest_item: id,
                    dest_port: port,
                })
            })
        };
        let mut preds = Vec::new();
        if let Some(node) = item.as_node() {
            if node.is_unbounded() {
                if let Some(graph) = graph {
                    preds.extend(
                        graph
                            .links
                            .iter()
                            .filter(|(oc, _)| oc.dest_item == id)
                            .map(|(_, ic)| ic.source_item),
                    );
                }
            } else {
                preds.extend((0..node.num_max_inputs()).filter_map(|port| source(port).map(|ic| ic.source_item)));
            }
            preds.extend(self.dependencies_of(id));
        } else if item.as_router().is_some() {
            preds.extend(source(0).map(|ic| ic.source_item));
        }
        preds
    }

    /// Chain `to -> ... -> from` of upstream edges, if `to` is upstream of `from`
    pub(crate) fn upstream_path(&self, from: ItemId, to: ItemId) -> Option<Vec<ItemId>> {
        if from == to {
            return Some(vec![from]);
        }
        let mut came_from: HashMap<ItemId, ItemId> = HashMap::new();
        let mut queue = VecDeque::from([from]);
        let mut seen = HashSet::from([from]);
        while let Some(current) = queue.pop_front() {
            for pred in self.upstream_of(current) {
                if !seen.insert(pred) {
                    continue;
                }
                came_from.insert(pred, current);
                if pred == to {
                    let mut path = vec![to];
                    let mut step = to;
                    while let Some(&next) = came_from.get(&step) {
                        path.push(next);
                        step = next;
                    }
                    return Some(path);
                }
                queue.push_back(pred);
            }
        }
        None
    }

    pub(crate) fn check_loop_from(&self, target: ItemId) -> LoopCheck {
        let mut visited = HashSet::from([target]);
        let mut on_stack = HashSet::from([target]);
        let mut stack: Vec<(ItemId, Vec<ItemId>, usize)> = vec![(target, self.upstream_of(target), 0)];
        while let Some((id, preds, next)) = stack.last_mut() {
            if *next >= preds.len() {
                let id = *id;
                on_stack.remove(&id);
                stack.pop();
                continue;
            }
            let pred = preds[*next];
            *next += 1;
            if on_stack.contains(&pred) {
                let path = stack.iter().map(|frame| frame.0).collect();
                return LoopCheck {
                    has_loop: true,
                    path,
                    visited,
                };
            }
            if visited.insert(pred) {
                on_stack.insert(pred);
                let preds = self.upstream_of(pred);
                stack.push((pred, preds, 0));
            }
        }
        LoopCheck {
            has_loop: false,
            path: Vec::new(),
            visited,
        }
    }
}

type EdgeMap = HashMap<ItemId, Vec<ItemId>>;

impl<'a> GraphRef<'a> {
    /// Depth-first search upstream of `target` for a dependency loop.
    ///
    /// Revisiting an item on the current stack is a loop; revisiting a fully
    /// explored item is not.
    pub fn check_loop_bottom_up(&self, target: ItemId) -> LoopCheck {
        self.doc.check_loop_from(target)
    }

    fn edge_index(&self) -> (EdgeMap, EdgeMap) {
        let doc = self.doc;
        let mut down = EdgeMap::new();
        let mut up = EdgeMap::new();
        let mut pending = vec![self.id];
        let mut scanned = HashSet::new();
        while let Some(gid) = pending.pop() {
            if !scanned.insert(gid) {
                continue;
            }
            let Some(graph) = doc.graphs.get(&gid) else {
                continue;
            };
            for (oc, ic) in &graph.links {
                down.entry(ic.source_item).or_default().push(oc.dest_item);
                up.entry(oc.dest_item).or_default().push(ic.source_item);
            }
            for &id in &graph.items {
                for dep in doc.dependencies_of(id) {
                    down.entry(dep).or_default().push(id);
                    up.entry(id).or_default().push(dep);
                    if let Some(parent) = doc.pool.get(dep).and_then(GraphItem::parent) {
                        pending.push(parent);
                    }
                }
            }
        }
        (down, up)
    }

    /// Breadth-first order of the nodes reachable from `start`.
    ///
    /// A node reached again is moved to the end, so with
    /// [`TraverseDirection::TopDown`] every node comes after all its sources.
    /// Unless `allow_loop` is set, reaching a node again when it sits on a
    /// loop fails with the loop's path. With `allow_loop`, nodes with a loop
    /// upstream are moved but not expanded again.
    pub fn traverse(
        &self,
        start: &[ItemId],
        direction: TraverseDirection,
        allow_loop: bool,
    ) -> Result<GraphTraverseResult, LoopError> {
        let pool = &self.doc.pool;
        let (down, up) = self.edge_index();
        let edges = match direction {
            TraverseDirection::TopDown => &down,
            TraverseDirection::BottomUp => &up,
        };

        let mut queue: VecDeque<ItemId> = start.iter().copied().collect();
        let mut order: Vec<Option<ItemId>> = Vec::new();
        let mut slot: HashMap<ItemId, usize> = HashMap::new();
        let mut loop_free: HashSet<ItemId> = HashSet::new();
        let mut looping: HashMap<ItemId, bool> = HashMap::new();

        while let Some(id) = queue.pop_front() {
            let Some(item) = pool.get(id) else {
                tracing::warn!("traverse: item {id} does not exist");
                continue;
            };
            if item.as_node().is_none() && item.as_router().is_none() {
                continue;
            }
            let mut expand = true;
            if let Some(&old) = slot.get(&id) {
                if !allow_loop {
                    if !loop_free.contains(&id) {
                        let check = self.check_loop_bottom_up(id);
                        if check.has_loop {
                            let names: Vec<String> = check.path.iter().map(ItemId::to_string).collect();
                            tracing::error!("loop detected: {}", names.join(" <- "));
                            return Err(LoopError { path: check.path });
                        }
                        loop_free.extend(check.visited);
                    }
                } else {
                    expand = !*looping
                        .entry(id)
                        .or_insert_with(|| self.check_loop_bottom_up(id).has_loop);
                }
                order[old] = None;
            }
            slot.insert(id, order.len());
            order.push(Some(id));
            if expand {
                if let Some(next) = edges.get(&id) {
                    queue.extend(next.iter().copied());
                }
            }
        }

        let nodes: Vec<ItemId> = order
            .into_iter()
            .flatten()
            .filter(|id| pool.get(*id).is_some_and(|item| item.as_node().is_some()))
            .collect();
        Ok(self.build_result(nodes))
    }

    fn build_result(&self, nodes: Vec<ItemId>) -> GraphTraverseResult {
        let doc = self.doc;
        let index: HashMap<ItemId, usize> = nodes.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let mut result = GraphTraverseResult {
            closures: Vec::with_capacity(nodes.len()),
            index,
            ..Default::default()
        };

        for &id in &nodes {
            let owner = doc
                .pool
                .get(id)
                .and_then(GraphItem::parent)
                .and_then(|g| doc.graph(g));
            let Some(graph) = owner else {
                result.closures.push(NodeClosure {
                    inputs: result.inputs.len()..result.inputs.len(),
                    outputs: result.outputs.len()..result.outputs.len(),
                });
                continue;
            };

            let by_port: BTreeMap<i32, Option<usize>> = graph
                .links()
                .filter(|(oc, _)| oc.dest_item == id && oc.dest_port >= 0)
                .map(|(oc, _)| {
                    let source = graph
                        .input_of(id, oc.dest_port)
                        .and_then(|ic| result.index.get(&ic.source_item).copied());
                    (oc.dest_port, source)
                })
                .collect();
            let input_begin = result.inputs.len();
            if let Some((&last, _)) = by_port.last_key_value() {
                for port in 0..=last {
                    result.inputs.push(by_port.get(&port).copied().flatten());
                }
            }

            let output_begin = result.outputs.len();
            for (oc, ic) in graph.links() {
                if ic.source_item != id {
                    continue;
                }
                let mut pending = vec![oc.dest_item];
                let mut seen = HashSet::new();
                while let Some(dest) = pending.pop() {
                    if !seen.insert(dest) {
                        continue;
                    }
                    match doc.pool.get(dest) {
                        Some(item) if item.as_router().is_some() => {
                            pending.extend(graph.link_destinations(dest, 0).iter().map(|o| o.dest_item));
                        }
                        Some(_) => {
                            if let Some(&i) = result.index.get(&dest) {
                                result.outputs.push(i);
                            }
                        }
                        None => {}
                    }
                }
            }

            result.closures.push(NodeClosure {
                inputs: input_begin..result.inputs.len(),
                outputs: output_begin..result.outputs.len(),
            });
        }
        result.nodes = nodes;
        result
    }

    /// Traverse from `start` toward destinations, failing on loops
    pub fn travel_top_down(&self, start: &[ItemId]) -> Result<GraphTraverseResult, LoopError> {
        self.traverse(start, TraverseDirection::TopDown, false)
    }

    /// Traverse from `start` toward sources, failing on loops
    pub fn travel_bottom_up(&self, start: &[ItemId]) -> Result<GraphTraverseResult, LoopError> {
        self.traverse(start, TraverseDirection::BottomUp, false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::demo_document;

    #[test]
    fn test_diamond_order() {
        let mut doc = demo_document();
        let mut graph = doc.root_graph_mut();
        let a = graph.create_node("split").unwrap();
        let b = graph.create_node("null").unwrap();
        let c = graph.create_node("null").unwrap();
        let d = graph.create_node("merge").unwrap();
        graph.set_link(a, 0, b, 0).unwrap();
        graph.set_link(a, 1, c, 0).unwrap();
        graph.set_link(b, 0, d, -1).unwrap();
        graph.set_link(c, 0, d, -1).unwrap();

        let result = doc.root_graph().travel_top_down(&[a]).unwrap();
        assert_eq!(result.len(), 4);
        let pos = |id| result.position(id).unwrap();
        assert_eq!(pos(a), 0);
        assert!(pos(d) > pos(b) && pos(d) > pos(c));

        let dn = result.find(d).unwrap();
        assert_eq!(dn.input_count(), 2);
        assert_eq!(dn.input(0), Some(b));
        assert_eq!(dn.input(-1), Some(c));
        assert_eq!(dn.output_count(), 0);
        let an = result.find(a).unwrap();
        assert_eq!(an.output_count(), 2);
        assert!(an.input(0).is_none());
    }

    #[test]
    fn test_bottom_up_order() {
        let mut doc = demo_document();
        let mut graph = doc.root_graph_mut();
        let a = graph.create_node("in").unwrap();
        let b = graph.create_node("null").unwrap();
        let c = graph.create_node("out").unwrap();
        graph.set_link(a, 0, b, 0).unwrap();
        graph.set_link(b, 0, c, 0).unwrap();
        let result = doc.root_graph().travel_bottom_up(&[c]).unwrap();
        assert_eq!(result.nodes(), &[c, b, a]);
    }

    #[test]
    fn test_routers_are_transparent() {
        let mut doc = demo_document();
        let mut graph = doc.root_graph_mut();
        let a = graph.create_node("in").unwrap();
        let r = graph.create_item("router").unwrap();
        let b = graph.create_node("exec").unwrap();
        graph.set_link(a, 0, r, 0).unwrap();
        graph.set_link(r, 0, b, 2).unwrap();
        let result = doc.root_graph().travel_top_down(&[a]).unwrap();
        assert_eq!(result.nodes(), &[a, b]);
        let bn = result.find(b).unwrap();
        assert_eq!(bn.inputs(), &[None, None, Some(0)]);
        assert_eq!(result.find(a).unwrap().outputs(), &[1]);
    }

    #[test]
    fn test_loop_check_and_traverse_failure() {
        let mut doc = demo_document();
        let mut graph = doc.root_graph_mut();
        let a = graph.create_node("null").unwrap();
        let b = graph.create_node("null").unwrap();
        graph.set_link(a, 0, b, 0).unwrap();
        assert!(graph.set_link(b, 0, a, 0).is_err());
        assert!(!graph.view().check_loop_bottom_up(b).has_loop);

        // a also depends on b, closing a -> b -> a
        graph.set_extra_dependencies(a, &[b]).unwrap();
        let check = graph.view().check_loop_bottom_up(b);
        assert!(check.has_loop);
        assert!(check.path.contains(&a) && check.path.contains(&b));

        let err = doc.root_graph().travel_top_down(&[a]).unwrap_err();
        assert!(err.path.contains(&a));
        let allowed = doc.root_graph().traverse(&[a], TraverseDirection::TopDown, true).unwrap();
        assert_eq!(allowed.len(), 2);
    }

    #[test]
    fn test_dependencies_order_nodes() {
        let mut doc = demo_document();
        let mut graph = doc.root_graph_mut();
        let a = graph.create_node("in").unwrap();
        let b = graph.create_node("out").unwrap();
        graph.set_extra_dependencies(b, &[a]).unwrap();
        let result = doc.root_graph().travel_top_down(&[a]).unwrap();
        assert_eq!(result.nodes(), &[a, b]);
        assert_eq!(result.find(b).unwrap().input_count(), 0);
    }

    #[test]
    fn test_dependency_into_subgraph_is_followed() {
        let mut doc = demo_document();
        let owner = doc.root_graph_mut().create_node("subgraph").unwrap();
        let sub = doc.item(owner).unwrap().as_node().unwrap().subgraph.unwrap();
        let inner = doc.graph_mut(sub).unwrap().create_node("in").unwrap();
        let sink = doc.root_graph_mut().create_node("out").unwrap();
        doc.root_graph_mut().set_extra_dependencies(sink, &[inner]).unwrap();
        let result = doc.root_graph().travel_bottom_up(&[sink]).unwrap();
        assert_eq!(result.nodes(), &[sink, inner]);
    }

    #[test]
    fn test_missing_start_is_skipped() {
        let doc = demo_document();
        let result = doc.root_graph().travel_top_down(&[ItemId::new(9, 9)]).unwrap();
        assert!(result.is_empty());
        assert!(result.get(0).is_none());
    }
}
