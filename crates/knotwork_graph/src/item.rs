// SPDX-License-Identifier: MIT OR Apache-2.0
//! The common item record and its closed set of variants.
//!
//! Capabilities are answered by pattern matching: `as_node` yields a view for
//! both plain and typed nodes, `as_dyeable` for everything that has a color.

use crate::boxes::{Arrow, CommentBox, GroupBox};
use crate::color::{Color, ROUTER_RADIUS};
use crate::error::SerializeError;
use crate::fields::{self, Fields};
use crate::geometry::{Aabb, Vec2};
use crate::id::{GraphId, ItemId, Uid};
use crate::link::{Link, Router};
use crate::node::{Node, TypedNode};
use crate::types::TypeSystem;

/// Something with a user-settable color
pub trait Dyeable {
    /// Current color
    fn color(&self) -> Color;
    /// Change the color
    fn set_color(&mut self, color: Color);
    /// Whether the color was changed from its default
    fn has_set_color(&self) -> bool {
        false
    }
}

impl Dyeable for Node {
    fn color(&self) -> Color {
        self.color
    }
    fn set_color(&mut self, color: Color) {
        self.color = color;
    }
    fn has_set_color(&self) -> bool {
        Node::has_set_color(self)
    }
}

impl Dyeable for Router {
    fn color(&self) -> Color {
        self.color
    }
    fn set_color(&mut self, color: Color) {
        self.color = color;
    }
}

impl Dyeable for GroupBox {
    fn color(&self) -> Color {
        self.background
    }
    fn set_color(&mut self, color: Color) {
        self.background = color;
    }
}

impl Dyeable for CommentBox {
    fn color(&self) -> Color {
        self.color
    }
    fn set_color(&mut self, color: Color) {
        CommentBox::set_color(self, color);
    }
}

impl Dyeable for Arrow {
    fn color(&self) -> Color {
        self.color
    }
    fn set_color(&mut self, color: Color) {
        self.color = color;
    }
}

/// Variant payload of a [`GraphItem`]
#[derive(Debug, Clone, PartialEq)]
pub enum ItemKind {
    /// Plain node
    Node(Node),
    /// Node with typed pins
    TypedNode(TypedNode),
    /// Link between two pins
    Link(Link),
    /// Pass-through point
    Router(Router),
    /// Group rectangle
    GroupBox(GroupBox),
    /// Text comment
    Comment(CommentBox),
    /// Arrow annotation
    Arrow(Arrow),
}

impl ItemKind {
    /// Short lowercase name of the variant
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Node(_) => "node",
            Self::TypedNode(_) => "typed node",
            Self::Link(_) => "link",
            Self::Router(_) => "router",
            Self::GroupBox(_) => "group",
            Self::Comment(_) => "comment",
            Self::Arrow(_) => "arrow",
        }
    }
}

/// An entity living in a graph: identity, placement and variant data
#[derive(Debug, Clone, PartialEq)]
pub struct GraphItem {
    pub(crate) parent: Option<GraphId>,
    pub(crate) id: ItemId,
    pub(crate) uid: Uid,
    pub(crate) source_uid: Option<Uid>,
    pub(crate) pos: Vec2,
    pub(crate) aabb: Aabb,
    /// Name of the factory that creates this kind of item; `"node"` for nodes
    pub factory: String,
    /// Variant data
    pub kind: ItemKind,
}

impl GraphItem {
    /// Create a detached item with a fresh UID and the variant's default bounds
    pub fn new(kind: ItemKind) -> Self {
        let (aabb, factory) = match &kind {
            ItemKind::Node(_) | ItemKind::TypedNode(_) => (Aabb::centered(25.0, 10.0), "node"),
            ItemKind::Link(_) => (Aabb::default(), "link"),
            ItemKind::Router(_) => (Aabb::centered(ROUTER_RADIUS, ROUTER_RADIUS), "router"),
            ItemKind::GroupBox(_) => (GroupBox::DEFAULT_BOUNDS, "group"),
            ItemKind::Comment(_) => (CommentBox::DEFAULT_BOUNDS, "comment"),
            ItemKind::Arrow(arrow) => (arrow.local_bounds(), "arrow"),
        };
        Self {
            parent: None,
            id: ItemId::NONE,
            uid: Uid::new(),
            source_uid: None,
            pos: Vec2::ZERO,
            aabb,
            factory: factory.to_owned(),
            kind,
        }
    }

    /// A detached plain node
    pub fn node(node: Node) -> Self {
        Self::new(ItemKind::Node(node))
    }

    /// A detached typed node
    pub fn typed_node(node: TypedNode) -> Self {
        Self::new(ItemKind::TypedNode(node))
    }

    /// Place the item, builder style
    pub fn at(mut self, pos: Vec2) -> Self {
        self.pos = pos;
        self
    }

    /// Handle, [`ItemId::NONE`] while detached
    pub fn id(&self) -> ItemId {
        self.id
    }

    /// Persistent identity
    pub fn uid(&self) -> Uid {
        self.uid
    }

    /// UID this item was last read from, if it was deserialized
    pub fn source_uid(&self) -> Option<Uid> {
        self.source_uid
    }

    /// Graph the item belongs to
    pub fn parent(&self) -> Option<GraphId> {
        self.parent
    }

    /// Position
    pub fn pos(&self) -> Vec2 {
        self.pos
    }

    /// Bounds relative to the position
    pub fn local_bounds(&self) -> Aabb {
        match &self.kind {
            ItemKind::Arrow(arrow) => arrow.local_bounds(),
            _ => self.aabb,
        }
    }

    /// Absolute bounds
    pub fn bounds(&self) -> Aabb {
        self.local_bounds().moved(self.pos)
    }

    /// Node view, for plain and typed nodes
    pub fn as_node(&self) -> Option<&Node> {
        match &self.kind {
            ItemKind::Node(node) => Some(node),
            ItemKind::TypedNode(typed) => Some(&typed.node),
            _ => None,
        }
    }

    /// Mutable node view
    pub fn as_node_mut(&mut self) -> Option<&mut Node> {
        match &mut self.kind {
            ItemKind::Node(node) => Some(node),
            ItemKind::TypedNode(typed) => Some(&mut typed.node),
            _ => None,
        }
    }

    /// Typed node view
    pub fn as_typed_node(&self) -> Option<&TypedNode> {
        match &self.kind {
            ItemKind::TypedNode(typed) => Some(typed),
            _ => None,
        }
    }

    /// Link view
    pub fn as_link(&self) -> Option<&Link> {
        match &self.kind {
            ItemKind::Link(link) => Some(link),
            _ => None,
        }
    }

    pub(crate) fn as_link_mut(&mut self) -> Option<&mut Link> {
        match &mut self.kind {
            ItemKind::Link(link) => Some(link),
            _ => None,
        }
    }

    /// Router view
    pub fn as_router(&self) -> Option<&Router> {
        match &self.kind {
            ItemKind::Router(router) => Some(router),
            _ => None,
        }
    }

    /// Mutable router view
    pub fn as_router_mut(&mut self) -> Option<&mut Router> {
        match &mut self.kind {
            ItemKind::Router(router) => Some(router),
            _ => None,
        }
    }

    /// Group box view
    pub fn as_group_box(&self) -> Option<&GroupBox> {
        match &self.kind {
            ItemKind::GroupBox(group) => Some(group),
            _ => None,
        }
    }

    /// Mutable group box view
    pub fn as_group_box_mut(&mut self) -> Option<&mut GroupBox> {
        match &mut self.kind {
            ItemKind::GroupBox(group) => Some(group),
            _ => None,
        }
    }

    /// Comment view
    pub fn as_comment(&self) -> Option<&CommentBox> {
        match &self.kind {
            ItemKind::Comment(comment) => Some(comment),
            _ => None,
        }
    }

    /// Arrow view
    pub fn as_arrow(&self) -> Option<&Arrow> {
        match &self.kind {
            ItemKind::Arrow(arrow) => Some(arrow),
            _ => None,
        }
    }

    /// Color capability
    pub fn as_dyeable(&self) -> Option<&dyn Dyeable> {
        match &self.kind {
            ItemKind::Node(node) => Some(node),
            ItemKind::TypedNode(typed) => Some(&typed.node),
            ItemKind::Router(router) => Some(router),
            ItemKind::GroupBox(group) => Some(group),
            ItemKind::Comment(comment) => Some(comment),
            ItemKind::Arrow(arrow) => Some(arrow),
            ItemKind::Link(_) => None,
        }
    }

    /// Mutable color capability
    pub fn as_dyeable_mut(&mut self) -> Option<&mut dyn Dyeable> {
        match &mut self.kind {
            ItemKind::Node(node) => Some(node),
            ItemKind::TypedNode(typed) => Some(&mut typed.node),
            ItemKind::Router(router) => Some(router),
            ItemKind::GroupBox(group) => Some(group),
            ItemKind::Comment(comment) => Some(comment),
            ItemKind::Arrow(arrow) => Some(arrow),
            ItemKind::Link(_) => None,
        }
    }

    /// Whether the item can be resized by setting its bounds
    pub fn is_resizable(&self) -> bool {
        matches!(self.kind, ItemKind::GroupBox(_) | ItemKind::Comment(_))
    }

    /// Whether the item can be moved; link geometry follows its endpoints
    pub fn can_move(&self) -> bool {
        !matches!(self.kind, ItemKind::Link(_))
    }

    /// Move to `pos`, returning whether the item moved
    pub fn move_to(&mut self, pos: Vec2) -> bool {
        if !self.can_move() {
            return false;
        }
        self.pos = pos;
        true
    }

    /// Resize a resizable item to absolute `bounds`, centering it
    pub fn set_bounds(&mut self, bounds: Aabb) -> bool {
        if !self.is_resizable() {
            return false;
        }
        self.pos = bounds.center();
        self.aabb = bounds.moved(-self.pos);
        true
    }

    /// Whether input `port` accepts output `source_port` of `source`.
    ///
    /// Plain nodes and routers accept everything. Typed nodes check the
    /// source's output type; an untyped source has the empty type name.
    pub fn accept_input(
        &self,
        port: i32,
        source: &GraphItem,
        source_port: i32,
        types: &TypeSystem,
    ) -> bool {
        match &self.kind {
            ItemKind::Node(_) | ItemKind::Router(_) => true,
            ItemKind::TypedNode(typed) => {
                let source_type = source
                    .as_typed_node()
                    .map_or("", |s| s.output_type(source_port));
                typed.accept_input(port, source_type, types)
            }
            _ => false,
        }
    }

    /// Write common and variant fields.
    ///
    /// Links are written as link records, not through this method.
    pub(crate) fn write_fields(&self) -> Fields {
        let mut map = Fields::new();
        fields::put(&mut map, "aabb", self.aabb);
        let pos = [self.pos.x.round() as i64, self.pos.y.round() as i64];
        fields::put(&mut map, "pos", pos);
        fields::put(&mut map, "uid", self.uid);
        match &self.kind {
            ItemKind::Node(node) => node.write_fields(&mut map),
            ItemKind::TypedNode(typed) => typed.node.write_fields(&mut map),
            ItemKind::Router(router) => router.write_fields(&mut map),
            ItemKind::GroupBox(group) => group.write_fields(&mut map),
            ItemKind::Comment(comment) => comment.write_fields(&mut map),
            ItemKind::Arrow(arrow) => arrow.write_fields(&mut map),
            ItemKind::Link(_) => {}
        }
        map
    }

    /// Read common and variant fields; on error the item is left unchanged.
    ///
    /// The UID found in `map` is stored as the source UID. Whether the item
    /// adopts it is up to the caller.
    pub(crate) fn read_fields(&mut self, map: &Fields) -> Result<(), SerializeError> {
        let aabb: Aabb = fields::req(map, "aabb")?;
        let pos = map
            .get("pos")
            .ok_or(SerializeError::MissingField("pos"))
            .and_then(|v| fields::point(v, "pos"))?;
        let uid = match fields::opt::<String>(map, "uid")? {
            Some(s) if !s.is_empty() => Some(fields::parse_uid(&s)?),
            _ => None,
        };
        match &mut self.kind {
            ItemKind::Node(node) => node.read_fields(map)?,
            ItemKind::TypedNode(typed) => typed.node.read_fields(map)?,
            ItemKind::Router(router) => router.read_fields(map)?,
            ItemKind::GroupBox(group) => group.read_fields(map)?,
            ItemKind::Comment(comment) => comment.read_fields(map)?,
            ItemKind::Arrow(arrow) => arrow.read_fields(map)?,
            ItemKind::Link(_) => {}
        }
        self.aabb = aabb;
        self.pos = pos;
        if uid.is_some() {
            self.source_uid = uid;
        }
        Ok(())
    }
}
