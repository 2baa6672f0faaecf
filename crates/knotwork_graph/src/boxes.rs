// SPDX-License-Identifier: MIT OR Apache-2.0
//! Annotation items: group boxes, comments and arrows.

use crate::color::{
    Color, ARROW_DEFAULT_COLOR, COMMENT_BACKGROUND, COMMENT_BOX_MARGIN, COMMENT_COLOR,
    GROUP_BOX_BACKGROUND,
};
use crate::error::SerializeError;
use crate::fields::{self, Fields};
use crate::geometry::{Aabb, Vec2};
use crate::id::ItemId;
use indexmap::IndexSet;
use std::collections::HashMap;

/// A rectangle that remembers which items lie inside it.
///
/// The contained set is a cache refreshed by `rescan`; moving items does not
/// update it.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupBox {
    /// Background color
    pub background: Color,
    contains: IndexSet<ItemId>,
}

impl Default for GroupBox {
    fn default() -> Self {
        Self {
            background: GROUP_BOX_BACKGROUND,
            contains: IndexSet::new(),
        }
    }
}

impl GroupBox {
    /// Default local bounds of a new group box
    pub const DEFAULT_BOUNDS: Aabb = Aabb {
        min: Vec2::new(-100.0, -100.0),
        max: Vec2::new(100.0, 100.0),
    };

    /// Items found inside at the last rescan
    pub fn containing_items(&self) -> &IndexSet<ItemId> {
        &self.contains
    }

    /// Replace the contained set
    pub fn set_containing_items(&mut self, items: impl IntoIterator<Item = ItemId>) {
        self.contains = items.into_iter().collect();
    }

    /// Add one item to the contained set
    pub fn insert_item(&mut self, id: ItemId) {
        self.contains.insert(id);
    }

    /// Drop one item from the contained set
    pub fn erase_item(&mut self, id: ItemId) {
        self.contains.shift_remove(&id);
    }

    /// Translate contained ids through `idmap` (raw id -> new handle), dropping unmapped ones
    pub fn remap_items(&mut self, idmap: &HashMap<u64, ItemId>) {
        self.contains = self
            .contains
            .iter()
            .filter_map(|id| {
                let mapped = idmap.get(&id.value()).copied();
                if mapped.is_none() {
                    tracing::warn!("group member {} is not in id map", id.value());
                }
                mapped
            })
            .collect();
    }

    /// Recompute the contained set from candidate items and their absolute bounds
    pub fn rescan<'a>(
        &mut self,
        own_id: ItemId,
        bounds: Aabb,
        candidates: impl IntoIterator<Item = (ItemId, &'a Aabb)>,
    ) {
        self.contains = candidates
            .into_iter()
            .filter(|(id, aabb)| *id != own_id && bounds.contains(aabb))
            .map(|(id, _)| id)
            .collect();
    }

    pub(crate) fn write_fields(&self, map: &mut Fields) {
        fields::put(map, "bgcolor", self.background);
        let ids: Vec<u64> = self.contains.iter().map(|id| id.value()).collect();
        fields::put(map, "contains", ids);
    }

    pub(crate) fn read_fields(&mut self, map: &Fields) -> Result<(), SerializeError> {
        let background = fields::req_color(map, "bgcolor")?;
        let contains: Option<Vec<u64>> = fields::opt(map, "contains")?;
        self.background = background;
        if let Some(ids) = contains {
            self.contains = ids.into_iter().map(ItemId::from_value).collect();
        }
        Ok(())
    }
}

/// A resizable block of text
#[derive(Debug, Clone, PartialEq)]
pub struct CommentBox {
    /// Text color
    pub color: Color,
    /// Background color
    pub background: Color,
    /// Comment text
    pub text: String,
}

impl Default for CommentBox {
    fn default() -> Self {
        Self {
            color: COMMENT_COLOR,
            background: COMMENT_BACKGROUND,
            text: "// some comment".to_owned(),
        }
    }
}

impl CommentBox {
    /// Default local bounds of a new comment
    pub const DEFAULT_BOUNDS: Aabb = Aabb {
        min: Vec2::new(-COMMENT_BOX_MARGIN, -COMMENT_BOX_MARGIN),
        max: Vec2::new(COMMENT_BOX_MARGIN, COMMENT_BOX_MARGIN),
    };

    /// Set the text color; the background becomes a dimmed version of it
    pub fn set_color(&mut self, color: Color) {
        self.color = color;
        self.background = color.dimmed();
    }

    pub(crate) fn write_fields(&self, map: &mut Fields) {
        fields::put(map, "color", self.color);
        fields::put(map, "bgcolor", self.background);
        fields::put(map, "text", &self.text);
    }

    pub(crate) fn read_fields(&mut self, map: &Fields) -> Result<(), SerializeError> {
        let color = fields::opt_color(map, "color")?;
        let background = fields::opt_color(map, "bgcolor")?;
        let text: String = fields::req(map, "text")?;
        if let Some(color) = color {
            self.color = color;
        }
        if let Some(background) = background {
            self.background = background;
        }
        self.text = text;
        Ok(())
    }
}

/// A free-standing arrow annotation
#[derive(Debug, Clone, PartialEq)]
pub struct Arrow {
    /// Stroke color
    pub color: Color,
    /// Tail, relative to the item position
    pub start: Vec2,
    /// Tip, relative to the item position
    pub end: Vec2,
    /// Stroke width
    pub thickness: f32,
    /// Size of the arrow head
    pub tip_size: f32,
}

impl Default for Arrow {
    fn default() -> Self {
        Self {
            color: ARROW_DEFAULT_COLOR,
            start: Vec2::ZERO,
            end: Vec2::new(100.0, 0.0),
            thickness: 2.0,
            tip_size: 10.0,
        }
    }
}

impl Arrow {
    /// Local bounds spanned by the two ends
    pub fn local_bounds(&self) -> Aabb {
        Aabb::new(self.start, self.end)
    }

    pub(crate) fn write_fields(&self, map: &mut Fields) {
        fields::put(map, "color", self.color);
        fields::put(map, "start", self.start);
        fields::put(map, "end", self.end);
        fields::put(map, "thickness", self.thickness);
        fields::put(map, "size", self.tip_size);
    }

    pub(crate) fn read_fields(&mut self, map: &Fields) -> Result<(), SerializeError> {
        let color = fields::req_color(map, "color")?;
        let start = map
            .get("start")
            .ok_or(SerializeError::MissingField("start"))
            .and_then(|v| fields::point(v, "start"))?;
        let end = map
            .get("end")
            .ok_or(SerializeError::MissingField("end"))
            .and_then(|v| fields::point(v, "end"))?;
        let thickness: f32 = fields::req(map, "thickness")?;
        let tip_size: f32 = fields::req(map, "size")?;
        *self = Self {
            color,
            start,
            end,
            thickness,
            tip_size,
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_rescan_excludes_self() {
        let mut group = GroupBox::default();
        let own = ItemId::new(0, 1);
        let inside = ItemId::new(1, 1);
        let outside = ItemId::new(2, 1);
        let a = Aabb::centered(5.0, 5.0);
        let b = Aabb::centered(5.0, 5.0).moved(Vec2::new(500.0, 0.0));
        let bounds = GroupBox::DEFAULT_BOUNDS;
        group.rescan(own, bounds, [(own, &bounds), (inside, &a), (outside, &b)]);
        assert_eq!(group.containing_items().len(), 1);
        assert!(group.containing_items().contains(&inside));
    }

    #[test]
    fn test_group_remap() {
        let mut group = GroupBox::default();
        group.set_containing_items([ItemId::new(1, 1), ItemId::new(2, 2)]);
        let idmap = HashMap::from([(ItemId::new(1, 1).value(), ItemId::new(7, 9))]);
        group.remap_items(&idmap);
        assert_eq!(
            group.containing_items().iter().copied().collect::<Vec<_>>(),
            vec![ItemId::new(7, 9)]
        );
    }

    #[test]
    fn test_comment_color_derives_background() {
        let mut comment = CommentBox::default();
        comment.set_color(Color::new(200, 100, 50, 255));
        assert_eq!(comment.background, Color::new(100, 50, 25, 85));
    }

    #[test]
    fn test_arrow_fields_are_required() {
        let mut arrow = Arrow::default();
        let mut map = Fields::new();
        arrow.write_fields(&mut map);
        map.remove("thickness");
        assert!(arrow.read_fields(&map).is_err());
        assert_eq!(arrow, Arrow::default());
    }
}
