// SPDX-License-Identifier: MIT OR Apache-2.0
//! Arena storage for every item of a document.
//!
//! Slots are reused through a free list. Each slot counts how often it has
//! been filled; the tag of a handle is a bijective scramble of that count
//! mixed with a per-pool random salt, so a handle to a released slot never
//! matches the item that reuses it.

use crate::error::PoolError;
use crate::id::{ItemId, Uid};
use crate::item::GraphItem;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
struct Slot {
    generation: u32,
    item: Option<GraphItem>,
}

/// Owns all items and hands out [`ItemId`] handles
#[derive(Debug, Clone)]
pub struct ItemPool {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    uid_map: HashMap<Uid, ItemId>,
    salt: u32,
}

impl Default for ItemPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemPool {
    /// Create an empty pool with a random tag salt
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_list: Vec::new(),
            uid_map: HashMap::new(),
            salt: rand::random(),
        }
    }

    fn tag_for(&self, generation: u32) -> u32 {
        generation.wrapping_mul(0x9E37_79B1) ^ self.salt
    }

    /// Store an item and return its new handle.
    ///
    /// Fails if another live item already holds the same UID.
    pub fn add(&mut self, mut item: GraphItem) -> Result<ItemId, PoolError> {
        if let Some(&existing) = self.uid_map.get(&item.uid) {
            return Err(PoolError::DuplicateUid {
                uid: item.uid,
                existing,
            });
        }
        let index = match self.free_list.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };
        let generation = {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            slot.generation
        };
        let id = ItemId::new(index, self.tag_for(generation));
        item.id = id;
        self.uid_map.insert(item.uid, id);
        self.slots[index as usize].item = Some(item);
        Ok(id)
    }

    fn slot_of(&self, id: ItemId) -> Option<&Slot> {
        if id.is_none() {
            return None;
        }
        let slot = self.slots.get(id.index() as usize)?;
        (self.tag_for(slot.generation) == id.tag()).then_some(slot)
    }

    /// Look up a live item; stale or unknown handles yield `None`
    pub fn get(&self, id: ItemId) -> Option<&GraphItem> {
        self.slot_of(id)?.item.as_ref()
    }

    /// Mutable lookup
    pub fn get_mut(&mut self, id: ItemId) -> Option<&mut GraphItem> {
        self.slot_of(id)?;
        self.slots[id.index() as usize].item.as_mut()
    }

    /// Whether `id` refers to a live item
    pub fn contains(&self, id: ItemId) -> bool {
        self.get(id).is_some()
    }

    /// Remove an item and recycle its slot
    pub fn release(&mut self, id: ItemId) -> Option<GraphItem> {
        self.slot_of(id)?;
        let mut item = self.slots[id.index() as usize].item.take()?;
        self.free_list.push(id.index());
        if self.uid_map.get(&item.uid) == Some(&id) {
            self.uid_map.remove(&item.uid);
        }
        item.id = ItemId::NONE;
        Some(item)
    }

    /// Handle of the live item holding `uid`
    pub fn find_by_uid(&self, uid: &Uid) -> Option<ItemId> {
        self.uid_map.get(uid).copied()
    }

    /// Give the item holding `old` the UID `new`
    pub fn move_uid(&mut self, old: Uid, new: Uid) -> Result<(), PoolError> {
        if old == new {
            return Ok(());
        }
        if let Some(&existing) = self.uid_map.get(&new) {
            return Err(PoolError::DuplicateUid { uid: new, existing });
        }
        let id = self.uid_map.remove(&old).ok_or(PoolError::UnknownUid(old))?;
        self.uid_map.insert(new, id);
        if let Some(item) = self.get_mut(id) {
            item.uid = new;
        }
        Ok(())
    }

    /// Number of live items
    pub fn count(&self) -> usize {
        self.slots.len() - self.free_list.len()
    }

    /// Iterate over live items
    pub fn iter(&self) -> impl Iterator<Item = &GraphItem> {
        self.slots.iter().filter_map(|slot| slot.item.as_ref())
    }
}
