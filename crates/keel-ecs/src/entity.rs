//! Entity identifiers and lifecycle management.
//!
//! An [`Entity`] is a 64-bit handle packing a slot index (low 32 bits), a
//! generation counter (next 24 bits), and status flags (high 8 bits). The
//! generation is bumped every time a slot is recycled, so a stale handle is
//! detected in O(1) without ever dereferencing freed storage.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A generational entity identifier.
///
/// Layout: `[flags: 8 | generation: 24 | index: 32]`. Identity is
/// index + generation; two handles with the same index but different
/// generations are distinct, and the older one is permanently invalid.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity(u64);

impl Entity {
    /// Bit width of the index portion.
    pub const INDEX_BITS: u32 = 32;
    /// Bit width of the generation portion.
    pub const GENERATION_BITS: u32 = 24;
    /// Bit width of the flag portion.
    pub const FLAG_BITS: u32 = 8;

    /// Mask for the index portion.
    pub const INDEX_MASK: u64 = (1 << Self::INDEX_BITS) - 1;
    /// Mask for the generation portion (after shifting).
    pub const GENERATION_MASK: u64 = (1 << Self::GENERATION_BITS) - 1;
    /// Mask for the flag portion (after shifting).
    pub const FLAG_MASK: u64 = (1 << Self::FLAG_BITS) - 1;

    const GENERATION_SHIFT: u32 = Self::INDEX_BITS;
    const FLAG_SHIFT: u32 = Self::INDEX_BITS + Self::GENERATION_BITS;

    /// Flag bit: the entity is alive.
    pub const FLAG_ALIVE: u8 = 1 << 0;
    /// Flag bit: the entity is locked and refuses destruction.
    pub const FLAG_LOCKED: u8 = 1 << 1;

    const INVALID: u64 = u64::MAX;

    /// Construct from parts. Generation and flags are truncated to their bit
    /// widths.
    #[inline]
    pub fn new(index: u32, generation: u32, flags: u8) -> Self {
        Self(
            u64::from(index)
                | ((u64::from(generation) & Self::GENERATION_MASK) << Self::GENERATION_SHIFT)
                | ((u64::from(flags) & Self::FLAG_MASK) << Self::FLAG_SHIFT),
        )
    }

    /// The invalid sentinel (all bits set).
    #[inline]
    pub const fn invalid() -> Self {
        Self(Self::INVALID)
    }

    /// The slot index (low 32 bits).
    #[inline]
    pub fn index(self) -> u32 {
        (self.0 & Self::INDEX_MASK) as u32
    }

    /// The generation counter (24 bits).
    #[inline]
    pub fn generation(self) -> u32 {
        ((self.0 >> Self::GENERATION_SHIFT) & Self::GENERATION_MASK) as u32
    }

    /// The flag byte.
    #[inline]
    pub fn flags(self) -> u8 {
        ((self.0 >> Self::FLAG_SHIFT) & Self::FLAG_MASK) as u8
    }

    /// Whether this handle is something other than the invalid sentinel.
    ///
    /// This is a purely structural check; ask the [`EntityManager`] whether
    /// the entity is actually alive.
    #[inline]
    pub fn is_valid(self) -> bool {
        self.0 != Self::INVALID
    }

    /// Raw `u64` representation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// Reconstruct from a raw `u64`.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "Entity({}v{})", self.index(), self.generation())
        } else {
            write!(f, "Entity(invalid)")
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}v{}", self.index(), self.generation())
        } else {
            write!(f, "invalid")
        }
    }
}

// ---------------------------------------------------------------------------
// EntityRecord
// ---------------------------------------------------------------------------

/// Per-slot bookkeeping, indexed by entity index.
///
/// Records are never removed from the backing array; destroyed slots are
/// recycled through the free list with their generation bumped.
#[derive(Debug, Clone, Copy)]
pub struct EntityRecord {
    /// Current generation for this slot.
    pub generation: u32,
    /// Archetype the entity currently lives in, `-1` for none.
    pub archetype_index: i32,
    /// Row within the archetype's storage.
    pub archetype_row: u32,
    /// Status flags (`Entity::FLAG_*`).
    pub flags: u8,
}

impl EntityRecord {
    /// Whether the slot currently holds a live entity.
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.flags & Entity::FLAG_ALIVE != 0
    }

    /// Whether the entity is locked against destruction.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.flags & Entity::FLAG_LOCKED != 0
    }
}

impl Default for EntityRecord {
    fn default() -> Self {
        Self {
            generation: 0,
            archetype_index: -1,
            archetype_row: 0,
            flags: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// EntityManager
// ---------------------------------------------------------------------------

/// Allocates, validates, and recycles [`Entity`] handles.
///
/// All mutation goes through `&mut self`: Rust's exclusive borrow is the
/// single critical section covering the free list and the slot array, so
/// creation and destruction cannot interleave. `is_valid` is a pure read.
///
/// Free indices are recycled FIFO so generation bumps spread across slots
/// instead of concentrating on a hot index.
#[derive(Debug, Default)]
pub struct EntityManager {
    records: Vec<EntityRecord>,
    free_indices: VecDeque<u32>,
    alive_count: u32,
}

impl EntityManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a manager with reserved slot capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut manager = Self::new();
        manager.records.reserve(capacity);
        manager
    }

    /// Allocate a fresh entity in O(1) amortized.
    ///
    /// Recycled slots reuse their stored generation (bumped at destroy
    /// time); fresh slots start at generation 0.
    pub fn create(&mut self) -> Entity {
        let index = if let Some(index) = self.free_indices.pop_front() {
            index
        } else {
            let index = self.records.len() as u32;
            self.records.push(EntityRecord::default());
            index
        };

        let record = &mut self.records[index as usize];
        record.archetype_index = -1;
        record.archetype_row = 0;
        record.flags = Entity::FLAG_ALIVE;
        self.alive_count += 1;

        Entity::new(index, record.generation, Entity::FLAG_ALIVE)
    }

    /// Destroy an entity.
    ///
    /// Validates the handle (index in range, generation match, alive, not
    /// locked); on success marks the slot dead, bumps the generation
    /// (wrapping at 24 bits, which is expected and not an error), and pushes
    /// the index onto the free list. Returns `false` without side effects
    /// otherwise.
    pub fn destroy(&mut self, entity: Entity) -> bool {
        let index = entity.index() as usize;
        let Some(record) = self.records.get_mut(index) else {
            return false;
        };
        if record.generation != entity.generation() || !record.is_alive() || record.is_locked() {
            return false;
        }

        record.flags = 0;
        record.generation = (record.generation + 1) & Entity::GENERATION_MASK as u32;
        record.archetype_index = -1;
        record.archetype_row = 0;
        self.free_indices.push_back(entity.index());
        self.alive_count -= 1;
        true
    }

    /// Whether `entity` refers to a live slot with a matching generation.
    pub fn is_valid(&self, entity: Entity) -> bool {
        if !entity.is_valid() {
            return false;
        }
        match self.records.get(entity.index() as usize) {
            Some(record) => record.generation == entity.generation() && record.is_alive(),
            None => false,
        }
    }

    /// Lock an entity so that `destroy` refuses it.
    ///
    /// Returns `false` for an invalid handle. Locking an already-locked
    /// entity is harmless and returns `true`.
    pub fn lock(&mut self, entity: Entity) -> bool {
        if !self.is_valid(entity) {
            return false;
        }
        let record = &mut self.records[entity.index() as usize];
        if record.is_locked() {
            tracing::debug!(entity = %entity, "lock on already-locked entity");
        }
        record.flags |= Entity::FLAG_LOCKED;
        true
    }

    /// Clear the lock flag. Returns `false` for an invalid handle.
    pub fn unlock(&mut self, entity: Entity) -> bool {
        if !self.is_valid(entity) {
            return false;
        }
        self.records[entity.index() as usize].flags &= !Entity::FLAG_LOCKED;
        true
    }

    /// The record for a valid entity, `None` for a stale handle.
    pub fn record(&self, entity: Entity) -> Option<&EntityRecord> {
        if !self.is_valid(entity) {
            return None;
        }
        self.records.get(entity.index() as usize)
    }

    /// Unvalidated mutable record access for internal bookkeeping.
    pub(crate) fn record_mut(&mut self, index: u32) -> &mut EntityRecord {
        &mut self.records[index as usize]
    }

    /// Number of currently alive entities.
    pub fn alive_count(&self) -> u32 {
        self.alive_count
    }

    /// Total slot capacity (highest index ever allocated + 1).
    pub fn capacity(&self) -> usize {
        self.records.len()
    }

    /// Reserve slot capacity.
    pub fn reserve(&mut self, capacity: usize) {
        self.records.reserve(capacity.saturating_sub(self.records.len()));
    }

    /// Reset the manager, invalidating every outstanding handle.
    pub fn clear(&mut self) {
        self.records.clear();
        self.free_indices.clear();
        self.alive_count = 0;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_packing_roundtrip() {
        let e = Entity::new(42, 7, Entity::FLAG_ALIVE);
        assert_eq!(e.index(), 42);
        assert_eq!(e.generation(), 7);
        assert_eq!(e.flags(), Entity::FLAG_ALIVE);
        assert_eq!(Entity::from_raw(e.to_raw()), e);
        assert!(!Entity::invalid().is_valid());
    }

    #[test]
    fn create_yields_unique_indices() {
        let mut manager = EntityManager::new();
        let entities: Vec<Entity> = (0..100).map(|_| manager.create()).collect();
        let mut indices: Vec<u32> = entities.iter().map(|e| e.index()).collect();
        indices.sort();
        indices.dedup();
        assert_eq!(indices.len(), 100);
        assert_eq!(manager.alive_count(), 100);
    }

    #[test]
    fn generation_increments_on_recycle() {
        let mut manager = EntityManager::new();
        let e0 = manager.create();
        assert_eq!(e0.generation(), 0);
        assert!(manager.destroy(e0));
        let e1 = manager.create();
        assert_eq!(e1.index(), e0.index());
        assert_eq!(e1.generation(), 1);
        assert_ne!(e0, e1);
    }

    #[test]
    fn stale_handles_stay_invalid_forever() {
        let mut manager = EntityManager::new();
        let e = manager.create();
        assert!(manager.is_valid(e));
        assert!(manager.destroy(e));
        assert!(!manager.is_valid(e));
        let _recycled = manager.create();
        assert!(!manager.is_valid(e), "recycling must not revive stale handles");
    }

    #[test]
    fn double_destroy_fails_without_side_effects() {
        let mut manager = EntityManager::new();
        let e = manager.create();
        assert!(manager.destroy(e));
        assert!(!manager.destroy(e));
        assert_eq!(manager.alive_count(), 0);
    }

    #[test]
    fn locked_entities_refuse_destruction() {
        let mut manager = EntityManager::new();
        let e = manager.create();
        assert!(manager.lock(e));
        assert!(!manager.destroy(e));
        assert!(manager.is_valid(e));
        assert!(manager.unlock(e));
        assert!(manager.destroy(e));
    }

    #[test]
    fn lock_invalid_entity_is_reported_not_fatal() {
        let mut manager = EntityManager::new();
        let e = manager.create();
        manager.destroy(e);
        assert!(!manager.lock(e));
        assert!(!manager.unlock(e));
        // Re-locking an already-locked entity is fine.
        let e2 = manager.create();
        assert!(manager.lock(e2));
        assert!(manager.lock(e2));
    }

    #[test]
    fn generation_wraps_at_bit_width() {
        let mut manager = EntityManager::new();
        let e = manager.create();
        manager.destroy(e);
        // Force the free slot to the last representable generation.
        manager.records[e.index() as usize].generation = Entity::GENERATION_MASK as u32;
        let recycled = manager.create();
        assert_eq!(recycled.generation(), Entity::GENERATION_MASK as u32);
        assert!(manager.destroy(recycled));
        assert_eq!(manager.records[e.index() as usize].generation, 0);
    }

    #[test]
    fn free_list_is_fifo() {
        let mut manager = EntityManager::new();
        let a = manager.create();
        let b = manager.create();
        manager.destroy(a);
        manager.destroy(b);
        assert_eq!(manager.create().index(), a.index());
        assert_eq!(manager.create().index(), b.index());
    }

    #[test]
    fn clear_resets_everything() {
        let mut manager = EntityManager::new();
        let e = manager.create();
        manager.clear();
        assert!(!manager.is_valid(e));
        assert_eq!(manager.alive_count(), 0);
        assert_eq!(manager.capacity(), 0);
    }
}
