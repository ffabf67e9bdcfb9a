//! Archetype storage: one container per unique component signature.
//!
//! An [`Archetype`] holds every entity whose component set matches its
//! [`ComponentMask`] exactly, stored across a growable list of fixed-size
//! [`Chunk`]s that all share one [`ChunkLayout`]. The [`Archetypes`] manager
//! creates archetypes lazily, keyed by mask, and answers superset/disjoint
//! filter queries with a plain scan -- archetype counts are bounded by the
//! number of distinct component *combinations* in use, not by entity count.
//! Callers cache scan results keyed on the manager's version counter.

use crate::chunk::{Chunk, ChunkLayout};
use crate::component::{ComponentId, ComponentInfo, ComponentRegistry};
use crate::entity::Entity;
use crate::mask::ComponentMask;

use std::collections::HashMap;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// ArchetypeId
// ---------------------------------------------------------------------------

/// Identifies an archetype within its [`Archetypes`] manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArchetypeId(pub(crate) u32);

impl ArchetypeId {
    /// The id as an array index.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ---------------------------------------------------------------------------
// Archetype
// ---------------------------------------------------------------------------

/// Storage for all entities sharing one exact component signature.
///
/// Invariants:
/// - every chunk shares the same [`ChunkLayout`] (uniform columns),
/// - `entity_count` equals the sum of chunk counts,
/// - at least one chunk is always retained, even when empty, to avoid
///   reinitialization churn; trailing empty chunks beyond the first are shed.
#[derive(Debug)]
pub struct Archetype {
    id: ArchetypeId,
    mask: ComponentMask,
    /// Component metadata, ascending by id. Column `i` stores `infos[i]`.
    infos: Vec<ComponentInfo>,
    layout: Arc<ChunkLayout>,
    chunks: Vec<Chunk>,
    entity_count: u32,
}

impl Archetype {
    /// Build an archetype for `mask` from its resolved component infos
    /// (already sorted ascending by id).
    pub(crate) fn new(id: ArchetypeId, mask: ComponentMask, infos: Vec<ComponentInfo>) -> Self {
        debug_assert!(infos.windows(2).all(|w| w[0].id < w[1].id));
        let layout = Arc::new(ChunkLayout::new(&infos));
        let chunks = vec![Chunk::new(Arc::clone(&layout))];
        tracing::debug!(
            archetype = id.0,
            components = infos.len(),
            chunk_capacity = layout.capacity(),
            "created archetype"
        );
        Self {
            id,
            mask,
            infos,
            layout,
            chunks,
            entity_count: 0,
        }
    }

    /// This archetype's id.
    #[inline]
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    /// The component signature.
    #[inline]
    pub fn mask(&self) -> &ComponentMask {
        &self.mask
    }

    /// Component metadata in column order (ascending id).
    #[inline]
    pub fn infos(&self) -> &[ComponentInfo] {
        &self.infos
    }

    /// The shared chunk layout.
    #[inline]
    pub fn layout(&self) -> &ChunkLayout {
        &self.layout
    }

    /// The chunk list.
    #[inline]
    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Number of chunks.
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Total entities across all chunks.
    #[inline]
    pub fn entity_count(&self) -> u32 {
        self.entity_count
    }

    /// Whether the archetype holds no entities.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entity_count == 0
    }

    /// Whether the signature includes `id`.
    #[inline]
    pub fn has_component(&self, id: ComponentId) -> bool {
        self.mask.contains(id)
    }

    /// Column index for a component id within this archetype's layout.
    #[inline]
    pub fn column_index(&self, id: ComponentId) -> Option<usize> {
        self.infos.binary_search_by_key(&id, |info| info.id).ok()
    }

    /// Allocate a row for `entity`, default-constructing every column slot.
    /// Returns `(chunk index, row index)`.
    pub(crate) fn allocate(&mut self, entity: Entity) -> (u32, u32) {
        let chunk_index = match self.chunks.iter().position(|c| !c.is_full()) {
            Some(index) => index,
            None => {
                self.chunks.push(Chunk::new(Arc::clone(&self.layout)));
                self.chunks.len() - 1
            }
        };
        let row = self.chunks[chunk_index].allocate(entity, &self.infos);
        self.entity_count += 1;
        (chunk_index as u32, row)
    }

    /// Remove the entity at `(chunk, row)`, dropping its components first.
    ///
    /// Returns the entity that was swapped into the freed slot, if any; the
    /// caller must re-point that entity's location record at `(chunk, row)`.
    pub(crate) fn remove(&mut self, chunk: u32, row: u32) -> Option<Entity> {
        self.chunks[chunk as usize].drop_row(row, &self.infos);
        self.remove_raw(chunk, row)
    }

    /// Remove the entity at `(chunk, row)` without running destructors --
    /// migration has already moved out or dropped every column at the row.
    pub(crate) fn remove_raw(&mut self, chunk: u32, row: u32) -> Option<Entity> {
        let moved = self.chunks[chunk as usize].swap_remove_raw(row);
        self.entity_count -= 1;

        // Shed trailing empty chunks, always keeping one. Only trailing
        // chunks can go: removing a mid-list chunk would shift the chunk
        // indices stored in entity location records.
        while self.chunks.len() > 1 && self.chunks.last().is_some_and(Chunk::is_empty) {
            self.chunks.pop();
        }

        moved
    }

    /// Raw pointer to the component `id` at `(chunk, row)`, or `None` if the
    /// signature lacks the component or the position is out of range.
    pub(crate) fn component_ptr(&self, id: ComponentId, chunk: u32, row: u32) -> Option<*mut u8> {
        let column = self.column_index(id)?;
        let chunk = self.chunks.get(chunk as usize)?;
        if row >= chunk.count() {
            return None;
        }
        Some(chunk.component_ptr(column, row))
    }

    /// Raw pointer by column index; bounds are the caller's responsibility
    /// beyond debug assertions.
    pub(crate) fn component_ptr_at(&self, column: usize, chunk: u32, row: u32) -> *mut u8 {
        self.chunks[chunk as usize].component_ptr(column, row)
    }

    /// Drop the component in `column` at `(chunk, row)` in place.
    pub(crate) fn drop_component_at(&mut self, column: usize, chunk: u32, row: u32) {
        if let Some(drop_fn) = self.infos[column].vtable.drop_fn {
            let ptr = self.chunks[chunk as usize].component_ptr(column, row);
            unsafe { drop_fn(ptr) };
        }
    }

    /// Typed reference to a component.
    ///
    /// # Safety
    ///
    /// `T` must be the concrete type registered for `id`.
    pub(crate) unsafe fn get<T: 'static>(
        &self,
        id: ComponentId,
        chunk: u32,
        row: u32,
    ) -> Option<&T> {
        self.component_ptr(id, chunk, row)
            .map(|ptr| &*(ptr as *const T))
    }

    /// Typed mutable reference to a component.
    ///
    /// # Safety
    ///
    /// `T` must be the concrete type registered for `id`.
    pub(crate) unsafe fn get_mut<T: 'static>(
        &mut self,
        id: ComponentId,
        chunk: u32,
        row: u32,
    ) -> Option<&mut T> {
        self.component_ptr(id, chunk, row)
            .map(|ptr| &mut *(ptr as *mut T))
    }

    /// Drop all entities, keeping one (empty) chunk for reuse.
    pub(crate) fn clear(&mut self) {
        for chunk in &mut self.chunks {
            chunk.clear(&self.infos);
        }
        self.chunks.truncate(1);
        self.entity_count = 0;
    }
}

impl Drop for Archetype {
    fn drop(&mut self) {
        // Chunks cannot run component destructors themselves (they hold no
        // ComponentInfo); drop live rows here before the chunks deallocate.
        for chunk in &mut self.chunks {
            chunk.clear(&self.infos);
        }
    }
}

// ---------------------------------------------------------------------------
// Archetypes
// ---------------------------------------------------------------------------

/// Creates and caches [`Archetype`]s keyed by component mask.
#[derive(Debug, Default)]
pub struct Archetypes {
    archetypes: Vec<Archetype>,
    by_mask: HashMap<ComponentMask, ArchetypeId>,
    /// Bumped every time a new archetype is created; query caches compare
    /// against it to detect staleness.
    version: u64,
}

impl Archetypes {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the archetype for `mask`, creating it on first request.
    ///
    /// # Panics
    ///
    /// Panics if `mask` names a component id that was never registered --
    /// a configuration error, since ids only come from registration.
    pub fn get_or_create(
        &mut self,
        mask: ComponentMask,
        registry: &ComponentRegistry,
    ) -> ArchetypeId {
        if let Some(&id) = self.by_mask.get(&mask) {
            return id;
        }

        let infos: Vec<ComponentInfo> = mask
            .iter()
            .map(|cid| {
                registry
                    .info(cid)
                    .unwrap_or_else(|| panic!("component {cid:?} is not registered"))
                    .clone()
            })
            .collect();

        let id = ArchetypeId(self.archetypes.len() as u32);
        self.archetypes.push(Archetype::new(id, mask, infos));
        self.by_mask.insert(mask, id);
        self.version += 1;
        id
    }

    /// Look up the archetype for `mask` without creating it.
    pub fn find(&self, mask: &ComponentMask) -> Option<ArchetypeId> {
        self.by_mask.get(mask).copied()
    }

    /// The archetype with `id`.
    pub fn get(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id.index())
    }

    pub(crate) fn get_mut(&mut self, id: ArchetypeId) -> Option<&mut Archetype> {
        self.archetypes.get_mut(id.index())
    }

    /// Mutable access to two distinct archetypes at once (migration source
    /// and destination).
    pub(crate) fn pair_mut(
        &mut self,
        a: ArchetypeId,
        b: ArchetypeId,
    ) -> (&mut Archetype, &mut Archetype) {
        assert_ne!(a.0, b.0, "pair_mut requires distinct archetypes");
        let (ai, bi) = (a.index(), b.index());
        if ai < bi {
            let (left, right) = self.archetypes.split_at_mut(bi);
            (&mut left[ai], &mut right[0])
        } else {
            let (left, right) = self.archetypes.split_at_mut(ai);
            (&mut right[0], &mut left[bi])
        }
    }

    /// All archetypes whose mask is a superset of `required` and disjoint
    /// from `excluded`. Scans every archetype; cache the result keyed on
    /// [`version`](Self::version).
    pub fn query(&self, required: &ComponentMask, excluded: &ComponentMask) -> Vec<ArchetypeId> {
        self.archetypes
            .iter()
            .filter(|arch| arch.mask.contains_all(required) && !arch.mask.intersects(excluded))
            .map(|arch| arch.id)
            .collect()
    }

    /// Iterate all archetypes.
    pub fn iter(&self) -> impl Iterator<Item = &Archetype> {
        self.archetypes.iter()
    }

    /// Number of archetypes.
    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    /// Whether no archetypes exist.
    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }

    /// Monotonic counter advanced whenever the archetype set grows.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Destroy all archetypes. The version advances so cached query results
    /// cannot survive a world clear.
    pub(crate) fn clear(&mut self) {
        self.archetypes.clear();
        self.by_mask.clear();
        self.version += 1;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    struct Pos {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Copy, Default, PartialEq)]
    struct Vel {
        dx: f32,
        dy: f32,
    }

    fn setup() -> (ComponentRegistry, ComponentId, ComponentId) {
        let mut registry = ComponentRegistry::new();
        let pos = registry.register::<Pos>("pos");
        let vel = registry.register::<Vel>("vel");
        (registry, pos, vel)
    }

    fn entity(index: u32) -> Entity {
        Entity::new(index, 0, Entity::FLAG_ALIVE)
    }

    #[test]
    fn get_or_create_caches_by_mask() {
        let (registry, pos, vel) = setup();
        let mut archetypes = Archetypes::new();

        let mask = ComponentMask::from_ids(&[pos, vel]);
        let a = archetypes.get_or_create(mask, &registry);
        let b = archetypes.get_or_create(mask, &registry);
        assert_eq!(a, b);
        assert_eq!(archetypes.len(), 1);
        assert_eq!(archetypes.version(), 1);

        let other = archetypes.get_or_create(ComponentMask::from_ids(&[pos]), &registry);
        assert_ne!(a, other);
        assert_eq!(archetypes.version(), 2);
    }

    #[test]
    fn allocate_and_access_components() {
        let (registry, pos, vel) = setup();
        let mut archetypes = Archetypes::new();
        let id = archetypes.get_or_create(ComponentMask::from_ids(&[pos, vel]), &registry);

        let arch = archetypes.get_mut(id).unwrap();
        let (chunk, row) = arch.allocate(entity(0));
        assert_eq!((chunk, row), (0, 0));
        assert_eq!(arch.entity_count(), 1);

        unsafe {
            *arch.get_mut::<Pos>(pos, chunk, row).unwrap() = Pos { x: 1.0, y: 2.0 };
            assert_eq!(arch.get::<Pos>(pos, chunk, row), Some(&Pos { x: 1.0, y: 2.0 }));
            // Velocity slot was default-constructed.
            assert_eq!(arch.get::<Vel>(vel, chunk, row), Some(&Vel::default()));
        }
    }

    #[test]
    fn swap_remove_reports_moved_entity() {
        let (registry, pos, _) = setup();
        let mut archetypes = Archetypes::new();
        let id = archetypes.get_or_create(ComponentMask::from_ids(&[pos]), &registry);
        let arch = archetypes.get_mut(id).unwrap();

        for i in 0..3 {
            let (chunk, row) = arch.allocate(entity(i));
            unsafe {
                *arch.get_mut::<Pos>(pos, chunk, row).unwrap() = Pos {
                    x: i as f32,
                    y: 0.0,
                };
            }
        }

        let moved = arch.remove(0, 0);
        assert_eq!(moved, Some(entity(2)));
        assert_eq!(arch.entity_count(), 2);
        unsafe {
            assert_eq!(arch.get::<Pos>(pos, 0, 0), Some(&Pos { x: 2.0, y: 0.0 }));
        }
    }

    #[test]
    fn grows_chunks_and_sheds_trailing_empties() {
        let (registry, pos, _) = setup();
        let mut archetypes = Archetypes::new();
        let id = archetypes.get_or_create(ComponentMask::from_ids(&[pos]), &registry);
        let arch = archetypes.get_mut(id).unwrap();

        let per_chunk = arch.layout().capacity();
        let total = per_chunk + 1;
        for i in 0..total {
            arch.allocate(entity(i));
        }
        assert_eq!(arch.chunk_count(), 2);
        assert_eq!(arch.entity_count(), total);

        // Chunk invariant: uniform layout, counts sum to entity_count.
        let summed: u32 = arch.chunks().iter().map(Chunk::count).sum();
        assert_eq!(summed, arch.entity_count());

        // Removing the overflow entity empties the trailing chunk, which is
        // shed; the first chunk is always retained.
        arch.remove(1, 0);
        assert_eq!(arch.chunk_count(), 1);
        for _ in 0..per_chunk {
            arch.remove(0, 0);
        }
        assert_eq!(arch.chunk_count(), 1);
        assert!(arch.is_empty());
    }

    #[test]
    fn query_filters_supersets_and_exclusions() {
        let (registry, pos, vel) = setup();
        let mut archetypes = Archetypes::new();
        let pos_only = archetypes.get_or_create(ComponentMask::from_ids(&[pos]), &registry);
        let pos_vel = archetypes.get_or_create(ComponentMask::from_ids(&[pos, vel]), &registry);

        let required = ComponentMask::from_ids(&[pos]);
        let none = ComponentMask::new();
        let matched = archetypes.query(&required, &none);
        assert_eq!(matched, vec![pos_only, pos_vel]);

        let excluded = ComponentMask::from_ids(&[vel]);
        let matched = archetypes.query(&required, &excluded);
        assert_eq!(matched, vec![pos_only]);
    }

    #[test]
    #[should_panic(expected = "is not registered")]
    fn unregistered_component_in_mask_is_fatal() {
        let registry = ComponentRegistry::new();
        let mut archetypes = Archetypes::new();
        let mask = ComponentMask::from_ids(&[ComponentId(5)]);
        archetypes.get_or_create(mask, &registry);
    }
}
