//! Queries: cached archetype filters and typed row iteration.
//!
//! Two layers:
//!
//! - Typed tuple queries (`world.query::<(&Pos, &Vel)>()`) walk the matching
//!   archetypes chunk by chunk and yield `(Entity, (&Pos, &Vel))` per row.
//! - [`QueryDescriptor`] / [`QueryResult`] / [`QueryCache`] express dynamic
//!   required/excluded/optional filters. Matching is a full archetype scan;
//!   callers (typically systems) hold a [`QueryCache`] so repeated queries
//!   reuse the archetype list until the archetype set changes.
//!
//! ## Soundness
//!
//! Read-only queries (`&T`) go through [`World::query`], which takes
//! `&self`. Mutable queries (`&mut T`) go through [`World::query_mut`],
//! which takes `&mut self` -- the exclusive borrow rules out aliasing and
//! makes structural mutation during iteration unrepresentable.

use crate::archetype::ArchetypeId;
use crate::component::{Component, ComponentId, ComponentRegistry};
use crate::entity::Entity;
use crate::mask::ComponentMask;
use crate::world::World;

use std::collections::HashMap;
use std::marker::PhantomData;

// ---------------------------------------------------------------------------
// ComponentSet -- tuples of component types resolving to a mask
// ---------------------------------------------------------------------------

/// A static tuple of component types, resolvable to a [`ComponentMask`].
///
/// Used by `World::count`, `World::has_components`, and descriptor builders.
/// The empty tuple resolves to the empty mask, which every entity satisfies.
pub trait ComponentSet {
    /// The combined mask, or `None` if any member type is unregistered.
    fn mask(registry: &ComponentRegistry) -> Option<ComponentMask>;
}

impl ComponentSet for () {
    fn mask(_registry: &ComponentRegistry) -> Option<ComponentMask> {
        Some(ComponentMask::new())
    }
}

macro_rules! impl_component_set {
    ($($ty:ident),+) => {
        impl<$($ty: Component),+> ComponentSet for ($($ty,)+) {
            fn mask(registry: &ComponentRegistry) -> Option<ComponentMask> {
                let mut mask = ComponentMask::new();
                $(mask.insert(registry.lookup::<$ty>()?);)+
                Some(mask)
            }
        }
    };
}

impl_component_set!(A);
impl_component_set!(A, B);
impl_component_set!(A, B, C);
impl_component_set!(A, B, C, D);

// ---------------------------------------------------------------------------
// QueryItem -- one element of a query tuple
// ---------------------------------------------------------------------------

/// One element of a query fetch: `&T` (read) or `&mut T` (write).
pub trait QueryItem {
    /// The reference type yielded per row.
    type Item<'w>;
    /// Whether this item borrows mutably.
    const MUTABLE: bool;
    /// The component id this item reads or writes.
    fn component_id(registry: &ComponentRegistry) -> Option<ComponentId>;
    /// Fetch one row. The archetype is guaranteed to contain the component.
    fn fetch(world: &World, archetype: ArchetypeId, chunk: u32, row: u32) -> Self::Item<'_>;
}

impl<T: Component> QueryItem for &T {
    type Item<'w> = &'w T;
    const MUTABLE: bool = false;

    fn component_id(registry: &ComponentRegistry) -> Option<ComponentId> {
        registry.lookup::<T>()
    }

    fn fetch(world: &World, archetype: ArchetypeId, chunk: u32, row: u32) -> Self::Item<'_> {
        let id = world.registry().lookup::<T>().expect("component registered");
        unsafe {
            world
                .archetypes()
                .get(archetype)
                .expect("matched archetype exists")
                .get::<T>(id, chunk, row)
                .expect("matched archetype contains the component")
        }
    }
}

// Mutable fetch casts away the shared reference. Sound only because
// `World::query_mut` takes `&mut self`: the iterator holds the world's one
// exclusive borrow, so no other reference can exist while items are alive.
impl<T: Component> QueryItem for &mut T {
    type Item<'w> = &'w mut T;
    const MUTABLE: bool = true;

    fn component_id(registry: &ComponentRegistry) -> Option<ComponentId> {
        registry.lookup::<T>()
    }

    #[allow(invalid_reference_casting)]
    fn fetch(world: &World, archetype: ArchetypeId, chunk: u32, row: u32) -> Self::Item<'_> {
        let id = world.registry().lookup::<T>().expect("component registered");
        unsafe {
            let world = &mut *(world as *const World as *mut World);
            world
                .archetypes_mut()
                .get_mut(archetype)
                .expect("matched archetype exists")
                .get_mut::<T>(id, chunk, row)
                .expect("matched archetype contains the component")
        }
    }
}

// ---------------------------------------------------------------------------
// Query -- a tuple of QueryItems
// ---------------------------------------------------------------------------

/// A tuple of query items: `(&A,)`, `(&mut A, &B)`, ...
pub trait Query {
    /// The per-row output tuple.
    type Item<'w>;
    /// Whether any item borrows mutably.
    const HAS_MUTABLE: bool;
    /// Component ids of every item, or `None` if any type is unregistered.
    fn component_ids(registry: &ComponentRegistry) -> Option<Vec<ComponentId>>;
    /// Panic if the tuple would alias a component mutably.
    fn validate_access(registry: &ComponentRegistry);
    /// Fetch one row.
    fn fetch_row(world: &World, archetype: ArchetypeId, chunk: u32, row: u32) -> Self::Item<'_>;
}

/// Reject `&mut T` + `&mut T` and `&mut T` + `&T` over the same component.
fn validate_no_access_conflicts(items: &[(bool, Option<ComponentId>)]) {
    let mut mutable: Vec<ComponentId> = Vec::new();
    let mut shared: Vec<ComponentId> = Vec::new();
    for &(is_mutable, id) in items {
        let Some(id) = id else { continue };
        if is_mutable {
            assert!(
                !mutable.contains(&id),
                "query requests duplicate mutable access to the same component type"
            );
            assert!(
                !shared.contains(&id),
                "query mixes shared and mutable access to the same component type"
            );
            mutable.push(id);
        } else {
            assert!(
                !mutable.contains(&id),
                "query mixes shared and mutable access to the same component type"
            );
            shared.push(id);
        }
    }
}

macro_rules! impl_query {
    ($($ty:ident),+) => {
        impl<$($ty: QueryItem),+> Query for ($($ty,)+) {
            type Item<'w> = ($($ty::Item<'w>,)+);
            const HAS_MUTABLE: bool = $($ty::MUTABLE)||+;

            fn component_ids(registry: &ComponentRegistry) -> Option<Vec<ComponentId>> {
                Some(vec![$($ty::component_id(registry)?),+])
            }

            fn validate_access(registry: &ComponentRegistry) {
                let items = [$(($ty::MUTABLE, $ty::component_id(registry))),+];
                validate_no_access_conflicts(&items);
            }

            fn fetch_row(
                world: &World,
                archetype: ArchetypeId,
                chunk: u32,
                row: u32,
            ) -> Self::Item<'_> {
                ($($ty::fetch(world, archetype, chunk, row),)+)
            }
        }
    };
}

impl_query!(A);
impl_query!(A, B);
impl_query!(A, B, C);
impl_query!(A, B, C, D);

// ---------------------------------------------------------------------------
// Row cursor over archetypes -> chunks -> rows
// ---------------------------------------------------------------------------

struct RowCursor {
    archetypes: Vec<ArchetypeId>,
    archetype_cursor: usize,
    chunk_cursor: u32,
    row_cursor: u32,
}

impl RowCursor {
    fn new(archetypes: Vec<ArchetypeId>) -> Self {
        Self {
            archetypes,
            archetype_cursor: 0,
            chunk_cursor: 0,
            row_cursor: 0,
        }
    }

    /// Advance to the next occupied row, returning its position and entity.
    fn advance(&mut self, world: &World) -> Option<(ArchetypeId, u32, u32, Entity)> {
        loop {
            let archetype_id = *self.archetypes.get(self.archetype_cursor)?;
            let archetype = world
                .archetypes()
                .get(archetype_id)
                .expect("matched archetype exists");
            let Some(chunk) = archetype.chunks().get(self.chunk_cursor as usize) else {
                self.archetype_cursor += 1;
                self.chunk_cursor = 0;
                self.row_cursor = 0;
                continue;
            };
            if self.row_cursor < chunk.count() {
                let row = self.row_cursor;
                self.row_cursor += 1;
                return Some((archetype_id, self.chunk_cursor, row, chunk.entity(row)));
            }
            self.chunk_cursor += 1;
            self.row_cursor = 0;
        }
    }
}

// ---------------------------------------------------------------------------
// QueryIter / QueryIterMut
// ---------------------------------------------------------------------------

/// Read-only query iterator yielding `(Entity, Q::Item)`.
pub struct QueryIter<'w, Q: Query> {
    world: &'w World,
    cursor: RowCursor,
    _marker: PhantomData<Q>,
}

impl<'w, Q: Query> QueryIter<'w, Q> {
    pub(crate) fn new(world: &'w World, archetypes: Vec<ArchetypeId>) -> Self {
        Self {
            world,
            cursor: RowCursor::new(archetypes),
            _marker: PhantomData,
        }
    }
}

impl<'w, Q: Query> Iterator for QueryIter<'w, Q> {
    type Item = (Entity, Q::Item<'w>);

    fn next(&mut self) -> Option<Self::Item> {
        let (archetype, chunk, row, entity) = self.cursor.advance(self.world)?;
        Some((entity, Q::fetch_row(self.world, archetype, chunk, row)))
    }
}

/// Mutable query iterator yielding `(Entity, Q::Item)`.
///
/// Constructed only from `World::query_mut(&mut self)`; the `'w` lifetime is
/// the world's exclusive borrow, which is what makes the mutable fetches
/// sound.
pub struct QueryIterMut<'w, Q: Query> {
    world: &'w World,
    cursor: RowCursor,
    _marker: PhantomData<Q>,
}

impl<'w, Q: Query> QueryIterMut<'w, Q> {
    pub(crate) fn new(world: &'w World, archetypes: Vec<ArchetypeId>) -> Self {
        Self {
            world,
            cursor: RowCursor::new(archetypes),
            _marker: PhantomData,
        }
    }
}

impl<'w, Q: Query> Iterator for QueryIterMut<'w, Q> {
    type Item = (Entity, Q::Item<'w>);

    fn next(&mut self) -> Option<Self::Item> {
        let (archetype, chunk, row, entity) = self.cursor.advance(self.world)?;
        Some((entity, Q::fetch_row(self.world, archetype, chunk, row)))
    }
}

// ---------------------------------------------------------------------------
// QueryDescriptor
// ---------------------------------------------------------------------------

/// An immutable (required, excluded, optional) filter triple with a
/// precomputed hash for caching.
///
/// The optional mask does not affect matching; it exists so descriptors that
/// fetch different optional sets hash differently in a [`QueryCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryDescriptor {
    required: ComponentMask,
    excluded: ComponentMask,
    optional: ComponentMask,
    hash: u64,
}

impl QueryDescriptor {
    /// Build a descriptor from masks.
    pub fn new(required: ComponentMask, excluded: ComponentMask) -> Self {
        Self::with_optional(required, excluded, ComponentMask::new())
    }

    /// Build a descriptor with an optional mask.
    pub fn with_optional(
        required: ComponentMask,
        excluded: ComponentMask,
        optional: ComponentMask,
    ) -> Self {
        let hash = required.hash_value()
            ^ excluded.hash_value().wrapping_mul(31)
            ^ optional.hash_value().wrapping_mul(127);
        Self {
            required,
            excluded,
            optional,
            hash,
        }
    }

    /// Build a descriptor from component-type tuples.
    ///
    /// Returns `None` if any named type is unregistered.
    pub fn of<R: ComponentSet, X: ComponentSet>(registry: &ComponentRegistry) -> Option<Self> {
        Some(Self::new(R::mask(registry)?, X::mask(registry)?))
    }

    /// The required mask.
    pub fn required(&self) -> &ComponentMask {
        &self.required
    }

    /// The excluded mask.
    pub fn excluded(&self) -> &ComponentMask {
        &self.excluded
    }

    /// The optional mask.
    pub fn optional(&self) -> &ComponentMask {
        &self.optional
    }

    /// The cache key.
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Whether an archetype's signature satisfies this filter.
    pub fn matches(&self, mask: &ComponentMask) -> bool {
        mask.contains_all(&self.required) && !mask.intersects(&self.excluded)
    }
}

// ---------------------------------------------------------------------------
// QueryResult
// ---------------------------------------------------------------------------

/// The archetypes matched by a descriptor at some archetype-set version.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    archetypes: Vec<ArchetypeId>,
}

impl QueryResult {
    pub(crate) fn new(archetypes: Vec<ArchetypeId>) -> Self {
        Self { archetypes }
    }

    /// The matched archetype ids.
    pub fn archetypes(&self) -> &[ArchetypeId] {
        &self.archetypes
    }

    /// Total entities across the matched archetypes.
    pub fn count(&self, world: &World) -> u32 {
        self.archetypes
            .iter()
            .filter_map(|&id| world.archetypes().get(id))
            .map(|archetype| archetype.entity_count())
            .sum()
    }

    /// Whether no matched archetype holds an entity.
    pub fn is_empty(&self, world: &World) -> bool {
        self.count(world) == 0
    }
}

// ---------------------------------------------------------------------------
// QueryCache
// ---------------------------------------------------------------------------

/// Caches descriptor -> [`QueryResult`] resolutions.
///
/// Owned by the caller (typically a system), not by the world. The cache
/// tracks the archetype set's version counter and drops every entry the
/// moment a new archetype appears -- a stale result would silently omit
/// newly created matching archetypes.
#[derive(Debug, Default)]
pub struct QueryCache {
    entries: HashMap<u64, QueryResult>,
    version: u64,
}

impl QueryCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `descriptor` against `world`, reusing the cached archetype
    /// list when the archetype set has not changed.
    pub fn resolve(&mut self, world: &World, descriptor: &QueryDescriptor) -> &QueryResult {
        let current = world.archetypes().version();
        if self.version != current {
            self.entries.clear();
            self.version = current;
        }
        self.entries
            .entry(descriptor.hash())
            .or_insert_with(|| world.matching_archetypes(descriptor))
    }

    /// Number of cached resolutions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ---------------------------------------------------------------------------
// World query methods
// ---------------------------------------------------------------------------

impl World {
    /// Resolve a descriptor with a full archetype scan.
    pub fn matching_archetypes(&self, descriptor: &QueryDescriptor) -> QueryResult {
        QueryResult::new(
            self.archetypes()
                .query(descriptor.required(), descriptor.excluded()),
        )
    }

    /// The combined mask for a component-type tuple.
    pub fn component_mask<S: ComponentSet>(&self) -> Option<ComponentMask> {
        S::mask(self.registry())
    }

    /// Count entities whose signature contains every component in `S`.
    pub fn count<S: ComponentSet>(&self) -> u32 {
        let Some(mask) = S::mask(self.registry()) else {
            return 0;
        };
        self.archetypes()
            .query(&mask, &ComponentMask::new())
            .iter()
            .filter_map(|&id| self.archetypes().get(id))
            .map(|archetype| archetype.entity_count())
            .sum()
    }

    /// Whether the entity has every component in `S`. The empty tuple is
    /// satisfied by any valid entity.
    pub fn has_components<S: ComponentSet>(&self, entity: Entity) -> bool {
        if !self.is_valid(entity) {
            return false;
        }
        let Some(mask) = S::mask(self.registry()) else {
            return false;
        };
        if mask.is_empty() {
            return true;
        }
        let location = self.location(entity);
        location
            .archetype
            .and_then(|id| self.archetypes().get(id))
            .is_some_and(|archetype| archetype.mask().contains_all(&mask))
    }

    /// Run a read-only query.
    ///
    /// # Panics
    ///
    /// Panics if `Q` contains `&mut T` items; use
    /// [`query_mut`](Self::query_mut).
    pub fn query<Q: Query>(&self) -> QueryIter<'_, Q> {
        assert!(
            !Q::HAS_MUTABLE,
            "World::query() cannot fetch mutable items (&mut T); use World::query_mut()"
        );
        QueryIter::new(self, self.query_archetypes::<Q>(None))
    }

    /// Run a query that may fetch `&mut T` items. Takes `&mut self`, which
    /// guarantees exclusive world access for the iterator's lifetime.
    ///
    /// # Panics
    ///
    /// Panics if the tuple aliases a component mutably.
    pub fn query_mut<Q: Query>(&mut self) -> QueryIterMut<'_, Q> {
        Q::validate_access(self.registry());
        QueryIterMut::new(self, self.query_archetypes::<Q>(None))
    }

    /// Read-only query additionally filtered by a descriptor's excluded mask.
    pub fn query_with<Q: Query>(&self, descriptor: &QueryDescriptor) -> QueryIter<'_, Q> {
        assert!(
            !Q::HAS_MUTABLE,
            "World::query_with() cannot fetch mutable items (&mut T); use World::query_with_mut()"
        );
        QueryIter::new(self, self.query_archetypes::<Q>(Some(descriptor)))
    }

    /// Mutable query additionally filtered by a descriptor's excluded mask.
    pub fn query_with_mut<Q: Query>(
        &mut self,
        descriptor: &QueryDescriptor,
    ) -> QueryIterMut<'_, Q> {
        Q::validate_access(self.registry());
        QueryIterMut::new(self, self.query_archetypes::<Q>(Some(descriptor)))
    }

    /// Call `f` once per matching entity with direct references into the
    /// live component columns.
    pub fn each<Q: Query, F>(&mut self, mut f: F)
    where
        F: for<'a> FnMut(Q::Item<'a>),
    {
        for (_entity, item) in self.query_mut::<Q>() {
            f(item);
        }
    }

    /// [`each`](Self::each), additionally passing the entity id.
    pub fn each_with_entity<Q: Query, F>(&mut self, mut f: F)
    where
        F: for<'a> FnMut(Entity, Q::Item<'a>),
    {
        for (entity, item) in self.query_mut::<Q>() {
            f(entity, item);
        }
    }

    /// Archetypes matching `Q`'s required components, intersected with an
    /// optional descriptor filter. `Q`'s own components are always required
    /// so that row fetches cannot miss.
    fn query_archetypes<Q: Query>(&self, descriptor: Option<&QueryDescriptor>) -> Vec<ArchetypeId> {
        let Some(ids) = Q::component_ids(self.registry()) else {
            return Vec::new();
        };
        let mut required = ComponentMask::from_ids(&ids);
        let mut excluded = ComponentMask::new();
        if let Some(descriptor) = descriptor {
            required = required | *descriptor.required();
            excluded = *descriptor.excluded();
        }
        self.archetypes().query(&required, &excluded)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::ComponentBundle;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Pos {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Vel {
        dx: f32,
        dy: f32,
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Frozen;

    fn setup_world() -> World {
        let mut world = World::new();
        world.register_component::<Pos>("pos");
        world.register_component::<Vel>("vel");
        world.register_component::<Frozen>("frozen");
        world
    }

    fn spawn_pos_vel(world: &mut World, x: f32, dx: f32) -> crate::entity::Entity {
        let mut bundle = ComponentBundle::new();
        bundle.add(world.registry(), Pos { x, y: 0.0 });
        bundle.add(world.registry(), Vel { dx, dy: 0.0 });
        world.spawn_bundle(bundle)
    }

    #[test]
    fn query_yields_matching_entities_only() {
        let mut world = setup_world();
        let matching = spawn_pos_vel(&mut world, 1.0, 2.0);
        let _pos_only = world.spawn_with(Pos { x: 9.0, y: 0.0 });

        let results: Vec<_> = world.query::<(&Pos, &Vel)>().collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, matching);
        assert_eq!(results[0].1 .0, &Pos { x: 1.0, y: 0.0 });
    }

    #[test]
    fn query_mut_modifies_through_references() {
        let mut world = setup_world();
        let e = spawn_pos_vel(&mut world, 0.0, 1.5);

        for (_entity, (pos, vel)) in world.query_mut::<(&mut Pos, &Vel)>() {
            pos.x += vel.dx;
        }
        assert_eq!(world.get_component::<Pos>(e), Some(&Pos { x: 1.5, y: 0.0 }));
    }

    #[test]
    fn query_spans_multiple_archetypes() {
        let mut world = setup_world();
        world.spawn_with(Pos::default());
        spawn_pos_vel(&mut world, 1.0, 1.0);

        assert_eq!(world.query::<(&Pos,)>().count(), 2);
        assert_eq!(world.count::<(Pos,)>(), 2);
        assert_eq!(world.count::<(Pos, Vel)>(), 1);
    }

    #[test]
    #[should_panic(expected = "cannot fetch mutable items")]
    fn read_only_query_rejects_mutable_items() {
        let mut world = setup_world();
        world.spawn_with(Pos::default());
        let _ = world.query::<(&mut Pos,)>().count();
    }

    #[test]
    #[should_panic(expected = "duplicate mutable access")]
    fn aliasing_mutable_query_panics() {
        let mut world = setup_world();
        world.spawn_with(Pos::default());
        let _ = world.query_mut::<(&mut Pos, &mut Pos)>().count();
    }

    #[test]
    fn descriptor_excludes_archetypes() {
        let mut world = setup_world();
        spawn_pos_vel(&mut world, 1.0, 1.0);
        let frozen = spawn_pos_vel(&mut world, 2.0, 2.0);
        world.add_component(frozen, Frozen).unwrap();

        let descriptor = QueryDescriptor::of::<(Pos, Vel), (Frozen,)>(world.registry()).unwrap();
        let result = world.matching_archetypes(&descriptor);
        assert_eq!(result.count(&world), 1);

        let entities: Vec<_> = world
            .query_with::<(&Pos,)>(&descriptor)
            .map(|(entity, _)| entity)
            .collect();
        assert_eq!(entities.len(), 1);
        assert_ne!(entities[0], frozen);

        // The mutable variant honours the same filter.
        for (_entity, (pos,)) in world.query_with_mut::<(&mut Pos,)>(&descriptor) {
            pos.x = -1.0;
        }
        assert_eq!(world.get_component::<Pos>(frozen).map(|p| p.x), Some(2.0));
    }

    #[test]
    fn query_cache_invalidates_on_new_archetype() {
        let mut world = setup_world();
        spawn_pos_vel(&mut world, 1.0, 1.0);

        let descriptor = QueryDescriptor::of::<(Pos,), ()>(world.registry()).unwrap();
        let mut cache = QueryCache::new();
        assert_eq!(cache.resolve(&world, &descriptor).count(&world), 1);
        assert_eq!(cache.len(), 1);

        // A new archetype (Pos without Vel) must show up in the next resolve.
        world.spawn_with(Pos::default());
        assert_eq!(cache.resolve(&world, &descriptor).count(&world), 2);
    }

    #[test]
    fn cached_result_reused_when_archetypes_unchanged() {
        let mut world = setup_world();
        spawn_pos_vel(&mut world, 1.0, 1.0);
        let descriptor = QueryDescriptor::of::<(Pos,), ()>(world.registry()).unwrap();
        let mut cache = QueryCache::new();

        cache.resolve(&world, &descriptor);
        let version_before = world.archetypes().version();
        // Spawning into an existing archetype does not invalidate.
        spawn_pos_vel(&mut world, 2.0, 2.0);
        assert_eq!(world.archetypes().version(), version_before);
        assert_eq!(cache.resolve(&world, &descriptor).count(&world), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn each_visits_every_matching_row() {
        let mut world = setup_world();
        for i in 0..10 {
            spawn_pos_vel(&mut world, i as f32, 1.0);
        }
        world.spawn_with(Pos { x: 100.0, y: 0.0 });

        let mut visited = 0;
        world.each::<(&mut Pos, &Vel), _>(|(pos, vel)| {
            pos.x += vel.dx;
            visited += 1;
        });
        assert_eq!(visited, 10);

        let mut entities = Vec::new();
        world.each_with_entity::<(&Pos, &Vel), _>(|entity, _| entities.push(entity));
        assert_eq!(entities.len(), 10);
    }

    #[test]
    fn has_components_with_empty_set() {
        let mut world = setup_world();
        let e = world.spawn();
        assert!(world.has_components::<()>(e));
        assert!(!world.has_components::<(Pos,)>(e));

        world.add_component(e, Pos::default()).unwrap();
        assert!(world.has_components::<(Pos,)>(e));
        assert!(!world.has_components::<(Pos, Vel)>(e));
    }

    #[test]
    fn unregistered_types_match_nothing() {
        #[derive(Debug, Clone, Default)]
        struct Unregistered;

        let world = setup_world();
        assert_eq!(world.count::<(Unregistered,)>(), 0);
        assert_eq!(world.query::<(&Unregistered,)>().count(), 0);
    }

    #[test]
    fn query_iterates_across_chunk_boundaries() {
        let mut world = setup_world();
        // More entities than one 16 KiB chunk of Pos rows can hold.
        let per_chunk = {
            let mut probe = ComponentBundle::new();
            probe.add(world.registry(), Pos::default());
            let e = world.spawn_bundle(probe);
            let id = world.location(e).archetype.unwrap();
            world.archetypes().get(id).unwrap().layout().capacity()
        };
        for i in 1..per_chunk + 10 {
            world.spawn_with(Pos {
                x: i as f32,
                y: 0.0,
            });
        }

        assert_eq!(world.query::<(&Pos,)>().count() as u32, per_chunk + 10);
        let archetype = world
            .archetypes()
            .iter()
            .find(|a| a.entity_count() == per_chunk + 10)
            .unwrap();
        assert!(archetype.chunk_count() >= 2);
    }
}
