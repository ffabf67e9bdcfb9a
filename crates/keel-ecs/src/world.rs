//! The [`World`]: top-level container binding entity lifecycle, component
//! storage, and frame bookkeeping.
//!
//! The world owns the [`EntityManager`], the [`ComponentRegistry`], all
//! archetype storage, and the per-entity location table. Structural changes
//! (adding/removing components, destroying entities) flow through `&mut
//! World`, which is what makes concurrent mutation-during-iteration
//! impossible to express: query iterators borrow the world for their whole
//! lifetime.

use crate::archetype::{ArchetypeId, Archetypes};
use crate::component::{Component, ComponentId, ComponentRegistry};
use crate::entity::{Entity, EntityManager};
use crate::mask::ComponentMask;
use crate::EcsError;

use std::ptr;

// ---------------------------------------------------------------------------
// EntityLocation
// ---------------------------------------------------------------------------

/// Where an entity's row physically lives. Slot-indexed, parallel to the
/// entity manager's record array. `archetype == None` for a live entity that
/// currently owns zero components.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct EntityLocation {
    pub archetype: Option<ArchetypeId>,
    pub chunk: u32,
    pub row: u32,
}

// ---------------------------------------------------------------------------
// ComponentBundle
// ---------------------------------------------------------------------------

/// A set of component values to install on a freshly spawned entity.
///
/// Spawning through a bundle lands the entity directly in its destination
/// archetype, avoiding one migration per component.
///
/// ```ignore
/// let mut bundle = ComponentBundle::new();
/// bundle.add(world.registry(), Position { x: 0.0, y: 0.0, z: 0.0 });
/// bundle.add(world.registry(), Velocity::default());
/// let entity = world.spawn_bundle(bundle);
/// ```
#[derive(Default)]
pub struct ComponentBundle {
    entries: Vec<BundleEntry>,
}

/// One pending component value: its id plus a writer that installs the value
/// into a default-constructed column slot.
pub(crate) struct BundleEntry {
    pub(crate) id: ComponentId,
    pub(crate) write: Box<dyn FnOnce(*mut u8)>,
}

impl BundleEntry {
    pub(crate) fn new<T: Component>(id: ComponentId, value: T) -> Self {
        Self {
            id,
            write: Box::new(move |dst: *mut u8| {
                // The destination slot holds a default-constructed T; replace
                // it without leaking.
                let dst = dst as *mut T;
                unsafe {
                    ptr::drop_in_place(dst);
                    ptr::write(dst, value);
                }
            }),
        }
    }
}

impl ComponentBundle {
    /// An empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a component value. The type must already be registered.
    ///
    /// # Panics
    ///
    /// Panics if `T` is not registered or appears twice in the bundle.
    pub fn add<T: Component>(&mut self, registry: &ComponentRegistry, value: T) {
        let id = registry.lookup::<T>().unwrap_or_else(|| {
            panic!(
                "component type {} is not registered; call register_component first",
                std::any::type_name::<T>()
            )
        });
        assert!(
            !self.entries.iter().any(|entry| entry.id == id),
            "duplicate component type {id:?} in bundle"
        );
        self.entries.push(BundleEntry::new(id, value));
    }

    /// Number of components in the bundle.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the bundle holds no components.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn mask(&self) -> ComponentMask {
        let mut mask = ComponentMask::new();
        for entry in &self.entries {
            mask.insert(entry.id);
        }
        mask
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// The central ECS container.
pub struct World {
    entities: EntityManager,
    registry: ComponentRegistry,
    archetypes: Archetypes,
    /// Slot-indexed location table; the authoritative entity -> storage map.
    locations: Vec<EntityLocation>,
    /// FIFO queue of entities awaiting deferred destruction at `end_frame`.
    pending_destroy: Vec<Entity>,
    frame_count: u64,
    delta_time: f32,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entities", &self.entities.alive_count())
            .field("archetypes", &self.archetypes.len())
            .field("frame", &self.frame_count)
            .finish()
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Create an empty world with its own component registry.
    pub fn new() -> Self {
        Self::with_registry(ComponentRegistry::new())
    }

    /// Create a world around an externally constructed registry (e.g. one
    /// pre-populated with engine component types).
    pub fn with_registry(registry: ComponentRegistry) -> Self {
        Self {
            entities: EntityManager::new(),
            registry,
            archetypes: Archetypes::new(),
            locations: Vec::new(),
            pending_destroy: Vec::new(),
            frame_count: 0,
            delta_time: 0.0,
        }
    }

    /// Register a component type. Idempotent per type.
    pub fn register_component<T: Component>(&mut self, name: &str) -> ComponentId {
        self.registry.register::<T>(name)
    }

    /// Read-only access to the component registry.
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Read-only access to archetype storage.
    pub fn archetypes(&self) -> &Archetypes {
        &self.archetypes
    }

    pub(crate) fn archetypes_mut(&mut self) -> &mut Archetypes {
        &mut self.archetypes
    }

    // -- entity lifecycle ---------------------------------------------------

    /// Create an entity with no components.
    pub fn spawn(&mut self) -> Entity {
        let entity = self.entities.create();
        self.ensure_location_capacity(entity.index());
        self.locations[entity.index() as usize] = EntityLocation::default();
        entity
    }

    /// Create an entity and install every component in `bundle`, landing
    /// directly in the destination archetype.
    pub fn spawn_bundle(&mut self, bundle: ComponentBundle) -> Entity {
        let entity = self.spawn();
        if bundle.is_empty() {
            return entity;
        }

        let mask = bundle.mask();
        let archetype_id = self.archetypes.get_or_create(mask, &self.registry);
        let archetype = self
            .archetypes
            .get_mut(archetype_id)
            .expect("archetype just created");
        let (chunk, row) = archetype.allocate(entity);
        for entry in bundle.entries {
            let ptr = archetype
                .component_ptr(entry.id, chunk, row)
                .expect("bundle component is part of the destination signature");
            (entry.write)(ptr);
        }

        self.set_location(entity, archetype_id, chunk, row);
        entity
    }

    /// Create an entity with a single component.
    pub fn spawn_with<T: Component>(&mut self, value: T) -> Entity {
        let mut bundle = ComponentBundle::new();
        bundle.add(&self.registry, value);
        self.spawn_bundle(bundle)
    }

    /// Destroy an entity immediately, removing it from archetype storage.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`] for an invalid handle,
    /// [`EcsError::EntityLocked`] for a locked entity; neither has side
    /// effects.
    pub fn destroy_entity(&mut self, entity: Entity) -> Result<(), EcsError> {
        if !self.entities.is_valid(entity) {
            return Err(EcsError::StaleEntity(entity));
        }
        if self
            .entities
            .record(entity)
            .is_some_and(|record| record.is_locked())
        {
            return Err(EcsError::EntityLocked(entity));
        }

        let location = self.locations[entity.index() as usize];
        if let Some(archetype_id) = location.archetype {
            let moved = self
                .archetypes
                .get_mut(archetype_id)
                .expect("location points at a live archetype")
                .remove(location.chunk, location.row);
            self.fix_moved_entity(moved, location);
        }

        self.locations[entity.index() as usize] = EntityLocation::default();
        self.entities.destroy(entity);
        Ok(())
    }

    /// Queue an entity for destruction at the next [`end_frame`](Self::end_frame).
    ///
    /// Queuing the same entity twice is a no-op. The queue drains in FIFO
    /// order.
    ///
    /// # Errors
    ///
    /// [`EcsError::StaleEntity`] for an invalid handle.
    pub fn destroy_entity_deferred(&mut self, entity: Entity) -> Result<(), EcsError> {
        if !self.entities.is_valid(entity) {
            return Err(EcsError::StaleEntity(entity));
        }
        if self.pending_destroy.contains(&entity) {
            tracing::debug!(entity = %entity, "entity already queued for destruction");
            return Ok(());
        }
        self.pending_destroy.push(entity);
        Ok(())
    }

    /// Whether `entity` is a live, current-generation handle.
    pub fn is_valid(&self, entity: Entity) -> bool {
        self.entities.is_valid(entity)
    }

    /// Lock an entity so destruction requests are refused.
    pub fn lock_entity(&mut self, entity: Entity) -> bool {
        self.entities.lock(entity)
    }

    /// Release an entity's destruction lock.
    pub fn unlock_entity(&mut self, entity: Entity) -> bool {
        self.entities.unlock(entity)
    }

    /// Number of alive entities.
    pub fn entity_count(&self) -> u32 {
        self.entities.alive_count()
    }

    /// Read-only access to the entity manager.
    pub fn entities(&self) -> &EntityManager {
        &self.entities
    }

    // -- component access ---------------------------------------------------

    /// Add (or overwrite) a component on an entity.
    ///
    /// If the entity's archetype already has `T`, the value is overwritten in
    /// place with no migration. Otherwise the entity migrates to the
    /// archetype for its current signature plus `T`, preserving every
    /// existing component's data.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownComponent`] if `T` was never registered,
    /// [`EcsError::StaleEntity`] for an invalid handle.
    pub fn add_component<T: Component>(
        &mut self,
        entity: Entity,
        value: T,
    ) -> Result<(), EcsError> {
        let id = self
            .registry
            .lookup::<T>()
            .ok_or_else(|| EcsError::UnknownComponent(std::any::type_name::<T>().to_owned()))?;
        if !self.entities.is_valid(entity) {
            return Err(EcsError::StaleEntity(entity));
        }

        let location = self.locations[entity.index() as usize];
        let new_mask = match location.archetype {
            Some(archetype_id) => {
                let archetype = self
                    .archetypes
                    .get_mut(archetype_id)
                    .expect("location points at a live archetype");
                if archetype.has_component(id) {
                    // In-place overwrite, no migration.
                    let slot = unsafe { archetype.get_mut::<T>(id, location.chunk, location.row) }
                        .expect("signature contains the component");
                    *slot = value;
                    return Ok(());
                }
                let mut mask = *archetype.mask();
                mask.insert(id);
                mask
            }
            None => ComponentMask::from_ids(&[id]),
        };

        self.migrate(entity, new_mask, Some(BundleEntry::new(id, value)));
        Ok(())
    }

    /// Remove a component from an entity.
    ///
    /// Removing a component the entity does not have is a no-op. When the
    /// resulting signature is empty, the entity is evicted from archetype
    /// storage entirely (its location records "no archetype") rather than
    /// migrating to a degenerate empty-signature archetype.
    ///
    /// # Errors
    ///
    /// [`EcsError::UnknownComponent`] if `T` was never registered,
    /// [`EcsError::StaleEntity`] for an invalid handle.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Result<(), EcsError> {
        let id = self
            .registry
            .lookup::<T>()
            .ok_or_else(|| EcsError::UnknownComponent(std::any::type_name::<T>().to_owned()))?;
        if !self.entities.is_valid(entity) {
            return Err(EcsError::StaleEntity(entity));
        }

        let location = self.locations[entity.index() as usize];
        let Some(archetype_id) = location.archetype else {
            return Ok(());
        };
        let archetype = self
            .archetypes
            .get(archetype_id)
            .expect("location points at a live archetype");
        if !archetype.has_component(id) {
            return Ok(());
        }

        let mut new_mask = *archetype.mask();
        new_mask.remove(id);

        if new_mask.is_empty() {
            // Last component removed: evict from storage entirely.
            let moved = self
                .archetypes
                .get_mut(archetype_id)
                .expect("location points at a live archetype")
                .remove(location.chunk, location.row);
            self.fix_moved_entity(moved, location);
            self.locations[entity.index() as usize] = EntityLocation::default();
            let record = self.entities.record_mut(entity.index());
            record.archetype_index = -1;
            record.archetype_row = 0;
        } else {
            self.migrate(entity, new_mask, None);
        }
        Ok(())
    }

    /// Shared reference to an entity's component.
    pub fn get_component<T: Component>(&self, entity: Entity) -> Option<&T> {
        if !self.entities.is_valid(entity) {
            return None;
        }
        let location = self.locations[entity.index() as usize];
        let archetype_id = location.archetype?;
        let id = self.registry.lookup::<T>()?;
        let archetype = self.archetypes.get(archetype_id)?;
        unsafe { archetype.get::<T>(id, location.chunk, location.row) }
    }

    /// Mutable reference to an entity's component.
    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        if !self.entities.is_valid(entity) {
            return None;
        }
        let location = self.locations[entity.index() as usize];
        let archetype_id = location.archetype?;
        let id = self.registry.lookup::<T>()?;
        let archetype = self.archetypes.get_mut(archetype_id)?;
        unsafe { archetype.get_mut::<T>(id, location.chunk, location.row) }
    }

    /// Whether the entity currently has component `T`.
    pub fn has_component<T: Component>(&self, entity: Entity) -> bool {
        if !self.entities.is_valid(entity) {
            return false;
        }
        let Some(id) = self.registry.lookup::<T>() else {
            return false;
        };
        let location = self.locations[entity.index() as usize];
        location
            .archetype
            .and_then(|archetype_id| self.archetypes.get(archetype_id))
            .is_some_and(|archetype| archetype.has_component(id))
    }

    // -- frame management ---------------------------------------------------

    /// Begin a new frame. Must be called exactly once per tick, before any
    /// system execution, paired with [`end_frame`](Self::end_frame).
    pub fn begin_frame(&mut self, delta_time: f32) {
        self.delta_time = delta_time;
        self.frame_count += 1;
    }

    /// End the current frame, draining the deferred-destruction queue in
    /// FIFO order. Entities already destroyed (or since locked) are skipped.
    pub fn end_frame(&mut self) {
        let pending = std::mem::take(&mut self.pending_destroy);
        for entity in pending {
            if let Err(err) = self.destroy_entity(entity) {
                tracing::debug!(entity = %entity, %err, "skipped deferred destruction");
            }
        }
    }

    /// Delta time of the current frame, in seconds.
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Number of frames begun so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    // -- utility ------------------------------------------------------------

    /// Destroy every entity and archetype, resetting the world. Registered
    /// component types survive.
    pub fn clear(&mut self) {
        tracing::debug!(
            entities = self.entities.alive_count(),
            archetypes = self.archetypes.len(),
            "clearing world"
        );
        self.archetypes.clear();
        self.entities.clear();
        self.locations.clear();
        self.pending_destroy.clear();
        self.frame_count = 0;
        self.delta_time = 0.0;
    }

    /// Reserve capacity for `capacity` entities.
    pub fn reserve(&mut self, capacity: usize) {
        self.entities.reserve(capacity);
        self.locations
            .reserve(capacity.saturating_sub(self.locations.len()));
    }

    // -- internals ----------------------------------------------------------

    fn ensure_location_capacity(&mut self, index: u32) {
        let needed = index as usize + 1;
        if self.locations.len() < needed {
            self.locations.resize_with(needed, EntityLocation::default);
        }
    }

    pub(crate) fn location(&self, entity: Entity) -> EntityLocation {
        self.locations[entity.index() as usize]
    }

    fn set_location(&mut self, entity: Entity, archetype_id: ArchetypeId, chunk: u32, row: u32) {
        self.locations[entity.index() as usize] = EntityLocation {
            archetype: Some(archetype_id),
            chunk,
            row,
        };
        let record = self.entities.record_mut(entity.index());
        record.archetype_index = archetype_id.index() as i32;
        record.archetype_row = row;
    }

    /// Re-point the entity that a swap-remove moved into the freed slot.
    fn fix_moved_entity(&mut self, moved: Option<Entity>, slot: EntityLocation) {
        if let Some(moved) = moved {
            let location = &mut self.locations[moved.index() as usize];
            location.chunk = slot.chunk;
            location.row = slot.row;
            self.entities.record_mut(moved.index()).archetype_row = slot.row;
        }
    }

    /// Move `entity` into the archetype for `new_mask`.
    ///
    /// Allocates the destination row first (default-constructed), then for
    /// every component the entity holds: if the destination signature also
    /// has it, the destination slot is destructed and the source bytes are
    /// moved in (a plain byte copy transfers ownership); otherwise the source
    /// slot is destructed in place. The old row is then raw-removed -- no
    /// destructors, every column was already moved out or dropped -- and the
    /// entity swapped into the hole has its location re-pointed. `write_new`
    /// finally installs the value for a component that is new in the
    /// destination.
    fn migrate(&mut self, entity: Entity, new_mask: ComponentMask, write_new: Option<BundleEntry>) {
        let old_location = self.locations[entity.index() as usize];
        let destination_id = self.archetypes.get_or_create(new_mask, &self.registry);
        let (dst_chunk, dst_row) = self
            .archetypes
            .get_mut(destination_id)
            .expect("destination archetype exists")
            .allocate(entity);

        if let Some(source_id) = old_location.archetype {
            let (source, destination) = self.archetypes.pair_mut(source_id, destination_id);

            for column in 0..source.infos().len() {
                let (component_id, size, drop_fn) = {
                    let info = &source.infos()[column];
                    (info.id, info.size, info.vtable.drop_fn)
                };
                let src = source.component_ptr_at(column, old_location.chunk, old_location.row);
                match destination.column_index(component_id) {
                    Some(dst_column) => unsafe {
                        let dst = destination.component_ptr_at(dst_column, dst_chunk, dst_row);
                        // The destination slot holds a default-constructed
                        // placeholder; destruct it before moving bytes in so
                        // resource-owning components cannot leak.
                        if let Some(drop_fn) = drop_fn {
                            drop_fn(dst);
                        }
                        if size > 0 {
                            ptr::copy_nonoverlapping(src, dst, size);
                        }
                    },
                    None => {
                        // Not part of the destination signature: destruct at
                        // the source.
                        source.drop_component_at(column, old_location.chunk, old_location.row);
                    }
                }
            }

            let moved = source.remove_raw(old_location.chunk, old_location.row);
            self.fix_moved_entity(moved, old_location);
        }

        if let Some(entry) = write_new {
            let destination = self
                .archetypes
                .get_mut(destination_id)
                .expect("destination archetype exists");
            let ptr = destination
                .component_ptr(entry.id, dst_chunk, dst_row)
                .expect("new component is part of the destination signature");
            (entry.write)(ptr);
        }

        self.set_location(entity, destination_id, dst_chunk, dst_row);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
