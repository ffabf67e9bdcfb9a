//! Keel ECS -- archetype-based entity-component storage and scheduling core.
//!
//! Entities are grouped by component signature into archetypes, each stored
//! as a list of fixed-size Structure-of-Arrays chunks for cache-friendly
//! column iteration. Generational entity ids make stale handles detectable
//! in O(1), and a dependency-ordered scheduler executes per-tick systems in
//! deterministic order.
//!
//! # Quick Start
//!
//! ```
//! use keel_ecs::prelude::*;
//!
//! #[derive(Debug, Clone, Default, PartialEq)]
//! struct Position { x: f32, y: f32 }
//!
//! #[derive(Debug, Clone, Default, PartialEq)]
//! struct Velocity { dx: f32, dy: f32 }
//!
//! let mut world = World::new();
//! world.register_component::<Position>("position");
//! world.register_component::<Velocity>("velocity");
//!
//! let entity = world.spawn();
//! world.add_component(entity, Position { x: 1.0, y: 0.0 }).unwrap();
//! world.add_component(entity, Velocity { dx: 0.5, dy: 0.0 }).unwrap();
//!
//! for (_entity, (pos, vel)) in world.query_mut::<(&mut Position, &Velocity)>() {
//!     pos.x += vel.dx;
//!     pos.y += vel.dy;
//! }
//!
//! assert_eq!(world.get_component::<Position>(entity), Some(&Position { x: 1.5, y: 0.0 }));
//! assert_eq!(world.count::<(Position, Velocity)>(), 1);
//! ```

#![deny(unsafe_code)]

#[allow(unsafe_code)]
pub mod archetype;
#[allow(unsafe_code)]
pub mod chunk;
#[allow(unsafe_code)]
pub mod component;
pub mod entity;
pub mod mask;
#[allow(unsafe_code)]
pub mod query;
pub mod schedule;
#[allow(unsafe_code)]
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by ECS operations.
///
/// Everything here is recoverable; fatal configuration errors (component
/// ceiling, oversized component signatures) panic at registration or
/// archetype creation instead.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// The entity handle is stale (destroyed, recycled, or never created).
    #[error("entity {0} is stale or was never created")]
    StaleEntity(entity::Entity),

    /// The entity is locked and refuses destruction.
    #[error("entity {0} is locked and cannot be destroyed")]
    EntityLocked(entity::Entity),

    /// A component type was used before being registered.
    #[error("component type '{0}' is not registered")]
    UnknownComponent(String),

    /// Systems in one phase form a dependency cycle. Execution proceeded in
    /// the documented fallback order (declaration order for the unresolved
    /// systems), but the ordering is not the requested one.
    #[error("dependency cycle among systems in phase {phase:?}: {systems:?}")]
    DependencyCycle {
        /// The phase whose sort failed.
        phase: schedule::Phase,
        /// Names of the systems that could not be ordered.
        systems: Vec<String>,
    },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::archetype::{Archetype, ArchetypeId, Archetypes};
    pub use crate::component::{
        Component, ComponentId, ComponentInfo, ComponentRegistry, MAX_COMPONENT_TYPES,
    };
    pub use crate::entity::{Entity, EntityManager, EntityRecord};
    pub use crate::mask::ComponentMask;
    pub use crate::query::{
        ComponentSet, Query, QueryCache, QueryDescriptor, QueryItem, QueryIter, QueryIterMut,
        QueryResult,
    };
    pub use crate::schedule::{FnSystem, Phase, Scheduler, System, SystemContext};
    pub use crate::world::{ComponentBundle, World};
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Integration tests
// ---------------------------------------------------------------------------
