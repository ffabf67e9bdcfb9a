//! Component type registration and type-erased metadata.
//!
//! Every component type must be registered in a [`ComponentRegistry`] before
//! it can be attached to an entity. Registration assigns a sequential
//! [`ComponentId`] and captures everything the storage layer needs to handle
//! the type without compile-time knowledge of it: size, alignment, a stable
//! type hash, and a [`ComponentVtable`] of erased construct/drop/clone
//! functions.
//!
//! The registry is an owned, constructed object (typically owned by a
//! `World`), not process-global state. Two independent worlds get independent
//! id spaces, which keeps tests hermetic.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::mem;
use std::ptr;

/// Hard ceiling on the number of distinct component types per registry.
///
/// This bounds the size of [`ComponentMask`](crate::mask::ComponentMask);
/// exceeding it is a fatal configuration error caught at registration time.
pub const MAX_COMPONENT_TYPES: usize = 256;

// ---------------------------------------------------------------------------
// ComponentId
// ---------------------------------------------------------------------------

/// Opaque, lightweight identifier for a registered component type.
///
/// Ids are assigned sequentially from 0 and never reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub(crate) u32);

impl ComponentId {
    /// The id as a bit/array index.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Reconstruct an id from an index (masks and tests use this).
    #[inline]
    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u32)
    }
}

impl fmt::Debug for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// Component trait
// ---------------------------------------------------------------------------

/// Marker for types usable as components.
///
/// `Default` is required because archetype storage default-constructs every
/// column slot when a row is allocated; migration then overwrites the slots
/// that receive moved data.
pub trait Component: Clone + Default + Send + Sync + 'static {}

impl<T: Clone + Default + Send + Sync + 'static> Component for T {}

// ---------------------------------------------------------------------------
// ComponentVtable
// ---------------------------------------------------------------------------

/// Type-erased operations for one component type.
///
/// Captured once at registration via monomorphization; the function pointers
/// hold no state. `drop_fn` is `None` for types without drop glue, which lets
/// the storage layer skip destructor calls entirely for plain-data
/// components.
#[derive(Clone)]
pub struct ComponentVtable {
    /// Write `T::default()` into uninitialized, properly aligned memory.
    pub(crate) default_fn: unsafe fn(*mut u8),
    /// Drop a value in place. `None` when the type has no drop glue.
    pub(crate) drop_fn: Option<unsafe fn(*mut u8)>,
    /// Clone the value at `src` into uninitialized memory at `dst`.
    pub(crate) clone_fn: unsafe fn(*const u8, *mut u8),
}

impl ComponentVtable {
    /// Create the vtable for a concrete component type `T`.
    pub fn new<T: Component>() -> Self {
        unsafe fn default_impl<T: Default>(dst: *mut u8) {
            ptr::write(dst as *mut T, T::default());
        }

        unsafe fn drop_impl<T>(ptr: *mut u8) {
            ptr::drop_in_place(ptr as *mut T);
        }

        unsafe fn clone_impl<T: Clone>(src: *const u8, dst: *mut u8) {
            let value = (*(src as *const T)).clone();
            ptr::write(dst as *mut T, value);
        }

        Self {
            default_fn: default_impl::<T>,
            drop_fn: if mem::needs_drop::<T>() {
                Some(drop_impl::<T>)
            } else {
                None
            },
            clone_fn: clone_impl::<T>,
        }
    }
}

impl fmt::Debug for ComponentVtable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentVtable")
            .field("has_drop", &self.drop_fn.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// ComponentInfo
// ---------------------------------------------------------------------------

/// Immutable metadata for a registered component type.
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    /// Sequential id assigned at registration.
    pub id: ComponentId,
    /// Name supplied by the caller at registration (stable across builds).
    pub name: String,
    /// The Rust type path, for diagnostics.
    pub type_name: &'static str,
    /// `size_of::<T>()`.
    pub size: usize,
    /// `align_of::<T>()`.
    pub align: usize,
    /// Rust `TypeId` for typed lookups.
    pub type_id: TypeId,
    /// Stable 64-bit hash of the registered name (blake3 prefix), for an
    /// external serialization/reflection layer to identify types across
    /// processes.
    pub type_hash: u64,
    /// Whether the type has no drop glue (byte copies fully describe moves).
    pub is_trivial: bool,
    /// Erased construct/drop/clone operations.
    pub(crate) vtable: ComponentVtable,
}

fn stable_type_hash(name: &str) -> u64 {
    let digest = blake3::hash(name.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest.as_bytes()[..8]);
    u64::from_le_bytes(prefix)
}

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

/// Registry mapping Rust types to [`ComponentId`]s and their metadata.
///
/// Registration is idempotent per Rust type: re-registering returns the
/// existing id and ignores the new name.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    by_type: HashMap<TypeId, ComponentId>,
    by_name: HashMap<String, ComponentId>,
    infos: Vec<ComponentInfo>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component type under `name`.
    ///
    /// Returns the existing id if `T` was already registered.
    ///
    /// # Panics
    ///
    /// Panics if the [`MAX_COMPONENT_TYPES`] ceiling would be exceeded, or if
    /// `name` is already registered for a different type. Both are
    /// configuration errors that must surface at startup, not be silently
    /// truncated.
    pub fn register<T: Component>(&mut self, name: &str) -> ComponentId {
        let rust_type_id = TypeId::of::<T>();
        if let Some(&existing) = self.by_type.get(&rust_type_id) {
            return existing;
        }

        assert!(
            self.infos.len() < MAX_COMPONENT_TYPES,
            "component type ceiling reached: cannot register '{}' beyond {} types",
            name,
            MAX_COMPONENT_TYPES
        );
        assert!(
            !self.by_name.contains_key(name),
            "component name '{name}' is already registered for a different type"
        );

        let id = ComponentId(self.infos.len() as u32);
        let info = ComponentInfo {
            id,
            name: name.to_owned(),
            type_name: std::any::type_name::<T>(),
            size: mem::size_of::<T>(),
            align: mem::align_of::<T>(),
            type_id: rust_type_id,
            type_hash: stable_type_hash(name),
            is_trivial: !mem::needs_drop::<T>(),
            vtable: ComponentVtable::new::<T>(),
        };
        tracing::debug!(
            id = id.0,
            name,
            size = info.size,
            align = info.align,
            "registered component type"
        );
        self.infos.push(info);
        self.by_type.insert(rust_type_id, id);
        self.by_name.insert(name.to_owned(), id);
        id
    }

    /// Look up a component id by Rust type.
    pub fn lookup<T: 'static>(&self) -> Option<ComponentId> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Look up a component id by its registered name.
    pub fn lookup_by_name(&self, name: &str) -> Option<ComponentId> {
        self.by_name.get(name).copied()
    }

    /// Metadata for a registered id, or `None` for an unknown id.
    pub fn info(&self, id: ComponentId) -> Option<&ComponentInfo> {
        self.infos.get(id.index())
    }

    /// Number of registered component types.
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Whether no types have been registered.
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// All registered names, sorted.
    pub fn registered_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
