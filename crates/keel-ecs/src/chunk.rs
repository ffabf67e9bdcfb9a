//! Fixed-size Structure-of-Arrays storage blocks.
//!
//! A [`Chunk`] is the physical unit of storage and iteration: one contiguous
//! heap allocation holding a dense array of [`Entity`] ids followed by one
//! densely packed array per component type, with per-array byte offsets
//! precomputed in a shared [`ChunkLayout`]. All of an archetype's chunks
//! share one layout, which is what guarantees the uniform-column invariant.
//!
//! Chunks are sized to a [`CHUNK_SIZE`] byte budget so a whole chunk fits
//! comfortably in an L1 data cache during column iteration.
//!
//! # Safety
//!
//! Component data lives in type-erased byte columns; every access goes
//! through the owning archetype, which pairs each column with the
//! [`ComponentInfo`] it was laid out for. [`Chunk::swap_remove_raw`] moves
//! bytes without running destructors, so callers must have dropped or moved
//! out every column of the removed row first.

use crate::component::ComponentInfo;
use crate::entity::Entity;

use std::alloc::{self, Layout};
use std::ptr::{self, NonNull};
use std::slice;
use std::sync::Arc;

/// Byte budget for one chunk. 16 KiB keeps a chunk L1-resident.
pub const CHUNK_SIZE: usize = 16 * 1024;

#[inline]
fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

// ---------------------------------------------------------------------------
// ChunkLayout
// ---------------------------------------------------------------------------

/// Byte span of one component column within a chunk.
#[derive(Debug, Clone, Copy)]
struct ColumnSpec {
    offset: usize,
    size: usize,
}

/// Precomputed memory layout shared by every chunk of one archetype.
///
/// The entity id array sits at offset 0; component columns follow in
/// ascending component-id order, each aligned to its type's requirement.
#[derive(Debug)]
pub struct ChunkLayout {
    capacity: u32,
    total_bytes: usize,
    max_align: usize,
    columns: Vec<ColumnSpec>,
}

impl ChunkLayout {
    /// Compute the layout for an ordered component list.
    ///
    /// `bytes_per_entity` is the aligned sum of the entity id and all
    /// component sizes; capacity is the chunk byte budget divided by it.
    ///
    /// # Panics
    ///
    /// Panics if a single entity's data exceeds [`CHUNK_SIZE`] -- a fatal
    /// configuration error (an oversized component), surfaced at archetype
    /// creation rather than silently degraded.
    pub fn new(infos: &[ComponentInfo]) -> Self {
        let mut bytes_per_entity = std::mem::size_of::<Entity>();
        for info in infos {
            bytes_per_entity = align_up(bytes_per_entity, info.align.max(1));
            bytes_per_entity += info.size;
        }
        assert!(
            bytes_per_entity <= CHUNK_SIZE,
            "component signature needs {bytes_per_entity} bytes per entity, \
             exceeding the {CHUNK_SIZE}-byte chunk budget"
        );
        let capacity = (CHUNK_SIZE / bytes_per_entity) as u32;

        let mut offset = std::mem::size_of::<Entity>() * capacity as usize;
        let mut max_align = std::mem::align_of::<Entity>();
        let mut columns = Vec::with_capacity(infos.len());
        for info in infos {
            let align = info.align.max(1);
            max_align = max_align.max(align);
            offset = align_up(offset, align);
            columns.push(ColumnSpec {
                offset,
                size: info.size,
            });
            offset += info.size * capacity as usize;
        }

        Self {
            capacity,
            total_bytes: offset,
            max_align,
            columns,
        }
    }

    /// Entities per chunk.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of component columns.
    #[inline]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Byte offset of a column's array within the chunk.
    #[inline]
    pub fn column_offset(&self, column: usize) -> usize {
        self.columns[column].offset
    }

    /// Element byte stride of a column.
    #[inline]
    pub fn column_size(&self, column: usize) -> usize {
        self.columns[column].size
    }

    /// Total allocation size in bytes.
    #[inline]
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

/// One fixed-capacity SoA block.
///
/// Invariant: `count <= capacity`, and rows `[0, count)` are contiguous --
/// removal is swap-with-last. The owning archetype must [`clear`](Chunk::clear)
/// a chunk before dropping it; `Drop` only releases the raw allocation.
pub struct Chunk {
    data: NonNull<u8>,
    count: u32,
    layout: Arc<ChunkLayout>,
    alloc_layout: Layout,
}

// Raw storage with no interior mutability; all access is gated by the owning
// archetype's borrows.
unsafe impl Send for Chunk {}
unsafe impl Sync for Chunk {}

impl Chunk {
    /// Allocate a zero-initialized chunk for `layout`.
    pub fn new(layout: Arc<ChunkLayout>) -> Self {
        let alloc_layout = Layout::from_size_align(layout.total_bytes.max(1), layout.max_align)
            .expect("chunk layout overflow");
        let data = unsafe { alloc::alloc_zeroed(alloc_layout) };
        let data = NonNull::new(data).expect("chunk allocation failed");
        Self {
            data,
            count: 0,
            layout,
            alloc_layout,
        }
    }

    /// Number of occupied rows.
    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Maximum rows.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.layout.capacity
    }

    /// Whether no further rows fit.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.count >= self.layout.capacity
    }

    /// Whether the chunk holds no rows.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The layout this chunk was built from.
    #[inline]
    pub fn layout(&self) -> &ChunkLayout {
        &self.layout
    }

    #[inline]
    fn entity_ptr(&self, row: u32) -> *mut Entity {
        unsafe { (self.data.as_ptr() as *mut Entity).add(row as usize) }
    }

    /// The occupied entity ids, in row order.
    #[inline]
    pub fn entities(&self) -> &[Entity] {
        unsafe { slice::from_raw_parts(self.data.as_ptr() as *const Entity, self.count as usize) }
    }

    /// The entity at `row`.
    #[inline]
    pub fn entity(&self, row: u32) -> Entity {
        debug_assert!(row < self.count);
        unsafe { *self.entity_ptr(row) }
    }

    /// Base pointer of a column's array.
    #[inline]
    pub fn column_ptr(&self, column: usize) -> *mut u8 {
        unsafe { self.data.as_ptr().add(self.layout.column_offset(column)) }
    }

    /// Pointer to the component at `(column, row)`.
    #[inline]
    pub fn component_ptr(&self, column: usize, row: u32) -> *mut u8 {
        debug_assert!(row < self.count);
        unsafe {
            self.data
                .as_ptr()
                .add(self.layout.column_offset(column) + row as usize * self.layout.column_size(column))
        }
    }

    /// Typed view of a column's occupied rows.
    ///
    /// # Safety
    ///
    /// `T` must be the component type the column was laid out for.
    #[inline]
    pub unsafe fn column_slice<T>(&self, column: usize) -> &[T] {
        slice::from_raw_parts(self.column_ptr(column) as *const T, self.count as usize)
    }

    /// Typed mutable view of a column's occupied rows.
    ///
    /// # Safety
    ///
    /// `T` must be the component type the column was laid out for.
    #[inline]
    pub unsafe fn column_slice_mut<T>(&mut self, column: usize) -> &mut [T] {
        slice::from_raw_parts_mut(self.column_ptr(column) as *mut T, self.count as usize)
    }

    /// Append `entity` and default-construct every column slot at the new
    /// row. Returns the row index.
    ///
    /// # Panics
    ///
    /// Panics if the chunk is full; the archetype picks a non-full chunk
    /// before calling.
    pub fn allocate(&mut self, entity: Entity, infos: &[ComponentInfo]) -> u32 {
        assert!(!self.is_full(), "chunk is full");
        debug_assert_eq!(infos.len(), self.layout.column_count());
        let row = self.count;
        self.count += 1;
        unsafe {
            ptr::write(self.entity_ptr(row), entity);
            for (column, info) in infos.iter().enumerate() {
                (info.vtable.default_fn)(self.component_ptr(column, row));
            }
        }
        row
    }

    /// Drop the component at `(column, row)` in place, if its type has drop
    /// glue.
    pub fn drop_in_place(&mut self, column: usize, row: u32, info: &ComponentInfo) {
        if let Some(drop_fn) = info.vtable.drop_fn {
            unsafe { drop_fn(self.component_ptr(column, row)) };
        }
    }

    /// Drop every component at `row`.
    pub fn drop_row(&mut self, row: u32, infos: &[ComponentInfo]) {
        for (column, info) in infos.iter().enumerate() {
            self.drop_in_place(column, row, info);
        }
    }

    /// Fill the hole at `row` by byte-moving the last row into it, then
    /// shrink the count. Returns the entity that moved, or `None` if `row`
    /// was the last row.
    ///
    /// No destructors run: the caller must already have dropped or moved out
    /// every column of `row`. The moved bytes are a plain ownership transfer
    /// (bitwise moves are always valid in Rust).
    pub fn swap_remove_raw(&mut self, row: u32) -> Option<Entity> {
        debug_assert!(row < self.count);
        let last = self.count - 1;
        let moved = if row < last {
            unsafe {
                let moved_entity = *self.entity_ptr(last);
                ptr::write(self.entity_ptr(row), moved_entity);
                for column in 0..self.layout.column_count() {
                    let size = self.layout.column_size(column);
                    if size > 0 {
                        let base = self.column_ptr(column);
                        let src = base.add(last as usize * size);
                        let dst = base.add(row as usize * size);
                        ptr::copy_nonoverlapping(src, dst, size);
                    }
                }
                Some(moved_entity)
            }
        } else {
            None
        };
        self.count -= 1;
        moved
    }

    /// Drop every live row's components and reset the count to zero.
    pub fn clear(&mut self, infos: &[ComponentInfo]) {
        for (column, info) in infos.iter().enumerate() {
            if let Some(drop_fn) = info.vtable.drop_fn {
                let size = info.size;
                let base = self.column_ptr(column);
                for row in 0..self.count {
                    unsafe { drop_fn(base.add(row as usize * size)) };
                }
            }
        }
        self.count = 0;
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        // Component destructors are the archetype's responsibility (it holds
        // the ComponentInfo list); only the raw allocation is released here.
        unsafe { alloc::dealloc(self.data.as_ptr(), self.alloc_layout) };
    }
}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunk")
            .field("count", &self.count)
            .field("capacity", &self.layout.capacity)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
