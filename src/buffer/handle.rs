//! Shared buffer handle.

use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::storage::{Storage, Strength};
use crate::error::BufferError;

/// Read guard over the valid bytes of a buffer.
///
/// Writes on the same buffer wait until every view is dropped.
pub type BufferView<'a> = MappedRwLockReadGuard<'a, [u8]>;

/// Write guard over a freshly claimed region of a buffer.
pub type WriteRegion<'a> = MappedRwLockWriteGuard<'a, [u8]>;

// =============================================================================
// Buffer
// =============================================================================

/// Reference-counted byte container with strong and weak ownership modes.
///
/// Cloning a `Buffer` is cheap and shares the same storage: all clones see the
/// same bytes, and the storage is released when the last clone is dropped.
/// A strong buffer frees its allocation at that point; a weak buffer never
/// frees the memory it references.
///
/// Mutation (`write`, `strengthen`, `set_size`) takes an exclusive lock on the
/// storage, reads take a shared lock. Holding a [`BufferView`] while writing
/// on the same thread deadlocks, so drop views before writing.
///
/// # Example
///
/// ```
/// use wsi_tile_plane::buffer::{Buffer, Strength};
///
/// let buffer = Buffer::create_strong(16).unwrap();
/// buffer.write(3).unwrap().copy_from_slice(b"abc");
/// buffer.append(b"def").unwrap();
///
/// assert_eq!(buffer.strength(), Strength::Strong);
/// assert_eq!(&*buffer.read_view(), b"abcdef");
/// ```
#[derive(Clone)]
pub struct Buffer {
    inner: Arc<RwLock<Storage>>,
}

impl Buffer {
    fn from_storage(storage: Storage) -> Self {
        Self {
            inner: Arc::new(RwLock::new(storage)),
        }
    }

    /// Create a strong buffer with no backing memory (capacity and size 0).
    pub fn create_empty_strong() -> Self {
        Self::from_storage(Storage::Owned(Vec::new()))
    }

    /// Create a strong buffer able to hold `capacity` bytes without growing.
    ///
    /// Size starts at 0.
    pub fn create_strong(capacity: usize) -> Result<Self, BufferError> {
        Storage::owned_with_capacity(capacity).map(Self::from_storage)
    }

    /// Create a strong buffer holding a private copy of `data`.
    pub fn copy_from(data: &[u8]) -> Result<Self, BufferError> {
        let mut owned = Vec::new();
        owned
            .try_reserve_exact(data.len())
            .map_err(|_| BufferError::Allocation {
                requested: data.len(),
            })?;
        owned.extend_from_slice(data);
        Ok(Self::from_storage(Storage::Owned(owned)))
    }

    /// Wrap caller-owned memory in a weak buffer without copying.
    ///
    /// The buffer's size and capacity are both `len`; use
    /// [`reset`](Self::reset) to reuse the region as a write target.
    ///
    /// [`strengthen`](Self::strengthen) copies the region into an owned
    /// allocation; from then on the buffer no longer touches `ptr`.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads and writes of `len` bytes until the
    /// buffer is strengthened or every clone of it is dropped, whichever
    /// comes first, and the memory must not be accessed through other
    /// pointers during that time. The buffer never frees the region; the
    /// caller releases it once the buffer is strong or gone.
    pub unsafe fn wrap_weak(ptr: NonNull<u8>, len: usize) -> Self {
        Self::from_storage(Storage::Foreign {
            ptr,
            capacity: len,
            size: len,
            adoptable: false,
        })
    }

    /// Wrap the parts of a relinquished `Vec<u8>` in a weak buffer.
    ///
    /// Size is `len` and capacity is `capacity`. While weak, the buffer
    /// behaves like [`wrap_weak`](Self::wrap_weak) and never frees the
    /// allocation. [`strengthen`](Self::strengthen) adopts it without
    /// copying: the buffer then owns the allocation and frees it when the
    /// last clone is dropped.
    ///
    /// # Safety
    ///
    /// `ptr`, `len` and `capacity` must come from a `Vec<u8>` allocated by the
    /// global allocator whose ownership the caller gave up (for example via
    /// [`std::mem::ManuallyDrop`]), with `len <= capacity`. Until the buffer
    /// is strengthened the caller keeps ownership: it must not free or touch
    /// the memory while any clone is alive, and frees it itself if the buffer
    /// is dropped while still weak. After strengthening the caller must not
    /// free it.
    pub unsafe fn wrap_weak_vec_parts(ptr: NonNull<u8>, len: usize, capacity: usize) -> Self {
        Self::from_storage(Storage::Foreign {
            ptr,
            capacity,
            size: len,
            adoptable: true,
        })
    }

    /// Wrap shared bytes in a weak, read-only buffer without copying.
    ///
    /// Capacity equals size, so any non-empty write overflows until the
    /// buffer is strengthened.
    pub fn wrap_shared(bytes: Bytes) -> Self {
        Self::from_storage(Storage::Shared(bytes))
    }

    /// Claim `len` bytes at the current size and return them for writing.
    ///
    /// The size advances by `len` before the region is returned. A strong
    /// buffer grows if needed, which may move its storage and invalidates any
    /// pointer obtained from [`raw_parts`](Self::raw_parts). A weak buffer
    /// fails with [`BufferError::Overflow`] instead and keeps its size.
    ///
    /// Newly grown strong regions are zero-filled.
    pub fn write(&self, len: usize) -> Result<WriteRegion<'_>, BufferError> {
        let mut guard = self.inner.write();
        let range = guard.claim(len)?;
        Ok(RwLockWriteGuard::map(guard, |storage| {
            storage.region_mut(range)
        }))
    }

    /// Copy `data` to the end of the buffer.
    pub fn append(&self, data: &[u8]) -> Result<(), BufferError> {
        self.write(data.len())?.copy_from_slice(data);
        Ok(())
    }

    /// Borrow the valid bytes (`0..size`).
    pub fn read_view(&self) -> BufferView<'_> {
        RwLockReadGuard::map(self.inner.read(), |storage| storage.as_slice())
    }

    /// Pointer to the valid bytes and their length.
    ///
    /// For strong buffers the pointer is invalidated by the next `write` or
    /// `strengthen`; for weak buffers it stays stable until strengthened.
    pub fn raw_parts(&self) -> (*const u8, usize) {
        let storage = self.inner.read();
        let bytes = storage.as_slice();
        (bytes.as_ptr(), bytes.len())
    }

    /// Convert a weak buffer into a strong one, preserving its bytes.
    ///
    /// From then on the buffer owns its storage and writes may reallocate.
    /// Memory wrapped with [`wrap_weak_vec_parts`](Self::wrap_weak_vec_parts)
    /// is adopted in place; other weak storage is copied. Strong buffers are
    /// left untouched.
    pub fn strengthen(&self) -> Result<(), BufferError> {
        self.inner.write().strengthen()
    }

    /// Move the write cursor to `size`. Must not exceed the capacity.
    pub fn set_size(&self, size: usize) -> Result<(), BufferError> {
        self.inner.write().set_size(size)
    }

    /// Move the write cursor back to 0, keeping the capacity.
    pub fn reset(&self) -> Result<(), BufferError> {
        self.set_size(0)
    }

    /// Copy the valid bytes into an immutable [`Bytes`].
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.read_view())
    }

    pub fn strength(&self) -> Strength {
        self.inner.read().strength()
    }

    pub fn is_weak(&self) -> bool {
        self.strength() == Strength::Weak
    }

    /// Number of valid bytes.
    pub fn size(&self) -> usize {
        self.inner.read().size()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Total bytes available without growing.
    pub fn capacity(&self) -> usize {
        self.inner.read().capacity()
    }

    /// Number of live handles sharing this storage.
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Whether both handles share the same storage.
    pub fn ptr_eq(&self, other: &Buffer) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let storage = self.inner.read();
        f.debug_struct("Buffer")
            .field("strength", &storage.strength())
            .field("size", &storage.size())
            .field("capacity", &storage.capacity())
            .finish()
    }
}

impl From<Bytes> for Buffer {
    fn from(bytes: Bytes) -> Self {
        Buffer::wrap_shared(bytes)
    }
}

impl From<Vec<u8>> for Buffer {
    /// Adopt an owned vector as a strong buffer without copying.
    fn from(data: Vec<u8>) -> Self {
        Buffer::from_storage(Storage::Owned(data))
    }
}

// =============================================================================
// Tests
// =============================================================================
