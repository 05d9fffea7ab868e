//! Backing storage for buffers.
//!
//! A buffer is either **strong** (owns a growable allocation) or **weak**
//! (references memory somebody else owns). Weak storage comes in two forms:
//! raw foreign memory handed over by an FFI caller, and a shared
//! [`Bytes`] region that stays zero-copy and read-only.

use std::ops::Range;
use std::ptr::NonNull;

use bytes::Bytes;

use crate::error::BufferError;

/// Ownership regime of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strength {
    /// Owns its storage and may reallocate it on write
    Strong,
    /// Borrows storage it must never free or resize
    Weak,
}

pub(super) enum Storage {
    /// Owned allocation. `len()` is the size, `capacity()` the capacity.
    Owned(Vec<u8>),

    /// Caller-owned writable memory of fixed capacity.
    ///
    /// `adoptable` regions were allocated as a `Vec<u8>` by the global
    /// allocator and are taken over as-is on strengthen.
    Foreign {
        ptr: NonNull<u8>,
        capacity: usize,
        size: usize,
        adoptable: bool,
    },

    /// Shared immutable bytes. Capacity equals size.
    Shared(Bytes),
}

// SAFETY: `Foreign` memory is only dereferenced through the buffer handle's
// lock, and the `Buffer::wrap_weak*` constructors require the caller to keep
// the region valid and otherwise untouched while the buffer is weak. The other
// variants are plain owned data.
unsafe impl Send for Storage {}
unsafe impl Sync for Storage {}

impl Storage {
    pub(super) fn owned_with_capacity(capacity: usize) -> Result<Self, BufferError> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)
            .map_err(|_| BufferError::Allocation {
                requested: capacity,
            })?;
        Ok(Storage::Owned(data))
    }

    pub(super) fn strength(&self) -> Strength {
        match self {
            Storage::Owned(_) => Strength::Strong,
            Storage::Foreign { .. } | Storage::Shared(_) => Strength::Weak,
        }
    }

    pub(super) fn size(&self) -> usize {
        match self {
            Storage::Owned(data) => data.len(),
            Storage::Foreign { size, .. } => *size,
            Storage::Shared(bytes) => bytes.len(),
        }
    }

    pub(super) fn capacity(&self) -> usize {
        match self {
            Storage::Owned(data) => data.capacity(),
            Storage::Foreign { capacity, .. } => *capacity,
            Storage::Shared(bytes) => bytes.len(),
        }
    }

    /// The valid bytes, `0..size`.
    pub(super) fn as_slice(&self) -> &[u8] {
        match self {
            Storage::Owned(data) => data.as_slice(),
            // SAFETY: `ptr` is valid for `capacity` bytes and `size <= capacity`.
            Storage::Foreign { ptr, size, .. } => unsafe {
                std::slice::from_raw_parts(ptr.as_ptr(), *size)
            },
            Storage::Shared(bytes) => bytes,
        }
    }

    /// Claim `len` bytes at the write cursor and advance it.
    ///
    /// Returns the claimed range. On error nothing changes.
    pub(super) fn claim(&mut self, len: usize) -> Result<Range<usize>, BufferError> {
        let remaining = self.capacity() - self.size();
        match self {
            Storage::Owned(data) => {
                let start = data.len();
                let end = start
                    .checked_add(len)
                    .ok_or(BufferError::Allocation { requested: len })?;
                if remaining < len {
                    // Amortized growth; may move the allocation.
                    data.try_reserve(len)
                        .map_err(|_| BufferError::Allocation { requested: end })?;
                }
                data.resize(end, 0);
                Ok(start..end)
            }
            Storage::Foreign { size, .. } => {
                if remaining < len {
                    return Err(BufferError::Overflow {
                        requested: len,
                        remaining,
                    });
                }
                let start = *size;
                *size += len;
                Ok(start..*size)
            }
            Storage::Shared(bytes) => {
                if len > 0 {
                    return Err(BufferError::Overflow {
                        requested: len,
                        remaining: 0,
                    });
                }
                Ok(bytes.len()..bytes.len())
            }
        }
    }

    /// Mutable access to a range previously returned by [`claim`](Self::claim).
    pub(super) fn region_mut(&mut self, range: Range<usize>) -> &mut [u8] {
        match self {
            Storage::Owned(data) => &mut data[range],
            Storage::Foreign { ptr, size, .. } => {
                debug_assert!(range.end <= *size);
                // SAFETY: the range lies within `0..size <= capacity`, the
                // region is valid writable memory per `wrap_weak`, and the
                // caller holds the handle's write lock.
                unsafe {
                    std::slice::from_raw_parts_mut(ptr.as_ptr().add(range.start), range.len())
                }
            }
            Storage::Shared(_) => &mut [],
        }
    }

    pub(super) fn set_size(&mut self, new_size: usize) -> Result<(), BufferError> {
        let capacity = self.capacity();
        if new_size > capacity {
            return Err(BufferError::InvalidSize {
                size: new_size,
                capacity,
            });
        }
        match self {
            Storage::Owned(data) => data.resize(new_size, 0),
            Storage::Foreign { size, .. } => *size = new_size,
            Storage::Shared(bytes) => {
                if new_size != bytes.len() {
                    return Err(BufferError::ReadOnly);
                }
            }
        }
        Ok(())
    }

    /// Convert weak storage into an owned allocation holding the same bytes.
    ///
    /// Adoptable foreign memory becomes the owned allocation in place. Other
    /// weak storage is copied, preserving capacity so later writes up to the
    /// old bound do not reallocate again.
    pub(super) fn strengthen(&mut self) -> Result<(), BufferError> {
        match *self {
            Storage::Owned(_) => return Ok(()),
            Storage::Foreign {
                ptr,
                capacity,
                size,
                adoptable: true,
            } => {
                // SAFETY: `wrap_weak_vec_parts` requires the parts to describe
                // a `Vec<u8>` from the global allocator that the caller gave
                // up, with `size <= capacity`.
                let owned = unsafe { Vec::from_raw_parts(ptr.as_ptr(), size, capacity) };
                *self = Storage::Owned(owned);
                return Ok(());
            }
            Storage::Foreign { .. } | Storage::Shared(_) => {}
        }
        let capacity = self.capacity();
        let mut owned = Vec::new();
        owned
            .try_reserve_exact(capacity)
            .map_err(|_| BufferError::Allocation {
                requested: capacity,
            })?;
        owned.extend_from_slice(self.as_slice());
        *self = Storage::Owned(owned);
        Ok(())
    }
}
