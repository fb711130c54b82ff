//! # Scoped Memory Accessor
//!
//! [`MemoryPtr`] is the only way to touch mapped bytes. It is created under
//! the storage's shared lock and holds that lock for its lifetime, so the
//! mapping cannot be replaced while any accessor is alive. The handle is
//! positioned at a byte offset; all reads and writes are relative to it.
//!
//! Reads and writes within one accessor observe a consistent mapping.
//! Sequences spanning two accessors must re-derive positions, since a grow
//! may have moved the mapping in between.

use std::ptr;
use std::slice;

use super::file_storage::MapGuard;

/// A scoped handle pinning the mapping against remap.
///
/// Writers to distinct regions may hold accessors concurrently; the
/// allocation protocol guarantees each in-flight element is written by
/// exactly one thread until it is published to an index.
pub struct MemoryPtr<'a> {
    guard: MapGuard<'a>,
    offset: usize,
    end: usize,
}

impl<'a> MemoryPtr<'a> {
    pub(crate) fn new(guard: MapGuard<'a>, offset: usize, end: usize) -> Self {
        Self { guard, offset, end }
    }

    /// Byte offset of this accessor within the storage.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Live bytes from this accessor's position to the logical end observed
    /// at acquisition.
    pub fn size(&self) -> usize {
        self.end.saturating_sub(self.offset)
    }

    /// Repositions the accessor at an absolute byte offset.
    pub(crate) fn reposition(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    fn checked(&self, relative: usize, len: usize) -> usize {
        let start = self.offset + relative;
        assert!(
            start + len <= self.guard.capacity,
            "accessor range {}..{} exceeds mapped capacity {}",
            start,
            start + len,
            self.guard.capacity
        );
        start
    }

    /// Borrows `len` mapped bytes starting `relative` bytes past the
    /// accessor's position.
    pub fn slice(&self, relative: usize, len: usize) -> &[u8] {
        let start = self.checked(relative, len);

        // SAFETY: the range was bounds-checked against the mapped capacity
        // and the mapping is pinned by the guard for the slice's lifetime.
        // Readers may only race writers of regions not yet published to an
        // index, which no chain walk can reach.
        unsafe { slice::from_raw_parts(self.guard.data.add(start), len) }
    }

    /// Copies `src` into the mapping `relative` bytes past the accessor's
    /// position.
    pub fn write(&self, relative: usize, src: &[u8]) {
        let start = self.checked(relative, src.len());

        // SAFETY: the range was bounds-checked against the mapped capacity
        // and the mapping is pinned by the guard. Concurrent writers target
        // disjoint allocations by the allocation protocol.
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), self.guard.data.add(start), src.len()) }
    }

    /// Fills `len` bytes with `value`, `relative` bytes past the accessor's
    /// position.
    pub fn fill(&self, relative: usize, len: usize, value: u8) {
        let start = self.checked(relative, len);

        // SAFETY: as for `write`.
        unsafe { ptr::write_bytes(self.guard.data.add(start), value, len) }
    }

    /// Borrows `len` mapped bytes mutably for an element codec.
    ///
    /// # Safety
    ///
    /// The caller must guarantee the range is not read or written through
    /// any other path while the borrow lives. The put protocol satisfies
    /// this: a freshly allocated element is exclusive to its writer until
    /// published into a bucket.
    pub unsafe fn slice_mut(&self, relative: usize, len: usize) -> &mut [u8] {
        let start = self.checked(relative, len);
        slice::from_raw_parts_mut(self.guard.data.add(start), len)
    }
}

impl std::fmt::Debug for MemoryPtr<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryPtr")
            .field("offset", &self.offset)
            .field("end", &self.end)
            .finish()
    }
}
