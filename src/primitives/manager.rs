//! # Record / Slab Manager
//!
//! [`Manager`] interprets one [`FileStorage`] body as a sequence of elements
//! addressed by links. Two modes share the operation surface:
//!
//! - **Record mode**: elements are a fixed stride apart; a link is a record
//!   index and `count()` is the number of records.
//! - **Slab mode**: elements are variable-length byte ranges; a link is a
//!   byte offset and `count()` is the live byte length.
//!
//! Allocation is append-only. Links are handed out in strictly increasing
//! order and stay valid for the life of the store; only `truncate` (the
//! recovery path) discards elements, and only from the tail.

use eyre::{ensure, Result, WrapErr};
use parking_lot::Mutex;

use crate::memory::{Fault, FileStorage, MemoryPtr};

use super::link::{terminal, Link};

/// Element addressing mode of a body file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Fixed-stride elements; the stride is the full element size in bytes.
    Record(usize),
    /// Variable-length elements addressed by byte offset.
    Slab,
}

/// Allocates and resolves elements inside one body storage.
#[derive(Debug)]
pub struct Manager<const W: usize> {
    storage: FileStorage,
    mode: Mode,
    allocator: Mutex<()>,
}

impl<const W: usize> Manager<W> {
    /// The reserved "none" link for this width.
    pub const TERMINAL: Link = terminal::<W>();

    pub fn new(storage: FileStorage, mode: Mode) -> Result<Self> {
        if let Mode::Record(stride) = mode {
            ensure!(stride > 0, "record stride must be at least one byte");
        }

        Ok(Self {
            storage,
            mode,
            allocator: Mutex::new(()),
        })
    }

    pub fn storage(&self) -> &FileStorage {
        &self.storage
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Current end of body in link units: records, or bytes for slabs.
    pub fn count(&self) -> Link {
        let logical = self.storage.logical();
        match self.mode {
            Mode::Record(stride) => (logical / stride) as Link,
            Mode::Slab => logical as Link,
        }
    }

    fn position(&self, link: Link) -> usize {
        match self.mode {
            Mode::Record(stride) => link as usize * stride,
            Mode::Slab => link as usize,
        }
    }

    /// Reserves `n` units and returns the link of the new region.
    ///
    /// Passing the terminal value is a no-op returning terminal, so callers
    /// can propagate "none" through allocation chains. The storage grows
    /// geometrically when the reservation passes the current capacity.
    pub fn allocate(&self, n: Link) -> Result<Link> {
        if n == Self::TERMINAL {
            return Ok(Self::TERMINAL);
        }

        let _guard = self.allocator.lock();

        let link = self.count();
        let next = link
            .checked_add(n)
            .filter(|next| *next <= Self::TERMINAL)
            .ok_or_else(|| {
                eyre::eyre!(
                    "link space exhausted: {} + {} units exceeds width {}",
                    link,
                    n,
                    W
                )
            })?;

        let memory = self
            .storage
            .reserve(self.position(next))
            .wrap_err_with(|| format!("failed to allocate {n} units"))?;
        drop(memory);

        Ok(link)
    }

    /// Discards all elements at positions at or past `link`.
    ///
    /// Recovery-only. Fails on the terminal link or a link beyond the
    /// current count.
    pub fn truncate(&self, link: Link) -> Result<()> {
        ensure!(link != Self::TERMINAL, "cannot truncate to the terminal link");
        ensure!(
            link <= self.count(),
            "cannot truncate to {} past count {}",
            link,
            self.count()
        );

        let memory = self.storage.resize(self.position(link))?;
        drop(memory);
        Ok(())
    }

    /// Accessor spanning the whole live body.
    pub fn access(&self) -> Result<MemoryPtr<'_>> {
        self.storage.access()
    }

    /// Accessor positioned at the element addressed by `link`, or `None`
    /// for the terminal link or a link outside the live body.
    pub fn get(&self, link: Link) -> Result<Option<MemoryPtr<'_>>> {
        if link == Self::TERMINAL || link >= self.count() {
            return Ok(None);
        }

        let position = self.position(link);
        Ok(Some(self.storage.access()?.reposition(position)))
    }

    /// The sticky storage fault, if any.
    pub fn get_fault(&self) -> Option<Fault> {
        self.storage.fault()
    }

    /// Bytes reserved beyond the live body, claimable without a remap.
    pub fn get_space(&self) -> usize {
        self.storage.capacity().saturating_sub(self.storage.logical())
    }

    /// Clears the fault state after the caller re-established the store.
    pub fn reload(&self) {
        self.storage.clear_fault();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn slab(dir: &tempfile::TempDir) -> Manager<4> {
        let storage = FileStorage::open(dir.path().join("body"), 1, 50).unwrap();
        storage.map().unwrap();
        Manager::new(storage, Mode::Slab).unwrap()
    }

    fn records(dir: &tempfile::TempDir, stride: usize) -> Manager<2> {
        let storage = FileStorage::open(dir.path().join("body"), 1, 50).unwrap();
        storage.map().unwrap();
        Manager::new(storage, Mode::Record(stride)).unwrap()
    }

    fn records_sized(dir: &tempfile::TempDir, stride: usize, bytes: usize) -> Manager<2> {
        let path = dir.path().join("body");
        std::fs::write(&path, vec![0xffu8; bytes]).unwrap();
        let storage = FileStorage::open(&path, 1, 50).unwrap();
        storage.map().unwrap();
        Manager::new(storage, Mode::Record(stride)).unwrap()
    }

    mod slabs {
        use super::*;

        #[test]
        fn count_of_empty_slab_is_zero() {
            let dir = tempdir().unwrap();
            assert_eq!(slab(&dir).count(), 0);
        }

        #[test]
        fn count_is_byte_based() {
            let dir = tempdir().unwrap();
            let manager = slab(&dir);
            manager.allocate(42).unwrap();
            assert_eq!(manager.count(), 42);
        }

        #[test]
        fn allocate_terminal_is_noop() {
            let dir = tempdir().unwrap();
            let manager = slab(&dir);

            assert_eq!(
                manager.allocate(Manager::<4>::TERMINAL).unwrap(),
                Manager::<4>::TERMINAL
            );
            assert_eq!(manager.count(), 0);
        }

        #[test]
        fn allocate_from_empty_returns_zero() {
            let dir = tempdir().unwrap();
            let manager = slab(&dir);

            assert_eq!(manager.allocate(42).unwrap(), 0);
            assert_eq!(manager.count(), 42);
        }

        #[test]
        fn allocate_appends_at_byte_offset() {
            let dir = tempdir().unwrap();
            let manager = slab(&dir);

            assert_eq!(manager.allocate(21).unwrap(), 0);
            assert_eq!(manager.allocate(21).unwrap(), 21);
            assert_eq!(manager.count(), 42);
        }

        #[test]
        fn truncate_terminal_fails_unchanged() {
            let dir = tempdir().unwrap();
            let manager = slab(&dir);
            manager.allocate(10).unwrap();

            assert!(manager.truncate(Manager::<4>::TERMINAL).is_err());
            assert_eq!(manager.count(), 10);
        }

        #[test]
        fn truncate_past_count_fails_unchanged() {
            let dir = tempdir().unwrap();
            let manager = slab(&dir);
            manager.allocate(42).unwrap();

            assert!(manager.truncate(43).is_err());
            assert_eq!(manager.count(), 42);
        }

        #[test]
        fn truncate_discards_tail() {
            let dir = tempdir().unwrap();
            let manager = slab(&dir);
            manager.allocate(42).unwrap();

            manager.truncate(21).unwrap();
            assert_eq!(manager.count(), 21);

            // Truncating to the exact count is allowed.
            manager.truncate(21).unwrap();
            assert_eq!(manager.count(), 21);
        }

        #[test]
        fn get_terminal_is_none() {
            let dir = tempdir().unwrap();
            let manager = slab(&dir);
            manager.allocate(14).unwrap();

            assert!(manager.get(Manager::<4>::TERMINAL).unwrap().is_none());
        }

        #[test]
        fn get_resolves_byte_offsets() {
            let dir = tempdir().unwrap();
            let manager = slab(&dir);
            manager.allocate(16).unwrap();

            {
                let memory = manager.access().unwrap();
                let bytes: Vec<u8> = (0u8..16).collect();
                memory.write(0, &bytes);
            }

            for offset in [0u64, 1, 2, 9] {
                let memory = manager.get(offset).unwrap().unwrap();
                assert_eq!(memory.slice(0, 1), &[offset as u8]);
            }
        }
    }

    mod records {
        use super::*;

        #[test]
        fn count_of_empty_body_is_zero() {
            let dir = tempdir().unwrap();
            assert_eq!(records(&dir, 42).count(), 0);
        }

        #[test]
        fn count_is_record_based() {
            let dir = tempdir().unwrap();
            // 2-byte links, 5-byte payload: 7-byte stride.
            let manager = records_sized(&dir, 7, 7);
            assert_eq!(manager.count(), 1);

            let dir = tempdir().unwrap();
            let manager = records_sized(&dir, 7, 33 * 7);
            assert_eq!(manager.count(), 33);
        }

        #[test]
        fn allocate_terminal_is_noop() {
            let dir = tempdir().unwrap();
            let manager = records(&dir, 7);

            assert_eq!(
                manager.allocate(Manager::<2>::TERMINAL).unwrap(),
                Manager::<2>::TERMINAL
            );
            assert_eq!(manager.count(), 0);
        }

        #[test]
        fn allocate_returns_record_indexes() {
            let dir = tempdir().unwrap();
            let manager = records(&dir, 7);

            assert_eq!(manager.allocate(1).unwrap(), 0);
            assert_eq!(manager.count(), 1);
            assert_eq!(manager.allocate(2).unwrap(), 1);
            assert_eq!(manager.count(), 3);
        }

        #[test]
        fn allocate_appends_after_existing_records() {
            let dir = tempdir().unwrap();
            let manager = records_sized(&dir, 7, 7);

            assert_eq!(manager.allocate(1).unwrap(), 1);
            assert_eq!(manager.count(), 2);
            assert_eq!(manager.allocate(2).unwrap(), 2);
            assert_eq!(manager.count(), 4);
        }

        #[test]
        fn allocate_rejects_link_space_overflow() {
            let dir = tempdir().unwrap();
            // 1-byte links: 255 is terminal, 255 units would exhaust it.
            let storage = FileStorage::open(dir.path().join("tiny"), 1, 50).unwrap();
            storage.map().unwrap();
            let manager: Manager<1> = Manager::new(storage, Mode::Record(4)).unwrap();

            assert_eq!(manager.allocate(255).unwrap(), 0);
            assert!(manager.allocate(1).is_err());
        }

        #[test]
        fn truncate_and_get_mirror_slab_behavior() {
            let dir = tempdir().unwrap();
            let manager = records_sized(&dir, 7, 14);
            assert_eq!(manager.count(), 2);

            assert!(manager.truncate(Manager::<2>::TERMINAL).is_err());
            assert!(manager.truncate(3).is_err());
            assert!(manager.get(Manager::<2>::TERMINAL).unwrap().is_none());
            assert!(manager.get(2).unwrap().is_none());

            manager.truncate(1).unwrap();
            assert_eq!(manager.count(), 1);
        }

        #[test]
        fn get_resolves_record_strides() {
            let dir = tempdir().unwrap();
            let manager = records(&dir, 8);
            manager.allocate(2).unwrap();

            {
                let memory = manager.access().unwrap();
                let bytes: Vec<u8> = (0u8..16).collect();
                memory.write(0, &bytes);
            }

            let memory = manager.get(0).unwrap().unwrap();
            assert_eq!(memory.slice(0, 1), &[0x00]);
            let memory = manager.get(1).unwrap().unwrap();
            assert_eq!(memory.slice(0, 1), &[0x08]);
        }

        #[test]
        fn allocated_links_strictly_increase() {
            let dir = tempdir().unwrap();
            let manager = records(&dir, 3);

            let mut last = None;
            for n in 1..=20u64 {
                let link = manager.allocate(n % 3 + 1).unwrap();
                if let Some(previous) = last {
                    assert!(link > previous);
                }
                last = Some(link);
            }
        }
    }
}
