//! # Memory-Mapped File Storage
//!
//! This module implements [`FileStorage`], the growable memory-mapped region
//! that backs every on-disk primitive. One instance owns one file handle and
//! at most one live mapping of it.
//!
//! ## Lifecycle
//!
//! ```text
//! open()   file opened or created; capacity = logical = file size; unmapped
//! map()    whole file mapped read/write (empty files grow to the minimum
//!          capacity first); advised for random access
//! ...      any number of reserve()/resize() growth cycles
//! unmap()  msync, munmap, truncate file to logical size, fsync
//! ```
//!
//! Links handed out against this storage remain stable across remaps; only
//! raw pointers die. Callers re-derive pointers through a fresh accessor
//! after any operation that may have grown the file.
//!
//! ## Growth
//!
//! `reserve(required)` grows capacity to
//! `max(minimum, required + required * expansion / 100)` when `required`
//! exceeds the current capacity, then publishes `logical = required`.
//! `resize(required)` is the same operation with no expansion margin, used
//! when the final size is known (headers, truncation).
//!
//! Growth flushes the old mapping, extends the file, and maps it again. The
//! exclusive lock is held only for that window; accessors created before the
//! grow keep the old mapping alive and block the upgrade until released.
//!
//! ## Fault State
//!
//! A failed syscall marks the storage faulted ([`Fault::Io`] or
//! [`Fault::OutOfSpace`]) in addition to returning the error. The fault is
//! sticky: the first cause is preserved so that an out-of-space condition is
//! still diagnosable after follow-on failures. Further mutation of a faulted
//! store is unsupported; callers unmap and reopen.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use eyre::{ensure, Result, WrapErr};
use log::{debug, warn};
use memmap2::MmapMut;
use parking_lot::{RwLock, RwLockReadGuard, RwLockUpgradableReadGuard, RwLockWriteGuard};

use super::accessor::MemoryPtr;

/// Sticky failure cause recorded alongside the returned error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// A map, sync, unmap, or metadata syscall failed.
    Io,
    /// The file could not be extended; the disk is likely full.
    OutOfSpace,
}

const FAULT_NONE: u8 = 0;
const FAULT_IO: u8 = 1;
const FAULT_OUT_OF_SPACE: u8 = 2;

/// Mapping state guarded by the storage lock.
///
/// `data` caches the mutable base pointer of the current mapping so that
/// accessors holding only a shared guard can still write through it. The
/// pointer is replaced under the exclusive lock whenever the mapping moves.
pub(crate) struct MapInner {
    mmap: Option<MmapMut>,
    pub(crate) data: *mut u8,
    pub(crate) capacity: usize,
}

// SAFETY: sending MapInner between threads is sound because the raw pointer
// is derived from the owned mapping and dies with it. Shared access is sound
// because every dereference happens through MemoryPtr, which holds the
// storage's read lock for its lifetime, and the pointer is only replaced
// under the write lock.
unsafe impl Send for MapInner {}
unsafe impl Sync for MapInner {}

pub(crate) type MapGuard<'a> = RwLockReadGuard<'a, MapInner>;

/// A growable memory-mapped file region.
pub struct FileStorage {
    file: File,
    path: PathBuf,
    minimum: usize,
    expansion: usize,
    map: RwLock<MapInner>,
    logical: AtomicUsize,
    fault: AtomicU8,
}

impl FileStorage {
    /// Opens or creates the file at `path`, unmapped.
    ///
    /// Capacity and logical size start at the current file size; a fresh
    /// file starts at zero and is grown to `minimum` on first [`map`].
    ///
    /// [`map`]: FileStorage::map
    pub fn open<P: AsRef<Path>>(path: P, minimum: usize, expansion: usize) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .wrap_err_with(|| format!("failed to open storage file '{}'", path.display()))?;

        let size = file
            .metadata()
            .wrap_err_with(|| format!("failed to stat storage file '{}'", path.display()))?
            .len() as usize;

        Ok(Self {
            file,
            path,
            minimum: minimum.max(1),
            expansion,
            map: RwLock::new(MapInner {
                mmap: None,
                data: ptr::null_mut(),
                capacity: size,
            }),
            logical: AtomicUsize::new(size),
            fault: AtomicU8::new(FAULT_NONE),
        })
    }

    /// Maps the whole file read/write.
    ///
    /// Returns `Ok(false)` if the storage is already mapped. Empty files are
    /// grown to the minimum capacity first, since a zero-length mapping is
    /// not portable.
    pub fn map(&self) -> Result<bool> {
        let guard = self.map.upgradable_read();

        if guard.mmap.is_some() {
            return Ok(false);
        }

        let mut guard = RwLockUpgradableReadGuard::upgrade(guard);

        let mut size = guard.capacity;
        if size == 0 {
            size = self.minimum;
            self.file
                .set_len(size as u64)
                .map_err(|error| self.faulted(Fault::Io, error))
                .wrap_err_with(|| {
                    format!(
                        "failed to grow empty file '{}' to minimum capacity {}",
                        self.path.display(),
                        size
                    )
                })?;
        }

        // SAFETY: MmapMut::map_mut is unsafe because the file could be
        // modified externally or the mapping outlive the file handle. This
        // is safe because:
        // 1. The file handle is owned exclusively by this FileStorage
        // 2. Cross-process access to store files is unsupported
        // 3. The mapping is stored inside MapInner and dropped before or
        //    with the owning FileStorage
        let mut mmap = unsafe { MmapMut::map_mut(&self.file) }
            .map_err(|error| self.faulted(Fault::Io, error))
            .wrap_err_with(|| format!("failed to memory-map '{}'", self.path.display()))?;

        #[cfg(unix)]
        mmap.advise(memmap2::Advice::Random)
            .map_err(|error| self.faulted(Fault::Io, error))
            .wrap_err_with(|| {
                format!("failed to advise random access for '{}'", self.path.display())
            })?;

        guard.data = mmap.as_mut_ptr();
        guard.capacity = size;
        guard.mmap = Some(mmap);

        debug!("mapping: {} [{}]", self.path.display(), size);
        Ok(true)
    }

    /// Syncs the live region `[0, logical)` to disk. No-op when unmapped.
    pub fn flush(&self) -> Result<()> {
        let guard = self.map.read();

        let Some(mmap) = guard.mmap.as_ref() else {
            return Ok(());
        };

        let logical = self.logical.load(Ordering::Acquire).min(guard.capacity);
        mmap.flush_range(0, logical)
            .map_err(|error| self.faulted(Fault::Io, error))
            .wrap_err_with(|| format!("failed to flush '{}'", self.path.display()))?;

        debug!("flushed: {} [{}]", self.path.display(), logical);
        Ok(())
    }

    /// Syncs, unmaps, truncates the file to the logical size, and fsyncs.
    ///
    /// No-op when unmapped. On success the storage reads as unmapped; a
    /// failed sync leaves the mapping in place so the caller can retry.
    pub fn unmap(&self) -> Result<()> {
        let mut guard = self.map.write();

        if guard.mmap.is_none() {
            return Ok(());
        }

        let logical = self.logical.load(Ordering::Acquire);
        ensure!(
            logical <= guard.capacity,
            "logical size {} exceeds capacity {} in '{}'",
            logical,
            guard.capacity,
            self.path.display()
        );

        if let Some(mmap) = guard.mmap.as_ref() {
            mmap.flush_range(0, logical)
                .map_err(|error| self.faulted(Fault::Io, error))
                .wrap_err_with(|| {
                    format!("failed to sync '{}' before unmap", self.path.display())
                })?;
        }

        // Dropping the mapping is the munmap.
        guard.mmap = None;
        guard.data = ptr::null_mut();
        guard.capacity = logical;

        self.file
            .set_len(logical as u64)
            .map_err(|error| self.faulted(Fault::Io, error))
            .wrap_err_with(|| {
                format!(
                    "failed to truncate '{}' to logical size {}",
                    self.path.display(),
                    logical
                )
            })?;

        self.file
            .sync_all()
            .map_err(|error| self.faulted(Fault::Io, error))
            .wrap_err_with(|| format!("failed to fsync '{}'", self.path.display()))?;

        debug!("unmapped: {} [{}]", self.path.display(), logical);
        Ok(())
    }

    pub fn mapped(&self) -> bool {
        self.map.read().mmap.is_some()
    }

    pub fn capacity(&self) -> usize {
        self.map.read().capacity
    }

    pub fn logical(&self) -> usize {
        self.logical.load(Ordering::Acquire)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns a scoped accessor over the live region.
    ///
    /// The accessor holds the shared lock; no grow can begin while it is
    /// alive. Fails when the storage is not mapped.
    pub fn access(&self) -> Result<MemoryPtr<'_>> {
        let guard = self.map.read();

        ensure!(
            guard.mmap.is_some(),
            "store closed: '{}' is not mapped",
            self.path.display()
        );

        let end = self.logical.load(Ordering::Acquire);
        Ok(MemoryPtr::new(guard, 0, end))
    }

    /// Sets the logical size to exactly `required`, growing capacity without
    /// an expansion margin if needed. Also the shrink path for truncation.
    pub fn resize(&self, required: usize) -> Result<MemoryPtr<'_>> {
        self.reserve_with(required, 0, 0)
    }

    /// Sets the logical size to `required`, growing capacity by the
    /// configured expansion percentage if needed.
    pub fn reserve(&self, required: usize) -> Result<MemoryPtr<'_>> {
        self.reserve_with(required, self.minimum, self.expansion)
    }

    fn reserve_with(
        &self,
        required: usize,
        minimum: usize,
        expansion: usize,
    ) -> Result<MemoryPtr<'_>> {
        let guard = self.map.upgradable_read();

        ensure!(
            guard.mmap.is_some(),
            "store closed: cannot reserve {} bytes in '{}'",
            required,
            self.path.display()
        );

        let guard = if required > guard.capacity {
            let mut guard = RwLockUpgradableReadGuard::upgrade(guard);

            // Integer form of required * (1 + expansion / 100).
            let expanded = required.saturating_add(required.saturating_mul(expansion) / 100);
            let target = expanded.max(minimum);

            self.remap(&mut guard, target)?;
            RwLockWriteGuard::downgrade(guard)
        } else {
            RwLockUpgradableReadGuard::downgrade(guard)
        };

        self.logical.store(required, Ordering::Release);
        Ok(MemoryPtr::new(guard, 0, required))
    }

    /// Grows the file to `target` bytes and replaces the mapping.
    ///
    /// Called under the exclusive lock. All raw pointers into the previous
    /// mapping are invalid once this returns; outstanding accessors have
    /// already drained or the exclusive lock could not have been taken.
    fn remap(&self, inner: &mut MapInner, target: usize) -> Result<()> {
        debug!("resizing: {} [{}]", self.path.display(), target);

        if let Some(mmap) = inner.mmap.as_ref() {
            mmap.flush_async()
                .map_err(|error| self.faulted(Fault::Io, error))
                .wrap_err_with(|| {
                    format!("failed to flush '{}' before remap", self.path.display())
                })?;
        }

        self.file
            .set_len(target as u64)
            .map_err(|error| {
                warn!(
                    "resize failed: {} [{}], disk space may be low",
                    self.path.display(),
                    target
                );
                self.faulted(Fault::OutOfSpace, error)
            })
            .wrap_err_with(|| {
                format!("failed to extend '{}' to {} bytes", self.path.display(), target)
            })?;

        // SAFETY: MmapMut::map_mut is unsafe because the previous mapping is
        // invalidated when this one replaces it. This is safe because:
        // 1. The exclusive lock is held; no accessor can exist
        // 2. The old mapping was flushed above and is dropped on assignment
        // 3. The file was extended to target before mapping
        let mut mmap = unsafe { MmapMut::map_mut(&self.file) }
            .map_err(|error| self.faulted(Fault::Io, error))
            .wrap_err_with(|| format!("failed to remap '{}' after grow", self.path.display()))?;

        #[cfg(unix)]
        if let Err(error) = mmap.advise(memmap2::Advice::Random) {
            warn!("madvise failed after remap of {}: {}", self.path.display(), error);
        }

        inner.data = mmap.as_mut_ptr();
        inner.capacity = target;
        inner.mmap = Some(mmap);

        Ok(())
    }

    /// The sticky fault recorded by the first failed syscall, if any.
    pub fn fault(&self) -> Option<Fault> {
        match self.fault.load(Ordering::Acquire) {
            FAULT_IO => Some(Fault::Io),
            FAULT_OUT_OF_SPACE => Some(Fault::OutOfSpace),
            _ => None,
        }
    }

    /// Clears the fault state after the caller has re-established the store.
    pub fn clear_fault(&self) {
        self.fault.store(FAULT_NONE, Ordering::Release);
    }

    /// Records `fault` (first cause wins) and passes the error through.
    fn faulted(&self, fault: Fault, error: std::io::Error) -> std::io::Error {
        let code = match fault {
            Fault::Io => FAULT_IO,
            Fault::OutOfSpace => FAULT_OUT_OF_SPACE,
        };

        let _ = self
            .fault
            .compare_exchange(FAULT_NONE, code, Ordering::AcqRel, Ordering::Acquire);

        error
    }
}

impl std::fmt::Debug for FileStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStorage")
            .field("path", &self.path)
            .field("mapped", &self.mapped())
            .field("capacity", &self.capacity())
            .field("logical", &self.logical())
            .finish()
    }
}
