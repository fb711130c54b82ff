//! # Hash-Map Header
//!
//! [`Head`] owns the header file of a hash map: the authoritative body
//! element count followed by the bucket array. Each bucket holds the link of
//! the newest element whose key hashes to it, or the terminal sentinel.
//!
//! ## On-Disk Layout
//!
//! ```text
//! Offset        Size  Field
//! 0             W     body_count (elements in body at last clean close)
//! W             W     bucket[0]
//! ...
//! W + (N-1)*W   W     bucket[N-1]
//! ```
//!
//! The bucket count `N` is fixed at creation for the lifetime of the files.
//! `body_count` is only written by `backup`/`close`, which makes it the
//! recovery watermark: body elements past it were never confirmed durable
//! and are discarded by `restore`.

use eyre::{ensure, Result};
use log::debug;
use parking_lot::Mutex;

use crate::memory::{FileStorage, MemoryPtr};

use super::link::{link_bytes, read_link, terminal, Link};

/// Bucket array and body count over one header storage.
#[derive(Debug)]
pub struct Head<const W: usize> {
    storage: FileStorage,
    buckets: u64,
    index_mutex: Mutex<()>,
}

impl<const W: usize> Head<W> {
    /// The reserved "none" link for this width.
    pub const TERMINAL: Link = terminal::<W>();

    pub fn new(storage: FileStorage, buckets: u64) -> Self {
        Self {
            storage,
            buckets,
            index_mutex: Mutex::new(()),
        }
    }

    pub fn storage(&self) -> &FileStorage {
        &self.storage
    }

    pub fn buckets(&self) -> u64 {
        self.buckets
    }

    fn size(&self) -> usize {
        W + self.buckets as usize * W
    }

    fn bucket_offset(&self, index: u64) -> usize {
        W + index as usize * W
    }

    /// Writes a fresh header: zero body count, every bucket terminal.
    pub fn create(&self) -> Result<()> {
        let size = self.size();
        let memory = self.storage.resize(size)?;

        memory.write(0, &link_bytes::<W>(0)[..W]);
        memory.fill(W, size - W, 0xff);

        debug!(
            "created header: {} [{} buckets]",
            self.storage.path().display(),
            self.buckets
        );
        Ok(())
    }

    /// Structural check: the header spans exactly the expected size.
    pub fn verify(&self) -> Result<bool> {
        Ok(self.storage.logical() == self.size())
    }

    /// The body element count persisted at the last clean close.
    pub fn get_body_count(&self) -> Result<Link> {
        let memory = self.storage.access()?;
        Ok(read_link::<W>(memory.slice(0, W)))
    }

    pub fn set_body_count(&self, count: Link) -> Result<()> {
        ensure!(
            count != Self::TERMINAL,
            "body count cannot be the terminal value"
        );

        let memory = self.storage.access()?;
        memory.write(0, &link_bytes::<W>(count)[..W]);
        Ok(())
    }

    /// Maps a key to its bucket: the leading `W` key bytes read as a
    /// little-endian integer, modulo the bucket count.
    ///
    /// Uniform only for cryptographically distributed keys, which is what
    /// every table in this domain stores.
    pub fn index(&self, key: &[u8]) -> u64 {
        let width = W.min(key.len());
        let mut raw = [0u8; 8];
        raw[..width].copy_from_slice(&key[..width]);
        u64::from_le_bytes(raw) % self.buckets
    }

    /// The link at the head of the chain for bucket `index`.
    pub fn top(&self, index: u64) -> Result<Link> {
        ensure!(
            index < self.buckets,
            "bucket {} out of range (buckets={})",
            index,
            self.buckets
        );

        let memory = self.storage.access()?;
        Ok(read_link::<W>(memory.slice(self.bucket_offset(index), W)))
    }

    /// Splices a new element at the head of bucket `index`.
    ///
    /// `element` must be an accessor positioned at the element's start in
    /// the body, whose leading `W` bytes are the next-link slot. Under the
    /// index mutex: the old bucket head is written into that slot, then the
    /// bucket is pointed at `link`. No interleaving `push` on any bucket can
    /// observe the splice half-done.
    pub fn push(&self, link: Link, element: &MemoryPtr<'_>, index: u64) -> Result<()> {
        ensure!(
            index < self.buckets,
            "bucket {} out of range (buckets={})",
            index,
            self.buckets
        );
        ensure!(link != Self::TERMINAL, "cannot index the terminal link");

        let offset = self.bucket_offset(index);
        let _guard = self.index_mutex.lock();
        let memory = self.storage.access()?;

        let top = read_link::<W>(memory.slice(offset, W));
        element.write(0, &link_bytes::<W>(top)[..W]);
        memory.write(offset, &link_bytes::<W>(link)[..W]);

        Ok(())
    }
}
