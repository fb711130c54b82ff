//! # Chained-Bucket Hash Map
//!
//! [`HashMap`] composes a [`Head`] over a header file with a [`Manager`]
//! over a body file. Elements are appended to the body and spliced into the
//! bucket their key hashes to; duplicates are first-class and iterate in
//! insertion-LIFO order (newest first).
//!
//! ## Body Element Layout
//!
//! ```text
//! [0, W)            next link (terminal = end of chain)
//! [W, W+key_size)   key bytes
//! [W+key_size, ..)  payload (stride bytes, or variable in slab mode)
//! ```
//!
//! ## Deferred Index Commit
//!
//! `put` writes the element's payload and key completely before the splice
//! publishes its link into the bucket. A reader walking a chain therefore
//! never observes a torn element. If the process dies mid-write, the
//! allocation is unreferenced garbage at the body's tail; `restore` on the
//! next open truncates back to the body count persisted by the last clean
//! `close`/`backup`.
//!
//! ## Lifecycle
//!
//! ```text
//! Closed --create/open--> Open --close--> Closed
//! ```
//!
//! `backup` snapshots the body count while open; `restore` runs after a
//! crash, between `open` and use. Operations on a closed map fail with the
//! storage's closed-store error.

use eyre::{ensure, Result, WrapErr};
use log::warn;

use crate::config::Settings;
use crate::memory::{Fault, FileStorage, MemoryPtr};

use super::element::Element;
use super::head::Head;
use super::link::{read_link, terminal, Link};
use super::manager::{Manager, Mode};

/// A file-backed hash map with duplicate keys and LIFO chains.
#[derive(Debug)]
pub struct HashMap<const W: usize> {
    head: Head<W>,
    manager: Manager<W>,
    key_size: usize,
}

impl<const W: usize> HashMap<W> {
    /// The reserved "none" link for this width.
    pub const TERMINAL: Link = terminal::<W>();

    /// Composes a map from its two storages.
    ///
    /// `payload` is the payload shape: `Mode::Record(stride)` for fixed
    /// payloads of `stride` bytes (zero is legal and stores a presence-only
    /// table), `Mode::Slab` for variable payloads.
    pub fn new(
        header: FileStorage,
        body: FileStorage,
        buckets: u64,
        key_size: usize,
        payload: Mode,
    ) -> Result<Self> {
        ensure!(key_size > 0, "key size must be at least one byte");

        let mode = match payload {
            Mode::Record(stride) => Mode::Record(W + key_size + stride),
            Mode::Slab => Mode::Slab,
        };

        Ok(Self {
            head: Head::new(header, buckets),
            manager: Manager::new(body, mode)?,
            key_size,
        })
    }

    /// Opens both storages described by `settings` and composes a map.
    ///
    /// The storages are not mapped; follow with [`create`](Self::create) or
    /// [`open`](Self::open).
    pub fn with_settings(settings: &Settings) -> Result<Self> {
        settings.validate::<W>()?;

        let header = FileStorage::open(
            &settings.header_path,
            settings.minimum,
            settings.expansion,
        )?;
        let body = FileStorage::open(&settings.body_path, settings.minimum, settings.expansion)?;

        let payload = match settings.stride {
            0 => Mode::Slab,
            stride => Mode::Record(stride),
        };

        Self::new(header, body, settings.buckets, settings.key_size, payload)
    }

    fn prefix(&self) -> usize {
        W + self.key_size
    }

    fn element_position(&self, link: Link) -> usize {
        match self.manager.mode() {
            Mode::Record(stride) => link as usize * stride,
            Mode::Slab => link as usize,
        }
    }

    /// Walks a chain from `link`, returning the first element whose key
    /// equals `key`, or terminal. Links pointing outside the live body end
    /// the walk; they arise from an unrestored header after a crash.
    fn find_in_chain(&self, memory: &MemoryPtr<'_>, mut link: Link, key: &[u8]) -> Link {
        let prefix = self.prefix();

        while link != Self::TERMINAL {
            let position = self.element_position(link);
            if position + prefix > memory.size() {
                return Self::TERMINAL;
            }

            if memory.slice(position + W, self.key_size) == key {
                return link;
            }

            link = read_link::<W>(memory.slice(position, W));
        }

        Self::TERMINAL
    }

    fn next_of(&self, memory: &MemoryPtr<'_>, link: Link) -> Link {
        let position = self.element_position(link);
        if position + W > memory.size() {
            return Self::TERMINAL;
        }
        read_link::<W>(memory.slice(position, W))
    }

    // Lifecycle.

    /// Initializes both files: fresh header, empty body.
    pub fn create(&self) -> Result<()> {
        self.head.storage().map()?;
        self.manager.storage().map()?;

        self.head.create()?;
        self.manager.truncate(0)?;
        self.flush()?;

        Ok(())
    }

    /// Maps both files without initializing them.
    pub fn open(&self) -> Result<()> {
        self.head.storage().map()?;
        self.manager.storage().map()?;
        Ok(())
    }

    /// Persists the body count and syncs both files.
    pub fn backup(&self) -> Result<()> {
        self.head.set_body_count(self.manager.count())?;
        self.flush()
    }

    /// Backs up, then unmaps both files (truncating them to logical size).
    pub fn close(&self) -> Result<()> {
        if self.head.storage().mapped() {
            self.backup()?;
        }

        self.head.storage().unmap()?;
        self.manager.storage().unmap()?;
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.head.storage().flush()?;
        self.manager.storage().flush()?;
        Ok(())
    }

    /// Truncates the body to the persisted count, discarding elements never
    /// confirmed durable. Returns `Ok(false)` when the header is corrupt
    /// (persisted count past the body's end).
    pub fn restore(&self) -> Result<bool> {
        if !self.head.verify()? {
            return Ok(false);
        }

        let count = self.head.get_body_count()?;
        if count == Self::TERMINAL || count > self.manager.count() {
            warn!(
                "corrupt body count {} (body holds {})",
                count,
                self.manager.count()
            );
            return Ok(false);
        }

        self.manager
            .truncate(count)
            .wrap_err("failed to truncate body during restore")?;
        Ok(true)
    }

    /// Structural check: header well-formed and body count in agreement.
    pub fn verify(&self) -> Result<bool> {
        Ok(self.head.verify()? && self.head.get_body_count()? == self.manager.count())
    }

    // Queries.

    pub fn buckets(&self) -> u64 {
        self.head.buckets()
    }

    pub fn count(&self) -> Link {
        self.manager.count()
    }

    pub fn exists(&self, key: &[u8]) -> Result<bool> {
        Ok(self.first(key)? != Self::TERMINAL)
    }

    /// The most recently inserted element with `key`, or terminal.
    pub fn first(&self, key: &[u8]) -> Result<Link> {
        ensure!(key.len() == self.key_size, "key length mismatch");

        let top = self.head.top(self.head.index(key))?;
        let memory = self.manager.access()?;
        Ok(self.find_in_chain(&memory, top, key))
    }

    /// A cursor over every element with `key`, newest first.
    ///
    /// The cursor pins the body mapping for its lifetime.
    pub fn it(&self, key: &[u8]) -> Result<HashMapIterator<'_, W>> {
        ensure!(key.len() == self.key_size, "key length mismatch");

        let top = self.head.top(self.head.index(key))?;
        let memory = self.manager.access()?;
        let link = self.find_in_chain(&memory, top, key);

        Ok(HashMapIterator {
            map: self,
            memory,
            key: key.to_vec(),
            link,
        })
    }

    /// Decodes the payload of the element at `link`.
    pub fn get<T: Element>(&self, link: Link) -> Result<Option<T>> {
        let Some(memory) = self.manager.get(link)? else {
            return Ok(None);
        };

        let prefix = self.prefix();
        ensure!(
            memory.size() >= prefix,
            "element at {} truncated before its payload",
            link
        );

        let element = T::from_data(memory.slice(prefix, memory.size() - prefix))?;
        Ok(Some(element))
    }

    // Mutation.

    /// Reserves `n` units without writing or indexing them.
    pub fn allocate(&self, n: Link) -> Result<Link> {
        self.manager.allocate(n)
    }

    /// Overwrites the payload of an already-allocated element. The index is
    /// untouched, so fields can change without re-hashing.
    pub fn set<T: Element>(&self, link: Link, element: &T) -> Result<()> {
        let memory = self
            .manager
            .get(link)?
            .ok_or_else(|| eyre::eyre!("cannot set element at link {link}"))?;

        let prefix = self.prefix();
        let len = match self.manager.mode() {
            Mode::Record(stride) => (element.count() as usize * stride)
                .checked_sub(prefix)
                .ok_or_else(|| eyre::eyre!("element shorter than its row prefix"))?,
            Mode::Slab => element.count() as usize,
        };

        // SAFETY: either the element was just allocated and is exclusive to
        // this writer until committed, or the caller owns the published
        // element's mutation per the single-mutator discipline.
        let sink = unsafe { memory.slice_mut(prefix, len) };
        element.to_data(sink)
    }

    /// Allocates and writes `element` without publishing it to the index.
    pub fn set_link<T: Element>(&self, element: &T) -> Result<Link> {
        let units = match self.manager.mode() {
            Mode::Record(_) => element.count(),
            Mode::Slab => (self.prefix() as Link)
                .checked_add(element.count())
                .ok_or_else(|| eyre::eyre!("element size overflows the slab"))?,
        };

        let link = self.manager.allocate(units)?;
        self.set(link, element)?;
        Ok(link)
    }

    /// Publishes the element at `link` under `key`: writes the key field,
    /// then splices the link into its bucket. The element's payload must be
    /// fully written first; this is the deferred index commit.
    pub fn commit(&self, link: Link, key: &[u8]) -> Result<()> {
        ensure!(key.len() == self.key_size, "key length mismatch");

        let memory = self
            .manager
            .get(link)?
            .ok_or_else(|| eyre::eyre!("cannot commit element at link {link}"))?;

        memory.write(W, key);
        self.head.push(link, &memory, self.head.index(key))
    }

    /// Inserts `element` under `key`, returning its link.
    pub fn put_link<T: Element>(&self, key: &[u8], element: &T) -> Result<Link> {
        let link = self.set_link(element)?;
        self.commit(link, key)?;
        Ok(link)
    }

    /// Inserts `element` under `key`.
    pub fn put<T: Element>(&self, key: &[u8], element: &T) -> Result<()> {
        self.put_link(key, element).map(|_| ())
    }

    pub fn get_fault(&self) -> Option<Fault> {
        self.head.storage().fault().or(self.manager.get_fault())
    }
}

/// A cursor positioned on the matches for one key, newest first.
pub struct HashMapIterator<'a, const W: usize> {
    map: &'a HashMap<W>,
    memory: MemoryPtr<'a>,
    key: Vec<u8>,
    link: Link,
}

impl<const W: usize> HashMapIterator<'_, W> {
    /// The link under the cursor; terminal when exhausted.
    pub fn link(&self) -> Link {
        self.link
    }

    /// Moves to the next element with the same key. Returns `false` when
    /// the chain is exhausted.
    pub fn advance(&mut self) -> bool {
        if self.link == HashMap::<W>::TERMINAL {
            return false;
        }

        let next = self.map.next_of(&self.memory, self.link);
        self.link = self.map.find_in_chain(&self.memory, next, &self.key);
        self.link != HashMap::<W>::TERMINAL
    }
}

impl<const W: usize> Iterator for HashMapIterator<'_, W> {
    type Item = Link;

    fn next(&mut self) -> Option<Link> {
        if self.link == HashMap::<W>::TERMINAL {
            return None;
        }

        let current = self.link;
        self.advance();
        Some(current)
    }
}
