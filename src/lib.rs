//! # chainstore - Memory-Mapped Blockchain Storage Primitives
//!
//! chainstore is the storage engine of an append-dominant blockchain
//! database: two file-backed collections layered on a growable
//! memory-mapped region. This Rust implementation prioritizes:
//!
//! - **Zero-copy data access**: elements are read and written directly in
//!   the mapped file, no intermediate buffers
//! - **Append-only bodies**: allocation is monotone, links never move, and
//!   recovery is a tail truncation
//! - **Torn-write immunity**: an element becomes discoverable only after
//!   its bytes are fully written
//!
//! ## Quick Start
//!
//! ```ignore
//! use chainstore::{HashMap, Mode, Settings};
//!
//! let settings = Settings::new("blocks.hdr", "blocks.body")
//!     .buckets(650_000)
//!     .key_size(32)
//!     .stride(80);
//!
//! let map: HashMap<4> = HashMap::with_settings(&settings)?;
//! map.create()?;
//!
//! map.put(&block_hash, &header)?;
//! let link = map.first(&block_hash)?;
//! let header: BlockHeader = map.get(link)?.unwrap();
//!
//! map.close()?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │   Tables (strong_block, tx_state, ...)  │
//! ├────────────────────┬────────────────────┤
//! │      HashMap       │      ArrayMap      │
//! ├─────────┬──────────┼────────────────────┤
//! │  Head   │       Manager (record/slab)   │
//! ├─────────┴───────────────────────────────┤
//! │   FileStorage + MemoryPtr (mmap layer)  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! A hash map spans two files: a header holding the bucket array and the
//! recovery watermark, and a body holding chained elements. An array map is
//! a body alone, addressed by the links `put` returns.
//!
//! ## Concurrency Model
//!
//! Each storage runs a shared-writers / exclusive-resizer discipline:
//! readers and writers hold scoped accessors under a shared lock, and a
//! grow takes the exclusive lock, draining accessors first. Allocation and
//! bucket splicing serialize on their own mutexes. The one rule callers
//! must keep: never trigger an allocation while holding an accessor on the
//! same storage.
//!
//! ## Module Overview
//!
//! - [`memory`]: memory-mapped file storage and scoped accessors
//! - [`primitives`]: links, elements, the record/slab manager, and the two
//!   collections
//! - [`tables`]: blockchain cache tables built on the primitives
//! - [`config`]: engine constants and per-table settings

pub mod config;
pub mod memory;
pub mod primitives;
pub mod tables;

pub use config::Settings;
pub use memory::{Fault, FileStorage, MemoryPtr};
pub use primitives::{ArrayMap, Element, HashMap, HashMapIterator, Head, Link, Manager, Mode};
