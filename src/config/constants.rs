//! # Engine Constants
//!
//! Defaults and limits shared by the storage layer and the on-disk
//! primitives. The growth defaults reproduce the append-dominant tuning the
//! engine is built around: files start at a one-byte floor and grow by 50%
//! over the requested size, so bulk writes amortize remaps while idle tables
//! cost almost nothing on disk.

/// Percentage added on top of a requested size when a storage file grows.
///
/// A value of 50 grows the file to 150% of the requested size. Growth always
/// remaps, invalidating raw pointers, so the margin trades disk slack for
/// fewer remaps under sustained append load.
pub const DEFAULT_EXPANSION: usize = 50;

/// Minimum capacity (in bytes) of a storage file.
///
/// An empty file cannot be memory-mapped, so storage grows new files to this
/// floor before the first map.
pub const DEFAULT_MINIMUM: usize = 1;

/// Narrowest link width validated by [`Settings`](super::Settings), in bytes.
///
/// Three bytes address 16 MiB of slab or 2^24 - 1 records, the smallest
/// width useful for a production table.
pub const MIN_LINK_WIDTH: usize = 3;

/// Widest link width validated by [`Settings`](super::Settings), in bytes.
///
/// Five bytes address 1 TiB of slab, sufficient for the largest body files
/// the engine targets. Wider links waste row space on every element.
pub const MAX_LINK_WIDTH: usize = 5;

/// Minimum bucket count for a hash-map header.
pub const MIN_BUCKETS: u64 = 1;
