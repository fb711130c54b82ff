//! # Memory-Mapped Storage Layer
//!
//! This module provides the foundational storage layer for chainstore: a
//! growable memory-mapped file region with zero-copy access and a
//! reader/writer remap discipline.
//!
//! ## Architecture Overview
//!
//! Each table file is owned by one [`FileStorage`] that maps the entire file
//! read/write. Instead of copying bytes between kernel and user space, the
//! primitives read and write through scoped views of the mapping:
//!
//! - **Zero-copy access**: [`MemoryPtr`] exposes slices pointing directly
//!   into the mapped region
//! - **Minimal syscall overhead**: page faults are handled transparently by
//!   the OS
//! - **Geometric growth**: files grow by a configured percentage over the
//!   requested size, amortizing remaps under append load
//!
//! ## Logical Size vs Capacity
//!
//! The mapping covers `[0, capacity)` but only `[0, logical)` is live data.
//! The gap is reserved space that future allocations claim without a remap.
//! On clean close the file is truncated back to the logical size, so a file
//! on disk never carries reserved slack after shutdown.
//!
//! ## Safety Model
//!
//! A remap invalidates every raw pointer into the old mapping. The storage
//! therefore hands out access only through [`MemoryPtr`], a scoped handle
//! created under a shared lock. Growth upgrades to the exclusive lock, which
//! blocks until every outstanding handle has been released:
//!
//! ```text
//! access()            shared lock held for the MemoryPtr's lifetime
//! reserve()/resize()  upgradable lock; exclusive only while remapping
//! ```
//!
//! The critical rule for callers: code holding a `MemoryPtr` must not invoke
//! an operation on the same storage that could grow it, or the grow blocks
//! on the handle the caller will never release. Element codecs receive plain
//! byte slices for exactly this reason.
//!
//! ## Module Organization
//!
//! - `file_storage`: [`FileStorage`] lifecycle, growth, fault state
//! - `accessor`: [`MemoryPtr`] scoped access handle

mod accessor;
mod file_storage;

pub use accessor::MemoryPtr;
pub use file_storage::{Fault, FileStorage};
