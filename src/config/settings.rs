//! # Per-Table Settings
//!
//! Every on-disk table is described by a [`Settings`] value naming its files
//! and fixing the immutable shape parameters: bucket count, key size, payload
//! stride, and growth tuning. The bucket count is written into the header
//! file at creation and never changes for the lifetime of the files; the
//! remaining parameters must be supplied identically on every open.

use std::path::PathBuf;

use eyre::{ensure, Result};

use super::constants::{
    DEFAULT_EXPANSION, DEFAULT_MINIMUM, MAX_LINK_WIDTH, MIN_BUCKETS, MIN_LINK_WIDTH,
};

/// Shape and tuning parameters for one hash-map table.
///
/// `stride` is the payload size in bytes; zero selects slab mode, where
/// element payloads are variable-length and links are byte offsets.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Path of the header file (bucket array and body element count).
    pub header_path: PathBuf,
    /// Path of the body file (chained elements).
    pub body_path: PathBuf,
    /// Number of buckets in the header. Immutable after creation.
    pub buckets: u64,
    /// Byte length of keys. Must match the codec writing the table.
    pub key_size: usize,
    /// Payload stride in bytes; zero selects slab mode.
    pub stride: usize,
    /// Initial capacity floor for both files.
    pub minimum: usize,
    /// Growth percentage applied on demand.
    pub expansion: usize,
}

impl Settings {
    pub fn new<P: Into<PathBuf>>(header_path: P, body_path: P) -> Self {
        Self {
            header_path: header_path.into(),
            body_path: body_path.into(),
            buckets: MIN_BUCKETS,
            key_size: 0,
            stride: 0,
            minimum: DEFAULT_MINIMUM,
            expansion: DEFAULT_EXPANSION,
        }
    }

    pub fn buckets(mut self, buckets: u64) -> Self {
        self.buckets = buckets;
        self
    }

    pub fn key_size(mut self, key_size: usize) -> Self {
        self.key_size = key_size;
        self
    }

    pub fn stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn minimum(mut self, minimum: usize) -> Self {
        self.minimum = minimum;
        self
    }

    pub fn expansion(mut self, expansion: usize) -> Self {
        self.expansion = expansion;
        self
    }

    /// Checks the settings against the link width `W` the table will use.
    pub fn validate<const W: usize>(&self) -> Result<()> {
        ensure!(
            (MIN_LINK_WIDTH..=MAX_LINK_WIDTH).contains(&W),
            "link width {} outside supported range {}..={}",
            W,
            MIN_LINK_WIDTH,
            MAX_LINK_WIDTH
        );

        ensure!(
            self.buckets >= MIN_BUCKETS,
            "bucket count {} below minimum {}",
            self.buckets,
            MIN_BUCKETS
        );

        ensure!(self.key_size > 0, "key size must be at least one byte");

        ensure!(
            self.header_path != self.body_path,
            "header and body cannot share the file '{}'",
            self.body_path.display()
        );

        Ok(())
    }
}
