//! # Element Codecs
//!
//! Elements are caller-defined payloads stored in record or slab bodies.
//! Codecs operate on plain byte slices carved out of an accessor, never on
//! the store itself, so a codec cannot trigger an allocation (and with it a
//! remap) while the element's region is pinned.

use eyre::Result;

use super::link::Link;

/// A payload that can be stored in an [`ArrayMap`](super::ArrayMap) or
/// [`HashMap`](super::HashMap) body.
pub trait Element: Sized {
    /// Allocation units this element occupies: records for record-mode
    /// stores, payload bytes for slab-mode stores.
    fn count(&self) -> Link;

    /// Writes the payload into `sink`, which spans exactly the bytes the
    /// store reserved for it.
    fn to_data(&self, sink: &mut [u8]) -> Result<()>;

    /// Decodes a payload from `source`, which begins at the payload and
    /// extends to the end of the live body.
    fn from_data(source: &[u8]) -> Result<Self>;
}
