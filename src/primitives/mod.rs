//! # On-Disk Primitives
//!
//! The two collections every table in the store is built from, plus the
//! link and element plumbing they share:
//!
//! - [`ArrayMap`]: a keyless record array or slab arena; elements are
//!   addressed by the link `put` returned
//! - [`HashMap`]: a chained-bucket hash index over a header file and a body
//!   file, with first-class duplicate keys
//!
//! ## Addressing
//!
//! Every element is addressed by a [`Link`] of fixed on-disk width `W`
//! (a const generic on each primitive). Record-mode links are record
//! indexes; slab-mode links are byte offsets. The all-ones value over `W`
//! bytes is the shared terminal sentinel.
//!
//! ## Append Discipline
//!
//! Bodies only grow. `allocate` hands out strictly increasing links, and
//! the sole shrinking operation is a tail truncation used during recovery.
//! The hash map builds its durability story on this: elements become
//! discoverable only after their bytes are fully written, so interrupted
//! writes leave nothing reachable behind.

mod arraymap;
mod element;
mod hashmap;
mod head;
mod link;
mod manager;

pub use arraymap::ArrayMap;
pub use element::Element;
pub use hashmap::{HashMap, HashMapIterator};
pub use head::Head;
pub use link::{link_bytes, read_link, terminal, write_link, Link};
pub use manager::{Manager, Mode};
