//! # Array Map
//!
//! A keyless element store over one body file: callers address elements
//! directly by the link `put` returned. Used for tables whose key is the
//! link itself (for example, confirmed-position arrays keyed by height) and
//! for slab arenas referenced from other tables.

use eyre::{ensure, Result};

use crate::memory::{Fault, FileStorage};

use super::element::Element;
use super::link::Link;
use super::manager::{Manager, Mode};

/// A record array or slab arena with link addressing and no index.
#[derive(Debug)]
pub struct ArrayMap<const W: usize> {
    manager: Manager<W>,
}

impl<const W: usize> ArrayMap<W> {
    /// The reserved "none" link for this width.
    pub const TERMINAL: Link = Manager::<W>::TERMINAL;

    pub fn new(storage: FileStorage, mode: Mode) -> Result<Self> {
        Ok(Self {
            manager: Manager::new(storage, mode)?,
        })
    }

    pub fn manager(&self) -> &Manager<W> {
        &self.manager
    }

    pub fn count(&self) -> Link {
        self.manager.count()
    }

    /// Allocates and writes `element`, returning its link.
    pub fn put<T: Element>(&self, element: &T) -> Result<Link> {
        let units = element.count();
        let link = self.manager.allocate(units)?;

        let memory = self
            .manager
            .get(link)?
            .ok_or_else(|| eyre::eyre!("allocated link {link} did not resolve"))?;

        let len = match self.manager.mode() {
            Mode::Record(stride) => units as usize * stride,
            Mode::Slab => units as usize,
        };

        // SAFETY: the region was just allocated and its link has not been
        // returned to the caller, so this writer is its only user.
        let sink = unsafe { memory.slice_mut(0, len) };
        element.to_data(sink)?;

        Ok(link)
    }

    /// Resolves and decodes the element at `link`, or `None` for the
    /// terminal link or a link outside the live body.
    pub fn get<T: Element>(&self, link: Link) -> Result<Option<T>> {
        let Some(memory) = self.manager.get(link)? else {
            return Ok(None);
        };

        let element = T::from_data(memory.slice(0, memory.size()))?;
        Ok(Some(element))
    }

    /// Discards all elements at positions at or past `link`.
    pub fn truncate(&self, link: Link) -> Result<()> {
        self.manager.truncate(link)
    }

    pub fn open(&self) -> Result<()> {
        self.manager.storage().map()?;
        Ok(())
    }

    pub fn close(&self) -> Result<()> {
        ensure!(
            self.manager.get_fault().is_none(),
            "refusing clean close of a faulted store"
        );
        self.manager.storage().unmap()
    }

    pub fn flush(&self) -> Result<()> {
        self.manager.storage().flush()
    }

    pub fn get_fault(&self) -> Option<Fault> {
        self.manager.get_fault()
    }
}
