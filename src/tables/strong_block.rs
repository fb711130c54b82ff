//! # Strong Block Cache
//!
//! A record hash map of block confirmation state keyed by block hash. The
//! record carries no payload: membership is the datum. A block hash present
//! in the table is "strong" — confirmed in the current block index.
//!
//! The zero-byte payload is by design: each row is just the chain link and
//! the key, and `exists` is the whole query surface.

use eyre::{ensure, Result};

use crate::config::Settings;
use crate::memory::Fault;
use crate::primitives::{Element, HashMap, Link, Mode};

/// Byte length of a block hash key.
pub const BLOCK_HASH_SIZE: usize = 32;

/// The empty confirmation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StrongBlockRecord;

impl Element for StrongBlockRecord {
    fn count(&self) -> Link {
        1
    }

    fn to_data(&self, sink: &mut [u8]) -> Result<()> {
        ensure!(sink.is_empty(), "confirmation record has no payload");
        Ok(())
    }

    fn from_data(_source: &[u8]) -> Result<Self> {
        Ok(Self)
    }
}

/// Block confirmation presence map.
#[derive(Debug)]
pub struct StrongBlock {
    map: HashMap<4>,
}

impl StrongBlock {
    pub fn with_settings(settings: &Settings) -> Result<Self> {
        ensure!(
            settings.key_size == BLOCK_HASH_SIZE && settings.stride == 0,
            "strong block table requires {}-byte keys and no payload",
            BLOCK_HASH_SIZE
        );

        let header = crate::memory::FileStorage::open(
            &settings.header_path,
            settings.minimum,
            settings.expansion,
        )?;
        let body = crate::memory::FileStorage::open(
            &settings.body_path,
            settings.minimum,
            settings.expansion,
        )?;

        Ok(Self {
            map: HashMap::new(
                header,
                body,
                settings.buckets,
                BLOCK_HASH_SIZE,
                Mode::Record(0),
            )?,
        })
    }

    pub fn create(&self) -> Result<()> {
        self.map.create()
    }

    pub fn open(&self) -> Result<()> {
        self.map.open()
    }

    pub fn close(&self) -> Result<()> {
        self.map.close()
    }

    pub fn backup(&self) -> Result<()> {
        self.map.backup()
    }

    pub fn restore(&self) -> Result<bool> {
        self.map.restore()
    }

    pub fn verify(&self) -> Result<bool> {
        self.map.verify()
    }

    /// Marks `block_hash` as confirmed.
    pub fn mark(&self, block_hash: &[u8; BLOCK_HASH_SIZE]) -> Result<()> {
        self.map.put(block_hash, &StrongBlockRecord)
    }

    /// Whether `block_hash` is confirmed in the block index.
    pub fn is_strong(&self, block_hash: &[u8; BLOCK_HASH_SIZE]) -> Result<bool> {
        self.map.exists(block_hash)
    }

    pub fn get_fault(&self) -> Option<Fault> {
        self.map.get_fault()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn table(dir: &tempfile::TempDir) -> StrongBlock {
        let settings = Settings::new(
            dir.path().join("strong.hdr"),
            dir.path().join("strong.body"),
        )
        .buckets(100)
        .key_size(BLOCK_HASH_SIZE);

        let table = StrongBlock::with_settings(&settings).unwrap();
        table.create().unwrap();
        table
    }

    #[test]
    fn unmarked_hash_is_not_strong() {
        let dir = tempdir().unwrap();
        let table = table(&dir);

        assert!(!table.is_strong(&[0u8; 32]).unwrap());
    }

    #[test]
    fn marked_hash_is_strong() {
        let dir = tempdir().unwrap();
        let table = table(&dir);

        let mut hash = [0u8; 32];
        hash[..4].copy_from_slice(&[0x85, 0xd0, 0xb0, 0x2a]);

        table.mark(&hash).unwrap();

        assert!(table.is_strong(&hash).unwrap());
        assert!(!table.is_strong(&[0u8; 32]).unwrap());
    }

    #[test]
    fn presence_survives_close_and_reopen() {
        let dir = tempdir().unwrap();
        let hash = [0x42u8; 32];

        let settings = Settings::new(
            dir.path().join("strong.hdr"),
            dir.path().join("strong.body"),
        )
        .buckets(100)
        .key_size(BLOCK_HASH_SIZE);

        {
            let table = StrongBlock::with_settings(&settings).unwrap();
            table.create().unwrap();
            table.mark(&hash).unwrap();
            table.close().unwrap();
        }

        let table = StrongBlock::with_settings(&settings).unwrap();
        table.open().unwrap();

        assert!(table.verify().unwrap());
        assert!(table.is_strong(&hash).unwrap());
    }

    #[test]
    fn rejects_mismatched_settings() {
        let dir = tempdir().unwrap();
        let settings = Settings::new(dir.path().join("h"), dir.path().join("b"))
            .buckets(10)
            .key_size(16);

        assert!(StrongBlock::with_settings(&settings).is_err());
    }
}
