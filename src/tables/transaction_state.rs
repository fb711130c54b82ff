//! # Transaction State Cache
//!
//! Stored transactions are verified or protected by valid header
//! proof-of-work; the states are:
//!
//! - `Pooled`: confirmable if forks match; height is forks, position unused
//! - `Candidate`: confirmed in the header index; height is forks, position
//!   unused
//! - `Confirmed`: confirmed in the block index; height and position are
//!   block values
//!
//! Each row is a fixed nine-byte record keyed by transaction hash. The map
//! keeps duplicates, so a transaction's state history reads newest-first
//! along its chain; `first` always answers with the current state.

use eyre::{ensure, Result};
use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::Settings;
use crate::memory::{Fault, FileStorage};
use crate::primitives::{Element, HashMap, Link, Mode};

/// Byte length of a transaction hash key.
pub const TX_HASH_SIZE: usize = 32;

/// Confirmation state of a stored transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransactionState {
    Pooled = 0,
    Candidate = 1,
    Confirmed = 2,
}

impl TryFrom<u8> for TransactionState {
    type Error = eyre::Report;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Pooled),
            1 => Ok(Self::Candidate),
            2 => Ok(Self::Confirmed),
            other => Err(eyre::eyre!("invalid transaction state {other}")),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct RawTxState {
    height: U32,
    position: U32,
    state: u8,
}

const TX_STATE_SIZE: usize = std::mem::size_of::<RawTxState>();
const _: () = assert!(TX_STATE_SIZE == 9);

/// One transaction's confirmation record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TxStateRecord {
    /// Block height for confirmed transactions, forks otherwise.
    pub height: u32,
    /// Position within the block; unused unless confirmed.
    pub position: u32,
    pub state: TransactionState,
}

impl Element for TxStateRecord {
    fn count(&self) -> Link {
        1
    }

    fn to_data(&self, sink: &mut [u8]) -> Result<()> {
        ensure!(sink.len() >= TX_STATE_SIZE, "sink too small for tx state");

        let raw = RawTxState {
            height: U32::new(self.height),
            position: U32::new(self.position),
            state: self.state as u8,
        };
        sink[..TX_STATE_SIZE].copy_from_slice(raw.as_bytes());
        Ok(())
    }

    fn from_data(source: &[u8]) -> Result<Self> {
        ensure!(source.len() >= TX_STATE_SIZE, "source too small for tx state");

        let raw = RawTxState::ref_from_bytes(&source[..TX_STATE_SIZE])
            .map_err(|error| eyre::eyre!("failed to parse tx state: {error:?}"))?;

        Ok(Self {
            height: raw.height.get(),
            position: raw.position.get(),
            state: TransactionState::try_from(raw.state)?,
        })
    }
}

/// Transaction confirmation state map.
#[derive(Debug)]
pub struct TxStates {
    map: HashMap<4>,
}

impl TxStates {
    pub fn with_settings(settings: &Settings) -> Result<Self> {
        ensure!(
            settings.key_size == TX_HASH_SIZE && settings.stride == TX_STATE_SIZE,
            "tx state table requires {}-byte keys and {}-byte payloads",
            TX_HASH_SIZE,
            TX_STATE_SIZE
        );

        let header =
            FileStorage::open(&settings.header_path, settings.minimum, settings.expansion)?;
        let body = FileStorage::open(&settings.body_path, settings.minimum, settings.expansion)?;

        Ok(Self {
            map: HashMap::new(
                header,
                body,
                settings.buckets,
                TX_HASH_SIZE,
                Mode::Record(TX_STATE_SIZE),
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

    /// Records a new state for `tx_hash`, superseding prior entries.
    pub fn put(&self, tx_hash: &[u8; TX_HASH_SIZE], record: &TxStateRecord) -> Result<()> {
        self.map.put(tx_hash, record)
    }

    /// The current (most recently recorded) state of `tx_hash`.
    pub fn get(&self, tx_hash: &[u8; TX_HASH_SIZE]) -> Result<Option<TxStateRecord>> {
        let link = self.map.first(tx_hash)?;
        self.map.get(link)
    }

    /// Updates the newest record for `tx_hash` in place, without adding a
    /// history entry.
    pub fn update(&self, tx_hash: &[u8; TX_HASH_SIZE], record: &TxStateRecord) -> Result<bool> {
        let link = self.map.first(tx_hash)?;
        if link == HashMap::<4>::TERMINAL {
            return Ok(false);
        }

        self.map.set(link, record)?;
        Ok(true)
    }

    pub fn get_fault(&self) -> Option<Fault> {
        self.map.get_fault()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn table(dir: &tempfile::TempDir) -> TxStates {
        let settings = Settings::new(dir.path().join("tx.hdr"), dir.path().join("tx.body"))
            .buckets(100)
            .key_size(TX_HASH_SIZE)
            .stride(TX_STATE_SIZE);

        let table = TxStates::with_settings(&settings).unwrap();
        table.create().unwrap();
        table
    }

    #[test]
    fn record_round_trips_bit_identical() {
        let record = TxStateRecord {
            height: 812_383,
            position: 1_043,
            state: TransactionState::Confirmed,
        };

        let mut bytes = [0u8; TX_STATE_SIZE];
        record.to_data(&mut bytes).unwrap();
        assert_eq!(
            bytes,
            [0x5f, 0x65, 0x0c, 0x00, 0x13, 0x04, 0x00, 0x00, 0x02]
        );

        assert_eq!(TxStateRecord::from_data(&bytes).unwrap(), record);
    }

    #[test]
    fn invalid_state_byte_is_rejected() {
        let bytes = [0u8, 0, 0, 0, 0, 0, 0, 0, 9];
        assert!(TxStateRecord::from_data(&bytes).is_err());
    }

    #[test]
    fn latest_state_wins() {
        let dir = tempdir().unwrap();
        let table = table(&dir);
        let hash = [7u8; 32];

        table
            .put(
                &hash,
                &TxStateRecord {
                    height: 5,
                    position: 0,
                    state: TransactionState::Pooled,
                },
            )
            .unwrap();
        table
            .put(
                &hash,
                &TxStateRecord {
                    height: 812_000,
                    position: 3,
                    state: TransactionState::Confirmed,
                },
            )
            .unwrap();

        let current = table.get(&hash).unwrap().unwrap();
        assert_eq!(current.state, TransactionState::Confirmed);
        assert_eq!(current.height, 812_000);
    }

    #[test]
    fn update_rewrites_in_place() {
        let dir = tempdir().unwrap();
        let table = table(&dir);
        let hash = [9u8; 32];

        let pooled = TxStateRecord {
            height: 1,
            position: 0,
            state: TransactionState::Pooled,
        };
        table.put(&hash, &pooled).unwrap();

        let confirmed = TxStateRecord {
            height: 2,
            position: 1,
            state: TransactionState::Confirmed,
        };
        assert!(table.update(&hash, &confirmed).unwrap());

        assert_eq!(table.get(&hash).unwrap(), Some(confirmed));
        assert_eq!(table.map.count(), 1);
    }

    #[test]
    fn update_of_absent_hash_is_false() {
        let dir = tempdir().unwrap();
        let table = table(&dir);

        let record = TxStateRecord {
            height: 0,
            position: 0,
            state: TransactionState::Pooled,
        };
        assert!(!table.update(&[1u8; 32], &record).unwrap());
    }
}
