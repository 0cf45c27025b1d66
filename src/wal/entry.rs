//! WAL Entry definitions
//!
//! Defines the structure of individual WAL log entries and their framing.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{KvError, Result};
use crate::types::{ContainerId, Epoch, ObjectId, Recx};

/// Record header: LSN (8) + CRC (4) + Len (4)
pub const HEADER_SIZE: usize = 16;

/// Upper bound on a single record's payload; larger lengths mean a corrupt header
pub const MAX_RECORD_SIZE: u32 = 256 * 1024 * 1024;

/// A single entry in the WAL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalEntry {
    /// Log Sequence Number - monotonically increasing
    pub lsn: u64,

    /// The operation to replay
    pub operation: Operation,

    /// Timestamp (unix millis) when entry was created
    pub timestamp: u64,
}

/// Operations that can be logged
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// A committed update (buffered or zero-copy); punches carry `rsize == 0`
    Update {
        container: ContainerId,
        oid: ObjectId,
        epoch: Epoch,
        dkey: Vec<u8>,
        extents: Vec<LoggedExtent>,
    },

    /// An object index entry created without data
    CreateObject { container: ContainerId, oid: ObjectId },
}

/// One extent of a logged update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedExtent {
    pub akey: Vec<u8>,
    pub recx: Recx,
    pub data: Vec<u8>,
}

impl WalEntry {
    /// Create an entry stamped with the current time
    pub fn new(lsn: u64, operation: Operation) -> Self {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            lsn,
            operation,
            timestamp,
        }
    }

    /// Encode as a framed record: `[lsn][crc][len][payload]`
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let payload = bincode::serialize(self)?;
        if payload.len() > MAX_RECORD_SIZE as usize {
            return Err(KvError::invalid(format!(
                "WAL record of {} bytes exceeds the {} byte limit",
                payload.len(),
                MAX_RECORD_SIZE
            )));
        }

        let lsn_bytes = self.lsn.to_le_bytes();
        let crc = Self::compute_crc(&lsn_bytes, &payload);

        let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
        frame.extend_from_slice(&lsn_bytes);
        frame.extend_from_slice(&crc.to_le_bytes());
        frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        frame.extend_from_slice(&payload);
        Ok(frame)
    }

    /// Decode a payload whose header fields were already read
    pub fn deserialize(lsn: u64, crc: u32, payload: &[u8]) -> Result<Self> {
        let actual = Self::compute_crc(&lsn.to_le_bytes(), payload);
        if actual != crc {
            return Err(KvError::WalCorruption(format!(
                "CRC mismatch for LSN {}: stored {:#010x}, computed {:#010x}",
                lsn, crc, actual
            )));
        }

        let entry: WalEntry = bincode::deserialize(payload)
            .map_err(|e| KvError::WalCorruption(format!("undecodable record at LSN {}: {}", lsn, e)))?;
        if entry.lsn != lsn {
            return Err(KvError::WalCorruption(format!(
                "header LSN {} does not match record LSN {}",
                lsn, entry.lsn
            )));
        }
        Ok(entry)
    }

    /// CRC32 over the LSN bytes and payload
    pub fn compute_crc(lsn_bytes: &[u8], payload: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(lsn_bytes);
        hasher.update(payload);
        hasher.finalize()
    }
}
