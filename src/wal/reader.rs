//! WAL Reader
//!
//! Handles reading entries from the WAL file.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use crate::error::{KvError, Result};

use super::{WalEntry, HEADER_SIZE, MAX_RECORD_SIZE};

/// Reads entries from the WAL file
pub struct WalReader {
    reader: BufReader<File>,
    /// Offset just past the last fully read record
    position: u64,
    /// LSN of the last record read
    last_lsn: u64,
}

impl WalReader {
    /// Open a WAL file for reading
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            reader: BufReader::new(file),
            position: 0,
            last_lsn: 0,
        })
    }

    /// Read the next entry from the WAL
    ///
    /// Returns:
    /// - `Ok(Some(entry))`: a valid record
    /// - `Ok(None)`: clean end of log
    /// - `Err(WalCorruption)`: torn or corrupt record at `position()`
    pub fn next_entry(&mut self) -> Result<Option<WalEntry>> {
        let mut header = [0u8; HEADER_SIZE];
        match read_full(&mut self.reader, &mut header)? {
            0 => return Ok(None),
            n if n < HEADER_SIZE => {
                return Err(KvError::WalCorruption(format!(
                    "torn header at offset {} ({} of {} bytes)",
                    self.position, n, HEADER_SIZE
                )))
            }
            _ => {}
        }

        let lsn = u64::from_le_bytes(header[0..8].try_into().unwrap_or_default());
        let crc = u32::from_le_bytes(header[8..12].try_into().unwrap_or_default());
        let len = u32::from_le_bytes(header[12..16].try_into().unwrap_or_default());

        if len > MAX_RECORD_SIZE {
            return Err(KvError::WalCorruption(format!(
                "implausible record length {} at offset {}",
                len, self.position
            )));
        }
        if lsn <= self.last_lsn {
            return Err(KvError::WalCorruption(format!(
                "LSN {} at offset {} does not follow {}",
                lsn, self.position, self.last_lsn
            )));
        }

        let mut payload = vec![0u8; len as usize];
        let n = read_full(&mut self.reader, &mut payload)?;
        if n < payload.len() {
            return Err(KvError::WalCorruption(format!(
                "torn record at offset {} ({} of {} payload bytes)",
                self.position, n, len
            )));
        }

        let entry = WalEntry::deserialize(lsn, crc, &payload)?;
        self.position += (HEADER_SIZE + payload.len()) as u64;
        self.last_lsn = lsn;
        Ok(Some(entry))
    }

    /// Offset just past the last valid record
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn last_lsn(&self) -> u64 {
        self.last_lsn
    }

    /// Iterate over all valid entries
    pub fn entries(self) -> WalIterator {
        WalIterator {
            reader: self,
            done: false,
        }
    }
}

/// Iterator over WAL entries; yields at most one error, then stops
pub struct WalIterator {
    reader: WalReader,
    done: bool,
}

impl Iterator for WalIterator {
    type Item = Result<WalEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Read until `buf` is full or EOF; returns bytes read
fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(KvError::Io(e)),
        }
    }
    Ok(filled)
}
