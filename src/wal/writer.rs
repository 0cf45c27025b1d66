//! WAL Writer
//!
//! Handles appending entries to the WAL file.
//!
//! An append either leaves a complete record behind or nothing at all: a
//! failed write or sync cuts the file back to the last confirmed record.
//! If that cut fails too the writer refuses further appends.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::WalSyncStrategy;
use crate::error::{KvError, Result};

use super::{Operation, WalEntry};

/// Appends entries to the WAL file
pub struct WalWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    /// File length covered by confirmed records
    confirmed_len: u64,
    /// Last LSN handed out (0 = none yet)
    current_lsn: u64,
    sync_strategy: WalSyncStrategy,
    /// Entries written since the last fsync
    unsynced: usize,
    /// Set when a failed append could not be rolled back
    poisoned: bool,
}

impl WalWriter {
    /// Open or create a WAL file, continuing after `last_lsn`
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy, last_lsn: u64) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Self::from_file(path, file, sync_strategy, last_lsn)
    }

    /// Append to an already open log file, continuing after `last_lsn`
    ///
    /// Every byte already in the file counts as confirmed.
    pub fn from_file(
        path: &Path,
        file: File,
        sync_strategy: WalSyncStrategy,
        last_lsn: u64,
    ) -> Result<Self> {
        let confirmed_len = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            confirmed_len,
            current_lsn: last_lsn,
            sync_strategy,
            unsynced: 0,
            poisoned: false,
        })
    }

    /// Append an operation, returning its LSN
    ///
    /// The record reaches the OS before this returns; fsync follows the
    /// configured strategy. On error the LSN is not consumed and the file
    /// holds exactly the records confirmed before.
    pub fn append(&mut self, operation: Operation) -> Result<u64> {
        self.check_usable()?;

        let lsn = self.current_lsn + 1;
        let frame = WalEntry::new(lsn, operation).serialize()?;

        if let Err(e) = self.write_frame(&frame) {
            self.rollback();
            return Err(e);
        }

        self.current_lsn = lsn;
        self.confirmed_len += frame.len() as u64;
        Ok(lsn)
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.check_usable()?;
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.unsynced = 0;
        Ok(())
    }

    /// Get the last assigned LSN
    pub fn current_lsn(&self) -> u64 {
        self.current_lsn
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn check_usable(&self) -> Result<()> {
        if self.poisoned {
            return Err(KvError::Internal(format!(
                "commit log {} holds an append that could not be rolled back",
                self.path.display()
            )));
        }
        Ok(())
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        self.writer.write_all(frame)?;
        self.writer.flush()?;

        let pending = self.unsynced + 1;
        let sync_now = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => pending >= count,
        };
        if sync_now {
            self.writer.get_ref().sync_data()?;
            self.unsynced = 0;
        } else {
            self.unsynced = pending;
        }
        Ok(())
    }

    /// Drop every byte of a failed append, buffered or on disk
    fn rollback(&mut self) {
        match self.truncate_to_confirmed() {
            Ok(()) => tracing::warn!(
                path = %self.path.display(),
                len = self.confirmed_len,
                "failed commit log append rolled back"
            ),
            Err(e) => {
                self.poisoned = true;
                tracing::error!(
                    path = %self.path.display(),
                    error = %e,
                    "failed commit log append could not be rolled back"
                );
            }
        }
    }

    fn truncate_to_confirmed(&mut self) -> io::Result<()> {
        let file = self.writer.get_ref().try_clone()?;
        let stale = std::mem::replace(&mut self.writer, BufWriter::new(file));
        // into_parts does not flush: unwritten bytes of the failed frame go away
        let _ = stale.into_parts();

        let file = self.writer.get_ref();
        if file.metadata()?.len() > self.confirmed_len {
            file.set_len(self.confirmed_len)?;
            file.sync_data()?;
        }
        Ok(())
    }
}
