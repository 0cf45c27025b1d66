//! Engine Module
//!
//! The core storage engine that coordinates all components.
//!
//! ## Responsibilities
//! - Route update/punch/fetch to the right container and object
//! - Admit writes against pool capacity, all-or-nothing per call
//! - Log commits before they become visible (durable engines)
//! - Hand out cached object references, cursors and zero-copy handles
//! - Replay the commit log on startup

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::{Mutex, RwLock};

use crate::cache::{ObjectCache, ObjectKey, ObjectRef};
use crate::config::Config;
use crate::error::{KvError, Result};
use crate::io::{IoHandle, IoInner, IoPhase};
use crate::iter::{Cursor, IterKind, IterParam, Scope};
use crate::storage::{Reservation, SpaceManager};
use crate::tree::{Container, ExtentWrite, ObjectTree, RecordValue};
use crate::types::{validate_dkey, ContainerId, Epoch, IoDesc, ObjectId, Recx};
use crate::wal::{LoggedExtent, Operation, WalEntry, WalRecovery, WalWriter, MAX_RECORD_SIZE};

/// The main storage engine
///
/// ## Concurrency Model
///
/// - **Writes** (update/punch/update_end): durable engines serialize
///   commits on the WAL mutex so log order equals apply order. Each commit
///   applies all of its extents under the object's write lock.
/// - **Reads** (fetch/fetch_begin/cursors): object read locks only, many
///   concurrent readers. A read sees a commit entirely or not at all.
/// - Same-key, same-epoch writers are not coordinated: the last to commit
///   replaces the other. Ordering them is the caller's job.
///
/// Lock order: object cache → containers → WAL → object tree.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Container namespaces, created on first write
    containers: RwLock<HashMap<ContainerId, Arc<Container>>>,

    /// Hot object references
    cache: ObjectCache,

    /// Pool capacity accounting
    space: Arc<SpaceManager>,

    /// Commit log (durable engines only)
    wal: Option<Mutex<WalWriter>>,

    /// Path of the commit log, if any
    wal_path: Option<PathBuf>,
}

impl Engine {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const WAL_FILENAME: &'static str = "commit.log";

    /// Open an engine with the given config
    ///
    /// With a data directory:
    /// 1. Create the directory if needed
    /// 2. Recover and replay the commit log if it exists
    /// 3. Reopen the log for appending after the last valid LSN
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let mut engine = Self {
            containers: RwLock::new(HashMap::new()),
            cache: ObjectCache::new(config.object_cache_capacity),
            space: SpaceManager::new(config.pool_capacity),
            wal: None,
            wal_path: None,
            config,
        };

        let Some(data_dir) = engine.config.data_dir.clone() else {
            tracing::info!(
                capacity = engine.config.pool_capacity,
                "opened in-memory engine"
            );
            return Ok(engine);
        };

        fs::create_dir_all(&data_dir)?;
        let wal_path = data_dir.join(Self::WAL_FILENAME);

        let mut last_lsn = 0;
        if wal_path.exists() {
            let (entries, result) = WalRecovery::recover(&wal_path)?;
            for entry in entries {
                engine.replay(entry)?;
            }
            last_lsn = result.last_lsn;

            tracing::info!(
                recovered = result.entries_recovered,
                corrupted = result.entries_corrupted,
                last_lsn,
                used = engine.space.used(),
                "commit log replayed"
            );
        }

        engine.wal = Some(Mutex::new(WalWriter::open(
            &wal_path,
            engine.config.wal_sync_strategy,
            last_lsn,
        )?));
        engine.wal_path = Some(wal_path);

        tracing::info!(data_dir = %data_dir.display(), "opened durable engine");
        Ok(engine)
    }

    /// Open an in-memory engine with default settings
    pub fn in_memory() -> Result<Self> {
        Self::open(Config::default())
    }

    /// Open a durable engine under `path` with default settings
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().data_dir(path).build())
    }

    // =========================================================================
    // Object Index / Cache
    // =========================================================================

    /// Find an object, creating its index entry on first use
    pub fn lookup_object(&self, container: ContainerId, oid: ObjectId) -> Result<Arc<ObjectTree>> {
        let namespace = self.container_or_create(container);
        if let Some(tree) = namespace.find(oid) {
            return Ok(tree);
        }

        let Some(wal) = &self.wal else {
            return Ok(namespace.find_or_create(oid).0);
        };

        // Log before the object becomes visible; the WAL lock makes the
        // check-then-create race free among durable writers.
        let mut wal = wal.lock();
        if let Some(tree) = namespace.find(oid) {
            return Ok(tree);
        }
        wal.append(Operation::CreateObject { container, oid })?;
        let (tree, _) = namespace.find_or_create(oid);
        tracing::debug!(?container, %oid, "object created");
        Ok(tree)
    }

    /// Hold a cached reference to an object, creating it if needed
    pub fn hold_object(&self, container: ContainerId, oid: ObjectId) -> Result<ObjectRef> {
        self.cache
            .hold(ObjectKey::new(container, oid), || self.lookup_object(container, oid))
    }

    /// Hold a cached reference to an existing object; `NotFound` otherwise
    fn hold_existing(&self, container: ContainerId, oid: ObjectId) -> Result<ObjectRef> {
        self.cache.hold(ObjectKey::new(container, oid), || {
            self.container(container)
                .and_then(|namespace| namespace.find(oid))
                .ok_or(KvError::NotFound)
        })
    }

    // =========================================================================
    // Buffered I/O
    // =========================================================================

    /// Write `bufs[i]` to extent `iods[i]` under `dkey` at `epoch`
    ///
    /// Either every extent commits or none does. Each buffer must be exactly
    /// `nr * rsize` bytes; an extent with `rsize == 0` is a punch and carries
    /// an empty buffer.
    pub fn update(
        &self,
        container: ContainerId,
        oid: ObjectId,
        epoch: Epoch,
        dkey: &[u8],
        iods: &[IoDesc],
        bufs: &[&[u8]],
    ) -> Result<()> {
        let total = validate_update(dkey, iods)?;
        if bufs.len() != iods.len() {
            return Err(KvError::invalid(format!(
                "{} extents but {} buffers",
                iods.len(),
                bufs.len()
            )));
        }
        for (iod, buf) in iods.iter().zip(bufs) {
            let expected = iod.update_len()?;
            if buf.len() as u64 != expected {
                return Err(KvError::invalid(format!(
                    "buffer of {} bytes for extent {:?} needing {}",
                    buf.len(),
                    iod.recx,
                    expected
                )));
            }
        }

        // A refused reservation must leave no object behind
        let reservation = self.space.reserve(total)?;
        let object = self.hold_object(container, oid)?;

        let writes = iods
            .iter()
            .zip(bufs)
            .map(|(iod, buf)| extent_write(iod, Bytes::copy_from_slice(buf)))
            .collect();

        self.commit(&object, epoch, dkey, writes, reservation)
    }

    /// Punch extents: hide them from `epoch` onward without deleting history
    pub fn punch(
        &self,
        container: ContainerId,
        oid: ObjectId,
        epoch: Epoch,
        dkey: &[u8],
        iods: &[IoDesc],
    ) -> Result<()> {
        let punches: Vec<IoDesc> = iods
            .iter()
            .map(|iod| IoDesc::new(iod.akey.clone(), Recx::new(iod.recx.idx, iod.recx.nr, 0)))
            .collect();
        let empty: Vec<&[u8]> = vec![&[][..]; punches.len()];
        self.update(container, oid, epoch, dkey, &punches, &empty)
    }

    /// Near-epoch read of every extent in `iods` into `bufs`
    ///
    /// Each buffer is resized to the stored length. A descriptor with
    /// `rsize == Recx::ANY_SIZE` gets the stored record size written back.
    /// Absent and punched extents are both `NotFound`.
    pub fn fetch(
        &self,
        container: ContainerId,
        oid: ObjectId,
        epoch: Epoch,
        dkey: &[u8],
        iods: &mut [IoDesc],
        bufs: &mut [Vec<u8>],
    ) -> Result<()> {
        validate_fetch(dkey, iods)?;
        if bufs.len() != iods.len() {
            return Err(KvError::invalid(format!(
                "{} extents but {} buffers",
                iods.len(),
                bufs.len()
            )));
        }

        let object = self.hold_existing(container, oid)?;
        let records = object.read(epoch, dkey, iods)?;
        resolve_sizes(iods, &records)?;

        for (buf, (_, data)) in bufs.iter_mut().zip(&records) {
            buf.clear();
            buf.extend_from_slice(data);
        }

        tracing::trace!(%oid, epoch, extents = iods.len(), "fetch");
        Ok(())
    }

    // =========================================================================
    // Zero-Copy I/O
    // =========================================================================

    /// Reserve storage for an update and expose it through the handle
    ///
    /// Nothing is visible until `update_end` succeeds.
    pub fn update_begin(
        &self,
        container: ContainerId,
        oid: ObjectId,
        epoch: Epoch,
        dkey: &[u8],
        iods: &[IoDesc],
    ) -> Result<IoHandle> {
        let total = validate_update(dkey, iods)?;
        let reservation = self.space.reserve(total)?;
        let object = self.hold_object(container, oid)?;

        let bufs = iods
            .iter()
            .map(|iod| {
                let len = iod.update_len()? as usize;
                let mut buf = BytesMut::with_capacity(len);
                buf.resize(len, 0);
                Ok(buf)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(IoHandle::new(IoInner {
            object,
            epoch,
            dkey: dkey.to_vec(),
            iods: iods.to_vec(),
            phase: IoPhase::Update { bufs, reservation },
        }))
    }

    /// Finish a zero-copy update
    ///
    /// `Ok(())` commits the buffers as a new version. An error status
    /// discards them, releases the reservation and is handed back.
    pub fn update_end(&self, handle: IoHandle, status: Result<()>) -> Result<()> {
        let inner = handle.take()?;
        let (bufs, reservation) = match inner.phase {
            IoPhase::Update { bufs, reservation } => (bufs, reservation),
            IoPhase::Fetch { .. } => {
                return Err(KvError::invalid("update_end called with a fetch handle"))
            }
        };

        if let Err(e) = status {
            tracing::debug!(oid = %inner.object.oid(), epoch = inner.epoch, "zero-copy update discarded");
            return Err(e);
        }

        let writes = inner
            .iods
            .iter()
            .zip(bufs)
            .map(|(iod, buf)| extent_write(iod, buf.freeze()))
            .collect();

        self.commit(&inner.object, inner.epoch, &inner.dkey, writes, reservation)
    }

    /// Resolve stored extents and expose them read-only through the handle
    pub fn fetch_begin(
        &self,
        container: ContainerId,
        oid: ObjectId,
        epoch: Epoch,
        dkey: &[u8],
        iods: &[IoDesc],
    ) -> Result<IoHandle> {
        validate_fetch(dkey, iods)?;

        let object = self.hold_existing(container, oid)?;
        let records = object.read(epoch, dkey, iods)?;

        let mut iods = iods.to_vec();
        resolve_sizes(&mut iods, &records)?;

        Ok(IoHandle::new(IoInner {
            object,
            epoch,
            dkey: dkey.to_vec(),
            iods,
            phase: IoPhase::Fetch {
                bufs: records.into_iter().map(|(_, data)| data).collect(),
            },
        }))
    }

    /// Finish a zero-copy fetch, releasing its buffers
    pub fn fetch_end(&self, handle: IoHandle) -> Result<()> {
        let inner = handle.take()?;
        match inner.phase {
            IoPhase::Fetch { .. } => Ok(()),
            IoPhase::Update { .. } => Err(KvError::invalid("fetch_end called with an update handle")),
        }
    }

    // =========================================================================
    // Iteration
    // =========================================================================

    /// Prepare a cursor of `kind` over the scope in `param`
    pub fn iter_prepare(&self, kind: IterKind, param: &IterParam) -> Result<Cursor> {
        if param.epr.lo > param.epr.hi {
            return Err(KvError::invalid(format!(
                "empty epoch range [{}, {}]",
                param.epr.lo, param.epr.hi
            )));
        }

        let scope = match kind {
            IterKind::Object => Scope::Object {
                container: self.container(param.container),
            },
            IterKind::Dkey => Scope::Dkey {
                object: self.hold_scoped(param)?,
            },
            IterKind::Akey => Scope::Akey {
                dkey: required(&param.dkey, "dkey")?,
                object: self.hold_scoped(param)?,
            },
            IterKind::Recx => Scope::Recx {
                dkey: required(&param.dkey, "dkey")?,
                akey: required(&param.akey, "akey")?,
                object: self.hold_scoped(param)?,
            },
        };

        tracing::debug!(?kind, container = ?param.container, oid = ?param.oid, "cursor prepared");
        Ok(Cursor::new(scope, param.epr))
    }

    fn hold_scoped(&self, param: &IterParam) -> Result<ObjectRef> {
        let oid = param
            .oid
            .ok_or_else(|| KvError::invalid("cursor scope needs an object id"))?;
        self.hold_existing(param.container, oid)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Close the engine: sync the log and drop cached references
    pub fn close(self) -> Result<()> {
        if let Some(wal) = &self.wal {
            wal.lock().sync()?;
        }
        self.cache.close();
        Ok(())
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn container(&self, id: ContainerId) -> Option<Arc<Container>> {
        self.containers.read().get(&id).cloned()
    }

    fn container_or_create(&self, id: ContainerId) -> Arc<Container> {
        if let Some(namespace) = self.container(id) {
            return namespace;
        }
        let mut containers = self.containers.write();
        Arc::clone(
            containers
                .entry(id)
                .or_insert_with(|| Arc::new(Container::new(id))),
        )
    }

    /// Log (if durable) then apply one update, then settle its space
    fn commit(
        &self,
        object: &ObjectRef,
        epoch: Epoch,
        dkey: &[u8],
        writes: Vec<ExtentWrite>,
        reservation: Reservation,
    ) -> Result<()> {
        let extents = writes.len();

        let replaced = match &self.wal {
            Some(wal) => {
                let mut wal = wal.lock();
                wal.append(Operation::Update {
                    container: object.key().container,
                    oid: object.oid(),
                    epoch,
                    dkey: dkey.to_vec(),
                    extents: writes.iter().map(logged_extent).collect(),
                })?;
                // Apply under the log lock so replay order matches
                object.apply(epoch, dkey, writes)
            }
            None => object.apply(epoch, dkey, writes),
        };

        reservation.commit();
        if replaced > 0 {
            self.space.release(replaced);
        }

        tracing::debug!(oid = %object.oid(), epoch, extents, replaced, "update committed");
        Ok(())
    }

    /// Re-apply one recovered log entry
    fn replay(&self, entry: WalEntry) -> Result<()> {
        match entry.operation {
            Operation::CreateObject { container, oid } => {
                self.container_or_create(container).find_or_create(oid);
            }
            Operation::Update {
                container,
                oid,
                epoch,
                dkey,
                extents,
            } => {
                let (tree, _) = self.container_or_create(container).find_or_create(oid);

                let mut total = 0u64;
                let writes: Vec<ExtentWrite> = extents
                    .into_iter()
                    .map(|extent| {
                        total += extent.data.len() as u64;
                        let iod = IoDesc::new(extent.akey, extent.recx);
                        extent_write(&iod, Bytes::from(extent.data))
                    })
                    .collect();

                let replaced = tree.apply(epoch, &dkey, writes);
                if total >= replaced {
                    self.space.charge(total - replaced)?;
                } else {
                    self.space.release(replaced - total);
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The engine's object cache
    pub fn object_cache(&self) -> &ObjectCache {
        &self.cache
    }

    /// Payload bytes reserved or committed
    pub fn space_used(&self) -> u64 {
        self.space.used()
    }

    pub fn space_available(&self) -> u64 {
        self.space.available()
    }

    /// Objects indexed in `container`
    pub fn object_count(&self, container: ContainerId) -> usize {
        self.container(container)
            .map(|namespace| namespace.object_count())
            .unwrap_or(0)
    }

    /// Last LSN written to the commit log (0 for in-memory engines)
    pub fn current_lsn(&self) -> u64 {
        self.wal.as_ref().map(|wal| wal.lock().current_lsn()).unwrap_or(0)
    }

    /// Path of the commit log, if the engine is durable
    pub fn wal_path(&self) -> Option<&Path> {
        self.wal_path.as_deref()
    }
}

// =============================================================================
// Validation and Conversion Helpers
// =============================================================================

/// Upper bound on one update's keys plus payload
///
/// Leaves room for the commit log's framing, so every accepted update fits
/// in one log record. Applied to in-memory engines as well.
pub const MAX_UPDATE_SIZE: u64 = MAX_RECORD_SIZE as u64 - 64 * 1024;

/// Encoding overhead charged per extent against `MAX_UPDATE_SIZE`
const EXTENT_OVERHEAD: u64 = 64;

/// Validate update descriptors, returning the total payload size
fn validate_update(dkey: &[u8], iods: &[IoDesc]) -> Result<u64> {
    validate_dkey(dkey)?;
    if iods.is_empty() {
        return Err(KvError::invalid("update without extents"));
    }
    let total = iods.iter().try_fold(0u64, |total, iod| {
        total
            .checked_add(iod.update_len()?)
            .ok_or_else(|| KvError::invalid("update size overflow"))
    })?;

    let footprint = iods.iter().fold(total.saturating_add(dkey.len() as u64), |sum, iod| {
        sum.saturating_add(iod.akey.len() as u64 + EXTENT_OVERHEAD)
    });
    if footprint > MAX_UPDATE_SIZE {
        return Err(KvError::invalid(format!(
            "update of {} bytes exceeds the {} byte limit",
            footprint, MAX_UPDATE_SIZE
        )));
    }
    Ok(total)
}

fn validate_fetch(dkey: &[u8], iods: &[IoDesc]) -> Result<()> {
    validate_dkey(dkey)?;
    if iods.is_empty() {
        return Err(KvError::invalid("fetch without extents"));
    }
    iods.iter().try_for_each(IoDesc::validate)
}

/// Check explicit record sizes against stored ones and fill in `ANY_SIZE`
fn resolve_sizes(iods: &mut [IoDesc], records: &[(u64, Bytes)]) -> Result<()> {
    for (iod, (rsize, _)) in iods.iter_mut().zip(records) {
        if iod.recx.rsize != Recx::ANY_SIZE && iod.recx.rsize != *rsize {
            return Err(KvError::invalid(format!(
                "requested record size {} but {} is stored at idx {}",
                iod.recx.rsize, rsize, iod.recx.idx
            )));
        }
        iod.recx.rsize = *rsize;
    }
    Ok(())
}

fn extent_write(iod: &IoDesc, data: Bytes) -> ExtentWrite {
    let value = if iod.recx.is_punch() {
        RecordValue::Punch
    } else {
        RecordValue::Value {
            rsize: iod.recx.rsize,
            data,
        }
    };
    ExtentWrite {
        akey: iod.akey.clone(),
        idx: iod.recx.idx,
        nr: iod.recx.nr,
        value,
    }
}

fn logged_extent(write: &ExtentWrite) -> LoggedExtent {
    let (rsize, data) = match &write.value {
        RecordValue::Value { rsize, data } => (*rsize, data.to_vec()),
        RecordValue::Punch => (0, Vec::new()),
    };
    LoggedExtent {
        akey: write.akey.clone(),
        recx: Recx::new(write.idx, write.nr, rsize),
        data,
    }
}

fn required(value: &Option<Vec<u8>>, what: &str) -> Result<Vec<u8>> {
    match value {
        Some(v) if !v.is_empty() => Ok(v.clone()),
        _ => Err(KvError::invalid(format!("cursor scope needs a {}", what))),
    }
}
