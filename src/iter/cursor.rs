//! Cursor implementation
//!
//! One cursor type; the scope variant decides which level it walks.

use std::ops::Bound;
use std::sync::Arc;

use crate::cache::ObjectRef;
use crate::error::{KvError, Result};
use crate::tree::Container;
use crate::types::{EpochRange, Recx};

use super::anchor::Position;
use super::{Anchor, IterEntry, IterKind};

/// What a cursor walks, with the scoping data its kind needs
///
/// Dkey/akey/recx scopes pin their object in the cache until the cursor
/// is finished.
pub(crate) enum Scope {
    /// `None` when the container has never been written
    Object { container: Option<Arc<Container>> },
    Dkey { object: ObjectRef },
    Akey { object: ObjectRef, dkey: Vec<u8> },
    Recx { object: ObjectRef, dkey: Vec<u8>, akey: Vec<u8> },
}

impl Scope {
    fn kind(&self) -> IterKind {
        match self {
            Scope::Object { .. } => IterKind::Object,
            Scope::Dkey { .. } => IterKind::Dkey,
            Scope::Akey { .. } => IterKind::Akey,
            Scope::Recx { .. } => IterKind::Recx,
        }
    }
}

enum CursorState {
    /// Prepared, not yet probed
    Unprobed,
    At { position: Position, entry: IterEntry },
    Exhausted,
}

/// A positioned view over one level of the hierarchy
///
/// Holds no lock between calls: every move re-seeks the tree from the
/// current position, so concurrent writers are never blocked by a cursor.
pub struct Cursor {
    scope: Scope,
    epr: EpochRange,
    state: CursorState,
}

impl Cursor {
    pub(crate) fn new(scope: Scope, epr: EpochRange) -> Self {
        Self {
            scope,
            epr,
            state: CursorState::Unprobed,
        }
    }

    pub fn kind(&self) -> IterKind {
        self.scope.kind()
    }

    pub fn epoch_range(&self) -> EpochRange {
        self.epr
    }

    /// Position at the first entry, or at the entry named by `anchor`
    ///
    /// `NotFound` if there is nothing at or after that position.
    pub fn probe(&mut self, anchor: Option<&Anchor>) -> Result<()> {
        let from = match anchor {
            Some(anchor) => Bound::Included(anchor.decode(self.kind())?),
            None => Bound::Unbounded,
        };
        self.move_to(from)
    }

    /// Current entry and the anchor that re-enters at it
    pub fn fetch(&self) -> Result<(IterEntry, Anchor)> {
        match &self.state {
            CursorState::At { position, entry } => {
                Ok((entry.clone(), Anchor::encode(self.kind(), position)?))
            }
            CursorState::Unprobed => Err(KvError::invalid("cursor fetched before probe")),
            CursorState::Exhausted => Err(KvError::NotFound),
        }
    }

    /// Advance; `NotFound` once no entries remain (normal termination)
    pub fn next(&mut self) -> Result<()> {
        let position = match &self.state {
            CursorState::At { position, .. } => position.clone(),
            CursorState::Unprobed => return Err(KvError::invalid("cursor advanced before probe")),
            CursorState::Exhausted => return Err(KvError::NotFound),
        };
        self.move_to(Bound::Excluded(position))
    }

    /// End the cursor and release what it pins
    pub fn finish(self) {
        tracing::trace!(kind = ?self.kind(), "cursor finished");
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn move_to(&mut self, from: Bound<Position>) -> Result<()> {
        match self.seek(&from)? {
            Some((position, entry)) => {
                self.state = CursorState::At { position, entry };
                Ok(())
            }
            None => {
                self.state = CursorState::Exhausted;
                Err(KvError::NotFound)
            }
        }
    }

    /// First visible entry at or after `from`
    fn seek(&self, from: &Bound<Position>) -> Result<Option<(Position, IterEntry)>> {
        let epr = self.epr;

        let found = match &self.scope {
            Scope::Object { container } => {
                let from = map_bound(from, |p| match p {
                    Position::Object(oid) => Some(*oid),
                    _ => None,
                })?;
                container
                    .as_ref()
                    .and_then(|c| c.next_object(from))
                    .map(|oid| (Position::Object(oid), IterEntry::Object(oid)))
            }
            Scope::Dkey { object } => {
                let from = map_bound(from, key_position)?;
                object
                    .next_dkey(from, epr)
                    .map(|dkey| (Position::Key(dkey.clone()), IterEntry::Dkey(dkey)))
            }
            Scope::Akey { object, dkey } => {
                let from = map_bound(from, key_position)?;
                object
                    .next_akey(dkey, from, epr)
                    .map(|akey| (Position::Key(akey.clone()), IterEntry::Akey(akey)))
            }
            Scope::Recx { object, dkey, akey } => {
                let from = map_bound(from, |p| match p {
                    Position::Recx(index) => Some(*index),
                    _ => None,
                })?;
                object.next_recx(dkey, akey, from, epr).map(|found| {
                    let recx = Recx::new(found.index.idx, found.index.nr, found.rsize);
                    (
                        Position::Recx(found.index),
                        IterEntry::Recx {
                            recx,
                            epoch: found.epoch,
                            data: found.data,
                        },
                    )
                })
            }
        };
        Ok(found)
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &self.state {
            CursorState::Unprobed => "unprobed",
            CursorState::At { .. } => "positioned",
            CursorState::Exhausted => "exhausted",
        };
        f.debug_struct("Cursor")
            .field("kind", &self.kind())
            .field("epr", &self.epr)
            .field("state", &state)
            .finish()
    }
}

fn key_position(position: &Position) -> Option<&[u8]> {
    match position {
        Position::Key(key) => Some(key.as_slice()),
        _ => None,
    }
}

/// Narrow a position bound to the typed bound one scope understands
fn map_bound<'a, T>(
    bound: &'a Bound<Position>,
    f: impl Fn(&'a Position) -> Option<T>,
) -> Result<Bound<T>> {
    let narrow = |p: &'a Position| {
        f(p).ok_or_else(|| KvError::Internal(format!("position {:?} does not fit this cursor", p)))
    };
    Ok(match bound {
        Bound::Included(p) => Bound::Included(narrow(p)?),
        Bound::Excluded(p) => Bound::Excluded(narrow(p)?),
        Bound::Unbounded => Bound::Unbounded,
    })
}
