//! Iterator anchors
//!
//! ## Encoding
//! ```text
//! ┌──────────────────────────────┬───────────┐
//! │ bincode(kind, position)      │ CRC32 (4) │
//! └──────────────────────────────┴───────────┘
//! ```
//! The bytes depend only on the logical position, so an anchor outlives the
//! cursor (and the process) that produced it.

use serde::{Deserialize, Serialize};

use crate::error::{KvError, Result};
use crate::types::{ObjectId, RecxIndex};

use super::IterKind;

/// Logical cursor position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum Position {
    Object(ObjectId),
    Key(Vec<u8>),
    Recx(RecxIndex),
}

#[derive(Serialize, Deserialize)]
struct AnchorBody {
    kind: IterKind,
    position: Position,
}

/// Opaque, re-enterable cursor position
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Anchor(Vec<u8>);

impl Anchor {
    const CRC_SIZE: usize = 4;

    pub(crate) fn encode(kind: IterKind, position: &Position) -> Result<Self> {
        let body = AnchorBody {
            kind,
            position: position.clone(),
        };
        let mut bytes = bincode::serialize(&body)?;
        let crc = crc32fast::hash(&bytes);
        bytes.extend_from_slice(&crc.to_le_bytes());
        Ok(Self(bytes))
    }

    /// Recover the position; `Internal` if corrupt or from another kind
    pub(crate) fn decode(&self, kind: IterKind) -> Result<Position> {
        if self.0.len() <= Self::CRC_SIZE {
            return Err(KvError::Internal("anchor too short".to_string()));
        }
        let (body, crc) = self.0.split_at(self.0.len() - Self::CRC_SIZE);
        let stored = u32::from_le_bytes(crc.try_into().unwrap_or_default());
        if crc32fast::hash(body) != stored {
            return Err(KvError::Internal("anchor checksum mismatch".to_string()));
        }

        let body: AnchorBody = bincode::deserialize(body)
            .map_err(|e| KvError::Internal(format!("undecodable anchor: {}", e)))?;
        if body.kind != kind {
            return Err(KvError::Internal(format!(
                "{:?} anchor used with a {:?} cursor",
                body.kind, kind
            )));
        }

        let matches_kind = matches!(
            (kind, &body.position),
            (IterKind::Object, Position::Object(_))
                | (IterKind::Dkey, Position::Key(_))
                | (IterKind::Akey, Position::Key(_))
                | (IterKind::Recx, Position::Recx(_))
        );
        if !matches_kind {
            return Err(KvError::Internal(format!("malformed {:?} anchor", kind)));
        }
        Ok(body.position)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }
}
