use serde::{Deserialize, Serialize};

use crate::entity::{
    Annotation, AnnotationKey, CatalogEntity, TimeSeries, UidEntity, UidKind,
};
use crate::error::CoreError;
use crate::uid::{Tsuid, Uid};

/// Which write path produced a catalog mutation. Threaded explicitly into
/// every write so the change hooks can tell the reconciler's own
/// confirmations apart from work that must be propagated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOrigin {
    ForwardIngest,
    Reconciler,
    External,
}

/// Catalog mutation kind, persisted as a single character. Deletes sort
/// before inserts and updates ('D' < 'I' < 'U'), which is what lets the
/// reconciler's poll order process deletions first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChangeOp {
    Delete,
    Insert,
    Update,
}

impl ChangeOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "I",
            Self::Update => "U",
            Self::Delete => "D",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "I" => Ok(Self::Insert),
            "U" => Ok(Self::Update),
            "D" => Ok(Self::Delete),
            _ => Err(CoreError::InvalidKey(format!("unknown change op: {s}"))),
        }
    }
}

/// What a change record is about: one case per entity kind, decoded once
/// when the queue row is read instead of re-dispatching on the raw table
/// name at every use site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRef {
    Uid { kind: UidKind, uid: Uid },
    Series { tsuid: Tsuid },
    Annotation { key: AnnotationKey },
}

impl EntityRef {
    /// The catalog table this reference points into.
    pub fn table(&self) -> &'static str {
        match self {
            Self::Uid { kind, .. } => kind.table(),
            Self::Series { .. } => "TSD_TSMETA",
            Self::Annotation { .. } => "TSD_ANNOTATION",
        }
    }

    /// Natural key rendered the way it is stored in EVENT_PK.
    pub fn key(&self) -> String {
        match self {
            Self::Uid { uid, .. } => uid.to_string(),
            Self::Series { tsuid } => tsuid.to_string(),
            Self::Annotation { key } => key.to_string(),
        }
    }

    pub fn decode(table: &str, key: &str) -> Result<Self, CoreError> {
        if let Some(kind) = UidKind::from_table(table) {
            return Ok(Self::Uid { kind, uid: Uid::from_hex(key)? });
        }
        match table {
            "TSD_TSMETA" => Ok(Self::Series { tsuid: Tsuid::from_hex(key)? }),
            "TSD_ANNOTATION" => Ok(Self::Annotation { key: AnnotationKey::parse(key)? }),
            _ => Err(CoreError::InvalidKey(format!("unrecognized entity table: {table}"))),
        }
    }

    /// Minimal entity reconstructed from the bare key, representing a
    /// delete to the primary store.
    pub fn tombstone(&self) -> CatalogEntity {
        match self {
            Self::Uid { kind, uid } => CatalogEntity::Uid(UidEntity::tombstone(*kind, *uid)),
            Self::Series { tsuid } => CatalogEntity::Series(TimeSeries::tombstone(tsuid.clone())),
            Self::Annotation { key } => {
                CatalogEntity::Annotation(Annotation::tombstone(key.clone()))
            }
        }
    }
}

/// One Change-Capture Log entry awaiting reconciliation.
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    pub qid: i64,
    pub entity: EntityRef,
    pub op: ChangeOp,
    pub event_time_ms: i64,
    pub last_attempt_ms: Option<i64>,
    pub last_error: Option<String>,
}
