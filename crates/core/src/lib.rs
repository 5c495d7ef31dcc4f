pub mod change;
pub mod clock;
pub mod custom;
pub mod entity;
pub mod error;
pub mod events;
pub mod uid;

pub use change::{ChangeOp, ChangeRecord, EntityRef, WriteOrigin};
pub use entity::{
    Annotation, AnnotationKey, CatalogEntity, TagPair, TimeSeries, UidEntity, UidKind,
    TOMBSTONE_ATTR,
};
pub use error::CoreError;
pub use events::IndexEvent;
pub use uid::{PairUid, Tsuid, Uid};
