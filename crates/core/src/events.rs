use serde::{Deserialize, Serialize};

use crate::entity::{Annotation, TimeSeries, UidEntity};

/// One metadata observation delivered by the forward ingestion pipeline,
/// carrying a fully-populated entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IndexEvent {
    IndexMetric(UidEntity),
    IndexTagKey(UidEntity),
    IndexTagValue(UidEntity),
    IndexTimeSeries(TimeSeries),
    IndexAnnotation(Annotation),
}

impl IndexEvent {
    /// String name of the event kind for logging.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::IndexMetric(_) => "IndexMetric",
            Self::IndexTagKey(_) => "IndexTagKey",
            Self::IndexTagValue(_) => "IndexTagValue",
            Self::IndexTimeSeries(_) => "IndexTimeSeries",
            Self::IndexAnnotation(_) => "IndexAnnotation",
        }
    }
}
