use serde::{Deserialize, Serialize};
use std::fmt;

use crate::custom::CustomMap;
use crate::error::CoreError;
use crate::uid::{PairUid, Tsuid, Uid};

/// Custom attribute stamped on tombstone entities so the primary store can
/// tell a propagated delete apart from a fresh write.
pub const TOMBSTONE_ATTR: &str = "sync.tombstone";

/// The three UID namespaces. Rows in all three tables share one shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum UidKind {
    Metric,
    TagKey,
    TagValue,
}

impl UidKind {
    pub fn table(&self) -> &'static str {
        match self {
            Self::Metric => "TSD_METRIC",
            Self::TagKey => "TSD_TAGK",
            Self::TagValue => "TSD_TAGV",
        }
    }

    pub fn from_table(table: &str) -> Option<Self> {
        match table {
            "TSD_METRIC" => Some(Self::Metric),
            "TSD_TAGK" => Some(Self::TagKey),
            "TSD_TAGV" => Some(Self::TagValue),
            _ => None,
        }
    }
}

/// A metric name, tag key, or tag value as held in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UidEntity {
    pub kind: UidKind,
    pub uid: Uid,
    pub name: String,
    pub created_ms: i64,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub custom: CustomMap,
}

impl UidEntity {
    pub fn new(kind: UidKind, uid: Uid, name: impl Into<String>, created_ms: i64) -> Self {
        Self {
            kind,
            uid,
            name: name.into(),
            created_ms,
            display_name: None,
            description: None,
            notes: None,
            custom: CustomMap::new(),
        }
    }

    /// Bare-key entity representing a delete to the primary store.
    pub fn tombstone(kind: UidKind, uid: Uid) -> Self {
        let mut entity = Self::new(kind, uid, "", 0);
        entity.custom.insert(TOMBSTONE_ATTR.into(), "true".into());
        entity
    }
}

/// A (tag key, tag value) combination, materialized once and referenced by
/// every series that carries it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagPair {
    pub uid: PairUid,
    pub tagk: Uid,
    pub tagv: Uid,
    pub name: String,
}

impl TagPair {
    /// Derives the pair from its key and value entities. The rendered name
    /// is `key=value`.
    pub fn from_entities(key: &UidEntity, value: &UidEntity) -> Result<Self, CoreError> {
        if key.kind != UidKind::TagKey {
            return Err(CoreError::InvalidEntity(format!(
                "tag pair key must be a tag key, got {:?}",
                key.kind
            )));
        }
        if value.kind != UidKind::TagValue {
            return Err(CoreError::InvalidEntity(format!(
                "tag pair value must be a tag value, got {:?}",
                value.kind
            )));
        }
        Ok(Self {
            uid: PairUid::compose(key.uid, value.uid),
            tagk: key.uid,
            tagv: value.uid,
            name: format!("{}={}", key.name, value.name),
        })
    }
}

/// A fully-qualified time series: a metric plus its ordered tag pairs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub tsuid: Tsuid,
    pub metric: UidEntity,
    /// Ordered (tag key, tag value) entity pairs, in tsuid order.
    pub tags: Vec<(UidEntity, UidEntity)>,
    pub created_ms: i64,
    pub custom: CustomMap,
}

impl TimeSeries {
    /// Builds a series from its constituents, deriving the tsuid. Fails if
    /// any tag entity is of the wrong kind or the tag list is empty.
    pub fn new(
        metric: UidEntity,
        tags: Vec<(UidEntity, UidEntity)>,
        created_ms: i64,
    ) -> Result<Self, CoreError> {
        if metric.kind != UidKind::Metric {
            return Err(CoreError::InvalidEntity(format!(
                "series metric must be a metric, got {:?}",
                metric.kind
            )));
        }
        let mut pairs = Vec::with_capacity(tags.len());
        for (key, value) in &tags {
            pairs.push(TagPair::from_entities(key, value)?.uid);
        }
        let tsuid = Tsuid::compose(metric.uid, &pairs)?;
        Ok(Self {
            tsuid,
            metric,
            tags,
            created_ms,
            custom: CustomMap::new(),
        })
    }

    /// Identity-only series rebuilt from a bare tsuid; the metric reference
    /// is recovered from the key's prefix.
    pub fn tombstone(tsuid: Tsuid) -> Self {
        let metric = UidEntity::tombstone(UidKind::Metric, tsuid.metric_uid());
        let mut custom = CustomMap::new();
        custom.insert(TOMBSTONE_ATTR.into(), "true".into());
        Self {
            tsuid,
            metric,
            tags: Vec::new(),
            created_ms: 0,
            custom,
        }
    }
}

/// Natural key of an annotation: start time plus optional owning series.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AnnotationKey {
    pub start_ms: i64,
    pub tsuid: Option<Tsuid>,
}

impl AnnotationKey {
    /// Parses the rendered `<start_ms>:<tsuid-hex>` form; an empty tsuid
    /// segment denotes a global annotation.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        let (start, tsuid) = s
            .split_once(':')
            .ok_or_else(|| CoreError::InvalidKey(format!("annotation key missing ':': {s}")))?;
        let start_ms = start
            .parse::<i64>()
            .map_err(|_| CoreError::InvalidKey(format!("bad annotation start time: {s}")))?;
        let tsuid = if tsuid.is_empty() {
            None
        } else {
            Some(Tsuid::from_hex(tsuid)?)
        };
        Ok(Self { start_ms, tsuid })
    }
}

impl fmt::Display for AnnotationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.tsuid {
            Some(tsuid) => write!(f, "{}:{}", self.start_ms, tsuid),
            None => write!(f, "{}:", self.start_ms),
        }
    }
}

/// A time-bounded note attached to one series, or global when tsuid is
/// absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub tsuid: Option<Tsuid>,
    pub start_ms: i64,
    pub end_ms: Option<i64>,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub custom: CustomMap,
}

impl Annotation {
    pub fn new(tsuid: Option<Tsuid>, start_ms: i64) -> Self {
        Self {
            tsuid,
            start_ms,
            end_ms: None,
            description: None,
            notes: None,
            custom: CustomMap::new(),
        }
    }

    pub fn key(&self) -> AnnotationKey {
        AnnotationKey {
            start_ms: self.start_ms,
            tsuid: self.tsuid.clone(),
        }
    }

    pub fn tombstone(key: AnnotationKey) -> Self {
        let mut annotation = Self::new(key.tsuid, key.start_ms);
        annotation
            .custom
            .insert(TOMBSTONE_ATTR.into(), "true".into());
        annotation
    }
}

/// Union of the entities exchanged with the primary store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogEntity {
    Uid(UidEntity),
    Series(TimeSeries),
    Annotation(Annotation),
}

impl CatalogEntity {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Uid(_) => "UidEntity",
            Self::Series(_) => "TimeSeries",
            Self::Annotation(_) => "Annotation",
        }
    }

    /// Natural identity as rendered text, for logging and fake stores.
    pub fn key(&self) -> String {
        match self {
            Self::Uid(entity) => entity.uid.to_string(),
            Self::Series(series) => series.tsuid.to_string(),
            Self::Annotation(annotation) => annotation.key().to_string(),
        }
    }

    pub fn is_tombstone(&self) -> bool {
        let custom = match self {
            Self::Uid(entity) => &entity.custom,
            Self::Series(series) => &series.custom,
            Self::Annotation(annotation) => &annotation.custom,
        };
        custom.get(TOMBSTONE_ATTR).is_some_and(|v| v == "true")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::uid::Uid;

    fn uid(hex: &str) -> Uid {
        Uid::from_hex(hex).unwrap()
    }

    #[test]
    fn tag_pair_requires_matching_kinds() {
        let key = UidEntity::new(UidKind::TagKey, uid("000001"), "host", 1);
        let value = UidEntity::new(UidKind::TagValue, uid("000002"), "web01", 1);
        let pair = TagPair::from_entities(&key, &value).unwrap();
        assert_eq!(pair.name, "host=web01");
        assert_eq!(pair.uid.to_string(), "000001000002");

        let metric = UidEntity::new(UidKind::Metric, uid("000003"), "sys.cpu", 1);
        assert!(TagPair::from_entities(&metric, &value).is_err());
        assert!(TagPair::from_entities(&key, &metric).is_err());
    }

    #[test]
    fn series_tsuid_matches_composition() {
        let metric = UidEntity::new(UidKind::Metric, uid("000007"), "sys.cpu", 1);
        let key = UidEntity::new(UidKind::TagKey, uid("000001"), "host", 1);
        let value = UidEntity::new(UidKind::TagValue, uid("000002"), "web01", 1);
        let series = TimeSeries::new(metric, vec![(key, value)], 1).unwrap();
        assert_eq!(series.tsuid.to_string(), "000007000001000002");
        assert_eq!(series.tsuid.metric_uid(), uid("000007"));
    }

    #[test]
    fn annotation_key_rendering() {
        let tsuid = Tsuid::from_hex("000007000001000002").unwrap();
        let key = AnnotationKey { start_ms: 1500, tsuid: Some(tsuid) };
        assert_eq!(key.to_string(), "1500:000007000001000002");
        assert_eq!(AnnotationKey::parse("1500:000007000001000002").unwrap(), key);

        let global = AnnotationKey { start_ms: 99, tsuid: None };
        assert_eq!(global.to_string(), "99:");
        assert_eq!(AnnotationKey::parse("99:").unwrap(), global);

        assert!(AnnotationKey::parse("no-colon").is_err());
        assert!(AnnotationKey::parse("abc:").is_err());
    }

    #[test]
    fn tombstones_carry_the_sentinel() {
        let entity = CatalogEntity::Uid(UidEntity::tombstone(UidKind::Metric, uid("000007")));
        assert!(entity.is_tombstone());

        let fresh = CatalogEntity::Uid(UidEntity::new(UidKind::Metric, uid("000007"), "sys.cpu", 1));
        assert!(!fresh.is_tombstone());

        let tsuid = Tsuid::from_hex("000007000001000002").unwrap();
        let series = CatalogEntity::Series(TimeSeries::tombstone(tsuid.clone()));
        assert!(series.is_tombstone());
        assert_eq!(series.key(), tsuid.to_string());
    }
}
