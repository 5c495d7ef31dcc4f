use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CoreError;

/// Width in bytes of a single opaque UID assigned by the primary store.
pub const UID_WIDTH: usize = 3;
/// Width in bytes of a tag-pair UID: tag key UID followed by tag value UID.
pub const PAIR_WIDTH: usize = 2 * UID_WIDTH;

fn decode_hex(s: &str, out: &mut [u8]) -> Result<(), CoreError> {
    if !s.is_ascii() {
        return Err(CoreError::InvalidUid(format!("non-hex uid: {s}")));
    }
    if s.len() != out.len() * 2 {
        return Err(CoreError::InvalidUid(format!(
            "expected {} hex chars, got {}",
            out.len() * 2,
            s.len()
        )));
    }
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16)
            .map_err(|_| CoreError::InvalidUid(format!("non-hex uid: {s}")))?;
    }
    Ok(())
}

fn encode_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    for byte in bytes {
        write!(f, "{byte:02x}")?;
    }
    Ok(())
}

/// A fixed-width opaque id naming a metric, tag key, or tag value.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Uid([u8; UID_WIDTH]);

impl Uid {
    pub fn from_bytes(bytes: [u8; UID_WIDTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; UID_WIDTH] {
        &self.0
    }

    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let mut bytes = [0u8; UID_WIDTH];
        decode_hex(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        encode_hex(f, &self.0)
    }
}

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uid({self})")
    }
}

/// The materialized id of a (tag key, tag value) combination: key UID
/// concatenated with value UID.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PairUid([u8; PAIR_WIDTH]);

impl PairUid {
    pub fn compose(tagk: Uid, tagv: Uid) -> Self {
        let mut bytes = [0u8; PAIR_WIDTH];
        bytes[..UID_WIDTH].copy_from_slice(tagk.as_bytes());
        bytes[UID_WIDTH..].copy_from_slice(tagv.as_bytes());
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; PAIR_WIDTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PAIR_WIDTH] {
        &self.0
    }

    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        let mut bytes = [0u8; PAIR_WIDTH];
        decode_hex(s, &mut bytes)?;
        Ok(Self(bytes))
    }

    pub fn tagk(&self) -> Uid {
        let mut bytes = [0u8; UID_WIDTH];
        bytes.copy_from_slice(&self.0[..UID_WIDTH]);
        Uid::from_bytes(bytes)
    }

    pub fn tagv(&self) -> Uid {
        let mut bytes = [0u8; UID_WIDTH];
        bytes.copy_from_slice(&self.0[UID_WIDTH..]);
        Uid::from_bytes(bytes)
    }
}

impl fmt::Display for PairUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        encode_hex(f, &self.0)
    }
}

impl fmt::Debug for PairUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PairUid({self})")
    }
}

/// Fully-qualified time-series id: metric UID followed by the series'
/// ordered tag-pair UIDs. The concatenation is the identity -- a series
/// can be rebuilt from the bare key alone.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tsuid(Vec<u8>);

impl Tsuid {
    pub fn compose(metric: Uid, pairs: &[PairUid]) -> Result<Self, CoreError> {
        if pairs.is_empty() {
            return Err(CoreError::InvalidUid("tsuid requires at least one tag pair".into()));
        }
        let mut bytes = Vec::with_capacity(UID_WIDTH + pairs.len() * PAIR_WIDTH);
        bytes.extend_from_slice(metric.as_bytes());
        for pair in pairs {
            bytes.extend_from_slice(pair.as_bytes());
        }
        Ok(Self(bytes))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, CoreError> {
        if bytes.len() < UID_WIDTH + PAIR_WIDTH
            || (bytes.len() - UID_WIDTH) % PAIR_WIDTH != 0
        {
            return Err(CoreError::InvalidUid(format!(
                "tsuid length {} is not metric + n tag pairs",
                bytes.len()
            )));
        }
        Ok(Self(bytes))
    }

    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        if s.len() % 2 != 0 {
            return Err(CoreError::InvalidUid(format!("odd-length tsuid: {s}")));
        }
        let mut bytes = vec![0u8; s.len() / 2];
        decode_hex(s, &mut bytes)?;
        Self::from_bytes(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The metric UID prefix of this series id.
    pub fn metric_uid(&self) -> Uid {
        let mut bytes = [0u8; UID_WIDTH];
        bytes.copy_from_slice(&self.0[..UID_WIDTH]);
        Uid::from_bytes(bytes)
    }

    /// The ordered tag-pair UIDs following the metric prefix.
    pub fn pair_uids(&self) -> Vec<PairUid> {
        self.0[UID_WIDTH..]
            .chunks_exact(PAIR_WIDTH)
            .map(|chunk| {
                let mut bytes = [0u8; PAIR_WIDTH];
                bytes.copy_from_slice(chunk);
                PairUid::from_bytes(bytes)
            })
            .collect()
    }
}

impl fmt::Display for Tsuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        encode_hex(f, &self.0)
    }
}

impl fmt::Debug for Tsuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tsuid({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uid_hex_roundtrip() {
        let uid = Uid::from_bytes([0x00, 0x1a, 0xff]);
        assert_eq!(uid.to_string(), "001aff");
        assert_eq!(Uid::from_hex("001aff").unwrap(), uid);
    }

    #[test]
    fn uid_rejects_bad_hex() {
        assert!(Uid::from_hex("00").is_err());
        assert!(Uid::from_hex("00zzff").is_err());
        assert!(Uid::from_hex("001aff00").is_err());
    }

    #[test]
    fn pair_compose_decompose() {
        let tagk = Uid::from_hex("000001").unwrap();
        let tagv = Uid::from_hex("0000aa").unwrap();
        let pair = PairUid::compose(tagk, tagv);
        assert_eq!(pair.to_string(), "0000010000aa");
        assert_eq!(pair.tagk(), tagk);
        assert_eq!(pair.tagv(), tagv);
    }

    #[test]
    fn tsuid_compose_decompose() {
        let metric = Uid::from_hex("000007").unwrap();
        let p1 = PairUid::from_hex("000001000002").unwrap();
        let p2 = PairUid::from_hex("000003000004").unwrap();
        let tsuid = Tsuid::compose(metric, &[p1, p2]).unwrap();

        assert_eq!(tsuid.metric_uid(), metric);
        assert_eq!(tsuid.pair_uids(), vec![p1, p2]);
        // Reconstructing from the rendered key yields the same identity.
        let reparsed = Tsuid::from_hex(&tsuid.to_string()).unwrap();
        assert_eq!(reparsed, tsuid);
    }

    #[test]
    fn tsuid_preserves_pair_order() {
        let metric = Uid::from_hex("000007").unwrap();
        let p1 = PairUid::from_hex("000001000002").unwrap();
        let p2 = PairUid::from_hex("000003000004").unwrap();
        let a = Tsuid::compose(metric, &[p1, p2]).unwrap();
        let b = Tsuid::compose(metric, &[p2, p1]).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn tsuid_rejects_bad_lengths() {
        // Bare metric with no tag pairs.
        assert!(Tsuid::from_hex("000007").is_err());
        // Truncated pair.
        assert!(Tsuid::from_hex("000007000001").is_err());
        assert!(Tsuid::from_bytes(vec![0u8; UID_WIDTH + PAIR_WIDTH - 1]).is_err());
        let metric = Uid::from_hex("000007").unwrap();
        assert!(Tsuid::compose(metric, &[]).is_err());
    }
}
