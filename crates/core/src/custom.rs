use std::collections::BTreeMap;

use crate::CoreError;

/// Free-form attribute map carried by catalog entities, persisted as a
/// MessagePack blob in the CUSTOM column.
pub type CustomMap = BTreeMap<String, String>;

pub fn encode_custom(custom: &CustomMap) -> Result<Vec<u8>, CoreError> {
    rmp_serde::to_vec(custom).map_err(|e| CoreError::Serialization(e.to_string()))
}

/// Decodes a CUSTOM column blob. A NULL column decodes to an empty map.
pub fn decode_custom(bytes: Option<&[u8]>) -> Result<CustomMap, CoreError> {
    match bytes {
        Some(b) => rmp_serde::from_slice(b).map_err(|e| CoreError::Serialization(e.to_string())),
        None => Ok(CustomMap::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_populated_maps() {
        assert!(decode_custom(None).unwrap().is_empty());

        let mut map = CustomMap::new();
        map.insert("owner".into(), "metrics-team".into());
        map.insert("tier".into(), "gold".into());
        let blob = encode_custom(&map).unwrap();
        assert_eq!(decode_custom(Some(&blob)).unwrap(), map);
    }

    #[test]
    fn garbage_blob_is_a_serialization_error() {
        let result = decode_custom(Some(&[0xc1, 0xc1, 0xc1]));
        assert!(matches!(result, Err(CoreError::Serialization(_))));
    }
}
