//! Terraform State Encoding
//!
//! Decodes and encodes Terraform dynamic values. Terraform exchanges values as
//! msgpack, with extension type 0 marking a value that is unknown until apply.
//! Raw state read back from disk arrives as JSON.

use std::collections::BTreeMap;

use rmpv::Value as MsgValue;
use serde::Deserialize;

use crate::error::{Error, Result};

/// msgpack extension code Terraform uses for unknown values
const UNKNOWN_EXT: i8 = 0;

/// Unknown value carrying refinements (Terraform 1.6+); the payload is dropped
const REFINED_UNKNOWN_EXT: i8 = 0x0c;

/// Dynamic value that can be encoded/decoded from Terraform state
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum DynamicValue {
    Null,
    #[serde(skip)]
    Unknown,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    List(Vec<DynamicValue>),
    Map(BTreeMap<String, DynamicValue>),
}

impl DynamicValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DynamicValue::Null)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, DynamicValue::Unknown)
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            DynamicValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DynamicValue::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, DynamicValue>> {
        match self {
            DynamicValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&DynamicValue> {
        self.as_map()?.get(key)
    }

    /// Attribute value, treating a missing attribute as null
    pub fn attr(&self, key: &str) -> DynamicValue {
        self.get(key).cloned().unwrap_or_default()
    }

    /// Compare two values the way Terraform compares them: numbers by
    /// magnitude, everything else structurally.
    pub fn same_as(&self, other: &DynamicValue) -> bool {
        match (self, other) {
            (DynamicValue::Number(a), DynamicValue::Number(b)) => a.as_f64() == b.as_f64(),
            (DynamicValue::List(a), DynamicValue::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.same_as(y))
            }
            (DynamicValue::Map(a), DynamicValue::Map(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| b.get(k).map_or(false, |w| v.same_as(w)))
            }
            _ => self == other,
        }
    }
}

impl Default for DynamicValue {
    fn default() -> Self {
        DynamicValue::Null
    }
}

/// Decode a Terraform DynamicValue from msgpack bytes
pub fn decode_dynamic_value(data: &[u8]) -> Result<DynamicValue> {
    if data.is_empty() {
        return Ok(DynamicValue::Null);
    }

    let mut reader = data;
    let value = rmpv::decode::read_value(&mut reader)
        .map_err(|e| Error::Decode(e.to_string()))?;
    from_msgpack(value)
}

/// Encode a value to Terraform msgpack bytes
pub fn encode_dynamic_value(value: &DynamicValue) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, &to_msgpack(value)?)
        .map_err(|e| Error::Encode(e.to_string()))?;
    Ok(buf)
}

/// Decode a value from Terraform's JSON state representation
pub fn decode_json_value(data: &[u8]) -> Result<DynamicValue> {
    if data.is_empty() {
        return Ok(DynamicValue::Null);
    }
    Ok(serde_json::from_slice(data)?)
}

fn from_msgpack(value: MsgValue) -> Result<DynamicValue> {
    Ok(match value {
        MsgValue::Nil => DynamicValue::Null,
        MsgValue::Boolean(b) => DynamicValue::Bool(b),
        MsgValue::Integer(i) => match (i.as_i64(), i.as_u64()) {
            (Some(n), _) => DynamicValue::Number(n.into()),
            (None, Some(n)) => DynamicValue::Number(n.into()),
            (None, None) => return Err(Error::Decode(format!("integer out of range: {:?}", i))),
        },
        MsgValue::F32(f) => number_from_f64(f as f64)?,
        MsgValue::F64(f) => number_from_f64(f)?,
        MsgValue::String(s) => match s.into_str() {
            Some(s) => DynamicValue::String(s),
            None => return Err(Error::Decode("string is not valid UTF-8".to_string())),
        },
        MsgValue::Array(items) => DynamicValue::List(
            items.into_iter().map(from_msgpack).collect::<Result<_>>()?,
        ),
        MsgValue::Map(entries) => {
            let mut map = BTreeMap::new();
            for (key, value) in entries {
                let key = match key {
                    MsgValue::String(s) => s
                        .into_str()
                        .ok_or_else(|| Error::Decode("object key is not valid UTF-8".to_string()))?,
                    other => return Err(Error::Decode(format!("object key is not a string: {}", other))),
                };
                map.insert(key, from_msgpack(value)?);
            }
            DynamicValue::Map(map)
        }
        MsgValue::Ext(UNKNOWN_EXT, _) | MsgValue::Ext(REFINED_UNKNOWN_EXT, _) => {
            DynamicValue::Unknown
        }
        MsgValue::Ext(code, _) => {
            return Err(Error::Decode(format!("unsupported msgpack extension type {}", code)))
        }
        MsgValue::Binary(_) => {
            return Err(Error::Decode("unexpected binary value".to_string()))
        }
    })
}

fn to_msgpack(value: &DynamicValue) -> Result<MsgValue> {
    Ok(match value {
        DynamicValue::Null => MsgValue::Nil,
        DynamicValue::Unknown => MsgValue::Ext(UNKNOWN_EXT, vec![0]),
        DynamicValue::Bool(b) => MsgValue::Boolean(*b),
        DynamicValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                MsgValue::from(i)
            } else if let Some(u) = n.as_u64() {
                MsgValue::from(u)
            } else if let Some(f) = n.as_f64() {
                MsgValue::F64(f)
            } else {
                return Err(Error::Encode(format!("unrepresentable number {}", n)));
            }
        }
        DynamicValue::String(s) => MsgValue::from(s.as_str()),
        DynamicValue::List(items) => {
            MsgValue::Array(items.iter().map(to_msgpack).collect::<Result<_>>()?)
        }
        DynamicValue::Map(map) => MsgValue::Map(
            map.iter()
                .map(|(k, v)| Ok((MsgValue::from(k.as_str()), to_msgpack(v)?)))
                .collect::<Result<_>>()?,
        ),
    })
}

fn number_from_f64(f: f64) -> Result<DynamicValue> {
    serde_json::Number::from_f64(f)
        .map(DynamicValue::Number)
        .ok_or_else(|| Error::Decode(format!("number is not finite: {}", f)))
}

/// Create a DynamicValue map with the given attributes
pub fn make_state(attrs: Vec<(&str, DynamicValue)>) -> DynamicValue {
    let mut map = BTreeMap::new();
    for (key, value) in attrs {
        map.insert(key.to_string(), value);
    }
    DynamicValue::Map(map)
}

/// Create a string DynamicValue
pub fn string_value(s: impl Into<String>) -> DynamicValue {
    DynamicValue::String(s.into())
}

/// Create a number DynamicValue from i64
pub fn int_value(n: i64) -> DynamicValue {
    DynamicValue::Number(serde_json::Number::from(n))
}

/// Create a null DynamicValue
pub fn null_value() -> DynamicValue {
    DynamicValue::Null
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_bytes_decode_to_null() {
        assert_eq!(decode_dynamic_value(&[]).unwrap(), DynamicValue::Null);
        assert_eq!(decode_json_value(&[]).unwrap(), DynamicValue::Null);
    }

    #[test]
    fn test_unknown_uses_extension_zero() {
        let bytes = encode_dynamic_value(&DynamicValue::Unknown).unwrap();
        // fixext1, type 0, payload 0
        assert_eq!(bytes, vec![0xd4, 0x00, 0x00]);
        assert_eq!(decode_dynamic_value(&bytes).unwrap(), DynamicValue::Unknown);
    }

    #[test]
    fn test_object_survives_msgpack() {
        let state = make_state(vec![
            ("id", string_value("wo_data_abc")),
            ("input_wo", null_value()),
            ("input_wo_version", int_value(3)),
            ("triggers_replace", DynamicValue::List(vec![string_value("a")])),
            ("output", DynamicValue::Unknown),
        ]);

        let bytes = encode_dynamic_value(&state).unwrap();
        assert_eq!(decode_dynamic_value(&bytes).unwrap(), state);
    }

    #[test]
    fn test_float_numbers_decode() {
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &MsgValue::F64(2.5)).unwrap();
        assert_eq!(decode_dynamic_value(&buf).unwrap().as_f64(), Some(2.5));
    }

    #[test]
    fn test_malformed_msgpack_is_decode_error() {
        // map header announcing one entry with nothing after it
        let err = decode_dynamic_value(&[0x81]).unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[test]
    fn test_refined_unknown_decodes_as_unknown() {
        // ext8, length 3, type 12, payload {1: false} ("not null" refinement)
        let bytes = [0xc7, 0x03, 0x0c, 0x81, 0x01, 0xc2];
        assert_eq!(decode_dynamic_value(&bytes).unwrap(), DynamicValue::Unknown);

        let mut buf = Vec::new();
        rmpv::encode::write_value(
            &mut buf,
            &MsgValue::Array(vec![MsgValue::Ext(0x0c, vec![0x81, 0x01, 0xc2])]),
        )
        .unwrap();
        assert_eq!(
            decode_dynamic_value(&buf).unwrap(),
            DynamicValue::List(vec![DynamicValue::Unknown])
        );
    }

    #[test]
    fn test_unsupported_extension_rejected() {
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, &MsgValue::Ext(5, vec![1])).unwrap();
        assert!(decode_dynamic_value(&buf).is_err());
    }

    #[test]
    fn test_json_state_decodes() {
        let json = br#"{"id":"wo_data_x","input_wo":null,"input_wo_version":1,"triggers_replace":["a","b"],"output":"v"}"#;
        let value = decode_json_value(json).unwrap();

        assert_eq!(value.get("id").and_then(|v| v.as_string()), Some("wo_data_x"));
        assert!(value.attr("input_wo").is_null());
        assert_eq!(value.attr("input_wo_version").as_f64(), Some(1.0));
        assert_eq!(
            value.attr("triggers_replace"),
            DynamicValue::List(vec![string_value("a"), string_value("b")])
        );
    }

    #[test]
    fn test_same_as_compares_numbers_numerically() {
        let one_int = int_value(1);
        let one_float = DynamicValue::Number(serde_json::Number::from_f64(1.0).unwrap());

        assert_ne!(one_int, one_float);
        assert!(one_int.same_as(&one_float));
        assert!(!one_int.same_as(&int_value(2)));
        assert!(!one_int.same_as(&DynamicValue::Null));
        assert!(DynamicValue::Null.same_as(&DynamicValue::Null));
    }

    #[test]
    fn test_missing_attr_is_null() {
        let state = make_state(vec![("id", string_value("x"))]);
        assert!(state.attr("output").is_null());
        assert_eq!(state.attr("id"), string_value("x"));
    }
}
