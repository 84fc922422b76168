// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! JSON-transparent wrapper for payloads decoded later by a handler.

use serde::de::{Deserializer, Error as _};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// A JSON value captured verbatim at unmarshal time and decoded on
/// demand.
///
/// Serialization order: the raw bytes when present, otherwise the held
/// object, otherwise `null`. Deserialization always captures the raw
/// JSON slice without interpreting it.
#[derive(Debug, Default)]
pub struct RawExtension {
    /// Verbatim JSON captured during deserialization.
    pub raw: Option<Box<RawValue>>,

    /// A decoded value, serialized when no raw bytes are held.
    pub object: Option<serde_json::Value>,
}

impl RawExtension {
    /// Wrap an already-serializable value.
    pub fn from_object<T: Serialize>(object: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            raw: None,
            object: Some(serde_json::to_value(object)?),
        })
    }

    /// Wrap a verbatim JSON string.
    pub fn from_raw(raw: &str) -> Result<Self, serde_json::Error> {
        Ok(Self {
            raw: Some(RawValue::from_string(raw.to_string())?),
            object: None,
        })
    }

    /// True when neither raw bytes nor an object are held.
    pub fn is_empty(&self) -> bool {
        self.raw.is_none() && self.object.is_none()
    }

    /// Decode the held payload into `T`.
    ///
    /// An empty extension decodes as JSON `null`.
    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        if let Some(raw) = &self.raw {
            return serde_json::from_str(raw.get());
        }
        if let Some(object) = &self.object {
            return serde_json::from_value(object.clone());
        }
        serde_json::from_str("null")
    }
}

impl Clone for RawExtension {
    fn clone(&self) -> Self {
        Self {
            raw: self
                .raw
                .as_ref()
                .map(|r| RawValue::from_string(r.get().to_string()).expect("valid raw JSON")),
            object: self.object.clone(),
        }
    }
}

impl Serialize for RawExtension {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if let Some(raw) = &self.raw {
            return raw.serialize(serializer);
        }
        if let Some(object) = &self.object {
            return object.serialize(serializer);
        }
        serializer.serialize_none()
    }
}

impl<'de> Deserialize<'de> for RawExtension {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Box::<RawValue>::deserialize(deserializer)?;
        if raw.get() == "null" {
            return Ok(Self::default());
        }
        // Re-own the slice so the extension outlives the input buffer.
        let raw = RawValue::from_string(raw.get().to_string()).map_err(D::Error::custom)?;
        Ok(Self {
            raw: Some(raw),
            object: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Foo {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        bar: String,
        #[serde(default)]
        extension: RawExtension,
    }

    #[test]
    fn test_empty_extension_marshals_null() {
        let foo = Foo {
            bar: "bar".to_string(),
            extension: RawExtension::default(),
        };
        let json = serde_json::to_string(&foo).unwrap();
        assert_eq!(json, r#"{"bar":"bar","extension":null}"#);
    }

    #[test]
    fn test_raw_extension_marshals_verbatim() {
        let foo = Foo {
            bar: "bar".to_string(),
            extension: RawExtension::from_raw(r#"{"bar":"foo"}"#).unwrap(),
        };
        let json = serde_json::to_string(&foo).unwrap();
        assert_eq!(json, r#"{"bar":"bar","extension":{"bar":"foo"}}"#);
    }

    #[test]
    fn test_unmarshal_captures_raw() {
        let foo: Foo = serde_json::from_str(r#"{"bar":"bar","extension":{"bar":"foo"}}"#).unwrap();
        assert_eq!(foo.bar, "bar");
        assert_eq!(
            foo.extension.raw.as_ref().map(|r| r.get()),
            Some(r#"{"bar":"foo"}"#)
        );

        let inner: Foo = foo.extension.decode().unwrap();
        assert_eq!(inner.bar, "foo");
    }

    #[test]
    fn test_round_trip_preserves_bytes() {
        for value in [r#"{"a":1,"b":[true,null]}"#, "42", r#""text""#, "[1,2,3]"] {
            let ext: RawExtension = serde_json::from_str(value).unwrap();
            assert_eq!(serde_json::to_string(&ext).unwrap(), value);
        }
    }

    #[test]
    fn test_null_unmarshals_to_empty() {
        let ext: RawExtension = serde_json::from_str("null").unwrap();
        assert!(ext.is_empty());
        assert_eq!(serde_json::to_string(&ext).unwrap(), "null");
    }

    #[test]
    fn test_object_backed_extension_marshals_object() {
        let ext = RawExtension::from_object(&serde_json::json!({"n": 7})).unwrap();
        assert_eq!(serde_json::to_string(&ext).unwrap(), r#"{"n":7}"#);
    }
}
