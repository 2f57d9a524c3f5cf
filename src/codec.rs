// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Element codecs.
//!
//! The queue stores opaque byte payloads; the codec pair translates between
//! user values and those bytes. Either half can be replaced independently
//! through the builder — plain closures work, since both traits are
//! blanket-implemented for matching `Fn`s.
//!
//! The default pair serializes through `serde_json`, the crate's generic
//! object format. A custom writer paired with the default reader (or the
//! reverse) shows up as a corrupt-state error on the first read, not as a
//! silent misread.

use serde::{Serialize, de::DeserializeOwned};

use crate::{Result, error::SerializeSnafu};

/// Turns an element into the byte payload of one excerpt.
pub trait Serializer<E>: Send + Sync {
    fn serialize(&self, value: &E, buf: &mut Vec<u8>) -> Result<()>;
}

/// Turns an excerpt payload back into an element.
pub trait Deserializer<E>: Send + Sync {
    fn deserialize(&self, bytes: &[u8]) -> Result<E>;
}

impl<E, F> Serializer<E> for F
where
    F: Fn(&E, &mut Vec<u8>) -> Result<()> + Send + Sync,
{
    fn serialize(&self, value: &E, buf: &mut Vec<u8>) -> Result<()> { self(value, buf) }
}

impl<E, F> Deserializer<E> for F
where
    F: Fn(&[u8]) -> Result<E> + Send + Sync,
{
    fn deserialize(&self, bytes: &[u8]) -> Result<E> { self(bytes) }
}

/// Default writer: serde_json.
pub struct SerdeSerializer;

impl<E: Serialize> Serializer<E> for SerdeSerializer {
    fn serialize(&self, value: &E, buf: &mut Vec<u8>) -> Result<()> {
        serde_json::to_writer(&mut *buf, value).map_err(|e| {
            SerializeSnafu {
                reason: e.to_string(),
            }
            .build()
        })
    }
}

/// Default reader: serde_json.
pub struct SerdeDeserializer;

impl<E: DeserializeOwned> Deserializer<E> for SerdeDeserializer {
    fn deserialize(&self, bytes: &[u8]) -> Result<E> {
        serde_json::from_slice(bytes).map_err(|e| {
            SerializeSnafu {
                reason: e.to_string(),
            }
            .build()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_round_trip() {
        let mut buf = Vec::new();
        Serializer::serialize(&SerdeSerializer, &vec![1i32, 2, 3], &mut buf).unwrap();

        let decoded: Vec<i32> = SerdeDeserializer.deserialize(&buf).unwrap();
        assert_eq!(decoded, vec![1, 2, 3]);
    }

    #[test]
    fn test_closure_codecs() {
        let write_int = |value: &i32, buf: &mut Vec<u8>| -> Result<()> {
            buf.extend_from_slice(&value.to_le_bytes());
            Ok(())
        };
        let read_int = |bytes: &[u8]| -> Result<i32> {
            Ok(i32::from_le_bytes(bytes.try_into().unwrap()))
        };

        let mut buf = Vec::new();
        write_int.serialize(&-77, &mut buf).unwrap();
        assert_eq!(read_int.deserialize(&buf).unwrap(), -77);
    }

    #[test]
    fn test_default_reader_rejects_raw_bytes() {
        // A custom writer's raw little-endian int is not valid JSON.
        let raw = 1i32.to_le_bytes();
        let decoded: Result<i32> = SerdeDeserializer.deserialize(&raw);
        assert!(decoded.is_err());
    }
}
