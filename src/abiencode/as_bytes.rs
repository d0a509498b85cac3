//! Serialize a byte string as the Solidity `bytes` type.
//!
//! Annotate a `Vec<u8>` field with `#[serde(with = "abiencode::as_bytes")]`
//! to get the dynamic encoding (offset in the head, length and padded data in
//! the tail). Without the annotation serde would treat the vector as a
//! `uint8[]`, which pads every byte to its own slot.

use serde::{ser::SerializeTuple, Serialize, Serializer};

use super::ser::DynamicMarker;

struct Raw<'a>(&'a [u8]);

impl<'a> Serialize for Raw<'a> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bytes(self.0)
    }
}

pub fn serialize<S, T>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: AsRef<[u8]>,
{
    let bytes = value.as_ref();
    // The marker turns this tuple dynamic, which moves the length slot and
    // the data into the tail and puts an offset in our place in the head.
    let mut tuple = serializer.serialize_tuple(3)?;
    tuple.serialize_element(&DynamicMarker)?;
    tuple.serialize_element(&(bytes.len() as u64))?;
    tuple.serialize_element(&Raw(bytes))?;
    tuple.end()
}
