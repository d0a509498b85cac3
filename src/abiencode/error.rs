//! Error type returned by the slot serializer.

use core::fmt::Display;

use serde::ser;

/// Everything that can go wrong while ABI-encoding a value.
///
/// The serializer is total over the types this crate actually encodes; these
/// variants exist to reject Rust types that have no Solidity counterpart
/// (floats, maps, enums, ...) instead of silently producing garbage slots.
#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    /// The value contains a type with no ABI representation.
    TypeNotRepresentable(&'static str),
}

impl ser::Error for Error {
    fn custom<T>(_: T) -> Self
    where
        T: core::fmt::Display,
    {
        // serde's blanket impls never call this for the types we encode.
        Error::TypeNotRepresentable("custom")
    }
}

impl std::error::Error for Error {}

impl Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::TypeNotRepresentable(type_name) => {
                write!(f, "type is not representable in abi encoding: {type_name}")
            }
        }
    }
}

/// Alias for `Result` using the [Error] returned by the serializer.
pub type Result<T> = core::result::Result<T, Error>;
