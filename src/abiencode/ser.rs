//! Solidity ABI encoding as a [serde::Serializer].
//!
//! Values are written as a sequence of 32-byte slots to a [Writer] sink. The
//! encoding is two-part: a *head* holding static values and the offsets of
//! dynamic ones, and a *tail* holding the content of the dynamic values. Since
//! a serde serializer cannot look ahead, we serialize a value up to four
//! times: once to measure the head, once to write it (measuring tails as we
//! go to compute offsets), and for dynamic values once more per region.

use super::error::{Error, Result};
use serde::{
    ser::{
        self, Impossible, SerializeSeq, SerializeStruct, SerializeTuple, SerializeTupleStruct,
    },
    Serialize,
};

const SLOT_SIZE: usize = 32; // bytes

/// Type name of the sentinel unit struct that marks its container as dynamic.
/// Chosen so that no real Rust type can collide with it.
const DYNAMIC_SENTINEL: &str = ":$&_DYNAMIC";

/// Zero-size marker that forces the containing tuple to be encoded as a
/// dynamic type, without itself producing any slots.
///
/// The serializer cannot represent `bytes` and `bytes32` through the same
/// serde entry point: fixed-size byte strings must be able to write raw slots
/// via `serialize_bytes`, so `bytes` is modelled as the tuple
/// `(DynamicMarker, length, raw slots)` instead (see [as_bytes][super::as_bytes]).
/// The marker makes that tuple dynamic, which is what moves the length and
/// data into the tail region where the ABI expects them.
pub struct DynamicMarker;

impl Serialize for DynamicMarker {
    fn serialize<S>(&self, serializer: S) -> core::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_unit_struct(DYNAMIC_SENTINEL)
    }
}

/// Sink for encoded slots.
///
/// Every call receives exactly one 32-byte slot, except for the raw chunks of
/// a `bytes`/`bytesN` payload, which are already slot-aligned.
pub trait Writer {
    fn write(&mut self, slot: &[u8]);
}

/// Writer used during the measuring passes, which must never emit anything.
struct NullWriter;

impl Writer for NullWriter {
    fn write(&mut self, _: &[u8]) {
        unreachable!("measuring pass tried to write a slot");
    }
}

struct ByteWriter(Vec<u8>);

impl Writer for ByteWriter {
    fn write(&mut self, slot: &[u8]) {
        self.0.extend_from_slice(slot);
    }
}

#[derive(Debug)]
enum Pass {
    /// Measure the head size and detect whether the value is dynamic.
    HeadSize(usize),
    /// Write the head. `offset` is where the next dynamic child's content
    /// will land, relative to the start of the current value's encoding.
    Head { offset: usize },
    /// Measure the tail size (needed to advance `offset` between children).
    TailSize(usize),
    /// Write the tail.
    Tail,
}

pub struct Serializer<'a, W>
where
    W: Writer,
{
    writer: &'a mut W,
    pass: Pass,
    is_dynamic: bool,
    is_marker: bool,
}

/// Encode `value` like `abi.encode(value)`: a single value, prefixed with an
/// offset slot if it is dynamic.
pub fn to_writer<T, W>(value: &T, writer: &mut W) -> Result<()>
where
    T: Serialize,
    W: Writer,
{
    encode(value, writer, true)
}

/// Encode the fields of `value` like `abi.encode(a, b, c)` encodes a function
/// argument tuple: no outer offset slot, offsets relative to the start.
pub fn to_fnargs_writer<T, W>(value: &T, writer: &mut W) -> Result<()>
where
    T: Serialize,
    W: Writer,
{
    encode(value, writer, false)
}

pub fn to_vec<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut writer = ByteWriter(Vec::new());
    to_writer(value, &mut writer)?;
    Ok(writer.0)
}

pub fn to_fnargs_vec<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut writer = ByteWriter(Vec::new());
    to_fnargs_writer(value, &mut writer)?;
    Ok(writer.0)
}

fn encode<T, W>(value: &T, writer: &mut W, top_level_offset: bool) -> Result<()>
where
    T: Serialize,
    W: Writer,
{
    let (head_size, is_dynamic, _) = probe(value)?;

    let mut serializer = Serializer {
        writer,
        pass: Pass::Head { offset: head_size },
        is_dynamic,
        is_marker: false,
    };

    if is_dynamic && top_level_offset {
        serializer.write_right_aligned(SLOT_SIZE.to_be_bytes());
    }

    value.serialize(&mut serializer)?;
    if is_dynamic {
        serializer.pass = Pass::Tail;
        value.serialize(&mut serializer)?;
    }
    Ok(())
}

/// Measuring pass: returns `(head_size, is_dynamic, is_marker)` of a value.
fn probe<T>(value: &T) -> Result<(usize, bool, bool)>
where
    T: Serialize + ?Sized,
{
    let mut serializer = Serializer {
        writer: &mut NullWriter,
        pass: Pass::HeadSize(0),
        is_dynamic: false,
        is_marker: false,
    };
    value.serialize(&mut serializer)?;

    match serializer.pass {
        Pass::HeadSize(head_size) => Ok((head_size, serializer.is_dynamic, serializer.is_marker)),
        _ => unreachable!("the serializer never reassigns the head-size pass"),
    }
}

fn tail_size<T>(value: &T) -> Result<usize>
where
    T: Serialize + ?Sized,
{
    let mut serializer = Serializer {
        writer: &mut NullWriter,
        pass: Pass::TailSize(0),
        is_dynamic: false,
        is_marker: false,
    };
    value.serialize(&mut serializer)?;

    match serializer.pass {
        Pass::TailSize(size) => Ok(size),
        _ => unreachable!("the serializer never reassigns the tail-size pass"),
    }
}

impl<'a, W> Serializer<'a, W>
where
    W: Writer,
{
    // Panics if N > SLOT_SIZE.
    fn write_right_aligned<const N: usize>(&mut self, v: [u8; N]) {
        let mut slot = [0u8; SLOT_SIZE];
        slot[SLOT_SIZE - N..].copy_from_slice(v.as_slice());
        self.writer.write(slot.as_slice());
    }

    fn write_left_aligned_slice(&mut self, v: &[u8]) {
        let mut slot = [0u8; SLOT_SIZE];
        slot[..v.len()].copy_from_slice(v);
        self.writer.write(slot.as_slice());
    }

    fn emit<T>(&mut self, value: &T, pass: Pass) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let mut serializer = Serializer {
            writer: &mut *self.writer,
            pass,
            is_dynamic: false,
            is_marker: false,
        };
        value.serialize(&mut serializer)
    }

    /// Shared handling for one child of a composite value (struct field,
    /// tuple element or array element). `in_seq` adjusts offsets for the
    /// ABI quirk that array-element offsets are relative to the end of the
    /// length slot rather than to the start of the array encoding.
    fn element<T>(&mut self, value: &T, in_seq: bool) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let (child_head, is_dyn, is_marker) = probe(value)?;
        match self.pass {
            Pass::HeadSize(ref mut head_size) => {
                *head_size += if is_dyn { SLOT_SIZE } else { child_head };
                self.is_dynamic |= is_dyn || is_marker;
                Ok(())
            }
            Pass::Head { offset } => {
                if is_dyn {
                    let base = if in_seq { offset - SLOT_SIZE } else { offset };
                    self.write_right_aligned(base.to_be_bytes());
                    self.pass = Pass::Head {
                        offset: offset + child_head + tail_size(value)?,
                    };
                    Ok(())
                } else {
                    // Static children carry no offsets of their own, so the
                    // base offset we pass down is irrelevant.
                    self.emit(value, Pass::Head { offset: child_head })
                }
            }
            Pass::TailSize(size) => {
                let child_tail = tail_size(value)?;
                self.pass =
                    Pass::TailSize(size + if is_dyn { child_head } else { 0 } + child_tail);
                Ok(())
            }
            Pass::Tail => {
                if is_dyn {
                    // The child needs its own head size as base offset so it
                    // knows where its tail region begins.
                    self.emit(value, Pass::Head { offset: child_head })?;
                    self.emit(value, Pass::Tail)
                } else {
                    Ok(())
                }
            }
        }
    }
}

macro_rules! impl_serialize_uint {
    ( $method:ident, $T:ty ) => {
        fn $method(self, v: $T) -> Result<()> {
            match self.pass {
                Pass::HeadSize(ref mut head_size) => *head_size += SLOT_SIZE,
                Pass::Head { .. } => self.write_right_aligned(v.to_be_bytes()),
                Pass::TailSize(_) | Pass::Tail => {}
            }
            Ok(())
        }
    };
}

macro_rules! impl_serialize_unsupported {
    ( $( $method:ident: $T:ty => $name:literal, )* ) => {
        $(
            fn $method(self, _: $T) -> Result<()> {
                Err(Error::TypeNotRepresentable($name))
            }
        )*
    };
}

impl<'a, 'b, W> ser::Serializer for &'a mut Serializer<'b, W>
where
    W: Writer,
{
    type Ok = ();
    type Error = Error;

    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Impossible<(), Error>;
    type SerializeMap = Impossible<(), Error>;
    type SerializeStruct = Self;
    type SerializeStructVariant = Impossible<(), Error>;

    impl_serialize_uint!(serialize_u8, u8);
    impl_serialize_uint!(serialize_u16, u16);
    impl_serialize_uint!(serialize_u32, u32);
    impl_serialize_uint!(serialize_u64, u64);
    impl_serialize_uint!(serialize_u128, u128);

    impl_serialize_unsupported! {
        serialize_i8: i8 => "i8",
        serialize_i16: i16 => "i16",
        serialize_i32: i32 => "i32",
        serialize_i64: i64 => "i64",
        serialize_i128: i128 => "i128",
        serialize_f32: f32 => "f32",
        serialize_f64: f64 => "f64",
        serialize_char: char => "char",
        serialize_str: &str => "str",
    }

    fn serialize_bool(self, v: bool) -> Result<()> {
        self.serialize_u8(u8::from(v))
    }

    /// Writes `v` as raw, left-aligned slot data.
    ///
    /// This is the entry point for `bytes32`, addresses and `U256`, which
    /// hand in exactly one pre-formatted slot, and for the payload of
    /// [as_bytes][super::as_bytes]. Dynamic-length framing (offset, length)
    /// is *not* produced here.
    fn serialize_bytes(self, v: &[u8]) -> Result<()> {
        match self.pass {
            Pass::HeadSize(ref mut head_size) => {
                let r = v.len() % SLOT_SIZE;
                *head_size += (v.len() - r) + if r == 0 { 0 } else { SLOT_SIZE };
            }
            Pass::Head { .. } => {
                let chunks = v.chunks_exact(SLOT_SIZE);
                let rem = chunks.remainder();
                for chunk in chunks {
                    self.writer.write(chunk);
                }
                if !rem.is_empty() {
                    self.write_left_aligned_slice(rem);
                }
            }
            Pass::TailSize(_) | Pass::Tail => {}
        }
        Ok(())
    }

    fn serialize_none(self) -> Result<()> {
        Err(Error::TypeNotRepresentable("none"))
    }

    fn serialize_some<T: ?Sized>(self, _: &T) -> Result<()>
    where
        T: Serialize,
    {
        Err(Error::TypeNotRepresentable("some"))
    }

    fn serialize_unit(self) -> Result<()> {
        Err(Error::TypeNotRepresentable("unit"))
    }

    fn serialize_unit_struct(self, name: &'static str) -> Result<()> {
        if name != DYNAMIC_SENTINEL {
            return Err(Error::TypeNotRepresentable("unit struct"));
        }
        if let Pass::HeadSize(_) = self.pass {
            self.is_marker = true;
        }
        Ok(())
    }

    fn serialize_unit_variant(self, _: &'static str, _: u32, _: &'static str) -> Result<()> {
        Err(Error::TypeNotRepresentable("unit variant (enum)"))
    }

    fn serialize_newtype_struct<T: ?Sized>(self, _: &'static str, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        self.element(value, false)
    }

    fn serialize_newtype_variant<T: ?Sized>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: &T,
    ) -> Result<()>
    where
        T: Serialize,
    {
        Err(Error::TypeNotRepresentable("newtype variant (enum)"))
    }

    fn serialize_seq(self, len: Option<usize>) -> Result<Self::SerializeSeq> {
        let len = len.ok_or(Error::TypeNotRepresentable("sequence of unknown length"))?;
        match self.pass {
            Pass::HeadSize(ref mut head_size) => {
                // The length slot; elements are added via serialize_element.
                self.is_dynamic = true;
                *head_size += SLOT_SIZE;
            }
            Pass::Head { .. } => self.write_right_aligned(len.to_be_bytes()),
            Pass::TailSize(_) | Pass::Tail => {}
        }
        Ok(self)
    }

    fn serialize_tuple(self, _: usize) -> Result<Self::SerializeTuple> {
        Ok(self)
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        Ok(self)
    }

    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        Err(Error::TypeNotRepresentable("tuple variant (enum)"))
    }

    fn serialize_map(self, _: Option<usize>) -> Result<Self::SerializeMap> {
        Err(Error::TypeNotRepresentable("map"))
    }

    fn serialize_struct(self, _: &'static str, _: usize) -> Result<Self::SerializeStruct> {
        Ok(self)
    }

    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(Error::TypeNotRepresentable("struct variant (enum)"))
    }

    fn collect_str<T: ?Sized>(self, _: &T) -> Result<()>
    where
        T: core::fmt::Display,
    {
        Err(Error::TypeNotRepresentable("str"))
    }
}

impl<'a, 'b, W> SerializeSeq for &'a mut Serializer<'b, W>
where
    W: Writer,
{
    type Ok = ();
    type Error = Error;

    fn serialize_element<T: ?Sized>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        self.element(value, true)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl<'a, 'b, W> SerializeTuple for &'a mut Serializer<'b, W>
where
    W: Writer,
{
    type Ok = ();
    type Error = Error;

    fn serialize_element<T: ?Sized>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        self.element(value, false)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl<'a, 'b, W> SerializeTupleStruct for &'a mut Serializer<'b, W>
where
    W: Writer,
{
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: ?Sized>(&mut self, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        self.element(value, false)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl<'a, 'b, W> SerializeStruct for &'a mut Serializer<'b, W>
where
    W: Writer,
{
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: ?Sized>(&mut self, _: &'static str, value: &T) -> Result<()>
    where
        T: Serialize,
    {
        self.element(value, false)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}
