//! Big-endian wire primitives for the sync protocol.
//!
//! Every packet field is built from a handful of primitives:
//!
//! - integers in big-endian byte order ([`read_be`] / [`write_be`])
//! - booleans as a single byte, `0` or `1` ([`read_bool`] / [`write_bool`])
//! - strings as a `u16` byte length followed by UTF-8 ([`read_string`] / [`write_string`])
//! - entries as a tagged, recursively encoded parent chain ([`read_entry`] / [`write_entry`])
//!
//! # Entry encoding
//!
//! ```text
//! Entry := kind:u8 has_parent:bool [parent:Entry] name:String [descriptor:String]
//! ```
//!
//! `kind` is `0` for classes, `1` for fields and `2` for methods; only fields and methods carry a
//! descriptor. Members must have a parent. Decoding stops at [`MAX_ENTRY_DEPTH`] nested parents.
//!
//! All readers work on any [`Read`] and fail with [`crate::Error::TransportFault`] if the stream
//! ends early, or [`crate::Error::Malformed`] if the bytes do not form a valid value.

use std::io::{Read, Write};

use crate::{
    translation::{Entry, EntryKind, EntryTag},
    Result,
};

/// Deepest parent chain accepted when decoding an entry.
pub const MAX_ENTRY_DEPTH: usize = 64;

/// Integer types that can be moved over the wire in big-endian order.
pub trait WireIO: Sized {
    /// Byte array holding one encoded value.
    type Bytes: Default + AsRef<[u8]> + AsMut<[u8]>;

    /// Decodes a value from big-endian bytes.
    fn from_be_bytes(bytes: Self::Bytes) -> Self;

    /// Encodes a value as big-endian bytes.
    fn to_be_bytes(self) -> Self::Bytes;
}

macro_rules! impl_wire_io {
    ($($ty:ty),*) => {
        $(
            impl WireIO for $ty {
                type Bytes = [u8; std::mem::size_of::<$ty>()];

                fn from_be_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_be_bytes(bytes)
                }

                fn to_be_bytes(self) -> Self::Bytes {
                    <$ty>::to_be_bytes(self)
                }
            }
        )*
    };
}

impl_wire_io!(u8, u16, u32, u64, i32);

/// Reads one big-endian value.
///
/// # Errors
/// Returns [`crate::Error::TransportFault`] if the stream ends or fails.
pub fn read_be<T: WireIO, R: Read + ?Sized>(reader: &mut R) -> Result<T> {
    let mut bytes = T::Bytes::default();
    reader.read_exact(bytes.as_mut())?;
    Ok(T::from_be_bytes(bytes))
}

/// Writes one big-endian value.
///
/// # Errors
/// Returns [`crate::Error::TransportFault`] if the stream fails.
pub fn write_be<T: WireIO, W: Write + ?Sized>(writer: &mut W, value: T) -> Result<()> {
    writer.write_all(value.to_be_bytes().as_ref())?;
    Ok(())
}

/// Reads a boolean byte.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for bytes other than `0` and `1`.
pub fn read_bool<R: Read + ?Sized>(reader: &mut R) -> Result<bool> {
    match read_be::<u8, _>(reader)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(malformed_error!("Invalid boolean byte {:#04x}", other)),
    }
}

/// Writes a boolean byte.
///
/// # Errors
/// Returns [`crate::Error::TransportFault`] if the stream fails.
pub fn write_bool<W: Write + ?Sized>(writer: &mut W, value: bool) -> Result<()> {
    write_be(writer, u8::from(value))
}

/// Reads a length-prefixed UTF-8 string.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the payload is not valid UTF-8.
pub fn read_string<R: Read + ?Sized>(reader: &mut R) -> Result<String> {
    let length = read_be::<u16, _>(reader)?;
    let mut bytes = vec![0u8; usize::from(length)];
    reader.read_exact(&mut bytes)?;

    String::from_utf8(bytes).map_err(|error| malformed_error!("Invalid UTF-8 string: {}", error))
}

/// Writes a length-prefixed UTF-8 string.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the string is longer than `u16::MAX` bytes.
pub fn write_string<W: Write + ?Sized>(writer: &mut W, value: &str) -> Result<()> {
    let Ok(length) = u16::try_from(value.len()) else {
        return Err(malformed_error!(
            "String of {} bytes does not fit a u16 length prefix",
            value.len()
        ));
    };

    write_be(writer, length)?;
    writer.write_all(value.as_bytes())?;
    Ok(())
}

/// Reads an optional string, encoded as a presence flag followed by the string.
///
/// # Errors
/// See [`read_bool`] and [`read_string`].
pub fn read_optional_string<R: Read + ?Sized>(reader: &mut R) -> Result<Option<String>> {
    if read_bool(reader)? {
        Ok(Some(read_string(reader)?))
    } else {
        Ok(None)
    }
}

/// Writes an optional string, encoded as a presence flag followed by the string.
///
/// # Errors
/// See [`write_string`].
pub fn write_optional_string<W: Write + ?Sized>(writer: &mut W, value: Option<&str>) -> Result<()> {
    write_bool(writer, value.is_some())?;
    match value {
        Some(value) => write_string(writer, value),
        None => Ok(()),
    }
}

/// Reads a fixed number of raw bytes.
///
/// # Errors
/// Returns [`crate::Error::TransportFault`] if the stream ends or fails.
pub fn read_array<const N: usize, R: Read + ?Sized>(reader: &mut R) -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    reader.read_exact(&mut bytes)?;
    Ok(bytes)
}

/// Reads an entry with its parent chain.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for unknown kind tags, invalid descriptors, members
/// without a parent or parent chains deeper than [`MAX_ENTRY_DEPTH`].
pub fn read_entry<R: Read + ?Sized>(reader: &mut R) -> Result<Entry> {
    read_entry_with_depth(reader, 0)
}

fn read_entry_with_depth<R: Read + ?Sized>(reader: &mut R, depth: usize) -> Result<Entry> {
    if depth >= MAX_ENTRY_DEPTH {
        return Err(malformed_error!(
            "Entry parent chain exceeds {} levels",
            MAX_ENTRY_DEPTH
        ));
    }

    let tag_byte = read_be::<u8, _>(reader)?;
    let Some(tag) = EntryTag::from_repr(usize::from(tag_byte)) else {
        return Err(malformed_error!("Unknown entry kind {}", tag_byte));
    };

    let parent = if read_bool(reader)? {
        Some(read_entry_with_depth(reader, depth + 1)?)
    } else {
        None
    };
    let name = read_string(reader)?;

    match (tag, parent) {
        (EntryTag::Class, None) => Ok(Entry::class(&name)),
        (EntryTag::Class, Some(outer)) => Ok(Entry::inner_class(&outer, &name)),
        (EntryTag::Field, Some(owner)) => Entry::parse_field(&owner, &name, &read_string(reader)?),
        (EntryTag::Method, Some(owner)) => {
            Entry::parse_method(&owner, &name, &read_string(reader)?)
        }
        (EntryTag::Field | EntryTag::Method, None) => Err(malformed_error!(
            "{} '{}' has no owner",
            tag,
            name
        )),
    }
}

/// Writes an entry with its parent chain.
///
/// # Errors
/// Returns [`crate::Error::TransportFault`] if the stream fails, or [`crate::Error::Malformed`]
/// for names that do not fit a string prefix.
pub fn write_entry<W: Write + ?Sized>(writer: &mut W, entry: &Entry) -> Result<()> {
    write_be(writer, entry.kind().tag() as u8)?;

    write_bool(writer, entry.parent().is_some())?;
    if let Some(parent) = entry.parent() {
        write_entry(writer, parent)?;
    }
    write_string(writer, entry.name())?;

    match entry.kind() {
        EntryKind::Class => Ok(()),
        EntryKind::Field(descriptor) => write_string(writer, descriptor.as_str()),
        EntryKind::Method(descriptor) => write_string(writer, &descriptor.to_string()),
    }
}
