//! Declarative, bidirectional binary formats with bit-level addressing.
//!
//! A format is declared once as a [`Spec`], an ordered list of fields, nested structures,
//! fixed-count arrays and conditional branches, and used in both directions: [`parse`] binds
//! raw bytes to a navigable, typed [`Form`], and [`write`] serializes the form back to bytes
//! that are bit-exactly equal to the original input when no field was modified.
//!
//! Fields can sit at arbitrary bit offsets: booleans are one bit, integers take any width up
//! to the 128-bit native backing, and padding covers reserved bits that round-trip untouched.
//! Multi-byte
//! integers obey the declared endianness; narrower fields are laid out MSB-first within their
//! bit range.
//!
//! ```
//! use bitform::{Endianness, Options, boolean, field, nibble, options, parse, uint8};
//!
//! # fn main() -> Result<(), bitform::Error> {
//! let spec = vec![
//!     options(Options::new().endianness(Endianness::Big)),
//!     field("version", uint8()),
//!     field("compressed", boolean()),
//!     field("channel", nibble()),
//! ];
//!
//! let mut header = parse([0x2a, 0xc0], &spec)?;
//! assert_eq!(header.get_int("version")?, 42);
//! assert!(header.get_bool("compressed")?);
//! assert_eq!(header.get_int("channel")?, 0b1000);
//!
//! header.set("version", 43)?;
//! assert_eq!(bitform::write(&header)?, [0x2b, 0xc0]);
//! # Ok(()) }
//! ```
//!
//! Structures nest ([`substruct`]), arrays repeat any template a fixed number of times
//! ([`array`]), and [`conditional`] branches pick their layout from the value of an earlier
//! field at access time.

#![warn(missing_docs)]

mod bits;
mod error;
mod form;
mod object;
mod spec;
mod value;

pub use crate::error::Error;
pub use crate::form::{Cursor, CursorMut, Form};
pub use crate::spec::{
    CaseKey, ConditionalSpec, DisplayFormat, Endianness, EnumSpec, FieldKind, ItemSpec, Options,
    Payload, Spec, SpecLine, StrEncoding, array, bit, boolean, byte, conditional, enum_field,
    field, field_with, int8, int16, int32, int64, intx, nibble, options, padding, semi_nibble,
    string, string_with, substruct, switch, uint8, uint16, uint32, uint64, unnamed,
};
pub use crate::value::Value;

use crate::bits::BitBuffer;
use crate::object::Tree;
use std::io;
use std::path::Path;
use tracing::debug;

/// Parse bytes into a [`Form`] bound to the given spec.
///
/// Fails with [`Error::Underflow`] when the input is shorter than the smallest possible
/// layout of the spec.
pub fn parse(data: impl AsRef<[u8]>, spec: &Spec) -> Result<Form, Error> {
    let data = data.as_ref();
    debug!(bytes = data.len(), "Parsing input");
    let tree = Tree::build(spec)?;
    Form::bind(tree, BitBuffer::from_bytes(data))
}

/// Parse everything remaining in a reader into a [`Form`] bound to the given spec
pub fn parse_reader(mut reader: impl io::Read, spec: &Spec) -> Result<Form, Error> {
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    parse(data, spec)
}

/// Create a zero-filled [`Form`] of the given spec.
///
/// The buffer is sized to the largest layout the spec can take (rounded up to whole bytes),
/// so every field of every conditional variant is addressable.
pub fn new(spec: &Spec) -> Result<Form, Error> {
    let tree = Tree::build(spec)?;
    let bit_len = tree.max_len(tree.root).div_ceil(8) * 8;
    debug!(bits = bit_len, "Creating zero-filled structure");
    Form::bind(tree, BitBuffer::zeroed(bit_len))
}

/// Serialize a form to bytes: the buffer truncated to the form's current bit length, rounded
/// up to whole bytes with zeroed trailing bits
#[inline]
pub fn write(form: &Form) -> Result<Vec<u8>, Error> {
    form.to_bytes()
}

/// Serialize a form into a file, truncating it if it exists
#[inline]
pub fn write_to_file(form: &Form, path: impl AsRef<Path>) -> Result<(), Error> {
    form.write_to_file(path)
}
