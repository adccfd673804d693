//! Declarative format grammar and the primitive registry.
//!
//! A format is described once as an ordered [`Spec`] and handed to [`parse`](crate::parse) or
//! [`new`](crate::new). Spec lines are built with the constructors at the bottom of this module
//! ([`field`], [`substruct`], [`conditional`], …) and field shapes with the primitive registry
//! ([`uint8`], [`boolean`], [`string`], [`padding`], [`enum_field`], [`array`], …).

use derive_more::Display;
use std::fmt;

/// Ordered sequence of spec lines describing one structure
pub type Spec = Vec<SpecLine>;

/// Byte order of integer fields whose width is a whole number of bytes.
///
/// Narrower fields are always laid out MSB-first within their bit range.
#[derive(Debug, Display, Default, Copy, Clone, Eq, PartialEq)]
pub enum Endianness {
    /// Least significant byte first (the default)
    #[default]
    #[display("little")]
    Little,
    /// Most significant byte first
    #[display("big")]
    Big,
}

/// Radix used when pretty-printing an integer field
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DisplayFormat {
    /// `0x…`
    Hex,
    /// `0o…`
    Octal,
    /// `0b…`
    Binary,
}

/// Byte encoding of string fields
#[derive(Debug, Display, Default, Copy, Clone, Eq, PartialEq)]
pub enum StrEncoding {
    /// UTF-8 (the default)
    #[default]
    #[display("utf-8")]
    Utf8,
    /// 7-bit ASCII
    #[display("ascii")]
    Ascii,
}

/// Options applied to fields.
///
/// An [`options`] spec line replaces the active options for all subsequent lines of the
/// enclosing spec; a [`field_with`] line merges its options over the active ones per key.
#[derive(Debug, Default, Clone)]
pub struct Options {
    pub(crate) endianness: Option<Endianness>,
    pub(crate) offset: Option<i128>,
    pub(crate) str_format: Option<DisplayFormat>,
}

impl Options {
    /// No options set
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Byte order for integer fields
    #[inline]
    pub fn endianness(mut self, endianness: Endianness) -> Self {
        self.endianness = Some(endianness);
        self
    }

    /// Adjustment added to integers on decode and subtracted on encode
    #[inline]
    pub fn offset(mut self, offset: i128) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Radix used for pretty-printing only
    #[inline]
    pub fn str_format(mut self, format: DisplayFormat) -> Self {
        self.str_format = Some(format);
        self
    }

    /// Per-key merge of `self` over `base`
    pub(crate) fn merged_over(&self, base: &Options) -> Options {
        Options {
            endianness: self.endianness.or(base.endianness),
            offset: self.offset.or(base.offset),
            str_format: self.str_format.or(base.str_format),
        }
    }
}

/// Value of a conditional's predicate field that selects one variant
#[derive(Debug, Clone, PartialEq, derive_more::From)]
pub enum CaseKey {
    /// Boolean predicate
    #[from]
    Bool(bool),
    /// Integer predicate
    #[from(i8, i16, i32, i64, i128, u8, u16, u32, u64)]
    Int(i128),
    /// Enum-label predicate
    #[from(&str, String)]
    Str(String),
}

impl fmt::Display for CaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(boolean) => write!(f, "{boolean}"),
            Self::Int(int) => write!(f, "{int}"),
            Self::Str(string) => f.write_str(string),
        }
    }
}

/// Format branch whose shape is selected by the value of an earlier field.
///
/// The predicate name is resolved against the structure enclosing the conditional (also when
/// the conditional is an array item template).
#[derive(Debug, Clone)]
pub struct ConditionalSpec {
    pub(crate) predicate: String,
    pub(crate) cases: Vec<(CaseKey, Spec)>,
}

/// Enumeration field: a bidirectional mapping between integer codes and labels.
///
/// A label may own several alias codes; the first alias is what the label encodes back to.
/// Decoding a code outside the mapping yields the configured default label, or fails when no
/// default is configured.
#[derive(Debug, Clone)]
pub struct EnumSpec {
    pub(crate) width: usize,
    pub(crate) variants: Vec<(Vec<i128>, String)>,
    pub(crate) default: Option<String>,
}

impl EnumSpec {
    /// Empty mapping over an unsigned integer of the given bit width
    pub fn new(width: usize) -> Self {
        Self {
            width,
            variants: Vec::new(),
            default: None,
        }
    }

    /// Add a label with a single code
    pub fn variant(self, code: i128, label: &str) -> Self {
        self.aliases([code], label)
    }

    /// Add a label with several alias codes; the first is canonical on encode
    pub fn aliases(mut self, codes: impl IntoIterator<Item = i128>, label: &str) -> Self {
        self.variants
            .push((codes.into_iter().collect(), label.to_string()));
        self
    }

    /// Label produced when decoding a code outside the mapping
    pub fn default_label(mut self, label: &str) -> Self {
        self.default = Some(label.to_string());
        self
    }

    pub(crate) fn label_for(&self, code: i128) -> Option<&str> {
        self.variants
            .iter()
            .find(|(codes, _)| codes.contains(&code))
            .map(|(_, label)| label.as_str())
    }

    pub(crate) fn code_for(&self, label: &str) -> Option<i128> {
        self.variants
            .iter()
            .find(|(_, candidate)| candidate == label)
            .and_then(|(codes, _)| codes.first().copied())
    }
}

/// Shape of a single leaf field or array
#[derive(Debug, Clone)]
pub enum FieldKind {
    /// Integer of the given width and signedness
    Int {
        /// Width in bits
        width: usize,
        /// Two's-complement signed when true
        signed: bool,
    },
    /// Single-bit boolean
    Bool,
    /// Fixed-length string
    Str {
        /// Length in bytes
        length: usize,
        /// Byte encoding
        encoding: StrEncoding,
    },
    /// Reserved bits with no surfaced value
    Padding {
        /// Length in bits
        bits: usize,
    },
    /// Enumeration over an unsigned integer
    Enum(EnumSpec),
    /// Fixed-count homogeneous sequence
    Array {
        /// Item count
        count: usize,
        /// Shared template all items are built from
        item: Box<ItemSpec>,
    },
}

impl From<EnumSpec> for FieldKind {
    #[inline]
    fn from(spec: EnumSpec) -> Self {
        Self::Enum(spec)
    }
}

/// Template of an array item
#[derive(Debug, Clone, derive_more::From)]
pub enum ItemSpec {
    /// Leaf items (or nested arrays)
    Field(FieldKind),
    /// Nested structure items
    Struct(Spec),
    /// Conditional items, resolved per item against the enclosing structure
    Conditional(ConditionalSpec),
}

/// One line of a [`Spec`]
#[derive(Debug, Clone)]
pub enum SpecLine {
    /// Replace the active options for subsequent lines
    Options(Options),
    /// Anonymous field; its value is never surfaced (chiefly padding)
    Unnamed(FieldKind),
    /// Field or nested structure bound under a name
    Named(String, Payload),
    /// As [`SpecLine::Named`], with per-field options merged over the active ones
    NamedWith(String, Payload, Options),
    /// Format branch selected by the value of an earlier field
    Conditional(ConditionalSpec),
}

/// Payload of a named spec line
#[derive(Debug, Clone, derive_more::From)]
pub enum Payload {
    /// Leaf field or array
    Field(FieldKind),
    /// Nested structure
    Struct(Spec),
}

/// Options line, applying to all subsequent fields of the enclosing spec
#[inline]
pub fn options(options: Options) -> SpecLine {
    SpecLine::Options(options)
}

/// Named field
#[inline]
pub fn field(name: &str, kind: FieldKind) -> SpecLine {
    SpecLine::Named(name.to_string(), Payload::Field(kind))
}

/// Named field with per-field options
#[inline]
pub fn field_with(name: &str, kind: FieldKind, options: Options) -> SpecLine {
    SpecLine::NamedWith(name.to_string(), Payload::Field(kind), options)
}

/// Named nested structure
#[inline]
pub fn substruct(name: &str, spec: Spec) -> SpecLine {
    SpecLine::Named(name.to_string(), Payload::Struct(spec))
}

/// Anonymous field (chiefly padding)
#[inline]
pub fn unnamed(kind: FieldKind) -> SpecLine {
    SpecLine::Unnamed(kind)
}

/// Conditional template: variant sub-specs keyed by the value of the predicate field
pub fn switch<K>(predicate: &str, cases: impl IntoIterator<Item = (K, Spec)>) -> ConditionalSpec
where
    K: Into<CaseKey>,
{
    ConditionalSpec {
        predicate: predicate.to_string(),
        cases: cases
            .into_iter()
            .map(|(key, spec)| (key.into(), spec))
            .collect(),
    }
}

/// Conditional spec line: the structure branches on the value of the predicate field
pub fn conditional<K>(predicate: &str, cases: impl IntoIterator<Item = (K, Spec)>) -> SpecLine
where
    K: Into<CaseKey>,
{
    SpecLine::Conditional(switch(predicate, cases))
}

/// Integer of an arbitrary bit width.
///
/// Decoded values are held in an `i128`, so unsigned fields take widths up to 127 bits and
/// signed fields up to 128.
#[inline]
pub fn intx(width: usize, signed: bool) -> FieldKind {
    FieldKind::Int { width, signed }
}

/// 8-bit unsigned integer
#[inline]
pub fn uint8() -> FieldKind {
    intx(8, false)
}

/// Alias of [`uint8`]
#[inline]
pub fn byte() -> FieldKind {
    uint8()
}

/// 16-bit unsigned integer
#[inline]
pub fn uint16() -> FieldKind {
    intx(16, false)
}

/// 32-bit unsigned integer
#[inline]
pub fn uint32() -> FieldKind {
    intx(32, false)
}

/// 64-bit unsigned integer
#[inline]
pub fn uint64() -> FieldKind {
    intx(64, false)
}

/// 8-bit signed integer
#[inline]
pub fn int8() -> FieldKind {
    intx(8, true)
}

/// 16-bit signed integer
#[inline]
pub fn int16() -> FieldKind {
    intx(16, true)
}

/// 32-bit signed integer
#[inline]
pub fn int32() -> FieldKind {
    intx(32, true)
}

/// 64-bit signed integer
#[inline]
pub fn int64() -> FieldKind {
    intx(64, true)
}

/// Single bit as an unsigned integer
#[inline]
pub fn bit() -> FieldKind {
    intx(1, false)
}

/// 2-bit unsigned integer
#[inline]
pub fn semi_nibble() -> FieldKind {
    intx(2, false)
}

/// 4-bit unsigned integer
#[inline]
pub fn nibble() -> FieldKind {
    intx(4, false)
}

/// Single-bit boolean
#[inline]
pub fn boolean() -> FieldKind {
    FieldKind::Bool
}

/// UTF-8 string of a fixed byte length
#[inline]
pub fn string(length: usize) -> FieldKind {
    FieldKind::Str {
        length,
        encoding: StrEncoding::Utf8,
    }
}

/// String of a fixed byte length in the given encoding
#[inline]
pub fn string_with(length: usize, encoding: StrEncoding) -> FieldKind {
    FieldKind::Str { length, encoding }
}

/// Reserved bits; never surfaced and preserved verbatim across a round-trip
#[inline]
pub fn padding(bits: usize) -> FieldKind {
    FieldKind::Padding { bits }
}

/// Enumeration over an unsigned integer of the given width.
///
/// For alias codes or more control use [`EnumSpec`] directly.
pub fn enum_field(width: usize, values: &[(i128, &str)], default: Option<&str>) -> FieldKind {
    let mut spec = values
        .iter()
        .fold(EnumSpec::new(width), |spec, (code, label)| {
            spec.variant(*code, label)
        });
    if let Some(default) = default {
        spec = spec.default_label(default);
    }
    FieldKind::Enum(spec)
}

/// Fixed-count array of the given item template
#[inline]
pub fn array(count: usize, item: impl Into<ItemSpec>) -> FieldKind {
    FieldKind::Array {
        count,
        item: Box::new(item.into()),
    }
}
