//! Crate-wide error type.

use crate::value::Value;

/// Errors produced while building, binding, reading or mutating a structure
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Predicate value of a conditional has no matching case
    #[error("No known conditional case {case}")]
    BadConditionalCase {
        /// Current value of the predicate field
        case: Value,
    },
    /// Attribute lookup failed
    #[error("No known field {name:?}")]
    NoSuchField {
        /// Name that failed to resolve
        name: String,
    },
    /// Assignment target is a nested structure rather than a leaf
    #[error("Can't set non-leaf field {name:?} to a value")]
    NotALeaf {
        /// Name of the structure
        name: String,
    },
    /// Input data is shorter than the smallest possible layout
    #[error(
        "Data being parsed isn't long enough; expected at least {expected_bits} bits, but data \
        is only {actual_bits} bits long"
    )]
    Underflow {
        /// Minimum bit length of the structure
        expected_bits: usize,
        /// Bit length of the input
        actual_bits: usize,
    },
    /// Field width is zero or wider than the 128-bit native integer backing
    #[error("Unsupported integer width {bits}")]
    BadFieldWidth {
        /// Requested width in bits
        bits: usize,
    },
    /// Integer doesn't fit the declared width
    #[error("Value {value} is out of range for a {width}-bit {signedness} integer")]
    IntOutOfRange {
        /// Value after applying the declared offset adjustment
        value: i128,
        /// Field width in bits
        width: usize,
        /// `"signed"` or `"unsigned"`
        signedness: &'static str,
    },
    /// Replacement string encodes to a different byte count than the slot
    #[error("String of {actual} bytes doesn't fit a {expected}-byte string field")]
    StrWrongLength {
        /// Declared byte length of the field
        expected: usize,
        /// Encoded byte length of the replacement
        actual: usize,
    },
    /// Bytes in the buffer don't decode in the declared string encoding
    #[error("String field doesn't decode as {encoding}")]
    StrEncoding {
        /// Name of the declared encoding
        encoding: &'static str,
    },
    /// Enum label is not part of the declared mapping
    #[error("{label:?} is not a valid enum label")]
    UnknownEnumLabel {
        /// Rejected label
        label: String,
    },
    /// Decoded enum code is not part of the declared mapping and no default is configured
    #[error("{code} is not a valid enum value")]
    UnknownEnumCode {
        /// Rejected code
        code: i128,
    },
    /// Array assignment with a different number of items
    #[error(
        "Cannot change the length of an array (would have changed from {expected} to {actual})"
    )]
    ArrayLengthMismatch {
        /// Fixed item count of the array
        expected: usize,
        /// Number of items supplied
        actual: usize,
    },
    /// Indexed access into something that is not an array
    #[error("Field {name:?} is not an array")]
    NotAnArray {
        /// Name of the field
        name: String,
    },
    /// Array index out of bounds
    #[error("Array index {index} is out of range for {len} items")]
    IndexOutOfBounds {
        /// Requested index
        index: usize,
        /// Fixed item count of the array
        len: usize,
    },
    /// Supplied value has the wrong shape for the target field
    #[error("Field {name:?} expects {expected}, got {actual}")]
    TypeMismatch {
        /// Name of the target field
        name: String,
        /// What the field accepts
        expected: &'static str,
        /// What was supplied
        actual: &'static str,
    },
    /// Padding carries no value and cannot be assigned
    #[error("Padding cannot be assigned a value")]
    CannotSetPadding,
    /// Field is not bound to a buffer position yet
    #[error("Haven't initialized the field {name:?} with offsets yet")]
    OffsetUnassigned {
        /// Name of the field
        name: String,
    },
    /// I/O failure while reading input or writing output
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON rendering failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
