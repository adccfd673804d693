//! Bound structures and navigation over them.

use crate::bits::BitBuffer;
use crate::error::Error;
use crate::object::{Node, NodeId, Tree};
use crate::spec::DisplayFormat;
use crate::value::Value;
use std::collections::BTreeMap;
use std::fs::File;
use std::fmt;
use std::io;
use std::path::Path;
use tracing::debug;

/// A structure bound to its underlying bit buffer.
///
/// Created by [`parse`](crate::parse) or [`new`](crate::new); navigated through
/// [`Form::root`]/[`Form::root_mut`] cursors or the root-level conveniences like
/// [`Form::get`] and [`Form::set`]. Two forms compare equal when their buffers hold the
/// same bits.
#[derive(Debug)]
pub struct Form {
    tree: Tree,
    buffer: BitBuffer,
    type_name: Option<String>,
}

impl PartialEq for Form {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        self.buffer == other.buffer
    }
}

impl Eq for Form {}

impl Form {
    /// Bind a built tree to a buffer: check the underflow invariant, then assign every node
    /// its absolute bit offset
    pub(crate) fn bind(mut tree: Tree, buffer: BitBuffer) -> Result<Self, Error> {
        let min_len = tree.min_len(tree.root);
        if min_len > buffer.len() {
            return Err(Error::Underflow {
                expected_bits: min_len,
                actual_bits: buffer.len(),
            });
        }

        let root = tree.root;
        tree.assign_offsets(root, 0, &buffer)?;

        Ok(Self {
            tree,
            buffer,
            type_name: None,
        })
    }

    /// Attach a display name used in [`fmt::Display`] output
    #[must_use]
    pub fn with_type_name(mut self, type_name: &str) -> Self {
        self.type_name = Some(type_name.to_string());
        self
    }

    /// Display name attached with [`Form::with_type_name`]
    #[inline]
    pub fn type_name(&self) -> Option<&str> {
        self.type_name.as_deref()
    }

    /// Read-only cursor at the root structure
    #[inline]
    pub fn root(&self) -> Cursor<'_> {
        Cursor {
            form: self,
            id: self.tree.root,
        }
    }

    /// Mutating cursor at the root structure
    #[inline]
    pub fn root_mut(&mut self) -> CursorMut<'_> {
        CursorMut {
            id: self.tree.root,
            form: self,
        }
    }

    /// Cursor at a named child of the root structure
    #[inline]
    pub fn child(&self, name: &str) -> Result<Cursor<'_>, Error> {
        self.root().child(name)
    }

    /// Decoded value of a named child of the root structure
    #[inline]
    pub fn get(&self, name: &str) -> Result<Value, Error> {
        self.child(name)?.get()
    }

    /// Integer value of a named child
    pub fn get_int(&self, name: &str) -> Result<i128, Error> {
        let value = self.get(name)?;
        value.as_int().ok_or_else(|| Error::TypeMismatch {
            name: name.to_string(),
            expected: "an integer",
            actual: value.kind(),
        })
    }

    /// Boolean value of a named child
    pub fn get_bool(&self, name: &str) -> Result<bool, Error> {
        let value = self.get(name)?;
        value.as_bool().ok_or_else(|| Error::TypeMismatch {
            name: name.to_string(),
            expected: "a boolean",
            actual: value.kind(),
        })
    }

    /// String value of a named child
    pub fn get_str(&self, name: &str) -> Result<String, Error> {
        let value = self.get(name)?;
        match value {
            Value::Str(string) => Ok(string),
            value => Err(Error::TypeMismatch {
                name: name.to_string(),
                expected: "a string",
                actual: value.kind(),
            }),
        }
    }

    /// Write a value through a named child of the root structure
    #[inline]
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), Error> {
        self.root_mut().child(name)?.set(value)
    }

    /// Current bit length (conditionals contribute their active variant)
    #[inline]
    pub fn bit_len(&self) -> Result<usize, Error> {
        self.tree.current_len(self.tree.root, &self.buffer)
    }

    /// Smallest bit length any input for this spec can have
    #[inline]
    pub fn min_bit_len(&self) -> usize {
        self.tree.min_len(self.tree.root)
    }

    /// Absolute bit offset of a named child of the root structure
    #[inline]
    pub fn offset_of(&self, name: &str) -> Result<usize, Error> {
        self.root().offset_of(name)
    }

    /// Absolute bit offsets of all named children of the root structure
    #[inline]
    pub fn offsets(&self) -> Result<BTreeMap<String, usize>, Error> {
        self.root().offsets()
    }

    /// Plain-data projection of the whole structure
    #[inline]
    pub fn as_native(&self) -> Result<Value, Error> {
        self.root().as_native()
    }

    /// JSON rendering of [`Form::as_native`]
    pub fn as_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(&self.as_native()?)?)
    }

    /// Buffer contents truncated to the current bit length, rounded up to whole bytes with
    /// zeroed trailing bits
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let bit_len = self.bit_len()?;
        Ok(self.buffer.to_bytes(bit_len))
    }

    /// Serialize into a writer
    pub fn write_to(&self, mut writer: impl io::Write) -> Result<(), Error> {
        writer.write_all(&self.to_bytes()?)?;
        Ok(())
    }

    /// Serialize into a file, truncating it if it exists
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Writing structure");
        self.write_to(File::create(path)?)
    }

}

impl fmt::Display for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(type_name) = &self.type_name {
            write!(f, "{type_name} ")?;
        }
        fmt::Display::fmt(&self.root(), f)
    }
}

/// Read-only cursor over one node of a [`Form`]
#[derive(Debug, Copy, Clone)]
pub struct Cursor<'a> {
    form: &'a Form,
    id: NodeId,
}

impl<'a> Cursor<'a> {
    /// Name this node is attached under, if any
    #[inline]
    pub fn name(&self) -> Option<&'a str> {
        self.form.tree.name(self.id)
    }

    /// Cursor at a named child.
    ///
    /// Direct children are resolved first; when nothing matches, the structure's conditional
    /// children are scanned in order and the first active variant exposing the name wins.
    pub fn child(&self, name: &str) -> Result<Cursor<'a>, Error> {
        let id = self
            .form
            .tree
            .resolve_child(self.id, name, &self.form.buffer)?;
        Ok(Cursor {
            form: self.form,
            id,
        })
    }

    /// Cursor at an array item
    pub fn at(&self, index: usize) -> Result<Cursor<'a>, Error> {
        let form = self.form;
        let id = item_id(form, self.id, index)?;
        Ok(Cursor { form, id })
    }

    /// Cursors over all array items, in layout order
    pub fn iter(&self) -> Result<impl Iterator<Item = Cursor<'a>> + 'a, Error> {
        let form = self.form;
        let Node::Array(node) = form.tree.node(self.id) else {
            return Err(Error::NotAnArray {
                name: self.name().unwrap_or_default().to_string(),
            });
        };
        Ok(node.items.iter().map(move |&id| Cursor { form, id }))
    }

    /// Fixed item count of an array
    pub fn item_count(&self) -> Result<usize, Error> {
        let Node::Array(node) = self.form.tree.node(self.id) else {
            return Err(Error::NotAnArray {
                name: self.name().unwrap_or_default().to_string(),
            });
        };
        Ok(node.items.len())
    }

    /// Decoded value of a leaf, or the plain-data projection of a composite
    #[inline]
    pub fn get(&self) -> Result<Value, Error> {
        self.form.tree.get_value(self.id, &self.form.buffer)
    }

    /// Plain-data projection of this node
    #[inline]
    pub fn as_native(&self) -> Result<Value, Error> {
        self.form.tree.as_native(self.id, &self.form.buffer)
    }

    /// Current bit length of this node
    #[inline]
    pub fn bit_len(&self) -> Result<usize, Error> {
        self.form.tree.current_len(self.id, &self.form.buffer)
    }

    /// Absolute bit offset where this node begins
    pub fn offset(&self) -> Result<usize, Error> {
        self.form
            .tree
            .offset(self.id)
            .ok_or_else(|| Error::OffsetUnassigned {
                name: self.name().unwrap_or_default().to_string(),
            })
    }

    /// Absolute bit offset of a named child
    #[inline]
    pub fn offset_of(&self, name: &str) -> Result<usize, Error> {
        self.child(name)?.offset()
    }

    /// Absolute bit offsets of all named direct children of this structure
    pub fn offsets(&self) -> Result<BTreeMap<String, usize>, Error> {
        match self.form.tree.node(self.id) {
            Node::Struct(node) => node
                .by_name
                .iter()
                .map(|(name, &child)| {
                    Ok((
                        name.clone(),
                        Cursor {
                            form: self.form,
                            id: child,
                        }
                        .offset()?,
                    ))
                })
                .collect(),
            Node::Conditional(_) => {
                let active = self
                    .form
                    .tree
                    .active_variant(self.id, &self.form.buffer)?;
                Cursor {
                    form: self.form,
                    id: active,
                }
                .offsets()
            }
            Node::Field(_) | Node::Array(_) => Ok(BTreeMap::new()),
        }
    }
}

impl fmt::Display for Cursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_node(self.form, self.id, f, 0)
    }
}

/// Mutating cursor over one node of a [`Form`].
///
/// Navigation consumes the cursor, threading the exclusive borrow down to the node that is
/// finally assigned with [`CursorMut::set`].
#[derive(Debug)]
pub struct CursorMut<'a> {
    form: &'a mut Form,
    id: NodeId,
}

impl<'a> CursorMut<'a> {
    /// Mutating cursor at a named child
    pub fn child(self, name: &str) -> Result<CursorMut<'a>, Error> {
        let id = self
            .form
            .tree
            .resolve_child(self.id, name, &self.form.buffer)?;
        Ok(CursorMut {
            form: self.form,
            id,
        })
    }

    /// Mutating cursor at an array item
    pub fn at(self, index: usize) -> Result<CursorMut<'a>, Error> {
        let id = item_id(self.form, self.id, index)?;
        Ok(CursorMut {
            form: self.form,
            id,
        })
    }

    /// Decoded value of a leaf, or the plain-data projection of a composite
    #[inline]
    pub fn get(&self) -> Result<Value, Error> {
        self.form.tree.get_value(self.id, &self.form.buffer)
    }

    /// Encode a value and overwrite this node's bit range.
    ///
    /// Leaves take scalars; arrays take a list of exactly their item count. A failed set
    /// leaves the buffer untouched.
    pub fn set(self, value: impl Into<Value>) -> Result<(), Error> {
        let form = self.form;
        form.tree.set_value(self.id, &mut form.buffer, value.into())
    }
}

fn item_id(form: &Form, id: NodeId, index: usize) -> Result<NodeId, Error> {
    let Node::Array(node) = form.tree.node(id) else {
        return Err(Error::NotAnArray {
            name: form.tree.name(id).unwrap_or_default().to_string(),
        });
    };
    node.items
        .get(index)
        .copied()
        .ok_or(Error::IndexOutOfBounds {
            index,
            len: node.items.len(),
        })
}

fn fmt_node(form: &Form, id: NodeId, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
    match form.tree.node(id) {
        Node::Field(_) => fmt_leaf(form, id, f),
        Node::Struct(_) => {
            f.write_str("{\n")?;
            fmt_struct_fields(form, id, f, indent + 2)?;
            write!(f, "{:indent$}}}", "")
        }
        Node::Array(node) => {
            f.write_str("[")?;
            for (index, &item) in node.items.iter().enumerate() {
                if index > 0 {
                    f.write_str(", ")?;
                }
                fmt_node(form, item, f, indent)?;
            }
            f.write_str("]")
        }
        Node::Conditional(_) => match form.tree.active_variant(id, &form.buffer) {
            Ok(active) => fmt_node(form, active, f, indent),
            Err(_) => f.write_str("<unresolved>"),
        },
    }
}

/// One `name: value` line per named child; conditional children contribute their active
/// variant's fields at the same level
fn fmt_struct_fields(
    form: &Form,
    id: NodeId,
    f: &mut fmt::Formatter<'_>,
    indent: usize,
) -> fmt::Result {
    let Node::Struct(node) = form.tree.node(id) else {
        unreachable!("Only called for struct nodes");
    };
    for &child in &node.children {
        if let Node::Conditional(_) = form.tree.node(child) {
            match form.tree.active_variant(child, &form.buffer) {
                Ok(active) => fmt_struct_fields(form, active, f, indent)?,
                Err(_) => writeln!(f, "{:indent$}<unresolved>", "")?,
            }
            continue;
        }
        let Some(name) = form.tree.name(child) else {
            continue;
        };
        write!(f, "{:indent$}{name}: ", "")?;
        fmt_node(form, child, f, indent)?;
        f.write_str("\n")?;
    }
    Ok(())
}

fn fmt_leaf(form: &Form, id: NodeId, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let Node::Field(field) = form.tree.node(id) else {
        unreachable!("Only called for field nodes");
    };
    let Ok(value) = form.tree.get_value(id, &form.buffer) else {
        return f.write_str("<unresolved>");
    };
    match (field.format, &value) {
        (Some(DisplayFormat::Hex), Value::Int(int)) => write!(f, "{int:#x}"),
        (Some(DisplayFormat::Octal), Value::Int(int)) => write!(f, "{int:#o}"),
        (Some(DisplayFormat::Binary), Value::Int(int)) => write!(f, "{int:#b}"),
        _ => write!(f, "{value}"),
    }
}
