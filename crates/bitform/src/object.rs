//! The materialized structure tree.
//!
//! A [`Tree`] is an arena of nodes built once from a [`Spec`]; nodes reference each other (and
//! their enclosing structure, for conditional predicate resolution) by stable indices. Binding
//! to a buffer happens later, by assigning every node its absolute bit offset.

use crate::bits::{self, BitBuffer};
use crate::error::Error;
use crate::spec::{
    CaseKey, ConditionalSpec, DisplayFormat, Endianness, EnumSpec, FieldKind, ItemSpec, Options,
    Payload, Spec, SpecLine, StrEncoding,
};
use crate::value::Value;
use std::cell::RefCell;
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Stable index of a node within its [`Tree`]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) struct NodeId(usize);

/// Decoder/encoder pair of a leaf, resolved from the field kind and the active options
#[derive(Debug)]
pub(crate) enum Codec {
    Int {
        signed: bool,
        endianness: Endianness,
        adjust: i128,
    },
    Bool,
    Str {
        encoding: StrEncoding,
    },
    Padding,
    Enum {
        spec: EnumSpec,
        endianness: Endianness,
        adjust: i128,
    },
}

#[derive(Debug)]
pub(crate) struct FieldNode {
    pub(crate) name: Option<String>,
    pub(crate) codec: Codec,
    pub(crate) bit_len: usize,
    pub(crate) offset: Option<usize>,
    pub(crate) format: Option<DisplayFormat>,
    cache: RefCell<Option<Value>>,
}

impl FieldNode {
    fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| "<unnamed>".to_string())
    }
}

#[derive(Debug)]
pub(crate) struct StructNode {
    pub(crate) name: Option<String>,
    pub(crate) children: Vec<NodeId>,
    pub(crate) by_name: BTreeMap<String, NodeId>,
    pub(crate) conditionals: Vec<NodeId>,
    pub(crate) offset: Option<usize>,
}

#[derive(Debug)]
pub(crate) struct ArrayNode {
    pub(crate) name: Option<String>,
    pub(crate) items: Vec<NodeId>,
    pub(crate) offset: Option<usize>,
}

#[derive(Debug)]
pub(crate) struct ConditionalNode {
    pub(crate) predicate: String,
    /// Structure the predicate name is resolved against
    pub(crate) parent: NodeId,
    pub(crate) cases: Vec<(CaseKey, NodeId)>,
    pub(crate) offset: Option<usize>,
}

#[derive(Debug)]
pub(crate) enum Node {
    Field(FieldNode),
    Struct(StructNode),
    Array(ArrayNode),
    Conditional(ConditionalNode),
}

/// Arena of nodes making up one structure
#[derive(Debug)]
pub(crate) struct Tree {
    nodes: Vec<Node>,
    pub(crate) root: NodeId,
}

impl Tree {
    /// Materialize the node tree described by a spec; offsets stay unassigned
    pub(crate) fn build(spec: &Spec) -> Result<Self, Error> {
        let mut tree = Self {
            nodes: Vec::new(),
            root: NodeId(0),
        };
        tree.root = tree.build_struct(spec, None)?;
        debug!(nodes = tree.nodes.len(), "Built structure tree");
        Ok(tree)
    }

    #[inline]
    pub(crate) fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    #[inline]
    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    fn build_struct(&mut self, spec: &Spec, name: Option<String>) -> Result<NodeId, Error> {
        let id = self.push(Node::Struct(StructNode {
            name,
            children: Vec::new(),
            by_name: BTreeMap::new(),
            conditionals: Vec::new(),
            offset: None,
        }));

        let mut globals = Options::default();

        for line in spec {
            match line {
                SpecLine::Options(options) => {
                    globals = options.clone();
                }
                SpecLine::Unnamed(kind) => {
                    let child = self.build_field(kind, None, &globals, id)?;
                    self.attach(id, child, None);
                }
                SpecLine::Named(name, payload) => {
                    let child = self.build_payload(payload, Some(name.clone()), &globals, id)?;
                    self.attach(id, child, Some(name.clone()));
                }
                SpecLine::NamedWith(name, payload, locals) => {
                    let merged = locals.merged_over(&globals);
                    let child = self.build_payload(payload, Some(name.clone()), &merged, id)?;
                    self.attach(id, child, Some(name.clone()));
                }
                SpecLine::Conditional(conditional) => {
                    let child = self.build_conditional(conditional, id)?;
                    self.attach(id, child, None);
                }
            }
        }

        Ok(id)
    }

    fn build_payload(
        &mut self,
        payload: &Payload,
        name: Option<String>,
        options: &Options,
        parent: NodeId,
    ) -> Result<NodeId, Error> {
        match payload {
            Payload::Field(kind) => self.build_field(kind, name, options, parent),
            Payload::Struct(spec) => self.build_struct(spec, name),
        }
    }

    fn build_field(
        &mut self,
        kind: &FieldKind,
        name: Option<String>,
        options: &Options,
        parent: NodeId,
    ) -> Result<NodeId, Error> {
        let endianness = options.endianness.unwrap_or_default();
        let adjust = options.offset.unwrap_or_default();

        let (codec, bit_len) = match kind {
            FieldKind::Int { width, signed } => {
                check_width(*width, *signed)?;
                (
                    Codec::Int {
                        signed: *signed,
                        endianness,
                        adjust,
                    },
                    *width,
                )
            }
            FieldKind::Bool => (Codec::Bool, 1),
            FieldKind::Str { length, encoding } => {
                (
                    Codec::Str {
                        encoding: *encoding,
                    },
                    length * 8,
                )
            }
            FieldKind::Padding { bits } => (Codec::Padding, *bits),
            FieldKind::Enum(spec) => {
                check_width(spec.width, false)?;
                (
                    Codec::Enum {
                        spec: spec.clone(),
                        endianness,
                        adjust,
                    },
                    spec.width,
                )
            }
            FieldKind::Array { count, item } => {
                return self.build_array(*count, item, name, options, parent);
            }
        };

        Ok(self.push(Node::Field(FieldNode {
            name,
            codec,
            bit_len,
            offset: None,
            format: options.str_format,
            cache: RefCell::new(None),
        })))
    }

    fn build_array(
        &mut self,
        count: usize,
        item: &ItemSpec,
        name: Option<String>,
        options: &Options,
        parent: NodeId,
    ) -> Result<NodeId, Error> {
        let id = self.push(Node::Array(ArrayNode {
            name,
            items: Vec::new(),
            offset: None,
        }));

        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            let item_id = match item {
                ItemSpec::Field(kind) => self.build_field(kind, None, options, parent)?,
                ItemSpec::Struct(spec) => self.build_struct(spec, None)?,
                ItemSpec::Conditional(conditional) => {
                    self.build_conditional(conditional, parent)?
                }
            };
            items.push(item_id);
        }

        let Node::Array(array) = self.node_mut(id) else {
            unreachable!("Just pushed an array node at this index");
        };
        array.items = items;

        Ok(id)
    }

    fn build_conditional(
        &mut self,
        conditional: &ConditionalSpec,
        parent: NodeId,
    ) -> Result<NodeId, Error> {
        let id = self.push(Node::Conditional(ConditionalNode {
            predicate: conditional.predicate.clone(),
            parent,
            cases: Vec::new(),
            offset: None,
        }));

        let mut cases = Vec::with_capacity(conditional.cases.len());
        for (key, spec) in &conditional.cases {
            let variant = self.build_struct(spec, None)?;
            cases.push((key.clone(), variant));
        }

        let Node::Conditional(node) = self.node_mut(id) else {
            unreachable!("Just pushed a conditional node at this index");
        };
        node.cases = cases;

        Ok(id)
    }

    fn attach(&mut self, struct_id: NodeId, child: NodeId, name: Option<String>) {
        let is_conditional = matches!(self.node(child), Node::Conditional(_));
        let Node::Struct(parent) = self.node_mut(struct_id) else {
            unreachable!("Children are only attached to struct nodes");
        };
        parent.children.push(child);
        if let Some(name) = name {
            parent.by_name.insert(name, child);
        }
        if is_conditional {
            parent.conditionals.push(child);
        }
    }

    /// Assign `id` and everything below it cumulative offsets starting at `start`.
    ///
    /// Returns the node's current bit length. Conditional variants all receive the same base
    /// offset; the length contributed to subsequent siblings is the active variant's, which is
    /// read through the buffer.
    pub(crate) fn assign_offsets(
        &mut self,
        id: NodeId,
        start: usize,
        buffer: &BitBuffer,
    ) -> Result<usize, Error> {
        match self.node_mut(id) {
            Node::Field(field) => {
                field.offset = Some(start);
                // Stale until the next read from the new position
                *field.cache.borrow_mut() = None;
                Ok(field.bit_len)
            }
            Node::Struct(node) => {
                node.offset = Some(start);
                let children = node.children.clone();
                let mut cursor = start;
                for child in children {
                    cursor += self.assign_offsets(child, cursor, buffer)?;
                }
                Ok(cursor - start)
            }
            Node::Array(node) => {
                node.offset = Some(start);
                let items = node.items.clone();
                let mut cursor = start;
                for item in items {
                    cursor += self.assign_offsets(item, cursor, buffer)?;
                }
                Ok(cursor - start)
            }
            Node::Conditional(node) => {
                node.offset = Some(start);
                let cases = node.cases.clone();
                for (_, variant) in cases {
                    self.assign_offsets(variant, start, buffer)?;
                }
                let active = self.active_variant(id, buffer)?;
                self.current_len(active, buffer)
            }
        }
    }

    /// Current bit length; conditionals contribute their active variant's length
    pub(crate) fn current_len(&self, id: NodeId, buffer: &BitBuffer) -> Result<usize, Error> {
        match self.node(id) {
            Node::Field(field) => Ok(field.bit_len),
            Node::Struct(node) => node
                .children
                .iter()
                .try_fold(0, |sum, &child| {
                    Ok(sum + self.current_len(child, buffer)?)
                }),
            Node::Array(node) => node.items.iter().try_fold(0, |sum, &item| {
                Ok(sum + self.current_len(item, buffer)?)
            }),
            Node::Conditional(_) => {
                let active = self.active_variant(id, buffer)?;
                self.current_len(active, buffer)
            }
        }
    }

    /// Smallest possible bit length; conditionals contribute their shortest variant
    pub(crate) fn min_len(&self, id: NodeId) -> usize {
        match self.node(id) {
            Node::Field(field) => field.bit_len,
            Node::Struct(node) => node
                .children
                .iter()
                .map(|&child| self.min_len(child))
                .sum(),
            Node::Array(node) => node.items.iter().map(|&item| self.min_len(item)).sum(),
            Node::Conditional(node) => node
                .cases
                .iter()
                .map(|(_, variant)| self.min_len(*variant))
                .min()
                .unwrap_or_default(),
        }
    }

    /// Largest possible bit length; conditionals contribute their longest variant
    pub(crate) fn max_len(&self, id: NodeId) -> usize {
        match self.node(id) {
            Node::Field(field) => field.bit_len,
            Node::Struct(node) => node
                .children
                .iter()
                .map(|&child| self.max_len(child))
                .sum(),
            Node::Array(node) => node.items.iter().map(|&item| self.max_len(item)).sum(),
            Node::Conditional(node) => node
                .cases
                .iter()
                .map(|(_, variant)| self.max_len(*variant))
                .max()
                .unwrap_or_default(),
        }
    }

    /// Resolve a name against a structure: direct children first, then the conditional
    /// children's active variants in order
    pub(crate) fn resolve_child(
        &self,
        struct_id: NodeId,
        name: &str,
        buffer: &BitBuffer,
    ) -> Result<NodeId, Error> {
        let node = match self.node(struct_id) {
            Node::Struct(node) => node,
            // Forward lookups through a conditional to whichever variant is active
            Node::Conditional(_) => {
                let active = self.active_variant(struct_id, buffer)?;
                return self.resolve_child(active, name, buffer);
            }
            _ => {
                return Err(Error::NoSuchField {
                    name: name.to_string(),
                });
            }
        };

        if let Some(&child) = node.by_name.get(name) {
            return Ok(child);
        }

        for &conditional in &node.conditionals {
            let active = self.active_variant(conditional, buffer)?;
            if let Ok(child) = self.resolve_child(active, name, buffer) {
                return Ok(child);
            }
        }

        Err(Error::NoSuchField {
            name: name.to_string(),
        })
    }

    /// Variant of a conditional selected by the current value of its predicate field
    pub(crate) fn active_variant(
        &self,
        conditional_id: NodeId,
        buffer: &BitBuffer,
    ) -> Result<NodeId, Error> {
        let Node::Conditional(node) = self.node(conditional_id) else {
            unreachable!("Active variant is only resolved for conditional nodes");
        };

        let predicate = self.resolve_child(node.parent, &node.predicate, buffer)?;
        let value = self.get_value(predicate, buffer)?;

        node.cases
            .iter()
            .find_map(|(key, variant)| case_matches(key, &value).then_some(*variant))
            .ok_or(Error::BadConditionalCase { case: value })
    }

    /// Decoded value of a leaf, or the plain-data projection of a composite
    pub(crate) fn get_value(&self, id: NodeId, buffer: &BitBuffer) -> Result<Value, Error> {
        match self.node(id) {
            Node::Field(field) => self.field_get(field, buffer),
            Node::Struct(_) | Node::Array(_) | Node::Conditional(_) => self.as_native(id, buffer),
        }
    }

    /// Write a value through a leaf, or distribute a list over an array
    pub(crate) fn set_value(
        &self,
        id: NodeId,
        buffer: &mut BitBuffer,
        value: Value,
    ) -> Result<(), Error> {
        match self.node(id) {
            Node::Field(field) => self.field_set(field, buffer, value),
            Node::Struct(node) => Err(Error::NotALeaf {
                name: node.name.clone().unwrap_or_default(),
            }),
            Node::Array(node) => {
                let Value::List(items) = value else {
                    return Err(Error::TypeMismatch {
                        name: node.name.clone().unwrap_or_default(),
                        expected: "a list",
                        actual: value.kind(),
                    });
                };
                if items.len() != node.items.len() {
                    return Err(Error::ArrayLengthMismatch {
                        expected: node.items.len(),
                        actual: items.len(),
                    });
                }
                for (&item_id, item) in node.items.iter().zip(items) {
                    self.set_value(item_id, buffer, item)?;
                }
                Ok(())
            }
            Node::Conditional(_) => {
                let active = self.active_variant(id, buffer)?;
                self.set_value(active, buffer, value)
            }
        }
    }

    fn field_get(&self, field: &FieldNode, buffer: &BitBuffer) -> Result<Value, Error> {
        if let Some(value) = field.cache.borrow().clone() {
            return Ok(value);
        }

        let offset = field.offset.ok_or_else(|| Error::OffsetUnassigned {
            name: field.display_name(),
        })?;

        let value = match &field.codec {
            Codec::Int {
                signed,
                endianness,
                adjust,
            } => {
                let bits = buffer.read(offset, field.bit_len);
                let raw = if *signed {
                    bits::decode_int(&bits, *endianness)
                } else {
                    bits::decode_uint(&bits, *endianness) as i128
                };
                Value::Int(raw + adjust)
            }
            Codec::Bool => {
                let bits = buffer.read(offset, 1);
                Value::Bool(bits[0])
            }
            Codec::Str { encoding } => {
                let bits = buffer.read(offset, field.bit_len);
                let bytes = bits::decode_bytes(&bits);
                Value::Str(decode_str(bytes, *encoding)?)
            }
            Codec::Padding => Value::Null,
            Codec::Enum {
                spec,
                endianness,
                adjust,
            } => {
                let bits = buffer.read(offset, field.bit_len);
                let code = bits::decode_uint(&bits, *endianness) as i128 + adjust;
                match spec.label_for(code) {
                    Some(label) => Value::Str(label.to_string()),
                    None => match &spec.default {
                        Some(default) => Value::Str(default.clone()),
                        None => return Err(Error::UnknownEnumCode { code }),
                    },
                }
            }
        };

        trace!(name = %field.display_name(), offset, bits = field.bit_len, "Decoded field");
        *field.cache.borrow_mut() = Some(value.clone());

        Ok(value)
    }

    fn field_set(
        &self,
        field: &FieldNode,
        buffer: &mut BitBuffer,
        value: Value,
    ) -> Result<(), Error> {
        let offset = field.offset.ok_or_else(|| Error::OffsetUnassigned {
            name: field.display_name(),
        })?;

        let mismatch = |expected: &'static str, actual: &Value| Error::TypeMismatch {
            name: field.display_name(),
            expected,
            actual: actual.kind(),
        };

        // Encode fully before touching the buffer so a failed set leaves no partial state
        let bits = match &field.codec {
            Codec::Int {
                signed,
                endianness,
                adjust,
            } => {
                let int = value.as_int().ok_or_else(|| mismatch("an integer", &value))?;
                let raw = int - adjust;
                if *signed {
                    bits::encode_int(raw, field.bit_len, *endianness)?
                } else {
                    bits::encode_uint(raw, field.bit_len, *endianness)?
                }
            }
            Codec::Bool => {
                let boolean = value
                    .as_bool()
                    .ok_or_else(|| mismatch("a boolean", &value))?;
                let mut bits = bitvec::vec::BitVec::repeat(false, 1);
                bits.set(0, boolean);
                bits
            }
            Codec::Str { encoding } => {
                let string = value.as_str().ok_or_else(|| mismatch("a string", &value))?;
                let bytes = encode_str(string, *encoding, field.bit_len / 8)?;
                bits::encode_bytes(&bytes)
            }
            Codec::Padding => {
                return Err(Error::CannotSetPadding);
            }
            Codec::Enum {
                spec,
                endianness,
                adjust,
            } => {
                let label = value.as_str().ok_or_else(|| mismatch("a string", &value))?;
                let code = spec.code_for(label).ok_or_else(|| Error::UnknownEnumLabel {
                    label: label.to_string(),
                })?;
                bits::encode_uint(code - adjust, field.bit_len, *endianness)?
            }
        };

        buffer.overwrite(offset, &bits);
        trace!(name = %field.display_name(), offset, bits = field.bit_len, "Encoded field");
        // Subsequent reads must observe exactly what was written
        *field.cache.borrow_mut() = Some(value);

        Ok(())
    }

    /// Plain-data projection: named fields of structures (conditionals merge the active
    /// variant's fields in), item lists of arrays, decoded values of leaves
    pub(crate) fn as_native(&self, id: NodeId, buffer: &BitBuffer) -> Result<Value, Error> {
        match self.node(id) {
            Node::Field(field) => self.field_get(field, buffer),
            Node::Struct(node) => {
                let mut entries = BTreeMap::new();
                for &child in &node.children {
                    match self.node(child) {
                        Node::Conditional(_) => {
                            let Value::Map(variant_entries) = self.as_native(child, buffer)?
                            else {
                                unreachable!("Conditional variants are structs and project to maps");
                            };
                            entries.extend(variant_entries);
                        }
                        Node::Field(field) => {
                            if let Some(name) = &field.name {
                                entries.insert(name.clone(), self.as_native(child, buffer)?);
                            }
                        }
                        Node::Struct(child_node) => {
                            if let Some(name) = &child_node.name {
                                entries.insert(name.clone(), self.as_native(child, buffer)?);
                            }
                        }
                        Node::Array(child_node) => {
                            if let Some(name) = &child_node.name {
                                entries.insert(name.clone(), self.as_native(child, buffer)?);
                            }
                        }
                    }
                }
                Ok(Value::Map(entries))
            }
            Node::Array(node) => {
                let items = node
                    .items
                    .iter()
                    .map(|&item| self.as_native(item, buffer))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::List(items))
            }
            Node::Conditional(_) => {
                let active = self.active_variant(id, buffer)?;
                self.as_native(active, buffer)
            }
        }
    }

    /// Absolute bit offset of a node
    pub(crate) fn offset(&self, id: NodeId) -> Option<usize> {
        match self.node(id) {
            Node::Field(field) => field.offset,
            Node::Struct(node) => node.offset,
            Node::Array(node) => node.offset,
            Node::Conditional(node) => node.offset,
        }
    }

    /// Name the node was attached under, if any
    pub(crate) fn name(&self, id: NodeId) -> Option<&str> {
        match self.node(id) {
            Node::Field(field) => field.name.as_deref(),
            Node::Struct(node) => node.name.as_deref(),
            Node::Array(node) => node.name.as_deref(),
            Node::Conditional(_) => None,
        }
    }
}

/// Decoded integers are held in an `i128`, which bounds unsigned fields at 127 bits and
/// signed fields at 128
fn check_width(width: usize, signed: bool) -> Result<(), Error> {
    let max_width = if signed { 128 } else { 127 };
    if width == 0 || width > max_width {
        return Err(Error::BadFieldWidth { bits: width });
    }
    Ok(())
}

fn case_matches(key: &CaseKey, value: &Value) -> bool {
    match (key, value) {
        (CaseKey::Bool(key), Value::Bool(value)) => key == value,
        (CaseKey::Int(key), Value::Int(value)) => key == value,
        (CaseKey::Str(key), Value::Str(value)) => key == value,
        _ => false,
    }
}

fn decode_str(bytes: Vec<u8>, encoding: StrEncoding) -> Result<String, Error> {
    match encoding {
        StrEncoding::Utf8 => {
            String::from_utf8(bytes).map_err(|_error| Error::StrEncoding { encoding: "utf-8" })
        }
        StrEncoding::Ascii => {
            if !bytes.is_ascii() {
                return Err(Error::StrEncoding { encoding: "ascii" });
            }
            // ASCII is a UTF-8 subset
            Ok(String::from_utf8(bytes)
                .unwrap_or_else(|_| unreachable!("Just checked to be ASCII")))
        }
    }
}

fn encode_str(string: &str, encoding: StrEncoding, length: usize) -> Result<Vec<u8>, Error> {
    if encoding == StrEncoding::Ascii && !string.is_ascii() {
        return Err(Error::StrEncoding { encoding: "ascii" });
    }
    let bytes = string.as_bytes();
    if bytes.len() != length {
        return Err(Error::StrWrongLength {
            expected: length,
            actual: bytes.len(),
        });
    }
    Ok(bytes.to_vec())
}
