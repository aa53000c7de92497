//! Dynamic values and their B-side representation.
//!
//! The executor moves [`Value`]s through glue the way compiled artifacts
//! move native values. Everything crosses in the Language-B layout: plain
//! data is encoded with C layout rules, tagged unions as a `uint32_t` tag
//! followed by a payload union, handles as their raw `uint64_t`, and views
//! as a run of elements. Conversion edges pass through registered
//! functions on the A side only.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use isthmus_catalog::layout::{align_up, TAG_SIZE};
use isthmus_catalog::{primitives, TypeCatalog};
use isthmus_core::{
    CompatibilityEdge, DeclaredType, QualifiedName, Side, SizeClass, TransformKind, TypeKind,
};
use isthmus_runtime::{Handle, HandleTable};

use crate::error::{CodegenError, Result};

/// A value of either language. Records and variants are positional, so the
/// same value reads correctly against both sides' declarations.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Unit,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    /// Elements of a sequence or view.
    Seq(Vec<Value>),
    /// Fields in declaration order.
    Record(Vec<Value>),
    Handle(Handle),
    /// Alternative `tag` of an optional (`None`, `Some`), a result (`Ok`,
    /// `Err`) or an enum (declaration order).
    Variant {
        tag: u32,
        payload: Option<Box<Value>>,
    },
}

impl Value {
    pub fn none() -> Self {
        Self::Variant {
            tag: 0,
            payload: None,
        }
    }

    pub fn some(value: Value) -> Self {
        Self::Variant {
            tag: 1,
            payload: Some(Box::new(value)),
        }
    }

    pub fn ok(value: Value) -> Self {
        Self::Variant {
            tag: 0,
            payload: Some(Box::new(value)),
        }
    }

    pub fn err(value: Value) -> Self {
        Self::Variant {
            tag: 1,
            payload: Some(Box::new(value)),
        }
    }

    pub fn ints(values: &[i64]) -> Self {
        Self::Seq(values.iter().map(|v| Self::Int(*v)).collect())
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::UInt(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<Handle> {
        match self {
            Self::Handle(h) => Some(*h),
            _ => None,
        }
    }

    /// Rebuild the value with every embedded handle replaced by `f(handle)`.
    pub fn map_handles<F, E>(&self, f: &mut F) -> std::result::Result<Value, E>
    where
        F: FnMut(Handle) -> std::result::Result<Handle, E>,
    {
        Ok(match self {
            Self::Handle(h) => Self::Handle(f(*h)?),
            Self::Seq(items) => Self::Seq(
                items
                    .iter()
                    .map(|v| v.map_handles(f))
                    .collect::<std::result::Result<_, E>>()?,
            ),
            Self::Record(fields) => Self::Record(
                fields
                    .iter()
                    .map(|v| v.map_handles(f))
                    .collect::<std::result::Result<_, E>>()?,
            ),
            Self::Variant { tag, payload } => Self::Variant {
                tag: *tag,
                payload: match payload {
                    Some(p) => Some(Box::new(p.map_handles(f)?)),
                    None => None,
                },
            },
            other => other.clone(),
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(f: &mut fmt::Formatter<'_>, items: &[Value], open: &str, close: &str) -> fmt::Result {
            f.write_str(open)?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{item}")?;
            }
            f.write_str(close)
        }
        match self {
            Self::Unit => f.write_str("()"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::UInt(u) => write!(f, "{u}"),
            Self::Float(x) => write!(f, "{x:?}"),
            Self::Seq(items) => list(f, items, "[", "]"),
            Self::Record(fields) => list(f, fields, "{", "}"),
            Self::Handle(h) => write!(f, "{h}"),
            Self::Variant { tag, payload: None } => write!(f, "<{tag}>"),
            Self::Variant {
                tag,
                payload: Some(p),
            } => write!(f, "<{tag}>({p})"),
        }
    }
}

/// A registered conversion function over dynamic values.
pub type ConversionFn = Arc<dyn Fn(&Value) -> std::result::Result<Value, String> + Send + Sync>;

/// Conversion functions by the names conversion pairs refer to.
#[derive(Clone, Default)]
pub struct Conversions {
    fns: BTreeMap<String, ConversionFn>,
}

impl Conversions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&Value) -> std::result::Result<Value, String> + Send + Sync + 'static,
    ) -> &mut Self {
        self.fns.insert(name.into(), Arc::new(f));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fns.contains_key(name)
    }

    pub fn apply(&self, name: &str, value: &Value) -> Result<Value> {
        let f = self
            .fns
            .get(name)
            .ok_or_else(|| CodegenError::MissingConversion {
                name: name.to_string(),
            })?;
        f(value).map_err(|detail| CodegenError::marshal(value.to_string(), name, detail))
    }
}

impl fmt::Debug for Conversions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.fns.keys()).finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scalar {
    Signed(u64),
    Unsigned(u64),
    Float(u64),
    Bool,
    Unit,
}

fn array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}

fn int_of(value: &Value) -> Option<i128> {
    match value {
        Value::Int(i) => Some(i128::from(*i)),
        Value::UInt(u) => Some(i128::from(*u)),
        _ => None,
    }
}

fn signed_bytes(v: i128, size: u64) -> Option<Vec<u8>> {
    Some(match size {
        1 => i8::try_from(v).ok()?.to_ne_bytes().to_vec(),
        2 => i16::try_from(v).ok()?.to_ne_bytes().to_vec(),
        4 => i32::try_from(v).ok()?.to_ne_bytes().to_vec(),
        8 => i64::try_from(v).ok()?.to_ne_bytes().to_vec(),
        _ => return None,
    })
}

fn unsigned_bytes(v: i128, size: u64) -> Option<Vec<u8>> {
    Some(match size {
        1 => u8::try_from(v).ok()?.to_ne_bytes().to_vec(),
        2 => u16::try_from(v).ok()?.to_ne_bytes().to_vec(),
        4 => u32::try_from(v).ok()?.to_ne_bytes().to_vec(),
        8 => u64::try_from(v).ok()?.to_ne_bytes().to_vec(),
        _ => return None,
    })
}

fn scalar_bytes(scalar: Scalar, value: &Value) -> Option<Vec<u8>> {
    match (scalar, value) {
        (Scalar::Unit, Value::Unit) => Some(Vec::new()),
        (Scalar::Bool, Value::Bool(b)) => Some(vec![u8::from(*b)]),
        (Scalar::Float(4), Value::Float(f)) => Some((*f as f32).to_ne_bytes().to_vec()),
        (Scalar::Float(8), Value::Float(f)) => Some(f.to_ne_bytes().to_vec()),
        (Scalar::Signed(n), v) => int_of(v).and_then(|i| signed_bytes(i, n)),
        (Scalar::Unsigned(n), v) => int_of(v).and_then(|i| unsigned_bytes(i, n)),
        _ => None,
    }
}

fn scalar_value(scalar: Scalar, b: &[u8]) -> Option<Value> {
    Some(match scalar {
        Scalar::Unit => Value::Unit,
        Scalar::Bool => Value::Bool(b[0] != 0),
        Scalar::Float(4) => Value::Float(f64::from(f32::from_ne_bytes(array(b)))),
        Scalar::Float(8) => Value::Float(f64::from_ne_bytes(array(b))),
        Scalar::Signed(1) => Value::Int(i64::from(i8::from_ne_bytes(array(b)))),
        Scalar::Signed(2) => Value::Int(i64::from(i16::from_ne_bytes(array(b)))),
        Scalar::Signed(4) => Value::Int(i64::from(i32::from_ne_bytes(array(b)))),
        Scalar::Signed(8) => Value::Int(i64::from_ne_bytes(array(b))),
        Scalar::Unsigned(1) => Value::UInt(u64::from(b[0])),
        Scalar::Unsigned(2) => Value::UInt(u64::from(u16::from_ne_bytes(array(b)))),
        Scalar::Unsigned(4) => Value::UInt(u64::from(u32::from_ne_bytes(array(b)))),
        Scalar::Unsigned(8) => Value::UInt(u64::from_ne_bytes(array(b))),
        _ => return None,
    })
}

/// Alternatives of a tagged union and where their payload starts.
struct Tagged {
    alternatives: Vec<Option<QualifiedName>>,
    payload_offset: u64,
}

/// Encodes and decodes [`Value`]s against declared layouts.
#[derive(Debug, Clone, Copy)]
pub struct Marshaler<'a> {
    catalog: &'a TypeCatalog,
    conversions: &'a Conversions,
}

impl<'a> Marshaler<'a> {
    pub fn new(catalog: &'a TypeCatalog, conversions: &'a Conversions) -> Self {
        Self {
            catalog,
            conversions,
        }
    }

    fn fail(&self, what: impl fmt::Display, ty: &QualifiedName, detail: impl Into<String>) -> CodegenError {
        CodegenError::marshal(what.to_string(), ty, detail)
    }

    fn declared(&self, side: Side, ty: &QualifiedName) -> Result<&'a DeclaredType> {
        self.catalog
            .get(side, ty)
            .ok_or_else(|| self.fail("<type>", ty, format!("not declared on side {side}")))
    }

    fn scalar(&self, side: Side, decl: &DeclaredType) -> Option<Scalar> {
        if let Some(p) = primitives::lookup(side, decl.name.as_str()) {
            let size = p.size.unwrap_or(self.catalog.config().word_bytes);
            return Some(match p.a {
                "unit" => Scalar::Unit,
                "bool" => Scalar::Bool,
                a if a.starts_with('f') => Scalar::Float(size),
                a if a.starts_with('u') => Scalar::Unsigned(size),
                _ => Scalar::Signed(size),
            });
        }
        match (decl.kind, decl.layout) {
            (TypeKind::Value, Some(SizeClass::Known { size, .. }))
                if decl.fields.is_empty() && matches!(size, 1 | 2 | 4 | 8) =>
            {
                Some(Scalar::Signed(size))
            }
            _ => None,
        }
    }

    /// Payload type of each alternative, in tag order. Unit payloads are
    /// dropped.
    fn alternatives(&self, side: Side, decl: &DeclaredType) -> Vec<Option<QualifiedName>> {
        let keep = |ty: &Option<QualifiedName>| {
            ty.clone().filter(|t| {
                primitives::lookup(side, t.as_str()).map_or(true, |p| p.size != Some(0))
            })
        };
        match decl.kind {
            TypeKind::Optional => vec![None, keep(&decl.element)],
            TypeKind::Result => vec![keep(&decl.ok), keep(&decl.err)],
            _ => decl.variants.iter().map(|v| keep(&v.payload)).collect(),
        }
    }

    fn tagged(&self, side: Side, decl: &DeclaredType, visiting: &mut Vec<QualifiedName>) -> Result<(Tagged, u64, u64)> {
        let alternatives = self.alternatives(side, decl);
        // The C union always has a one-byte `empty` member.
        let (mut payload_size, mut payload_align) = (1, 1);
        for ty in alternatives.iter().flatten() {
            let (size, align) = self.layout_inner(side, ty, visiting)?;
            payload_size = payload_size.max(size);
            payload_align = payload_align.max(align);
        }
        let payload_offset = align_up(TAG_SIZE, payload_align);
        let align = payload_align.max(TAG_SIZE);
        let size = align_up(payload_offset + payload_size, align);
        Ok((
            Tagged {
                alternatives,
                payload_offset,
            },
            size,
            align,
        ))
    }

    /// Size and alignment of the B representation of `ty` as declared on
    /// `side`.
    pub fn layout(&self, side: Side, ty: &QualifiedName) -> Result<(u64, u64)> {
        self.layout_inner(side, ty, &mut Vec::new())
    }

    fn layout_inner(
        &self,
        side: Side,
        ty: &QualifiedName,
        visiting: &mut Vec<QualifiedName>,
    ) -> Result<(u64, u64)> {
        let decl = self.declared(side, ty)?;
        if let Some(scalar) = self.scalar(side, decl) {
            let size = match scalar {
                Scalar::Signed(n) | Scalar::Unsigned(n) | Scalar::Float(n) => n,
                Scalar::Bool => 1,
                Scalar::Unit => 0,
            };
            return Ok((size, size.max(1)));
        }
        if visiting.contains(ty) {
            return Err(self.fail("<type>", ty, "recursive type has no inline layout"));
        }
        visiting.push(ty.clone());
        let layout = match decl.kind {
            TypeKind::OpaqueHandle => Ok((8, 8)),
            TypeKind::Value if !decl.fields.is_empty() => {
                let (mut size, mut max_align) = (0, 1);
                for field in &decl.fields {
                    let (fsize, falign) = self.layout_inner(side, &field.ty, visiting)?;
                    size = align_up(size, falign) + fsize;
                    max_align = max_align.max(falign);
                }
                Ok((align_up(size, max_align), max_align))
            }
            TypeKind::Optional | TypeKind::Result | TypeKind::EnumWithPayload => self
                .tagged(side, decl, visiting)
                .map(|(_, size, align)| (size, align)),
            TypeKind::Sequence | TypeKind::SharedView => {
                Err(self.fail("<type>", ty, "views cross as spans, not inline"))
            }
            TypeKind::Value => match decl.layout {
                Some(SizeClass::Known { size, align }) => Ok((size, align)),
                _ => Err(self.fail("<type>", ty, "has no known layout")),
            },
        };
        visiting.pop();
        layout
    }

    /// Encode `value` in the layout of `ty` as declared on `side`.
    pub fn encode(&self, side: Side, ty: &QualifiedName, value: &Value) -> Result<Vec<u8>> {
        let (size, _) = self.layout(side, ty)?;
        let mut buf = vec![0u8; size as usize];
        self.write(side, ty, value, &mut buf, 0)?;
        Ok(buf)
    }

    fn write(
        &self,
        side: Side,
        ty: &QualifiedName,
        value: &Value,
        buf: &mut [u8],
        offset: usize,
    ) -> Result<()> {
        let decl = self.declared(side, ty)?;
        if let Some(scalar) = self.scalar(side, decl) {
            let bytes = scalar_bytes(scalar, value)
                .ok_or_else(|| self.fail(value, ty, "value does not fit the scalar"))?;
            buf[offset..offset + bytes.len()].copy_from_slice(&bytes);
            return Ok(());
        }
        match (decl.kind, value) {
            (TypeKind::OpaqueHandle, Value::Handle(h)) => {
                buf[offset..offset + 8].copy_from_slice(&h.raw().to_ne_bytes());
                Ok(())
            }
            (TypeKind::Value, Value::Record(fields)) if fields.len() == decl.fields.len() => {
                let mut at = 0;
                for (field, v) in decl.fields.iter().zip(fields) {
                    let (size, align) = self.layout(side, &field.ty)?;
                    at = align_up(at, align);
                    self.write(side, &field.ty, v, buf, offset + at as usize)?;
                    at += size;
                }
                Ok(())
            }
            (
                TypeKind::Optional | TypeKind::Result | TypeKind::EnumWithPayload,
                Value::Variant { tag, payload },
            ) => {
                let (tagged, _, _) = self.tagged(side, decl, &mut Vec::new())?;
                let alternative = tagged
                    .alternatives
                    .get(*tag as usize)
                    .ok_or_else(|| self.fail(value, ty, format!("tag {tag} out of range")))?;
                buf[offset..offset + 4].copy_from_slice(&tag.to_ne_bytes());
                let at = offset + tagged.payload_offset as usize;
                match (alternative, payload) {
                    (Some(pty), Some(p)) => self.write(side, pty, p, buf, at),
                    (None, None) => Ok(()),
                    (None, Some(p)) if **p == Value::Unit => Ok(()),
                    _ => Err(self.fail(value, ty, format!("payload does not match alternative {tag}"))),
                }
            }
            _ => Err(self.fail(value, ty, format!("cannot encode as {}", decl.kind))),
        }
    }

    /// Decode a value of `ty` from the start of `bytes`.
    pub fn decode(&self, side: Side, ty: &QualifiedName, bytes: &[u8]) -> Result<Value> {
        let (size, _) = self.layout(side, ty)?;
        if (bytes.len() as u64) < size {
            return Err(self.fail(
                format!("{} bytes", bytes.len()),
                ty,
                format!("needs {size} bytes"),
            ));
        }
        self.read(side, ty, bytes, 0)
    }

    fn read(&self, side: Side, ty: &QualifiedName, bytes: &[u8], offset: usize) -> Result<Value> {
        let decl = self.declared(side, ty)?;
        if let Some(scalar) = self.scalar(side, decl) {
            return scalar_value(scalar, &bytes[offset..])
                .ok_or_else(|| self.fail("<bytes>", ty, "unsupported scalar width"));
        }
        match decl.kind {
            TypeKind::OpaqueHandle => Ok(Value::Handle(Handle::from_raw(u64::from_ne_bytes(
                array(&bytes[offset..]),
            )))),
            TypeKind::Value if !decl.fields.is_empty() => {
                let mut at = 0;
                let mut fields = Vec::with_capacity(decl.fields.len());
                for field in &decl.fields {
                    let (size, align) = self.layout(side, &field.ty)?;
                    at = align_up(at, align);
                    fields.push(self.read(side, &field.ty, bytes, offset + at as usize)?);
                    at += size;
                }
                Ok(Value::Record(fields))
            }
            TypeKind::Optional | TypeKind::Result | TypeKind::EnumWithPayload => {
                let (tagged, _, _) = self.tagged(side, decl, &mut Vec::new())?;
                let tag = u32::from_ne_bytes(array(&bytes[offset..]));
                let alternative = tagged
                    .alternatives
                    .get(tag as usize)
                    .ok_or_else(|| self.fail(format!("tag {tag}"), ty, "tag out of range"))?;
                let payload = match alternative {
                    Some(pty) => Some(Box::new(self.read(
                        side,
                        pty,
                        bytes,
                        offset + tagged.payload_offset as usize,
                    )?)),
                    None => None,
                };
                Ok(Value::Variant { tag, payload })
            }
            _ => Err(self.fail("<bytes>", ty, format!("cannot decode {}", decl.kind))),
        }
    }

    /// Encode the elements of a view back to back.
    pub fn encode_seq(&self, side: Side, element: &QualifiedName, value: &Value) -> Result<Vec<u8>> {
        let Value::Seq(items) = value else {
            return Err(self.fail(value, element, "expected a sequence"));
        };
        let mut out = Vec::new();
        for item in items {
            out.extend(self.encode(side, element, item)?);
        }
        Ok(out)
    }

    pub fn decode_seq(&self, side: Side, element: &QualifiedName, bytes: &[u8]) -> Result<Value> {
        let (stride, _) = self.layout(side, element)?;
        if stride == 0 {
            return Ok(Value::Seq(Vec::new()));
        }
        let stride = stride as usize;
        if bytes.len() % stride != 0 {
            return Err(self.fail(
                format!("{} bytes", bytes.len()),
                element,
                format!("not a whole number of {stride}-byte elements"),
            ));
        }
        bytes
            .chunks_exact(stride)
            .map(|chunk| self.read(side, element, chunk, 0))
            .collect::<Result<Vec<_>>>()
            .map(Value::Seq)
    }

    fn element(&self, edge: &CompatibilityEdge) -> Result<QualifiedName> {
        self.declared(Side::B, &edge.b)?
            .element
            .clone()
            .ok_or_else(|| self.fail("<type>", &edge.b, "view has no element type"))
    }

    /// Encode a value held by `from` into the B representation of `edge`.
    pub fn to_wire(&self, from: Side, edge: &CompatibilityEdge, value: &Value) -> Result<Vec<u8>> {
        let converted;
        let value = match (&edge.conversion, from, edge.kind) {
            (Some(pair), Side::A, TransformKind::ExplicitConversionFunction) => {
                converted = self.conversions.apply(&pair.to_b, value)?;
                &converted
            }
            _ => value,
        };
        if edge.type_kind.is_view_like() {
            return self.encode_seq(Side::B, &self.element(edge)?, value);
        }
        if edge.kind == TransformKind::OpaqueHandle {
            let h = value
                .as_handle()
                .ok_or_else(|| self.fail(value, &edge.b, "expected a handle"))?;
            return Ok(h.raw().to_ne_bytes().to_vec());
        }
        self.encode(Side::B, &edge.b, value)
    }

    /// Decode the B representation of `edge` into a value for `to`.
    pub fn from_wire(&self, to: Side, edge: &CompatibilityEdge, bytes: &[u8]) -> Result<Value> {
        let value = if edge.type_kind.is_view_like() {
            self.decode_seq(Side::B, &self.element(edge)?, bytes)?
        } else if edge.kind == TransformKind::OpaqueHandle {
            if bytes.len() < 8 {
                return Err(self.fail("<bytes>", &edge.b, "a handle needs 8 bytes"));
            }
            Value::Handle(Handle::from_raw(u64::from_ne_bytes(array(bytes))))
        } else {
            self.decode(Side::B, &edge.b, bytes)?
        };
        match (&edge.conversion, to, edge.kind) {
            (Some(pair), Side::A, TransformKind::ExplicitConversionFunction) => {
                self.conversions.apply(&pair.to_a, &value)
            }
            _ => Ok(value),
        }
    }

    pub fn lower(&self, edge: &CompatibilityEdge, value: &Value) -> Result<Vec<u8>> {
        self.to_wire(Side::A, edge, value)
    }

    pub fn lift(&self, edge: &CompatibilityEdge, bytes: &[u8]) -> Result<Value> {
        self.from_wire(Side::A, edge, bytes)
    }

    /// Carry an A value to side B and back. Handles, bare or embedded,
    /// move through the table twice; views travel as lent regions.
    pub fn round_trip(
        &self,
        table: &HandleTable,
        edge: &CompatibilityEdge,
        value: &Value,
    ) -> Result<Value> {
        if edge.kind == TransformKind::OpaqueHandle {
            let h = value
                .as_handle()
                .ok_or_else(|| self.fail(value, &edge.a, "expected a handle"))?;
            let there = table.transfer(h)?;
            return Ok(Value::Handle(table.transfer(there)?));
        }
        if edge.holds_handles {
            let there = self.from_wire(
                Side::B,
                edge,
                &self.lower(edge, &value.map_handles(&mut |h| table.transfer(h))?)?,
            )?;
            let back = there.map_handles(&mut |h| table.transfer(h))?;
            return self.lift(edge, &self.to_wire(Side::B, edge, &back)?);
        }
        let bytes = self.lower(edge, value)?;
        if edge.type_kind.is_view_like() {
            let region = table.lend_region(edge.a.as_str(), bytes);
            let back = table.reclaim_region(region)?;
            return self.lift(edge, &back);
        }
        self.lift(edge, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::catalog;
    use isthmus_core::types::Field;
    use isthmus_core::{Capability, ConversionPair};

    fn qn(s: &str) -> QualifiedName {
        QualifiedName::new(s)
    }

    #[test]
    fn struct_layout_follows_c_rules() {
        let mut cat = catalog();
        cat.register_type(
            DeclaredType::new("mixed_t", Side::B, TypeKind::Value).with_fields(vec![
                Field::new("flag", "_Bool"),
                Field::new("count", "int32_t"),
                Field::new("small", "uint8_t"),
            ]),
        )
        .unwrap();
        let conv = Conversions::new();
        let m = Marshaler::new(&cat, &conv);
        assert_eq!(m.layout(Side::B, &qn("mixed_t")).unwrap(), (12, 4));

        let value = Value::Record(vec![Value::Bool(true), Value::Int(-7), Value::UInt(200)]);
        let bytes = m.encode(Side::B, &qn("mixed_t"), &value).unwrap();
        assert_eq!(bytes.len(), 12);
        assert_eq!(bytes[0], 1);
        assert_eq!(i32::from_ne_bytes(array(&bytes[4..])), -7);
        assert_eq!(bytes[8], 200);
        assert_eq!(m.decode(Side::B, &qn("mixed_t"), &bytes).unwrap(), value);
    }

    #[test]
    fn identity_edges_read_the_same_bytes_on_both_sides() {
        let cat = catalog();
        let conv = Conversions::new();
        let m = Marshaler::new(&cat, &conv);
        let point = Value::Record(vec![Value::Float(1.5), Value::Float(-2.0)]);
        let a = m.encode(Side::A, &qn("Point"), &point).unwrap();
        let b = m.encode(Side::B, &qn("point_t"), &point).unwrap();
        assert_eq!(a, b);

        let edge = cat.edge_for(Side::A, &qn("Point")).unwrap();
        let table = HandleTable::new();
        assert_eq!(m.round_trip(&table, &edge, &point).unwrap(), point);
    }

    #[test]
    fn tagged_unions_carry_tag_then_payload() {
        let cat = catalog();
        let conv = Conversions::new();
        let m = Marshaler::new(&cat, &conv);
        let ty = qn("port_result_t");
        assert_eq!(m.layout(Side::B, &ty).unwrap(), (8, 4));

        let ok = Value::ok(Value::UInt(8080));
        let bytes = m.encode(Side::B, &ty, &ok).unwrap();
        assert_eq!(u32::from_ne_bytes(array(&bytes)), 0);
        assert_eq!(u16::from_ne_bytes(array(&bytes[4..])), 8080);
        assert_eq!(m.decode(Side::B, &ty, &bytes).unwrap(), ok);

        let err = Value::err(Value::Int(-3));
        let edge = cat.edge_for(Side::A, &qn("PortResult")).unwrap();
        let table = HandleTable::new();
        assert_eq!(m.round_trip(&table, &edge, &err).unwrap(), err);

        let bad = Value::Variant {
            tag: 2,
            payload: None,
        };
        assert!(m.encode(Side::B, &ty, &bad).is_err());
        let mut forged = bytes.clone();
        forged[..4].copy_from_slice(&9u32.to_ne_bytes());
        assert!(m.decode(Side::B, &ty, &forged).is_err());
    }

    #[test]
    fn out_of_range_scalars_are_refused() {
        let cat = catalog();
        let conv = Conversions::new();
        let m = Marshaler::new(&cat, &conv);
        assert!(m.encode(Side::B, &qn("int32_t"), &Value::Int(1 << 40)).is_err());
        assert!(m.encode(Side::B, &qn("uint16_t"), &Value::Int(-1)).is_err());
        assert!(m.encode(Side::B, &qn("double"), &Value::Int(1)).is_err());
        assert_eq!(
            m.decode(Side::B, &qn("uint16_t"), &[0xff, 0xff]).unwrap(),
            Value::UInt(65535)
        );
    }

    #[test]
    fn views_travel_as_lent_regions() {
        let cat = catalog();
        let conv = Conversions::new();
        let m = Marshaler::new(&cat, &conv);
        let edge = cat.edge_for(Side::A, &qn("Int32Slice")).unwrap();
        let values = Value::ints(&[3, -1, 4, 1, 5]);
        assert_eq!(m.lower(&edge, &values).unwrap().len(), 20);

        let table = HandleTable::new();
        assert_eq!(m.round_trip(&table, &edge, &values).unwrap(), values);
        assert_eq!(table.live_count(), 0);
        assert!(m.decode_seq(Side::B, &qn("int32_t"), &[0; 7]).is_err());
    }

    #[test]
    fn handles_round_trip_through_the_table() {
        let cat = catalog();
        let conv = Conversions::new();
        let m = Marshaler::new(&cat, &conv);
        let edge = cat.edge_for(Side::A, &qn("Db")).unwrap();
        let table = HandleTable::new();
        let h = table.allocate_value("Db", 41_u32);

        let back = m.round_trip(&table, &edge, &Value::Handle(h)).unwrap();
        let back = back.as_handle().unwrap();
        assert_ne!(back, h);
        assert!(!table.is_live(h));
        assert_eq!(table.with_value(back, |v: &u32| *v).unwrap(), 41);
    }

    #[test]
    fn embedded_handles_change_owner_on_the_way_across() {
        let cat = catalog();
        let conv = Conversions::new();
        let m = Marshaler::new(&cat, &conv);
        let edge = cat.edge_for(Side::A, &qn("Entry")).unwrap();
        assert!(edge.holds_handles);
        assert_eq!(m.layout(Side::B, &qn("entry_t")).unwrap(), (16, 8));

        let table = HandleTable::new();
        let db = table.allocate_value("Db", 5_u32);
        let entry = Value::Record(vec![Value::Handle(db), Value::UInt(3)]);
        let back = m.round_trip(&table, &edge, &entry).unwrap();
        let Value::Record(fields) = &back else {
            panic!("expected a record, got {back}");
        };
        let moved = fields[0].as_handle().unwrap();
        assert_ne!(moved, db);
        assert!(!table.is_live(db));
        assert_eq!(table.with_value(moved, |v: &u32| *v).unwrap(), 5);
        assert_eq!(fields[1], Value::UInt(3));
        assert_eq!(table.live_count(), 1);

        // Handles inside a result's payload move too.
        let edge = cat.edge_for(Side::A, &qn("OpenResult")).unwrap();
        let opened = Value::ok(Value::Handle(moved));
        let back = m.round_trip(&table, &edge, &opened).unwrap();
        assert!(!table.is_live(moved));
        let Value::Variant { payload: Some(p), .. } = back else {
            panic!("expected a payload");
        };
        assert!(table.is_live(p.as_handle().unwrap()));
    }

    #[test]
    fn map_handles_reaches_nested_values() {
        let h = |n| Value::Handle(Handle::from_raw(n));
        let value = Value::Seq(vec![
            Value::Record(vec![h(1), Value::Int(2)]),
            Value::ok(h(3)),
            Value::none(),
        ]);
        let mut seen = Vec::new();
        let mapped = value
            .map_handles(&mut |x: Handle| -> std::result::Result<Handle, ()> {
                seen.push(x.raw());
                Ok(Handle::from_raw(x.raw() + 10))
            })
            .unwrap();
        assert_eq!(seen, vec![1, 3]);
        assert_eq!(
            mapped,
            Value::Seq(vec![
                Value::Record(vec![h(11), Value::Int(2)]),
                Value::ok(h(13)),
                Value::none(),
            ])
        );
    }

    #[test]
    fn conversions_apply_on_the_a_side_only() {
        let mut cat = catalog();
        let wide = |name: &str, side: Side, int: &str| {
            DeclaredType::new(name, side, TypeKind::Value)
                .with_fields(vec![Field::new("lo", int), Field::new("hi", int)])
                .with_capabilities(&[Capability::Copyable, Capability::Movable])
        };
        cat.register_type(wide("Wide", Side::A, "i64").with_counterpart("narrow_t"))
            .unwrap();
        cat.register_type(wide("narrow_t", Side::B, "int32_t")).unwrap();
        cat.register_conversion(ConversionPair {
            a: qn("Wide"),
            b: qn("narrow_t"),
            to_b: "wide_to_narrow".into(),
            to_a: "narrow_to_wide".into(),
        })
        .unwrap();
        let edge = cat.edge_for(Side::A, &qn("Wide")).unwrap();

        let mut conv = Conversions::new();
        let halve = |v: &Value| match v {
            Value::Record(f) => Ok(Value::Record(
                f.iter()
                    .map(|x| Value::Int(x.as_int().unwrap_or(0) / 2))
                    .collect(),
            )),
            other => Err(format!("not a record: {other:?}")),
        };
        let double = |v: &Value| match v {
            Value::Record(f) => Ok(Value::Record(
                f.iter()
                    .map(|x| Value::Int(x.as_int().unwrap_or(0) * 2))
                    .collect(),
            )),
            other => Err(format!("not a record: {other:?}")),
        };
        conv.register("wide_to_narrow", halve)
            .register("narrow_to_wide", double);
        let m = Marshaler::new(&cat, &conv);

        let value = Value::Record(vec![Value::Int(10), Value::Int(20)]);
        let wire = m.lower(&edge, &value).unwrap();
        assert_eq!(wire.len(), 8);
        assert_eq!(
            m.from_wire(Side::B, &edge, &wire).unwrap(),
            Value::Record(vec![Value::Int(5), Value::Int(10)])
        );
        let table = HandleTable::new();
        assert_eq!(m.round_trip(&table, &edge, &value).unwrap(), value);

        let missing = Conversions::new();
        let m = Marshaler::new(&cat, &missing);
        assert!(matches!(
            m.lower(&edge, &value),
            Err(CodegenError::MissingConversion { .. })
        ));
    }
}
