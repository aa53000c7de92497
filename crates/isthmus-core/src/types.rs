//! Declared types: kind, layout class, capabilities, and structure.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ident::{QualifiedName, Side};

/// The structural kind of a declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TypeKind {
    /// Plain data with a known field layout.
    Value,
    /// Represented across the boundary only by a handle.
    OpaqueHandle,
    /// Non-owning window onto memory owned elsewhere.
    SharedView,
    /// Homogeneous run of elements.
    Sequence,
    /// Present-or-absent wrapper around one element type.
    Optional,
    /// Success/failure pair.
    Result,
    /// Tagged union whose variants may carry a payload.
    EnumWithPayload,
}

impl TypeKind {
    /// Kinds that cross as a window over elements.
    pub fn is_view_like(self) -> bool {
        matches!(self, Self::Sequence | Self::SharedView)
    }

    /// Kinds whose representation includes a success/failure discriminant.
    pub fn can_carry_failure(self) -> bool {
        matches!(self, Self::Result | Self::EnumWithPayload)
    }
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Value => "value",
            Self::OpaqueHandle => "opaque-handle",
            Self::SharedView => "shared-view",
            Self::Sequence => "sequence",
            Self::Optional => "optional",
            Self::Result => "result",
            Self::EnumWithPayload => "enum-with-payload",
        };
        f.write_str(s)
    }
}

/// Size and alignment class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SizeClass {
    /// Size and alignment known at compile time.
    Known { size: u64, align: u64 },
    /// Layout not exposed to the other side.
    Opaque,
}

impl SizeClass {
    pub fn known(size: u64, align: u64) -> Self {
        Self::Known { size, align }
    }

    pub fn size(&self) -> Option<u64> {
        match self {
            Self::Known { size, .. } => Some(*size),
            Self::Opaque => None,
        }
    }

    pub fn align(&self) -> Option<u64> {
        match self {
            Self::Known { align, .. } => Some(*align),
            Self::Opaque => None,
        }
    }
}

impl fmt::Display for SizeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known { size, align } => write!(f, "{size}B/align {align}"),
            Self::Opaque => write!(f, "opaque"),
        }
    }
}

/// A single declared capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    Copyable,
    Movable,
    DestructibleByOwner,
    ThreadShareable,
    /// Lifetime governed by a reference count.
    RefCounted,
}

/// The set of capabilities declared for a type.
///
/// When omitted from a description the set defaults to
/// `{movable, destructible-by-owner}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilitySet(BTreeSet<Capability>);

impl Default for CapabilitySet {
    fn default() -> Self {
        Self::of(&[Capability::Movable, Capability::DestructibleByOwner])
    }
}

impl CapabilitySet {
    pub fn empty() -> Self {
        Self(BTreeSet::new())
    }

    pub fn of(caps: &[Capability]) -> Self {
        Self(caps.iter().copied().collect())
    }

    pub fn contains(&self, cap: Capability) -> bool {
        self.0.contains(&cap)
    }

    pub fn insert(&mut self, cap: Capability) {
        self.0.insert(cap);
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.0.iter().copied()
    }

    pub fn is_copyable(&self) -> bool {
        self.contains(Capability::Copyable)
    }

    /// Movable but not copyable.
    pub fn is_move_only(&self) -> bool {
        self.contains(Capability::Movable) && !self.contains(Capability::Copyable)
    }

    pub fn is_thread_shareable(&self) -> bool {
        self.contains(Capability::ThreadShareable)
    }

    /// Reference counted and safe to share across threads.
    pub fn is_shared_ref_counted(&self) -> bool {
        self.contains(Capability::RefCounted) && self.contains(Capability::ThreadShareable)
    }
}

/// A named field of a `Value` type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: QualifiedName,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: impl Into<QualifiedName>) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
        }
    }
}

/// A variant of an `EnumWithPayload` type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub name: String,
    #[serde(default)]
    pub payload: Option<QualifiedName>,
}

/// Closed dispatch table for a polymorphic opaque handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchSpec {
    /// Method names, in vtable slot order.
    pub methods: Vec<String>,
    /// Open-ended dispatch (any implementation may appear at runtime).
    #[serde(default)]
    pub open: bool,
}

/// A type declared on one side of the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredType {
    pub name: QualifiedName,
    pub side: Side,
    pub kind: TypeKind,
    /// Declared layout. `None` derives the layout from fields when possible.
    #[serde(default)]
    pub layout: Option<SizeClass>,
    #[serde(default)]
    pub capabilities: CapabilitySet,
    /// The bridge-compatible type on the other side.
    #[serde(default)]
    pub counterpart: Option<QualifiedName>,
    #[serde(default)]
    pub fields: Vec<Field>,
    /// Element type for `Sequence`, `SharedView`, and `Optional`.
    #[serde(default)]
    pub element: Option<QualifiedName>,
    #[serde(default)]
    pub ok: Option<QualifiedName>,
    #[serde(default)]
    pub err: Option<QualifiedName>,
    #[serde(default)]
    pub variants: Vec<Variant>,
    #[serde(default)]
    pub dispatch: Option<DispatchSpec>,
    /// Generic parameter names. Generic declarations are rejected.
    #[serde(default)]
    pub generics: Vec<String>,
}

impl DeclaredType {
    /// A bare declaration of the given kind with default capabilities.
    pub fn new(name: impl Into<QualifiedName>, side: Side, kind: TypeKind) -> Self {
        Self {
            name: name.into(),
            side,
            kind,
            layout: None,
            capabilities: CapabilitySet::default(),
            counterpart: None,
            fields: Vec::new(),
            element: None,
            ok: None,
            err: None,
            variants: Vec::new(),
            dispatch: None,
            generics: Vec::new(),
        }
    }

    /// A copyable scalar value with a known layout.
    pub fn scalar(name: impl Into<QualifiedName>, side: Side, size: u64) -> Self {
        Self::new(name, side, TypeKind::Value)
            .with_layout(SizeClass::known(size, size.max(1)))
            .with_capabilities(&[
                Capability::Copyable,
                Capability::Movable,
                Capability::ThreadShareable,
            ])
    }

    pub fn opaque_handle(name: impl Into<QualifiedName>, side: Side) -> Self {
        Self::new(name, side, TypeKind::OpaqueHandle).with_layout(SizeClass::Opaque)
    }

    pub fn sequence(
        name: impl Into<QualifiedName>,
        side: Side,
        element: impl Into<QualifiedName>,
    ) -> Self {
        let mut ty = Self::new(name, side, TypeKind::Sequence);
        ty.element = Some(element.into());
        ty
    }

    pub fn result(
        name: impl Into<QualifiedName>,
        side: Side,
        ok: impl Into<QualifiedName>,
        err: impl Into<QualifiedName>,
    ) -> Self {
        let mut ty = Self::new(name, side, TypeKind::Result);
        ty.ok = Some(ok.into());
        ty.err = Some(err.into());
        ty
    }

    pub fn with_layout(mut self, layout: SizeClass) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn with_capabilities(mut self, caps: &[Capability]) -> Self {
        self.capabilities = CapabilitySet::of(caps);
        self
    }

    pub fn with_counterpart(mut self, counterpart: impl Into<QualifiedName>) -> Self {
        self.counterpart = Some(counterpart.into());
        self
    }

    pub fn with_fields(mut self, fields: Vec<Field>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_element(mut self, element: impl Into<QualifiedName>) -> Self {
        self.element = Some(element.into());
        self
    }

    pub fn with_variants(mut self, variants: Vec<Variant>) -> Self {
        self.variants = variants;
        self
    }

    pub fn with_dispatch(mut self, methods: &[&str]) -> Self {
        self.dispatch = Some(DispatchSpec {
            methods: methods.iter().map(|m| m.to_string()).collect(),
            open: false,
        });
        self
    }

    /// Names of every type this declaration refers to structurally.
    pub fn referenced_types(&self) -> Vec<&QualifiedName> {
        let mut refs: Vec<&QualifiedName> = self.fields.iter().map(|f| &f.ty).collect();
        refs.extend(self.element.iter());
        refs.extend(self.ok.iter());
        refs.extend(self.err.iter());
        refs.extend(self.variants.iter().filter_map(|v| v.payload.as_ref()));
        refs
    }

    pub fn is_generic(&self) -> bool {
        !self.generics.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capabilities() {
        let caps = CapabilitySet::default();
        assert!(caps.contains(Capability::Movable));
        assert!(caps.contains(Capability::DestructibleByOwner));
        assert!(caps.is_move_only());
        assert!(!caps.is_thread_shareable());
    }

    #[test]
    fn shared_ref_counted_requires_both() {
        let caps = CapabilitySet::of(&[Capability::RefCounted]);
        assert!(!caps.is_shared_ref_counted());
        let caps = CapabilitySet::of(&[Capability::RefCounted, Capability::ThreadShareable]);
        assert!(caps.is_shared_ref_counted());
    }

    #[test]
    fn scalar_is_copyable() {
        let ty = DeclaredType::scalar("i32", Side::A, 4);
        assert_eq!(ty.layout, Some(SizeClass::known(4, 4)));
        assert!(ty.capabilities.is_copyable());
        assert!(!ty.capabilities.is_move_only());
    }

    #[test]
    fn referenced_types_cover_structure() {
        let ty = DeclaredType::result("Res", Side::A, "i32", "Err")
            .with_variants(vec![Variant {
                name: "X".into(),
                payload: Some("Payload".into()),
            }]);
        let refs: Vec<&str> = ty.referenced_types().iter().map(|q| q.as_str()).collect();
        assert_eq!(refs, vec!["i32", "Err", "Payload"]);
    }

    #[test]
    fn kind_predicates() {
        assert!(TypeKind::Sequence.is_view_like());
        assert!(TypeKind::SharedView.is_view_like());
        assert!(!TypeKind::Value.is_view_like());
        assert!(TypeKind::Result.can_carry_failure());
        assert!(!TypeKind::Optional.can_carry_failure());
    }
}
