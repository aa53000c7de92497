//! The Type Catalog: per-side type registry and compatibility-edge resolution.
//!
//! Types are registered once per run (registration needs `&mut self`); edge
//! resolution takes `&self` so items can be resolved from worker threads.
//! The edge map is append-only: an edge, once proved, is never replaced.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use tracing::{debug, warn};

use isthmus_core::error::Result;
use isthmus_core::types::DeclaredType;
use isthmus_core::{
    BridgeError, Capability, CompatibilityEdge, ConversionPair, InterfaceDescription, ItemId,
    QualifiedName, Side, SizeClass, TransformKind, TypeKind,
};

use crate::conversion::ConversionRegistry;
use crate::layout::{handle_layout, span_layout, struct_layout, tagged_layout};
use crate::primitives;

/// Catalog configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogConfig {
    /// Machine word size in bytes (pointer, `usize`/`size_t`).
    pub word_bytes: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self { word_bytes: 8 }
    }
}

type EdgeKey = (QualifiedName, QualifiedName);

/// Registry of native types on both sides plus their resolved edges.
#[derive(Debug)]
pub struct TypeCatalog {
    config: CatalogConfig,
    types: [BTreeMap<QualifiedName, DeclaredType>; 2],
    conversions: ConversionRegistry,
    edges: RwLock<BTreeMap<EdgeKey, CompatibilityEdge>>,
}

impl TypeCatalog {
    /// An empty catalog without primitives.
    pub fn new(config: CatalogConfig) -> Self {
        Self {
            config,
            types: [BTreeMap::new(), BTreeMap::new()],
            conversions: ConversionRegistry::new(),
            edges: RwLock::new(BTreeMap::new()),
        }
    }

    /// A catalog seeded with the built-in primitive pairs.
    pub fn with_primitives(config: CatalogConfig) -> Self {
        let mut catalog = Self::new(config);
        for decl in primitives::declarations(config.word_bytes) {
            catalog.types[decl.side.index()].insert(decl.name.clone(), decl);
        }
        catalog
    }

    /// Build a seeded catalog from a description, collecting registration
    /// failures instead of stopping at the first one.
    pub fn from_description(
        desc: &InterfaceDescription,
        config: CatalogConfig,
    ) -> (Self, Vec<BridgeError>) {
        let mut catalog = Self::with_primitives(config);
        let mut errors = Vec::new();

        for ty in &desc.types {
            if let Err(err) = catalog.register_type(ty.clone()) {
                warn!(error = %err, "type registration failed");
                errors.push(err);
            }
        }
        for pair in &desc.conversions {
            if let Err(err) = catalog.register_conversion(pair.clone()) {
                warn!(error = %err, "conversion registration failed");
                errors.push(err);
            }
        }

        (catalog, errors)
    }

    pub fn config(&self) -> CatalogConfig {
        self.config
    }

    /// Register a type on its declared side.
    pub fn register_type(&mut self, ty: DeclaredType) -> Result<()> {
        let side = ty.side;
        let map = &mut self.types[side.index()];
        if map.contains_key(&ty.name) {
            let cause = if primitives::is_primitive(side, ty.name.as_str()) {
                "name is a built-in primitive".to_string()
            } else {
                format!("'{}' is already registered on side {side}", ty.name)
            };
            return Err(BridgeError::duplicate(ItemId::ty(side, ty.name.clone()), cause));
        }
        debug!(side = %side, name = %ty.name, kind = %ty.kind, "registered type");
        map.insert(ty.name.clone(), ty);
        Ok(())
    }

    pub fn register_conversion(&mut self, pair: ConversionPair) -> Result<()> {
        self.conversions.register(pair)
    }

    pub fn get(&self, side: Side, name: &QualifiedName) -> Option<&DeclaredType> {
        self.types[side.index()].get(name)
    }

    pub fn contains(&self, side: Side, name: &QualifiedName) -> bool {
        self.types[side.index()].contains_key(name)
    }

    /// Registered types on one side, in name order.
    pub fn types(&self, side: Side) -> impl Iterator<Item = &DeclaredType> {
        self.types[side.index()].values()
    }

    pub fn conversions(&self) -> &ConversionRegistry {
        &self.conversions
    }

    /// Declared or derived layout of a type. `None` if the type is unknown.
    pub fn layout_of(&self, side: Side, name: &QualifiedName) -> Option<SizeClass> {
        let mut visiting = Vec::new();
        self.layout_inner(side, name, &mut visiting)
    }

    fn layout_inner(
        &self,
        side: Side,
        name: &QualifiedName,
        visiting: &mut Vec<QualifiedName>,
    ) -> Option<SizeClass> {
        let ty = self.get(side, name)?;
        if let Some(layout) = ty.layout {
            return Some(layout);
        }
        Some(
            self.derived_layout(side, ty, visiting)
                .unwrap_or(SizeClass::Opaque),
        )
    }

    /// Layout implied by a type's structure: C struct rules for records, a
    /// tagged union for optionals, results and enums. `None` for kinds with
    /// no inline structure.
    fn derived_layout(
        &self,
        side: Side,
        ty: &DeclaredType,
        visiting: &mut Vec<QualifiedName>,
    ) -> Option<SizeClass> {
        let components: Vec<&QualifiedName> = match ty.kind {
            TypeKind::Value if !ty.fields.is_empty() => {
                ty.fields.iter().map(|f| &f.ty).collect()
            }
            TypeKind::Optional => ty.element.iter().collect(),
            TypeKind::Result => ty.ok.iter().chain(ty.err.iter()).collect(),
            TypeKind::EnumWithPayload => ty
                .variants
                .iter()
                .filter_map(|v| v.payload.as_ref())
                .collect(),
            _ => return None,
        };
        if visiting.contains(&ty.name) {
            return Some(SizeClass::Opaque);
        }
        visiting.push(ty.name.clone());
        let layouts: Vec<SizeClass> = components
            .into_iter()
            .map(|c| self.component_layout(side, c, visiting))
            .collect();
        visiting.pop();
        Some(match ty.kind {
            TypeKind::Value => struct_layout(&layouts),
            _ => tagged_layout(&layouts),
        })
    }

    /// Handles embed as their fixed-size integer whatever they refer to.
    fn component_layout(
        &self,
        side: Side,
        name: &QualifiedName,
        visiting: &mut Vec<QualifiedName>,
    ) -> SizeClass {
        match self.get(side, name) {
            Some(c) if c.kind == TypeKind::OpaqueHandle => handle_layout(),
            Some(_) => self
                .layout_inner(side, name, visiting)
                .unwrap_or(SizeClass::Opaque),
            None => SizeClass::Opaque,
        }
    }

    /// A declared layout must agree with the one the type's structure
    /// implies, when both are known.
    fn check_declared_layout(&self, ty: &DeclaredType) -> std::result::Result<(), String> {
        let Some(declared @ SizeClass::Known { .. }) = ty.layout else {
            return Ok(());
        };
        match self.derived_layout(ty.side, ty, &mut Vec::new()) {
            Some(derived @ SizeClass::Known { .. }) if derived != declared => Err(format!(
                "'{}' declares layout {declared} but its {} imply {derived}",
                ty.name,
                if ty.kind == TypeKind::Value { "fields" } else { "payloads" }
            )),
            _ => Ok(()),
        }
    }

    /// The counterpart on the other side of a type declared on `side`.
    ///
    /// Follows the type's own `counterpart` link, or failing that, a unique
    /// reverse link from the other side.
    pub fn counterpart(&self, side: Side, name: &QualifiedName) -> Result<QualifiedName> {
        let item = ItemId::ty(side, name.clone());
        let ty = self.get(side, name).ok_or_else(|| {
            BridgeError::incompatible(item.clone(), format!("not declared on side {side}"))
        })?;
        let other = side.other();

        if let Some(cp) = &ty.counterpart {
            if !self.contains(other, cp) {
                return Err(BridgeError::incompatible(
                    item,
                    format!("counterpart '{cp}' is not declared on side {other}"),
                ));
            }
            return Ok(cp.clone());
        }

        let reverse: Vec<&QualifiedName> = self
            .types(other)
            .filter(|t| t.counterpart.as_ref() == Some(name))
            .map(|t| &t.name)
            .collect();
        match reverse.as_slice() {
            [only] => Ok((*only).clone()),
            [] => Err(BridgeError::incompatible(
                item,
                format!("no counterpart declared on side {other}"),
            )),
            many => Err(BridgeError::incompatible(
                item,
                format!(
                    "several side {other} types name it as counterpart: {}",
                    many.iter().map(|n| n.as_str()).collect::<Vec<_>>().join(", ")
                ),
            )),
        }
    }

    /// Resolve the edge for a type named on `side` to its counterpart.
    pub fn edge_for(&self, side: Side, name: &QualifiedName) -> Result<CompatibilityEdge> {
        let cp = self.counterpart(side, name)?;
        match side {
            Side::A => self.resolve_edge(name, &cp),
            Side::B => self.resolve_edge(&cp, name),
        }
    }

    /// An already-resolved edge, if any.
    pub fn edge(&self, a: &QualifiedName, b: &QualifiedName) -> Option<CompatibilityEdge> {
        self.edges.read().get(&(a.clone(), b.clone())).cloned()
    }

    /// Snapshot of every resolved edge, in key order.
    pub fn edges(&self) -> Vec<CompatibilityEdge> {
        self.edges.read().values().cloned().collect()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.read().len()
    }

    /// Resolve the compatibility edge between A-side type `a` and B-side
    /// type `b`, preferring the cheapest applicable transform.
    pub fn resolve_edge(&self, a: &QualifiedName, b: &QualifiedName) -> Result<CompatibilityEdge> {
        let mut visiting = Vec::new();
        self.resolve_inner(a, b, &mut visiting)
    }

    fn resolve_inner(
        &self,
        a: &QualifiedName,
        b: &QualifiedName,
        visiting: &mut Vec<EdgeKey>,
    ) -> Result<CompatibilityEdge> {
        let key = (a.clone(), b.clone());
        if let Some(edge) = self.edges.read().get(&key) {
            return Ok(edge.clone());
        }

        let item = ItemId::ty(Side::A, a.clone());
        let ta = self
            .get(Side::A, a)
            .ok_or_else(|| BridgeError::incompatible(item.clone(), "not declared on side A"))?;
        let tb = self.get(Side::B, b).ok_or_else(|| {
            BridgeError::incompatible(item.clone(), format!("'{b}' is not declared on side B"))
        })?;

        if ta.is_generic() || tb.is_generic() {
            return Err(BridgeError::rejected(
                item,
                "generic declarations are outside the supported subset",
            ));
        }
        for ty in [ta, tb] {
            self.check_declared_layout(ty)
                .map_err(|cause| BridgeError::incompatible(item.clone(), cause))?;
        }
        if visiting.contains(&key) {
            return Err(BridgeError::incompatible(
                item,
                format!("recursive layout through '{a}' without handle indirection"),
            ));
        }

        visiting.push(key.clone());
        let outcome = self.select_rule(ta, tb, visiting);
        visiting.pop();

        let edge = outcome.map_err(|reasons| BridgeError::incompatible(item, reasons))?;
        let mut edges = self.edges.write();
        let stored = edges.entry(key).or_insert(edge);
        debug!(a = %stored.a, b = %stored.b, kind = %stored.kind, "resolved compatibility edge");
        Ok(stored.clone())
    }

    /// Try each transform in preference order. On failure, returns the
    /// per-rule reasons joined into one cause.
    fn select_rule(
        &self,
        ta: &DeclaredType,
        tb: &DeclaredType,
        visiting: &mut Vec<EdgeKey>,
    ) -> std::result::Result<CompatibilityEdge, String> {
        let mut reasons = Vec::new();
        for kind in TransformKind::ALL {
            let attempt = match kind {
                TransformKind::IdentityLayout => self.identity_layout(ta, tb, visiting),
                TransformKind::OpaqueHandle => self.opaque_handle(ta, tb),
                TransformKind::StructuralCopy => self.structural_copy(ta, tb, visiting),
                TransformKind::ExplicitConversionFunction => self.explicit_conversion(ta, tb),
            };
            match attempt {
                Ok(edge) => return Ok(edge),
                Err(reason) => reasons.push(format!("{kind}: {reason}")),
            }
        }
        Err(reasons.join("; "))
    }

    fn make_edge(
        &self,
        ta: &DeclaredType,
        tb: &DeclaredType,
        kind: TransformKind,
        type_kind: TypeKind,
        wire_layout: SizeClass,
    ) -> CompatibilityEdge {
        let carries_discriminant = match type_kind {
            TypeKind::Result => ta.kind == TypeKind::Result && tb.kind == TypeKind::Result,
            TypeKind::EnumWithPayload => [ta, tb]
                .iter()
                .all(|t| t.kind == TypeKind::EnumWithPayload && t.variants.len() >= 2),
            _ => false,
        };
        CompatibilityEdge {
            a: ta.name.clone(),
            b: tb.name.clone(),
            kind,
            type_kind,
            wire_layout,
            carries_discriminant,
            holds_handles: false,
            conversion: None,
        }
    }

    /// Both endpoints are opaque handles, so the component is a bare handle
    /// on each side rather than a concrete value behind one.
    fn handle_pair(&self, a: &QualifiedName, b: &QualifiedName) -> bool {
        [(Side::A, a), (Side::B, b)].into_iter().all(|(side, name)| {
            self.get(side, name)
                .is_some_and(|t| t.kind == TypeKind::OpaqueHandle)
        })
    }

    /// Whether a component edge may sit inside an identity-layout type.
    /// Returns whether it contributes a handle.
    fn identity_component(
        &self,
        a: &QualifiedName,
        b: &QualifiedName,
        edge: &CompatibilityEdge,
    ) -> std::result::Result<bool, String> {
        match edge.kind {
            TransformKind::IdentityLayout => Ok(edge.holds_handles),
            TransformKind::OpaqueHandle if self.handle_pair(a, b) => Ok(true),
            kind => Err(format!("component '{a}' crosses by {kind}")),
        }
    }

    fn identity_layout(
        &self,
        ta: &DeclaredType,
        tb: &DeclaredType,
        visiting: &mut Vec<EdgeKey>,
    ) -> std::result::Result<CompatibilityEdge, String> {
        if ta.kind != tb.kind {
            return Err(format!("kind {} vs {}", ta.kind, tb.kind));
        }
        match ta.kind {
            TypeKind::OpaqueHandle => Err("opaque handles expose no layout".into()),
            TypeKind::Sequence | TypeKind::SharedView => {
                let (ea, eb) = element_pair(ta, tb)?;
                let element = self
                    .resolve_inner(ea, eb, visiting)
                    .map_err(|e| format!("element: {}", e.cause()))?;
                let holds_handles = self
                    .identity_component(ea, eb, &element)
                    .map_err(|_| format!("element edge is {}", element.kind))?;
                let wire = span_layout(self.config.word_bytes);
                let mut edge = self.make_edge(ta, tb, TransformKind::IdentityLayout, ta.kind, wire);
                edge.holds_handles = holds_handles;
                Ok(edge)
            }
            _ => {
                let la = self.layout_of(Side::A, &ta.name).unwrap_or(SizeClass::Opaque);
                let lb = self.layout_of(Side::B, &tb.name).unwrap_or(SizeClass::Opaque);
                match (la, lb) {
                    (SizeClass::Known { .. }, SizeClass::Known { .. }) if la == lb => {}
                    (SizeClass::Known { .. }, SizeClass::Known { .. }) => {
                        return Err(format!("size mismatch: {la} vs {lb}"));
                    }
                    _ => return Err("layout is opaque".into()),
                }
                let mut holds_handles = false;
                for (ca, cb) in component_pairs(ta, tb)? {
                    let edge = self
                        .resolve_inner(ca, cb, visiting)
                        .map_err(|e| format!("component '{ca}': {}", e.cause()))?;
                    holds_handles |= self.identity_component(ca, cb, &edge)?;
                }
                let mut edge = self.make_edge(ta, tb, TransformKind::IdentityLayout, ta.kind, la);
                edge.holds_handles = holds_handles;
                Ok(edge)
            }
        }
    }

    fn opaque_handle(
        &self,
        ta: &DeclaredType,
        tb: &DeclaredType,
    ) -> std::result::Result<CompatibilityEdge, String> {
        let a_handle = ta.kind == TypeKind::OpaqueHandle;
        let b_handle = tb.kind == TypeKind::OpaqueHandle;
        if !a_handle && !b_handle {
            return Err("neither side is an opaque handle".into());
        }
        // A concrete owner on one side must be destructible through the handle.
        for (ty, is_handle) in [(ta, a_handle), (tb, b_handle)] {
            if !is_handle && !ty.capabilities.contains(Capability::DestructibleByOwner) {
                return Err(format!("'{}' is not destructible by its owner", ty.name));
            }
        }
        for ty in [ta, tb] {
            if ty.dispatch.as_ref().is_some_and(|d| d.open) {
                return Err(format!("'{}' requires open-ended dynamic dispatch", ty.name));
            }
        }
        if let (Some(da), Some(db)) = (&ta.dispatch, &tb.dispatch) {
            if da.methods != db.methods {
                return Err("dispatch tables differ".into());
            }
        }
        Ok(self.make_edge(
            ta,
            tb,
            TransformKind::OpaqueHandle,
            TypeKind::OpaqueHandle,
            handle_layout(),
        ))
    }

    fn structural_copy(
        &self,
        ta: &DeclaredType,
        tb: &DeclaredType,
        visiting: &mut Vec<EdgeKey>,
    ) -> std::result::Result<CompatibilityEdge, String> {
        if ta.kind != tb.kind {
            return Err(format!("kind {} vs {}", ta.kind, tb.kind));
        }
        if ta.kind == TypeKind::OpaqueHandle {
            return Err("opaque handles cannot be copied".into());
        }
        for ty in [ta, tb] {
            if !ty.capabilities.is_copyable() {
                return Err(format!("'{}' is not copyable", ty.name));
            }
        }
        let pairs = match ta.kind {
            TypeKind::Sequence | TypeKind::SharedView => vec![element_pair(ta, tb)?],
            _ => component_pairs(ta, tb)?,
        };
        if pairs.is_empty() && ta.kind == TypeKind::Value {
            return Err("no fields to copy".into());
        }
        for (ca, cb) in pairs {
            let edge = self
                .resolve_inner(ca, cb, visiting)
                .map_err(|e| format!("component '{ca}': {}", e.cause()))?;
            if edge.kind == TransformKind::OpaqueHandle || edge.holds_handles {
                return Err(format!(
                    "component '{ca}' holds a handle, which a copy would duplicate"
                ));
            }
            // Views are copied element by element; anything else must be
            // copyable itself.
            for (side, name) in [(Side::A, ca), (Side::B, cb)] {
                if self
                    .get(side, name)
                    .is_some_and(|c| !c.kind.is_view_like() && !c.capabilities.is_copyable())
                {
                    return Err(format!("component '{name}' is not copyable"));
                }
            }
        }
        let wire = self.layout_of(Side::B, &tb.name).unwrap_or(SizeClass::Opaque);
        Ok(self.make_edge(ta, tb, TransformKind::StructuralCopy, ta.kind, wire))
    }

    fn explicit_conversion(
        &self,
        ta: &DeclaredType,
        tb: &DeclaredType,
    ) -> std::result::Result<CompatibilityEdge, String> {
        let pair = self
            .conversions
            .get(&ta.name, &tb.name)
            .ok_or_else(|| "no registered conversion function".to_string())?;
        let wire = self.layout_of(Side::B, &tb.name).unwrap_or(SizeClass::Opaque);
        let mut edge = self.make_edge(
            ta,
            tb,
            TransformKind::ExplicitConversionFunction,
            ta.kind,
            wire,
        );
        edge.conversion = Some(pair.clone());
        Ok(edge)
    }
}

fn element_pair<'t>(
    ta: &'t DeclaredType,
    tb: &'t DeclaredType,
) -> std::result::Result<(&'t QualifiedName, &'t QualifiedName), String> {
    match (&ta.element, &tb.element) {
        (Some(ea), Some(eb)) => Ok((ea, eb)),
        _ => Err("element type missing".into()),
    }
}

/// Positionally paired structural components of two same-kind types.
fn component_pairs<'t>(
    ta: &'t DeclaredType,
    tb: &'t DeclaredType,
) -> std::result::Result<Vec<(&'t QualifiedName, &'t QualifiedName)>, String> {
    match ta.kind {
        TypeKind::Value => {
            if ta.fields.len() != tb.fields.len() {
                return Err(format!(
                    "field count {} vs {}",
                    ta.fields.len(),
                    tb.fields.len()
                ));
            }
            Ok(ta
                .fields
                .iter()
                .zip(&tb.fields)
                .map(|(fa, fb)| (&fa.ty, &fb.ty))
                .collect())
        }
        TypeKind::Optional | TypeKind::Sequence | TypeKind::SharedView => {
            Ok(vec![element_pair(ta, tb)?])
        }
        TypeKind::Result => match (&ta.ok, &tb.ok, &ta.err, &tb.err) {
            (Some(oa), Some(ob), Some(ea), Some(eb)) => Ok(vec![(oa, ob), (ea, eb)]),
            _ => Err("result requires ok and err types".into()),
        },
        TypeKind::EnumWithPayload => {
            if ta.variants.len() != tb.variants.len() {
                return Err(format!(
                    "variant count {} vs {}",
                    ta.variants.len(),
                    tb.variants.len()
                ));
            }
            let mut pairs = Vec::new();
            for (va, vb) in ta.variants.iter().zip(&tb.variants) {
                if va.name != vb.name {
                    return Err(format!("variant '{}' vs '{}'", va.name, vb.name));
                }
                match (&va.payload, &vb.payload) {
                    (Some(pa), Some(pb)) => pairs.push((pa, pb)),
                    (None, None) => {}
                    _ => return Err(format!("variant '{}' payload mismatch", va.name)),
                }
            }
            Ok(pairs)
        }
        TypeKind::OpaqueHandle => Ok(Vec::new()),
    }
}
