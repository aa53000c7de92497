//! Glue plans.
//!
//! A plan is everything the two renderers and the executor need about one
//! item: both sides' spellings, the edge each value crosses, its resolved
//! ownership and the guard the verifier mandated. Both artifacts of a pair
//! are rendered from the same plan, so they cannot disagree.

use serde::Serialize;

use isthmus_catalog::{native_spelling, TypeCatalog};
use isthmus_core::{
    Capability, CompatibilityEdge, ConstValue, ConversionPair, DeclaredConstant, DeclaredType,
    Direction, Finding, Guard, ItemId, OwnershipMode, QualifiedName, ResolvedOwnership, Side,
    TransformKind, TypeKind,
};
use isthmus_ownership::{element_stride, Slot};
use isthmus_verify::{CheckedSignature, CheckedSlot};

use crate::error::{CodegenError, Result};

/// Code generation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodegenConfig {
    /// Prefix of every exported glue symbol and of the runtime header.
    pub runtime_prefix: String,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            runtime_prefix: "isthmus".to_string(),
        }
    }
}

impl CodegenConfig {
    pub fn symbol(&self, name: &QualifiedName) -> String {
        format!("{}_{}", self.runtime_prefix, name.mangled())
    }
}

/// How a value is represented while it crosses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WireShape {
    /// The bytes themselves (identity layout or structural copy).
    Direct,
    /// Passed through the registered conversion functions.
    Converted,
    /// The value already lives in the handle table.
    Handle,
    /// Lent into the handle table for the duration of a borrow.
    Lent,
    /// A lent region plus an element count.
    Span,
}

/// A type spelled on both sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Spelled {
    pub a: String,
    pub b: String,
}

/// Element of a view or sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ElementPlan {
    pub a_type: QualifiedName,
    pub b_type: QualifiedName,
    pub spelled: Spelled,
    pub stride: u64,
}

/// One crossing value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotPlan {
    pub slot: Slot,
    pub name: String,
    pub a_type: QualifiedName,
    pub b_type: QualifiedName,
    pub spelled: Spelled,
    pub transform: TransformKind,
    pub type_kind: TypeKind,
    pub ownership: ResolvedOwnership,
    pub shape: WireShape,
    /// Size of the B representation, when known.
    pub size: Option<u64>,
    pub element: Option<ElementPlan>,
    pub conversion: Option<ConversionPair>,
    /// Handles are embedded somewhere in the value.
    pub holds_handles: bool,
    pub guard: Option<Guard>,
}

impl SlotPlan {
    pub fn mode(&self) -> OwnershipMode {
        self.ownership.mode
    }

    /// The value is itself a handle or carries handles, and it moves.
    pub fn transfers_handles(&self) -> bool {
        self.mode() == OwnershipMode::Transfer
            && (self.shape == WireShape::Handle || self.holds_handles)
    }

    pub fn mutable(&self) -> bool {
        self.ownership.mutable
    }

    /// Type tag recorded in the handle table for this value.
    pub fn tag(&self) -> &str {
        self.a_type.as_str()
    }
}

/// The error half of a fallible function's result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailurePlan {
    pub a_type: QualifiedName,
    pub b_type: QualifiedName,
    pub spelled: Spelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionPlan {
    pub item: ItemId,
    /// Name of the native function on the callee side.
    pub native: String,
    /// Exported glue symbol.
    pub symbol: String,
    pub direction: Direction,
    pub fallible: bool,
    pub params: Vec<SlotPlan>,
    /// Success value; `None` for unit.
    pub ret: Option<SlotPlan>,
    pub failure: Option<FailurePlan>,
}

impl FunctionPlan {
    pub fn callee(&self) -> Side {
        self.direction.callee()
    }

    pub fn guards(&self) -> impl Iterator<Item = &Guard> {
        self.params
            .iter()
            .chain(self.ret.iter())
            .filter_map(|s| s.guard.as_ref())
    }

    pub fn shared(&self) -> impl Iterator<Item = &SlotPlan> {
        self.params.iter().filter(|s| s.mode() == OwnershipMode::Share)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConstantPlan {
    pub item: ItemId,
    pub symbol: String,
    pub name: String,
    pub spelled: Spelled,
    pub value: ConstValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldPlan {
    pub name: String,
    pub spelled: Spelled,
    /// The field crosses as a handle.
    pub handle: bool,
    /// The field is a composite with handles inside.
    pub holds_handles: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantPlan {
    pub name: String,
    pub payload: Option<Spelled>,
    pub handle: bool,
    pub holds_handles: bool,
}

impl VariantPlan {
    pub fn moves_handles(&self) -> bool {
        self.handle || self.holds_handles
    }
}

impl FieldPlan {
    pub fn moves_handles(&self) -> bool {
        self.handle || self.holds_handles
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypePlan {
    pub item: ItemId,
    pub edge: CompatibilityEdge,
    pub spelled: Spelled,
    /// Flat symbol usable on both sides.
    pub symbol: String,
    pub size: Option<u64>,
    pub align: Option<u64>,
    pub fields: Vec<FieldPlan>,
    pub element: Option<ElementPlan>,
    /// Discriminated alternatives in tag order: enum variants, `None`/`Some`
    /// for optionals, `Ok`/`Err` for results.
    pub variants: Vec<VariantPlan>,
    /// Closed method list of a dispatch block.
    pub vtable: Vec<String>,
    pub ref_counted: bool,
    pub thread_shareable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "plan", rename_all = "kebab-case")]
pub enum GluePlan {
    Function(FunctionPlan),
    Constant(ConstantPlan),
    Type(TypePlan),
}

impl GluePlan {
    pub fn item(&self) -> &ItemId {
        match self {
            Self::Function(p) => &p.item,
            Self::Constant(p) => &p.item,
            Self::Type(p) => &p.item,
        }
    }
}

fn spell(catalog: &TypeCatalog, a: &QualifiedName, b: &QualifiedName) -> Spelled {
    Spelled {
        a: native_spelling(catalog, Side::A, a),
        b: native_spelling(catalog, Side::B, b),
    }
}

fn shape_of(edge: &CompatibilityEdge, own: &ResolvedOwnership) -> WireShape {
    match own.mode {
        OwnershipMode::View => WireShape::Span,
        OwnershipMode::Transfer
            if edge.type_kind.is_view_like() && edge.kind == TransformKind::IdentityLayout =>
        {
            WireShape::Span
        }
        OwnershipMode::Borrow if !own.by_copy => {
            if edge.kind == TransformKind::OpaqueHandle {
                WireShape::Handle
            } else {
                WireShape::Lent
            }
        }
        _ => match edge.kind {
            TransformKind::IdentityLayout | TransformKind::StructuralCopy => WireShape::Direct,
            TransformKind::OpaqueHandle => WireShape::Handle,
            TransformKind::ExplicitConversionFunction => WireShape::Converted,
        },
    }
}

fn element_plan(catalog: &TypeCatalog, edge: &CompatibilityEdge) -> Option<ElementPlan> {
    let a = catalog.get(Side::A, &edge.a)?;
    let b = catalog.get(Side::B, &edge.b)?;
    if !a.kind.is_view_like() {
        return None;
    }
    let a_type = a.element.clone()?;
    let b_type = b.element.clone()?;
    let stride = element_stride(catalog, Side::B, b)?;
    Some(ElementPlan {
        spelled: spell(catalog, &a_type, &b_type),
        a_type,
        b_type,
        stride,
    })
}

fn slot_plan(catalog: &TypeCatalog, checked: &CheckedSlot, guard: Option<Guard>) -> SlotPlan {
    let edge = &checked.edge;
    SlotPlan {
        slot: checked.slot.slot,
        name: checked.slot.name.clone(),
        a_type: edge.a.clone(),
        b_type: edge.b.clone(),
        spelled: spell(catalog, &edge.a, &edge.b),
        transform: edge.kind,
        type_kind: edge.type_kind,
        ownership: checked.slot.ownership,
        shape: shape_of(edge, &checked.slot.ownership),
        size: edge.wire_layout.size(),
        element: element_plan(catalog, edge),
        conversion: edge.conversion.clone(),
        holds_handles: edge.holds_handles,
        guard,
    }
}

/// Split a fallible return into its success slot and failure half.
fn split_result(
    catalog: &TypeCatalog,
    item: &ItemId,
    ret: SlotPlan,
) -> Result<(Option<SlotPlan>, Option<FailurePlan>)> {
    if ret.type_kind != TypeKind::Result {
        return Ok((Some(ret), None));
    }
    let unrenderable = |detail: String| CodegenError::Unrenderable {
        item: item.clone(),
        detail,
    };
    let a = catalog
        .get(Side::A, &ret.a_type)
        .ok_or_else(|| unrenderable(format!("'{}' is not declared", ret.a_type)))?;
    let b = catalog
        .get(Side::B, &ret.b_type)
        .ok_or_else(|| unrenderable(format!("'{}' is not declared", ret.b_type)))?;
    let (Some(a_ok), Some(b_ok)) = (a.ok.clone(), b.ok.clone()) else {
        return Err(unrenderable(format!("'{}' has no success type", ret.a_type)));
    };

    let failure = match (a.err.clone(), b.err.clone()) {
        (Some(a_err), Some(b_err)) => Some(FailurePlan {
            spelled: spell(catalog, &a_err, &b_err),
            a_type: a_err,
            b_type: b_err,
        }),
        _ => None,
    };

    if matches!(a_ok.as_str(), "unit" | "()") {
        return Ok((None, failure));
    }
    let ok_edge = catalog
        .resolve_edge(&a_ok, &b_ok)
        .map_err(|e| unrenderable(e.cause().to_string()))?;
    let ok = SlotPlan {
        a_type: a_ok.clone(),
        b_type: b_ok.clone(),
        spelled: spell(catalog, &a_ok, &b_ok),
        transform: ok_edge.kind,
        type_kind: ok_edge.type_kind,
        shape: shape_of(&ok_edge, &ret.ownership),
        size: ok_edge.wire_layout.size(),
        element: element_plan(catalog, &ok_edge),
        conversion: ok_edge.conversion.clone(),
        holds_handles: ok_edge.holds_handles,
        ..ret
    };
    Ok((Some(ok), failure))
}

/// Plan the glue pair for a verified function.
pub fn plan_function(
    catalog: &TypeCatalog,
    sig: &CheckedSignature,
    finding: &Finding,
    config: &CodegenConfig,
) -> Result<FunctionPlan> {
    if let Finding::Rejected(reason) = finding {
        return Err(CodegenError::Unrenderable {
            item: sig.item.clone(),
            detail: format!("verification rejected it: {reason}"),
        });
    }
    let guard_for = |name: &str| finding.guards().iter().find(|g| g.value() == name).cloned();

    let params = sig
        .params()
        .map(|slot| slot_plan(catalog, slot, guard_for(slot.name())))
        .collect();
    let ret = sig
        .ret()
        .map(|slot| slot_plan(catalog, slot, guard_for(slot.name())));
    let (ret, failure) = match ret {
        Some(ret) if sig.fallible => split_result(catalog, &sig.item, ret)?,
        other => (other, None),
    };

    Ok(FunctionPlan {
        item: sig.item.clone(),
        native: sig.item.name.mangled(),
        symbol: config.symbol(&sig.item.name),
        direction: sig.direction,
        fallible: sig.fallible,
        params,
        ret,
        failure,
    })
}

/// Plan a constant. The edge must already be checked.
pub fn plan_constant(
    catalog: &TypeCatalog,
    constant: &DeclaredConstant,
    edge: &CompatibilityEdge,
    config: &CodegenConfig,
) -> ConstantPlan {
    ConstantPlan {
        item: constant.id(),
        symbol: config.symbol(&constant.name),
        name: constant.name.mangled(),
        spelled: spell(catalog, &edge.a, &edge.b),
        value: constant.value,
    }
}

/// Plan the declarations for a type pair.
pub fn plan_type(
    catalog: &TypeCatalog,
    ty: &DeclaredType,
    config: &CodegenConfig,
) -> Result<TypePlan> {
    let item = ItemId::ty(ty.side, ty.name.clone());
    let unrenderable = |detail: String| CodegenError::Unrenderable {
        item: item.clone(),
        detail,
    };
    let edge = catalog
        .edge_for(ty.side, &ty.name)
        .map_err(|e| unrenderable(e.cause().to_string()))?;
    let a = catalog
        .get(Side::A, &edge.a)
        .ok_or_else(|| unrenderable(format!("'{}' is not declared on side A", edge.a)))?;
    let b = catalog
        .get(Side::B, &edge.b)
        .ok_or_else(|| unrenderable(format!("'{}' is not declared on side B", edge.b)))?;

    let is_handle = |name: &QualifiedName| {
        catalog
            .get(Side::B, name)
            .is_some_and(|t| t.kind == TypeKind::OpaqueHandle)
    };
    let nested = |x: &QualifiedName, y: &QualifiedName| {
        catalog
            .resolve_edge(x, y)
            .is_ok_and(|e| e.holds_handles)
    };
    let fields = a
        .fields
        .iter()
        .zip(&b.fields)
        .map(|(fa, fb)| FieldPlan {
            name: fb.name.clone(),
            spelled: spell(catalog, &fa.ty, &fb.ty),
            handle: is_handle(&fb.ty),
            holds_handles: nested(&fa.ty, &fb.ty),
        })
        .collect();
    let variant = |name: &str, x: &Option<QualifiedName>, y: &Option<QualifiedName>| match (x, y) {
        (Some(x), Some(y)) => VariantPlan {
            name: name.to_string(),
            payload: Some(spell(catalog, x, y)),
            handle: is_handle(y),
            holds_handles: nested(x, y),
        },
        _ => VariantPlan {
            name: name.to_string(),
            payload: None,
            handle: false,
            holds_handles: false,
        },
    };
    let variants = match a.kind {
        TypeKind::EnumWithPayload => a
            .variants
            .iter()
            .zip(&b.variants)
            .map(|(va, vb)| variant(&va.name, &va.payload, &vb.payload))
            .collect(),
        TypeKind::Optional => vec![
            variant("None", &None, &None),
            variant("Some", &a.element, &b.element),
        ],
        TypeKind::Result => vec![
            variant("Ok", &a.ok, &b.ok),
            variant("Err", &a.err, &b.err),
        ],
        _ => Vec::new(),
    };
    let vtable = a
        .dispatch
        .as_ref()
        .or(b.dispatch.as_ref())
        .map(|d| d.methods.clone())
        .unwrap_or_default();

    Ok(TypePlan {
        item,
        spelled: spell(catalog, &edge.a, &edge.b),
        symbol: config.symbol(&edge.a),
        size: edge.wire_layout.size(),
        align: edge.wire_layout.align(),
        fields,
        element: element_plan(catalog, &edge),
        variants,
        vtable,
        ref_counted: a.capabilities.contains(Capability::RefCounted),
        thread_shareable: a.capabilities.is_thread_shareable(),
        edge,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn view_param_plans_as_span_with_guard() {
        let fixture = testing::fixture();
        let plan = fixture.function_plan("sum");
        assert_eq!(plan.symbol, "isthmus_sum");
        assert_eq!(plan.direction, Direction::AToB);
        let values = &plan.params[0];
        assert_eq!(values.shape, WireShape::Span);
        assert_eq!(values.element.as_ref().unwrap().stride, 4);
        assert_eq!(values.element.as_ref().unwrap().spelled.b, "int32_t");
        assert_eq!(values.guard.as_ref().unwrap().label(), "bounds-check");
        assert_eq!(plan.ret.as_ref().unwrap().spelled.a, "i32");
        assert_eq!(plan.guards().count(), 1);
    }

    #[test]
    fn fallible_result_is_split() {
        let fixture = testing::fixture();
        let plan = fixture.function_plan("parse_port");
        assert!(plan.fallible);
        let ret = plan.ret.as_ref().unwrap();
        assert_eq!(ret.spelled.b, "uint16_t");
        assert_eq!(ret.shape, WireShape::Direct);
        assert_eq!(plan.failure.as_ref().unwrap().spelled.b, "int32_t");
    }

    #[test]
    fn handle_shapes() {
        let fixture = testing::fixture();
        let close = fixture.function_plan("db_close");
        assert_eq!(close.params[0].shape, WireShape::Handle);
        assert_eq!(close.params[0].mode(), OwnershipMode::Transfer);
        assert!(close.ret.is_none());

        let watch = fixture.function_plan("watch");
        assert_eq!(watch.shared().count(), 1);
    }

    #[test]
    fn rejected_finding_is_not_planned() {
        let fixture = testing::fixture();
        let sig = fixture.signature("sum");
        let err = plan_function(
            &fixture.catalog,
            &sig,
            &Finding::Rejected("nope".into()),
            &CodegenConfig::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("verification rejected it"));
    }

    #[test]
    fn type_plan_carries_fields_and_vtable() {
        let fixture = testing::fixture();
        let point = fixture.type_plan(Side::A, "Point");
        assert_eq!(point.spelled.b, "struct point_t");
        assert_eq!(point.fields.len(), 2);
        assert_eq!(point.size, Some(16));

        let db = fixture.type_plan(Side::A, "Db");
        assert_eq!(db.vtable, vec!["query".to_string(), "close".to_string()]);
        assert_eq!(db.edge.kind, TransformKind::OpaqueHandle);
    }

    #[test]
    fn returned_handles_transfer() {
        let fixture = testing::fixture();
        let open = fixture.function_plan("db_open");
        let ret = open.ret.as_ref().unwrap();
        assert_eq!(ret.shape, WireShape::Handle);
        assert!(ret.transfers_handles());

        let checked = fixture.function_plan("db_open_checked");
        let ret = checked.ret.as_ref().unwrap();
        assert_eq!(ret.spelled.b, "isthmus_handle_t");
        assert_eq!(ret.shape, WireShape::Handle);
        assert!(ret.transfers_handles());
        assert_eq!(checked.failure.as_ref().unwrap().spelled.b, "int32_t");
    }

    #[test]
    fn embedded_handles_are_planned() {
        let fixture = testing::fixture();
        let entry = fixture.type_plan(Side::A, "Entry");
        assert_eq!(entry.edge.kind, TransformKind::IdentityLayout);
        assert!(entry.edge.holds_handles);
        assert!(entry.fields[0].handle);
        assert!(!entry.fields[1].moves_handles());

        let swap = fixture.function_plan("swap_entry");
        assert_eq!(swap.params[0].shape, WireShape::Direct);
        assert!(swap.params[0].transfers_handles());
        assert!(swap.ret.as_ref().unwrap().transfers_handles());

        let result = fixture.type_plan(Side::A, "OpenResult");
        assert!(result.variants[0].handle);
        assert!(!result.variants[1].moves_handles());

        let point = fixture.type_plan(Side::A, "Point");
        assert!(point.fields.iter().all(|f| !f.moves_handles()));
    }
}
