//! Signature Compatibility Checker.
//!
//! Pairs each crossing value of a function with its compatibility edge and
//! checks that the resolved ownership mode can be expressed through it.
//! Every violation in a signature is collected, not just the first.

use serde::{Deserialize, Serialize};
use tracing::debug;

use isthmus_catalog::TypeCatalog;
use isthmus_core::{
    BridgeError, CompatibilityEdge, DeclaredConstant, DeclaredFunction, Direction, ItemId,
    OwnershipMode, TransformKind,
};
use isthmus_ownership::{FunctionOwnership, Slot, SlotOwnership};

/// One crossing value with its resolved edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckedSlot {
    pub slot: SlotOwnership,
    pub edge: CompatibilityEdge,
}

impl CheckedSlot {
    pub fn name(&self) -> &str {
        &self.slot.name
    }

    pub fn mode(&self) -> OwnershipMode {
        self.slot.ownership.mode
    }
}

/// A function signature whose every crossing is realizable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckedSignature {
    pub item: ItemId,
    pub direction: Direction,
    pub fallible: bool,
    pub asynchronous: bool,
    pub slots: Vec<CheckedSlot>,
}

impl CheckedSignature {
    pub fn params(&self) -> impl Iterator<Item = &CheckedSlot> {
        self.slots
            .iter()
            .filter(|s| matches!(s.slot.slot, Slot::Param(_)))
    }

    pub fn ret(&self) -> Option<&CheckedSlot> {
        self.slots.iter().find(|s| s.slot.slot == Slot::Return)
    }
}

/// Check a function signature against the catalog's edges.
pub fn check_signature(
    catalog: &TypeCatalog,
    func: &DeclaredFunction,
    ownership: &FunctionOwnership,
) -> Result<CheckedSignature, Vec<BridgeError>> {
    let item = func.id();
    let mut errors = Vec::new();
    let mut slots = Vec::with_capacity(ownership.slots.len());

    for slot in &ownership.slots {
        let edge = match catalog.edge_for(func.side, &slot.ty) {
            Ok(edge) => edge,
            Err(err) => {
                errors.push(err.reattributed(item.clone()));
                continue;
            }
        };
        if let Err(cause) = realizable(catalog, func, slot, &edge) {
            errors.push(BridgeError::unrealizable(
                item.clone(),
                format!("'{}': {cause}", slot.name),
            ));
            continue;
        }
        slots.push(CheckedSlot {
            slot: slot.clone(),
            edge,
        });
    }

    if func.fallible {
        if let Err(cause) = failure_channel(ownership, &slots) {
            errors.push(BridgeError::unmapped_failure(item.clone(), cause));
        }
    }

    if !errors.is_empty() {
        debug!(item = %item, errors = errors.len(), "signature check failed");
        return Err(errors);
    }
    Ok(CheckedSignature {
        item,
        direction: func.direction(),
        fallible: func.fallible,
        asynchronous: func.asynchronous,
        slots,
    })
}

/// Whether `slot`'s ownership mode can be expressed through `edge`.
fn realizable(
    catalog: &TypeCatalog,
    func: &DeclaredFunction,
    slot: &SlotOwnership,
    edge: &CompatibilityEdge,
) -> Result<(), String> {
    let own = &slot.ownership;
    if own.by_copy && edge.holds_handles {
        return Err(format!(
            "copying '{}' would give the handles it holds a second owner",
            slot.ty
        ));
    }
    match own.mode {
        OwnershipMode::Transfer => {
            if edge.type_kind.is_view_like() && edge.holds_handles {
                return Err(format!(
                    "'{}' crosses as a lent region, which cannot move the handles it holds",
                    slot.ty
                ));
            }
            if edge.kind.source_retains_copy() {
                return Err(format!(
                    "Transfer is inexpressible through a {} edge: the source retains its own copy",
                    edge.kind
                ));
            }
        }
        OwnershipMode::Borrow => {
            if own.mutable {
                if matches!(
                    edge.kind,
                    TransformKind::StructuralCopy | TransformKind::ExplicitConversionFunction
                ) {
                    return Err(format!(
                        "mutable borrow through a {} edge leaves two live representations",
                        edge.kind
                    ));
                }
                let shared = catalog
                    .get(func.side, &slot.ty)
                    .is_some_and(|t| t.capabilities.is_shared_ref_counted());
                if shared {
                    return Err(format!(
                        "mutable borrow of shared reference-counted '{}' aliases other holders",
                        slot.ty
                    ));
                }
            }
        }
        OwnershipMode::Share => {
            if edge.kind != TransformKind::OpaqueHandle {
                return Err(format!(
                    "Share needs an opaque-handle edge to carry the count, found {}",
                    edge.kind
                ));
            }
        }
        OwnershipMode::View => {
            if edge.kind != TransformKind::IdentityLayout {
                return Err(format!(
                    "View needs elements readable in place, found a {} edge",
                    edge.kind
                ));
            }
            if own.bound.is_none() {
                return Err("View has no element bound".to_string());
            }
        }
    }
    Ok(())
}

fn failure_channel(ownership: &FunctionOwnership, slots: &[CheckedSlot]) -> Result<(), String> {
    if ownership.ret().is_none() {
        return Err("fallible function declares no result type".to_string());
    }
    match slots.iter().find(|s| s.slot.slot == Slot::Return) {
        // The return edge already failed and was reported.
        None => Ok(()),
        Some(ret) if ret.edge.carries_discriminant => Ok(()),
        Some(ret) => Err(format!(
            "result type '{}' crosses as {} without a success/failure discriminant",
            ret.slot.ty, ret.edge.type_kind
        )),
    }
}

/// Constants must cross by identity layout.
pub fn check_constant(
    catalog: &TypeCatalog,
    constant: &DeclaredConstant,
) -> Result<CompatibilityEdge, BridgeError> {
    let item = constant.id();
    let edge = catalog
        .edge_for(constant.side, &constant.ty)
        .map_err(|e| e.reattributed(item.clone()))?;
    if edge.kind != TransformKind::IdentityLayout {
        return Err(BridgeError::unrealizable(
            item,
            format!("constants need an identity-layout type, '{}' is {}", constant.ty, edge.kind),
        ));
    }
    Ok(edge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use isthmus_catalog::CatalogConfig;
    use isthmus_core::types::Field;
    use isthmus_core::{
        Capability, ConstValue, DeclaredType, Parameter, ParameterMode, QualifiedName, Side,
        TypeKind,
    };
    use isthmus_ownership::OwnershipResolver;

    fn catalog() -> TypeCatalog {
        let mut cat = TypeCatalog::with_primitives(CatalogConfig::default());
        cat.register_type(DeclaredType::sequence("Int32Slice", Side::A, "i32")).unwrap();
        cat.register_type(
            DeclaredType::sequence("IntSeq", Side::B, "int32_t").with_counterpart("Int32Slice"),
        )
        .unwrap();
        // A copyable record that only crosses by structural copy.
        for (side, name, int, seq) in [
            (Side::A, "Record", "i32", "Int32Slice"),
            (Side::B, "record_t", "int32_t", "IntSeq"),
        ] {
            let mut ty = DeclaredType::new(name, side, TypeKind::Value)
                .with_capabilities(&[Capability::Copyable, Capability::Movable])
                .with_fields(vec![Field::new("id", int), Field::new("items", seq)]);
            if side == Side::A {
                ty = ty.with_counterpart("record_t");
            }
            cat.register_type(ty).unwrap();
        }
        cat.register_type(
            DeclaredType::opaque_handle("Counter", Side::A)
                .with_capabilities(&[Capability::RefCounted, Capability::ThreadShareable])
                .with_counterpart("counter_t"),
        )
        .unwrap();
        cat.register_type(DeclaredType::opaque_handle("counter_t", Side::B)).unwrap();
        cat.register_type(
            DeclaredType::result("Status", Side::B, "int32_t", "uint32_t")
                .with_capabilities(&[Capability::Copyable, Capability::Movable])
                .with_counterpart("StatusA"),
        )
        .unwrap();
        cat.register_type(
            DeclaredType::result("StatusA", Side::A, "i32", "u32")
                .with_capabilities(&[Capability::Copyable, Capability::Movable]),
        )
        .unwrap();
        cat.register_type(DeclaredType::opaque_handle("Db", Side::A).with_counterpart("db_t"))
            .unwrap();
        cat.register_type(DeclaredType::opaque_handle("db_t", Side::B)).unwrap();
        // Results carrying a handle: one move-only, one declared copyable.
        for (a, b, caps) in [
            ("OpenResult", "open_result_t", &[Capability::Movable][..]),
            (
                "OpenCopy",
                "open_copy_t",
                &[Capability::Copyable, Capability::Movable][..],
            ),
        ] {
            cat.register_type(
                DeclaredType::result(a, Side::A, "Db", "i32")
                    .with_capabilities(caps)
                    .with_counterpart(b),
            )
            .unwrap();
            cat.register_type(
                DeclaredType::result(b, Side::B, "db_t", "int32_t").with_capabilities(caps),
            )
            .unwrap();
        }
        cat
    }

    fn check(
        cat: &TypeCatalog,
        func: &DeclaredFunction,
    ) -> Result<CheckedSignature, Vec<BridgeError>> {
        let own = OwnershipResolver::new().resolve_function(cat, func).unwrap();
        check_signature(cat, func, &own)
    }

    #[test]
    fn sum_signature_checks() {
        let cat = catalog();
        let func = DeclaredFunction::new("sum", Side::B)
            .param(Parameter::new("values", "IntSeq", ParameterMode::BorrowImmutable))
            .returning("int32_t");
        let sig = check(&cat, &func).unwrap();
        assert_eq!(sig.direction, Direction::AToB);
        let values = sig.params().next().unwrap();
        assert_eq!(values.mode(), OwnershipMode::View);
        assert_eq!(values.edge.kind, TransformKind::IdentityLayout);
        assert!(sig.ret().is_some());
    }

    #[test]
    fn transfer_through_structural_copy_is_unrealizable() {
        let cat = catalog();
        let func = DeclaredFunction::new("store", Side::B)
            .param(Parameter::new("r", "record_t", ParameterMode::ByValueMove));
        let errors = check(&cat, &func).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code(), "unrealizable-ownership");
        assert!(errors[0].cause().contains("source retains its own copy"));
    }

    #[test]
    fn copy_through_structural_copy_is_fine() {
        let cat = catalog();
        let func = DeclaredFunction::new("store", Side::B)
            .param(Parameter::new("r", "record_t", ParameterMode::ByValueCopy));
        assert!(check(&cat, &func).is_ok());
    }

    #[test]
    fn mutable_borrow_through_copy_aliases() {
        let cat = catalog();
        let func = DeclaredFunction::new("edit", Side::B)
            .param(Parameter::new("r", "record_t", ParameterMode::BorrowMutable));
        let errors = check(&cat, &func).unwrap_err();
        assert!(errors[0].cause().contains("two live representations"));
    }

    #[test]
    fn mutable_borrow_of_shared_count_aliases() {
        let cat = catalog();
        let func = DeclaredFunction::new("reset", Side::A)
            .param(Parameter::new("c", "Counter", ParameterMode::BorrowMutable));
        let errors = check(&cat, &func).unwrap_err();
        assert!(errors[0].cause().contains("aliases other holders"));
    }

    #[test]
    fn share_through_handle() {
        let cat = catalog();
        let func = DeclaredFunction::new("watch", Side::A)
            .param(Parameter::new("c", "Counter", ParameterMode::ByValueCopy));
        let sig = check(&cat, &func).unwrap();
        assert_eq!(sig.slots[0].mode(), OwnershipMode::Share);
        assert_eq!(sig.direction, Direction::BToA);
    }

    #[test]
    fn fallible_without_discriminant_is_unmapped() {
        let cat = catalog();
        let func = DeclaredFunction::new("parse", Side::B)
            .returning("int32_t")
            .fallible();
        let errors = check(&cat, &func).unwrap_err();
        assert_eq!(errors[0].code(), "unmapped-failure-channel");

        let no_result = DeclaredFunction::new("flush", Side::B).fallible();
        let errors = check(&cat, &no_result).unwrap_err();
        assert!(errors[0].cause().contains("no result type"));
    }

    #[test]
    fn fallible_with_result_passes() {
        let cat = catalog();
        let func = DeclaredFunction::new("parse", Side::B)
            .returning("Status")
            .fallible();
        let sig = check(&cat, &func).unwrap();
        assert!(sig.fallible);
        assert!(sig.ret().unwrap().edge.carries_discriminant);
    }

    #[test]
    fn fallible_result_holding_a_handle_passes() {
        let cat = catalog();
        let func = DeclaredFunction::new("db_open_checked", Side::B)
            .param(Parameter::new("path", "int32_t", ParameterMode::ByValueCopy))
            .returning("open_result_t")
            .fallible();
        let sig = check(&cat, &func).unwrap();
        let ret = sig.ret().unwrap();
        assert_eq!(ret.mode(), OwnershipMode::Transfer);
        assert_eq!(ret.edge.kind, TransformKind::IdentityLayout);
        assert!(ret.edge.holds_handles);
        assert!(ret.edge.carries_discriminant);
    }

    #[test]
    fn copying_a_value_that_holds_handles_is_unrealizable() {
        let cat = catalog();
        let func = DeclaredFunction::new("keep", Side::B)
            .param(Parameter::new("r", "open_copy_t", ParameterMode::ByValueCopy));
        let errors = check(&cat, &func).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].code(), "unrealizable-ownership");
        assert!(errors[0].cause().contains("second owner"), "{}", errors[0].cause());

        // Copyable returns are copied too.
        let func = DeclaredFunction::new("peek", Side::B).returning("open_copy_t");
        assert_eq!(check(&cat, &func).unwrap_err()[0].code(), "unrealizable-ownership");

        // Moving it hands the handle over instead.
        let func = DeclaredFunction::new("keep", Side::B)
            .param(Parameter::new("r", "open_copy_t", ParameterMode::ByValueMove));
        assert!(check(&cat, &func).is_ok());
    }

    #[test]
    fn moving_a_sequence_of_handles_is_unrealizable() {
        let mut cat = catalog();
        cat.register_type(DeclaredType::sequence("DbList", Side::A, "Db").with_counterpart("db_list_t"))
            .unwrap();
        cat.register_type(DeclaredType::sequence("db_list_t", Side::B, "db_t")).unwrap();
        let edge = cat.edge_for(Side::A, &QualifiedName::new("DbList")).unwrap();
        assert!(edge.holds_handles);

        let func = DeclaredFunction::new("close_all", Side::B)
            .param(Parameter::new("dbs", "db_list_t", ParameterMode::ByValueMove));
        let errors = check(&cat, &func).unwrap_err();
        assert!(
            errors.iter().any(|e| e.code() == "unrealizable-ownership"
                && e.cause().contains("cannot move the handles")),
            "{errors:?}"
        );
    }

    #[test]
    fn all_violations_are_collected() {
        let cat = catalog();
        let func = DeclaredFunction::new("bad", Side::B)
            .param(Parameter::new("r", "record_t", ParameterMode::ByValueMove))
            .param(Parameter::new("s", "record_t", ParameterMode::BorrowMutable))
            .returning("int32_t")
            .fallible();
        let errors = check(&cat, &func).unwrap_err();
        let codes: Vec<&str> = errors.iter().map(|e| e.code()).collect();
        assert_eq!(
            codes,
            vec![
                "unrealizable-ownership",
                "unrealizable-ownership",
                "unmapped-failure-channel"
            ]
        );
    }

    #[test]
    fn missing_counterpart_is_reattributed() {
        let mut cat = catalog();
        cat.register_type(DeclaredType::opaque_handle("orphan_t", Side::B)).unwrap();
        let func = DeclaredFunction::new("take", Side::B)
            .param(Parameter::new("o", "orphan_t", ParameterMode::ByValueMove));
        let errors = check(&cat, &func).unwrap_err();
        assert_eq!(errors[0].code(), "incompatible-type");
        assert_eq!(errors[0].item(), &ItemId::function(Side::B, "take"));
    }

    #[test]
    fn constants_need_identity_layout() {
        let cat = catalog();
        let ok = DeclaredConstant {
            name: "MAX".into(),
            side: Side::B,
            ty: "int32_t".into(),
            value: ConstValue::Int(64),
        };
        assert_eq!(
            check_constant(&cat, &ok).unwrap().kind,
            TransformKind::IdentityLayout
        );
        let bad = DeclaredConstant {
            name: "DEFAULT".into(),
            side: Side::B,
            ty: "record_t".into(),
            value: ConstValue::Int(0),
        };
        assert_eq!(check_constant(&cat, &bad).unwrap_err().code(), "unrealizable-ownership");
    }
}
