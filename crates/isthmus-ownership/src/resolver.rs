//! Per-function ownership resolution.
//!
//! The resolver keeps an append-only map from (function, slot) to the
//! resolved mode. A slot is resolved once; later requests return the
//! recorded decision.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use isthmus_catalog::{align_up, TypeCatalog};
use isthmus_core::error::Result;
use isthmus_core::{
    BridgeError, Capability, DeclaredFunction, DeclaredType, ItemId, ParameterMode,
    QualifiedName, ResolvedOwnership, Side, SizeClass, TypeKind,
};

use crate::rules::{resolve_ownership, OwnershipConflict, RuleInput};

/// Position of a crossing value in a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Slot {
    Param(usize),
    Return,
}

/// Resolved ownership of one parameter or the return value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotOwnership {
    pub slot: Slot,
    /// Parameter name, or `return`.
    pub name: String,
    /// Type name on the callee side.
    pub ty: QualifiedName,
    /// Mode the value is handed over with. Returns are treated as by-value.
    pub mode: ParameterMode,
    pub ownership: ResolvedOwnership,
}

/// Every crossing value of one function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionOwnership {
    pub item: ItemId,
    pub slots: Vec<SlotOwnership>,
}

impl FunctionOwnership {
    pub fn params(&self) -> impl Iterator<Item = &SlotOwnership> {
        self.slots.iter().filter(|s| matches!(s.slot, Slot::Param(_)))
    }

    pub fn ret(&self) -> Option<&SlotOwnership> {
        self.slots.iter().find(|s| s.slot == Slot::Return)
    }

    pub fn get(&self, slot: Slot) -> Option<&SlotOwnership> {
        self.slots.iter().find(|s| s.slot == slot)
    }
}

/// Whether a return type name denotes "no value".
pub fn is_unit(side: Side, name: &QualifiedName) -> bool {
    matches!((side, name.as_str()), (Side::A, "unit" | "()") | (Side::B, "void"))
}

/// Element stride for view-like types, if the element layout is known.
pub fn element_stride(catalog: &TypeCatalog, side: Side, ty: &DeclaredType) -> Option<u64> {
    let element = ty.element.as_ref()?;
    if catalog
        .get(side, element)
        .is_some_and(|e| e.kind == TypeKind::OpaqueHandle)
    {
        return Some(8);
    }
    match catalog.layout_of(side, element)? {
        SizeClass::Known { size, align } => Some(align_up(size, align)),
        SizeClass::Opaque => None,
    }
}

/// Append-only ownership decisions for one run.
#[derive(Debug, Default)]
pub struct OwnershipResolver {
    decisions: RwLock<BTreeMap<(ItemId, Slot), ResolvedOwnership>>,
}

impl OwnershipResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// A previously recorded decision.
    pub fn get(&self, item: &ItemId, slot: Slot) -> Option<ResolvedOwnership> {
        self.decisions.read().get(&(item.clone(), slot)).copied()
    }

    pub fn len(&self) -> usize {
        self.decisions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.read().is_empty()
    }

    fn record(&self, item: &ItemId, slot: Slot, own: ResolvedOwnership) -> ResolvedOwnership {
        let mut decisions = self.decisions.write();
        *decisions.entry((item.clone(), slot)).or_insert(own)
    }

    /// Resolve every parameter and the return value of `func`.
    pub fn resolve_function(
        &self,
        catalog: &TypeCatalog,
        func: &DeclaredFunction,
    ) -> Result<FunctionOwnership> {
        let item = func.id();
        if !func.generics.is_empty() {
            return Err(BridgeError::rejected(
                item,
                "generic functions are outside the supported subset",
            ));
        }

        let mut slots = Vec::with_capacity(func.params.len() + 1);
        for (index, param) in func.params.iter().enumerate() {
            let slot = Slot::Param(index);
            let ty = self.lookup(catalog, func, &param.name, &param.ty)?;
            let input = RuleInput::new(param.mode, ty)
                .annotated(param.ownership)
                .with_stride(element_stride(catalog, func.side, ty))
                .with_bound(param.bound);
            let own = self.resolve_slot(&item, slot, &param.name, &input)?;
            slots.push(SlotOwnership {
                slot,
                name: param.name.clone(),
                ty: param.ty.clone(),
                mode: param.mode,
                ownership: own,
            });
        }

        if let Some(ret) = func.returns.as_ref().filter(|r| !is_unit(func.side, r)) {
            let ty = self.lookup(catalog, func, "return", ret)?;
            // Returns hand a value back by value: copyable plain data is
            // copied, everything else moves.
            let caps = &ty.capabilities;
            let mode = if caps.is_copyable() && !caps.contains(Capability::RefCounted) {
                ParameterMode::ByValueCopy
            } else {
                ParameterMode::ByValueMove
            };
            let input = RuleInput::new(mode, ty)
                .annotated(func.return_ownership)
                .with_stride(element_stride(catalog, func.side, ty));
            let own = self.resolve_slot(&item, Slot::Return, "return", &input)?;
            slots.push(SlotOwnership {
                slot: Slot::Return,
                name: "return".to_string(),
                ty: ret.clone(),
                mode,
                ownership: own,
            });
        }

        Ok(FunctionOwnership { item, slots })
    }

    fn lookup<'c>(
        &self,
        catalog: &'c TypeCatalog,
        func: &DeclaredFunction,
        slot_name: &str,
        ty: &QualifiedName,
    ) -> Result<&'c DeclaredType> {
        catalog.get(func.side, ty).ok_or_else(|| {
            BridgeError::incompatible(
                func.id(),
                format!(
                    "'{slot_name}' has type '{ty}', which is not declared on side {}",
                    func.side
                ),
            )
        })
    }

    fn resolve_slot(
        &self,
        item: &ItemId,
        slot: Slot,
        slot_name: &str,
        input: &RuleInput<'_>,
    ) -> Result<ResolvedOwnership> {
        if let Some(own) = self.get(item, slot) {
            return Ok(own);
        }
        let own = resolve_ownership(input).map_err(|conflict| match conflict {
            OwnershipConflict::Ambiguous(cause) => {
                BridgeError::ambiguous(item.clone(), format!("'{slot_name}': {cause}"))
            }
            OwnershipConflict::NoRule(cause) => {
                BridgeError::unrealizable(item.clone(), format!("'{slot_name}': {cause}"))
            }
        })?;
        let own = self.record(item, slot, own);
        debug!(item = %item, slot = slot_name, ownership = %own, "resolved ownership");
        Ok(own)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isthmus_catalog::CatalogConfig;
    use isthmus_core::{OwnershipMode, OwnershipRule, Parameter};
    use rayon::prelude::*;

    fn catalog() -> TypeCatalog {
        let mut cat = TypeCatalog::with_primitives(CatalogConfig::default());
        cat.register_type(DeclaredType::sequence("IntSeq", Side::B, "int32_t")).unwrap();
        cat.register_type(DeclaredType::opaque_handle("conn_t", Side::B)).unwrap();
        cat
    }

    fn sum() -> DeclaredFunction {
        DeclaredFunction::new("sum", Side::B)
            .param(Parameter::new("values", "IntSeq", ParameterMode::BorrowImmutable))
            .returning("int32_t")
    }

    #[test]
    fn resolves_sum_signature() {
        let cat = catalog();
        let resolver = OwnershipResolver::new();
        let own = resolver.resolve_function(&cat, &sum()).unwrap();
        let values = own.get(Slot::Param(0)).unwrap();
        assert_eq!(values.ownership.mode, OwnershipMode::View);
        assert_eq!(values.ownership.bound.map(|b| b.stride), Some(4));
        let ret = own.ret().unwrap();
        assert_eq!(ret.mode, ParameterMode::ByValueCopy);
        assert_eq!(ret.ownership.mode, OwnershipMode::Borrow);
        assert!(ret.ownership.by_copy);
        assert_eq!(resolver.len(), 2);
    }

    #[test]
    fn void_return_has_no_slot() {
        let cat = catalog();
        let func = DeclaredFunction::new("close", Side::B)
            .param(Parameter::new("c", "conn_t", ParameterMode::ByValueMove))
            .returning("void");
        let own = OwnershipResolver::new().resolve_function(&cat, &func).unwrap();
        assert!(own.ret().is_none());
        assert_eq!(own.params().count(), 1);
        assert_eq!(own.slots[0].ownership.mode, OwnershipMode::Transfer);
    }

    #[test]
    fn handle_return_moves() {
        let cat = catalog();
        let func = DeclaredFunction::new("open", Side::B).returning("conn_t");
        let own = OwnershipResolver::new().resolve_function(&cat, &func).unwrap();
        let ret = own.ret().unwrap();
        assert_eq!(ret.mode, ParameterMode::ByValueMove);
        assert_eq!(ret.ownership.mode, OwnershipMode::Transfer);
    }

    #[test]
    fn undeclared_type_is_incompatible() {
        let cat = catalog();
        let func = DeclaredFunction::new("f", Side::B)
            .param(Parameter::new("x", "Missing", ParameterMode::ByValueMove));
        let err = OwnershipResolver::new().resolve_function(&cat, &func).unwrap_err();
        assert_eq!(err.code(), "incompatible-type");
        assert_eq!(err.item(), &ItemId::function(Side::B, "f"));
    }

    #[test]
    fn ambiguity_reported_against_function() {
        let cat = catalog();
        let func = DeclaredFunction::new("peek", Side::B)
            .param(Parameter::new("c", "conn_t", ParameterMode::BorrowImmutable));
        let err = OwnershipResolver::new().resolve_function(&cat, &func).unwrap_err();
        assert_eq!(err.code(), "ambiguous-ownership");
        assert!(err.cause().starts_with("'c':"));
    }

    #[test]
    fn generic_function_rejected() {
        let cat = catalog();
        let mut func = sum();
        func.generics = vec!["T".into()];
        let err = OwnershipResolver::new().resolve_function(&cat, &func).unwrap_err();
        assert_eq!(err.code(), "rejected");
    }

    #[test]
    fn decisions_are_never_overwritten() {
        let cat = catalog();
        let resolver = OwnershipResolver::new();
        let item = ItemId::function(Side::B, "sum");
        let first = resolver.resolve_function(&cat, &sum()).unwrap();

        // A second resolution with a conflicting annotation returns the
        // recorded decision.
        let mut changed = sum();
        changed.params[0].ownership = Some(OwnershipMode::Borrow);
        let second = resolver.resolve_function(&cat, &changed).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            resolver.get(&item, Slot::Param(0)).map(|o| o.rule),
            Some(OwnershipRule::ViewWindow)
        );
    }

    #[test]
    fn parallel_resolution_is_consistent() {
        let cat = catalog();
        let resolver = OwnershipResolver::new();
        let funcs: Vec<DeclaredFunction> = (0..64)
            .map(|i| {
                DeclaredFunction::new(format!("sum{}", i % 8), Side::B)
                    .param(Parameter::new("values", "IntSeq", ParameterMode::BorrowImmutable))
                    .returning("int32_t")
            })
            .collect();
        let results: Vec<FunctionOwnership> = funcs
            .par_iter()
            .map(|f| resolver.resolve_function(&cat, f).unwrap())
            .collect();
        assert!(results
            .iter()
            .all(|r| r.slots[0].ownership.mode == OwnershipMode::View));
        assert_eq!(resolver.len(), 16);
    }

    #[test]
    fn stride_of_handle_elements() {
        let mut cat = catalog();
        cat.register_type(DeclaredType::sequence("Conns", Side::B, "conn_t")).unwrap();
        let ty = cat.get(Side::B, &"Conns".into()).unwrap().clone();
        assert_eq!(element_stride(&cat, Side::B, &ty), Some(8));
    }
}
