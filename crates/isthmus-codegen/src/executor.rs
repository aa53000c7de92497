//! In-process execution of function glue.
//!
//! [`GlueExecutor`] runs a [`FunctionPlan`] with the same steps its
//! compiled artifacts take. The caller half lowers arguments to the wire,
//! lends regions and transfers handles. The callee half opens guards and
//! scopes inside the panic boundary, calls the bound native implementation,
//! writes mutable borrows back and releases everything on every exit path.
//! Failures come back through the error channel.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use isthmus_catalog::TypeCatalog;
use isthmus_core::{BoundCount, CompatibilityEdge, Guard, OwnershipMode, Side};
use isthmus_runtime::{
    catch_boundary, from_error_code, raise_error, BorrowScope, ChannelResult, Discriminant,
    ErrorChannelValue, Handle, HandleTable, RuntimeError, ShareScope,
};

use crate::abi;
use crate::error::{CodegenError, Result};
use crate::plan::{FunctionPlan, SlotPlan, WireShape};
use crate::value::{Conversions, Marshaler, Value};

/// How a native implementation reports failure.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeError {
    /// A typed failure value of the declared error type.
    Failure(Value),
    /// A nonzero C status code.
    Code(i32),
}

/// Result of a native implementation. Fallible functions return their
/// success value directly.
pub type NativeResult = std::result::Result<Value, NativeError>;

pub type NativeFn = Arc<dyn Fn(&mut [Value]) -> NativeResult + Send + Sync>;

/// A value in wire form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Wire {
    Bytes(Vec<u8>),
    Handle(Handle),
    Span { handle: Handle, len: usize },
}

/// A completed call. `args` carries what the callee wrote through mutable
/// borrows.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    pub value: Value,
    pub args: Vec<Value>,
}

fn hazard(err: CodegenError) -> ErrorChannelValue {
    match err {
        CodegenError::Channel(value) => value,
        other => raise_error(Discriminant::Hazard, other.to_string()),
    }
}

pub struct GlueExecutor<'a> {
    catalog: &'a TypeCatalog,
    table: &'a HandleTable,
    conversions: Conversions,
    plans: BTreeMap<String, FunctionPlan>,
    natives: BTreeMap<String, NativeFn>,
}

impl<'a> GlueExecutor<'a> {
    pub fn new(catalog: &'a TypeCatalog, table: &'a HandleTable) -> Self {
        Self {
            catalog,
            table,
            conversions: Conversions::new(),
            plans: BTreeMap::new(),
            natives: BTreeMap::new(),
        }
    }

    pub fn with_conversions(mut self, conversions: Conversions) -> Self {
        self.conversions = conversions;
        self
    }

    /// Make a planned function callable by its native name.
    pub fn register(&mut self, plan: FunctionPlan) {
        self.plans.insert(plan.native.clone(), plan);
    }

    /// Bind the callee-side implementation of `native`.
    pub fn bind(
        &mut self,
        native: impl Into<String>,
        f: impl Fn(&mut [Value]) -> NativeResult + Send + Sync + 'static,
    ) {
        self.natives.insert(native.into(), Arc::new(f));
    }

    pub fn plan(&self, native: &str) -> Option<&FunctionPlan> {
        self.plans.get(native)
    }

    fn marshaler(&self) -> Marshaler<'_> {
        Marshaler::new(self.catalog, &self.conversions)
    }

    fn edge(&self, slot: &SlotPlan) -> Result<CompatibilityEdge> {
        self.catalog
            .resolve_edge(&slot.a_type, &slot.b_type)
            .map_err(|e| CodegenError::marshal(&slot.name, &slot.a_type, e.cause().to_string()))
    }

    /// Encode a value held by `side` in the slot's wire representation.
    fn outgoing(&self, side: Side, slot: &SlotPlan, value: &Value) -> Result<Vec<u8>> {
        self.marshaler().to_wire(side, &self.edge(slot)?, value)
    }

    fn incoming(&self, side: Side, slot: &SlotPlan, bytes: &[u8]) -> Result<Value> {
        self.marshaler().from_wire(side, &self.edge(slot)?, bytes)
    }

    /// Hand every handle inside `value` to its next owner.
    fn moved(&self, value: &Value) -> std::result::Result<Value, RuntimeError> {
        value.map_handles(&mut |h| self.table.transfer(h))
    }

    fn lookup(&self, native: &str) -> Result<(&FunctionPlan, &NativeFn)> {
        let plan = self
            .plans
            .get(native)
            .ok_or_else(|| CodegenError::UnknownFunction {
                symbol: native.to_string(),
            })?;
        let f = self
            .natives
            .get(native)
            .ok_or_else(|| CodegenError::Unbound {
                symbol: native.to_string(),
            })?;
        Ok((plan, f))
    }

    /// Call `native` from its caller side.
    pub fn call(&self, native: &str, mut args: Vec<Value>) -> Result<CallOutcome> {
        let (plan, f) = self.lookup(native)?;
        if args.len() != plan.params.len() {
            return Err(CodegenError::Arity {
                symbol: native.to_string(),
                expected: plan.params.len(),
                found: args.len(),
            });
        }
        let caller = plan.direction.caller();

        let mut lent: Vec<(usize, Handle)> = Vec::new();
        let wires = self.lower_args(plan, &args, &mut lent);
        let result = match wires {
            Ok(wires) => self.invoke(plan, f, wires).map_err(CodegenError::Channel),
            Err(e) => Err(e),
        };

        // Lent regions come home whether or not the call succeeded.
        let mut reclaimed = Vec::with_capacity(lent.len());
        for (index, handle) in lent {
            match self.table.reclaim_region(handle) {
                Ok(bytes) => reclaimed.push((index, bytes)),
                Err(e) if result.is_ok() => return Err(e.into()),
                Err(e) => warn!(handle = %handle, error = %e, "region not reclaimed"),
            }
        }
        let wire = result?;
        for (index, bytes) in reclaimed {
            let slot = &plan.params[index];
            if slot.mutable() {
                args[index] = self.incoming(caller, slot, &bytes)?;
            }
        }

        let value = match (&plan.ret, wire) {
            (None, _) | (Some(_), None) => Value::Unit,
            (Some(ret), Some(Wire::Bytes(bytes))) => self.incoming(caller, ret, &bytes)?,
            (Some(_), Some(Wire::Handle(h))) => Value::Handle(h),
            (Some(ret), Some(Wire::Span { handle, .. })) => {
                let bytes = self.table.reclaim_region(handle)?;
                self.incoming(caller, ret, &bytes)?
            }
        };
        debug!(native, direction = %plan.direction, "call returned");
        Ok(CallOutcome { value, args })
    }

    fn lower_args(
        &self,
        plan: &FunctionPlan,
        args: &[Value],
        lent: &mut Vec<(usize, Handle)>,
    ) -> Result<Vec<Wire>> {
        let caller = plan.direction.caller();
        let mut wires = Vec::with_capacity(args.len());
        for (index, (slot, value)) in plan.params.iter().zip(args).enumerate() {
            let wire = match slot.shape {
                WireShape::Direct | WireShape::Converted if slot.transfers_handles() => {
                    Wire::Bytes(self.outgoing(caller, slot, &self.moved(value)?)?)
                }
                WireShape::Direct | WireShape::Converted => {
                    Wire::Bytes(self.outgoing(caller, slot, value)?)
                }
                WireShape::Handle => {
                    let h = value.as_handle().ok_or_else(|| {
                        CodegenError::marshal(value.to_string(), &slot.a_type, "expected a handle")
                    })?;
                    if slot.transfers_handles() {
                        Wire::Handle(self.table.transfer(h)?)
                    } else {
                        Wire::Handle(h)
                    }
                }
                WireShape::Lent => {
                    let bytes = self.outgoing(caller, slot, value)?;
                    let h = self.table.lend_region(slot.tag(), bytes);
                    lent.push((index, h));
                    Wire::Handle(h)
                }
                WireShape::Span => {
                    let len = match value {
                        Value::Seq(items) => items.len(),
                        other => {
                            return Err(CodegenError::marshal(
                                other.to_string(),
                                &slot.a_type,
                                "expected a sequence",
                            ))
                        }
                    };
                    let bytes = self.outgoing(caller, slot, value)?;
                    let handle = self.table.lend_region(slot.tag(), bytes);
                    lent.push((index, handle));
                    Wire::Span { handle, len }
                }
            };
            wires.push(wire);
        }
        Ok(wires)
    }

    /// Run only the callee half against wire values the caller produced.
    pub fn invoke_raw(&self, native: &str, wires: Vec<Wire>) -> Result<Option<Wire>> {
        let (plan, f) = self.lookup(native)?;
        if wires.len() != plan.params.len() {
            return Err(CodegenError::Arity {
                symbol: native.to_string(),
                expected: plan.params.len(),
                found: wires.len(),
            });
        }
        self.invoke(plan, f, wires).map_err(CodegenError::Channel)
    }

    fn view_count(slot: &SlotPlan, len: usize) -> usize {
        match &slot.guard {
            Some(Guard::BoundsCheck { bound, .. }) => match bound.count {
                BoundCount::Fixed(n) => n as usize,
                BoundCount::Runtime => len,
            },
            _ => len,
        }
    }

    fn invoke(&self, plan: &FunctionPlan, f: &NativeFn, wires: Vec<Wire>) -> ChannelResult<Option<Wire>> {
        let callee = plan.callee();
        let table = self.table;
        catch_boundary(|| {
            let mut borrows: Vec<(usize, BorrowScope<'_>)> = Vec::new();
            let mut shares: Vec<ShareScope<'_>> = Vec::new();
            let mut args = Vec::with_capacity(wires.len());

            for (index, (slot, wire)) in plan.params.iter().zip(wires).enumerate() {
                let value = match (slot.shape, wire) {
                    (WireShape::Direct | WireShape::Converted, Wire::Bytes(bytes)) => {
                        self.incoming(callee, slot, &bytes).map_err(hazard)?
                    }
                    (WireShape::Handle, Wire::Handle(h)) => {
                        match slot.mode() {
                            OwnershipMode::Share => shares.push(table.share_scope(h)?),
                            OwnershipMode::Borrow => {
                                borrows.push((index, table.borrow_scope(h, slot.mutable())?))
                            }
                            _ => {}
                        }
                        Value::Handle(h)
                    }
                    (WireShape::Lent, Wire::Handle(h)) => {
                        borrows.push((index, table.borrow_scope(h, slot.mutable())?));
                        let bytes = table.read_view(h, 0, 1, table.region_len(h)?)?;
                        self.incoming(callee, slot, &bytes).map_err(hazard)?
                    }
                    (WireShape::Span, Wire::Span { handle, len }) => {
                        borrows.push((index, table.borrow_scope(handle, slot.mutable())?));
                        let count = Self::view_count(slot, len);
                        let stride = abi::stride_of(slot) as usize;
                        table.check_view(handle, 0, count, stride)?;
                        let bytes = table.read_view(handle, 0, count, stride)?;
                        self.incoming(callee, slot, &bytes).map_err(hazard)?
                    }
                    (shape, wire) => {
                        return Err(raise_error(
                            Discriminant::Hazard,
                            format!("'{}' expects {shape:?} but received {wire:?}", slot.name),
                        ))
                    }
                };
                args.push(value);
            }

            let value = match f(&mut args) {
                Ok(value) => value,
                Err(NativeError::Failure(failure)) => return Err(self.failure(plan, &failure)),
                Err(NativeError::Code(code)) => {
                    let value = from_error_code(code);
                    if value.is_success() {
                        return Err(raise_error(
                            Discriminant::Hazard,
                            "native reported failure with status 0",
                        ));
                    }
                    return Err(value);
                }
            };

            for (index, borrow) in borrows {
                let slot = &plan.params[index];
                if slot.mutable() && matches!(slot.shape, WireShape::Lent | WireShape::Span) {
                    let bytes = self.outgoing(callee, slot, &args[index]).map_err(hazard)?;
                    let stride = match slot.shape {
                        WireShape::Span => abi::stride_of(slot) as usize,
                        _ => bytes.len(),
                    };
                    borrow.write(0, &bytes, stride)?;
                }
                borrow.finish()?;
            }
            for share in shares {
                share.release()?;
            }

            let Some(ret) = &plan.ret else {
                return Ok(None);
            };
            let wire = match ret.shape {
                WireShape::Direct | WireShape::Converted => {
                    let value = if ret.transfers_handles() {
                        self.moved(&value)?
                    } else {
                        value
                    };
                    Wire::Bytes(self.outgoing(callee, ret, &value).map_err(hazard)?)
                }
                WireShape::Handle | WireShape::Lent => {
                    let h = value.as_handle().ok_or_else(|| {
                        raise_error(Discriminant::Hazard, format!("'{}' returned {value}, not a handle", plan.native))
                    })?;
                    if ret.transfers_handles() {
                        Wire::Handle(table.transfer(h)?)
                    } else {
                        Wire::Handle(h)
                    }
                }
                WireShape::Span => {
                    let len = match &value {
                        Value::Seq(items) => items.len(),
                        _ => 0,
                    };
                    let bytes = self.outgoing(callee, ret, &value).map_err(hazard)?;
                    let handle = table.lend_region(ret.tag(), bytes);
                    Wire::Span { handle, len }
                }
            };
            Ok(Some(wire))
        })
    }

    /// The channel value for a typed failure. Scalar error types cross as
    /// their bytes, anything else as its rendering.
    fn failure(&self, plan: &FunctionPlan, failure: &Value) -> ErrorChannelValue {
        let payload = plan
            .failure
            .as_ref()
            .and_then(|f| self.marshaler().encode(Side::B, &f.b_type, failure).ok())
            .unwrap_or_else(|| failure.to_string().into_bytes());
        ErrorChannelValue::failure(payload)
    }
}
