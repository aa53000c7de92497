//! Side A renderer: Rust modules.
//!
//! A caller gets a safe wrapper over the `extern "C"` glue symbol exported
//! by B. A callee gets a `#[no_mangle]` export that opens the guard scopes,
//! catches unwinding and reports through the error channel.

use isthmus_core::{ConstValue, Direction, OwnershipMode, TransformKind, TypeKind};

use crate::abi::{self, ERR, OUT};
use crate::emitter::Emitter;
use crate::plan::{ConstantPlan, FunctionPlan, SlotPlan, TypePlan, WireShape};

fn preamble(e: &mut Emitter, title: &str) {
    e.line(format!("// {title}. Generated by isthmus; do not edit."));
    e.blank();
    e.line("#[allow(unused_imports)]");
    e.line("use isthmus_runtime::{");
    e.line("    catch_boundary, deliver, global_table, raise_error, read_slice, read_value, settle,");
    e.line("    slice_bytes, value_bytes, ChannelResult, Discriminant, ErrorChannelValue, Handle,");
    e.line("    RawChannel, RuntimeError, Storage,");
    e.line("};");
    e.blank();
}

fn element_a(slot: &SlotPlan) -> String {
    slot.element
        .as_ref()
        .map_or_else(|| "u8".to_string(), |e| e.spelled.a.clone())
}

fn is_structural(slot: &SlotPlan) -> bool {
    slot.transform == TransformKind::StructuralCopy
}

/// Helper that gives every handle embedded in a composite a fresh owner.
fn transfer_helper(spelled_a: &str) -> String {
    format!("{}_transfer_handles", snake(spelled_a))
}

fn reference(slot: &SlotPlan) -> &'static str {
    if slot.mutable() {
        "&mut "
    } else {
        "&"
    }
}

/// Rust type of a success value once it is back on side A.
fn value_type(slot: &SlotPlan) -> String {
    match slot.shape {
        WireShape::Direct | WireShape::Converted => slot.spelled.a.clone(),
        WireShape::Handle | WireShape::Lent => "Handle".to_string(),
        WireShape::Span => format!("Vec<{}>", element_a(slot)),
    }
}

/// Conversion from a structural mirror back to the A type.
fn from_repr(slot: &SlotPlan, expr: &str) -> String {
    if slot.type_kind == TypeKind::Value {
        format!("{}::from({expr})", slot.spelled.a)
    } else {
        format!(
            "{}::try_from({expr}).map_err(|tag| raise_error(Discriminant::Hazard, format!(\"unknown tag {{tag}}\")))?",
            slot.spelled.a
        )
    }
}

fn failure_payload(plan: &FunctionPlan) -> String {
    match &plan.failure {
        Some(f) if abi::is_scalar_a(&f.spelled.a) => {
            "raise_error(Discriminant::Failure, e.to_ne_bytes().to_vec())".to_string()
        }
        _ => "raise_error(Discriminant::Failure, format!(\"{e:?}\"))".to_string(),
    }
}

fn extern_block(e: &mut Emitter, plan: &FunctionPlan) {
    e.open("extern \"C\" {");
    e.line(format!("{};", abi::rust_signature(plan)));
    e.close("}");
    e.blank();
}

fn caller_param(slot: &SlotPlan) -> String {
    let ty = match slot.shape {
        WireShape::Direct if is_structural(slot) => format!("&{}", slot.spelled.a),
        WireShape::Direct => slot.spelled.a.clone(),
        WireShape::Converted => format!("&{}", slot.spelled.a),
        WireShape::Handle => "Handle".to_string(),
        WireShape::Lent => format!("{}{}", reference(slot), slot.spelled.a),
        WireShape::Span => format!("{}[{}]", reference(slot), element_a(slot)),
    };
    format!("{}: {ty}", slot.name)
}

/// Safe wrapper for A calling glue exported by B.
fn caller_glue(e: &mut Emitter, plan: &FunctionPlan) {
    extern_block(e, plan);
    let params: Vec<String> = plan.params.iter().map(caller_param).collect();
    let ret = plan.ret.as_ref().map_or_else(|| "()".to_string(), value_type);
    e.open(format!(
        "pub fn {}({}) -> ChannelResult<{ret}> {{",
        plan.native,
        params.join(", ")
    ));
    e.line("let table = global_table();");

    let mut args = Vec::new();
    for slot in &plan.params {
        let n = &slot.name;
        match slot.shape {
            WireShape::Direct if is_structural(slot) => {
                args.push(format!("{}::from({n})", abi::repr_name(&slot.spelled.a)));
            }
            WireShape::Direct if slot.transfers_handles() => {
                e.line(format!("let mut {n} = {n};"));
                e.line(format!("{}(&mut {n})?;", transfer_helper(&slot.spelled.a)));
                args.push(n.clone());
            }
            WireShape::Direct => args.push(n.clone()),
            WireShape::Converted => {
                let to_b = slot.conversion.as_ref().map_or("to_b", |c| c.to_b.as_str());
                e.line(format!("let {n}_bytes = {to_b}({n});"));
                args.push(format!("{n}_bytes.as_ptr()"));
                args.push(format!("{n}_bytes.len()"));
            }
            WireShape::Handle => {
                if slot.transfers_handles() {
                    e.line(format!("let {n} = table.transfer({n})?;"));
                }
                args.push(format!("{n}.raw()"));
            }
            WireShape::Lent => {
                let bytes = if is_structural(slot) {
                    format!("value_bytes(&{}::from(&*{n}))", abi::repr_name(&slot.spelled.a))
                } else {
                    format!("value_bytes(&*{n})")
                };
                e.line(format!("let {n}_lent = table.lend_region(\"{}\", {bytes});", slot.tag()));
                args.push(format!("{n}_lent.raw()"));
            }
            WireShape::Span => {
                e.line(format!(
                    "let {n}_lent = table.lend_region(\"{}\", slice_bytes({n}));",
                    slot.tag()
                ));
                args.push(format!("{n}_lent.raw()"));
                args.push(format!("{n}.len()"));
            }
        }
    }

    if let Some(r) = &plan.ret {
        match r.shape {
            WireShape::Direct => {
                e.line(format!(
                    "let mut {OUT} = std::mem::MaybeUninit::<{}>::uninit();",
                    abi::rust_direct(r)
                ));
                args.push(format!("{OUT}.as_mut_ptr()"));
            }
            WireShape::Converted => {
                e.line(format!("let mut {OUT} = vec![0_u8; {}];", r.size.unwrap_or(0)));
                args.push(format!("{OUT}.as_mut_ptr()"));
                args.push(format!("{OUT}.len()"));
            }
            WireShape::Handle | WireShape::Lent => {
                e.line(format!("let mut {OUT} = 0_u64;"));
                args.push(format!("&mut {OUT}"));
            }
            WireShape::Span => {
                e.line(format!("let mut {OUT} = 0_u64;"));
                e.line(format!("let mut {OUT}_len = 0_usize;"));
                args.push(format!("&mut {OUT}"));
                args.push(format!("&mut {OUT}_len"));
            }
        }
    }
    e.line(format!("let mut {ERR} = RawChannel::EMPTY;"));
    args.push(format!("&mut {ERR}"));
    e.line(format!(
        "let status = unsafe {{ {}({}) }};",
        plan.symbol,
        args.join(", ")
    ));

    let lent: Vec<&SlotPlan> = plan
        .params
        .iter()
        .filter(|s| matches!(s.shape, WireShape::Lent | WireShape::Span))
        .collect();
    for slot in &lent {
        let n = &slot.name;
        e.line(format!("let {n}_back = table.reclaim_region({n}_lent);"));
    }
    e.line(format!("unsafe {{ settle(status, {ERR}) }}?;"));
    for slot in &lent {
        let n = &slot.name;
        match (slot.shape, slot.mutable()) {
            (WireShape::Lent, true) if is_structural(slot) => {
                let repr = abi::repr_name(&slot.spelled.a);
                e.line(format!(
                    "*{n} = {}::from(unsafe {{ read_value::<{repr}>(&{n}_back?) }}?);",
                    slot.spelled.a
                ));
            }
            (WireShape::Lent, true) => e.line(format!(
                "*{n} = unsafe {{ read_value::<{}>(&{n}_back?) }}?;",
                slot.spelled.a
            )),
            (WireShape::Span, true) => {
                e.line(format!(
                    "let {n}_values = unsafe {{ read_slice::<{}>(&{n}_back?) }}?;",
                    element_a(slot)
                ));
                e.line(format!("{n}.copy_from_slice(&{n}_values[..{n}.len()]);"));
            }
            _ => e.line(format!("{n}_back?;")),
        }
    }

    match &plan.ret {
        None => e.line("Ok(())"),
        Some(r) => match r.shape {
            WireShape::Direct if is_structural(r) => {
                e.line(format!("let {OUT} = unsafe {{ {OUT}.assume_init() }};"));
                e.line(format!("Ok({})", from_repr(r, OUT)));
            }
            WireShape::Direct => e.line(format!("Ok(unsafe {{ {OUT}.assume_init() }})")),
            WireShape::Converted => {
                let to_a = r.conversion.as_ref().map_or("to_a", |c| c.to_a.as_str());
                e.line(format!("Ok({to_a}(&{OUT}))"));
            }
            WireShape::Handle | WireShape::Lent => e.line(format!("Ok(Handle::from_raw({OUT}))")),
            WireShape::Span => {
                e.line(format!(
                    "let {OUT}_bytes = table.reclaim_region(Handle::from_raw({OUT}))?;"
                ));
                e.line(format!(
                    "let {OUT}_values = unsafe {{ read_slice::<{}>(&{OUT}_bytes) }}?;",
                    element_a(r)
                ));
                e.line(format!("Ok({OUT}_values.into_iter().take({OUT}_len).collect())"));
            }
        },
    }
    e.close("}");

    failure_helper(e, plan);
}

/// Typed view of a failure a B callee reported as an error code.
fn failure_helper(e: &mut Emitter, plan: &FunctionPlan) {
    let Some(failure) = &plan.failure else {
        return;
    };
    let integer = matches!(
        failure.spelled.a.as_str(),
        "i8" | "i16" | "i32" | "i64" | "u8" | "u16" | "u32" | "u64" | "usize"
    );
    if !integer {
        return;
    }
    e.blank();
    e.open(format!(
        "pub fn {}_failure(err: &ErrorChannelValue) -> Option<{}> {{",
        plan.native, failure.spelled.a
    ));
    e.line(format!(
        "err.error_code().and_then(|code| {}::try_from(code).ok())",
        failure.spelled.a
    ));
    e.close("}");
}

/// Load one wire parameter inside the callee closure. Returns the
/// argument expression for the native call.
fn load_param(e: &mut Emitter, slot: &SlotPlan) -> String {
    let n = &slot.name;
    match slot.shape {
        WireShape::Direct if is_structural(slot) => {
            e.line(format!("let {n} = {};", from_repr(slot, n)));
            n.clone()
        }
        WireShape::Direct => n.clone(),
        WireShape::Converted => {
            let to_a = slot.conversion.as_ref().map_or("to_a", |c| c.to_a.as_str());
            e.line(format!(
                "let {n} = {to_a}(unsafe {{ std::slice::from_raw_parts({n}, {n}_len) }});"
            ));
            n.clone()
        }
        WireShape::Handle => {
            e.line(format!("let {n} = Handle::from_raw({n});"));
            match slot.mode() {
                OwnershipMode::Share => {
                    e.line(format!("let _{n}_share = table.share_scope({n})?;"));
                }
                OwnershipMode::Borrow => {
                    if let Some(guard) = &slot.guard {
                        e.line(format!("// {guard}"));
                    }
                    e.line(format!(
                        "let {n}_borrow = table.borrow_scope({n}, {})?;",
                        slot.mutable()
                    ));
                }
                _ => {}
            }
            n.clone()
        }
        WireShape::Lent => {
            let size = slot.size.unwrap_or(0);
            let read = if is_structural(slot) {
                format!(
                    "{}::from(unsafe {{ read_value::<{}>(&table.read_view({n}, 0, 1, {size})?) }}?)",
                    slot.spelled.a,
                    abi::repr_name(&slot.spelled.a)
                )
            } else {
                format!(
                    "unsafe {{ read_value::<{}>(&table.read_view({n}, 0, 1, {size})?) }}?",
                    slot.spelled.a
                )
            };
            e.line(format!("let {n} = Handle::from_raw({n});"));
            if let Some(guard) = &slot.guard {
                e.line(format!("// {guard}"));
            }
            e.line(format!(
                "let {n}_borrow = table.borrow_scope({n}, {})?;",
                slot.mutable()
            ));
            let binding = if slot.mutable() { "mut " } else { "" };
            e.line(format!("let {binding}{n}_value: {} = {read};", slot.spelled.a));
            format!("{}{n}_value", reference(slot))
        }
        WireShape::Span => {
            let count = abi::count_expr(slot);
            let stride = abi::stride_of(slot);
            e.line(format!("let {n} = Handle::from_raw({n});"));
            if let Some(guard) = &slot.guard {
                e.line(format!("// {guard}"));
            }
            e.line(format!(
                "let {n}_borrow = table.borrow_scope({n}, {})?;",
                slot.mutable()
            ));
            e.line(format!("table.check_view({n}, 0, {count}, {stride})?;"));
            let binding = if slot.mutable() { "mut " } else { "" };
            e.line(format!(
                "let {binding}{n}_values: Vec<{}> = unsafe {{ read_slice(&table.read_view({n}, 0, {count}, {stride})?) }}?;",
                element_a(slot)
            ));
            format!("{}{n}_values", reference(slot))
        }
    }
}

/// Write back and end the borrows opened by [`load_param`].
fn settle_param(e: &mut Emitter, slot: &SlotPlan) {
    let n = &slot.name;
    match slot.shape {
        WireShape::Lent => {
            if slot.mutable() {
                let bytes = if is_structural(slot) {
                    format!(
                        "value_bytes(&{}::from(&{n}_value))",
                        abi::repr_name(&slot.spelled.a)
                    )
                } else {
                    format!("value_bytes(&{n}_value)")
                };
                e.line(format!(
                    "{n}_borrow.write(0, &{bytes}, {})?;",
                    slot.size.unwrap_or(0)
                ));
            }
            e.line(format!("{n}_borrow.finish()?;"));
        }
        WireShape::Span => {
            if slot.mutable() {
                e.line(format!(
                    "{n}_borrow.write(0, &slice_bytes(&{n}_values), {})?;",
                    abi::stride_of(slot)
                ));
            }
            e.line(format!("{n}_borrow.finish()?;"));
        }
        WireShape::Handle if slot.mode() == OwnershipMode::Borrow => {
            e.line(format!("{n}_borrow.finish()?;"));
        }
        _ => {}
    }
}

/// Convert the native result into its wire form inside the closure.
fn wire_result(e: &mut Emitter, ret: &SlotPlan) {
    match ret.shape {
        WireShape::Direct if is_structural(ret) => e.line(format!(
            "Ok({}::from(&value))",
            abi::repr_name(&ret.spelled.a)
        )),
        WireShape::Direct if ret.transfers_handles() => {
            e.line("let mut value = value;");
            e.line(format!("{}(&mut value)?;", transfer_helper(&ret.spelled.a)));
            e.line("Ok(value)");
        }
        WireShape::Direct => e.line("Ok(value)"),
        WireShape::Converted => {
            let to_b = ret.conversion.as_ref().map_or("to_b", |c| c.to_b.as_str());
            e.line(format!("Ok({to_b}(&value))"));
        }
        WireShape::Handle if ret.transfers_handles() => {
            e.line("let value = table.transfer(value)?;");
            e.line("Ok(value.raw())");
        }
        WireShape::Handle | WireShape::Lent => e.line("Ok(value.raw())"),
        WireShape::Span => {
            e.line(format!(
                "let region = table.lend_region(\"{}\", slice_bytes(&value));",
                ret.tag()
            ));
            e.line("Ok((region.raw(), value.len()))");
        }
    }
}

fn write_out(e: &mut Emitter, ret: &SlotPlan) {
    match ret.shape {
        WireShape::Direct | WireShape::Handle | WireShape::Lent => {
            e.open(format!("if !{OUT}.is_null() {{"));
            e.line(format!("unsafe {{ {OUT}.write(wire) }};"));
            e.close("}");
        }
        WireShape::Converted => {
            e.open(format!("if !{OUT}.is_null() {{"));
            e.line(format!(
                "unsafe {{ std::ptr::copy_nonoverlapping(wire.as_ptr(), {OUT}, wire.len().min({OUT}_cap)) }};"
            ));
            e.close("}");
        }
        WireShape::Span => {
            e.line("let (region, len) = wire;");
            e.open(format!("if !{OUT}.is_null() && !{OUT}_len.is_null() {{"));
            e.line(format!("unsafe {{ {OUT}.write(region) }};"));
            e.line(format!("unsafe {{ {OUT}_len.write(len) }};"));
            e.close("}");
        }
    }
}

/// `#[no_mangle]` export for B calling into A.
fn callee_glue(e: &mut Emitter, plan: &FunctionPlan) {
    e.line("#[no_mangle]");
    e.open(format!("pub extern \"C\" {} {{", abi::rust_signature(plan)));
    e.open("let result = catch_boundary(|| {");
    e.line("let table = global_table();");
    let args: Vec<String> = plan.params.iter().map(|s| load_param(e, s)).collect();
    let call = format!("crate::{}({})", plan.native, args.join(", "));
    if plan.fallible {
        e.line(format!("let value = {call}.map_err(|e| {})?;", failure_payload(plan)));
    } else if plan.ret.is_some() {
        e.line(format!("let value = {call};"));
    } else {
        e.line(format!("{call};"));
    }
    for slot in &plan.params {
        settle_param(e, slot);
    }
    match &plan.ret {
        Some(r) => wire_result(e, r),
        None => e.line("Ok(())"),
    }
    e.close("});");
    e.open("match result {");
    match &plan.ret {
        Some(r) => {
            e.open("Ok(wire) => {");
            write_out(e, r);
            e.line("Discriminant::Success.code()");
            e.close("}");
        }
        None => e.line("Ok(()) => Discriminant::Success.code(),"),
    }
    e.line(format!("Err(e) => unsafe {{ deliver(e, {ERR}) }},"));
    e.close("}");
    e.close("}");
}

/// Render the A artifact of a function pair.
pub fn render_function(plan: &FunctionPlan) -> String {
    let mut e = Emitter::new();
    preamble(&mut e, &format!("{} ({})", plan.item, plan.direction));
    for guard in plan.guards() {
        e.line(format!("// guard: {guard}"));
    }
    match plan.direction {
        Direction::AToB => caller_glue(&mut e, plan),
        Direction::BToA => callee_glue(&mut e, plan),
    }
    e.finish()
}

pub fn render_constant(plan: &ConstantPlan) -> String {
    let literal = match plan.value {
        ConstValue::Bool(b) => b.to_string(),
        ConstValue::Int(i) => i.to_string(),
        ConstValue::Float(f) => format!("{f:?}"),
    };
    let mut e = Emitter::new();
    e.line(format!("// {}. Generated by isthmus; do not edit.", plan.item));
    e.blank();
    e.line(format!("pub const {}: {} = {literal};", plan.name, plan.spelled.a));
    e.finish()
}

fn snake(name: &str) -> String {
    let mut out = String::new();
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 && !out.ends_with('_') {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else if c == ':' {
            if !out.ends_with('_') {
                out.push('_');
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn layout_asserts(e: &mut Emitter, ty: &str, size: Option<u64>, align: Option<u64>) {
    if let Some(size) = size {
        e.line(format!("const _: () = assert!(std::mem::size_of::<{ty}>() == {size});"));
    }
    if let Some(align) = align {
        e.line(format!("const _: () = assert!(std::mem::align_of::<{ty}>() == {align});"));
    }
}

fn field_out(spelled_a: &str, expr: &str) -> String {
    if abi::is_scalar_a(spelled_a) {
        expr.to_string()
    } else {
        format!("{}::from(&{expr})", abi::repr_name(spelled_a))
    }
}

fn field_in(spelled_a: &str, expr: &str) -> String {
    if abi::is_scalar_a(spelled_a) {
        expr.to_string()
    } else {
        format!("{spelled_a}::from({expr})")
    }
}

fn wire_field_type(spelled_a: &str) -> String {
    if abi::is_scalar_a(spelled_a) {
        spelled_a.to_string()
    } else {
        abi::repr_name(spelled_a)
    }
}

fn structural_struct(e: &mut Emitter, plan: &TypePlan) {
    let a = &plan.spelled.a;
    let repr = abi::repr_name(a);
    e.line("#[repr(C)]");
    e.line("#[derive(Debug, Clone, Copy)]");
    e.open(format!("pub struct {repr} {{"));
    for field in &plan.fields {
        e.line(format!("pub {}: {},", field.name, wire_field_type(&field.spelled.a)));
    }
    e.close("}");
    e.blank();
    e.open(format!("impl From<&{a}> for {repr} {{"));
    e.open(format!("fn from(value: &{a}) -> Self {{"));
    e.open("Self {");
    for field in &plan.fields {
        let expr = format!("value.{}", field.name);
        e.line(format!("{}: {},", field.name, field_out(&field.spelled.a, &expr)));
    }
    e.close("}");
    e.close("}");
    e.close("}");
    e.blank();
    e.open(format!("impl From<{repr}> for {a} {{"));
    e.open(format!("fn from(repr: {repr}) -> Self {{"));
    e.open("Self {");
    for field in &plan.fields {
        let expr = format!("repr.{}", field.name);
        e.line(format!("{}: {},", field.name, field_in(&field.spelled.a, &expr)));
    }
    e.close("}");
    e.close("}");
    e.close("}");
}

fn variant_pattern(plan: &TypePlan, name: &str, binding: bool) -> String {
    let path = match plan.edge.type_kind {
        TypeKind::EnumWithPayload => format!("{}::{name}", plan.spelled.a),
        _ => name.to_string(),
    };
    if binding {
        format!("{path}(v)")
    } else {
        path
    }
}

fn tagged_union(e: &mut Emitter, plan: &TypePlan) {
    let a = &plan.spelled.a;
    let repr = abi::repr_name(a);
    let payload = format!("{}Payload", repr.trim_end_matches("Repr"));
    e.line("#[repr(C)]");
    e.line("#[derive(Clone, Copy)]");
    e.open(format!("pub union {payload} {{"));
    e.line("pub empty: u8,");
    for variant in &plan.variants {
        if let Some(p) = &variant.payload {
            e.line(format!(
                "pub {}: {},",
                variant.name.to_lowercase(),
                wire_field_type(&p.a)
            ));
        }
    }
    e.close("}");
    e.blank();
    e.line("#[repr(C)]");
    e.line("#[derive(Clone, Copy)]");
    e.open(format!("pub struct {repr} {{"));
    e.line("pub tag: u32,");
    e.line(format!("pub payload: {payload},"));
    e.close("}");
    e.blank();

    e.open(format!("impl From<&{a}> for {repr} {{"));
    e.open(format!("fn from(value: &{a}) -> Self {{"));
    e.open("match value {");
    for (tag, variant) in plan.variants.iter().enumerate() {
        match &variant.payload {
            Some(p) => {
                let field = variant.name.to_lowercase();
                let v = if abi::is_scalar_a(&p.a) {
                    "*v".to_string()
                } else {
                    field_out(&p.a, "*v")
                };
                e.line(format!(
                    "{} => Self {{ tag: {tag}, payload: {payload} {{ {field}: {v} }} }},",
                    variant_pattern(plan, &variant.name, true)
                ));
            }
            None => e.line(format!(
                "{} => Self {{ tag: {tag}, payload: {payload} {{ empty: 0 }} }},",
                variant_pattern(plan, &variant.name, false)
            )),
        }
    }
    e.close("}");
    e.close("}");
    e.close("}");
    e.blank();

    e.open(format!("impl TryFrom<{repr}> for {a} {{"));
    e.line("type Error = u32;");
    e.blank();
    e.open(format!("fn try_from(repr: {repr}) -> Result<Self, u32> {{"));
    e.open("match repr.tag {");
    for (tag, variant) in plan.variants.iter().enumerate() {
        let path = variant_pattern(plan, &variant.name, false);
        match &variant.payload {
            Some(p) => {
                let field = format!("unsafe {{ repr.payload.{} }}", variant.name.to_lowercase());
                e.line(format!("{tag} => Ok({path}({})),", field_in(&p.a, &field)));
            }
            None => e.line(format!("{tag} => Ok({path}),")),
        }
    }
    e.line("tag => Err(tag),");
    e.close("}");
    e.close("}");
    e.close("}");
}

/// Move each handle embedded in an identity-layout composite. Handle
/// fields are spelled `Handle` on this side so the layouts agree.
fn transfer_handles(e: &mut Emitter, plan: &TypePlan) {
    let a = &plan.spelled.a;
    e.blank();
    e.line(format!("/// Give every handle inside a `{a}` a fresh owner."));
    e.open(format!(
        "pub fn {}(value: &mut {a}) -> Result<(), RuntimeError> {{",
        transfer_helper(a)
    ));
    let direct = plan.fields.iter().any(|f| f.handle) || plan.variants.iter().any(|v| v.handle);
    if direct {
        e.line("let table = global_table();");
    }
    if plan.variants.is_empty() {
        for field in plan.fields.iter().filter(|f| f.moves_handles()) {
            let f = &field.name;
            if field.handle {
                e.line(format!("value.{f} = table.transfer(value.{f})?;"));
            } else {
                e.line(format!("{}(&mut value.{f})?;", transfer_helper(&field.spelled.a)));
            }
        }
    } else {
        e.open("match value {");
        for variant in plan.variants.iter().filter(|v| v.moves_handles()) {
            let pattern = variant_pattern(plan, &variant.name, true);
            match &variant.payload {
                Some(_) if variant.handle => {
                    e.line(format!("{pattern} => *v = table.transfer(*v)?,"));
                }
                Some(p) => e.line(format!("{pattern} => {}(v)?,", transfer_helper(&p.a))),
                None => {}
            }
        }
        if plan.variants.iter().any(|v| !v.moves_handles()) {
            e.line("_ => {}");
        }
        e.close("}");
    }
    e.line("Ok(())");
    e.close("}");
}

fn handle_helpers(e: &mut Emitter, plan: &TypePlan) {
    let a = &plan.spelled.a;
    let fn_base = snake(a);
    e.line(format!("/// Place a `{a}` in the handle table."));
    e.open(format!("pub fn {fn_base}_into_handle(value: {a}) -> Handle {{"));
    if plan.ref_counted {
        e.line(format!(
            "global_table().allocate_shared(\"{}\", Storage::value(value), {})",
            plan.edge.a, plan.thread_shareable
        ));
    } else {
        e.line(format!("global_table().allocate_value(\"{}\", value)", plan.edge.a));
    }
    e.close("}");
    e.blank();
    e.open(format!(
        "pub fn {fn_base}_from_handle(handle: Handle) -> Result<{a}, RuntimeError> {{"
    ));
    e.line(format!("global_table().take::<{a}>(handle)"));
    e.close("}");
    if plan.vtable.is_empty() {
        return;
    }
    e.blank();
    e.line("#[repr(C)]");
    e.line("#[derive(Clone, Copy)]");
    e.open(format!("pub struct {}Vtable {{", a.rsplit("::").next().unwrap_or(a)));
    for method in &plan.vtable {
        e.line(format!(
            "pub {method}: extern \"C\" fn(u64, *const u8, usize, *mut RawChannel) -> u8,"
        ));
    }
    e.close("}");
}

/// Render the A artifact of a type pair.
pub fn render_type(plan: &TypePlan) -> String {
    let mut e = Emitter::new();
    preamble(
        &mut e,
        &format!("type {} <-> {} ({})", plan.edge.a, plan.edge.b, plan.edge.kind),
    );
    match plan.edge.kind {
        TransformKind::IdentityLayout => match &plan.element {
            Some(element) => layout_asserts(&mut e, &element.spelled.a, Some(element.stride), None),
            None => {
                layout_asserts(&mut e, &plan.spelled.a, plan.size, plan.align);
                if plan.edge.holds_handles {
                    transfer_handles(&mut e, plan);
                }
            }
        },
        TransformKind::StructuralCopy => match plan.edge.type_kind {
            TypeKind::Value => structural_struct(&mut e, plan),
            _ => tagged_union(&mut e, plan),
        },
        TransformKind::OpaqueHandle => handle_helpers(&mut e, plan),
        TransformKind::ExplicitConversionFunction => {
            if let Some(pair) = &plan.edge.conversion {
                let a = &plan.spelled.a;
                e.line(format!("const _: fn(&{a}) -> Vec<u8> = {};", pair.to_b));
                e.line(format!("const _: fn(&[u8]) -> {a} = {};", pair.to_a));
            }
        }
    }
    e.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use isthmus_core::Side;

    #[test]
    fn caller_lends_views_and_settles() {
        let fixture = testing::fixture();
        let src = render_function(&fixture.function_plan("sum"));
        assert!(src.contains("fn isthmus_sum(values: u64, values_len: usize, out: *mut i32, err: *mut RawChannel) -> u8;"));
        assert!(src.contains("pub fn sum(values: &[i32]) -> ChannelResult<i32> {"));
        assert!(src.contains("let values_lent = table.lend_region(\"Int32Slice\", slice_bytes(values));"));
        let reclaim = src.find("table.reclaim_region(values_lent)").unwrap();
        let settle = src.find("settle(status, err)").unwrap();
        assert!(reclaim < settle);
        assert!(src.contains("// guard: bounds-check(values: count=runtime, stride=4)"));
    }

    #[test]
    fn caller_transfers_handles() {
        let fixture = testing::fixture();
        let src = render_function(&fixture.function_plan("db_close"));
        assert!(src.contains("pub fn db_close(db: Handle) -> ChannelResult<()> {"));
        assert!(src.contains("let db = table.transfer(db)?;"));
        assert!(src.contains("isthmus_db_close(db.raw(), &mut err)"));
    }

    #[test]
    fn mutable_lent_value_is_written_back() {
        let fixture = testing::fixture();
        let src = render_function(&fixture.function_plan("translate"));
        assert!(src.contains("pub fn translate(p: &mut Point, dx: f64) -> ChannelResult<()> {"));
        assert!(src.contains("*p = unsafe { read_value::<Point>(&p_back?) }?;"));
    }

    #[test]
    fn fallible_caller_gets_failure_helper() {
        let fixture = testing::fixture();
        let src = render_function(&fixture.function_plan("parse_port"));
        assert!(src.contains("pub fn parse_port(code: i32) -> ChannelResult<u16> {"));
        assert!(src.contains("pub fn parse_port_failure(err: &ErrorChannelValue) -> Option<i32> {"));
    }

    #[test]
    fn callee_holds_share_and_catches_panics() {
        let fixture = testing::fixture();
        let src = render_function(&fixture.function_plan("watch"));
        assert!(src.contains("#[no_mangle]"));
        assert!(src.contains(
            "pub extern \"C\" fn isthmus_watch(s: u64, out: *mut i64, err: *mut RawChannel) -> u8 {"
        ));
        assert!(src.contains("let result = catch_boundary(|| {"));
        assert!(src.contains("let _s_share = table.share_scope(s)?;"));
        assert!(src.contains("let value = crate::watch(s);"));
        assert!(src.contains("Err(e) => unsafe { deliver(e, err) },"));
    }

    #[test]
    fn constants_and_types() {
        let fixture = testing::fixture();
        let src = render_constant(&fixture.constant_plan("MAX_PORTS"));
        assert!(src.contains("pub const MAX_PORTS: i32 = 64;"));

        let point = render_type(&fixture.type_plan(Side::A, "Point"));
        assert!(point.contains("const _: () = assert!(std::mem::size_of::<Point>() == 16);"));

        let shared = render_type(&fixture.type_plan(Side::A, "Shared"));
        assert!(shared.contains("pub fn shared_into_handle(value: Shared) -> Handle {"));
        assert!(shared.contains("allocate_shared(\"Shared\", Storage::value(value), true)"));

        let db = render_type(&fixture.type_plan(Side::A, "Db"));
        assert!(db.contains("pub struct DbVtable {"));
    }

    #[test]
    fn matching_results_share_one_layout() {
        let fixture = testing::fixture();
        let plan = fixture.type_plan(Side::A, "PortResult");
        assert_eq!(plan.edge.kind, TransformKind::IdentityLayout);
        let src = render_type(&plan);
        assert!(src.contains("const _: () = assert!(std::mem::size_of::<PortResult>() == 8);"));
        assert!(src.contains("const _: () = assert!(std::mem::align_of::<PortResult>() == 4);"));
        assert!(!src.contains("transfer_handles"));
    }

    #[test]
    fn copied_optionals_become_tagged_unions() {
        let fixture = testing::fixture();
        let plan = fixture.type_plan(Side::A, "MaybePacket");
        assert_eq!(plan.edge.kind, TransformKind::StructuralCopy);
        let src = render_type(&plan);
        assert!(src.contains("pub union MaybePacketPayload {"));
        assert!(src.contains("pub some: PacketRepr,"));
        assert!(src.contains("None => Self { tag: 0, payload: MaybePacketPayload { empty: 0 } },"));
        assert!(src.contains(
            "Some(v) => Self { tag: 1, payload: MaybePacketPayload { some: PacketRepr::from(&*v) } },"
        ));
        assert!(src.contains("1 => Ok(Some(Packet::from(unsafe { repr.payload.some }))),"));
    }

    #[test]
    fn callee_moves_returned_handles() {
        let fixture = testing::fixture();
        let src = render_function(&fixture.function_plan("reopen"));
        let call = src.find("let value = crate::reopen(db);").unwrap();
        let moved = src.find("let value = table.transfer(value)?;").unwrap();
        assert!(call < moved);
        assert!(src.contains("Ok(value.raw())"));
    }

    #[test]
    fn embedded_handles_move_in_both_directions() {
        let fixture = testing::fixture();
        let src = render_function(&fixture.function_plan("swap_entry"));
        assert!(src.contains("pub fn swap_entry(entry: Entry) -> ChannelResult<Entry> {"));
        let moved = src.find("entry_transfer_handles(&mut entry)?;").unwrap();
        let call = src.find("isthmus_swap_entry(entry, out.as_mut_ptr(), &mut err)").unwrap();
        assert!(moved < call);

        let src = render_function(&fixture.function_plan("stash_entry"));
        assert!(src.contains("let mut value = value;\n"));
        assert!(src.contains("entry_transfer_handles(&mut value)?;"));

        let entry = render_type(&fixture.type_plan(Side::A, "Entry"));
        assert!(entry.contains("pub fn entry_transfer_handles(value: &mut Entry) -> Result<(), RuntimeError> {"));
        assert!(entry.contains("value.db = table.transfer(value.db)?;"));
        assert!(!entry.contains("value.id"));

        let result = render_type(&fixture.type_plan(Side::A, "OpenResult"));
        assert!(result.contains("Ok(v) => *v = table.transfer(*v)?,"));
        assert!(result.contains("_ => {}"));
    }

    #[test]
    fn snake_case_names() {
        assert_eq!(snake("DbConn"), "db_conn");
        assert_eq!(snake("net::Socket"), "net_socket");
    }
}
