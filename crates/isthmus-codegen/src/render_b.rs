//! Side B renderer: C headers.
//!
//! Each artifact is a single header. Declarations are always visible; the
//! glue bodies are compiled in the one translation unit that defines
//! `ISTHMUS_IMPLEMENTATION` before including it.

use isthmus_core::{ConstValue, Direction, TransformKind, TypeKind};

use crate::abi::{self, ERR, OUT};
use crate::emitter::Emitter;
use crate::plan::{ConstantPlan, FunctionPlan, SlotPlan, TypePlan, WireShape};
use crate::runtime_header::RUNTIME_HEADER;

fn guard_macro(symbol: &str) -> String {
    format!("{}_GLUE_H", symbol.to_uppercase())
}

fn preamble(e: &mut Emitter, title: &str, symbol: &str) {
    e.line(format!("/* {title}. Generated by isthmus; do not edit. */"));
    let guard = guard_macro(symbol);
    e.line(format!("#ifndef {guard}"));
    e.line(format!("#define {guard}"));
    e.blank();
    e.line("#include <stddef.h>");
    e.line("#include <stdint.h>");
    e.line("#include <string.h>");
    e.line(format!("#include \"{RUNTIME_HEADER}\""));
    e.blank();
}

fn epilogue(e: &mut Emitter, symbol: &str) {
    e.line(format!("#endif /* {} */", guard_macro(symbol)));
}

fn constness(slot: &SlotPlan) -> &'static str {
    if slot.mutable() {
        ""
    } else {
        "const "
    }
}

fn element_b(slot: &SlotPlan) -> String {
    slot.element
        .as_ref()
        .map_or_else(|| "uint8_t".to_string(), |e| e.spelled.b.clone())
}

/// Parameters of the native callee as the B programmer declares them.
fn native_params(slot: &SlotPlan) -> Vec<String> {
    let n = &slot.name;
    match slot.shape {
        WireShape::Direct | WireShape::Converted | WireShape::Handle => {
            vec![format!("{} {n}", slot.spelled.b)]
        }
        WireShape::Lent => vec![format!("{}{}* {n}", constness(slot), slot.spelled.b)],
        WireShape::Span => vec![
            format!("{}{}* {n}", constness(slot), element_b(slot)),
            format!("size_t {n}_len"),
        ],
    }
}

fn native_args(slot: &SlotPlan) -> Vec<String> {
    let n = &slot.name;
    match slot.shape {
        WireShape::Direct | WireShape::Handle => vec![n.clone()],
        WireShape::Converted => vec![format!("{n}_value")],
        WireShape::Lent => vec![format!("({}{}*)isthmus_view_data({n})", constness(slot), slot.spelled.b)],
        WireShape::Span => vec![
            format!("({}{}*)isthmus_view_data({n})", constness(slot), element_b(slot)),
            abi::count_expr(slot),
        ],
    }
}

/// Declared return type of the native callee.
fn native_return(ret: Option<&SlotPlan>) -> String {
    match ret {
        None => "void".to_string(),
        Some(r) if r.shape == WireShape::Span => format!("{}*", element_b(r)),
        Some(r) => r.spelled.b.clone(),
    }
}

fn native_prototype(plan: &FunctionPlan) -> String {
    let mut params: Vec<String> = plan.params.iter().flat_map(native_params).collect();
    let ret = plan.ret.as_ref();
    let span_ret = ret.is_some_and(|r| r.shape == WireShape::Span);
    let head = if plan.fallible {
        if let Some(r) = ret {
            params.push(format!("{}* {OUT}", native_return(Some(r))));
        }
        if span_ret {
            params.push(format!("size_t* {OUT}_len"));
        }
        "int".to_string()
    } else {
        if span_ret {
            params.push(format!("size_t* {OUT}_len"));
        }
        native_return(ret)
    };
    if params.is_empty() {
        params.push("void".to_string());
    }
    format!("{head} {}({})", plan.native, params.join(", "))
}

fn fail_jump(e: &mut Emitter) {
    e.line("if (status != ISTHMUS_SUCCESS) goto cleanup;");
}

/// Guard prologue for one parameter of a B callee.
fn acquire(e: &mut Emitter, slot: &SlotPlan) {
    let n = &slot.name;
    if let Some(guard) = &slot.guard {
        e.line(format!("/* {guard} */"));
        let mutable = u8::from(slot.mutable());
        e.line(format!("status = isthmus_borrow_begin({n}, {mutable}, &{n}_token);"));
        fail_jump(e);
        e.line(format!("{n}_held = 1;"));
        if slot.shape == WireShape::Span {
            e.line(format!(
                "status = isthmus_view_check({n}, 0, {}, {});",
                abi::count_expr(slot),
                abi::stride_of(slot)
            ));
            fail_jump(e);
        }
    }
    if slot.mode() == isthmus_core::OwnershipMode::Share {
        e.line(format!("status = isthmus_share_increment({n});"));
        fail_jump(e);
        e.line(format!("{n}_shared = 1;"));
    }
    if slot.shape == WireShape::Converted {
        e.line(format!("{} {n}_value;", slot.spelled.b));
        e.line(format!(
            "memcpy(&{n}_value, {n}, {n}_len < sizeof {n}_value ? {n}_len : sizeof {n}_value);"
        ));
    }
}

fn release(e: &mut Emitter, slot: &SlotPlan) {
    let n = &slot.name;
    if slot.mode() == isthmus_core::OwnershipMode::Share {
        e.open(format!("if ({n}_shared) {{"));
        e.line(format!("uint8_t released = isthmus_share_decrement({n});"));
        e.line("if (status == ISTHMUS_SUCCESS) status = released;");
        e.close("}");
    }
    if slot.guard.is_some() {
        e.open(format!("if ({n}_held) {{"));
        e.line(format!("uint8_t released = isthmus_borrow_end({n}, {n}_token);"));
        e.line("if (status == ISTHMUS_SUCCESS) status = released;");
        e.close("}");
    }
}

fn store_result(e: &mut Emitter, ret: &SlotPlan) {
    match ret.shape {
        WireShape::Handle if ret.transfers_handles() => {
            e.line(format!("status = isthmus_transfer(value, {OUT});"));
        }
        WireShape::Direct if ret.transfers_handles() => {
            e.line(format!("status = {}(&value);", abi::transfer_helper_b(&ret.spelled.b)));
            e.line(format!("if (status == ISTHMUS_SUCCESS) *{OUT} = value;"));
        }
        WireShape::Direct | WireShape::Handle | WireShape::Lent => e.line(format!("*{OUT} = value;")),
        WireShape::Converted => e.line(format!(
            "memcpy({OUT}, &value, {OUT}_cap < sizeof value ? {OUT}_cap : sizeof value);"
        )),
        WireShape::Span => {
            let stride = ret.element.as_ref().map_or(1, |el| el.stride);
            e.line(format!(
                "status = isthmus_lend((const uint8_t*)value, value_len * {stride}, {OUT});"
            ));
            e.line(format!("if (status == ISTHMUS_SUCCESS) *{OUT}_len = value_len;"));
        }
    }
}

fn call_native(e: &mut Emitter, plan: &FunctionPlan) {
    let mut args: Vec<String> = plan.params.iter().flat_map(native_args).collect();
    let ret = plan.ret.as_ref();
    let span_ret = ret.is_some_and(|r| r.shape == WireShape::Span);
    e.open("{");
    if let Some(r) = ret {
        e.line(format!("{} value;", native_return(Some(r))));
        if span_ret {
            e.line("size_t value_len = 0;");
        }
    }
    if plan.fallible {
        if ret.is_some() {
            args.push("&value".to_string());
        }
        if span_ret {
            args.push("&value_len".to_string());
        }
        e.line(format!("int rc = {}({});", plan.native, args.join(", ")));
        e.open("if (rc != 0) {");
        e.line("status = isthmus_raise_code(rc);");
        e.line("goto cleanup;");
        e.close("}");
    } else {
        if span_ret {
            args.push("&value_len".to_string());
        }
        let call = format!("{}({})", plan.native, args.join(", "));
        match ret {
            Some(_) => e.line(format!("value = {call};")),
            None => e.line(format!("{call};")),
        }
    }
    if let Some(r) = ret {
        store_result(e, r);
    }
    e.close("}");
}

/// Glue exported by B for an A caller.
fn callee_glue(e: &mut Emitter, plan: &FunctionPlan) {
    let proto = abi::c_prototype(plan);
    e.line(format!("{};", native_prototype(plan)));
    e.line(format!("{proto};"));
    e.blank();
    e.line("#ifdef ISTHMUS_IMPLEMENTATION");
    e.open(format!("{proto} {{"));
    e.line("uint8_t status = ISTHMUS_SUCCESS;");
    for slot in &plan.params {
        if slot.guard.is_some() {
            e.line(format!("uint64_t {}_token = 0;", slot.name));
            e.line(format!("int {}_held = 0;", slot.name));
        }
        if slot.mode() == isthmus_core::OwnershipMode::Share {
            e.line(format!("int {}_shared = 0;", slot.name));
        }
    }
    for slot in &plan.params {
        acquire(e, slot);
    }
    call_native(e, plan);
    e.label("cleanup:");
    for slot in plan.params.iter().rev() {
        release(e, slot);
    }
    e.line(format!("if (status != ISTHMUS_SUCCESS && {ERR}) isthmus_last_error({ERR});"));
    e.line("return status;");
    e.close("}");
    e.line("#endif");
}

/// Parameters of the B-side wrapper around an A export.
fn caller_params(slot: &SlotPlan) -> Vec<String> {
    let n = &slot.name;
    match slot.shape {
        WireShape::Direct | WireShape::Handle => vec![format!("{} {n}", slot.spelled.b)],
        WireShape::Converted => vec![format!("const {}* {n}", slot.spelled.b)],
        WireShape::Lent => vec![format!("{}{}* {n}", constness(slot), slot.spelled.b)],
        WireShape::Span => vec![
            format!("{}{}* {n}", constness(slot), element_b(slot)),
            format!("size_t {n}_len"),
        ],
    }
}

fn caller_out(ret: &SlotPlan) -> Vec<String> {
    match ret.shape {
        WireShape::Direct | WireShape::Handle | WireShape::Converted => {
            vec![format!("{}* {OUT}", ret.spelled.b)]
        }
        WireShape::Lent => vec![format!("{}* {OUT}", isthmus_catalog::native::B_HANDLE_TYPE)],
        WireShape::Span => vec![
            format!("{}* {OUT}", element_b(ret)),
            format!("size_t {OUT}_cap"),
            format!("size_t* {OUT}_len"),
        ],
    }
}

fn byte_len(slot: &SlotPlan) -> String {
    match slot.shape {
        WireShape::Span => format!("{}_len * {}", slot.name, abi::stride_of(slot)),
        _ => format!("sizeof *{}", slot.name),
    }
}

/// B-side wrapper that calls glue exported by A.
fn caller_glue(e: &mut Emitter, plan: &FunctionPlan) {
    e.line(format!("{};", abi::c_prototype(plan)));
    e.blank();

    let mut params: Vec<String> = plan.params.iter().flat_map(caller_params).collect();
    if let Some(r) = &plan.ret {
        params.extend(caller_out(r));
    }
    params.push(format!("isthmus_error_t* {ERR}"));
    e.open(format!(
        "static inline uint8_t {}({}) {{",
        plan.native,
        params.join(", ")
    ));
    e.line("uint8_t status = ISTHMUS_SUCCESS;");
    let lent: Vec<&SlotPlan> = plan
        .params
        .iter()
        .filter(|s| matches!(s.shape, WireShape::Lent | WireShape::Span))
        .collect();
    for slot in &lent {
        e.line(format!("isthmus_handle_t {}_lent = 0;", slot.name));
        e.line(format!("int {}_held = 0;", slot.name));
    }
    let moved: Vec<&SlotPlan> = plan
        .params
        .iter()
        .filter(|s| s.transfers_handles() && matches!(s.shape, WireShape::Handle | WireShape::Direct))
        .collect();
    for slot in &moved {
        let n = &slot.name;
        match slot.shape {
            WireShape::Handle => e.line(format!("isthmus_handle_t {n}_moved = 0;")),
            _ => e.line(format!("{} {n}_moved = {n};", slot.spelled.b)),
        }
    }
    let ret_span = plan.ret.as_ref().filter(|r| r.shape == WireShape::Span);
    if ret_span.is_some() {
        e.line(format!("isthmus_handle_t {OUT}_region = 0;"));
    }
    for slot in &lent {
        e.line(format!(
            "status = isthmus_lend((const uint8_t*){}, {}, &{}_lent);",
            slot.name,
            byte_len(slot),
            slot.name
        ));
        fail_jump(e);
        e.line(format!("{}_held = 1;", slot.name));
    }
    // Moved values change owner before the call; the originals are stale
    // from here on.
    for slot in &moved {
        let n = &slot.name;
        match slot.shape {
            WireShape::Handle => e.line(format!("status = isthmus_transfer({n}, &{n}_moved);")),
            _ => e.line(format!(
                "status = {}(&{n}_moved);",
                abi::transfer_helper_b(&slot.spelled.b)
            )),
        }
        fail_jump(e);
    }

    let mut args = Vec::new();
    for slot in &plan.params {
        let n = &slot.name;
        match slot.shape {
            WireShape::Direct | WireShape::Handle if slot.transfers_handles() => {
                args.push(format!("{n}_moved"));
            }
            WireShape::Direct | WireShape::Handle => args.push(n.clone()),
            WireShape::Converted => {
                args.push(format!("(const uint8_t*){n}"));
                args.push(format!("sizeof *{n}"));
            }
            WireShape::Lent => args.push(format!("{n}_lent")),
            WireShape::Span => {
                args.push(format!("{n}_lent"));
                args.push(format!("{n}_len"));
            }
        }
    }
    if let Some(r) = &plan.ret {
        match r.shape {
            WireShape::Direct | WireShape::Handle | WireShape::Lent => args.push(OUT.to_string()),
            WireShape::Converted => {
                args.push(format!("(uint8_t*){OUT}"));
                args.push(format!("sizeof *{OUT}"));
            }
            WireShape::Span => {
                args.push(format!("&{OUT}_region"));
                args.push(format!("{OUT}_len"));
            }
        }
    }
    args.push(ERR.to_string());
    e.line(format!("status = {}({});", plan.symbol, args.join(", ")));
    if let Some(r) = ret_span {
        let stride = r.element.as_ref().map_or(1, |el| el.stride);
        e.open("if (status == ISTHMUS_SUCCESS) {");
        e.line(format!(
            "status = isthmus_reclaim({OUT}_region, (uint8_t*){OUT}, {OUT}_cap * {stride});"
        ));
        e.line(format!("if (*{OUT}_len > {OUT}_cap) *{OUT}_len = {OUT}_cap;"));
        e.close("}");
    }

    e.label("cleanup:");
    for slot in lent.iter().rev() {
        let n = &slot.name;
        let dst = if slot.mutable() {
            format!("(uint8_t*){n}")
        } else {
            "NULL".to_string()
        };
        e.open(format!("if ({n}_held) {{"));
        e.line(format!(
            "uint8_t reclaimed = isthmus_reclaim({n}_lent, {dst}, {});",
            byte_len(slot)
        ));
        e.line("if (status == ISTHMUS_SUCCESS) status = reclaimed;");
        e.close("}");
    }
    e.line(format!(
        "if (status != ISTHMUS_SUCCESS && {ERR} && {ERR}->discriminant == ISTHMUS_SUCCESS) isthmus_last_error({ERR});"
    ));
    e.line("return status;");
    e.close("}");
}

/// Render the B artifact of a function pair.
pub fn render_function(plan: &FunctionPlan) -> String {
    let mut e = Emitter::new();
    let title = format!("{} ({})", plan.item, plan.direction);
    preamble(&mut e, &title, &plan.symbol);
    for guard in plan.guards() {
        e.line(format!("/* guard: {guard} */"));
    }
    match plan.direction {
        Direction::AToB => callee_glue(&mut e, plan),
        Direction::BToA => caller_glue(&mut e, plan),
    }
    e.blank();
    epilogue(&mut e, &plan.symbol);
    e.finish()
}

fn literal(value: ConstValue) -> String {
    match value {
        ConstValue::Bool(b) => u8::from(b).to_string(),
        ConstValue::Int(i) => i.to_string(),
        ConstValue::Float(f) => format!("{f:?}"),
    }
}

pub fn render_constant(plan: &ConstantPlan) -> String {
    let mut e = Emitter::new();
    preamble(&mut e, &plan.item.to_string(), &plan.symbol);
    e.line(format!(
        "#define {} (({}){})",
        plan.symbol.to_uppercase(),
        plan.spelled.b,
        literal(plan.value)
    ));
    e.blank();
    epilogue(&mut e, &plan.symbol);
    e.finish()
}

fn payload_field(name: &str) -> String {
    name.to_lowercase()
}

fn struct_body(e: &mut Emitter, plan: &TypePlan) {
    match plan.edge.type_kind {
        TypeKind::Value => {
            e.open(format!("{} {{", plan.spelled.b));
            for field in &plan.fields {
                e.line(format!("{} {};", field.spelled.b, field.name));
            }
            e.close("};");
        }
        TypeKind::Optional | TypeKind::Result | TypeKind::EnumWithPayload => {
            let upper = plan.symbol.to_uppercase();
            e.open("enum {");
            for (tag, variant) in plan.variants.iter().enumerate() {
                e.line(format!("{upper}_{} = {tag},", variant.name.to_uppercase()));
            }
            e.close("};");
            e.open(format!("{} {{", plan.spelled.b));
            e.line("uint32_t tag;");
            e.open("union {");
            e.line("uint8_t empty;");
            for variant in &plan.variants {
                if let Some(payload) = &variant.payload {
                    e.line(format!("{} {};", payload.b, payload_field(&variant.name)));
                }
            }
            e.close("} payload;");
            e.close("};");
        }
        _ => {}
    }
}

fn size_asserts(e: &mut Emitter, plan: &TypePlan, spelling: &str) {
    if let Some(size) = plan.size {
        e.line(format!(
            "_Static_assert(sizeof({spelling}) == {size}, \"{spelling} layout changed\");"
        ));
    }
    if let Some(align) = plan.align {
        e.line(format!(
            "_Static_assert(_Alignof({spelling}) == {align}, \"{spelling} alignment changed\");"
        ));
    }
}

/// Move each handle embedded in an identity-layout composite in place.
fn transfer_handles(e: &mut Emitter, plan: &TypePlan) {
    let b = &plan.spelled.b;
    e.open(format!(
        "static inline uint8_t {}({b}* value) {{",
        abi::transfer_helper_b(b)
    ));
    if plan.variants.is_empty() {
        e.line("uint8_t status = ISTHMUS_SUCCESS;");
        for field in plan.fields.iter().filter(|f| f.moves_handles()) {
            let f = &field.name;
            if field.handle {
                e.line(format!("status = isthmus_transfer(value->{f}, &value->{f});"));
            } else {
                e.line(format!(
                    "status = {}(&value->{f});",
                    abi::transfer_helper_b(&field.spelled.b)
                ));
            }
            e.line("if (status != ISTHMUS_SUCCESS) return status;");
        }
        e.line("return status;");
    } else {
        let upper = plan.symbol.to_uppercase();
        e.open("switch (value->tag) {");
        for variant in plan.variants.iter().filter(|v| v.moves_handles()) {
            let Some(payload) = &variant.payload else {
                continue;
            };
            let field = format!("value->payload.{}", payload_field(&variant.name));
            e.label(format!("case {upper}_{}:", variant.name.to_uppercase()));
            if variant.handle {
                e.line(format!("return isthmus_transfer({field}, &{field});"));
            } else {
                e.line(format!("return {}(&{field});", abi::transfer_helper_b(&payload.b)));
            }
        }
        e.label("default:");
        e.line("return ISTHMUS_SUCCESS;");
        e.close("}");
    }
    e.close("}");
}

fn vtable(e: &mut Emitter, plan: &TypePlan) {
    if plan.vtable.is_empty() {
        return;
    }
    e.open(format!("struct {}_vtable {{", plan.symbol));
    for method in &plan.vtable {
        e.line(format!(
            "uint8_t (*{method})(isthmus_handle_t self, const uint8_t* args, size_t args_len, isthmus_error_t* err);"
        ));
    }
    e.close("};");
}

/// Render the B artifact of a type pair.
pub fn render_type(plan: &TypePlan) -> String {
    let mut e = Emitter::new();
    let title = format!("type {} <-> {} ({})", plan.edge.a, plan.edge.b, plan.edge.kind);
    preamble(&mut e, &title, &plan.symbol);
    match plan.edge.kind {
        TransformKind::IdentityLayout => {
            if let Some(element) = &plan.element {
                e.line(format!(
                    "/* {} crosses as (isthmus_handle_t, size_t) over {}-byte elements */",
                    plan.spelled.b, element.stride
                ));
                let el = &element.spelled.b;
                e.line(format!(
                    "_Static_assert(sizeof({el}) == {}, \"{el} stride changed\");",
                    element.stride
                ));
            } else {
                struct_body(&mut e, plan);
                size_asserts(&mut e, plan, &plan.spelled.b);
                if plan.edge.holds_handles {
                    transfer_handles(&mut e, plan);
                }
            }
        }
        TransformKind::StructuralCopy => struct_body(&mut e, plan),
        TransformKind::OpaqueHandle => {
            e.line(format!("/* {} crosses as isthmus_handle_t */", plan.edge.b));
            e.open(format!(
                "static inline uint8_t {}_release(isthmus_handle_t self) {{",
                plan.symbol
            ));
            e.line("return isthmus_release(self);");
            e.close("}");
            vtable(&mut e, plan);
        }
        TransformKind::ExplicitConversionFunction => {
            if let Some(pair) = &plan.edge.conversion {
                e.line(format!(
                    "/* {} crosses as bytes through {} and {} */",
                    plan.spelled.b, pair.to_b, pair.to_a
                ));
            }
            if plan.edge.type_kind == TypeKind::Value && !plan.fields.is_empty() {
                struct_body(&mut e, plan);
            }
        }
    }
    e.blank();
    epilogue(&mut e, &plan.symbol);
    e.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use isthmus_core::Side;

    #[test]
    fn view_callee_checks_bounds_before_the_call() {
        let fixture = testing::fixture();
        let src = render_function(&fixture.function_plan("sum"));
        assert!(src.contains("int32_t sum(const int32_t* values, size_t values_len);"));
        assert!(src.contains("/* bounds-check(values: count=runtime, stride=4) */"));
        let check = src.find("isthmus_view_check(values, 0, values_len, 4)").unwrap();
        let call = src.find("value = sum(").unwrap();
        let end = src.find("isthmus_borrow_end(values, values_token)").unwrap();
        assert!(check < call && call < end);
        assert!(src.contains("#ifdef ISTHMUS_IMPLEMENTATION"));
    }

    #[test]
    fn fallible_callee_raises_error_code() {
        let fixture = testing::fixture();
        let src = render_function(&fixture.function_plan("parse_port"));
        assert!(src.contains("int parse_port(int32_t code, uint16_t* out);"));
        assert!(src.contains("int rc = parse_port(code, &value);"));
        assert!(src.contains("status = isthmus_raise_code(rc);"));
    }

    #[test]
    fn lent_value_is_borrowed_exclusively() {
        let fixture = testing::fixture();
        let src = render_function(&fixture.function_plan("translate"));
        assert!(src.contains("void translate(struct point_t* p, double dx);"));
        assert!(src.contains("isthmus_borrow_begin(p, 1, &p_token);"));
        assert!(src.contains("translate((struct point_t*)isthmus_view_data(p), dx);"));
    }

    #[test]
    fn b_wrapper_for_a_export() {
        let fixture = testing::fixture();
        let src = render_function(&fixture.function_plan("watch"));
        assert!(src.contains(
            "uint8_t isthmus_watch(isthmus_handle_t s, int64_t* out, isthmus_error_t* err);"
        ));
        assert!(src.contains("static inline uint8_t watch(isthmus_handle_t s, int64_t* out, isthmus_error_t* err) {"));
        assert!(src.contains("status = isthmus_watch(s, out, err);"));
    }

    #[test]
    fn constants_and_types() {
        let fixture = testing::fixture();
        let src = render_constant(&fixture.constant_plan("MAX_PORTS"));
        assert!(src.contains("#define ISTHMUS_MAX_PORTS ((int32_t)64)"));

        let point = render_type(&fixture.type_plan(Side::A, "Point"));
        assert!(point.contains("struct point_t {\n    double x;\n    double y;\n};"));
        assert!(point.contains("_Static_assert(sizeof(struct point_t) == 16"));

        let db = render_type(&fixture.type_plan(Side::A, "Db"));
        assert!(db.contains("struct isthmus_Db_vtable {"));
        assert!(db.contains("uint8_t (*close)(isthmus_handle_t self"));
    }

    #[test]
    fn callee_moves_returned_handles() {
        let fixture = testing::fixture();
        let src = render_function(&fixture.function_plan("db_open"));
        assert!(src.contains("isthmus_handle_t db_open(void);"));
        let call = src.find("value = db_open();").unwrap();
        let moved = src.find("status = isthmus_transfer(value, out);").unwrap();
        assert!(call < moved);
        assert!(!src.contains("*out = value;"));

        let src = render_function(&fixture.function_plan("db_open_checked"));
        assert!(src.contains("int db_open_checked(isthmus_handle_t* out);"));
        assert!(src.contains("int rc = db_open_checked(&value);"));
        assert!(src.contains("status = isthmus_transfer(value, out);"));
    }

    #[test]
    fn caller_moves_handles_before_the_call() {
        let fixture = testing::fixture();
        let src = render_function(&fixture.function_plan("adopt"));
        assert!(src.contains("static inline uint8_t adopt(isthmus_handle_t db, isthmus_error_t* err) {"));
        assert!(src.contains("isthmus_handle_t db_moved = 0;"));
        let moved = src.find("status = isthmus_transfer(db, &db_moved);").unwrap();
        let call = src.find("status = isthmus_adopt(db_moved, err);").unwrap();
        assert!(moved < call);
    }

    #[test]
    fn embedded_handles_move_with_their_container() {
        let fixture = testing::fixture();
        let src = render_function(&fixture.function_plan("stash_entry"));
        assert!(src.contains("struct entry_t entry_moved = entry;"));
        let moved = src.find("status = entry_t_transfer_handles(&entry_moved);").unwrap();
        let call = src.find("status = isthmus_stash_entry(entry_moved, out, err);").unwrap();
        assert!(moved < call);

        let src = render_function(&fixture.function_plan("swap_entry"));
        assert!(src.contains("status = entry_t_transfer_handles(&value);"));
        assert!(src.contains("if (status == ISTHMUS_SUCCESS) *out = value;"));

        let entry = render_type(&fixture.type_plan(Side::B, "entry_t"));
        assert!(entry.contains("static inline uint8_t entry_t_transfer_handles(struct entry_t* value) {"));
        assert!(entry.contains("status = isthmus_transfer(value->db, &value->db);"));

        let result = render_type(&fixture.type_plan(Side::A, "OpenResult"));
        assert!(result.contains("    uint32_t tag;"));
        assert!(result.contains("    case ISTHMUS_OPENRESULT_OK:\n        return isthmus_transfer(value->payload.ok, &value->payload.ok);"));
        assert!(result.contains("default:\n        return ISTHMUS_SUCCESS;"));
    }
}
