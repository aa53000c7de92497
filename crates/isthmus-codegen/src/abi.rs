//! The C ABI every glue symbol is exported with.
//!
//! A glue symbol takes each parameter in its wire shape, then an out slot
//! for the success value (if any), then a pointer to an error channel, and
//! returns the channel discriminant:
//!
//! | shape     | parameter                         | out slot                          |
//! |-----------|-----------------------------------|-----------------------------------|
//! | direct    | the B representation by value     | `T* out`                          |
//! | converted | `const uint8_t* x, size_t x_len`  | `uint8_t* out, size_t out_cap`    |
//! | handle    | `isthmus_handle_t x`              | `isthmus_handle_t* out`           |
//! | lent      | `isthmus_handle_t x`              | `isthmus_handle_t* out`           |
//! | span      | `isthmus_handle_t x, size_t x_len`| `isthmus_handle_t* out, size_t* out_len` |

use isthmus_core::{BoundCount, Guard, TransformKind};
use isthmus_catalog::B_HANDLE_TYPE;

use crate::plan::{FunctionPlan, SlotPlan, WireShape};

/// Name of the success out slot.
pub const OUT: &str = "out";
/// Name of the error channel slot.
pub const ERR: &str = "err";

pub fn len_name(slot: &SlotPlan) -> String {
    format!("{}_len", slot.name)
}

/// Rust type of the A-side mirror used for a structural copy.
pub fn repr_name(a_spelling: &str) -> String {
    let base = a_spelling.rsplit("::").next().unwrap_or(a_spelling);
    format!("{base}Repr")
}

/// Rust spelling of a direct value on the wire.
pub fn rust_direct(slot: &SlotPlan) -> String {
    if slot.transform == TransformKind::StructuralCopy {
        repr_name(&slot.spelled.a)
    } else {
        slot.spelled.a.clone()
    }
}

/// C parameters for one slot.
pub fn c_params(slot: &SlotPlan) -> Vec<String> {
    let n = &slot.name;
    match slot.shape {
        WireShape::Direct => vec![format!("{} {n}", slot.spelled.b)],
        WireShape::Converted => vec![format!("const uint8_t* {n}"), format!("size_t {n}_len")],
        WireShape::Handle | WireShape::Lent => vec![format!("{B_HANDLE_TYPE} {n}")],
        WireShape::Span => vec![format!("{B_HANDLE_TYPE} {n}"), format!("size_t {n}_len")],
    }
}

/// C out slot for a success value.
pub fn c_out(ret: &SlotPlan) -> Vec<String> {
    match ret.shape {
        WireShape::Direct => vec![format!("{}* {OUT}", ret.spelled.b)],
        WireShape::Converted => vec![format!("uint8_t* {OUT}"), format!("size_t {OUT}_cap")],
        WireShape::Handle | WireShape::Lent => vec![format!("{B_HANDLE_TYPE}* {OUT}")],
        WireShape::Span => vec![format!("{B_HANDLE_TYPE}* {OUT}"), format!("size_t* {OUT}_len")],
    }
}

/// Full C prototype of the glue symbol, without the trailing `;`.
pub fn c_prototype(plan: &FunctionPlan) -> String {
    let mut args: Vec<String> = plan.params.iter().flat_map(c_params).collect();
    if let Some(ret) = &plan.ret {
        args.extend(c_out(ret));
    }
    args.push(format!("isthmus_error_t* {ERR}"));
    format!("uint8_t {}({})", plan.symbol, args.join(", "))
}

/// Rust parameters of the `extern "C"` declaration for one slot.
pub fn rust_params(slot: &SlotPlan) -> Vec<(String, String)> {
    let n = slot.name.clone();
    let len = len_name(slot);
    match slot.shape {
        WireShape::Direct => vec![(n, rust_direct(slot))],
        WireShape::Converted => vec![(n, "*const u8".into()), (len, "usize".into())],
        WireShape::Handle | WireShape::Lent => vec![(n, "u64".into())],
        WireShape::Span => vec![(n, "u64".into()), (len, "usize".into())],
    }
}

pub fn rust_out(ret: &SlotPlan) -> Vec<(String, String)> {
    match ret.shape {
        WireShape::Direct => vec![(OUT.into(), format!("*mut {}", rust_direct(ret)))],
        WireShape::Converted => vec![
            (OUT.into(), "*mut u8".into()),
            (format!("{OUT}_cap"), "usize".into()),
        ],
        WireShape::Handle | WireShape::Lent => vec![(OUT.into(), "*mut u64".into())],
        WireShape::Span => vec![
            (OUT.into(), "*mut u64".into()),
            (format!("{OUT}_len"), "*mut usize".into()),
        ],
    }
}

pub fn rust_signature(plan: &FunctionPlan) -> String {
    let mut args: Vec<String> = plan
        .params
        .iter()
        .flat_map(rust_params)
        .map(|(n, t)| format!("{n}: {t}"))
        .collect();
    if let Some(ret) = &plan.ret {
        args.extend(rust_out(ret).into_iter().map(|(n, t)| format!("{n}: {t}")));
    }
    args.push(format!("{ERR}: *mut RawChannel"));
    format!("fn {}({}) -> u8", plan.symbol, args.join(", "))
}

/// Element count checked by a view's bounds guard.
pub fn count_expr(slot: &SlotPlan) -> String {
    match &slot.guard {
        Some(Guard::BoundsCheck { bound, .. }) => match bound.count {
            BoundCount::Fixed(n) => n.to_string(),
            BoundCount::Runtime => len_name(slot),
        },
        _ => len_name(slot),
    }
}

pub fn stride_of(slot: &SlotPlan) -> u64 {
    match &slot.guard {
        Some(Guard::BoundsCheck { bound, .. }) => bound.stride,
        _ => slot.element.as_ref().map_or(1, |e| e.stride),
    }
}

/// C helper that gives every handle embedded in a composite a fresh owner.
pub fn transfer_helper_b(spelled_b: &str) -> String {
    format!("{}_transfer_handles", spelled_b.trim_start_matches("struct "))
}

/// A-side scalars that cross as their native-endian bytes.
pub fn is_scalar_a(spelling: &str) -> bool {
    isthmus_catalog::primitives::lookup(isthmus_core::Side::A, spelling)
        .is_some_and(|p| p.a != "unit")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn prototypes_follow_shapes() {
        let fixture = testing::fixture();
        assert_eq!(
            c_prototype(&fixture.function_plan("sum")),
            "uint8_t isthmus_sum(isthmus_handle_t values, size_t values_len, int32_t* out, isthmus_error_t* err)"
        );
        assert_eq!(
            rust_signature(&fixture.function_plan("db_close")),
            "fn isthmus_db_close(db: u64, err: *mut RawChannel) -> u8"
        );
        let translate = fixture.function_plan("translate");
        assert_eq!(translate.params[0].shape, WireShape::Lent);
        assert_eq!(
            c_prototype(&translate),
            "uint8_t isthmus_translate(isthmus_handle_t p, double dx, isthmus_error_t* err)"
        );
    }

    #[test]
    fn repr_names_drop_paths() {
        assert_eq!(repr_name("net::PortResult"), "PortResultRepr");
        assert!(is_scalar_a("i32"));
        assert!(!is_scalar_a("unit"));
        assert_eq!(transfer_helper_b("struct entry_t"), "entry_t_transfer_handles");
    }
}
