//! The C header for the runtime support library's entry points.

use crate::plan::CodegenConfig;

/// File name every B artifact includes.
pub const RUNTIME_HEADER: &str = "isthmus_runtime.h";

const ENTRY_POINTS: &[&str] = &[
    "uint8_t isthmus_transfer(isthmus_handle_t handle, isthmus_handle_t* out);",
    "uint8_t isthmus_release(isthmus_handle_t handle);",
    "uint8_t isthmus_borrow_begin(isthmus_handle_t handle, _Bool mutable_, uint64_t* token);",
    "uint8_t isthmus_borrow_end(isthmus_handle_t handle, uint64_t token);",
    "uint8_t isthmus_share_increment(isthmus_handle_t handle);",
    "uint8_t isthmus_share_decrement(isthmus_handle_t handle);",
    "uint8_t isthmus_view_check(isthmus_handle_t handle, size_t offset, size_t count, size_t stride);",
    "const uint8_t* isthmus_view_data(isthmus_handle_t handle);",
    "uint8_t isthmus_lend(const uint8_t* data, size_t len, isthmus_handle_t* out);",
    "uint8_t isthmus_reclaim(isthmus_handle_t handle, uint8_t* dst, size_t cap);",
    "uint8_t isthmus_raise_code(int32_t code);",
    "uint8_t isthmus_last_error(isthmus_error_t* out);",
    "void isthmus_error_free(isthmus_error_t* err);",
];

/// Render the runtime header. Glue symbols carry `config.runtime_prefix`;
/// the runtime's own entry points are always `isthmus_*`.
pub fn runtime_header(config: &CodegenConfig) -> String {
    let mut out = String::new();
    out.push_str("/* isthmus runtime support library. Generated; do not edit. */\n");
    out.push_str("#ifndef ISTHMUS_RUNTIME_H\n#define ISTHMUS_RUNTIME_H\n\n");
    out.push_str("#include <stddef.h>\n#include <stdint.h>\n\n");
    out.push_str(&format!(
        "/* Glue symbols in this bridge are prefixed with \"{}_\". */\n\n",
        config.runtime_prefix
    ));
    out.push_str("typedef uint64_t isthmus_handle_t;\n\n");
    out.push_str("typedef struct isthmus_error {\n");
    out.push_str("    uint8_t discriminant;\n");
    out.push_str("    uint8_t* payload;\n");
    out.push_str("    size_t payload_len;\n");
    out.push_str("} isthmus_error_t;\n\n");
    for (name, code) in [
        ("SUCCESS", 0),
        ("FAILURE", 1),
        ("PANIC", 2),
        ("ERROR_CODE", 3),
        ("HAZARD", 4),
    ] {
        out.push_str(&format!("#define ISTHMUS_{name} {code}\n"));
    }
    out.push('\n');
    for entry in ENTRY_POINTS {
        out.push_str(entry);
        out.push('\n');
    }
    out.push_str("\n#endif /* ISTHMUS_RUNTIME_H */\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use isthmus_runtime::Discriminant;

    #[test]
    fn codes_match_the_runtime() {
        let header = runtime_header(&CodegenConfig::default());
        for (name, d) in [
            ("SUCCESS", Discriminant::Success),
            ("PANIC", Discriminant::Panic),
            ("HAZARD", Discriminant::Hazard),
        ] {
            assert!(header.contains(&format!("#define ISTHMUS_{name} {}", d.code())));
        }
        assert!(header.contains("typedef uint64_t isthmus_handle_t;"));
        assert!(header.contains("uint8_t isthmus_lend("));
    }
}
