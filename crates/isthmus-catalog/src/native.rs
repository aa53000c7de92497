//! Native spelling of catalog types on each side.
//!
//! Side A is spelled as Rust paths, side B as C declarations. Names that are
//! not in the catalog are spelled verbatim.

use isthmus_core::{QualifiedName, Side, TypeKind};

use crate::catalog::TypeCatalog;
use crate::primitives;

/// C type used for every handle slot on side B.
pub const B_HANDLE_TYPE: &str = "isthmus_handle_t";

/// Spell `name` (declared on `side`) in that side's native syntax.
///
/// View-like B types are spelled as a pointer to their element; the length
/// travels as a separate `size_t`.
pub fn native_spelling(catalog: &TypeCatalog, side: Side, name: &QualifiedName) -> String {
    if primitives::is_primitive(side, name.as_str()) {
        return match (side, name.as_str()) {
            (Side::A, "unit") => "()".to_string(),
            _ => name.to_string(),
        };
    }
    let Some(ty) = catalog.get(side, name) else {
        return name.to_string();
    };
    match side {
        Side::A => name.to_string(),
        Side::B => match ty.kind {
            TypeKind::OpaqueHandle => B_HANDLE_TYPE.to_string(),
            TypeKind::Sequence | TypeKind::SharedView => match &ty.element {
                Some(element) => format!("{}*", native_spelling(catalog, side, element)),
                None => "void*".to_string(),
            },
            _ => format!("struct {}", name.mangled()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogConfig;
    use isthmus_core::DeclaredType;

    #[test]
    fn spells_both_sides() {
        let mut cat = TypeCatalog::with_primitives(CatalogConfig::default());
        cat.register_type(DeclaredType::sequence("IntSeq", Side::B, "int32_t")).unwrap();
        cat.register_type(DeclaredType::opaque_handle("db::Conn", Side::B)).unwrap();
        cat.register_type(DeclaredType::new(
            "geo::Point",
            Side::B,
            TypeKind::Value,
        ))
        .unwrap();

        let b = |n: &str| native_spelling(&cat, Side::B, &QualifiedName::new(n));
        assert_eq!(b("int32_t"), "int32_t");
        assert_eq!(b("IntSeq"), "int32_t*");
        assert_eq!(b("db::Conn"), B_HANDLE_TYPE);
        assert_eq!(b("geo::Point"), "struct geo_Point");

        let a = |n: &str| native_spelling(&cat, Side::A, &QualifiedName::new(n));
        assert_eq!(a("unit"), "()");
        assert_eq!(a("i32"), "i32");
        assert_eq!(a("std::Unknown"), "std::Unknown");
    }
}
