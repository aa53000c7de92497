//! Built-in primitive pairs seeded into every catalog.

use isthmus_core::types::DeclaredType;
use isthmus_core::Side;

/// A primitive available on both sides with identical layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Primitive {
    /// Language-A spelling.
    pub a: &'static str,
    /// Language-B spelling.
    pub b: &'static str,
    /// Size in bytes; `None` means one machine word.
    pub size: Option<u64>,
}

/// Primitive pairs, stdint naming on side B.
pub const PRIMITIVES: &[Primitive] = &[
    Primitive { a: "i8", b: "int8_t", size: Some(1) },
    Primitive { a: "i16", b: "int16_t", size: Some(2) },
    Primitive { a: "i32", b: "int32_t", size: Some(4) },
    Primitive { a: "i64", b: "int64_t", size: Some(8) },
    Primitive { a: "u8", b: "uint8_t", size: Some(1) },
    Primitive { a: "u16", b: "uint16_t", size: Some(2) },
    Primitive { a: "u32", b: "uint32_t", size: Some(4) },
    Primitive { a: "u64", b: "uint64_t", size: Some(8) },
    Primitive { a: "f32", b: "float", size: Some(4) },
    Primitive { a: "f64", b: "double", size: Some(8) },
    Primitive { a: "bool", b: "_Bool", size: Some(1) },
    Primitive { a: "usize", b: "size_t", size: None },
    Primitive { a: "unit", b: "void", size: Some(0) },
];

/// Look up a primitive by its spelling on `side`.
pub fn lookup(side: Side, name: &str) -> Option<&'static Primitive> {
    PRIMITIVES.iter().find(|p| match side {
        Side::A => p.a == name,
        Side::B => p.b == name,
    })
}

pub fn is_primitive(side: Side, name: &str) -> bool {
    lookup(side, name).is_some()
}

/// Declarations for both spellings of every primitive.
pub fn declarations(word_bytes: u64) -> Vec<DeclaredType> {
    let mut decls = Vec::with_capacity(PRIMITIVES.len() * 2);
    for prim in PRIMITIVES {
        let size = prim.size.unwrap_or(word_bytes);
        for (side, name, counterpart) in [(Side::A, prim.a, prim.b), (Side::B, prim.b, prim.a)] {
            let ty = DeclaredType::scalar(name, side, size).with_counterpart(counterpart);
            decls.push(ty);
        }
    }
    decls
}
