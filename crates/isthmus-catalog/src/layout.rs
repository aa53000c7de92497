//! Layout derivation for declared value types.
//!
//! Follows C layout rules: each field is placed at its natural alignment and
//! the struct is padded to its largest field alignment. Tagged unions are a
//! `uint32_t` tag followed by a union of the payloads.

use isthmus_core::SizeClass;

/// Round `value` up to a multiple of `align`.
pub fn align_up(value: u64, align: u64) -> u64 {
    if align <= 1 {
        value
    } else {
        value.div_ceil(align) * align
    }
}

/// Derive a struct layout from its field layouts. Returns `Opaque` if any
/// field is opaque.
pub fn struct_layout(fields: &[SizeClass]) -> SizeClass {
    let mut size: u64 = 0;
    let mut max_align: u64 = 1;
    for field in fields {
        let (fsize, falign) = match field {
            SizeClass::Known { size, align } => (*size, *align),
            SizeClass::Opaque => return SizeClass::Opaque,
        };
        size = align_up(size, falign);
        size += fsize;
        max_align = max_align.max(falign);
    }
    SizeClass::known(align_up(size, max_align), max_align)
}

/// Size of the tag in front of every tagged union.
pub const TAG_SIZE: u64 = 4;

/// Derive a tagged-union layout from its payload layouts. The union always
/// has a one-byte member, so it is never empty. Returns `Opaque` if any
/// payload is opaque.
pub fn tagged_layout(payloads: &[SizeClass]) -> SizeClass {
    let (mut size, mut align) = (1, 1);
    for payload in payloads {
        match payload {
            SizeClass::Known { size: s, align: a } => {
                size = size.max(*s);
                align = align.max(*a);
            }
            SizeClass::Opaque => return SizeClass::Opaque,
        }
    }
    let offset = align_up(TAG_SIZE, align);
    let align = align.max(TAG_SIZE);
    SizeClass::known(align_up(offset + size, align), align)
}

/// Wire layout of a (pointer, length) pair.
pub fn span_layout(word_bytes: u64) -> SizeClass {
    SizeClass::known(word_bytes * 2, word_bytes)
}

/// Wire layout of a handle.
pub fn handle_layout() -> SizeClass {
    SizeClass::known(8, 8)
}
