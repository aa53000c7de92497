//! Compatibility edges: resolved mappings between an A-side and a B-side type.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ident::QualifiedName;
use crate::interface::ConversionPair;
use crate::types::{SizeClass, TypeKind};

/// How a value is transformed when it crosses an edge.
///
/// Variant order is the resolution preference: earlier variants are cheaper
/// at runtime and are tried first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransformKind {
    /// Same bytes on both sides.
    IdentityLayout,
    /// Crosses as a handle into the runtime handle table.
    OpaqueHandle,
    /// Field-by-field copy into the other side's representation.
    StructuralCopy,
    /// User-supplied conversion functions.
    ExplicitConversionFunction,
}

impl TransformKind {
    /// All kinds in resolution order.
    pub const ALL: [TransformKind; 4] = [
        Self::IdentityLayout,
        Self::OpaqueHandle,
        Self::StructuralCopy,
        Self::ExplicitConversionFunction,
    ];

    /// Relative runtime cost (lower is cheaper).
    pub fn cost(self) -> u8 {
        match self {
            Self::IdentityLayout => 0,
            Self::OpaqueHandle => 1,
            Self::StructuralCopy => 2,
            Self::ExplicitConversionFunction => 3,
        }
    }

    /// Whether the source keeps its own copy after crossing.
    pub fn source_retains_copy(self) -> bool {
        matches!(self, Self::StructuralCopy)
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::IdentityLayout => "identity-layout",
            Self::OpaqueHandle => "opaque-handle",
            Self::StructuralCopy => "structural-copy",
            Self::ExplicitConversionFunction => "explicit-conversion-function",
        };
        f.write_str(s)
    }
}

/// A proved mapping between a Language-A type and a Language-B type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityEdge {
    pub a: QualifiedName,
    pub b: QualifiedName,
    pub kind: TransformKind,
    /// Structural kind shared by both endpoints.
    pub type_kind: TypeKind,
    /// Representation that actually crosses (handles are pointer sized).
    pub wire_layout: SizeClass,
    /// The representation includes a success/failure discriminant.
    pub carries_discriminant: bool,
    /// Some component crosses as an opaque handle, so a copy would give the
    /// handle two owners.
    #[serde(default)]
    pub holds_handles: bool,
    /// Conversion functions for `ExplicitConversionFunction` edges.
    #[serde(default)]
    pub conversion: Option<ConversionPair>,
}

impl CompatibilityEdge {
    pub fn key(&self) -> (QualifiedName, QualifiedName) {
        (self.a.clone(), self.b.clone())
    }
}

impl fmt::Display for CompatibilityEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <-> {} ({})", self.a, self.b, self.kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolution_order_is_cost_order() {
        let mut sorted = TransformKind::ALL;
        sorted.sort_by_key(|k| k.cost());
        assert_eq!(sorted, TransformKind::ALL);
        assert!(TransformKind::IdentityLayout < TransformKind::ExplicitConversionFunction);
    }

    #[test]
    fn only_structural_copy_retains_source() {
        assert!(TransformKind::StructuralCopy.source_retains_copy());
        assert!(!TransformKind::OpaqueHandle.source_retains_copy());
    }
}
