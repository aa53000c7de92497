//! Identities: qualified names, boundary sides, and declared-item keys.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A `::`-separated qualified name (e.g., `geo::Point`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QualifiedName(String);

impl QualifiedName {
    /// Create a qualified name from any string-like value.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Iterate over the `::`-separated path segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split("::")
    }

    /// The final path segment.
    pub fn last_segment(&self) -> &str {
        self.0.rsplit("::").next().unwrap_or(&self.0)
    }

    /// A flat identifier usable as a symbol in either language
    /// (`geo::Point` → `geo_Point`).
    pub fn mangled(&self) -> String {
        self.segments().collect::<Vec<_>>().join("_")
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QualifiedName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for QualifiedName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// One side of the linkage boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    /// The borrow-checked language.
    #[serde(rename = "a", alias = "A")]
    A,
    /// The language without a borrow checker.
    #[serde(rename = "b", alias = "B")]
    B,
}

impl Side {
    pub fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    /// Index into per-side arrays.
    pub fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
        }
    }
}

/// Direction of a crossing, named by caller and callee side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    AToB,
    BToA,
}

impl Direction {
    /// The direction of a call whose caller lives on `caller`.
    pub fn from_caller(caller: Side) -> Self {
        match caller {
            Side::A => Self::AToB,
            Side::B => Self::BToA,
        }
    }

    pub fn caller(self) -> Side {
        match self {
            Self::AToB => Side::A,
            Self::BToA => Side::B,
        }
    }

    pub fn callee(self) -> Side {
        self.caller().other()
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AToB => write!(f, "a-to-b"),
            Self::BToA => write!(f, "b-to-a"),
        }
    }
}

/// The category of a declared item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Type,
    Function,
    Constant,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type => write!(f, "type"),
            Self::Function => write!(f, "fn"),
            Self::Constant => write!(f, "const"),
        }
    }
}

/// Identity of a declared item. Types are unique per side; functions and
/// constants are keyed by the side that defines them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId {
    pub kind: ItemKind,
    pub side: Side,
    pub name: QualifiedName,
}

impl ItemId {
    pub fn new(kind: ItemKind, side: Side, name: impl Into<QualifiedName>) -> Self {
        Self {
            kind,
            side,
            name: name.into(),
        }
    }

    pub fn ty(side: Side, name: impl Into<QualifiedName>) -> Self {
        Self::new(ItemKind::Type, side, name)
    }

    pub fn function(side: Side, name: impl Into<QualifiedName>) -> Self {
        Self::new(ItemKind::Function, side, name)
    }

    pub fn constant(side: Side, name: impl Into<QualifiedName>) -> Self {
        Self::new(ItemKind::Constant, side, name)
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}:{}", self.kind, self.side, self.name)
    }
}
