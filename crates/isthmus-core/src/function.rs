//! Declared functions and their parameter modes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ident::{Direction, ItemId, QualifiedName, Side};
use crate::ownership::OwnershipMode;

/// How the caller hands a parameter to the callee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParameterMode {
    ByValueMove,
    ByValueCopy,
    BorrowImmutable,
    BorrowMutable,
}

impl ParameterMode {
    pub fn is_borrow(self) -> bool {
        matches!(self, Self::BorrowImmutable | Self::BorrowMutable)
    }

    pub fn is_mutable(self) -> bool {
        matches!(self, Self::BorrowMutable)
    }
}

impl fmt::Display for ParameterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ByValueMove => "byValueMove",
            Self::ByValueCopy => "byValueCopy",
            Self::BorrowImmutable => "borrowImmutable",
            Self::BorrowMutable => "borrowMutable",
        };
        f.write_str(s)
    }
}

/// A single declared parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    /// Type name on the function's defining side.
    #[serde(rename = "type")]
    pub ty: QualifiedName,
    pub mode: ParameterMode,
    /// Explicit ownership annotation; overrides every structural default.
    #[serde(default)]
    pub ownership: Option<OwnershipMode>,
    /// Declared fixed element count for view crossings.
    #[serde(default)]
    pub bound: Option<u64>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, ty: impl Into<QualifiedName>, mode: ParameterMode) -> Self {
        Self {
            name: name.into(),
            ty: ty.into(),
            mode,
            ownership: None,
            bound: None,
        }
    }

    pub fn annotated(mut self, ownership: OwnershipMode) -> Self {
        self.ownership = Some(ownership);
        self
    }
}

/// A function implemented on one side and callable from the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredFunction {
    pub name: QualifiedName,
    /// The side that implements the function (the callee side).
    pub side: Side,
    #[serde(default)]
    pub params: Vec<Parameter>,
    #[serde(default)]
    pub returns: Option<QualifiedName>,
    /// Whether the function may signal failure instead of returning normally.
    #[serde(default)]
    pub fallible: bool,
    /// Explicit ownership annotation for the return value.
    #[serde(default)]
    pub return_ownership: Option<OwnershipMode>,
    /// The callee may retain control past the call's return.
    #[serde(default)]
    pub asynchronous: bool,
    #[serde(default)]
    pub generics: Vec<String>,
}

impl DeclaredFunction {
    pub fn new(name: impl Into<QualifiedName>, side: Side) -> Self {
        Self {
            name: name.into(),
            side,
            params: Vec::new(),
            returns: None,
            fallible: false,
            return_ownership: None,
            asynchronous: false,
            generics: Vec::new(),
        }
    }

    pub fn param(mut self, param: Parameter) -> Self {
        self.params.push(param);
        self
    }

    pub fn returning(mut self, ty: impl Into<QualifiedName>) -> Self {
        self.returns = Some(ty.into());
        self
    }

    pub fn fallible(mut self) -> Self {
        self.fallible = true;
        self
    }

    pub fn id(&self) -> ItemId {
        ItemId::function(self.side, self.name.clone())
    }

    pub fn caller_side(&self) -> Side {
        self.side.other()
    }

    pub fn direction(&self) -> Direction {
        Direction::from_caller(self.caller_side())
    }

    /// Every type name the signature mentions, parameters first.
    pub fn signature_types(&self) -> Vec<&QualifiedName> {
        let mut tys: Vec<&QualifiedName> = self.params.iter().map(|p| &p.ty).collect();
        tys.extend(self.returns.iter());
        tys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_predicates() {
        assert!(ParameterMode::BorrowMutable.is_borrow());
        assert!(ParameterMode::BorrowMutable.is_mutable());
        assert!(ParameterMode::BorrowImmutable.is_borrow());
        assert!(!ParameterMode::BorrowImmutable.is_mutable());
        assert!(!ParameterMode::ByValueMove.is_borrow());
    }

    #[test]
    fn function_direction_follows_callee_side() {
        let f = DeclaredFunction::new("math::sum", Side::B);
        assert_eq!(f.caller_side(), Side::A);
        assert_eq!(f.direction(), Direction::AToB);
    }

    #[test]
    fn signature_types_in_order() {
        let f = DeclaredFunction::new("f", Side::B)
            .param(Parameter::new("a", "i32", ParameterMode::ByValueCopy))
            .param(Parameter::new("b", "Buf", ParameterMode::BorrowMutable))
            .returning("bool");
        let names: Vec<&str> = f.signature_types().iter().map(|q| q.as_str()).collect();
        assert_eq!(names, vec!["i32", "Buf", "bool"]);
    }

    #[test]
    fn parameter_mode_serde_names() {
        let json = serde_json::to_string(&ParameterMode::BorrowImmutable).unwrap();
        assert_eq!(json, "\"borrowImmutable\"");
    }
}
