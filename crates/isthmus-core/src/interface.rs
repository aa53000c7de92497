//! The Interface Description: the language-neutral AST the engine consumes.
//!
//! Descriptions are produced by the per-language front ends and stored as
//! TOML (`*.bridge.toml`) or JSON. A minimal description:
//!
//! ```toml
//! [bridge]
//! name = "math"
//!
//! [[types]]
//! name = "IntSeq"
//! side = "b"
//! kind = "sequence"
//! element = "int32_t"
//! counterpart = "Int32Slice"
//!
//! [[functions]]
//! name = "sum"
//! side = "b"
//! returns = "int32_t"
//! params = [{ name = "values", type = "IntSeq", mode = "borrowImmutable" }]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::LoadError;
use crate::function::DeclaredFunction;
use crate::ident::{ItemId, QualifiedName, Side};
use crate::types::DeclaredType;

/// Schema versions this engine understands.
pub const SUPPORTED_SCHEMA: &str = "^1.0";

/// Header of a description file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeHeader {
    pub name: String,
    #[serde(default = "default_schema")]
    pub schema: String,
}

fn default_schema() -> String {
    "1.0.0".to_string()
}

/// A user-supplied pair of conversion functions between two types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversionPair {
    /// A-side type.
    pub a: QualifiedName,
    /// B-side type.
    pub b: QualifiedName,
    /// Function converting an A value into a B value.
    #[serde(alias = "to-b")]
    pub to_b: String,
    /// Function converting a B value into an A value.
    #[serde(alias = "to-a")]
    pub to_a: String,
}

/// Literal value of a declared constant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConstValue {
    Bool(bool),
    Int(i64),
    Float(f64),
}

/// A constant declared on one side and mirrored on the other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclaredConstant {
    pub name: QualifiedName,
    pub side: Side,
    #[serde(rename = "type")]
    pub ty: QualifiedName,
    pub value: ConstValue,
}

impl DeclaredConstant {
    pub fn id(&self) -> ItemId {
        ItemId::constant(self.side, self.name.clone())
    }
}

/// A borrowed view of one declared item, in description order.
#[derive(Debug, Clone, Copy)]
pub enum DeclaredItem<'a> {
    Type(&'a DeclaredType),
    Constant(&'a DeclaredConstant),
    Function(&'a DeclaredFunction),
}

impl DeclaredItem<'_> {
    pub fn id(&self) -> ItemId {
        match self {
            Self::Type(t) => ItemId::ty(t.side, t.name.clone()),
            Self::Constant(c) => c.id(),
            Self::Function(f) => f.id(),
        }
    }
}

/// The complete, immutable input of one engine run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceDescription {
    pub bridge: BridgeHeader,
    #[serde(default)]
    pub types: Vec<DeclaredType>,
    #[serde(default)]
    pub constants: Vec<DeclaredConstant>,
    #[serde(default)]
    pub functions: Vec<DeclaredFunction>,
    #[serde(default)]
    pub conversions: Vec<ConversionPair>,
}

impl InterfaceDescription {
    /// An empty description with the given bridge name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            bridge: BridgeHeader {
                name: name.into(),
                schema: default_schema(),
            },
            types: Vec::new(),
            constants: Vec::new(),
            functions: Vec::new(),
            conversions: Vec::new(),
        }
    }

    /// Parse a description from a TOML string.
    pub fn parse(input: &str) -> Result<Self, LoadError> {
        let desc: InterfaceDescription = toml::from_str(input)?;
        desc.validate()?;
        Ok(desc)
    }

    /// Parse a description from a JSON string.
    pub fn parse_json(input: &str) -> Result<Self, LoadError> {
        let desc: InterfaceDescription = serde_json::from_str(input)?;
        desc.validate()?;
        Ok(desc)
    }

    /// Load a description from a file; `.json` files are parsed as JSON,
    /// everything else as TOML.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::parse_json(&content),
            _ => Self::parse(&content),
        }
    }

    fn validate(&self) -> Result<(), LoadError> {
        if self.bridge.name.trim().is_empty() {
            return Err(LoadError::InvalidDescription {
                detail: "bridge.name is required".to_string(),
            });
        }

        let found = semver::Version::parse(&self.bridge.schema).map_err(|e| {
            LoadError::InvalidDescription {
                detail: format!("bridge.schema '{}': {e}", self.bridge.schema),
            }
        })?;
        let supported = semver::VersionReq::parse(SUPPORTED_SCHEMA).map_err(|e| {
            LoadError::InvalidDescription {
                detail: format!("supported schema requirement: {e}"),
            }
        })?;
        if !supported.matches(&found) {
            return Err(LoadError::UnsupportedSchema {
                found: found.to_string(),
                supported: SUPPORTED_SCHEMA.to_string(),
            });
        }

        for param in self.functions.iter().flat_map(|f| f.params.iter()) {
            if param.name.is_empty() {
                return Err(LoadError::InvalidDescription {
                    detail: "parameters must be named".to_string(),
                });
            }
        }
        Ok(())
    }

    /// All declared items: types, then constants, then functions, each
    /// group in declaration order.
    pub fn items(&self) -> Vec<DeclaredItem<'_>> {
        let mut items: Vec<DeclaredItem<'_>> =
            self.types.iter().map(DeclaredItem::Type).collect();
        items.extend(self.constants.iter().map(DeclaredItem::Constant));
        items.extend(self.functions.iter().map(DeclaredItem::Function));
        items
    }

    pub fn item_count(&self) -> usize {
        self.types.len() + self.constants.len() + self.functions.len()
    }
}
