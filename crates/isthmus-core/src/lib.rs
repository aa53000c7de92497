//! Core data model for the isthmus cross-language bridge engine.
//!
//! Language A is the borrow-checked side, Language B the side without a
//! borrow checker. Everything the pipeline stages exchange is defined here:
//!
//! - [`ident`]: qualified names, sides, directions, and item identities
//! - [`types`]: declared types, kinds, layouts, and capabilities
//! - [`function`]: declared functions and parameter modes
//! - [`ownership`]: derived ownership modes and view bounds
//! - [`edge`]: compatibility edges between A-side and B-side types
//! - [`finding`]: verification findings and runtime guards
//! - [`interface`]: the Interface Description and its loaders
//! - [`error`]: item-scoped error taxonomy and load errors
//! - [`hash`]: content fingerprints for emitted artifacts

pub mod edge;
pub mod error;
pub mod finding;
pub mod function;
pub mod hash;
pub mod ident;
pub mod interface;
pub mod ownership;
pub mod types;

pub use edge::{CompatibilityEdge, TransformKind};
pub use error::{BridgeError, LoadError};
pub use finding::{Finding, Guard};
pub use function::{DeclaredFunction, Parameter, ParameterMode};
pub use ident::{Direction, ItemId, ItemKind, QualifiedName, Side};
pub use interface::{
    ConstValue, ConversionPair, DeclaredConstant, DeclaredItem, InterfaceDescription,
};
pub use ownership::{BoundCount, OwnershipMode, OwnershipRule, ResolvedOwnership, ViewBound};
pub use types::{Capability, CapabilitySet, DeclaredType, SizeClass, TypeKind};
