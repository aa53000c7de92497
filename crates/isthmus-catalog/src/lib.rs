//! Type catalog for the isthmus bridge engine.
//!
//! Registers the native types of both sides, seeds the primitive pairs, and
//! resolves [`CompatibilityEdge`](isthmus_core::CompatibilityEdge)s between an
//! A-side type and its B-side counterpart.
//!
//! ## Modules
//!
//! - [`catalog`]: registration and edge resolution
//! - [`primitives`]: built-in primitive pairs
//! - [`layout`]: C-style layout derivation for declared values
//! - [`conversion`]: registry of user-supplied conversion functions
//! - [`native`]: native spelling of catalog types on each side

pub mod catalog;
pub mod conversion;
pub mod layout;
pub mod native;
pub mod primitives;

pub use catalog::{CatalogConfig, TypeCatalog};
pub use conversion::ConversionRegistry;
pub use layout::align_up;
pub use native::{native_spelling, B_HANDLE_TYPE};
