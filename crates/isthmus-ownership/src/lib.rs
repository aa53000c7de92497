//! Ownership & Lifetime Resolver for the isthmus bridge engine.
//!
//! Assigns exactly one [`OwnershipMode`](isthmus_core::OwnershipMode) to every
//! value that crosses the boundary: each parameter of a declared function and
//! its return value.
//!
//! ## Modules
//!
//! - [`rules`]: the prioritized structural rules and conflict detection
//! - [`resolver`]: per-function resolution into an append-only slot map

pub mod resolver;
pub mod rules;

pub use resolver::{element_stride, FunctionOwnership, OwnershipResolver, Slot, SlotOwnership};
pub use rules::{resolve_ownership, OwnershipConflict, RuleInput};
