//! Glue generation for the isthmus bridge engine.
//!
//! Every verified item becomes a pair of artifacts rendered from a single
//! plan, one per language.
//!
//! - [`plan`]: wire shapes, spellings and guards for an item
//! - [`abi`]: the C ABI shared by both renderers
//! - [`render_a`]: Language-A (Rust) glue
//! - [`render_b`]: Language-B (C) glue
//! - [`generate`]: plan and render in one step
//! - [`artifact`]: artifact identity, sets and on-disk layout
//! - [`runtime_header`]: the C header for the runtime entry points
//! - [`value`]: dynamic values in the Language-B layout
//! - [`executor`]: runs a plan in-process against bound natives

pub mod abi;
pub mod artifact;
mod emitter;
pub mod error;
pub mod executor;
pub mod generate;
pub mod plan;
pub mod render_a;
pub mod render_b;
pub mod runtime_header;
pub mod value;

#[cfg(test)]
mod testing;

pub use artifact::{ArtifactPair, ArtifactSet, GlueArtifact};
pub use error::{CodegenError, Result};
pub use executor::{CallOutcome, GlueExecutor, NativeError, NativeFn, NativeResult, Wire};
pub use generate::{generate_constant, generate_function, generate_type, render_pair};
pub use plan::{
    plan_constant, plan_function, plan_type, CodegenConfig, ConstantPlan, FunctionPlan, GluePlan,
    SlotPlan, TypePlan, WireShape,
};
pub use value::{Conversions, Marshaler, Value};
