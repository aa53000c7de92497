//! Pipeline orchestration for the isthmus bridge engine.
//!
//! Runs an Interface Description through every stage, item by item:
//! type catalog, ownership resolution, signature checking, safety
//! verification and glue generation. Items are independent, so the
//! per-item stages run on the rayon pool; the report keeps declaration
//! order.

pub mod cancel;
pub mod config;
pub mod error;
pub mod gate;
pub mod pipeline;

pub use cancel::CancelToken;
pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use gate::{gate_or_halt, verification_gate, GateConfig, GateDecision};
pub use pipeline::{Engine, RunOutput};
