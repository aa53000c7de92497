//! Run-level engine errors.

use thiserror::Error;

use isthmus_codegen::CodegenError;
use isthmus_core::LoadError;

/// Errors that stop a run or a build step as a whole. Item-scoped failures
/// never appear here; they are entries in the verification report.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("verification gate halted: {rejected} rejected, {guarded} guarded item(s)")]
    GateHalted { rejected: usize, guarded: usize },

    #[error("run cancelled after {completed} of {total} item(s)")]
    Cancelled { completed: usize, total: usize },

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Codegen(#[from] CodegenError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
