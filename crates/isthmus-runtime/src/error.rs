//! Runtime hazards.
//!
//! Hazards are programmer errors on one side of the boundary. They surface
//! through the error channel instead of corrupting ownership state.

use crate::handle::Handle;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error("handle {handle} was already invalidated")]
    AlreadyInvalidated { handle: Handle },

    /// Access through a handle whose value moved elsewhere.
    #[error("stale handle {handle}: ownership was transferred or released")]
    StaleHandle { handle: Handle },

    #[error("unknown handle {handle}")]
    UnknownHandle { handle: Handle },

    #[error("reentrant mutation of handle {handle}: {detail}")]
    ReentrantMutation { handle: Handle, detail: String },

    #[error("bounds violation on handle {handle}: {detail}")]
    BoundsViolation { handle: Handle, detail: String },

    #[error("type mismatch on handle {handle}: expected {expected}, found {found}")]
    TypeMismatch {
        handle: Handle,
        expected: String,
        found: String,
    },

    #[error("handle {handle} is not thread-shareable but was shared from another thread")]
    CrossThreadShare { handle: Handle },
}

impl RuntimeError {
    /// Stable hazard code carried in the error channel payload.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AlreadyInvalidated { .. } => "already-invalidated",
            Self::StaleHandle { .. } => "stale-handle",
            Self::UnknownHandle { .. } => "unknown-handle",
            Self::ReentrantMutation { .. } => "reentrant-mutation",
            Self::BoundsViolation { .. } => "bounds-violation",
            Self::TypeMismatch { .. } => "type-mismatch",
            Self::CrossThreadShare { .. } => "cross-thread-share",
        }
    }
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
