//! Error taxonomy.
//!
//! [`BridgeError`] is item-scoped: it halts generation for the offending item
//! only. [`LoadError`] is run-scoped and stops a run before any item is
//! processed.

use crate::ident::ItemId;

/// Item-scoped failures raised by the pipeline stages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// A type identity was registered twice on the same side.
    #[error("duplicate type {item}: {cause}")]
    DuplicateType { item: ItemId, cause: String },

    /// No compatibility rule maps the type to its counterpart.
    #[error("incompatible type {item}: {cause}")]
    IncompatibleType { item: ItemId, cause: String },

    /// Ownership rules at the same priority disagree.
    #[error("ambiguous ownership in {item}: {cause}")]
    AmbiguousOwnership { item: ItemId, cause: String },

    /// The resolved ownership mode cannot be expressed through the edge.
    #[error("unrealizable ownership in {item}: {cause}")]
    UnrealizableOwnership { item: ItemId, cause: String },

    /// A fallible function has no discriminated result representation.
    #[error("unmapped failure channel in {item}: {cause}")]
    UnmappedFailureChannel { item: ItemId, cause: String },

    /// Safety verification failed.
    #[error("rejected {item}: {cause}")]
    Rejected { item: ItemId, cause: String },
}

impl BridgeError {
    pub fn duplicate(item: ItemId, cause: impl Into<String>) -> Self {
        Self::DuplicateType {
            item,
            cause: cause.into(),
        }
    }

    pub fn incompatible(item: ItemId, cause: impl Into<String>) -> Self {
        Self::IncompatibleType {
            item,
            cause: cause.into(),
        }
    }

    pub fn ambiguous(item: ItemId, cause: impl Into<String>) -> Self {
        Self::AmbiguousOwnership {
            item,
            cause: cause.into(),
        }
    }

    pub fn unrealizable(item: ItemId, cause: impl Into<String>) -> Self {
        Self::UnrealizableOwnership {
            item,
            cause: cause.into(),
        }
    }

    pub fn unmapped_failure(item: ItemId, cause: impl Into<String>) -> Self {
        Self::UnmappedFailureChannel {
            item,
            cause: cause.into(),
        }
    }

    pub fn rejected(item: ItemId, cause: impl Into<String>) -> Self {
        Self::Rejected {
            item,
            cause: cause.into(),
        }
    }

    /// The offending item.
    pub fn item(&self) -> &ItemId {
        match self {
            Self::DuplicateType { item, .. }
            | Self::IncompatibleType { item, .. }
            | Self::AmbiguousOwnership { item, .. }
            | Self::UnrealizableOwnership { item, .. }
            | Self::UnmappedFailureChannel { item, .. }
            | Self::Rejected { item, .. } => item,
        }
    }

    pub fn cause(&self) -> &str {
        match self {
            Self::DuplicateType { cause, .. }
            | Self::IncompatibleType { cause, .. }
            | Self::AmbiguousOwnership { cause, .. }
            | Self::UnrealizableOwnership { cause, .. }
            | Self::UnmappedFailureChannel { cause, .. }
            | Self::Rejected { cause, .. } => cause,
        }
    }

    /// Stable code used in reports.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateType { .. } => "duplicate-type",
            Self::IncompatibleType { .. } => "incompatible-type",
            Self::AmbiguousOwnership { .. } => "ambiguous-ownership",
            Self::UnrealizableOwnership { .. } => "unrealizable-ownership",
            Self::UnmappedFailureChannel { .. } => "unmapped-failure-channel",
            Self::Rejected { .. } => "rejected",
        }
    }

    /// Re-attribute the error to another item, keeping kind and cause.
    ///
    /// Used when a type-level failure surfaces while processing a function.
    pub fn reattributed(self, item: ItemId) -> Self {
        let cause = format!("{}: {}", self.item(), self.cause());
        match self {
            Self::DuplicateType { .. } => Self::duplicate(item, cause),
            Self::IncompatibleType { .. } => Self::incompatible(item, cause),
            Self::AmbiguousOwnership { .. } => Self::ambiguous(item, cause),
            Self::UnrealizableOwnership { .. } => Self::unrealizable(item, cause),
            Self::UnmappedFailureChannel { .. } => Self::unmapped_failure(item, cause),
            Self::Rejected { .. } => Self::rejected(item, cause),
        }
    }
}

/// Run-scoped failures while loading an Interface Description.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("invalid interface description: {detail}")]
    InvalidDescription { detail: String },

    #[error("unsupported schema version {found} (supported: {supported})")]
    UnsupportedSchema { found: String, supported: String },

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for item-scoped operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
