//! Code generation and glue execution errors.

use thiserror::Error;

use isthmus_core::ItemId;
use isthmus_runtime::{Discriminant, ErrorChannelValue, RuntimeError};

#[derive(Debug, Error)]
pub enum CodegenError {
    #[error("cannot generate glue for {item}: {detail}")]
    Unrenderable { item: ItemId, detail: String },

    #[error("cannot marshal {value} across {edge}: {detail}")]
    Marshal {
        value: String,
        edge: String,
        detail: String,
    },

    #[error("no glue plan for '{symbol}'")]
    UnknownFunction { symbol: String },

    #[error("no native implementation bound for '{symbol}'")]
    Unbound { symbol: String },

    #[error("conversion function '{name}' is not registered")]
    MissingConversion { name: String },

    #[error("'{symbol}' takes {expected} argument(s), got {found}")]
    Arity {
        symbol: String,
        expected: usize,
        found: usize,
    },

    /// The call failed on the far side and came back through the error channel.
    #[error("call failed with {0}")]
    Channel(ErrorChannelValue),

    #[error("failed to write artifacts: {0}")]
    Io(#[from] std::io::Error),
}

impl CodegenError {
    pub fn marshal(value: impl Into<String>, edge: impl ToString, detail: impl Into<String>) -> Self {
        Self::Marshal {
            value: value.into(),
            edge: edge.to_string(),
            detail: detail.into(),
        }
    }

    /// The channel value, if the failure crossed the boundary.
    pub fn channel(&self) -> Option<&ErrorChannelValue> {
        match self {
            Self::Channel(value) => Some(value),
            _ => None,
        }
    }

    pub fn discriminant(&self) -> Option<Discriminant> {
        self.channel().map(|c| c.discriminant)
    }
}

impl From<ErrorChannelValue> for CodegenError {
    fn from(value: ErrorChannelValue) -> Self {
        Self::Channel(value)
    }
}

/// Hazards always surface through the channel.
impl From<RuntimeError> for CodegenError {
    fn from(err: RuntimeError) -> Self {
        Self::Channel(err.into())
    }
}

pub type Result<T> = std::result::Result<T, CodegenError>;
