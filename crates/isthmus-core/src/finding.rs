//! Verification findings and the runtime guards they mandate.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ownership::ViewBound;

/// A runtime check the generated glue must perform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "guard", rename_all = "kebab-case")]
pub enum Guard {
    /// Bounds check before any element access of a view.
    BoundsCheck { value: String, bound: ViewBound },
    /// Borrow token presented back at call completion.
    LivenessToken { value: String, mutable: bool },
}

impl Guard {
    /// The crossing value the guard protects.
    pub fn value(&self) -> &str {
        match self {
            Self::BoundsCheck { value, .. } | Self::LivenessToken { value, .. } => value,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::BoundsCheck { .. } => "bounds-check",
            Self::LivenessToken { .. } => "liveness-token",
        }
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BoundsCheck { value, bound } => write!(f, "bounds-check({value}: {bound})"),
            Self::LivenessToken { value, mutable } => {
                let access = if *mutable { "exclusive" } else { "shared" };
                write!(f, "liveness-token({value}: {access})")
            }
        }
    }
}

/// The safety verdict for one declared item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", content = "detail", rename_all = "kebab-case")]
pub enum Finding {
    /// Memory safety follows from static structure alone.
    Proved,
    /// Safe only with the listed runtime guards in place.
    GuardInserted(Vec<Guard>),
    /// Generation halted for this item.
    Rejected(String),
}

impl Finding {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected(_))
    }

    pub fn guards(&self) -> &[Guard] {
        match self {
            Self::GuardInserted(guards) => guards,
            _ => &[],
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Proved => "proved",
            Self::GuardInserted(_) => "guard-inserted",
            Self::Rejected(_) => "rejected",
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proved => write!(f, "Proved"),
            Self::GuardInserted(guards) => {
                let list: Vec<String> = guards.iter().map(|g| g.to_string()).collect();
                write!(f, "GuardInserted({})", list.join(", "))
            }
            Self::Rejected(reason) => write!(f, "Rejected({reason})"),
        }
    }
}
