//! Ownership modes derived for every value that crosses the boundary.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Who may access or destroy a crossing value, and for how long.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnershipMode {
    /// The callee becomes sole owner.
    Transfer,
    /// The caller retains ownership; access is bounded to the call.
    Borrow,
    /// Reference counted; lifetime is that of the longest holder.
    Share,
    /// Non-owning window with an explicit validity bound.
    View,
}

impl fmt::Display for OwnershipMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Transfer => "Transfer",
            Self::Borrow => "Borrow",
            Self::Share => "Share",
            Self::View => "View",
        };
        f.write_str(s)
    }
}

/// Element count of a view window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoundCount {
    /// Count fixed by the declaration.
    Fixed(u64),
    /// Count supplied alongside the pointer at call time.
    Runtime,
}

impl fmt::Display for BoundCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(n) => write!(f, "{n}"),
            Self::Runtime => write!(f, "runtime"),
        }
    }
}

/// The bound a `View` callee must not read or write beyond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ViewBound {
    pub count: BoundCount,
    /// Element stride in bytes.
    pub stride: u64,
}

impl fmt::Display for ViewBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "count={}, stride={}", self.count, self.stride)
    }
}

/// Which resolution rule produced an ownership mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OwnershipRule {
    /// Explicit annotation on the parameter or return.
    Annotation,
    /// By-value move of an owning type.
    MovedValue,
    /// By-value copy of a copyable type.
    CopiedValue,
    /// Borrowed reference to a non-view type.
    BorrowedReference,
    /// Move-only types must cross under unique access.
    UniqueAccess,
    /// Sequence or shared-view type crossing as a window.
    ViewWindow,
    /// Thread-shareable reference-counted type.
    SharedCount,
}

impl OwnershipRule {
    /// Resolution priority; lower wins.
    pub fn priority(self) -> u8 {
        match self {
            Self::Annotation => 1,
            Self::MovedValue | Self::CopiedValue => 2,
            Self::BorrowedReference | Self::UniqueAccess => 3,
            Self::ViewWindow => 4,
            Self::SharedCount => 5,
        }
    }
}

impl fmt::Display for OwnershipRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Annotation => "annotation",
            Self::MovedValue => "moved-value",
            Self::CopiedValue => "copied-value",
            Self::BorrowedReference => "borrowed-reference",
            Self::UniqueAccess => "unique-access",
            Self::ViewWindow => "view-window",
            Self::SharedCount => "shared-count",
        };
        f.write_str(s)
    }
}

/// A resolved ownership decision for one crossing value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedOwnership {
    pub mode: OwnershipMode,
    pub rule: OwnershipRule,
    /// The callee may mutate through the crossing.
    pub mutable: bool,
    /// The callee receives a copy rather than a reference into caller memory.
    pub by_copy: bool,
    /// Present exactly when `mode` is `View`.
    pub bound: Option<ViewBound>,
}

impl ResolvedOwnership {
    pub fn new(mode: OwnershipMode, rule: OwnershipRule) -> Self {
        Self {
            mode,
            rule,
            mutable: false,
            by_copy: false,
            bound: None,
        }
    }

    pub fn mutable(mut self, mutable: bool) -> Self {
        self.mutable = mutable;
        self
    }

    pub fn by_copy(mut self) -> Self {
        self.by_copy = true;
        self
    }

    pub fn with_bound(mut self, bound: ViewBound) -> Self {
        self.bound = Some(bound);
        self
    }
}

impl fmt::Display for ResolvedOwnership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.mode)?;
        if self.mutable {
            write!(f, " (mut)")?;
        }
        if let Some(bound) = &self.bound {
            write!(f, " [{bound}]")?;
        }
        write!(f, " via {}", self.rule)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_priorities_follow_resolution_order() {
        assert!(OwnershipRule::Annotation.priority() < OwnershipRule::MovedValue.priority());
        assert_eq!(
            OwnershipRule::BorrowedReference.priority(),
            OwnershipRule::UniqueAccess.priority()
        );
        assert!(OwnershipRule::ViewWindow.priority() < OwnershipRule::SharedCount.priority());
    }

    #[test]
    fn display_includes_bound() {
        let own = ResolvedOwnership::new(OwnershipMode::View, OwnershipRule::ViewWindow)
            .with_bound(ViewBound {
                count: BoundCount::Runtime,
                stride: 4,
            });
        assert_eq!(own.to_string(), "View [count=runtime, stride=4] via view-window");
    }
}
