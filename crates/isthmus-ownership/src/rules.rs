//! Structural ownership rules.
//!
//! Rules are evaluated independently and grouped by priority. The lowest
//! priority group with any applicable rule decides; rules inside that group
//! must agree, otherwise the declaration is ambiguous. A lower-priority rule
//! never breaks a tie at a higher priority.
//!
//! | priority | rule | applies to |
//! |---|---|---|
//! | 1 | annotation | explicit `ownership` on the parameter or return |
//! | 2 | moved-value | `byValueMove` |
//! | 2 | copied-value | `byValueCopy` of a type without a reference count |
//! | 3 | borrowed-reference | borrows of non-view types |
//! | 3 | unique-access | borrows of move-only values and handles |
//! | 4 | view-window | borrows of sequences and shared views |
//! | 5 | shared-count | reference-counted types |

use std::fmt;

use isthmus_core::{
    BoundCount, Capability, DeclaredType, OwnershipMode, OwnershipRule, ParameterMode,
    ResolvedOwnership, TypeKind, ViewBound,
};

/// Everything the rules look at for one crossing value.
#[derive(Debug, Clone, Copy)]
pub struct RuleInput<'a> {
    pub mode: ParameterMode,
    pub ty: &'a DeclaredType,
    pub annotation: Option<OwnershipMode>,
    /// Element stride in bytes, for view-like types with a known element layout.
    pub stride: Option<u64>,
    /// Declared fixed element count.
    pub bound: Option<u64>,
}

impl<'a> RuleInput<'a> {
    pub fn new(mode: ParameterMode, ty: &'a DeclaredType) -> Self {
        Self {
            mode,
            ty,
            annotation: None,
            stride: None,
            bound: None,
        }
    }

    pub fn annotated(mut self, annotation: Option<OwnershipMode>) -> Self {
        self.annotation = annotation;
        self
    }

    pub fn with_stride(mut self, stride: Option<u64>) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_bound(mut self, bound: Option<u64>) -> Self {
        self.bound = bound;
        self
    }

    fn view_bound(&self) -> Option<ViewBound> {
        let stride = self.stride?;
        let count = match self.bound {
            Some(n) => BoundCount::Fixed(n),
            None => BoundCount::Runtime,
        };
        Some(ViewBound { count, stride })
    }
}

/// Why no single mode could be derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OwnershipConflict {
    /// Rules at the same priority disagree, or a rule contradicts the type.
    Ambiguous(String),
    /// No rule applies.
    NoRule(String),
}

impl fmt::Display for OwnershipConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ambiguous(cause) | Self::NoRule(cause) => f.write_str(cause),
        }
    }
}

/// One rule's verdict. `Err` means the rule applies but the declaration
/// contradicts it.
type Verdict = Result<ResolvedOwnership, String>;

struct Candidate {
    rule: OwnershipRule,
    verdict: Verdict,
}

fn annotation(input: &RuleInput<'_>) -> Option<Verdict> {
    let mode = input.annotation?;
    let mut own =
        ResolvedOwnership::new(mode, OwnershipRule::Annotation).mutable(input.mode.is_mutable());
    match mode {
        OwnershipMode::View => {
            if let Some(bound) = input.view_bound() {
                own = own.with_bound(bound);
            }
        }
        OwnershipMode::Borrow if input.mode == ParameterMode::ByValueCopy => {
            own = own.by_copy();
        }
        _ => {}
    }
    Some(Ok(own))
}

fn moved_value(input: &RuleInput<'_>) -> Option<Verdict> {
    if input.mode != ParameterMode::ByValueMove {
        return None;
    }
    if input.ty.kind == TypeKind::SharedView {
        // A shared view moved by value is still only a window.
        return Some(match input.view_bound() {
            Some(bound) => Ok(ResolvedOwnership::new(
                OwnershipMode::View,
                OwnershipRule::MovedValue,
            )
            .with_bound(bound)),
            None => Err(format!(
                "shared view '{}' has no known element stride",
                input.ty.name
            )),
        });
    }
    Some(Ok(ResolvedOwnership::new(
        OwnershipMode::Transfer,
        OwnershipRule::MovedValue,
    )))
}

fn copied_value(input: &RuleInput<'_>) -> Option<Verdict> {
    if input.mode != ParameterMode::ByValueCopy
        || input.ty.capabilities.contains(Capability::RefCounted)
    {
        return None;
    }
    if !input.ty.capabilities.is_copyable() {
        return Some(Err(format!(
            "'{}' is passed byValueCopy but is not copyable",
            input.ty.name
        )));
    }
    Some(Ok(
        ResolvedOwnership::new(OwnershipMode::Borrow, OwnershipRule::CopiedValue).by_copy(),
    ))
}

fn borrowed_reference(input: &RuleInput<'_>) -> Option<Verdict> {
    if !input.mode.is_borrow() || input.ty.kind.is_view_like() {
        return None;
    }
    Some(Ok(ResolvedOwnership::new(
        OwnershipMode::Borrow,
        OwnershipRule::BorrowedReference,
    )
    .mutable(input.mode.is_mutable())))
}

fn unique_access(input: &RuleInput<'_>) -> Option<Verdict> {
    let caps = &input.ty.capabilities;
    let unique_kind = matches!(input.ty.kind, TypeKind::Value | TypeKind::OpaqueHandle);
    if !input.mode.is_borrow()
        || !unique_kind
        || !caps.is_move_only()
        || caps.contains(Capability::RefCounted)
    {
        return None;
    }
    // Move-only values can only be reached by one holder: either it hands
    // over exclusive access or it hands over the value.
    let own = if input.mode.is_mutable() {
        ResolvedOwnership::new(OwnershipMode::Borrow, OwnershipRule::UniqueAccess).mutable(true)
    } else {
        ResolvedOwnership::new(OwnershipMode::Transfer, OwnershipRule::UniqueAccess)
    };
    Some(Ok(own))
}

fn view_window(input: &RuleInput<'_>) -> Option<Verdict> {
    if !input.mode.is_borrow() || !input.ty.kind.is_view_like() {
        return None;
    }
    let bound = input.view_bound()?;
    Some(Ok(
        ResolvedOwnership::new(OwnershipMode::View, OwnershipRule::ViewWindow)
            .mutable(input.mode.is_mutable())
            .with_bound(bound),
    ))
}

fn shared_count(input: &RuleInput<'_>) -> Option<Verdict> {
    if !input.ty.capabilities.contains(Capability::RefCounted) {
        return None;
    }
    Some(Ok(ResolvedOwnership::new(
        OwnershipMode::Share,
        OwnershipRule::SharedCount,
    )))
}

type Rule = fn(&RuleInput<'_>) -> Option<Verdict>;

const RULES: [(OwnershipRule, Rule); 7] = [
    (OwnershipRule::Annotation, annotation),
    (OwnershipRule::MovedValue, moved_value),
    (OwnershipRule::CopiedValue, copied_value),
    (OwnershipRule::BorrowedReference, borrowed_reference),
    (OwnershipRule::UniqueAccess, unique_access),
    (OwnershipRule::ViewWindow, view_window),
    (OwnershipRule::SharedCount, shared_count),
];

fn describe(own: &ResolvedOwnership) -> String {
    if own.mutable {
        format!("{} (mut)", own.mode)
    } else {
        own.mode.to_string()
    }
}

/// Resolve the ownership mode of one crossing value.
pub fn resolve_ownership(input: &RuleInput<'_>) -> Result<ResolvedOwnership, OwnershipConflict> {
    let candidates: Vec<Candidate> = RULES
        .iter()
        .filter_map(|(rule, eval)| {
            eval(input).map(|verdict| Candidate {
                rule: *rule,
                verdict,
            })
        })
        .collect();

    let Some(top) = candidates.iter().map(|c| c.rule.priority()).min() else {
        let detail = if input.ty.kind.is_view_like() && input.stride.is_none() {
            " (element stride unknown)"
        } else {
            ""
        };
        return Err(OwnershipConflict::NoRule(format!(
            "no ownership rule applies to {} of {} '{}'{detail}",
            input.mode, input.ty.kind, input.ty.name
        )));
    };
    let winners: Vec<&Candidate> = candidates
        .iter()
        .filter(|c| c.rule.priority() == top)
        .collect();

    if let Some(contradiction) = winners.iter().find_map(|c| c.verdict.as_ref().err()) {
        return Err(OwnershipConflict::Ambiguous(contradiction.clone()));
    }

    let resolved: Vec<(OwnershipRule, &ResolvedOwnership)> = winners
        .iter()
        .filter_map(|c| c.verdict.as_ref().ok().map(|own| (c.rule, own)))
        .collect();
    let Some(&(_, first)) = resolved.first() else {
        return Err(OwnershipConflict::NoRule(format!(
            "no ownership rule resolved '{}'",
            input.ty.name
        )));
    };
    let agree = resolved.iter().all(|(_, own)| {
        own.mode == first.mode && own.mutable == first.mutable && own.by_copy == first.by_copy
    });
    if !agree {
        let parts: Vec<String> = resolved
            .iter()
            .map(|(rule, own)| format!("{rule} derives {}", describe(own)))
            .collect();
        return Err(OwnershipConflict::Ambiguous(format!(
            "{} '{}' under {}: {}",
            input.ty.kind,
            input.ty.name,
            input.mode,
            parts.join(", ")
        )));
    }
    Ok(*first)
}
