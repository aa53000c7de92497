//! Verification gate: decides whether a run's report passes the build step.

use isthmus_verify::VerificationReport;

use crate::error::EngineError;

/// The gate's decision for one report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// No rejections, and guarded items within the limit.
    Pass { guarded: usize },
    /// The build step must stop.
    Halt { rejected: usize, guarded: usize },
}

impl GateDecision {
    pub fn passed(&self) -> bool {
        matches!(self, Self::Pass { .. })
    }
}

/// Configuration for the verification gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateConfig {
    /// Maximum number of guarded items before halting. `None` allows any.
    pub max_guards: Option<usize>,
}

impl GateConfig {
    /// Development gate: any report without rejections passes.
    pub fn development() -> Self {
        Self { max_guards: None }
    }

    /// Strict gate: every crossing must be statically proved.
    pub fn strict() -> Self {
        Self {
            max_guards: Some(0),
        }
    }

    pub fn with_max_guards(mut self, max: Option<usize>) -> Self {
        self.max_guards = max;
        self
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self::development()
    }
}

/// Run the gate over a report.
pub fn verification_gate(report: &VerificationReport, config: &GateConfig) -> GateDecision {
    let rejected = report.summary.rejected;
    let guarded = report.summary.guarded;

    if rejected > 0 {
        return GateDecision::Halt { rejected, guarded };
    }
    if let Some(max) = config.max_guards {
        if guarded > max {
            return GateDecision::Halt { rejected, guarded };
        }
    }
    GateDecision::Pass { guarded }
}

/// Run the gate and return an error if it halts.
pub fn gate_or_halt(report: &VerificationReport, config: &GateConfig) -> Result<(), EngineError> {
    match verification_gate(report, config) {
        GateDecision::Pass { .. } => Ok(()),
        GateDecision::Halt { rejected, guarded } => {
            Err(EngineError::GateHalted { rejected, guarded })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use isthmus_core::{BoundCount, BridgeError, Finding, Guard, ItemId, Side, ViewBound};
    use isthmus_verify::ReportEntry;

    fn guarded() -> ReportEntry {
        ReportEntry::new(
            ItemId::function(Side::B, "sum"),
            Finding::GuardInserted(vec![Guard::BoundsCheck {
                value: "values".into(),
                bound: ViewBound {
                    count: BoundCount::Runtime,
                    stride: 4,
                },
            }]),
        )
    }

    fn proved() -> ReportEntry {
        ReportEntry::new(ItemId::ty(Side::A, "Point"), Finding::Proved)
    }

    #[test]
    fn development_gate_allows_guards() {
        let report = VerificationReport::build("math", vec![proved(), guarded()]);
        let decision = verification_gate(&report, &GateConfig::development());
        assert_eq!(decision, GateDecision::Pass { guarded: 1 });
        assert!(gate_or_halt(&report, &GateConfig::development()).is_ok());
    }

    #[test]
    fn strict_gate_blocks_guards() {
        let report = VerificationReport::build("math", vec![proved(), guarded()]);
        let decision = verification_gate(&report, &GateConfig::strict());
        assert_eq!(
            decision,
            GateDecision::Halt {
                rejected: 0,
                guarded: 1
            }
        );
        let relaxed = GateConfig::strict().with_max_guards(Some(1));
        assert!(verification_gate(&report, &relaxed).passed());
    }

    #[test]
    fn rejections_always_halt() {
        let item = ItemId::function(Side::B, "parse");
        let failed = ReportEntry::failed(
            item.clone(),
            &[BridgeError::unmapped_failure(item, "no discriminant")],
        );
        let report = VerificationReport::build("math", vec![proved(), failed]);
        let err = gate_or_halt(&report, &GateConfig::development()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::GateHalted {
                rejected: 1,
                guarded: 0
            }
        ));
    }

    #[test]
    fn empty_report_passes_strict_gate() {
        let report = VerificationReport::build("empty", Vec::new());
        assert!(verification_gate(&report, &GateConfig::strict()).passed());
    }
}
