//! Verification report: the ordered (item, finding) list for one run.

use std::fmt;

use serde::{Deserialize, Serialize};

use isthmus_core::{BridgeError, Finding, ItemId};

/// Severity of a report entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Warning => write!(f, "WARN"),
            Severity::Info => write!(f, "INFO"),
        }
    }
}

/// A pipeline error as it appears in the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedError {
    pub code: String,
    pub cause: String,
}

impl From<&BridgeError> for ReportedError {
    fn from(err: &BridgeError) -> Self {
        Self {
            code: err.code().to_string(),
            cause: err.cause().to_string(),
        }
    }
}

/// The verdict for one declared item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub item: ItemId,
    pub finding: Finding,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ReportedError>,
}

impl ReportEntry {
    pub fn new(item: ItemId, finding: Finding) -> Self {
        Self {
            item,
            finding,
            errors: Vec::new(),
        }
    }

    /// An entry for an item halted by pipeline errors.
    pub fn failed(item: ItemId, errors: &[BridgeError]) -> Self {
        let reason = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        Self {
            item,
            finding: Finding::Rejected(reason),
            errors: errors.iter().map(ReportedError::from).collect(),
        }
    }

    pub fn severity(&self) -> Severity {
        match self.finding {
            Finding::Rejected(_) => Severity::Error,
            Finding::GuardInserted(_) => Severity::Warning,
            Finding::Proved => Severity::Info,
        }
    }
}

/// Summary statistics for a report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub total: usize,
    pub proved: usize,
    pub guarded: usize,
    pub rejected: usize,
    /// Total number of runtime guards across all guarded items.
    pub guards: usize,
}

impl ReportSummary {
    fn of(entries: &[ReportEntry]) -> Self {
        let mut summary = Self {
            total: entries.len(),
            ..Self::default()
        };
        for entry in entries {
            match &entry.finding {
                Finding::Proved => summary.proved += 1,
                Finding::GuardInserted(guards) => {
                    summary.guarded += 1;
                    summary.guards += guards.len();
                }
                Finding::Rejected(_) => summary.rejected += 1,
            }
        }
        summary
    }
}

/// The complete verification report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub bridge: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    pub summary: ReportSummary,
    pub entries: Vec<ReportEntry>,
}

impl VerificationReport {
    /// Build a report; entries keep the order given.
    pub fn build(bridge: impl Into<String>, entries: Vec<ReportEntry>) -> Self {
        Self {
            bridge: bridge.into(),
            run_id: None,
            summary: ReportSummary::of(&entries),
            entries,
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn entry(&self, item: &ItemId) -> Option<&ReportEntry> {
        self.entries.iter().find(|e| &e.item == item)
    }

    pub fn rejected(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(|e| e.finding.is_rejected())
    }

    pub fn is_clean(&self) -> bool {
        self.summary.rejected == 0
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Verification Report: {} ===", self.bridge)?;
        writeln!(
            f,
            "Items: {} | Proved: {} | Guarded: {} | Rejected: {} | Guards: {}",
            self.summary.total,
            self.summary.proved,
            self.summary.guarded,
            self.summary.rejected,
            self.summary.guards,
        )?;
        for entry in &self.entries {
            writeln!(f, "[{}] {}: {}", entry.severity(), entry.item, entry.finding)?;
            for err in &entry.errors {
                writeln!(f, "  {}: {}", err.code, err.cause)?;
            }
        }
        Ok(())
    }
}
