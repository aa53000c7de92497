//! Signature compatibility checking and boundary safety verification.
//!
//! ## Modules
//!
//! - [`signature`]: realizability of ownership modes through resolved edges
//! - [`safety`]: static proof or mandated runtime guards per crossing value
//! - [`profile`]: host threading and atomics assumptions
//! - [`report`]: aggregate verification report with human and JSON output

pub mod profile;
pub mod report;
pub mod safety;
pub mod signature;

pub use profile::VerificationProfile;
pub use report::{ReportEntry, ReportSummary, Severity, VerificationReport};
pub use safety::verify;
pub use signature::{check_constant, check_signature, CheckedSignature, CheckedSlot};
