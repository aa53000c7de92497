//! Host assumptions the safety verifier proves against.

use serde::{Deserialize, Serialize};

use isthmus_core::Side;

/// Threading and atomics capabilities of the host program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct VerificationProfile {
    /// Both sides may touch bridged values from several threads.
    pub multi_threaded_host: bool,
    /// Side A code can perform atomic reference-count adjustments.
    pub a_side_atomics: bool,
    /// Side B code can perform atomic reference-count adjustments.
    pub b_side_atomics: bool,
}

impl Default for VerificationProfile {
    fn default() -> Self {
        Self::multi_threaded()
    }
}

impl VerificationProfile {
    /// A host that runs bridged code on one thread only.
    pub fn single_threaded() -> Self {
        Self {
            multi_threaded_host: false,
            a_side_atomics: true,
            b_side_atomics: true,
        }
    }

    /// A multi-threaded host with atomics available on both sides.
    pub fn multi_threaded() -> Self {
        Self {
            multi_threaded_host: true,
            a_side_atomics: true,
            b_side_atomics: true,
        }
    }

    pub fn atomics(&self, side: Side) -> bool {
        match side {
            Side::A => self.a_side_atomics,
            Side::B => self.b_side_atomics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_assumes_threads() {
        let profile = VerificationProfile::default();
        assert!(profile.multi_threaded_host);
        assert!(profile.atomics(Side::A) && profile.atomics(Side::B));
        assert!(!VerificationProfile::single_threaded().multi_threaded_host);
    }

    #[test]
    fn parses_kebab_case() {
        let profile: VerificationProfile = serde_json::from_str(
            r#"{"multi-threaded-host":true,"a-side-atomics":true,"b-side-atomics":false}"#,
        )
        .unwrap();
        assert!(!profile.atomics(Side::B));
    }
}
