//! Engine configuration.

use isthmus_catalog::CatalogConfig;
use isthmus_codegen::CodegenConfig;
use isthmus_verify::VerificationProfile;

use crate::gate::GateConfig;

/// Everything one engine run needs besides the description itself.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub catalog: CatalogConfig,
    /// Host assumptions the verifier proves against.
    pub profile: VerificationProfile,
    pub codegen: CodegenConfig,
    pub gate: GateConfig,
    /// Process declared items on the rayon pool.
    pub parallel: bool,
}

impl EngineConfig {
    /// Multi-threaded host, lenient gate.
    pub fn development() -> Self {
        Self {
            catalog: CatalogConfig::default(),
            profile: VerificationProfile::multi_threaded(),
            codegen: CodegenConfig::default(),
            gate: GateConfig::development(),
            parallel: true,
        }
    }

    /// Multi-threaded host, no runtime guards allowed.
    pub fn strict() -> Self {
        Self {
            gate: GateConfig::strict(),
            ..Self::development()
        }
    }

    pub fn with_profile(mut self, profile: VerificationProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_gate(mut self, gate: GateConfig) -> Self {
        self.gate = gate;
        self
    }

    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::development()
    }
}
