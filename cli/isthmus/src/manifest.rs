//! `isthmus.toml` manifest parsing and project configuration.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use isthmus_codegen::CodegenConfig;
use isthmus_engine::{EngineConfig, GateConfig};
use isthmus_verify::VerificationProfile;

pub const MANIFEST_FILE: &str = "isthmus.toml";

/// The top-level manifest structure for a bridge project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IsthmusManifest {
    /// Project metadata (required).
    pub project: ProjectConfig,
    #[serde(default)]
    pub verification: Option<VerificationConfig>,
    #[serde(default)]
    pub codegen: Option<CodegenSection>,
}

/// Project metadata section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Interface description files, relative to the project directory.
    #[serde(default)]
    pub interfaces: Vec<String>,
}

/// Verification configuration section. Unset flags keep the
/// multi-threaded defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct VerificationConfig {
    #[serde(default)]
    pub multi_threaded_host: Option<bool>,
    #[serde(default)]
    pub a_side_atomics: Option<bool>,
    #[serde(default)]
    pub b_side_atomics: Option<bool>,
    /// Gate name: `development` or `strict`.
    #[serde(default)]
    pub gate: Option<String>,
    #[serde(default)]
    pub max_guards: Option<usize>,
}

/// Code generation section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CodegenSection {
    #[serde(default)]
    pub output_dir: Option<String>,
    #[serde(default)]
    pub runtime_prefix: Option<String>,
}

impl IsthmusManifest {
    /// Search upward from `start_dir` for an `isthmus.toml` file, parse and
    /// return it along with the directory it was found in.
    pub fn find_and_load(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let candidate = dir.join(MANIFEST_FILE);
            if candidate.is_file() {
                let content = std::fs::read_to_string(&candidate)
                    .with_context(|| format!("reading {}", candidate.display()))?;
                let manifest: IsthmusManifest = toml::from_str(&content)
                    .with_context(|| format!("parsing {}", candidate.display()))?;
                return Ok(Some((manifest, dir)));
            }
            if !dir.pop() {
                break;
            }
        }
        Ok(None)
    }

    #[cfg(test)]
    pub fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s).context("parsing isthmus.toml")
    }

    /// Interface files listed by the manifest, resolved against `project_dir`.
    pub fn interface_paths(&self, project_dir: &Path) -> Vec<PathBuf> {
        self.project
            .interfaces
            .iter()
            .map(|p| project_dir.join(p))
            .collect()
    }

    pub fn output_dir(&self) -> Option<&str> {
        self.codegen.as_ref().and_then(|c| c.output_dir.as_deref())
    }

    /// Build the engine configuration. `gate_override` (from the command
    /// line) takes precedence over the manifest's gate.
    pub fn engine_config(&self, gate_override: Option<&str>) -> Result<EngineConfig> {
        let verification = self.verification.clone().unwrap_or_default();
        let defaults = VerificationProfile::default();
        let profile = VerificationProfile {
            multi_threaded_host: verification
                .multi_threaded_host
                .unwrap_or(defaults.multi_threaded_host),
            a_side_atomics: verification.a_side_atomics.unwrap_or(defaults.a_side_atomics),
            b_side_atomics: verification.b_side_atomics.unwrap_or(defaults.b_side_atomics),
        };

        let mut gate = resolve_gate(gate_override.or(verification.gate.as_deref()))?;
        if verification.max_guards.is_some() {
            gate = gate.with_max_guards(verification.max_guards);
        }

        let mut config = EngineConfig::development()
            .with_profile(profile)
            .with_gate(gate);
        if let Some(prefix) = self.codegen.as_ref().and_then(|c| c.runtime_prefix.clone()) {
            config.codegen = CodegenConfig {
                runtime_prefix: prefix,
            };
        }
        Ok(config)
    }

    /// Generate the default template for a new project.
    pub fn template(name: &str) -> String {
        format!(
            r#"[project]
name = "{name}"
interfaces = ["{name}.bridge.toml"]

[verification]
multi-threaded-host = true
gate = "development"

[codegen]
output-dir = "glue"
"#
        )
    }
}

/// Engine configuration when no manifest is found.
pub fn default_engine_config(gate_override: Option<&str>) -> Result<EngineConfig> {
    Ok(EngineConfig::development().with_gate(resolve_gate(gate_override)?))
}

pub fn resolve_gate(name: Option<&str>) -> Result<GateConfig> {
    match name {
        Some("development") | None => Ok(GateConfig::development()),
        Some("strict") => Ok(GateConfig::strict()),
        Some(other) => bail!("unknown gate: '{other}'. Choose: development, strict"),
    }
}
