//! CLI command implementations.

pub mod check;
pub mod generate;
pub mod init;
pub mod report;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::debug;

use isthmus_engine::{gate_or_halt, Engine, EngineConfig, GateConfig, RunOutput};

use crate::manifest::{default_engine_config, IsthmusManifest};

/// Files named on the command line, or the manifest's interface list.
pub fn resolve_inputs(
    project_dir: &Path,
    manifest: Option<&IsthmusManifest>,
    files: &[PathBuf],
) -> Result<Vec<PathBuf>> {
    if !files.is_empty() {
        return Ok(files.to_vec());
    }
    let listed = manifest
        .map(|m| m.interface_paths(project_dir))
        .unwrap_or_default();
    if listed.is_empty() {
        bail!("no interface files given and none listed in isthmus.toml");
    }
    Ok(listed)
}

pub fn engine_config(
    manifest: Option<&IsthmusManifest>,
    gate: Option<&str>,
) -> Result<EngineConfig> {
    match manifest {
        Some(m) => m.engine_config(gate),
        None => default_engine_config(gate),
    }
}

/// Run every input through the engine, in order.
pub fn run_all(config: &EngineConfig, inputs: &[PathBuf]) -> Result<Vec<RunOutput>> {
    let engine = Engine::new(config.clone());
    inputs
        .iter()
        .map(|path| {
            if !path.is_file() {
                bail!("interface file not found: {}", path.display());
            }
            debug!(path = %path.display(), "running bridge");
            engine
                .run_path(path)
                .with_context(|| format!("loading {}", path.display()))
        })
        .collect()
}

/// Fail on the first bridge whose report does not pass the gate.
pub fn enforce_gate(outputs: &[RunOutput], gate: &GateConfig) -> Result<()> {
    for output in outputs {
        gate_or_halt(&output.report, gate)
            .with_context(|| format!("bridge '{}'", output.report.bridge))?;
    }
    Ok(())
}
