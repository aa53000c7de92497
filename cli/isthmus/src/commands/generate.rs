//! `isthmus generate`: verify, then write glue artifacts for each bridge.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::commands::{engine_config, enforce_gate, resolve_inputs, run_all};
use crate::manifest::IsthmusManifest;

const DEFAULT_OUTPUT_DIR: &str = "glue";

/// Output directory: `--out`, then the manifest's `output-dir`, then
/// `glue/` under the project directory.
pub fn output_dir(
    project_dir: &Path,
    manifest: Option<&IsthmusManifest>,
    out: Option<&Path>,
) -> PathBuf {
    match (out, manifest.and_then(|m| m.output_dir())) {
        (Some(out), _) => out.to_path_buf(),
        (None, Some(dir)) => project_dir.join(dir),
        (None, None) => project_dir.join(DEFAULT_OUTPUT_DIR),
    }
}

/// Generate glue for every input. Nothing is written unless every bridge
/// passes the gate. With several inputs each bridge gets its own
/// subdirectory.
pub fn run(
    project_dir: &Path,
    manifest: Option<&IsthmusManifest>,
    files: &[PathBuf],
    out: Option<&Path>,
    gate: Option<&str>,
) -> Result<()> {
    let inputs = resolve_inputs(project_dir, manifest, files)?;
    let config = engine_config(manifest, gate)?;
    let outputs = run_all(&config, &inputs)?;

    for output in &outputs {
        let s = &output.report.summary;
        println!(
            "{}: {} proved, {} guarded, {} rejected",
            output.report.bridge, s.proved, s.guarded, s.rejected
        );
    }
    enforce_gate(&outputs, &config.gate)?;

    let root = output_dir(project_dir, manifest, out);
    for output in &outputs {
        let dir = if outputs.len() == 1 {
            root.clone()
        } else {
            root.join(&output.report.bridge)
        };
        let written = output
            .write_artifacts(&dir, &config)
            .with_context(|| format!("writing glue to {}", dir.display()))?;
        info!(bridge = %output.report.bridge, files = written.len(), "glue written");
        println!("wrote {} file(s) to {}", written.len(), dir.display());
    }
    Ok(())
}
