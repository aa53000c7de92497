//! `isthmus check`: run descriptions through verification and print the report.

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::commands::{engine_config, enforce_gate, resolve_inputs, run_all};
use crate::manifest::IsthmusManifest;

/// Verify every input and print one report per bridge. Fails when the
/// gate halts on any of them.
pub fn run(
    project_dir: &Path,
    manifest: Option<&IsthmusManifest>,
    files: &[PathBuf],
    gate: Option<&str>,
) -> Result<()> {
    let inputs = resolve_inputs(project_dir, manifest, files)?;
    let config = engine_config(manifest, gate)?;
    let outputs = run_all(&config, &inputs)?;

    for output in &outputs {
        print!("{}", output.report);
    }

    enforce_gate(&outputs, &config.gate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::fixtures::*;

    #[test]
    fn guarded_bridge_passes_development_gate() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "math.bridge.toml", SUM);
        run(dir.path(), None, &[path], None).unwrap();
    }

    #[test]
    fn strict_gate_halts_on_guards() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "math.bridge.toml", SUM);
        let err = run(dir.path(), None, &[path], Some("strict")).unwrap_err();
        assert!(format!("{err:#}").contains("1 guarded"));
    }

    #[test]
    fn rejection_halts() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "raw.bridge.toml", UNMAPPED);
        assert!(run(dir.path(), None, &[path], None).is_err());
    }

    #[test]
    fn manifest_lists_interfaces() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "math.bridge.toml", SUM);
        let manifest = IsthmusManifest::from_str(
            "[project]\nname = \"p\"\ninterfaces = [\"math.bridge.toml\"]\n",
        )
        .unwrap();
        run(dir.path(), Some(&manifest), &[], None).unwrap();
    }
}
