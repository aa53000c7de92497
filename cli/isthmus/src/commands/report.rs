//! `isthmus report`: render verification reports as text or JSON.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use isthmus_verify::VerificationReport;

use crate::commands::{engine_config, resolve_inputs, run_all};
use crate::manifest::IsthmusManifest;

/// Output format of `isthmus report`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Human,
    Json,
}

impl ReportFormat {
    pub fn parse(name: Option<&str>) -> Result<Self> {
        match name {
            Some("human") | None => Ok(Self::Human),
            Some("json") => Ok(Self::Json),
            Some(other) => bail!("unknown report format: '{other}'. Choose: human, json"),
        }
    }
}

/// Print the reports of every input. The gate is not applied.
pub fn run(
    project_dir: &Path,
    manifest: Option<&IsthmusManifest>,
    files: &[PathBuf],
    format: ReportFormat,
) -> Result<()> {
    let inputs = resolve_inputs(project_dir, manifest, files)?;
    let config = engine_config(manifest, None)?;
    let outputs = run_all(&config, &inputs)?;
    let reports: Vec<&VerificationReport> = outputs.iter().map(|o| &o.report).collect();
    println!("{}", render(&reports, format)?);
    Ok(())
}

pub fn render(reports: &[&VerificationReport], format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Human => Ok(reports.iter().map(|r| r.to_string()).collect()),
        ReportFormat::Json => match reports {
            [single] => Ok(single.to_json()?),
            many => Ok(serde_json::to_string_pretty(many)?),
        },
    }
}
