//! isthmus CLI: verify interface descriptions and generate bridge glue.

mod commands;
mod manifest;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

use commands::report::ReportFormat;
use manifest::IsthmusManifest;

#[derive(Parser)]
#[command(name = "isthmus", version, about = "Verified cross-language bridges")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new bridge project
    Init {
        /// Project name
        name: String,
    },
    /// Verify interface descriptions and print the report
    Check {
        /// Interface description files (default: interfaces in isthmus.toml)
        files: Vec<PathBuf>,
        /// Verification gate (development, strict)
        #[arg(long)]
        gate: Option<String>,
    },
    /// Verify, then write glue artifacts
    Generate {
        /// Interface description files (default: interfaces in isthmus.toml)
        files: Vec<PathBuf>,
        /// Output directory (default: codegen.output-dir, or glue/)
        #[arg(long)]
        out: Option<PathBuf>,
        /// Verification gate (development, strict)
        #[arg(long)]
        gate: Option<String>,
    },
    /// Print verification reports
    Report {
        /// Interface description files (default: interfaces in isthmus.toml)
        files: Vec<PathBuf>,
        /// Report format (human, json)
        #[arg(long)]
        format: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

/// Logs go to stderr; command output keeps stdout.
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;

    match cli.command {
        Commands::Init { name } => commands::init::run(&name),

        Commands::Check { files, gate } => {
            let (manifest, project_dir) = load_manifest_optional(&cwd)?;
            let project_dir = project_dir.unwrap_or(cwd);
            commands::check::run(&project_dir, manifest.as_ref(), &files, gate.as_deref())
        }

        Commands::Generate { files, out, gate } => {
            let (manifest, project_dir) = load_manifest_optional(&cwd)?;
            let project_dir = project_dir.unwrap_or(cwd);
            commands::generate::run(
                &project_dir,
                manifest.as_ref(),
                &files,
                out.as_deref(),
                gate.as_deref(),
            )
        }

        Commands::Report { files, format } => {
            let format = ReportFormat::parse(format.as_deref())?;
            let (manifest, project_dir) = load_manifest_optional(&cwd)?;
            let project_dir = project_dir.unwrap_or(cwd);
            commands::report::run(&project_dir, manifest.as_ref(), &files, format)
        }
    }
}

fn load_manifest_optional(
    cwd: &Path,
) -> anyhow::Result<(Option<IsthmusManifest>, Option<PathBuf>)> {
    match IsthmusManifest::find_and_load(cwd)? {
        Some((manifest, dir)) => Ok((Some(manifest), Some(dir))),
        None => Ok((None, None)),
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;

    /// Full workflow: init -> check -> generate.
    #[test]
    fn init_check_generate_workflow() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("demo");
        commands::init::create_project(&project, "demo").unwrap();

        let (manifest, root) = load_manifest_optional(&project).unwrap();
        let manifest = manifest.unwrap();
        let root = root.unwrap();

        commands::check::run(&root, Some(&manifest), &[], None).unwrap();
        commands::generate::run(&root, Some(&manifest), &[], None, None).unwrap();
        assert!(project.join("glue/fn_sum.a.rs").is_file());
        assert!(project.join("glue/isthmus_runtime.h").is_file());
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from(["isthmus", "-v", "generate", "a.bridge.toml", "--out", "gen"])
            .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Generate { files, out, gate } => {
                assert_eq!(files, vec![PathBuf::from("a.bridge.toml")]);
                assert_eq!(out, Some(PathBuf::from("gen")));
                assert!(gate.is_none());
            }
            _ => panic!("expected generate"),
        }
        assert!(Cli::try_parse_from(["isthmus", "report", "--format", "json"]).is_ok());
    }
}
