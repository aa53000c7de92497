//! `isthmus init`: project scaffolding.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

use crate::manifest::{IsthmusManifest, MANIFEST_FILE};

/// Create a new bridge project in the directory `name`, relative to cwd.
pub fn run(name: &str) -> Result<()> {
    create_project(Path::new(name), name)
}

pub(crate) fn create_project(project_dir: &Path, name: &str) -> Result<()> {
    if project_dir.exists() {
        bail!("directory '{}' already exists", project_dir.display());
    }
    fs::create_dir_all(project_dir)
        .with_context(|| format!("creating {}", project_dir.display()))?;

    fs::write(project_dir.join(MANIFEST_FILE), IsthmusManifest::template(name))
        .context("writing isthmus.toml")?;

    let bridge_file = format!("{name}.bridge.toml");
    fs::write(project_dir.join(&bridge_file), starter_description(name))
        .with_context(|| format!("writing {bridge_file}"))?;

    fs::write(project_dir.join(".gitignore"), "glue/\n").context("writing .gitignore")?;

    println!("Created project '{name}'");
    println!("  {name}/{MANIFEST_FILE}");
    println!("  {name}/{bridge_file}");
    println!("  {name}/.gitignore");
    Ok(())
}

/// One sequence type pair and a function summing it.
fn starter_description(name: &str) -> String {
    format!(
        r#"[bridge]
name = "{name}"
schema = "1.0.0"

[[types]]
name = "Int32Slice"
side = "a"
kind = "sequence"
element = "i32"

[[types]]
name = "IntSeq"
side = "b"
kind = "sequence"
element = "int32_t"
counterpart = "Int32Slice"

[[functions]]
name = "sum"
side = "b"
returns = "int32_t"
params = [{{ name = "values", type = "IntSeq", mode = "borrowImmutable" }}]
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use isthmus_core::InterfaceDescription;

    #[test]
    fn init_creates_project() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("demo");
        create_project(&project, "demo").unwrap();

        assert!(project.join(MANIFEST_FILE).is_file());
        assert!(project.join(".gitignore").is_file());
        let desc = InterfaceDescription::load(&project.join("demo.bridge.toml")).unwrap();
        assert_eq!(desc.bridge.name, "demo");
        assert_eq!(desc.functions.len(), 1);
    }

    #[test]
    fn init_refuses_existing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(create_project(dir.path(), "demo").is_err());
    }
}
