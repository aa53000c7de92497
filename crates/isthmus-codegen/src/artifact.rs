//! Emitted glue artifacts.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use isthmus_core::hash::fingerprint;
use isthmus_core::{Direction, ItemId, Side};

use crate::error::Result;
use crate::plan::CodegenConfig;
use crate::runtime_header::{runtime_header, RUNTIME_HEADER};

/// Generated source for one item on one side. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GlueArtifact {
    pub item: ItemId,
    pub side: Side,
    /// Call direction for function glue; `None` for types and constants.
    pub direction: Option<Direction>,
    pub source: String,
    pub fingerprint: String,
}

impl GlueArtifact {
    pub fn new(item: ItemId, side: Side, direction: Option<Direction>, source: String) -> Self {
        let fingerprint = fingerprint(&source);
        Self {
            item,
            side,
            direction,
            source,
            fingerprint,
        }
    }

    /// `<mangled>.a.rs` on side A, `<mangled>.b.h` on side B.
    pub fn file_name(&self) -> String {
        let stem = format!("{}_{}", self.item.kind, self.item.name.mangled());
        match self.side {
            Side::A => format!("{stem}.a.rs"),
            Side::B => format!("{stem}.b.h"),
        }
    }
}

/// The two artifacts of one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPair {
    pub a: GlueArtifact,
    pub b: GlueArtifact,
}

#[derive(Debug, Serialize)]
struct ManifestEntry<'a> {
    item: String,
    side: Side,
    direction: Option<Direction>,
    file: String,
    fingerprint: &'a str,
}

/// All artifacts of a run, keyed by (item, side).
#[derive(Debug, Clone, Default)]
pub struct ArtifactSet {
    artifacts: BTreeMap<(ItemId, Side), GlueArtifact>,
}

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an artifact. An existing artifact for the same key is kept and
    /// `false` is returned.
    pub fn insert(&mut self, artifact: GlueArtifact) -> bool {
        let key = (artifact.item.clone(), artifact.side);
        if self.artifacts.contains_key(&key) {
            return false;
        }
        self.artifacts.insert(key, artifact);
        true
    }

    pub fn insert_pair(&mut self, pair: ArtifactPair) {
        self.insert(pair.a);
        self.insert(pair.b);
    }

    pub fn get(&self, item: &ItemId, side: Side) -> Option<&GlueArtifact> {
        self.artifacts.get(&(item.clone(), side))
    }

    pub fn pair(&self, item: &ItemId) -> Option<(&GlueArtifact, &GlueArtifact)> {
        Some((self.get(item, Side::A)?, self.get(item, Side::B)?))
    }

    pub fn contains_item(&self, item: &ItemId) -> bool {
        self.get(item, Side::A).is_some() || self.get(item, Side::B).is_some()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GlueArtifact> {
        self.artifacts.values()
    }

    /// Write every artifact, the runtime header and `manifest.json` into
    /// `dir`. Returns the paths written.
    pub fn write_to(&self, dir: &Path, config: &CodegenConfig) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir)?;
        let mut written = Vec::with_capacity(self.len() + 2);

        let header = dir.join(RUNTIME_HEADER);
        fs::write(&header, runtime_header(config))?;
        written.push(header);

        let mut manifest = Vec::with_capacity(self.len());
        for artifact in self.iter() {
            let file = artifact.file_name();
            let path = dir.join(&file);
            fs::write(&path, &artifact.source)?;
            debug!(path = %path.display(), "wrote artifact");
            manifest.push(ManifestEntry {
                item: artifact.item.to_string(),
                side: artifact.side,
                direction: artifact.direction,
                file,
                fingerprint: &artifact.fingerprint,
            });
            written.push(path);
        }

        let path = dir.join("manifest.json");
        let json = serde_json::to_string_pretty(&manifest).map_err(std::io::Error::other)?;
        fs::write(&path, json)?;
        written.push(path);
        Ok(written)
    }
}
