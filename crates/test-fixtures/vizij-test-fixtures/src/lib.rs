//! Shared test fixtures: manifest-driven clip assets plus in-memory host adapters
//! (skeleton, expression sink, clip registries, audio sources).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use serde::Deserialize;

pub mod audio;
pub mod expressions;
pub mod registry;
pub mod skeleton;

pub use audio::{ConstantAudio, FailingAudio};
pub use expressions::MemoryExpressions;
pub use registry::{DeferredControl, DeferredRegistry, FixtureRegistry};
pub use skeleton::MemorySkeleton;

static MANIFEST: Lazy<Manifest> = Lazy::new(|| {
    let raw = include_str!("../../../../fixtures/manifest.json");
    serde_json::from_str(raw).expect("fixtures manifest should parse")
});

#[derive(Debug, Deserialize)]
struct Manifest {
    clips: HashMap<String, String>,
}

fn fixtures_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../fixtures")
}

fn resolve_path(rel: &str) -> PathBuf {
    fixtures_root().join(rel)
}

fn read_to_string(rel: &str) -> Result<String> {
    let path = resolve_path(rel);
    fs::read_to_string(&path)
        .with_context(|| format!("failed to read fixture at {}", path.display()))
}

fn lookup<'a, T>(map: &'a HashMap<String, T>, kind: &str, name: &str) -> Result<&'a T> {
    map.get(name)
        .ok_or_else(|| anyhow!("unknown {kind} fixture '{name}'"))
}

pub mod clips {
    use super::*;
    use vizij_avatar_core::ClipData;

    pub fn keys() -> Vec<String> {
        let mut keys: Vec<String> = MANIFEST.clips.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn json(name: &str) -> Result<String> {
        let rel = lookup(&MANIFEST.clips, "clip", name)?;
        read_to_string(rel)
    }

    pub fn bytes(name: &str) -> Result<Vec<u8>> {
        json(name).map(String::into_bytes)
    }

    /// Decode and validate a clip fixture.
    pub fn load(name: &str) -> Result<ClipData> {
        let raw = json(name)?;
        ClipData::from_slice(raw.as_bytes())
            .map_err(|e| anyhow!("clip fixture '{name}' is invalid: {e}"))
    }

    pub fn path(name: &str) -> Result<PathBuf> {
        let rel = lookup(&MANIFEST.clips, "clip", name)?;
        Ok(resolve_path(rel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_manifest_clip_loads() {
        for key in clips::keys() {
            let clip = clips::load(&key).unwrap();
            assert_eq!(clip.name, key);
            assert!(clip.is_playable(), "{key} should be playable");
        }
    }
}
