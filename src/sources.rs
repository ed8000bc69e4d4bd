use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::context::{normalize, LaunchContext};
use crate::revision::probe_revision;

/// Source tree directory name, both inside the bundle and in the work dir.
pub const CORE_DIR: &str = "core";

/// A copy of the engine source tree and the revision it reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceCandidate {
    pub path: PathBuf,
    pub revision: i64,
}

impl SourceCandidate {
    pub fn probe(path: PathBuf) -> Self {
        let revision = probe_revision(&descriptor_path(&path));
        SourceCandidate { path, revision }
    }
}

/// Module search order handed to the engine, highest priority first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePaths {
    pub search: Vec<PathBuf>,
    /// Where an updater should place a newer source tree.
    pub update_dir: Option<PathBuf>,
}

impl SourcePaths {
    /// `PYTHONPATH`-style value for the search order.
    pub fn search_path_env(&self) -> Result<OsString, std::env::JoinPathsError> {
        std::env::join_paths(&self.search)
    }
}

pub fn descriptor_path(source_dir: &Path) -> PathBuf {
    source_dir.join("src").join("Config.py")
}

pub fn select_source_paths(work_dir: &Path, ctx: &LaunchContext) -> SourcePaths {
    if !ctx.platform.supports_source_updates() {
        return SourcePaths {
            search: vec![work_dir.join(CORE_DIR)],
            update_dir: None,
        };
    }

    let packed_dir = normalize(&ctx.executable_dir().join("../Resources").join(CORE_DIR));
    let update_dir = work_dir.join(CORE_DIR);

    let packed = SourceCandidate::probe(packed_dir);
    let updated = SourceCandidate::probe(update_dir.clone());
    order_candidates(packed, updated, update_dir)
}

/// Updated shadows packed only when strictly newer; packed is always the fallback.
fn order_candidates(
    packed: SourceCandidate,
    updated: SourceCandidate,
    update_dir: PathBuf,
) -> SourcePaths {
    let mut search = Vec::with_capacity(2);
    if updated.revision > packed.revision {
        tracing::info!(
            updated = updated.revision,
            packed = packed.revision,
            "using updated source"
        );
        search.push(updated.path);
    } else {
        tracing::debug!(
            updated = updated.revision,
            packed = packed.revision,
            "using packed source"
        );
    }
    search.push(packed.path);

    SourcePaths {
        search,
        update_dir: Some(update_dir),
    }
}
