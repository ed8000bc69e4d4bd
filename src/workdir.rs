use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::context::LaunchContext;

/// Install locations a bundle must never write into.
const PROTECTED_PREFIXES: &[&str] = &["/Application", "/private"];

/// Picks the writable base directory for logs, data and the updated source tree.
pub struct WorkDirResolver<'a> {
    home_dir: &'a Path,
    support_dir: &'a Path,
}

impl<'a> WorkDirResolver<'a> {
    pub fn new(home_dir: &'a Path, support_dir: &'a Path) -> Self {
        WorkDirResolver {
            home_dir,
            support_dir,
        }
    }

    /// Never fails: any doubt resolves to the executable's own directory.
    pub fn resolve(&self, ctx: &LaunchContext) -> PathBuf {
        if !ctx.is_packaged {
            // Right next to the entry point of a dev build.
            return ctx
                .entry_script
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| ctx.executable_dir());
        }

        let exe_dir = ctx.executable_dir();
        if self.is_protected(&exe_dir) {
            return match ensure_dir(self.support_dir) {
                Ok(()) => self.support_dir.to_path_buf(),
                Err(err) => {
                    tracing::warn!(
                        dir = %self.support_dir.display(),
                        "could not create support directory, staying next to executable: {err}"
                    );
                    exe_dir
                }
            };
        }

        strip_bundle(&exe_dir).unwrap_or(exe_dir)
    }

    fn is_protected(&self, dir: &Path) -> bool {
        let dir = dir.to_string_lossy();
        let user_library = self.home_dir.join("Library");
        PROTECTED_PREFIXES.iter().any(|p| dir.starts_with(p))
            || dir.starts_with(user_library.to_string_lossy().as_ref())
    }
}

fn ensure_dir(dir: &Path) -> std::io::Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(dir)?;
    tracing::info!(dir = %dir.display(), "created support directory");
    Ok(())
}

/// `/Users/me/Apps/ZeroNet.app/Contents/MacOS` -> `/Users/me/Apps`.
fn strip_bundle(dir: &Path) -> Option<PathBuf> {
    static BUNDLE: OnceLock<Regex> = OnceLock::new();
    let re = BUNDLE.get_or_init(|| Regex::new(r"/[^/]+\.app/.*$").expect("static regex"));

    let s = dir.to_string_lossy();
    if !s.contains(".app") {
        return None;
    }
    let stripped = re.replace(&s, "");
    if stripped.is_empty() {
        return None;
    }
    Some(PathBuf::from(stripped.into_owned()))
}
