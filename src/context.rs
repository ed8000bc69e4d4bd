use std::io::IsTerminal;
use std::path::{Component, Path, PathBuf};

/// Operating system family, as far as the bootstrap cares about it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Desktop macOS: dock integration, in-place source updates, bundled CA file.
    Mac,
    Windows,
    Linux,
    Other(&'static str),
}

impl Platform {
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    pub fn from_os(os: &'static str) -> Self {
        match os {
            "macos" => Platform::Mac,
            "windows" => Platform::Windows,
            "linux" => Platform::Linux,
            other => Platform::Other(other),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Platform::Mac => "mac",
            Platform::Windows => "win",
            Platform::Linux => "linux",
            Platform::Other(os) => os,
        }
    }

    /// Only the mac bundle carries an updatable copy of the source tree.
    pub fn supports_source_updates(&self) -> bool {
        matches!(self, Platform::Mac)
    }

    pub fn has_dock(&self) -> bool {
        matches!(self, Platform::Mac)
    }

    pub fn needs_cert_bundle(&self) -> bool {
        matches!(self, Platform::Mac)
    }
}

/// How this process was launched. Computed once in `main`, never mutated.
#[derive(Debug, Clone)]
pub struct LaunchContext {
    pub executable: PathBuf,
    /// Entry point used for unpackaged runs (the crate manifest of a dev build).
    pub entry_script: PathBuf,
    pub working_directory: PathBuf,
    pub platform: Platform,
    pub bitness: u32,
    pub is_packaged: bool,
    pub has_terminal: bool,
}

impl LaunchContext {
    pub fn detect() -> Self {
        let executable = std::env::current_exe()
            .ok()
            .or_else(|| std::env::args_os().next().map(PathBuf::from))
            .unwrap_or_default();
        let executable = absolute(&executable);
        let working_directory = std::env::current_dir().unwrap_or_default();
        let is_packaged = !is_cargo_build_output(&executable);

        LaunchContext {
            executable,
            entry_script: Path::new(env!("CARGO_MANIFEST_DIR")).join("Cargo.toml"),
            working_directory,
            platform: Platform::current(),
            bitness: usize::BITS,
            is_packaged,
            has_terminal: std::io::stdout().is_terminal(),
        }
    }

    pub fn executable_dir(&self) -> PathBuf {
        self.executable
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.working_directory.clone())
    }
}

/// `target/debug/zeronet` or `target/release/zeronet`: a developer run, not a bundle.
fn is_cargo_build_output(executable: &Path) -> bool {
    let Some(profile_dir) = executable.parent() else {
        return false;
    };
    let in_target = profile_dir
        .parent()
        .and_then(Path::file_name)
        .is_some_and(|n| n == "target");
    let profile = profile_dir.file_name().and_then(|n| n.to_str());
    in_target && matches!(profile, Some("debug") | Some("release"))
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| normalize(&cwd.join(path)))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Lexically resolve `.` and `..` without touching the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn mac_context(executable: &str) -> LaunchContext {
        LaunchContext {
            executable: PathBuf::from(executable),
            entry_script: PathBuf::from("/src/zeronet-boot/Cargo.toml"),
            working_directory: PathBuf::from("/"),
            platform: Platform::Mac,
            bitness: 64,
            is_packaged: true,
            has_terminal: false,
        }
    }

    #[test]
    fn platform_from_os_names() {
        assert_eq!(Platform::from_os("macos"), Platform::Mac);
        assert_eq!(Platform::from_os("windows"), Platform::Windows);
        assert_eq!(Platform::from_os("linux"), Platform::Linux);
        assert_eq!(Platform::from_os("freebsd"), Platform::Other("freebsd"));
        assert_eq!(Platform::Other("freebsd").name(), "freebsd");
    }

    #[test]
    fn only_mac_has_dock_and_updates() {
        assert!(Platform::Mac.has_dock());
        assert!(Platform::Mac.supports_source_updates());
        assert!(!Platform::Linux.has_dock());
        assert!(!Platform::Windows.supports_source_updates());
    }

    #[test]
    fn cargo_build_output_is_not_packaged() {
        assert!(is_cargo_build_output(Path::new("/src/zn/target/debug/zeronet")));
        assert!(is_cargo_build_output(Path::new("/src/zn/target/release/zeronet")));
        assert!(!is_cargo_build_output(Path::new(
            "/Applications/ZeroNet.app/Contents/MacOS/zeronet"
        )));
    }

    #[test]
    fn normalize_resolves_parent_components() {
        assert_eq!(
            normalize(Path::new("/Applications/ZeroNet.app/Contents/MacOS/../Resources/core")),
            PathBuf::from("/Applications/ZeroNet.app/Contents/Resources/core")
        );
        assert_eq!(normalize(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
    }

    #[test]
    fn executable_dir_is_parent() {
        let ctx = mac_context("/Users/me/ZeroNet.app/Contents/MacOS/zeronet");
        assert_eq!(
            ctx.executable_dir(),
            PathBuf::from("/Users/me/ZeroNet.app/Contents/MacOS")
        );
    }
}
