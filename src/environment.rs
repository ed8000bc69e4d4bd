use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::context::{normalize, LaunchContext};

/// Finder/Dock launches append a process serial number argument, e.g. `-psn_0_1234567`.
const PSN_PREFIX: &str = "-psn_";

/// Invocation path of the bootstrap script inside the bundle, and the real executable.
const BOOT_SCRIPT_SUFFIX: &str = "Resources/boot.py";
const BUNDLE_EXECUTABLE_SUFFIX: &str = "MacOS/ZeroNet";

const LOG_DIR: &str = "log";
const LOG_FILE: &str = "stdout.log";

const CERT_BUNDLE_FILE: &str = "cacert.pem";
/// Read by OpenSSL and by python-requests respectively.
const CERT_ENV_VARS: &[&str] = &["SSL_CERT_FILE", "REQUESTS_CA_BUNDLE"];

/// Outcome of the platform setup steps. Every step is optional.
#[derive(Debug, Default)]
pub struct Preparation {
    pub args: Vec<OsString>,
    pub log_file: Option<PathBuf>,
    pub cert_bundle: Option<PathBuf>,
}

/// Apply per-platform runtime setup. No individual step can abort the bootstrap.
pub fn prepare(ctx: &LaunchContext, work_dir: &Path, args: Vec<OsString>) -> Preparation {
    let log_file = match redirect_target(ctx, work_dir) {
        Some(path) => {
            tracing::info!(?args, log = %path.display(), "running detached, redirecting output");
            match redirect_output(&path) {
                Ok(()) => Some(path),
                Err(err) => {
                    tracing::error!("error redirecting stdout: {err}");
                    None
                }
            }
        }
        None => None,
    };

    let args = strip_psn_arg(args);
    let args = replace_boot_script_path(args);

    let cert_bundle = if ctx.platform.needs_cert_bundle() {
        match install_cert_bundle(ctx) {
            Ok(path) => Some(path),
            Err(err) => {
                tracing::warn!("error loading certificate bundle: {err}");
                None
            }
        }
    } else {
        None
    };

    Preparation {
        args,
        log_file,
        cert_bundle,
    }
}

/// `log/stdout.log` under the work dir, if output should go there.
fn redirect_target(ctx: &LaunchContext, work_dir: &Path) -> Option<PathBuf> {
    if ctx.has_terminal {
        return None;
    }
    let log_dir = work_dir.join(LOG_DIR);
    log_dir.is_dir().then(|| log_dir.join(LOG_FILE))
}

#[cfg(unix)]
fn redirect_output(path: &Path) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::io::AsRawFd;

    let file = std::fs::File::create(path)?;
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();

    let fd = file.as_raw_fd();
    for target in [libc::STDOUT_FILENO, libc::STDERR_FILENO] {
        // SAFETY: both descriptors are valid for the duration of the call.
        if unsafe { libc::dup2(fd, target) } == -1 {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn redirect_output(_path: &Path) -> std::io::Result<()> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "output redirection is only available on unix",
    ))
}

fn strip_psn_arg(mut args: Vec<OsString>) -> Vec<OsString> {
    let is_psn = |arg: &OsString| arg.to_str().is_some_and(|a| a.starts_with(PSN_PREFIX));
    if args.get(1).is_some_and(is_psn) {
        let dropped = args.remove(1);
        tracing::debug!(arg = ?dropped, "dropped process serial number argument");
    }
    args
}

/// A non-UTF-8 `argv0` cannot end in the boot script path and is left alone.
fn replace_boot_script_path(mut args: Vec<OsString>) -> Vec<OsString> {
    if let Some(argv0) = args.first_mut() {
        let replaced = argv0
            .to_str()
            .and_then(|a| a.strip_suffix(BOOT_SCRIPT_SUFFIX))
            .map(|prefix| format!("{prefix}{BUNDLE_EXECUTABLE_SUFFIX}"));
        if let Some(replaced) = replaced {
            *argv0 = replaced.into();
        }
    }
    args
}

fn cert_bundle_path(ctx: &LaunchContext) -> PathBuf {
    normalize(&ctx.executable_dir().join("../Resources").join(CERT_BUNDLE_FILE))
}

fn install_cert_bundle(ctx: &LaunchContext) -> std::io::Result<PathBuf> {
    let path = cert_bundle_path(ctx);
    if !path.is_file() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} not found", path.display()),
        ));
    }
    for var in CERT_ENV_VARS {
        std::env::set_var(var, &path);
    }
    tracing::debug!(bundle = %path.display(), "certificate bundle installed");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::ENV_LOCK;
    use crate::context::tests::mac_context;
    use crate::context::Platform;
    use tempfile::tempdir;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn psn_argument_is_removed() {
        let out = strip_psn_arg(args(&["zeronet", "-psn_0_1234567", "--ui_port", "1"]));
        assert_eq!(out, args(&["zeronet", "--ui_port", "1"]));
    }

    #[test]
    fn psn_only_checked_in_first_position() {
        let input = args(&["zeronet", "--ui_port", "-psn_0_1"]);
        assert_eq!(strip_psn_arg(input.clone()), input);
        assert_eq!(strip_psn_arg(args(&["zeronet"])), args(&["zeronet"]));
    }

    #[test]
    fn boot_script_argv0_points_at_bundle_executable() {
        let out = replace_boot_script_path(args(&[
            "/Applications/ZeroNet.app/Contents/Resources/boot.py",
            "--debug",
        ]));
        assert_eq!(
            out,
            args(&["/Applications/ZeroNet.app/Contents/MacOS/ZeroNet", "--debug"])
        );
    }

    #[test]
    fn other_argv0_untouched() {
        let input = args(&["/usr/local/bin/zeronet"]);
        assert_eq!(replace_boot_script_path(input.clone()), input);
        assert!(replace_boot_script_path(Vec::new()).is_empty());
    }

    #[test]
    fn redirect_requires_detached_launch_and_log_dir() {
        let work = tempdir().unwrap();
        let mut ctx = mac_context("/Applications/ZeroNet.app/Contents/MacOS/zeronet");

        assert_eq!(redirect_target(&ctx, work.path()), None);

        std::fs::create_dir(work.path().join("log")).unwrap();
        assert_eq!(
            redirect_target(&ctx, work.path()),
            Some(work.path().join("log/stdout.log"))
        );

        ctx.has_terminal = true;
        assert_eq!(redirect_target(&ctx, work.path()), None);
    }

    #[test]
    fn redirect_open_failure_leaves_streams_untouched() {
        let work = tempdir().unwrap();
        // A directory where the log file should be makes the open fail.
        std::fs::create_dir_all(work.path().join("log/stdout.log")).unwrap();
        let mut ctx = mac_context("/opt/zeronet/zeronet");
        ctx.platform = Platform::Linux;

        assert!(redirect_target(&ctx, work.path()).is_some());
        let prep = prepare(&ctx, work.path(), args(&["zeronet", "--debug"]));
        assert!(prep.log_file.is_none());
        assert_eq!(prep.args, args(&["zeronet", "--debug"]));
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_args_survive_preparation() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let odd = OsStr::from_bytes(b"--data_dir=/srv/\xfe\xff").to_os_string();
        let psn_lookalike = OsStr::from_bytes(b"-psn_\xff").to_os_string();
        let input = vec![OsString::from("zeronet"), odd.clone()];
        assert_eq!(strip_psn_arg(input.clone()), input);

        // Non-UTF-8 is never taken for a process serial number.
        let input = vec![OsString::from("zeronet"), psn_lookalike];
        assert_eq!(strip_psn_arg(input.clone()), input);

        let argv0 = OsStr::from_bytes(b"/Apps/\xff/Resources/boot.py").to_os_string();
        let input = vec![argv0, odd];
        assert_eq!(replace_boot_script_path(input.clone()), input);
    }

    #[test]
    fn cert_bundle_sets_both_variables() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let root = tempdir().unwrap();
        let resources = root.path().join("ZeroNet.app/Contents/Resources");
        std::fs::create_dir_all(&resources).unwrap();
        std::fs::write(resources.join("cacert.pem"), "-----BEGIN CERTIFICATE-----").unwrap();
        let exe = root.path().join("ZeroNet.app/Contents/MacOS/zeronet");
        let ctx = mac_context(exe.to_str().unwrap());

        let path = install_cert_bundle(&ctx).unwrap();
        let ssl = std::env::var_os("SSL_CERT_FILE");
        let requests = std::env::var_os("REQUESTS_CA_BUNDLE");
        std::env::remove_var("SSL_CERT_FILE");
        std::env::remove_var("REQUESTS_CA_BUNDLE");

        assert_eq!(path, resources.join("cacert.pem"));
        assert_eq!(ssl, Some(path.clone().into_os_string()));
        assert_eq!(requests, Some(path.into_os_string()));
    }

    #[test]
    fn missing_cert_bundle_is_not_fatal() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let root = tempdir().unwrap();
        let exe = root.path().join("ZeroNet.app/Contents/MacOS/zeronet");
        let mut ctx = mac_context(exe.to_str().unwrap());
        ctx.has_terminal = true;

        let prep = prepare(&ctx, root.path(), args(&["zeronet", "-psn_0_42"]));
        assert_eq!(prep.args, args(&["zeronet"]));
        assert!(prep.cert_bundle.is_none());
        assert!(prep.log_file.is_none());
    }

    #[test]
    fn cert_bundle_skipped_off_mac() {
        let root = tempdir().unwrap();
        let mut ctx = mac_context("/opt/zeronet/zeronet");
        ctx.platform = Platform::Linux;
        ctx.has_terminal = true;
        let prep = prepare(&ctx, root.path(), args(&["zeronet"]));
        assert!(prep.cert_bundle.is_none());
    }
}
