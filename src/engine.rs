use std::net::{SocketAddr, TcpStream};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;

use crate::args::NormalizedArgs;
use crate::config::BootConfig;
use crate::latch::Readiness;
use crate::sources::SourcePaths;

/// The only address the engine's UI server ever listens on for the bundle.
pub const UI_URL: &str = "http://127.0.0.1:43110";
const UI_ADDR: ([u8; 4], u16) = ([127, 0, 0, 1], 43110);

const ENGINE_SCRIPT: &str = "zeronet.py";
const MIN_PYTHON: (u32, u32) = (3, 6);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no suitable Python >= 3.6 found in PATH")]
    NoPython,
    #[error("zeronet.py not found in any source path: {0}")]
    ScriptNotFound(String),
    #[error("failed to start engine: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine exited with code {code:?}")]
    Exited { code: Option<i32> },
}

/// The peer-to-peer engine as seen by the coordinator.
pub trait Engine: Send + Sync + 'static {
    /// Run until the engine stops. Fire `ready` once the UI server is up.
    fn start(&self, args: &NormalizedArgs, ready: &Readiness) -> anyhow::Result<()>;

    /// Ask a running engine to stop. Safe to call at any time, more than once.
    fn stop(&self);
}

/// Runs the selected source tree under a Python interpreter.
pub struct ProcessEngine {
    python: PathBuf,
    sources: SourcePaths,
    ui_addr: SocketAddr,
    child: Mutex<Option<Child>>,
    stop_requested: AtomicBool,
}

impl ProcessEngine {
    pub fn new(python: PathBuf, sources: SourcePaths) -> Self {
        ProcessEngine {
            python,
            sources,
            ui_addr: SocketAddr::from(UI_ADDR),
            child: Mutex::new(None),
            stop_requested: AtomicBool::new(false),
        }
    }

    /// Interpreter from `ZERONET_PYTHON`, else the first suitable one on `PATH`.
    pub fn locate(config: &BootConfig, sources: SourcePaths) -> Result<Self, EngineError> {
        let python = match &config.python {
            Some(python) => python.clone(),
            None => try_system_python().ok_or(EngineError::NoPython)?,
        };
        tracing::debug!(python = %python.display(), "engine interpreter");
        Ok(Self::new(python, sources))
    }

    #[cfg(test)]
    fn with_ui_addr(mut self, addr: SocketAddr) -> Self {
        self.ui_addr = addr;
        self
    }

    /// First entry of the search order that carries the engine script.
    fn script(&self) -> Result<PathBuf, EngineError> {
        self.sources
            .search
            .iter()
            .map(|dir| dir.join(ENGINE_SCRIPT))
            .find(|script| script.is_file())
            .ok_or_else(|| {
                let searched: Vec<String> = self
                    .sources
                    .search
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect();
                EngineError::ScriptNotFound(searched.join(", "))
            })
    }

    fn command(&self, args: &NormalizedArgs) -> anyhow::Result<Command> {
        let script = self.script()?;
        let mut cmd = Command::new(&self.python);
        cmd.arg(&script)
            .args(args.engine_args())
            .env("PYTHONPATH", self.sources.search_path_env()?)
            .stdin(Stdio::null());
        if let Some(update_dir) = &self.sources.update_dir {
            cmd.env("ZERONET_SOURCE_UPDATE_DIR", update_dir);
        }
        Ok(cmd)
    }

    fn ui_is_up(&self) -> bool {
        TcpStream::connect_timeout(&self.ui_addr, POLL_INTERVAL).is_ok()
    }
}

impl Engine for ProcessEngine {
    fn start(&self, args: &NormalizedArgs, ready: &Readiness) -> anyhow::Result<()> {
        let mut cmd = self.command(args)?;
        if self.stop_requested.load(Ordering::SeqCst) {
            tracing::info!("stop requested before engine start");
            return Ok(());
        }
        let child = cmd.spawn().map_err(EngineError::Spawn)?;
        tracing::info!(pid = child.id(), program = ?args.program(), "engine started");
        *self.child.lock() = Some(child);

        // stop() may have run before the child was stored.
        if self.stop_requested.load(Ordering::SeqCst) {
            self.stop();
        }

        loop {
            // Reap and release under one guard: stop() must never signal a reaped pid.
            let status = {
                let mut slot = self.child.lock();
                let Some(child) = slot.as_mut() else {
                    return Ok(());
                };
                let status = child.try_wait()?;
                if status.is_some() {
                    slot.take();
                }
                status
            };

            if let Some(status) = status {
                tracing::info!(%status, "engine exited");
                if status.success() || self.stop_requested.load(Ordering::SeqCst) {
                    return Ok(());
                }
                return Err(EngineError::Exited {
                    code: status.code(),
                }
                .into());
            }

            if !ready.is_fired() && self.ui_is_up() {
                tracing::info!(addr = %self.ui_addr, "engine ui server is up");
                ready.fire(());
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }

    fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        if let Some(child) = self.child.lock().as_mut() {
            tracing::info!(pid = child.id(), "stopping engine");
            terminate(child);
        }
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    // SAFETY: plain kill(2) on a pid we spawned and have not reaped yet.
    let rc = unsafe { libc::kill(child.id() as libc::pid_t, libc::SIGTERM) };
    if rc == -1 {
        tracing::warn!("SIGTERM failed: {}", std::io::Error::last_os_error());
        let _ = child.kill();
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    if let Err(err) = child.kill() {
        tracing::warn!("failed to stop engine: {err}");
    }
}

// ── Interpreter discovery ─────────────────────────────────────────────────────

/// Try ["python3", "python"] in PATH. Return Some(path) if new enough, else None.
fn try_system_python() -> Option<PathBuf> {
    for name in &["python3", "python"] {
        if let Ok(output) = Command::new(name).arg("--version").output() {
            if output.status.success() {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                let version_str = if stdout.contains("Python") {
                    &*stdout
                } else {
                    &*stderr
                };
                if let Some(version) = parse_python_version(version_str) {
                    if version >= MIN_PYTHON {
                        return Some(which_bin(name).unwrap_or_else(|_| PathBuf::from(name)));
                    }
                }
            }
        }
    }
    None
}

fn parse_python_version(s: &str) -> Option<(u32, u32)> {
    let s = s.trim().strip_prefix("Python ")?.trim();
    let mut parts = s.splitn(3, '.');
    let major: u32 = parts.next()?.parse().ok()?;
    let minor: u32 = parts.next()?.parse().ok()?;
    Some((major, minor))
}

fn which_bin(name: &str) -> anyhow::Result<PathBuf> {
    let output = Command::new("which").arg(name).output()?;
    if output.status.success() {
        let path = String::from_utf8(output.stdout)?.trim().to_string();
        Ok(PathBuf::from(path))
    } else {
        anyhow::bail!("which {} failed", name)
    }
}
