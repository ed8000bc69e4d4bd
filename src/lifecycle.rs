//! Runs the engine alone, or next to a dock event loop, and stops both together.
//!
//! In dual-role mode the engine runs on a worker thread while the calling
//! (main) thread owns the dock window and its event loop. Either side can
//! end the process:
//!
//! * the engine returns: the worker fires the exit latch, the event loop
//!   returns, the window is destroyed;
//! * the dock "quit" command fires the exit latch first: the event loop
//!   returns, the window is destroyed, the engine is asked to stop.
//!
//! SIGINT/SIGTERM take the quit path in both modes: the termination hook
//! fires the exit latch and stops the engine, so the engine child never
//! outlives the launcher.
//!
//! In both cases the coordinator joins the worker before returning, so
//! `main` only exits after both roles are done.

use std::ffi::OsString;
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::anyhow;

use crate::args::NormalizedArgs;
use crate::context::Platform;
use crate::engine::{Engine, UI_URL};
use crate::gui::{Browser, DockToolkit, DockWindow, GuiError, MenuAction};
use crate::latch::{ExitReason, ExitSignal, Readiness};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleRole {
    SingleRole,
    EngineWorker,
    GuiOwner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Idle,
    Starting,
    SingleRole,
    DualRole,
    Stopping,
    Terminated,
}

impl LifecycleState {
    fn can_advance_to(self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Idle, Starting)
                | (Starting, SingleRole)
                | (Starting, DualRole)
                | (SingleRole, Terminated)
                | (DualRole, Stopping)
                | (Stopping, Terminated)
        )
    }
}

/// Dual-role mode is for genuine dock launches only: no extra arguments.
pub fn wants_dual_role(platform: Platform, args: &[OsString], force_single_role: bool) -> bool {
    platform.has_dock() && args.len() <= 1 && !force_single_role
}

pub struct LifecycleCoordinator<E: Engine, T: DockToolkit> {
    engine: Arc<E>,
    toolkit: T,
    browser: Arc<dyn Browser>,
    interactive_session: bool,
    window: Option<T::Window>,
    state: LifecycleState,
    exit: ExitSignal,
    ready: Readiness,
}

impl<E: Engine, T: DockToolkit> LifecycleCoordinator<E, T> {
    pub fn new(
        engine: Arc<E>,
        toolkit: T,
        browser: Arc<dyn Browser>,
        interactive_session: bool,
    ) -> Self {
        LifecycleCoordinator {
            engine,
            toolkit,
            browser,
            interactive_session,
            window: None,
            state: LifecycleState::Idle,
            exit: ExitSignal::new(),
            ready: Readiness::new(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    #[cfg(test)]
    pub fn exit_signal(&self) -> ExitSignal {
        self.exit.clone()
    }

    /// Route SIGINT/SIGTERM to [`Self::termination_hook`]. Call before running either role.
    pub fn install_termination_handler(&self) -> anyhow::Result<()> {
        ctrlc::set_handler(self.termination_hook())?;
        Ok(())
    }

    /// Quit from outside the dock: fires `QuitRequested` and stops the engine.
    pub fn termination_hook(&self) -> impl Fn() + Send + 'static {
        let engine = Arc::clone(&self.engine);
        let exit = self.exit.clone();
        move || {
            tracing::info!("termination requested");
            exit.fire(ExitReason::QuitRequested);
            engine.stop();
        }
    }

    /// Engine on the calling thread. Engine errors propagate unchanged.
    pub fn run_single(&mut self, args: &NormalizedArgs) -> anyhow::Result<()> {
        self.advance(LifecycleState::Starting)?;
        self.advance(LifecycleState::SingleRole)?;
        let _span = tracing::info_span!("lifecycle", role = ?LifecycleRole::SingleRole).entered();

        let result = self.engine.start(args, &self.ready);
        self.exit.fire(ExitReason::EngineStopped);
        self.advance(LifecycleState::Terminated)?;
        result
    }

    /// Engine on a worker thread, dock event loop on the calling thread.
    ///
    /// Returns why the process is stopping; an engine error or a worker
    /// panic is returned as an error instead.
    pub fn run_dual(&mut self, args: NormalizedArgs) -> anyhow::Result<ExitReason> {
        self.advance(LifecycleState::Starting)?;
        let worker = self.spawn_worker(args)?;
        self.advance(LifecycleState::DualRole)?;

        {
            let _span = tracing::info_span!("lifecycle", role = ?LifecycleRole::GuiOwner).entered();
            self.run_gui();
        }

        self.advance(LifecycleState::Stopping)?;
        self.destroy_window();
        // No-op when the engine already returned.
        self.engine.stop();
        let outcome = worker.join();
        self.advance(LifecycleState::Terminated)?;

        let reason = self.exit.get().unwrap_or(ExitReason::EngineStopped);
        match outcome {
            Ok(Ok(())) => {
                tracing::info!(?reason, "stopped");
                Ok(reason)
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Err(anyhow!("engine worker panicked")),
        }
    }

    /// Destroy the dock window if it still exists. Returns whether this call destroyed it.
    pub fn destroy_window(&mut self) -> bool {
        match self.window.take() {
            Some(mut window) => {
                window.destroy();
                tracing::debug!("dock window destroyed");
                true
            }
            None => false,
        }
    }

    fn advance(&mut self, next: LifecycleState) -> anyhow::Result<()> {
        if !self.state.can_advance_to(next) {
            return Err(anyhow!(
                "invalid lifecycle transition {:?} -> {:?}",
                self.state,
                next
            ));
        }
        tracing::debug!(from = ?self.state, to = ?next, "lifecycle");
        self.state = next;
        Ok(())
    }

    fn spawn_worker(&self, args: NormalizedArgs) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        let engine = Arc::clone(&self.engine);
        let ready = self.ready.clone();
        let exit = self.exit.clone();

        let handle = std::thread::Builder::new()
            .name("engine-worker".to_string())
            .spawn(move || {
                let _span =
                    tracing::info_span!("lifecycle", role = ?LifecycleRole::EngineWorker).entered();
                // Fires on return and on unwind alike, so the GUI never waits forever.
                let _notify = FireOnDrop(exit);
                let result = engine.start(&args, &ready);
                if let Err(err) = &result {
                    tracing::error!("engine failed: {err:#}");
                }
                result
            })?;
        Ok(handle)
    }

    /// GuiOwner role. Returns once the exit latch has fired.
    fn run_gui(&mut self) {
        // The reopen action is only useful once the UI server answers.
        crossbeam_channel::select! {
            recv(self.ready.receiver()) -> _ => {}
            recv(self.exit.receiver()) -> _ => {}
        }
        if self.exit.is_fired() {
            tracing::info!("engine stopped before the dock came up");
            return;
        }

        match self.run_dock() {
            Ok(()) => tracing::info!("stopping..."),
            Err(err) => {
                // A broken dock must not take a working engine down with it.
                tracing::error!("gui error: {err}");
                self.exit.wait();
            }
        }
    }

    fn run_dock(&mut self) -> Result<(), GuiError> {
        let window = self.window.insert(self.toolkit.create_window()?);
        window.iconify()?;

        let browser = Arc::clone(&self.browser);
        window.register_menu_command(
            MenuAction::Reopen,
            Box::new(move || {
                tracing::info!("click: open");
                open_ui(browser.as_ref());
            }),
        )?;

        let exit = self.exit.clone();
        window.register_menu_command(
            MenuAction::Quit,
            Box::new(move || {
                tracing::info!("click: quit");
                exit.fire(ExitReason::QuitRequested);
            }),
        )?;

        if !self.interactive_session {
            // Started by auto-run: nobody clicked the dock icon yet.
            open_ui(self.browser.as_ref());
        }

        window.run_event_loop(&self.exit)
    }
}

fn open_ui(browser: &dyn Browser) {
    if let Err(err) = browser.open(UI_URL) {
        tracing::warn!("failed to open browser: {err:#}");
    }
}

struct FireOnDrop(ExitSignal);

impl Drop for FireOnDrop {
    fn drop(&mut self) {
        self.0.fire(ExitReason::EngineStopped);
    }
}
