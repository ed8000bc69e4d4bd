use std::collections::HashMap;

use thiserror::Error;

use crate::latch::ExitSignal;

/// The two dock menu commands the bundle cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MenuAction {
    /// Dock icon clicked while already running.
    Reopen,
    Quit,
}

pub type MenuCallback = Box<dyn Fn() + Send + 'static>;

#[derive(Debug, Error)]
pub enum GuiError {
    #[error("failed to create dock window: {0}")]
    Create(String),
    #[error("failed to register {0:?} menu command: {1}")]
    Register(MenuAction, String),
    #[error("event loop failed: {0}")]
    EventLoop(String),
}

/// A minimal native window that exists only to receive dock menu commands.
///
/// Windows are thread-affine: every method is called on the thread that
/// created the window.
pub trait DockWindow {
    fn iconify(&mut self) -> Result<(), GuiError>;

    fn register_menu_command(
        &mut self,
        action: MenuAction,
        callback: MenuCallback,
    ) -> Result<(), GuiError>;

    /// Run the event loop until `stop` fires.
    fn run_event_loop(&mut self, stop: &ExitSignal) -> Result<(), GuiError>;

    fn destroy(&mut self);
}

pub trait DockToolkit {
    type Window: DockWindow;

    fn create_window(&mut self) -> Result<Self::Window, GuiError>;
}

/// Opens URLs for the "reopen" action.
pub trait Browser: Send + Sync + 'static {
    fn open(&self, url: &str) -> anyhow::Result<()>;
}

pub struct SystemBrowser;

impl Browser for SystemBrowser {
    fn open(&self, url: &str) -> anyhow::Result<()> {
        webbrowser::open(url)?;
        Ok(())
    }
}

// ── Headless dock ─────────────────────────────────────────────────────────────

/// Toolkit used when no native dock adapter is compiled in.
///
/// Its window has nothing to draw and no menu to click: the event loop only
/// waits for the exit latch, which the engine or a termination signal fires.
pub struct HeadlessDock;

impl DockToolkit for HeadlessDock {
    type Window = HeadlessWindow;

    fn create_window(&mut self) -> Result<HeadlessWindow, GuiError> {
        Ok(HeadlessWindow {
            callbacks: HashMap::new(),
            iconified: false,
            destroyed: false,
        })
    }
}

pub struct HeadlessWindow {
    callbacks: HashMap<MenuAction, MenuCallback>,
    iconified: bool,
    destroyed: bool,
}

impl DockWindow for HeadlessWindow {
    fn iconify(&mut self) -> Result<(), GuiError> {
        self.iconified = true;
        Ok(())
    }

    fn register_menu_command(
        &mut self,
        action: MenuAction,
        callback: MenuCallback,
    ) -> Result<(), GuiError> {
        if self.destroyed {
            return Err(GuiError::Register(action, "window destroyed".to_string()));
        }
        self.callbacks.insert(action, callback);
        Ok(())
    }

    fn run_event_loop(&mut self, stop: &ExitSignal) -> Result<(), GuiError> {
        if self.destroyed {
            return Err(GuiError::EventLoop("window destroyed".to_string()));
        }
        tracing::debug!(
            iconified = self.iconified,
            commands = self.callbacks.len(),
            "dock event loop running"
        );
        stop.wait();
        Ok(())
    }

    fn destroy(&mut self) {
        if !self.destroyed {
            self.callbacks.clear();
            self.destroyed = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::latch::ExitReason;
    use std::time::Duration;

    #[test]
    fn headless_loop_returns_when_stop_fires() {
        let mut window = HeadlessDock.create_window().unwrap();
        window.iconify().unwrap();
        assert!(window.iconified);

        let stop = ExitSignal::new();
        let firing = stop.clone();
        let t = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            firing.fire(ExitReason::EngineStopped);
        });

        window.run_event_loop(&stop).unwrap();
        t.join().unwrap();
        assert_eq!(stop.get(), Some(ExitReason::EngineStopped));
    }

    #[test]
    fn destroyed_window_rejects_commands() {
        let mut window = HeadlessDock.create_window().unwrap();
        window.destroy();
        window.destroy();
        let err = window
            .register_menu_command(MenuAction::Reopen, Box::new(|| {}))
            .unwrap_err();
        assert!(matches!(err, GuiError::Register(MenuAction::Reopen, _)));
        assert!(window.run_event_loop(&ExitSignal::new()).is_err());
    }
}
