//! One-shot notifications shared between the engine worker and the GUI thread.
//!
//! A latch fires at most once. Firing drops the only sender of an internal
//! channel, which wakes every receiver clone at once, so a latch can sit in
//! a `crossbeam_channel::select!` next to other events.

use std::sync::{Arc, OnceLock};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

struct Inner<T> {
    value: OnceLock<T>,
    trigger: Mutex<Option<Sender<()>>>,
    fired: Receiver<()>,
}

pub struct Latch<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Latch<T> {
    fn clone(&self) -> Self {
        Latch {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> Default for Latch<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Latch<T> {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(0);
        Latch {
            inner: Arc::new(Inner {
                value: OnceLock::new(),
                trigger: Mutex::new(Some(tx)),
                fired: rx,
            }),
        }
    }

    /// Returns `false` if the latch had already fired; the first value wins.
    pub fn fire(&self, value: T) -> bool {
        if self.inner.value.set(value).is_err() {
            return false;
        }
        self.inner.trigger.lock().take();
        true
    }

    pub fn get(&self) -> Option<T> {
        self.inner.value.get().cloned()
    }

    pub fn is_fired(&self) -> bool {
        self.inner.value.get().is_some()
    }

    /// Block until fired.
    pub fn wait(&self) -> Option<T> {
        // Only ever disconnects, never delivers a message.
        let _ = self.inner.fired.recv();
        self.get()
    }

    /// Becomes ready (disconnected) once the latch fires.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.inner.fired
    }
}

/// Why the whole process is shutting down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The engine's entry point returned.
    EngineStopped,
    /// The dock "quit" action (or an OS termination request routed to it).
    QuitRequested,
}

/// Terminate-the-process intent, delivered across the worker/GUI boundary once.
pub type ExitSignal = Latch<ExitReason>;

/// Fired by the engine once its UI server is accepting connections.
pub type Readiness = Latch<()>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn first_fire_wins() {
        let exit = ExitSignal::new();
        assert!(exit.fire(ExitReason::QuitRequested));
        assert!(!exit.fire(ExitReason::EngineStopped));
        assert_eq!(exit.get(), Some(ExitReason::QuitRequested));
    }

    #[test]
    fn wait_wakes_every_clone() {
        let exit = ExitSignal::new();
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let exit = exit.clone();
                std::thread::spawn(move || exit.wait())
            })
            .collect();

        std::thread::sleep(Duration::from_millis(20));
        exit.fire(ExitReason::EngineStopped);

        for waiter in waiters {
            assert_eq!(waiter.join().unwrap(), Some(ExitReason::EngineStopped));
        }
    }

    #[test]
    fn wait_after_fire_returns_immediately() {
        let ready = Readiness::new();
        ready.fire(());
        assert_eq!(ready.wait(), Some(()));
        assert!(ready.is_fired());
    }

    #[test]
    fn unfired_latch_blocks_in_select() {
        let ready = Readiness::new();
        let fired = crossbeam_channel::select! {
            recv(ready.receiver()) -> _ => true,
            default(Duration::from_millis(20)) => false,
        };
        assert!(!fired);
        assert!(!ready.is_fired());
    }
}
