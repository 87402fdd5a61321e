//! Background runner: owns a machine on a worker thread and drives it by
//! message.
//!
//! Commands arrive over a channel and are processed strictly in order,
//! without coalescing. While running, the worker ticks once per scheduling
//! opportunity and keeps polling for commands between ticks, so a `Stop`
//! always lands before the next tick. After every processed tick the
//! worker publishes an exchange-bundle snapshot into a shared cell for
//! callers to poll.
//!
//! Loading a machine transfers ownership into the worker; the sender keeps
//! no handle to it, which keeps the single-writer rule intact.

use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::thread::JoinHandle;

use thiserror::Error;
use tracing::{debug, error};

use crate::exchange::ExchangeBundle;
use crate::machine::Machine;
use crate::registry::ComponentRegistry;

/// Commands understood by the worker thread.
enum Command {
    /// Replace the current machine; cancels an in-flight run.
    Load(ExchangeBundle),
    /// Advance exactly one tick.
    Tick,
    /// Tick continuously until stopped.
    Run,
    /// Cooperatively stop a run before the next tick.
    Stop,
    /// Tear the worker down.
    Shutdown,
}

/// Errors from commanding the runner.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunnerError {
    /// The worker thread is gone; no further commands can be delivered.
    #[error("background runner is no longer accepting commands")]
    Disconnected,
}

/// Handle to a machine running on a background thread.
pub struct BackgroundRunner {
    sender: Sender<Command>,
    snapshot: Arc<Mutex<Option<ExchangeBundle>>>,
    handle: Option<JoinHandle<()>>,
}

impl BackgroundRunner {
    /// Spawns the worker thread. It starts with no machine loaded.
    #[must_use]
    pub fn spawn(registry: ComponentRegistry) -> Self {
        let (sender, receiver) = mpsc::channel();
        let snapshot = Arc::new(Mutex::new(None));
        let cell = Arc::clone(&snapshot);
        let handle = thread::spawn(move || worker_loop(&receiver, &registry, &cell));
        Self {
            sender,
            snapshot,
            handle: Some(handle),
        }
    }

    fn send(&self, command: Command) -> Result<(), RunnerError> {
        self.sender
            .send(command)
            .map_err(|_| RunnerError::Disconnected)
    }

    /// Hands a machine snapshot to the worker, replacing whatever it held.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Disconnected`] when the worker is gone.
    pub fn load(&self, bundle: ExchangeBundle) -> Result<(), RunnerError> {
        self.send(Command::Load(bundle))
    }

    /// Requests exactly one tick.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Disconnected`] when the worker is gone.
    pub fn tick(&self) -> Result<(), RunnerError> {
        self.send(Command::Tick)
    }

    /// Starts continuous ticking.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Disconnected`] when the worker is gone.
    pub fn run(&self) -> Result<(), RunnerError> {
        self.send(Command::Run)
    }

    /// Stops continuous ticking before the next tick.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Disconnected`] when the worker is gone.
    pub fn stop(&self) -> Result<(), RunnerError> {
        self.send(Command::Stop)
    }

    /// The snapshot published after the most recent tick, if any.
    #[must_use]
    pub fn snapshot(&self) -> Option<ExchangeBundle> {
        self.snapshot.lock().ok().and_then(|guard| guard.clone())
    }
}

impl Drop for BackgroundRunner {
    fn drop(&mut self) {
        let _ = self.sender.send(Command::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn publish(cell: &Mutex<Option<ExchangeBundle>>, machine: Option<&Machine>) {
    if let Ok(mut slot) = cell.lock() {
        *slot = machine.map(Machine::to_exchange);
    }
}

fn tick_once(machine: &mut Option<Machine>, running: &mut bool) {
    let Some(machine) = machine.as_mut() else {
        debug!("runner: tick requested with no machine loaded");
        *running = false;
        return;
    };
    if let Err(err) = machine.do_tick() {
        error!("runner: tick {} aborted: {err}", machine.tick_count());
        *running = false;
    }
}

fn worker_loop(
    receiver: &Receiver<Command>,
    registry: &ComponentRegistry,
    cell: &Mutex<Option<ExchangeBundle>>,
) {
    let mut machine: Option<Machine> = None;
    let mut running = false;

    loop {
        // While running, poll so ticks keep flowing; otherwise block.
        let command = if running {
            match receiver.try_recv() {
                Ok(command) => Some(command),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => return,
            }
        } else {
            match receiver.recv() {
                Ok(command) => Some(command),
                Err(_) => return,
            }
        };

        match command {
            Some(Command::Load(bundle)) => {
                running = false;
                match Machine::from_exchange(&bundle, registry) {
                    Ok(loaded) => {
                        debug!("runner: machine loaded");
                        machine = Some(loaded);
                    }
                    Err(err) => {
                        error!("runner: load failed: {err}");
                        machine = None;
                    }
                }
                publish(cell, machine.as_ref());
            }
            Some(Command::Tick) => {
                tick_once(&mut machine, &mut running);
                publish(cell, machine.as_ref());
            }
            Some(Command::Run) => running = machine.is_some(),
            Some(Command::Stop) => running = false,
            Some(Command::Shutdown) => return,
            None => {
                tick_once(&mut machine, &mut running);
                publish(cell, machine.as_ref());
            }
        }
    }
}
