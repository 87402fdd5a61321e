//! WebAssembly worker bindings: a message-driven machine host for the
//! browser, plus an `assemble` entry point for the editor.
//!
//! The worker owns at most one machine. It receives the same message
//! shapes the page posts to a web worker (`load`, `tick`, `run`, `stop`)
//! and, while running, advances in `pump` bursts so the event loop stays
//! responsive between budgets.

use emulator_core::{ComponentRegistry, ExchangeBundle, Machine};
use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;

macro_rules! console_log {
    ($($t:tt)*) => (web_sys::console::log_1(&format!($($t)*).into()))
}

/// Messages the worker understands, in the page's posted shape.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WorkerMessage {
    /// Replace the current machine with an exchanged snapshot.
    Load { machine: ExchangeBundle },
    /// Advance exactly one tick.
    Tick,
    /// Tick continuously across `pump` calls until stopped.
    Run,
    /// Stop continuous ticking.
    Stop,
}

/// The worker-side machine host.
#[wasm_bindgen]
pub struct WorkerMachine {
    registry: ComponentRegistry,
    machine: Option<Machine>,
    running: bool,
}

#[wasm_bindgen]
impl WorkerMachine {
    /// A host with no machine loaded, knowing every built-in component
    /// kind.
    #[wasm_bindgen(constructor)]
    #[must_use]
    pub fn new() -> Self {
        console_error_panic_hook::set_once();
        Self {
            registry: ComponentRegistry::default(),
            machine: None,
            running: false,
        }
    }

    /// Handles one posted message.
    ///
    /// # Errors
    ///
    /// Returns a `JsError` for unrecognized message shapes or a `load`
    /// whose snapshot does not rebuild.
    pub fn handle_message(&mut self, message: JsValue) -> Result<(), JsError> {
        let message: WorkerMessage = serde_wasm_bindgen::from_value(message)
            .map_err(|e| JsError::new(&format!("unsupported message: {e}")))?;
        console_log!("worker: {message:?}");

        match message {
            WorkerMessage::Load { machine } => {
                self.running = false;
                self.machine = Some(
                    Machine::from_exchange(&machine, &self.registry)
                        .map_err(|e| JsError::new(&e.to_string()))?,
                );
            }
            WorkerMessage::Tick => self.tick_once(),
            WorkerMessage::Run => self.running = self.machine.is_some(),
            WorkerMessage::Stop => self.running = false,
        }
        Ok(())
    }

    /// While running, advances up to `budget` ticks. Returns how many
    /// ticks were actually taken; zero when idle or stopped by an error.
    pub fn pump(&mut self, budget: u32) -> u32 {
        let mut taken = 0;
        while self.running && taken < budget {
            self.tick_once();
            taken += 1;
        }
        taken
    }

    /// Whether a `run` is in progress.
    #[must_use]
    #[allow(clippy::missing_const_for_fn)] // const fns do not cross the wasm boundary
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Ticks advanced on the current machine, or zero when none is
    /// loaded.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn tick_count(&self) -> f64 {
        self.machine
            .as_ref()
            .map_or(0.0, |machine| machine.tick_count() as f64)
    }

    /// The current machine as an exchange bundle, or `null` when none is
    /// loaded.
    ///
    /// # Errors
    ///
    /// Returns a `JsError` when the bundle does not convert to a JS
    /// value.
    pub fn export_state(&self) -> Result<JsValue, JsError> {
        self.machine.as_ref().map_or(Ok(JsValue::NULL), |machine| {
            serde_wasm_bindgen::to_value(&machine.to_exchange())
                .map_err(|e| JsError::new(&e.to_string()))
        })
    }

    /// The master's raw state buffer, empty when no machine is loaded.
    #[must_use]
    pub fn master_state(&self) -> js_sys::Uint8Array {
        self.machine
            .as_ref()
            .map_or_else(
                || js_sys::Uint8Array::new_with_length(0),
                |machine| js_sys::Uint8Array::from(&machine.to_exchange().master.state[..]),
            )
    }

    fn tick_once(&mut self) {
        let Some(machine) = self.machine.as_mut() else {
            console_log!("worker: tick with no machine loaded");
            self.running = false;
            return;
        };
        if let Err(e) = machine.do_tick() {
            console_log!("worker: tick {} aborted: {e}", machine.tick_count());
            self.running = false;
        }
    }
}

impl Default for WorkerMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Assembles source text into a little-endian binary image.
///
/// # Errors
///
/// Returns a `JsError` carrying the lex or assembly message.
#[wasm_bindgen]
pub fn assemble(source: &str) -> Result<Vec<u8>, JsError> {
    assembler::assemble_source(source).map_err(|e| JsError::new(&e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::WorkerMessage;

    #[test]
    fn posted_message_shapes_deserialize() {
        assert!(matches!(
            serde_json::from_str::<WorkerMessage>(r#"{"type":"tick"}"#).unwrap(),
            WorkerMessage::Tick
        ));
        assert!(matches!(
            serde_json::from_str::<WorkerMessage>(r#"{"type":"run"}"#).unwrap(),
            WorkerMessage::Run
        ));
        assert!(matches!(
            serde_json::from_str::<WorkerMessage>(r#"{"type":"stop"}"#).unwrap(),
            WorkerMessage::Stop
        ));
    }

    #[test]
    fn load_message_carries_a_bundle() {
        let bundle = emulator_core::Machine::from_parts(
            Box::new(emulator_core::ZeroToZero::from_context()),
            Vec::new(),
        )
        .to_exchange();
        let posted = serde_json::json!({ "type": "load", "machine": bundle });
        assert!(matches!(
            serde_json::from_value::<WorkerMessage>(posted).unwrap(),
            WorkerMessage::Load { .. }
        ));
    }

    #[test]
    fn unsupported_message_type_is_rejected() {
        assert!(serde_json::from_str::<WorkerMessage>(r#"{"type":"warp"}"#).is_err());
    }
}
