//! Tick-driven bus framework: component identity, idempotency guards, the
//! [`Device`] and [`Master`] traits, and the arbitrating [`Bus`].
//!
//! Every component sees at most one IO operation and one tick per tick
//! number. Replaying a tick is a no-op, which makes ticks safe to retry at
//! the machine level without double-advancing device state.

use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tracing::trace;

use crate::config::ComponentConfig;

/// Identity of a bus component: a registry kind name plus a stable id.
///
/// The id field is called `uuid` on the wire for compatibility with the
/// exchange format; ids are minted from a process-wide counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentInfo {
    /// Registry kind name, e.g. `"ram32"`.
    pub name: String,
    /// Stable per-instance id.
    pub uuid: String,
}

static NEXT_COMPONENT_ID: AtomicU64 = AtomicU64::new(1);

/// Mints a fresh component id, unique within this process.
#[must_use]
pub fn mint_component_id() -> String {
    format!("c{:06}", NEXT_COMPONENT_ID.fetch_add(1, Ordering::Relaxed))
}

/// Tracks the last tick and IO-tick a component acted on.
///
/// A component acts at most once per tick number; asking again for the same
/// number is a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickGuard {
    last_tick: Option<u64>,
    last_io: Option<u64>,
}

impl TickGuard {
    /// Claims `tick`; returns `false` if it was already claimed.
    pub fn should_tick(&mut self, tick: u64) -> bool {
        if self.last_tick == Some(tick) {
            return false;
        }
        self.last_tick = Some(tick);
        true
    }

    /// Claims `io_tick`; returns `false` if it was already claimed.
    pub fn should_io(&mut self, io_tick: u64) -> bool {
        if self.last_io == Some(io_tick) {
            return false;
        }
        self.last_io = Some(io_tick);
        true
    }

    /// Whether IO already happened on `io_tick`.
    #[must_use]
    pub fn has_done_io(&self, io_tick: u64) -> bool {
        self.last_io == Some(io_tick)
    }
}

/// A memory-mapped bus device.
///
/// Devices answer reads only for addresses they claim; returning `None`
/// passes. `Send` so a machine can relocate to a background thread.
pub trait Device: Send {
    /// Responds to a read, or `None` if the address is not claimed.
    fn device_read(&mut self, io_tick: u64, address: u32) -> Option<u32>;

    /// Observes a write. Writes are broadcast; unclaimed addresses are
    /// ignored by convention.
    fn device_write(&mut self, io_tick: u64, address: u32, value: u32);

    /// Advances internal state by one tick.
    fn device_tick(&mut self, tick: u64);

    /// Component identity.
    fn info(&self) -> ComponentInfo;

    /// Serializes internal state into the component's exchange buffer.
    fn export_state(&self) -> Vec<u8>;

    /// Serializes construction parameters into a configuration entry.
    fn to_config(&self) -> ComponentConfig;
}

/// A bus master: the one component that initiates IO.
pub trait Master: Send {
    /// Performs at most one bus operation for this IO tick.
    ///
    /// # Errors
    ///
    /// Propagates a fatal [`BusError`] from the bus (a read collision).
    fn master_io(&mut self, io_tick: u64, bus: &mut Bus) -> Result<(), BusError>;

    /// Advances internal state by one tick.
    fn master_tick(&mut self, tick: u64);

    /// Component identity.
    fn info(&self) -> ComponentInfo;

    /// Serializes internal state into the component's exchange buffer.
    fn export_state(&self) -> Vec<u8>;

    /// Serializes construction parameters into a configuration entry.
    fn to_config(&self) -> ComponentConfig;
}

/// A device attached to the bus, wrapped with its idempotency guard and the
/// read response cached for the current IO tick.
struct AttachedDevice {
    device: Box<dyn Device>,
    guard: TickGuard,
    response: Option<u32>,
}

impl AttachedDevice {
    fn read(&mut self, io_tick: u64, address: u32) -> Option<u32> {
        if self.guard.should_io(io_tick) {
            self.response = self.device.device_read(io_tick, address);
        }
        self.response
    }

    fn write(&mut self, io_tick: u64, address: u32, value: u32) {
        if self.guard.should_io(io_tick) {
            self.device.device_write(io_tick, address, value);
        }
    }

    fn tick(&mut self, tick: u64) {
        if self.guard.should_tick(tick) {
            self.device.device_tick(tick);
        }
    }
}

/// Direction of the last bus transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusDirection {
    /// A master-initiated read.
    Read,
    /// A master-initiated write.
    Write,
    /// No transaction this tick.
    #[default]
    Idle,
}

impl BusDirection {
    /// Converts to the single-byte exchange encoding (1 read, 0 write,
    /// `0xFF` idle).
    #[must_use]
    pub const fn to_byte(self) -> u8 {
        match self {
            Self::Read => 1,
            Self::Write => 0,
            Self::Idle => 0xFF,
        }
    }

    /// Converts from the single-byte exchange encoding.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Read),
            0 => Some(Self::Write),
            0xFF => Some(Self::Idle),
            _ => None,
        }
    }
}

/// Observable state of the most recent bus transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BusTransaction {
    /// Address of the last transaction.
    pub address: u32,
    /// Value read or written.
    pub value: u32,
    /// Transaction direction, [`BusDirection::Idle`] when nothing happened.
    pub direction: BusDirection,
}

/// Fatal bus errors. A collision aborts the tick that raised it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// Two devices both answered the same read.
    #[error(
        "bus collision @ 0x{address:08x}: {first} (0x{first_value:08x}) \
         and {second} (0x{second_value:08x}) both responded"
    )]
    Collision {
        /// Read address that collided.
        address: u32,
        /// Id of the first responder.
        first: String,
        /// Value from the first responder.
        first_value: u32,
        /// Id of the second responder.
        second: String,
        /// Value from the second responder.
        second_value: u32,
    },
}

/// The master bus: broadcasts IO to attached devices and arbitrates reads.
pub struct Bus {
    uuid: String,
    devices: Vec<AttachedDevice>,
    guard: TickGuard,
    transaction: BusTransaction,
    response: Option<u32>,
}

impl Bus {
    /// Builds a bus over `devices` with a fresh id and an idle transaction.
    #[must_use]
    pub fn new(devices: Vec<Box<dyn Device>>) -> Self {
        Self::with_parts(devices, mint_component_id(), BusTransaction::default())
    }

    /// Rebuilds a bus from exchanged identity and transaction state.
    #[must_use]
    pub fn with_parts(
        devices: Vec<Box<dyn Device>>,
        uuid: String,
        transaction: BusTransaction,
    ) -> Self {
        Self {
            uuid,
            devices: devices
                .into_iter()
                .map(|device| AttachedDevice {
                    device,
                    guard: TickGuard::default(),
                    response: None,
                })
                .collect(),
            guard: TickGuard::default(),
            transaction,
            response: None,
        }
    }

    /// Attaches another device.
    pub fn add_device(&mut self, device: Box<dyn Device>) {
        self.devices.push(AttachedDevice {
            device,
            guard: TickGuard::default(),
            response: None,
        });
    }

    /// Component identity; the kind name is always `"bus"`.
    #[must_use]
    pub fn info(&self) -> ComponentInfo {
        ComponentInfo {
            name: "bus".to_owned(),
            uuid: self.uuid.clone(),
        }
    }

    /// The observable state of the most recent transaction.
    #[must_use]
    pub const fn transaction(&self) -> BusTransaction {
        self.transaction
    }

    /// Broadcasts a read to every device and arbitrates the responses.
    ///
    /// `None` means no device claimed the address; that is not an error.
    /// A repeated read on the same IO tick returns the cached response.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Collision`] when two devices both respond,
    /// regardless of their attachment order.
    pub fn read(&mut self, io_tick: u64, address: u32) -> Result<Option<u32>, BusError> {
        if !self.guard.should_io(io_tick) {
            return Ok(self.response);
        }
        self.response = None;

        let mut winner: Option<(ComponentInfo, u32)> = None;
        for attached in &mut self.devices {
            let Some(value) = attached.read(io_tick, address) else {
                continue;
            };
            if let Some((first, first_value)) = winner {
                return Err(BusError::Collision {
                    address,
                    first: first.uuid,
                    first_value,
                    second: attached.device.info().uuid,
                    second_value: value,
                });
            }
            winner = Some((attached.device.info(), value));
        }

        let response = winner.map(|(_, value)| value);
        trace!(address, ?response, "bus read");
        self.response = response;
        self.transaction = BusTransaction {
            address,
            value: response.unwrap_or(0),
            direction: BusDirection::Read,
        };
        Ok(response)
    }

    /// Broadcasts a write to every device unconditionally.
    pub fn write(&mut self, io_tick: u64, address: u32, value: u32) {
        if !self.guard.should_io(io_tick) {
            return;
        }
        trace!(address, value, "bus write");
        for attached in &mut self.devices {
            attached.write(io_tick, address, value);
        }
        self.transaction = BusTransaction {
            address,
            value,
            direction: BusDirection::Write,
        };
    }

    /// Ticks every attached device, then drops the transaction back to idle
    /// if no IO happened on this tick.
    pub fn tick(&mut self, tick: u64) {
        if !self.guard.should_tick(tick) {
            return;
        }
        for attached in &mut self.devices {
            attached.tick(tick);
        }
        if !self.guard.has_done_io(tick) {
            self.transaction.direction = BusDirection::Idle;
        }
    }

    /// Serializes the transaction state into the 9-byte exchange buffer:
    /// address, value (both big-endian), direction byte.
    #[must_use]
    pub fn export_state(&self) -> Vec<u8> {
        let mut state = Vec::with_capacity(9);
        state.extend_from_slice(&self.transaction.address.to_be_bytes());
        state.extend_from_slice(&self.transaction.value.to_be_bytes());
        state.push(self.transaction.direction.to_byte());
        state
    }

    /// Identity and exported state of every attached device, in attachment
    /// order.
    #[must_use]
    pub fn device_states(&self) -> Vec<(ComponentInfo, Vec<u8>)> {
        self.devices
            .iter()
            .map(|attached| (attached.device.info(), attached.device.export_state()))
            .collect()
    }

    /// Configuration entries for every attached device, in attachment order.
    #[must_use]
    pub fn device_configs(&self) -> Vec<ComponentConfig> {
        self.devices
            .iter()
            .map(|attached| attached.device.to_config())
            .collect()
    }
}
