//! The exchange bundle: a running machine flattened into opaque state
//! buffers so it can cross a thread or worker boundary.
//!
//! Buffers hold big-endian `u32` fields. Handing a bundle away is a move by
//! convention: exactly one owner may resume ticking it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire identity of a component: registry kind name and stable id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeInfo {
    /// Registry kind name.
    pub name: String,
    /// Stable per-instance id.
    pub uuid: String,
}

/// One component's identity plus its opaque state buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentExchange {
    /// Component identity.
    pub info: ExchangeInfo,
    /// Opaque state buffer; the layout belongs to the component kind.
    pub state: Vec<u8>,
}

/// The bus half of a bundle: the bus's own transaction state plus every
/// attached device, in attachment order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusExchange {
    /// The bus's identity and 9-byte transaction buffer.
    pub exchange: ComponentExchange,
    /// Attached devices, in order.
    pub devices: Vec<ComponentExchange>,
}

/// A complete machine snapshot: master plus bus plus devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeBundle {
    /// The bus master.
    pub master: ComponentExchange,
    /// The bus and its devices.
    pub bus: BusExchange,
}

/// Errors while rebuilding components from exchanged state buffers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    /// The buffer is shorter than the component layout requires.
    #[error("state buffer truncated: need at least {need} bytes, got {got}")]
    Truncated {
        /// Bytes the layout requires.
        need: usize,
        /// Bytes actually present.
        got: usize,
    },
    /// The buffer length does not fit the component layout.
    #[error("state buffer has invalid length {got}: {reason}")]
    BadLength {
        /// Bytes actually present.
        got: usize,
        /// What the layout expected.
        reason: &'static str,
    },
    /// A field held a value outside its domain.
    #[error("invalid {field} value {value}")]
    BadField {
        /// Field name within the component layout.
        field: &'static str,
        /// Offending value.
        value: u32,
    },
    /// The bundle names a component kind the registry does not know.
    #[error("unknown component kind '{0}'")]
    UnknownComponent(String),
}

/// Reads a big-endian `u32` field at `offset`.
///
/// # Errors
///
/// Returns [`ExchangeError::Truncated`] when the buffer ends early.
pub fn read_u32_be(state: &[u8], offset: usize) -> Result<u32, ExchangeError> {
    let end = offset + 4;
    let bytes = state.get(offset..end).ok_or(ExchangeError::Truncated {
        need: end,
        got: state.len(),
    })?;
    let mut field = [0u8; 4];
    field.copy_from_slice(bytes);
    Ok(u32::from_be_bytes(field))
}

/// Appends a big-endian `u32` field.
pub fn push_u32_be(buffer: &mut Vec<u8>, value: u32) {
    buffer.extend_from_slice(&value.to_be_bytes());
}

#[cfg(test)]
mod tests {
    use super::{push_u32_be, read_u32_be, ExchangeError};

    #[test]
    fn u32_fields_are_big_endian() {
        let mut buffer = Vec::new();
        push_u32_be(&mut buffer, 0x1234_5678);
        assert_eq!(buffer, vec![0x12, 0x34, 0x56, 0x78]);
        assert_eq!(read_u32_be(&buffer, 0).unwrap(), 0x1234_5678);
    }

    #[test]
    fn truncated_reads_report_required_length() {
        let err = read_u32_be(&[0, 1, 2], 0).unwrap_err();
        assert_eq!(err, ExchangeError::Truncated { need: 4, got: 3 });
        let err = read_u32_be(&[0; 8], 6).unwrap_err();
        assert_eq!(err, ExchangeError::Truncated { need: 10, got: 8 });
    }
}
