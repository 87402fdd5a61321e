//! `ram32`: word-addressed volatile memory.
//!
//! Claims the byte range `[base, base + size)`. Unaligned accesses are
//! served best-effort at the address rounded down to a word boundary, with
//! a warning; the policy is the same for reads and writes.

use tracing::{trace, warn};

use crate::bus::{mint_component_id, ComponentInfo, Device};
use crate::config::{ComponentConfig, RamContext};
use crate::exchange::{push_u32_be, read_u32_be, ExchangeError};

/// Volatile word-addressed memory device.
pub struct Ram32 {
    uuid: String,
    base: u32,
    size: u32,
    words: Vec<u32>,
}

impl Ram32 {
    /// Registry kind name.
    pub const NAME: &'static str = "ram32";

    /// Builds zeroed RAM from a context. The byte size is rounded up to a
    /// whole number of words.
    #[must_use]
    pub fn new(context: RamContext, uuid: String) -> Self {
        let size = context.size.checked_add(3).map_or(u32::MAX & !3, |s| s & !3);
        Self {
            uuid,
            base: context.address,
            size,
            words: vec![0; (size / 4) as usize],
        }
    }

    /// Builds zeroed RAM with a fresh id.
    #[must_use]
    pub fn from_context(context: RamContext) -> Self {
        Self::new(context, mint_component_id())
    }

    /// Rebuilds RAM from an exchanged state buffer.
    ///
    /// # Errors
    ///
    /// Returns an [`ExchangeError`] when the buffer is truncated or its
    /// length disagrees with the recorded size.
    pub fn from_state(state: &[u8], uuid: String) -> Result<Self, ExchangeError> {
        let base = read_u32_be(state, 0)?;
        let size = read_u32_be(state, 4)?;
        if size % 4 != 0 || state.len() != 8 + size as usize {
            return Err(ExchangeError::BadLength {
                got: state.len(),
                reason: "expected 8 header bytes plus `size` bytes of words",
            });
        }
        let words = (0..size / 4)
            .map(|i| read_u32_be(state, 8 + (i as usize) * 4))
            .collect::<Result<Vec<u32>, ExchangeError>>()?;
        Ok(Self {
            uuid,
            base,
            size,
            words,
        })
    }

    const fn word_index(&self, address: u32) -> usize {
        ((address - self.base) / 4) as usize
    }

    const fn claims(&self, address: u32) -> bool {
        address >= self.base && address - self.base < self.size
    }
}

impl Device for Ram32 {
    fn device_read(&mut self, _io_tick: u64, address: u32) -> Option<u32> {
        if !self.claims(address) {
            return None;
        }
        if address % 4 != 0 {
            warn!(address, "ram32: unaligned read, rounding down");
        }
        let value = self.words[self.word_index(address)];
        trace!(address, value, "ram32: read");
        Some(value)
    }

    fn device_write(&mut self, _io_tick: u64, address: u32, value: u32) {
        if !self.claims(address) {
            return;
        }
        if address % 4 != 0 {
            warn!(address, "ram32: unaligned write, rounding down");
        }
        trace!(address, value, "ram32: write");
        let index = self.word_index(address);
        self.words[index] = value;
    }

    fn device_tick(&mut self, _tick: u64) {}

    fn info(&self) -> ComponentInfo {
        ComponentInfo {
            name: Self::NAME.to_owned(),
            uuid: self.uuid.clone(),
        }
    }

    fn export_state(&self) -> Vec<u8> {
        let mut state = Vec::with_capacity(8 + self.words.len() * 4);
        push_u32_be(&mut state, self.base);
        push_u32_be(&mut state, self.size);
        for word in &self.words {
            push_u32_be(&mut state, *word);
        }
        state
    }

    fn to_config(&self) -> ComponentConfig {
        ComponentConfig {
            name: Self::NAME.to_owned(),
            context: serde_json::json!({ "address": self.base, "size": self.size }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Ram32;
    use crate::bus::Device;
    use crate::config::RamContext;

    fn ram(address: u32, size: u32) -> Ram32 {
        Ram32::from_context(RamContext { address, size })
    }

    #[test]
    fn claims_only_its_byte_range() {
        let mut ram = ram(128, 64);
        assert_eq!(ram.device_read(0, 127), None);
        assert_eq!(ram.device_read(0, 128), Some(0));
        assert_eq!(ram.device_read(0, 188), Some(0));
        assert_eq!(ram.device_read(0, 192), None);
    }

    #[test]
    fn writes_then_reads_back() {
        let mut ram = ram(128, 64);
        ram.device_write(0, 128, 42);
        assert_eq!(ram.device_read(1, 128), Some(42));
        assert_eq!(ram.device_read(2, 132), Some(0));
    }

    #[test]
    fn writes_outside_range_are_ignored() {
        let mut ram = ram(128, 64);
        ram.device_write(0, 64, 42);
        assert_eq!(ram.device_read(1, 128), Some(0));
    }

    #[test]
    fn unaligned_access_rounds_down() {
        let mut ram = ram(0, 16);
        ram.device_write(0, 5, 7);
        assert_eq!(ram.device_read(1, 4), Some(7));
        assert_eq!(ram.device_read(2, 6), Some(7));
    }

    #[test]
    fn size_rounds_up_to_whole_words() {
        let mut ram = ram(0, 5);
        // 5 bytes of RAM claims two words.
        assert_eq!(ram.device_read(0, 4), Some(0));
        assert_eq!(ram.device_read(1, 8), None);
    }

    #[test]
    fn state_roundtrip_preserves_contents() {
        let mut ram = ram(128, 8);
        ram.device_write(0, 132, 0xDEAD_BEEF);
        let state = ram.export_state();
        let restored = Ram32::from_state(&state, "r".to_owned()).unwrap();
        assert_eq!(restored.export_state(), state);
    }

    #[test]
    fn bad_state_lengths_are_rejected() {
        assert!(Ram32::from_state(&[0; 7], "r".to_owned()).is_err());
        assert!(Ram32::from_state(&[0; 9], "r".to_owned()).is_err());
    }
}
