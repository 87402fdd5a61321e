//! `rom32`: word-addressed preloaded memory.
//!
//! Like `ram32` but built from initial contents, and writes are ignored
//! while the write-protect flag is set.

use tracing::{trace, warn};

use crate::bus::{mint_component_id, ComponentInfo, Device};
use crate::config::{ComponentConfig, RomContext};
use crate::exchange::{push_u32_be, read_u32_be, ExchangeError};

/// Preloaded word-addressed memory device.
pub struct Rom32 {
    uuid: String,
    base: u32,
    read_only: bool,
    words: Vec<u32>,
}

impl Rom32 {
    /// Registry kind name.
    pub const NAME: &'static str = "rom32";

    /// Builds ROM from a context; the size is the content length.
    #[must_use]
    pub fn new(context: RomContext, uuid: String) -> Self {
        Self {
            uuid,
            base: context.address,
            read_only: context.read_only,
            words: context.contents,
        }
    }

    /// Builds ROM with a fresh id.
    #[must_use]
    pub fn from_context(context: RomContext) -> Self {
        Self::new(context, mint_component_id())
    }

    /// Builds write-protected ROM from a little-endian program image, the
    /// assembler's output format. A trailing partial word is zero-padded.
    #[must_use]
    pub fn from_program(address: u32, image: &[u8], uuid: String) -> Self {
        let words = image
            .chunks(4)
            .map(|chunk| {
                let mut word = [0u8; 4];
                word[..chunk.len()].copy_from_slice(chunk);
                u32::from_le_bytes(word)
            })
            .collect();
        Self {
            uuid,
            base: address,
            read_only: true,
            words,
        }
    }

    /// Rebuilds ROM from an exchanged state buffer.
    ///
    /// # Errors
    ///
    /// Returns an [`ExchangeError`] when the buffer is truncated or its
    /// length disagrees with the recorded size.
    pub fn from_state(state: &[u8], uuid: String) -> Result<Self, ExchangeError> {
        let base = read_u32_be(state, 0)?;
        let size = read_u32_be(state, 4)?;
        let read_only = read_u32_be(state, 8)? != 0;
        if size % 4 != 0 || state.len() != 12 + size as usize {
            return Err(ExchangeError::BadLength {
                got: state.len(),
                reason: "expected 12 header bytes plus `size` bytes of words",
            });
        }
        let words = (0..size / 4)
            .map(|i| read_u32_be(state, 12 + (i as usize) * 4))
            .collect::<Result<Vec<u32>, ExchangeError>>()?;
        Ok(Self {
            uuid,
            base,
            read_only,
            words,
        })
    }

    #[allow(clippy::cast_possible_truncation, clippy::missing_const_for_fn)]
    fn size(&self) -> u32 {
        (self.words.len() * 4) as u32
    }

    fn claims(&self, address: u32) -> bool {
        address >= self.base && address - self.base < self.size()
    }

    const fn word_index(&self, address: u32) -> usize {
        ((address - self.base) / 4) as usize
    }
}

impl Device for Rom32 {
    fn device_read(&mut self, _io_tick: u64, address: u32) -> Option<u32> {
        if !self.claims(address) {
            return None;
        }
        if address % 4 != 0 {
            warn!(address, "rom32: unaligned read, rounding down");
        }
        let value = self.words[self.word_index(address)];
        trace!(address, value, "rom32: read");
        Some(value)
    }

    fn device_write(&mut self, _io_tick: u64, address: u32, value: u32) {
        if self.read_only || !self.claims(address) {
            return;
        }
        if address % 4 != 0 {
            warn!(address, "rom32: unaligned write, rounding down");
        }
        trace!(address, value, "rom32: write");
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
        let mut state = Vec::with_capacity(12 + self.words.len() * 4);
        push_u32_be(&mut state, self.base);
        push_u32_be(&mut state, self.size());
        push_u32_be(&mut state, u32::from(self.read_only));
        for word in &self.words {
            push_u32_be(&mut state, *word);
        }
        state
    }

    fn to_config(&self) -> ComponentConfig {
        ComponentConfig {
            name: Self::NAME.to_owned(),
            context: serde_json::json!({
                "address": self.base,
                "contents": self.words,
                "readOnly": self.read_only,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Rom32;
    use crate::bus::Device;
    use crate::config::RomContext;

    fn rom(address: u32, contents: Vec<u32>, read_only: bool) -> Rom32 {
        Rom32::from_context(RomContext {
            address,
            contents,
            read_only,
        })
    }

    #[test]
    fn serves_preloaded_words() {
        let mut rom = rom(0, vec![10, 20, 30], true);
        assert_eq!(rom.device_read(0, 0), Some(10));
        assert_eq!(rom.device_read(1, 8), Some(30));
        assert_eq!(rom.device_read(2, 12), None);
    }

    #[test]
    fn write_protect_ignores_writes() {
        let mut rom = rom(0, vec![10], true);
        rom.device_write(0, 0, 99);
        assert_eq!(rom.device_read(1, 0), Some(10));
    }

    #[test]
    fn writable_rom_accepts_writes() {
        let mut rom = rom(0, vec![10], false);
        rom.device_write(0, 0, 99);
        assert_eq!(rom.device_read(1, 0), Some(99));
    }

    #[test]
    fn program_image_words_are_little_endian() {
        let mut rom = Rom32::from_program(0, &[0x13, 0x00, 0x80, 0x02, 0x93], "r".to_owned());
        assert_eq!(rom.device_read(0, 0), Some(0x0280_0013));
        // Trailing partial word is zero-padded.
        assert_eq!(rom.device_read(1, 4), Some(0x0000_0093));
    }

    #[test]
    fn state_roundtrip_preserves_protection_flag() {
        let rom = rom(64, vec![1, 2], false);
        let state = rom.export_state();
        let restored = Rom32::from_state(&state, "r".to_owned()).unwrap();
        assert_eq!(restored.export_state(), state);
    }
}
