//! Linear-congruential generator matching the Delphi runtime's `Random`.
//!
//! The bundle's table magics and one image container are keyed off this
//! generator, so the multiplier and the high-word projection must stay exact.

const MULTIPLIER: u32 = 0x0808_8405;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyRandom {
    seed: u32,
}

impl LegacyRandom {
    pub fn new(seed: u32) -> Self {
        LegacyRandom { seed }
    }

    pub fn set_seed(&mut self, seed: u32) {
        self.seed = seed;
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }

    /// Advances the generator and returns a value in `0..limit`.
    pub fn next(&mut self, limit: u32) -> u32 {
        self.seed = self.seed.wrapping_mul(MULTIPLIER).wrapping_add(1);
        ((u64::from(self.seed) * u64::from(limit)) >> 32) as u32
    }

    /// Keystream byte used by the XOR containers (`next(255)` truncated).
    pub fn next_byte(&mut self) -> u8 {
        self.next(255) as u8
    }
}
