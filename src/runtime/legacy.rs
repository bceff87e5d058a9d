//! Legacy 32-bit LCG input generator.

use crate::{FuzzConfig, Input, InputGenerator, MutationEngine};

const LCG_MULTIPLIER: u64 = 2891336453;
const LCG_INCREMENT: u64 = 54321;
const POW32: u64 = 1 << 32;

/// Reproduces the historical PRNG exactly; kept only so old findings can be
/// regenerated. `VectorizedGenerator` is the preferred implementation.
///
/// The 32-bit LCG is assigned to 4-byte chunks of memory: every 64-bit word
/// packs two successive masked draws, one per half.
#[derive(Debug)]
pub struct LegacyLcgGenerator {
    state: u64,
    data_size: usize,
    register_region_words: usize,
    input_mask: u64,
    engine: MutationEngine,
}

impl LegacyLcgGenerator {
    pub fn new(config: &FuzzConfig, seed: u64) -> Self {
        // The modulo-33 clamp bounds the mask to at most 32 bits.
        let bits = config.input_gen_entropy_bits % 33;
        Self {
            state: seed,
            data_size: config.data_size(),
            register_region_words: config.register_region_words(),
            input_mask: (1u64 << bits).wrapping_sub(1),
            engine: MutationEngine::new(seed),
        }
    }
}

fn lcg_step(value: u64) -> u64 {
    (((value as u128 * LCG_MULTIPLIER as u128) % POW32 as u128) as u64 + LCG_INCREMENT) % POW32
}

fn masked_field(value: u64, mask: u64) -> u64 {
    ((value ^ (value >> 16)) & mask) << 6
}

impl InputGenerator for LegacyLcgGenerator {
    fn state(&self) -> u64 {
        self.state
    }

    fn set_state(&mut self, state: u64) {
        self.state = state;
    }

    fn data_size(&self) -> usize {
        self.data_size
    }

    fn engine(&mut self) -> &mut MutationEngine {
        &mut self.engine
    }

    fn generate_one(&mut self) -> Input {
        let mut input = Input::new(self.data_size);
        input.seed = self.state;

        let mut randint = self.state;
        for i in 0..self.data_size {
            randint = lcg_step(randint);
            let high = masked_field(randint, self.input_mask) << 32;

            randint = lcg_step(randint);
            let low = masked_field(randint, self.input_mask);

            input.set(i, high.wrapping_add(low));
        }

        // The legacy generator initializes only the first 32 bits of
        // registers.
        for i in 0..self.register_region_words {
            let index = self.data_size - 1 - i;
            input.set(index, input.get(index) % POW32);
        }

        self.state = randint;
        input
    }
}
