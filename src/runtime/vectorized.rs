//! Preferred seeded-RNG input generator.

use rand_core::RngCore as _;

use crate::generator::rng_from_seed;
use crate::{FuzzConfig, Input, InputGenerator, MutationEngine};

/// Generates inputs from a fresh ChaCha20 stream per input, reseeded from
/// the current state. The state advances by exactly +1 per input, so the
/// whole sequence is keyed on the construction seed plus call count.
#[derive(Debug)]
pub struct VectorizedGenerator {
    state: u64,
    data_size: usize,
    entropy_bits: u32,
    zeroed_bits: u32,
    engine: MutationEngine,
}

impl VectorizedGenerator {
    pub fn new(config: &FuzzConfig, seed: u64) -> Self {
        Self {
            state: seed,
            data_size: config.data_size(),
            entropy_bits: config.input_gen_entropy_bits,
            zeroed_bits: config.memory_access_zeroed_bits,
            engine: MutationEngine::new(seed),
        }
    }

    fn draw(&self, rng: &mut rand_chacha::ChaCha20Rng) -> u64 {
        // Uniform in [0, 2^entropy_bits).
        if self.entropy_bits >= 64 {
            rng.next_u64()
        } else {
            rng.next_u64() % (1u64 << self.entropy_bits)
        }
    }
}

impl InputGenerator for VectorizedGenerator {
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

        let mut rng = rng_from_seed(self.state);
        for i in 0..self.data_size {
            // Low bits are zeroed to model memory alignment, then the value
            // is mirrored into both halves of the word. A shift of 64 or
            // more clears the word entirely.
            let value = if self.zeroed_bits >= 64 {
                0
            } else {
                self.draw(&mut rng) << self.zeroed_bits
            };
            input.set(i, (value << 32).wrapping_add(value));
        }

        self.state += 1;
        input
    }
}
