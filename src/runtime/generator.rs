//! Input generation contract and the shared mutation engine.

use rand_chacha::ChaCha20Rng;
use rand_core::{RngCore as _, SeedableRng as _};

use std::path::PathBuf;

use crate::{Input, InputTaint, SiftError, SiftResult};

/// Expands a 64-bit seed into a ChaCha20 state.
pub(crate) fn rng_from_seed(seed: u64) -> ChaCha20Rng {
    let seed_bytes = blake3::hash(&seed.to_le_bytes()).as_bytes().to_owned();
    let mut seed32 = [0u8; 32];
    seed32.copy_from_slice(&seed_bytes[..32]);
    ChaCha20Rng::from_seed(seed32)
}

/// Draws a non-zero 32-bit seed for a generator whose state is still the
/// uninitialized sentinel.
fn random_input_seed() -> u32 {
    let mut bytes = [0u8; 4];
    loop {
        rand_core::OsRng.fill_bytes(&mut bytes);
        let seed = u32::from_le_bytes(bytes);
        if seed != 0 {
            return seed;
        }
    }
}

/// Taint-guided mutation operators shared by both generators. The engine
/// owns its own RNG, separate from the generator state, so mutation draws
/// never perturb the generation stream.
#[derive(Debug)]
pub struct MutationEngine {
    rng: ChaCha20Rng,
}

impl MutationEngine {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: rng_from_seed(seed),
        }
    }

    fn pick(&mut self, len: usize) -> usize {
        (self.rng.next_u64() as usize) % len
    }

    pub(crate) fn snapshot_rng(&self) -> ChaCha20Rng {
        self.rng.clone()
    }

    pub(crate) fn restore_rng(&mut self, rng: ChaCha20Rng) {
        self.rng = rng;
    }

    pub(crate) fn one_in(&mut self, n: u64) -> bool {
        self.rng.next_u64() % n == 0
    }

    /// Nudges one randomly chosen tainted word of `inputs[input_index]` by
    /// one, forcing the direction at the boundary values so the result never
    /// wraps. Returns the new word value; committing it is the caller's job.
    pub fn mutate(
        &mut self,
        inputs: &[Input],
        taints: &[InputTaint],
        input_index: usize,
    ) -> SiftResult<u64> {
        let tainted = taints[input_index].tainted_indices();
        if tainted.is_empty() {
            return Err(SiftError::InvalidArgument(
                "mutate requires at least one tainted word".to_string(),
            ));
        }
        let word = inputs[input_index].get(tainted[self.pick(tainted.len())]);
        Ok(match word {
            u64::MAX => word - 1,
            0 => 1,
            _ if self.one_in(2) => word + 1,
            _ => word - 1,
        })
    }

    /// OR-combines the words at two distinct tainted indices. Inputs whose
    /// tainted words share active bits tend to trigger similar
    /// microarchitectural behavior; OR-combination explores that
    /// neighborhood without erasing either value. Saturates toward all-ones
    /// under repeated application, so not meant for unbounded iteration.
    pub fn mutate_improved(
        &mut self,
        inputs: &[Input],
        input_index: usize,
        tainted: &[usize],
    ) -> SiftResult<u64> {
        if tainted.len() < 2 {
            return Err(SiftError::InvalidArgument(
                "mutate_improved requires at least two tainted words".to_string(),
            ));
        }

        let (mut first, mut second) = match tainted.len() {
            2 => (tainted[0], tainted[1]),
            3 => match self.rng.next_u64() % 3 {
                0 => (tainted[0], tainted[1]),
                1 => (tainted[0], tainted[2]),
                _ => (tainted[1], tainted[2]),
            },
            _ => (
                tainted[self.pick(tainted.len())],
                tainted[self.pick(tainted.len())],
            ),
        };
        for _ in 0..7 {
            if first != second {
                break;
            }
            second = tainted[self.pick(tainted.len())];
        }
        if first == second {
            // All retries collided; fall back to a guaranteed-distinct pair.
            first = tainted[0];
            second = tainted[1];
        }

        let input = &inputs[input_index];
        Ok(input.get(first) | input.get(second))
    }

    /// OR-combines two uniformly random words of `inputs[input_index]`,
    /// irrespective of taint. Cheap diversification step used by
    /// `extend_equivalence_classes`.
    pub fn mutate_dumb(&mut self, inputs: &[Input], input_index: usize) -> SiftResult<u64> {
        let input = &inputs[input_index];
        if input.is_empty() {
            return Err(SiftError::InvalidArgument(
                "mutate_dumb requires a non-empty input".to_string(),
            ));
        }
        let first = self.pick(input.len());
        let second = self.pick(input.len());
        Ok(input.get(first) | input.get(second))
    }
}

/// Generation/mutation contract shared by the concrete generators. The
/// provided methods implement the common logic; implementors supply the
/// per-strategy `generate_one` plus state and engine access.
pub trait InputGenerator {
    /// Current generator state. Zero is the "uninitialized" sentinel.
    fn state(&self) -> u64;

    fn set_state(&mut self, state: u64);

    /// Number of 64-bit words per generated input.
    fn data_size(&self) -> usize;

    fn engine(&mut self) -> &mut MutationEngine;

    /// Produces one input and advances the generator state.
    fn generate_one(&mut self) -> Input;

    /// Produces `count` fresh inputs. On the first call with the sentinel
    /// state, a random 32-bit seed is drawn and logged.
    fn generate(&mut self, count: usize) -> Vec<Input> {
        if self.state() == 0 {
            let seed = random_input_seed();
            tracing::info!("setting input generation seed to {seed}");
            self.set_state(u64::from(seed));
        }
        (0..count).map(|_| self.generate_one()).collect()
    }

    /// Produces one fresh input per base input, copying tainted words
    /// verbatim and occasionally (1 in 4) replacing an untainted word with a
    /// dumb mutation of the base. Generator state and the mutation RNG are
    /// snapshotted and restored, so the call is reproducible for a given
    /// base and leaves the ambient generation stream unaffected.
    fn extend_equivalence_classes(
        &mut self,
        inputs: &[Input],
        taints: &[InputTaint],
    ) -> SiftResult<Vec<Input>> {
        if inputs.len() != taints.len() {
            return Err(SiftError::InvalidArgument(format!(
                "cannot extend inputs: {} taints for {} inputs",
                taints.len(),
                inputs.len()
            )));
        }

        let initial_state = self.state();
        let initial_rng = self.engine().snapshot_rng();
        let mut extended = Vec::with_capacity(inputs.len());
        for (i, base) in inputs.iter().enumerate() {
            let taint = &taints[i];
            if taint.len() != base.len() {
                self.set_state(initial_state);
                self.engine().restore_rng(initial_rng);
                return Err(SiftError::InvalidArgument(format!(
                    "taint length {} does not match input length {} at index {i}",
                    taint.len(),
                    base.len()
                )));
            }

            let mut fresh = self.generate_one();
            for j in 0..base.len() {
                if taint.is_tainted(j) {
                    fresh.set(j, base.get(j));
                } else if self.engine().one_in(4) {
                    let mutated = match self.engine().mutate_dumb(inputs, i) {
                        Ok(word) => word,
                        Err(err) => {
                            self.set_state(initial_state);
                            self.engine().restore_rng(initial_rng);
                            return Err(err);
                        }
                    };
                    fresh.set(j, mutated);
                }
            }
            extended.push(fresh);
        }

        self.set_state(initial_state);
        self.engine().restore_rng(initial_rng);
        Ok(extended)
    }

    /// Reads one input per path; see `Input::load` for the size policy.
    fn load(&self, paths: &[PathBuf]) -> SiftResult<Vec<Input>> {
        paths
            .iter()
            .map(|path| Input::load(path, self.data_size()))
            .collect()
    }
}
