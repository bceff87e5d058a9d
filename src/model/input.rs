//! Input vectors and taint masks.

use serde::{Deserialize, Serialize};

use std::path::Path;

use crate::{SiftError, SiftResult};

/// A fixed-length vector of 64-bit words seeding a test case's memory and
/// registers. The trailing `register_region` words represent CPU registers;
/// only their low 32 bits are meaningful.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    data: Vec<u64>,
    /// Generator state that produced this input, kept for reproducibility.
    pub seed: u64,
}

impl Input {
    pub fn new(data_size: usize) -> Self {
        Self {
            data: vec![0; data_size],
            seed: 0,
        }
    }

    pub fn from_words(data: Vec<u64>) -> Self {
        Self { data, seed: 0 }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn size_bytes(&self) -> usize {
        self.data.len() * 8
    }

    pub fn get(&self, index: usize) -> u64 {
        self.data[index]
    }

    pub fn set(&mut self, index: usize, value: u64) {
        self.data[index] = value;
    }

    pub fn words(&self) -> &[u64] {
        &self.data
    }

    pub fn words_mut(&mut self) -> &mut [u64] {
        &mut self.data
    }

    /// Reads an input from a raw binary file: one native-endian 64-bit word
    /// per 8 bytes, no header. A size mismatch against `data_size` is logged
    /// as an error but parsing proceeds on whatever bytes are present.
    pub fn load(path: &Path, data_size: usize) -> SiftResult<Self> {
        let bytes = std::fs::read(path)?;
        if bytes.len() != data_size * 8 {
            tracing::error!(
                "incorrect size of input {} ({} B, expected {} B)",
                path.display(),
                bytes.len(),
                data_size * 8
            );
        }
        if bytes.len() % 8 != 0 {
            return Err(SiftError::Parse(format!(
                "input {} is not a whole number of 64-bit words",
                path.display()
            )));
        }

        let mut data = Vec::with_capacity(bytes.len() / 8);
        for chunk in bytes.chunks_exact(8) {
            let mut word = [0u8; 8];
            word.copy_from_slice(chunk);
            data.push(u64::from_ne_bytes(word));
        }
        Ok(Self { data, seed: 0 })
    }

    /// Writes the input in the same raw binary format `load` reads.
    pub fn save(&self, path: &Path) -> SiftResult<()> {
        let mut bytes = Vec::with_capacity(self.size_bytes());
        for word in &self.data {
            bytes.extend_from_slice(&word.to_ne_bytes());
        }
        std::fs::write(path, bytes)?;
        Ok(())
    }
}

impl std::ops::Index<usize> for Input {
    type Output = u64;

    fn index(&self, index: usize) -> &u64 {
        &self.data[index]
    }
}

impl std::ops::IndexMut<usize> for Input {
    fn index_mut(&mut self, index: usize) -> &mut u64 {
        &mut self.data[index]
    }
}

/// Per-word boolean mask marking which input words are causally linked to an
/// observed behavioral difference. Produced by an external taint-tracking
/// stage; consumed read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputTaint {
    mask: Vec<bool>,
}

impl InputTaint {
    pub fn new(data_size: usize) -> Self {
        Self {
            mask: vec![false; data_size],
        }
    }

    pub fn from_mask(mask: Vec<bool>) -> Self {
        Self { mask }
    }

    pub fn len(&self) -> usize {
        self.mask.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mask.is_empty()
    }

    pub fn is_tainted(&self, index: usize) -> bool {
        self.mask[index]
    }

    pub fn set_tainted(&mut self, index: usize, tainted: bool) {
        self.mask[index] = tainted;
    }

    /// Indices of all tainted words, in order.
    pub fn tainted_indices(&self) -> Vec<usize> {
        self.mask
            .iter()
            .enumerate()
            .filter(|(_, t)| **t)
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_file(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("specsift-input-tests-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).expect("temp dir");
        dir.join(name)
    }

    #[test]
    fn save_load_round_trip() {
        let path = temp_file("input.bin");
        let input = Input::from_words(vec![0, 1, u64::MAX, 0xdead_beef_0000_0040]);
        input.save(&path).expect("save");

        let loaded = Input::load(&path, 4).expect("load");
        assert_eq!(loaded.words(), input.words());
    }

    #[test]
    fn load_with_wrong_declared_size_still_parses() {
        let path = temp_file("short.bin");
        let input = Input::from_words(vec![7, 8]);
        input.save(&path).expect("save");

        // Size mismatch is logged, not fatal.
        let loaded = Input::load(&path, 16).expect("load");
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.get(1), 8);
    }

    #[test]
    fn load_rejects_partial_words() {
        let path = temp_file("ragged.bin");
        std::fs::write(&path, [1u8, 2, 3]).expect("write");
        assert!(matches!(Input::load(&path, 1), Err(SiftError::Parse(_))));
    }

    #[test]
    fn tainted_indices_are_ordered() {
        let taint = InputTaint::from_mask(vec![false, true, false, true, true]);
        assert_eq!(taint.tainted_indices(), vec![1, 3, 4]);
    }
}
