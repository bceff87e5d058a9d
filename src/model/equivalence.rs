//! Equivalence classes over inputs sharing a contract trace.

use serde::{Deserialize, Serialize};

use std::collections::BTreeMap;

use crate::Input;

/// One input's observed hardware trace pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    pub input_index: usize,
    pub input: Input,
    pub htrace: u64,
    pub extra_htrace: u64,
}

/// A contract trace plus the measurements that share it, with an occurrence
/// count per observed hardware trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquivalenceClass {
    pub ctrace: u64,
    pub measurements: Vec<Measurement>,
    htrace_map: BTreeMap<u64, usize>,
}

impl EquivalenceClass {
    pub fn new(ctrace: u64) -> Self {
        Self {
            ctrace,
            measurements: Vec::new(),
            htrace_map: BTreeMap::new(),
        }
    }

    pub fn push(&mut self, measurement: Measurement) {
        self.measurements.push(measurement);
    }

    /// Rebuilds the htrace -> occurrence count mapping from the current
    /// measurements. Call after the measurement list is final.
    pub fn build_htrace_map(&mut self) {
        self.htrace_map.clear();
        for m in &self.measurements {
            *self.htrace_map.entry(m.htrace).or_insert(0) += 1;
        }
    }

    pub fn htrace_map(&self) -> &BTreeMap<u64, usize> {
        &self.htrace_map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn htrace_map_counts_occurrences() {
        let mut cls = EquivalenceClass::new(0xc0);
        for (i, htrace) in [0xa, 0xb, 0xa].into_iter().enumerate() {
            cls.push(Measurement {
                input_index: i,
                input: Input::new(2),
                htrace,
                extra_htrace: 0,
            });
        }
        cls.build_htrace_map();
        assert_eq!(cls.htrace_map().get(&0xa), Some(&2));
        assert_eq!(cls.htrace_map().get(&0xb), Some(&1));
    }

    #[test]
    fn findings_serialize_for_reporting() {
        let mut cls = EquivalenceClass::new(0xbeef);
        cls.push(Measurement {
            input_index: 2,
            input: Input::from_words(vec![1, 2, 3]),
            htrace: 0xffff,
            extra_htrace: 0xa2,
        });
        cls.build_htrace_map();

        let json = serde_json::to_string(&cls).expect("serialize");
        let parsed: EquivalenceClass = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed.ctrace, cls.ctrace);
        assert_eq!(parsed.measurements, cls.measurements);
        assert_eq!(parsed.htrace_map(), cls.htrace_map());
    }
}
