//! Hardware executor contract and the deterministic scripted backend.

use serde::{Deserialize, Serialize};

use std::collections::VecDeque;

use crate::{Input, SiftError, SiftResult, TestCase};

/// Per-input performance-counter feedback from the last trace run. Issued
/// exceeding retired uops means work was squashed; a non-zero misprediction
/// count is a direct misspeculation signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeculationFeedback {
    pub issued_uops: u64,
    pub retired_uops: u64,
    pub mispredictions: u64,
}

impl SpeculationFeedback {
    pub fn indicates_misspeculation(&self) -> bool {
        self.issued_uops > self.retired_uops || self.mispredictions > 0
    }

    pub fn as_words(&self) -> [u64; 3] {
        [self.issued_uops, self.retired_uops, self.mispredictions]
    }
}

/// Contract for the hardware execution/tracing backend. Calls are
/// synchronous and potentially slow; any timeout handling lives in the
/// caller.
pub trait Executor {
    fn load_test_case(&mut self, test_case: &TestCase) -> SiftResult<()>;

    /// Runs the loaded test case once per input and returns one hardware
    /// trace per input.
    fn trace_test_case(&mut self, inputs: &[Input], repetitions: usize) -> SiftResult<Vec<u64>>;

    /// Feedback counters for the most recent `trace_test_case` call,
    /// index-aligned with its inputs.
    fn get_last_feedback(&self) -> Vec<SpeculationFeedback>;

    /// Fast/unsafe execution mode used by the filter stages.
    fn set_quick_and_dirty(&mut self, enabled: bool);
}

/// One preloaded response for the scripted executor: the traces and
/// feedback to replay for the next loaded test case.
#[derive(Debug, Clone, Default)]
pub struct TraceScript {
    pub traces: Vec<u64>,
    pub feedback: Vec<SpeculationFeedback>,
}

/// Deterministic executor replaying preloaded scripts in load order. Used
/// by the filter/diff tests and for offline replay without hardware.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    scripts: VecDeque<TraceScript>,
    current: Option<TraceScript>,
    last_feedback: Vec<SpeculationFeedback>,
    quick_and_dirty: bool,
}

impl ScriptedExecutor {
    pub fn new(scripts: Vec<TraceScript>) -> Self {
        Self {
            scripts: scripts.into(),
            current: None,
            last_feedback: Vec::new(),
            quick_and_dirty: false,
        }
    }

    pub fn push_script(&mut self, script: TraceScript) {
        self.scripts.push_back(script);
    }

    pub fn quick_and_dirty(&self) -> bool {
        self.quick_and_dirty
    }
}

impl Executor for ScriptedExecutor {
    fn load_test_case(&mut self, _test_case: &TestCase) -> SiftResult<()> {
        let script = self
            .scripts
            .pop_front()
            .ok_or_else(|| SiftError::Executor("trace script exhausted".to_string()))?;
        self.current = Some(script);
        Ok(())
    }

    fn trace_test_case(&mut self, inputs: &[Input], _repetitions: usize) -> SiftResult<Vec<u64>> {
        let script = self
            .current
            .as_ref()
            .ok_or_else(|| SiftError::Executor("no test case loaded".to_string()))?;
        if script.traces.len() != inputs.len() {
            return Err(SiftError::Executor(format!(
                "script has {} traces for {} inputs",
                script.traces.len(),
                inputs.len()
            )));
        }
        self.last_feedback = script.feedback.clone();
        Ok(script.traces.clone())
    }

    fn get_last_feedback(&self) -> Vec<SpeculationFeedback> {
        self.last_feedback.clone()
    }

    fn set_quick_and_dirty(&mut self, enabled: bool) {
        self.quick_and_dirty = enabled;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_case() -> TestCase {
        TestCase {
            asm_source: String::new(),
            instructions: Vec::new(),
        }
    }

    #[test]
    fn scripts_replay_in_load_order() {
        let mut executor = ScriptedExecutor::new(vec![
            TraceScript {
                traces: vec![1, 2],
                feedback: Vec::new(),
            },
            TraceScript {
                traces: vec![3, 4],
                feedback: Vec::new(),
            },
        ]);
        let inputs = vec![Input::new(1), Input::new(1)];

        executor.load_test_case(&test_case()).expect("load");
        assert_eq!(executor.trace_test_case(&inputs, 1).unwrap(), vec![1, 2]);
        executor.load_test_case(&test_case()).expect("load");
        assert_eq!(executor.trace_test_case(&inputs, 1).unwrap(), vec![3, 4]);

        assert!(matches!(
            executor.load_test_case(&test_case()),
            Err(SiftError::Executor(_))
        ));
    }

    #[test]
    fn trace_rejects_input_count_mismatch() {
        let mut executor = ScriptedExecutor::new(vec![TraceScript {
            traces: vec![1],
            feedback: Vec::new(),
        }]);
        executor.load_test_case(&test_case()).expect("load");
        let inputs = vec![Input::new(1), Input::new(1)];
        assert!(executor.trace_test_case(&inputs, 1).is_err());
    }
}
