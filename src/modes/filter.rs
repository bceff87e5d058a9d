//! Two-stage differential filter deciding whether a test case deserves
//! full contract-based analysis.

use serde::{Deserialize, Serialize};

use crate::{
    fence_test_case, AsmParser, Executor, FuzzConfig, Input, InstructionSet, InstructionView,
    SiftResult, TestCase,
};

/// Running counters for end-of-run reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterStats {
    pub spec_filtered: u64,
    pub observ_filtered: u64,
}

/// Gradually filters out uninteresting test cases before committing to the
/// expensive analysis path. Each stage is independently toggleable and may
/// short-circuit with an "uninteresting, skip" verdict.
#[derive(Debug)]
pub struct DifferentialFilterPipeline {
    speculation_enabled: bool,
    observation_enabled: bool,
    stats: FilterStats,
}

impl DifferentialFilterPipeline {
    pub fn new(config: &FuzzConfig) -> Self {
        Self {
            speculation_enabled: config.enable_speculation_filter,
            observation_enabled: config.enable_observation_filter,
            stats: FilterStats::default(),
        }
    }

    pub fn stats(&self) -> FilterStats {
        self.stats
    }

    /// Returns `true` when the test case was filtered out. Quick-and-dirty
    /// execution mode is always reset before returning.
    pub fn filter<E: Executor, P: AsmParser>(
        &mut self,
        executor: &mut E,
        parser: &P,
        instruction_set: &InstructionSet,
        test_case: &TestCase,
        inputs: &[Input],
    ) -> SiftResult<bool> {
        if !self.speculation_enabled && !self.observation_enabled {
            return Ok(false);
        }

        executor.set_quick_and_dirty(true);
        let verdict = self.run_stages(executor, parser, instruction_set, test_case, inputs);
        executor.set_quick_and_dirty(false);
        verdict
    }

    fn run_stages<E: Executor, P: AsmParser>(
        &mut self,
        executor: &mut E,
        parser: &P,
        instruction_set: &InstructionSet,
        test_case: &TestCase,
        inputs: &[Input],
    ) -> SiftResult<bool> {
        executor.load_test_case(test_case)?;
        let non_fenced_htraces = executor.trace_test_case(inputs, 1)?;

        // 1. Speculation filter: without any sign of misspeculation in the
        // performance counters, this test case is unlikely to produce a
        // violation.
        if self.speculation_enabled {
            let feedback = executor.get_last_feedback();
            if feedback.iter().all(|f| !f.indicates_misspeculation()) {
                self.stats.spec_filtered += 1;
                return Ok(true);
            }
        }

        // 2. Observation filter: if the fenced variant produces bit-for-bit
        // identical traces, any leak signal is non-speculative.
        if self.observation_enabled {
            let fenced_source = fence_test_case(&test_case.asm_source);
            // The unfiltered instruction view guarantees the fencing
            // instrumentation is recognized.
            let fenced_test_case =
                parser.parse_source(&fenced_source, instruction_set, InstructionView::Unfiltered)?;

            executor.load_test_case(&fenced_test_case)?;
            let fenced_htraces = executor.trace_test_case(inputs, 1)?;

            if fenced_htraces == non_fenced_htraces {
                self.stats.observ_filtered += 1;
                return Ok(true);
            }
        }

        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ScriptedExecutor, SpeculationFeedback, TextAsmParser, TraceScript,
    };

    const SOURCE: &str = "\
.test_case_enter:
add rax, rbx
mov rcx, [rax]
";

    fn isa() -> InstructionSet {
        InstructionSet::new(
            vec!["ADD".to_string(), "MOV".to_string()],
            vec!["ADD".to_string(), "MOV".to_string(), "LFENCE".to_string()],
        )
    }

    fn test_case() -> TestCase {
        TextAsmParser
            .parse_source(SOURCE, &isa(), InstructionView::Filtered)
            .expect("parse")
    }

    fn inputs(n: usize) -> Vec<Input> {
        (0..n).map(|_| Input::new(4)).collect()
    }

    fn quiet_feedback(n: usize) -> Vec<SpeculationFeedback> {
        (0..n)
            .map(|_| SpeculationFeedback {
                issued_uops: 10,
                retired_uops: 10,
                mispredictions: 0,
            })
            .collect()
    }

    fn noisy_feedback(n: usize) -> Vec<SpeculationFeedback> {
        let mut feedback = quiet_feedback(n);
        feedback[n / 2].issued_uops = 40;
        feedback
    }

    fn config(speculation: bool, observation: bool) -> FuzzConfig {
        FuzzConfig {
            enable_speculation_filter: speculation,
            enable_observation_filter: observation,
            ..FuzzConfig::default()
        }
    }

    #[test]
    fn speculation_filter_discards_quiet_test_cases() {
        let mut pipeline = DifferentialFilterPipeline::new(&config(true, false));
        let mut executor = ScriptedExecutor::new(vec![TraceScript {
            traces: vec![1, 2, 3],
            feedback: quiet_feedback(3),
        }]);

        let filtered = pipeline
            .filter(&mut executor, &TextAsmParser, &isa(), &test_case(), &inputs(3))
            .expect("filter");
        assert!(filtered);
        assert_eq!(pipeline.stats().spec_filtered, 1);
        assert!(!executor.quick_and_dirty());
    }

    #[test]
    fn speculation_filter_passes_misspeculating_test_cases() {
        let mut pipeline = DifferentialFilterPipeline::new(&config(true, false));
        let mut executor = ScriptedExecutor::new(vec![TraceScript {
            traces: vec![1, 2, 3],
            feedback: noisy_feedback(3),
        }]);

        let filtered = pipeline
            .filter(&mut executor, &TextAsmParser, &isa(), &test_case(), &inputs(3))
            .expect("filter");
        assert!(!filtered);
        assert_eq!(pipeline.stats().spec_filtered, 0);
    }

    #[test]
    fn observation_filter_discards_when_fenced_traces_match() {
        let mut pipeline = DifferentialFilterPipeline::new(&config(false, true));
        let mut executor = ScriptedExecutor::new(vec![
            TraceScript {
                traces: vec![7, 8],
                feedback: Vec::new(),
            },
            TraceScript {
                traces: vec![7, 8],
                feedback: Vec::new(),
            },
        ]);

        let filtered = pipeline
            .filter(&mut executor, &TextAsmParser, &isa(), &test_case(), &inputs(2))
            .expect("filter");
        assert!(filtered);
        assert_eq!(pipeline.stats().observ_filtered, 1);
    }

    #[test]
    fn observation_filter_passes_when_fencing_changes_traces() {
        let mut pipeline = DifferentialFilterPipeline::new(&config(false, true));
        let mut executor = ScriptedExecutor::new(vec![
            TraceScript {
                traces: vec![7, 8],
                feedback: Vec::new(),
            },
            TraceScript {
                traces: vec![7, 9],
                feedback: Vec::new(),
            },
        ]);

        let filtered = pipeline
            .filter(&mut executor, &TextAsmParser, &isa(), &test_case(), &inputs(2))
            .expect("filter");
        assert!(!filtered);
        assert_eq!(pipeline.stats(), FilterStats::default());
    }

    #[test]
    fn observation_filter_verdict_is_repeatable() {
        let mut pipeline = DifferentialFilterPipeline::new(&config(false, true));
        let script = || TraceScript {
            traces: vec![7, 8],
            feedback: Vec::new(),
        };
        let mut executor = ScriptedExecutor::new(vec![script(), script(), script(), script()]);

        let first = pipeline
            .filter(&mut executor, &TextAsmParser, &isa(), &test_case(), &inputs(2))
            .expect("filter");
        let second = pipeline
            .filter(&mut executor, &TextAsmParser, &isa(), &test_case(), &inputs(2))
            .expect("filter");
        assert_eq!(first, second);
        assert_eq!(pipeline.stats().observ_filtered, 2);
    }

    #[test]
    fn disabled_pipeline_touches_nothing() {
        let mut pipeline = DifferentialFilterPipeline::new(&config(false, false));
        let mut executor = ScriptedExecutor::new(Vec::new());
        let filtered = pipeline
            .filter(&mut executor, &TextAsmParser, &isa(), &test_case(), &inputs(2))
            .expect("filter");
        assert!(!filtered);
    }
}
