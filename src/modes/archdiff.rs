//! Architecture-diffing mode: fenced vs non-fenced trace comparison.

use crate::{
    fence_test_case, AsmParser, EquivalenceClass, Executor, FuzzConfig, Input, InstructionSet,
    InstructionView, Measurement, SiftResult, TestCase,
};

/// Compares per-input architectural traces of the fenced and non-fenced
/// variants of a test case. A divergence at any input is a finding: the
/// difference is attributable to speculation.
#[derive(Debug)]
pub struct ArchDiffAnalyzer {
    dbg_violation: bool,
    dbg_traces: bool,
}

impl ArchDiffAnalyzer {
    pub fn new(config: &FuzzConfig) -> Self {
        Self {
            dbg_violation: config.logging_mode_enabled("dbg_violation"),
            dbg_traces: config.logging_mode_enabled("dbg_traces"),
        }
    }

    /// Returns the equivalence class of the first violating input, or `None`
    /// when fenced and non-fenced traces agree for every input.
    pub fn analyze<E: Executor, P: AsmParser>(
        &self,
        executor: &mut E,
        parser: &P,
        instruction_set: &InstructionSet,
        test_case: &TestCase,
        inputs: &[Input],
    ) -> SiftResult<Option<EquivalenceClass>> {
        executor.set_quick_and_dirty(true);
        let finding = self.diff(executor, parser, instruction_set, test_case, inputs);
        executor.set_quick_and_dirty(false);
        finding
    }

    fn diff<E: Executor, P: AsmParser>(
        &self,
        executor: &mut E,
        parser: &P,
        instruction_set: &InstructionSet,
        test_case: &TestCase,
        inputs: &[Input],
    ) -> SiftResult<Option<EquivalenceClass>> {
        executor.load_test_case(test_case)?;
        let non_fenced = arch_traces(executor, inputs)?;

        let fenced_source = fence_test_case(&test_case.asm_source);
        let fenced_test_case =
            parser.parse_source(&fenced_source, instruction_set, InstructionView::Unfiltered)?;
        executor.load_test_case(&fenced_test_case)?;
        let fenced = arch_traces(executor, inputs)?;

        for (i, input) in inputs.iter().enumerate() {
            if fenced[i] != non_fenced[i] {
                if self.dbg_violation {
                    tracing::debug!(
                        "input #{i}: fenced {:x?} != non-fenced {:x?}",
                        fenced[i],
                        non_fenced[i]
                    );
                }

                let mut violation = EquivalenceClass::new(fenced[i][0]);
                violation.push(Measurement {
                    input_index: i,
                    input: input.clone(),
                    htrace: fenced[i][0],
                    extra_htrace: non_fenced[i][0],
                });
                violation.build_htrace_map();
                return Ok(Some(violation));
            }

            if self.dbg_traces {
                tracing::debug!(
                    "input #{i}: fenced {:x?} == non-fenced {:x?}",
                    fenced[i],
                    non_fenced[i]
                );
            }
        }

        Ok(None)
    }
}

/// One architectural trace per input: the primary hardware trace followed
/// by the auxiliary feedback counters.
fn arch_traces<E: Executor>(executor: &mut E, inputs: &[Input]) -> SiftResult<Vec<Vec<u64>>> {
    let htraces = executor.trace_test_case(inputs, 1)?;
    let feedback = executor.get_last_feedback();

    let mut traces = Vec::with_capacity(htraces.len());
    for (i, htrace) in htraces.into_iter().enumerate() {
        let mut trace = vec![htrace];
        if let Some(f) = feedback.get(i) {
            trace.extend(f.as_words());
        }
        traces.push(trace);
    }
    Ok(traces)
}
