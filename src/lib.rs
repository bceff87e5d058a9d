//! Specsift core library: input generation and differential trace filtering
//! for a microarchitectural (Spectre-class) fuzzer.
//!
//! The instruction-set database, assembler, and hardware tracer are external
//! collaborators behind the `AsmParser` and `Executor` seams.

#[path = "modes/archdiff.rs"]
mod archdiff;
#[path = "platform/config.rs"]
mod config;
#[path = "model/equivalence.rs"]
mod equivalence;
#[path = "platform/error.rs"]
mod error;
#[path = "runtime/executor.rs"]
mod executor;
#[path = "modes/filter.rs"]
mod filter;
#[path = "runtime/generator.rs"]
mod generator;
#[path = "model/input.rs"]
mod input;
#[path = "runtime/legacy.rs"]
mod legacy;
#[path = "model/testcase.rs"]
mod testcase;
#[path = "runtime/vectorized.rs"]
mod vectorized;

pub use archdiff::*;
pub use config::*;
pub use equivalence::*;
pub use error::*;
pub use executor::*;
pub use filter::*;
pub use generator::*;
pub use input::*;
pub use legacy::*;
pub use testcase::*;
pub use vectorized::*;
