//! `specsift.toml` config loading and instruction-list derivation.

use serde::{Deserialize, Serialize};

use std::path::Path;

use crate::{InstructionSet, SiftError, SiftResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct FuzzConfig {
    /// Width of random values before packing/shifting.
    #[serde(default = "default_entropy_bits")]
    pub input_gen_entropy_bits: u32,

    /// Size of the memory portion of an input, in bytes.
    #[serde(default = "default_main_region_size")]
    pub input_main_region_size: usize,

    /// Size of the trailing register portion of an input, in bytes.
    /// By emulation convention only the low 32 bits of each register
    /// word are meaningful.
    #[serde(default = "default_register_region_size")]
    pub input_register_region_size: usize,

    /// Low bits forced to zero in generated values (memory alignment).
    #[serde(default = "default_zeroed_bits")]
    pub memory_access_zeroed_bits: u32,

    /// Enable the performance-counter misspeculation filter.
    #[serde(default)]
    pub enable_speculation_filter: bool,

    /// Enable the fenced-vs-non-fenced observation filter.
    #[serde(default)]
    pub enable_observation_filter: bool,

    /// Fault categories the run is allowed to trigger (e.g. "UD", "BP").
    #[serde(default)]
    pub permitted_faults: Vec<String>,

    /// Opt-in debug output channels ("dbg_violation", "dbg_traces").
    #[serde(default)]
    pub logging_modes: Vec<String>,

    /// Base instruction blocklist, extended by `derive_instruction_blocklist`.
    #[serde(default)]
    pub instruction_blocklist: Vec<String>,
}

fn default_entropy_bits() -> u32 {
    16
}

fn default_main_region_size() -> usize {
    4096
}

fn default_register_region_size() -> usize {
    64
}

fn default_zeroed_bits() -> u32 {
    6
}

impl Default for FuzzConfig {
    fn default() -> Self {
        Self {
            input_gen_entropy_bits: default_entropy_bits(),
            input_main_region_size: default_main_region_size(),
            input_register_region_size: default_register_region_size(),
            memory_access_zeroed_bits: default_zeroed_bits(),
            enable_speculation_filter: false,
            enable_observation_filter: false,
            permitted_faults: Vec::new(),
            logging_modes: Vec::new(),
            instruction_blocklist: Vec::new(),
        }
    }
}

impl FuzzConfig {
    pub fn load_optional(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(s) => match toml::from_str::<FuzzConfig>(&s) {
                Ok(cfg) => cfg,
                Err(err) => {
                    tracing::warn!("failed to parse config {}: {err}", path.display());
                    Self::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                tracing::warn!("failed to read config {}: {err}", path.display());
                Self::default()
            }
        }
    }

    /// Number of 64-bit words in an input vector.
    pub fn data_size(&self) -> usize {
        (self.input_main_region_size + self.input_register_region_size) / 8
    }

    /// Number of trailing input words holding register values.
    pub fn register_region_words(&self) -> usize {
        self.input_register_region_size / 8
    }

    pub fn logging_mode_enabled(&self, mode: &str) -> bool {
        self.logging_modes.iter().any(|m| m == mode)
    }
}

/// Instructions that raise a given fault category. A category absent from
/// `permitted_faults` gets its instructions blocklisted.
const FAULT_INSTRUCTIONS: &[(&str, &[&str])] = &[
    ("UD", &["UD", "UD2"]),
    ("UD-sgx", &["ENCLU"]),
    (
        "UD-vtx",
        &[
            "INVEPT", "INVVPID", "VMCALL", "VMCLEAR", "VMLAUNCH", "VMPTRLD", "VMPTRST", "VMREAD",
            "VMRESUME", "VMWRITE", "VMXOFF",
        ],
    ),
    (
        "UD-svm",
        &["VMRUN", "VMLOAD", "VMSAVE", "CLGI", "VMMCALL", "INVLPGA"],
    ),
    ("DB-instruction", &["INT1"]),
    ("BP", &["INT3"]),
    ("BR", &["BNDCL", "BNDCU"]),
];

/// Returns the effective instruction blocklist: the configured base list
/// extended with the instructions of every fault category the run does not
/// permit. Pure derivation; the config itself is never mutated.
pub fn derive_instruction_blocklist(config: &FuzzConfig) -> Vec<String> {
    let mut blocklist = config.instruction_blocklist.clone();
    for (fault, instructions) in FAULT_INSTRUCTIONS {
        if !config.permitted_faults.iter().any(|f| f == fault) {
            blocklist.extend(instructions.iter().map(|i| i.to_string()));
        }
    }
    blocklist
}

/// Startup consistency check: every permitted fault category must have at
/// least one triggering instruction in the active instruction set, and the
/// CPU must advertise the feature flags some categories depend on.
pub fn check_instruction_support(
    config: &FuzzConfig,
    instruction_set: &InstructionSet,
    cpu_flags: &str,
) -> SiftResult<()> {
    let require = |names: &[&str]| -> SiftResult<()> {
        if names.iter().any(|n| instruction_set.contains(n)) {
            Ok(())
        } else {
            Err(SiftError::Config(format!(
                "permitted fault requires one of {names:?} in the instruction set"
            )))
        }
    };
    let require_flag = |flag: &str| -> SiftResult<()> {
        if cpu_flags.split_whitespace().any(|f| f == flag) {
            Ok(())
        } else {
            Err(SiftError::Config(format!(
                "permitted fault requires CPU feature {flag:?}"
            )))
        }
    };

    for fault in &config.permitted_faults {
        match fault.as_str() {
            "DE-overflow" => require(&["DIV", "IDIV"])?,
            "UD" => require(&["UD", "UD2"])?,
            "UD-sgx" => {
                require(&["ENCLU"])?;
                require_flag("sgx")?;
            }
            "UD-vtx" => require(&["VMCALL"])?,
            "UD-svm" => require(&["VMMCALL"])?,
            "DB-instruction" => require(&["INT1"])?,
            "BP" => require(&["INT3"])?,
            "BR" => {
                require(&["BNDCU"])?;
                require_flag("mpx")?;
            }
            other => {
                return Err(SiftError::Config(format!(
                    "unknown permitted fault category {other:?}"
                )));
            }
        }
    }
    Ok(())
}

/// Reads the CPU feature flag line from /proc/cpuinfo.
pub fn read_cpu_flags() -> SiftResult<String> {
    let cpuinfo = std::fs::read_to_string("/proc/cpuinfo")?;
    for line in cpuinfo.lines() {
        if let Some(rest) = line.strip_prefix("flags") {
            if let Some((_, flags)) = rest.split_once(':') {
                return Ok(flags.trim().to_string());
            }
        }
    }
    Err(SiftError::Config(
        "no flags line in /proc/cpuinfo".to_string(),
    ))
}
