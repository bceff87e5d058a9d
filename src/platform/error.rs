//! Crate-wide error type.

pub type SiftResult<T> = Result<T, SiftError>;

/// `InvalidArgument` marks caller misuse (programming errors that should
/// fail fast); `Config` marks environment mismatches such as a missing CPU
/// feature, which the fuzzer loop may handle by skipping the run.
#[derive(Debug)]
pub enum SiftError {
    Io(std::io::Error),
    InvalidArgument(String),
    Config(String),
    Parse(String),
    Executor(String),
}

impl std::fmt::Display for SiftError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io error: {err}"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::Config(msg) => write!(f, "config error: {msg}"),
            Self::Parse(msg) => write!(f, "parse error: {msg}"),
            Self::Executor(msg) => write!(f, "executor error: {msg}"),
        }
    }
}

impl std::error::Error for SiftError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SiftError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}
