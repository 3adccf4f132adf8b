//! Process exit codes and structured error output.

use serde::Serialize;

/// Exit codes for the safedupe binary.
///
/// - 0: success
/// - 1: general error
/// - 2: nothing to do (no duplicates, no records)
/// - 3: partial success (some per-file failures)
/// - 130: interrupted by Ctrl+C
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Completed normally.
    Success = 0,
    /// An unexpected error occurred.
    GeneralError = 1,
    /// Completed, but there was nothing to act on.
    NothingToDo = 2,
    /// Completed with some per-file failures.
    PartialSuccess = 3,
    /// Interrupted by the user.
    Interrupted = 130,
}

impl ExitCode {
    /// Numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "SD000",
            Self::GeneralError => "SD001",
            Self::NothingToDo => "SD002",
            Self::PartialSuccess => "SD003",
            Self::Interrupted => "SD130",
        }
    }
}

/// Error printed by `--json-errors`.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// Code prefix, e.g. "SD001"
    pub code: String,
    /// Process exit code
    pub exit_code: i32,
    /// Error message including its causes
    pub message: String,
    /// Whether the run was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Build from an application error and the exit code it maps to.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
