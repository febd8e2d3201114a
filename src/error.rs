//! Process-level error type.
//!
//! Every fallible operation in the crate returns `AppError`, which carries the
//! exit code the `cri` binary should terminate with. Data-quality conditions
//! (missing days, empty pools, hash mismatches) are *not* errors; they travel
//! inside the calculation/verification results instead.

/// Exit codes used by the `cri` binary.
pub mod exit {
    /// Verification ran and the reproduced value differs from the published one.
    pub const MISMATCH: u8 = 1;
    /// Usage, configuration, or I/O failure.
    pub const INPUT: u8 = 2;
    /// No admissible observations in the window (non-publishable / cannot reproduce).
    pub const NO_DATA: u8 = 3;
    /// No published value exists for the requested end date.
    pub const NOT_FOUND: u8 = 4;
    /// Publication refused because a row for the same end date already exists.
    pub const DUPLICATE: u8 = 5;
    /// Values matched, but one or more stored days failed the content-hash check.
    pub const SUSPECT: u8 = 6;
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    /// Shorthand for the common "bad input / failed I/O" case.
    pub fn input(message: impl Into<String>) -> Self {
        Self::new(exit::INPUT, message)
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
