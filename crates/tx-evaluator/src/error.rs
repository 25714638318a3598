//! Post-gas-deduction failure tags (spec §7's lower half of the error
//! table). These never drop a transaction — they land in
//! `Receipt.errors` as their `Display` string, alongside the nonce bump
//! and penalty commit the table prescribes.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostCommitError {
    CheckerFailed,
    RunnerFailed,
    JsonOutputCorrupted,
    NoGasRemainingFound,
    MaxEdgesReached,
    /// The watchdog fired before the interpreter answered (spec S6).
    /// Distinguished from `RunnerFailed` because a caller restarts the
    /// interpreter process on this tag specifically.
    ExecuteCmdTimeout,
}

/// The sentinel string `ContractRunner` implementations use to report a
/// watchdog timeout over the trait's plain `String` error channel,
/// since the trait itself carries no structured error type.
pub const TIMEOUT_SENTINEL: &str = "ExecuteCmdTimeout";

impl fmt::Display for PostCommitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PostCommitError::CheckerFailed => "CheckerFailed",
            PostCommitError::RunnerFailed => "RunnerFailed",
            PostCommitError::JsonOutputCorrupted => "JsonOutputCorrupted",
            PostCommitError::NoGasRemainingFound => "NoGasRemainingFound",
            PostCommitError::MaxEdgesReached => "MaxEdgesReached",
            PostCommitError::ExecuteCmdTimeout => TIMEOUT_SENTINEL,
        };
        write!(f, "{}", s)
    }
}

impl std::error::Error for PostCommitError {}
