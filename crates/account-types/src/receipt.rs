//! Transaction receipts (spec §3 "Receipt").

use crate::address::Address;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: Address,
    pub to: Address,
    pub amount: u128,
    pub accepted: bool,
    /// DFS order index among all transitions of this transaction.
    pub depth: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub emitter: Address,
    pub name: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub success: bool,
    pub cum_gas: u64,
    pub events: Vec<Event>,
    pub transitions: Vec<Transition>,
    pub errors: Vec<String>,
    /// Whether the *outermost* recipient accepted the attached value.
    pub accepted: bool,
}

impl Receipt {
    pub fn empty_success(cum_gas: u64) -> Self {
        Receipt {
            success: true,
            cum_gas,
            events: Vec::new(),
            transitions: Vec::new(),
            errors: Vec::new(),
            accepted: true,
        }
    }

    pub fn failed(cum_gas: u64, error: impl Into<String>) -> Self {
        Receipt {
            success: false,
            cum_gas,
            events: Vec::new(),
            transitions: Vec::new(),
            errors: vec![error.into()],
            accepted: false,
        }
    }
}

/// Outcome of `AccountEngine::update_accounts_temp` (spec §4.8), distinct
/// from the in-receipt success/failure: a transaction can fail logically
/// (penalty deducted, nonce bumped, receipt recorded) or be dropped before
/// ever touching state (spec §7's "pre-commit" error class).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnStatus {
    Accepted,
    Dropped(DropReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    InvalidFromAccount,
    InvalidToAccount,
    InsufficientBalance,
    InsufficientGasLimit,
    MathError,
    FailContractAccountCreation,
    FailScillaLib,
    FailContractInit,
    IncorrectTxnType,
}
