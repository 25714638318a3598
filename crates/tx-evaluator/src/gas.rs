//! Flat per-class gas penalties and the inter-contract edge cap (spec
//! §4.7 "Gas accounting" / "Call depth"). The original Zilliqa sources
//! pin these in a constants file that wasn't part of the retrieved
//! excerpt; the values below are illustrative and documented as such in
//! DESIGN.md.

use account_types::TxnClass;

pub const CONTRACT_CREATE_GAS: u64 = 50;
pub const CONTRACT_INVOKE_GAS: u64 = 50;
pub const SCILLA_CHECKER_INVOKE_GAS: u64 = 100;
pub const SCILLA_RUNNER_INVOKE_GAS: u64 = 300;

/// A transaction with more outgoing messages than this across its whole
/// call tree is aborted with `MaxEdgesReached`.
pub const MAX_CONTRACT_EDGES: u32 = 100;

/// Configurable gas costs and the edge cap, so a deployment can tune
/// them (spec SPEC_FULL §10 ambient config) without recompiling. The
/// `Default` impl reproduces the flat constants above.
#[derive(Debug, Clone, Copy)]
pub struct GasSchedule {
    pub contract_create_gas: u64,
    pub contract_invoke_gas: u64,
    pub scilla_checker_invoke_gas: u64,
    pub scilla_runner_invoke_gas: u64,
    pub max_contract_edges: u32,
}

impl Default for GasSchedule {
    fn default() -> Self {
        GasSchedule {
            contract_create_gas: CONTRACT_CREATE_GAS,
            contract_invoke_gas: CONTRACT_INVOKE_GAS,
            scilla_checker_invoke_gas: SCILLA_CHECKER_INVOKE_GAS,
            scilla_runner_invoke_gas: SCILLA_RUNNER_INVOKE_GAS,
            max_contract_edges: MAX_CONTRACT_EDGES,
        }
    }
}

/// The flat penalty charged up-front for a transaction of this class,
/// before the interpreter is ever invoked. `NonContract` has none: a
/// plain transfer has no interpreter step, so its whole `gas_limit` is
/// simply consumed (see `Evaluator::evaluate`).
pub fn class_penalty(schedule: &GasSchedule, class: TxnClass) -> u64 {
    match class {
        TxnClass::NonContract => 0,
        TxnClass::ContractCreation => schedule.contract_create_gas + schedule.scilla_checker_invoke_gas + schedule.scilla_runner_invoke_gas,
        TxnClass::ContractCall => schedule.contract_invoke_gas + schedule.scilla_runner_invoke_gas,
    }
}
