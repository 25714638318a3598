//! `EngineConfig`: serde-derived, loaded from TOML, mirroring the
//! teacher's own configuration-file pattern (spec SPEC_FULL §10 ambient
//! stack). Everything the façade, the evaluator and the IPC layer need
//! to be parameterized at startup lives here rather than as scattered
//! constants.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory backing the RocksDB (or in-memory, for tests) KV store.
    pub kv_path: PathBuf,
    /// Archival nodes never physically purge zero-refcount trie nodes
    /// (spec §4.2).
    pub archival: bool,
    pub num_shards: u32,

    pub max_contract_edges: u32,
    pub contract_create_gas: u64,
    pub contract_invoke_gas: u64,
    pub scilla_checker_invoke_gas: u64,
    pub scilla_runner_invoke_gas: u64,

    /// `SCILLA_IPC_SOCKET_PATH` (spec §6).
    pub interpreter_socket_path: PathBuf,
    pub interpreter_call_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            kv_path: PathBuf::from("./data/state"),
            archival: false,
            num_shards: 1,
            max_contract_edges: tx_evaluator::gas::MAX_CONTRACT_EDGES,
            contract_create_gas: tx_evaluator::gas::CONTRACT_CREATE_GAS,
            contract_invoke_gas: tx_evaluator::gas::CONTRACT_INVOKE_GAS,
            scilla_checker_invoke_gas: tx_evaluator::gas::SCILLA_CHECKER_INVOKE_GAS,
            scilla_runner_invoke_gas: tx_evaluator::gas::SCILLA_RUNNER_INVOKE_GAS,
            interpreter_socket_path: PathBuf::from("/tmp/scilla.sock"),
            interpreter_call_timeout_ms: 10_000,
        }
    }
}

impl EngineConfig {
    pub fn load(path: &std::path::Path) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path).map_err(|e| EngineError::Config(e.to_string()))?;
        toml::from_str(&text).map_err(|e| EngineError::Config(e.to_string()))
    }

    pub fn gas_schedule(&self) -> tx_evaluator::gas::GasSchedule {
        tx_evaluator::gas::GasSchedule {
            contract_create_gas: self.contract_create_gas,
            contract_invoke_gas: self.contract_invoke_gas,
            scilla_checker_invoke_gas: self.scilla_checker_invoke_gas,
            scilla_runner_invoke_gas: self.scilla_runner_invoke_gas,
            max_contract_edges: self.max_contract_edges,
        }
    }
}
