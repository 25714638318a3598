//! The evaluator's view of the interpreter: deliberately decoupled from
//! `interpreter-ipc`'s socket machinery (spec §4.7 takes `extras` as an
//! opaque bundle; spec §9 "globals/singletons" re-architecture note asks
//! for an explicit composition root rather than a hard dependency chain).
//! `account-engine` wires a real `ContractRunner` over `InterpreterClient`.

use account_types::Address;
use serde::Deserialize;

/// One outgoing message from a running contract to another account,
/// i.e. one edge in the inter-contract call tree (spec §4.7 "process
/// messages recurse").
#[derive(Debug, Clone, Deserialize)]
pub struct OutgoingMessage {
    pub to: Address,
    pub amount: u128,
    #[serde(default)]
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventOut {
    pub name: String,
    #[serde(default)]
    pub payload: Vec<u8>,
}

/// The interpreter's `run` response shape (spec §4.6: `_accepted`,
/// `gas_remaining`, emitted messages and events).
#[derive(Debug, Clone, Deserialize)]
pub struct RunResult {
    pub gas_remaining: u64,
    #[serde(default)]
    pub accepted: bool,
    #[serde(default)]
    pub messages: Vec<OutgoingMessage>,
    #[serde(default)]
    pub events: Vec<EventOut>,
}

/// The interpreter's `check` response shape: just enough to tell
/// success from failure (spec §4.6: "non-zero status is a checker
/// failure").
#[derive(Debug, Clone, Deserialize)]
pub struct CheckResult {
    #[serde(default)]
    pub ok: bool,
}

/// Implemented by whatever owns the IPC connection (spec §4.6/§4.7:
/// `check`/`run` calls on the out-of-process interpreter, addressed by
/// version so multiple interpreter binaries can coexist).
pub trait ContractRunner {
    fn check(&self, version: u32, payload: serde_json::Value) -> Result<serde_json::Value, String>;
    fn run(&self, version: u32, payload: serde_json::Value) -> Result<serde_json::Value, String>;
}
