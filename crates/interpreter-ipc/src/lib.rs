//! C6: the JSON-RPC 2.0 boundary with the out-of-process smart-contract
//! interpreter (spec §4.6). Requests/responses are framed with the
//! teacher's `jsonrpc-core` wire types and sent newline-delimited over a
//! Unix-domain stream socket, mirroring `ScillaIPCServer`/`ScillaClient`
//! from the original node (serving `fetchStateValue` et al., calling
//! `check`/`run`/`disambiguate` on the interpreter process).

pub mod client;
pub mod error;
pub mod server;

pub use client::InterpreterClient;
pub use error::IpcError;
pub use server::{Callbacks, InterpreterServer};

/// `fetchBlockchainInfo`'s fixed query vocabulary (spec §4.6 table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockchainInfo {
    BlockNumber,
    Timestamp,
    BlockHash,
    ChainId,
}

impl BlockchainInfo {
    pub fn parse(name: &str) -> Option<BlockchainInfo> {
        match name {
            "BLOCKNUMBER" => Some(BlockchainInfo::BlockNumber),
            "TIMESTAMP" => Some(BlockchainInfo::Timestamp),
            "BLOCKHASH" => Some(BlockchainInfo::BlockHash),
            "CHAINID" => Some(BlockchainInfo::ChainId),
            _ => None,
        }
    }
}
