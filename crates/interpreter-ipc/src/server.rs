//! Server side of the IPC boundary: serves the five methods the
//! interpreter calls back into the node for (spec §4.6 table), mirroring
//! `ScillaIPCServer`'s method set.

use crate::BlockchainInfo;
use account_types::Address;
use jsonrpc_core::{Call, Error as RpcError, ErrorCode, Id, Output, Params, Success, Value, Version};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::Arc;
use std::thread;

/// Implemented by whatever owns account/contract state (the façade, in
/// practice) to answer the interpreter's callbacks.
pub trait Callbacks: Send + Sync + 'static {
    fn fetch_state_value(&self, query: &[u8]) -> (bool, Vec<u8>);
    fn fetch_external_state_value(&self, target: Address, query: &[u8]) -> (bool, Vec<u8>, String);
    fn update_state_value(&self, query: &[u8], value: &[u8]);
    fn fetch_blockchain_info(&self, info: BlockchainInfo, args: &str) -> String;
}

pub struct InterpreterServer<C: Callbacks> {
    callbacks: Arc<C>,
}

impl<C: Callbacks> InterpreterServer<C> {
    pub fn new(callbacks: Arc<C>) -> Self {
        InterpreterServer { callbacks }
    }

    /// Binds `socket_path` (removing any stale socket file first) and
    /// serves connections until the process exits; each connection runs
    /// on its own thread, matching one interpreter process per socket.
    pub fn serve(&self, socket_path: &Path) -> std::io::Result<()> {
        let _ = std::fs::remove_file(socket_path);
        let listener = UnixListener::bind(socket_path)?;
        for stream in listener.incoming() {
            let stream = stream?;
            let callbacks = self.callbacks.clone();
            thread::spawn(move || {
                if let Err(e) = handle_connection(stream, callbacks.as_ref()) {
                    log::warn!("interpreter-ipc connection ended: {}", e);
                }
            });
        }
        Ok(())
    }
}

fn handle_connection<C: Callbacks>(stream: UnixStream, callbacks: &C) -> std::io::Result<()> {
    let reader = BufReader::new(stream.try_clone()?);
    let mut writer = stream;
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        if let Some(response) = dispatch_line(&line, callbacks) {
            writer.write_all(response.as_bytes())?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
    }
    Ok(())
}

fn dispatch_line<C: Callbacks>(line: &str, callbacks: &C) -> Option<String> {
    let call: Call = match serde_json::from_str(line) {
        Ok(c) => c,
        Err(e) => {
            let failure = Output::Failure(jsonrpc_core::Failure {
                jsonrpc: Some(Version::V2),
                error: RpcError::new(ErrorCode::ParseError),
                id: Id::Null,
            });
            log::warn!("malformed ipc request: {}", e);
            return Some(serde_json::to_string(&failure).unwrap());
        }
    };

    let method_call = match call {
        Call::MethodCall(mc) => mc,
        Call::Notification(_) => return None,
        Call::Invalid { id } => {
            let failure = Output::Failure(jsonrpc_core::Failure {
                jsonrpc: Some(Version::V2),
                error: RpcError::new(ErrorCode::InvalidRequest),
                id,
            });
            return Some(serde_json::to_string(&failure).unwrap());
        }
    };

    let id = method_call.id.clone();
    let result = dispatch_method(&method_call.method, method_call.params, callbacks);
    let output = match result {
        Ok(value) => Output::Success(Success { jsonrpc: Some(Version::V2), result: value, id }),
        Err(error) => Output::Failure(jsonrpc_core::Failure { jsonrpc: Some(Version::V2), error, id }),
    };
    Some(serde_json::to_string(&output).unwrap())
}

fn dispatch_method<C: Callbacks>(method: &str, params: Params, callbacks: &C) -> Result<Value, RpcError> {
    match method {
        "fetchStateValue" => {
            let (query,): (String,) = params.parse()?;
            let query_bytes = hex::decode(&query).map_err(|_| RpcError::invalid_params("query not hex"))?;
            let (found, value) = callbacks.fetch_state_value(&query_bytes);
            Ok(serde_json::json!([found, hex::encode(value)]))
        }
        "fetchExternalStateValue" => {
            let (addr, query): (String, String) = params.parse()?;
            let addr_bytes = hex::decode(&addr).map_err(|_| RpcError::invalid_params("address not hex"))?;
            let address = Address::try_from(addr_bytes.as_slice()).map_err(|_| RpcError::invalid_params("bad address length"))?;
            let query_bytes = hex::decode(&query).map_err(|_| RpcError::invalid_params("query not hex"))?;
            let (found, value, ty) = callbacks.fetch_external_state_value(address, &query_bytes);
            Ok(serde_json::json!([found, hex::encode(value), ty]))
        }
        "fetchExternalStateValueB64" => {
            let (addr, query_b64): (String, String) = params.parse()?;
            let addr_bytes = hex::decode(&addr).map_err(|_| RpcError::invalid_params("address not hex"))?;
            let address = Address::try_from(addr_bytes.as_slice()).map_err(|_| RpcError::invalid_params("bad address length"))?;
            let query_bytes = base64::decode(&query_b64).map_err(|_| RpcError::invalid_params("query not base64"))?;
            let (found, value, ty) = callbacks.fetch_external_state_value(address, &query_bytes);
            Ok(serde_json::json!([found, base64::encode(value), ty]))
        }
        "updateStateValue" => {
            let (query, value): (String, String) = params.parse()?;
            let query_bytes = hex::decode(&query).map_err(|_| RpcError::invalid_params("query not hex"))?;
            let value_bytes = hex::decode(&value).map_err(|_| RpcError::invalid_params("value not hex"))?;
            callbacks.update_state_value(&query_bytes, &value_bytes);
            Ok(Value::Null)
        }
        "fetchBlockchainInfo" => {
            let (name, args): (String, String) = params.parse()?;
            let info = BlockchainInfo::parse(&name).ok_or_else(|| RpcError::invalid_params("unknown blockchain info query"))?;
            let value = callbacks.fetch_blockchain_info(info, &args);
            Ok(serde_json::json!([true, value]))
        }
        _ => Err(RpcError::method_not_found()),
    }
}

use std::convert::TryFrom;
