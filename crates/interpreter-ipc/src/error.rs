use std::fmt;

#[derive(Debug)]
pub enum IpcError {
    Io(std::io::Error),
    /// The interpreter's response didn't parse as a JSON-RPC output.
    Protocol(String),
    /// The interpreter returned a JSON-RPC error object.
    Remote(jsonrpc_core::Error),
    /// `MAXRETRYCONN` reconnect attempts exhausted (spec §4.6).
    RetriesExhausted,
    /// The watchdog fired before the interpreter replied.
    Timeout,
}

impl fmt::Display for IpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpcError::Io(e) => write!(f, "ipc io error: {}", e),
            IpcError::Protocol(s) => write!(f, "ipc protocol error: {}", s),
            IpcError::Remote(e) => write!(f, "interpreter returned error: {}", e),
            IpcError::RetriesExhausted => write!(f, "exhausted reconnect attempts"),
            IpcError::Timeout => write!(f, "interpreter call timed out"),
        }
    }
}

impl std::error::Error for IpcError {}

impl From<std::io::Error> for IpcError {
    fn from(e: std::io::Error) -> Self {
        IpcError::Io(e)
    }
}
