//! Address, account-record, transaction and receipt primitives shared by
//! every layer of the account state engine. Pure data types: behaviour
//! that needs the trie or contract storage lives in `account-engine`,
//! mirroring how the teacher repo splits `ethcore/types` from `ethcore`.

pub mod account;
pub mod address;
pub mod hash;
pub mod receipt;
pub mod transaction;

pub use account::{AccountError, AccountRecord, ACCOUNT_RECORD_LEN};
pub use address::{Address, ADDRESS_LEN};
pub use hash::{Hash, HASH_LEN};
pub use receipt::{DropReason, Event, Receipt, Transition, TxnStatus};
pub use transaction::{Transaction, TxnClass};
