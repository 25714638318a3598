//! C7: classifies a transaction, runs its gas/nonce/value-transfer state
//! machine (spec §4.7), and produces a `Receipt` plus `TxnStatus`. Pure
//! logic over the `AccountsView`/`ContractSetup`/`ContractRunner` seams —
//! `account-engine` supplies the trie-backed, IPC-backed implementations
//! of those traits; this crate never touches a socket or a trie directly,
//! per spec §9's "re-architect as a layered data structure" note.

pub mod accounts;
pub mod error;
pub mod gas;
pub mod runner;

pub use accounts::{AccountsView, ContractSetup};
pub use error::PostCommitError;
pub use runner::{ContractRunner, OutgoingMessage, RunResult};

use account_types::{
    Address, AccountRecord, DropReason, Event, Receipt, Transaction, Transition, TxnClass, TxnStatus,
};

/// Stateless: every call is independent, so the façade can share one
/// `Evaluator` across an entire block without synchronization beyond
/// whatever the `AccountsView`/`ContractRunner` implementations need.
pub struct Evaluator;

impl Evaluator {
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate(
        accounts: &mut dyn AccountsView,
        setup: &mut dyn ContractSetup,
        runner: &dyn ContractRunner,
        gas_schedule: &gas::GasSchedule,
        block_num: u64,
        num_shards: u32,
        is_ds_block: bool,
        tx: &Transaction,
    ) -> (Receipt, TxnStatus) {
        let sender_addr = Address::from_public_key(&tx.from_pubkey);

        let mut sender = match accounts.get(&sender_addr) {
            Some(a) => a,
            None => return dropped(DropReason::InvalidFromAccount),
        };

        let recipient_is_contract = accounts.get(&tx.to_addr).map(|a| a.is_contract()).unwrap_or(false);
        let class = match tx.classify(recipient_is_contract) {
            Some(c) => c,
            None => return dropped(DropReason::IncorrectTxnType),
        };

        let gas_deposit = tx.gas_deposit();
        let required = match gas_deposit.checked_add(tx.amount) {
            Some(r) => r,
            None => return dropped(DropReason::MathError),
        };
        if sender.balance < required {
            return dropped(DropReason::InsufficientBalance);
        }

        let penalty = gas::class_penalty(gas_schedule, class);
        if tx.gas_limit < penalty {
            return dropped(DropReason::InsufficientGasLimit);
        }

        // Address collision must be checked before anything is
        // mutated: it is a pre-commit drop reason (spec §7), unlike
        // the failures the interpreter itself can report.
        let contract_addr = if class == TxnClass::ContractCreation {
            let addr = Address::for_contract(&sender_addr, sender.nonce);
            if accounts.exists(&addr) {
                return dropped(DropReason::FailContractAccountCreation);
            }
            Some(addr)
        } else {
            None
        };

        // Past this line the transaction is accepted into the block:
        // gas is reserved, the nonce bumps unconditionally, and every
        // remaining failure is a receipt-level one (spec §4.7 "error
        // outcome").
        if !sender.decrease_balance(gas_deposit) {
            return dropped(DropReason::InsufficientBalance);
        }

        let receipt = match class {
            TxnClass::NonContract => run_non_contract(accounts, &mut sender, sender_addr, tx),
            TxnClass::ContractCreation => run_contract_creation(
                accounts,
                setup,
                runner,
                gas_schedule,
                &mut sender,
                sender_addr,
                contract_addr.expect("checked above"),
                block_num,
                num_shards,
                is_ds_block,
                tx,
            ),
            TxnClass::ContractCall => {
                run_contract_call(accounts, runner, gas_schedule, &mut sender, sender_addr, block_num, num_shards, is_ds_block, tx)
            }
        };

        sender.increase_nonce().ok();
        accounts.put(sender_addr, sender);

        (receipt, TxnStatus::Accepted)
    }
}

fn dropped(reason: DropReason) -> (Receipt, TxnStatus) {
    (Receipt::failed(0, format!("{:?}", reason)), TxnStatus::Dropped(reason))
}

fn run_non_contract(accounts: &mut dyn AccountsView, sender: &mut AccountRecord, sender_addr: Address, tx: &Transaction) -> Receipt {
    // A plain transfer has no interpreter step to refund against, so
    // the entire `gas_limit` is treated as consumed (spec §4.7's
    // refund rule degenerates to a no-op for `NonContract`).
    sender.decrease_balance(tx.amount);

    let mut recipient = accounts.get(&tx.to_addr).unwrap_or_else(AccountRecord::new_default);
    recipient.increase_balance(tx.amount).ok();
    accounts.put(tx.to_addr, recipient);

    let mut receipt = Receipt::empty_success(tx.gas_limit);
    receipt.transitions.push(Transition {
        from: sender_addr,
        to: tx.to_addr,
        amount: tx.amount,
        accepted: true,
        depth: 0,
    });
    receipt
}

#[allow(clippy::too_many_arguments)]
fn run_contract_creation(
    accounts: &mut dyn AccountsView,
    setup: &mut dyn ContractSetup,
    runner: &dyn ContractRunner,
    gas_schedule: &gas::GasSchedule,
    sender: &mut AccountRecord,
    sender_addr: Address,
    contract_addr: Address,
    block_num: u64,
    num_shards: u32,
    is_ds_block: bool,
    tx: &Transaction,
) -> Receipt {
    let penalty = gas::class_penalty(gas_schedule, TxnClass::ContractCreation);

    let code_hash = account_types::Hash::sha256(&tx.code);
    let new_account = AccountRecord::new_contract(code_hash, state_trie::empty_root());
    accounts.put(contract_addr, new_account);

    if let Err(e) = setup.set_code(&contract_addr, &tx.code) {
        log::warn!("set_code failed for freshly created {:?}: {}", contract_addr, e);
    }

    let payload = build_payload(block_num, num_shards, is_ds_block, tx, sender_addr, contract_addr);

    match runner.check(tx.version, payload.clone()) {
        Err(e) if e == error::TIMEOUT_SENTINEL => return floor_refund(sender, tx, penalty, PostCommitError::ExecuteCmdTimeout),
        Err(_) => return floor_refund(sender, tx, penalty, PostCommitError::CheckerFailed),
        Ok(v) => match serde_json::from_value::<runner::CheckResult>(v) {
            Ok(r) if r.ok => {}
            _ => return floor_refund(sender, tx, penalty, PostCommitError::CheckerFailed),
        },
    }

    let run_result = match runner.run(tx.version, payload) {
        Err(e) if e == error::TIMEOUT_SENTINEL => return floor_refund(sender, tx, penalty, PostCommitError::ExecuteCmdTimeout),
        Err(_) => return floor_refund(sender, tx, penalty, PostCommitError::RunnerFailed),
        Ok(v) => match serde_json::from_value::<RunResult>(v) {
            Ok(r) => r,
            Err(_) => return floor_refund(sender, tx, penalty, PostCommitError::JsonOutputCorrupted),
        },
    };

    if let Err(e) = setup.set_init_data(&contract_addr, &tx.data) {
        log::warn!("set_init_data failed for {:?}: {}", contract_addr, e);
    }

    let gas_remaining = run_result.gas_remaining.min(tx.gas_limit.saturating_sub(penalty));
    sender.increase_balance(gas_remaining as u128 * tx.gas_price).ok();
    let cum_gas = tx.gas_limit - gas_remaining;

    let mut receipt = Receipt::empty_success(cum_gas);
    receipt.events = run_result
        .events
        .into_iter()
        .map(|e| Event { emitter: contract_addr, name: e.name, payload: e.payload })
        .collect();
    receipt
}

#[allow(clippy::too_many_arguments)]
fn run_contract_call(
    accounts: &mut dyn AccountsView,
    runner: &dyn ContractRunner,
    gas_schedule: &gas::GasSchedule,
    sender: &mut AccountRecord,
    sender_addr: Address,
    block_num: u64,
    num_shards: u32,
    is_ds_block: bool,
    tx: &Transaction,
) -> Receipt {
    let penalty = gas::class_penalty(gas_schedule, TxnClass::ContractCall);
    let payload = build_payload(block_num, num_shards, is_ds_block, tx, sender_addr, tx.to_addr);

    let run_result = match runner.run(tx.version, payload) {
        Err(e) if e == error::TIMEOUT_SENTINEL => return floor_refund(sender, tx, penalty, PostCommitError::ExecuteCmdTimeout),
        Err(_) => return floor_refund(sender, tx, penalty, PostCommitError::RunnerFailed),
        Ok(v) => match serde_json::from_value::<RunResult>(v) {
            Ok(r) => r,
            Err(_) => return floor_refund(sender, tx, penalty, PostCommitError::JsonOutputCorrupted),
        },
    };

    let mut edges = 0u32;
    let mut transitions = Vec::new();
    let mut events = Vec::new();
    let mut transfers = Vec::new();
    let cap_result = run_outgoing_tree(
        runner,
        gas_schedule,
        tx.version,
        tx.to_addr,
        &run_result.messages,
        &mut edges,
        1,
        &mut transitions,
        &mut events,
        &mut transfers,
    );

    match cap_result {
        Err(PostCommitError::MaxEdgesReached) => {
            // Unwind: nothing committed below this point, and value
            // never moves — just the fixed `contract_invoke_gas` floor
            // is kept (spec S5).
            let gas_remaining = tx.gas_limit.saturating_sub(gas_schedule.contract_invoke_gas);
            sender.increase_balance(gas_remaining as u128 * tx.gas_price).ok();
            Receipt::failed(tx.gas_limit - gas_remaining, PostCommitError::MaxEdgesReached.to_string())
        }
        Err(other) => {
            let gas_remaining = tx.gas_limit.saturating_sub(penalty);
            sender.increase_balance(gas_remaining as u128 * tx.gas_price).ok();
            Receipt::failed(penalty, other.to_string())
        }
        Ok(()) => {
            let top_level = Transition {
                from: sender_addr,
                to: tx.to_addr,
                amount: tx.amount,
                accepted: run_result.accepted,
                depth: 0,
            };
            if run_result.accepted {
                move_value(accounts, sender_addr, sender, sender_addr, tx.to_addr, tx.amount);
            }
            transitions.insert(0, top_level);

            // Atomic layering (spec §4.7): the whole call tree succeeded,
            // so every accepted inner message's value now moves too, in
            // the same depth-first order the tree was walked.
            for (from, to, amount) in transfers {
                move_value(accounts, sender_addr, sender, from, to, amount);
            }

            let gas_remaining = run_result.gas_remaining.min(tx.gas_limit.saturating_sub(penalty));
            sender.increase_balance(gas_remaining as u128 * tx.gas_price).ok();
            let cum_gas = tx.gas_limit - gas_remaining;

            let mut receipt = Receipt::empty_success(cum_gas);
            receipt.accepted = run_result.accepted;
            receipt.transitions = transitions;
            receipt.events = events;
            receipt
        }
    }
}

/// Moves `amount` from `from` to `to`. `sender_addr`'s account is held
/// outside `accounts` for the duration of `Evaluator::evaluate` (it's
/// written back once at the end), so transfers touching it go through
/// `sender` directly instead of round-tripping through the view.
fn move_value(accounts: &mut dyn AccountsView, sender_addr: Address, sender: &mut AccountRecord, from: Address, to: Address, amount: u128) {
    if from == sender_addr {
        sender.decrease_balance(amount);
    } else {
        let mut acct = accounts.get(&from).unwrap_or_else(AccountRecord::new_default);
        acct.decrease_balance(amount);
        accounts.put(from, acct);
    }

    if to == sender_addr {
        sender.increase_balance(amount).ok();
    } else {
        let mut acct = accounts.get(&to).unwrap_or_else(AccountRecord::new_default);
        acct.increase_balance(amount).ok();
        accounts.put(to, acct);
    }
}

/// Walks one rank of outgoing messages depth-first, recursing into
/// each message's own outgoing messages (spec §5 "inter-contract calls
/// are DFS-ordered"), incrementing the shared `edges` counter and
/// aborting the whole call tree the moment it crosses
/// `MAX_CONTRACT_EDGES`. Accepted messages record a pending `(from, to,
/// amount)` transfer in `transfers` rather than moving value
/// immediately, so a `MaxEdgesReached` abort anywhere in the tree
/// leaves every account untouched (spec §4.7 "atomic layering") — the
/// caller applies `transfers` only once the whole walk returns `Ok`.
#[allow(clippy::too_many_arguments)]
fn run_outgoing_tree(
    runner: &dyn ContractRunner,
    gas_schedule: &gas::GasSchedule,
    version: u32,
    caller: Address,
    messages: &[OutgoingMessage],
    edges: &mut u32,
    depth: u32,
    transitions: &mut Vec<Transition>,
    events: &mut Vec<Event>,
    transfers: &mut Vec<(Address, Address, u128)>,
) -> Result<(), PostCommitError> {
    for message in messages {
        *edges += 1;
        if *edges > gas_schedule.max_contract_edges {
            return Err(PostCommitError::MaxEdgesReached);
        }

        let result = runner.run(version, message.payload.clone()).map_err(|e| {
            if e == error::TIMEOUT_SENTINEL {
                PostCommitError::ExecuteCmdTimeout
            } else {
                PostCommitError::RunnerFailed
            }
        })?;
        let run_result: RunResult = serde_json::from_value(result).map_err(|_| PostCommitError::JsonOutputCorrupted)?;

        transitions.push(Transition {
            from: caller,
            to: message.to,
            amount: message.amount,
            accepted: run_result.accepted,
            depth,
        });
        events.extend(
            run_result
                .events
                .iter()
                .map(|e| Event { emitter: message.to, name: e.name.clone(), payload: e.payload.clone() }),
        );
        if run_result.accepted {
            transfers.push((caller, message.to, message.amount));
        }

        run_outgoing_tree(
            runner,
            gas_schedule,
            version,
            message.to,
            &run_result.messages,
            edges,
            depth + 1,
            transitions,
            events,
            transfers,
        )?;
    }
    Ok(())
}

fn floor_refund(sender: &mut AccountRecord, tx: &Transaction, penalty: u64, tag: impl ToString) -> Receipt {
    let gas_remaining = tx.gas_limit.saturating_sub(penalty);
    sender.increase_balance(gas_remaining as u128 * tx.gas_price).ok();
    Receipt::failed(penalty, tag.to_string())
}

fn build_payload(
    block_num: u64,
    num_shards: u32,
    is_ds_block: bool,
    tx: &Transaction,
    sender: Address,
    target: Address,
) -> serde_json::Value {
    serde_json::json!({
        "block_num": block_num,
        "num_shards": num_shards,
        "is_ds_block": is_ds_block,
        "sender": format!("{:?}", sender),
        "target": format!("{:?}", target),
        "amount": tx.amount.to_string(),
        "gas_limit": tx.gas_limit,
        "data": tx.data,
        "code": tx.code,
    })
}
