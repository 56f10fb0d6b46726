//! Operator emergency controls.
//!
//! Kept apart from the FIFO path so they can be reviewed on their own. Both
//! assume the operator is acting on an incident:
//! - `close` force-closes one active recipient out of queue order and unlinks
//!   exactly that recipient's queue entry.
//! - `drain` sweeps the contract's whole balance of a token to the operator.
//!   It does not close flows; the operator is expected to close them first.

use soroban_sdk::{log, symbol_short, token, Address, Env};

use crate::queue::ClosureQueue;
use crate::{
    close_activation, load_activation, ClaimStatus, Config, DrainReceipt, DropError, DropEvent,
};

pub(crate) fn close(env: &Env, config: &Config, recipient: &Address) -> Result<(), DropError> {
    let activation = match load_activation(env, recipient) {
        Some(activation) if activation.status == ClaimStatus::Activated => activation,
        _ => return Err(DropError::NotActive),
    };

    let closed = close_activation(env, config, activation);

    let mut queue = ClosureQueue::load(env);
    assert!(
        queue.remove(recipient),
        "active recipient missing from closure queue"
    );

    log!(env, "emergency close", recipient.clone());
    env.events().publish(
        (symbol_short!("emclosed"), recipient.clone()),
        DropEvent::EmergencyClosed(closed),
    );
    Ok(())
}

pub(crate) fn drain(env: &Env, config: &Config, token: Address) -> Result<i128, DropError> {
    let token_client = token::Client::new(env, &token);
    let amount = token_client.balance(&env.current_contract_address());
    if amount <= 0 {
        return Err(DropError::NothingToDrain);
    }

    token_client.transfer(&env.current_contract_address(), &config.admin, &amount);

    log!(env, "emergency drain", token.clone(), amount);
    env.events().publish(
        (symbol_short!("drained"), token.clone()),
        DropEvent::Drained(DrainReceipt {
            token,
            to: config.admin.clone(),
            amount,
        }),
    );
    Ok(amount)
}
