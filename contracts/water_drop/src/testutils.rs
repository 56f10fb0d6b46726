//! In-memory flow agreement used by the tests in place of a real
//! payment-streaming engine. It records flows without moving tokens.

use soroban_sdk::{contract, contractimpl, contracttype, Address, Env};

use crate::{FlowAgreement, FlowInfo};

/// Seconds of flow a sender locks as deposit when opening.
const DEPOSIT_SECONDS: i128 = 3600;

#[contracttype]
pub enum MockKey {
    Flow(Address, Address, Address),
    Failing,
}

#[contract]
pub struct MockFlowAgreement;

#[contractimpl]
impl FlowAgreement for MockFlowAgreement {
    fn open_flow(env: Env, sender: Address, receiver: Address, token: Address, rate: i128) {
        sender.require_auth();
        if env.storage().instance().has(&MockKey::Failing) {
            panic!("flow agreement unavailable");
        }

        let key = MockKey::Flow(sender, receiver, token);
        let existing: Option<FlowInfo> = env.storage().persistent().get(&key);
        assert!(
            existing.map_or(true, |flow| flow.rate == 0),
            "flow already exists"
        );

        let flow = FlowInfo {
            last_update: env.ledger().timestamp(),
            rate,
            deposit: rate * DEPOSIT_SECONDS,
            owed_deposit: 0,
        };
        env.storage().persistent().set(&key, &flow);
    }

    fn close_flow(env: Env, sender: Address, receiver: Address, token: Address) {
        sender.require_auth();

        let key = MockKey::Flow(sender, receiver, token);
        let mut flow: FlowInfo = env
            .storage()
            .persistent()
            .get(&key)
            .expect("flow does not exist");
        assert!(flow.rate > 0, "flow already closed");

        flow.last_update = env.ledger().timestamp();
        flow.rate = 0;
        flow.deposit = 0;
        env.storage().persistent().set(&key, &flow);
    }

    fn get_flow(env: Env, sender: Address, receiver: Address, token: Address) -> FlowInfo {
        env.storage()
            .persistent()
            .get(&MockKey::Flow(sender, receiver, token))
            .unwrap_or(FlowInfo {
                last_update: 0,
                rate: 0,
                deposit: 0,
                owed_deposit: 0,
            })
    }
}

#[contractimpl]
impl MockFlowAgreement {
    /// Make every later `open_flow` panic, to exercise rollback in callers.
    pub fn set_failing(env: Env, failing: bool) {
        if failing {
            env.storage().instance().set(&MockKey::Failing, &());
        } else {
            env.storage().instance().remove(&MockKey::Failing);
        }
    }
}
