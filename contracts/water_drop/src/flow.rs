use soroban_sdk::{contractclient, contracttype, Address, Env};

/// Snapshot of a continuous transfer as reported by the flow agreement.
///
/// A flow that was never opened (or has been closed) reads with `rate == 0`.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FlowInfo {
    /// Ledger timestamp of the last change to this flow.
    pub last_update: u64,
    /// Units per second currently flowing from sender to receiver.
    pub rate: i128,
    /// Buffer the sender locked when opening the flow.
    pub deposit: i128,
    pub owed_deposit: i128,
}

/// Call contract of the payment-streaming engine.
///
/// The water drop contract is always the `sender` of the flows it manages. The
/// same interface is used to ask a condition oracle whether a user is streaming
/// to a configured recipient.
#[contractclient(name = "FlowAgreementClient")]
pub trait FlowAgreement {
    /// Start streaming `rate` units of `token` per second from `sender` to `receiver`.
    fn open_flow(env: Env, sender: Address, receiver: Address, token: Address, rate: i128);

    /// Stop the flow from `sender` to `receiver`. Afterwards `get_flow` reports a zero rate.
    fn close_flow(env: Env, sender: Address, receiver: Address, token: Address);

    fn get_flow(env: Env, sender: Address, receiver: Address, token: Address) -> FlowInfo;
}
