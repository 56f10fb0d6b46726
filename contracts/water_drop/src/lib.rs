#![no_std]

mod eligibility;
mod emergency;
mod flow;
mod queue;
mod registry;

use soroban_sdk::{contract, contractimpl, contracttype, log, symbol_short, Address, Env, Vec};

pub use eligibility::{EligibilityPolicy, StreamCondition, UserClaim};
pub use flow::{FlowAgreement, FlowAgreementClient, FlowInfo};
pub use queue::ClosureEntry;
pub use registry::ClaimTemplate;

use queue::ClosureQueue;

pub(crate) const TTL_THRESHOLD: u32 = 17_280;
pub(crate) const TTL_EXTEND_TO: u32 = 120_960;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// Deployment configuration, written once by `init`.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Config {
    /// Operator allowed to create templates, grant entitlements and use the
    /// emergency controls.
    pub admin: Address,
    /// Payment-streaming engine the drops are opened and closed on.
    pub flow_agreement: Address,
    pub policy: EligibilityPolicy,
}

/// Per-address activation state. Terminal once `Closed`.
#[contracttype]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ClaimStatus {
    NeverActivated = 0,
    Activated = 1,
    Closed = 2,
}

/// Record of an address turning its entitlement into a live flow.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Activation {
    pub recipient: Address,
    pub claim_id: u64,
    pub token: Address,
    pub rate: i128,
    pub activated_at: u64,
    pub close_at: u64,
    pub status: ClaimStatus,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClosedFlow {
    pub recipient: Address,
    pub token: Address,
}

#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DrainReceipt {
    pub token: Address,
    pub to: Address,
    pub amount: i128,
}

/// Payload of every event the contract publishes. Topics are
/// `(symbol, subject)`; see each publishing site.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DropEvent {
    ClaimCreated(ClaimTemplate),
    UserClaimAdded(UserClaim),
    Claimed(Activation),
    StreamClosed(ClosedFlow),
    EmergencyClosed(ClosedFlow),
    Drained(DrainReceipt),
}

/// Auth failures are signaled by host panic (`require_auth`).
#[soroban_sdk::contracterror]
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum DropError {
    /// Template rate is zero or negative.
    InvalidRate = 1,
    /// Template duration is zero, or too long to close before `u64::MAX`.
    InvalidDuration = 2,
    /// Template deadline is not in the future.
    InvalidDeadline = 3,
    ClaimNotFound = 4,
    /// Address already holds an entitlement to a different template.
    AlreadyGranted = 5,
    /// Explicit grants are only accepted under the allow-list policy.
    NotAllowListPolicy = 6,
    /// No entitlement, or the qualifying stream is missing ("ineligible: no stream").
    Ineligible = 7,
    /// The template's deadline has passed.
    ClaimExpired = 8,
    AlreadyClaimed = 9,
    QueueEmpty = 10,
    /// The queue head's close time has not been reached yet.
    NotReadyToClose = 11,
    /// Address has no open water drop.
    NotActive = 12,
    NothingToDrain = 13,
}

/// Namespace for all contract storage keys.
#[contracttype]
pub enum DataKey {
    Config,              // Instance: admin, flow agreement, policy.
    LastClaimId,         // Instance: highest template id issued.
    QueueMeta,           // Instance: closure queue head/tail/len.
    Claim(u64),          // Persistent: template by id.
    UserClaim(Address),  // Persistent: allow-list entitlement.
    Activation(Address), // Persistent: activation record per recipient.
    QueueNode(Address),  // Persistent: closure queue link per recipient.
}

// ---------------------------------------------------------------------------
// Storage helpers
// ---------------------------------------------------------------------------

fn get_config(env: &Env) -> Config {
    env.storage()
        .instance()
        .get(&DataKey::Config)
        .expect("contract not initialised: missing config")
}

pub(crate) fn load_activation(env: &Env, who: &Address) -> Option<Activation> {
    env.storage()
        .persistent()
        .get(&DataKey::Activation(who.clone()))
}

fn save_activation(env: &Env, activation: &Activation) {
    let key = DataKey::Activation(activation.recipient.clone());
    env.storage().persistent().set(&key, activation);
    env.storage()
        .persistent()
        .extend_ttl(&key, TTL_THRESHOLD, TTL_EXTEND_TO);
}

/// Keep the config and closure queue bookkeeping alive while the contract is in use.
fn extend_instance_ttl(env: &Env) {
    env.storage()
        .instance()
        .extend_ttl(TTL_THRESHOLD, TTL_EXTEND_TO);
}

fn flow_client<'a>(env: &'a Env, config: &Config) -> FlowAgreementClient<'a> {
    FlowAgreementClient::new(env, &config.flow_agreement)
}

/// Close the recipient's flow and mark the activation `Closed`. Queue
/// bookkeeping and the event are left to the caller.
///
/// A flow already terminated by the flow agreement (deleted by the receiver,
/// liquidated) reads zero rate; only the record is closed then, so the entry
/// can still leave the queue.
pub(crate) fn close_activation(
    env: &Env,
    config: &Config,
    mut activation: Activation,
) -> ClosedFlow {
    let flows = flow_client(env, config);
    let sender = env.current_contract_address();
    let flow = flows.get_flow(&sender, &activation.recipient, &activation.token);
    if flow.rate > 0 {
        flows.close_flow(&sender, &activation.recipient, &activation.token);
    } else {
        log!(env, "flow already terminated", activation.recipient.clone());
    }

    activation.status = ClaimStatus::Closed;
    save_activation(env, &activation);

    ClosedFlow {
        recipient: activation.recipient,
        token: activation.token,
    }
}

// ---------------------------------------------------------------------------
// Contract Implementation
// ---------------------------------------------------------------------------

#[contract]
pub struct WaterDrop;

#[contractimpl]
impl WaterDrop {
    /// Initialise the contract with its operator, flow agreement and
    /// eligibility policy.
    ///
    /// Must be called exactly once before any other operation.
    ///
    /// # Errors
    /// - `InvalidRate` if a conditional policy has a non-positive `min_rate`
    ///
    /// # Panics
    /// - If called more than once
    pub fn init(
        env: Env,
        admin: Address,
        flow_agreement: Address,
        policy: EligibilityPolicy,
    ) -> Result<(), DropError> {
        if env.storage().instance().has(&DataKey::Config) {
            panic!("already initialised");
        }
        policy.validate()?;

        let config = Config {
            admin,
            flow_agreement,
            policy,
        };
        env.storage().instance().set(&DataKey::Config, &config);
        env.storage().instance().set(&DataKey::LastClaimId, &0u64);

        extend_instance_ttl(&env);
        Ok(())
    }

    /// Create a claim template. Operator only.
    ///
    /// Ids are sequential starting at 1 and never reused.
    ///
    /// # Errors
    /// - `InvalidRate` if `rate <= 0`
    /// - `InvalidDuration` if `duration == 0` or `deadline + duration` overflows
    /// - `InvalidDeadline` if `deadline` is not after the current ledger time
    ///
    /// # Events
    /// - `("created", id)` → `DropEvent::ClaimCreated(template)`
    pub fn add_claim(
        env: Env,
        token: Address,
        rate: i128,
        duration: u64,
        deadline: u64,
    ) -> Result<u64, DropError> {
        get_config(&env).admin.require_auth();
        let template = registry::create(&env, token, rate, duration, deadline)?;
        extend_instance_ttl(&env);
        Ok(template.id)
    }

    pub fn get_claim(env: Env, claim_id: u64) -> Result<ClaimTemplate, DropError> {
        registry::load(&env, claim_id)
    }

    /// Number of templates created so far, which is also the latest id.
    pub fn claim_count(env: Env) -> u64 {
        registry::claim_count(&env)
    }

    /// Entitle `recipient` to activate template `claim_id`. Operator only.
    ///
    /// Granting the same template to the same address again is a no-op.
    ///
    /// # Errors
    /// - `NotAllowListPolicy` under the conditional policy
    /// - `ClaimNotFound` if the template does not exist
    /// - `AlreadyGranted` if `recipient` holds a different template
    ///
    /// # Events
    /// - `("granted", recipient)` → `DropEvent::UserClaimAdded`
    pub fn add_user_claim(env: Env, recipient: Address, claim_id: u64) -> Result<(), DropError> {
        let config = get_config(&env);
        config.admin.require_auth();
        eligibility::grant(&env, &config.policy, &recipient, claim_id)?;
        Ok(())
    }

    /// Grant a list of entitlements in one transaction. Operator only.
    ///
    /// Entries identical to an existing grant (or to an earlier entry in the
    /// list) are skipped. Any failing entry reverts the whole batch.
    ///
    /// # Returns
    /// - Number of entitlements newly granted
    pub fn add_user_claims(env: Env, entries: Vec<UserClaim>) -> Result<u32, DropError> {
        let config = get_config(&env);
        config.admin.require_auth();

        let mut granted = 0u32;
        for entry in entries.iter() {
            if eligibility::grant(&env, &config.policy, &entry.recipient, entry.claim_id)? {
                granted += 1;
            }
        }
        Ok(granted)
    }

    pub fn get_user_claim(env: Env, recipient: Address) -> Option<u64> {
        eligibility::load_user_claim(&env, &recipient)
    }

    /// Whether `recipient` could activate a water drop under the current
    /// policy, ignoring whether it already has.
    pub fn is_eligible(env: Env, recipient: Address) -> bool {
        eligibility::is_eligible(&env, &get_config(&env).policy, &recipient)
    }

    /// Activate the caller's water drop.
    ///
    /// Opens a flow of the template's rate from this contract to `claimant`
    /// and queues it to close `duration` seconds from now.
    ///
    /// # Authorization
    /// - Requires authorization from `claimant`
    ///
    /// # Errors
    /// - `AlreadyClaimed` if `claimant` has activated before, even if that
    ///   drop has since been closed
    /// - `Ineligible` if there is no entitlement or the qualifying stream is missing
    /// - `ClaimNotFound` if the entitled template does not exist
    /// - `ClaimExpired` if the template's deadline has passed
    ///
    /// # Events
    /// - `("claimed", claimant)` → `DropEvent::Claimed(activation)`
    ///
    /// # Usage Notes
    /// - Atomic: if opening the flow fails, nothing is queued or recorded
    pub fn claim(env: Env, claimant: Address) -> Result<(), DropError> {
        claimant.require_auth();
        let config = get_config(&env);

        if load_activation(&env, &claimant).is_some() {
            return Err(DropError::AlreadyClaimed);
        }

        let entitlements = config.policy.entitlements();
        let claim_id = entitlements.claim_id(&env, &claimant)?;
        let template = registry::load(&env, claim_id)?;

        let now = env.ledger().timestamp();
        if !template.is_open(now) {
            return Err(DropError::ClaimExpired);
        }
        if !entitlements.qualifies(&env, &claimant) {
            return Err(DropError::Ineligible);
        }

        let close_at = now
            .checked_add(template.duration)
            .expect("overflow calculating close time");

        // Only queue and record AFTER the flow is open
        flow_client(&env, &config).open_flow(
            &env.current_contract_address(),
            &claimant,
            &template.token,
            &template.rate,
        );

        ClosureQueue::load(&env).enqueue(claimant.clone(), close_at);

        let activation = Activation {
            recipient: claimant.clone(),
            claim_id,
            token: template.token,
            rate: template.rate,
            activated_at: now,
            close_at,
            status: ClaimStatus::Activated,
        };
        save_activation(&env, &activation);
        extend_instance_ttl(&env);

        log!(&env, "water drop claimed", claimant.clone(), claim_id);
        env.events().publish(
            (symbol_short!("claimed"), claimant),
            DropEvent::Claimed(activation),
        );
        Ok(())
    }

    /// Close the flow at the head of the closure queue. Callable by anyone.
    ///
    /// Entries leave strictly in activation order; a later entry with an
    /// earlier close time still waits behind the head.
    ///
    /// # Returns
    /// - The entry that was closed
    ///
    /// # Errors
    /// - `QueueEmpty` if nothing is queued
    /// - `NotReadyToClose` if the head's close time has not been reached;
    ///   the queue is left untouched, so keepers simply retry later
    ///
    /// # Events
    /// - `("closed", recipient)` → `DropEvent::StreamClosed`
    pub fn close_next(env: Env) -> Result<ClosureEntry, DropError> {
        let config = get_config(&env);
        let mut queue = ClosureQueue::load(&env);

        let head = queue.peek_head().ok_or(DropError::QueueEmpty)?;
        if env.ledger().timestamp() < head.close_at {
            log!(&env, "not ready to close", head.recipient.clone(), head.close_at);
            return Err(DropError::NotReadyToClose);
        }

        let activation = load_activation(&env, &head.recipient)
            .expect("queued recipient has no activation record");
        let closed = close_activation(&env, &config, activation);
        let entry = queue.pop_head();
        extend_instance_ttl(&env);

        env.events().publish(
            (symbol_short!("closed"), entry.recipient.clone()),
            DropEvent::StreamClosed(closed),
        );
        Ok(entry)
    }

    /// Current head of the closure queue, if any.
    pub fn peek_next(env: Env) -> Option<ClosureEntry> {
        ClosureQueue::load(&env).peek_head()
    }

    pub fn queue_len(env: Env) -> u32 {
        ClosureQueue::load(&env).len()
    }

    pub fn get_status(env: Env, recipient: Address) -> ClaimStatus {
        load_activation(&env, &recipient)
            .map(|activation| activation.status)
            .unwrap_or(ClaimStatus::NeverActivated)
    }

    pub fn get_activation(env: Env, recipient: Address) -> Option<Activation> {
        load_activation(&env, &recipient)
    }

    /// Flow from this contract to `recipient` in `token`, as reported by the
    /// flow agreement. Reads zero rate once the drop has been closed.
    pub fn get_flow(env: Env, recipient: Address, token: Address) -> FlowInfo {
        let config = get_config(&env);
        flow_client(&env, &config).get_flow(&env.current_contract_address(), &recipient, &token)
    }

    pub fn get_config(env: Env) -> Config {
        get_config(&env)
    }

    /// Hand the operator role to `new_admin`. Current admin only.
    ///
    /// # Events
    /// - `("admin", "updated")` → `(old_admin, new_admin)`
    pub fn set_admin(env: Env, new_admin: Address) {
        let mut config = get_config(&env);
        let old_admin = config.admin.clone();
        old_admin.require_auth();

        config.admin = new_admin.clone();
        env.storage().instance().set(&DataKey::Config, &config);
        extend_instance_ttl(&env);

        env.events().publish(
            (symbol_short!("admin"), symbol_short!("updated")),
            (old_admin, new_admin),
        );
    }
}

#[contractimpl]
impl WaterDrop {
    /// Force-close `recipient`'s flow out of queue order. Operator only.
    ///
    /// Removes exactly that recipient's queue entry; the remaining entries keep
    /// their order. The recipient ends `Closed` and cannot claim again.
    ///
    /// # Errors
    /// - `NotActive` if `recipient` has no open water drop
    ///
    /// # Events
    /// - `("emclosed", recipient)` → `DropEvent::EmergencyClosed`
    pub fn emergency_close(env: Env, recipient: Address) -> Result<(), DropError> {
        let config = get_config(&env);
        config.admin.require_auth();
        emergency::close(&env, &config, &recipient)?;
        extend_instance_ttl(&env);
        Ok(())
    }

    /// Sweep this contract's entire `token` balance to the operator. Operator only.
    ///
    /// Open flows and the closure queue are left as they are.
    ///
    /// # Errors
    /// - `NothingToDrain` if the balance is zero
    ///
    /// # Events
    /// - `("drained", token)` → `DropEvent::Drained`
    pub fn emergency_drain(env: Env, token: Address) -> Result<i128, DropError> {
        let config = get_config(&env);
        config.admin.require_auth();
        emergency::drain(&env, &config, token)
    }
}

#[cfg(test)]
mod testutils;
