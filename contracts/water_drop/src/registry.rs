use soroban_sdk::{contracttype, symbol_short, Address, Env};

use crate::{DataKey, DropError, DropEvent, TTL_EXTEND_TO, TTL_THRESHOLD};

/// Operator-defined terms of a water drop: which token streams, how fast, for
/// how long, and until when it can be claimed.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClaimTemplate {
    pub id: u64,
    pub token: Address,
    /// Units per second streamed to each claimant.
    pub rate: i128,
    /// Seconds a claimant's flow stays open before it is due to close.
    pub duration: u64,
    /// Last ledger timestamp at which the template can be claimed.
    pub deadline: u64,
}

impl ClaimTemplate {
    pub fn is_open(&self, now: u64) -> bool {
        now <= self.deadline
    }
}

/// Highest id issued so far; zero before the first template.
pub(crate) fn claim_count(env: &Env) -> u64 {
    env.storage()
        .instance()
        .get(&DataKey::LastClaimId)
        .unwrap_or(0u64)
}

pub(crate) fn load(env: &Env, claim_id: u64) -> Result<ClaimTemplate, DropError> {
    env.storage()
        .persistent()
        .get(&DataKey::Claim(claim_id))
        .ok_or(DropError::ClaimNotFound)
}

pub(crate) fn exists(env: &Env, claim_id: u64) -> bool {
    env.storage().persistent().has(&DataKey::Claim(claim_id))
}

fn validate(env: &Env, rate: i128, duration: u64, deadline: u64) -> Result<(), DropError> {
    if rate <= 0 {
        return Err(DropError::InvalidRate);
    }
    if duration == 0 {
        return Err(DropError::InvalidDuration);
    }
    if deadline <= env.ledger().timestamp() {
        return Err(DropError::InvalidDeadline);
    }
    // A claim at the deadline must still have a representable close time
    if deadline.checked_add(duration).is_none() {
        return Err(DropError::InvalidDuration);
    }
    Ok(())
}

/// Validate and store a new template under the next sequential id.
pub(crate) fn create(
    env: &Env,
    token: Address,
    rate: i128,
    duration: u64,
    deadline: u64,
) -> Result<ClaimTemplate, DropError> {
    validate(env, rate, duration, deadline)?;

    let id = claim_count(env)
        .checked_add(1)
        .expect("claim id space exhausted");

    let template = ClaimTemplate {
        id,
        token,
        rate,
        duration,
        deadline,
    };

    let key = DataKey::Claim(id);
    env.storage().persistent().set(&key, &template);
    env.storage()
        .persistent()
        .extend_ttl(&key, TTL_THRESHOLD, TTL_EXTEND_TO);
    env.storage().instance().set(&DataKey::LastClaimId, &id);

    env.events().publish(
        (symbol_short!("created"), id),
        DropEvent::ClaimCreated(template.clone()),
    );

    Ok(template)
}
