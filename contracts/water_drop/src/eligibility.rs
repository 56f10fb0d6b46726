use soroban_sdk::{contracttype, symbol_short, Address, Env};

use crate::flow::FlowAgreementClient;
use crate::{registry, DataKey, DropError, DropEvent, TTL_EXTEND_TO, TTL_THRESHOLD};

/// Qualifying stream a user must be sending before they may claim under the
/// conditional policy.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StreamCondition {
    /// Contract answering `get_flow` for the qualifying stream.
    pub oracle: Address,
    pub token: Address,
    /// Address the user must be streaming to.
    pub recipient: Address,
    pub min_rate: i128,
    /// Seconds the stream must have been running at the time of the claim.
    pub min_duration: u64,
    /// Template activated by every qualifying claimant.
    pub claim_id: u64,
}

/// How entitlements are decided, fixed at `init`.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EligibilityPolicy {
    /// Operator grants each address a template via `add_user_claim`.
    AllowList,
    Conditional(StreamCondition),
}

/// An address's permission to activate one template.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct UserClaim {
    pub recipient: Address,
    pub claim_id: u64,
}

/// Source of entitlements behind an [`EligibilityPolicy`].
pub(crate) trait Entitlements {
    /// Template `who` is entitled to, or `Ineligible` when there is none.
    fn claim_id(&self, env: &Env, who: &Address) -> Result<u64, DropError>;

    /// Whether the policy's own condition on `who` holds right now.
    fn qualifies(&self, env: &Env, who: &Address) -> bool;
}

pub(crate) struct AllowList;

impl Entitlements for AllowList {
    fn claim_id(&self, env: &Env, who: &Address) -> Result<u64, DropError> {
        load_user_claim(env, who).ok_or(DropError::Ineligible)
    }

    fn qualifies(&self, _env: &Env, _who: &Address) -> bool {
        true
    }
}

impl Entitlements for StreamCondition {
    fn claim_id(&self, _env: &Env, _who: &Address) -> Result<u64, DropError> {
        Ok(self.claim_id)
    }

    /// Fails closed: an oracle error or a missing stream means "no".
    fn qualifies(&self, env: &Env, who: &Address) -> bool {
        let oracle = FlowAgreementClient::new(env, &self.oracle);
        let flow = match oracle.try_get_flow(who, &self.recipient, &self.token) {
            Ok(Ok(flow)) => flow,
            _ => return false,
        };

        if flow.rate <= 0 || flow.rate < self.min_rate {
            return false;
        }

        let now = env.ledger().timestamp();
        now.saturating_sub(flow.last_update) >= self.min_duration
    }
}

impl EligibilityPolicy {
    pub(crate) fn entitlements(&self) -> &dyn Entitlements {
        match self {
            EligibilityPolicy::AllowList => &AllowList,
            EligibilityPolicy::Conditional(condition) => condition,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), DropError> {
        if let EligibilityPolicy::Conditional(condition) = self {
            if condition.min_rate <= 0 {
                return Err(DropError::InvalidRate);
            }
        }
        Ok(())
    }
}

/// True iff `who` holds an entitlement to a template that exists, is still
/// within its deadline, and the policy's condition holds.
pub(crate) fn is_eligible(env: &Env, policy: &EligibilityPolicy, who: &Address) -> bool {
    let entitlements = policy.entitlements();
    let Ok(claim_id) = entitlements.claim_id(env, who) else {
        return false;
    };
    match registry::load(env, claim_id) {
        Ok(template) if template.is_open(env.ledger().timestamp()) => {
            entitlements.qualifies(env, who)
        }
        _ => false,
    }
}

pub(crate) fn load_user_claim(env: &Env, who: &Address) -> Option<u64> {
    env.storage()
        .persistent()
        .get(&DataKey::UserClaim(who.clone()))
}

/// Record `recipient → claim_id`.
///
/// Returns `Ok(false)` without touching storage when the identical entitlement
/// already exists, so replaying a grant list is harmless.
pub(crate) fn grant(
    env: &Env,
    policy: &EligibilityPolicy,
    recipient: &Address,
    claim_id: u64,
) -> Result<bool, DropError> {
    if *policy != EligibilityPolicy::AllowList {
        return Err(DropError::NotAllowListPolicy);
    }
    if !registry::exists(env, claim_id) {
        return Err(DropError::ClaimNotFound);
    }

    match load_user_claim(env, recipient) {
        Some(existing) if existing == claim_id => return Ok(false),
        Some(_) => return Err(DropError::AlreadyGranted),
        None => {}
    }

    let key = DataKey::UserClaim(recipient.clone());
    env.storage().persistent().set(&key, &claim_id);
    env.storage()
        .persistent()
        .extend_ttl(&key, TTL_THRESHOLD, TTL_EXTEND_TO);

    env.events().publish(
        (symbol_short!("granted"), recipient.clone()),
        DropEvent::UserClaimAdded(UserClaim {
            recipient: recipient.clone(),
            claim_id,
        }),
    );

    Ok(true)
}
