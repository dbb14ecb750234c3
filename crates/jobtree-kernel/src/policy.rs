//! [`PolicyMerger`] – combines a job's policy with new rules.
//!
//! The tree treats policy as an opaque [`PolicyHandle`]; how rules are
//! combined is up to the merger installed in the [`JobTree`].
//! [`BasicPolicyMerger`] is the reference implementation.
//!
//! [`JobTree`]: crate::tree::JobTree

use jobtree_types::{JobError, PolicyAction, PolicyHandle, PolicyMode, PolicyRule};

/// Number of conditions a [`BasicPolicyMerger`] handle can describe.
pub const POLICY_CONDITION_COUNT: u32 = 16;

const SLOT_BITS: u32 = 4;
const SLOT_MASK: u64 = 0xf;

/// Produces a new policy from an existing one plus a set of rules.
///
/// Called with the target job's lock held; implementations must not call
/// back into the tree.
pub trait PolicyMerger: Send + Sync {
    fn merge(
        &self,
        existing: PolicyHandle,
        mode: PolicyMode,
        rules: &[PolicyRule],
    ) -> Result<PolicyHandle, JobError>;
}

/// Packs one action per condition into the 64 bits of a handle, four bits
/// per condition.  A zero slot means "nothing set".
///
/// # Example
///
/// ```
/// use jobtree_kernel::policy::{BasicPolicyMerger, PolicyMerger};
/// use jobtree_types::{PolicyAction, PolicyHandle, PolicyMode, PolicyRule};
///
/// let merger = BasicPolicyMerger;
/// let rules = [PolicyRule { condition: 3, action: PolicyAction::Deny }];
/// let handle = merger.merge(PolicyHandle::EMPTY, PolicyMode::Absolute, &rules).unwrap();
///
/// assert_eq!(BasicPolicyMerger::action_for(handle, 3), Some(PolicyAction::Deny));
/// assert_eq!(BasicPolicyMerger::action_for(handle, 4), None);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicPolicyMerger;

impl BasicPolicyMerger {
    /// Decode the action stored for `condition`, if any.
    pub fn action_for(handle: PolicyHandle, condition: u32) -> Option<PolicyAction> {
        if condition >= POLICY_CONDITION_COUNT {
            return None;
        }
        decode((handle.bits() >> (condition * SLOT_BITS)) & SLOT_MASK)
    }
}

impl PolicyMerger for BasicPolicyMerger {
    fn merge(
        &self,
        existing: PolicyHandle,
        mode: PolicyMode,
        rules: &[PolicyRule],
    ) -> Result<PolicyHandle, JobError> {
        let mut bits = existing.bits();
        for rule in rules {
            if rule.condition >= POLICY_CONDITION_COUNT {
                return Err(JobError::InvalidArgs(format!(
                    "unknown policy condition {}",
                    rule.condition
                )));
            }
            let shift = rule.condition * SLOT_BITS;
            let current = (bits >> shift) & SLOT_MASK;
            let wanted = encode(rule.action);
            if current != 0 && current != wanted {
                match mode {
                    PolicyMode::Relative => continue,
                    PolicyMode::Absolute => {
                        return Err(JobError::AlreadyExists(format!(
                            "condition {} already has a different action",
                            rule.condition
                        )));
                    }
                }
            }
            bits = (bits & !(SLOT_MASK << shift)) | (wanted << shift);
        }
        Ok(PolicyHandle::from_bits(bits))
    }
}

fn encode(action: PolicyAction) -> u64 {
    match action {
        PolicyAction::Allow => 1,
        PolicyAction::Deny => 2,
        PolicyAction::AllowException => 3,
        PolicyAction::DenyException => 4,
        PolicyAction::Kill => 5,
    }
}

fn decode(slot: u64) -> Option<PolicyAction> {
    match slot {
        1 => Some(PolicyAction::Allow),
        2 => Some(PolicyAction::Deny),
        3 => Some(PolicyAction::AllowException),
        4 => Some(PolicyAction::DenyException),
        5 => Some(PolicyAction::Kill),
        _ => None,
    }
}
