//! Transition Recorder: the audit trail written beside every commit.

use saga_core::{new_transition_id, Result, StateTransition, TransitionType, Version};
use saga_ledger::LedgerWrite;
use serde_json::Value;

/// Write the audit entry for `version` inside the commit's transaction.
///
/// Any failure here fails the enclosing transaction, so a version never
/// lands without its transition.
pub fn record<W: LedgerWrite + ?Sized>(
    tx: &mut W,
    version: &Version,
    from_state: Option<&Value>,
    transition_type: TransitionType,
    reason: &str,
) -> Result<StateTransition> {
    let transition = StateTransition {
        id: new_transition_id(),
        campaign_id: version.campaign_id.clone(),
        version_id: version.id.clone(),
        from_state: from_state.cloned(),
        to_state: version.content.clone(),
        transition_type,
        reason: reason.to_string(),
        created_at: version.created_at.clone(),
    };
    tx.insert_transition(&transition)?;
    Ok(transition)
}
