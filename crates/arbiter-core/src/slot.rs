//! Single-item mailboxes shared between a producer task and the tick task.
//!
//! Every operation holds the slot's lock only long enough to move one value in or out, so
//! callers never wait on I/O or on another slot.

use parking_lot::Mutex;

use crate::error::ProposalError;
use crate::proposal::{Plan, Proposal};

/// What a proposal submission did to the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The proposal is now held (slot was empty or the new urgency was strictly higher).
    Stored,
    /// The incumbent was at least as urgent; the submission was dropped.
    Kept,
}

/// Holds the most urgent pending reflex.
#[derive(Debug, Default)]
pub struct ProposalSlot {
    held: Mutex<Option<Proposal>>,
}

impl ProposalSlot {
    /// Keeps the highest-urgency proposal. Ties favor the one already held.
    pub fn submit(&self, proposal: Proposal) -> Result<SubmitOutcome, ProposalError> {
        proposal.validate()?;

        let mut held = self.held.lock();
        let replace = match held.as_ref() {
            None => true,
            Some(current) => proposal.urgency > current.urgency,
        };
        if !replace {
            return Ok(SubmitOutcome::Kept);
        }
        *held = Some(proposal);
        Ok(SubmitOutcome::Stored)
    }

    pub fn take(&self) -> Option<Proposal> {
        self.held.lock().take()
    }

    pub fn is_empty(&self) -> bool {
        self.held.lock().is_none()
    }
}

/// Holds the newest pending plan.
#[derive(Debug, Default)]
pub struct PlanSlot {
    held: Mutex<Option<Plan>>,
}

impl PlanSlot {
    /// Unconditional replace. Returns the stale plan that was never dispatched, if any.
    pub fn submit(&self, plan: Plan) -> Option<Plan> {
        self.held.lock().replace(plan)
    }

    pub fn take(&self) -> Option<Plan> {
        self.held.lock().take()
    }

    pub fn is_empty(&self) -> bool {
        self.held.lock().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reflex(action: &str, urgency: f32) -> Proposal {
        Proposal::tactic(action, urgency)
    }

    #[test]
    fn lower_urgency_does_not_replace() -> anyhow::Result<()> {
        let slot = ProposalSlot::default();
        assert_eq!(slot.submit(reflex("a", 0.3))?, SubmitOutcome::Stored);
        assert_eq!(slot.submit(reflex("b", 0.2))?, SubmitOutcome::Kept);
        assert_eq!(slot.take().map(|p| p.action), Some("a".to_string()));
        Ok(())
    }

    #[test]
    fn higher_urgency_replaces() -> anyhow::Result<()> {
        let slot = ProposalSlot::default();
        slot.submit(reflex("a", 0.3))?;
        assert_eq!(slot.submit(reflex("b", 0.5))?, SubmitOutcome::Stored);
        assert_eq!(slot.take().map(|p| p.action), Some("b".to_string()));
        Ok(())
    }

    #[test]
    fn equal_urgency_keeps_incumbent() -> anyhow::Result<()> {
        let slot = ProposalSlot::default();
        slot.submit(reflex("first", 0.5))?;
        assert_eq!(slot.submit(reflex("second", 0.5))?, SubmitOutcome::Kept);
        assert_eq!(slot.take().map(|p| p.action), Some("first".to_string()));
        Ok(())
    }

    #[test]
    fn invalid_urgency_leaves_slot_untouched() -> anyhow::Result<()> {
        let slot = ProposalSlot::default();
        slot.submit(reflex("a", 0.1))?;
        assert!(slot.submit(reflex("b", 2.0)).is_err());
        assert!(slot.submit(reflex("c", f32::NAN)).is_err());
        assert_eq!(slot.take().map(|p| p.action), Some("a".to_string()));
        Ok(())
    }

    #[test]
    fn take_empties_the_slot() -> anyhow::Result<()> {
        let slot = ProposalSlot::default();
        slot.submit(reflex("a", 0.1))?;
        assert!(slot.take().is_some());
        assert!(slot.is_empty());
        assert!(slot.take().is_none());

        // An emptied slot accepts any valid urgency again.
        assert_eq!(slot.submit(reflex("b", 0.0))?, SubmitOutcome::Stored);
        Ok(())
    }

    #[test]
    fn plan_submit_replaces_and_returns_stale() {
        let slot = PlanSlot::default();
        assert!(slot.submit(Plan::new("A", "")).is_none());
        let stale = slot.submit(Plan::new("B", ""));
        assert_eq!(stale.map(|p| p.action), Some("A".to_string()));
        assert_eq!(slot.take().map(|p| p.action), Some("B".to_string()));
        assert!(slot.is_empty());
    }
}
