use std::sync::Arc;

use tracing::{debug, info};

use crate::channel::ActionChannel;
use crate::error::ProposalError;
use crate::escalation::{EscalationQueue, EscalationRequest};
use crate::markers::ContextMarkers;
use crate::proposal::{Plan, Proposal};
use crate::slot::{PlanSlot, ProposalSlot, SubmitOutcome};

/// What one tick sent to the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Nothing pending; no action sent.
    Idle,
    /// The reflex won. `suppressed_plan` is set when a vetoing reflex discarded a ready plan.
    Reflex {
        action: String,
        suppressed_plan: bool,
    },
    /// The plan won over a non-vetoing reflex or an empty reflex slot.
    Plan { action: String },
    /// The plan explicitly overrode a vetoing reflex.
    Override { action: String },
}

impl Dispatch {
    pub fn action(&self) -> Option<&str> {
        match self {
            Dispatch::Idle => None,
            Dispatch::Reflex { action, .. }
            | Dispatch::Plan { action }
            | Dispatch::Override { action } => Some(action),
        }
    }
}

/// Subsumption policy over exactly the four (veto × override) combinations.
///
/// A vetoing reflex is bypassed only by a plan carrying `override_safety`; any ready plan
/// outranks a non-vetoing reflex.
pub fn resolve(reflex: Option<Proposal>, plan: Option<Plan>) -> Dispatch {
    match (reflex, plan) {
        (Some(reflex), plan) if reflex.vetoes_deliberation => match plan {
            Some(plan) if plan.override_safety => Dispatch::Override {
                action: plan.action,
            },
            plan => Dispatch::Reflex {
                action: reflex.action,
                suppressed_plan: plan.is_some(),
            },
        },
        (_, Some(plan)) => Dispatch::Plan {
            action: plan.action,
        },
        (Some(reflex), None) => Dispatch::Reflex {
            action: reflex.action,
            suppressed_plan: false,
        },
        (None, None) => Dispatch::Idle,
    }
}

/// Owns the reflex slot, plan slot and escalation queue, and drives the action channel.
///
/// Each container has its own lock, so a writer on one never stalls progress on another.
pub struct Arbiter {
    reflexes: ProposalSlot,
    plans: PlanSlot,
    escalations: EscalationQueue,
    markers: Arc<ContextMarkers>,
    channel: Arc<dyn ActionChannel>,
}

impl std::fmt::Debug for Arbiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arbiter")
            .field("reflexes", &self.reflexes)
            .field("plans", &self.plans)
            .field("escalations", &self.escalations)
            .field("markers", &self.markers)
            .finish_non_exhaustive()
    }
}

impl Arbiter {
    pub fn new(channel: Arc<dyn ActionChannel>) -> Self {
        Self::with_markers(channel, Arc::new(ContextMarkers::default()))
    }

    pub fn with_markers(channel: Arc<dyn ActionChannel>, markers: Arc<ContextMarkers>) -> Self {
        Self {
            reflexes: ProposalSlot::default(),
            plans: PlanSlot::default(),
            escalations: EscalationQueue::default(),
            markers,
            channel,
        }
    }

    pub fn markers(&self) -> &Arc<ContextMarkers> {
        &self.markers
    }

    /// Called from the reactive task.
    pub fn submit_proposal(&self, proposal: Proposal) -> Result<SubmitOutcome, ProposalError> {
        self.reflexes.submit(proposal)
    }

    /// Called from the deliberative task.
    pub fn submit_plan(&self, plan: Plan) {
        if let Some(stale) = self.plans.submit(plan) {
            debug!(action = %stale.action, "arbiter.plan superseded before dispatch");
        }
    }

    /// Next job for the deliberative consumer, if any.
    pub fn next_escalation(&self) -> Option<EscalationRequest> {
        self.escalations.dequeue()
    }

    /// Escalations not yet picked up by the deliberative consumer.
    pub fn pending_escalations(&self) -> usize {
        self.escalations.len()
    }

    /// Queues a deliberation job with the current context-marker snapshot.
    pub fn escalate(&self, prompt: impl Into<String>, image_b64: Option<String>) {
        self.escalations.enqueue(EscalationRequest {
            prompt: prompt.into(),
            image_b64,
            context_markers: self.markers.snapshot(),
        });
    }

    /// Takes both slots, applies [`resolve`] and sends at most one action.
    pub fn dispatch_tick(&self) -> Dispatch {
        let reflex = self.reflexes.take();
        let plan = self.plans.take();

        let outcome = resolve(reflex, plan);
        match &outcome {
            Dispatch::Override { action } => {
                info!(%action, "arbiter.override accepted");
            }
            Dispatch::Reflex {
                action,
                suppressed_plan: true,
            } => {
                debug!(%action, "arbiter.veto plan discarded");
            }
            _ => {}
        }

        if let Some(action) = outcome.action() {
            self.channel.send(action);
        }
        outcome
    }

    pub fn is_quiescent(&self) -> bool {
        self.reflexes.is_empty() && self.plans.is_empty()
    }
}
