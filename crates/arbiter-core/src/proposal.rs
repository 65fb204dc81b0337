use serde::{Deserialize, Serialize};

use crate::error::ProposalError;

/// Authority class of a reactive proposal.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Layer {
    /// Hard survival reflexes (flee, dodge).
    Avoid,
    /// Routine behavior (pathfind, eat).
    Tactic,
}

/// A reflex produced by the reactive layer once per perception cycle.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Proposal {
    pub layer: Layer,
    /// Serialized intent, opaque to the arbiter.
    pub action: String,
    /// 0.0 = low .. 1.0 = critical.
    pub urgency: f32,
    /// Wins over any plan unless the plan sets `override_safety`.
    #[serde(default)]
    pub vetoes_deliberation: bool,
}

impl Proposal {
    pub fn avoid(action: impl Into<String>, urgency: f32) -> Self {
        Self {
            layer: Layer::Avoid,
            action: action.into(),
            urgency,
            vetoes_deliberation: true,
        }
    }

    pub fn tactic(action: impl Into<String>, urgency: f32) -> Self {
        Self {
            layer: Layer::Tactic,
            action: action.into(),
            urgency,
            vetoes_deliberation: false,
        }
    }

    /// Checks the urgency precondition. Values are rejected, never clamped.
    pub fn validate(&self) -> Result<(), ProposalError> {
        if !self.urgency.is_finite() {
            return Err(ProposalError::NonFiniteUrgency(self.urgency));
        }
        if !(0.0..=1.0).contains(&self.urgency) {
            return Err(ProposalError::UrgencyOutOfRange(self.urgency));
        }
        Ok(())
    }
}

/// A deliberated plan produced in answer to one escalation.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct Plan {
    /// Serialized intent, opaque to the arbiter.
    pub action: String,
    /// Diagnostic only; never affects dispatch.
    #[serde(default)]
    pub reasoning: String,
    /// Explicit claim of authority over a vetoing reflex.
    #[serde(default)]
    pub override_safety: bool,
}

impl Plan {
    pub fn new(action: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            reasoning: reasoning.into(),
            override_safety: false,
        }
    }

    pub fn with_override(mut self) -> Self {
        self.override_safety = true;
        self
    }

    /// The plan a failed deliberation still submits: an idle action tagged with `reason`.
    pub fn degraded(reason: &str, reasoning: impl Into<String>) -> Self {
        let action = serde_json::json!({ "action": "idle", "reason": reason }).to_string();
        Self::new(action, reasoning)
    }
}
