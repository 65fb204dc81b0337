use thiserror::Error;

/// Precondition violations rejected at the proposal slot boundary.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ProposalError {
    #[error("urgency must be finite, got {0}")]
    NonFiniteUrgency(f32),
    #[error("urgency must be within [0.0, 1.0], got {0}")]
    UrgencyOutOfRange(f32),
}
