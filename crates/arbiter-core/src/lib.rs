//! Subsumption arbiter for an embodied game agent.
//!
//! A fast reactive layer and a slow deliberative layer each drop their latest suggestion into a
//! single-item slot; a fixed-rate tick takes both slots and sends exactly one winner (or nothing)
//! to the body. Deliberation is requested through an escalation queue.

pub mod channel;
pub mod config;
pub mod engine;
pub mod error;
pub mod escalation;
pub mod harness;
pub mod llm;
pub mod markers;
pub mod proposal;
pub mod slot;

pub use channel::ActionChannel;
pub use config::{AgentConfig, ArbiterConfig, DeliberationConfig};
pub use engine::{Arbiter, Dispatch, resolve};
pub use error::ProposalError;
pub use escalation::{EscalationQueue, EscalationRequest};
pub use harness::{
    DeliberativeLayer, Harness, HarnessStats, Layers, ReactiveLayer, ReactiveStats, Stimulus,
    StimulusEvent, TickerStats,
};
pub use llm::LlamaDeliberator;
pub use markers::ContextMarkers;
pub use proposal::{Layer, Plan, Proposal};
pub use slot::{PlanSlot, ProposalSlot, SubmitOutcome};
