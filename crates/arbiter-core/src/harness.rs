//! Task wiring around the [`Arbiter`]: reactive producer, deliberative consumer, stimulus
//! producers and the fixed-rate tick task.
//!
//! Tasks share nothing but the arbiter's slots and queue. Shutdown is one [`CancellationToken`]
//! handed to every task and checked at each loop boundary; an in-flight reaction or deliberation
//! is allowed to finish.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ArbiterConfig;
use crate::engine::{Arbiter, Dispatch};
use crate::escalation::EscalationRequest;
use crate::proposal::{Plan, Proposal};

/// One perception cycle of the fast layer.
pub trait ReactiveLayer: Send + Sync {
    /// `Ok(None)` means no percept was ready; the task backs off briefly.
    fn react<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<Proposal>>> + Send + 'a>>;
}

/// The slow layer answering one escalation.
pub trait DeliberativeLayer: Send + Sync {
    fn deliberate<'a>(
        &'a self,
        request: EscalationRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Plan>> + Send + 'a>>;
}

/// A periodic source of escalations (situation checks, external events).
pub trait Stimulus: Send + Sync {
    fn name(&self) -> &'static str;

    fn poll<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<StimulusEvent>>> + Send + 'a>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StimulusEvent {
    pub prompt: String,
    pub image_b64: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickerStats {
    pub ticks: u64,
    pub dispatched: u64,
    pub overrides: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReactiveStats {
    pub proposals: u64,
    pub rejected: u64,
    /// Cycles whose reaction took longer than the latency budget.
    pub budget_overruns: u64,
}

/// What the reactive and tick tasks report when joined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HarnessStats {
    pub reactive: ReactiveStats,
    pub ticker: TickerStats,
}

/// Sleeps for `dur` unless cancelled first. Returns true on cancellation.
async fn sleep_or_cancel(token: &CancellationToken, dur: Duration) -> bool {
    tokio::select! {
        _ = token.cancelled() => true,
        _ = tokio::time::sleep(dur) => false,
    }
}

pub async fn run_reactive(
    arbiter: Arc<Arbiter>,
    layer: Arc<dyn ReactiveLayer>,
    cfg: ArbiterConfig,
    token: CancellationToken,
) -> ReactiveStats {
    let mut stats = ReactiveStats::default();
    let budget = cfg.reactive_budget();
    info!("harness.reactive started");

    while !token.is_cancelled() {
        let started = Instant::now();
        let reacted = layer.react().await;
        let elapsed = started.elapsed();

        match reacted {
            Ok(Some(proposal)) => {
                stats.proposals += 1;
                if elapsed > budget {
                    stats.budget_overruns += 1;
                    warn!(
                        elapsed_ms = elapsed.as_millis() as u64,
                        budget_ms = budget.as_millis() as u64,
                        "harness.reactive over latency budget"
                    );
                }
                if let Err(err) = arbiter.submit_proposal(proposal) {
                    stats.rejected += 1;
                    warn!(error = %err, "harness.reactive proposal rejected");
                }
                tokio::task::yield_now().await;
            }
            Ok(None) => {
                if sleep_or_cancel(&token, cfg.reactive_idle()).await {
                    break;
                }
            }
            Err(err) => {
                warn!(error = %format!("{err:#}"), "harness.reactive cycle failed");
                if sleep_or_cancel(&token, cfg.reactive_idle()).await {
                    break;
                }
            }
        }
    }

    info!(
        proposals = stats.proposals,
        rejected = stats.rejected,
        budget_overruns = stats.budget_overruns,
        "harness.reactive stopped"
    );
    stats
}

pub async fn run_deliberative(
    arbiter: Arc<Arbiter>,
    layer: Arc<dyn DeliberativeLayer>,
    cfg: ArbiterConfig,
    token: CancellationToken,
) {
    info!("harness.deliberative started");

    while !token.is_cancelled() {
        let Some(request) = arbiter.next_escalation() else {
            if sleep_or_cancel(&token, cfg.deliberative_idle()).await {
                break;
            }
            continue;
        };

        let started = Instant::now();
        // Failures still produce a plan; the arbiter has no separate failure channel.
        let plan = match layer.deliberate(request).await {
            Ok(plan) => plan,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "harness.deliberative failed");
                Plan::degraded("deliberation_failed", format!("{err:#}"))
            }
        };
        debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            override_safety = plan.override_safety,
            "harness.deliberative plan ready"
        );
        arbiter.submit_plan(plan);
    }

    info!("harness.deliberative stopped");
}

pub async fn run_stimulus(
    arbiter: Arc<Arbiter>,
    stimulus: Arc<dyn Stimulus>,
    cfg: ArbiterConfig,
    token: CancellationToken,
) {
    let name = stimulus.name();
    info!(stimulus = name, "harness.stimulus started");

    if !sleep_or_cancel(&token, cfg.stimulus_warmup()).await {
        loop {
            match stimulus.poll().await {
                Ok(Some(event)) => {
                    arbiter.escalate(event.prompt, event.image_b64);
                    debug!(
                        stimulus = name,
                        pending = arbiter.pending_escalations(),
                        "harness.stimulus escalated"
                    );
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(stimulus = name, error = %format!("{err:#}"), "harness.stimulus failed")
                }
            }
            if sleep_or_cancel(&token, cfg.stimulus_interval()).await {
                break;
            }
        }
    }

    info!(stimulus = name, "harness.stimulus stopped");
}

/// Fixed-rate dispatch. The only deliberate wait in the system.
pub async fn run_ticker(
    arbiter: Arc<Arbiter>,
    cfg: ArbiterConfig,
    token: CancellationToken,
) -> TickerStats {
    let mut stats = TickerStats::default();
    let mut interval = tokio::time::interval(cfg.tick_period());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(tick_ms = cfg.tick_ms, "harness.ticker started");

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = interval.tick() => {
                stats.ticks += 1;
                let out = arbiter.dispatch_tick();
                if let Some(action) = out.action() {
                    stats.dispatched += 1;
                    debug!(tick = stats.ticks, %action, "harness.ticker dispatched");
                }
                if matches!(out, Dispatch::Override { .. }) {
                    stats.overrides += 1;
                }
            }
        }
    }

    info!(
        ticks = stats.ticks,
        dispatched = stats.dispatched,
        overrides = stats.overrides,
        "harness.ticker stopped"
    );
    stats
}

/// Collaborators driven by a [`Harness`].
pub struct Layers {
    pub reactive: Arc<dyn ReactiveLayer>,
    pub deliberative: Arc<dyn DeliberativeLayer>,
    pub stimuli: Vec<Arc<dyn Stimulus>>,
}

/// Owns the spawned tasks and the shared cancellation token.
pub struct Harness {
    token: CancellationToken,
    reactive: JoinHandle<ReactiveStats>,
    producers: Vec<JoinHandle<()>>,
    ticker: JoinHandle<TickerStats>,
}

impl Harness {
    pub fn spawn(
        arbiter: Arc<Arbiter>,
        layers: Layers,
        cfg: ArbiterConfig,
        token: CancellationToken,
    ) -> Self {
        let reactive = tokio::spawn(run_reactive(
            arbiter.clone(),
            layers.reactive,
            cfg.clone(),
            token.clone(),
        ));
        let mut producers = vec![tokio::spawn(run_deliberative(
            arbiter.clone(),
            layers.deliberative,
            cfg.clone(),
            token.clone(),
        ))];
        for stimulus in layers.stimuli {
            producers.push(tokio::spawn(run_stimulus(
                arbiter.clone(),
                stimulus,
                cfg.clone(),
                token.clone(),
            )));
        }
        let ticker = tokio::spawn(run_ticker(arbiter, cfg, token.clone()));

        Self {
            token,
            reactive,
            producers,
            ticker,
        }
    }

    /// Cancels every task, joins the producers, then the tick task.
    pub async fn shutdown(self) -> anyhow::Result<HarnessStats> {
        self.token.cancel();
        let reactive = self.reactive.await.context("join reactive task")?;
        for producer in self.producers {
            producer.await.context("join producer task")?;
        }
        let ticker = self.ticker.await.context("join tick task")?;
        Ok(HarnessStats { reactive, ticker })
    }

    /// Waits for external cancellation of the token, then shuts down.
    pub async fn run_until_cancelled(self) -> anyhow::Result<HarnessStats> {
        self.token.cancelled().await;
        self.shutdown().await
    }
}
