use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Context;
use arbiter_core::{
    AgentConfig, Arbiter, ContextMarkers, Harness, LlamaDeliberator, Layers, Stimulus,
    StimulusEvent,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod body;
mod reflexes;

use body::BodyLink;
use reflexes::SurvivalReflexes;

const SITUATION_PROMPT: &str =
    "Situation check: describe the current situation and suggest what we should do next.";

/// Periodically asks the deliberative layer to reassess, so plans keep flowing when nothing
/// else escalates.
struct SituationCheck;

impl Stimulus for SituationCheck {
    fn name(&self) -> &'static str {
        "situation_check"
    }

    fn poll<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<StimulusEvent>>> + Send + 'a>> {
        Box::pin(async move {
            Ok(Some(StimulusEvent {
                prompt: SITUATION_PROMPT.to_string(),
                image_b64: None,
            }))
        })
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cfg = AgentConfig::load("arbiter.toml")?;
    info!(body = %cfg.body_addr, soul = %cfg.deliberation.server_url, "runner.starting");

    let token = CancellationToken::new();
    let markers = Arc::new(ContextMarkers::with_limit(cfg.arbiter.marker_limit));

    let link = BodyLink::connect(&cfg.body_addr, token.clone()).await?;
    let arbiter = Arc::new(Arbiter::with_markers(
        Arc::new(link.actions.clone()),
        markers.clone(),
    ));

    let soul = Arc::new(LlamaDeliberator::new(cfg.deliberation.clone(), markers.clone())?);
    let readiness = tokio::spawn({
        let soul = soul.clone();
        let token = token.clone();
        async move {
            if !soul.wait_ready(&token).await {
                warn!("runner.soul not ready; escalations answered with idle plans");
            }
        }
    });

    let layers = Layers {
        reactive: Arc::new(SurvivalReflexes::new(link.percepts, markers)),
        deliberative: soul,
        stimuli: vec![Arc::new(SituationCheck)],
    };
    let harness = Harness::spawn(arbiter, layers, cfg.arbiter.clone(), token.clone());
    info!("runner.started");

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("listen for ctrl-c")?;
            info!("runner.interrupt");
        }
        _ = token.cancelled() => {}
    }

    let stats = harness.shutdown().await?;
    readiness.await.context("join readiness check")?;
    for task in link.tasks {
        task.await.context("join body link task")?;
    }
    info!(
        ticks = stats.ticker.ticks,
        dispatched = stats.ticker.dispatched,
        overrides = stats.ticker.overrides,
        budget_overruns = stats.reactive.budget_overruns,
        "runner.stopped"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn situation_check_always_escalates() -> anyhow::Result<()> {
        let event = SituationCheck.poll().await?;
        assert_eq!(
            event,
            Some(StimulusEvent {
                prompt: SITUATION_PROMPT.to_string(),
                image_b64: None,
            })
        );
        Ok(())
    }
}
