use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use arbiter_core::{ContextMarkers, Proposal, ReactiveLayer};
use serde_json::json;
use tokio::sync::Mutex;
use tokio::sync::mpsc;

use crate::body::Percept;

pub const NEAR_DEATH_MARKER: &str = "[MEM:NEAR_DEATH]";

const CRITICAL_HEALTH: f32 = 4.0;
const HUNGRY_FOOD: f32 = 6.0;

fn intent(action: &str, reason: &str) -> String {
    json!({ "action": action, "reason": reason }).to_string()
}

/// Hard-coded survival rules, checked in priority order.
pub fn react_to(percept: &Percept, markers: &ContextMarkers) -> Proposal {
    if percept.health < CRITICAL_HEALTH {
        markers.tag(NEAR_DEATH_MARKER);
        return Proposal::avoid(intent("flee", "critical_health"), 1.0);
    }
    if percept.hostile_nearby {
        return Proposal::avoid(intent("flee", "hostile_nearby"), 0.9);
    }
    if percept.food < HUNGRY_FOOD {
        return Proposal::tactic(intent("eat", "hungry"), 0.5);
    }
    Proposal::tactic(intent("idle", "no_threat"), 0.0)
}

/// Reactive layer fed by the body link's percept stream.
pub struct SurvivalReflexes {
    percepts: Mutex<mpsc::Receiver<Percept>>,
    markers: Arc<ContextMarkers>,
}

impl SurvivalReflexes {
    pub fn new(percepts: mpsc::Receiver<Percept>, markers: Arc<ContextMarkers>) -> Self {
        Self {
            percepts: Mutex::new(percepts),
            markers,
        }
    }
}

impl ReactiveLayer for SurvivalReflexes {
    fn react<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<Proposal>>> + Send + 'a>> {
        Box::pin(async move {
            let percept = self.percepts.lock().await.try_recv().ok();
            Ok(percept.map(|p| react_to(&p, &self.markers)))
        })
    }
}

#[cfg(test)]
mod tests {
    use arbiter_core::Layer;

    use super::*;

    fn percept(health: f32, food: f32, hostile_nearby: bool) -> Percept {
        Percept {
            health,
            food,
            hostile_nearby,
        }
    }

    #[test]
    fn critical_health_flees_with_veto_and_tags_memory() {
        let markers = ContextMarkers::default();
        let p = react_to(&percept(3.0, 20.0, true), &markers);
        assert_eq!(p.layer, Layer::Avoid);
        assert_eq!(p.urgency, 1.0);
        assert!(p.vetoes_deliberation);
        assert!(p.action.contains("critical_health"));
        assert_eq!(markers.snapshot(), NEAR_DEATH_MARKER);
    }

    #[test]
    fn hostile_flees_below_critical_urgency() {
        let markers = ContextMarkers::default();
        let p = react_to(&percept(15.0, 2.0, true), &markers);
        assert!(p.vetoes_deliberation);
        assert_eq!(p.urgency, 0.9);
        assert!(markers.is_empty());
    }

    #[test]
    fn hunger_is_routine() {
        let p = react_to(&percept(20.0, 5.0, false), &ContextMarkers::default());
        assert_eq!(p.layer, Layer::Tactic);
        assert!(!p.vetoes_deliberation);
        assert!(p.action.contains("\"eat\""));
    }

    #[test]
    fn calm_percept_idles_at_zero_urgency() {
        let p = react_to(&percept(20.0, 20.0, false), &ContextMarkers::default());
        assert_eq!(p.urgency, 0.0);
        assert!(p.action.contains("\"idle\""));
    }

    #[tokio::test]
    async fn empty_feed_yields_none() -> anyhow::Result<()> {
        let (tx, rx) = mpsc::channel(4);
        let reflexes = SurvivalReflexes::new(rx, Arc::new(ContextMarkers::default()));
        assert!(reflexes.react().await?.is_none());

        tx.send(percept(20.0, 1.0, false)).await?;
        let p = reflexes.react().await?;
        assert!(p.is_some_and(|p| p.action.contains("hungry")));
        Ok(())
    }
}
