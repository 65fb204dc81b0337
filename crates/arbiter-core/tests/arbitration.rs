use std::sync::{Arc, Barrier};
use std::thread;

use arbiter_core::{Arbiter, Dispatch, Plan, PlanSlot, Proposal, ProposalSlot, SubmitOutcome};
use rand::Rng;
use rand::seq::SliceRandom;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

fn arbiter() -> (Arbiter, UnboundedReceiver<String>) {
    let (tx, rx) = unbounded_channel::<String>();
    (Arbiter::new(Arc::new(tx)), rx)
}

fn sent(rx: &mut UnboundedReceiver<String>) -> Vec<String> {
    let mut out = vec![];
    while let Ok(a) = rx.try_recv() {
        out.push(a);
    }
    out
}

#[test]
fn proposal_slot_keeps_highest_urgency() -> anyhow::Result<()> {
    let (arb, mut rx) = arbiter();

    arb.submit_proposal(Proposal::tactic("a", 0.3))?;
    arb.submit_proposal(Proposal::tactic("b", 0.2))?;
    arb.dispatch_tick();

    arb.submit_proposal(Proposal::tactic("c", 0.3))?;
    arb.submit_proposal(Proposal::tactic("d", 0.5))?;
    arb.dispatch_tick();

    arb.submit_proposal(Proposal::tactic("e", 0.5))?;
    assert_eq!(
        arb.submit_proposal(Proposal::tactic("f", 0.5))?,
        SubmitOutcome::Kept
    );
    arb.dispatch_tick();

    assert_eq!(sent(&mut rx), vec!["a", "d", "e"]);
    Ok(())
}

#[test]
fn newest_plan_always_wins_the_slot() {
    let (arb, mut rx) = arbiter();
    arb.submit_plan(Plan::new("A", ""));
    arb.submit_plan(Plan::new("B", ""));
    assert_eq!(arb.dispatch_tick(), Dispatch::Plan { action: "B".into() });
    assert_eq!(sent(&mut rx), vec!["B"]);
}

#[test]
fn veto_without_override_dispatches_reflex() -> anyhow::Result<()> {
    let (arb, mut rx) = arbiter();
    arb.submit_proposal(Proposal::avoid("flee", 0.9))?;
    arb.submit_plan(Plan::new("explore", ""));
    arb.dispatch_tick();
    assert_eq!(sent(&mut rx), vec!["flee"]);

    // The discarded plan does not resurface on the next tick.
    assert_eq!(arb.dispatch_tick(), Dispatch::Idle);
    Ok(())
}

#[test]
fn veto_with_override_dispatches_plan() -> anyhow::Result<()> {
    let (arb, mut rx) = arbiter();
    arb.submit_proposal(Proposal::avoid("flee", 0.9))?;
    arb.submit_plan(Plan::new("mine", "worth the risk").with_override());
    assert_eq!(
        arb.dispatch_tick(),
        Dispatch::Override {
            action: "mine".into()
        }
    );
    assert_eq!(sent(&mut rx), vec!["mine"]);
    Ok(())
}

#[test]
fn plan_outranks_routine_reflex() -> anyhow::Result<()> {
    let (arb, mut rx) = arbiter();
    arb.submit_proposal(Proposal::tactic("eat", 0.5))?;
    arb.submit_plan(Plan::new("build", ""));
    arb.dispatch_tick();
    assert_eq!(sent(&mut rx), vec!["build"]);
    Ok(())
}

#[test]
fn idle_tick_is_a_no_op() {
    let (arb, mut rx) = arbiter();
    assert_eq!(arb.dispatch_tick(), Dispatch::Idle);
    assert!(sent(&mut rx).is_empty());
    assert!(arb.is_quiescent());
}

#[test]
fn take_is_destructive_across_ticks() -> anyhow::Result<()> {
    let (arb, mut rx) = arbiter();
    arb.submit_proposal(Proposal::tactic("eat", 0.4))?;
    assert!(arb.dispatch_tick().action().is_some());
    assert_eq!(arb.dispatch_tick(), Dispatch::Idle);
    assert_eq!(sent(&mut rx), vec!["eat"]);
    Ok(())
}

#[test]
fn invalid_urgency_is_rejected_at_submit() {
    let (arb, _rx) = arbiter();
    assert!(arb.submit_proposal(Proposal::tactic("x", 1.01)).is_err());
    assert!(arb.submit_proposal(Proposal::tactic("x", f32::NAN)).is_err());
    assert!(arb.is_quiescent());
}

#[test]
fn concurrent_submits_leave_the_maximum() {
    let mut rng = rand::thread_rng();

    for _round in 0..50 {
        let n = rng.gen_range(2..32usize);
        let mut urgencies: Vec<u32> = (0..n as u32).collect();
        urgencies.shuffle(&mut rng);

        let slot = ProposalSlot::default();
        let barrier = Barrier::new(n);
        thread::scope(|s| {
            for &u in &urgencies {
                let slot = &slot;
                let barrier = &barrier;
                s.spawn(move || {
                    barrier.wait();
                    let urgency = u as f32 / 32.0;
                    let _ = slot.submit(Proposal::tactic(format!("p{u}"), urgency));
                });
            }
        });

        let held = slot.take().expect("one proposal held");
        assert_eq!(held.action, format!("p{}", n - 1));
        assert!(slot.is_empty());
    }
}

#[test]
fn concurrent_plan_writers_never_produce_torn_reads() {
    let slot = PlanSlot::default();
    let writers = 4;
    let per_writer = 500;

    thread::scope(|s| {
        for w in 0..writers {
            let slot = &slot;
            s.spawn(move || {
                for i in 0..per_writer {
                    let tag = format!("w{w}-{i}");
                    slot.submit(Plan::new(tag.clone(), tag));
                }
            });
        }

        let slot = &slot;
        s.spawn(move || {
            for _ in 0..(writers * per_writer) {
                if let Some(plan) = slot.take() {
                    assert_eq!(plan.action, plan.reasoning);
                }
            }
        });
    });
}
