//! Newline-delimited JSON link to the body process: percepts in, actions out.

use anyhow::Context;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const PERCEPT_BACKLOG: usize = 64;

/// Symbolic percept streamed from the body.
#[derive(Debug, Clone, PartialEq)]
pub struct Percept {
    pub health: f32,
    pub food: f32,
    pub hostile_nearby: bool,
}

fn full_bar() -> f32 {
    20.0
}

#[derive(Deserialize)]
struct EntityWire {
    #[serde(default)]
    hostile: bool,
}

#[derive(Deserialize)]
struct PerceptWire {
    #[serde(default = "full_bar")]
    health: f32,
    #[serde(default = "full_bar")]
    food: f32,
    #[serde(default)]
    nearby_entities: Vec<EntityWire>,
}

pub fn parse_percept(line: &str) -> anyhow::Result<Percept> {
    let wire: PerceptWire = serde_json::from_str(line).context("invalid percept json")?;
    Ok(Percept {
        health: wire.health,
        food: wire.food,
        hostile_nearby: wire.nearby_entities.iter().any(|e| e.hostile),
    })
}

pub struct BodyLink {
    pub percepts: mpsc::Receiver<Percept>,
    pub actions: mpsc::UnboundedSender<String>,
    pub tasks: Vec<JoinHandle<()>>,
}

impl BodyLink {
    pub async fn connect(addr: &str, token: CancellationToken) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("connect body link {addr}"))?;
        let (read, write) = stream.into_split();
        info!(%addr, "body.connected");

        let (percept_tx, percepts) = mpsc::channel(PERCEPT_BACKLOG);
        let (actions, action_rx) = mpsc::unbounded_channel();

        let tasks = vec![
            tokio::spawn(read_percepts(read, percept_tx, token.clone())),
            tokio::spawn(write_actions(write, action_rx, token)),
        ];
        Ok(Self {
            percepts,
            actions,
            tasks,
        })
    }
}

async fn read_percepts(read: OwnedReadHalf, tx: mpsc::Sender<Percept>, token: CancellationToken) {
    let mut lines = BufReader::new(read).lines();
    loop {
        let line = tokio::select! {
            _ = token.cancelled() => break,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match parse_percept(&line) {
                // Backlog full: drop.
                Ok(percept) => {
                    if tx.try_send(percept).is_err() {
                        debug!("body.percept dropped");
                    }
                }
                Err(err) => warn!(error = %format!("{err:#}"), "body.percept parse failed"),
            },
            Ok(None) => {
                info!("body.read closed");
                break;
            }
            Err(err) => {
                warn!(error = %err, "body.read failed");
                break;
            }
        }
    }
    // Body gone: stop the runner.
    token.cancel();
}

async fn write_actions(
    mut write: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<String>,
    token: CancellationToken,
) {
    loop {
        let action = tokio::select! {
            _ = token.cancelled() => break,
            action = rx.recv() => action,
        };
        let Some(action) = action else { break };

        let line = format!("{action}\n");
        if let Err(err) = write.write_all(line.as_bytes()).await {
            // Delivery failures are not reported back.
            warn!(error = %err, "body.write failed");
            continue;
        }
        debug!(%action, "body.action sent");
    }
    write.shutdown().await.ok();
}
