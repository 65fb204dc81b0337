use std::fmt::Write;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DeliberationConfig;
use crate::escalation::EscalationRequest;
use crate::harness::DeliberativeLayer;
use crate::markers::ContextMarkers;
use crate::proposal::Plan;

pub const CONSULTED_MARKER: &str = "[MEM:SOUL_CONSULTED]";

const HEALTH_ATTEMPTS: u32 = 60;
const HEALTH_RETRY: Duration = Duration::from_millis(500);
const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Serialize)]
struct ImageData {
    data: String,
    id: u32,
}

#[derive(Serialize)]
struct CompletionRequest {
    prompt: String,
    n_predict: u32,
    temperature: f32,
    stop: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    image_data: Vec<ImageData>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct HealthResponse {
    #[serde(default)]
    status: String,
}

/// Chat-templated council prompt: safety, ethics and strategy reconciled into one action.
pub fn build_council_prompt(request: &EscalationRequest) -> String {
    let mut prompt = String::new();

    prompt.push_str("<|im_start|>system\n");
    prompt.push_str("You control an avatar in a game world.\n");
    prompt.push_str("Evaluate the situation as a council:\n");
    prompt.push_str("  1. Safety Officer: identify physical or ethical risks.\n");
    prompt.push_str("  2. Ethicist: weigh the moral dimensions.\n");
    prompt.push_str("  3. Strategist: propose an optimal plan.\n");
    prompt.push_str("  4. Synthesis: reconcile the above into a single action.\n");
    prompt.push_str(
        "Respond in JSON: {\"action\": ..., \"reasoning\": ..., \"override_safety\": false}\n",
    );
    prompt.push_str("<|im_end|>\n");

    if !request.context_markers.is_empty() {
        let _ = writeln!(
            prompt,
            "<|im_start|>user\n[MEMORY] {}<|im_end|>",
            request.context_markers
        );
    }

    let _ = writeln!(prompt, "<|im_start|>user\n{}<|im_end|>", request.prompt);

    if request.image_b64.is_some() {
        prompt.push_str(
            "<|im_start|>user\n<|vision_start|><|image_pad|><|vision_end|>Visual context attached.<|im_end|>\n",
        );
    }

    prompt.push_str("<|im_start|>assistant\n");
    prompt
}

/// Turns the model's `content` into a plan.
///
/// A JSON object is dispatched as-is; free text becomes an explore action with the text as
/// reasoning; a missing `content` is a degraded idle plan. Any other JSON (arrays, scalars,
/// ill-typed `reasoning`/`override_safety`) is degraded too, so only an object carrying a literal
/// `true` can set the override.
pub fn plan_from_content(content: Option<&str>) -> Plan {
    let Some(content) = content else {
        return Plan::degraded("bad_response", "Unexpected response from deliberation server.");
    };

    let Ok(value) = serde_json::from_str::<Value>(content) else {
        return Plan::new(
            serde_json::json!({ "action": "explore", "reason": "freeform_response" }).to_string(),
            content,
        );
    };
    let Value::Object(fields) = value else {
        return Plan::degraded("bad_response", content);
    };

    let reasoning = match fields.get("reasoning") {
        None => content.to_string(),
        Some(Value::String(text)) => text.clone(),
        Some(_) => return Plan::degraded("bad_response", content),
    };
    let override_safety = match fields.get("override_safety") {
        None => false,
        Some(Value::Bool(flag)) => *flag,
        Some(_) => return Plan::degraded("bad_response", content),
    };

    Plan {
        action: content.to_string(),
        reasoning,
        override_safety,
    }
}

/// Deliberation against a llama-server style `POST /completion` endpoint.
#[derive(Debug)]
pub struct LlamaDeliberator {
    client: Client,
    cfg: DeliberationConfig,
    markers: Arc<ContextMarkers>,
    connected: AtomicBool,
}

impl LlamaDeliberator {
    pub fn new(cfg: DeliberationConfig, markers: Arc<ContextMarkers>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("build deliberation http client")?;
        Ok(Self::with_client(client, cfg, markers))
    }

    pub fn with_client(
        client: Client,
        cfg: DeliberationConfig,
        markers: Arc<ContextMarkers>,
    ) -> Self {
        Self {
            client,
            cfg,
            markers,
            connected: AtomicBool::new(false),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.cfg.server_url.trim_end_matches('/'))
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn fetch_health(&self) -> reqwest::Result<HealthResponse> {
        self.client
            .get(self.endpoint("health"))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json::<HealthResponse>()
            .await
    }

    /// One `GET /health` probe. The server counts as ready only once it reports `"ok"`.
    pub async fn check_health(&self) -> bool {
        let ready = match self.fetch_health().await {
            Ok(health) if health.status == "ok" => true,
            Ok(health) => {
                debug!(status = %health.status, "llm.health not ready");
                false
            }
            Err(err) => {
                debug!(error = %err, "llm.health unreachable");
                false
            }
        };
        if ready {
            self.connected.store(true, Ordering::Release);
        }
        ready
    }

    /// Polls the health endpoint until the server is ready, the attempts run out, or the token is
    /// cancelled.
    pub async fn wait_ready(&self, token: &CancellationToken) -> bool {
        for attempt in 1..=HEALTH_ATTEMPTS {
            if self.check_health().await {
                info!(url = %self.cfg.server_url, attempt, "llm.connected");
                return true;
            }
            tokio::select! {
                _ = token.cancelled() => return false,
                _ = tokio::time::sleep(HEALTH_RETRY) => {}
            }
        }
        warn!(
            url = %self.cfg.server_url,
            attempts = HEALTH_ATTEMPTS,
            "llm.connect gave up; deliberation degrades until the server is ready"
        );
        false
    }

    pub async fn complete(&self, request: &EscalationRequest) -> anyhow::Result<Plan> {
        if !self.is_connected() && !self.check_health().await {
            return Ok(Plan::degraded(
                "soul_not_connected",
                "Cannot deliberate: deliberation server not ready.",
            ));
        }

        let body = CompletionRequest {
            prompt: build_council_prompt(request),
            n_predict: self.cfg.n_predict,
            temperature: self.cfg.temperature,
            stop: vec!["<|im_end|>".to_string()],
            image_data: request
                .image_b64
                .iter()
                .map(|data| ImageData {
                    data: data.clone(),
                    id: 0,
                })
                .collect(),
        };

        let text = self
            .client
            .post(self.endpoint("completion"))
            .json(&body)
            .send()
            .await
            .context("deliberation request failed")?
            .error_for_status()
            .context("deliberation non-2xx response")?
            .text()
            .await
            .context("deliberation response read failed")?;

        // Any completed round-trip counts as a consultation, unusable bodies included.
        let content = serde_json::from_str::<CompletionResponse>(&text)
            .ok()
            .and_then(|res| res.content);
        let plan = plan_from_content(content.as_deref());
        self.markers.tag(CONSULTED_MARKER);
        debug!(override_safety = plan.override_safety, "llm.deliberation complete");
        Ok(plan)
    }
}

impl DeliberativeLayer for LlamaDeliberator {
    fn deliberate<'a>(
        &'a self,
        request: EscalationRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Plan>> + Send + 'a>> {
        Box::pin(async move { self.complete(&request).await })
    }
}
