use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::config::{Config, RouterMode};
use crate::events::{Event, EventKind, EventSink};
use crate::providers::ModelProvider;
use crate::types::{GenerateRequest, GenerationResult, ModelClass};

/// Connectivity probe consumed by the router in auto mode.
#[async_trait]
pub trait Reachability: Send + Sync {
    async fn is_reachable(&self, url: &str, timeout: Duration) -> bool;
}

pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Reachability for HttpProbe {
    async fn is_reachable(&self, url: &str, timeout: Duration) -> bool {
        matches!(
            self.client.get(url).timeout(timeout).send().await,
            Ok(resp) if resp.status().is_success() || resp.status().is_redirection()
        )
    }
}

/// Derived per call, never stored.
#[derive(Debug, Clone)]
pub struct RoutingDecision {
    pub use_remote: bool,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct RouteOptions {
    pub task_type: Option<String>,
    pub force_local: bool,
    pub force_remote: bool,
}

impl RouteOptions {
    pub fn task(task_type: &str) -> Self {
        Self {
            task_type: Some(task_type.to_string()),
            ..Self::default()
        }
    }

    pub fn forced_local(task_type: &str) -> Self {
        Self {
            task_type: Some(task_type.to_string()),
            force_local: true,
            force_remote: false,
        }
    }
}

/// Selects a generation backend and executes with failover. Fallback is
/// two-tiered: remote providers are tried in priority order among
/// themselves, then the router crosses tiers (remote -> local or
/// local -> remote) exactly once.
pub struct ProviderRouter {
    local: Arc<dyn ModelProvider>,
    remotes: Vec<Arc<dyn ModelProvider>>,
    probe: Arc<dyn Reachability>,
    events: Arc<dyn EventSink>,
    mode: RouterMode,
    remote_tasks: Vec<String>,
    local_tasks: Vec<String>,
    long_prompt_threshold: usize,
    probe_url: String,
    probe_timeout: Duration,
    local_timeout: Duration,
    remote_timeout: Duration,
}

impl ProviderRouter {
    pub fn new(
        local: Arc<dyn ModelProvider>,
        remotes: Vec<Arc<dyn ModelProvider>>,
        probe: Arc<dyn Reachability>,
        events: Arc<dyn EventSink>,
        config: &Config,
    ) -> Self {
        Self {
            local,
            remotes,
            probe,
            events,
            mode: config.routing.mode,
            remote_tasks: config.routing.remote_tasks.clone(),
            local_tasks: config.routing.local_tasks.clone(),
            long_prompt_threshold: config.routing.long_prompt_threshold,
            probe_url: config.routing.probe_url.clone(),
            probe_timeout: Duration::from_secs(config.routing.probe_timeout_secs),
            local_timeout: Duration::from_secs(config.local.timeout_secs),
            remote_timeout: Duration::from_secs(config.remote.timeout_secs),
        }
    }

    pub fn local_provider(&self) -> &Arc<dyn ModelProvider> {
        &self.local
    }

    pub fn remote_providers(&self) -> &[Arc<dyn ModelProvider>] {
        &self.remotes
    }

    async fn has_available_remote(&self) -> bool {
        for remote in &self.remotes {
            if remote.is_available().await {
                return true;
            }
        }
        false
    }

    pub async fn probe_connectivity(&self) -> bool {
        self.probe
            .is_reachable(&self.probe_url, self.probe_timeout)
            .await
    }

    /// The selection ladder for one request. Force flags short-circuit;
    /// otherwise mode override, connectivity, remote availability,
    /// task-type preference, prompt length, default local, in that order.
    pub async fn decide(&self, opts: &RouteOptions, prompt_len: usize) -> RoutingDecision {
        if opts.force_local && opts.force_remote {
            return RoutingDecision {
                use_remote: false,
                reason: "contract violation: both force flags set, forcing local".to_string(),
            };
        }
        if opts.force_local {
            return RoutingDecision {
                use_remote: false,
                reason: "forced local".to_string(),
            };
        }
        if opts.force_remote {
            return RoutingDecision {
                use_remote: true,
                reason: "forced remote".to_string(),
            };
        }
        match self.mode {
            RouterMode::Local => {
                return RoutingDecision {
                    use_remote: false,
                    reason: "router mode is local".to_string(),
                }
            }
            RouterMode::Remote => {
                if self.has_available_remote().await && self.probe_connectivity().await {
                    return RoutingDecision {
                        use_remote: true,
                        reason: "router mode is remote".to_string(),
                    };
                }
                return RoutingDecision {
                    use_remote: false,
                    reason: "router mode is remote but no remote is usable".to_string(),
                };
            }
            RouterMode::Auto => {}
        }
        if !self.probe_connectivity().await {
            return RoutingDecision {
                use_remote: false,
                reason: "no connectivity, using local".to_string(),
            };
        }
        if !self.has_available_remote().await {
            return RoutingDecision {
                use_remote: false,
                reason: "no remote provider available, using local".to_string(),
            };
        }
        if let Some(task) = &opts.task_type {
            if self.remote_tasks.iter().any(|t| t == task) {
                return RoutingDecision {
                    use_remote: true,
                    reason: format!("task '{task}' prefers remote"),
                };
            }
            if self.local_tasks.iter().any(|t| t == task) {
                return RoutingDecision {
                    use_remote: false,
                    reason: format!("task '{task}' prefers local"),
                };
            }
        }
        if prompt_len > self.long_prompt_threshold {
            return RoutingDecision {
                use_remote: true,
                reason: format!("long prompt ({prompt_len} chars), remote has larger context"),
            };
        }
        RoutingDecision {
            use_remote: false,
            reason: "default local for quick tasks".to_string(),
        }
    }

    /// Execute one generation with selection and at most one cross-tier
    /// retry. Never returns `Err`: a both-tier failure is a
    /// `success=false` result carrying the last error.
    pub async fn route_generate(
        &self,
        req: GenerateRequest,
        opts: RouteOptions,
    ) -> GenerationResult {
        let decision = self.decide(&opts, req.prompt.chars().count()).await;

        if decision.use_remote {
            match self.try_remote_tier(&req).await {
                Ok(result) => result,
                Err(remote_err) => {
                    self.emit_fallback("remote", "local", &remote_err);
                    let reason = format!("remote provider failed: {remote_err}");
                    match self.try_one(&self.local, &req, self.local_timeout).await {
                        Ok(text) => GenerationResult::ok(text, self.local.name())
                            .via_fallback(&reason),
                        Err(local_err) => {
                            GenerationResult::failed(self.local.name(), local_err)
                                .via_fallback(&reason)
                        }
                    }
                }
            }
        } else {
            match self.try_one(&self.local, &req, self.local_timeout).await {
                Ok(text) => GenerationResult::ok(text, self.local.name()),
                Err(local_err) => {
                    // Forced-local calls never cross into the remote tier;
                    // a local failure is terminal for the request.
                    if opts.force_local || !self.has_available_remote().await {
                        return GenerationResult::failed(self.local.name(), local_err);
                    }
                    self.emit_fallback("local", "remote", &local_err);
                    let reason = format!("local provider failed: {local_err}");
                    match self.try_remote_tier(&req).await {
                        Ok(result) => result.via_fallback(&reason),
                        Err(remote_err) => GenerationResult::failed("remote", remote_err)
                            .via_fallback(&reason),
                    }
                }
            }
        }
    }

    /// Code generation is sized by prompt length: short prompts are a local
    /// quick task, long ones prefer the remote tier's quality.
    pub async fn generate_code(
        &self,
        prompt: &str,
        language: Option<&str>,
        max_tokens: u32,
    ) -> GenerationResult {
        let task_type = if prompt.chars().count() < 500 {
            "simple_code"
        } else {
            "complex_code"
        };
        let mut system = "You are an expert programmer. Generate clean, efficient code.".to_string();
        if let Some(lang) = language {
            system.push_str(&format!(" The language is {lang}."));
        }
        let mut req = GenerateRequest::new(prompt).with_system(system);
        req.max_tokens = max_tokens;
        req.temperature = 0.3;
        req.model_class = ModelClass::Code;
        self.route_generate(req, RouteOptions::task(task_type)).await
    }

    /// Remote tier: providers in priority order, first success wins.
    /// Returns the last error when every remote fails.
    async fn try_remote_tier(&self, req: &GenerateRequest) -> Result<GenerationResult, String> {
        let mut last_err = "no remote provider configured".to_string();
        for remote in &self.remotes {
            if !remote.is_available().await {
                continue;
            }
            match self.try_one(remote, req, self.remote_timeout).await {
                Ok(text) => return Ok(GenerationResult::ok(text, remote.name())),
                Err(e) => last_err = format!("{}: {e}", remote.name()),
            }
        }
        Err(last_err)
    }

    /// One provider call under its tier timeout, reported to the
    /// observability sink whether it succeeds or fails.
    async fn try_one(
        &self,
        provider: &Arc<dyn ModelProvider>,
        req: &GenerateRequest,
        timeout: Duration,
    ) -> Result<String, String> {
        let outcome = match tokio::time::timeout(timeout, provider.generate(req)).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("timed out after {}s", timeout.as_secs())),
        };
        self.events.emit(Event::new(
            EventKind::ProviderAttempt,
            json!({
                "provider": provider.name(),
                "model": provider.model_id(req.model_class),
                "input_chars": req.prompt.chars().count(),
                "ok": outcome.is_ok(),
                "error": outcome.as_ref().err(),
            }),
        ));
        outcome
    }

    fn emit_fallback(&self, failed_tier: &str, next_tier: &str, error: &str) {
        self.events.emit(Event::new(
            EventKind::ProviderFallback,
            json!({
                "failed_tier": failed_tier,
                "next_tier": next_tier,
                "error": error,
            }),
        ));
    }
}
