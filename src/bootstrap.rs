use std::sync::Arc;
use std::time::Duration;

use crate::access::permissions::{AutoGrantConsent, ConsentProvider};
use crate::access::AccessController;
use crate::capability::host::NullSpeech;
use crate::capability::{CapabilitySet, SpeechSynthesis};
use crate::config::Config;
use crate::dispatch::CapabilityDispatcher;
use crate::events::{EventSink, JsonlFileSink, MultiSink, StdoutSink};
use crate::intent::IntentResolver;
use crate::pipeline::CommandPipeline;
use crate::providers::http::HttpConfig;
use crate::providers::ollama::OllamaProvider;
use crate::providers::openai_compat::OpenAiCompatProvider;
use crate::providers::ModelProvider;
use crate::router::{HttpProbe, ProviderRouter, Reachability};

/// Everything this core consumes but does not own. Swappable wholesale in
/// tests; `host()` wires the adapters a bare host can provide.
pub struct Collaborators {
    pub caps: CapabilitySet,
    pub consent: Box<dyn ConsentProvider>,
    pub speech: Arc<dyn SpeechSynthesis>,
    pub probe: Arc<dyn Reachability>,
}

impl Collaborators {
    pub fn host() -> Self {
        Self {
            caps: CapabilitySet::host(),
            consent: Box::new(AutoGrantConsent),
            speech: Arc::new(NullSpeech),
            probe: Arc::new(HttpProbe::new()),
        }
    }
}

/// The constructed system. Components are built once here and passed by
/// reference; there are no global get-or-create accessors anywhere in the
/// crate, so initialization order is explicit and resettable state is
/// whatever the owner drops.
pub struct Assistant {
    pub pipeline: Arc<CommandPipeline>,
    pub router: Arc<ProviderRouter>,
    pub access: Arc<AccessController>,
}

pub fn build_events(config: &Config) -> anyhow::Result<Arc<dyn EventSink>> {
    let mut sinks = MultiSink::new();
    sinks.push(Box::new(StdoutSink::new()));
    if let Some(path) = &config.events.file {
        sinks.push(Box::new(JsonlFileSink::new(path)?));
    }
    Ok(Arc::new(sinks))
}

pub fn build_local_provider(config: &Config) -> anyhow::Result<Arc<dyn ModelProvider>> {
    let http = HttpConfig::default()
        .with_request_timeout(Duration::from_secs(config.local.timeout_secs));
    Ok(Arc::new(OllamaProvider::new(
        config.local.base_url.clone(),
        config.local.model.clone(),
        config.local.code_model.clone(),
        http,
    )?))
}

pub fn build_remote_providers(config: &Config) -> anyhow::Result<Vec<Arc<dyn ModelProvider>>> {
    let http = HttpConfig::default()
        .with_request_timeout(Duration::from_secs(config.remote.timeout_secs));
    let mut remotes: Vec<Arc<dyn ModelProvider>> = Vec::new();
    for remote in config.enabled_remotes() {
        remotes.push(Arc::new(OpenAiCompatProvider::new(
            remote.name.clone(),
            remote.base_url.clone(),
            remote.api_key.clone(),
            remote.model.clone(),
            http,
        )?));
    }
    Ok(remotes)
}

/// The composition root.
pub fn build(
    config: &Config,
    collaborators: Collaborators,
    events: Arc<dyn EventSink>,
) -> anyhow::Result<Assistant> {
    let router = Arc::new(ProviderRouter::new(
        build_local_provider(config)?,
        build_remote_providers(config)?,
        collaborators.probe,
        events.clone(),
        config,
    ));
    let access = Arc::new(AccessController::new(
        config,
        collaborators.consent,
        events.clone(),
    )?);
    let resolver = IntentResolver::new(router.clone(), events.clone());
    let dispatcher = CapabilityDispatcher::new(
        collaborators.caps,
        access.clone(),
        router.clone(),
        events.clone(),
    );
    let pipeline = Arc::new(CommandPipeline::new(
        resolver,
        dispatcher,
        collaborators.speech,
        events,
    ));
    Ok(Assistant {
        pipeline,
        router,
        access,
    })
}
