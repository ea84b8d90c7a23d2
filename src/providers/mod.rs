pub mod http;
pub mod ollama;
pub mod openai_compat;

use async_trait::async_trait;

use crate::types::{GenerateRequest, ModelClass};

/// A language-model backend, local or remote. Providers are long-lived and
/// reused across calls; the router owns selection and fallback, a provider
/// only executes its own call.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Stable identifier reported in `GenerationResult.provider` and in
    /// observability events ("local", "groq", ...).
    fn name(&self) -> &str;

    fn model_id(&self, class: ModelClass) -> &str;

    /// Cheap readiness check. Local providers probe their endpoint; remote
    /// providers report whether they are configured at all.
    async fn is_available(&self) -> bool;

    async fn generate(&self, req: &GenerateRequest) -> anyhow::Result<String>;
}
