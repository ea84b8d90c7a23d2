pub mod host;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::types::ExecutionResult;

/// The capability traits below are consumed contracts: this crate
/// orchestrates them but does not own their implementations. Handlers
/// catch any `Err` at the dispatch boundary and normalize it into an
/// `ExecutionResult`.

#[async_trait]
pub trait AppLifecycle: Send + Sync {
    async fn open(&self, name: &str) -> anyhow::Result<ExecutionResult>;
    async fn close(&self, name: &str, force: bool) -> anyhow::Result<ExecutionResult>;
}

#[async_trait]
pub trait BrowserAutomation: Send + Sync {
    async fn search(&self, query: &str) -> anyhow::Result<ExecutionResult>;
    async fn open_url(&self, url: &str) -> anyhow::Result<ExecutionResult>;
    async fn navigate_video(&self, name: Option<&str>) -> anyhow::Result<ExecutionResult>;
}

#[async_trait]
pub trait InputInjection: Send + Sync {
    async fn type_text(&self, text: &str) -> anyhow::Result<ExecutionResult>;
    async fn click(&self, x: i64, y: i64) -> anyhow::Result<ExecutionResult>;
}

#[derive(Debug, Clone)]
pub struct ShellOutcome {
    pub stdout: String,
    pub stderr: String,
    pub code: i32,
}

#[async_trait]
pub trait ShellExecution: Send + Sync {
    async fn run(&self, command: &str, timeout: Duration) -> anyhow::Result<ShellOutcome>;
}

/// Power state, audio, display, window and clipboard operations plus
/// system metrics, mirroring what a desktop control layer exposes.
#[async_trait]
pub trait SystemControl: Send + Sync {
    async fn shutdown(&self, timeout_secs: i64) -> anyhow::Result<ExecutionResult>;
    async fn restart(&self, timeout_secs: i64) -> anyhow::Result<ExecutionResult>;
    async fn sleep(&self) -> anyhow::Result<ExecutionResult>;
    async fn lock(&self) -> anyhow::Result<ExecutionResult>;
    async fn logout(&self) -> anyhow::Result<ExecutionResult>;
    async fn set_volume(&self, level: i64) -> anyhow::Result<ExecutionResult>;
    async fn mute(&self) -> anyhow::Result<ExecutionResult>;
    async fn unmute(&self) -> anyhow::Result<ExecutionResult>;
    async fn set_brightness(&self, level: i64) -> anyhow::Result<ExecutionResult>;
    async fn minimize_window(&self) -> anyhow::Result<ExecutionResult>;
    async fn maximize_window(&self) -> anyhow::Result<ExecutionResult>;
    async fn close_window(&self) -> anyhow::Result<ExecutionResult>;
    async fn get_clipboard(&self) -> anyhow::Result<ExecutionResult>;
    async fn set_clipboard(&self, text: &str) -> anyhow::Result<ExecutionResult>;
    async fn system_info(&self) -> anyhow::Result<ExecutionResult>;
}

#[async_trait]
pub trait FileOps: Send + Sync {
    async fn create_file(&self, path: &str, content: &str) -> anyhow::Result<ExecutionResult>;
    async fn delete_file(&self, path: &str) -> anyhow::Result<ExecutionResult>;
    async fn list_directory(&self, path: &str) -> anyhow::Result<ExecutionResult>;
}

/// Speech output. `wait=false` must return immediately; the pipeline
/// relies on that to release the busy flag while still announcing.
pub trait SpeechSynthesis: Send + Sync {
    fn speak(&self, text: &str, wait: bool);
    fn enabled(&self) -> bool;
}

/// Everything the dispatcher can reach, bundled for injection.
#[derive(Clone)]
pub struct CapabilitySet {
    pub apps: Arc<dyn AppLifecycle>,
    pub browser: Arc<dyn BrowserAutomation>,
    pub input: Arc<dyn InputInjection>,
    pub shell: Arc<dyn ShellExecution>,
    pub system: Arc<dyn SystemControl>,
    pub files: Arc<dyn FileOps>,
}

impl CapabilitySet {
    /// Host wiring: real shell and file operations, unsupported adapters
    /// for the desktop-bound capabilities that need an automation layer
    /// this crate does not ship.
    pub fn host() -> Self {
        let desktop = Arc::new(host::UnsupportedDesktop);
        Self {
            apps: desktop.clone(),
            browser: desktop.clone(),
            input: desktop.clone(),
            shell: Arc::new(host::HostShell::default()),
            system: desktop,
            files: Arc::new(host::HostFiles),
        }
    }
}
