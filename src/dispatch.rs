use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use time::macros::format_description;
use time::OffsetDateTime;

use crate::access::AccessController;
use crate::capability::CapabilitySet;
use crate::events::{Event, EventKind, EventSink};
use crate::router::{ProviderRouter, RouteOptions};
use crate::types::{ExecutionResult, GenerateRequest, Intent, IntentKind};

const DEFAULT_POWER_TIMEOUT_SECS: i64 = 30;
const DEFAULT_LEVEL: i64 = 50;
const DEFAULT_SHELL_TIMEOUT_SECS: i64 = 30;

/// Routes a resolved intent to exactly one handler and normalizes the
/// outcome. Nothing escapes this boundary: capability errors become
/// `success=false` results, sensitive handlers consult the access layer
/// before their capability, and a missing required entity fails without
/// invoking anything.
pub struct CapabilityDispatcher {
    caps: CapabilitySet,
    access: Arc<AccessController>,
    router: Arc<ProviderRouter>,
    events: Arc<dyn EventSink>,
}

impl CapabilityDispatcher {
    pub fn new(
        caps: CapabilitySet,
        access: Arc<AccessController>,
        router: Arc<ProviderRouter>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            caps,
            access,
            router,
            events,
        }
    }

    pub async fn dispatch(&self, intent: &Intent) -> ExecutionResult {
        self.events.emit(Event::new(
            EventKind::DispatchStart,
            json!({"kind": intent.kind.as_str()}),
        ));
        let result = self.dispatch_inner(intent).await;
        self.events.emit(Event::new(
            EventKind::DispatchEnd,
            json!({"kind": intent.kind.as_str(), "success": result.success}),
        ));
        result
    }

    async fn dispatch_inner(&self, intent: &Intent) -> ExecutionResult {
        match intent.kind {
            IntentKind::OpenApp => self.handle_open_app(intent).await,
            IntentKind::CloseApp => self.handle_close_app(intent).await,
            IntentKind::SearchWeb => self.handle_search_web(intent).await,
            IntentKind::OpenUrl => self.handle_open_url(intent).await,
            IntentKind::NavigateYoutube => {
                normalize(self.caps.browser.navigate_video(intent.entity_str("video_name")).await)
            }
            IntentKind::TypeText => self.handle_type_text(intent).await,
            IntentKind::Click => self.handle_click(intent).await,
            IntentKind::RunCommand => self.handle_run_command(intent).await,
            IntentKind::GenerateCode => self.handle_generate_code(intent).await,
            IntentKind::GetTime => handle_get_time(),
            IntentKind::GeneralQuery => self.handle_general_query(intent).await,
            IntentKind::SystemShutdown => {
                let timeout = intent
                    .entity_i64("timeout")
                    .unwrap_or(DEFAULT_POWER_TIMEOUT_SECS);
                normalize(self.caps.system.shutdown(timeout).await)
            }
            IntentKind::SystemRestart => {
                let timeout = intent
                    .entity_i64("timeout")
                    .unwrap_or(DEFAULT_POWER_TIMEOUT_SECS);
                normalize(self.caps.system.restart(timeout).await)
            }
            IntentKind::SystemSleep => normalize(self.caps.system.sleep().await),
            IntentKind::SystemLock => normalize(self.caps.system.lock().await),
            IntentKind::SystemLogout => normalize(self.caps.system.logout().await),
            IntentKind::SetVolume => {
                let level = intent.entity_i64("level").unwrap_or(DEFAULT_LEVEL);
                normalize(self.caps.system.set_volume(level).await)
            }
            IntentKind::MuteVolume => normalize(self.caps.system.mute().await),
            IntentKind::UnmuteVolume => normalize(self.caps.system.unmute().await),
            IntentKind::SetBrightness => {
                let level = intent.entity_i64("level").unwrap_or(DEFAULT_LEVEL);
                normalize(self.caps.system.set_brightness(level).await)
            }
            IntentKind::MinimizeWindow => normalize(self.caps.system.minimize_window().await),
            IntentKind::MaximizeWindow => normalize(self.caps.system.maximize_window().await),
            IntentKind::CloseWindow => normalize(self.caps.system.close_window().await),
            IntentKind::GetClipboard => normalize(self.caps.system.get_clipboard().await),
            IntentKind::SetClipboard => self.handle_set_clipboard(intent).await,
            IntentKind::CreateFile => self.handle_create_file(intent).await,
            IntentKind::DeleteFile => self.handle_delete_file(intent).await,
            IntentKind::ListDirectory => self.handle_list_directory(intent).await,
            IntentKind::GetSystemInfo => self.handle_get_system_info().await,
            IntentKind::Unknown => {
                ExecutionResult::fail(format!("Unknown intent: {}", intent.kind))
            }
        }
    }

    async fn handle_open_app(&self, intent: &Intent) -> ExecutionResult {
        let Some(app_name) = intent.entity_str("app_name") else {
            return ExecutionResult::fail("No app name provided");
        };
        if !self.access.check_and_request(app_name) {
            return ExecutionResult::fail(format!(
                "Permission denied to control '{app_name}'"
            ));
        }
        normalize(self.caps.apps.open(app_name).await)
    }

    /// Graceful close first; if that fails, one forceful retry before the
    /// handler reports final failure.
    async fn handle_close_app(&self, intent: &Intent) -> ExecutionResult {
        let Some(app_name) = intent.entity_str("app_name") else {
            return ExecutionResult::fail("No app name provided");
        };
        if !self.access.check_and_request(app_name) {
            return ExecutionResult::fail(format!(
                "Permission denied to control '{app_name}'"
            ));
        }
        let graceful = normalize(self.caps.apps.close(app_name, false).await);
        if graceful.success {
            return graceful;
        }
        normalize(self.caps.apps.close(app_name, true).await)
    }

    async fn handle_search_web(&self, intent: &Intent) -> ExecutionResult {
        let Some(query) = intent.entity_str("query") else {
            return ExecutionResult::fail("No search query provided");
        };
        normalize(self.caps.browser.search(query).await)
    }

    async fn handle_open_url(&self, intent: &Intent) -> ExecutionResult {
        let Some(url) = intent.entity_str("url") else {
            return ExecutionResult::fail("No URL provided");
        };
        normalize(self.caps.browser.open_url(url).await)
    }

    async fn handle_type_text(&self, intent: &Intent) -> ExecutionResult {
        let Some(text) = intent.entity_str("text") else {
            return ExecutionResult::fail("No text provided");
        };
        normalize(self.caps.input.type_text(text).await)
    }

    async fn handle_click(&self, intent: &Intent) -> ExecutionResult {
        let (Some(x), Some(y)) = (intent.entity_i64("x"), intent.entity_i64("y")) else {
            return ExecutionResult::fail("No click coordinates provided");
        };
        normalize(self.caps.input.click(x, y).await)
    }

    async fn handle_run_command(&self, intent: &Intent) -> ExecutionResult {
        let Some(command) = intent.entity_str("command") else {
            return ExecutionResult::fail("No command provided");
        };
        let verdict = self.access.can_execute_command(command);
        if !verdict.allowed {
            return ExecutionResult::fail(format!("Cannot run command: {}", verdict.reason));
        }
        let timeout = intent
            .entity_i64("timeout")
            .unwrap_or(DEFAULT_SHELL_TIMEOUT_SECS)
            .max(1) as u64;
        match self
            .caps
            .shell
            .run(command, Duration::from_secs(timeout))
            .await
        {
            Ok(outcome) => {
                if outcome.code == 0 {
                    let trimmed = outcome.stdout.trim();
                    let message = if trimmed.is_empty() {
                        "Command completed".to_string()
                    } else {
                        trimmed.to_string()
                    };
                    ExecutionResult::ok_with(
                        message,
                        json!({
                            "stdout": outcome.stdout,
                            "stderr": outcome.stderr,
                            "code": outcome.code,
                        }),
                    )
                } else {
                    let trimmed = outcome.stderr.trim();
                    let message = if trimmed.is_empty() {
                        format!("Command exited with code {}", outcome.code)
                    } else {
                        trimmed.to_string()
                    };
                    ExecutionResult::fail(message)
                }
            }
            Err(e) => ExecutionResult::fail(e.to_string()),
        }
    }

    async fn handle_generate_code(&self, intent: &Intent) -> ExecutionResult {
        let Some(prompt) = intent.entity_str("prompt") else {
            return ExecutionResult::fail("No code prompt provided");
        };
        let result = self
            .router
            .generate_code(prompt, intent.entity_str("language"), 4096)
            .await;
        if result.success {
            ExecutionResult::ok_with(
                "Code generated successfully",
                json!({"code": result.text}),
            )
        } else {
            ExecutionResult::fail(format!(
                "Code generation failed: {}",
                result.error.unwrap_or_else(|| "unknown error".to_string())
            ))
        }
    }

    async fn handle_general_query(&self, intent: &Intent) -> ExecutionResult {
        let Some(query) = intent.entity_str("query") else {
            return ExecutionResult::fail("No query provided");
        };
        let result = self
            .router
            .route_generate(
                GenerateRequest::new(query),
                RouteOptions::task("quick_command"),
            )
            .await;
        if result.success {
            ExecutionResult::ok_with(
                result.text.clone(),
                json!({"response": result.text}),
            )
        } else {
            ExecutionResult::fail("Failed to process query")
        }
    }

    async fn handle_set_clipboard(&self, intent: &Intent) -> ExecutionResult {
        let Some(text) = intent.entity_str("text") else {
            return ExecutionResult::fail("No text provided");
        };
        normalize(self.caps.system.set_clipboard(text).await)
    }

    async fn handle_create_file(&self, intent: &Intent) -> ExecutionResult {
        let Some(filepath) = intent.entity_str("filepath") else {
            return ExecutionResult::fail("No filepath provided");
        };
        let verdict = self.access.is_path_safe(Path::new(filepath));
        if !verdict.allowed {
            return ExecutionResult::fail(format!("Cannot create file: {}", verdict.reason));
        }
        let content = intent.entity_str("content").unwrap_or("");
        normalize(self.caps.files.create_file(filepath, content).await)
    }

    async fn handle_delete_file(&self, intent: &Intent) -> ExecutionResult {
        let Some(filepath) = intent.entity_str("filepath") else {
            return ExecutionResult::fail("No filepath provided");
        };
        let verdict = self.access.can_delete(Path::new(filepath));
        if !verdict.allowed {
            return ExecutionResult::fail(format!("Cannot delete file: {}", verdict.reason));
        }
        normalize(self.caps.files.delete_file(filepath).await)
    }

    async fn handle_list_directory(&self, intent: &Intent) -> ExecutionResult {
        let Some(dirpath) = intent.entity_str("dirpath") else {
            return ExecutionResult::fail("No directory path provided");
        };
        let verdict = self.access.is_path_safe(Path::new(dirpath));
        if !verdict.allowed {
            return ExecutionResult::fail(format!("Cannot list directory: {}", verdict.reason));
        }
        normalize(self.caps.files.list_directory(dirpath).await)
    }

    async fn handle_get_system_info(&self) -> ExecutionResult {
        let mut result = normalize(self.caps.system.system_info().await);
        if result.success {
            if let Some(data) = &result.data {
                result.message = format!(
                    "CPU: {}%, RAM: {}% ({}GB/{}GB), Disk: {}%",
                    data["cpu_percent"],
                    data["memory_percent"],
                    data["memory_used_gb"],
                    data["memory_total_gb"],
                    data["disk_percent"],
                );
            }
        }
        result
    }
}

/// An `Err` from a capability never crosses the dispatcher boundary.
fn normalize(result: anyhow::Result<ExecutionResult>) -> ExecutionResult {
    match result {
        Ok(res) => res,
        Err(e) => ExecutionResult::fail(e.to_string()),
    }
}

fn handle_get_time() -> ExecutionResult {
    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let time_fmt = format_description!("[hour repr:12]:[minute] [period]");
    let date_fmt = format_description!("[month repr:long] [day], [year]");
    let time_str = now.format(&time_fmt).unwrap_or_default();
    let date_str = now.format(&date_fmt).unwrap_or_default();
    ExecutionResult::ok_with(
        format!("It's {time_str} on {date_str}"),
        json!({"time": time_str, "date": date_str}),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::tempdir;

    use super::CapabilityDispatcher;
    use crate::access::permissions::ConsentProvider;
    use crate::access::AccessController;
    use crate::capability::host::{HostFiles, UnsupportedDesktop};
    use crate::capability::{
        AppLifecycle, BrowserAutomation, CapabilitySet, InputInjection, ShellExecution,
        ShellOutcome, SystemControl,
    };
    use crate::config::Config;
    use crate::events::NullSink;
    use crate::providers::ModelProvider;
    use crate::router::{ProviderRouter, Reachability};
    use crate::types::{
        ExecutionResult, GenerateRequest, Intent, IntentKind, IntentOrigin, ModelClass,
    };

    struct StaticConsent(bool);

    impl ConsentProvider for StaticConsent {
        fn decide(&self, _target_name: &str) -> bool {
            self.0
        }
    }

    struct FakeApps {
        open_calls: AtomicU32,
        close_calls: AtomicU32,
        graceful_close_fails: bool,
    }

    impl FakeApps {
        fn new(graceful_close_fails: bool) -> Arc<Self> {
            Arc::new(Self {
                open_calls: AtomicU32::new(0),
                close_calls: AtomicU32::new(0),
                graceful_close_fails,
            })
        }
    }

    #[async_trait]
    impl AppLifecycle for FakeApps {
        async fn open(&self, name: &str) -> anyhow::Result<ExecutionResult> {
            self.open_calls.fetch_add(1, Ordering::SeqCst);
            Ok(ExecutionResult::ok(format!("Successfully opened {name}")))
        }

        async fn close(&self, name: &str, force: bool) -> anyhow::Result<ExecutionResult> {
            self.close_calls.fetch_add(1, Ordering::SeqCst);
            if !force && self.graceful_close_fails {
                return Ok(ExecutionResult::fail(format!(
                    "{name} did not terminate in time"
                )));
            }
            Ok(ExecutionResult::ok(format!("Successfully closed {name}")))
        }
    }

    struct FakeBrowser;

    #[async_trait]
    impl BrowserAutomation for FakeBrowser {
        async fn search(&self, query: &str) -> anyhow::Result<ExecutionResult> {
            Ok(ExecutionResult::ok(format!("Searching for {query}")))
        }

        async fn open_url(&self, url: &str) -> anyhow::Result<ExecutionResult> {
            Ok(ExecutionResult::ok(format!("Opened {url}")))
        }

        async fn navigate_video(&self, _name: Option<&str>) -> anyhow::Result<ExecutionResult> {
            Ok(ExecutionResult::ok("On YouTube"))
        }
    }

    struct ExplodingInput;

    #[async_trait]
    impl InputInjection for ExplodingInput {
        async fn type_text(&self, _text: &str) -> anyhow::Result<ExecutionResult> {
            Err(anyhow::anyhow!("input driver crashed"))
        }

        async fn click(&self, _x: i64, _y: i64) -> anyhow::Result<ExecutionResult> {
            Err(anyhow::anyhow!("input driver crashed"))
        }
    }

    struct FakeShell {
        calls: AtomicU32,
        outcome: ShellOutcome,
    }

    impl FakeShell {
        fn new(code: i32, stdout: &str, stderr: &str) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                outcome: ShellOutcome {
                    stdout: stdout.to_string(),
                    stderr: stderr.to_string(),
                    code,
                },
            })
        }
    }

    #[async_trait]
    impl ShellExecution for FakeShell {
        async fn run(&self, _command: &str, _timeout: Duration) -> anyhow::Result<ShellOutcome> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.outcome.clone())
        }
    }

    struct MetricsSystem;

    #[async_trait]
    impl SystemControl for MetricsSystem {
        async fn shutdown(&self, timeout_secs: i64) -> anyhow::Result<ExecutionResult> {
            Ok(ExecutionResult::ok(format!(
                "System will shutdown in {timeout_secs} seconds"
            )))
        }

        async fn restart(&self, timeout_secs: i64) -> anyhow::Result<ExecutionResult> {
            Ok(ExecutionResult::ok(format!(
                "System will restart in {timeout_secs} seconds"
            )))
        }

        async fn sleep(&self) -> anyhow::Result<ExecutionResult> {
            Ok(ExecutionResult::ok("Sleeping"))
        }

        async fn lock(&self) -> anyhow::Result<ExecutionResult> {
            Ok(ExecutionResult::ok("Locked"))
        }

        async fn logout(&self) -> anyhow::Result<ExecutionResult> {
            Ok(ExecutionResult::ok("Logged out"))
        }

        async fn set_volume(&self, level: i64) -> anyhow::Result<ExecutionResult> {
            Ok(ExecutionResult::ok(format!("Volume set to {level}")))
        }

        async fn mute(&self) -> anyhow::Result<ExecutionResult> {
            Ok(ExecutionResult::ok("Muted"))
        }

        async fn unmute(&self) -> anyhow::Result<ExecutionResult> {
            Ok(ExecutionResult::ok("Unmuted"))
        }

        async fn set_brightness(&self, level: i64) -> anyhow::Result<ExecutionResult> {
            Ok(ExecutionResult::ok(format!("Brightness set to {level}")))
        }

        async fn minimize_window(&self) -> anyhow::Result<ExecutionResult> {
            Ok(ExecutionResult::ok("Minimized"))
        }

        async fn maximize_window(&self) -> anyhow::Result<ExecutionResult> {
            Ok(ExecutionResult::ok("Maximized"))
        }

        async fn close_window(&self) -> anyhow::Result<ExecutionResult> {
            Ok(ExecutionResult::ok("Window closed"))
        }

        async fn get_clipboard(&self) -> anyhow::Result<ExecutionResult> {
            Ok(ExecutionResult::ok_with(
                "clipboard contents",
                json!({"text": "clipboard contents"}),
            ))
        }

        async fn set_clipboard(&self, _text: &str) -> anyhow::Result<ExecutionResult> {
            Ok(ExecutionResult::ok("Copied to clipboard"))
        }

        async fn system_info(&self) -> anyhow::Result<ExecutionResult> {
            Ok(ExecutionResult::ok_with(
                "ok",
                json!({
                    "cpu_percent": 12.5,
                    "memory_percent": 48.0,
                    "memory_used_gb": 7.7,
                    "memory_total_gb": 16.0,
                    "disk_percent": 61.0,
                }),
            ))
        }
    }

    struct EchoLocal;

    #[async_trait]
    impl ModelProvider for EchoLocal {
        fn name(&self) -> &str {
            "local"
        }

        fn model_id(&self, _class: ModelClass) -> &str {
            "test-model"
        }

        async fn is_available(&self) -> bool {
            true
        }

        async fn generate(&self, req: &GenerateRequest) -> anyhow::Result<String> {
            Ok(format!("echo: {}", req.prompt))
        }
    }

    struct OfflineProbe;

    #[async_trait]
    impl Reachability for OfflineProbe {
        async fn is_reachable(&self, _url: &str, _timeout: Duration) -> bool {
            false
        }
    }

    struct Fixture {
        dispatcher: CapabilityDispatcher,
        apps: Arc<FakeApps>,
        shell: Arc<FakeShell>,
        #[allow(dead_code)]
        tmp: tempfile::TempDir,
    }

    fn fixture(consent: bool, graceful_close_fails: bool, shell: Arc<FakeShell>) -> Fixture {
        let tmp = tempdir().expect("tempdir");
        let mut config = Config::default();
        config.permissions.store_path = tmp.path().join("perms.json");
        config.permissions.auto_approved.clear();
        config.safety.safe_folders = vec![tmp.path().join("sandbox")];
        config.safety.forbidden_folders = vec![tmp.path().join("system")];
        std::fs::create_dir_all(tmp.path().join("sandbox")).expect("mkdir");
        std::fs::create_dir_all(tmp.path().join("system")).expect("mkdir");

        let events = Arc::new(NullSink);
        let access = Arc::new(
            AccessController::new(&config, Box::new(StaticConsent(consent)), events.clone())
                .expect("access"),
        );
        let router = Arc::new(ProviderRouter::new(
            Arc::new(EchoLocal),
            Vec::new(),
            Arc::new(OfflineProbe),
            events.clone(),
            &config,
        ));
        let apps = FakeApps::new(graceful_close_fails);
        let caps = CapabilitySet {
            apps: apps.clone(),
            browser: Arc::new(FakeBrowser),
            input: Arc::new(ExplodingInput),
            shell: shell.clone(),
            system: Arc::new(MetricsSystem),
            files: Arc::new(HostFiles),
        };
        Fixture {
            dispatcher: CapabilityDispatcher::new(caps, access, router, events),
            apps,
            shell,
            tmp,
        }
    }

    fn intent(kind: IntentKind) -> Intent {
        Intent::new(kind, 0.9, IntentOrigin::RuleFallback)
    }

    #[tokio::test]
    async fn open_app_requires_app_name() {
        let f = fixture(true, false, FakeShell::new(0, "", ""));
        let res = f.dispatcher.dispatch(&intent(IntentKind::OpenApp)).await;
        assert!(!res.success);
        assert_eq!(res.message, "No app name provided");
        assert_eq!(f.apps.open_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn open_app_happy_path() {
        let f = fixture(true, false, FakeShell::new(0, "", ""));
        let res = f
            .dispatcher
            .dispatch(&intent(IntentKind::OpenApp).with_entity("app_name", "chrome"))
            .await;
        assert!(res.success);
        assert_eq!(res.message, "Successfully opened chrome");
    }

    #[tokio::test]
    async fn denied_consent_blocks_before_capability() {
        let f = fixture(false, false, FakeShell::new(0, "", ""));
        let res = f
            .dispatcher
            .dispatch(&intent(IntentKind::OpenApp).with_entity("app_name", "chrome"))
            .await;
        assert!(!res.success);
        assert!(res.message.contains("Permission denied"));
        assert_eq!(f.apps.open_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn close_app_retries_forcefully_once() {
        let f = fixture(true, true, FakeShell::new(0, "", ""));
        let res = f
            .dispatcher
            .dispatch(&intent(IntentKind::CloseApp).with_entity("app_name", "chrome"))
            .await;
        assert!(res.success);
        assert_eq!(res.message, "Successfully closed chrome");
        assert_eq!(f.apps.close_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dangerous_command_never_reaches_shell() {
        let f = fixture(true, false, FakeShell::new(0, "", ""));
        let res = f
            .dispatcher
            .dispatch(&intent(IntentKind::RunCommand).with_entity("command", "format c:"))
            .await;
        assert!(!res.success);
        assert!(res.message.starts_with("Cannot run command:"));
        assert_eq!(f.shell.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn successful_command_carries_structured_output() {
        let f = fixture(true, false, FakeShell::new(0, "hello\n", ""));
        let res = f
            .dispatcher
            .dispatch(&intent(IntentKind::RunCommand).with_entity("command", "echo hello"))
            .await;
        assert!(res.success);
        assert_eq!(res.message, "hello");
        let data = res.data.expect("data");
        assert_eq!(data["code"], 0);
        assert_eq!(data["stdout"], "hello\n");
    }

    #[tokio::test]
    async fn failing_command_reports_stderr() {
        let f = fixture(true, false, FakeShell::new(2, "", "no such file\n"));
        let res = f
            .dispatcher
            .dispatch(&intent(IntentKind::RunCommand).with_entity("command", "ls /nope"))
            .await;
        assert!(!res.success);
        assert_eq!(res.message, "no such file");
        assert!(res.data.is_none());
    }

    #[tokio::test]
    async fn delete_inside_forbidden_root_is_blocked() {
        let f = fixture(true, false, FakeShell::new(0, "", ""));
        let target = f.tmp.path().join("system/x.dll");
        std::fs::write(&target, b"payload").expect("write");
        let res = f
            .dispatcher
            .dispatch(
                &intent(IntentKind::DeleteFile)
                    .with_entity("filepath", target.to_string_lossy().into_owned()),
            )
            .await;
        assert!(!res.success);
        assert!(res.message.starts_with("Cannot delete file:"));
        // the capability was never invoked
        assert!(target.exists());
    }

    #[tokio::test]
    async fn delete_inside_safe_folder_goes_through() {
        let f = fixture(true, false, FakeShell::new(0, "", ""));
        let target = f.tmp.path().join("sandbox/scratch.txt");
        std::fs::write(&target, b"bye").expect("write");
        let res = f
            .dispatcher
            .dispatch(
                &intent(IntentKind::DeleteFile)
                    .with_entity("filepath", target.to_string_lossy().into_owned()),
            )
            .await;
        assert!(res.success);
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn capability_error_is_normalized_not_propagated() {
        let f = fixture(true, false, FakeShell::new(0, "", ""));
        let res = f
            .dispatcher
            .dispatch(&intent(IntentKind::TypeText).with_entity("text", "hi"))
            .await;
        assert!(!res.success);
        assert!(res.message.contains("input driver crashed"));
    }

    #[tokio::test]
    async fn click_requires_both_coordinates() {
        let f = fixture(true, false, FakeShell::new(0, "", ""));
        let res = f
            .dispatcher
            .dispatch(&intent(IntentKind::Click).with_entity("x", 10))
            .await;
        assert!(!res.success);
        assert_eq!(res.message, "No click coordinates provided");
    }

    #[tokio::test]
    async fn get_time_message_shape() {
        let f = fixture(true, false, FakeShell::new(0, "", ""));
        let res = f.dispatcher.dispatch(&intent(IntentKind::GetTime)).await;
        assert!(res.success);
        assert!(res.message.starts_with("It's "));
        assert!(res.message.contains(" on "));
        let data = res.data.expect("data");
        assert!(data["time"].as_str().expect("time").contains(':'));
    }

    #[tokio::test]
    async fn general_query_routes_through_provider() {
        let f = fixture(true, false, FakeShell::new(0, "", ""));
        let res = f
            .dispatcher
            .dispatch(&intent(IntentKind::GeneralQuery).with_entity("query", "why is the sky blue"))
            .await;
        assert!(res.success);
        assert_eq!(res.message, "echo: why is the sky blue");
    }

    #[tokio::test]
    async fn generate_code_wraps_text_in_data() {
        let f = fixture(true, false, FakeShell::new(0, "", ""));
        let res = f
            .dispatcher
            .dispatch(
                &intent(IntentKind::GenerateCode)
                    .with_entity("prompt", "fizzbuzz")
                    .with_entity("language", "rust"),
            )
            .await;
        assert!(res.success);
        assert_eq!(res.message, "Code generated successfully");
        assert_eq!(res.data.expect("data")["code"], "echo: fizzbuzz");
    }

    #[tokio::test]
    async fn system_info_formats_metrics_message() {
        let f = fixture(true, false, FakeShell::new(0, "", ""));
        let res = f
            .dispatcher
            .dispatch(&intent(IntentKind::GetSystemInfo))
            .await;
        assert!(res.success);
        assert_eq!(res.message, "CPU: 12.5%, RAM: 48.0% (7.7GB/16.0GB), Disk: 61.0%");
    }

    #[tokio::test]
    async fn unknown_intent_yields_uniform_failure() {
        let f = fixture(true, false, FakeShell::new(0, "", ""));
        let res = f.dispatcher.dispatch(&intent(IntentKind::Unknown)).await;
        assert!(!res.success);
        assert_eq!(res.message, "Unknown intent: unknown");
    }

    #[tokio::test]
    async fn volume_defaults_to_midpoint_without_level() {
        let f = fixture(true, false, FakeShell::new(0, "", ""));
        let res = f.dispatcher.dispatch(&intent(IntentKind::SetVolume)).await;
        assert!(res.success);
        assert_eq!(res.message, "Volume set to 50");
    }

    #[tokio::test]
    async fn unsupported_desktop_reports_unavailable() {
        let tmp = tempdir().expect("tempdir");
        let mut config = Config::default();
        config.permissions.store_path = tmp.path().join("perms.json");
        let events = Arc::new(NullSink);
        let access = Arc::new(
            AccessController::new(&config, Box::new(StaticConsent(true)), events.clone())
                .expect("access"),
        );
        let router = Arc::new(ProviderRouter::new(
            Arc::new(EchoLocal),
            Vec::new(),
            Arc::new(OfflineProbe),
            events.clone(),
            &config,
        ));
        let desktop = Arc::new(UnsupportedDesktop);
        let caps = CapabilitySet {
            apps: desktop.clone(),
            browser: desktop.clone(),
            input: desktop.clone(),
            shell: FakeShell::new(0, "", ""),
            system: desktop,
            files: Arc::new(HostFiles),
        };
        let dispatcher = CapabilityDispatcher::new(caps, access, router, events);
        let res = dispatcher.dispatch(&intent(IntentKind::MuteVolume)).await;
        assert!(!res.success);
        assert!(res.message.contains("not available on this host"));
    }
}
