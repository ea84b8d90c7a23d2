use std::time::Duration;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde_json::json;

use super::{
    AppLifecycle, BrowserAutomation, FileOps, InputInjection, ShellExecution, ShellOutcome,
    SpeechSynthesis, SystemControl,
};
use crate::types::ExecutionResult;

/// Runs commands through the platform shell with a hard timeout. A call
/// that outlives its timeout is killed and reported as a failure, not
/// left hanging.
pub struct HostShell {
    max_output_bytes: usize,
}

impl Default for HostShell {
    fn default() -> Self {
        Self {
            max_output_bytes: 200_000,
        }
    }
}

#[async_trait]
impl ShellExecution for HostShell {
    async fn run(&self, command: &str, timeout: Duration) -> anyhow::Result<ShellOutcome> {
        let mut cmd = if cfg!(windows) {
            let mut c = tokio::process::Command::new("cmd");
            c.arg("/C").arg(command);
            c
        } else {
            let mut c = tokio::process::Command::new("sh");
            c.arg("-c").arg(command);
            c
        };
        cmd.stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        let child = cmd.spawn().context("failed to spawn shell command")?;
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| anyhow!("command timed out after {}s", timeout.as_secs()))?
            .context("failed waiting for shell command")?;
        Ok(ShellOutcome {
            stdout: truncate_lossy(&output.stdout, self.max_output_bytes),
            stderr: truncate_lossy(&output.stderr, self.max_output_bytes),
            code: output.status.code().unwrap_or(-1),
        })
    }
}

fn truncate_lossy(bytes: &[u8], max: usize) -> String {
    let end = bytes.len().min(max);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Plain filesystem operations. Safety gating happens in the handler
/// layer before these are ever invoked.
pub struct HostFiles;

#[async_trait]
impl FileOps for HostFiles {
    async fn create_file(&self, path: &str, content: &str) -> anyhow::Result<ExecutionResult> {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed creating parent directories for {path}"))?;
            }
        }
        std::fs::write(path, content).with_context(|| format!("failed writing {path}"))?;
        Ok(ExecutionResult::ok(format!("Created file {path}")))
    }

    async fn delete_file(&self, path: &str) -> anyhow::Result<ExecutionResult> {
        if !std::path::Path::new(path).exists() {
            return Ok(ExecutionResult::fail(format!("File not found: {path}")));
        }
        std::fs::remove_file(path).with_context(|| format!("failed deleting {path}"))?;
        Ok(ExecutionResult::ok(format!("Deleted file {path}")))
    }

    async fn list_directory(&self, path: &str) -> anyhow::Result<ExecutionResult> {
        let mut entries = Vec::new();
        for entry in
            std::fs::read_dir(path).with_context(|| format!("failed reading directory {path}"))?
        {
            let entry = entry?;
            entries.push(entry.file_name().to_string_lossy().into_owned());
        }
        entries.sort();
        Ok(ExecutionResult::ok_with(
            format!("{} entries in {path}", entries.len()),
            json!({"entries": entries}),
        ))
    }
}

/// Stand-in for the desktop automation layer (application lifecycle,
/// browser, input injection, system control). Every operation reports a
/// uniform failure so the dispatcher contract holds without that layer.
pub struct UnsupportedDesktop;

impl UnsupportedDesktop {
    fn unavailable(what: &str) -> anyhow::Result<ExecutionResult> {
        Ok(ExecutionResult::fail(format!(
            "The {what} capability is not available on this host"
        )))
    }
}

#[async_trait]
impl AppLifecycle for UnsupportedDesktop {
    async fn open(&self, _name: &str) -> anyhow::Result<ExecutionResult> {
        Self::unavailable("application control")
    }

    async fn close(&self, _name: &str, _force: bool) -> anyhow::Result<ExecutionResult> {
        Self::unavailable("application control")
    }
}

#[async_trait]
impl BrowserAutomation for UnsupportedDesktop {
    async fn search(&self, _query: &str) -> anyhow::Result<ExecutionResult> {
        Self::unavailable("browser automation")
    }

    async fn open_url(&self, _url: &str) -> anyhow::Result<ExecutionResult> {
        Self::unavailable("browser automation")
    }

    async fn navigate_video(&self, _name: Option<&str>) -> anyhow::Result<ExecutionResult> {
        Self::unavailable("browser automation")
    }
}

#[async_trait]
impl InputInjection for UnsupportedDesktop {
    async fn type_text(&self, _text: &str) -> anyhow::Result<ExecutionResult> {
        Self::unavailable("input injection")
    }

    async fn click(&self, _x: i64, _y: i64) -> anyhow::Result<ExecutionResult> {
        Self::unavailable("input injection")
    }
}

#[async_trait]
impl SystemControl for UnsupportedDesktop {
    async fn shutdown(&self, _timeout_secs: i64) -> anyhow::Result<ExecutionResult> {
        Self::unavailable("system control")
    }

    async fn restart(&self, _timeout_secs: i64) -> anyhow::Result<ExecutionResult> {
        Self::unavailable("system control")
    }

    async fn sleep(&self) -> anyhow::Result<ExecutionResult> {
        Self::unavailable("system control")
    }

    async fn lock(&self) -> anyhow::Result<ExecutionResult> {
        Self::unavailable("system control")
    }

    async fn logout(&self) -> anyhow::Result<ExecutionResult> {
        Self::unavailable("system control")
    }

    async fn set_volume(&self, _level: i64) -> anyhow::Result<ExecutionResult> {
        Self::unavailable("volume control")
    }

    async fn mute(&self) -> anyhow::Result<ExecutionResult> {
        Self::unavailable("volume control")
    }

    async fn unmute(&self) -> anyhow::Result<ExecutionResult> {
        Self::unavailable("volume control")
    }

    async fn set_brightness(&self, _level: i64) -> anyhow::Result<ExecutionResult> {
        Self::unavailable("brightness control")
    }

    async fn minimize_window(&self) -> anyhow::Result<ExecutionResult> {
        Self::unavailable("window management")
    }

    async fn maximize_window(&self) -> anyhow::Result<ExecutionResult> {
        Self::unavailable("window management")
    }

    async fn close_window(&self) -> anyhow::Result<ExecutionResult> {
        Self::unavailable("window management")
    }

    async fn get_clipboard(&self) -> anyhow::Result<ExecutionResult> {
        Self::unavailable("clipboard")
    }

    async fn set_clipboard(&self, _text: &str) -> anyhow::Result<ExecutionResult> {
        Self::unavailable("clipboard")
    }

    async fn system_info(&self) -> anyhow::Result<ExecutionResult> {
        Self::unavailable("system metrics")
    }
}

/// Speech collaborator that swallows output; the wired default until a
/// TTS engine is attached.
pub struct NullSpeech;

impl SpeechSynthesis for NullSpeech {
    fn speak(&self, _text: &str, _wait: bool) {}

    fn enabled(&self) -> bool {
        false
    }
}
