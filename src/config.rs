use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Routing mode override. `Auto` lets the router decide per request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RouterMode {
    Local,
    Remote,
    #[default]
    Auto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalProviderConfig {
    pub base_url: String,
    pub model: String,
    pub code_model: String,
    pub timeout_secs: u64,
}

impl Default for LocalProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama3.2:3b".to_string(),
            code_model: "codegemma:7b".to_string(),
            timeout_secs: 60,
        }
    }
}

/// One remote OpenAI-compatible endpoint. Remote providers are tried in the
/// order they appear in `remote.providers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteProviderConfig {
    pub name: String,
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub enabled: bool,
}

impl Default for RemoteProviderConfig {
    fn default() -> Self {
        Self {
            name: "groq".to_string(),
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            api_key: None,
            enabled: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub providers: Vec<RemoteProviderConfig>,
    pub timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            providers: vec![RemoteProviderConfig::default()],
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub mode: RouterMode,
    /// Task types that always prefer the remote tier in auto mode.
    pub remote_tasks: Vec<String>,
    /// Task types that always prefer the local tier in auto mode.
    pub local_tasks: Vec<String>,
    /// Prompts longer than this prefer remote for the larger context budget.
    pub long_prompt_threshold: usize,
    pub probe_url: String,
    pub probe_timeout_secs: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            mode: RouterMode::Auto,
            remote_tasks: vec!["complex_code".to_string()],
            local_tasks: vec![
                "intent_parsing".to_string(),
                "quick_command".to_string(),
                "simple_code".to_string(),
            ],
            long_prompt_threshold: 2000,
            probe_url: "https://www.google.com".to_string(),
            probe_timeout_secs: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionsConfig {
    pub store_path: PathBuf,
    /// Target names (or globs) never prompted for.
    pub auto_approved: Vec<String>,
    /// Target names (or globs) always denied; never overridden by consent.
    pub blocked: Vec<String>,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from(".deskpilot/permissions.json"),
            auto_approved: vec!["notepad".to_string(), "calculator".to_string()],
            blocked: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SafetyConfig {
    /// Deletion is opt-in: only paths under these roots may be deleted.
    pub safe_folders: Vec<PathBuf>,
    /// Any access under these roots is refused.
    pub forbidden_folders: Vec<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub enabled: bool,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EventsConfig {
    /// Append JSONL events here when set.
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub local: LocalProviderConfig,
    pub remote: RemoteConfig,
    pub routing: RoutingConfig,
    pub permissions: PermissionsConfig,
    pub safety: SafetyConfig,
    pub speech: SpeechConfig,
    pub events: EventsConfig,
}

impl Config {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed reading config file '{}'", path.display()))?;
        Self::from_yaml(&raw)
            .with_context(|| format!("failed parsing config file '{}'", path.display()))
    }

    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let cfg: Config = serde_yaml::from_str(yaml)?;
        Ok(cfg)
    }

    /// Remote providers eligible for selection, in priority order.
    pub fn enabled_remotes(&self) -> Vec<&RemoteProviderConfig> {
        self.remote
            .providers
            .iter()
            .filter(|p| p.enabled && p.api_key.is_some())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, RouterMode};

    #[test]
    fn empty_yaml_yields_defaults() {
        let cfg = Config::from_yaml("{}").expect("parse");
        assert_eq!(cfg.routing.mode, RouterMode::Auto);
        assert_eq!(cfg.routing.long_prompt_threshold, 2000);
        assert_eq!(cfg.local.base_url, "http://localhost:11434");
        assert!(cfg.enabled_remotes().is_empty());
    }

    #[test]
    fn partial_yaml_overrides_only_named_fields() {
        let cfg = Config::from_yaml(
            r#"
routing:
  mode: local
  long_prompt_threshold: 500
remote:
  providers:
    - name: groq
      base_url: "https://api.groq.com/openai/v1"
      model: "llama-3.3-70b-versatile"
      api_key: "k"
      enabled: true
    - name: backup
      base_url: "https://example.com/v1"
      model: "m"
      api_key: "k2"
      enabled: true
"#,
        )
        .expect("parse");
        assert_eq!(cfg.routing.mode, RouterMode::Local);
        assert_eq!(cfg.routing.long_prompt_threshold, 500);
        let remotes = cfg.enabled_remotes();
        assert_eq!(remotes.len(), 2);
        assert_eq!(remotes[0].name, "groq");
        assert_eq!(remotes[1].name, "backup");
        // untouched sections keep defaults
        assert_eq!(cfg.local.model, "llama3.2:3b");
    }

    #[test]
    fn remote_without_key_is_not_eligible() {
        let cfg = Config::from_yaml(
            r#"
remote:
  providers:
    - name: groq
      enabled: true
"#,
        )
        .expect("parse");
        assert!(cfg.enabled_remotes().is_empty());
    }
}
