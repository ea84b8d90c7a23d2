use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where a command entered the system. Response emission depends on this:
/// only `LocalDevice` commands get a spoken response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CommandSource {
    LocalDevice,
    RemoteApi,
    Socket,
}

/// A single user command. Created at the system boundary, consumed once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Command {
    pub text: String,
    pub source: CommandSource,
}

impl Command {
    pub fn new(text: impl Into<String>, source: CommandSource) -> Self {
        Self {
            text: text.into(),
            source,
        }
    }
}

/// Closed intent taxonomy. The dispatcher implements every variant; the
/// resolver can produce every variant (`Unknown` included).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    OpenApp,
    CloseApp,
    SearchWeb,
    OpenUrl,
    NavigateYoutube,
    TypeText,
    Click,
    RunCommand,
    GenerateCode,
    GetTime,
    GeneralQuery,
    SystemShutdown,
    SystemRestart,
    SystemSleep,
    SystemLock,
    SystemLogout,
    SetVolume,
    MuteVolume,
    UnmuteVolume,
    SetBrightness,
    MinimizeWindow,
    MaximizeWindow,
    CloseWindow,
    GetClipboard,
    SetClipboard,
    CreateFile,
    DeleteFile,
    ListDirectory,
    GetSystemInfo,
    Unknown,
}

impl IntentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenApp => "open_app",
            Self::CloseApp => "close_app",
            Self::SearchWeb => "search_web",
            Self::OpenUrl => "open_url",
            Self::NavigateYoutube => "navigate_youtube",
            Self::TypeText => "type_text",
            Self::Click => "click",
            Self::RunCommand => "run_command",
            Self::GenerateCode => "generate_code",
            Self::GetTime => "get_time",
            Self::GeneralQuery => "general_query",
            Self::SystemShutdown => "system_shutdown",
            Self::SystemRestart => "system_restart",
            Self::SystemSleep => "system_sleep",
            Self::SystemLock => "system_lock",
            Self::SystemLogout => "system_logout",
            Self::SetVolume => "set_volume",
            Self::MuteVolume => "mute_volume",
            Self::UnmuteVolume => "unmute_volume",
            Self::SetBrightness => "set_brightness",
            Self::MinimizeWindow => "minimize_window",
            Self::MaximizeWindow => "maximize_window",
            Self::CloseWindow => "close_window",
            Self::GetClipboard => "get_clipboard",
            Self::SetClipboard => "set_clipboard",
            Self::CreateFile => "create_file",
            Self::DeleteFile => "delete_file",
            Self::ListDirectory => "list_directory",
            Self::GetSystemInfo => "get_system_info",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a taxonomy name. Anything outside the taxonomy maps to
    /// `Unknown` rather than an error; model output is untrusted.
    pub fn parse(name: &str) -> Self {
        serde_json::from_value(Value::String(name.trim().to_string())).unwrap_or(Self::Unknown)
    }
}

impl std::fmt::Display for IntentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntentOrigin {
    Model,
    RuleFallback,
}

pub type Entities = BTreeMap<String, Value>;

/// A resolved intent: one taxonomy kind plus extracted entities.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Intent {
    pub kind: IntentKind,
    #[serde(default)]
    pub entities: Entities,
    pub confidence: f64,
    pub origin: IntentOrigin,
}

impl Intent {
    pub fn new(kind: IntentKind, confidence: f64, origin: IntentOrigin) -> Self {
        Self {
            kind,
            entities: Entities::new(),
            confidence,
            origin,
        }
    }

    pub fn with_entity(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.entities.insert(key.to_string(), value.into());
        self
    }

    pub fn entity_str(&self, key: &str) -> Option<&str> {
        self.entities.get(key).and_then(|v| v.as_str())
    }

    pub fn entity_i64(&self, key: &str) -> Option<i64> {
        self.entities.get(key).and_then(|v| v.as_i64())
    }
}

/// Which local model family a generation request should hit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModelClass {
    General,
    Code,
}

/// A single generation request, provider-agnostic.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub prompt: String,
    pub system: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
    /// Ask the provider for a schema-constrained JSON response where
    /// supported; providers without structured output ignore this.
    pub json_format: bool,
    pub model_class: ModelClass,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            max_tokens: 2048,
            temperature: 0.7,
            json_format: false,
            model_class: ModelClass::General,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Uniform outcome of a routed generation call. Never an `Err`: both-tier
/// failure is expressed as `success=false` carrying the last error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    pub success: bool,
    pub text: String,
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub fallback_used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

impl GenerationResult {
    pub fn ok(text: String, provider: &str) -> Self {
        Self {
            success: true,
            text,
            provider: provider.to_string(),
            error: None,
            fallback_used: false,
            fallback_reason: None,
        }
    }

    pub fn failed(provider: &str, error: String) -> Self {
        Self {
            success: false,
            text: String::new(),
            provider: provider.to_string(),
            error: Some(error),
            fallback_used: false,
            fallback_reason: None,
        }
    }

    pub fn via_fallback(mut self, reason: &str) -> Self {
        self.fallback_used = true;
        self.fallback_reason = Some(reason.to_string());
        self
    }
}

/// The single caller-visible result shape. `success` is authoritative;
/// `message` is human-facing; `data` is only present on success unless a
/// handler documents otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ExecutionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn ok_with(message: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}
