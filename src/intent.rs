use std::sync::Arc;
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use serde_json::json;

use crate::events::{Event, EventKind, EventSink};
use crate::router::{ProviderRouter, RouteOptions};
use crate::types::{Entities, GenerateRequest, Intent, IntentKind, IntentOrigin};

const CLASSIFY_SYSTEM_PROMPT: &str = r#"You are an intent parser. Convert user commands into structured JSON.

Output format:
{"intent": "action_name", "entities": {"entity_type": "value"}, "confidence": 0.0-1.0}

Available intents:
open_app, close_app, search_web, open_url, navigate_youtube, type_text, click,
run_command, generate_code, get_time, general_query, system_shutdown,
system_restart, system_sleep, system_lock, system_logout, set_volume,
mute_volume, unmute_volume, set_brightness, minimize_window, maximize_window,
close_window, get_clipboard, set_clipboard, create_file, delete_file,
list_directory, get_system_info

Entities can include: app_name, url, query, video_name, text, x, y, command,
prompt, language, timeout, level, filepath, content, dirpath.

Examples:
User: "Open Chrome"
{"intent": "open_app", "entities": {"app_name": "chrome"}, "confidence": 0.95}

User: "Search for Python tutorials"
{"intent": "search_web", "entities": {"query": "Python tutorials"}, "confidence": 0.9}

User: "Set the volume to 40"
{"intent": "set_volume", "entities": {"level": 40}, "confidence": 0.9}"#;

/// Converts command text into an [`Intent`]. Never fails: any model or
/// parse problem degrades to the ordered rule table.
pub struct IntentResolver {
    router: Arc<ProviderRouter>,
    events: Arc<dyn EventSink>,
}

impl IntentResolver {
    pub fn new(router: Arc<ProviderRouter>, events: Arc<dyn EventSink>) -> Self {
        Self { router, events }
    }

    pub async fn resolve(&self, command_text: &str) -> Intent {
        // Canonical phrasings skip the model round-trip entirely.
        let lowered = command_text.trim().to_ascii_lowercase();
        let intent = if let Some(hit) = apply_rules(command_text.trim(), &lowered, true) {
            hit
        } else {
            match self.classify_with_model(command_text).await {
                Some(intent) => intent,
                None => rule_fallback(command_text.trim(), &lowered),
            }
        };
        self.events.emit(Event::new(
            EventKind::IntentResolved,
            json!({
                "kind": intent.kind.as_str(),
                "origin": intent.origin,
                "confidence": intent.confidence,
            }),
        ));
        intent
    }

    async fn classify_with_model(&self, command_text: &str) -> Option<Intent> {
        let mut req = GenerateRequest::new(format!("User: {command_text}\nJSON:"))
            .with_system(CLASSIFY_SYSTEM_PROMPT);
        req.max_tokens = 256;
        req.temperature = 0.3;
        req.json_format = true;
        // Intent classification favors latency over quality: forced local,
        // which also means a local failure here is terminal for this path.
        let result = self
            .router
            .route_generate(req, RouteOptions::forced_local("intent_parsing"))
            .await;
        if !result.success {
            return None;
        }
        parse_model_reply(&result.text)
    }
}

#[derive(Debug, Deserialize)]
struct ModelIntent {
    intent: String,
    #[serde(default)]
    entities: Entities,
    #[serde(default = "default_model_confidence")]
    confidence: f64,
}

fn default_model_confidence() -> f64 {
    0.5
}

/// Primary parse strategy is the whole reply as JSON (the provider was
/// asked for a structured response); secondary is a permissive extraction
/// of the first JSON object embedded in free text.
fn parse_model_reply(text: &str) -> Option<Intent> {
    let trimmed = text.trim();
    let parsed: ModelIntent = match serde_json::from_str(trimmed) {
        Ok(v) => v,
        Err(_) => {
            static OBJECT_RE: OnceLock<Regex> = OnceLock::new();
            let re = OBJECT_RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("static regex"));
            let m = re.find(trimmed)?;
            serde_json::from_str(m.as_str()).ok()?
        }
    };
    let mut intent = Intent::new(
        IntentKind::parse(&parsed.intent),
        parsed.confidence.clamp(0.0, 1.0),
        IntentOrigin::Model,
    );
    intent.entities = parsed.entities;
    Some(intent)
}

struct RuleHit {
    kind: IntentKind,
    confidence: f64,
    entities: Entities,
}

impl RuleHit {
    fn bare(kind: IntentKind, confidence: f64) -> Option<Self> {
        Some(Self {
            kind,
            confidence,
            entities: Entities::new(),
        })
    }

    fn with(kind: IntentKind, confidence: f64, key: &str, value: serde_json::Value) -> Option<Self> {
        let mut entities = Entities::new();
        entities.insert(key.to_string(), value);
        Some(Self {
            kind,
            confidence,
            entities,
        })
    }
}

type RuleFn = fn(&str, &str) -> Option<RuleHit>;

struct Rule {
    name: &'static str,
    /// Canonical rules run before the model call; the rest only run when
    /// the model path fails.
    canonical: bool,
    apply: RuleFn,
}

/// The rule table is evaluated top to bottom and the first match wins, so
/// order is part of the contract:
/// - window rules sit above `close_app` so "close the window" is not an app,
/// - `unmute` sits above `mute` because one contains the other,
/// - `open_url` sits above `open_app` so "open https://..." is not an app,
/// - the catch-all `general_query` is last.
fn rule_table() -> &'static [Rule] {
    static RULES: &[Rule] = &[
        Rule {
            name: "get_time",
            canonical: true,
            apply: |_orig, lowered| {
                let canonical = [
                    "what time is it",
                    "what time is it?",
                    "what's the time",
                    "time",
                ];
                canonical
                    .contains(&lowered)
                    .then(|| RuleHit::bare(IntentKind::GetTime, 0.95))
                    .flatten()
            },
        },
        Rule {
            name: "unmute_volume",
            canonical: false,
            apply: |_orig, lowered| {
                lowered
                    .contains("unmute")
                    .then(|| RuleHit::bare(IntentKind::UnmuteVolume, 0.85))
                    .flatten()
            },
        },
        Rule {
            name: "mute_volume",
            canonical: false,
            apply: |_orig, lowered| {
                lowered
                    .contains("mute")
                    .then(|| RuleHit::bare(IntentKind::MuteVolume, 0.85))
                    .flatten()
            },
        },
        Rule {
            name: "set_volume",
            canonical: false,
            apply: |_orig, lowered| {
                let level = capture_level(lowered, "volume")?;
                RuleHit::with(IntentKind::SetVolume, 0.85, "level", level.into())
            },
        },
        Rule {
            name: "set_brightness",
            canonical: false,
            apply: |_orig, lowered| {
                let level = capture_level(lowered, "brightness")?;
                RuleHit::with(IntentKind::SetBrightness, 0.85, "level", level.into())
            },
        },
        Rule {
            name: "minimize_window",
            canonical: false,
            apply: |_orig, lowered| {
                lowered
                    .contains("minimize")
                    .then(|| RuleHit::bare(IntentKind::MinimizeWindow, 0.85))
                    .flatten()
            },
        },
        Rule {
            name: "maximize_window",
            canonical: false,
            apply: |_orig, lowered| {
                lowered
                    .contains("maximize")
                    .then(|| RuleHit::bare(IntentKind::MaximizeWindow, 0.85))
                    .flatten()
            },
        },
        Rule {
            name: "close_window",
            canonical: false,
            apply: |_orig, lowered| {
                (lowered.contains("close the window") || lowered.contains("close window"))
                    .then(|| RuleHit::bare(IntentKind::CloseWindow, 0.85))
                    .flatten()
            },
        },
        Rule {
            name: "system_shutdown",
            canonical: false,
            apply: |_orig, lowered| {
                (lowered.contains("shut down") || lowered.contains("shutdown"))
                    .then(|| RuleHit::bare(IntentKind::SystemShutdown, 0.85))
                    .flatten()
            },
        },
        Rule {
            name: "system_restart",
            canonical: false,
            apply: |_orig, lowered| {
                (lowered.contains("restart") || lowered.contains("reboot"))
                    .then(|| RuleHit::bare(IntentKind::SystemRestart, 0.85))
                    .flatten()
            },
        },
        Rule {
            name: "system_sleep",
            canonical: false,
            apply: |_orig, lowered| {
                (lowered == "sleep" || lowered.contains("go to sleep"))
                    .then(|| RuleHit::bare(IntentKind::SystemSleep, 0.85))
                    .flatten()
            },
        },
        Rule {
            name: "system_lock",
            canonical: false,
            apply: |_orig, lowered| {
                (lowered == "lock"
                    || lowered.contains("lock the screen")
                    || lowered.contains("lock the computer"))
                .then(|| RuleHit::bare(IntentKind::SystemLock, 0.85))
                .flatten()
            },
        },
        Rule {
            name: "system_logout",
            canonical: false,
            apply: |_orig, lowered| {
                (lowered.contains("log out")
                    || lowered.contains("logout")
                    || lowered.contains("sign out"))
                .then(|| RuleHit::bare(IntentKind::SystemLogout, 0.85))
                .flatten()
            },
        },
        Rule {
            name: "set_clipboard",
            canonical: false,
            apply: |orig, _lowered| {
                static RE: OnceLock<Regex> = OnceLock::new();
                let re = RE.get_or_init(|| {
                    Regex::new(r"(?i)^copy (.+?) to (?:the )?clipboard$").expect("static regex")
                });
                let caps = re.captures(orig)?;
                RuleHit::with(
                    IntentKind::SetClipboard,
                    0.85,
                    "text",
                    caps[1].to_string().into(),
                )
            },
        },
        Rule {
            name: "get_clipboard",
            canonical: false,
            apply: |_orig, lowered| {
                lowered
                    .contains("clipboard")
                    .then(|| RuleHit::bare(IntentKind::GetClipboard, 0.6))
                    .flatten()
            },
        },
        Rule {
            name: "get_system_info",
            canonical: false,
            apply: |_orig, lowered| {
                (lowered.contains("system info")
                    || lowered.contains("system information")
                    || lowered.contains("cpu usage"))
                .then(|| RuleHit::bare(IntentKind::GetSystemInfo, 0.85))
                .flatten()
            },
        },
        Rule {
            name: "click",
            canonical: false,
            apply: |_orig, lowered| {
                static RE: OnceLock<Regex> = OnceLock::new();
                let re = RE.get_or_init(|| {
                    Regex::new(r"^click(?: at)? (\d+)[ ,]+(\d+)$").expect("static regex")
                });
                let caps = re.captures(lowered)?;
                let x: i64 = caps[1].parse().ok()?;
                let y: i64 = caps[2].parse().ok()?;
                let mut entities = Entities::new();
                entities.insert("x".to_string(), x.into());
                entities.insert("y".to_string(), y.into());
                Some(RuleHit {
                    kind: IntentKind::Click,
                    confidence: 0.85,
                    entities,
                })
            },
        },
        Rule {
            name: "type_text",
            canonical: false,
            apply: |orig, lowered| {
                let rest = strip_any_prefix(orig, lowered, &["type "])?;
                RuleHit::with(IntentKind::TypeText, 0.85, "text", rest.into())
            },
        },
        Rule {
            name: "open_url",
            canonical: false,
            apply: |orig, lowered| {
                let rest = strip_any_prefix(orig, lowered, &["open ", "go to "])?;
                let lowered_rest = rest.to_ascii_lowercase();
                (lowered_rest.starts_with("http://") || lowered_rest.starts_with("https://"))
                    .then(|| RuleHit::with(IntentKind::OpenUrl, 0.85, "url", rest.into()))
                    .flatten()
            },
        },
        Rule {
            name: "navigate_youtube",
            canonical: false,
            apply: |orig, lowered| {
                if !lowered.contains("youtube") {
                    return None;
                }
                static RE: OnceLock<Regex> = OnceLock::new();
                let re = RE.get_or_init(|| {
                    Regex::new(r"(?i)^play (.+?) on youtube$").expect("static regex")
                });
                match re.captures(orig) {
                    Some(caps) => RuleHit::with(
                        IntentKind::NavigateYoutube,
                        0.6,
                        "video_name",
                        caps[1].to_string().into(),
                    ),
                    None => RuleHit::bare(IntentKind::NavigateYoutube, 0.6),
                }
            },
        },
        Rule {
            name: "open_app",
            canonical: false,
            apply: |orig, lowered| {
                let rest = strip_any_prefix(orig, lowered, &["open ", "launch ", "start "])?;
                RuleHit::with(
                    IntentKind::OpenApp,
                    0.85,
                    "app_name",
                    rest.to_ascii_lowercase().into(),
                )
            },
        },
        Rule {
            name: "close_app",
            canonical: false,
            apply: |orig, lowered| {
                let rest = strip_any_prefix(orig, lowered, &["close ", "quit ", "exit "])?;
                RuleHit::with(
                    IntentKind::CloseApp,
                    0.85,
                    "app_name",
                    rest.to_ascii_lowercase().into(),
                )
            },
        },
        Rule {
            name: "search_web",
            canonical: false,
            apply: |orig, lowered| {
                let rest = strip_any_prefix(
                    orig,
                    lowered,
                    &["search for ", "search ", "google ", "look up "],
                )?;
                RuleHit::with(IntentKind::SearchWeb, 0.85, "query", rest.into())
            },
        },
        Rule {
            name: "run_command",
            canonical: false,
            apply: |orig, lowered| {
                let rest = strip_any_prefix(orig, lowered, &["run ", "execute "])?;
                RuleHit::with(IntentKind::RunCommand, 0.85, "command", rest.into())
            },
        },
        Rule {
            name: "generate_code",
            canonical: false,
            apply: |orig, lowered| {
                let rest =
                    strip_any_prefix(orig, lowered, &["generate code ", "write code "])?;
                RuleHit::with(IntentKind::GenerateCode, 0.6, "prompt", rest.into())
            },
        },
        Rule {
            name: "delete_file",
            canonical: false,
            apply: |orig, lowered| {
                let rest = strip_any_prefix(orig, lowered, &["delete ", "remove "])?;
                RuleHit::with(IntentKind::DeleteFile, 0.85, "filepath", rest.into())
            },
        },
        Rule {
            name: "create_file",
            canonical: false,
            apply: |orig, _lowered| {
                static RE: OnceLock<Regex> = OnceLock::new();
                let re = RE.get_or_init(|| {
                    Regex::new(r"(?i)^create (?:a )?file (?:at |called |named )?(\S+)$")
                        .expect("static regex")
                });
                let caps = re.captures(orig)?;
                RuleHit::with(
                    IntentKind::CreateFile,
                    0.85,
                    "filepath",
                    caps[1].to_string().into(),
                )
            },
        },
        Rule {
            name: "list_directory",
            canonical: false,
            apply: |orig, lowered| {
                let rest = strip_any_prefix(
                    orig,
                    lowered,
                    &["list files in ", "list directory ", "list "],
                )?;
                RuleHit::with(IntentKind::ListDirectory, 0.85, "dirpath", rest.into())
            },
        },
    ];
    RULES
}

/// Prefix matching happens on the lowered text; extraction slices the
/// original so entity values keep their case (file paths, queries).
/// ASCII lowering preserves byte offsets, which makes the slice safe.
fn strip_any_prefix<'a>(orig: &'a str, lowered: &str, prefixes: &[&str]) -> Option<&'a str> {
    for prefix in prefixes {
        if lowered.starts_with(prefix) {
            let rest = orig[prefix.len()..].trim();
            if !rest.is_empty() {
                return Some(rest);
            }
        }
    }
    None
}

fn capture_level(lowered: &str, noun: &str) -> Option<i64> {
    static VOLUME_RE: OnceLock<Regex> = OnceLock::new();
    static BRIGHTNESS_RE: OnceLock<Regex> = OnceLock::new();
    let re = if noun == "volume" {
        VOLUME_RE.get_or_init(|| {
            Regex::new(r"volume (?:to |at )?(\d{1,3})").expect("static regex")
        })
    } else {
        BRIGHTNESS_RE.get_or_init(|| {
            Regex::new(r"brightness (?:to |at )?(\d{1,3})").expect("static regex")
        })
    };
    let caps = re.captures(lowered)?;
    caps[1].parse().ok()
}

fn apply_rules(orig: &str, lowered: &str, canonical_only: bool) -> Option<Intent> {
    for rule in rule_table() {
        if canonical_only && !rule.canonical {
            continue;
        }
        if let Some(hit) = (rule.apply)(orig, lowered) {
            let mut intent = Intent::new(hit.kind, hit.confidence, IntentOrigin::RuleFallback);
            intent.entities = hit.entities;
            return Some(intent);
        }
    }
    None
}

/// Ultimate fallback: the full rule table, then `general_query` with the
/// whole text as the query at the catch-all confidence.
fn rule_fallback(orig: &str, lowered: &str) -> Intent {
    if let Some(intent) = apply_rules(orig, lowered, false) {
        return intent;
    }
    Intent::new(IntentKind::GeneralQuery, 0.5, IntentOrigin::RuleFallback)
        .with_entity("query", orig)
}
