pub mod permissions;
pub mod safety;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use crate::config::Config;
use crate::events::{Event, EventKind, EventSink};
use self::permissions::{ConsentProvider, PermissionDecision, PermissionStore, TargetMatcher};
use self::safety::{SafetyChecker, SafetyVerdict};

/// Gates capability execution: per-target consent on one axis,
/// path/command safety on the other. The two concerns are independent;
/// handlers consult whichever applies to their capability.
pub struct AccessController {
    blocked: Vec<TargetMatcher>,
    auto_approved: Vec<TargetMatcher>,
    store: PermissionStore,
    consent: Box<dyn ConsentProvider>,
    safety: SafetyChecker,
    events: Arc<dyn EventSink>,
}

impl AccessController {
    pub fn new(
        config: &Config,
        consent: Box<dyn ConsentProvider>,
        events: Arc<dyn EventSink>,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            blocked: TargetMatcher::compile(&config.permissions.blocked),
            auto_approved: TargetMatcher::compile(&config.permissions.auto_approved),
            store: PermissionStore::open(config.permissions.store_path.clone())?,
            consent,
            safety: SafetyChecker::new(
                config.safety.safe_folders.clone(),
                config.safety.forbidden_folders.clone(),
            ),
            events,
        })
    }

    /// Lookup without side effects: blocked list, then auto-approved list,
    /// then the persisted record.
    pub fn lookup(&self, target_name: &str) -> PermissionDecision {
        let key = fold(target_name);
        if self.blocked.iter().any(|m| m.is_match(&key)) {
            return PermissionDecision::Deny;
        }
        if self.auto_approved.iter().any(|m| m.is_match(&key)) {
            return PermissionDecision::Allow;
        }
        self.store.get(&key)
    }

    /// An undecided target triggers the consent step exactly once and the
    /// outcome is persisted before it is returned, so repeat calls never
    /// re-prompt.
    pub fn check_and_request(&self, target_name: &str) -> bool {
        let key = fold(target_name);
        match self.lookup(target_name) {
            PermissionDecision::Allow => true,
            PermissionDecision::Deny => false,
            PermissionDecision::Undecided => {
                self.events.emit(Event::new(
                    EventKind::PermissionPrompt,
                    json!({"target": key}),
                ));
                let granted = self.consent.decide(&key);
                if let Err(e) = self.store.set(&key, granted) {
                    // An unpersistable grant must not become a silent
                    // allow that vanishes on restart.
                    self.events.emit(Event::new(
                        EventKind::Error,
                        json!({"msg": format!("failed persisting permission for '{key}': {e}")}),
                    ));
                    return false;
                }
                self.events.emit(Event::new(
                    EventKind::PermissionDecision,
                    json!({"target": key, "granted": granted}),
                ));
                granted
            }
        }
    }

    /// Manual overrides, the only paths that change a persisted decision.
    pub fn grant(&self, target_name: &str) -> anyhow::Result<()> {
        self.store.set(&fold(target_name), true)
    }

    pub fn deny(&self, target_name: &str) -> anyhow::Result<()> {
        self.store.set(&fold(target_name), false)
    }

    pub fn revoke(&self, target_name: &str) -> anyhow::Result<bool> {
        self.store.remove(&fold(target_name))
    }

    pub fn list_permissions(&self) -> BTreeMap<String, bool> {
        self.store.list()
    }

    pub fn is_path_safe(&self, path: &Path) -> SafetyVerdict {
        self.verdict_with_event(self.safety.is_path_safe(path), path)
    }

    pub fn can_delete(&self, path: &Path) -> SafetyVerdict {
        self.verdict_with_event(self.safety.can_delete(path), path)
    }

    pub fn can_execute_command(&self, command_text: &str) -> SafetyVerdict {
        let verdict = self.safety.can_execute_command(command_text);
        if !verdict.allowed {
            self.events.emit(Event::new(
                EventKind::SafetyRejected,
                json!({"command": command_text, "reason": verdict.reason}),
            ));
        }
        verdict
    }

    fn verdict_with_event(&self, verdict: SafetyVerdict, path: &Path) -> SafetyVerdict {
        if !verdict.allowed {
            self.events.emit(Event::new(
                EventKind::SafetyRejected,
                json!({"path": path.display().to_string(), "reason": verdict.reason}),
            ));
        }
        verdict
    }
}

fn fold(target_name: &str) -> String {
    target_name.trim().to_lowercase()
}
