use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use globset::{Glob, GlobMatcher};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tri-state outcome of a permission lookup. `Undecided` means no record
/// exists yet and a consent step must materialize one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionDecision {
    Allow,
    Deny,
    Undecided,
}

/// Resolves an undecided target to allow/deny. Pluggable: a UI dialog, a
/// voice prompt, or a policy. The controller persists whatever this returns.
pub trait ConsentProvider: Send + Sync {
    fn decide(&self, target_name: &str) -> bool;
}

/// Grants everything. The stand-in used until a real prompt surface is
/// wired; decisions are still persisted so they stay sticky.
pub struct AutoGrantConsent;

impl ConsentProvider for AutoGrantConsent {
    fn decide(&self, _target_name: &str) -> bool {
        true
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    permissions: BTreeMap<String, bool>,
}

/// Persisted per-target decisions, keyed by case-folded target name.
/// Writes go through a temp file and rename so a crash never truncates
/// the store.
pub struct PermissionStore {
    path: PathBuf,
    cache: Mutex<BTreeMap<String, bool>>,
}

impl PermissionStore {
    pub fn open(path: PathBuf) -> anyhow::Result<Self> {
        let cache = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed reading permission store {}", path.display()))?;
            let data: StoreData = serde_json::from_str(&raw)
                .with_context(|| format!("failed parsing permission store {}", path.display()))?;
            data.permissions
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            cache: Mutex::new(cache),
        })
    }

    pub fn get(&self, key: &str) -> PermissionDecision {
        let cache = self.cache.lock().expect("permission store lock poisoned");
        match cache.get(key) {
            Some(true) => PermissionDecision::Allow,
            Some(false) => PermissionDecision::Deny,
            None => PermissionDecision::Undecided,
        }
    }

    pub fn set(&self, key: &str, granted: bool) -> anyhow::Result<()> {
        let mut cache = self.cache.lock().expect("permission store lock poisoned");
        cache.insert(key.to_string(), granted);
        self.save(&cache)
    }

    pub fn remove(&self, key: &str) -> anyhow::Result<bool> {
        let mut cache = self.cache.lock().expect("permission store lock poisoned");
        let removed = cache.remove(key).is_some();
        if removed {
            self.save(&cache)?;
        }
        Ok(removed)
    }

    pub fn list(&self) -> BTreeMap<String, bool> {
        self.cache
            .lock()
            .expect("permission store lock poisoned")
            .clone()
    }

    fn save(&self, cache: &BTreeMap<String, bool>) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = self
            .path
            .with_extension(format!("tmp.{}", Uuid::new_v4().as_hyphenated()));
        let data = StoreData {
            permissions: cache.clone(),
        };
        let content = serde_json::to_string_pretty(&data)?;
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

/// Exact names compare case-insensitively; entries carrying glob
/// metacharacters are compiled and matched against the folded name.
pub(crate) enum TargetMatcher {
    Exact(String),
    Glob(GlobMatcher),
}

impl TargetMatcher {
    pub(crate) fn compile(entries: &[String]) -> Vec<Self> {
        entries
            .iter()
            .filter_map(|entry| {
                let folded = entry.trim().to_lowercase();
                if folded.is_empty() {
                    return None;
                }
                if has_glob_meta(&folded) {
                    Glob::new(&folded)
                        .ok()
                        .map(|g| Self::Glob(g.compile_matcher()))
                } else {
                    Some(Self::Exact(folded))
                }
            })
            .collect()
    }

    pub(crate) fn is_match(&self, folded_name: &str) -> bool {
        match self {
            Self::Exact(name) => name == folded_name,
            Self::Glob(glob) => glob.is_match(folded_name),
        }
    }
}

fn has_glob_meta(s: &str) -> bool {
    s.contains('*') || s.contains('?') || s.contains('[')
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::{PermissionDecision, PermissionStore, TargetMatcher};

    #[test]
    fn store_round_trips_decisions() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("perms.json");
        let store = PermissionStore::open(path.clone()).expect("open");
        assert_eq!(store.get("chrome"), PermissionDecision::Undecided);
        store.set("chrome", true).expect("set");
        store.set("discord", false).expect("set");
        drop(store);

        let store = PermissionStore::open(path).expect("reopen");
        assert_eq!(store.get("chrome"), PermissionDecision::Allow);
        assert_eq!(store.get("discord"), PermissionDecision::Deny);
        assert_eq!(store.get("spotify"), PermissionDecision::Undecided);
    }

    #[test]
    fn remove_clears_a_decision() {
        let tmp = tempdir().expect("tempdir");
        let store = PermissionStore::open(tmp.path().join("perms.json")).expect("open");
        store.set("chrome", false).expect("set");
        assert!(store.remove("chrome").expect("remove"));
        assert!(!store.remove("chrome").expect("remove again"));
        assert_eq!(store.get("chrome"), PermissionDecision::Undecided);
    }

    #[test]
    fn store_creates_parent_directories() {
        let tmp = tempdir().expect("tempdir");
        let path = tmp.path().join("nested/state/perms.json");
        let store = PermissionStore::open(path.clone()).expect("open");
        store.set("chrome", true).expect("set");
        assert!(path.exists());
    }

    #[test]
    fn matchers_support_exact_and_glob() {
        let matchers = TargetMatcher::compile(&[
            "Notepad".to_string(),
            "office-*".to_string(),
            "  ".to_string(),
        ]);
        assert_eq!(matchers.len(), 2);
        assert!(matchers.iter().any(|m| m.is_match("notepad")));
        assert!(matchers.iter().any(|m| m.is_match("office-word")));
        assert!(!matchers.iter().any(|m| m.is_match("chrome")));
    }
}
