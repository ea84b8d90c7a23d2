use std::path::{Component, Path, PathBuf};

use serde::Serialize;

/// Computed per check, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct SafetyVerdict {
    pub allowed: bool,
    pub reason: String,
}

impl SafetyVerdict {
    pub fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// Substrings that make a shell command unconditionally unsafe: disk
/// formatting, registry edits, forced process termination, power-state
/// changes, network reconfiguration, and blanket deletion.
const DANGEROUS_PATTERNS: &[&str] = &[
    "del ",
    "rm -rf",
    "rmdir",
    "format ",
    "diskpart",
    "mkfs",
    "reg ",
    "regedit",
    "netsh",
    "ipconfig /release",
    "shutdown",
    "reboot",
    "poweroff",
    "taskkill /f",
    "kill -9",
    "attrib +h",
];

/// Path and command safety rules. Forbidden folders exclude everything
/// under them; safe folders are the only places deletion is allowed.
pub struct SafetyChecker {
    safe_folders: Vec<PathBuf>,
    forbidden_folders: Vec<PathBuf>,
}

impl SafetyChecker {
    pub fn new(safe_folders: Vec<PathBuf>, forbidden_folders: Vec<PathBuf>) -> Self {
        Self {
            safe_folders: safe_folders.iter().map(|p| resolve(p)).collect(),
            forbidden_folders: forbidden_folders.iter().map(|p| resolve(p)).collect(),
        }
    }

    /// Containment is tested on canonical path prefixes, never on
    /// substrings, so traversal and symlinks cannot sneak a path out of a
    /// forbidden root.
    pub fn is_path_safe(&self, path: &Path) -> SafetyVerdict {
        let resolved = resolve(path);
        for forbidden in &self.forbidden_folders {
            if resolved.starts_with(forbidden) {
                return SafetyVerdict::deny(format!(
                    "path is inside forbidden folder {}",
                    forbidden.display()
                ));
            }
        }
        SafetyVerdict::allow("path is safe")
    }

    /// Deletion is strictly opt-in by folder, unlike read/write which only
    /// excludes forbidden roots.
    pub fn can_delete(&self, path: &Path) -> SafetyVerdict {
        let base = self.is_path_safe(path);
        if !base.allowed {
            return base;
        }
        let resolved = resolve(path);
        if self
            .safe_folders
            .iter()
            .any(|safe| resolved.starts_with(safe))
        {
            SafetyVerdict::allow("file can be deleted")
        } else {
            SafetyVerdict::deny("file deletion only allowed inside safe folders")
        }
    }

    /// A pass here is necessary, not sufficient: the caller still owns
    /// confirmation before executing anything.
    pub fn can_execute_command(&self, command_text: &str) -> SafetyVerdict {
        let lowered = command_text.to_lowercase();
        for pattern in DANGEROUS_PATTERNS {
            if lowered.contains(pattern) {
                return SafetyVerdict::deny(format!(
                    "command contains dangerous pattern: {pattern}"
                ));
            }
        }
        for forbidden in &self.forbidden_folders {
            let folded = forbidden.display().to_string().to_lowercase();
            if !folded.is_empty() && lowered.contains(&folded) {
                return SafetyVerdict::deny(format!(
                    "command targets forbidden folder {}",
                    forbidden.display()
                ));
            }
        }
        SafetyVerdict::allow("command appears safe (confirmation still required)")
    }
}

/// Canonicalize when the path exists; otherwise fold `.`/`..` lexically,
/// anchor relative paths at the cwd, and canonicalize the nearest existing
/// ancestor so verdicts on not-yet-existing paths still compare by
/// canonical prefix.
fn resolve(path: &Path) -> PathBuf {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return canonical;
    }
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    };
    let mut folded = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                folded.pop();
            }
            other => folded.push(other.as_os_str()),
        }
    }
    let mut ancestor = folded.clone();
    let mut tail = Vec::new();
    while !ancestor.as_os_str().is_empty() {
        if let Ok(canonical) = std::fs::canonicalize(&ancestor) {
            let mut out = canonical;
            for name in tail.iter().rev() {
                out.push(name);
            }
            return out;
        }
        match ancestor.file_name() {
            Some(name) => {
                tail.push(name.to_os_string());
                ancestor.pop();
            }
            None => break,
        }
    }
    folded
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use tempfile::tempdir;

    use super::{resolve, SafetyChecker};

    fn checker(safe: &Path, forbidden: &Path) -> SafetyChecker {
        SafetyChecker::new(vec![safe.to_path_buf()], vec![forbidden.to_path_buf()])
    }

    #[test]
    fn paths_under_forbidden_roots_are_rejected() {
        let tmp = tempdir().expect("tempdir");
        let forbidden = tmp.path().join("system");
        std::fs::create_dir_all(forbidden.join("drivers")).expect("mkdir");
        let c = checker(&tmp.path().join("safe"), &forbidden);

        let verdict = c.is_path_safe(&forbidden.join("drivers/critical.dll"));
        assert!(!verdict.allowed);
        assert!(verdict.reason.contains("forbidden folder"));

        let verdict = c.is_path_safe(&tmp.path().join("elsewhere/file.txt"));
        assert!(verdict.allowed);
    }

    #[test]
    fn containment_is_prefix_based_not_substring() {
        let tmp = tempdir().expect("tempdir");
        let forbidden = tmp.path().join("sys");
        std::fs::create_dir_all(&forbidden).expect("mkdir");
        let c = checker(&tmp.path().join("safe"), &forbidden);
        // a sibling whose name merely starts with the forbidden name
        let sibling = tmp.path().join("system-backup/file.txt");
        assert!(c.is_path_safe(&sibling).allowed);
    }

    #[test]
    fn traversal_cannot_escape_a_forbidden_root_check() {
        let tmp = tempdir().expect("tempdir");
        let forbidden = tmp.path().join("system");
        std::fs::create_dir_all(&forbidden).expect("mkdir");
        let c = checker(&tmp.path().join("safe"), &forbidden);
        let sneaky = tmp.path().join("ok/../system/hidden.dll");
        assert!(!c.is_path_safe(&sneaky).allowed);
    }

    #[test]
    fn deletion_requires_a_safe_folder() {
        let tmp = tempdir().expect("tempdir");
        let safe = tmp.path().join("sandbox");
        let forbidden = tmp.path().join("system");
        std::fs::create_dir_all(&safe).expect("mkdir");
        std::fs::create_dir_all(&forbidden).expect("mkdir");
        let c = checker(&safe, &forbidden);

        assert!(c.can_delete(&safe.join("scratch.txt")).allowed);

        let outside = c.can_delete(&tmp.path().join("other/file.txt"));
        assert!(!outside.allowed);
        assert!(outside.reason.contains("safe folders"));

        let inside_forbidden = c.can_delete(&forbidden.join("x.dll"));
        assert!(!inside_forbidden.allowed);
        assert!(inside_forbidden.reason.contains("forbidden folder"));
    }

    #[test]
    fn dangerous_command_patterns_are_rejected() {
        let tmp = tempdir().expect("tempdir");
        let c = checker(&tmp.path().join("safe"), &tmp.path().join("system"));
        for cmd in [
            "format c:",
            "regedit /s evil.reg",
            "taskkill /f /im explorer.exe",
            "shutdown now",
            "netsh interface set",
            "rm -rf /",
        ] {
            let verdict = c.can_execute_command(cmd);
            assert!(!verdict.allowed, "expected rejection for {cmd}");
        }
    }

    #[test]
    fn benign_command_passes_with_confirmation_caveat() {
        let tmp = tempdir().expect("tempdir");
        let c = checker(&tmp.path().join("safe"), &tmp.path().join("system"));
        let verdict = c.can_execute_command("echo hello");
        assert!(verdict.allowed);
        assert!(verdict.reason.contains("confirmation still required"));
    }

    #[test]
    fn command_referencing_forbidden_folder_is_rejected() {
        let tmp = tempdir().expect("tempdir");
        let forbidden = tmp.path().join("system");
        std::fs::create_dir_all(&forbidden).expect("mkdir");
        let c = checker(&tmp.path().join("safe"), &forbidden);
        let cmd = format!("type {}", forbidden.join("secrets.txt").display());
        assert!(!c.can_execute_command(&cmd).allowed);
    }

    #[test]
    fn resolve_folds_dot_components_for_missing_paths() {
        let tmp = tempdir().expect("tempdir");
        let folded = resolve(&tmp.path().join("a/./b/../c/file.txt"));
        assert!(folded.ends_with("a/c/file.txt"));
    }
}
