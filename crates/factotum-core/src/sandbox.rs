//! Sandbox policy
//!
//! Pure ALLOW/DENY decision for proposed effects. Filesystem targets must
//! lie under the allowed root after lexical normalization; shell commands
//! must match one of the whitelist patterns. Everything else is allowed.
//! The policy holds no I/O handles, so decisions are cheap and testable.

use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::CoreError;

pub const REASON_PATH_OUTSIDE_SANDBOX: &str = "path_outside_sandbox";
pub const REASON_CMD_NOT_WHITELISTED: &str = "terminal_cmd_not_whitelisted";

/// A proposed effect to be judged.
#[derive(Debug, Clone)]
pub enum Effect<'a> {
    Filesystem { path: &'a Path },
    Terminal { command: &'a str },
    Other,
}

/// Policy verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny { reason: String },
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

static DEFAULT_WHITELIST: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"^ls(\s|$)",
        r"^cat\s",
        r"^echo(\s|$)",
        r"^pwd$",
        r"^mkdir\s",
        r"^chmod\s+[0-7]{3}\s",
        r"^chmod\s+u\+x\s",
        r"^\./[\w./-]+",
        r"^python3?\s",
        r"^node\s",
        r"^git\s+(status|log|diff)(\s|$)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("builtin whitelist pattern"))
    .collect()
});

/// Allow-list policy governing filesystem and shell effects.
pub struct SandboxPolicy {
    allowed_root: PathBuf,
    whitelist: Vec<Regex>,
}

impl SandboxPolicy {
    /// Policy with the default command whitelist.
    pub fn new(allowed_root: impl Into<PathBuf>) -> Self {
        Self {
            allowed_root: normalize(&allowed_root.into(), Path::new("/")),
            whitelist: DEFAULT_WHITELIST.clone(),
        }
    }

    /// Append extra whitelist patterns. Invalid patterns are skipped with a warning.
    pub fn with_extra_whitelist(mut self, patterns: &[String]) -> Self {
        for p in patterns {
            match Regex::new(p) {
                Ok(re) => self.whitelist.push(re),
                Err(e) => tracing::warn!(pattern = %p, "Skipping invalid whitelist pattern: {}", e),
            }
        }
        self
    }

    pub fn allowed_root(&self) -> &Path {
        &self.allowed_root
    }

    /// Judge a proposed effect.
    pub fn decide(&self, effect: &Effect) -> Decision {
        match effect {
            Effect::Filesystem { path } => {
                let resolved = normalize(path, &self.allowed_root);
                if resolved.starts_with(&self.allowed_root) {
                    Decision::Allow
                } else {
                    Decision::Deny {
                        reason: REASON_PATH_OUTSIDE_SANDBOX.to_string(),
                    }
                }
            }
            Effect::Terminal { command } => {
                let trimmed = command.trim();
                if self.whitelist.iter().any(|re| re.is_match(trimmed)) {
                    Decision::Allow
                } else {
                    Decision::Deny {
                        reason: REASON_CMD_NOT_WHITELISTED.to_string(),
                    }
                }
            }
            Effect::Other => Decision::Allow,
        }
    }

    /// Pre-check hook: raises a denial-kind failure carrying the reason.
    pub fn check(&self, effect: &Effect) -> Result<(), CoreError> {
        match self.decide(effect) {
            Decision::Allow => Ok(()),
            Decision::Deny { reason } => Err(CoreError::denied(reason)),
        }
    }
}

/// Lexical normalization: make relative paths absolute under `base`,
/// resolve `.` and `..` without touching the filesystem.
fn normalize(path: &Path, base: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> SandboxPolicy {
        SandboxPolicy::new("/sandbox/work")
    }

    #[test]
    fn path_inside_root_is_allowed() {
        let p = policy();
        let d = p.decide(&Effect::Filesystem {
            path: Path::new("/sandbox/work/demo_v2/main.sh"),
        });
        assert!(d.is_allow());
    }

    #[test]
    fn path_outside_root_is_denied_with_reason() {
        let p = policy();
        let d = p.decide(&Effect::Filesystem {
            path: Path::new("/etc/passwd"),
        });
        assert_eq!(
            d,
            Decision::Deny {
                reason: REASON_PATH_OUTSIDE_SANDBOX.to_string()
            }
        );
    }

    #[test]
    fn traversal_cannot_escape_root() {
        let p = policy();
        let d = p.decide(&Effect::Filesystem {
            path: Path::new("/sandbox/work/sub/../../../etc/passwd"),
        });
        assert!(!d.is_allow());
    }

    #[test]
    fn relative_paths_resolve_under_root() {
        let p = policy();
        assert!(p
            .decide(&Effect::Filesystem {
                path: Path::new("demo_v2/main.sh"),
            })
            .is_allow());
    }

    #[test]
    fn whitelisted_commands_pass() {
        let p = policy();
        for cmd in [
            "ls -la",
            "echo hello",
            "./demo_v2/main.sh",
            "chmod 755 demo_v2/main.sh",
            "git status",
            "python3 script.py",
        ] {
            assert!(
                p.decide(&Effect::Terminal { command: cmd }).is_allow(),
                "expected allow for {cmd}"
            );
        }
    }

    #[test]
    fn non_whitelisted_commands_are_denied() {
        let p = policy();
        for cmd in ["rm -rf /", "curl http://example.com", "sudo reboot"] {
            let d = p.decide(&Effect::Terminal { command: cmd });
            assert_eq!(
                d,
                Decision::Deny {
                    reason: REASON_CMD_NOT_WHITELISTED.to_string()
                },
                "expected deny for {cmd}"
            );
        }
    }

    #[test]
    fn check_maps_denial_to_error() {
        let p = policy();
        let err = p
            .check(&Effect::Terminal { command: "rm -rf /" })
            .unwrap_err();
        assert_eq!(err.to_string(), "Denied: terminal_cmd_not_whitelisted");
    }

    #[test]
    fn other_effects_are_allowed_by_default() {
        assert!(policy().decide(&Effect::Other).is_allow());
    }
}
