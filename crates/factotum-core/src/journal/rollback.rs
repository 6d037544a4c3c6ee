//! Rollback of journaled effects
//!
//! Per-entry rollback restores one action and appends a synthetic
//! `rollback-<id>` record; per-run rollback walks the run's entries in
//! reverse insertion order. Individual failures never abort a run-level
//! rollback; they are collected into the report.

use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Result};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use super::entry::{ActionKind, JournalEntry, ROLLBACK_ID_PREFIX};
use super::Journal;

/// Result of one attempted entry rollback.
#[derive(Debug, Clone, Serialize)]
pub struct RollbackOutcome {
    pub entry_id: String,
    pub action: ActionKind,
    pub success: bool,
    pub message: String,
}

/// Aggregate result of a run-level rollback.
#[derive(Debug, Clone, Serialize)]
pub struct RollbackReport {
    pub run_id: String,
    pub attempted: usize,
    pub success: bool,
    pub outcomes: Vec<RollbackOutcome>,
}

impl Journal {
    /// Roll back a single entry.
    ///
    /// Fails when the entry does not exist, is not reversible, or was
    /// already rolled back. On success the original entry is marked and a
    /// synthetic record is appended.
    pub fn rollback_entry(&self, run_id: &str, entry_id: &str) -> Result<RollbackOutcome> {
        let entries = self.entries(run_id)?;
        let entry = entries
            .iter()
            .find(|e| e.id == entry_id)
            .ok_or_else(|| anyhow!("journal entry not found: {entry_id}"))?;

        if !entry.reversible {
            bail!("journal entry is not reversible: {entry_id}");
        }
        if entry.rolled_back {
            bail!("journal entry already rolled back: {entry_id}");
        }

        self.undo(entry)?;
        self.mark_rolled_back(run_id, entry_id)?;
        self.append_synthetic(entry)?;

        Ok(RollbackOutcome {
            entry_id: entry_id.to_string(),
            action: entry.action,
            success: true,
            message: format!("restored {}", entry.target),
        })
    }

    /// Roll back every reversible, not-yet-rolled-back entry of a run, in
    /// reverse insertion order. Synthetic records are skipped. Overall
    /// success requires every attempted rollback to succeed.
    pub fn rollback_run(&self, run_id: &str) -> Result<RollbackReport> {
        let entries = self.entries(run_id)?;
        let mut outcomes = Vec::new();

        for entry in entries.iter().rev() {
            if entry.is_synthetic() || !entry.reversible || entry.rolled_back {
                continue;
            }
            match self.rollback_entry(run_id, &entry.id) {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => outcomes.push(RollbackOutcome {
                    entry_id: entry.id.clone(),
                    action: entry.action,
                    success: false,
                    message: e.to_string(),
                }),
            }
        }

        let success = outcomes.iter().all(|o| o.success);
        Ok(RollbackReport {
            run_id: run_id.to_string(),
            attempted: outcomes.len(),
            success,
            outcomes,
        })
    }

    /// Apply the inverse effect of one entry.
    fn undo(&self, entry: &JournalEntry) -> Result<()> {
        let target = Path::new(&entry.target);
        match entry.action {
            ActionKind::FileCreate => {
                if target.exists() {
                    fs::remove_file(target)?;
                }
                Ok(())
            }
            ActionKind::FileModify => {
                let content = self.recover_before(entry)?;
                fs::write(target, content)?;
                Ok(())
            }
            ActionKind::FileDelete => {
                let content = self.recover_before(entry)?;
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(target, content)?;
                Ok(())
            }
            ActionKind::DirectoryCreate => {
                if target.exists() {
                    fs::remove_dir(target)
                        .map_err(|e| anyhow!("cannot remove directory {}: {e}", entry.target))?;
                }
                Ok(())
            }
            _ => bail!("action kind {} is not reversible", entry.action.as_str()),
        }
    }

    /// Prefer the backup artifact; fall back to the inline before-state.
    fn recover_before(&self, entry: &JournalEntry) -> Result<String> {
        if let Some(backup) = entry.backup_path() {
            let backup = Path::new(backup);
            if backup.exists() {
                return Ok(fs::read_to_string(backup)?);
            }
        }
        entry
            .before
            .clone()
            .ok_or_else(|| anyhow!("entry {} has no recoverable before-state", entry.id))
    }

    fn append_synthetic(&self, original: &JournalEntry) -> Result<()> {
        let synthetic = JournalEntry {
            id: format!("{ROLLBACK_ID_PREFIX}{}", original.id),
            timestamp: Utc::now().to_rfc3339(),
            run_id: original.run_id.clone(),
            action: original.action,
            target: original.target.clone(),
            description: format!("Rolled back: {}", original.description),
            before: None,
            after: None,
            command: None,
            reversible: false,
            rolled_back: false,
            metadata: Value::Null,
        };
        self.append(&synthetic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Journal) {
        let tmp = TempDir::new().unwrap();
        let j = Journal::new(tmp.path().join("journal"), tmp.path().join("backups")).unwrap();
        (tmp, j)
    }

    #[test]
    fn rollback_of_create_deletes_the_file() {
        let (tmp, j) = setup();
        let file = tmp.path().join("a.txt");
        fs::write(&file, "hello").unwrap();
        let entry = j.record_file_create("run-1", &file, "hello").unwrap();

        let outcome = j.rollback_entry("run-1", &entry.id).unwrap();
        assert!(outcome.success);
        assert!(!file.exists());

        let entries = j.entries("run-1").unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].rolled_back);
        assert_eq!(entries[1].id, format!("rollback-{}", entry.id));
    }

    #[test]
    fn rollback_of_modify_prefers_backup_artifact() {
        let (tmp, j) = setup();
        let file = tmp.path().join("a.txt");
        fs::write(&file, "new content").unwrap();
        let entry = j
            .record_file_modify("run-1", &file, "old content", "new content", "edit")
            .unwrap();

        j.rollback_entry("run-1", &entry.id).unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "old content");
    }

    #[test]
    fn rollback_of_delete_recreates_parents() {
        let (tmp, j) = setup();
        let file = tmp.path().join("deep/nested/a.txt");
        let entry = j.record_file_delete("run-1", &file, "payload").unwrap();

        j.rollback_entry("run-1", &entry.id).unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "payload");
    }

    #[test]
    fn non_reversible_entry_fails() {
        let (_tmp, j) = setup();
        let entry = j.record_terminal_command("run-1", "ls", "").unwrap();
        let err = j.rollback_entry("run-1", &entry.id).unwrap_err();
        assert!(err.to_string().contains("not reversible"));
    }

    #[test]
    fn double_rollback_fails() {
        let (tmp, j) = setup();
        let file = tmp.path().join("a.txt");
        fs::write(&file, "x").unwrap();
        let entry = j.record_file_create("run-1", &file, "x").unwrap();

        j.rollback_entry("run-1", &entry.id).unwrap();
        let err = j.rollback_entry("run-1", &entry.id).unwrap_err();
        assert!(err.to_string().contains("already rolled back"));
    }

    #[test]
    fn missing_entry_fails() {
        let (_tmp, j) = setup();
        assert!(j.rollback_entry("run-1", "act-nope").is_err());
    }

    #[test]
    fn run_rollback_restores_byte_for_byte_state() {
        let (tmp, j) = setup();
        let file = tmp.path().join("a.txt");

        // create → modify → delete, as one run
        fs::write(&file, "v1").unwrap();
        j.record_file_create("run-1", &file, "v1").unwrap();
        fs::write(&file, "v2").unwrap();
        j.record_file_modify("run-1", &file, "v1", "v2", "edit").unwrap();
        fs::remove_file(&file).unwrap();
        j.record_file_delete("run-1", &file, "v2").unwrap();

        let report = j.rollback_run("run-1").unwrap();
        assert!(report.success);
        assert_eq!(report.attempted, 3);
        // Pre-run state: the file did not exist.
        assert!(!file.exists());
    }

    #[test]
    fn run_rollback_is_idempotent() {
        let (tmp, j) = setup();
        let file = tmp.path().join("a.txt");
        fs::write(&file, "x").unwrap();
        j.record_file_create("run-1", &file, "x").unwrap();

        let first = j.rollback_run("run-1").unwrap();
        assert!(first.success);
        assert!(!file.exists());

        // Second pass attempts nothing: the only live entry is rolled back
        // and the synthetic record is skipped.
        let second = j.rollback_run("run-1").unwrap();
        assert!(second.success);
        assert_eq!(second.attempted, 0);
        assert!(!file.exists());
    }

    #[test]
    fn nonempty_directory_rollback_fails_gracefully() {
        let (tmp, j) = setup();
        let dir = tmp.path().join("made");
        fs::create_dir(&dir).unwrap();
        j.record_directory_create("run-1", &dir).unwrap();
        fs::write(dir.join("occupant.txt"), "here").unwrap();

        let report = j.rollback_run("run-1").unwrap();
        assert!(!report.success);
        assert_eq!(report.attempted, 1);
        assert!(dir.exists());
    }
}
