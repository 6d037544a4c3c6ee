//! Action journal
//!
//! Records reversible effects with their before-state so they can be undone
//! later. Each run gets its own JSONL file (`<journal-dir>/<run_id>.jsonl`);
//! file modifications and deletions additionally copy the prior content into
//! a backup artifact (`<backups-dir>/<entry_id>-<basename>`). Rollback walks
//! a run's entries in reverse insertion order.

mod entry;
mod rollback;

pub use entry::{
    ActionKind, JournalEntry, JournalSummary, RunListing, BEFORE_NULL, ROLLBACK_ID_PREFIX,
};
pub use rollback::{RollbackOutcome, RollbackReport};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::{json, Value};

use crate::paths;

/// Per-run action log with backup artifacts.
pub struct Journal {
    journal_dir: PathBuf,
    backups_dir: PathBuf,
}

impl Journal {
    /// Open a journal rooted at explicit directories (tests use temp dirs).
    pub fn new(journal_dir: impl Into<PathBuf>, backups_dir: impl Into<PathBuf>) -> Result<Self> {
        let journal_dir = journal_dir.into();
        let backups_dir = backups_dir.into();
        fs::create_dir_all(&journal_dir)?;
        fs::create_dir_all(&backups_dir)?;
        Ok(Self {
            journal_dir,
            backups_dir,
        })
    }

    /// Open the journal at the default application directories.
    pub fn open_default() -> Result<Self> {
        Self::new(paths::journal_dir(), paths::backups_dir())
    }

    pub fn run_file(&self, run_id: &str) -> PathBuf {
        self.journal_dir.join(format!("{run_id}.jsonl"))
    }

    // ── Recording ──────────────────────────────────────────────────────

    /// Record a file creation. Rollback deletes the file.
    pub fn record_file_create(&self, run_id: &str, path: &Path, content: &str) -> Result<JournalEntry> {
        let entry = self.base_entry(
            run_id,
            ActionKind::FileCreate,
            &path.display().to_string(),
            &format!("Created file {}", path.display()),
        );
        let entry = JournalEntry {
            before: Some(BEFORE_NULL.to_string()),
            after: Some(content.to_string()),
            reversible: true,
            ..entry
        };
        self.append(&entry)?;
        Ok(entry)
    }

    /// Record a file modification. The prior content is copied into a backup
    /// artifact and kept inline; rollback prefers the artifact.
    pub fn record_file_modify(
        &self,
        run_id: &str,
        path: &Path,
        before: &str,
        after: &str,
        description: &str,
    ) -> Result<JournalEntry> {
        let mut entry = self.base_entry(
            run_id,
            ActionKind::FileModify,
            &path.display().to_string(),
            description,
        );
        let backup = self.write_backup(&entry.id, path, before)?;
        entry.before = Some(before.to_string());
        entry.after = Some(after.to_string());
        entry.reversible = true;
        entry.metadata = json!({ "backup_path": backup.display().to_string() });
        self.append(&entry)?;
        Ok(entry)
    }

    /// Record a file deletion. Rollback recreates the file (and any missing
    /// parent directories) from the backup artifact or the inline before.
    pub fn record_file_delete(&self, run_id: &str, path: &Path, before: &str) -> Result<JournalEntry> {
        let mut entry = self.base_entry(
            run_id,
            ActionKind::FileDelete,
            &path.display().to_string(),
            &format!("Deleted file {}", path.display()),
        );
        let backup = self.write_backup(&entry.id, path, before)?;
        entry.before = Some(before.to_string());
        entry.reversible = true;
        entry.metadata = json!({ "backup_path": backup.display().to_string() });
        self.append(&entry)?;
        Ok(entry)
    }

    /// Record a directory creation. Rollback removes the directory and fails
    /// gracefully when it is no longer empty.
    pub fn record_directory_create(&self, run_id: &str, path: &Path) -> Result<JournalEntry> {
        let entry = self.base_entry(
            run_id,
            ActionKind::DirectoryCreate,
            &path.display().to_string(),
            &format!("Created directory {}", path.display()),
        );
        let entry = JournalEntry {
            reversible: true,
            ..entry
        };
        self.append(&entry)?;
        Ok(entry)
    }

    /// Record a terminal command. Not reversible; kept for audit.
    pub fn record_terminal_command(&self, run_id: &str, command: &str, output: &str) -> Result<JournalEntry> {
        let entry = self.base_entry(
            run_id,
            ActionKind::TerminalCommand,
            command,
            &format!("Ran command: {command}"),
        );
        let entry = JournalEntry {
            command: Some(command.to_string()),
            after: Some(truncate(output, 4096)),
            ..entry
        };
        self.append(&entry)?;
        Ok(entry)
    }

    /// Record an outbound email. Not reversible.
    pub fn record_email_send(&self, run_id: &str, to: &str, subject: &str) -> Result<JournalEntry> {
        let entry = self.base_entry(
            run_id,
            ActionKind::EmailSend,
            to,
            &format!("Sent email to {to}: {subject}"),
        );
        self.append(&entry)?;
        Ok(entry)
    }

    /// Record an outbound chat message. Not reversible.
    pub fn record_chat_message(&self, run_id: &str, channel: &str, preview: &str) -> Result<JournalEntry> {
        let entry = self.base_entry(
            run_id,
            ActionKind::ChatMessage,
            channel,
            &format!("Posted to {channel}: {}", truncate(preview, 120)),
        );
        self.append(&entry)?;
        Ok(entry)
    }

    /// Record a calendar event creation. Not reversible.
    pub fn record_calendar_event(&self, run_id: &str, title: &str, when: &str) -> Result<JournalEntry> {
        let entry = self.base_entry(
            run_id,
            ActionKind::CalendarEvent,
            title,
            &format!("Created calendar event '{title}' at {when}"),
        );
        self.append(&entry)?;
        Ok(entry)
    }

    // ── Reading ────────────────────────────────────────────────────────

    /// All entries of a run, in insertion order. Unparseable lines are
    /// skipped with a warning.
    pub fn entries(&self, run_id: &str) -> Result<Vec<JournalEntry>> {
        let path = self.run_file(run_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("reading journal {}", path.display()))?;
        let mut entries = Vec::new();
        for line in raw.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<JournalEntry>(line) {
                Ok(e) => entries.push(e),
                Err(e) => tracing::warn!(run_id, "Skipping malformed journal line: {}", e),
            }
        }
        Ok(entries)
    }

    /// Runs with journal files, newest first.
    pub fn list_runs(&self) -> Result<Vec<RunListing>> {
        let mut runs: Vec<(std::time::SystemTime, RunListing)> = Vec::new();
        for dir_entry in fs::read_dir(&self.journal_dir)? {
            let dir_entry = dir_entry?;
            let path = dir_entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            let Some(run_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let modified = dir_entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::UNIX_EPOCH);
            let entries = self.entries(run_id)?.len();
            runs.push((
                modified,
                RunListing {
                    run_id: run_id.to_string(),
                    entries,
                },
            ));
        }
        runs.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(runs.into_iter().map(|(_, r)| r).collect())
    }

    /// Aggregate counts for one run.
    pub fn summary(&self, run_id: &str) -> Result<JournalSummary> {
        let entries = self.entries(run_id)?;
        let mut by_kind = std::collections::BTreeMap::new();
        let mut reversible = 0;
        let mut rolled_back = 0;
        for e in &entries {
            *by_kind.entry(e.action.as_str().to_string()).or_insert(0) += 1;
            if e.reversible {
                reversible += 1;
            }
            if e.rolled_back {
                rolled_back += 1;
            }
        }
        Ok(JournalSummary {
            run_id: run_id.to_string(),
            total: entries.len(),
            reversible,
            rolled_back,
            by_kind,
        })
    }

    // ── Internals ──────────────────────────────────────────────────────

    fn base_entry(
        &self,
        run_id: &str,
        action: ActionKind,
        target: &str,
        description: &str,
    ) -> JournalEntry {
        JournalEntry {
            id: format!("act-{}", uuid::Uuid::new_v4()),
            timestamp: Utc::now().to_rfc3339(),
            run_id: run_id.to_string(),
            action,
            target: target.to_string(),
            description: description.to_string(),
            before: None,
            after: None,
            command: None,
            reversible: false,
            rolled_back: false,
            metadata: Value::Null,
        }
    }

    fn write_backup(&self, entry_id: &str, original: &Path, content: &str) -> Result<PathBuf> {
        let basename = original
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file");
        let backup = self.backups_dir.join(format!("{entry_id}-{basename}"));
        fs::write(&backup, content)
            .with_context(|| format!("writing backup {}", backup.display()))?;
        Ok(backup)
    }

    pub(crate) fn append(&self, entry: &JournalEntry) -> Result<()> {
        let line = serde_json::to_string(entry)?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.run_file(&entry.run_id))?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    /// Rewrite a run's file with `rolled_back = true` on the given entry.
    pub(crate) fn mark_rolled_back(&self, run_id: &str, entry_id: &str) -> Result<()> {
        let mut entries = self.entries(run_id)?;
        for e in &mut entries {
            if e.id == entry_id {
                e.rolled_back = true;
            }
        }
        let mut buf = String::new();
        for e in &entries {
            buf.push_str(&serde_json::to_string(e)?);
            buf.push('\n');
        }
        fs::write(self.run_file(run_id), buf)?;
        Ok(())
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut boundary = max;
    while boundary > 0 && !text.is_char_boundary(boundary) {
        boundary -= 1;
    }
    format!("{}…", &text[..boundary])
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn journal() -> (TempDir, Journal) {
        let tmp = TempDir::new().unwrap();
        let j = Journal::new(tmp.path().join("journal"), tmp.path().join("backups")).unwrap();
        (tmp, j)
    }

    #[test]
    fn entries_round_trip_in_insertion_order() {
        let (_tmp, j) = journal();
        j.record_file_create("run-1", Path::new("/w/a.txt"), "one").unwrap();
        j.record_terminal_command("run-1", "echo hi", "hi\n").unwrap();
        j.record_email_send("run-1", "ops@example.com", "report").unwrap();

        let entries = j.entries("run-1").unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].action, ActionKind::FileCreate);
        assert_eq!(entries[0].before.as_deref(), Some(BEFORE_NULL));
        assert!(entries[0].reversible);
        assert!(!entries[1].reversible);
        assert_eq!(entries[1].command.as_deref(), Some("echo hi"));
        assert_eq!(entries[2].target, "ops@example.com");
    }

    #[test]
    fn modify_writes_backup_artifact() {
        let (_tmp, j) = journal();
        let entry = j
            .record_file_modify("run-1", Path::new("/w/a.txt"), "old", "new", "edited a.txt")
            .unwrap();
        let backup = entry.backup_path().unwrap();
        assert!(backup.ends_with(&format!("{}-a.txt", entry.id)));
        assert_eq!(fs::read_to_string(backup).unwrap(), "old");
    }

    #[test]
    fn summary_counts_kinds_and_flags() {
        let (_tmp, j) = journal();
        j.record_file_create("run-1", Path::new("/w/a.txt"), "x").unwrap();
        j.record_file_create("run-1", Path::new("/w/b.txt"), "y").unwrap();
        j.record_terminal_command("run-1", "ls", "").unwrap();

        let s = j.summary("run-1").unwrap();
        assert_eq!(s.total, 3);
        assert_eq!(s.reversible, 2);
        assert_eq!(s.rolled_back, 0);
        assert_eq!(s.by_kind["file_create"], 2);
        assert_eq!(s.by_kind["terminal_command"], 1);
    }

    #[test]
    fn list_runs_reports_entry_counts() {
        let (_tmp, j) = journal();
        j.record_file_create("run-a", Path::new("/w/a.txt"), "x").unwrap();
        j.record_file_create("run-b", Path::new("/w/b.txt"), "y").unwrap();
        j.record_terminal_command("run-b", "ls", "").unwrap();

        let runs = j.list_runs().unwrap();
        assert_eq!(runs.len(), 2);
        let b = runs.iter().find(|r| r.run_id == "run-b").unwrap();
        assert_eq!(b.entries, 2);
    }
}
