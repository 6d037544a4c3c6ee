//! Centralized path utilities
//!
//! All application paths in one place for consistency

use std::path::PathBuf;

const CONFIG_DIR_NAME: &str = ".factotum";

/// Get the factotum config directory (~/.factotum)
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(CONFIG_DIR_NAME)
}

/// Get the data directory (~/.factotum/data)
pub fn data_dir() -> PathBuf {
    config_dir().join("data")
}

/// Get the journal directory (~/.factotum/journal)
pub fn journal_dir() -> PathBuf {
    config_dir().join("journal")
}

/// Get the backups directory (~/.factotum/backups)
pub fn backups_dir() -> PathBuf {
    config_dir().join("backups")
}

/// Get the audit database path (~/.factotum/data/audit.db)
pub fn audit_db_path() -> PathBuf {
    data_dir().join("audit.db")
}

/// Get the memo overlay path (~/.factotum/data/memo.json)
pub fn memo_path() -> PathBuf {
    data_dir().join("memo.json")
}

/// Get the MCP server config path (~/.factotum/mcp.json)
pub fn mcp_config_path() -> PathBuf {
    config_dir().join("mcp.json")
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(dir: &PathBuf) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    Ok(dir.clone())
}
