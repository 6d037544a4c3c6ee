//! Shared runtime services
//!
//! The audit sink, journal, sandbox policy, memo store, and outbound
//! adapter are process-wide services with explicit initialization. They are
//! threaded as dependencies (never ambient globals) so tests can build
//! isolated copies on temp directories.

use std::sync::Arc;

use anyhow::Result;

use crate::audit::AuditSink;
use crate::journal::Journal;
use crate::memo::MemoStore;
use crate::paths;
use crate::sandbox::SandboxPolicy;
use crate::tools::outbound::{LogOnlyOutbound, OutboundAdapter};

pub struct RuntimeServices {
    pub audit: Arc<AuditSink>,
    pub journal: Arc<Journal>,
    pub sandbox: Arc<SandboxPolicy>,
    pub memo: Arc<MemoStore>,
    pub outbound: Arc<dyn OutboundAdapter>,
}

impl RuntimeServices {
    /// Services at the default application directories.
    pub fn open_default(sandbox: SandboxPolicy) -> Result<Arc<Self>> {
        Ok(Arc::new(Self {
            audit: Arc::new(AuditSink::open(&paths::audit_db_path())?),
            journal: Arc::new(Journal::open_default()?),
            sandbox: Arc::new(sandbox),
            memo: Arc::new(MemoStore::open_default()),
            outbound: Arc::new(LogOnlyOutbound),
        }))
    }

    /// Isolated services rooted at a single directory (tests, demos).
    pub fn open_at(root: &std::path::Path, sandbox: SandboxPolicy) -> Result<Arc<Self>> {
        Ok(Arc::new(Self {
            audit: Arc::new(AuditSink::open(&root.join("audit.db"))?),
            journal: Arc::new(Journal::new(root.join("journal"), root.join("backups"))?),
            sandbox: Arc::new(sandbox),
            memo: Arc::new(MemoStore::new(root.join("memo.json"))),
            outbound: Arc::new(LogOnlyOutbound),
        }))
    }

    pub fn with_outbound(self: Arc<Self>, outbound: Arc<dyn OutboundAdapter>) -> Arc<Self> {
        Arc::new(Self {
            audit: self.audit.clone(),
            journal: self.journal.clone(),
            sandbox: self.sandbox.clone(),
            memo: self.memo.clone(),
            outbound,
        })
    }
}
