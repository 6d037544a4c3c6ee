//! Built-in tool implementations

mod approval;
mod editor;
mod filesystem;
mod journal_tool;
mod memory;
mod messaging;
mod report;
mod search;
mod terminal;
mod think;

pub use approval::RequestApprovalTool;
pub use editor::EditorTool;
pub use filesystem::FilesystemTool;
pub use journal_tool::JournalTool;
pub use memory::MemoryTool;
pub use messaging::{CalendarTool, ChatTool, EmailTool, NotifyTool};
pub use report::ReportTool;
pub use search::SearchTool;
pub use terminal::TerminalTool;
pub use think::ThinkTool;

use std::sync::Arc;

use crate::ai::router::Router;
use crate::tools::registry::ToolRegistry;

/// Register the built-in tool set.
pub async fn register_builtin_tools(registry: &ToolRegistry, router: Arc<Router>) {
    registry.register(Arc::new(FilesystemTool)).await;
    registry.register(Arc::new(TerminalTool)).await;
    registry.register(Arc::new(EditorTool)).await;
    registry.register(Arc::new(SearchTool::new(router))).await;
    registry.register(Arc::new(ThinkTool)).await;
    registry.register(Arc::new(MemoryTool)).await;
    registry.register(Arc::new(RequestApprovalTool)).await;
    registry.register(Arc::new(ReportTool)).await;
    registry.register(Arc::new(EmailTool)).await;
    registry.register(Arc::new(CalendarTool)).await;
    registry.register(Arc::new(ChatTool)).await;
    registry.register(Arc::new(NotifyTool)).await;
    registry.register(Arc::new(JournalTool)).await;
}
