//! Search tool
//!
//! Delegates the query to the search-optimized provider through the router;
//! the router's fallback chain still applies when that provider is down.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::ai::router::Router;
use crate::ai::types::{ChatMessage, CompletionRequest};
use crate::tools::registry::{parse_params, Tool, ToolContext, ToolOutcome};

const SEARCH_PROVIDER: &str = "perplexity";

pub struct SearchTool {
    router: Arc<Router>,
}

impl SearchTool {
    pub fn new(router: Arc<Router>) -> Self {
        Self { router }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum Kind {
    Web,
    News,
    Code,
    Docs,
}

impl Kind {
    fn as_str(&self) -> &'static str {
        match self {
            Kind::Web => "the web",
            Kind::News => "recent news",
            Kind::Code => "code and repositories",
            Kind::Docs => "technical documentation",
        }
    }
}

#[derive(Deserialize)]
struct Params {
    query: String,
    kind: Option<Kind>,
}

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Search the web, news, code, or docs and return a synthesized answer."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "What to search for"},
                "kind": {
                    "type": "string",
                    "enum": ["web", "news", "code", "docs"],
                    "description": "Search flavor, defaults to web"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        let params = match parse_params::<Params>(args) {
            Ok(p) => p,
            Err(e) => return e,
        };

        let scope = params.kind.unwrap_or(Kind::Web);
        let request = CompletionRequest::new(vec![ChatMessage::user(format!(
            "Search {} and answer concisely with sources: {}",
            scope.as_str(),
            params.query
        ))]);

        match self
            .router
            .complete(&request, &ctx.run, Some(SEARCH_PROVIDER))
            .await
        {
            Ok(completion) => ToolOutcome::ok(json!({
                "provider": completion.provider,
                "result": completion.message.content,
            })),
            Err(e) => ToolOutcome::fail(format!("search failed: {e}")),
        }
    }
}
