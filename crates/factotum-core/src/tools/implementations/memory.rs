//! Memory tool
//!
//! Store/retrieve/search/list over the memo overlay. The full memory system
//! is an external collaborator; this covers the key/value surface.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::tools::registry::{parse_params, Tool, ToolContext, ToolOutcome};

pub struct MemoryTool;

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum Operation {
    Store,
    Retrieve,
    Search,
    List,
}

#[derive(Deserialize)]
struct Params {
    operation: Operation,
    key: Option<String>,
    value: Option<String>,
    query: Option<String>,
}

#[async_trait]
impl Tool for MemoryTool {
    fn name(&self) -> &str {
        "memory"
    }

    fn description(&self) -> &str {
        "Persistent key/value memory: store, retrieve, search, list."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["store", "retrieve", "search", "list"]
                },
                "key": {"type": "string"},
                "value": {"type": "string"},
                "query": {"type": "string"}
            },
            "required": ["operation"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> ToolOutcome {
        let params = match parse_params::<Params>(args) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let memo = &ctx.services.memo;

        match params.operation {
            Operation::Store => {
                let (Some(key), Some(value)) = (params.key, params.value) else {
                    return ToolOutcome::fail("store requires 'key' and 'value'");
                };
                match memo.set(&key, &value) {
                    Ok(()) => ToolOutcome::ok(json!({ "stored": key })),
                    Err(e) => ToolOutcome::fail(format!("store failed: {e}")),
                }
            }
            Operation::Retrieve => {
                let Some(key) = params.key else {
                    return ToolOutcome::fail("retrieve requires 'key'");
                };
                match memo.get(&key) {
                    Some(value) => ToolOutcome::ok(json!({ "key": key, "value": value })),
                    None => ToolOutcome::fail(format!("no memory under key '{key}'")),
                }
            }
            Operation::Search => {
                let Some(query) = params.query else {
                    return ToolOutcome::fail("search requires 'query'");
                };
                let hits: Vec<Value> = memo
                    .search(&query)
                    .into_iter()
                    .map(|(k, v)| json!({ "key": k, "value": v }))
                    .collect();
                ToolOutcome::ok(json!({ "hits": hits }))
            }
            Operation::List => ToolOutcome::ok(json!({ "keys": memo.keys() })),
        }
    }
}
