//! Runtime assembly
//!
//! Wires the services, providers, router, registry, agent loop, plan
//! runner, and MCP host together and exposes the public entry points:
//! `run_objective`, `chat`, `generate_plan`, `run_steps`.

use std::sync::Arc;

use anyhow::Result;

use crate::agent::context::{AgentOptions, AgentResult, RunContext};
use crate::agent::orchestrator::AgentLoop;
use crate::agent::planner;
use crate::ai::providers::default_providers;
use crate::ai::router::Router;
use crate::ai::types::{ChatMessage, Completion};
use crate::config::Config;
use crate::error::CoreError;
use crate::mcp::{register_mcp_tools, McpConfig, McpHost};
use crate::paths;
use crate::plan::runner::PlanRunner;
use crate::plan::types::{Plan, PlanRunResult, PlanStep};
use crate::sandbox::SandboxPolicy;
use crate::services::RuntimeServices;
use crate::tools::implementations::register_builtin_tools;
use crate::tools::registry::ToolRegistry;

pub struct Runtime {
    pub services: Arc<RuntimeServices>,
    pub router: Arc<Router>,
    pub registry: Arc<ToolRegistry>,
    agent: AgentLoop,
    plan_runner: PlanRunner,
    mcp: Option<Arc<McpHost>>,
}

impl Runtime {
    /// Assemble the runtime from the environment and default directories.
    pub async fn from_env() -> Result<Self> {
        let config = Config::from_env();
        let sandbox = SandboxPolicy::new(config.sandbox_root.clone())
            .with_extra_whitelist(&config.extra_whitelist);
        let services = RuntimeServices::open_default(sandbox)?;
        let mcp_config = McpConfig::load(&paths::mcp_config_path())?;
        Self::assemble(config, services, mcp_config).await
    }

    /// Assemble with explicit services and MCP config (tests, embedders).
    pub async fn assemble(
        config: Config,
        services: Arc<RuntimeServices>,
        mcp_config: McpConfig,
    ) -> Result<Self> {
        let providers = default_providers(&config);
        let router = Arc::new(
            Router::new(providers, services.audit.clone())
                .with_default_provider(config.default_provider.clone()),
        );

        let registry = Arc::new(ToolRegistry::new());
        register_builtin_tools(&registry, router.clone()).await;

        let mcp = if mcp_config.servers.is_empty() {
            None
        } else {
            let host = Arc::new(McpHost::new(mcp_config, config.sandbox_root.clone()));
            host.connect_all().await;
            register_mcp_tools(&registry, host.clone()).await;
            Some(host)
        };

        let agent = AgentLoop::new(router.clone(), registry.clone(), services.clone());
        let plan_runner = PlanRunner::new(registry.clone(), services.clone());

        Ok(Self {
            services,
            router,
            registry,
            agent,
            plan_runner,
            mcp,
        })
    }

    /// Run one natural-language objective through the agent loop.
    pub async fn run_objective(&self, objective: &str, options: AgentOptions) -> AgentResult {
        self.agent.run_objective(objective, options).await
    }

    /// One interactive completion over an existing conversation.
    pub async fn chat(
        &self,
        ctx: &RunContext,
        messages: Vec<ChatMessage>,
    ) -> Result<Completion, CoreError> {
        self.agent.chat(ctx, messages).await
    }

    /// Ask the planner for a structured plan.
    pub async fn generate_plan(&self, objective: &str) -> Result<Plan, CoreError> {
        let ctx = RunContext::new(objective);
        planner::generate_plan(&self.router, &ctx, objective).await
    }

    /// Execute plan steps deterministically.
    pub async fn run_steps(
        &self,
        ctx: &RunContext,
        steps: &[PlanStep],
    ) -> Result<PlanRunResult, CoreError> {
        self.plan_runner.run(ctx, steps).await
    }

    /// Close tool-server transports.
    pub async fn shutdown(&self) {
        if let Some(mcp) = &self.mcp {
            mcp.shutdown().await;
        }
    }
}
