//! Factotum - autonomous tool-use agent runtime
//!
//! Thin CLI over the core entry points: run an objective, generate or
//! execute a plan, inspect and roll back the journal, or hold a one-shot
//! chat turn.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use factotum_core::agent::{AgentOptions, RunBudgets, RunContext};
use factotum_core::ai::types::ChatMessage;
use factotum_core::plan::types::Plan;
use factotum_core::Runtime;

#[derive(Parser)]
#[command(name = "factotum")]
#[command(about = "Autonomous tool-use agent runtime", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a natural-language objective through the agent loop
    Run {
        /// The objective to accomplish
        objective: String,
        /// Iteration budget
        #[arg(long, default_value_t = 25)]
        max_iterations: usize,
        /// Tool-call budget
        #[arg(long, default_value_t = 50)]
        max_tool_calls: usize,
        /// Force a specific provider (anthropic, openai, perplexity, gemini, claude-cli)
        #[arg(long)]
        provider: Option<String>,
    },

    /// Generate a plan for an objective, or execute a plan file
    Plan {
        /// Objective to plan for (omit when using --file)
        objective: Option<String>,
        /// Execute the steps in this JSON plan file
        #[arg(long)]
        file: Option<std::path::PathBuf>,
        /// Execute the generated plan instead of printing it
        #[arg(long, default_value_t = false)]
        execute: bool,
    },

    /// Inspect the action journal
    Journal {
        #[command(subcommand)]
        command: JournalCommands,
    },

    /// One chat turn without tool execution budgets
    Chat {
        /// The message to send
        message: String,
    },
}

#[derive(Subcommand)]
enum JournalCommands {
    /// List runs with recorded actions
    List,
    /// Show a run's entries
    View { run_id: String },
    /// Aggregate counts for a run
    Summary { run_id: String },
    /// Roll back a whole run, or one entry with --entry
    Rollback {
        run_id: String,
        #[arg(long)]
        entry: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // LOG_LEVEL drives audit stream verbosity; RUST_LOG still wins when set.
    let filter = std::env::var("RUST_LOG")
        .or_else(|_| std::env::var("LOG_LEVEL"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let runtime = Runtime::from_env().await?;

    let result = dispatch(&runtime, cli.command).await;
    runtime.shutdown().await;
    result
}

async fn dispatch(runtime: &Runtime, command: Commands) -> Result<()> {
    match command {
        Commands::Run {
            objective,
            max_iterations,
            max_tool_calls,
            provider,
        } => {
            let result = runtime
                .run_objective(
                    &objective,
                    AgentOptions {
                        budgets: RunBudgets {
                            max_iterations,
                            max_tool_calls,
                        },
                        force_provider: provider,
                        ..Default::default()
                    },
                )
                .await;

            println!("{}", result.final_response);
            eprintln!(
                "run {}: success={} iterations={} tool_calls={} errors={}",
                result.context.run_id,
                result.success,
                result.iterations,
                result.tool_calls,
                result.errors.len(),
            );
            for error in &result.errors {
                eprintln!("  error: {error}");
            }
            if !result.success {
                std::process::exit(1);
            }
            Ok(())
        }

        Commands::Plan {
            objective,
            file,
            execute,
        } => {
            let plan: Plan = match (&objective, &file) {
                (_, Some(path)) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
                (Some(objective), None) => runtime.generate_plan(objective).await?,
                (None, None) => {
                    anyhow::bail!("provide an objective or --file <plan.json>");
                }
            };

            if !execute && file.is_none() {
                println!("{}", serde_json::to_string_pretty(&plan)?);
                return Ok(());
            }

            let ctx = RunContext::new(
                plan.objective.clone().unwrap_or_else(|| "plan run".into()),
            );
            let result = runtime.run_steps(&ctx, &plan.steps).await?;
            println!(
                "{}",
                serde_json::to_string_pretty(&serde_json::json!({
                    "runId": result.run_id,
                    "report": result.report,
                }))?
            );
            if !result.success {
                std::process::exit(1);
            }
            Ok(())
        }

        Commands::Journal { command } => {
            let journal = &runtime.services.journal;
            match command {
                JournalCommands::List => {
                    for run in journal.list_runs()? {
                        println!("{}  ({} entries)", run.run_id, run.entries);
                    }
                }
                JournalCommands::View { run_id } => {
                    for entry in journal.entries(&run_id)? {
                        println!("{}", serde_json::to_string(&entry)?);
                    }
                }
                JournalCommands::Summary { run_id } => {
                    println!("{}", serde_json::to_string_pretty(&journal.summary(&run_id)?)?);
                }
                JournalCommands::Rollback { run_id, entry } => match entry {
                    Some(entry_id) => {
                        let outcome = journal.rollback_entry(&run_id, &entry_id)?;
                        println!("{}", serde_json::to_string_pretty(&outcome)?);
                    }
                    None => {
                        let report = journal.rollback_run(&run_id)?;
                        println!("{}", serde_json::to_string_pretty(&report)?);
                        if !report.success {
                            std::process::exit(1);
                        }
                    }
                },
            }
            Ok(())
        }

        Commands::Chat { message } => {
            let ctx = RunContext::new(&message);
            let completion = runtime
                .chat(&ctx, vec![ChatMessage::user(message)])
                .await?;
            println!("{}", completion.message.content);
            Ok(())
        }
    }
}
