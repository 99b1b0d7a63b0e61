//! Obsidian Council CLI
//!
//! Inspect the roster and providers, run single queries or tasks, or serve
//! the whole council until interrupted.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use obsidian_council::agent::SpecialistRegistry;
use obsidian_council::config::default_data_dir;
use obsidian_council::events::CompletionEvent;
use obsidian_council::provider::{QueryCategory, QueryContext};
use obsidian_council::{AuthConfig, Council, CouncilConfig, Priority, Task, Telemetry};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "council")]
#[command(about = "Obsidian Council - specialist investigation agents", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Council configuration file (YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory for logs (default: $XDG_DATA_HOME/obsidian-council)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// OpenTelemetry collector endpoint (e.g., http://localhost:4318)
    #[arg(long, global = true)]
    otel_endpoint: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List the agent roster by division
    Agents,

    /// Run a provider health sweep and show provider status
    Providers,

    /// Send one routed query to the AI providers
    Query {
        /// Prompt text
        prompt: String,

        /// Query category used to pick candidate providers
        #[arg(long, default_value = "analysis")]
        category: QueryCategory,

        /// Try this provider first
        #[arg(long)]
        provider: Option<String>,

        /// Fail instead of falling back when the preferred provider errors
        #[arg(long)]
        no_fallback: bool,
    },

    /// Assign one task to an agent and wait for its completion event
    Run {
        /// Agent codename (e.g. ORACLE)
        #[arg(short, long)]
        agent: String,

        /// Task type the agent supports
        #[arg(short, long)]
        task_type: String,

        /// Case identifier
        #[arg(long, default_value = "adhoc")]
        case: String,

        /// Task payload as a JSON object
        #[arg(long, default_value = "{}")]
        payload: String,

        /// Priority, 1-5 or low|medium|high|critical|emergency
        #[arg(long, default_value = "medium")]
        priority: Priority,

        /// Seconds to wait for completion
        #[arg(long, default_value = "300")]
        timeout: u64,
    },

    /// Start every configured agent until Ctrl-C
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    std::fs::create_dir_all(&data_dir)?;

    let mut config = CouncilConfig::load(cli.config.as_deref())?
        .with_otel_endpoint(cli.otel_endpoint.clone());
    if cli.verbose {
        config = config.with_verbose(true);
    }
    if cli.data_dir.is_some() {
        config = config.with_log_dir(data_dir.join("logs"));
    }

    let _telemetry = Telemetry::init(
        config.telemetry.log_dir.clone(),
        config.telemetry.verbose,
        config.telemetry.otel_endpoint.as_deref(),
    )?;

    let auth = AuthConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "ignoring unreadable auth.json");
        AuthConfig::default()
    });

    match cli.command {
        Commands::Agents => list_agents(),
        Commands::Providers => show_providers(&config, &auth).await?,
        Commands::Query {
            prompt,
            category,
            provider,
            no_fallback,
        } => run_query(&config, &auth, &prompt, category, provider, !no_fallback).await?,
        Commands::Run {
            agent,
            task_type,
            case,
            payload,
            priority,
            timeout,
        } => {
            let payload: Value =
                serde_json::from_str(&payload).context("--payload must be valid JSON")?;
            let task = Task::new(case, task_type, payload).with_priority(priority);
            run_task(&config, &auth, &agent, task, Duration::from_secs(timeout)).await?;
        }
        Commands::Serve => serve(&config, &auth).await?,
    }

    Ok(())
}

fn list_agents() {
    let registry = SpecialistRegistry::new();
    let builtins = obsidian_council::agent::builtin_profiles();

    for (division, codenames) in registry.divisions() {
        println!("{}", division);
        println!("{:-<80}", "");
        for codename in codenames {
            match builtins.iter().find(|d| d.profile.codename == codename) {
                Some(definition) => {
                    println!(
                        "  {:10} {} ({})",
                        codename, definition.profile.name, definition.profile.specialization
                    );
                    println!("             tasks: {}", definition.supported_tasks.join(", "));
                }
                None => println!("  {}", codename),
            }
        }
        println!();
    }
}

async fn show_providers(config: &CouncilConfig, auth: &AuthConfig) -> Result<()> {
    let council = Council::from_config(config, auth)?;
    let router = council.router();
    if router.is_empty() {
        println!("No providers registered. Set API keys in the environment or auth.json.");
        return Ok(());
    }

    router.health_check_all().await;
    for (id, status) in router.provider_status() {
        println!(
            "  {:10} {:20} {:10} {}",
            id,
            status.name,
            status.kind.as_str(),
            if status.healthy { "healthy" } else { "unhealthy" }
        );
    }
    Ok(())
}

async fn run_query(
    config: &CouncilConfig,
    auth: &AuthConfig,
    prompt: &str,
    category: QueryCategory,
    provider: Option<String>,
    fallback: bool,
) -> Result<()> {
    let council = Council::from_config(config, auth)?;
    let router = council.router();
    router.health_check_all().await;

    let mut ctx = QueryContext::new("CLI", category);
    if let Some(provider) = provider {
        ctx = ctx.with_preferred_provider(provider);
    }

    let response = router.route_query(prompt, &ctx, None, fallback).await?;
    println!("{}", response.content);
    eprintln!(
        "--- {} | {:.2}s | {} tokens | ${:.4}",
        response.provider, response.processing_time_secs, response.tokens_used, response.cost
    );
    Ok(())
}

async fn run_task(
    config: &CouncilConfig,
    auth: &AuthConfig,
    codename: &str,
    task: Task,
    timeout: Duration,
) -> Result<()> {
    let council = Council::from_config(config, auth)?;
    council.router().health_check_all().await;

    let agent = council.agent(codename)?.clone();
    let mut events = agent.subscribe();
    council.start();

    let task_id = task.id.clone();
    if !agent.assign_task(task) {
        council.shutdown().await;
        bail!("{} rejected the task", agent.codename());
    }

    let wait = async {
        while let Some(raw) = events.recv().await {
            match serde_json::from_str::<CompletionEvent>(&raw) {
                Ok(event) if event.task_id == task_id => return Some(event),
                _ => continue,
            }
        }
        None
    };
    let outcome = tokio::time::timeout(timeout, wait).await;
    council.shutdown().await;

    match outcome {
        Ok(Some(event)) => {
            println!("{}", serde_json::to_string_pretty(&event)?);
            Ok(())
        }
        Ok(None) => bail!("{} stopped before finishing the task", codename),
        Err(_) => bail!("task {} did not finish within {:?}", task_id, timeout),
    }
}

async fn serve(config: &CouncilConfig, auth: &AuthConfig) -> Result<()> {
    let council = Council::from_config(config, auth)?;
    council.start();
    tracing::info!(agents = council.directory().len(), "council serving");
    eprintln!(
        "Serving {} agents. Press Ctrl-C to stop.",
        council.directory().len()
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    council.shutdown().await;
    println!("{}", serde_json::to_string_pretty(&council.directory().status_report())?);
    Ok(())
}
