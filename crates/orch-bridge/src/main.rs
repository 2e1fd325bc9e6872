//! Orchestrator bridge CLI
//!
//! Connects an Azure OpenAI deployment to the browser and Karate tools, or
//! runs a Jira ticket through them with built-in rules.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: Control log verbosity (default: `orch_bridge=info`)
//! - `JIRA_*`, `AZURE_OPEN_AI_*`, `WEBDRIVER_URL`, `KARATE_BASE_PATH`:
//!   override configuration values; a `.env` file is read first

mod cli;

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use orch_bridge::{
    Bridge, Error, JiraWorkflow, Result, StepStatus, WorkflowReport, WorkflowStatus, prompts,
};
use orch_dispatch::Dispatcher;
use orch_mcp::{Profile, Providers, build_registry_with};
use orch_providers::{ChatCompletion, Settings};
use tokio::io::{AsyncBufReadExt, BufReader};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let _ = dotenvy::dotenv();

    // Logs go to stderr so stdout stays clean for answers and reports
    let directive = if cli.verbose { "orch_bridge=debug" } else { "orch_bridge=info" };
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(directive.parse().map_err(|e| Error::user(format!("{e}")))?);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::load(cli.config.as_deref())?;
    let max_rounds = cli.max_rounds.unwrap_or(settings.bridge.max_rounds);

    let providers = Providers::from_settings(&settings, Profile::All);
    let registry = build_registry_with(&providers, &settings)?;
    let dispatcher =
        Dispatcher::new(registry).with_default_timeout(settings.dispatch.default_timeout());
    let session = Session {
        chat: providers.chat.clone(),
        dispatcher,
        max_rounds,
    };

    let outcome = dispatch_command(cli.command, &settings, &session).await;
    providers.shutdown().await;
    outcome
}

async fn dispatch_command(command: Commands, settings: &Settings, session: &Session) -> Result<()> {
    match command {
        Commands::Chat => cmd_chat(session.bridge()?).await,
        Commands::Ask { query } => cmd_ask(session.bridge()?, &query).await,
        Commands::Jira {
            key,
            no_llm,
            agent,
            json,
        } => {
            if settings.jira().is_none() {
                return Err(Error::user(
                    "Jira is not configured: set JIRA_BASE_URL and JIRA_API_TOKEN (and JIRA_EMAIL for basic auth)",
                ));
            }
            if agent {
                let query = prompts::jira_automation_prompt(&key);
                return cmd_ask(session.bridge()?, &query).await;
            }
            cmd_jira(session, &key, no_llm, json).await
        }
    }
}

/// What every command needs to reach the tools
struct Session {
    chat: Option<Arc<dyn ChatCompletion>>,
    dispatcher: Dispatcher,
    max_rounds: usize,
}

impl Session {
    fn bridge(&self) -> Result<Bridge> {
        let chat = self.chat.clone().ok_or_else(|| {
            Error::user(
                "No chat model configured: set AZURE_OPEN_AI_ENDPOINT, AZURE_OPEN_AI_API_KEY and AZURE_OPEN_AI_DEPLOYMENT_MODEL",
            )
        })?;
        Ok(Bridge::new(chat, self.dispatcher.clone()).with_max_rounds(self.max_rounds))
    }
}

async fn cmd_ask(mut bridge: Bridge, query: &str) -> Result<()> {
    let answer = bridge.process_message(query).await?;
    println!("{answer}");
    Ok(())
}

async fn cmd_chat(mut bridge: Bridge) -> Result<()> {
    println!("{} {} tools available", "orch-bridge".green().bold(), bridge.tools().len());
    println!("Type {} to leave, {} to start over.", "exit".cyan(), "reset".cyan());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", "you>".blue().bold());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "exit" | "quit" | "q" => break,
            "reset" => {
                bridge.reset();
                println!("{}", "Conversation cleared".dimmed());
                continue;
            }
            _ => {}
        }

        match bridge.process_message(line).await {
            Ok(answer) => println!("{} {answer}", "assistant>".green().bold()),
            // Keep the session alive; the next turn starts from the same history
            Err(e) => eprintln!("{}: {}", "error".red().bold(), e),
        }
    }

    Ok(())
}

async fn cmd_jira(session: &Session, key: &str, no_llm: bool, json: bool) -> Result<()> {
    let mut workflow = JiraWorkflow::new(session.dispatcher.clone());
    if !no_llm && session.chat.is_some() {
        workflow = workflow.with_bridge(session.bridge()?);
    }

    let report = workflow.run(key).await;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    match report.status {
        WorkflowStatus::Completed => Ok(()),
        WorkflowStatus::Failed => Err(Error::user(format!(
            "workflow for {key} failed: {}",
            report.error.as_deref().unwrap_or("see steps above")
        ))),
    }
}

fn print_report(report: &WorkflowReport) {
    println!("{} {}", "Ticket".bold(), report.jira_key.cyan());
    for step in &report.steps {
        let marker = match step.status {
            StepStatus::Success => "ok".green(),
            StepStatus::Failed => "failed".red(),
            StepStatus::Skipped => "skipped".yellow(),
        };
        match &step.instruction {
            Some(instruction) => println!("  [{marker}] {instruction}: {}", step.message),
            None => println!("  [{marker}] {}: {}", step.tool, step.message),
        }
    }
    println!(
        "{} succeeded, {} failed, {} skipped",
        report.count(StepStatus::Success),
        report.count(StepStatus::Failed),
        report.count(StepStatus::Skipped)
    );
}
