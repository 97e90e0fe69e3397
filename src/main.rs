use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use rag_chat_client::config::{Config, DEFAULT_LOG_FILTER};
use rag_chat_client::credential::mask;
use rag_chat_client::models::ChatModel;
use rag_chat_client::{Outcome, create_orchestrator, init_tracing};
use tracing::{error, info};

/// Command line driver for the chat and document-chat backend.
///
/// The backend address comes from `API_BASE` (default
/// `http://localhost:8000`); `RUST_LOG` controls log output on stderr.
#[derive(Parser)]
#[command(name = "rag-chat", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ask a general question
    Ask {
        question: String,
        #[arg(long)]
        model: Option<ChatModel>,
        #[arg(long)]
        temperature: Option<f32>,
        /// Use this key for the request without saving it
        #[arg(long)]
        api_key: Option<String>,
    },
    /// Upload a PDF, then ask questions about it
    Doc {
        file: PathBuf,
        questions: Vec<String>,
    },
    /// Drop the document held by the backend
    Reset,
    /// Show backend document status
    Status,
    /// Check backend health
    Health,
    /// Manage the stored API key
    Key {
        #[command(subcommand)]
        command: KeyCommand,
    },
}

#[derive(Subcommand)]
enum KeyCommand {
    /// Save a key for later requests
    Set { value: String },
    /// Show the stored key, masked
    Show,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG still wins over the default filter
    init_tracing(DEFAULT_LOG_FILTER);

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("Configuration loaded: {:?}", config);

    match run(cli.command, config).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every action succeeded
async fn run(command: Command, config: Config) -> anyhow::Result<bool> {
    let orchestrator = create_orchestrator(config)?;

    match command {
        Command::Ask {
            question,
            model,
            temperature,
            api_key,
        } => {
            orchestrator.with_session(|session| {
                if let Some(model) = model {
                    session.set_model(model);
                }
                if let Some(key) = &api_key {
                    session.set_credential(key);
                }
                session.set_temperature(temperature)
            })?;
            Ok(report(&orchestrator.ask(&question).await))
        }
        Command::Doc { file, questions } => {
            orchestrator.select_document(file);
            let uploaded = orchestrator.upload_document().await;
            if !report(&uploaded) {
                return Ok(false);
            }
            let mut all_answered = true;
            for question in questions {
                println!("\n> {}", question);
                all_answered &= report(&orchestrator.ask_document(&question).await);
            }
            Ok(all_answered)
        }
        Command::Reset => Ok(report(&orchestrator.reset_document().await)),
        Command::Status => {
            let status = orchestrator.status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
            Ok(status.ready)
        }
        Command::Health => {
            let health = orchestrator.health().await?;
            println!("{}", serde_json::to_string_pretty(&health)?);
            Ok(health.is_healthy())
        }
        Command::Key { command } => match command {
            KeyCommand::Set { value } => {
                if orchestrator.save_credential(&value)? {
                    println!("Key saved");
                    Ok(true)
                } else {
                    println!("Empty key ignored, stored key left unchanged");
                    Ok(false)
                }
            }
            KeyCommand::Show => {
                let key = orchestrator.with_session(|session| session.credential().map(mask));
                println!("{}", key.as_deref().unwrap_or("(none, server default)"));
                Ok(true)
            }
        },
    }
}

fn report(outcome: &Outcome) -> bool {
    if let Some(text) = outcome.display() {
        println!("{}", text);
    }
    outcome.is_success()
}
