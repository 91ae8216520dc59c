use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

use confab_application::{SupervisorClient, latest_text_response};
use confab_core::config::SupervisorConfig;
use confab_core::session::ChatTurn;
use confab_infrastructure::activities::DeskActivities;
use confab_infrastructure::blob::FsBlobStore;
use confab_infrastructure::responder::DeskResponder;
use confab_infrastructure::runtime::LocalSubstrate;

/// Words that end the conversation. Matched exactly (case-insensitive)
/// against the whole trimmed line, so "quit smoking advice" is still a
/// normal message.
const EXIT_WORDS: [&str; 3] = ["exit", "end", "quit"];

#[derive(Parser)]
#[command(name = "confab")]
#[command(about = "Confab - durable conversation session client", long_about = None)]
struct Cli {
    /// Stable conversation identity to attach to or start.
    #[arg(default_value = "abc123")]
    conversation_id: String,

    /// Directory for large-payload blobs (defaults to the platform data dir).
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn print_turns(turns: &[ChatTurn]) {
    for turn in turns {
        println!("{}", format!("> {}", turn.user_input).green());
        for line in turn.text_response.lines() {
            println!("{}", line.bright_blue());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SupervisorConfig::load(path)?,
        None => SupervisorConfig::default(),
    };

    // ===== Backend Initialization =====
    let store = match cli.data_dir.as_ref().or(config.blob_dir.as_ref()) {
        Some(dir) => Arc::new(FsBlobStore::new(dir).await?),
        None => Arc::new(FsBlobStore::default_location().await?),
    };
    let gateway = Arc::new(DeskActivities::new());
    let responder = Arc::new(DeskResponder::new(gateway, config.activity_retry.clone()));
    let substrate = Arc::new(LocalSubstrate::new(config.clone(), responder, store));
    let _worker = substrate.start_worker();
    let client = SupervisorClient::new(substrate, config);

    // Attach to the open conversation, or start a fresh one.
    let (handle, history) = client.attach_or_start(&cli.conversation_id).await?;
    tracing::info!(
        conversation_id = %handle.identity,
        run_id = %handle.run_id,
        turns = history.len(),
        "attached to session"
    );
    let mut chat_length = history.len();

    // ===== REPL Setup =====
    let mut rl = DefaultEditor::new()?;

    println!(
        "{}",
        "Welcome to ABC Wealth Management. How can I help you?"
            .bright_magenta()
            .bold()
    );
    if !history.is_empty() {
        println!("{}", "-- resuming conversation --".bright_black());
        print_turns(&history);
    }
    println!();

    // ===== Main REPL Loop =====
    loop {
        let readline = rl.readline(">> ");

        match readline {
            Ok(line) => {
                let trimmed = line.trim();

                if trimmed.is_empty() {
                    continue;
                }

                if EXIT_WORDS.iter().any(|word| trimmed.eq_ignore_ascii_case(word)) {
                    client.end_chat(&cli.conversation_id).await?;
                    println!("{}", "Goodbye!".bright_green());
                    break;
                }

                let _ = rl.add_history_entry(&line);

                match client
                    .send_message(&cli.conversation_id, trimmed, Some(chat_length))
                    .await
                {
                    Ok(turns) => {
                        chat_length += turns.len();
                        if let Some(text) = latest_text_response(&turns) {
                            for line in text.lines() {
                                println!("{}", line.bright_blue());
                            }
                        }
                    }
                    Err(err) if err.is_stale() => {
                        println!("{}", "** Stale conversation. Reloading..".yellow());
                        let history = client.get_chat_history(&cli.conversation_id).await?;
                        chat_length = history.len();
                        print_turns(&history);
                    }
                    Err(err) if err.is_worker_unavailable() => {
                        eprintln!("{}", format!("Worker unavailable: {}", err).red());
                    }
                    Err(err) => {
                        eprintln!("{}", format!("Error: {}", err).red());
                    }
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                println!("{}", "CTRL-C detected. Type 'quit' to exit.".yellow());
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                println!("{}", "CTRL-D detected. Exiting...".bright_green());
                client.end_chat(&cli.conversation_id).await?;
                break;
            }
            Err(err) => {
                eprintln!("{}", format!("Error: {:?}", err).red());
                break;
            }
        }
    }

    Ok(())
}
