//! site-rag command line
//!
//! ```bash
//! site-rag build --data data/scraped_content.json
//! site-rag ask "What are the savings account fees?" --session demo
//! site-rag feedback 12 up --text "spot on"
//! site-rag history --session demo
//! site-rag chat
//! site-rag info
//! ```

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use site_rag::{
    config::RagConfig, types::query::new_session_id, validate_question, AnswerRecord,
    FeedbackKind, InFlightGuard, QuestionRequest, RagEngine,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main CLI structure
#[derive(Parser)]
#[command(name = "site-rag")]
#[command(about = "Answer questions from crawled website content", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML configuration file (defaults plus OPENAI_API_KEY when omitted)
    #[arg(long, short = 'c', global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
enum Commands {
    /// Build the knowledge base from crawler output
    Build {
        /// JSON array of scraped pages
        #[arg(long, short = 'd', value_name = "FILE", default_value = "data/scraped_content.json")]
        data: PathBuf,
    },
    /// Ask a single question
    Ask {
        /// The question
        #[arg(value_name = "QUESTION")]
        question: String,
        /// Log the exchange under this session
        #[arg(long, short = 's', value_name = "SESSION_ID")]
        session: Option<String>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Interactive question loop with a fresh session
    Chat,
    /// Rate a logged answer
    Feedback {
        /// Conversation id printed after an answer
        #[arg(value_name = "ID")]
        conversation_id: i64,
        /// up or down
        #[arg(value_name = "KIND")]
        kind: FeedbackKind,
        /// Optional comment
        #[arg(long, short = 't')]
        text: Option<String>,
    },
    /// Show the conversation history of a session
    History {
        #[arg(long, short = 's', value_name = "SESSION_ID")]
        session: String,
        /// Number of exchanges to show
        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// Show knowledge base and model information
    Info,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "site_rag=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => RagConfig::from_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => RagConfig::from_env()?,
    };

    tracing::info!("Configuration loaded");
    tracing::info!("  - Embedding model: {}", config.embeddings.model);
    tracing::info!("  - LLM model: {}", config.llm.model);
    tracing::info!("  - Chunk size: {}", config.chunking.chunk_size);

    let engine = RagEngine::from_config(config).context("failed to initialize RAG engine")?;

    match cli.command {
        Commands::Build { data } => build(&engine, data).await,
        Commands::Ask {
            question,
            session,
            json,
        } => {
            let mut guard = InFlightGuard::new();
            let record = ask(&engine, &mut guard, question, session).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&record)?);
            } else {
                print_record(&record);
            }
            Ok(())
        }
        Commands::Chat => chat(&engine).await,
        Commands::Feedback {
            conversation_id,
            kind,
            text,
        } => {
            engine
                .record_feedback(conversation_id, kind, text.as_deref())
                .await
                .context("failed to record feedback")?;
            println!("{} Feedback recorded", style("✓").green());
            Ok(())
        }
        Commands::History { session, limit } => {
            let entries = engine.conversation_history(&session, limit).await?;
            if entries.is_empty() {
                println!("No conversations for session {}", session);
            }
            for entry in entries {
                println!(
                    "{} {}",
                    style(entry.timestamp.format("%Y-%m-%d %H:%M:%S")).dim(),
                    style(&entry.question).bold()
                );
                println!("{}\n", entry.response);
            }
            Ok(())
        }
        Commands::Info => {
            let info = engine.system_info().await;
            println!("{}", serde_json::to_string_pretty(&info)?);
            if !info.health.all_healthy() {
                eprintln!("{} Some providers failed their health check", style("!").yellow());
            }
            Ok(())
        }
    }
}

async fn build(engine: &RagEngine, data: PathBuf) -> anyhow::Result<()> {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{bar:40.cyan/blue} {pos:>3}% {msg}")
            .context("invalid progress template")?,
    );
    let progress = |fraction: f32, message: &str| {
        pb.set_position((fraction * 100.0) as u64);
        pb.set_message(message.to_string());
    };

    let report = engine
        .load_from_file(&data, Some(&progress))
        .await
        .with_context(|| format!("failed to load {}", data.display()))?;
    pb.finish_and_clear();

    println!(
        "{} documents, {} indexed ({} too short, {} duplicate)",
        report.documents_seen,
        report.documents_indexed,
        report.documents_too_short,
        report.documents_duplicate
    );
    println!(
        "{} chunks created, {} indexed, {} failed batches",
        report.chunks_created, report.chunks_indexed, report.batches_failed
    );

    if report.success() {
        println!("{} Knowledge base built", style("✓").green());
        Ok(())
    } else {
        anyhow::bail!("knowledge base build indexed nothing")
    }
}

async fn ask(
    engine: &RagEngine,
    guard: &mut InFlightGuard,
    question: String,
    session: Option<String>,
) -> anyhow::Result<AnswerRecord> {
    validate_question(&question)?;

    let mut request = QuestionRequest::new(question);
    request.session_id = session;

    let token = guard.begin(&request.query)?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_message("Searching the knowledge base...");
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));
    let record = engine.ask(&request, &token).await;
    spinner.finish_and_clear();

    guard.finish(token);
    Ok(record)
}

async fn chat(engine: &RagEngine) -> anyhow::Result<()> {
    let session = new_session_id();
    let mut guard = InFlightGuard::new();
    println!("Session {}. Empty line to quit.", style(&session).dim());

    let stdin = std::io::stdin();
    loop {
        print!("{} ", style(">").cyan().bold());
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 || line.trim().is_empty() {
            break;
        }

        match ask(engine, &mut guard, line.trim().to_string(), Some(session.clone())).await {
            Ok(record) => print_record(&record),
            Err(e) => println!("{} {}", style("!").yellow(), e),
        }
    }
    Ok(())
}

fn print_record(record: &AnswerRecord) {
    println!("\n{}\n", record.response);
    if !record.sources.is_empty() {
        println!("{}", style("Sources").bold());
        println!("{}\n", record.format_sources());
    }
    println!(
        "{} relevance {:.0}% | {} | {} | quality {}",
        style("·").dim(),
        record.relevance_score * 100.0,
        record.format_response_time(),
        match record.tokens_used {
            0 => "no tokens".to_string(),
            n => format!("{} tokens", n),
        },
        record.quality()
    );
    if let Some(id) = record.conversation_id {
        println!(
            "{} rate this answer with: site-rag feedback {} up|down",
            style("·").dim(),
            id
        );
    }
}
