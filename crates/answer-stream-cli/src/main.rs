//! Ask a knowledge base from the terminal and stream the answer.

mod render;

use std::process::ExitCode;
use std::sync::Arc;

use answer_stream::observability::init_observability;
use answer_stream::{ClientConfig, HttpTransport, SessionState, WidgetRegistry, WidgetSettings};
use clap::{Args, Parser, Subcommand};

use crate::render::TerminalHandlers;

#[derive(Parser)]
#[command(name = "answer-stream", version, about = "Streaming answer client for knowledge bases")]
struct Cli {
    /// Backend base URL.
    #[arg(long, env = "ANSWER_STREAM_BASE_URL", global = true)]
    base_url: Option<String>,
    /// Public API key sent as `X-API-Key`.
    #[arg(long, env = "ANSWER_STREAM_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ask one question and stream the answer to stdout.
    Ask(AskArgs),
}

#[derive(Args)]
struct AskArgs {
    /// The question.
    query: String,
    /// Public id of the knowledge base widget.
    #[arg(long, env = "ANSWER_STREAM_PUBLIC_ID")]
    public_id: String,
    #[arg(long, env = "ANSWER_STREAM_EMBEDDING_PROVIDER")]
    embedding_provider: String,
    #[arg(long, env = "ANSWER_STREAM_LLM_PROVIDER")]
    llm_provider: String,
    #[arg(long, env = "ANSWER_STREAM_MODEL")]
    model: String,
    /// Number of documents to retrieve.
    #[arg(long, default_value_t = 6)]
    limit: u32,
    /// Number of retrieved documents passed to the model.
    #[arg(long, default_value_t = 4)]
    context_limit: u32,
    /// Do not print the retrieved sources after the answer.
    #[arg(long)]
    no_sources: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    init_observability();
    let cli = Cli::parse();

    let mut config = match cli.base_url {
        Some(base_url) => ClientConfig::new(base_url),
        None => ClientConfig::from_env()?,
    };
    if let Some(api_key) = cli.api_key.filter(|k| !k.trim().is_empty()) {
        config = config.api_key(api_key);
    }
    let registry = WidgetRegistry::new(Arc::new(HttpTransport::new(config)?));

    match cli.command {
        Command::Ask(args) => {
            let settings = WidgetSettings::new(
                args.public_id,
                args.embedding_provider,
                args.llm_provider,
                args.model,
            )
            .limit(args.limit)
            .context_limit(args.context_limit);
            let widget = registry.mount("cli", settings);

            let handle = widget.ask(args.query, TerminalHandlers::new(!args.no_sources));
            let cancel = handle.cancel_handle();
            let wait = handle.wait();
            tokio::pin!(wait);
            let state = tokio::select! {
                state = &mut wait => state,
                _ = tokio::signal::ctrl_c() => {
                    cancel.cancel();
                    wait.await
                }
            };
            tracing::debug!(?state, "session finished");

            Ok(match state {
                SessionState::Done => ExitCode::SUCCESS,
                SessionState::Cancelled => ExitCode::from(130),
                _ => ExitCode::FAILURE,
            })
        }
    }
}
