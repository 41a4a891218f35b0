//! BidMaster - conversational business proposal assistant.
//!
//! Starts or resumes a proposal conversation in the terminal and persists it
//! between invocations.

use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bidmaster::core::Config;
use bidmaster::workflow::{Role, SessionStore, UserInput, WorkflowController, WorkflowState};

/// Conversational business proposal assistant
#[derive(Parser)]
#[command(name = "bidmaster")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new proposal conversation
    New {
        /// File containing the client request.
        ///
        /// "-" reads the request from stdin for non-interactive use: the
        /// conversation is saved after the first reply, continue it with
        /// `bidmaster resume <id>`.
        #[arg(short, long)]
        request: PathBuf,

        /// Client name
        #[arg(short, long)]
        client: String,
    },

    /// Continue a saved conversation
    Resume {
        /// Conversation id (see `bidmaster sessions`)
        id: String,
    },

    /// List saved conversations
    Sessions,

    /// Show current configuration
    Config {
        /// Show config file path
        #[arg(long)]
        path: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();

    // Setup logging
    let filter = if cli.verbose { EnvFilter::new("debug") } else { EnvFilter::new("warn") };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(filter)
        .init();

    match cli.command {
        Commands::New { request, client } => cmd_new(&request, &client),
        Commands::Resume { id } => cmd_resume(&id),
        Commands::Sessions => cmd_sessions(),
        Commands::Config { path } => cmd_config(path),
        Commands::Completions { shell } => {
            cmd_completions(shell);
            Ok(())
        }
    }
}

/// Start a conversation from a request file.
fn cmd_new(request_path: &Path, client: &str) -> Result<()> {
    let request = read_request(request_path)?;
    let state = WorkflowState::initialize(request, client)?;

    let config = Config::load()?;
    let store = SessionStore::new()?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let controller = build_controller(&config).await?;

        println!("Conversation {} started for {}.", state.conversation_id(), state.client_name());
        let state = controller.run(state, None).await;
        converse(&controller, &store, state, 0).await
    })
}

/// Resume a saved conversation.
fn cmd_resume(id: &str) -> Result<()> {
    let config = Config::load()?;
    let store = SessionStore::new()?;
    let state = store.load(id)?;

    if state.is_finished() {
        println!("Conversation {id} has already ended.");
        print_document(&state);
        return Ok(());
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let controller = build_controller(&config).await?;

        // Repeat the last message so the user knows where they left off.
        let shown = state
            .conversation_log()
            .iter()
            .rposition(|t| t.role == Role::System)
            .unwrap_or(state.conversation_log().len());
        converse(&controller, &store, state, shown).await
    })
}

/// List saved conversations.
fn cmd_sessions() -> Result<()> {
    let store = SessionStore::new()?;
    let sessions = store.list()?;

    if sessions.is_empty() {
        println!("No saved sessions.");
        return Ok(());
    }

    for session in sessions {
        println!(
            "{}  {:<24}  {:<20}  {} turns",
            session.conversation_id, session.client_name, session.current_step, session.turns
        );
    }

    Ok(())
}

/// Show configuration.
fn cmd_config(show_path: bool) -> Result<()> {
    if show_path {
        if let Some(path) = Config::config_dir() {
            println!("{}", path.display());
        }
        return Ok(());
    }

    let config = Config::load()?;
    let toml = toml::to_string_pretty(&config)?;
    println!("{toml}");

    Ok(())
}

/// Generate shell completions.
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "bidmaster", &mut io::stdout());
}

fn read_request(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut request = String::new();
        io::stdin().read_to_string(&mut request)?;
        return Ok(request);
    }

    std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Could not read request file {}: {e}", path.display()))
}

#[cfg(feature = "ai")]
async fn build_controller(config: &Config) -> Result<WorkflowController> {
    use bidmaster::workflow::{PhraseClassifier, SimilaritySearch};
    use bidmaster::{KeywordIndex, LlmDrafter, MarkdownDocumentBuilder, ProviderChain};

    let chain = ProviderChain::from_config(&config.ai).await;
    if !chain.has_providers() {
        anyhow::bail!(
            "No AI provider available.\n\
             Set ANTHROPIC_API_KEY or OPENAI_API_KEY, or run Ollama locally."
        );
    }
    tracing::info!(provider = ?chain.active_provider(), "Using AI provider");

    let search: Arc<dyn SimilaritySearch> = match &config.search.corpus_dir {
        Some(dir) => match KeywordIndex::load_dir(dir) {
            Ok(index) => Arc::new(index),
            Err(e) => {
                tracing::warn!(error = %e, "Continuing without past proposals");
                Arc::new(KeywordIndex::new())
            }
        },
        None => Arc::new(KeywordIndex::new()),
    };

    Ok(WorkflowController::new(
        Arc::new(LlmDrafter::new(chain)),
        search,
        Arc::new(MarkdownDocumentBuilder::new(&config.output.documents_dir)),
        Arc::new(PhraseClassifier::from_config(&config.workflow)),
    )
    .with_config(config.workflow.clone()))
}

#[cfg(not(feature = "ai"))]
async fn build_controller(_config: &Config) -> Result<WorkflowController> {
    anyhow::bail!("bidmaster was built without AI support (enable the \"ai\" feature)")
}

/// Interactive loop: print new system turns, read a line, run the workflow.
async fn converse(
    controller: &WorkflowController,
    store: &SessionStore,
    mut state: WorkflowState,
    mut shown: usize,
) -> Result<()> {
    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    loop {
        for turn in state.turns_since(shown) {
            if turn.role == Role::System {
                println!("\n{}\n", turn.content);
            }
        }
        shown = state.conversation_log().len();
        store.save(&state)?;

        if state.is_finished() {
            print_document(&state);
            println!("Conversation ended.");
            return Ok(());
        }

        print!("> ");
        io::stdout().flush()?;

        let Some(line) = lines.next().transpose()? else {
            break;
        };
        let line = line.trim();

        let input = match line {
            "" => continue,
            "exit" | "quit" | "konec" => break,
            "/finish" => UserInput::Finish,
            text => UserInput::from(text),
        };

        state = controller.run(state, Some(input)).await;
    }

    println!(
        "Saved conversation {id}. Continue with: bidmaster resume {id}",
        id = state.conversation_id()
    );
    Ok(())
}

fn print_document(state: &WorkflowState) {
    if let Some(document) = state.document_reference() {
        println!("Proposal document: {document}");
    }
}
