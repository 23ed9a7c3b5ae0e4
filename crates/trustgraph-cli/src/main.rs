//! Trustgraph CLI
//!
//! - `serve`: HTTP server exposing the agent-matching and graph-layout endpoints
//! - `discover` / `layout`: run one endpoint against a JSON request body and print the reply
//! - `prompt`: print the prompt a request would produce (no model call)

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};

use trustgraph_infer::api::{layout_request_from_body, DiscoverRequest};
use trustgraph_infer::{
    Api, ApiReply, DirectorySkillCards, InferenceConfig, MockInvoker, ModelInvoker, NoSkillCards,
    OpenAiChatInvoker, SkillCardProvider,
};

mod server;

#[derive(Parser)]
#[command(name = "trustgraph")]
#[command(
    author,
    version,
    about = "Trustgraph: LLM-assisted agent discovery and trust-graph layout"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP endpoints
    Serve(ServeArgs),

    /// Rank agents for a query (`{query, agents}` request body)
    Discover(RequestArgs),

    /// Compute a graph layout (`{nodes, edges?, width?, height?}` request body)
    Layout(RequestArgs),

    /// Print the prompt a request body would produce, without calling the model
    Prompt(PromptArgs),
}

#[derive(Args, Debug, Clone)]
struct LlmArgs {
    /// Model identifier (overrides `OPENAI_MODEL`).
    #[arg(long)]
    model: Option<String>,

    /// OpenAI-compatible base URL (overrides `OPENAI_BASE_URL`).
    #[arg(long)]
    openai_base_url: Option<String>,

    /// Outbound request timeout in seconds. `0` disables the timeout.
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Answer every model call with an empty canned reply (no credentials needed).
    #[arg(long)]
    llm_mock: bool,
}

#[derive(Args, Debug, Clone)]
struct CardArgs {
    /// Directory of agent cards, one `<agentName>.json` per agent.
    #[arg(long)]
    agent_cards_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct ServeArgs {
    /// Listen address (use `127.0.0.1:0` to auto-pick a free port).
    #[arg(long, default_value = "127.0.0.1:8787")]
    listen: std::net::SocketAddr,

    /// If set, write a small JSON file once the server is listening.
    ///
    /// Useful for scripts/tests to learn the chosen port when `--listen ...:0`.
    #[arg(long)]
    ready_file: Option<PathBuf>,

    /// Largest accepted request body, in bytes.
    #[arg(long, default_value_t = server::DEFAULT_MAX_BODY_BYTES)]
    max_body_bytes: usize,

    #[command(flatten)]
    llm: LlmArgs,

    #[command(flatten)]
    cards: CardArgs,
}

#[derive(Args, Debug, Clone)]
struct RequestArgs {
    /// Request body JSON file (`-` for stdin).
    #[arg(default_value = "-")]
    input: PathBuf,

    #[command(flatten)]
    llm: LlmArgs,

    #[command(flatten)]
    cards: CardArgs,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PromptKind {
    Discover,
    Layout,
}

#[derive(Args, Debug, Clone)]
struct PromptArgs {
    /// Which endpoint's prompt to render.
    #[arg(long, value_enum, default_value = "discover")]
    kind: PromptKind,

    /// Request body JSON file (`-` for stdin).
    #[arg(default_value = "-")]
    input: PathBuf,

    #[command(flatten)]
    cards: CardArgs,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => cmd_serve(args),
        Commands::Discover(args) => cmd_request(args, Endpoint::Discover),
        Commands::Layout(args) => cmd_request(args, Endpoint::Layout),
        Commands::Prompt(args) => cmd_prompt(args),
    }
}

fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| anyhow!("failed to initialize tokio runtime: {e}"))
}

/// Env first, then flags.
fn resolve_config(args: &LlmArgs) -> Result<InferenceConfig> {
    let mut config = InferenceConfig::from_env()?;
    if let Some(model) = args.model.as_ref() {
        config = config.with_model(model.clone());
    }
    if let Some(base_url) = args.openai_base_url.as_deref() {
        config = config.with_base_url(base_url)?;
    }
    if let Some(secs) = args.timeout_secs {
        config = config.with_timeout_secs(secs);
    }
    Ok(config)
}

fn build_invoker(args: &LlmArgs) -> Result<Arc<dyn ModelInvoker>> {
    if args.llm_mock {
        tracing::info!("using mock model backend");
        return Ok(Arc::new(MockInvoker::always(MockInvoker::EMPTY_REPLY)));
    }
    let config = resolve_config(args)?;
    if !config.is_configured() {
        // Still start: endpoints answer 400 "not configured" per request.
        tracing::warn!("{} is not set; LLM endpoints will reject requests", trustgraph_infer::config::OPENAI_API_KEY_ENV);
    }
    let invoker = OpenAiChatInvoker::new(config)?;
    tracing::info!(
        model = %invoker.config().model,
        base_url = %invoker.config().base_url,
        "using OpenAI-compatible backend"
    );
    Ok(Arc::new(invoker))
}

fn build_cards(args: &CardArgs) -> Result<Arc<dyn SkillCardProvider>> {
    match args.agent_cards_dir.as_ref() {
        Some(dir) => {
            if !dir.is_dir() {
                return Err(anyhow!("agent cards dir `{}` is not a directory", dir.display()));
            }
            let cards = DirectorySkillCards::new(dir.clone());
            tracing::info!(dir = %cards.dir().display(), "reading agent cards from directory");
            Ok(Arc::new(cards))
        }
        None => Ok(Arc::new(NoSkillCards)),
    }
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    if path.as_os_str() == "-" {
        let mut buf = Vec::new();
        io::stdin()
            .read_to_end(&mut buf)
            .context("failed to read request body from stdin")?;
        return Ok(buf);
    }
    std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))
}

fn cmd_serve(args: ServeArgs) -> Result<()> {
    let api = Arc::new(Api::new(build_invoker(&args.llm)?, build_cards(&args.cards)?));
    let config = server::ServerConfig {
        listen: args.listen,
        ready_file: args.ready_file.clone(),
        max_body_bytes: args.max_body_bytes,
    };
    build_runtime()?.block_on(server::serve_async(config, api))
}

#[derive(Clone, Copy)]
enum Endpoint {
    Discover,
    Layout,
}

fn cmd_request(args: RequestArgs, endpoint: Endpoint) -> Result<()> {
    let body = read_input(&args.input)?;
    let api = Api::new(build_invoker(&args.llm)?, build_cards(&args.cards)?);

    let reply: ApiReply = build_runtime()?.block_on(async {
        match endpoint {
            Endpoint::Discover => api.discover(&body).await,
            Endpoint::Layout => api.graph_layout(&body).await,
        }
    });

    println!("{}", serde_json::to_string_pretty(&reply.body)?);
    if reply.status >= 400 {
        return Err(anyhow!("request failed with status {}", reply.status));
    }
    Ok(())
}

fn cmd_prompt(args: PromptArgs) -> Result<()> {
    let body = read_input(&args.input)?;
    let api = Api::new(
        Arc::new(MockInvoker::always(MockInvoker::EMPTY_REPLY)),
        build_cards(&args.cards)?,
    );

    let prompt = match args.kind {
        PromptKind::Discover => {
            let request = DiscoverRequest::from_body(&body);
            if request.query.is_empty() {
                return Err(anyhow!("request body has no query"));
            }
            api.matcher().prompt_for(&request.query, request.agents)
        }
        PromptKind::Layout => {
            let request = layout_request_from_body(&body)?;
            api.layouter().prompt_for(&request)
        }
    };
    println!("{prompt}");
    Ok(())
}
