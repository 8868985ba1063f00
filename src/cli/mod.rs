//! Command-line interface parsing and handling
//!
//! Parses arguments, resolves configuration, and runs either the
//! interactive chat loop or one of the inspection subcommands.

pub mod model_list;

use std::error::Error;
use std::io::Write as _;

use clap::{Parser, Subcommand};
use reqwest::Client;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use crate::cli::model_list::list_models;
use crate::core::config::{ConfigFile, SessionConfig};
use crate::core::error::TurnError;
use crate::core::gateway::{DirectGateway, WalletIdentity};
use crate::core::session::{ChatSession, TurnOutcome};
use crate::utils::logging::LoggingState;

#[derive(Parser)]
#[command(name = "aimchat")]
#[command(about = "A terminal chat interface for AIM metered model gateways")]
#[command(
    long_about = "Aimchat is a terminal chat client that talks to language models served \
behind metered payment gateways (AIM nodes). It negotiates a usage-metered streaming \
token per message, opens the token-authorized stream, and prints the reply as it \
arrives, falling back to a non-streaming call when the node serves no stream.\n\n\
Environment Variables:\n\
  AIM_NODE_URL        Node base address, e.g. https://node.example:8880\n\
  AIM_SLOT            Logical slot identifier (default: 0)\n\
  AIM_URI             Action path for token requests (default: /request)\n\
  AIM_STREAM_BASE     Origin streams are served from (default: the node URL)\n\
  AIM_WALLET_ADDRESS  Wallet address bound to the session\n\n\
Chat commands:\n\
  /models             List the models the node currently serves\n\
  /model <name>       Switch the selected model\n\
  /quit               Exit"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Model to use for chat (defaults to the node's advertised default)
    #[arg(short = 'm', long, global = true)]
    pub model: Option<String>,

    /// Wallet address to bind (overrides AIM_WALLET_ADDRESS)
    #[arg(short = 'w', long, global = true)]
    pub wallet: Option<String>,

    /// Node base address (overrides AIM_NODE_URL and the config file)
    #[arg(long, global = true)]
    pub node_url: Option<String>,

    /// Slot identifier (overrides AIM_SLOT)
    #[arg(long, global = true)]
    pub slot: Option<String>,

    /// Action path for token requests (overrides AIM_URI)
    #[arg(long, global = true)]
    pub action: Option<String>,

    /// Stream base origin (overrides AIM_STREAM_BASE)
    #[arg(long, global = true)]
    pub stream_base: Option<String>,

    /// Enable transcript logging to the specified file
    #[arg(short = 'l', long, global = true)]
    pub log: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the chat interface (default)
    Chat,
    /// List the models the node currently serves
    Models,
}

pub async fn run() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let (config, file) = resolve_config(&args)?;

    match args.command {
        Some(Commands::Models) => list_models(&config).await,
        Some(Commands::Chat) | None => run_chat(args, file, config).await,
    }
}

fn resolve_config(args: &Args) -> Result<(SessionConfig, ConfigFile), Box<dyn Error>> {
    let file = match ConfigFile::default_path() {
        Some(path) => ConfigFile::load_from_path(&path)?,
        None => ConfigFile::default(),
    };

    // Flags override the environment, which overrides the file.
    let mut merged = file.clone();
    if let Some(node_url) = &args.node_url {
        merged.node_url = Some(node_url.clone());
    }
    if let Some(slot) = &args.slot {
        merged.slot = Some(slot.clone());
    }
    if let Some(action) = &args.action {
        merged.action = Some(action.clone());
    }
    if let Some(stream_base) = &args.stream_base {
        merged.stream_base = Some(stream_base.clone());
    }

    let config = SessionConfig::from_sources(&merged, |key| {
        let flag_set = match key {
            "AIM_NODE_URL" => args.node_url.is_some(),
            "AIM_SLOT" => args.slot.is_some(),
            "AIM_URI" => args.action.is_some(),
            "AIM_STREAM_BASE" => args.stream_base.is_some(),
            _ => false,
        };
        if flag_set {
            None
        } else {
            std::env::var(key).ok()
        }
    })?;
    Ok((config, file))
}

async fn run_chat(
    args: Args,
    file: ConfigFile,
    config: SessionConfig,
) -> Result<(), Box<dyn Error>> {
    let wallet = args
        .wallet
        .or_else(|| std::env::var("AIM_WALLET_ADDRESS").ok())
        .ok_or("No wallet address. Pass --wallet or set AIM_WALLET_ADDRESS.")?;

    let logging = LoggingState::new(args.log)?;
    let client = Client::new();
    let mut session = ChatSession::new(
        client.clone(),
        DirectGateway::new(client),
        config.clone(),
    );
    session.bind_wallet(WalletIdentity::new(wallet));

    session.refresh_catalog().await;
    if let Some(model) = args.model.or(file.default_model) {
        session.select_model(model);
    }

    if session.catalog().is_empty() {
        println!("The node at {} advertises no models right now.", config.node_url);
    } else {
        println!(
            "Models: {} (selected: {})",
            session.catalog().models.join(", "),
            session.model().unwrap_or("none")
        );
    }
    println!("Type a message, /models, /model <name>, or /quit.");

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        match line.trim() {
            "/quit" => break,
            "/models" => {
                session.refresh_catalog().await;
                for model in &session.catalog().models {
                    let marker = if session.model() == Some(model.as_str()) {
                        "*"
                    } else {
                        " "
                    };
                    println!("{marker} {model}");
                }
                continue;
            }
            command if command.starts_with("/model ") => {
                let model = command["/model ".len()..].trim();
                session.select_model(model);
                println!("Selected model: {model}");
                continue;
            }
            _ => {}
        }

        let input = line.clone();
        let outcome = session
            .send_message(&input, |token| {
                print!("{token}");
                let _ = std::io::stdout().flush();
            })
            .await;

        match outcome {
            Ok(TurnOutcome::Ignored) => continue,
            Ok(TurnOutcome::Streamed) => println!(),
            Ok(TurnOutcome::Fallback) => {
                if let Some(reply) = session.messages().last() {
                    println!("{}", reply.content);
                }
            }
            Err(err) => {
                eprintln!("{}", err.notice());
                if matches!(err, TurnError::ModelUnavailable(_)) {
                    continue;
                }
            }
        }

        if logging.is_active() {
            if let Err(err) = logging.log_message(&format!("You: {}", input.trim())) {
                eprintln!("Failed to log message: {err}");
            }
            if let Some(reply) = session.messages().last() {
                if let Err(err) = logging.log_message(&reply.content) {
                    eprintln!("Failed to log message: {err}");
                }
            }
        }
    }

    Ok(())
}
