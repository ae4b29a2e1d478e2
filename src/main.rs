//! Command line client: chat with an agent, build one from owned modules,
//! or inspect the services.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use bab_agent::api::{ChatClient, FileUpload, ModuleStoreClient};
use bab_agent::build::BuildReconciler;
use bab_agent::chat::{ChatSession, Draft, MessageCleaner, Notification, SubmitOutcome};
use bab_agent::config::ClientConfig;
use bab_agent::ids::{AgentId, ModuleId};
use bab_agent::modules::categorize_instances;
use bab_agent::start_module_store::init_tracing;
use bab_agent::storage::{ClientStorage, FileStorage, MemoryStorage, SessionContext};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Command-line options.
#[derive(Parser)]
#[command(name = "bab-chat", version)]
struct Cli {
    /// Client storage file (overrides BAB_STORAGE_PATH)
    #[arg(long, global = true)]
    storage: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Chat with an agent (the default)
    Chat {
        /// Agent id; defaults to the last instantiated agent
        #[arg(long)]
        agent: Option<AgentId>,
        /// Memory module id; defaults to the last instantiated agent's module
        #[arg(long)]
        module: Option<String>,
    },
    /// Reconcile the build selection with an owned-objects dump and start an agent
    Build {
        /// JSON file holding the owned objects
        #[arg(long)]
        owned: PathBuf,
        /// On-chain ids of modules to select
        #[arg(long = "select")]
        select: Vec<String>,
    },
    /// Create an empty memory module
    NewMemory {
        /// Module id
        #[arg(long)]
        module: String,
        /// Creator address
        #[arg(long, default_value = "")]
        creator: String,
    },
    /// List running agents
    Agents,
    /// List modules in the module store
    Modules,
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            tracing::error!("Failed to create runtime: {e}");
            return ExitCode::from(1);
        }
    };

    match rt.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = ClientConfig::from_env().context("invalid configuration")?;
    if let Some(path) = cli.storage {
        config = config.with_storage_path(path);
    }

    let storage: Arc<dyn ClientStorage> = match &config.storage_path {
        Some(path) => Arc::new(
            FileStorage::open(path)
                .with_context(|| format!("cannot open client storage {}", path.display()))?,
        ),
        None => Arc::new(MemoryStorage::new()),
    };
    let context = SessionContext::new(storage, config.flag_ttl());
    let chat = Arc::new(ChatClient::new(&config)?);
    let store = Arc::new(ModuleStoreClient::new(&config)?);

    match cli.command.unwrap_or(Command::Chat {
        agent: None,
        module: None,
    }) {
        Command::Chat { agent, module } => chat_loop(context, chat, store, agent, module).await,
        Command::Build { owned, select } => build(&config, context, chat, store, &owned, &select).await,
        Command::NewMemory { module, creator } => {
            store
                .create_memory_module(&ModuleId::new(module.clone()), &creator)
                .await?;
            println!("created memory module {module}");
            Ok(())
        }
        Command::Agents => {
            for agent in chat.list_agents().await? {
                println!("{}  {}", agent.id, agent.name);
            }
            Ok(())
        }
        Command::Modules => {
            for module in store.list_modules().await? {
                println!("{}  {:<10} {}", module.module_id, module.module_type, module.name);
            }
            Ok(())
        }
    }
}

async fn chat_loop(
    context: SessionContext,
    chat: Arc<ChatClient>,
    store: Arc<ModuleStoreClient>,
    agent: Option<AgentId>,
    module: Option<String>,
) -> anyhow::Result<()> {
    let saved = context.current_chat();
    let agent_id = match agent.or_else(|| saved.as_ref().map(|p| p.agent_id)) {
        Some(id) => id,
        None => bail!("no agent given and no current chat saved; pass --agent"),
    };
    let module_id = match module
        .map(ModuleId::new)
        .or_else(|| saved.map(|p| p.module_id))
    {
        Some(id) => id,
        None => bail!("no memory module given and no current chat saved; pass --module"),
    };

    let (session, mut notifications) = ChatSession::new(agent_id, module_id, chat, store, context)?;
    let cleaner = MessageCleaner::new()?;

    session.mount().await;
    for message in session.display_messages().await {
        println!("{}: {}", message.user, message.text);
    }
    println!("-- chatting with {agent_id}; /attach <image> stages a file, /quit exits");

    let mut draft = Draft::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line == "/quit" {
            break;
        }
        if let Some(path) = line.strip_prefix("/attach ") {
            match stage_file(&mut draft, Path::new(path.trim())) {
                Ok(()) => println!("-- attached {}", path.trim()),
                Err(e) => println!("-- {e}"),
            }
            continue;
        }

        draft.input = line;
        match session.submit(&mut draft).await {
            SubmitOutcome::Sent { responses, .. } => {
                for reply in responses {
                    println!("{}: {}", reply.user, cleaner.clean(&reply.text));
                }
            }
            SubmitOutcome::Failed { .. } | SubmitOutcome::Ignored(_) => {}
        }
        print_notifications(&mut notifications);
    }

    session.unmount();
    Ok(())
}

fn stage_file(draft: &mut Draft, path: &Path) -> anyhow::Result<()> {
    let file = FileUpload::from_path(path)?;
    draft.attach(file)?;
    Ok(())
}

fn print_notifications(notifications: &mut mpsc::UnboundedReceiver<Notification>) {
    while let Ok(notification) = notifications.try_recv() {
        println!("!! {}: {}", notification.title, notification.description);
    }
}

async fn build(
    config: &ClientConfig,
    context: SessionContext,
    chat: Arc<ChatClient>,
    store: Arc<ModuleStoreClient>,
    owned_path: &Path,
    select: &[String],
) -> anyhow::Result<()> {
    let raw = std::fs::read_to_string(owned_path)
        .with_context(|| format!("cannot read {}", owned_path.display()))?;
    let objects: Vec<Value> = serde_json::from_str(&raw).context("owned objects must be a JSON array")?;
    let owned = categorize_instances(&objects);

    let mut reconciler = BuildReconciler::load(context, store, chat, config.pairing_policy);
    if reconciler.on_owned_modules_changed(owned.clone()) {
        println!("-- dropped selections that are no longer owned");
    }

    for id in select {
        let module = owned
            .iter()
            .find(|m| &m.on_chain_id == id)
            .cloned()
            .with_context(|| format!("module {id} is not owned"))?;
        reconciler.select_module(module).await?;
    }

    if !reconciler.can_instantiate() {
        bail!(
            "selection incomplete: a character and a memory module are required ({} pairing)",
            reconciler.policy()
        );
    }

    let pointer = reconciler.instantiate().await?;
    println!("started agent {} with memory module {}", pointer.agent_id, pointer.module_id);
    Ok(())
}
