mod logging;

use anyhow::Context;
use arbor_core::{
    ChatService, ConversationId, ConversationNode, Endpoint, EventReceiver, ManagerEvent,
    MessageId, SettingsCredentials, SqliteStore,
};
use clap::Parser;
use clap_derive::{Parser, Subcommand};
use config::{load_env_file, PathManager, Settings};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;

/// Shown whenever a reply could not be produced; the cause goes to the log
const GENERIC_ERROR: &str = "Sorry, there was an error processing your request.";

#[derive(Parser, Debug)]
#[command(author, version, about = "Branching chat client for the Claude API", long_about = None)]
struct Args {
    /// Directory for the database, settings and logs
    #[arg(long, global = true, env = "ARBOR_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Conversation database (defaults to the platform data directory)
    #[arg(long, global = true, env = "ARBOR_DB")]
    db: Option<PathBuf>,

    /// Model name (defaults to the one in settings.toml)
    #[arg(long, global = true, env = "CLAUDE_MODEL")]
    model: Option<String>,

    /// Upper bound on generated tokens per reply
    #[arg(long, global = true)]
    max_tokens: Option<u32>,

    /// Custom base URL for the Claude API (e.g., for a proxy)
    #[arg(long, global = true, env = "CLAUDE_BASE_URL")]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create an empty conversation
    New {
        #[arg(long)]
        title: Option<String>,
    },
    /// Show all conversations as a branch tree
    List,
    /// Print the messages of a conversation
    Show { conversation: String },
    /// Send one message and stream the reply
    Send {
        #[arg(long)]
        conversation: Option<String>,
        text: String,
    },
    /// Interactive chat loop
    Chat {
        #[arg(long)]
        conversation: Option<String>,
    },
    /// Ask again for a reply to the last user message
    Regenerate { conversation: String },
    /// Fork a conversation at a message (inclusive)
    Branch {
        conversation: String,
        message: String,
        #[arg(long)]
        title: Option<String>,
    },
    Rename { conversation: String, title: String },
    Delete { conversation: String },
    /// Delete every conversation
    DeleteAll,
    /// Store the API key (encrypted) in settings.toml
    SetKey { key: String },
    /// Report whether an API key is configured
    KeyStatus,
}

struct App {
    service: ChatService,
    events: EventReceiver,
}

impl App {
    fn build(args: &Args) -> anyhow::Result<Self> {
        PathManager::ensure_dirs_exist().context("Failed to create data directories")?;
        let settings_path =
            PathManager::settings_path().context("Could not determine settings path")?;
        let settings = Settings::load_from(&settings_path);

        let model = args.model.as_deref().unwrap_or(settings.model());
        let max_tokens = args.max_tokens.unwrap_or(settings.max_tokens());
        let base_url = args.base_url.as_deref().or(settings.base_url.as_deref());

        let credentials = Arc::new(SettingsCredentials::new(settings_path.clone()));
        let endpoint = Arc::new(Endpoint::claude(credentials, model, base_url));

        let db_path = match &args.db {
            Some(path) => path.clone(),
            None => PathManager::db_path().context("Could not determine database path")?,
        };
        let store = Arc::new(SqliteStore::open(&db_path)?);

        tracing::info!(model, max_tokens, db = %db_path.display(), "Starting");
        let (service, events) = ChatService::new(store, endpoint, max_tokens);
        Ok(Self { service, events })
    }

    /// Print fragments as they arrive until the reply is saved or fails.
    /// Returns false on failure.
    async fn stream_reply(&mut self, conversation: &ConversationId) -> anyhow::Result<bool> {
        let mut out = io::stdout();
        while let Some((id, event)) = self.events.recv().await {
            if &id != conversation {
                continue;
            }
            match event {
                ManagerEvent::UserMessageSaved(_) => {}
                ManagerEvent::Fragment(update) => {
                    print!("{}", update.fragment);
                    out.flush()?;
                }
                ManagerEvent::Complete(_) => {
                    println!();
                    return Ok(true);
                }
                ManagerEvent::Failed { error, partial } => {
                    if !partial.is_empty() {
                        println!();
                    }
                    error!(conversation = %id, "Reply failed: {}", error);
                    eprintln!("{}", GENERIC_ERROR);
                    return Ok(false);
                }
            }
        }
        anyhow::bail!("event channel closed")
    }

    async fn send(&mut self, conversation: Option<&ConversationId>, text: &str) -> anyhow::Result<(ConversationId, bool)> {
        let id = self.service.send_message(conversation, text).await?;
        let ok = self.stream_reply(&id).await?;
        Ok((id, ok))
    }

    async fn chat(&mut self, conversation: Option<ConversationId>) -> anyhow::Result<()> {
        let mut current = conversation;
        if let Some(id) = &current {
            let info = self.service.get_conversation(id).await?;
            println!("Continuing \"{}\"", info.title);
        }
        println!("Type /quit or Ctrl+D to exit.");

        let stdin = io::stdin();
        let mut lines = stdin.lock().lines();
        loop {
            print!("> ");
            io::stdout().flush()?;

            let line = match lines.next() {
                Some(line) => line?,
                None => {
                    println!();
                    break;
                }
            };
            let input = line.trim();
            if input.is_empty() {
                continue;
            }
            if input == "/quit" || input == "/exit" {
                break;
            }

            let (id, _) = self.send(current.as_ref(), input).await?;
            if current.is_none() {
                println!("(conversation {})", id);
            }
            current = Some(id);
        }
        Ok(())
    }

    async fn run(&mut self, command: Command) -> anyhow::Result<()> {
        match command {
            Command::New { title } => {
                let id = self.service.create_conversation(title.as_deref()).await?;
                println!("{}", id);
            }
            Command::List => {
                let tree = self.service.conversation_tree().await?;
                if tree.is_empty() {
                    println!("No conversations yet.");
                }
                for node in &tree {
                    print_tree(node, 0);
                }
            }
            Command::Show { conversation } => {
                let id = ConversationId::from(conversation);
                let info = self.service.get_conversation(&id).await?;
                let chain = self.service.lineage(&id).await?;
                println!("# {}", info.title);
                if chain.len() > 1 {
                    let path: Vec<_> = chain.iter().map(|c| c.title.as_str()).collect();
                    println!("  {}", path.join(" > "));
                }
                for message in self.service.list_messages(&id).await? {
                    println!();
                    println!("[{}] {}", message.role, message.id);
                    println!("{}", message.content);
                }
            }
            Command::Send { conversation, text } => {
                let id = conversation.map(ConversationId::from);
                let (id, ok) = self.send(id.as_ref(), &text).await?;
                if !ok {
                    anyhow::bail!("no reply saved for {}", id);
                }
            }
            Command::Chat { conversation } => {
                self.chat(conversation.map(ConversationId::from)).await?;
            }
            Command::Regenerate { conversation } => {
                let id = ConversationId::from(conversation);
                self.service.regenerate(&id).await?;
                if !self.stream_reply(&id).await? {
                    anyhow::bail!("no reply saved for {}", id);
                }
            }
            Command::Branch {
                conversation,
                message,
                title,
            } => {
                let id = self
                    .service
                    .branch(
                        &ConversationId::from(conversation),
                        &MessageId::from(message),
                        title.as_deref(),
                    )
                    .await?;
                println!("{}", id);
            }
            Command::Rename {
                conversation,
                title,
            } => {
                self.service
                    .rename_conversation(&ConversationId::from(conversation), &title)
                    .await?;
            }
            Command::Delete { conversation } => {
                self.service
                    .delete_conversation(&ConversationId::from(conversation))
                    .await?;
            }
            Command::DeleteAll => {
                let deleted = self.service.delete_all_conversations().await?;
                println!("Deleted {} conversations", deleted);
            }
            Command::SetKey { key } => {
                self.service.set_credential(&key)?;
                println!("API key saved.");
            }
            Command::KeyStatus => {
                if self.service.has_credential() {
                    println!("API key is set.");
                } else {
                    println!("No API key configured. Use `arbor set-key <key>` or set CLAUDE_API_KEY.");
                }
            }
        }
        Ok(())
    }
}

fn print_tree(node: &ConversationNode, depth: usize) {
    println!(
        "{}{}  {}",
        "  ".repeat(depth),
        node.conversation.title,
        node.conversation.id
    );
    for child in &node.children {
        print_tree(child, depth + 1);
    }
}

#[tokio::main]
async fn main() {
    load_env_file();
    let args = Args::parse();
    if let Some(dir) = &args.data_dir {
        PathManager::set_data_dir(dir.clone());
    }
    let log_guard = logging::init_logging();

    let result = match App::build(&args) {
        Ok(mut app) => app.run(args.command).await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        drop(log_guard);
        std::process::exit(1);
    }
}
