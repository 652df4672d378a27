//! chatkeep CLI - chat with Gemini and keep what matters

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, bail};
use chatkeep_core::conversations::validate_title;
use chatkeep_core::export::{self, ExportFormat};
use chatkeep_core::generate::{self, Attachment};
use chatkeep_core::models::{CollectionPatch, Message, MessageRole};
use chatkeep_core::saved::{CollectionFilter, SaveTarget};
use chatkeep_core::storage::FileStorage;
use chatkeep_core::{Config, ConversationStore, SavedItemsStore, search};
use clap::{Parser, Subcommand};

mod gemini;

use gemini::GeminiClient;

#[derive(Debug, Parser)]
#[command(
    name = "chatkeep",
    author,
    version,
    about = "Chat with Gemini and keep what matters",
    propagate_version = true
)]
struct Cli {
    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start a new conversation and make it active
    New,

    /// List conversations, newest first
    List,

    /// Switch the active conversation
    Use {
        /// Conversation ID
        id: String,
    },

    /// Show a conversation (defaults to the active one)
    Show {
        /// Conversation ID
        id: Option<String>,
    },

    /// Send a prompt and record the reply
    Send {
        /// Prompt text
        prompt: String,

        /// Attach an image or file
        #[arg(long)]
        attach: Option<PathBuf>,

        /// Model to use
        #[arg(short, long)]
        model: Option<String>,

        /// Target conversation (defaults to the active one)
        #[arg(long)]
        conversation: Option<String>,
    },

    /// Rename a conversation
    Rename {
        /// Conversation ID
        id: String,

        /// New title
        title: String,
    },

    /// Remove every message from a conversation
    Clear {
        /// Conversation ID (defaults to the active one)
        id: Option<String>,
    },

    /// Delete a conversation
    Delete {
        /// Conversation ID
        id: String,
    },

    /// Search message content across conversations
    Search {
        /// Search term
        term: String,
    },

    /// Export a conversation to a file
    Export {
        /// Conversation ID (defaults to the active one)
        id: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: FormatArg,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },

    /// List available models
    Models,

    /// Manage saved messages
    Saved {
        #[command(subcommand)]
        command: SavedCommand,
    },

    /// Manage collections of saved messages
    Collection {
        #[command(subcommand)]
        command: CollectionCommand,
    },
}

#[derive(Debug, Subcommand)]
enum SavedCommand {
    /// List saved messages
    List {
        /// Only items in this collection
        #[arg(long)]
        collection: Option<String>,
    },

    /// Save a message from a conversation
    Add {
        /// Conversation ID
        conversation: String,

        /// Message ID
        message: String,

        /// Collection to file it under
        #[arg(long, conflicts_with = "uncategorized")]
        collection: Option<String>,

        /// File it as uncategorized, even if it was saved into a collection
        #[arg(long)]
        uncategorized: bool,
    },

    /// Append a saved message to the active conversation
    Continue {
        /// Saved item ID
        id: String,
    },

    /// Save a message, or unsave it if already saved
    Toggle {
        /// Conversation ID
        conversation: String,

        /// Message ID
        message: String,
    },

    /// Remove a saved item
    Remove {
        /// Saved item ID
        id: String,
    },

    /// Replace the notes on a saved item
    Notes {
        /// Saved item ID
        id: String,

        /// Notes text
        notes: String,
    },

    /// Move a saved item to a collection (omit to uncategorize)
    Move {
        /// Saved item ID
        id: String,

        /// Target collection ID
        #[arg(long)]
        collection: Option<String>,
    },

    /// Export saved messages to a file
    Export {
        /// Only items in this collection
        #[arg(long)]
        collection: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: FormatArg,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        out: PathBuf,
    },
}

#[derive(Debug, Subcommand)]
enum CollectionCommand {
    /// List collections with item counts
    List,

    /// Create a collection
    Create {
        /// Collection name
        name: String,

        #[arg(long)]
        description: Option<String>,

        /// Display color, e.g. #7C3AED (random if omitted)
        #[arg(long)]
        color: Option<String>,
    },

    /// Update a collection's name, description or color
    Update {
        /// Collection ID
        id: String,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        description: Option<String>,

        #[arg(long)]
        color: Option<String>,
    },

    /// Delete a collection; its items become uncategorized
    Delete {
        /// Collection ID
        id: String,
    },
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum FormatArg {
    Text,
    Json,
}

impl From<FormatArg> for ExportFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Text => ExportFormat::Text,
            FormatArg::Json => ExportFormat::Json,
        }
    }
}

/// Stores and settings built once at startup and handed to each command.
struct App {
    config: Config,
    conversations: ConversationStore,
    saved: SavedItemsStore,
}

impl App {
    fn open(config: Config) -> Self {
        let storage = Arc::new(FileStorage::new(&config.data_dir));
        let conversations =
            ConversationStore::open(storage.clone()).with_title_max_chars(config.title_max_chars);
        let saved = SavedItemsStore::open(storage);
        Self {
            config,
            conversations,
            saved,
        }
    }

    /// Resolve an explicit conversation id, or fall back to the active one.
    fn conversation_id(&self, id: Option<String>) -> Result<String> {
        let id = match id {
            Some(id) => id,
            None => match self.conversations.active_id() {
                Some(active) => active.to_string(),
                None => bail!("No active conversation. Use 'chatkeep new' to start one."),
            },
        };
        if self.conversations.conversation(&id).is_none() {
            bail!("Conversation not found: {id}");
        }
        Ok(id)
    }

    fn find_message(&self, conversation: &str, message: &str) -> Result<Message> {
        self.conversations
            .messages(conversation)
            .iter()
            .find(|m| m.id == message)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Message {message} not found in {conversation}"))
    }

    fn require_collection(&self, id: &str) -> Result<()> {
        if self.saved.collection(id).is_none() {
            bail!("Collection not found: {id}");
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = match cli.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Load config
    let config_path = cli.config.unwrap_or_else(Config::default_config_path);
    let config = Config::ensure_at(&config_path)?;
    tracing::debug!(data_dir = %config.data_dir.display(), "Opening stores");

    let mut app = App::open(config);

    match cli.command {
        Command::New => cmd_new(&mut app),
        Command::List => {
            cmd_list(&app);
            Ok(())
        }
        Command::Use { id } => cmd_use(&mut app, &id),
        Command::Show { id } => cmd_show(&app, id),
        Command::Send {
            prompt,
            attach,
            model,
            conversation,
        } => cmd_send(&mut app, &prompt, attach.as_deref(), model, conversation).await,
        Command::Rename { id, title } => cmd_rename(&mut app, id, &title),
        Command::Clear { id } => {
            let id = app.conversation_id(id)?;
            app.conversations.clear_messages(&id)?;
            println!("Cleared conversation: {id}");
            Ok(())
        }
        Command::Delete { id } => cmd_delete(&mut app, id),
        Command::Search { term } => {
            cmd_search(&app, &term);
            Ok(())
        }
        Command::Export { id, format, out } => cmd_export(&app, id, format.into(), &out),
        Command::Models => {
            cmd_models(&app);
            Ok(())
        }
        Command::Saved { command } => cmd_saved(&mut app, command),
        Command::Collection { command } => cmd_collection(&mut app, command),
    }
}

fn cmd_new(app: &mut App) -> Result<()> {
    let id = app.conversations.create_conversation()?;
    println!("Started conversation: {id}");
    Ok(())
}

fn cmd_list(app: &App) {
    let conversations = app.conversations.conversations();
    if conversations.is_empty() {
        println!("No conversations yet.");
        return;
    }

    let active = app.conversations.active_id();
    for conv in conversations {
        let marker = if Some(conv.id.as_str()) == active { "*" } else { " " };
        let date = conv.updated_at.format("%Y-%m-%d %H:%M");
        println!(
            "{marker} {} | {} | {} ({} messages)",
            conv.id,
            date,
            conv.title,
            conv.messages.len()
        );
    }
}

fn cmd_use(app: &mut App, id: &str) -> Result<()> {
    let id = app.conversation_id(Some(id.to_string()))?;
    app.conversations.set_active(&id)?;
    println!("Active conversation: {id}");
    Ok(())
}

fn cmd_show(app: &App, id: Option<String>) -> Result<()> {
    let id = app.conversation_id(id)?;
    let Some(conv) = app.conversations.conversation(&id) else {
        bail!("Conversation not found: {id}");
    };

    println!("Title: {}", conv.title);
    println!("Created: {}", conv.created_at);
    println!("Updated: {}", conv.updated_at);
    println!();

    for msg in &conv.messages {
        let speaker = match msg.role {
            MessageRole::User => "You",
            MessageRole::Assistant => app.config.assistant_label.as_str(),
        };
        let mut flags = Vec::new();
        if msg.is_error {
            flags.push("error");
        }
        if app.saved.is_saved(&msg.id) {
            flags.push("saved");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        };
        println!("--- {speaker} ({}){flags} ---", msg.id);
        if let Some(url) = &msg.image_url {
            println!("[image: {url}]");
        }
        if let Some(file) = &msg.file_metadata {
            println!("[file: {} ({} bytes, {})]", file.name, file.size, file.mime_type);
        }
        println!("{}", msg.content);
        println!();
    }

    Ok(())
}

async fn cmd_send(
    app: &mut App,
    prompt: &str,
    attach: Option<&Path>,
    model: Option<String>,
    conversation: Option<String>,
) -> Result<()> {
    if prompt.trim().is_empty() && attach.is_none() {
        bail!("Nothing to send");
    }

    let model = model.unwrap_or_else(|| app.config.generation.model.clone());
    if !app.config.generation.models.contains(&model) {
        tracing::warn!(%model, "Model is not in the configured model list");
    }

    let conversation_id = match conversation {
        Some(id) => app.conversation_id(Some(id))?,
        None => app.conversations.ensure_active()?,
    };

    let attachment = attach.map(read_attachment).transpose()?;
    let client = GeminiClient::from_config(&app.config.generation)?;

    let reply = generate::complete_turn(
        &mut app.conversations,
        &client,
        &conversation_id,
        prompt,
        attachment,
        &model,
    )
    .await?;

    if reply.is_error {
        eprintln!("{}", reply.content);
    } else {
        println!("{}", reply.content);
    }
    Ok(())
}

fn read_attachment(path: &Path) -> Result<Attachment> {
    let data = std::fs::read(path)?;
    let name = path
        .file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
    let mime_type = mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();
    Ok(Attachment {
        name,
        mime_type,
        data,
    })
}

fn cmd_rename(app: &mut App, id: String, title: &str) -> Result<()> {
    let id = app.conversation_id(Some(id))?;
    let title = validate_title(title, app.config.rename_max_chars)?;
    app.conversations.rename_conversation(&id, title.as_str())?;
    println!("Renamed {id} to: {title}");
    Ok(())
}

fn cmd_delete(app: &mut App, id: String) -> Result<()> {
    let id = app.conversation_id(Some(id))?;
    app.conversations.delete_conversation(&id)?;
    println!("Deleted conversation: {id}");
    match app.conversations.active_id() {
        Some(active) => println!("Active conversation: {active}"),
        None => println!("No conversations left."),
    }
    Ok(())
}

fn cmd_search(app: &App, term: &str) {
    let hits = app.conversations.search(term);
    if hits.is_empty() {
        println!("No results found.");
        return;
    }

    for hit in hits {
        println!(
            "[{} | {} | {}] {}",
            hit.conversation.id,
            hit.message.id,
            hit.message.role,
            search::preview(&hit.message.content, term).replace('\n', " ")
        );
    }
}

fn cmd_export(app: &App, id: Option<String>, format: ExportFormat, out: &Path) -> Result<()> {
    let id = app.conversation_id(id)?;
    let Some(conv) = app.conversations.conversation(&id) else {
        bail!("Conversation not found: {id}");
    };
    if conv.messages.is_empty() {
        bail!("Nothing to export: conversation has no messages");
    }

    let path = write_export(&conv.messages, &conv.title, format, out, &app.config)?;
    println!("Saved as {}", path.display());
    Ok(())
}

fn write_export(
    messages: &[Message],
    title: &str,
    format: ExportFormat,
    out: &Path,
    config: &Config,
) -> Result<PathBuf> {
    let content = export::render(messages, format, &config.assistant_label)?;
    let filename = export::export_filename(title, format, chrono::Local::now().date_naive());
    std::fs::create_dir_all(out)?;
    let path = out.join(filename);
    std::fs::write(&path, content)?;
    Ok(path)
}

fn cmd_models(app: &App) {
    for model in &app.config.generation.models {
        let marker = if *model == app.config.generation.model {
            "*"
        } else {
            " "
        };
        println!("{marker} {model}");
    }
}

fn cmd_saved(app: &mut App, command: SavedCommand) -> Result<()> {
    match command {
        SavedCommand::List { collection } => {
            let filter = match collection {
                Some(id) => {
                    app.require_collection(&id)?;
                    CollectionFilter::Collection(id)
                }
                None => CollectionFilter::All,
            };
            let items = app.saved.items_in(&filter);
            if items.is_empty() {
                println!("No saved items.");
                return Ok(());
            }
            for item in items {
                let collection = item
                    .collection_id
                    .as_deref()
                    .and_then(|id| app.saved.collection(id))
                    .map_or("uncategorized", |c| c.name.as_str());
                println!(
                    "{} | {} | {} | {}",
                    item.id,
                    item.saved_at.format("%Y-%m-%d %H:%M"),
                    collection,
                    search::preview(&item.message.content, "").replace('\n', " ")
                );
                if !item.notes.is_empty() {
                    println!("    notes: {}", item.notes);
                }
            }
        }
        SavedCommand::Add {
            conversation,
            message,
            collection,
            uncategorized,
        } => {
            let conversation = app.conversation_id(Some(conversation))?;
            let message = app.find_message(&conversation, &message)?;
            if let Some(id) = &collection {
                app.require_collection(id)?;
            }
            let target = if uncategorized {
                SaveTarget::Uncategorized
            } else {
                SaveTarget::from_option(collection.as_deref())
            };
            let id = app.saved.save_item(&message, target)?;
            println!("Saved item: {id}");
        }
        SavedCommand::Continue { id } => {
            let Some(item) = app.saved.saved_item(&id) else {
                bail!("Saved item not found: {id}");
            };
            let message = item.message.clone();
            let conversation = app.conversations.append_to_active(message)?;
            println!("Message added to conversation {conversation}");
        }
        SavedCommand::Toggle {
            conversation,
            message,
        } => {
            let conversation = app.conversation_id(Some(conversation))?;
            let message = app.find_message(&conversation, &message)?;
            if app.saved.toggle_save(&message)? {
                println!("Message saved");
            } else {
                println!("Message removed from saved items");
            }
        }
        SavedCommand::Remove { id } => {
            if app.saved.saved_item(&id).is_none() {
                bail!("Saved item not found: {id}");
            }
            app.saved.unsave_item(&id)?;
            println!("Removed saved item: {id}");
        }
        SavedCommand::Notes { id, notes } => {
            if app.saved.saved_item(&id).is_none() {
                bail!("Saved item not found: {id}");
            }
            app.saved.update_notes(&id, notes)?;
            println!("Notes updated");
        }
        SavedCommand::Move { id, collection } => {
            if app.saved.saved_item(&id).is_none() {
                bail!("Saved item not found: {id}");
            }
            if let Some(target) = &collection {
                app.require_collection(target)?;
            }
            app.saved.move_to_collection(&id, collection.as_deref())?;
            println!("Moved {id}");
        }
        SavedCommand::Export {
            collection,
            format,
            out,
        } => {
            let (filter, title) = match collection {
                Some(id) => {
                    let Some(found) = app.saved.collection(&id) else {
                        bail!("Collection not found: {id}");
                    };
                    let title = found.name.clone();
                    (CollectionFilter::Collection(id), title)
                }
                None => (CollectionFilter::All, "saved items".to_string()),
            };
            let items = app.saved.items_in(&filter);
            if items.is_empty() {
                bail!("Nothing to export: no saved items");
            }
            let path = match ExportFormat::from(format) {
                ExportFormat::Json => {
                    let content = export::render_saved_json(&items)?;
                    let filename = export::saved_export_filename(chrono::Local::now().date_naive());
                    std::fs::create_dir_all(&out)?;
                    let path = out.join(filename);
                    std::fs::write(&path, content)?;
                    path
                }
                ExportFormat::Text => {
                    let messages: Vec<Message> =
                        items.iter().map(|item| item.message.clone()).collect();
                    write_export(&messages, &title, ExportFormat::Text, &out, &app.config)?
                }
            };
            println!("Saved as {}", path.display());
        }
    }
    Ok(())
}

fn cmd_collection(app: &mut App, command: CollectionCommand) -> Result<()> {
    match command {
        CollectionCommand::List => {
            for collection in app.saved.collections() {
                let count = if collection.is_default() {
                    app.saved.saved_items().len()
                } else {
                    app.saved.count_in(&collection.id)
                };
                println!(
                    "{} | {} | {} | {} items",
                    collection.id, collection.color, collection.name, count
                );
                if !collection.description.is_empty() {
                    println!("    {}", collection.description);
                }
            }
        }
        CollectionCommand::Create {
            name,
            description,
            color,
        } => {
            if name.trim().is_empty() {
                bail!("Collection name cannot be empty");
            }
            let id = app
                .saved
                .create_collection(name.trim(), description, color)?;
            println!("Created collection: {id}");
        }
        CollectionCommand::Update {
            id,
            name,
            description,
            color,
        } => {
            app.require_collection(&id)?;
            let patch = CollectionPatch {
                name,
                description,
                color,
            };
            if patch.is_empty() {
                bail!("Nothing to update");
            }
            app.saved.update_collection(&id, patch)?;
            println!("Updated collection: {id}");
        }
        CollectionCommand::Delete { id } => {
            app.require_collection(&id)?;
            if app
                .saved
                .collection(&id)
                .is_some_and(chatkeep_core::models::Collection::is_default)
            {
                bail!("The default collection cannot be deleted");
            }
            app.saved.delete_collection(&id)?;
            println!("Deleted collection: {id}");
        }
    }
    Ok(())
}
