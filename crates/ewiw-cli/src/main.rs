use std::collections::BTreeMap;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use ewiw_contracts::auth::AuthSession;
use ewiw_contracts::catalog::{ProductCatalog, ProductType};
use ewiw_contracts::chat::{parse_intent, Message, Sender, CHAT_HELP_COMMANDS};
use ewiw_engine::{
    ChatDirectory, ChatEngine, ChatSession, CredentialReport, EngineConfig, TurnError,
    TurnOutcome, TurnReport, Upload,
};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "ewiw", version, about = "Chat-driven product image editor")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Interactive chat: upload an image, then describe edits.
    Chat(ChatArgs),
    /// Apply one instruction to one image and exit.
    Edit(EditArgs),
    /// List the product catalog.
    Products,
    /// Report which provider credentials are configured.
    Health,
}

#[derive(Debug, Args)]
struct ProviderArgs {
    #[arg(long, default_value = "gemini")]
    edit_provider: String,
    #[arg(long, default_value = "replicate")]
    video_provider: String,
    /// Use the offline providers for both edits and videos.
    #[arg(long)]
    dryrun: bool,
    #[arg(long)]
    product: Option<String>,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    title: Option<String>,
    #[arg(long)]
    no_video: bool,
    #[arg(long)]
    no_process_uploads: bool,
    #[arg(long)]
    download_videos: bool,
    #[command(flatten)]
    providers: ProviderArgs,
}

#[derive(Debug, Parser)]
struct EditArgs {
    #[arg(long)]
    image: PathBuf,
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    out: PathBuf,
    /// Also render a promotional video of the result.
    #[arg(long)]
    video: bool,
    #[command(flatten)]
    providers: ProviderArgs,
}

fn main() {
    init_tracing();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("ewiw error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => {
            run_chat(args)?;
            Ok(0)
        }
        Command::Edit(args) => run_edit(args),
        Command::Products => {
            print_products(&ProductCatalog::default());
            Ok(0)
        }
        Command::Health => {
            println!("{}", health_report(&CredentialReport::from_env()));
            Ok(0)
        }
    }
}

fn engine_config(out: &Path, providers: &ProviderArgs) -> EngineConfig {
    let mut config = if providers.dryrun {
        EngineConfig::dryrun(out)
    } else {
        EngineConfig::new(out)
    };
    if !providers.dryrun {
        config.edit_provider = providers.edit_provider.trim().to_ascii_lowercase();
        config.video_provider = providers.video_provider.trim().to_ascii_lowercase();
    }
    config
}

fn initial_product(providers: &ProviderArgs) -> Result<Option<ProductType>> {
    providers
        .product
        .as_deref()
        .map(|raw| raw.parse::<ProductType>().map_err(anyhow::Error::msg))
        .transpose()
}

fn run_chat(args: ChatArgs) -> Result<()> {
    let mut config = engine_config(&args.out, &args.providers);
    config.auto_video = !args.no_video;
    config.process_uploads = !args.no_process_uploads;
    config.download_videos = args.download_videos;
    let product = initial_product(&args.providers)?;

    let engine = ChatEngine::new(config, AuthSession::from_env())?;
    if !engine.auth().is_authenticated {
        bail!("not signed in; set EWIW_USER_ID or enable the demo user");
    }
    let mut chats = ChatDirectory::new(&args.out);
    let session = chats.create(args.title.as_deref())?;
    if let Some(product) = product {
        session.set_product(product);
    }
    println!(
        "Signed in as {}. Type /help for commands.",
        engine.auth().display_label()
    );
    if let Some(session) = chats.active() {
        print_messages(session.transcript().messages());
    }

    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        let input = line.trim_end_matches(['\n', '\r']);
        let intent = parse_intent(input);
        if intent.action == "noop" {
            continue;
        }

        match intent.action.as_str() {
            "help" => {
                println!("Commands: {}", CHAT_HELP_COMMANDS.join(" "));
                println!("Anything else is an edit instruction for the current image.");
            }
            "new_chat" => {
                let title = value_as_non_empty_string(intent.command_args.get("title"));
                let session = chats.create(title.as_deref())?;
                if let Some(product) = product {
                    session.set_product(product);
                }
                println!("Started {} ({})", session.id(), session.title());
                print_messages(session.transcript().messages());
            }
            "list_chats" => {
                for chat in chats.list() {
                    let marker = if chat.active { "*" } else { " " };
                    println!(
                        "{marker} {}  {}  {} messages, {} images  {}",
                        chat.id,
                        chat.title,
                        chat.message_count,
                        chat.image_count,
                        chat.created_at.format("%Y-%m-%d %H:%M")
                    );
                }
            }
            "switch_chat" => {
                let Some(chat_id) = value_as_non_empty_string(intent.command_args.get("chat_id"))
                else {
                    println!("/switch requires a chat id (see /chats)");
                    continue;
                };
                if chats.select(&chat_id) {
                    println!("Switched to {chat_id}");
                } else {
                    println!("No chat named {chat_id}");
                }
            }
            "list_products" => print_products(engine.catalog()),
            action => {
                let Some(session) = chats.active_mut() else {
                    println!("No active chat; use /new to start one.");
                    continue;
                };
                handle_session_command(&engine, session, action, &intent.command_args, input)?;
            }
        }
    }

    Ok(())
}

fn handle_session_command(
    engine: &ChatEngine,
    session: &mut ChatSession,
    action: &str,
    args: &BTreeMap<String, Value>,
    input: &str,
) -> Result<()> {
    match action {
        "upload" => {
            let Some(path) = value_as_non_empty_string(args.get("path")) else {
                println!("/upload requires a path");
                return Ok(());
            };
            let upload = match Upload::from_path(Path::new(&path)) {
                Ok(upload) => upload,
                Err(err) => {
                    println!("Upload failed: {err:#}");
                    return Ok(());
                }
            };
            report_turn(engine.upload(session, upload))?;
        }
        "set_current_image" => {
            let Some(image_id) = value_as_non_empty_string(args.get("image_id")) else {
                println!("/use requires an image id (see /images)");
                return Ok(());
            };
            match engine.use_image(session, &image_id) {
                Ok(id) => println!("Current image set to {id}"),
                Err(err) => println!("{err}"),
            }
        }
        "list_images" => {
            if session.images().is_empty() {
                println!("No images yet.");
            }
            let current = session.current_image_id().cloned();
            for record in session.images().all() {
                let marker = if Some(&record.id) == current.as_ref() { "*" } else { " " };
                println!(
                    "{marker} {}  {:<9}  {:<10}  {}",
                    record.id,
                    record.origin,
                    record.payload.mime_type,
                    record.label.as_deref().unwrap_or("-")
                );
            }
        }
        "history" => print_messages(session.transcript().messages()),
        "set_product" => {
            let raw = value_as_non_empty_string(args.get("product")).unwrap_or_default();
            match raw.parse::<ProductType>() {
                Ok(product) => {
                    session.set_product(product);
                    println!("Product set to {product}");
                }
                Err(err) => println!("{err}"),
            }
        }
        "set_color" => {
            let Some(color) = value_as_non_empty_string(args.get("color")) else {
                println!("Swatch colour is {}", session.swatch());
                return Ok(());
            };
            session.set_swatch(&color);
            let offered = engine
                .catalog()
                .get(session.product())
                .map(|product| product.supports_color(&color))
                .unwrap_or(false);
            if offered {
                println!("Swatch set to {}", session.swatch());
            } else {
                println!(
                    "Swatch set to {} (not a stock colour for {})",
                    session.swatch(),
                    session.product()
                );
            }
        }
        "preview" => {
            let path = value_as_non_empty_string(args.get("path")).map(PathBuf::from);
            match engine.render_preview(session, path.as_deref()) {
                Ok(path) => println!("Preview written to {}", path.display()),
                Err(err) => println!("Preview failed: {err:#}"),
            }
        }
        "video" => report_turn(engine.generate_video(session))?,
        "edit" => report_turn(engine.submit(session, input))?,
        "unknown" => {
            let command = value_as_non_empty_string(args.get("command")).unwrap_or_default();
            println!("Unknown command /{command}. Type /help for commands.");
        }
        other => {
            tracing::debug!(action = other, "unhandled chat action");
            println!("Unhandled command. Type /help for commands.");
        }
    }
    Ok(())
}

/// Prints what the engine posted. Busy and sign-in refusals are shown, not
/// treated as fatal.
fn report_turn(result: Result<TurnReport, TurnError>) -> Result<()> {
    match result {
        Ok(report) => {
            let posted: Vec<Message> = report
                .messages
                .into_iter()
                .filter(|message| message.sender == Sender::System)
                .collect();
            print_messages(&posted);
            Ok(())
        }
        Err(err @ TurnError::Busy { .. }) | Err(err @ TurnError::UnknownImage(_)) => {
            println!("{err}");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

fn run_edit(args: EditArgs) -> Result<i32> {
    let mut config = engine_config(&args.out, &args.providers);
    config.auto_video = args.video;
    config.process_uploads = false;
    let product = initial_product(&args.providers)?;
    let engine = ChatEngine::new(config, AuthSession::from_env())?;

    let mut chats = ChatDirectory::new(&args.out);
    let session = chats.create(Some("One-shot edit"))?;
    if let Some(product) = product {
        session.set_product(product);
    }
    let upload = Upload::from_path(&args.image)?;
    let uploaded = engine.upload(session, upload)?;
    if uploaded.outcome == TurnOutcome::InvalidUpload {
        bail!("{} is not a supported image", args.image.display());
    }

    let report = engine.submit(session, &args.prompt)?;
    print_messages(
        &report
            .messages
            .iter()
            .filter(|message| message.sender == Sender::System)
            .cloned()
            .collect::<Vec<_>>(),
    );
    match report.outcome {
        TurnOutcome::Edited { image_id, .. } => {
            let record = session
                .images()
                .get(&image_id)
                .context("edited image missing from chat")?;
            let path = session
                .dir()
                .join("images")
                .join(format!("{}.{}", record.id, record.payload.extension()));
            println!("{}", path.display());
            Ok(0)
        }
        _ => Ok(2),
    }
}

fn print_messages(messages: &[Message]) {
    for message in messages {
        println!("{}", format_message(message));
    }
}

fn format_message(message: &Message) -> String {
    let mut line = format!("{}> {}", message.sender.as_str(), message.content);
    if let Some(image_id) = message.image_ref.as_ref() {
        line.push_str(&format!(" [image {image_id}]"));
    }
    if let Some(video) = message.video_ref.as_ref() {
        line.push_str(&format!(" [video {video}]"));
    }
    line
}

fn print_products(catalog: &ProductCatalog) {
    for product in catalog.list() {
        println!(
            "{:<9} {:<22} {:>8}  {}",
            product.key,
            product.name,
            product.display_price(),
            product.colors.join(", ")
        );
    }
}

fn health_report(credentials: &CredentialReport) -> Value {
    json!({
        "status": "ok",
        "gemini_api_key_configured": credentials.gemini_api_key_configured,
        "replicate_api_token_configured": credentials.replicate_api_token_configured,
    })
}

fn value_as_non_empty_string(value: Option<&Value>) -> Option<String> {
    let raw = value
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if raw.is_empty() {
        None
    } else {
        Some(raw.to_string())
    }
}
