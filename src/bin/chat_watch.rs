//! Campus chat watch tool
//!
//! Polls one conversation and prints every event, or sends a single message.

use anyhow::Context;
use campus_chat::{ChatConfig, ChatEvent, ChatPollingService, EventKind};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// Watch or post to a campus portal conversation.
#[derive(Parser, Debug)]
#[command(name = "chat-watch", version, about, long_about = None)]
struct Cli {
    /// Path to the JSON config file
    #[arg(long, default_value = "chat.json")]
    config: PathBuf,

    /// Override the messaging API base URL
    #[arg(long)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Poll a conversation and print events until Ctrl-C
    Watch {
        /// Your user id
        me: String,
        /// The other participant's user id
        peer: String,
        /// Polling interval in milliseconds (defaults to the config value)
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// Send one message and print the stored result
    Send {
        /// Your user id
        me: String,
        /// The receiver's user id
        peer: String,
        /// Message text
        text: String,
        /// ID of the message to reply to
        #[arg(long)]
        reply_to: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    campus_chat::init();
    let cli = Cli::parse();

    let mut config = ChatConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    config.apply_env();
    if let Some(url) = cli.base_url {
        config.base_url = url;
    }

    let service = ChatPollingService::from_config(&config).context("creating chat service")?;

    match cli.command {
        Commands::Watch { me, peer, interval_ms } => {
            let interval = Duration::from_millis(interval_ms.unwrap_or(config.poll_interval_ms));
            watch(&service, &me, &peer, interval).await
        }
        Commands::Send {
            me,
            peer,
            text,
            reply_to,
        } => {
            if text.trim().is_empty() {
                anyhow::bail!("message text is empty");
            }
            let message = service
                .send_message(&me, &peer, text.trim(), reply_to.as_deref())
                .await
                .context("sending message")?;
            println!("{}", serde_json::to_string_pretty(&message)?);
            Ok(())
        }
    }
}

async fn watch(
    service: &ChatPollingService,
    me: &str,
    peer: &str,
    interval: Duration,
) -> anyhow::Result<()> {
    for kind in [EventKind::NewMessage, EventKind::MessageEdited, EventKind::MessageDeleted] {
        service.on(kind, print_event).await;
    }

    let key = service
        .start_polling_every(me, peer, interval)
        .await
        .context("invalid participants or interval")?;

    println!("Watching {} (Ctrl-C to stop)", key);
    tokio::signal::ctrl_c().await?;

    service.stop_all_polling().await;
    Ok(())
}

fn print_event(event: &ChatEvent) {
    match event {
        ChatEvent::NewMessage(msg) => {
            let reply = msg
                .replied_to
                .as_deref()
                .map(|id| format!(" (reply to {})", id))
                .unwrap_or_default();
            println!(
                "[{}] {} -> {}: {}{}",
                msg.created_at.format("%Y-%m-%d %H:%M:%S"),
                msg.sender_id,
                msg.receiver_id,
                msg.text,
                reply
            );
        }
        ChatEvent::MessageEdited(msg) => println!("edited {}: {}", msg.id, msg.text),
        ChatEvent::MessageDeleted(id) => println!("deleted {}", id),
    }
}
