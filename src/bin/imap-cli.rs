#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! CLI exercising the IMAP engine directly against a live server.

use anyhow::Context;
use clap::{Parser, Subcommand};
use imap_engine::command::StoreMode;
use imap_engine::{ConnectionHandle, Flag, ImapConfig, MailboxPath, Range};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "imap-cli")]
#[command(about = "Exercise the IMAP engine against a live server")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Connect, authenticate, and print the negotiated capabilities.
    Capabilities,
    /// List message UIDs and `\Seen` status in a mailbox.
    List {
        #[arg(long, default_value = "INBOX")]
        mailbox: String,
        #[arg(long, default_value = "50")]
        limit: u64,
    },
    /// Mark a message seen by UID.
    MarkSeen {
        #[arg(long, default_value = "INBOX")]
        mailbox: String,
        uid: u64,
    },
    /// Enter one IDLE cycle and report what happened on exit.
    Idle {
        #[arg(long, default_value = "INBOX")]
        mailbox: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let config = ImapConfig::from_env().context("loading IMAP_* configuration")?;
    let (handle, mut events) = ConnectionHandle::connect(config).await.context("connecting")?;

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            tracing::debug!(?event, "connection event");
        }
    });

    match args.command {
        Command::Capabilities => {
            let caps = handle.capabilities().await;
            println!("{caps:?}");
        }
        Command::List { mailbox, limit } => {
            let selected = handle.select(MailboxPath::new(mailbox), true).await.context("SELECT")?;
            let range = Range::All.resolve(limit.try_into().unwrap_or(u32::MAX)).expect("non-empty range");
            let query = imap_engine::node::Node::List(vec![
                imap_engine::node::Node::atom("UID"),
                imap_engine::node::Node::atom("FLAGS"),
            ]);
            let mut stream = selected.fetch(range, query);
            while let Some(item) = stream.next().await {
                let item = item.context("FETCH")?;
                println!("seq {} -> {:?}", item.seq, item.attributes);
            }
            selected.close().await.context("CLOSE")?;
        }
        Command::MarkSeen { mailbox, uid } => {
            let selected = handle.select(MailboxPath::new(mailbox), false).await.context("SELECT")?;
            let range = Range::Uid(uid.to_string()).resolve(0).expect("uid range never empty");
            selected.store(&range, StoreMode::Add, &[Flag::Seen], true).await.context("STORE")?;
            selected.close().await.context("CLOSE")?;
        }
        Command::Idle { mailbox } => {
            let selected = handle.select(MailboxPath::new(mailbox), true).await.context("SELECT")?;
            handle.idle(None).await.context("IDLE")?;
            selected.close().await.context("CLOSE")?;
        }
    }

    handle.logout().await.context("LOGOUT")?;
    Ok(())
}
