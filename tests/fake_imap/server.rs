//! The fake server's connection loop.
//!
//! Speaks just enough IMAP over a `tokio::io::duplex` pair to drive the
//! engine's bring-up and a handful of post-SELECT commands: greeting,
//! `CAPABILITY`, `LOGIN`, `SELECT`/`EXAMINE`, `FETCH`/`UID FETCH`,
//! `STORE`/`UID STORE`, `IDLE`/`DONE`, `CLOSE`, `LOGOUT`. Anything else gets
//! a generic `OK` so bring-up's best-effort `ID`/`ENABLE` steps don't stall
//! a test that doesn't care about them.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

use imap_engine::transport::BoxedTransport;

use super::script::Script;

const DUPLEX_BUF: usize = 64 * 1024;

/// Owns the server half of the duplex pipe; dropping it ends the
/// background task (the pipe closes, the read loop sees EOF).
pub struct FakeImapServer {
    _handle: tokio::task::JoinHandle<()>,
}

impl FakeImapServer {
    /// Spawns the server loop and returns it along with the client half of
    /// the pipe, boxed as a [`BoxedTransport`] ready for
    /// `ConnectionHandle::connect_with_transport`.
    #[must_use]
    pub fn start(script: Script) -> (Self, BoxedTransport) {
        let (client, server) = tokio::io::duplex(DUPLEX_BUF);
        let handle = tokio::spawn(async move {
            let _ = run(server, script).await;
        });
        (Self { _handle: handle }, Box::new(client))
    }
}

async fn run(stream: DuplexStream, script: Script) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream);
    write_line(&mut reader, "* OK IMAP4rev1 fake server ready\r\n").await?;

    let mut selected = false;
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            break;
        }
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            continue;
        }
        let mut parts = trimmed.splitn(2, ' ');
        let Some(tag) = parts.next() else { continue };
        let rest = parts.next().unwrap_or_default();
        let mut words = rest.split(' ');
        let first = words.next().unwrap_or_default().to_ascii_uppercase();
        let command = if first == "UID" {
            format!("UID {}", words.next().unwrap_or_default().to_ascii_uppercase())
        } else {
            first
        };

        match command.as_str() {
            "CAPABILITY" => {
                write_line(&mut reader, "* CAPABILITY IMAP4rev1 IDLE ID ENABLE\r\n").await?;
                write_line(&mut reader, &format!("{tag} OK CAPABILITY completed\r\n")).await?;
            }
            "LOGIN" => {
                write_line(&mut reader, &format!("{tag} OK LOGIN completed\r\n")).await?;
            }
            "ID" => {
                write_line(&mut reader, "* ID NIL\r\n").await?;
                write_line(&mut reader, &format!("{tag} OK ID completed\r\n")).await?;
            }
            "ENABLE" => {
                write_line(&mut reader, &format!("{tag} OK ENABLE completed\r\n")).await?;
            }
            "SELECT" | "EXAMINE" => {
                selected = true;
                write_line(&mut reader, &format!("* {} EXISTS\r\n", script.messages.len())).await?;
                write_line(&mut reader, "* 0 RECENT\r\n").await?;
                write_line(&mut reader, &format!("* OK [UIDVALIDITY {}] UIDs valid\r\n", script.uid_validity)).await?;
                write_line(&mut reader, &format!("{tag} OK [READ-WRITE] {command} completed\r\n")).await?;
            }
            "FETCH" | "UID FETCH" if selected => {
                for message in &script.messages {
                    let flags = message.flags.join(" ");
                    write_line(&mut reader, &format!("* {} FETCH (UID {} FLAGS ({flags}))\r\n", message.seq, message.uid)).await?;
                }
                write_line(&mut reader, &format!("{tag} OK FETCH completed\r\n")).await?;
            }
            "STORE" | "UID STORE" if selected => {
                write_line(&mut reader, &format!("{tag} OK STORE completed\r\n")).await?;
            }
            "IDLE" => {
                write_line(&mut reader, "+ idling\r\n").await?;
                let mut done = String::new();
                reader.read_line(&mut done).await?;
                write_line(&mut reader, &format!("{tag} OK IDLE completed\r\n")).await?;
            }
            "CLOSE" => {
                selected = false;
                write_line(&mut reader, &format!("{tag} OK CLOSE completed\r\n")).await?;
            }
            "LOGOUT" => {
                write_line(&mut reader, "* BYE logging out\r\n").await?;
                write_line(&mut reader, &format!("{tag} OK LOGOUT completed\r\n")).await?;
                break;
            }
            _ => {
                write_line(&mut reader, &format!("{tag} OK {command} completed\r\n")).await?;
            }
        }
    }
    Ok(())
}

async fn write_line(stream: &mut BufReader<DuplexStream>, line: &str) -> std::io::Result<()> {
    stream.get_mut().write_all(line.as_bytes()).await?;
    stream.get_mut().flush().await
}
