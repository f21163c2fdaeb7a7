//! Connection events (spec.md §6, `[FULL]` design note in SPEC_FULL.md §6
//! and spec.md §9 "Event-emitter public surface").
//!
//! Delivered over a `tokio::sync::mpsc::UnboundedSender`/`UnboundedReceiver`
//! pair returned from the engine's connect call, rather than a dynamic
//! name-keyed emitter.

use crate::mailbox::{Mailbox, MailboxPath};
use crate::response::ResponseMessage;

/// One event emitted by the connection engine.
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    Close,
    Error(String),
    Exists { path: MailboxPath, count: u32, prev_count: u32 },
    Expunge { path: MailboxPath, seq: u32 },
    Vanished { path: MailboxPath, uid: u32, earlier: bool },
    Flags {
        path: MailboxPath,
        seq: u32,
        uid: Option<u32>,
        modseq: Option<u64>,
        flags: Vec<String>,
    },
    MailboxOpen(Mailbox),
    MailboxClose(Mailbox),
    Log(LogRecord),
    Response(ResponseMessage),
}

/// A structured log record, emitted only when `emit_logs` is set
/// (SPEC_FULL.md §6 `[FULL]`); `tracing` is always fed regardless of this
/// flag so the ambient logging stack is never gated off entirely.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub message: String,
    pub raw: Option<Vec<u8>>,
}

pub type EventSender = tokio::sync::mpsc::UnboundedSender<ConnectionEvent>;
pub type EventReceiver = tokio::sync::mpsc::UnboundedReceiver<ConnectionEvent>;

/// Creates the event channel pair returned alongside a connection.
#[must_use]
pub fn channel() -> (EventSender, EventReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}
