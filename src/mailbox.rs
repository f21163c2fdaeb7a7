//! Mailbox data model and the mailbox lock scheduler (C8, spec.md §4.8).
//!
//! The scheduler only provides exclusivity and FIFO fairness over mailbox
//! transactions; actually opening a mailbox (running `SELECT`/`EXAMINE`) is
//! the connection engine's job, since that requires sending a command
//! through the request engine (C6). `tokio::sync::Semaphore` already gives
//! FIFO-fair, single-permit exclusivity, so the scheduler is a thin wrapper
//! around one rather than a hand-rolled queue.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::{Error, Result};

/// A normalized mailbox path.
///
/// `INBOX` is matched case-insensitively per RFC 3501 and always canonicalized
/// to uppercase; every other name is kept as the server presented it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MailboxPath(String);

impl MailboxPath {
    #[must_use]
    pub fn new(raw: impl AsRef<str>) -> Self {
        let raw = raw.as_ref();
        if raw.eq_ignore_ascii_case("inbox") {
            Self("INBOX".to_string())
        } else {
            Self(raw.to_string())
        }
    }

    /// Builds a path from namespace components joined by `delimiter`
    /// (spec.md §4.8 "joins array paths with delimiter").
    #[must_use]
    pub fn from_parts(parts: &[&str], delimiter: char) -> Self {
        Self::new(parts.join(&delimiter.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_inbox(&self) -> bool {
        self.0 == "INBOX"
    }
}

impl std::fmt::Display for MailboxPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A selected mailbox's state (spec.md §3 "Mailbox"). Created on successful
/// SELECT/EXAMINE; mutated by untagged EXISTS/EXPUNGE/VANISHED/FETCH
/// handlers; destroyed on CLOSE, SELECT of another mailbox, or logout.
#[derive(Debug, Clone)]
pub struct Mailbox {
    pub path: MailboxPath,
    pub delimiter: Option<char>,
    pub flags: HashSet<String>,
    pub permanent_flags: HashSet<String>,
    pub special_use: Option<String>,
    pub uid_validity: u64,
    pub uid_next: u32,
    pub exists: u32,
    pub highest_modseq: Option<u64>,
    pub read_only: bool,
    pub mailbox_id: Option<String>,
}

impl Mailbox {
    #[must_use]
    pub fn new(path: MailboxPath, read_only: bool) -> Self {
        Self {
            path,
            delimiter: None,
            flags: HashSet::new(),
            permanent_flags: HashSet::new(),
            special_use: None,
            uid_validity: 0,
            uid_next: 0,
            exists: 0,
            highest_modseq: None,
            read_only,
            mailbox_id: None,
        }
    }
}

/// Whether a lock is taken for read-only (`EXAMINE`) or read-write
/// (`SELECT`) access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    pub read_only: bool,
}

/// A held mailbox lock. Dropping it (or calling [`LockTicket::release`]
/// explicitly) releases exclusivity and lets the next queued acquisition
/// proceed.
#[derive(Debug)]
pub struct LockTicket {
    pub path: MailboxPath,
    pub options: LockOptions,
    _permit: OwnedSemaphorePermit,
}

impl LockTicket {
    #[must_use]
    pub fn release(self) {
        // Dropping `_permit` returns it to the semaphore in FIFO order.
    }
}

/// Single-slot FIFO scheduler serializing mailbox transactions (spec.md
/// §4.8). At most one [`LockTicket`] is held at a time.
#[derive(Debug, Clone)]
pub struct MailboxLockScheduler {
    semaphore: Arc<Semaphore>,
}

impl Default for MailboxLockScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl MailboxLockScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self { semaphore: Arc::new(Semaphore::new(1)) }
    }

    /// Enqueues an acquisition, resolving in FIFO order once the previous
    /// holder releases. The caller (the connection engine) is responsible
    /// for running SELECT/EXAMINE before constructing the returned ticket's
    /// contents are trusted as "selected".
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoConnection`] if the scheduler has been closed
    /// (the connection closed while the ticket was queued).
    pub async fn acquire(&self, path: MailboxPath, options: LockOptions) -> Result<LockTicket> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| Error::NoConnection { reason: Some("connection closed while awaiting mailbox lock".into()) })?;
        Ok(LockTicket { path, options, _permit: permit })
    }

    /// Rejects every queued acquisition with `NoConnection` (spec.md §4.7
    /// close semantics) by closing the underlying semaphore; any ticket
    /// already resolved continues to hold its permit until dropped.
    pub fn close(&self) {
        self.semaphore.close();
    }
}
