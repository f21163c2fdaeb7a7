//! C9 — the fetch streamer (spec.md §4.9).
//!
//! `FETCH`/`UID FETCH` can return thousands of untagged responses; buffering
//! them all before handing results to the caller defeats the point of a
//! streaming API. [`FetchStream`] instead holds the connection's mutex
//! across the whole command (via `Arc<tokio::sync::Mutex<Connection>>`'s
//! owned guard) and reads one more frame only when [`FetchStream::next`] is
//! called again — the caller's pull rate *is* the back-pressure, no ack
//! channel needed.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::engine::Connection;
use crate::error::{Error, Result};
use crate::node::Node;
use crate::range::ResolvedRange;
use crate::response::{self, ResponseMessage};

/// Recursively checks whether a `FETCH` query mentions `BINARY`/`BINARY.PEEK`
/// (either directly as the query atom or inside a section), so a connection
/// configured with `disable_binary` can refuse it before sending anything.
fn query_uses_binary(node: &Node) -> bool {
    match node {
        Node::Atom(atom) => {
            if atom.value.to_ascii_uppercase().starts_with("BINARY") {
                return true;
            }
            atom.section.as_ref().is_some_and(|section| section.iter().any(query_uses_binary))
        }
        Node::List(items) => items.iter().any(query_uses_binary),
        _ => false,
    }
}

/// A transport failure observed mid-stream (after the command was already
/// underway) is reported as [`Error::ConnectionClosed`] rather than
/// [`Error::NoConnection`], which is reserved for a connection that was
/// already unusable before this fetch began.
fn mid_stream(err: Error) -> Error {
    match err {
        Error::NoConnection { .. } => Error::ConnectionClosed,
        other => other,
    }
}

/// One `FETCH` data item for a single message, in sequence order as the
/// server sent it.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchItem {
    pub seq: u32,
    pub attributes: Vec<Node>,
}

/// A single `FETCH`/`UID FETCH` exchange, pulled one message at a time.
pub struct FetchStream {
    conn: Arc<Mutex<Connection>>,
    guard: Option<OwnedMutexGuard<Connection>>,
    tag: Option<String>,
    pending_segments: VecDeque<Vec<u8>>,
    range: ResolvedRange,
    query: Node,
    done: bool,
}

impl FetchStream {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>, range: ResolvedRange, query: Node) -> Self {
        Self { conn, guard: None, tag: None, pending_segments: VecDeque::new(), range, query, done: false }
    }

    async fn ensure_started(&mut self) -> Result<()> {
        if self.guard.is_some() {
            return Ok(());
        }
        let mut guard = Arc::clone(&self.conn).lock_owned().await;
        if guard.disable_binary() && query_uses_binary(&self.query) {
            return Err(Error::Config("BINARY/LITERAL8 fetches are disabled for this connection".to_string()));
        }
        let tag = guard.next_tag();
        let command = if self.range.force_uid { "UID FETCH" } else { "FETCH" };
        let attributes = vec![Node::Sequence(self.range.text.clone()), self.query.clone()];
        let segments = guard.write_command(&tag, command, &attributes).await?;
        self.tag = Some(tag);
        self.pending_segments = segments;
        self.guard = Some(guard);
        Ok(())
    }

    /// Pulls the next `FETCH` item, or `None` once the tagged reply has
    /// arrived and the command is complete.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::ConnectionClosed`] if the transport
    /// closes mid-stream, or [`crate::error::Error::CommandFailed`] if the
    /// server rejects the command outright.
    pub async fn next(&mut self) -> Option<Result<FetchItem>> {
        if self.done {
            return None;
        }
        if let Err(err) = self.ensure_started().await {
            self.done = true;
            return Some(Err(err));
        }

        let guard = self.guard.as_mut().expect("started above");
        let tag = self.tag.clone().expect("started above");

        loop {
            let frame = match guard.read_frame().await {
                Ok(frame) => frame,
                Err(err) => {
                    self.done = true;
                    return Some(Err(mid_stream(err)));
                }
            };
            let msg = match response::parse(&frame) {
                Ok(msg) => msg,
                Err(err) => {
                    tracing::warn!(?err, "dropping unparsable frame mid-fetch");
                    continue;
                }
            };

            if msg.tag == "+" {
                if let Some(next) = self.pending_segments.pop_front() {
                    if let Err(err) = guard.write_bytes(&next).await {
                        self.done = true;
                        return Some(Err(mid_stream(err)));
                    }
                }
                continue;
            }

            if msg.tag == tag {
                self.done = true;
                return match guard.finalize(msg).await {
                    Ok(_) => None,
                    Err(err) => Some(Err(err)),
                };
            }

            if msg.tag == "*" {
                if let Some(item) = Self::as_fetch_item(&msg) {
                    return Some(Ok(item));
                }
                guard.dispatch_untagged(&msg);
                continue;
            }

            tracing::warn!(tag = %msg.tag, expected = %tag, "ignoring response for an unexpected tag mid-fetch");
        }
    }

    fn as_fetch_item(msg: &ResponseMessage) -> Option<FetchItem> {
        let seq: u32 = msg.command.parse().ok()?;
        let verb = msg.attributes.first()?.as_text()?;
        if !verb.eq_ignore_ascii_case("FETCH") {
            return None;
        }
        let attributes = msg.attributes.get(1)?.as_list()?.to_vec();
        Some(FetchItem { seq, attributes })
    }
}
