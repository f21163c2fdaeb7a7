//! C6 — the tag-multiplexing request engine.
//!
//! `exec` takes `&mut Connection`, so the borrow checker enforces spec.md
//! §8 invariants 5 ("at most one tagged command in flight") and 6 ("every
//! allocated tag is eventually resolved or rejected") for free: a second
//! `exec` simply cannot start before the first one's `&mut` borrow ends.
//! [`super::ConnectionHandle`] then wraps a `Connection` in a
//! `tokio::sync::Mutex`, whose FIFO wait queue is the actual "request
//! queue" — multiple callers still serialize in arrival order, they just
//! don't need a hand-rolled queue type to do it.

use std::collections::VecDeque;
use std::time::Duration;

use crate::compiler::{self, CompileOptions, Compiled};
use crate::error::{Error, Result, ResponseStatus};
use crate::events::{ConnectionEvent, LogRecord};
use crate::node::Node;
use crate::response::{self, ResponseMessage};

use super::handlers::detect_throttle;
use super::state::ConnectionState;
use super::Connection;

/// How long the MS365 throttle backoff is allowed to run before the caller
/// gives up waiting and the command is rejected anyway (spec.md §4.6).
const MAX_THROTTLE_SLEEP: Duration = Duration::from_secs(300);

impl Connection {
    pub(crate) fn next_tag(&mut self) -> String {
        self.tag_counter += 1;
        format!("A{:04X}", self.tag_counter)
    }

    /// Options for the bytes actually written to the wire. `is_logging` is
    /// always `false` here — flip it on only for a throwaway render meant
    /// for a [`ConnectionEvent::Log`], never for what gets sent.
    pub(crate) fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            as_array: true,
            is_logging: false,
            literal_plus: self.capabilities.literal_plus(),
            literal_minus: self.capabilities.literal_minus(),
        }
    }

    /// Compiles `command`/`attributes` under `tag` and writes the first
    /// segment, returning whatever segments remain to be written after
    /// subsequent `+` continuations (spec.md §4.5/§4.6). Shared by `exec`
    /// and the fetch streamer (C9), which drives its own read loop instead
    /// of `exec`'s so it can pause between untagged `FETCH` items.
    pub(crate) async fn write_command(&mut self, tag: &str, command: &str, attributes: &[Node]) -> Result<VecDeque<Vec<u8>>> {
        let opts = self.compile_options();
        let compiled = compiler::compile(tag, command, attributes, opts);

        if self.config.emit_logs {
            let log_opts = CompileOptions { is_logging: true, ..opts };
            let redacted = compiler::compile(tag, command, attributes, log_opts).flatten();
            let message = String::from_utf8_lossy(&redacted).trim_end().to_string();
            let _ = self.events.send(ConnectionEvent::Log(LogRecord { message, raw: Some(redacted) }));
        }

        let mut segments: VecDeque<Vec<u8>> = match compiled {
            Compiled::Single(buf) => VecDeque::from(vec![buf]),
            Compiled::Segmented(segs) => VecDeque::from(segs),
        };
        if let Some(first) = segments.pop_front() {
            self.write_bytes(&first).await?;
        }
        Ok(segments)
    }

    /// Compiles and sends `command`/`attributes` under a fresh tag, then
    /// drives the read loop until that tag's final reply arrives.
    /// `plus_hook`, if set, is written verbatim (plus a trailing CRLF) the
    /// first time the server sends a bare `+` continuation instead of the
    /// compiler's own segmented literal — used by SASL `AUTHENTICATE`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoConnection`] if the connection is already logged
    /// out, [`Error::CommandFailed`] on `NO`/`BAD`, [`Error::Throttle`] on a
    /// detected MS365 throttle (after sleeping out the backoff), and
    /// whatever I/O or parser error interrupts the exchange.
    pub async fn exec(&mut self, command: &str, attributes: &[Node], plus_hook: Option<Vec<u8>>) -> Result<ResponseMessage> {
        if !self.state.is_usable() {
            return Err(Error::NoConnection { reason: self.bye_reason.clone() });
        }

        let tag = self.next_tag();
        let mut segments = self.write_command(&tag, command, attributes).await?;
        let mut plus_hook = plus_hook;

        loop {
            let frame = self.read_frame().await?;
            let msg = match response::parse(&frame) {
                Ok(msg) => msg,
                Err(err) => {
                    tracing::warn!(?err, "dropping unparsable frame");
                    continue;
                }
            };
            self.log_incoming(&frame, &msg);
            let _ = self.events.send(ConnectionEvent::Response(msg.clone()));

            if msg.tag == "+" {
                if let Some(bytes) = plus_hook.take() {
                    let mut line = bytes;
                    line.extend_from_slice(b"\r\n");
                    self.write_bytes(&line).await?;
                } else if let Some(next) = segments.pop_front() {
                    self.write_bytes(&next).await?;
                }
                continue;
            }

            if msg.tag == "*" {
                self.dispatch_untagged(&msg);
                continue;
            }

            if msg.tag == tag {
                return self.finalize(msg).await;
            }

            tracing::warn!(tag = %msg.tag, expected = %tag, "ignoring response for an unexpected tag");
        }
    }

    /// Like `exec`, but untagged responses whose command word matches
    /// `collect` (case-insensitively) are gathered and returned alongside
    /// the final tagged reply instead of going through `dispatch_untagged`.
    /// Shared by `SEARCH` result collection (C11 range resolution) and the
    /// `LIST ""` mailbox-missing probe (C8).
    pub(crate) async fn exec_collect_untagged(
        &mut self,
        command: &str,
        attributes: &[Node],
        collect: &str,
    ) -> Result<(ResponseMessage, Vec<ResponseMessage>)> {
        if !self.state.is_usable() {
            return Err(Error::NoConnection { reason: self.bye_reason.clone() });
        }

        let tag = self.next_tag();
        let mut segments = self.write_command(&tag, command, attributes).await?;
        let mut collected = Vec::new();

        loop {
            let frame = self.read_frame().await?;
            let msg = match response::parse(&frame) {
                Ok(msg) => msg,
                Err(err) => {
                    tracing::warn!(?err, "dropping unparsable frame");
                    continue;
                }
            };
            self.log_incoming(&frame, &msg);
            let _ = self.events.send(ConnectionEvent::Response(msg.clone()));

            if msg.tag == "+" {
                if let Some(next) = segments.pop_front() {
                    self.write_bytes(&next).await?;
                }
                continue;
            }

            if msg.tag == "*" {
                if msg.command.eq_ignore_ascii_case(collect) {
                    collected.push(msg);
                } else {
                    self.dispatch_untagged(&msg);
                }
                continue;
            }

            if msg.tag == tag {
                let resolved = self.finalize(msg).await?;
                return Ok((resolved, collected));
            }

            tracing::warn!(tag = %msg.tag, expected = %tag, "ignoring response for an unexpected tag");
        }
    }

    fn log_incoming(&self, frame: &crate::framer::Frame, msg: &ResponseMessage) {
        if !self.config.emit_logs {
            return;
        }
        let message = format!("{} {}", msg.tag, msg.command);
        let _ = self.events.send(ConnectionEvent::Log(LogRecord { message, raw: Some(frame.payload.clone()) }));
    }

    pub(crate) async fn finalize(&mut self, msg: ResponseMessage) -> Result<ResponseMessage> {
        match msg.command.as_str() {
            "OK" | "PREAUTH" => Ok(msg),
            "BYE" => {
                let reason = msg.attributes.iter().find_map(Node::as_text);
                self.bye_reason = reason.clone();
                self.state = ConnectionState::Logout;
                self.mailbox_lock.close();
                let _ = self.events.send(ConnectionEvent::Close);
                Err(Error::NoConnection { reason })
            }
            "NO" | "BAD" => {
                let status = if msg.command == "NO" { ResponseStatus::No } else { ResponseStatus::Bad };
                let text = msg.attributes.iter().find_map(Node::as_text).unwrap_or_default();
                if let Some(reset) = detect_throttle(&text) {
                    tracing::warn!(?reset, "server throttled this request, backing off");
                    tokio::time::sleep(reset.min(MAX_THROTTLE_SLEEP)).await;
                    return Err(Error::Throttle { throttle_reset: reset });
                }
                Err(Error::CommandFailed {
                    response: format!("{} {text}", msg.command),
                    response_status: status,
                    response_text: text,
                    mailbox_missing: false,
                })
            }
            other => Err(Error::InvalidResponse { response: other.to_string() }),
        }
    }
}
