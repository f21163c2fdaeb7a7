//! C7 — the connection engine: transport ownership, the bring-up sequence,
//! and untagged-response dispatch. See spec.md §4.7.
//!
//! [`Connection`] owns all per-connection state and exposes `&mut self`
//! methods (C6's `exec`, plus the handlers below); [`ConnectionHandle`] wraps
//! one in `Arc<tokio::sync::Mutex<_>>` so it can be cloned across tasks while
//! still serializing access in FIFO arrival order, the same pattern
//! [`crate::mailbox::MailboxLockScheduler`] uses for mailbox exclusivity.

pub mod handlers;
pub mod idle;
mod requests;
pub mod state;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::auth::{self, AuthMethod};
use crate::capability::Capabilities;
use crate::command;
use crate::compiler::{self, CompileOptions};
use crate::config::{AuthConfig, ImapConfig};
use crate::error::{Error, ResponseStatus, Result};
use crate::events::{self, ConnectionEvent, EventReceiver, EventSender};
use crate::flag::Flag;
use crate::framer::{Frame, Framer};
use crate::mailbox::{LockOptions, LockTicket, Mailbox, MailboxLockScheduler, MailboxPath};
use crate::node::Node;
use crate::range::{try_expand_message_range, ResolvedRange};
use crate::response::{self, ResponseMessage};
use crate::transport::{self, BoxedTransport};

pub use state::ConnectionState;

const READ_CHUNK: usize = 8192;

/// The engine's full per-connection state (spec.md §3 "Connection").
pub struct Connection {
    transport: Option<BoxedTransport>,
    framer: Framer,
    pending_frames: VecDeque<Frame>,
    state: ConnectionState,
    capabilities: Capabilities,
    tag_counter: u64,
    mailbox: Option<Mailbox>,
    mailbox_lock: MailboxLockScheduler,
    events: EventSender,
    config: ImapConfig,
    bye_reason: Option<String>,
}

impl Connection {
    fn io(&mut self) -> &mut BoxedTransport {
        self.transport.as_mut().expect("connection transport missing")
    }

    pub(crate) async fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let timeout = self.config.socket_timeout;
        let outcome = tokio::time::timeout(timeout, async {
            self.io().write_all(bytes).await?;
            self.io().flush().await
        })
        .await;
        match outcome {
            Err(_) => Err(self.fail(Error::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "socket write timed out")))),
            Ok(Err(err)) => Err(self.fail(err.into())),
            Ok(Ok(())) => Ok(()),
        }
    }

    /// Reads from the transport until the framer yields at least one more
    /// frame, returning the oldest queued one.
    pub(crate) async fn read_frame(&mut self) -> Result<Frame> {
        if let Some(frame) = self.pending_frames.pop_front() {
            return Ok(frame);
        }
        let timeout = self.config.socket_timeout;
        loop {
            let mut buf = [0u8; READ_CHUNK];
            let n = match tokio::time::timeout(timeout, self.io().read(&mut buf)).await {
                Err(_) => return Err(self.fail(Error::Io(std::io::Error::new(std::io::ErrorKind::TimedOut, "socket read timed out")))),
                Ok(Err(err)) => return Err(self.fail(err.into())),
                Ok(Ok(n)) => n,
            };
            if n == 0 {
                return Err(self.fail(Error::NoConnection { reason: Some("connection closed by peer".into()) }));
            }
            let frames = match self.framer.push(&buf[..n]) {
                Ok(frames) => frames,
                Err(err) => return Err(self.fail(err)),
            };
            self.pending_frames.extend(frames);
            if let Some(frame) = self.pending_frames.pop_front() {
                return Ok(frame);
            }
        }
    }

    /// Marks the connection unusable and emits the error/close pair spec.md
    /// §7 requires on I/O failure ("emits error once and close"), then
    /// hands the original error back to the caller. The graceful `BYE`/
    /// `LOGOUT` paths in `finalize`/`dispatch_untagged` emit `Close` only —
    /// they aren't failures, so no `Error` event accompanies them.
    fn fail(&mut self, err: Error) -> Error {
        self.state = ConnectionState::Logout;
        self.mailbox_lock.close();
        let _ = self.events.send(ConnectionEvent::Error(err.to_string()));
        let _ = self.events.send(ConnectionEvent::Close);
        err
    }

    pub(crate) fn disable_binary(&self) -> bool {
        self.config.disable_binary
    }

    /// Dispatches one untagged (`*`) response: updates mailbox/capability
    /// state and forwards a [`ConnectionEvent`] to subscribers (spec.md §4.7
    /// "Untagged handlers").
    pub(crate) fn dispatch_untagged(&mut self, msg: &ResponseMessage) {
        if let Ok(n) = msg.command.parse::<u32>() {
            #[allow(clippy::cast_possible_truncation)]
            let n = n;
            let verb = msg.attributes.first().and_then(Node::as_text).unwrap_or_default();
            match verb.to_ascii_uppercase().as_str() {
                "EXISTS" => self.on_exists(n),
                "EXPUNGE" => self.on_expunge(n),
                "FETCH" => self.on_fetch(n, msg.attributes.get(1)),
                _ => {}
            }
            return;
        }

        match msg.command.as_str() {
            "OK" | "PREAUTH" => self.on_untagged_ok(msg),
            "BYE" => {
                let reason = msg.attributes.iter().find_map(Node::as_text);
                self.bye_reason = reason.clone();
                self.state = ConnectionState::Logout;
                self.mailbox_lock.close();
                let _ = self.events.send(ConnectionEvent::Close);
                let _ = reason;
            }
            "CAPABILITY" => self.capabilities.update(&msg.attributes),
            "VANISHED" => self.on_vanished(&msg.attributes),
            _ => {}
        }
    }

    fn on_untagged_ok(&mut self, msg: &ResponseMessage) {
        let Some(atom) = msg.attributes.first().and_then(Node::as_atom) else { return };
        let Some(section) = &atom.section else { return };
        if section.first().and_then(Node::as_text).is_some_and(|t| t.eq_ignore_ascii_case("CAPABILITY")) {
            self.capabilities.update(&section[1..]);
        }
    }

    fn on_exists(&mut self, count: u32) {
        let Some(mailbox) = &mut self.mailbox else { return };
        let prev_count = mailbox.exists;
        mailbox.exists = count;
        let path = mailbox.path.clone();
        let _ = self.events.send(ConnectionEvent::Exists { path, count, prev_count });
    }

    fn on_expunge(&mut self, seq: u32) {
        let Some(mailbox) = &mut self.mailbox else { return };
        mailbox.exists = mailbox.exists.saturating_sub(1);
        let path = mailbox.path.clone();
        let _ = self.events.send(ConnectionEvent::Expunge { path, seq });
    }

    fn on_fetch(&mut self, seq: u32, data: Option<&Node>) {
        let Some(mailbox) = &self.mailbox else { return };
        let path = mailbox.path.clone();
        let Some(items) = data.and_then(Node::as_list) else { return };

        let mut uid = None;
        let mut modseq = None;
        let mut flags = None;
        for (key, value) in handlers::fetch_pairs(items) {
            match key.as_text().unwrap_or_default().to_ascii_uppercase().as_str() {
                "UID" => uid = value.as_number().and_then(|n| u32::try_from(n).ok()),
                "MODSEQ" => {
                    modseq = value.as_list().and_then(|l| l.first()).and_then(Node::as_number).or_else(|| value.as_number());
                }
                "FLAGS" => flags = Some(handlers::flags_from_list(value)),
                _ => {}
            }
        }
        if let Some(flags) = flags {
            let _ = self.events.send(ConnectionEvent::Flags { path, seq, uid, modseq, flags });
        }
    }

    fn on_vanished(&mut self, attributes: &[Node]) {
        let Some(mailbox) = &self.mailbox else { return };
        let path = mailbox.path.clone();
        let Some((earlier, seq)) = handlers::parse_vanished(attributes) else { return };
        let Some(uids) = try_expand_message_range(&seq) else { return };
        for uid in uids {
            #[allow(clippy::cast_possible_truncation)]
            let uid32 = uid as u32;
            let _ = self.events.send(ConnectionEvent::Vanished { path: path.clone(), uid: uid32, earlier });
        }
    }
}

/// A cloneable handle to a connection engine. Every clone shares the same
/// underlying [`Connection`]; concurrent callers serialize through the
/// mutex's FIFO wait queue.
#[derive(Clone)]
pub struct ConnectionHandle(Arc<Mutex<Connection>>);

/// A mailbox transaction in progress: holds the [`LockTicket`] granting
/// exclusive use of the selected mailbox until dropped or explicitly closed.
pub struct SelectedMailbox {
    handle: ConnectionHandle,
    ticket: Option<LockTicket>,
}

impl ConnectionHandle {
    /// Runs the full bring-up sequence (spec.md §4.7 steps 1-8): connect,
    /// read the greeting, learn capabilities, upgrade to TLS if needed,
    /// authenticate, negotiate compression, and send `ID`/`ENABLE`.
    ///
    /// # Errors
    ///
    /// Returns the first step's error: timeouts, TLS failures,
    /// [`Error::AuthenticationFailure`], or an I/O error.
    pub async fn connect(config: ImapConfig) -> Result<(Self, EventReceiver)> {
        let tcp = tokio::time::timeout(config.connect_timeout, transport::connect_tcp(&config.host, config.port))
            .await
            .map_err(|_| Error::ConnectTimeout(config.connect_timeout))??;

        let servername = config.servername.clone().unwrap_or_else(|| config.host.clone());
        let initial: BoxedTransport = if config.secure {
            tokio::time::timeout(config.upgrade_timeout, transport::upgrade_tls(Box::new(tcp), &servername, config.danger_accept_invalid_certs))
                .await
                .map_err(|_| Error::UpgradeTimeout(config.upgrade_timeout))??
        } else {
            Box::new(tcp)
        };

        Self::connect_with_transport(initial, config).await
    }

    /// Runs the bring-up sequence over an already-open transport, skipping
    /// the TCP dial and initial TLS handshake `connect` performs. Exposed so
    /// integration tests can drive bring-up against an in-process fake
    /// server (e.g. a `tokio::io::duplex` pair) without a real socket.
    ///
    /// # Errors
    ///
    /// See [`Self::connect`].
    pub async fn connect_with_transport(transport: BoxedTransport, config: ImapConfig) -> Result<(Self, EventReceiver)> {
        let (events, receiver) = events::channel();
        let servername = config.servername.clone().unwrap_or_else(|| config.host.clone());

        let mut conn = Connection {
            transport: Some(transport),
            framer: Framer::new(),
            pending_frames: VecDeque::new(),
            state: ConnectionState::NotAuthenticated,
            capabilities: Capabilities::new(),
            tag_counter: 0,
            mailbox: None,
            mailbox_lock: MailboxLockScheduler::new(),
            events,
            config: config.clone(),
            bye_reason: None,
        };

        Self::bring_up(&mut conn, &config, &servername).await?;

        Ok((Self(Arc::new(Mutex::new(conn))), receiver))
    }

    async fn bring_up(conn: &mut Connection, config: &ImapConfig, servername: &str) -> Result<()> {
        // Step 1: greeting.
        let greeting_frame = tokio::time::timeout(config.greeting_timeout, conn.read_frame())
            .await
            .map_err(|_| Error::GreetingTimeout(config.greeting_timeout))??;
        let greeting = response::parse(&greeting_frame)?;
        match greeting.command.as_str() {
            "PREAUTH" => conn.state = ConnectionState::Authenticated,
            "BYE" => {
                let reason = greeting.attributes.iter().find_map(Node::as_text);
                return Err(Error::NoConnection { reason });
            }
            _ => {}
        }
        conn.on_untagged_ok(&greeting);

        // Step 2: learn capabilities if the greeting didn't carry them.
        if conn.capabilities.is_empty() {
            conn.exec("CAPABILITY", &[], None).await?;
        }

        // Step 3: ID. Advisory — sent before any capabilities the server
        // might only start advertising after STARTTLS/auth, so the server
        // learns who it's talking to as early as possible.
        if conn.capabilities.has("ID") {
            let (cmd, attrs) = command::id(&config.client_info);
            let _ = conn.exec(cmd, &attrs, None).await;
        }

        // Step 4: STARTTLS, if the caller connected in the clear.
        if !config.secure && conn.capabilities.has("STARTTLS") {
            conn.exec("STARTTLS", &[], None).await?;
            let old = conn.transport.take().expect("transport present before STARTTLS");
            let upgraded = tokio::time::timeout(config.upgrade_timeout, transport::upgrade_tls(old, servername, config.danger_accept_invalid_certs))
                .await
                .map_err(|_| Error::UpgradeTimeout(config.upgrade_timeout))??;
            conn.transport = Some(upgraded);
            conn.framer = Framer::new();
            conn.capabilities = Capabilities::new();
            conn.exec("CAPABILITY", &[], None).await?;
        }

        // Step 5: authenticate, unless the greeting already was PREAUTH.
        if conn.state == ConnectionState::NotAuthenticated {
            let method: Box<dyn AuthMethod> = match &config.auth {
                AuthConfig::Login { user, pass } => Box::new(auth::Login::new(user.clone(), pass.clone())),
                AuthConfig::XOAuth2 { user, access_token, authzid } => {
                    let mut m = auth::XOAuth2::new(user.clone(), access_token.clone());
                    m.authzid.clone_from(authzid);
                    Box::new(m)
                }
            };
            let attrs = method.attributes();
            conn.exec(method.command(), &attrs, method.continuation()).await.map_err(|err| match err {
                Error::CommandFailed { response, .. } => Error::AuthenticationFailure { response: Some(response) },
                other => other,
            })?;
            conn.state = ConnectionState::Authenticated;
            conn.exec("CAPABILITY", &[], None).await?;
        }

        // Step 6: NAMESPACE. Exchange replies BAD ("User is authenticated
        // but not connected") when the mailbox store isn't ready instead of
        // failing the command outright; treat that the same as an
        // authentication failure rather than letting it fall through
        // silently like the other advisory steps.
        if conn.capabilities.has("NAMESPACE") {
            let (cmd, attrs) = command::namespace();
            if let Err(err) = conn.exec(cmd, &attrs, None).await {
                return Err(match err {
                    Error::CommandFailed { response_status: ResponseStatus::Bad, response, .. } => {
                        Error::AuthenticationFailure { response: Some(response) }
                    }
                    other => other,
                });
            }
        }

        // Step 7: COMPRESS=DEFLATE.
        if !config.disable_compression && conn.capabilities.has("COMPRESS=DEFLATE") {
            conn.exec("COMPRESS", &[Node::atom("DEFLATE")], None).await?;
            let old = conn.transport.take().expect("transport present before COMPRESS");
            conn.transport = Some(transport::enable_compression(old));
        }

        // Step 8: ENABLE CONDSTORE UTF8=ACCEPT (+QRESYNC). Advisory; servers
        // that reject ENABLE don't fail bring-up.
        if !config.disable_auto_enable && conn.capabilities.has("ENABLE") {
            let mut wanted = vec!["CONDSTORE"];
            if config.qresync && conn.capabilities.has("QRESYNC") {
                wanted.push("QRESYNC");
            }
            if conn.capabilities.has("UTF8=ACCEPT") {
                wanted.push("UTF8=ACCEPT");
            }
            let (cmd, attrs) = command::enable(&wanted);
            let _ = conn.exec(cmd, &attrs, None).await;
        }

        Ok(())
    }

    /// Executes a raw command built from [`crate::command`]'s builders.
    ///
    /// # Errors
    ///
    /// See [`Connection::exec`].
    pub async fn exec(&self, command: &str, attributes: Vec<Node>) -> Result<ResponseMessage> {
        self.0.lock().await.exec(command, &attributes, None).await
    }

    #[must_use]
    pub async fn capabilities(&self) -> Capabilities {
        self.0.lock().await.capabilities.clone()
    }

    #[must_use]
    pub async fn state(&self) -> ConnectionState {
        self.0.lock().await.state
    }

    /// Opens `path` for read-write (`SELECT`) or read-only (`EXAMINE`)
    /// access, serialized against any other mailbox transaction on this
    /// connection via the mailbox lock scheduler (C8).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoConnection`] if the connection has closed, or
    /// [`Error::CommandFailed`] if the server rejects the command.
    pub async fn select(&self, path: MailboxPath, read_only: bool) -> Result<SelectedMailbox> {
        let scheduler = self.0.lock().await.mailbox_lock.clone();
        let ticket = scheduler.acquire(path.clone(), LockOptions { read_only }).await?;

        let mut conn = self.0.lock().await;

        // Already selected on this same path/mode: resolve immediately, no
        // round-trip (spec.md §4.8).
        let already_selected = conn.state == ConnectionState::Selected
            && conn.mailbox.as_ref().is_some_and(|m| m.path == path && m.read_only == read_only);
        if already_selected {
            drop(conn);
            return Ok(SelectedMailbox { handle: self.clone(), ticket: Some(ticket) });
        }

        conn.mailbox = Some(Mailbox::new(path.clone(), read_only));
        let (cmd, attrs) = if read_only { command::examine(&path) } else { command::select(&path) };
        match conn.exec(cmd, &attrs, None).await {
            Ok(_) => {
                conn.state = ConnectionState::Selected;
                if let Some(mailbox) = &conn.mailbox {
                    let _ = conn.events.send(ConnectionEvent::MailboxOpen(mailbox.clone()));
                }
                drop(conn);
                Ok(SelectedMailbox { handle: self.clone(), ticket: Some(ticket) })
            }
            Err(err) => {
                conn.mailbox = None;
                let err = match err {
                    Error::CommandFailed { response, response_status: ResponseStatus::No, response_text, .. } => {
                        let (list_cmd, list_attrs) = command::list("", path.as_str());
                        let mailbox_missing = match conn.exec_collect_untagged(list_cmd, &list_attrs, "LIST").await {
                            Ok((_, collected)) => collected.is_empty(),
                            Err(_) => false,
                        };
                        Error::CommandFailed { response, response_status: ResponseStatus::No, response_text, mailbox_missing }
                    }
                    other => other,
                };
                Err(err)
            }
        }
    }

    /// `LOGOUT`. The connection is unusable afterward regardless of whether
    /// the server replies before closing.
    ///
    /// # Errors
    ///
    /// Propagates anything but [`Error::NoConnection`] from the exchange
    /// (a `BYE`-then-close is the expected successful path).
    pub async fn logout(&self) -> Result<()> {
        let mut conn = self.0.lock().await;
        match conn.exec("LOGOUT", &[], None).await {
            Ok(_) | Err(Error::NoConnection { .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Runs one `IDLE` cycle: enters idle mode, waits for either a server
    /// push, `max_duration` (or the configured default) to elapse, then
    /// sends `DONE` and awaits the tagged reply. Untagged pushes observed
    /// during the cycle are delivered on the event channel as usual, not
    /// buffered into the return value — see [`idle`] for why automatic
    /// background idling isn't implemented here.
    ///
    /// # Errors
    ///
    /// Returns the configured substitute command's result if the server
    /// lacks the `IDLE` capability, or any I/O/parser error interrupting the
    /// exchange.
    pub async fn idle(&self, max_duration: Option<Duration>) -> Result<()> {
        let mut conn = self.0.lock().await;

        if !conn.capabilities.has("IDLE") {
            let cmd = conn.config.missing_idle_command.clone();
            conn.exec(&cmd, &[], None).await?;
            return Ok(());
        }

        let tag = conn.next_tag();
        let compiled = compiler::compile(&tag, "IDLE", &[], CompileOptions::default());
        conn.write_bytes(&compiled.flatten()).await?;

        loop {
            let frame = conn.read_frame().await?;
            let msg = response::parse(&frame)?;
            if msg.tag == "+" {
                break;
            }
            conn.dispatch_untagged(&msg);
        }

        let max_idle = idle::effective_max_idle(max_duration, conn.config.max_idle_time);
        let deadline = tokio::time::sleep(max_idle);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                () = &mut deadline => break,
                frame = conn.read_frame() => {
                    let frame = frame?;
                    let msg = response::parse(&frame)?;
                    conn.dispatch_untagged(&msg);
                }
            }
        }

        conn.write_bytes(b"DONE\r\n").await?;
        loop {
            let frame = conn.read_frame().await?;
            let msg = response::parse(&frame)?;
            if msg.tag == tag {
                conn.finalize(msg).await?;
                return Ok(());
            }
            conn.dispatch_untagged(&msg);
        }
    }

    pub(crate) fn inner(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.0)
    }
}

impl SelectedMailbox {
    /// Runs a command against the already-selected mailbox.
    ///
    /// # Errors
    ///
    /// See [`Connection::exec`].
    pub async fn exec(&self, command: &str, attributes: Vec<Node>) -> Result<ResponseMessage> {
        self.handle.exec(command, attributes).await
    }

    #[must_use]
    pub async fn snapshot(&self) -> Option<Mailbox> {
        self.handle.0.lock().await.mailbox.clone()
    }

    /// Resolves `range` against this mailbox. Every variant but
    /// [`crate::range::Range::Search`] is resolved synchronously against the
    /// current `EXISTS` count; `Search` runs `UID SEARCH` and packs the
    /// returned numbers into a compact range string (spec.md §4.11 "other
    /// search object").
    ///
    /// # Errors
    ///
    /// See [`Connection::exec`].
    pub async fn resolve_range(&self, range: &crate::range::Range) -> Result<Option<ResolvedRange>> {
        let crate::range::Range::Search(criteria) = range else {
            let exists = self.snapshot().await.map(|m| m.exists).unwrap_or(0);
            return Ok(range.resolve(exists));
        };

        let mut conn = self.handle.0.lock().await;
        let (cmd, attrs) = command::search(criteria, true);
        let (_, collected) = conn.exec_collect_untagged(cmd, &attrs, "SEARCH").await?;
        let uids: Vec<u64> = collected.iter().flat_map(|msg| msg.attributes.iter().filter_map(Node::as_number)).collect();
        if uids.is_empty() {
            return Ok(None);
        }
        Ok(Some(ResolvedRange { text: crate::range::pack_message_range(&uids), force_uid: true }))
    }

    /// Starts a streaming `FETCH`/`UID FETCH` over `range` (already resolved
    /// via [`crate::range::Range::resolve`]).
    #[must_use]
    pub fn fetch(&self, range: ResolvedRange, query: Node) -> crate::fetch::FetchStream {
        crate::fetch::FetchStream::new(self.handle.inner(), range, query)
    }

    /// `STORE`/`UID STORE` against `range`.
    ///
    /// # Errors
    ///
    /// See [`Connection::exec`].
    pub async fn store(&self, range: &ResolvedRange, mode: command::StoreMode, flags: &[Flag], silent: bool) -> Result<ResponseMessage> {
        let (cmd, attrs) = command::store(&range.text, mode, flags, silent, range.force_uid);
        self.handle.exec(cmd, attrs).await
    }

    /// `CLOSE`s the mailbox and releases the mailbox lock.
    ///
    /// # Errors
    ///
    /// See [`Connection::exec`].
    pub async fn close(mut self) -> Result<()> {
        let result = self.handle.exec("CLOSE", Vec::new()).await;
        let mut conn = self.handle.0.lock().await;
        if let Some(mailbox) = conn.mailbox.take() {
            let _ = conn.events.send(ConnectionEvent::MailboxClose(mailbox));
        }
        conn.state = ConnectionState::Authenticated;
        drop(conn);
        self.ticket.take();
        result.map(|_| ())
    }
}
