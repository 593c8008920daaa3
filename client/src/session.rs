//! Control-channel session: challenge handshake, command sending, and
//! response correlation over UDP.
//!
//! The protocol has no correlation id, so replies are matched to commands
//! strictly in send order (FIFO). The transport does not actually guarantee
//! that ordering; the original server-side implementation answers in order
//! in practice, and this module keeps that assumption. Two consequences are
//! handled explicitly: a lost reply would stall the queue head forever, so
//! every pending command carries a deadline and a timed-out head is failed
//! and dequeued; and a reply arriving with an empty queue is logged and
//! dropped rather than corrupting later correlation.
//!
//! The session is an actor: `connect` runs the handshake inline, then spawns
//! a worker task that exclusively owns the socket and the pending queue. The
//! cloneable `Session` handle talks to the worker over a channel, so all
//! command issuance is serialized through one place.

use crate::error::RconError;
use log::{debug, error, info, warn};
use shared::Inbound;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::net::{lookup_host, UdpSocket};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{sleep_until, Instant};

/// Default time the queue head may wait for its reply.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

const RECV_BUFFER_SIZE: usize = 4096;

type Reply = oneshot::Sender<Result<String, RconError>>;

enum Request {
    Command {
        args: String,
        reply: Option<Reply>,
    },
    Shutdown,
}

/// A command awaiting its reply. Fragmented responses accumulate here until
/// every index is present.
struct PendingCommand {
    sent_text: String,
    reply: Reply,
    fragments: Vec<Option<Vec<u8>>>,
    expected: Option<usize>,
    deadline: Instant,
}

impl PendingCommand {
    fn new(sent_text: String, reply: Reply, timeout: Duration) -> Self {
        Self {
            sent_text,
            reply,
            fragments: Vec::new(),
            expected: None,
            deadline: Instant::now() + timeout,
        }
    }

    /// Buffers one fragment. The first fragment seen fixes the expected
    /// count; fragments may arrive in any index order.
    fn store_fragment(&mut self, index: usize, total: usize, payload: Vec<u8>) {
        if self.expected.is_none() {
            self.expected = Some(total);
            self.fragments = vec![None; total];
        }
        match self.fragments.get_mut(index) {
            Some(slot) => *slot = Some(payload),
            None => warn!(
                "Fragment index {} out of range for {:?}",
                index, self.sent_text
            ),
        }
    }

    fn is_complete(&self) -> bool {
        self.expected.is_some() && self.fragments.iter().all(Option::is_some)
    }

    /// Concatenates the buffered fragments in index order.
    fn assemble(&self) -> Vec<u8> {
        let mut data = Vec::new();
        for fragment in self.fragments.iter().flatten() {
            data.extend_from_slice(fragment);
        }
        data
    }
}

/// Cloneable handle to a connected session.
#[derive(Clone, Debug)]
pub struct Session {
    requests: mpsc::UnboundedSender<Request>,
}

impl Session {
    /// Connects with the default per-command timeout.
    pub async fn connect(host: &str, port: u16, password: &str) -> Result<Self, RconError> {
        Self::connect_with_timeout(host, port, password, COMMAND_TIMEOUT).await
    }

    /// Resolves the host, binds and connects the UDP socket, runs the
    /// challenge handshake, and spawns the worker task. Fails with
    /// `BadPassword`/`BadChallenge` if the server rejects us, or `Timeout`
    /// if no challenge reply arrives.
    pub async fn connect_with_timeout(
        host: &str,
        port: u16,
        password: &str,
        timeout: Duration,
    ) -> Result<Self, RconError> {
        let mut addrs = lookup_host((host, port)).await?;
        let addr = addrs
            .next()
            .ok_or_else(|| RconError::Protocol(format!("no address found for {}", host)))?;

        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(addr).await?;
        info!("Control socket connected to {}", addr);

        socket
            .send(&shared::frame_request(shared::CHALLENGE_REQUEST))
            .await?;
        let challenge_id = await_challenge(&socket, timeout).await?;
        info!("Challenge handshake complete");

        let (requests, request_rx) = mpsc::unbounded_channel();
        let worker = SessionWorker {
            socket,
            password: password.to_string(),
            challenge_id,
            timeout,
            pending: VecDeque::new(),
            requests: request_rx,
        };
        tokio::spawn(worker.run());

        Ok(Self { requests })
    }

    /// Sends a command and resolves with the stripped response text once the
    /// (possibly reassembled) reply arrives.
    pub async fn command(&self, args: &[&str]) -> Result<String, RconError> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(Request::Command {
                args: args.join(" "),
                reply: Some(tx),
            })
            .map_err(|_| RconError::SessionClosed)?;
        rx.await.map_err(|_| RconError::SessionClosed)?
    }

    /// Fire-and-forget variant for commands whose reply is not needed. No
    /// queue entry is created, so an eventual server reply is dropped (or,
    /// if another command is pending, mis-correlated -- part of the FIFO
    /// protocol gap documented above).
    pub fn command_no_reply(&self, args: &[&str]) -> Result<(), RconError> {
        self.requests
            .send(Request::Command {
                args: args.join(" "),
                reply: None,
            })
            .map_err(|_| RconError::SessionClosed)
    }

    /// Tears the session down. Every outstanding command fails with
    /// `SessionClosed`.
    pub fn close(&self) {
        let _ = self.requests.send(Request::Shutdown);
    }

    /// Handle whose worker is already gone; every send fails with
    /// `SessionClosed`. Lets tracker/router tests run without a socket.
    #[cfg(test)]
    pub(crate) fn closed_for_tests() -> Self {
        let (requests, _) = mpsc::unbounded_channel();
        Self { requests }
    }
}

/// Waits for the challenge reply during the handshake, ignoring unrelated
/// datagrams (e.g. late replies from a previous session on the same port).
async fn await_challenge(socket: &UdpSocket, timeout: Duration) -> Result<String, RconError> {
    let deadline = Instant::now() + timeout;
    let mut buf = [0u8; RECV_BUFFER_SIZE];
    loop {
        let len = tokio::select! {
            result = socket.recv(&mut buf) => result?,
            _ = sleep_until(deadline) => return Err(RconError::Timeout(timeout)),
        };
        match shared::decode_datagram(&buf[..len]) {
            Inbound::Challenge { challenge_id } => return Ok(challenge_id),
            Inbound::BadPassword => return Err(RconError::BadPassword),
            Inbound::BadChallenge => return Err(RconError::BadChallenge),
            other => debug!("Ignoring datagram during handshake: {:?}", other),
        }
    }
}

/// Owns the socket and the pending queue. Sole mutator of both.
struct SessionWorker {
    socket: UdpSocket,
    password: String,
    challenge_id: String,
    timeout: Duration,
    pending: VecDeque<PendingCommand>,
    requests: mpsc::UnboundedReceiver<Request>,
}

impl SessionWorker {
    async fn run(mut self) {
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        loop {
            let head_deadline = self.pending.front().map(|p| p.deadline);
            tokio::select! {
                request = self.requests.recv() => {
                    match request {
                        Some(Request::Command { args, reply }) => {
                            self.send_command(args, reply).await;
                        }
                        Some(Request::Shutdown) | None => {
                            debug!("Session shutting down");
                            break;
                        }
                    }
                }
                result = self.socket.recv(&mut buf) => {
                    match result {
                        Ok(len) => {
                            if !self.on_datagram(&buf[..len]) {
                                break;
                            }
                        }
                        Err(e) => {
                            error!("Control socket receive error: {}", e);
                            break;
                        }
                    }
                }
                _ = sleep_until(head_deadline.unwrap_or_else(Instant::now)),
                        if head_deadline.is_some() => {
                    self.fail_head_timeout();
                }
            }
        }
        self.fail_all(|| RconError::SessionClosed);
    }

    async fn send_command(&mut self, args: String, reply: Option<Reply>) {
        let body = shared::command_body(&self.challenge_id, &self.password, &args);
        debug!("rcon> {}", args);
        if let Err(e) = self.socket.send(&shared::frame_request(&body)).await {
            error!("Failed to send command {:?}: {}", args, e);
            if let Some(reply) = reply {
                let _ = reply.send(Err(RconError::Io(e)));
            }
            return;
        }
        if let Some(reply) = reply {
            self.pending
                .push_back(PendingCommand::new(args, reply, self.timeout));
        }
    }

    /// Handles one inbound datagram. Returns false when the session must
    /// stop (fatal auth error).
    fn on_datagram(&mut self, data: &[u8]) -> bool {
        match shared::decode_datagram(data) {
            Inbound::Challenge { challenge_id } => {
                debug!("Challenge id refreshed");
                self.challenge_id = challenge_id;
            }
            Inbound::BadPassword => {
                error!("Server rejected the rcon password; closing session");
                self.fail_all(|| RconError::BadPassword);
                return false;
            }
            Inbound::BadChallenge => {
                error!("Server rejected our challenge id; closing session");
                self.fail_all(|| RconError::BadChallenge);
                return false;
            }
            Inbound::Single { payload } => match self.pending.pop_front() {
                Some(pending) => {
                    let text = shared::strip_response(&payload);
                    debug!("rcon< {} bytes for {:?}", text.len(), pending.sent_text);
                    let _ = pending.reply.send(Ok(text));
                }
                None => debug!("Dropping response with no pending command"),
            },
            Inbound::Fragment {
                index,
                total,
                payload,
            } => {
                let complete = match self.pending.front_mut() {
                    Some(pending) => {
                        pending.store_fragment(index, total, payload);
                        pending.is_complete()
                    }
                    None => {
                        debug!("Dropping fragment with no pending command");
                        false
                    }
                };
                if complete {
                    if let Some(pending) = self.pending.pop_front() {
                        let text = shared::strip_response(&pending.assemble());
                        debug!(
                            "rcon< reassembled {} bytes for {:?}",
                            text.len(),
                            pending.sent_text
                        );
                        let _ = pending.reply.send(Ok(text));
                    }
                }
            }
            Inbound::Malformed => {
                // Dropped without touching the queue; failing the head here
                // would break correlation for a datagram that may not even
                // belong to us.
                warn!("Dropping malformed datagram ({} bytes)", data.len());
            }
        }
        true
    }

    fn fail_head_timeout(&mut self) {
        if let Some(pending) = self.pending.pop_front() {
            warn!(
                "Command {:?} timed out after {:?}; dropping queue head",
                pending.sent_text, self.timeout
            );
            let _ = pending.reply.send(Err(RconError::Timeout(self.timeout)));
        }
    }

    fn fail_all<F: Fn() -> RconError>(&mut self, make_error: F) {
        while let Some(pending) = self.pending.pop_front() {
            let _ = pending.reply.send(Err(make_error()));
        }
    }
}
