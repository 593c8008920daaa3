//! UDP log-stream listener.
//!
//! The game server forwards every log line as one datagram to a configured
//! address. Each datagram is independent -- there is no buffering across
//! datagrams. The listener strips the framing, runs the classifier, and
//! republishes the result on a broadcast channel so any number of
//! subscribers (player tracker, command router, plugins) can consume the
//! same stream.

use crate::classifier::EventClassifier;
use log::{debug, error, info};
use shared::Event;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;

const RECV_BUFFER_SIZE: usize = 4096;
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// One entry of the published event stream.
#[derive(Debug, Clone)]
pub enum LogEvent {
    /// A line that matched a classifier rule.
    Classified(Event),
    /// A line no rule matched, published raw.
    Unhandled(String),
}

pub struct LogListener {
    events: broadcast::Sender<LogEvent>,
    local_addr: SocketAddr,
}

impl LogListener {
    /// Binds the log-receiver socket and spawns the read loop.
    pub async fn bind(addr: &str, classifier: EventClassifier) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        let local_addr = socket.local_addr()?;
        info!("Log listener bound to {}", local_addr);

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let sender = events.clone();
        tokio::spawn(async move {
            let mut buf = [0u8; RECV_BUFFER_SIZE];
            loop {
                match socket.recv_from(&mut buf).await {
                    Ok((len, _)) => handle_datagram(&buf[..len], &classifier, &sender),
                    Err(e) => {
                        error!("Log socket receive error: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });

        Ok(Self { events, local_addr })
    }

    /// Hands out an independent receiver for the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<LogEvent> {
        self.events.subscribe()
    }

    /// The address the socket actually bound (useful with port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

fn handle_datagram(
    data: &[u8],
    classifier: &EventClassifier,
    sender: &broadcast::Sender<LogEvent>,
) {
    let Some(message) = extract_log_message(data) else {
        debug!("Dropping malformed log datagram ({} bytes)", data.len());
        return;
    };

    let entry = match classifier.classify(&message) {
        Some(event) => {
            debug!("event [{}]: {:?}", event.name, event.fields);
            LogEvent::Classified(event)
        }
        None => LogEvent::Unhandled(message),
    };

    // Send only fails when nobody is subscribed yet.
    let _ = sender.send(entry);
}

/// Extracts the message body from one log datagram.
///
/// Strips the 4-byte marker and trailing terminator, tolerates the engine's
/// optional `log ` token, then requires the `L <date> - <time>: ` prefix and
/// returns what follows it.
fn extract_log_message(data: &[u8]) -> Option<String> {
    if data.len() < 4 || data[..4] != shared::PACKET_MARKER {
        return None;
    }
    let decoded = String::from_utf8_lossy(&data[4..]);
    let text = decoded.trim_end_matches(|c| c == '\0' || c == '\n' || c == ' ');
    let text = text.strip_prefix("log ").unwrap_or(text);

    let mut parts = text.splitn(5, ' ');
    if parts.next()? != "L" {
        return None;
    }
    let _date = parts.next()?;
    if parts.next()? != "-" {
        return None;
    }
    let _time = parts.next()?;
    Some(parts.next()?.to_string())
}
