//! Player state tracker: a live directory of connected players built from
//! the log-event stream and per-player detail queries.
//!
//! The directory is keyed by uniqueid and lives behind an `RwLock`; writes
//! come from two paths (the event loop and the async completion of detail
//! queries) and both serialize through the lock. Merges are last-write-wins
//! in lock acquisition order -- there is no versioning, so a bootstrap
//! detail reply landing after a live event for the same player simply
//! overwrites the overlapping fields.

use crate::error::RconError;
use crate::listener::LogEvent;
use crate::session::Session;
use log::{info, warn};
use regex::RegexBuilder;
use shared::{Event, Player};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Models the engine assigns to counter-terrorist players. Everything else
/// maps to TERRORIST.
///
/// Caveat: a spectator keeps the last model they used, so spectators are
/// indistinguishable from players who switched teams.
const CT_MODELS: &[&str] = &["urban", "gsg9", "sas", "gign"];

fn team_for_model(model: &str) -> &'static str {
    if CT_MODELS.contains(&model) {
        "CT"
    } else {
        "TERRORIST"
    }
}

/// Pulls a new password value out of an audited remote command, if the
/// command changes `rcon_password`.
fn extract_password_change(command: &str) -> Option<&str> {
    let value = command.strip_prefix("rcon_password ")?;
    Some(value.trim_end_matches(' ').trim_matches('"'))
}

#[derive(Clone)]
pub struct PlayerTracker {
    session: Session,
    players: Arc<RwLock<HashMap<String, Player>>>,
}

impl PlayerTracker {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            players: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Resyncs against players that connected before we did: one bulk
    /// `users` roster query, then one `user <userid>` detail query per row.
    pub async fn bootstrap(&self) -> Result<(), RconError> {
        let response = self.session.command(&["users"]).await?;
        let rows = parse_users_table(&response);
        info!("Bootstrap found {} connected players", rows.len());

        {
            let mut players = self.players.write().await;
            for fields in &rows {
                let Some(unique_id) = fields.get("uniqueid") else {
                    continue;
                };
                players
                    .entry(unique_id.clone())
                    .or_insert_with(|| Player::new(unique_id))
                    .merge(fields);
            }
        }

        for fields in &rows {
            let (Some(unique_id), Some(user_id)) = (fields.get("uniqueid"), fields.get("userid"))
            else {
                continue;
            };
            if let Err(e) = self.fetch_detail(unique_id, user_id).await {
                warn!("Detail query for {} failed: {}", unique_id, e);
            }
        }
        Ok(())
    }

    /// Consumes the event stream until the channel closes.
    pub async fn run(&self, mut events: broadcast::Receiver<LogEvent>) {
        loop {
            match events.recv().await {
                Ok(LogEvent::Classified(event)) => self.apply_event(&event).await,
                Ok(LogEvent::Unhandled(_)) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Player tracker lagged, {} log events dropped", missed);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// Applies one classified event to the directory.
    pub async fn apply_event(&self, event: &Event) {
        match event.name.as_str() {
            "user_connected" | "user_joined_team" | "user_changed_name" => {
                let Some(unique_id) = event.field("uniqueid") else {
                    return;
                };
                {
                    let mut players = self.players.write().await;
                    players
                        .entry(unique_id.to_string())
                        .or_insert_with(|| Player::new(unique_id))
                        .merge(&event.fields);
                }
                // Enrich asynchronously; the reply merges through the same
                // lock whenever it lands.
                if let Some(user_id) = event.field("userid") {
                    let tracker = self.clone();
                    let unique_id = unique_id.to_string();
                    let user_id = user_id.to_string();
                    tokio::spawn(async move {
                        if let Err(e) = tracker.fetch_detail(&unique_id, &user_id).await {
                            warn!("Detail query for {} failed: {}", unique_id, e);
                        }
                    });
                }
            }
            "user_disconnected" => {
                let Some(unique_id) = event.field("uniqueid") else {
                    return;
                };
                // Idempotent: removing an absent player is a no-op.
                if self.players.write().await.remove(unique_id).is_some() {
                    info!("Player {} disconnected", unique_id);
                }
            }
            "rcon_command" => self.audit_rcon_command(event),
            _ => {}
        }
    }

    /// Watches audited remote commands for password changes. Does not touch
    /// player state.
    fn audit_rcon_command(&self, event: &Event) {
        let Some(command) = event.field("command") else {
            return;
        };
        if let Some(new_password) = extract_password_change(command) {
            warn!(
                "rcon password changed to {:?} from {}",
                new_password,
                event.field("ip").unwrap_or("unknown address")
            );
        }
    }

    /// Issues a `user <userid>` detail query and merges the reply, inferring
    /// the team from the reported model.
    async fn fetch_detail(&self, unique_id: &str, user_id: &str) -> Result<(), RconError> {
        let response = self.session.command(&["user", user_id]).await?;
        let fields = parse_user_detail(&response);

        let mut players = self.players.write().await;
        let player = players
            .entry(unique_id.to_string())
            .or_insert_with(|| Player::new(unique_id));
        player.merge(&fields);
        if let Some(model) = player.attributes.get("model") {
            player.team = team_for_model(model).to_string();
        }
        Ok(())
    }

    /// Snapshot of every tracked player.
    pub async fn players(&self) -> Vec<Player> {
        self.players.read().await.values().cloned().collect()
    }

    pub async fn get(&self, unique_id: &str) -> Option<Player> {
        self.players.read().await.get(unique_id).cloned()
    }

    /// Real players whose name matches the pattern, case-insensitively. A
    /// pattern that fails to compile is retried as an escaped literal.
    pub async fn find_by_name(&self, pattern: &str) -> Result<Vec<Player>, regex::Error> {
        let regexp = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .or_else(|_| {
                RegexBuilder::new(&regex::escape(pattern))
                    .case_insensitive(true)
                    .build()
            })?;
        Ok(self
            .players
            .read()
            .await
            .values()
            .filter(|player| player.is_player() && regexp.is_match(&player.name))
            .cloned()
            .collect())
    }

    /// Real players with a given field value, typed or extra.
    pub async fn find_by_attribute(&self, key: &str, value: &str) -> Vec<Player> {
        self.players
            .read()
            .await
            .values()
            .filter(|player| player.is_player() && player.get(key) == Some(value))
            .cloned()
            .collect()
    }
}

/// Parses the tabular `users` response: a ` : `-separated header line, a
/// separator row, one row per player, and a trailing count line.
fn parse_users_table(response: &str) -> Vec<HashMap<String, String>> {
    let lines: Vec<&str> = response.lines().collect();
    if lines.len() < 4 {
        return Vec::new();
    }

    let keys: Vec<&str> = lines[0].split(" : ").map(str::trim).collect();
    let mut rows = Vec::new();
    for line in &lines[2..lines.len() - 1] {
        let mut fields = HashMap::new();
        for (key, value) in keys.iter().zip(line.split(" : ")) {
            fields.insert(key.to_string(), value.trim().to_string());
        }
        if !fields.is_empty() {
            rows.push(fields);
        }
    }
    rows
}

/// Parses the `user <userid>` detail response: one whitespace-separated
/// key/value pair per line.
fn parse_user_detail(response: &str) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    for line in response.lines() {
        if let Some((key, value)) = line.trim().split_once(char::is_whitespace) {
            fields.insert(key.to_string(), value.trim().to_string());
        }
    }
    fields
}
