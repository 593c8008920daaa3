//! Log event classification: an ordered regex rule table that turns raw log
//! lines into typed events.
//!
//! Rules are evaluated in table order and the first match wins, so the table
//! is a `Vec` rather than a map -- precedence is deterministic and testable.
//! Named capture groups that participated in the match become the event's
//! field map. Lines matching no rule are "unhandled"; the listener still
//! publishes them raw so subscribers that want raw access are not starved.

use regex::Regex;
use shared::Event;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("event rule {0:?} is already registered")]
    DuplicateRule(String),

    #[error(transparent)]
    Pattern(#[from] regex::Error),
}

/// Built-in rules, in precedence order.
const BUILTIN_RULES: &[(&str, &str)] = &[
    (
        "user_connected",
        r#"^"(?P<name>.*?)<(?P<userid>\d+)><(?P<uniqueid>.*?)><(?P<team>.*?)>" connected, address "(?P<ip>.*?):(?P<port>.*?)""#,
    ),
    (
        "user_disconnected",
        r#"^"(?P<name>.*?)<(?P<userid>\d+)><(?P<uniqueid>.*?)><(?P<team>.*?)>" disconnected"#,
    ),
    (
        "user_validated",
        r#"^"(?P<name>.*?)<(?P<userid>\d+)><(?P<uniqueid>.*?)><(?P<team>.*?)>" STEAM USERID validated"#,
    ),
    (
        "user_entered",
        r#"^"(?P<name>.*?)<(?P<userid>\d+)><(?P<uniqueid>.*?)><(?P<team>.*?)>" entered the game"#,
    ),
    (
        "user_joined_team",
        r#"^"(?P<name>.*?)<(?P<userid>\d+)><(?P<uniqueid>.*?)><.*?>" joined team "(?P<team>.*?)""#,
    ),
    (
        "user_say",
        r#"^"(?P<name>.*?)<(?P<userid>\d+)><(?P<uniqueid>.*?)><(?P<team>.*?)>" say(_(?P<to>.*?))? "(?P<message>.*)"( \((?P<status>.*?)\))?"#,
    ),
    (
        "user_changed_name",
        r#"^"(?P<old_name>.*?)<(?P<userid>\d+)><(?P<uniqueid>.*?)><.*?>" changed name to "(?P<name>.*?)""#,
    ),
    (
        "user_triggered",
        r#"^"(?P<name>.*?)<(?P<userid>\d+)><(?P<uniqueid>.*?)><(?P<team>.*?)>" triggered "(?P<event>.*?)""#,
    ),
    (
        "world_triggered",
        r#"^World triggered "(?P<event>.*?)"( \(CT "(?P<ct_score>\d+)"\) \(T "(?P<t_score>\d+)"\))?"#,
    ),
    ("server_say", r#"^Server say "(?P<message>.*?)""#),
    (
        "server_cvar",
        r#"^Server cvar "(?P<cvar>.*?)" = "(?P<value>.*?)""#,
    ),
    (
        "team_scored",
        r#"^Team "(?P<team>.*?)" scored "(?P<score>.*?)" with "(?P<players>.*?)" players"#,
    ),
    (
        "team_triggered",
        r#"^Team "(?P<team>.*?)" triggered "(?P<event>.*?)"( \(CT "(?P<ct_score>\d+)"\) \(T "(?P<t_score>\d+)"\))?"#,
    ),
    (
        "rcon_command",
        r#"^Rcon: "rcon (?P<challenge>\d+) "(?P<password>.*?)" (?P<command>.*?)" from "(?P<ip>.*?):(?P<port>.*?)""#,
    ),
];

struct EventRule {
    name: String,
    pattern: Regex,
}

pub struct EventClassifier {
    rules: Vec<EventRule>,
}

impl EventClassifier {
    /// Builds a classifier with the full built-in rule table.
    pub fn new() -> Result<Self, ClassifierError> {
        let mut classifier = Self { rules: Vec::new() };
        for (name, pattern) in BUILTIN_RULES {
            classifier.add_rule(name, pattern)?;
        }
        Ok(classifier)
    }

    /// Appends a rule to the table. Later rules only see lines no earlier
    /// rule matched.
    pub fn add_rule(&mut self, name: &str, pattern: &str) -> Result<(), ClassifierError> {
        if self.rules.iter().any(|rule| rule.name == name) {
            return Err(ClassifierError::DuplicateRule(name.to_string()));
        }
        self.rules.push(EventRule {
            name: name.to_string(),
            pattern: Regex::new(pattern)?,
        });
        Ok(())
    }

    /// Classifies one log line. Returns `None` when no rule matches.
    pub fn classify(&self, line: &str) -> Option<Event> {
        for rule in &self.rules {
            if let Some(captures) = rule.pattern.captures(line) {
                let mut fields = HashMap::new();
                for group in rule.pattern.capture_names().flatten() {
                    if let Some(value) = captures.name(group) {
                        fields.insert(group.to_string(), value.as_str().to_string());
                    }
                }
                return Some(Event::new(&rule.name, fields));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> EventClassifier {
        EventClassifier::new().unwrap()
    }

    #[test]
    fn test_user_entered() {
        let event = classifier()
            .classify(r#""Alice<2><STEAM_0:1:111><>" entered the game"#)
            .unwrap();

        assert_eq!(event.name, "user_entered");
        assert_eq!(event.field("name"), Some("Alice"));
        assert_eq!(event.field("userid"), Some("2"));
        assert_eq!(event.field("uniqueid"), Some("STEAM_0:1:111"));
        assert_eq!(event.field("team"), Some(""));
        assert_eq!(event.fields.len(), 4);
    }

    #[test]
    fn test_user_connected() {
        let event = classifier()
            .classify(r#""Bob<3><STEAM_0:0:42><>" connected, address "10.0.0.7:27005""#)
            .unwrap();

        assert_eq!(event.name, "user_connected");
        assert_eq!(event.field("ip"), Some("10.0.0.7"));
        assert_eq!(event.field("port"), Some("27005"));
    }

    #[test]
    fn test_user_say_plain() {
        let event = classifier()
            .classify(r#""Alice<2><STEAM_0:1:111><CT>" say "rush b""#)
            .unwrap();

        assert_eq!(event.name, "user_say");
        assert_eq!(event.field("message"), Some("rush b"));
        assert_eq!(event.field("to"), None);
        assert_eq!(event.field("status"), None);
    }

    #[test]
    fn test_user_say_team_dead() {
        let event = classifier()
            .classify(r#""Alice<2><STEAM_0:1:111><CT>" say_team "he is lit" (dead)"#)
            .unwrap();

        assert_eq!(event.name, "user_say");
        assert_eq!(event.field("to"), Some("team"));
        assert_eq!(event.field("message"), Some("he is lit"));
        assert_eq!(event.field("status"), Some("dead"));
    }

    #[test]
    fn test_user_changed_name() {
        let event = classifier()
            .classify(r#""Alice<2><STEAM_0:1:111><CT>" changed name to "Alicia""#)
            .unwrap();

        assert_eq!(event.name, "user_changed_name");
        assert_eq!(event.field("old_name"), Some("Alice"));
        assert_eq!(event.field("name"), Some("Alicia"));
    }

    #[test]
    fn test_world_triggered_with_scores() {
        let event = classifier()
            .classify(r#"World triggered "Round_End" (CT "3") (T "5")"#)
            .unwrap();

        assert_eq!(event.name, "world_triggered");
        assert_eq!(event.field("event"), Some("Round_End"));
        assert_eq!(event.field("ct_score"), Some("3"));
        assert_eq!(event.field("t_score"), Some("5"));
    }

    #[test]
    fn test_world_triggered_without_scores() {
        let event = classifier()
            .classify(r#"World triggered "Game_Commencing""#)
            .unwrap();

        assert_eq!(event.field("event"), Some("Game_Commencing"));
        assert_eq!(event.field("ct_score"), None);
        assert_eq!(event.field("t_score"), None);
    }

    #[test]
    fn test_team_scored() {
        let event = classifier()
            .classify(r#"Team "CT" scored "7" with "5" players"#)
            .unwrap();

        assert_eq!(event.name, "team_scored");
        assert_eq!(event.field("team"), Some("CT"));
        assert_eq!(event.field("score"), Some("7"));
        assert_eq!(event.field("players"), Some("5"));
    }

    #[test]
    fn test_server_cvar() {
        let event = classifier()
            .classify(r#"Server cvar "mp_friendlyfire" = "1""#)
            .unwrap();

        assert_eq!(event.field("cvar"), Some("mp_friendlyfire"));
        assert_eq!(event.field("value"), Some("1"));
    }

    #[test]
    fn test_rcon_command_audit() {
        let event = classifier()
            .classify(r#"Rcon: "rcon 981275 "hunter2" say hi" from "10.0.0.9:51234""#)
            .unwrap();

        assert_eq!(event.name, "rcon_command");
        assert_eq!(event.field("challenge"), Some("981275"));
        assert_eq!(event.field("password"), Some("hunter2"));
        assert_eq!(event.field("command"), Some("say hi"));
        assert_eq!(event.field("ip"), Some("10.0.0.9"));
    }

    #[test]
    fn test_unhandled_line() {
        assert!(classifier().classify("Log file started").is_none());
    }

    #[test]
    fn test_precedence_connected_before_say() {
        // "connected, address" also contains quoted text; table order must
        // keep it classified as user_connected.
        let event = classifier()
            .classify(r#""Eve<4><STEAM_0:1:9><>" connected, address "127.0.0.1:27005""#)
            .unwrap();
        assert_eq!(event.name, "user_connected");
    }

    #[test]
    fn test_duplicate_rule_rejected() {
        let mut classifier = classifier();
        let err = classifier
            .add_rule("user_say", r"^anything")
            .unwrap_err();
        assert!(matches!(err, ClassifierError::DuplicateRule(name) if name == "user_say"));
    }

    #[test]
    fn test_custom_rule_appended_after_builtins() {
        let mut classifier = classifier();
        classifier
            .add_rule("map_loaded", r#"^Loading map "(?P<map>.*?)""#)
            .unwrap();

        let event = classifier.classify(r#"Loading map "de_dust2""#).unwrap();
        assert_eq!(event.name, "map_loaded");
        assert_eq!(event.field("map"), Some("de_dust2"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let mut classifier = classifier();
        assert!(matches!(
            classifier.add_rule("broken", r"(unclosed"),
            Err(ClassifierError::Pattern(_))
        ));
    }
}
