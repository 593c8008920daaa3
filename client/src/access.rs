//! Access-list provider: maps a stable external identity (a player's
//! uniqueid, an IRC nick, ...) to an access level. Handlers check their own
//! required level; the router itself enforces nothing.

use log::warn;
use std::collections::HashMap;
use std::fmt;

/// Ordered access hierarchy. Derived `Ord` follows declaration order, so
/// `Guest < User < Admin < Master`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccessLevel {
    Guest,
    User,
    Admin,
    Master,
}

impl AccessLevel {
    /// Parses a config-file level string, case-insensitively.
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "guest" => Some(Self::Guest),
            "user" => Some(Self::User),
            "admin" => Some(Self::Admin),
            "master" => Some(Self::Master),
            _ => None,
        }
    }
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Guest => "guest",
            Self::User => "user",
            Self::Admin => "admin",
            Self::Master => "master",
        };
        f.write_str(name)
    }
}

/// Identity -> level table. Unknown identities are guests.
#[derive(Debug, Clone, Default)]
pub struct AccessList {
    levels: HashMap<String, AccessLevel>,
}

impl AccessList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the list from the config's identity -> level string table.
    /// Unparseable levels are logged and demoted to guest.
    pub fn from_entries(entries: &HashMap<String, String>) -> Self {
        let mut list = Self::new();
        for (identity, level) in entries {
            match AccessLevel::parse(level) {
                Some(level) => list.grant(identity, level),
                None => {
                    warn!(
                        "Unknown access level {:?} for {}; treating as guest",
                        level, identity
                    );
                }
            }
        }
        list
    }

    pub fn grant(&mut self, identity: &str, level: AccessLevel) {
        self.levels.insert(identity.to_string(), level);
    }

    pub fn level(&self, identity: &str) -> AccessLevel {
        self.levels
            .get(identity)
            .copied()
            .unwrap_or(AccessLevel::Guest)
    }

    /// True when the identity's level meets the minimum.
    pub fn check(&self, identity: &str, min_level: AccessLevel) -> bool {
        self.level(identity) >= min_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(AccessLevel::Guest < AccessLevel::User);
        assert!(AccessLevel::User < AccessLevel::Admin);
        assert!(AccessLevel::Admin < AccessLevel::Master);
    }

    #[test]
    fn test_guest_rejected_by_admin_requirement() {
        let mut list = AccessList::new();
        list.grant("STEAM_0:1:111", AccessLevel::Guest);

        assert!(!list.check("STEAM_0:1:111", AccessLevel::Admin));
        assert!(list.check("STEAM_0:1:111", AccessLevel::Guest));
    }

    #[test]
    fn test_master_passes_everything() {
        let mut list = AccessList::new();
        list.grant("STEAM_0:0:7", AccessLevel::Master);

        assert!(list.check("STEAM_0:0:7", AccessLevel::Guest));
        assert!(list.check("STEAM_0:0:7", AccessLevel::User));
        assert!(list.check("STEAM_0:0:7", AccessLevel::Admin));
        assert!(list.check("STEAM_0:0:7", AccessLevel::Master));
    }

    #[test]
    fn test_unknown_identity_is_guest() {
        let list = AccessList::new();
        assert_eq!(list.level("nobody"), AccessLevel::Guest);
        assert!(!list.check("nobody", AccessLevel::User));
    }

    #[test]
    fn test_from_entries() {
        let mut entries = HashMap::new();
        entries.insert("STEAM_0:1:111".to_string(), "Admin".to_string());
        entries.insert("STEAM_0:0:42".to_string(), "bogus".to_string());

        let list = AccessList::from_entries(&entries);
        assert_eq!(list.level("STEAM_0:1:111"), AccessLevel::Admin);
        assert_eq!(list.level("STEAM_0:0:42"), AccessLevel::Guest);
    }

    #[test]
    fn test_parse_and_display_roundtrip() {
        for level in [
            AccessLevel::Guest,
            AccessLevel::User,
            AccessLevel::Admin,
            AccessLevel::Master,
        ] {
            assert_eq!(AccessLevel::parse(&level.to_string()), Some(level));
        }
        assert_eq!(AccessLevel::parse("sudo"), None);
    }
}
