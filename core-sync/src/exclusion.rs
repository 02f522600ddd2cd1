//! Decides which setting keys take part in synchronization.
//!
//! A key is excluded when any rule matches:
//! - it is on the built-in deny-list (credentials and per-device sync state)
//! - it starts with the engine's reserved `cloudsync::` prefix
//! - it is one of the configured reserved keys (e.g. a custom manifest key)
//! - it matches the user list: exact key, or prefix when the entry ends in `*`
//! - it is purely numeric
//! - one of its `:`, `/` or `_` separated segments is a UUID

use uuid::Uuid;

/// Prefix of every key the engine itself writes to key-value storage.
pub const RESERVED_PREFIX: &str = "cloudsync::";

/// Local-only keys that must never leave the device.
const DENY_LIST: &[&str] = &[
    "sync-config",
    "sync-credentials",
    "sync-mode",
    "last-cloud-sync",
    "aws-access-key",
    "aws-secret-key",
    "aws-bucket",
    "aws-region",
    "aws-endpoint",
    "encryption-key",
    "backup-interval",
    "instance-id",
];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Rule {
    Exact(String),
    Prefix(String),
}

#[derive(Debug, Clone, Default)]
pub struct ExclusionFilter {
    rules: Vec<Rule>,
}

impl ExclusionFilter {
    /// Build from the comma-separated user list plus engine-reserved keys.
    ///
    /// Entries are trimmed and empty entries ignored.
    pub fn new<I, S>(user_list: &str, reserved_keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut rules: Vec<Rule> = user_list
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| match entry.strip_suffix('*') {
                Some(prefix) => Rule::Prefix(prefix.to_string()),
                None => Rule::Exact(entry.to_string()),
            })
            .collect();
        rules.extend(reserved_keys.into_iter().map(|key| Rule::Exact(key.into())));

        Self { rules }
    }

    pub fn is_excluded(&self, key: &str) -> bool {
        DENY_LIST.contains(&key)
            || key.starts_with(RESERVED_PREFIX)
            || self.matches_user_rule(key)
            || is_numeric(key)
            || has_uuid_segment(key)
    }

    fn matches_user_rule(&self, key: &str) -> bool {
        self.rules.iter().any(|rule| match rule {
            Rule::Exact(exact) => exact == key,
            Rule::Prefix(prefix) => key.starts_with(prefix.as_str()),
        })
    }
}

fn is_numeric(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit())
}

fn has_uuid_segment(key: &str) -> bool {
    key.split([':', '/', '_'])
        .any(|segment| segment.len() == 36 && Uuid::parse_str(segment).is_ok())
}
