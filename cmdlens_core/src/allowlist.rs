//! # Command Allowlist
//!
//! The allowlist is the privilege boundary of the gateway. It is a fixed set of
//! exact command strings, built once at startup and shared read-only between
//! requests.
//!
//! ## Validation Rules
//!
//! - A directive is first split on the conjunction delimiter into `CommandUnit`s.
//! - Each unit is trimmed of surrounding whitespace and nothing else: no case
//!   folding, no collapsing of inner whitespace, no flag reordering.
//! - A unit is allowed only if its trimmed text is byte-for-byte equal to an
//!   entry. Substring and pattern matches never count.
//!
//! Because splitting happens before validation, `"uptime && rm -rf /"` becomes
//! two units and the second is rejected on its own.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The conjunction delimiter used when none is configured.
pub const DEFAULT_DELIMITER: &str = "&&";

/// A single permitted command and the human description shown for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AllowlistEntry {
    pub command: String,
    pub description: String,
}

impl AllowlistEntry {
    pub fn new(command: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            description: description.into(),
        }
    }
}

/// One atomic command extracted from a directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandUnit {
    raw: String,
    trimmed: String,
}

impl CommandUnit {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let trimmed = raw.trim().to_string();
        Self { raw, trimmed }
    }

    /// The unit exactly as it appeared between delimiters.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The unit with surrounding whitespace removed; this is what gets validated and run.
    pub fn trimmed(&self) -> &str {
        &self.trimmed
    }
}

/// Split a directive into command units on `delimiter`.
///
/// Every delimiter-separated piece becomes a unit, including empty ones, so a
/// directive with N pieces always produces N units.
pub fn split_directive(directive: &str, delimiter: &str) -> Vec<CommandUnit> {
    if delimiter.is_empty() {
        return vec![CommandUnit::new(directive)];
    }
    directive.split(delimiter).map(CommandUnit::new).collect()
}

/// Result of checking one unit against the allowlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub unit: CommandUnit,
    pub allowed: bool,
    pub description: Option<String>,
}

/// The exact-match allowlist.
#[derive(Debug, Clone)]
pub struct Allowlist {
    entries: Vec<AllowlistEntry>,
    index: HashMap<String, usize>,
}

impl Allowlist {
    /// Build an allowlist from entries. Later duplicates are ignored; use
    /// `config::AllowlistFile` for a strict, validated load.
    pub fn new(entries: Vec<AllowlistEntry>) -> Self {
        let mut index = HashMap::with_capacity(entries.len());
        let mut kept = Vec::with_capacity(entries.len());
        for entry in entries {
            if index.contains_key(&entry.command) {
                tracing::warn!(command = %entry.command, "Ignoring duplicate allowlist entry");
                continue;
            }
            index.insert(entry.command.clone(), kept.len());
            kept.push(entry);
        }
        Self {
            entries: kept,
            index,
        }
    }

    /// Check one unit. Pure and deterministic; never fails.
    pub fn validate(&self, unit: &CommandUnit) -> ValidationOutcome {
        let entry = self.lookup(unit.trimmed());
        ValidationOutcome {
            unit: unit.clone(),
            allowed: entry.is_some(),
            description: entry.map(|e| e.description.clone()),
        }
    }

    /// Convenience form of `validate` for a raw unit string.
    pub fn validate_str(&self, raw: &str) -> ValidationOutcome {
        self.validate(&CommandUnit::new(raw))
    }

    pub fn lookup(&self, command: &str) -> Option<&AllowlistEntry> {
        self.index.get(command).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, command: &str) -> bool {
        self.index.contains_key(command)
    }

    pub fn entries(&self) -> &[AllowlistEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Allowlist {
    fn default() -> Self {
        Self::new(default_entries())
    }
}

/// The built-in allowlist.
pub fn default_entries() -> Vec<AllowlistEntry> {
    vec![
        AllowlistEntry::new("df -h", "Check disk usage"),
        AllowlistEntry::new("uptime", "Show system uptime and load"),
        AllowlistEntry::new("top -l 1 | head -10", "Snapshot of processes"),
        AllowlistEntry::new("free -h", "Memory usage"),
        AllowlistEntry::new("whoami", "Current logged in user"),
    ]
}
