//! Configuration validation with unknown field detection.

use serde_json::Value;
use std::collections::HashSet;

use super::Config;

/// Known top-level config field names.
const KNOWN_TOP_LEVEL: &[&str] = &["channels", "bus", "logging"];

/// Known channel section names.
const KNOWN_CHANNELS: &[&str] = &["discord", "telegram"];

/// Known fields inside every channel section.
const KNOWN_CHANNEL_FIELDS: &[&str] = &["enabled", "token", "allow_from", "send_timeout_secs"];

/// A validation diagnostic.
#[derive(Debug)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub path: String,
    pub message: String,
}

#[derive(Debug, PartialEq)]
pub enum DiagnosticLevel {
    Ok,
    Warn,
    Error,
}

impl Diagnostic {
    fn new(level: DiagnosticLevel, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = match self.level {
            DiagnosticLevel::Ok => "[OK]",
            DiagnosticLevel::Warn => "[WARN]",
            DiagnosticLevel::Error => "[ERROR]",
        };
        if self.path.is_empty() {
            write!(f, "{} {}", prefix, self.message)
        } else {
            write!(f, "{} {}: {}", prefix, self.path, self.message)
        }
    }
}

/// Simple Levenshtein distance for "did you mean?" suggestions.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut matrix = vec![vec![0usize; b.len() + 1]; a.len() + 1];

    for (i, row) in matrix.iter_mut().enumerate() {
        row[0] = i;
    }
    for (j, val) in matrix[0].iter_mut().enumerate() {
        *val = j;
    }

    for (i, ca) in a.iter().enumerate() {
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            matrix[i + 1][j + 1] = std::cmp::min(
                std::cmp::min(matrix[i][j + 1] + 1, matrix[i + 1][j] + 1),
                matrix[i][j] + cost,
            );
        }
    }
    matrix[a.len()][b.len()]
}

/// Suggest the closest known field name (if distance <= 3).
pub fn suggest_field(unknown: &str, known: &[&str]) -> Option<String> {
    known
        .iter()
        .map(|k| (k, levenshtein(unknown, k)))
        .filter(|(_, d)| *d <= 3)
        .min_by_key(|(_, d)| *d)
        .map(|(k, _)| format!("did you mean '{}'?", k))
}

fn check_keys<'a>(
    keys: impl Iterator<Item = &'a String>,
    known: &[&str],
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> bool {
    let known_set: HashSet<&str> = known.iter().copied().collect();
    let mut has_unknown = false;
    for key in keys {
        if known_set.contains(key.as_str()) {
            continue;
        }
        has_unknown = true;
        let message = match suggest_field(key, known) {
            Some(suggestion) => format!("Unknown field '{}' \u{2014} {}", key, suggestion),
            None => format!("Unknown field '{}'", key),
        };
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };
        diagnostics.push(Diagnostic::new(DiagnosticLevel::Error, path, message));
    }
    has_unknown
}

/// Validate a raw JSON config value against known field names.
pub fn validate_config(raw: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let Some(obj) = raw.as_object() else {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Error,
            "",
            "Config must be a JSON object",
        ));
        return diagnostics;
    };

    diagnostics.push(Diagnostic::new(DiagnosticLevel::Ok, "", "Valid JSON"));

    let mut has_unknown = check_keys(obj.keys(), KNOWN_TOP_LEVEL, "", &mut diagnostics);

    if let Some(channels) = obj.get("channels").and_then(|v| v.as_object()) {
        has_unknown |= check_keys(channels.keys(), KNOWN_CHANNELS, "channels", &mut diagnostics);
        for (name, channel_val) in channels {
            if let Some(channel_obj) = channel_val.as_object() {
                has_unknown |= check_keys(
                    channel_obj.keys(),
                    KNOWN_CHANNEL_FIELDS,
                    &format!("channels.{}", name),
                    &mut diagnostics,
                );
            }
        }
    }

    if !has_unknown {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Ok,
            "",
            "All fields recognized",
        ));
    }

    diagnostics
}

/// Semantic checks on a parsed config: tokens, allowlists, bounds.
pub fn validate_semantics(config: &Config) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    let channels = [
        (
            "discord",
            config
                .channels
                .discord
                .as_ref()
                .map(|c| (c.enabled, c.token.as_str(), c.allow_from.len(), c.send_timeout_secs)),
        ),
        (
            "telegram",
            config
                .channels
                .telegram
                .as_ref()
                .map(|c| (c.enabled, c.token.as_str(), c.allow_from.len(), c.send_timeout_secs)),
        ),
    ];

    for (name, section) in channels {
        let Some((enabled, token, allow_from, send_timeout_secs)) = section else {
            continue;
        };
        if !enabled {
            continue;
        }
        if token.trim().is_empty() {
            diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Error,
                format!("channels.{}.token", name),
                "Channel enabled but token is empty",
            ));
        }
        if allow_from == 0 {
            diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Warn,
                format!("channels.{}.allow_from", name),
                "Empty \u{2014} anyone can message the bot",
            ));
        }
        if send_timeout_secs == 0 {
            diagnostics.push(Diagnostic::new(
                DiagnosticLevel::Error,
                format!("channels.{}.send_timeout_secs", name),
                "Must be greater than zero",
            ));
        }
    }

    if config.bus.buffer_size == 0 {
        diagnostics.push(Diagnostic::new(
            DiagnosticLevel::Error,
            "bus.buffer_size",
            "Must be greater than zero",
        ));
    }

    diagnostics
}
