//! Configuration validation.
//!
//! Checks TOML configuration against the known schema, flags unknown or
//! misspelled fields, and reports values the mediator cannot work with.

use std::path::{Path, PathBuf};

use crate::schema::{MediatorConfig, SideConfig};

/// Retry counts above this are almost certainly a typo.
const MAX_SENSIBLE_RETRIES: u32 = 100;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Category: "syntax", "unknown-field", "type-error", "value", "file-ref"
    pub category: &'static str,
    /// Dotted path, e.g. "sender.timeout_ms"
    pub path: String,
    pub message: String,
}

/// Result of validating a configuration file.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

// ── Known keys ──────────────────────────────────────────────────────────────

const ROOT_KEYS: &[&str] = &["channel", "namespace", "sender", "receiver"];
const SIDE_KEYS: &[&str] = &["retry", "timeout_ms", "delay_ms"];
const RETRY_KEYS: &[&str] = &["attempts"];

fn nested_keys(path: &str) -> Option<&'static [&'static str]> {
    match path {
        "sender" | "receiver" => Some(SIDE_KEYS),
        "sender.retry" | "receiver.retry" => Some(RETRY_KEYS),
        _ => None,
    }
}

// ── Levenshtein distance ────────────────────────────────────────────────────

fn levenshtein(a: &str, b: &str) -> usize {
    let b_len = b.chars().count();
    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b_len]
}

/// Closest candidate within `max_distance` edits.
fn suggest<'a>(needle: &str, candidates: &[&'a str], max_distance: usize) -> Option<&'a str> {
    candidates
        .iter()
        .map(|&c| (c, levenshtein(needle, c)))
        .filter(|&(_, d)| d > 0 && d <= max_distance)
        .min_by_key(|&(_, d)| d)
        .map(|(c, _)| c)
}

// ── Core validation ─────────────────────────────────────────────────────────

/// Validate a config file at the given path, or discover the default config
/// file location if `path` is `None`.
#[must_use]
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => crate::loader::find_config_file(),
    };

    let Some(ref actual_path) = config_path else {
        return ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Info,
                category: "file-ref",
                path: String::new(),
                message: "no config file found; using defaults".into(),
            }],
            config_path: None,
        };
    };

    match std::fs::read_to_string(actual_path) {
        Ok(content) => {
            let mut result = validate_toml_str(&content);
            result.config_path = config_path;
            result
        },
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic {
                severity: Severity::Error,
                category: "file-ref",
                path: String::new(),
                message: format!("failed to read config file: {e}"),
            }],
            config_path,
        },
    }
}

/// Validate a TOML string without touching the file system.
#[must_use]
pub fn validate_toml_str(toml_str: &str) -> ValidationResult {
    let mut diagnostics = Vec::new();

    let value: toml::Value = match toml::from_str(toml_str) {
        Ok(v) => v,
        Err(e) => {
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "syntax",
                path: String::new(),
                message: format!("TOML syntax error: {e}"),
            });
            return ValidationResult {
                diagnostics,
                config_path: None,
            };
        },
    };

    check_unknown_fields(&value, ROOT_KEYS, "", &mut diagnostics);
    let has_unknown = !diagnostics.is_empty();

    match value.try_into::<MediatorConfig>() {
        Ok(config) => diagnostics.extend(check_config(&config)),
        // Unknown keys already explain why typed parsing failed.
        Err(_) if has_unknown => {},
        Err(e) => diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "type-error",
            path: String::new(),
            message: format!("type error: {e}"),
        }),
    }

    ValidationResult {
        diagnostics,
        config_path: None,
    }
}

/// Value checks on an already parsed config.
#[must_use]
pub fn check_config(config: &MediatorConfig) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    if config.channel.trim().is_empty() {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "value",
            path: "channel".into(),
            message: "channel name must not be empty".into(),
        });
    }
    if config.namespace.as_deref().is_some_and(str::is_empty) {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            category: "value",
            path: "namespace".into(),
            message: "empty namespace is treated as no namespace".into(),
        });
    }
    check_side("sender", &config.sender, &mut diagnostics);
    check_side("receiver", &config.receiver, &mut diagnostics);

    diagnostics
}

fn check_side(side: &str, config: &SideConfig, diagnostics: &mut Vec<Diagnostic>) {
    if config.timeout_ms == Some(0) {
        diagnostics.push(Diagnostic {
            severity: Severity::Error,
            category: "value",
            path: format!("{side}.timeout_ms"),
            message: "timeout must be greater than zero".into(),
        });
    }
    if let Some(retry) = config.retry
        && retry.attempts > MAX_SENSIBLE_RETRIES
    {
        diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            category: "value",
            path: format!("{side}.retry.attempts"),
            message: format!(
                "{} retries is unusually high (more than {MAX_SENSIBLE_RETRIES})",
                retry.attempts
            ),
        });
    }
}

fn check_unknown_fields(
    value: &toml::Value,
    known: &[&str],
    prefix: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let Some(table) = value.as_table() else {
        return;
    };
    for (key, child) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        if !known.contains(&key.as_str()) {
            let message = match suggest(key, known, 3) {
                Some(s) => format!("unknown field \"{key}\" (did you mean \"{s}\"?)"),
                None => format!("unknown field \"{key}\""),
            };
            diagnostics.push(Diagnostic {
                severity: Severity::Error,
                category: "unknown-field",
                path,
                message,
            });
            continue;
        }
        if let Some(child_keys) = nested_keys(&path) {
            check_unknown_fields(child, child_keys, &path, diagnostics);
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levenshtein_basics() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", "abc"), 0);
        assert_eq!(levenshtein("timeout", "timeout_ms"), 3);
        assert_eq!(levenshtein("chanel", "channel"), 1);
    }

    #[test]
    fn empty_config_is_valid() {
        let result = validate_toml_str("");
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn full_valid_config_no_diagnostics() {
        let result = validate_toml_str(
            r#"
            channel = "orders"
            namespace = "shop"

            [sender]
            timeout_ms = 200
            delay_ms = 5
            retry = { attempts = 3 }

            [receiver.retry]
            attempts = 1
            "#,
        );
        assert!(!result.has_errors(), "{:?}", result.diagnostics);
        assert_eq!(result.count(Severity::Warning), 0);
    }

    #[test]
    fn unknown_key_with_suggestion() {
        let result = validate_toml_str("chanel = \"x\"\n[sender]\ntimeout = 3\n");
        let paths: Vec<_> = result.diagnostics.iter().map(|d| d.path.as_str()).collect();
        assert!(paths.contains(&"chanel"));
        assert!(paths.contains(&"sender.timeout"));
        let chanel = result
            .diagnostics
            .iter()
            .find(|d| d.path == "chanel")
            .unwrap();
        assert!(chanel.message.contains("did you mean \"channel\""));
        assert!(result.diagnostics.iter().all(|d| d.category != "type-error"));
    }

    #[test]
    fn unknown_key_inside_retry() {
        let result = validate_toml_str("[receiver.retry]\nattempt = 2\n");
        let diag = &result.diagnostics[0];
        assert_eq!(diag.path, "receiver.retry.attempt");
        assert!(diag.message.contains("\"attempts\""));
    }

    #[test]
    fn syntax_error_detected() {
        let result = validate_toml_str("channel = ");
        assert!(result.has_errors());
        assert_eq!(result.diagnostics[0].category, "syntax");
    }

    #[test]
    fn type_error_detected() {
        let result = validate_toml_str("[sender]\ntimeout_ms = \"soon\"\n");
        assert!(result.has_errors());
        assert_eq!(result.diagnostics[0].category, "type-error");
    }

    #[test]
    fn value_checks() {
        let result = validate_toml_str(
            "channel = \"\"\n[sender]\ntimeout_ms = 0\n[receiver.retry]\nattempts = 500\n",
        );
        assert_eq!(result.count(Severity::Error), 2);
        assert_eq!(result.count(Severity::Warning), 1);
        let paths: Vec<_> = result.diagnostics.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, ["channel", "sender.timeout_ms", "receiver.retry.attempts"]);
    }

    #[test]
    fn validate_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missive.toml");
        std::fs::write(&path, "channel = \"ok\"\n").unwrap();
        let result = validate(Some(&path));
        assert!(!result.has_errors());
        assert_eq!(result.config_path.as_deref(), Some(path.as_path()));

        let missing = validate(Some(&dir.path().join("absent.toml")));
        assert!(missing.has_errors());
    }
}
