use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use consilium_models::{AuditEntry, AuditLog, Stage};
use consilium_store::CheckpointStore;
use serde_json::Value;
use tracing::{debug, error, warn};
use uuid::Uuid;

pub const REDACTED: &str = "[REDACTED]";

/// Strings longer than this (in chars) are truncated in audit payloads.
pub const MAX_PAYLOAD_STRING_CHARS: usize = 512;

/// Key segments that mark a value as sensitive when they end the key.
const SENSITIVE_SEGMENTS: [&str; 11] = [
    "prompt",
    "secret",
    "token",
    "password",
    "passwd",
    "authorization",
    "credential",
    "credentials",
    "apikey",
    "cookie",
    "bearer",
];

/// Qualifiers that make a trailing `key` segment sensitive (`api_key`, `private_key`).
const KEY_QUALIFIERS: [&str; 4] = ["api", "secret", "private", "access"];

/// Split a key into lowercase segments on `_`, `-`, `.` and camelCase humps.
fn key_segments(key: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in key.chars() {
        if !c.is_ascii_alphanumeric() {
            if !current.is_empty() {
                segments.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_ascii_uppercase() && prev_lower && !current.is_empty() {
            segments.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        current.push(c.to_ascii_lowercase());
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

/// Whole-segment match on the key's last segment, so `auth_token` and
/// `system_prompt` are sensitive while `max_tokens` and `token_count` are not.
fn is_sensitive(key: &str) -> bool {
    let segments = key_segments(key);
    match segments.as_slice() {
        [.., qualifier, last] if last == "key" => KEY_QUALIFIERS.contains(&qualifier.as_str()),
        [.., last] => SENSITIVE_SEGMENTS.contains(&last.as_str()),
        [] => false,
    }
}

fn truncate(s: String) -> String {
    let len = s.chars().count();
    if len <= MAX_PAYLOAD_STRING_CHARS {
        return s;
    }
    let kept: String = s.chars().take(MAX_PAYLOAD_STRING_CHARS).collect();
    format!("{kept}...[truncated {} chars]", len - MAX_PAYLOAD_STRING_CHARS)
}

/// Redact `KEY=value` / `key: value` assignments with a sensitive key and
/// any `Bearer <credential>` pair, then truncate.
///
/// Used for free text such as CLI stderr that may carry credentials.
pub fn sanitize_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut redact_next = false;
    let mut first = true;
    for word in text.split(' ') {
        if !first {
            out.push(' ');
        }
        first = false;
        if redact_next && !word.is_empty() {
            out.push_str(REDACTED);
            redact_next = word.eq_ignore_ascii_case("bearer");
            continue;
        }
        if word.eq_ignore_ascii_case("bearer") {
            out.push_str(word);
            redact_next = true;
            continue;
        }
        match word.split_once(|c: char| c == '=' || c == ':') {
            Some((key, value)) if is_sensitive(key) => {
                let sep = &word[key.len()..key.len() + 1];
                out.push_str(key);
                out.push_str(sep);
                if value.is_empty() {
                    // `key: value` with the value in the next word
                    redact_next = true;
                } else {
                    out.push_str(REDACTED);
                }
            }
            _ => out.push_str(word),
        }
    }
    truncate(out)
}

/// Redact prompt/secret-bearing keys and sanitize every string, recursively.
pub fn sanitize(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| {
                    let v = if is_sensitive(&k) {
                        Value::String(REDACTED.to_string())
                    } else {
                        sanitize(v)
                    };
                    (k, v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize).collect()),
        Value::String(s) => Value::String(sanitize_text(&s)),
        other => other,
    }
}

/// Wall-clock start plus a monotonic timer for one stage.
#[derive(Debug, Clone, Copy)]
pub struct StageClock {
    started_at: DateTime<Utc>,
    started: Instant,
}

impl StageClock {
    pub fn start() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }
}

/// Appends one entry per attempted stage and forwards it to an optional store.
pub struct AuditRecorder {
    run_id: Uuid,
    log: AuditLog,
    store: Option<Arc<dyn CheckpointStore>>,
}

impl AuditRecorder {
    pub fn new(run_id: Uuid, store: Option<Arc<dyn CheckpointStore>>) -> Self {
        Self {
            run_id,
            log: AuditLog::default(),
            store,
        }
    }

    pub fn log(&self) -> &AuditLog {
        &self.log
    }

    pub fn into_log(self) -> AuditLog {
        self.log
    }

    /// Record the outcome of a stage that started at `clock`.
    pub fn record(
        &mut self,
        stage: Stage,
        clock: StageClock,
        success: bool,
        payload: Value,
        errors: Vec<String>,
    ) {
        // Clamp against the previous entry so the log never runs backwards
        // if the wall clock is adjusted mid-run.
        let timestamp = match self.log.last() {
            Some(prev) if prev.timestamp > clock.started_at => prev.timestamp,
            _ => clock.started_at,
        };
        let entry = AuditEntry {
            sequence: self.log.len() as u32,
            stage,
            timestamp,
            duration_ms: clock.started.elapsed().as_millis() as u64,
            success,
            payload: sanitize(payload),
            errors: errors.iter().map(|e| sanitize_text(e)).collect(),
        };
        debug!(
            run_id = %self.run_id,
            sequence = entry.sequence,
            stage = %stage,
            success,
            duration_ms = entry.duration_ms,
            "Audit entry recorded"
        );

        if let Some(store) = &self.store {
            if let Err(e) = store.append(self.run_id, &entry) {
                warn!(run_id = %self.run_id, stage = %stage, error = %e, "Checkpoint store append failed");
            }
        }
        if let Err(e) = self.log.append(entry) {
            error!(run_id = %self.run_id, stage = %stage, error = %e, "Audit entry rejected");
        }
    }
}
