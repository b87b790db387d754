use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    MarketIngestion,
    AgentSignals,
    ThesisConstruction,
    CrossExamination,
    SignalFusion,
    Consensus,
    Recommendation,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::MarketIngestion,
        Stage::AgentSignals,
        Stage::ThesisConstruction,
        Stage::CrossExamination,
        Stage::SignalFusion,
        Stage::Consensus,
        Stage::Recommendation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::MarketIngestion => "market_ingestion",
            Stage::AgentSignals => "agent_signals",
            Stage::ThesisConstruction => "thesis_construction",
            Stage::CrossExamination => "cross_examination",
            Stage::SignalFusion => "signal_fusion",
            Stage::Consensus => "consensus",
            Stage::Recommendation => "recommendation",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One stage transition. Never mutated once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEntry {
    /// Position in the run, starting at 0.
    pub sequence: u32,
    pub stage: Stage,
    /// When the stage started.
    pub timestamp: DateTime<Utc>,
    pub duration_ms: u64,
    pub success: bool,
    /// Sanitized stage summary.
    pub payload: serde_json::Value,
    #[serde(default)]
    pub errors: Vec<String>,
}

#[derive(Error, Debug, PartialEq)]
pub enum AuditLogError {
    #[error("Sequence gap: expected {expected}, found {found}")]
    SequenceGap { expected: u32, found: u32 },

    #[error("Entry {sequence} is timestamped before its predecessor")]
    OutOfOrder { sequence: u32 },
}

/// A validated, chronologically ordered run history.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    /// Rebuild a history from stored entries, checking contiguity and order.
    pub fn from_entries(mut entries: Vec<AuditEntry>) -> Result<Self, AuditLogError> {
        entries.sort_by_key(|e| e.sequence);
        for (i, entry) in entries.iter().enumerate() {
            let expected = i as u32;
            if entry.sequence != expected {
                return Err(AuditLogError::SequenceGap {
                    expected,
                    found: entry.sequence,
                });
            }
            if i > 0 && entry.timestamp < entries[i - 1].timestamp {
                return Err(AuditLogError::OutOfOrder {
                    sequence: entry.sequence,
                });
            }
        }
        Ok(Self { entries })
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&AuditEntry> {
        self.entries.last()
    }

    pub fn stage(&self, stage: Stage) -> Option<&AuditEntry> {
        self.entries.iter().find(|e| e.stage == stage)
    }

    /// The stages attempted, in order.
    pub fn stages(&self) -> Vec<Stage> {
        self.entries.iter().map(|e| e.stage).collect()
    }

    /// True when every attempted stage through `Recommendation` completed.
    pub fn completed(&self) -> bool {
        self.last()
            .is_some_and(|e| e.stage == Stage::Recommendation && e.success)
    }

    /// The first stage whose entry reports failure.
    pub fn first_failure(&self) -> Option<&AuditEntry> {
        self.entries.iter().find(|e| !e.success)
    }

    /// Append the next entry, enforcing the log's ordering rules.
    pub fn append(&mut self, entry: AuditEntry) -> Result<(), AuditLogError> {
        let expected = self.entries.len() as u32;
        if entry.sequence != expected {
            return Err(AuditLogError::SequenceGap {
                expected,
                found: entry.sequence,
            });
        }
        if let Some(prev) = self.entries.last() {
            if entry.timestamp < prev.timestamp {
                return Err(AuditLogError::OutOfOrder {
                    sequence: entry.sequence,
                });
            }
        }
        self.entries.push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(sequence: u32, stage: Stage, offset_ms: i64, success: bool) -> AuditEntry {
        let base = DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        AuditEntry {
            sequence,
            stage,
            timestamp: base + Duration::milliseconds(offset_ms),
            duration_ms: 5,
            success,
            payload: serde_json::json!({}),
            errors: vec![],
        }
    }

    #[test]
    fn from_entries_sorts_by_sequence() {
        let log = AuditLog::from_entries(vec![
            entry(1, Stage::AgentSignals, 10, true),
            entry(0, Stage::MarketIngestion, 0, true),
        ])
        .unwrap();
        assert_eq!(
            log.stages(),
            vec![Stage::MarketIngestion, Stage::AgentSignals]
        );
    }

    #[test]
    fn from_entries_rejects_gaps() {
        let err = AuditLog::from_entries(vec![
            entry(0, Stage::MarketIngestion, 0, true),
            entry(2, Stage::ThesisConstruction, 20, true),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            AuditLogError::SequenceGap {
                expected: 1,
                found: 2
            }
        );
    }

    #[test]
    fn from_entries_rejects_time_travel() {
        let err = AuditLog::from_entries(vec![
            entry(0, Stage::MarketIngestion, 50, true),
            entry(1, Stage::AgentSignals, 10, true),
        ])
        .unwrap_err();
        assert_eq!(err, AuditLogError::OutOfOrder { sequence: 1 });
    }

    #[test]
    fn append_enforces_next_sequence() {
        let mut log = AuditLog::default();
        log.append(entry(0, Stage::MarketIngestion, 0, true)).unwrap();
        assert!(log.append(entry(5, Stage::AgentSignals, 1, true)).is_err());
        log.append(entry(1, Stage::AgentSignals, 1, false)).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log.first_failure().unwrap().stage, Stage::AgentSignals);
        assert!(!log.completed());
    }

    #[test]
    fn completed_requires_successful_recommendation() {
        let mut log = AuditLog::default();
        for (i, stage) in Stage::ALL.iter().enumerate() {
            log.append(entry(i as u32, *stage, i as i64, true)).unwrap();
        }
        assert!(log.completed());
        assert_eq!(log.stage(Stage::Consensus).unwrap().sequence, 5);
    }

    #[test]
    fn serializes_as_plain_array() {
        let log = AuditLog::from_entries(vec![entry(0, Stage::MarketIngestion, 0, true)]).unwrap();
        let json = serde_json::to_value(&log).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["stage"], "market_ingestion");
    }
}
