//! Training event lines and their parser
//!
//! Event log lines carry a bracket prefix followed by a JSON payload:
//!
//! ```text
//! [2024-06-01T10:00:00] [pid] [module] [TRAINER] [#step] [BEGIN] {"global_step": 100}
//! ```

use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

/// Number of bracket groups a well-formed prefix carries
const EVENT_PREFIX_FIELDS: usize = 6;

fn prefix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\s*\[(.*?)\]\s*").expect("valid prefix pattern"))
}

/// Which component emitted the event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTarget {
    Trainer,
    Saver,
}

impl EventTarget {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "TRAINER" => Some(EventTarget::Trainer),
            "SAVER" => Some(EventTarget::Saver),
            _ => None,
        }
    }
}

/// What the event is about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainEventName {
    Step,
    Checkpoint,
}

impl TrainEventName {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "#step" => Some(TrainEventName::Step),
            "#ckpt" => Some(TrainEventName::Checkpoint),
            _ => None,
        }
    }
}

/// Begin/end marker of the event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Begin,
    End,
}

impl EventKind {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "BEGIN" => Some(EventKind::Begin),
            "END" => Some(EventKind::End),
            _ => None,
        }
    }
}

/// One parsed training event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainEvent {
    /// Unix timestamp of the event
    pub ts: i64,
    pub target: EventTarget,
    pub name: TrainEventName,
    pub kind: EventKind,
    pub step: u64,
}

/// Result of parsing one event line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    Valid(TrainEvent),
    /// Not an event line we care about; dropped silently
    Skipped,
    /// Looked like an event but the payload or timestamp is broken
    Malformed(String),
}

/// Parse one line of an event log
pub fn parse_line(line: &str) -> ParseOutcome {
    let pattern = prefix_pattern();
    let fields: Vec<&str> = pattern
        .captures_iter(line)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect();
    if fields.is_empty() {
        debug!(line, "No event prefix in line");
        return ParseOutcome::Skipped;
    }
    if fields.len() != EVENT_PREFIX_FIELDS {
        debug!(line, groups = fields.len(), "Incorrect event prefix");
        return ParseOutcome::Skipped;
    }

    let ts = match fields[0].parse::<chrono::NaiveDateTime>() {
        Ok(dt) => dt.and_utc().timestamp(),
        Err(e) => return ParseOutcome::Malformed(format!("bad timestamp {}: {}", fields[0], e)),
    };

    let Some(target) = EventTarget::parse(fields[3]) else {
        debug!(target = fields[3], "Invalid event target");
        return ParseOutcome::Skipped;
    };
    let Some(name) = TrainEventName::parse(fields[4]) else {
        debug!(name = fields[4], "Invalid event name");
        return ParseOutcome::Skipped;
    };
    let Some(kind) = EventKind::parse(fields[5]) else {
        debug!(kind = fields[5], "Invalid event type");
        return ParseOutcome::Skipped;
    };

    let payload = pattern.replace_all(line, "");
    let step = match serde_json::from_str::<serde_json::Value>(&payload) {
        Ok(value) => match value.get("global_step").and_then(|v| v.as_u64()) {
            Some(step) => step,
            None => return ParseOutcome::Malformed(format!("no global_step in {}", payload)),
        },
        Err(e) => return ParseOutcome::Malformed(format!("bad payload {}: {}", payload, e)),
    };

    ParseOutcome::Valid(TrainEvent {
        ts,
        target,
        name,
        kind,
        step,
    })
}
