//! Training event diagnosis for the elastic training master
//!
//! Tails per-rank event logs emitted by the trainer and forwards step
//! events to a sink on the master.

pub mod collector;
pub mod event;

pub use collector::{EventCollector, EventSink, DEFAULT_RETRY_TIMEOUT};
pub use event::{parse_line, EventKind, EventTarget, ParseOutcome, TrainEvent, TrainEventName};
