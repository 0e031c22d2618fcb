//! Turns transcriber output into validated [`Event`]s.

use crate::error::InvalidEventError;
use crate::types::{Event, RawNote};
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// What to do with a record that fails validation. Applied to the whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidEventPolicy {
    /// Fail the whole ingestion on the first bad record.
    Abort,
    /// Skip bad records, logging and counting each one.
    #[default]
    Drop,
}

/// Result of a successful ingestion.
#[derive(Debug, Clone, Default)]
pub struct Ingested {
    /// Valid events, in input order
    pub events: Vec<Event>,
    /// Records skipped under [`InvalidEventPolicy::Drop`]
    pub dropped: usize,
}

/// Build one Event per record. Ids are the record's input position, so they
/// start at 0 and increase with input order (dropped records leave a gap).
pub fn ingest(raw: &[RawNote], policy: InvalidEventPolicy) -> Result<Ingested, InvalidEventError> {
    let mut out = Ingested {
        events: Vec::with_capacity(raw.len()),
        dropped: 0,
    };

    for (i, note) in raw.iter().enumerate() {
        match Event::new(i as u64, note.timestamp, note.duration, note.pitch) {
            Ok(event) => out.events.push(event),
            Err(e) => match policy {
                InvalidEventPolicy::Abort => return Err(e),
                InvalidEventPolicy::Drop => {
                    warn!("Dropping {}", e);
                    out.dropped += 1;
                }
            },
        }
    }

    info!(
        "Ingested {} events ({} dropped)",
        out.events.len(),
        out.dropped
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InvalidReason;

    fn batch() -> Vec<RawNote> {
        vec![
            RawNote::new(0.5, 0.25, 60),
            RawNote::new(1.0, 0.0, 62),
            RawNote::new(1.5, 0.5, 200),
            RawNote::new(2.0, 1.0, 64),
        ]
    }

    #[test]
    fn test_ids_follow_input_order() {
        let raw = vec![
            RawNote::new(2.0, 1.0, 40),
            RawNote::new(1.0, 1.0, 41),
            RawNote::new(3.0, 1.0, 42),
        ];
        let out = ingest(&raw, InvalidEventPolicy::Abort).unwrap();
        let ids: Vec<u64> = out.events.iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(out.events[1].pitch(), 41);
        assert_eq!(out.dropped, 0);
    }

    #[test]
    fn test_abort_stops_on_first_bad_record() {
        let err = ingest(&batch(), InvalidEventPolicy::Abort).unwrap_err();
        assert_eq!(err.index, 1);
        assert!(matches!(err.reason, InvalidReason::Duration(d) if d == 0.0));
    }

    #[test]
    fn test_drop_counts_and_keeps_going() {
        let out = ingest(&batch(), InvalidEventPolicy::Drop).unwrap();
        assert_eq!(out.dropped, 2);
        let ids: Vec<u64> = out.events.iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec![0, 3], "ids keep their input position");
    }

    #[test]
    fn test_empty_batch() {
        let out = ingest(&[], InvalidEventPolicy::Abort).unwrap();
        assert!(out.events.is_empty());
        assert_eq!(out.dropped, 0);
    }

    #[test]
    fn test_policy_parses_lowercase() {
        let p: InvalidEventPolicy = serde_json::from_str("\"abort\"").unwrap();
        assert_eq!(p, InvalidEventPolicy::Abort);
        assert_eq!(InvalidEventPolicy::default(), InvalidEventPolicy::Drop);
    }
}
