//! Domain entities decoded from gateway responses.

use chrono::{DateTime, Utc};

use crate::convert::timestamp_to_datetime;
use crate::proto::playback::{GameEvent, ReplayChunk, Sample};

/// One telemetry frame.
///
/// `detection` and `referee` stay encoded; their schemas belong to the
/// producers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub first_timestamp: Option<DateTime<Utc>>,
    pub timestamp: Option<DateTime<Utc>>,
    pub detection: Vec<u8>,
    pub referee: Vec<u8>,
}

impl Frame {
    /// True when the sample carried nothing at all.
    pub fn is_empty(&self) -> bool {
        self.first_timestamp.is_none()
            && self.timestamp.is_none()
            && self.detection.is_empty()
            && self.referee.is_empty()
    }
}

impl From<Sample> for Frame {
    fn from(sample: Sample) -> Self {
        Self {
            first_timestamp: sample.first_timestamp.as_ref().and_then(timestamp_to_datetime),
            timestamp: sample.timestamp.as_ref().and_then(timestamp_to_datetime),
            detection: sample.detection,
            referee: sample.referee,
        }
    }
}

/// A recorded span of frames.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chunk {
    pub start: Option<DateTime<Utc>>,
    pub frames: Vec<Frame>,
}

impl From<ReplayChunk> for Chunk {
    fn from(chunk: ReplayChunk) -> Self {
        Self {
            start: chunk.start_timestamp.as_ref().and_then(timestamp_to_datetime),
            frames: chunk.samples.into_iter().map(Frame::from).collect(),
        }
    }
}

/// A game event reported by the replay backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Event {
    pub timestamp: Option<DateTime<Utc>>,
    pub kind: String,
    pub description: String,
}

impl From<GameEvent> for Event {
    fn from(event: GameEvent) -> Self {
        Self {
            timestamp: event.timestamp.as_ref().and_then(timestamp_to_datetime),
            kind: event.kind,
            description: event.description,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost_types::Timestamp;

    fn ts(seconds: i64) -> Option<Timestamp> {
        Some(Timestamp { seconds, nanos: 0 })
    }

    #[test]
    fn test_frame_from_sample() {
        let frame = Frame::from(Sample {
            first_timestamp: ts(100),
            timestamp: ts(160),
            detection: b"robots".to_vec(),
            referee: b"halt".to_vec(),
        });

        assert_eq!(frame.first_timestamp.unwrap().timestamp(), 100);
        assert_eq!(frame.timestamp.unwrap().timestamp(), 160);
        assert_eq!(frame.detection, b"robots");
        assert_eq!(frame.referee, b"halt");
        assert!(!frame.is_empty());
    }

    #[test]
    fn test_default_sample_is_empty_frame() {
        assert!(Frame::from(Sample::default()).is_empty());
    }

    #[test]
    fn test_chunk_keeps_sample_order() {
        let chunk = Chunk::from(ReplayChunk {
            start_timestamp: ts(10),
            samples: vec![
                Sample {
                    detection: b"a".to_vec(),
                    ..Default::default()
                },
                Sample {
                    detection: b"b".to_vec(),
                    ..Default::default()
                },
            ],
        });

        assert_eq!(chunk.start.unwrap().timestamp(), 10);
        let detections: Vec<_> = chunk.frames.iter().map(|f| f.detection.clone()).collect();
        assert_eq!(detections, vec![b"a".to_vec(), b"b".to_vec()]);
    }

    #[test]
    fn test_event_from_game_event() {
        let event = Event::from(GameEvent {
            timestamp: None,
            kind: "goal".to_string(),
            description: "blue scores".to_string(),
        });
        assert_eq!(event.kind, "goal");
        assert_eq!(event.description, "blue scores");
        assert!(event.timestamp.is_none());
    }
}
