//! Multipart envelope received from the messaging transport.

use bytes::Bytes;

/// One receive unit: an optional topic frame and a payload frame.
///
/// An envelope with an empty payload is the "no message this cycle" sentinel
/// produced on receive failure. It must never be forwarded as a valid
/// zero-length message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Envelope {
    topic: Bytes,
    payload: Bytes,
}

impl Envelope {
    /// The empty sentinel.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Two-part envelope.
    pub fn new(topic: impl Into<Bytes>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Single-part envelope (payload only).
    pub fn single(payload: impl Into<Bytes>) -> Self {
        Self {
            topic: Bytes::new(),
            payload: payload.into(),
        }
    }

    /// Build from the frames of a single receive.
    ///
    /// Zero frames give the empty sentinel, one frame is the payload, two
    /// frames are topic and payload. Anything longer is malformed and also
    /// yields the sentinel.
    pub fn from_frames(frames: Vec<Bytes>) -> Self {
        let mut frames = frames.into_iter();
        match (frames.next(), frames.next(), frames.next()) {
            (None, _, _) => Self::empty(),
            (Some(payload), None, _) => Self::single(payload),
            (Some(topic), Some(payload), None) => Self::new(topic, payload),
            (Some(_), Some(_), Some(_)) => {
                tracing::warn!(frames = 3 + frames.len(), "Dropping envelope with too many frames");
                Self::empty()
            }
        }
    }

    /// Frames to put on the wire: `[payload]` or `[topic, payload]`.
    pub fn into_frames(self) -> Vec<Bytes> {
        if self.topic.is_empty() {
            vec![self.payload]
        } else {
            vec![self.topic, self.payload]
        }
    }

    /// Topic frame, if one was received.
    pub fn topic(&self) -> Option<&[u8]> {
        if self.topic.is_empty() {
            None
        } else {
            Some(&self.topic)
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// True for the "no message this cycle" sentinel.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}
