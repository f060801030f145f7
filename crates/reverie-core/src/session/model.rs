//! Session domain model.
//!
//! A session is one bounded operational run of a named behavior on a single
//! device: an ordered sequence of sampled frames plus the failures marked while
//! it was running.

use crate::error::{ReverieError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One sampled snapshot of sensor/action state.
///
/// The snapshot payload is opaque to the engine; only the simulation
/// collaborator interprets it. Frames are immutable once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub timestamp: DateTime<Utc>,
    pub snapshot: serde_json::Value,
}

/// A marked adverse event inside a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Failure {
    /// Enum-like failure kind (e.g. "collision", "stall")
    pub failure_type: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    /// Index of the frame this failure refers to (always < frame count)
    pub frame_index: usize,
}

/// A failure as reported by the live control loop, before the recorder
/// resolves its frame index and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureMark {
    pub failure_type: String,
    pub description: String,
    /// Explicit frame reference. `None` means the most recently appended frame.
    #[serde(default)]
    pub frame_index: Option<usize>,
}

impl FailureMark {
    pub fn new(failure_type: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            failure_type: failure_type.into(),
            description: description.into(),
            frame_index: None,
        }
    }

    pub fn at_frame(mut self, frame_index: usize) -> Self {
        self.frame_index = Some(frame_index);
        self
    }
}

/// A recorded run of one behavior.
///
/// This is the "pure" domain model; persistence format is decided by the
/// `SessionRepository` implementation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier (UUID format)
    pub id: String,
    /// Name of the behavior that was executing
    pub behavior_name: String,
    /// Device the behavior ran on
    pub device_id: String,
    pub started_at: DateTime<Utc>,
    /// Set only by an explicit close; `None` while recording
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    /// Frames in append order (timestamps non-decreasing)
    #[serde(default)]
    pub frames: Vec<Frame>,
    #[serde(default)]
    pub failures: Vec<Failure>,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        behavior_name: impl Into<String>,
        device_id: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            behavior_name: behavior_name.into(),
            device_id: device_id.into(),
            started_at,
            ended_at: None,
            frames: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Returns true once `end_session` has finalized this session.
    pub fn is_finalized(&self) -> bool {
        self.ended_at.is_some()
    }

    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Timestamp used to order sessions "most recent first".
    pub fn recency(&self) -> DateTime<Utc> {
        self.ended_at.unwrap_or(self.started_at)
    }

    /// Checks the invariants the recorder maintains for sessions it produces.
    ///
    /// Needed for documents that did not come from a recorder, such as imports.
    pub fn validate(&self) -> Result<()> {
        if let Some(failure) = self
            .failures
            .iter()
            .find(|failure| failure.frame_index >= self.frames.len())
        {
            return Err(ReverieError::InvalidFrameIndex {
                frame_index: failure.frame_index,
                frame_count: self.frames.len(),
            });
        }

        if let Some(position) = self
            .frames
            .windows(2)
            .position(|pair| pair[1].timestamp < pair[0].timestamp)
        {
            return Err(self.inconsistent(format!(
                "frame {} is timestamped before frame {}",
                position + 1,
                position
            )));
        }

        if let Some(ended_at) = self.ended_at {
            if ended_at < self.started_at {
                return Err(self.inconsistent("session ends before it starts"));
            }
        }
        Ok(())
    }

    fn inconsistent(&self, reason: impl Into<String>) -> ReverieError {
        ReverieError::InconsistentSession {
            session_id: self.id.clone(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_open_and_clean() {
        let session = Session::new("s-1", "patrol", "robot-1", Utc::now());
        assert!(!session.is_finalized());
        assert!(!session.has_failures());
        assert!(session.frames.is_empty());
    }

    #[test]
    fn test_session_deserializes_without_optional_fields() {
        let json = r#"{
            "id": "s-1",
            "behavior_name": "patrol",
            "device_id": "robot-1",
            "started_at": "2026-01-01T00:00:00Z"
        }"#;
        let session: Session = serde_json::from_str(json).unwrap();
        assert_eq!(session.behavior_name, "patrol");
        assert!(session.ended_at.is_none());
        assert!(session.failures.is_empty());
    }

    fn frame_at(timestamp: DateTime<Utc>) -> Frame {
        Frame {
            timestamp,
            snapshot: serde_json::json!({}),
        }
    }

    #[test]
    fn test_validate_accepts_recorder_shaped_session() {
        let start = Utc::now();
        let mut session = Session::new("s-1", "patrol", "robot-1", start);
        session.frames.push(frame_at(start));
        session.frames.push(frame_at(start));
        session.frames.push(frame_at(start + chrono::Duration::milliseconds(5)));
        session.failures.push(Failure {
            failure_type: "collision".to_string(),
            description: "bump".to_string(),
            timestamp: start,
            frame_index: 2,
        });
        session.ended_at = Some(start + chrono::Duration::seconds(1));
        assert!(session.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_out_of_range_failure() {
        let start = Utc::now();
        let mut session = Session::new("s-1", "patrol", "robot-1", start);
        session.frames.push(frame_at(start));
        session.failures.push(Failure {
            failure_type: "stall".to_string(),
            description: "wheel stuck".to_string(),
            timestamp: start,
            frame_index: 1,
        });
        assert_eq!(
            session.validate(),
            Err(ReverieError::InvalidFrameIndex {
                frame_index: 1,
                frame_count: 1
            })
        );
    }

    #[test]
    fn test_validate_rejects_frames_going_back_in_time() {
        let start = Utc::now();
        let mut session = Session::new("s-1", "patrol", "robot-1", start);
        session.frames.push(frame_at(start));
        session.frames.push(frame_at(start + chrono::Duration::seconds(2)));
        session.frames.push(frame_at(start + chrono::Duration::seconds(1)));

        let err = session.validate().unwrap_err();
        assert!(matches!(err, ReverieError::InconsistentSession { .. }));
        assert!(err.to_string().contains("frame 2 is timestamped before frame 1"));
    }

    #[test]
    fn test_validate_rejects_end_before_start() {
        let start = Utc::now();
        let mut session = Session::new("s-1", "patrol", "robot-1", start);
        session.ended_at = Some(start - chrono::Duration::seconds(1));
        assert!(matches!(
            session.validate(),
            Err(ReverieError::InconsistentSession { .. })
        ));
    }

    #[test]
    fn test_failure_mark_builder() {
        let mark = FailureMark::new("collision", "bumped the wall").at_frame(2);
        assert_eq!(mark.frame_index, Some(2));
        assert_eq!(mark.failure_type, "collision");
    }
}
