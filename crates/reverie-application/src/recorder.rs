//! Session recorder.
//!
//! Captures frames and failure markers from the live control loop. Appends only
//! touch an in-memory buffer; persistence happens on a background flusher task,
//! and `end_session` is the single call that waits for storage.

use chrono::{DateTime, Utc};
use reverie_core::config::RecorderSettings;
use reverie_core::error::{ReverieError, Result};
use reverie_core::session::{Failure, FailureMark, Frame, Session, SessionRepository};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

struct ActiveSession {
    session: Session,
    /// Frames appended since the last checkpoint request
    unflushed: usize,
    /// Final write in flight; the device stays reserved but the session takes no more input
    closing: bool,
}

impl ActiveSession {
    fn new(session: Session) -> Self {
        Self {
            session,
            unflushed: 0,
            closing: false,
        }
    }
}

#[derive(Default)]
struct RecorderState {
    /// Active sessions by session id
    sessions: HashMap<String, ActiveSession>,
    /// Device id -> active session id
    devices: HashMap<String, String>,
}

enum FlushCommand {
    /// Persist the in-progress copy of an active session
    Checkpoint(String),
    /// Persist a finalized session and report the outcome
    Finalize {
        session: Session,
        reply: oneshot::Sender<Result<()>>,
    },
}

/// Records operational sessions, one active session per device.
///
/// Checkpoints and the final write travel through the same queue, so an older
/// checkpoint can never land after (and overwrite) the finalized session.
pub struct SessionRecorder {
    repository: Arc<dyn SessionRepository>,
    state: Arc<Mutex<RecorderState>>,
    flush_tx: mpsc::UnboundedSender<FlushCommand>,
    flush_every_frames: usize,
}

impl SessionRecorder {
    /// Creates the recorder and spawns its flusher task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(repository: Arc<dyn SessionRepository>, settings: &RecorderSettings) -> Self {
        let state = Arc::new(Mutex::new(RecorderState::default()));
        let (flush_tx, flush_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_flusher(repository.clone(), state.clone(), flush_rx));

        Self {
            repository,
            state,
            flush_tx,
            flush_every_frames: settings.flush_every_frames.max(1),
        }
    }

    /// Starts recording `behavior_name` on `device_id` and returns the session id.
    ///
    /// # Errors
    ///
    /// `AlreadyRecording` if the device already has an active session.
    pub fn start_session(&self, behavior_name: &str, device_id: &str) -> Result<String> {
        let session_id = Uuid::new_v4().to_string();
        {
            let mut state = self.lock_state()?;
            if let Some(existing) = state.devices.get(device_id) {
                return Err(ReverieError::AlreadyRecording {
                    device_id: device_id.to_string(),
                    session_id: existing.clone(),
                });
            }

            let session = Session::new(&session_id, behavior_name, device_id, Utc::now());
            state
                .devices
                .insert(device_id.to_string(), session_id.clone());
            state
                .sessions
                .insert(session_id.clone(), ActiveSession::new(session));
        }

        tracing::info!(
            session_id = %session_id,
            behavior = behavior_name,
            device = device_id,
            "Recording started"
        );
        self.request_checkpoint(&session_id);
        Ok(session_id)
    }

    /// Appends a frame and returns its index. Never waits on storage.
    pub fn append_frame(&self, session_id: &str, snapshot: serde_json::Value) -> Result<usize> {
        let (frame_index, checkpoint_due) = {
            let mut state = self.lock_state()?;
            let active = open_session(&mut state, session_id)?;

            let timestamp = monotonic_now(active.session.frames.last().map(|f| f.timestamp));
            active.session.frames.push(Frame {
                timestamp,
                snapshot,
            });
            active.unflushed += 1;

            let due = active.unflushed >= self.flush_every_frames;
            if due {
                active.unflushed = 0;
            }
            (active.session.frames.len() - 1, due)
        };

        if checkpoint_due {
            self.request_checkpoint(session_id);
        }
        Ok(frame_index)
    }

    /// Marks a failure against an existing frame and returns the resolved frame index.
    ///
    /// # Errors
    ///
    /// - `UnknownSession` if the session is not active
    /// - `InvalidFrameIndex` if the mark references a frame that does not exist
    ///   (including any mark on a session without frames)
    pub fn mark_failure(&self, session_id: &str, mark: FailureMark) -> Result<usize> {
        let mut state = self.lock_state()?;
        let active = open_session(&mut state, session_id)?;

        let frame_count = active.session.frames.len();
        let frame_index = match mark.frame_index {
            Some(index) => index,
            None => frame_count.checked_sub(1).ok_or(ReverieError::InvalidFrameIndex {
                frame_index: 0,
                frame_count,
            })?,
        };
        if frame_index >= frame_count {
            return Err(ReverieError::InvalidFrameIndex {
                frame_index,
                frame_count,
            });
        }

        let timestamp = monotonic_now(active.session.failures.last().map(|f| f.timestamp));
        tracing::debug!(
            session_id = session_id,
            failure_type = %mark.failure_type,
            frame_index,
            "Failure marked"
        );
        active.session.failures.push(Failure {
            failure_type: mark.failure_type,
            description: mark.description,
            timestamp,
            frame_index,
        });

        Ok(frame_index)
    }

    /// Closes the session and waits until it is durable.
    ///
    /// The device stays reserved until the final write completes. If that write
    /// fails the session stays active, so the call can be retried.
    ///
    /// # Errors
    ///
    /// `UnknownSession` if the session was never started, already ended, or is
    /// being ended by another call.
    pub async fn end_session(&self, session_id: &str) -> Result<Session> {
        let mut session = {
            let mut state = self.lock_state()?;
            let active = open_session(&mut state, session_id)?;
            active.closing = true;
            active.session.clone()
        };

        session.ended_at = Some(monotonic_now(
            session.frames.last().map(|f| f.timestamp).max(Some(session.started_at)),
        ));

        let persisted = self.persist_final(&session).await;

        let mut state = self.lock_state()?;
        if let Err(e) = persisted {
            tracing::error!(session_id = session_id, "Failed to finalize session: {}", e);
            if let Some(active) = state.sessions.get_mut(session_id) {
                active.closing = false;
            }
            return Err(e);
        }

        state.sessions.remove(session_id);
        state.devices.remove(&session.device_id);
        drop(state);

        tracing::info!(
            session_id = session_id,
            frames = session.frames.len(),
            failures = session.failures.len(),
            "Recording finished"
        );
        Ok(session)
    }

    /// Every persisted session, most recent first.
    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        let mut sessions = self.repository.list_all().await?;
        sort_most_recent_first(&mut sessions);
        Ok(sessions)
    }

    /// Finalized sessions with at least one failure, most recent first, at most `limit`.
    pub async fn get_failed_sessions(&self, limit: usize) -> Result<Vec<Session>> {
        self.collect_failed(limit, |_| true).await
    }

    /// Like [`get_failed_sessions`](Self::get_failed_sessions), restricted to one behavior
    /// before truncation.
    pub async fn get_failed_sessions_for(
        &self,
        behavior_name: &str,
        limit: usize,
    ) -> Result<Vec<Session>> {
        self.collect_failed(limit, |session| session.behavior_name == behavior_name)
            .await
    }

    /// Id of the session currently recording on `device_id`, if any.
    pub fn active_session_for(&self, device_id: &str) -> Option<String> {
        self.lock_state()
            .ok()
            .and_then(|state| state.devices.get(device_id).cloned())
    }

    async fn collect_failed<F>(&self, limit: usize, filter: F) -> Result<Vec<Session>>
    where
        F: Fn(&Session) -> bool,
    {
        let mut sessions: Vec<Session> = self
            .repository
            .list_all()
            .await?
            .into_iter()
            .filter(|session| session.is_finalized() && session.has_failures() && filter(session))
            .collect();
        sort_most_recent_first(&mut sessions);
        sessions.truncate(limit);
        Ok(sessions)
    }

    async fn persist_final(&self, session: &Session) -> Result<()> {
        let (reply, done) = oneshot::channel();
        let command = FlushCommand::Finalize {
            session: session.clone(),
            reply,
        };

        if self.flush_tx.send(command).is_err() {
            // Flusher is gone (runtime shutting down); write directly
            return self.repository.save(session).await;
        }

        match done.await {
            Ok(result) => result,
            Err(_) => self.repository.save(session).await,
        }
    }

    fn request_checkpoint(&self, session_id: &str) {
        if self
            .flush_tx
            .send(FlushCommand::Checkpoint(session_id.to_string()))
            .is_err()
        {
            tracing::warn!(session_id = session_id, "Flusher unavailable, checkpoint skipped");
        }
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, RecorderState>> {
        self.state
            .lock()
            .map_err(|e| ReverieError::internal(format!("Recorder state poisoned: {}", e)))
    }
}

async fn run_flusher(
    repository: Arc<dyn SessionRepository>,
    state: Arc<Mutex<RecorderState>>,
    mut commands: mpsc::UnboundedReceiver<FlushCommand>,
) {
    while let Some(command) = commands.recv().await {
        match command {
            FlushCommand::Checkpoint(session_id) => {
                let snapshot = match state.lock() {
                    Ok(state) => state
                        .sessions
                        .get(&session_id)
                        .map(|active| active.session.clone()),
                    Err(_) => None,
                };
                // Already finalized (or never existed): nothing to checkpoint
                let Some(snapshot) = snapshot else {
                    continue;
                };
                if let Err(e) = repository.save(&snapshot).await {
                    tracing::warn!(session_id = %session_id, "Checkpoint write failed: {}", e);
                }
            }
            FlushCommand::Finalize { session, reply } => {
                let result = repository.save(&session).await;
                let _ = reply.send(result);
            }
        }
    }
    tracing::debug!("Recorder flusher stopped");
}

/// An active session that still accepts input.
fn open_session<'a>(
    state: &'a mut RecorderState,
    session_id: &str,
) -> Result<&'a mut ActiveSession> {
    state
        .sessions
        .get_mut(session_id)
        .filter(|active| !active.closing)
        .ok_or_else(|| ReverieError::unknown_session(session_id))
}

/// `now`, but never earlier than `previous`.
fn monotonic_now(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match previous {
        Some(previous) if previous > now => previous,
        _ => now,
    }
}

fn sort_most_recent_first(sessions: &mut [Session]) {
    sessions.sort_by(|a, b| b.recency().cmp(&a.recency()).then_with(|| a.id.cmp(&b.id)));
}
