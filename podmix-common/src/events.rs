//! Event system for podmix
//!
//! Provides shared event definitions and the EventBus used to observe an
//! assembly run (progress displays, logs, tests).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Assembly run state
///
/// Runs progress strictly in declaration order from `Idle` to `Done`.
/// Any stage may fall into `Failed` instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssemblyState {
    /// Run created, nothing started
    Idle,
    /// Level 1: measuring every raw chunk
    MeasuringChunks,
    /// Level 1: correcting every raw chunk
    NormalizingChunks,
    /// Level 2: joining chunks into sections
    ConcatenatingSections,
    /// Level 2: correcting each section
    NormalizingSections,
    /// Joining sections with music into the raw episode
    AssemblingEpisode,
    /// Level 3: final authoritative correction
    NormalizingEpisode,
    /// Episode produced
    Done,
    /// A stage failed; scratch assets were released
    Failed,
}

impl AssemblyState {
    /// Stable lowercase name used in logs and error messages
    pub fn as_str(&self) -> &'static str {
        match self {
            AssemblyState::Idle => "idle",
            AssemblyState::MeasuringChunks => "measuring_chunks",
            AssemblyState::NormalizingChunks => "normalizing_chunks",
            AssemblyState::ConcatenatingSections => "concatenating_sections",
            AssemblyState::NormalizingSections => "normalizing_sections",
            AssemblyState::AssemblingEpisode => "assembling_episode",
            AssemblyState::NormalizingEpisode => "normalizing_episode",
            AssemblyState::Done => "done",
            AssemblyState::Failed => "failed",
        }
    }

    /// Working states in execution order
    pub fn working_states() -> &'static [AssemblyState] {
        &[
            AssemblyState::MeasuringChunks,
            AssemblyState::NormalizingChunks,
            AssemblyState::ConcatenatingSections,
            AssemblyState::NormalizingSections,
            AssemblyState::AssemblingEpisode,
            AssemblyState::NormalizingEpisode,
        ]
    }

    /// True for `Done` and `Failed`
    pub fn is_terminal(&self) -> bool {
        matches!(self, AssemblyState::Done | AssemblyState::Failed)
    }
}

impl std::fmt::Display for AssemblyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// podmix event types
///
/// Events are broadcast via EventBus and can be serialized for external
/// progress reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AssemblyEvent {
    /// A run was accepted and its scratch directory created
    RunStarted {
        run_id: Uuid,
        chunk_count: usize,
        section_count: usize,
        timestamp: DateTime<Utc>,
    },

    /// The run moved to a new state
    StateChanged {
        run_id: Uuid,
        old_state: AssemblyState,
        new_state: AssemblyState,
        timestamp: DateTime<Utc>,
    },

    /// One chunk finished a level-1 step
    ChunkProgress {
        run_id: Uuid,
        state: AssemblyState,
        completed: usize,
        total: usize,
        timestamp: DateTime<Utc>,
    },

    /// A music segment was omitted (soft failure)
    MusicSkipped {
        run_id: Uuid,
        key: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Scratch assets released at run end
    CleanupCompleted {
        run_id: Uuid,
        removed: usize,
        failed: usize,
        timestamp: DateTime<Utc>,
    },

    /// Episode produced
    RunCompleted {
        run_id: Uuid,
        duration_seconds: f64,
        file_size_bytes: u64,
        music_segments_used: usize,
        timestamp: DateTime<Utc>,
    },

    /// Run aborted
    RunFailed {
        run_id: Uuid,
        stage: AssemblyState,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl AssemblyEvent {
    /// Run this event belongs to
    pub fn run_id(&self) -> Uuid {
        match self {
            AssemblyEvent::RunStarted { run_id, .. }
            | AssemblyEvent::StateChanged { run_id, .. }
            | AssemblyEvent::ChunkProgress { run_id, .. }
            | AssemblyEvent::MusicSkipped { run_id, .. }
            | AssemblyEvent::CleanupCompleted { run_id, .. }
            | AssemblyEvent::RunCompleted { run_id, .. }
            | AssemblyEvent::RunFailed { run_id, .. } => *run_id,
        }
    }
}

/// Broadcast channel for [`AssemblyEvent`]s
///
/// Publishing never blocks; a subscriber that falls behind by more than
/// `capacity` events sees `RecvError::Lagged` and skips ahead.
///
/// ```
/// use podmix_common::events::{AssemblyEvent, AssemblyState, EventBus};
///
/// let event_bus = EventBus::new(100);
/// let mut rx = event_bus.subscribe();
///
/// event_bus.emit_lossy(AssemblyEvent::StateChanged {
///     run_id: uuid::Uuid::new_v4(),
///     old_state: AssemblyState::Idle,
///     new_state: AssemblyState::MeasuringChunks,
///     timestamp: chrono::Utc::now(),
/// });
///
/// assert!(rx.try_recv().is_ok());
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AssemblyEvent>,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<AssemblyEvent> {
        self.tx.subscribe()
    }

    /// Publish to current subscribers (`Err` when there are none)
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: AssemblyEvent,
    ) -> Result<usize, broadcast::error::SendError<AssemblyEvent>> {
        self.tx.send(event)
    }

    /// Publish, ignoring the no-subscriber case
    pub fn emit_lossy(&self, event: AssemblyEvent) {
        let _ = self.tx.send(event);
    }

    /// Live receivers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
