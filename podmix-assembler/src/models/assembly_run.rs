//! Assembly run state machine
//!
//! Idle → MeasuringChunks → NormalizingChunks → ConcatenatingSections →
//! NormalizingSections → AssemblingEpisode → NormalizingEpisode → Done
//!
//! Any non-terminal state may move to Failed.

use chrono::{DateTime, Utc};
use podmix_common::events::AssemblyState;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// State transition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub run_id: Uuid,
    pub old_state: AssemblyState,
    pub new_state: AssemblyState,
    pub transitioned_at: DateTime<Utc>,
}

/// Counters collected while a run progresses
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStatistics {
    pub chunks_total: usize,
    pub chunks_skipped: usize,
    pub sections_total: usize,
    pub sections_skipped: usize,
    pub music_segments_used: usize,
    pub music_segments_skipped: usize,
}

impl RunStatistics {
    /// Normalization passes avoided by the tolerance check
    pub fn skipped_normalizations(&self) -> usize {
        self.chunks_skipped + self.sections_skipped
    }
}

/// In-memory state of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyRun {
    pub run_id: Uuid,
    pub state: AssemblyState,
    pub history: Vec<StateTransition>,
    pub statistics: RunStatistics,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl AssemblyRun {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            state: AssemblyState::Idle,
            history: Vec::new(),
            statistics: RunStatistics::default(),
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Whether `new_state` is a legal successor of the current state
    pub fn can_transition_to(&self, new_state: AssemblyState) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        if new_state == AssemblyState::Failed {
            return true;
        }
        next_state(self.state) == Some(new_state)
    }

    /// Transition to new state
    ///
    /// Returns `None` (and leaves the run untouched) for an illegal transition.
    pub fn transition_to(&mut self, new_state: AssemblyState) -> Option<StateTransition> {
        if !self.can_transition_to(new_state) {
            return None;
        }

        let transition = StateTransition {
            run_id: self.run_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;

        if new_state.is_terminal() {
            self.ended_at = Some(transition.transitioned_at);
        }

        self.history.push(transition.clone());
        Some(transition)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn elapsed_seconds(&self) -> f64 {
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

/// Successor in the happy path
fn next_state(state: AssemblyState) -> Option<AssemblyState> {
    match state {
        AssemblyState::Idle => Some(AssemblyState::MeasuringChunks),
        AssemblyState::MeasuringChunks => Some(AssemblyState::NormalizingChunks),
        AssemblyState::NormalizingChunks => Some(AssemblyState::ConcatenatingSections),
        AssemblyState::ConcatenatingSections => Some(AssemblyState::NormalizingSections),
        AssemblyState::NormalizingSections => Some(AssemblyState::AssemblingEpisode),
        AssemblyState::AssemblingEpisode => Some(AssemblyState::NormalizingEpisode),
        AssemblyState::NormalizingEpisode => Some(AssemblyState::Done),
        AssemblyState::Done | AssemblyState::Failed => None,
    }
}
