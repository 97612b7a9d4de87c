//! Error types for the episode assembler
//!
//! Tool failures are never retried automatically: their causes (malformed
//! input, unsupported codec, missing binary) are deterministic.

use crate::tool::ToolError;
use podmix_common::events::AssemblyState;
use thiserror::Error;
use uuid::Uuid;

/// Assembly error type
#[derive(Debug, Error)]
pub enum AssemblyError {
    /// Processing binary missing or unreachable (fatal, never retried)
    #[error("Audio tool unavailable: {0}")]
    ToolUnavailable(String),

    /// Loudness diagnostic could not be produced or parsed
    #[error("Loudness measurement failed for {asset}: {reason}")]
    Measurement { asset: String, reason: String },

    /// Correction pass failed
    #[error("Normalization failed for {asset}: {reason}")]
    Normalization { asset: String, reason: String },

    /// Joining failed or inputs are incompatible
    #[error("Concatenation failed at {asset}: {reason}")]
    Concatenation { asset: String, reason: String },

    /// Episode layout, mixing or delivery failed
    #[error("Assembly failed for {asset}: {reason}")]
    Assembly { asset: String, reason: String },

    /// Section cut indices rejected
    #[error("Invalid section boundaries: {0}")]
    InvalidBoundaries(String),

    /// Request rejected before any work started
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Run-scoped cancellation signal fired
    #[error("Run cancelled")]
    Cancelled,

    /// Invalid assembly configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// podmix-common error
    #[error("Common error: {0}")]
    Common(#[from] podmix_common::Error),

    /// Hard failure of a run, tagged with the stage it happened in
    #[error("Run {run_id} failed during {stage}: {source}")]
    Stage {
        run_id: Uuid,
        stage: AssemblyState,
        #[source]
        source: Box<AssemblyError>,
    },
}

/// Result type for assembler operations
pub type AssemblyResult<T> = Result<T, AssemblyError>;

impl AssemblyError {
    pub fn measurement(asset: impl Into<String>, err: ToolError) -> Self {
        Self::classify(err, |reason| AssemblyError::Measurement {
            asset: asset.into(),
            reason,
        })
    }

    pub fn normalization(asset: impl Into<String>, err: ToolError) -> Self {
        Self::classify(err, |reason| AssemblyError::Normalization {
            asset: asset.into(),
            reason,
        })
    }

    pub fn concatenation(asset: impl Into<String>, err: ToolError) -> Self {
        Self::classify(err, |reason| AssemblyError::Concatenation {
            asset: asset.into(),
            reason,
        })
    }

    pub fn assembly(asset: impl Into<String>, err: ToolError) -> Self {
        Self::classify(err, |reason| AssemblyError::Assembly {
            asset: asset.into(),
            reason,
        })
    }

    /// Unavailable and cancelled keep their own kinds; everything else,
    /// timeouts included, becomes the operation's error.
    fn classify(err: ToolError, otherwise: impl FnOnce(String) -> AssemblyError) -> Self {
        match err {
            ToolError::Unavailable(tool) => AssemblyError::ToolUnavailable(tool),
            ToolError::Cancelled => AssemblyError::Cancelled,
            other => otherwise(other.to_string()),
        }
    }

    /// Innermost error, unwrapping stage tags
    pub fn root_cause(&self) -> &AssemblyError {
        match self {
            AssemblyError::Stage { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Stage the run failed in, if tagged
    pub fn stage(&self) -> Option<AssemblyState> {
        match self {
            AssemblyError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.root_cause(), AssemblyError::Cancelled)
    }
}
