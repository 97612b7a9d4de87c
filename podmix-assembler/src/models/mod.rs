//! Data models for the episode assembler
//!
//! - Audio assets and their stream formats
//! - Loudness measurements and normalization targets
//! - Episode request input and assembled output
//! - Run state machine

pub mod assembly_run;
pub mod audio_asset;
pub mod episode;
pub mod loudness;
pub mod music;
pub mod script;

pub use assembly_run::{AssemblyRun, RunStatistics, StateTransition};
pub use audio_asset::{id_from_path, AudioAsset, AudioFormat};
pub use episode::{AssembledEpisode, AssemblyPlan, PlannedSegment, SectionTiming, TransitionStyle};
pub use loudness::{LoudnessMeasurement, NormalizationLevel, NormalizationTarget};
pub use music::{MusicAsset, MusicKey};
pub use podmix_common::events::AssemblyState;
pub use script::{EpisodeRequest, ScriptSection, SectionInfo, SectionType};
