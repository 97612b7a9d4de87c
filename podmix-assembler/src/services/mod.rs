//! Services for episode assembly

pub mod assembly_orchestrator;
pub mod concatenator;
pub mod loudness_measurer;
pub mod music;
pub mod normalizer;
pub mod section_planner;
pub mod temp_assets;
pub mod timeline;

pub use assembly_orchestrator::EpisodeAssembler;
pub use concatenator::Concatenator;
pub use loudness_measurer::LoudnessMeasurer;
pub use music::{store_for, DirectoryMusicStore, MusicPreparer, MusicStore, MusicTrack, NoMusic};
pub use normalizer::{NormalizationOutcome, Normalizer};
pub use section_planner::{plan_sections, section_sizes};
pub use temp_assets::{AssetPurpose, ReleaseReport, TemporaryAssetManager};
pub use timeline::{drift_seconds, validate_timings, TimelineBuilder};
