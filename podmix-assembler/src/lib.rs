//! # podmix episode assembler
//!
//! Builds one finished episode from independently rendered speech chunks and
//! optional intro / transition / outro music.
//!
//! **Pipeline:** chunks are normalized to base + 2 LU, joined per section and
//! normalized to base + 1 LU, then laid out with music, joined, and normalized
//! to the base target with a true-peak ceiling.
//!
//! **Tooling:** all audio processing goes through the [`tool::AudioTool`]
//! trait; [`tool::FfmpegTool`] drives ffmpeg / ffprobe.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod tool;

pub use config::{AssemblyConfig, MusicConfig};
pub use error::{AssemblyError, AssemblyResult};
pub use services::EpisodeAssembler;
