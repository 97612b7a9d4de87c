//! # podmix common library
//!
//! Shared code for the podmix workspace:
//! - Configuration loading and scratch folder resolution
//! - Error types
//! - Assembly event types and the EventBus
//! - Fade curve definitions
//! - Human-readable time formatting

pub mod config;
pub mod error;
pub mod events;
pub mod fade_curves;
pub mod human_time;

pub use error::{Error, Result};
pub use fade_curves::FadeCurve;
