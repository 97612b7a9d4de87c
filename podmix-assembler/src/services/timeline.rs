//! Section timing map
//!
//! Elapsed time accumulates over every segment laid into the episode. Music
//! advances the clock but gets no entry; each section records where it starts
//! and how long it runs.

use crate::error::{AssemblyError, AssemblyResult};
use crate::models::{SectionInfo, SectionTiming};

/// Accumulates section timings while the episode layout is built
#[derive(Debug, Default)]
pub struct TimelineBuilder {
    elapsed: f64,
    music_seconds: f64,
    sections: Vec<SectionTiming>,
}

impl TimelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_music(&mut self, duration_seconds: f64) {
        self.elapsed += duration_seconds;
        self.music_seconds += duration_seconds;
    }

    pub fn push_section(&mut self, index: usize, info: &SectionInfo, duration_seconds: f64) {
        self.sections.push(SectionTiming {
            index,
            section_type: info.section_type,
            title: info.title.clone(),
            start_seconds: self.elapsed,
            duration_seconds,
        });
        self.elapsed += duration_seconds;
    }

    /// Total laid-out duration so far
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Seconds contributed by music segments
    pub fn music_seconds(&self) -> f64 {
        self.music_seconds
    }

    /// Validated timings
    pub fn finish(self) -> AssemblyResult<Vec<SectionTiming>> {
        validate_timings(&self.sections)?;
        Ok(self.sections)
    }
}

/// Starts strictly increasing, durations positive, no overlap
pub fn validate_timings(timings: &[SectionTiming]) -> AssemblyResult<()> {
    let mut previous: Option<&SectionTiming> = None;

    for timing in timings {
        if !(timing.duration_seconds.is_finite() && timing.duration_seconds > 0.0) {
            return Err(invalid(format!(
                "section {} has non-positive duration {}",
                timing.index, timing.duration_seconds
            )));
        }
        if let Some(prev) = previous {
            if timing.start_seconds <= prev.start_seconds {
                return Err(invalid(format!(
                    "section {} starts at {:.3}s, not after section {} at {:.3}s",
                    timing.index, timing.start_seconds, prev.index, prev.start_seconds
                )));
            }
            // allow float accumulation noise
            if timing.start_seconds + 1e-6 < prev.end_seconds() {
                return Err(invalid(format!(
                    "section {} overlaps section {}",
                    timing.index, prev.index
                )));
            }
        }
        previous = Some(timing);
    }

    Ok(())
}

fn invalid(reason: String) -> AssemblyError {
    AssemblyError::Assembly {
        asset: "timeline".to_string(),
        reason,
    }
}

/// Laid-out total minus probed duration of the encoded episode
pub fn drift_seconds(laid_out_seconds: f64, probed_seconds: f64) -> f64 {
    laid_out_seconds - probed_seconds
}
