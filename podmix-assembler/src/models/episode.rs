//! Assembly plan and assembled episode

use crate::models::{AudioAsset, LoudnessMeasurement, MusicAsset, MusicKey, SectionType};
use podmix_common::human_time::format_chapter_time;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How transition music joins two sections
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransitionStyle {
    /// Transition plays on its own between sections
    #[default]
    HardCut,
    /// Transition plays as a ducked bed under the start of the next section
    Duck,
}

/// Where one section sits in the finished episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionTiming {
    pub index: usize,
    pub section_type: SectionType,
    pub title: Option<String>,
    pub start_seconds: f64,
    pub duration_seconds: f64,
}

impl SectionTiming {
    pub fn end_seconds(&self) -> f64 {
        self.start_seconds + self.duration_seconds
    }

    /// Chapter marker for show notes (`MM:SS` / `H:MM:SS`)
    pub fn start_label(&self) -> String {
        format_chapter_time(self.start_seconds)
    }
}

/// One entry of the ordered episode layout
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedSegment {
    Music { key: MusicKey, asset: AudioAsset },
    Section { index: usize, asset: AudioAsset },
    /// Section with transition music mixed under its start
    DuckedSection {
        index: usize,
        voice: AudioAsset,
        key: MusicKey,
        bed: AudioAsset,
    },
}

/// Normalized sections plus whatever music could be prepared
#[derive(Debug, Clone)]
pub struct AssemblyPlan {
    pub sections: Vec<AudioAsset>,
    pub intro: MusicAsset,
    /// One slot per gap between sections (`sections.len() - 1` entries)
    pub transitions: Vec<MusicAsset>,
    pub outro: MusicAsset,
    pub intro_fade_in_seconds: f64,
    pub outro_fade_out_seconds: f64,
    pub transition_seconds: f64,
    pub transition_style: TransitionStyle,
}

impl AssemblyPlan {
    /// Ordered layout: `[intro], section[0], ([transition], section[i])*, [outro]`
    ///
    /// Absent music slots are omitted.
    pub fn segments(&self) -> Vec<PlannedSegment> {
        let mut segments = Vec::with_capacity(self.sections.len() * 2 + 2);

        if let MusicAsset::Present { key, asset } = &self.intro {
            segments.push(PlannedSegment::Music {
                key: *key,
                asset: asset.clone(),
            });
        }

        for (index, section) in self.sections.iter().enumerate() {
            let transition = if index > 0 {
                self.transitions.get(index - 1)
            } else {
                None
            };

            match (transition, self.transition_style) {
                (Some(MusicAsset::Present { key, asset }), TransitionStyle::HardCut) => {
                    segments.push(PlannedSegment::Music {
                        key: *key,
                        asset: asset.clone(),
                    });
                    segments.push(PlannedSegment::Section {
                        index,
                        asset: section.clone(),
                    });
                }
                (Some(MusicAsset::Present { key, asset }), TransitionStyle::Duck) => {
                    segments.push(PlannedSegment::DuckedSection {
                        index,
                        voice: section.clone(),
                        key: *key,
                        bed: asset.clone(),
                    });
                }
                _ => segments.push(PlannedSegment::Section {
                    index,
                    asset: section.clone(),
                }),
            }
        }

        if let MusicAsset::Present { key, asset } = &self.outro {
            segments.push(PlannedSegment::Music {
                key: *key,
                asset: asset.clone(),
            });
        }

        segments
    }

    /// Music slots that will actually be heard
    pub fn music_segments_used(&self) -> usize {
        let gaps = self.sections.len().saturating_sub(1);
        usize::from(self.intro.is_present())
            + usize::from(self.outro.is_present())
            + self
                .transitions
                .iter()
                .take(gaps)
                .filter(|t| t.is_present())
                .count()
    }
}

/// Output of a successful run
#[derive(Debug, Clone)]
pub struct AssembledEpisode {
    pub run_id: Uuid,
    /// Final episode, at the caller's output path
    pub asset: AudioAsset,
    pub duration_seconds: f64,
    pub file_size_bytes: u64,
    pub sections: Vec<SectionTiming>,
    pub music_segments_used: usize,
    /// Loudness of the delivered file, when output verification is enabled
    pub final_loudness: Option<LoudnessMeasurement>,
    /// Normalization passes skipped because the input was already within tolerance
    pub skipped_normalizations: usize,
}

impl AssembledEpisode {
    /// Final episode bytes
    pub async fn read_bytes(&self) -> std::io::Result<Vec<u8>> {
        tokio::fs::read(&self.asset.path).await
    }

    /// Chapter lines for show notes, e.g. `03:12 Rust news`
    pub fn chapter_lines(&self) -> Vec<String> {
        self.sections
            .iter()
            .map(|s| {
                let title = s.title.clone().unwrap_or_else(|| match s.section_type {
                    SectionType::Intro => "Intro".to_string(),
                    SectionType::Topic => format!("Part {}", s.index + 1),
                    SectionType::Synthesis => "Wrap-up".to_string(),
                });
                format!("{} {}", s.start_label(), title)
            })
            .collect()
    }
}
