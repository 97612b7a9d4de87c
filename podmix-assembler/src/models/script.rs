//! Episode request input: rendered speech chunks grouped into sections

use crate::models::AudioAsset;
use serde::{Deserialize, Serialize};

/// Structural role of a section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SectionType {
    Intro,
    #[default]
    Topic,
    Synthesis,
}

/// Section metadata carried through to the timing map
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SectionInfo {
    pub section_type: SectionType,
    pub title: Option<String>,
}

/// One script section with its rendered chunks, in playback order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptSection {
    pub section_type: SectionType,
    pub title: Option<String>,
    pub chunks: Vec<AudioAsset>,
}

impl ScriptSection {
    pub fn info(&self) -> SectionInfo {
        SectionInfo {
            section_type: self.section_type,
            title: self.title.clone(),
        }
    }
}

/// Everything the assembler needs for one run
///
/// Chunks are held as one flat sequence; `boundaries` are cut indices into it.
#[derive(Debug, Clone, PartialEq)]
pub struct EpisodeRequest {
    pub chunks: Vec<AudioAsset>,
    pub boundaries: Vec<usize>,
    pub sections: Vec<SectionInfo>,
}

impl EpisodeRequest {
    /// Build from ordered script sections
    ///
    /// Cut indices are the running chunk totals between sections.
    pub fn from_sections(sections: Vec<ScriptSection>) -> Self {
        let mut chunks = Vec::new();
        let mut boundaries = Vec::new();
        let mut infos = Vec::with_capacity(sections.len());

        for (index, section) in sections.into_iter().enumerate() {
            if index > 0 {
                boundaries.push(chunks.len());
            }
            infos.push(section.info());
            chunks.extend(section.chunks);
        }

        Self {
            chunks,
            boundaries,
            sections: infos,
        }
    }

    /// Build from a flat chunk list and caller-supplied cut indices
    ///
    /// Sections are untitled topics; use [`EpisodeRequest::with_section_info`]
    /// to describe them.
    pub fn from_flat(chunks: Vec<AudioAsset>, boundaries: Vec<usize>) -> Self {
        let sections = vec![SectionInfo::default(); boundaries.len() + 1];
        Self {
            chunks,
            boundaries,
            sections,
        }
    }

    pub fn with_section_info(mut self, sections: Vec<SectionInfo>) -> Self {
        self.sections = sections;
        self
    }
}
