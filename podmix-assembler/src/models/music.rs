//! Music segments: intro, transitions, outro
//!
//! Music is optional. Every lookup yields an explicit [`MusicAsset`], either
//! `Present` with a prepared asset or `Absent` with the reason it was omitted.

use crate::models::AudioAsset;
use serde::{Deserialize, Serialize};

/// Logical music slot in the episode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MusicKey {
    Intro,
    Outro,
    /// Transition before section `n` (1-based, so the first transition is 1)
    Transition(usize),
}

impl MusicKey {
    /// Store keys to try, most specific first
    pub fn lookup_keys(&self) -> Vec<String> {
        match self {
            MusicKey::Intro => vec!["intro".to_string()],
            MusicKey::Outro => vec!["outro".to_string()],
            MusicKey::Transition(n) => vec![format!("transition-{}", n), "transition".to_string()],
        }
    }

    pub fn label(&self) -> String {
        match self {
            MusicKey::Intro => "intro".to_string(),
            MusicKey::Outro => "outro".to_string(),
            MusicKey::Transition(n) => format!("transition-{}", n),
        }
    }
}

impl std::fmt::Display for MusicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}

/// Outcome of preparing one music slot
#[derive(Debug, Clone, PartialEq)]
pub enum MusicAsset {
    Present { key: MusicKey, asset: AudioAsset },
    Absent { key: MusicKey, reason: String },
}

impl MusicAsset {
    pub fn key(&self) -> MusicKey {
        match self {
            MusicAsset::Present { key, .. } | MusicAsset::Absent { key, .. } => *key,
        }
    }

    pub fn asset(&self) -> Option<&AudioAsset> {
        match self {
            MusicAsset::Present { asset, .. } => Some(asset),
            MusicAsset::Absent { .. } => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, MusicAsset::Present { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_falls_back_to_generic_key() {
        assert_eq!(
            MusicKey::Transition(2).lookup_keys(),
            vec!["transition-2".to_string(), "transition".to_string()]
        );
        assert_eq!(MusicKey::Intro.lookup_keys(), vec!["intro".to_string()]);
    }

    #[test]
    fn test_absent_has_no_asset() {
        let absent = MusicAsset::Absent {
            key: MusicKey::Outro,
            reason: "not found".to_string(),
        };
        assert!(absent.asset().is_none());
        assert!(!absent.is_present());
        assert_eq!(absent.key(), MusicKey::Outro);
    }
}
