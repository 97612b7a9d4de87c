//! Shared test utilities

#![allow(dead_code)]

pub mod fake_tool;
pub mod log_capture;

use fake_tool::FakeTool;
use podmix_assembler::services::{EpisodeAssembler, MusicStore};
use podmix_assembler::AssemblyConfig;
use podmix_common::events::EventBus;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Defaults with a small worker pool
pub fn test_config() -> AssemblyConfig {
    AssemblyConfig {
        max_concurrency: 2,
        tool_timeout_seconds: 10,
        ..Default::default()
    }
}

pub fn assembler(
    tool: Arc<FakeTool>,
    config: AssemblyConfig,
    music: Arc<dyn MusicStore>,
    scratch_root: &Path,
) -> EpisodeAssembler {
    EpisodeAssembler::new(tool, config, music, scratch_root, EventBus::new(1024))
}

/// Every file or directory under `root` whose name mentions `run_id`
pub fn leftovers(root: &Path, run_id: Uuid) -> Vec<PathBuf> {
    let needle = run_id.to_string();
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.to_string_lossy().contains(&needle) {
                found.push(path.clone());
            }
            if path.is_dir() {
                pending.push(path);
            }
        }
    }

    found
}
