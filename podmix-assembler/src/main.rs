//! podmix-assembler - command-line driver
//!
//! Assembles one episode from a JSON manifest of rendered speech chunks and
//! prints the resulting section timing map as JSON.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use podmix_assembler::models::{AudioAsset, EpisodeRequest, ScriptSection, SectionTiming, SectionType};
use podmix_assembler::services::{store_for, EpisodeAssembler};
use podmix_assembler::tool::{AudioTool, FfmpegTool};
use podmix_assembler::AssemblyConfig;
use podmix_common::config::{
    default_config_path, load_toml_config, resolve_music_dir, resolve_scratch_root, TomlConfig,
};
use podmix_common::events::EventBus;
use serde::{Deserialize, Serialize};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Command-line arguments for podmix-assembler
#[derive(Parser, Debug)]
#[command(name = "podmix-assembler")]
#[command(about = "Assemble a loudness-normalized podcast episode from speech chunks")]
#[command(version)]
struct Args {
    /// JSON manifest describing sections and their chunk files
    #[arg(short, long)]
    manifest: PathBuf,

    /// Where to write the finished episode
    #[arg(short, long)]
    output: PathBuf,

    /// TOML config file (defaults to the per-user config location)
    #[arg(short, long, env = "PODMIX_CONFIG")]
    config: Option<PathBuf>,

    /// Scratch folder for intermediate files
    #[arg(long)]
    scratch_root: Option<PathBuf>,

    /// Folder holding intro / transition / outro music
    #[arg(long)]
    music_dir: Option<PathBuf>,

    /// Run id (random when omitted)
    #[arg(long)]
    run_id: Option<Uuid>,
}

/// Manifest file layout
#[derive(Debug, Deserialize)]
struct Manifest {
    sections: Vec<ManifestSection>,
}

#[derive(Debug, Deserialize)]
struct ManifestSection {
    #[serde(default, rename = "type")]
    section_type: SectionType,
    #[serde(default)]
    title: Option<String>,
    /// Chunk files, relative paths resolved against the manifest's folder
    chunks: Vec<PathBuf>,
}

/// Printed on success
#[derive(Debug, Serialize)]
struct Summary<'a> {
    run_id: Uuid,
    output: &'a Path,
    duration_seconds: f64,
    file_size_bytes: u64,
    music_segments_used: usize,
    integrated_lufs: Option<f64>,
    sections: &'a [SectionTiming],
    chapters: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(default_config_path);
    let toml_config = match &config_path {
        Some(path) => load_toml_config(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => TomlConfig::default(),
    };

    init_tracing(&toml_config)?;

    let config = AssemblyConfig::from_toml_table(&toml_config.assembly)
        .context("Invalid [assembly] configuration")?;
    let scratch_root = resolve_scratch_root(args.scratch_root.as_deref(), Some(&toml_config));
    let music_dir = resolve_music_dir(args.music_dir.as_deref(), Some(&toml_config));

    info!(
        scratch_root = %scratch_root.display(),
        music_dir = ?music_dir,
        target_lufs = config.base_target_lufs,
        "Starting podmix assembler"
    );

    let tool: Arc<dyn AudioTool> = Arc::new(
        FfmpegTool::from_config(&config)
            .await
            .context("Audio tool unavailable")?,
    );

    let cancel = CancellationToken::new();
    let request = load_manifest(&args.manifest, tool.as_ref(), &cancel).await?;

    let assembler = EpisodeAssembler::new(
        tool,
        config,
        store_for(music_dir.as_deref()),
        scratch_root,
        EventBus::default(),
    );

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    let run_id = args.run_id.unwrap_or_else(Uuid::new_v4);
    let episode = assembler
        .assemble_with_run_id(run_id, &request, &args.output, &cancel)
        .await
        .context("Episode assembly failed")?;

    let summary = Summary {
        run_id: episode.run_id,
        output: &episode.asset.path,
        duration_seconds: episode.duration_seconds,
        file_size_bytes: episode.file_size_bytes,
        music_segments_used: episode.music_segments_used,
        integrated_lufs: episode.final_loudness.map(|l| l.integrated_lufs),
        sections: &episode.sections,
        chapters: episode.chapter_lines(),
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}

/// `RUST_LOG` wins; otherwise the configured level for podmix crates
fn init_tracing(config: &TomlConfig) -> Result<()> {
    let level = &config.logging.level;
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("podmix_assembler={level},podmix_common={level}").into()
    });

    let file_layer = match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

/// Read the manifest and probe every chunk
async fn load_manifest(
    path: &Path,
    tool: &dyn AudioTool,
    cancel: &CancellationToken,
) -> Result<EpisodeRequest> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    let manifest: Manifest = serde_json::from_str(&text)
        .with_context(|| format!("Invalid manifest {}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));

    let mut sections = Vec::with_capacity(manifest.sections.len());
    for section in manifest.sections {
        let mut chunks = Vec::with_capacity(section.chunks.len());
        for chunk in section.chunks {
            let chunk_path = if chunk.is_absolute() {
                chunk
            } else {
                base.join(chunk)
            };
            let info = tool
                .probe(&chunk_path, cancel)
                .await
                .with_context(|| format!("Failed to probe chunk {}", chunk_path.display()))?;
            chunks.push(AudioAsset::new(
                podmix_assembler::models::id_from_path(&chunk_path),
                chunk_path,
                info.duration_seconds,
                info.format,
            ));
        }
        sections.push(ScriptSection {
            section_type: section.section_type,
            title: section.title,
            chunks,
        });
    }

    Ok(EpisodeRequest::from_sections(sections))
}

/// Ctrl-C / SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, cancelling run");
        },
        _ = terminate => {
            info!("Received terminate signal, cancelling run");
        },
    }
}
