//! Scripted in-process AudioTool
//!
//! "Audio" files are small JSON documents describing format, duration,
//! loudness and an ordered list of labels. Every operation reads and writes
//! real files so scratch handling is exercised exactly as with ffmpeg.

use async_trait::async_trait;
use podmix_assembler::models::{
    AudioAsset, AudioFormat, LoudnessMeasurement, NormalizationLevel, NormalizationTarget,
};
use podmix_assembler::tool::{
    concat_list, AudioTool, FadeSpec, MixSpec, OutputEncoding, ProbeInfo, ToolError, ToolResult,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Content of a fake audio file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FakeAudio {
    pub codec: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub duration: f64,
    pub lufs: f64,
    pub true_peak: f64,
    pub labels: Vec<String>,
}

impl FakeAudio {
    /// Mono 24 kHz mp3, the shape TTS chunks usually arrive in
    pub fn speech(label: &str, lufs: f64, duration: f64) -> Self {
        Self {
            codec: "mp3".to_string(),
            sample_rate: 24000,
            channels: 1,
            duration,
            lufs,
            true_peak: lufs + 10.0,
            labels: vec![label.to_string()],
        }
    }

    /// Stereo 44.1 kHz music
    pub fn music(label: &str, lufs: f64, duration: f64) -> Self {
        Self {
            codec: "mp3".to_string(),
            sample_rate: 44100,
            channels: 2,
            duration,
            lufs,
            true_peak: lufs + 12.0,
            labels: vec![label.to_string()],
        }
    }

    pub fn format(&self) -> AudioFormat {
        AudioFormat::new(self.codec.clone(), self.sample_rate, self.channels)
    }

    pub fn bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap()
    }

    pub async fn write(&self, path: &Path) {
        tokio::fs::write(path, self.bytes()).await.unwrap();
    }

    pub async fn read(path: &Path) -> FakeAudio {
        let bytes = tokio::fs::read(path).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }
}

/// Write a speech chunk into `dir` and describe it as an input asset
pub async fn speech_chunk(dir: &Path, label: &str, lufs: f64, duration: f64) -> AudioAsset {
    let audio = FakeAudio::speech(label, lufs, duration);
    let path = dir.join(format!("{label}.mp3"));
    audio.write(&path).await;
    AudioAsset::new(label, path, duration, audio.format())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Probe,
    Measure,
    NormalizeTwoPass,
    NormalizeSinglePass,
    Concat,
    Fade,
    Trim,
    Mix,
}

/// One recorded invocation
#[derive(Debug, Clone)]
pub struct Call {
    pub op: Op,
    pub level: Option<NormalizationLevel>,
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    /// Loudness written to the output, for operations that produce audio
    pub output_lufs: Option<f64>,
}

struct Fault {
    op: Op,
    level: Option<NormalizationLevel>,
    nth: usize,
    seen: usize,
}

pub struct FakeTool {
    faults: Mutex<Vec<Fault>>,
    hang_on: Mutex<Option<Op>>,
    measure_delay: Mutex<Option<fn(&FakeAudio) -> Duration>>,
    calls: Mutex<Vec<Call>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl Default for FakeTool {
    fn default() -> Self {
        Self::new()
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn codec_name(encoder: &str) -> String {
    match encoder {
        "libmp3lame" => "mp3".to_string(),
        "libopus" => "opus".to_string(),
        "libfdk_aac" => "aac".to_string(),
        other => other.to_string(),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

impl FakeTool {
    pub fn new() -> Self {
        Self {
            faults: Mutex::new(Vec::new()),
            hang_on: Mutex::new(None),
            measure_delay: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Fail the `nth` (1-based) call of `op`, optionally only at `level`
    pub fn fail_on(self, op: Op, level: Option<NormalizationLevel>, nth: usize) -> Self {
        self.faults.lock().unwrap().push(Fault {
            op,
            level,
            nth,
            seen: 0,
        });
        self
    }

    /// Block every call of `op` until the run is cancelled
    pub fn hang_on(self, op: Op) -> Self {
        *self.hang_on.lock().unwrap() = Some(op);
        self
    }

    pub fn with_measure_delay(self, delay: fn(&FakeAudio) -> Duration) -> Self {
        *self.measure_delay.lock().unwrap() = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_of(&self, op: Op, level: Option<NormalizationLevel>) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.op == op && (level.is_none() || c.level == level))
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(
        &self,
        op: Op,
        level: Option<NormalizationLevel>,
        cancel: &CancellationToken,
    ) -> ToolResult<InFlight<'_>> {
        if cancel.is_cancelled() {
            return Err(ToolError::Cancelled);
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);

        let should_fail = {
            let mut faults = self.faults.lock().unwrap();
            let mut fail = false;
            for fault in faults.iter_mut() {
                if fault.op == op && (fault.level.is_none() || fault.level == level) {
                    fault.seen += 1;
                    if fault.seen == fault.nth {
                        fail = true;
                    }
                }
            }
            fail
        };
        if should_fail {
            return Err(ToolError::Failed {
                program: "fake".to_string(),
                code: 1,
                stderr: format!("injected {:?} failure", op),
            });
        }

        let hang = *self.hang_on.lock().unwrap() == Some(op);
        if hang {
            cancel.cancelled().await;
            return Err(ToolError::Cancelled);
        }

        Ok(guard)
    }

    fn record(
        &self,
        op: Op,
        level: Option<NormalizationLevel>,
        input: &Path,
        output: Option<&Path>,
        output_lufs: Option<f64>,
    ) {
        self.calls.lock().unwrap().push(Call {
            op,
            level,
            input: input.to_path_buf(),
            output: output.map(Path::to_path_buf),
            output_lufs,
        });
    }

    async fn load(path: &Path) -> ToolResult<FakeAudio> {
        let bytes = tokio::fs::read(path).await?;
        serde_json::from_slice(&bytes)
            .map_err(|e| ToolError::Parse(format!("{}: {}", path.display(), e)))
    }

    // Synchronous so a dropped worker cannot finish writing after cleanup
    async fn store(path: &Path, audio: &FakeAudio) -> ToolResult<()> {
        std::fs::write(path, audio.bytes())?;
        Ok(())
    }

    fn encode(mut audio: FakeAudio, encoding: &OutputEncoding) -> FakeAudio {
        audio.codec = codec_name(&encoding.codec);
        audio.sample_rate = encoding.sample_rate;
        audio.channels = encoding.channels;
        audio
    }

    fn correct(mut audio: FakeAudio, target: &NormalizationTarget) -> FakeAudio {
        let gain = target.lufs - audio.lufs;
        audio.lufs = target.lufs;
        audio.true_peak = round2((audio.true_peak + gain).min(target.max_true_peak_db));
        audio
    }
}

#[async_trait]
impl AudioTool for FakeTool {
    fn name(&self) -> &str {
        "fake"
    }

    async fn probe(&self, path: &Path, cancel: &CancellationToken) -> ToolResult<ProbeInfo> {
        let _guard = self.enter(Op::Probe, None, cancel).await?;
        let audio = Self::load(path).await?;
        self.record(Op::Probe, None, path, None, None);
        Ok(ProbeInfo {
            duration_seconds: audio.duration,
            format: audio.format(),
        })
    }

    async fn measure_loudness(
        &self,
        path: &Path,
        target: &NormalizationTarget,
        cancel: &CancellationToken,
    ) -> ToolResult<LoudnessMeasurement> {
        let _guard = self.enter(Op::Measure, Some(target.level), cancel).await?;
        let audio = Self::load(path).await?;

        let delay = *self.measure_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ToolError::Cancelled),
                _ = tokio::time::sleep(delay(&audio)) => {}
            }
        }

        self.record(Op::Measure, Some(target.level), path, None, None);
        Ok(LoudnessMeasurement {
            integrated_lufs: audio.lufs,
            true_peak_db: audio.true_peak,
            loudness_range_lu: 5.0,
            threshold_lufs: audio.lufs - 10.0,
            target_offset_lu: 0.0,
        })
    }

    async fn normalize_two_pass(
        &self,
        input: &Path,
        output: &Path,
        target: &NormalizationTarget,
        _measured: &LoudnessMeasurement,
        encoding: &OutputEncoding,
        cancel: &CancellationToken,
    ) -> ToolResult<()> {
        let _guard = self
            .enter(Op::NormalizeTwoPass, Some(target.level), cancel)
            .await?;
        let audio = Self::encode(Self::correct(Self::load(input).await?, target), encoding);
        Self::store(output, &audio).await?;
        self.record(
            Op::NormalizeTwoPass,
            Some(target.level),
            input,
            Some(output),
            Some(audio.lufs),
        );
        Ok(())
    }

    async fn normalize_single_pass(
        &self,
        input: &Path,
        output: &Path,
        target: &NormalizationTarget,
        encoding: &OutputEncoding,
        cancel: &CancellationToken,
    ) -> ToolResult<()> {
        let _guard = self
            .enter(Op::NormalizeSinglePass, Some(target.level), cancel)
            .await?;
        let audio = Self::encode(Self::correct(Self::load(input).await?, target), encoding);
        Self::store(output, &audio).await?;
        self.record(
            Op::NormalizeSinglePass,
            Some(target.level),
            input,
            Some(output),
            Some(audio.lufs),
        );
        Ok(())
    }

    async fn concat(
        &self,
        inputs: &[PathBuf],
        list_path: &Path,
        output: &Path,
        cancel: &CancellationToken,
    ) -> ToolResult<()> {
        let _guard = self.enter(Op::Concat, None, cancel).await?;
        std::fs::write(list_path, concat_list(inputs))?;

        let mut parts = Vec::with_capacity(inputs.len());
        for input in inputs {
            parts.push(Self::load(input).await?);
        }
        let first = parts
            .first()
            .cloned()
            .ok_or_else(|| ToolError::Parse("empty concat list".to_string()))?;
        // Stream copy cannot join different codecs
        if let Some(odd) = parts.iter().find(|p| p.codec != first.codec) {
            return Err(ToolError::Failed {
                program: "ffmpeg".to_string(),
                code: 1,
                stderr: format!("concat codec mismatch: {} vs {}", first.codec, odd.codec),
            });
        }

        let duration: f64 = parts.iter().map(|p| p.duration).sum();
        let energy: f64 = parts
            .iter()
            .map(|p| p.duration * 10f64.powf(p.lufs / 10.0))
            .sum();
        let joined = FakeAudio {
            duration,
            lufs: round2(10.0 * (energy / duration).log10()),
            true_peak: parts
                .iter()
                .map(|p| p.true_peak)
                .fold(f64::NEG_INFINITY, f64::max),
            labels: parts.iter().flat_map(|p| p.labels.clone()).collect(),
            ..first
        };

        Self::store(output, &joined).await?;
        self.record(
            Op::Concat,
            None,
            list_path,
            Some(output),
            Some(joined.lufs),
        );
        Ok(())
    }

    async fn fade(
        &self,
        input: &Path,
        output: &Path,
        _fade: &FadeSpec,
        encoding: &OutputEncoding,
        cancel: &CancellationToken,
    ) -> ToolResult<()> {
        let _guard = self.enter(Op::Fade, None, cancel).await?;
        let audio = Self::encode(Self::load(input).await?, encoding);
        Self::store(output, &audio).await?;
        self.record(Op::Fade, None, input, Some(output), Some(audio.lufs));
        Ok(())
    }

    async fn trim(
        &self,
        input: &Path,
        output: &Path,
        seconds: f64,
        encoding: &OutputEncoding,
        cancel: &CancellationToken,
    ) -> ToolResult<()> {
        let _guard = self.enter(Op::Trim, None, cancel).await?;
        let mut audio = Self::encode(Self::load(input).await?, encoding);
        audio.duration = audio.duration.min(seconds);
        Self::store(output, &audio).await?;
        self.record(Op::Trim, None, input, Some(output), Some(audio.lufs));
        Ok(())
    }

    async fn mix(
        &self,
        voice: &Path,
        bed: &Path,
        output: &Path,
        _mix: &MixSpec,
        encoding: &OutputEncoding,
        cancel: &CancellationToken,
    ) -> ToolResult<()> {
        let _guard = self.enter(Op::Mix, None, cancel).await?;
        let voice_audio = Self::load(voice).await?;
        let bed_audio = Self::load(bed).await?;

        let mut labels = vec![format!("mix({})", bed_audio.labels.join(","))];
        labels.extend(voice_audio.labels.clone());
        let mixed = Self::encode(
            FakeAudio {
                labels,
                ..voice_audio
            },
            encoding,
        );

        Self::store(output, &mixed).await?;
        self.record(Op::Mix, None, voice, Some(output), Some(mixed.lufs));
        Ok(())
    }
}
