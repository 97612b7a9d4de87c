//! Failure, cancellation and scratch cleanup

mod helpers;

use helpers::fake_tool::{speech_chunk, FakeTool, Op};
use helpers::{assembler, leftovers, test_config};
use podmix_assembler::models::{AssemblyState, EpisodeRequest, NormalizationLevel};
use podmix_assembler::services::NoMusic;
use podmix_assembler::AssemblyError;
use podmix_common::events::AssemblyEvent;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct Fixture {
    _inputs: TempDir,
    scratch: TempDir,
    out: TempDir,
    request: EpisodeRequest,
    inputs: Vec<PathBuf>,
}

impl Fixture {
    /// Two sections of two chunks each, all needing correction
    async fn new() -> Self {
        let inputs = TempDir::new().unwrap();
        let mut chunks = Vec::new();
        for i in 0..4 {
            chunks.push(speech_chunk(inputs.path(), &format!("c{i}"), -20.0, 2.0).await);
        }
        let paths = chunks.iter().map(|c| c.path.clone()).collect();

        Self {
            _inputs: inputs,
            scratch: TempDir::new().unwrap(),
            out: TempDir::new().unwrap(),
            request: EpisodeRequest::from_flat(chunks, vec![2]),
            inputs: paths,
        }
    }

    fn output(&self) -> PathBuf {
        self.out.path().join("episode.mp3")
    }

    /// Run with `tool`, expect failure, and check nothing was left behind
    async fn expect_failure(&self, tool: FakeTool, stage: AssemblyState) -> AssemblyError {
        let assembler = assembler(
            Arc::new(tool),
            test_config(),
            Arc::new(NoMusic),
            self.scratch.path(),
        );
        let mut rx = assembler.event_bus().subscribe();
        let run_id = Uuid::new_v4();

        let err = assembler
            .assemble_with_run_id(run_id, &self.request, &self.output(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), Some(stage), "unexpected error: {err}");
        assert!(
            leftovers(self.scratch.path(), run_id).is_empty(),
            "scratch not cleaned: {:?}",
            leftovers(self.scratch.path(), run_id)
        );
        assert!(!self.output().exists());
        assert!(self.inputs.iter().all(|p| p.exists()));

        let mut saw_failed_state = false;
        let mut saw_cleanup = false;
        let mut failed_stage = None;
        while let Ok(event) = rx.try_recv() {
            match event {
                AssemblyEvent::StateChanged {
                    new_state: AssemblyState::Failed,
                    ..
                } => saw_failed_state = true,
                AssemblyEvent::CleanupCompleted { .. } => saw_cleanup = true,
                AssemblyEvent::RunFailed { stage, .. } => failed_stage = Some(stage),
                AssemblyEvent::RunCompleted { .. } => panic!("failed run reported completion"),
                _ => {}
            }
        }
        assert!(saw_failed_state);
        assert!(saw_cleanup);
        assert_eq!(failed_stage, Some(stage));

        err
    }
}

#[tokio::test]
async fn test_failure_while_measuring_chunks() {
    let fixture = Fixture::new().await;
    let err = fixture
        .expect_failure(
            FakeTool::new().fail_on(Op::Measure, Some(NormalizationLevel::Chunk), 1),
            AssemblyState::MeasuringChunks,
        )
        .await;
    assert!(matches!(err.root_cause(), AssemblyError::Measurement { .. }));
}

#[tokio::test]
async fn test_failure_while_normalizing_chunks() {
    let fixture = Fixture::new().await;
    let err = fixture
        .expect_failure(
            FakeTool::new().fail_on(Op::NormalizeTwoPass, Some(NormalizationLevel::Chunk), 1),
            AssemblyState::NormalizingChunks,
        )
        .await;
    assert!(matches!(err.root_cause(), AssemblyError::Normalization { .. }));
}

#[tokio::test]
async fn test_failure_while_concatenating_sections() {
    let fixture = Fixture::new().await;
    let err = fixture
        .expect_failure(
            FakeTool::new().fail_on(Op::Concat, None, 1),
            AssemblyState::ConcatenatingSections,
        )
        .await;
    assert!(matches!(err.root_cause(), AssemblyError::Concatenation { .. }));
}

#[tokio::test]
async fn test_failure_while_normalizing_sections() {
    let fixture = Fixture::new().await;
    let err = fixture
        .expect_failure(
            FakeTool::new().fail_on(Op::Measure, Some(NormalizationLevel::Section), 1),
            AssemblyState::NormalizingSections,
        )
        .await;
    assert!(matches!(err.root_cause(), AssemblyError::Measurement { .. }));
}

#[tokio::test]
async fn test_failure_while_assembling_episode() {
    let fixture = Fixture::new().await;
    // Calls 1 and 2 build the sections
    let err = fixture
        .expect_failure(
            FakeTool::new().fail_on(Op::Concat, None, 3),
            AssemblyState::AssemblingEpisode,
        )
        .await;
    assert!(matches!(err.root_cause(), AssemblyError::Concatenation { .. }));
}

#[tokio::test]
async fn test_failure_while_normalizing_episode() {
    let fixture = Fixture::new().await;
    let err = fixture
        .expect_failure(
            FakeTool::new().fail_on(Op::NormalizeTwoPass, Some(NormalizationLevel::Episode), 1),
            AssemblyState::NormalizingEpisode,
        )
        .await;
    assert!(matches!(err.root_cause(), AssemblyError::Normalization { .. }));
}

#[tokio::test]
async fn test_cancellation_stops_run_and_cleans_up() {
    let fixture = Fixture::new().await;
    let tool = Arc::new(FakeTool::new().hang_on(Op::Concat));
    let assembler = assembler(tool.clone(), test_config(), Arc::new(NoMusic), fixture.scratch.path());
    let run_id = Uuid::new_v4();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        assembler.assemble_with_run_id(run_id, &fixture.request, &fixture.output(), &cancel),
    )
    .await
    .expect("cancelled run did not stop")
    .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(err.stage(), Some(AssemblyState::ConcatenatingSections));
    assert!(leftovers(fixture.scratch.path(), run_id).is_empty());
    assert!(!fixture.output().exists());
    // Nothing past the hung step was attempted
    assert!(tool
        .calls_of(Op::NormalizeTwoPass, Some(NormalizationLevel::Section))
        .is_empty());
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let fixture = Fixture::new().await;
    let tool = Arc::new(FakeTool::new());
    let assembler = assembler(tool.clone(), test_config(), Arc::new(NoMusic), fixture.scratch.path());
    let run_id = Uuid::new_v4();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = assembler
        .assemble_with_run_id(run_id, &fixture.request, &fixture.output(), &cancel)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(err.stage(), Some(AssemblyState::Idle));
    assert!(tool.calls().is_empty());
    assert!(leftovers(fixture.scratch.path(), run_id).is_empty());
}

#[tokio::test]
async fn test_invalid_boundaries_rejected_before_scratch() {
    let fixture = Fixture::new().await;
    let tool = Arc::new(FakeTool::new());
    let assembler = assembler(tool.clone(), test_config(), Arc::new(NoMusic), fixture.scratch.path());
    let request = EpisodeRequest::from_flat(fixture.request.chunks.clone(), vec![3, 3]);

    let err = assembler
        .assemble(&request, &fixture.output(), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, AssemblyError::InvalidBoundaries(_)));
    assert_eq!(err.stage(), None);
    assert!(tool.calls().is_empty());
    assert_eq!(std::fs::read_dir(fixture.scratch.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_empty_request_rejected() {
    let fixture = Fixture::new().await;
    let assembler = assembler(
        Arc::new(FakeTool::new()),
        test_config(),
        Arc::new(NoMusic),
        fixture.scratch.path(),
    );

    let err = assembler
        .assemble(
            &EpisodeRequest::from_flat(Vec::new(), Vec::new()),
            &fixture.output(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, AssemblyError::InvalidRequest(_)));
}
