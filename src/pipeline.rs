//! Pipeline orchestration
//!
//! `PipelineOrchestrator` drives one run through
//! Capturing → Parsing → Resolving → Clicking → Done, or into
//! `Failed(kind)` at the first stage that fails. Stages run one after the
//! other on the caller's task. Only capture, resolution and the tap wait
//! suspend; parsing and coordinate lookup are synchronous.
//!
//! The state lives in a `watch` channel that only the orchestrator writes.
//! A run starts with an atomic Idle check, so a trigger that arrives while
//! a run is in flight (or while Done/Failed is still showing) does
//! nothing. After Done or Failed a background task waits for the reset
//! delay and returns the state to Idle.

use crate::capture::{self, TextCapture};
use crate::cache::AnswerCache;
use crate::click::{ClickDispatcher, DispatchSession};
use crate::config::{Config, Region, Resolution};
use crate::coords::CoordinateMap;
use crate::error::{DispatchError, McqError};
use crate::parser::QuestionParser;
use crate::question::OptionLetter;
use crate::resolve::{self, AnswerResolver, AnswerSource};
use crate::state::{FailureKind, PipelineState};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;

/// Region, stage timeouts and reset delay for a pipeline
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub region: Region,
    pub resolution: Resolution,
    pub resolve_timeout: Duration,
    pub click_timeout: Duration,
    pub reset_delay: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            region: config.capture.region,
            resolution: config.capture.resolution,
            resolve_timeout: Duration::from_secs(config.pipeline.resolve_timeout_secs),
            click_timeout: Duration::from_millis(config.pipeline.click_timeout_ms),
            reset_delay: Duration::from_millis(config.pipeline.reset_delay_ms),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Result of asking the pipeline to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The pipeline was not idle; nothing happened
    Ignored,

    /// The tap for `letter` completed
    Completed {
        letter: OptionLetter,
        source: AnswerSource,
    },

    /// The run stopped at `kind`
    Failed { kind: FailureKind, reason: String },
}

impl RunOutcome {
    /// State the run ended in, `None` if it never started
    pub fn final_state(&self) -> Option<PipelineState> {
        match self {
            RunOutcome::Ignored => None,
            RunOutcome::Completed { .. } => Some(PipelineState::Done),
            RunOutcome::Failed { kind, .. } => Some(PipelineState::Failed(*kind)),
        }
    }
}

/// Failure inside a run, before it is folded into a `RunOutcome`
struct StageFailure {
    kind: FailureKind,
    reason: String,
}

impl StageFailure {
    fn new(kind: FailureKind, err: impl std::fmt::Display) -> Self {
        Self {
            kind,
            reason: err.to_string(),
        }
    }
}

/// The capture → parse → resolve → click state machine
pub struct PipelineOrchestrator {
    capture: Box<dyn TextCapture>,
    parser: QuestionParser,
    resolver: AnswerResolver,
    coords: RwLock<CoordinateMap>,
    dispatcher: ClickDispatcher,
    settings: PipelineSettings,
    state: Arc<watch::Sender<PipelineState>>,
}

impl PipelineOrchestrator {
    pub fn new(
        capture: Box<dyn TextCapture>,
        resolver: AnswerResolver,
        coords: CoordinateMap,
        dispatcher: ClickDispatcher,
        settings: PipelineSettings,
    ) -> Self {
        let (state, _) = watch::channel(PipelineState::Idle);
        Self {
            capture,
            parser: QuestionParser::new(),
            resolver,
            coords: RwLock::new(coords),
            dispatcher,
            settings,
            state: Arc::new(state),
        }
    }

    /// Build every collaborator from config around an existing session
    pub fn from_config(config: &Config, session: DispatchSession) -> Result<Self, McqError> {
        let cache = Arc::new(AnswerCache::open(&config.resolve_cache_path())?);
        let client = resolve::create_client(config)?;
        let resolver = AnswerResolver::new(
            cache,
            client,
            Duration::from_secs(config.inference.timeout_secs),
        );

        Ok(Self::new(
            capture::create_capture(&config.capture),
            resolver,
            CoordinateMap::from_config(config)?,
            ClickDispatcher::new(session, config.click.duration_ms),
            PipelineSettings::from_config(config),
        ))
    }

    /// Current state
    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    /// Receiver notified on state changes (latest value only)
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    pub fn resolver(&self) -> &AnswerResolver {
        &self.resolver
    }

    pub fn session(&self) -> &DispatchSession {
        self.dispatcher.session()
    }

    /// Replace the letter positions (after recalibration)
    pub fn set_coordinates(&self, coords: CoordinateMap) {
        let mut guard = self.coords.write().unwrap_or_else(|e| e.into_inner());
        *guard = coords;
        tracing::info!("Reloaded tap positions");
    }

    /// Capture, parse, resolve and tap, if the pipeline is idle
    pub async fn trigger(&self) -> RunOutcome {
        if !self.begin(PipelineState::Capturing) {
            tracing::debug!("Trigger ignored, pipeline is {}", self.state());
            return RunOutcome::Ignored;
        }
        tracing::info!("Run started");

        let result = self.run_stages().await;
        self.finish(result)
    }

    /// Tap the position for `letter` without capturing or resolving
    pub async fn direct_click(&self, letter: OptionLetter) -> RunOutcome {
        if !self.begin(PipelineState::Clicking) {
            tracing::debug!("Direct click {} ignored, pipeline is {}", letter, self.state());
            return RunOutcome::Ignored;
        }
        tracing::info!("Direct click {}", letter);

        let result = self
            .click_stage(letter)
            .await
            .map(|()| (letter, AnswerSource::Manual));
        self.finish(result)
    }

    async fn run_stages(&self) -> Result<(OptionLetter, AnswerSource), StageFailure> {
        let raw = self
            .capture
            .extract_text(&self.settings.region, self.settings.resolution)
            .await
            .map_err(|e| StageFailure::new(FailureKind::Capture, e))?;
        tracing::trace!("Captured text: {:?}", raw);

        self.transition(PipelineState::Parsing);
        let question = self
            .parser
            .parse(&raw)
            .map_err(|e| StageFailure::new(FailureKind::Parse, e))?;
        tracing::debug!("Parsed question: {:?} ({})", question.text, question.letter_list());

        self.transition(PipelineState::Resolving);
        let resolution = tokio::time::timeout(
            self.settings.resolve_timeout,
            self.resolver.resolve_detailed(&question),
        )
        .await
        .map_err(|_| {
            StageFailure::new(
                FailureKind::Resolve,
                format!(
                    "Unresolved: no answer within {}ms",
                    self.settings.resolve_timeout.as_millis()
                ),
            )
        })?
        .map_err(|e| StageFailure::new(FailureKind::Resolve, e))?;

        self.transition(PipelineState::Clicking);
        self.click_stage(resolution.letter).await?;

        Ok((resolution.letter, resolution.source))
    }

    async fn click_stage(&self, letter: OptionLetter) -> Result<(), StageFailure> {
        let (x, y) = self
            .coords
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .locate(letter);

        let timeout = self.settings.click_timeout;
        tokio::time::timeout(timeout, self.dispatcher.try_click(x, y))
            .await
            .unwrap_or(Err(DispatchError::Timeout(timeout.as_millis() as u64)))
            .map_err(|e| StageFailure::new(FailureKind::Dispatch, e))
    }

    /// Move Idle → `next` atomically; false if not idle
    fn begin(&self, next: PipelineState) -> bool {
        let started = self.state.send_if_modified(|state| {
            if state.is_idle() {
                *state = next;
                true
            } else {
                false
            }
        });
        if started {
            tracing::debug!("State: Idle -> {}", next);
        }
        started
    }

    fn transition(&self, next: PipelineState) {
        let previous = self.state.send_replace(next);
        tracing::debug!("State: {} -> {}", previous, next);
    }

    fn finish(&self, result: Result<(OptionLetter, AnswerSource), StageFailure>) -> RunOutcome {
        let outcome = match result {
            Ok((letter, source)) => {
                tracing::info!("Run complete: tapped {} ({})", letter, source);
                RunOutcome::Completed { letter, source }
            }
            Err(StageFailure { kind, reason }) => {
                tracing::error!("Run failed at {}: {}", kind, reason);
                RunOutcome::Failed { kind, reason }
            }
        };

        if let Some(terminal) = outcome.final_state() {
            self.transition(terminal);
            self.schedule_reset();
        }
        outcome
    }

    fn schedule_reset(&self) {
        let state = Arc::clone(&self.state);
        let delay = self.settings.reset_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let reset = state.send_if_modified(|s| {
                if s.is_terminal() {
                    *s = PipelineState::Idle;
                    true
                } else {
                    false
                }
            });
            if reset {
                tracing::debug!("State reset to Idle");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::click::{GestureBackend, GestureCompletion, Gesture};
    use crate::error::{CaptureError, ResolutionError};
    use crate::resolve::InferenceClient;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FixedCapture(Result<&'static str, ()>);

    #[async_trait::async_trait]
    impl TextCapture for FixedCapture {
        async fn extract_text(&self, _: &Region, _: Resolution) -> Result<String, CaptureError> {
            self.0.map(str::to_string).map_err(|_| CaptureError::Empty)
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    struct FixedReply(&'static str, Arc<AtomicUsize>);

    #[async_trait::async_trait]
    impl InferenceClient for FixedReply {
        async fn complete(&self, _: &str) -> Result<String, ResolutionError> {
            self.1.fetch_add(1, Ordering::SeqCst);
            Ok(self.0.to_string())
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    /// Completes every tap unless told to hang, recording where it tapped
    #[derive(Default)]
    struct RecordingBackend {
        taps: Mutex<Vec<(i32, i32)>>,
        hang: bool,
        held: Mutex<Vec<GestureCompletion>>,
    }

    #[async_trait::async_trait]
    impl GestureBackend for RecordingBackend {
        fn dispatch(&self, g: Gesture, completion: GestureCompletion) -> Result<(), DispatchError> {
            self.taps.lock().unwrap().push((g.x, g.y));
            if self.hang {
                self.held.lock().unwrap().push(completion);
            } else {
                completion.complete();
            }
            Ok(())
        }

        async fn is_available(&self) -> bool {
            true
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    const FRANCE: &str = "What is the capital of France?\nA) London\nB) Berlin\nC) Paris\nD) Madrid";

    fn settings() -> PipelineSettings {
        PipelineSettings {
            click_timeout: Duration::from_millis(50),
            reset_delay: Duration::from_millis(20),
            ..Default::default()
        }
    }

    fn pipeline(
        capture: Result<&'static str, ()>,
        reply: &'static str,
        backend: Arc<RecordingBackend>,
    ) -> (PipelineOrchestrator, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = AnswerResolver::new(
            Arc::new(AnswerCache::in_memory().unwrap()),
            Box::new(FixedReply(reply, calls.clone())),
            Duration::from_secs(1),
        );
        let coords = CoordinateMap::default()
            .with_position(OptionLetter::C, crate::coords::Position::new(500, 1500));
        let dispatcher = ClickDispatcher::new(DispatchSession::connected(backend), 100);
        (
            PipelineOrchestrator::new(Box::new(FixedCapture(capture)), resolver, coords, dispatcher, settings()),
            calls,
        )
    }

    async fn wait_for_idle(pipeline: &PipelineOrchestrator) {
        let mut rx = pipeline.subscribe();
        tokio::time::timeout(Duration::from_secs(1), rx.wait_for(|s| s.is_idle()))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_successful_run_taps_answer() {
        let backend = Arc::new(RecordingBackend::default());
        let (pipeline, _) = pipeline(Ok(FRANCE), "C", backend.clone());

        let outcome = pipeline.trigger().await;
        assert_eq!(
            outcome,
            RunOutcome::Completed {
                letter: OptionLetter::C,
                source: AnswerSource::Remote
            }
        );
        assert_eq!(pipeline.state(), PipelineState::Done);
        assert_eq!(backend.taps.lock().unwrap().as_slice(), &[(500, 1500)]);

        wait_for_idle(&pipeline).await;
    }

    #[tokio::test]
    async fn test_capture_failure() {
        let (pipeline, calls) = pipeline(Err(()), "C", Arc::new(RecordingBackend::default()));
        let outcome = pipeline.trigger().await;
        assert_eq!(
            outcome.final_state(),
            Some(PipelineState::Failed(FailureKind::Capture))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_parse_failure() {
        let (pipeline, calls) = pipeline(Ok("no options here"), "C", Arc::new(RecordingBackend::default()));
        let outcome = pipeline.trigger().await;
        assert_eq!(
            outcome.final_state(),
            Some(PipelineState::Failed(FailureKind::Parse))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tap_timeout_keeps_cache_write() {
        let backend = Arc::new(RecordingBackend {
            hang: true,
            ..Default::default()
        });
        let (pipeline, _) = pipeline(Ok(FRANCE), "C", backend);

        let outcome = pipeline.trigger().await;
        match outcome {
            RunOutcome::Failed { kind, reason } => {
                assert_eq!(kind, FailureKind::Dispatch);
                assert!(reason.contains("50ms"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(!pipeline.resolver().cache().is_empty().unwrap());
    }

    struct SlowReply;

    #[async_trait::async_trait]
    impl InferenceClient for SlowReply {
        async fn complete(&self, _: &str) -> Result<String, ResolutionError> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok("C".to_string())
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_resolve_stage_timeout() {
        let backend = Arc::new(RecordingBackend::default());
        let resolver = AnswerResolver::new(
            Arc::new(AnswerCache::in_memory().unwrap()),
            Box::new(SlowReply),
            Duration::from_secs(5),
        );
        let pipeline = PipelineOrchestrator::new(
            Box::new(FixedCapture(Ok(FRANCE))),
            resolver,
            CoordinateMap::default(),
            ClickDispatcher::new(DispatchSession::connected(backend.clone()), 100),
            PipelineSettings {
                resolve_timeout: Duration::from_millis(30),
                ..settings()
            },
        );

        match pipeline.trigger().await {
            RunOutcome::Failed { kind, reason } => {
                assert_eq!(kind, FailureKind::Resolve);
                assert!(reason.starts_with("Unresolved:"), "reason: {}", reason);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(pipeline.resolver().cache().is_empty().unwrap());
        assert!(backend.taps.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disconnected_session_fails_dispatch() {
        let (pipeline, _) = pipeline(Ok(FRANCE), "C", Arc::new(RecordingBackend::default()));
        pipeline.session().disconnect();
        let outcome = pipeline.trigger().await;
        assert_eq!(
            outcome.final_state(),
            Some(PipelineState::Failed(FailureKind::Dispatch))
        );
    }

    #[tokio::test]
    async fn test_trigger_ignored_until_reset() {
        let (pipeline, calls) = pipeline(Ok(FRANCE), "C", Arc::new(RecordingBackend::default()));
        pipeline.trigger().await;
        assert_eq!(pipeline.trigger().await, RunOutcome::Ignored);

        wait_for_idle(&pipeline).await;
        let again = pipeline.trigger().await;
        assert_eq!(
            again,
            RunOutcome::Completed {
                letter: OptionLetter::C,
                source: AnswerSource::Cache
            }
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_direct_click_skips_resolution() {
        let backend = Arc::new(RecordingBackend::default());
        let (pipeline, calls) = pipeline(Err(()), "C", backend.clone());

        let outcome = pipeline.direct_click(OptionLetter::A).await;
        assert_eq!(
            outcome,
            RunOutcome::Completed {
                letter: OptionLetter::A,
                source: AnswerSource::Manual
            }
        );
        assert_eq!(backend.taps.lock().unwrap().as_slice(), &[(540, 960)]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_set_coordinates() {
        let backend = Arc::new(RecordingBackend::default());
        let (pipeline, _) = pipeline(Err(()), "C", backend.clone());
        pipeline.set_coordinates(
            CoordinateMap::default().with_position(OptionLetter::B, crate::coords::Position::new(7, 8)),
        );

        pipeline.direct_click(OptionLetter::B).await;
        assert_eq!(backend.taps.lock().unwrap().as_slice(), &[(7, 8)]);
    }

    #[tokio::test]
    async fn test_subscriber_sees_done_then_idle() {
        let (pipeline, _) = pipeline(Ok(FRANCE), "C", Arc::new(RecordingBackend::default()));
        let mut rx = pipeline.subscribe();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let collector = {
            let seen = seen.clone();
            tokio::spawn(async move {
                while rx.changed().await.is_ok() {
                    let state = *rx.borrow_and_update();
                    seen.lock().unwrap().push(state);
                    if state.is_idle() {
                        break;
                    }
                }
            })
        };

        pipeline.trigger().await;
        tokio::time::timeout(Duration::from_secs(1), collector)
            .await
            .unwrap()
            .unwrap();

        // Intermediate stages may be coalesced; the terminal state and the
        // reset are always observed.
        let seen = seen.lock().unwrap();
        assert!(seen.contains(&PipelineState::Done));
        assert_eq!(seen.last(), Some(&PipelineState::Idle));
    }
}
