//! Speech playback state machine.
//!
//! ```text
//! Uninitialized -> Initializing -> Ready -> Speaking <-> Paused
//!                                    ^          |          |
//!                                    +----------+----------+  (completion, error, stop)
//! ```
//!
//! One utterance at a time, no queueing. Each utterance carries a token; a
//! completion whose token is no longer current (after `stop` or `release`)
//! is dropped, so an interrupted utterance can never flip the state later.
//! Each utterance also gets its own control channel, created before the engine
//! task is spawned, so a `stop` that lands before the engine starts still
//! reaches it.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    config::{EngineKind, SpeechConfig},
    error::{EngineError, PlaybackError},
};

pub mod command;
pub mod console;

pub use command::CommandEngine;
pub use console::ConsoleEngine;

const EVENT_CAPACITY: usize = 32;

/// Playback request for one utterance, as last set by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechControl {
    Play,
    Pause,
    Stop,
}

/// A synthesis backend. `speak` resolves when the utterance is played out,
/// fails, or `control` reads [`SpeechControl::Stop`].
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    async fn init(&self) -> Result<(), EngineError>;

    async fn speak(
        &self,
        text: &str,
        control: watch::Receiver<SpeechControl>,
    ) -> Result<(), EngineError>;

    fn release(&self);
}

/// Resolves once `control` reads `Stop`. Never resolves if the controller
/// drops the channel without stopping.
pub async fn stop_requested(control: &mut watch::Receiver<SpeechControl>) {
    loop {
        if *control.borrow_and_update() == SpeechControl::Stop {
            return;
        }
        if control.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub fn engine_from_config(cfg: &SpeechConfig) -> Arc<dyn SpeechEngine> {
    match cfg.engine {
        EngineKind::Console => Arc::new(ConsoleEngine::stdout(cfg.words_per_minute)),
        EngineKind::Command => Arc::new(CommandEngine::new(&cfg.program, cfg.args.clone())),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Uninitialized,
    Initializing,
    Ready,
    Speaking { text: String },
    Paused { text: String },
}

impl PlaybackState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Speaking { .. } => "speaking",
            Self::Paused { .. } => "paused",
        }
    }

    pub fn utterance(&self) -> Option<&str> {
        match self {
            Self::Speaking { text } | Self::Paused { text } => Some(text),
            _ => None,
        }
    }

    fn is_playing(&self) -> bool {
        matches!(self, Self::Speaking { .. } | Self::Paused { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    StateChanged(PlaybackState),
    InitFailed(String),
    Finished,
    SynthesisFailed(String),
}

/// How an utterance ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UtteranceOutcome {
    Completed,
    Failed(PlaybackError),
    /// Stopped or released before the engine finished.
    Interrupted,
}

/// Completion of one `speak` call.
#[derive(Debug)]
pub struct Utterance {
    pub token: u64,
    done: JoinHandle<UtteranceOutcome>,
}

impl Utterance {
    pub async fn finished(self) -> UtteranceOutcome {
        self.done.await.unwrap_or(UtteranceOutcome::Interrupted)
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: PlaybackState,
    token: u64,
    /// Control of the current utterance; replaced on every `speak`.
    control: Option<watch::Sender<SpeechControl>>,
}

impl Inner {
    fn signal(&self, request: SpeechControl) {
        if let Some(control) = &self.control {
            control.send_replace(request);
        }
    }
}

#[derive(Clone)]
pub struct PlaybackController {
    engine: Arc<dyn SpeechEngine>,
    inner: Arc<Mutex<Inner>>,
    events: broadcast::Sender<PlaybackEvent>,
}

impl PlaybackController {
    pub fn new(engine: Arc<dyn SpeechEngine>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            engine,
            inner: Arc::new(Mutex::new(Inner::default())),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> PlaybackState {
        self.lock().state.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: PlaybackEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn transition(&self, inner: &mut Inner, next: PlaybackState) {
        debug!(from = inner.state.name(), to = next.name(), "playback transition");
        inner.state = next.clone();
        self.emit(PlaybackEvent::StateChanged(next));
    }

    /// Bring the engine up. Already-initialized controllers return `Ok` untouched;
    /// on failure the controller is back in `Uninitialized` and may be retried.
    pub async fn initialize(&self) -> Result<(), PlaybackError> {
        {
            let mut inner = self.lock();
            match &inner.state {
                PlaybackState::Uninitialized => {}
                PlaybackState::Initializing => {
                    return Err(PlaybackError::Rejected {
                        operation: "initialize",
                        state: "initializing",
                    });
                }
                _ => return Ok(()),
            }
            self.transition(&mut inner, PlaybackState::Initializing);
        }

        let result = self.engine.init().await;

        let mut inner = self.lock();
        if inner.state != PlaybackState::Initializing {
            // Released while the engine was coming up.
            if result.is_ok() {
                self.engine.release();
            }
            return Err(PlaybackError::InitFailed("released during initialization".into()));
        }

        match result {
            Ok(()) => {
                info!("speech engine ready");
                self.transition(&mut inner, PlaybackState::Ready);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "speech engine init failed");
                self.transition(&mut inner, PlaybackState::Uninitialized);
                self.emit(PlaybackEvent::InitFailed(e.to_string()));
                Err(PlaybackError::InitFailed(e.to_string()))
            }
        }
    }

    /// Start speaking `text`. Only valid from `Ready`.
    pub fn speak(&self, text: &str) -> Result<Utterance, PlaybackError> {
        let (token, control) = {
            let mut inner = self.lock();
            if inner.state != PlaybackState::Ready {
                return Err(PlaybackError::Rejected {
                    operation: "speak",
                    state: inner.state.name(),
                });
            }
            inner.token += 1;
            let (control, receiver) = watch::channel(SpeechControl::Play);
            inner.control = Some(control);
            self.transition(
                &mut inner,
                PlaybackState::Speaking {
                    text: text.to_string(),
                },
            );
            (inner.token, receiver)
        };

        let done = tokio::spawn({
            let this = self.clone();
            let text = text.to_string();
            async move {
                let result = this.engine.speak(&text, control).await;
                this.complete(token, result)
            }
        });

        Ok(Utterance { token, done })
    }

    fn complete(&self, token: u64, result: Result<(), EngineError>) -> UtteranceOutcome {
        let mut inner = self.lock();
        if token != inner.token || !inner.state.is_playing() {
            debug!(token, current = inner.token, "dropping completion of interrupted utterance");
            return UtteranceOutcome::Interrupted;
        }

        self.transition(&mut inner, PlaybackState::Ready);
        match result {
            Ok(()) => {
                self.emit(PlaybackEvent::Finished);
                UtteranceOutcome::Completed
            }
            Err(e) => {
                warn!(error = %e, "synthesis failed");
                let reason = match e {
                    EngineError::Unavailable(reason) | EngineError::Synthesis(reason) => reason,
                };
                self.emit(PlaybackEvent::SynthesisFailed(reason.clone()));
                UtteranceOutcome::Failed(PlaybackError::Synthesis(reason))
            }
        }
    }

    /// Returns whether anything changed.
    pub fn pause(&self) -> bool {
        let mut inner = self.lock();
        let PlaybackState::Speaking { text } = &inner.state else {
            return false;
        };
        let text = text.clone();
        inner.signal(SpeechControl::Pause);
        self.transition(&mut inner, PlaybackState::Paused { text });
        true
    }

    pub fn resume(&self) -> bool {
        let mut inner = self.lock();
        let PlaybackState::Paused { text } = &inner.state else {
            return false;
        };
        let text = text.clone();
        inner.signal(SpeechControl::Play);
        self.transition(&mut inner, PlaybackState::Speaking { text });
        true
    }

    /// Interrupt the current utterance. Idempotent.
    pub fn stop(&self) -> bool {
        let mut inner = self.lock();
        if !inner.state.is_playing() {
            return false;
        }
        inner.token += 1;
        inner.signal(SpeechControl::Stop);
        self.transition(&mut inner, PlaybackState::Ready);
        true
    }

    /// Stop playback and free the engine. Requires `initialize` afterwards.
    pub fn release(&self) {
        let mut inner = self.lock();
        if inner.state.is_playing() {
            inner.token += 1;
            inner.signal(SpeechControl::Stop);
        }
        if inner.state != PlaybackState::Uninitialized {
            self.engine.release();
            self.transition(&mut inner, PlaybackState::Uninitialized);
        }
    }
}
