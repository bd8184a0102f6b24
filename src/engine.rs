use crate::{
    config::PipelineConfig,
    error::EngineError,
    interpret::Interpreter,
    knowledge::KnowledgeBase,
    model::ClassifierBackend,
    preprocess::{Preprocessor, RawImage},
    record::DiagnosisRecord,
    session::ModelSession,
};
use std::{
    path::PathBuf,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
        mpsc,
    },
    thread::JoinHandle,
    time::{Duration, Instant},
};

/// Identifier handed out for every accepted diagnosis request.
pub type RequestId = u64;

/// Represents the current state of the diagnosis pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    /// No model has been requested yet.
    Uninitialized,
    /// The model artifact and labels are being loaded.
    Loading,
    /// A model is loaded and a new image can be submitted.
    Ready,
    /// An image is being preprocessed, classified and interpreted.
    Inferring,
    /// The last load failed; a new load is required before inference.
    Failed,
}

impl PipelineState {
    /// Returns the state as a string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Uninitialized => "uninitialized",
            PipelineState::Loading => "loading",
            PipelineState::Ready => "ready",
            PipelineState::Inferring => "inferring",
            PipelineState::Failed => "failed",
        }
    }
}

/// Lightweight description of the image a diagnosis was made from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageMetadata {
    pub path: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
}

/// A finished diagnosis together with telemetry.
#[derive(Clone, Debug)]
pub struct DiagnosisResponse {
    /// Identifier returned by [`DiagnosisEngine::submit`].
    pub id: RequestId,
    /// Timestamp when the worker picked the request up.
    pub start_time: Instant,
    /// Time spent in preprocessing, inference and interpretation.
    pub duration: Duration,
    pub source: ImageMetadata,
    pub record: DiagnosisRecord,
}

/// Reported once a model load has completed successfully.
#[derive(Clone, Debug)]
pub struct LoadSummary {
    pub model_path: PathBuf,
    pub labels: usize,
    pub duration: Duration,
}

/// Result type returned when polling for engine results.
#[derive(Debug)]
pub enum EngineResult {
    /// A model load finished; the engine is ready.
    Loaded(LoadSummary),
    /// A diagnosis finished.
    Success(DiagnosisResponse),
    /// No result available yet, with current pipeline state.
    Empty(PipelineState),
    /// A load or diagnosis failed, or the engine itself broke down.
    Error(EngineError),
}

enum EngineCommand {
    Load {
        epoch: u64,
        model_path: PathBuf,
        labels_path: PathBuf,
    },
    Diagnose {
        epoch: u64,
        id: RequestId,
        image: RawImage,
    },
}

enum EngineEvent {
    Loaded(LoadSummary),
    Diagnosis(DiagnosisResponse),
    Failed(EngineError),
}

struct Envelope {
    epoch: u64,
    event: EngineEvent,
}

fn lock_state(state: &Mutex<PipelineState>) -> MutexGuard<'_, PipelineState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs the classification pipeline on a dedicated worker thread.
///
/// The engine owns the model session for its whole lifetime. Loading and
/// diagnosing are scheduled without blocking the caller, and results are
/// collected with [`DiagnosisEngine::try_poll_response`] or
/// [`DiagnosisEngine::wait_response`]. Only one diagnosis may be in flight:
/// submissions made while the pipeline is busy are rejected.
pub struct DiagnosisEngine {
    state: Arc<Mutex<PipelineState>>,
    epoch: Arc<AtomicU64>,
    req_tx: Option<mpsc::Sender<EngineCommand>>,
    rep_rx: Mutex<mpsc::Receiver<Envelope>>,
    worker_handle: Option<JoinHandle<()>>,
    id_counter: AtomicU64,
    config: PipelineConfig,
}

impl DiagnosisEngine {
    /// Creates an engine using the built-in knowledge base.
    pub fn new<B>(backend: B, config: PipelineConfig) -> Self
    where
        B: ClassifierBackend + Send + 'static,
    {
        Self::with_knowledge(backend, config, Arc::new(KnowledgeBase::builtin()))
    }

    /// Creates an engine with a custom knowledge base.
    ///
    /// The backend is moved to the worker thread. No model is loaded until
    /// [`DiagnosisEngine::load`] is called.
    pub fn with_knowledge<B>(
        backend: B,
        config: PipelineConfig,
        knowledge: Arc<KnowledgeBase>,
    ) -> Self
    where
        B: ClassifierBackend + Send + 'static,
    {
        let (req_tx, req_rx) = mpsc::channel::<EngineCommand>();
        let (rep_tx, rep_rx) = mpsc::channel::<Envelope>();
        let state = Arc::new(Mutex::new(PipelineState::Uninitialized));
        let epoch = Arc::new(AtomicU64::new(0));

        let worker = Worker {
            backend,
            session: None,
            preprocessor: Preprocessor::from_config(&config),
            interpreter: Interpreter::from_config(knowledge, &config),
            config: config.clone(),
            state: state.clone(),
            epoch: epoch.clone(),
            rep_tx,
        };
        let worker_handle = std::thread::spawn(move || worker.run(req_rx));

        Self {
            state,
            epoch,
            req_tx: Some(req_tx),
            rep_rx: Mutex::new(rep_rx),
            worker_handle: Some(worker_handle),
            id_counter: AtomicU64::new(0),
            config,
        }
    }

    /// Returns the current state of the pipeline.
    pub fn state(&self) -> PipelineState {
        *lock_state(&self.state)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Schedules loading of a model artifact and its label file.
    ///
    /// Any previously loaded session is dropped once the worker picks the
    /// request up. Completion is reported as [`EngineResult::Loaded`] or as an
    /// [`EngineResult::Error`] carrying [`EngineError::ModelLoad`].
    pub fn load(
        &self,
        model_path: impl Into<PathBuf>,
        labels_path: impl Into<PathBuf>,
    ) -> Result<(), EngineError> {
        let mut state = lock_state(&self.state);
        if matches!(*state, PipelineState::Loading | PipelineState::Inferring) {
            return Err(EngineError::Busy(state.as_str()));
        }

        let previous = *state;
        *state = PipelineState::Loading;
        let command = EngineCommand::Load {
            epoch: self.epoch.load(Ordering::SeqCst),
            model_path: model_path.into(),
            labels_path: labels_path.into(),
        };
        if let Err(e) = self.send(command) {
            *state = previous;
            return Err(e);
        }

        log::debug!("Scheduled model load");
        Ok(())
    }

    /// Schedules a diagnosis of `image`.
    ///
    /// Fails with [`EngineError::NotReady`] until a load has succeeded and
    /// with [`EngineError::Busy`] while another diagnosis is in flight.
    pub fn submit(&self, image: RawImage) -> Result<RequestId, EngineError> {
        let mut state = lock_state(&self.state);
        match *state {
            PipelineState::Ready => {}
            PipelineState::Inferring => return Err(EngineError::Busy(state.as_str())),
            other => return Err(EngineError::NotReady(other.as_str())),
        }

        let id = self.id_counter.fetch_add(1, Ordering::SeqCst);
        *state = PipelineState::Inferring;
        let command = EngineCommand::Diagnose {
            epoch: self.epoch.load(Ordering::SeqCst),
            id,
            image,
        };
        if let Err(e) = self.send(command) {
            *state = PipelineState::Ready;
            return Err(e);
        }

        log::debug!("Scheduled diagnosis {}", id);
        Ok(id)
    }

    /// Discards the results of everything scheduled so far.
    ///
    /// Work already running is not interrupted; its result is dropped
    /// silently when it completes.
    pub fn cancel(&self) {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        log::debug!("Cancelled pending results (epoch {})", epoch);
    }

    /// Attempts to retrieve a completed result without blocking.
    pub fn try_poll_response(&self) -> EngineResult {
        let rep_rx = self.rep_rx.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            match rep_rx.try_recv() {
                Ok(envelope) => {
                    if let Some(result) = self.accept(envelope) {
                        return result;
                    }
                }
                Err(mpsc::TryRecvError::Empty) => return EngineResult::Empty(self.state()),
                Err(mpsc::TryRecvError::Disconnected) => {
                    log::error!("Response channel disconnected");
                    return EngineResult::Error(EngineError::Disconnected);
                }
            }
        }
    }

    /// Blocks until a result is available or `timeout` elapses.
    pub fn wait_response(&self, timeout: Duration) -> EngineResult {
        let deadline = Instant::now() + timeout;
        let rep_rx = self.rep_rx.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rep_rx.recv_timeout(remaining) {
                Ok(envelope) => {
                    if let Some(result) = self.accept(envelope) {
                        return result;
                    }
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    log::warn!(
                        "No response within {:?} (state: {})",
                        timeout,
                        self.state().as_str()
                    );
                    return EngineResult::Error(EngineError::Timeout(timeout));
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    log::error!("Response channel disconnected");
                    return EngineResult::Error(EngineError::Disconnected);
                }
            }
        }
    }

    /// [`DiagnosisEngine::wait_response`] with the configured timeout.
    pub fn wait_response_default(&self) -> EngineResult {
        self.wait_response(self.config.response_timeout())
    }

    /// Stops the engine and waits for the worker thread to exit.
    ///
    /// Closes the request channel and blocks until the worker has finished
    /// the command it is running, so the backend is released on return.
    /// Results that were not collected are dropped. Dropping the engine does
    /// not wait; call this when the caller can afford to block.
    pub fn stop(&mut self) {
        self.req_tx.take();
        if let Some(handle) = self.worker_handle.take() {
            if handle.join().is_err() {
                log::error!("Diagnosis worker panicked");
            }
        }
    }

    fn send(&self, command: EngineCommand) -> Result<(), EngineError> {
        let tx = self.req_tx.as_ref().ok_or(EngineError::Disconnected)?;
        tx.send(command).map_err(|_| {
            log::error!("Request channel disconnected");
            EngineError::Disconnected
        })
    }

    fn accept(&self, envelope: Envelope) -> Option<EngineResult> {
        if envelope.epoch != self.epoch.load(Ordering::SeqCst) {
            log::debug!("Dropping result from cancelled epoch {}", envelope.epoch);
            return None;
        }
        Some(match envelope.event {
            EngineEvent::Loaded(summary) => EngineResult::Loaded(summary),
            EngineEvent::Diagnosis(response) => EngineResult::Success(response),
            EngineEvent::Failed(error) => EngineResult::Error(error),
        })
    }
}

// Dropping never blocks: pending results are invalidated through the epoch
// and the worker exits on its own once its current command completes.
impl Drop for DiagnosisEngine {
    fn drop(&mut self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        self.req_tx.take();
        if self.worker_handle.take().is_some() {
            log::debug!("Detached diagnosis worker");
        }
    }
}

struct Worker<B: ClassifierBackend> {
    backend: B,
    session: Option<ModelSession<B::Model>>,
    preprocessor: Preprocessor,
    interpreter: Interpreter,
    config: PipelineConfig,
    state: Arc<Mutex<PipelineState>>,
    epoch: Arc<AtomicU64>,
    rep_tx: mpsc::Sender<Envelope>,
}

impl<B: ClassifierBackend> Worker<B> {
    fn run(mut self, req_rx: mpsc::Receiver<EngineCommand>) {
        while let Ok(command) = req_rx.recv() {
            match command {
                EngineCommand::Load {
                    epoch,
                    model_path,
                    labels_path,
                } => self.load(epoch, model_path, labels_path),
                EngineCommand::Diagnose { epoch, id, image } => self.diagnose(epoch, id, image),
            }
        }
        log::debug!("Diagnosis worker stopped");
    }

    fn load(&mut self, epoch: u64, model_path: PathBuf, labels_path: PathBuf) {
        log::debug!("Loading model '{}'", model_path.display());
        self.session = None;
        let start_time = Instant::now();

        match ModelSession::load(&self.backend, &model_path, &labels_path, self.config.input) {
            Ok(session) => {
                let summary = LoadSummary {
                    model_path,
                    labels: session.labels().len(),
                    duration: start_time.elapsed(),
                };
                self.session = Some(session);
                self.finish(PipelineState::Ready, epoch, EngineEvent::Loaded(summary));
            }
            Err(e) => {
                log::error!("Failed to load model: {}", e);
                self.finish(PipelineState::Failed, epoch, EngineEvent::Failed(e.into()));
            }
        }
    }

    fn diagnose(&mut self, epoch: u64, id: RequestId, image: RawImage) {
        log::debug!("Running diagnosis {}", id);
        let start_time = Instant::now();

        let event = match self.run_pipeline(&image) {
            Ok((record, (width, height))) => {
                log::debug!("Diagnosis {} completed", id);
                EngineEvent::Diagnosis(DiagnosisResponse {
                    id,
                    start_time,
                    duration: start_time.elapsed(),
                    source: ImageMetadata {
                        path: image.path().map(|p| p.to_path_buf()),
                        width,
                        height,
                    },
                    record,
                })
            }
            Err(e) => {
                log::warn!("Diagnosis {} failed: {}", id, e);
                EngineEvent::Failed(e)
            }
        };

        self.finish(PipelineState::Ready, epoch, event);
    }

    fn run_pipeline(
        &mut self,
        image: &RawImage,
    ) -> Result<(DiagnosisRecord, (u32, u32)), EngineError> {
        let session = self
            .session
            .as_mut()
            .ok_or(EngineError::NotReady(PipelineState::Uninitialized.as_str()))?;

        let tensor = self.preprocessor.preprocess(image)?;
        let source_size = tensor.source_size();
        let scores = session.infer(&tensor)?;
        let record = self.interpreter.interpret(&scores, session.labels());
        Ok((record, source_size))
    }

    // The state update and the send happen under the state lock so a caller
    // that observes the new state can also observe the result.
    fn finish(&self, next: PipelineState, epoch: u64, event: EngineEvent) {
        let mut state = lock_state(&self.state);
        *state = next;
        if epoch != self.epoch.load(Ordering::SeqCst) {
            log::debug!("Discarding result from cancelled epoch {}", epoch);
            return;
        }
        if self.rep_tx.send(Envelope { epoch, event }).is_err() {
            log::debug!("Engine dropped before the result was delivered");
        }
    }
}
