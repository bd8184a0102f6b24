mod common;

use common::{Fixture, ScriptedBackend};
use leafscan::{
    DiagnosisEngine, DiagnosisResponse, EngineError, EngineResult, InferenceError, LoadSummary,
    ModelLoadError, PipelineConfig, PipelineState, PreprocessError, RawImage, Severity,
};
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(10);

fn expect_loaded(engine: &DiagnosisEngine) -> LoadSummary {
    match engine.wait_response(WAIT) {
        EngineResult::Loaded(summary) => summary,
        other => panic!("expected a load result, got {other:?}"),
    }
}

fn expect_success(engine: &DiagnosisEngine) -> DiagnosisResponse {
    match engine.wait_response(WAIT) {
        EngineResult::Success(response) => response,
        other => panic!("expected a diagnosis, got {other:?}"),
    }
}

fn expect_error(engine: &DiagnosisEngine) -> EngineError {
    match engine.wait_response(WAIT) {
        EngineResult::Error(error) => error,
        other => panic!("expected an error, got {other:?}"),
    }
}

fn wait_for_state(engine: &DiagnosisEngine, state: PipelineState) {
    let deadline = Instant::now() + WAIT;
    while engine.state() != state {
        assert!(Instant::now() < deadline, "engine never reached {}", state.as_str());
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn wait_for_calls(concurrency: &common::Concurrency, calls: usize) {
    let deadline = Instant::now() + WAIT;
    while concurrency.calls() < calls {
        assert!(Instant::now() < deadline, "classifier was never called");
        std::thread::sleep(Duration::from_millis(5));
    }
}

fn ready_engine(backend: ScriptedBackend, fixture: &Fixture) -> DiagnosisEngine {
    let engine = DiagnosisEngine::new(backend, PipelineConfig::default());
    engine.load(&fixture.model, &fixture.labels).unwrap();
    expect_loaded(&engine);
    engine
}

#[test]
fn test_blight_end_to_end() {
    let fixture = Fixture::blight();
    let engine = DiagnosisEngine::new(ScriptedBackend::default(), PipelineConfig::default());
    assert_eq!(engine.state(), PipelineState::Uninitialized);

    engine.load(&fixture.model, &fixture.labels).unwrap();
    let summary = expect_loaded(&engine);
    assert_eq!(summary.labels, 3);
    assert_eq!(summary.model_path, fixture.model);
    assert_eq!(engine.state(), PipelineState::Ready);

    let id = engine.submit(RawImage::from_path(&fixture.image)).unwrap();
    let response = expect_success(&engine);
    assert_eq!(response.id, id);
    assert_eq!(response.source.path.as_deref(), Some(fixture.image.as_path()));
    assert_eq!((response.source.width, response.source.height), (320, 240));

    let record = &response.record;
    assert_eq!(record.label(), "Blight");
    assert_eq!(record.confidence(), 90.0);
    assert_eq!(record.severity(), Severity::High);
    assert_eq!(record.risk(), Severity::High);
    assert!(record.treatments().iter().any(|t| t.contains("fungicide")));

    assert_eq!(engine.state(), PipelineState::Ready);
    assert!(matches!(
        engine.try_poll_response(),
        EngineResult::Empty(PipelineState::Ready)
    ));
}

#[test]
fn test_submit_before_load_is_rejected() {
    let engine = DiagnosisEngine::new(ScriptedBackend::default(), PipelineConfig::default());
    let err = engine.submit(RawImage::from_bytes(common::leaf_jpeg(8, 8))).unwrap_err();
    assert!(matches!(err, EngineError::NotReady("uninitialized")));
}

#[test]
fn test_missing_model_fails_until_reloaded() {
    let fixture = Fixture::blight();
    let engine = DiagnosisEngine::new(ScriptedBackend::default(), PipelineConfig::default());

    engine
        .load(fixture.dir.path().join("missing.tflite"), &fixture.labels)
        .unwrap();
    let err = expect_error(&engine);
    assert!(matches!(
        err,
        EngineError::ModelLoad(ModelLoadError::Artifact { .. })
    ));
    assert_eq!(engine.state(), PipelineState::Failed);

    let err = engine.submit(RawImage::from_path(&fixture.image)).unwrap_err();
    assert!(matches!(err, EngineError::NotReady("failed")));

    engine.load(&fixture.model, &fixture.labels).unwrap();
    expect_loaded(&engine);
    engine.submit(RawImage::from_path(&fixture.image)).unwrap();
    assert_eq!(expect_success(&engine).record.label(), "Blight");
}

#[test]
fn test_empty_label_file_fails_load() {
    let fixture = Fixture::blight();
    let labels = fixture.file("empty.txt", b"\n\n");
    let engine = DiagnosisEngine::new(ScriptedBackend::default(), PipelineConfig::default());
    engine.load(&fixture.model, labels).unwrap();
    assert!(matches!(
        expect_error(&engine),
        EngineError::ModelLoad(ModelLoadError::NoLabels(_))
    ));
}

#[test]
fn test_second_submit_is_rejected_while_inferring() {
    let fixture = Fixture::blight();
    let (backend, permits) = ScriptedBackend::gated();
    let concurrency = backend.concurrency.clone();
    let engine = ready_engine(backend, &fixture);

    let first = engine.submit(RawImage::from_path(&fixture.image)).unwrap();
    assert_eq!(engine.state(), PipelineState::Inferring);

    let err = engine.submit(RawImage::from_path(&fixture.image)).unwrap_err();
    assert!(matches!(err, EngineError::Busy("inferring")));
    let err = engine.load(&fixture.model, &fixture.labels).unwrap_err();
    assert!(matches!(err, EngineError::Busy("inferring")));

    permits.send(()).unwrap();
    assert_eq!(expect_success(&engine).id, first);

    permits.send(()).unwrap();
    let second = engine.submit(RawImage::from_path(&fixture.image)).unwrap();
    assert_ne!(first, second);
    assert_eq!(expect_success(&engine).id, second);

    assert_eq!(concurrency.calls(), 2);
    assert_eq!(concurrency.peak(), 1);
}

#[test]
fn test_concurrent_submitters_never_overlap() {
    let fixture = Fixture::blight();
    let backend = ScriptedBackend::default();
    let concurrency = backend.concurrency.clone();
    let engine = ready_engine(backend, &fixture);

    let accepted = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| engine.submit(RawImage::from_path(&fixture.image)).is_ok()))
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count()
    });
    assert!(accepted >= 1);

    for _ in 0..accepted {
        expect_success(&engine);
    }
    assert_eq!(concurrency.peak(), 1);
}

#[test]
fn test_decode_error_resets_pipeline() {
    let fixture = Fixture::blight();
    let engine = ready_engine(ScriptedBackend::default(), &fixture);

    engine
        .submit(RawImage::from_bytes(b"not an image".to_vec()))
        .unwrap();
    assert!(matches!(
        expect_error(&engine),
        EngineError::Preprocess(PreprocessError::Decode(_))
    ));
    assert_eq!(engine.state(), PipelineState::Ready);

    engine.submit(RawImage::from_path(&fixture.image)).unwrap();
    expect_success(&engine);
}

#[test]
fn test_output_mismatch_is_inference_error() {
    let fixture = Fixture::new("0.5 0.5", "Healthy\nBlight\nUnknown\n");
    let engine = ready_engine(ScriptedBackend::default(), &fixture);

    engine.submit(RawImage::from_path(&fixture.image)).unwrap();
    assert!(matches!(
        expect_error(&engine),
        EngineError::Inference(InferenceError::OutputMismatch {
            expected: 3,
            actual: 2
        })
    ));
    assert_eq!(engine.state(), PipelineState::Ready);
}

#[test]
fn test_cancelled_result_is_discarded() {
    let fixture = Fixture::blight();
    let (backend, permits) = ScriptedBackend::gated();
    let engine = ready_engine(backend, &fixture);

    engine.submit(RawImage::from_path(&fixture.image)).unwrap();
    engine.cancel();
    permits.send(()).unwrap();

    wait_for_state(&engine, PipelineState::Ready);
    assert!(matches!(
        engine.wait_response(Duration::from_millis(100)),
        EngineResult::Error(EngineError::Timeout(_))
    ));

    permits.send(()).unwrap();
    engine.submit(RawImage::from_path(&fixture.image)).unwrap();
    assert_eq!(expect_success(&engine).record.label(), "Blight");
}

#[test]
fn test_wait_times_out_without_interrupting_inference() {
    let fixture = Fixture::blight();
    let (backend, permits) = ScriptedBackend::gated();
    let config = PipelineConfig {
        response_timeout_ms: 50,
        ..PipelineConfig::default()
    };
    let engine = DiagnosisEngine::new(backend, config);
    engine.load(&fixture.model, &fixture.labels).unwrap();
    expect_loaded(&engine);

    let id = engine.submit(RawImage::from_path(&fixture.image)).unwrap();
    assert!(matches!(
        engine.wait_response_default(),
        EngineResult::Error(EngineError::Timeout(t)) if t == Duration::from_millis(50)
    ));
    assert_eq!(engine.state(), PipelineState::Inferring);

    permits.send(()).unwrap();
    assert_eq!(expect_success(&engine).id, id);
}

#[test]
fn test_reload_switches_label_table() {
    let fixture = Fixture::blight();
    let engine = ready_engine(ScriptedBackend::default(), &fixture);

    let model = fixture.file("model_v2.bin", b"0.1 0.2 0.7");
    let labels = fixture.file("labels_v2.txt", b"Healthy\nEarly Blight\nLate Blight\n");
    engine.load(model, labels).unwrap();
    assert_eq!(expect_loaded(&engine).labels, 3);

    engine.submit(RawImage::from_path(&fixture.image)).unwrap();
    let record = expect_success(&engine).record;
    assert_eq!(record.label(), "Late Blight");
    assert_eq!(record.condition(), "Late Blight");
    assert_eq!(record.confidence(), 70.0);
    assert_eq!(record.severity(), Severity::Medium);
    assert_eq!(record.risk(), Severity::High);
}

#[test]
fn test_drop_while_inferring_returns_immediately() {
    let fixture = Fixture::blight();
    let (backend, permits) = ScriptedBackend::gated();
    let concurrency = backend.concurrency.clone();
    let engine = ready_engine(backend, &fixture);

    engine.submit(RawImage::from_path(&fixture.image)).unwrap();
    wait_for_calls(&concurrency, 1);
    let release = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_secs(2));
        let _ = permits.send(());
    });

    let start = Instant::now();
    drop(engine);
    let elapsed = start.elapsed();
    assert!(elapsed < Duration::from_millis(500), "drop blocked for {elapsed:?}");

    release.join().unwrap();
}

#[test]
fn test_drop_with_closed_gate_does_not_hang() {
    let fixture = Fixture::blight();
    let (backend, permits) = ScriptedBackend::gated();
    let engine = ready_engine(backend, &fixture);

    engine.submit(RawImage::from_path(&fixture.image)).unwrap();
    drop(permits);
    drop(engine);
}

#[test]
fn test_stop_waits_for_running_inference() {
    let fixture = Fixture::blight();
    let (backend, permits) = ScriptedBackend::gated();
    let concurrency = backend.concurrency.clone();
    let mut engine = ready_engine(backend, &fixture);

    engine.submit(RawImage::from_path(&fixture.image)).unwrap();
    permits.send(()).unwrap();
    engine.stop();

    assert_eq!(concurrency.calls(), 1);
    assert_eq!(engine.state(), PipelineState::Ready);
    let err = engine.submit(RawImage::from_path(&fixture.image)).unwrap_err();
    assert!(matches!(err, EngineError::Disconnected));
    assert_eq!(engine.state(), PipelineState::Ready);
}
