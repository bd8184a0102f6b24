#![allow(dead_code)]

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use leafscan::{Classifier, ClassifierBackend, InputTensor};
use std::{
    io::{Cursor, Write},
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
        mpsc,
    },
};
use tempfile::TempDir;

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct MockError(pub String);

/// Tracks how many classify calls run at once.
#[derive(Clone, Default)]
pub struct Concurrency {
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
}

impl Concurrency {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Returns the scores stored in the artifact, optionally waiting for a
/// permit before answering.
pub struct ScriptedClassifier {
    scores: Vec<f32>,
    gate: Option<Arc<Mutex<mpsc::Receiver<()>>>>,
    concurrency: Concurrency,
}

impl Classifier for ScriptedClassifier {
    type Error = MockError;

    fn classify(&mut self, input: &InputTensor) -> Result<Vec<f32>, Self::Error> {
        let c = &self.concurrency;
        let active = c.active.fetch_add(1, Ordering::SeqCst) + 1;
        c.peak.fetch_max(active, Ordering::SeqCst);
        c.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            let permit = gate.lock().map_err(|e| MockError(e.to_string()))?.recv();
            if permit.is_err() {
                c.active.fetch_sub(1, Ordering::SeqCst);
                return Err(MockError("gate closed".to_string()));
            }
        }

        c.active.fetch_sub(1, Ordering::SeqCst);
        if input.as_slice().iter().any(|v| !(0.0..=1.0).contains(v)) {
            return Err(MockError("input out of range".to_string()));
        }
        Ok(self.scores.clone())
    }
}

/// The artifact is a whitespace separated list of scores.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    pub gate: Option<Arc<Mutex<mpsc::Receiver<()>>>>,
    pub concurrency: Concurrency,
}

impl ScriptedBackend {
    /// A backend whose classifiers block until a permit is sent.
    pub fn gated() -> (Self, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        let backend = Self {
            gate: Some(Arc::new(Mutex::new(rx))),
            concurrency: Concurrency::default(),
        };
        (backend, tx)
    }
}

impl ClassifierBackend for ScriptedBackend {
    type Model = ScriptedClassifier;
    type Error = MockError;

    fn load(&self, artifact: &[u8]) -> Result<Self::Model, Self::Error> {
        let text = std::str::from_utf8(artifact).map_err(|e| MockError(e.to_string()))?;
        let scores = text
            .split_whitespace()
            .map(|v| v.parse::<f32>().map_err(|e| MockError(format!("bad score '{v}': {e}"))))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ScriptedClassifier {
            scores,
            gate: self.gate.clone(),
            concurrency: self.concurrency.clone(),
        })
    }
}

/// Model, label and image files laid out in a temporary directory.
pub struct Fixture {
    pub dir: TempDir,
    pub model: PathBuf,
    pub labels: PathBuf,
    pub image: PathBuf,
}

impl Fixture {
    pub fn new(scores: &str, labels: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let model = write_file(&dir, "model.bin", scores.as_bytes());
        let labels = write_file(&dir, "labels.txt", labels.as_bytes());
        let image = write_file(&dir, "leaf.jpg", &leaf_jpeg(320, 240));
        Self {
            dir,
            model,
            labels,
            image,
        }
    }

    pub fn blight() -> Self {
        Self::new("0.05 0.90 0.05", "Healthy\nBlight\nUnknown\n")
    }

    pub fn file(&self, name: &str, content: &[u8]) -> PathBuf {
        write_file(&self.dir, name, content)
    }
}

fn write_file(dir: &TempDir, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content).unwrap();
    path
}

/// A green-ish JPEG with some texture.
pub fn leaf_jpeg(width: u32, height: u32) -> Vec<u8> {
    let image = ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x * 7 % 90) as u8, (120 + y % 100) as u8, (x * y % 60) as u8])
    });
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
        .unwrap();
    buf
}
